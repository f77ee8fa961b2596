//! Per-call generation context.

use crate::block::BlockId;

/// Where the generator currently is: enclosing block, expression depth and
/// whether it is inside an atomic region body.
///
/// Passed by value down the recursive construction; the session carries
/// everything that outlives one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgContext {
    pub block: BlockId,
    pub expr_depth: u32,
    pub atomic_region: bool,
}

impl CgContext {
    #[must_use]
    pub const fn new(block: BlockId) -> Self {
        Self {
            block,
            expr_depth: 0,
            atomic_region: false,
        }
    }

    /// One expression level down.
    #[must_use]
    pub const fn deeper(self) -> Self {
        Self {
            expr_depth: self.expr_depth + 1,
            ..self
        }
    }

    /// Child block; expression depth restarts.
    #[must_use]
    pub const fn enter(self, block: BlockId) -> Self {
        Self {
            block,
            expr_depth: 0,
            atomic_region: self.atomic_region,
        }
    }

    #[must_use]
    pub const fn atomic(self) -> Self {
        Self {
            atomic_region: true,
            ..self
        }
    }
}
