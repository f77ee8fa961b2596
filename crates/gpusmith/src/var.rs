//! Plain (non-buffer) variables.

use crate::block::BlockId;
use crate::expr::Expr;
use crate::types::{Qualifiers, Type};

/// Handle into the session's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub quals: Qualifiers,
    pub init: Option<Expr>,
    /// Array dimensions; empty for scalars.
    pub dims: Vec<usize>,
    /// Owning array when this variable is an element of one.
    pub collective: Option<VarId>,
    pub block: Option<BlockId>,
    /// Lives in the per-thread parameter aggregate.
    pub is_global: bool,
}

impl Variable {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            quals: Qualifiers::default(),
            init: None,
            dims: Vec::new(),
            collective: None,
            block: None,
            is_global: false,
        }
    }

    #[must_use]
    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(init);
        self
    }

    #[must_use]
    pub fn with_dims(mut self, dims: Vec<usize>) -> Self {
        self.dims = dims;
        self
    }

    #[must_use]
    pub const fn in_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    #[must_use]
    pub const fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    /// Total element count (1 for scalars).
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}
