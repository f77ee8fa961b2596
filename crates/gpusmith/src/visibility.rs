//! Block-variable visibility inside atomic regions.
//!
//! An atomic region body may only touch variables it declared itself, so
//! that the value folded into its special-value lane does not depend on
//! which lanes happened to enter. The stack holds one frame per block
//! entered since the region began; a variable declared in a block is
//! visible from that block and all its descendants, never from its
//! ancestors or siblings.

use crate::block::BlockId;
use crate::expr::VarRef;
use crate::session::Session;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
struct Frame {
    block: BlockId,
    depth: u32,
    vars: BTreeSet<VarRef>,
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityStack {
    frames: Vec<Frame>,
}

impl VisibilityStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an empty frame for `block`. Frames left over from a sibling at
    /// the same or greater depth are dropped first.
    pub fn begin_region(&mut self, block: BlockId, depth: u32) {
        self.frames.retain(|f| f.depth < depth);
        self.frames.push(Frame {
            block,
            depth,
            vars: BTreeSet::new(),
        });
    }

    /// Add `var` to the innermost frame. No-op outside a region.
    pub fn record(&mut self, var: VarRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(var);
        }
    }

    /// Union of every frame at or above `depth`.
    #[must_use]
    pub fn visible_at(&self, depth: u32) -> Vec<VarRef> {
        let mut out = BTreeSet::new();
        for frame in self.frames.iter().filter(|f| f.depth <= depth) {
            out.extend(frame.vars.iter().copied());
        }
        out.into_iter().collect()
    }

    /// Pop the frames of `block` and anything opened beneath it.
    pub fn end_region(&mut self, depth: u32) {
        self.frames.retain(|f| f.depth < depth);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Innermost frame's block.
    #[must_use]
    pub fn current_block(&self) -> Option<BlockId> {
        self.frames.last().map(|f| f.block)
    }
}

impl Session {
    pub fn begin_region(&mut self, block: BlockId) {
        let depth = self.block(block).depth;
        self.atomics.visibility.begin_region(block, depth);
    }

    /// Track `var` in the current region. Buffer views and elements of
    /// array collectives are skipped: their storage is tracked through the
    /// buffer model. Returns whether the variable was recorded.
    pub fn record_variable(&mut self, var: VarRef) -> bool {
        let tracked = match var {
            VarRef::Var(id) => {
                let v = self.var(id);
                !(v.is_array() && v.collective.is_some())
            }
            VarRef::Buffer(id) => !self.buffer(id).is_view(),
        };
        if tracked && self.atomics.visibility.is_active() {
            self.atomics.visibility.record(var);
            return true;
        }
        false
    }

    #[must_use]
    pub fn visible_variables(&self, block: BlockId) -> Vec<VarRef> {
        self.atomics
            .visibility
            .visible_at(self.block(block).depth)
    }

    pub fn end_region(&mut self, block: BlockId) {
        let depth = self.block(block).depth;
        self.atomics.visibility.end_region(depth);
    }
}
