//! Generation session: options, random streams and the arenas every
//! generated entity lives in.
//!
//! Buffers, variables and blocks refer to each other by handle. The arenas
//! are dropped together with the session, so no entity outlives the kernel
//! it was generated for.

use crate::atomic::AtomicRegistry;
use crate::block::{Block, BlockId, Stmt};
use crate::buffer::{Buffer, BufferArena, BufferId};
use crate::error::{GenError, Result};
use crate::expr::VarRef;
use crate::globals::Globals;
use crate::params::KernelFeatures;
use crate::rng::{GenRng, Seed};
use crate::types::Type;
use crate::var::{VarId, Variable};
use crate::vector::VectorTables;
use serde::{Deserialize, Serialize};

/// Generator options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenOptions {
    pub max_expr_depth: u32,
    pub max_block_depth: u32,
    pub max_block_size: u32,
    pub atomics: bool,
    /// Counter lanes per group, i.e. the most atomic expressions one kernel may hold.
    pub max_atomic_regions: usize,
    pub local_atomics: bool,
    pub barriers: bool,
    pub vectors: bool,
    pub atomic_reductions: bool,
    pub emi: bool,
    pub fake_divergence: bool,
    pub inter_thread_comm: bool,
    pub local_size: Vec<usize>,
    pub global_size: Vec<usize>,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            max_expr_depth: 5,
            max_block_depth: 3,
            max_block_size: 4,
            atomics: false,
            max_atomic_regions: 4,
            local_atomics: false,
            barriers: false,
            vectors: false,
            atomic_reductions: false,
            emi: false,
            fake_divergence: false,
            inter_thread_comm: false,
            local_size: vec![32],
            global_size: vec![1024],
        }
    }
}

impl GenOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_atomics(mut self, max_regions: usize) -> Self {
        self.atomics = true;
        self.max_atomic_regions = max_regions;
        self
    }

    #[must_use]
    pub const fn with_local_atomics(mut self) -> Self {
        self.local_atomics = true;
        self
    }

    #[must_use]
    pub const fn with_barriers(mut self) -> Self {
        self.barriers = true;
        self
    }

    #[must_use]
    pub const fn with_vectors(mut self) -> Self {
        self.vectors = true;
        self
    }

    #[must_use]
    pub const fn with_atomic_reductions(mut self) -> Self {
        self.atomic_reductions = true;
        self
    }

    #[must_use]
    pub const fn with_emi(mut self) -> Self {
        self.emi = true;
        self
    }

    #[must_use]
    pub const fn with_fake_divergence(mut self) -> Self {
        self.fake_divergence = true;
        self
    }

    #[must_use]
    pub const fn with_inter_thread_comm(mut self) -> Self {
        self.inter_thread_comm = true;
        self
    }

    #[must_use]
    pub const fn with_max_expr_depth(mut self, depth: u32) -> Self {
        self.max_expr_depth = depth;
        self
    }

    #[must_use]
    pub fn with_grid(mut self, local: Vec<usize>, global: Vec<usize>) -> Self {
        self.local_size = local;
        self.global_size = global;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_size.len() != self.global_size.len() {
            return Err(GenError::InvalidOption(
                "local and global sizes must have the same number of dimensions".to_string(),
            ));
        }
        if self.local_size.is_empty() || self.local_size.len() > 3 {
            return Err(GenError::InvalidOption(format!(
                "grid must have 1 to 3 dimensions, got {}",
                self.local_size.len()
            )));
        }
        for (dim, (&l, &g)) in self.local_size.iter().zip(&self.global_size).enumerate() {
            if l == 0 || g % l != 0 {
                return Err(GenError::InvalidOption(format!(
                    "global size {g} is not a multiple of local size {l} in dimension {dim}"
                )));
            }
        }
        if self.atomics && self.max_atomic_regions == 0 {
            return Err(GenError::InvalidOption(
                "atomics need at least one region".to_string(),
            ));
        }
        Ok(())
    }

    /// Lanes per group.
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.local_size.iter().product()
    }

    #[must_use]
    pub fn total_threads(&self) -> usize {
        self.global_size.iter().product()
    }

    #[must_use]
    pub fn groups(&self) -> usize {
        self.global_size
            .iter()
            .zip(&self.local_size)
            .map(|(g, l)| g / l.max(&1))
            .product()
    }

    #[must_use]
    pub const fn features(&self) -> KernelFeatures {
        KernelFeatures {
            atomics: if self.atomics {
                Some(self.max_atomic_regions)
            } else {
                None
            },
            atomic_reductions: self.atomic_reductions,
            emi: self.emi,
            fake_divergence: self.fake_divergence,
            inter_thread_comm: self.inter_thread_comm,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    options: GenOptions,
    seed: Seed,
    rng: GenRng,
    lane_rng: GenRng,
    vars: Vec<Variable>,
    blocks: Vec<Block>,
    pub(crate) buffers: BufferArena,
    pub(crate) atomics: AtomicRegistry,
    pub(crate) globals: Globals,
    pub(crate) vector_tables: VectorTables,
    names: u32,
}

impl Session {
    #[must_use]
    pub fn new(options: GenOptions, seed: Seed) -> Self {
        let atomics = AtomicRegistry::new(options.max_atomic_regions);
        Self {
            rng: GenRng::new(seed),
            lane_rng: GenRng::new(seed.lane_stream()),
            seed,
            options,
            vars: Vec::new(),
            blocks: Vec::new(),
            buffers: BufferArena::default(),
            atomics,
            globals: Globals::new(),
            vector_tables: VectorTables::new(),
            names: 0,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &GenOptions {
        &self.options
    }

    #[must_use]
    pub const fn seed(&self) -> Seed {
        self.seed
    }

    /// Structural stream.
    pub fn rng(&mut self) -> &mut GenRng {
        &mut self.rng
    }

    /// Lane-value stream, untouched by structural draws.
    pub fn lane_rng(&mut self) -> &mut GenRng {
        &mut self.lane_rng
    }

    #[must_use]
    pub const fn atomics(&self) -> &AtomicRegistry {
        &self.atomics
    }

    pub fn atomics_mut(&mut self) -> &mut AtomicRegistry {
        &mut self.atomics
    }

    #[must_use]
    pub const fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Unique identifier `<prefix>_<n>`.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        self.names += 1;
        format!("{prefix}_{}", self.names)
    }

    pub fn add_var(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    /// Handles are only minted by this session, so lookups cannot miss.
    #[must_use]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i as u32), v))
    }

    pub fn new_block(&mut self, parent: Option<BlockId>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let depth = parent.map_or(0, |p| self.block(p).depth + 1);
        self.blocks.push(Block {
            id,
            parent,
            depth,
            stmts: Vec::new(),
            local_vars: Vec::new(),
        });
        id
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn push_stmt(&mut self, block: BlockId, stmt: Stmt) {
        self.block_mut(block).stmts.push(stmt);
    }

    /// Declare `var` in `block`: registers it as a block local and appends
    /// its declaration statement.
    pub fn declare(&mut self, block: BlockId, var: Variable) -> VarId {
        let id = self.add_var(var.in_block(block));
        let b = self.block_mut(block);
        b.local_vars.push(VarRef::Var(id));
        b.stmts.push(Stmt::Decl(id));
        id
    }

    #[must_use]
    pub fn buffer(&self, id: BufferId) -> &Buffer {
        self.buffers.get(id)
    }

    #[must_use]
    pub const fn buffers(&self) -> &BufferArena {
        &self.buffers
    }

    /// `true` when `ancestor` is `block` or encloses it.
    #[must_use]
    pub fn encloses(&self, ancestor: BlockId, block: BlockId) -> bool {
        let mut cur = Some(block);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.block(id).parent;
        }
        false
    }

    /// Everything readable from `block` in ordinary (non-atomic) code:
    /// locals of the block and its ancestors, then aggregate variables.
    #[must_use]
    pub fn scope_vars(&self, block: BlockId) -> Vec<VarRef> {
        let mut out = Vec::new();
        let mut cur = Some(block);
        while let Some(id) = cur {
            let b = self.block(id);
            out.extend(b.local_vars.iter().copied());
            cur = b.parent;
        }
        out.extend(
            self.globals
                .fields()
                .iter()
                .copied()
                .filter(|r| matches!(r, VarRef::Var(_))),
        );
        out
    }

    #[must_use]
    pub fn ref_type(&self, r: VarRef) -> Type {
        match r {
            VarRef::Var(id) => self.var(id).ty,
            VarRef::Buffer(id) => self.buffer(id).elem,
        }
    }

    /// Scalar, non-array reference: something `=` can target or read directly.
    #[must_use]
    pub fn is_plain_scalar(&self, r: VarRef) -> bool {
        match r {
            VarRef::Var(id) => {
                let v = self.var(id);
                !v.is_array() && !v.ty.is_vector()
            }
            VarRef::Buffer(id) => self.buffer(id).is_view() && !self.buffer(id).elem.is_vector(),
        }
    }

    pub fn render_var(&self, id: VarId, out: &mut String) {
        let var = self.var(id);
        if var.is_global {
            out.push_str(self.globals.pointer());
            out.push_str("->");
        }
        out.push_str(&var.name);
    }

    pub fn render_ref(&self, r: VarRef, out: &mut String) {
        match r {
            VarRef::Var(id) => self.render_var(id, out),
            VarRef::Buffer(id) => crate::buffer::render_access(self, id, out),
        }
    }
}
