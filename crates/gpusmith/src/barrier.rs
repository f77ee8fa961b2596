//! Barrier synthesis.
//!
//! Barriers are never generated inline. After the body is complete a
//! divergence analysis marks every block some lanes of a group may skip, and
//! [`synthesize`] inserts one gated barrier statement at the reconvergence
//! point of each such region: right after the statement owning it, inside
//! the nearest block every lane reaches.

use crate::block::{BlockId, Stmt};
use crate::buffer::{self, BufferId, MemorySpace};
use crate::error::{GenError, Result};
use crate::expr::{Expr, IdKind, Node, VarRef};
use crate::render::Emitter;
use crate::session::Session;
use crate::types::Type;
use crate::var::{VarId, Variable};
use std::collections::BTreeSet;

/// Unconditional group barrier.
pub fn output_barrier(em: &mut Emitter) {
    em.line("__syncthreads();");
}

/// Gated barrier: every lane mutates its own item of a shared buffer, waits,
/// then the lower half of the group folds in the item of its mirror lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierStmt {
    pub gate: VarId,
    pub buffer: BufferId,
    pub mutation: u32,
}

impl BarrierStmt {
    /// Fresh gate variable and a group-sized local buffer reached through
    /// the parameter aggregate.
    pub fn make_random(session: &mut Session, block: BlockId) -> Self {
        let gate_name = session.fresh_name("gate");
        let gate = session.add_var(Variable::new(gate_name, Type::int()).in_block(block));
        let name = session.fresh_name("l_barrier");
        let size = session.options().group_size();
        let buffer = session.create_buffer(
            MemorySpace::Local,
            name,
            Type::uint(),
            Some(Expr::uint(0)),
            vec![size],
        );
        session.add_global_buffer(buffer);
        let mutation = session.rng().rnd_upto(255) + 1;
        Self {
            gate,
            buffer,
            mutation,
        }
    }

    pub fn render(&self, session: &Session, em: &mut Emitter) {
        let gate = &session.var(self.gate).name;
        let item = buffer::owned_item(session, self.buffer);
        let mut root = String::new();
        buffer::render_access(session, self.buffer, &mut root);
        let local = IdKind::LinearLocal.call();
        let size = IdKind::LinearLocalSize.call();
        em.open();
        em.line(format!("int {gate} = {local} < ({size} / 2U);"));
        em.line(format!(
            "{item} ^= ({} * {}U);",
            IdKind::LinearGlobal.call(),
            self.mutation
        ));
        output_barrier(em);
        em.line(format!("if ({gate})"));
        em.indent();
        em.line(format!("{item} += {root}[{size} - 1U - {local}];"));
        em.dedent();
        output_barrier(em);
        em.close();
    }
}

/// Blocks entered by only part of a group.
#[derive(Debug, Clone, Default)]
pub struct DivergenceAnalysis {
    divergent: BTreeSet<BlockId>,
}

impl DivergenceAnalysis {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_divergent(&mut self, block: BlockId) {
        self.divergent.insert(block);
    }

    #[must_use]
    pub fn is_divergent(&self, block: BlockId) -> bool {
        self.divergent.contains(&block)
    }

    /// Region roots in block order.
    pub fn regions(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.divergent.iter().copied()
    }

    /// Every lane of a group reaches `block`: neither it nor any ancestor is
    /// a divergent region.
    #[must_use]
    pub fn is_uniform(&self, session: &Session, block: BlockId) -> bool {
        let mut cur = Some(block);
        while let Some(id) = cur {
            if self.divergent.contains(&id) {
                return false;
            }
            cur = session.block(id).parent;
        }
        true
    }

    /// Taint propagation over the body rooted at `root`.
    ///
    /// A branch is divergent when its condition reads a lane-varying id, an
    /// atomic, any buffer or a tainted variable. Assignments made in
    /// divergent code, or of tainted values, taint their target. Iterates
    /// until nothing changes so loops and later reads see earlier writes.
    #[must_use]
    pub fn analyze(session: &Session, root: BlockId) -> Self {
        let mut analysis = Self::new();
        let mut tainted = BTreeSet::new();
        loop {
            let before = (analysis.divergent.len(), tainted.len());
            analysis.walk(session, root, false, &mut tainted);
            if (analysis.divergent.len(), tainted.len()) == before {
                break;
            }
        }
        tracing::debug!(regions = analysis.divergent.len(), "divergence analysis");
        analysis
    }

    fn walk(
        &mut self,
        session: &Session,
        block: BlockId,
        divergent: bool,
        tainted: &mut BTreeSet<VarRef>,
    ) {
        for stmt in &session.block(block).stmts {
            match stmt {
                Stmt::Decl(id) => {
                    let init_tainted = session
                        .var(*id)
                        .init
                        .as_ref()
                        .is_some_and(|e| is_tainted(e, tainted));
                    if divergent || init_tainted {
                        tainted.insert(VarRef::Var(*id));
                    }
                }
                Stmt::Assign { target, value } => {
                    if divergent || is_tainted(value, tainted) {
                        tainted.insert(*target);
                    }
                }
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let split = is_tainted(cond, tainted);
                    for child in std::iter::once(*then_block).chain(*else_block) {
                        if split {
                            self.divergent.insert(child);
                        }
                        self.walk(session, child, divergent || split, tainted);
                    }
                }
                Stmt::For { body, .. } => self.walk(session, *body, divergent, tainted),
                Stmt::Block(child) => self.walk(session, *child, divergent, tainted),
                Stmt::Expr(_)
                | Stmt::Barrier(_)
                | Stmt::GroupBarrier
                | Stmt::AtomicResult(_) => {}
            }
        }
    }
}

fn is_tainted(expr: &Expr, tainted: &BTreeSet<VarRef>) -> bool {
    if expr.reads_lane_state() {
        return true;
    }
    let mut refs = Vec::new();
    expr.referenced_vars(&mut refs);
    refs.iter()
        .any(|r| matches!(r, VarRef::Buffer(_)) || tainted.contains(r))
}

/// Where a barrier went: inserted after statement `after` of `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BarrierPlacement {
    pub block: BlockId,
    pub after: usize,
}

/// Insert one barrier per reconvergence point of the divergent regions.
pub fn synthesize(
    analysis: &DivergenceAnalysis,
    session: &mut Session,
) -> Result<Vec<BarrierPlacement>> {
    let mut points = BTreeSet::new();
    for region in analysis.regions() {
        let mut child = region;
        let mut parent = session.block(region).parent;
        while let Some(p) = parent {
            if analysis.is_uniform(session, p) {
                break;
            }
            child = p;
            parent = session.block(p).parent;
        }
        let Some(block) = parent else {
            continue;
        };
        let after = session
            .block(block)
            .stmts
            .iter()
            .position(|s| s.child_blocks().contains(&child))
            .ok_or(GenError::DivergentBarrier { block: child.raw() })?;
        points.insert(BarrierPlacement { block, after });
    }

    // Back to front so earlier indices stay valid.
    for point in points.iter().rev() {
        let barrier = BarrierStmt::make_random(session, point.block);
        session
            .block_mut(point.block)
            .stmts
            .insert(point.after + 1, Stmt::Barrier(barrier));
        tracing::trace!(block = %point.block, after = point.after, "placed barrier");
    }
    Ok(points.into_iter().collect())
}

/// Every sync point reachable from `root` sits in a uniform block.
pub fn verify_placement(
    analysis: &DivergenceAnalysis,
    session: &Session,
    root: BlockId,
) -> Result<()> {
    let mut pending = vec![root];
    while let Some(block) = pending.pop() {
        for stmt in &session.block(block).stmts {
            if stmt.is_sync_point() && !analysis.is_uniform(session, block) {
                return Err(GenError::DivergentBarrier { block: block.raw() });
            }
            pending.extend(stmt.child_blocks());
        }
    }
    Ok(())
}
