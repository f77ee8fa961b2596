//! Atomic expressions and the session-wide counter pool.
//!
//! Each atomic expression claims one counter lane. Global counters are
//! indexed per group (`group * regions + lane`), local ones by lane alone.
//! Every lane has a paired special-value slot: atomic region bodies fold
//! their result into it, and the kernel hashes those slots at the end.

use crate::block::BlockId;
use crate::buffer::{BufferId, MemorySpace};
use crate::context::CgContext;
use crate::error::{GenError, Result};
use crate::expr::{BinOp, Expr, IdKind, Node, VarRef};
use crate::params::KernelParam;
use crate::render::Emitter;
use crate::session::Session;
use crate::types::Type;
use crate::visibility::VisibilityStack;
use crate::{barrier, buffer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bound passed to `atomicInc`/`atomicDec`; wraps only at the type limit.
const WRAP_BOUND: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicOp {
    Add,
    Sub,
    Inc,
    Dec,
    Xchg,
    Cmpxchg,
    Min,
    Max,
    And,
    Or,
    Xor,
}

impl AtomicOp {
    pub const ALL: [Self; 11] = [
        Self::Add,
        Self::Sub,
        Self::Inc,
        Self::Dec,
        Self::Xchg,
        Self::Cmpxchg,
        Self::Min,
        Self::Max,
        Self::And,
        Self::Or,
        Self::Xor,
    ];

    #[must_use]
    pub const fn operand_count(self) -> usize {
        match self {
            Self::Inc | Self::Dec => 0,
            Self::Cmpxchg => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub const fn intrinsic(self) -> &'static str {
        match self {
            Self::Add => "atomicAdd",
            Self::Sub => "atomicSub",
            Self::Inc => "atomicInc",
            Self::Dec => "atomicDec",
            Self::Xchg => "atomicExch",
            Self::Cmpxchg => "atomicCAS",
            Self::Min => "atomicMin",
            Self::Max => "atomicMax",
            Self::And => "atomicAnd",
            Self::Or => "atomicOr",
            Self::Xor => "atomicXor",
        }
    }

    /// New counter value after one application to `old`.
    #[must_use]
    pub fn apply(self, old: u32, operands: &[u32]) -> u32 {
        let v = operands.first().copied().unwrap_or(0);
        match self {
            Self::Add => old.wrapping_add(v),
            Self::Sub => old.wrapping_sub(v),
            Self::Inc => {
                if old >= WRAP_BOUND {
                    0
                } else {
                    old + 1
                }
            }
            Self::Dec => {
                if old == 0 || old > WRAP_BOUND {
                    WRAP_BOUND
                } else {
                    old - 1
                }
            }
            Self::Xchg => v,
            Self::Cmpxchg => {
                let new = operands.get(1).copied().unwrap_or(0);
                if old == v {
                    new
                } else {
                    old
                }
            }
            Self::Min => old.min(v),
            Self::Max => old.max(v),
            Self::And => old & v,
            Self::Or => old | v,
            Self::Xor => old ^ v,
        }
    }

    /// Value returned to the `k`-th lane (0-based) to reach a counter that
    /// started at zero.
    #[must_use]
    pub fn kth_result(self, operands: &[u32], k: u32) -> u32 {
        (0..k).fold(0, |cur, _| self.apply(cur, operands))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessClass {
    Global,
    Local,
}

/// Immutable (lane, class) pair locating one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomicAccess {
    offset: u32,
    class: AccessClass,
}

impl AtomicAccess {
    #[must_use]
    pub const fn new(offset: u32, class: AccessClass) -> Self {
        Self { offset, class }
    }

    #[must_use]
    pub const fn offset(self) -> u32 {
        self.offset
    }

    #[must_use]
    pub const fn class(self) -> AccessClass {
        self.class
    }

    /// Index into the counter array for a pool of `regions` lanes per group.
    #[must_use]
    pub fn index_expr(self, regions: usize) -> Expr {
        match self.class {
            AccessClass::Global => Expr::binary(
                BinOp::Add,
                Expr::binary(
                    BinOp::Mul,
                    Expr::Id(IdKind::LinearGroup),
                    Expr::uint(regions as u32),
                    Type::uint(),
                ),
                Expr::uint(self.offset),
                Type::uint(),
            ),
            AccessClass::Local => Expr::uint(self.offset),
        }
    }
}

/// `atomicOp(&counter, operands...)`
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicExpr {
    pub op: AtomicOp,
    pub access: AtomicAccess,
    /// View of the counter this expression mutates.
    pub counter: BufferId,
    pub operands: Vec<Expr>,
}

impl AtomicExpr {
    /// Literal operand values.
    #[must_use]
    pub fn operand_values(&self) -> Vec<u32> {
        self.operands
            .iter()
            .map(|e| match e {
                Expr::Constant(c) => c.value as u32,
                _ => 0,
            })
            .collect()
    }
}

impl Node for AtomicExpr {
    fn render(&self, session: &Session, out: &mut String) {
        out.push_str(self.op.intrinsic());
        out.push_str("(&");
        buffer::render_access(session, self.counter, out);
        for operand in &self.operands {
            out.push_str(", ");
            operand.render(session, out);
        }
        if matches!(self.op, AtomicOp::Inc | AtomicOp::Dec) {
            out.push_str(", ");
            out.push_str(&Expr::uint(WRAP_BOUND).to_source(session));
        }
        out.push(')');
    }

    fn referenced_vars(&self, out: &mut Vec<VarRef>) {
        out.push(VarRef::Buffer(self.counter));
    }

    fn eval_subexprs<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        out.extend(self.operands.iter());
    }

    fn complexity(&self) -> u32 {
        1 + self.operands.len() as u32
    }
}

/// An atomic equality test guarding a region body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicCondition {
    /// Counter lane, doubling as the region id.
    pub id: u32,
    pub access: AtomicAccess,
    pub op: AtomicOp,
    pub literal: u32,
}

/// Session-wide atomic bookkeeping.
#[derive(Debug, Clone)]
pub struct AtomicRegistry {
    max_regions: usize,
    next_lane: usize,
    global_counters: Option<BufferId>,
    global_specials: Option<BufferId>,
    local_counters: Option<BufferId>,
    local_specials: Option<BufferId>,
    global_mems: Vec<BufferId>,
    global_sv_mems: Vec<BufferId>,
    local_mems: Vec<BufferId>,
    local_sv_mems: Vec<BufferId>,
    special_values: BTreeMap<u32, Vec<Expr>>,
    pub(crate) visibility: VisibilityStack,
}

impl AtomicRegistry {
    #[must_use]
    pub fn new(max_regions: usize) -> Self {
        Self {
            max_regions,
            next_lane: 0,
            global_counters: None,
            global_specials: None,
            local_counters: None,
            local_specials: None,
            global_mems: Vec::new(),
            global_sv_mems: Vec::new(),
            local_mems: Vec::new(),
            local_sv_mems: Vec::new(),
            special_values: BTreeMap::new(),
            visibility: VisibilityStack::new(),
        }
    }

    #[must_use]
    pub const fn max_regions(&self) -> usize {
        self.max_regions
    }

    /// Counter lanes claimed so far.
    #[must_use]
    pub const fn regions_used(&self) -> usize {
        self.next_lane
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.max_regions.saturating_sub(self.next_lane)
    }

    #[must_use]
    pub fn global_mems(&self) -> &[BufferId] {
        &self.global_mems
    }

    #[must_use]
    pub fn sv_mems(&self) -> &[BufferId] {
        &self.global_sv_mems
    }

    #[must_use]
    pub fn local_mems(&self) -> &[BufferId] {
        &self.local_mems
    }

    #[must_use]
    pub fn local_sv_mems(&self) -> &[BufferId] {
        &self.local_sv_mems
    }

    #[must_use]
    pub fn has_sv_mems(&self) -> bool {
        !self.global_sv_mems.is_empty()
    }

    #[must_use]
    pub fn has_local_sv_mems(&self) -> bool {
        !self.local_sv_mems.is_empty()
    }

    /// Expressions recorded for region `condition`.
    #[must_use]
    pub fn special_values(&self, condition: u32) -> &[Expr] {
        self.special_values
            .get(&condition)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub const fn visibility(&self) -> &VisibilityStack {
        &self.visibility
    }
}

impl Session {
    /// Remember that `expr` is what region `condition` folds into its
    /// special-value slot.
    pub fn record_special_value(&mut self, condition: u32, expr: Expr) {
        self.atomics
            .special_values
            .entry(condition)
            .or_default()
            .push(expr);
    }
}

/// Root array of the pool for `class`, created on first use.
fn pool_root(session: &mut Session, class: AccessClass, special: bool) -> BufferId {
    let existing = match (class, special) {
        (AccessClass::Global, false) => session.atomics.global_counters,
        (AccessClass::Global, true) => session.atomics.global_specials,
        (AccessClass::Local, false) => session.atomics.local_counters,
        (AccessClass::Local, true) => session.atomics.local_specials,
    };
    if let Some(id) = existing {
        return id;
    }
    let regions = session.atomics.max_regions;
    let id = match class {
        AccessClass::Global => {
            let param = if special {
                KernelParam::SpecialValues
            } else {
                KernelParam::AtomicInput
            };
            let dims = vec![regions * session.options().groups()];
            let id = session.create_buffer(MemorySpace::Global, param.name(), param.elem(), None, dims);
            session.bind_param(id, param);
            id
        }
        AccessClass::Local => {
            let name = if special {
                "l_special_values"
            } else {
                "l_atomic_input"
            };
            session.create_buffer(
                MemorySpace::Local,
                name,
                Type::uint(),
                Some(Expr::uint(0)),
                vec![regions],
            )
        }
    };
    // Special-value slots are hashed lane by lane in `emit_hashing`; counters never are.
    session.exclude_from_hash(id);
    let registry = &mut session.atomics;
    match (class, special) {
        (AccessClass::Global, false) => registry.global_counters = Some(id),
        (AccessClass::Global, true) => registry.global_specials = Some(id),
        (AccessClass::Local, false) => registry.local_counters = Some(id),
        (AccessClass::Local, true) => registry.local_specials = Some(id),
    }
    id
}

/// View of the pool element at `access`, scoped to `block`.
fn pool_view(
    session: &mut Session,
    access: AtomicAccess,
    special: bool,
    block: BlockId,
) -> Result<BufferId> {
    let root = pool_root(session, access.class(), special);
    let regions = session.atomics.max_regions;
    let view = match access.class() {
        AccessClass::Global => session.itemize_expr(root, vec![access.index_expr(regions)], block)?,
        AccessClass::Local => session.itemize(root, &[access.offset() as usize])?,
    };
    let registry = &mut session.atomics;
    let list = match (access.class(), special) {
        (AccessClass::Global, false) => &mut registry.global_mems,
        (AccessClass::Global, true) => &mut registry.global_sv_mems,
        (AccessClass::Local, false) => &mut registry.local_mems,
        (AccessClass::Local, true) => &mut registry.local_sv_mems,
    };
    list.push(view);
    Ok(view)
}

/// Special-value slot paired with `access`.
pub fn special_value_view(
    session: &mut Session,
    access: AtomicAccess,
    block: BlockId,
) -> Result<BufferId> {
    pool_view(session, access, true, block)
}

/// Random atomic expression on a fresh counter lane.
///
/// The requested type only matters to callers comparing the result; every
/// counter is `uint`.
pub fn make_random(session: &mut Session, cx: &CgContext, _ty: Type) -> Result<AtomicExpr> {
    if !session.options().atomics {
        return Err(GenError::InvalidOption("atomics are disabled".to_string()));
    }
    let limit = session.atomics.max_regions;
    if session.atomics.next_lane >= limit {
        return Err(GenError::AtomicRegionLimit { limit });
    }
    let lane = session.atomics.next_lane as u32;
    session.atomics.next_lane += 1;

    let class = if session.options().local_atomics && session.rng().rnd_flip(50) {
        AccessClass::Local
    } else {
        AccessClass::Global
    };
    let access = AtomicAccess::new(lane, class);
    let op = AtomicOp::ALL[session.rng().rnd_upto(AtomicOp::ALL.len() as u32) as usize];
    let operands = (0..op.operand_count())
        .map(|i| {
            // A zero compare value lets cmpxchg swap on first contact.
            let value = if op == AtomicOp::Cmpxchg && i == 0 && session.rng().rnd_flip(50) {
                0
            } else {
                session.rng().rnd_upto(16) + 1
            };
            Expr::uint(value)
        })
        .collect();
    let counter = pool_view(session, access, false, cx.block)?;
    tracing::debug!(?op, lane, ?class, "atomic expression");
    Ok(AtomicExpr {
        op,
        access,
        counter,
        operands,
    })
}

/// `atomic == literal`, where `literal` is a value the counter actually
/// hands out to some lane of a group.
pub fn make_condition(
    session: &mut Session,
    cx: &CgContext,
    ty: Type,
) -> Result<(Expr, AtomicCondition)> {
    let atomic = make_random(session, cx, ty)?;
    let group = session.options().group_size().max(1) as u32;
    let k = session.rng().rnd_upto(group);
    let literal = atomic.op.kth_result(&atomic.operand_values(), k);
    let condition = AtomicCondition {
        id: atomic.access.offset(),
        access: atomic.access,
        op: atomic.op,
        literal,
    };
    let expr = Expr::binary(
        BinOp::Eq,
        Expr::Atomic(Box::new(atomic)),
        Expr::uint(literal),
        ty,
    );
    Ok((expr, condition))
}

/// Put every touched pool root into the parameter aggregate.
pub fn add_vars_to_globals(session: &mut Session) {
    let registry = &session.atomics;
    let roots = [
        (!registry.global_mems.is_empty(), registry.global_counters),
        (registry.has_sv_mems(), registry.global_specials),
        (!registry.local_mems.is_empty(), registry.local_counters),
        (registry.has_local_sv_mems(), registry.local_specials),
    ];
    for (used, root) in roots {
        if let (true, Some(id)) = (used, root) {
            session.add_global_buffer(id);
        }
    }
}

/// Checksum this group's special-value slots. Starts with a group barrier
/// so every region has folded its value in.
pub fn emit_hashing(session: &Session, em: &mut Emitter) {
    let registry = &session.atomics;
    if !registry.has_sv_mems() && !registry.has_local_sv_mems() {
        return;
    }
    barrier::output_barrier(em);
    let regions = registry.max_regions;
    let pointer = session.globals().pointer();
    let mut slots = Vec::new();
    if let (true, Some(id)) = (registry.has_sv_mems(), registry.global_specials) {
        slots.push(format!(
            "{pointer}->{}[{} * {regions}U + i]",
            session.buffer(id).name,
            IdKind::LinearGroup.call()
        ));
    }
    if let (true, Some(id)) = (registry.has_local_sv_mems(), registry.local_specials) {
        slots.push(format!("{pointer}->{}[i]", session.buffer(id).name));
    }
    for slot in slots {
        em.line(format!("for (i = 0; i < {regions}; i++)"));
        em.indent();
        em.line(format!("transparent_crc({slot}, \"{slot}\", print_hash_value);"));
        em.dedent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Seed;
    use crate::session::GenOptions;
    use pretty_assertions::assert_eq;

    fn session(options: GenOptions) -> (Session, CgContext) {
        let mut s = Session::new(options, Seed::from_u64(21));
        let root = s.new_block(None);
        (s, CgContext::new(root))
    }

    #[test]
    fn operand_counts() {
        assert_eq!(AtomicOp::Inc.operand_count(), 0);
        assert_eq!(AtomicOp::Dec.operand_count(), 0);
        assert_eq!(AtomicOp::Cmpxchg.operand_count(), 2);
        assert_eq!(AtomicOp::Xor.operand_count(), 1);
    }

    #[test]
    fn kth_results_follow_counter_semantics() {
        assert_eq!(AtomicOp::Add.kth_result(&[3], 4), 12);
        assert_eq!(AtomicOp::Sub.kth_result(&[2], 1), u32::MAX - 1);
        assert_eq!(AtomicOp::Inc.kth_result(&[], 5), 5);
        assert_eq!(AtomicOp::Dec.kth_result(&[], 0), 0);
        assert_eq!(AtomicOp::Dec.kth_result(&[], 2), u32::MAX - 1);
        assert_eq!(AtomicOp::Xchg.kth_result(&[7], 0), 0);
        assert_eq!(AtomicOp::Xchg.kth_result(&[7], 3), 7);
        assert_eq!(AtomicOp::Cmpxchg.kth_result(&[0, 9], 1), 9);
        assert_eq!(AtomicOp::Cmpxchg.kth_result(&[5, 9], 3), 0);
        assert_eq!(AtomicOp::Xor.kth_result(&[6], 2), 0);
        assert_eq!(AtomicOp::Min.kth_result(&[6], 10), 0);
    }

    #[test]
    fn global_access_index() {
        let (s, _) = session(GenOptions::default());
        let access = AtomicAccess::new(2, AccessClass::Global);
        assert_eq!(
            access.index_expr(4).to_source(&s),
            "((get_linear_group_id() * 4U) + 2U)"
        );
        assert_eq!(AtomicAccess::new(2, AccessClass::Local).index_expr(4).to_source(&s), "2U");
    }

    #[test]
    fn region_limit_is_fatal() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(2));
        make_random(&mut s, &cx, Type::int()).unwrap();
        make_random(&mut s, &cx, Type::int()).unwrap();
        let err = make_random(&mut s, &cx, Type::int()).unwrap_err();
        assert!(matches!(err, GenError::AtomicRegionLimit { limit: 2 }));
        assert_eq!(s.atomics().remaining(), 0);
    }

    #[test]
    fn counters_land_in_one_list_each() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(6).with_local_atomics());
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(make_random(&mut s, &cx, Type::int()).unwrap().counter);
        }
        let reg = s.atomics();
        for id in seen {
            let hits = [reg.global_mems(), reg.local_mems(), reg.sv_mems(), reg.local_sv_mems()]
                .iter()
                .filter(|list| list.contains(&id))
                .count();
            assert_eq!(hits, 1);
        }
        assert!(!reg.has_sv_mems());
    }

    #[test]
    fn atomic_renders_intrinsic() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(4));
        let e = make_random(&mut s, &cx, Type::int()).unwrap();
        let text = e.to_source(&s);
        assert!(text.starts_with(e.op.intrinsic()));
        assert!(text.contains("g_atomic_input[((get_linear_group_id() * 4U) + 0U)]"));
    }

    #[test]
    fn condition_literal_is_reachable() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(8));
        for _ in 0..8 {
            let (expr, cond) = make_condition(&mut s, &cx, Type::int()).unwrap();
            let Expr::Binary { lhs, .. } = &expr else {
                panic!("expected comparison")
            };
            let Expr::Atomic(atomic) = lhs.as_ref() else {
                panic!("expected atomic")
            };
            let group = s.options().group_size() as u32;
            assert!((0..group).any(|k| atomic.op.kth_result(&atomic.operand_values(), k)
                == cond.literal));
        }
    }

    #[test]
    fn hashing_only_when_special_values_used() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(4));
        make_random(&mut s, &cx, Type::int()).unwrap();
        let mut em = Emitter::new();
        emit_hashing(&s, &mut em);
        assert_eq!(em.finish(), "");

        let access = AtomicAccess::new(0, AccessClass::Global);
        special_value_view(&mut s, access, cx.block).unwrap();
        add_vars_to_globals(&mut s);
        let mut em = Emitter::new();
        emit_hashing(&s, &mut em);
        let text = em.finish();
        assert!(text.starts_with("__syncthreads();\n"));
        assert!(text.contains("p_0->g_special_values[get_linear_group_id() * 4U + i]"));
        let root = s.buffer(s.atomics().sv_mems()[0]).collective.unwrap();
        assert!(s.globals().contains(VarRef::Buffer(root)));
    }

    #[test]
    fn disabled_atomics_are_rejected() {
        let (mut s, cx) = session(GenOptions::default());
        assert!(matches!(
            make_random(&mut s, &cx, Type::int()),
            Err(GenError::InvalidOption(_))
        ));
    }

    #[test]
    fn special_values_are_recorded_per_condition() {
        let (mut s, _) = session(GenOptions::default().with_atomics(4));
        s.record_special_value(1, Expr::uint(3));
        s.record_special_value(1, Expr::uint(4));
        assert_eq!(s.atomics().special_values(1).len(), 2);
        assert!(s.atomics().special_values(0).is_empty());
    }
}
