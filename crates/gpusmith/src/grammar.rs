//! Statement and expression grammar.
//!
//! A deliberately small C subset: declarations, assignments, `if`, bounded
//! `for` loops and atomic regions; expressions over constants, variables,
//! overflow-free binary operators, thread ids, buffer reads and vectors.
//! Every operator is well defined for every operand, so a kernel's checksum
//! depends only on its semantics.

use crate::atomic;
use crate::atomic_result;
use crate::block::{BlockId, Stmt};
use crate::buffer::{BufferId, MemorySpace};
use crate::context::CgContext;
use crate::error::Result;
use crate::expr::{BinOp, Constant, Expr, IdKind, VarRef};
use crate::rng::DistributionTable;
use crate::session::Session;
use crate::types::{random_scalar_kind, random_vector_length, Qualifiers, ScalarKind, Type};
use crate::var::{VarId, Variable};
use crate::vector::VectorExpr;

/// Vector builtins provided by the runtime header, with their arity.
pub const VECTOR_BUILTINS: [(&str, usize); 8] = [
    ("max", 2),
    ("min", 2),
    ("clamp", 3),
    ("rotate", 2),
    ("hadd", 2),
    ("rhadd", 2),
    ("add_sat", 2),
    ("sub_sat", 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprKind {
    Constant,
    Variable,
    Binary,
    Vector,
    ThreadId,
    BufferRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtKind {
    Decl,
    Assign,
    If,
    For,
    AtomicIf,
}

/// Random expression of type `ty`.
pub fn make_random_expr(session: &mut Session, cx: &CgContext, ty: Type) -> Result<Expr> {
    if ty.is_vector() {
        return make_vector_operand(session, cx, ty);
    }
    let max = session.options().max_expr_depth;
    let kind = ty.element();
    if cx.expr_depth >= max {
        return Ok(leaf(session, cx, ty));
    }

    let mut table = DistributionTable::new()
        .with_entry(ExprKind::Constant, 30)
        .with_entry(ExprKind::Variable, 30)
        .with_entry(ExprKind::Binary, 30);
    if session.options().vectors && cx.expr_depth + 2 <= max {
        table.add_entry(ExprKind::Vector, 10);
    }
    if kind == ScalarKind::UInt && !cx.atomic_region {
        table.add_entry(ExprKind::ThreadId, 10);
    }
    if !cx.atomic_region && readable_buffers(session, ty).next().is_some() {
        table.add_entry(ExprKind::BufferRead, 10);
    }

    match table.sample(session.rng()).unwrap_or(ExprKind::Constant) {
        ExprKind::Constant => Ok(Expr::Constant(Constant::make_random(session.rng(), kind))),
        ExprKind::Variable => Ok(leaf(session, cx, ty)),
        ExprKind::Binary => binary(session, cx, ty),
        ExprKind::Vector => make_vector_expr(session, cx, ty),
        ExprKind::ThreadId => {
            let ids = [IdKind::LinearGlobal, IdKind::LinearLocal, IdKind::LinearGroup];
            let id = ids[session.rng().rnd_upto(3) as usize];
            Ok(Expr::Id(id))
        }
        ExprKind::BufferRead => buffer_read(session, ty),
    }
}

/// Vector expression reconciled to `ty`, produced at a random width.
pub fn make_vector_expr(session: &mut Session, cx: &CgContext, ty: Type) -> Result<Expr> {
    let size = random_vector_length(session.rng(), 0);
    let vector = VectorExpr::make_random(session, cx, ty, Qualifiers::default(), size)?;
    Ok(Expr::Vector(Box::new(vector)))
}

/// Operand of vector type: a variable, an element-wise binary or a nested
/// vector expression of the same width.
fn make_vector_operand(session: &mut Session, cx: &CgContext, ty: Type) -> Result<Expr> {
    let max = session.options().max_expr_depth;
    if cx.expr_depth + 2 > max {
        return vector_variable(session, cx, ty, Qualifiers::default());
    }
    match session.rng().rnd_upto(10) {
        0..=3 => vector_variable(session, cx, ty, Qualifiers::default()),
        4..=6 => binary(session, cx, ty),
        _ => {
            let vector = VectorExpr::make_random(
                session,
                &cx.deeper(),
                ty,
                Qualifiers::default(),
                ty.lanes(),
            )?;
            Ok(Expr::Vector(Box::new(vector)))
        }
    }
}

fn binary(session: &mut Session, cx: &CgContext, ty: Type) -> Result<Expr> {
    let ops = BinOp::safe_for(ty.element());
    let op = ops[session.rng().rnd_upto(ops.len() as u32) as usize];
    let inner = cx.deeper();
    let lhs = make_random_expr(session, &inner, ty)?;
    let rhs = make_random_expr(session, &inner, ty)?;
    Ok(Expr::binary(op, lhs, rhs, ty))
}

/// A readable variable of type `ty`, or a constant when there is none.
fn leaf(session: &mut Session, cx: &CgContext, ty: Type) -> Expr {
    match pick_readable(session, cx, ty) {
        Some(id) => Expr::Var(id),
        None => Expr::Constant(Constant::make_random(session.rng(), ty.element())),
    }
}

/// Random non-array variable of type `ty` readable at `cx`.
///
/// Inside an atomic region only variables the region declared itself are
/// candidates.
pub fn pick_readable(session: &mut Session, cx: &CgContext, ty: Type) -> Option<VarId> {
    let scope = if cx.atomic_region {
        session.visible_variables(cx.block)
    } else {
        session.scope_vars(cx.block)
    };
    let candidates: Vec<VarId> = scope
        .into_iter()
        .filter_map(|r| match r {
            VarRef::Var(id) => Some(id),
            VarRef::Buffer(_) => None,
        })
        .filter(|&id| {
            let v = session.var(id);
            v.ty == ty && !v.is_array()
        })
        .collect();
    session.rng().choose(&candidates).copied()
}

/// A vector variable of type `ty`: an existing one, or a fresh declaration
/// in the current block.
pub fn vector_variable(
    session: &mut Session,
    cx: &CgContext,
    ty: Type,
    quals: Qualifiers,
) -> Result<Expr> {
    if let Some(id) = pick_readable(session, cx, ty) {
        if session.rng().rnd_flip(70) {
            return Ok(Expr::Var(id));
        }
    }
    let value = i64::from(session.rng().rnd_upto(256));
    let init = VectorExpr::make_constant(ty, value)?;
    let name = session.fresh_name("l");
    let mut var = Variable::new(name, ty).with_init(Expr::Vector(Box::new(init)));
    var.quals = quals;
    let id = session.declare(cx.block, var);
    if cx.atomic_region {
        session.record_variable(VarRef::Var(id));
    }
    Ok(Expr::Var(id))
}

/// Call of a random vector builtin producing `ty`.
pub fn make_builtin(session: &mut Session, cx: &CgContext, ty: Type) -> Result<Expr> {
    let (name, arity) = VECTOR_BUILTINS[session.rng().rnd_upto(VECTOR_BUILTINS.len() as u32) as usize];
    let inner = cx.deeper();
    let args = (0..arity)
        .map(|_| make_random_expr(session, &inner, ty))
        .collect::<Result<Vec<_>>>()?;
    Ok(Expr::Builtin { name, args, ty })
}

fn readable_buffers(session: &Session, ty: Type) -> impl Iterator<Item = BufferId> + '_ {
    session
        .buffers()
        .roots()
        .filter(move |(_, b)| {
            matches!(b.space, MemorySpace::Private | MemorySpace::Constant) && b.elem == ty
        })
        .map(|(id, _)| id)
}

/// Element of a kernel-scope private or constant buffer at constant indices.
fn buffer_read(session: &mut Session, ty: Type) -> Result<Expr> {
    let roots: Vec<_> = readable_buffers(session, ty).collect();
    let Some(&root) = session.rng().choose(&roots) else {
        return Ok(Expr::Constant(Constant::make_random(session.rng(), ty.element())));
    };
    let dims = session.buffer(root).dims.clone();
    let indices: Vec<usize> = dims
        .iter()
        .map(|&d| session.rng().rnd_upto(d as u32) as usize)
        .collect();
    let view = session.itemize(root, &indices)?;
    Ok(Expr::Buffer(view))
}

fn random_decl_type(session: &mut Session) -> Type {
    let kind = random_scalar_kind(session.rng());
    if session.options().vectors && session.rng().rnd_flip(20) {
        let len = random_vector_length(session.rng(), 0);
        Type::vector(kind, len)
    } else {
        Type::Scalar(kind)
    }
}

/// Append between one and `max_block_size` random statements to `cx.block`.
pub fn fill_block(session: &mut Session, cx: &CgContext) -> Result<()> {
    let max = session.options().max_block_size;
    let count = 1 + session.rng().rnd_upto(max);
    for _ in 0..count {
        make_statement(session, cx)?;
    }
    Ok(())
}

/// New child block of `cx.block`, filled with random statements.
///
/// Inside an atomic region the block gets its own visibility frame.
pub fn make_random_block(session: &mut Session, cx: &CgContext) -> Result<BlockId> {
    let block = session.new_block(Some(cx.block));
    let inner = cx.enter(block);
    if cx.atomic_region {
        session.begin_region(block);
    }
    fill_block(session, &inner)?;
    if cx.atomic_region {
        session.end_region(block);
    }
    Ok(block)
}

fn make_statement(session: &mut Session, cx: &CgContext) -> Result<()> {
    let opts = session.options();
    let nest = session.block(cx.block).depth < opts.max_block_depth;
    let atomics = opts.atomics && !cx.atomic_region && session.atomics().remaining() > 0;

    let mut table = DistributionTable::new()
        .with_entry(StmtKind::Decl, 35)
        .with_entry(StmtKind::Assign, 30);
    if nest {
        table.add_entry(StmtKind::If, 15);
        table.add_entry(StmtKind::For, 10);
        if atomics {
            table.add_entry(StmtKind::AtomicIf, 10);
        }
    }

    match table.sample(session.rng()).unwrap_or(StmtKind::Decl) {
        StmtKind::Decl => make_decl(session, cx),
        StmtKind::Assign => make_assign(session, cx),
        StmtKind::If => make_if(session, cx),
        StmtKind::For => make_for(session, cx),
        StmtKind::AtomicIf => make_atomic_if(session, cx),
    }
}

fn make_decl(session: &mut Session, cx: &CgContext) -> Result<()> {
    let name = session.fresh_name("l");
    let var = if session.rng().rnd_flip(10) {
        let len = 2 + session.rng().rnd_upto(3) as usize;
        let init = Expr::uint(session.rng().rnd_upto(256));
        Variable::new(name, Type::uint())
            .with_dims(vec![len])
            .with_init(init)
    } else {
        let ty = random_decl_type(session);
        let init = make_random_expr(session, cx, ty)?;
        Variable::new(name, ty).with_init(init)
    };
    let id = session.declare(cx.block, var);
    if cx.atomic_region {
        session.record_variable(VarRef::Var(id));
    }
    Ok(())
}

fn make_assign(session: &mut Session, cx: &CgContext) -> Result<()> {
    let scope = if cx.atomic_region {
        session.visible_variables(cx.block)
    } else {
        session.scope_vars(cx.block)
    };
    let targets: Vec<VarId> = scope
        .into_iter()
        .filter_map(|r| match r {
            VarRef::Var(id) if !session.var(id).is_array() && !session.var(id).quals.is_const => {
                Some(id)
            }
            _ => None,
        })
        .collect();
    let Some(&target) = session.rng().choose(&targets) else {
        return make_decl(session, cx);
    };
    let ty = session.var(target).ty;
    let value = make_random_expr(session, cx, ty)?;
    session.push_stmt(
        cx.block,
        Stmt::Assign {
            target: VarRef::Var(target),
            value,
        },
    );
    Ok(())
}

fn make_if(session: &mut Session, cx: &CgContext) -> Result<()> {
    let cond = if !cx.atomic_region && session.rng().rnd_flip(30) {
        let group = session.options().group_size() as u32;
        let bound = session.rng().rnd_upto(group);
        Expr::binary(
            BinOp::Lt,
            Expr::Id(IdKind::LinearLocal),
            Expr::uint(bound),
            Type::int(),
        )
    } else {
        make_random_expr(session, cx, Type::int())?
    };
    let then_block = make_random_block(session, cx)?;
    let else_block = if session.rng().rnd_flip(50) {
        Some(make_random_block(session, cx)?)
    } else {
        None
    };
    session.push_stmt(
        cx.block,
        Stmt::If {
            cond,
            then_block,
            else_block,
        },
    );
    Ok(())
}

fn make_for(session: &mut Session, cx: &CgContext) -> Result<()> {
    let name = session.fresh_name("i");
    let var = session.add_var(Variable::new(name, Type::int()).in_block(cx.block));
    let trips = 1 + session.rng().rnd_upto(4);
    let body = make_random_block(session, cx)?;
    session.push_stmt(cx.block, Stmt::For { var, trips, body });
    Ok(())
}

/// `if (atomic == literal) { ... }` whose body only touches its own
/// variables and ends by folding them into the special-value lane.
fn make_atomic_if(session: &mut Session, cx: &CgContext) -> Result<()> {
    let (cond, condition) = atomic::make_condition(session, cx, Type::int())?;
    let body = session.new_block(Some(cx.block));
    let inner = cx.enter(body).atomic();
    session.begin_region(body);
    fill_block(session, &inner)?;
    atomic_result::finish_region(session, &inner, &condition)?;
    session.end_region(body);
    session.push_stmt(
        cx.block,
        Stmt::If {
            cond,
            then_block: body,
            else_block: None,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Node;
    use crate::rng::Seed;
    use crate::session::GenOptions;

    fn session(options: GenOptions, seed: u64) -> (Session, CgContext) {
        let mut s = Session::new(options, Seed::from_u64(seed));
        let root = s.new_block(None);
        (s, CgContext::new(root))
    }

    #[test]
    fn expressions_have_requested_type() {
        let (mut s, cx) = session(GenOptions::default().with_vectors(), 12);
        for kind in ScalarKind::ALL {
            let ty = Type::Scalar(kind);
            let e = make_random_expr(&mut s, &cx, ty).unwrap();
            assert_eq!(e.ty(&s), ty, "{}", e.to_source(&s));
        }
        let v = Type::vector(ScalarKind::Int, 4);
        assert_eq!(make_random_expr(&mut s, &cx, v).unwrap().ty(&s), v);
    }

    #[test]
    fn atomic_region_reads_only_region_vars() {
        let (mut s, cx) = session(GenOptions::default(), 13);
        let outer = s.declare(cx.block, Variable::new("l_0", Type::int()).with_init(Expr::constant(ScalarKind::Int, 1)));
        let body = s.new_block(Some(cx.block));
        s.begin_region(body);
        let inner = cx.enter(body).atomic();
        for _ in 0..50 {
            assert_ne!(pick_readable(&mut s, &inner, Type::int()), Some(outer));
        }
        s.end_region(body);
    }

    #[test]
    fn builtin_arity_matches_table() {
        let (mut s, cx) = session(GenOptions::default().with_vectors(), 14);
        let ty = Type::vector(ScalarKind::UInt, 2);
        for _ in 0..16 {
            let Expr::Builtin { name, args, .. } = make_builtin(&mut s, &cx, ty).unwrap() else {
                panic!("expected builtin");
            };
            let arity = VECTOR_BUILTINS.iter().find(|(n, _)| *n == name).unwrap().1;
            assert_eq!(args.len(), arity);
        }
    }

    #[test]
    fn blocks_respect_depth_budget() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(4), 15);
        fill_block(&mut s, &cx).unwrap();
        let max = s.options().max_block_depth;
        assert!(s.blocks().all(|b| b.depth <= max));
    }

    #[test]
    fn atomic_if_closes_with_special_value() {
        let (mut s, cx) = session(GenOptions::default().with_atomics(2), 16);
        make_atomic_if(&mut s, &cx).unwrap();
        let Some(Stmt::If { then_block, .. }) = s.block(cx.block).stmts.last() else {
            panic!("expected if");
        };
        let last = s.block(*then_block).stmts.last().unwrap();
        assert!(matches!(
            last,
            Stmt::AtomicResult(crate::atomic_result::AtomicResultStmt::SetSpecialValue { .. })
        ));
        assert!(!s.atomics().visibility().is_active());
    }
}
