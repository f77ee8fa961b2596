//! Closing statements of an atomic region body.
//!
//! The body folds every region variable it can see into one accumulator and
//! adds that to the region's special-value lane. Only lanes that won the
//! atomic condition reach these statements, and they all compute the same
//! accumulator, so the lane total is a function of the winner count alone.

use crate::atomic::{self, AtomicCondition};
use crate::block::Stmt;
use crate::buffer::{self, BufferId};
use crate::context::CgContext;
use crate::error::Result;
use crate::expr::{Expr, Node, VarRef};
use crate::render::Emitter;
use crate::session::Session;
use crate::types::Type;
use crate::var::{VarId, Variable};

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicResultStmt {
    /// `uint atomic_result_N = 0U;`
    Decl { result: VarId },
    /// `result += var;`
    AddVar { result: VarId, var: VarId },
    /// Sum of every element of an array variable.
    AddArrVar { result: VarId, var: VarId },
    /// `atomicAdd(&special_value_lane, result);`
    SetSpecialValue { condition: u32, target: BufferId },
}

impl AtomicResultStmt {
    pub fn render(&self, session: &Session, em: &mut Emitter) {
        match *self {
            Self::Decl { result } => {
                let var = session.var(result);
                em.line(format!("{} {} = 0U;", var.ty, var.name));
            }
            Self::AddVar { result, var } => {
                let mut rhs = String::new();
                session.render_var(var, &mut rhs);
                em.line(format!("{} += {rhs};", session.var(result).name));
            }
            Self::AddArrVar { result, var } => {
                let v = session.var(var);
                let mut base = String::new();
                session.render_var(var, &mut base);
                em.line(format!("for (i = 0; i < {}; i++)", v.element_count()));
                em.indent();
                em.line(format!(
                    "{} += (({} *){base})[i];",
                    session.var(result).name,
                    v.ty
                ));
                em.dedent();
            }
            Self::SetSpecialValue { condition, target } => {
                let mut lane = String::new();
                buffer::render_access(session, target, &mut lane);
                let values = session.atomics().special_values(condition);
                let sum = if values.is_empty() {
                    "0U".to_string()
                } else {
                    values
                        .iter()
                        .map(|e| e.to_source(session))
                        .collect::<Vec<_>>()
                        .join(" + ")
                };
                em.line(format!("atomicAdd(&{lane}, {sum});"));
            }
        }
    }
}

/// Append the accumulator statements to the region body `cx.block`.
pub fn finish_region(
    session: &mut Session,
    cx: &CgContext,
    condition: &AtomicCondition,
) -> Result<()> {
    let block = cx.block;
    let name = session.fresh_name("atomic_result");
    let result = session.add_var(Variable::new(name, Type::uint()).in_block(block));
    session.push_stmt(block, Stmt::AtomicResult(AtomicResultStmt::Decl { result }));

    for visible in session.visible_variables(block) {
        let VarRef::Var(var) = visible else {
            continue;
        };
        let v = session.var(var);
        if v.ty.is_vector() {
            continue;
        }
        let stmt = if v.is_array() {
            AtomicResultStmt::AddArrVar { result, var }
        } else {
            AtomicResultStmt::AddVar { result, var }
        };
        session.push_stmt(block, Stmt::AtomicResult(stmt));
    }

    session.record_special_value(condition.id, Expr::Var(result));
    let target = atomic::special_value_view(session, condition.access, block)?;
    session.push_stmt(
        block,
        Stmt::AtomicResult(AtomicResultStmt::SetSpecialValue {
            condition: condition.id,
            target,
        }),
    );
    tracing::trace!(region = condition.id, %block, "closed atomic region");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::{AccessClass, AtomicAccess, AtomicOp};
    use crate::block::render_block;
    use crate::rng::Seed;
    use crate::session::GenOptions;
    use pretty_assertions::assert_eq;

    #[test]
    fn region_folds_visible_vars_into_special_lane() {
        let mut s = Session::new(GenOptions::default().with_atomics(2), Seed::from_u64(5));
        let root = s.new_block(None);
        let body = s.new_block(Some(root));
        // declared outside the region, must not be folded in
        s.declare(root, Variable::new("l_0", Type::uint()).with_init(Expr::uint(1)));
        s.begin_region(body);
        let x = s.declare(body, Variable::new("l_1", Type::uint()).with_init(Expr::uint(3)));
        let arr = s.declare(
            body,
            Variable::new("l_2", Type::uint())
                .with_dims(vec![2])
                .with_init(Expr::uint(0)),
        );
        s.record_variable(VarRef::Var(x));
        s.record_variable(VarRef::Var(arr));

        let condition = AtomicCondition {
            id: 1,
            access: AtomicAccess::new(1, AccessClass::Local),
            op: AtomicOp::Inc,
            literal: 0,
        };
        finish_region(&mut s, &CgContext::new(body).atomic(), &condition).unwrap();
        s.end_region(body);

        let mut em = Emitter::new();
        render_block(&s, body, &mut em);
        assert_eq!(
            em.finish(),
            "{\n    uint l_1 = 3U;\n    uint l_2[2] = {0U, 0U};\n    uint atomic_result_1 = 0U;\n    \
             atomic_result_1 += l_1;\n    for (i = 0; i < 2; i++)\n        \
             atomic_result_1 += ((uint *)l_2)[i];\n    \
             atomicAdd(&l_special_values[1], atomic_result_1);\n}\n"
        );
        assert_eq!(s.atomics().local_sv_mems().len(), 1);
    }

    #[test]
    fn empty_special_values_add_zero() {
        let mut s = Session::new(GenOptions::default().with_atomics(2), Seed::from_u64(5));
        let pool = s.create_buffer(
            crate::buffer::MemorySpace::Local,
            "l_special_values",
            Type::uint(),
            None,
            vec![2],
        );
        let target = s.itemize(pool, &[0]).unwrap();
        let mut em = Emitter::new();
        AtomicResultStmt::SetSpecialValue { condition: 7, target }.render(&s, &mut em);
        assert_eq!(em.finish(), "atomicAdd(&l_special_values[0], 0U);\n");
    }
}
