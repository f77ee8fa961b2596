//! Lexical blocks and statements.

use crate::atomic_result::AtomicResultStmt;
use crate::barrier::{self, BarrierStmt};
use crate::expr::{Expr, Node, VarRef};
use crate::render::{array_initializer, dims_suffix, Emitter};
use crate::session::Session;
use crate::var::VarId;

/// Handle into the session's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub parent: Option<BlockId>,
    /// 0 for the kernel body.
    pub depth: u32,
    pub stmts: Vec<Stmt>,
    /// Variables and buffer views declared in this block.
    pub local_vars: Vec<VarRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl(VarId),
    Assign {
        target: VarRef,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: BlockId,
        else_block: Option<BlockId>,
    },
    For {
        var: VarId,
        trips: u32,
        body: BlockId,
    },
    Block(BlockId),
    Barrier(BarrierStmt),
    /// Unconditional group barrier.
    GroupBarrier,
    AtomicResult(AtomicResultStmt),
}

impl Stmt {
    /// Blocks nested directly under this statement.
    #[must_use]
    pub fn child_blocks(&self) -> Vec<BlockId> {
        match self {
            Self::If {
                then_block,
                else_block,
                ..
            } => std::iter::once(*then_block).chain(*else_block).collect(),
            Self::For { body, .. } => vec![*body],
            Self::Block(block) => vec![*block],
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_sync_point(&self) -> bool {
        matches!(self, Self::Barrier(_) | Self::GroupBarrier)
    }
}

pub fn render_block(session: &Session, id: BlockId, em: &mut Emitter) {
    em.open();
    for stmt in &session.block(id).stmts {
        render_stmt(session, stmt, em);
    }
    em.close();
}

pub fn render_stmt(session: &Session, stmt: &Stmt, em: &mut Emitter) {
    match stmt {
        Stmt::Decl(id) => {
            let var = session.var(*id);
            let mut decl = String::new();
            if var.quals.is_const {
                decl.push_str("const ");
            }
            if var.quals.is_volatile {
                decl.push_str("volatile ");
            }
            decl.push_str(&format!("{} {}{}", var.ty, var.name, dims_suffix(&var.dims)));
            match &var.init {
                Some(init) if var.is_array() => {
                    let value = init.to_source(session);
                    em.line(format!("{decl} = {};", array_initializer(&var.dims, &value)));
                }
                Some(init) => em.line(format!("{decl} = {};", init.to_source(session))),
                None => em.line(format!("{decl};")),
            }
        }
        Stmt::Assign { target, value } => {
            let mut lhs = String::new();
            session.render_ref(*target, &mut lhs);
            em.line(format!("{lhs} = {};", value.to_source(session)));
        }
        Stmt::Expr(expr) => em.line(format!("{};", expr.to_source(session))),
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => {
            em.line(format!("if ({})", cond.to_source(session)));
            render_block(session, *then_block, em);
            if let Some(else_block) = else_block {
                em.line("else");
                render_block(session, *else_block, em);
            }
        }
        Stmt::For { var, trips, body } => {
            let name = &session.var(*var).name;
            em.line(format!(
                "for (int {name} = 0; {name} < {trips}; {name}++)"
            ));
            render_block(session, *body, em);
        }
        Stmt::Block(block) => render_block(session, *block, em),
        Stmt::Barrier(b) => b.render(session, em),
        Stmt::GroupBarrier => barrier::output_barrier(em),
        Stmt::AtomicResult(r) => r.render(session, em),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Seed;
    use crate::session::GenOptions;
    use crate::types::Type;
    use crate::var::Variable;

    #[test]
    fn child_blocks_of_if_else() {
        let stmt = Stmt::If {
            cond: Expr::uint(1),
            then_block: BlockId(1),
            else_block: Some(BlockId(2)),
        };
        assert_eq!(stmt.child_blocks(), vec![BlockId(1), BlockId(2)]);
        assert!(Stmt::GroupBarrier.child_blocks().is_empty());
    }

    #[test]
    fn renders_nested_if() {
        let mut s = Session::new(GenOptions::default(), Seed::from_u64(9));
        let root = s.new_block(None);
        let inner = s.new_block(Some(root));
        let x = s.add_var(Variable::new("l_1", Type::uint()).with_init(Expr::uint(5)).in_block(inner));
        s.push_stmt(inner, Stmt::Decl(x));
        s.push_stmt(
            root,
            Stmt::If {
                cond: Expr::uint(1),
                then_block: inner,
                else_block: None,
            },
        );
        let mut em = Emitter::new();
        render_block(&s, root, &mut em);
        assert_eq!(
            em.finish(),
            "{\n    if (1U)\n    {\n        uint l_1 = 5U;\n    }\n}\n"
        );
    }

    #[test]
    fn renders_array_decl() {
        let mut s = Session::new(GenOptions::default(), Seed::from_u64(9));
        let arr = s.add_var(
            Variable::new("l_2", Type::uint())
                .with_dims(vec![2])
                .with_init(Expr::uint(0)),
        );
        let mut em = Emitter::new();
        render_stmt(&s, &Stmt::Decl(arr), &mut em);
        assert_eq!(em.finish(), "uint l_2[2] = {0U, 0U};\n");
    }
}
