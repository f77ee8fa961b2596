//! Expression tree of generated kernels.
//!
//! Every expression kind implements [`Node`], the one capability interface
//! the emitter, the hashing pass and the divergence analysis rely on.
//! [`Expr`] dispatches to the concrete kinds with a `match`.

use crate::atomic::AtomicExpr;
use crate::buffer::{self, BufferId};
use crate::rng::GenRng;
use crate::session::Session;
use crate::types::{ScalarKind, Type};
use crate::var::VarId;
use crate::vector::VectorExpr;

/// Anything an expression can read: a plain variable or a buffer (root or view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarRef {
    Var(VarId),
    Buffer(BufferId),
}

/// Capability interface shared by every expression kind.
pub trait Node {
    /// Append C source for this node.
    fn render(&self, session: &Session, out: &mut String);

    /// Variables and buffers read by this node and its children.
    fn referenced_vars(&self, out: &mut Vec<VarRef>);

    /// Direct sub-expressions.
    fn eval_subexprs<'a>(&'a self, out: &mut Vec<&'a Expr>);

    /// Node count of the subtree.
    fn complexity(&self) -> u32;

    fn to_source(&self, session: &Session) -> String {
        let mut out = String::new();
        self.render(session, &mut out);
        out
    }
}

/// Linearized thread-geometry queries provided by the runtime header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    LinearGlobal,
    LinearLocal,
    LinearGroup,
    LinearLocalSize,
}

impl IdKind {
    #[must_use]
    pub const fn call(self) -> &'static str {
        match self {
            Self::LinearGlobal => "get_linear_global_id()",
            Self::LinearLocal => "get_linear_local_id()",
            Self::LinearGroup => "get_linear_group_id()",
            Self::LinearLocalSize => "get_linear_local_size()",
        }
    }

    /// Differs between lanes of one group.
    #[must_use]
    pub const fn is_lane_varying(self) -> bool {
        matches!(self, Self::LinearGlobal | Self::LinearLocal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
}

impl BinOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
        }
    }

    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt)
    }

    /// Operators that never overflow for `kind` after integer promotion.
    #[must_use]
    pub fn safe_for(kind: ScalarKind) -> &'static [Self] {
        const BITWISE: [BinOp; 3] = [BinOp::BitAnd, BinOp::BitOr, BinOp::BitXor];
        const WRAPPING: [BinOp; 5] = [
            BinOp::Add,
            BinOp::Sub,
            BinOp::BitAnd,
            BinOp::BitOr,
            BinOp::BitXor,
        ];
        match kind {
            ScalarKind::UInt | ScalarKind::ULong => &WRAPPING,
            _ => &BITWISE,
        }
    }
}

/// Integer literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub kind: ScalarKind,
    pub value: i64,
}

impl Constant {
    #[must_use]
    pub const fn new(kind: ScalarKind, value: i64) -> Self {
        Self {
            kind,
            value: kind.wrap(value),
        }
    }

    /// Small random literal; mostly tiny values with the odd large one.
    pub fn make_random(rng: &mut GenRng, kind: ScalarKind) -> Self {
        let value = match rng.rnd_upto(4) {
            0 => i64::from(rng.rnd_upto(2)),
            1 | 2 => i64::from(rng.rnd_upto(256)),
            _ => i64::from(rng.rnd_upto(u32::MAX)),
        };
        Self::new(kind, value)
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.kind.literal(self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Var(VarId),
    Buffer(BufferId),
    Id(IdKind),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Type,
    },
    Builtin {
        name: &'static str,
        args: Vec<Expr>,
        ty: Type,
    },
    Atomic(Box<AtomicExpr>),
    Vector(Box<VectorExpr>),
}

impl Expr {
    #[must_use]
    pub const fn constant(kind: ScalarKind, value: i64) -> Self {
        Self::Constant(Constant::new(kind, value))
    }

    #[must_use]
    pub const fn uint(value: u32) -> Self {
        Self::constant(ScalarKind::UInt, value as i64)
    }

    #[must_use]
    pub fn binary(op: BinOp, lhs: Self, rhs: Self, ty: Type) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// `lhs == rhs`, typed `int`.
    #[must_use]
    pub fn equals(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinOp::Eq, lhs, rhs, Type::int())
    }

    pub fn ty(&self, session: &Session) -> Type {
        match self {
            Self::Constant(c) => Type::Scalar(c.kind),
            Self::Var(id) => session.var(*id).ty,
            Self::Buffer(id) => session.buffer(*id).elem,
            Self::Id(_) => Type::uint(),
            Self::Binary { ty, .. } | Self::Builtin { ty, .. } => *ty,
            Self::Atomic(_) => Type::uint(),
            Self::Vector(v) => v.result_type(),
        }
    }

    /// Walks the tree looking for a lane-varying thread-id query or an atomic.
    #[must_use]
    pub fn reads_lane_state(&self) -> bool {
        match self {
            Self::Id(kind) => kind.is_lane_varying(),
            Self::Atomic(_) => true,
            _ => {
                let mut children = Vec::new();
                self.eval_subexprs(&mut children);
                children.into_iter().any(Self::reads_lane_state)
            }
        }
    }
}

impl Node for Expr {
    fn render(&self, session: &Session, out: &mut String) {
        match self {
            Self::Constant(c) => out.push_str(&c.render()),
            Self::Var(id) => session.render_var(*id, out),
            Self::Buffer(id) => buffer::render_access(session, *id, out),
            Self::Id(kind) => out.push_str(kind.call()),
            Self::Binary { op, lhs, rhs, .. } => {
                out.push('(');
                lhs.render(session, out);
                out.push(' ');
                out.push_str(op.as_str());
                out.push(' ');
                rhs.render(session, out);
                out.push(')');
            }
            Self::Builtin { name, args, .. } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.render(session, out);
                }
                out.push(')');
            }
            Self::Atomic(atomic) => atomic.render(session, out),
            Self::Vector(vector) => vector.render(session, out),
        }
    }

    fn referenced_vars(&self, out: &mut Vec<VarRef>) {
        match self {
            Self::Var(id) => out.push(VarRef::Var(*id)),
            Self::Buffer(id) => out.push(VarRef::Buffer(*id)),
            Self::Atomic(atomic) => atomic.referenced_vars(out),
            Self::Vector(vector) => vector.referenced_vars(out),
            _ => {
                let mut children = Vec::new();
                self.eval_subexprs(&mut children);
                for child in children {
                    child.referenced_vars(out);
                }
            }
        }
    }

    fn eval_subexprs<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Self::Constant(_) | Self::Var(_) | Self::Buffer(_) | Self::Id(_) => {}
            Self::Binary { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            Self::Builtin { args, .. } => out.extend(args.iter()),
            Self::Atomic(atomic) => atomic.eval_subexprs(out),
            Self::Vector(vector) => vector.eval_subexprs(out),
        }
    }

    fn complexity(&self) -> u32 {
        match self {
            Self::Atomic(atomic) => atomic.complexity(),
            Self::Vector(vector) => vector.complexity(),
            _ => {
                let mut children = Vec::new();
                self.eval_subexprs(&mut children);
                1 + children.iter().map(|c| c.complexity()).sum::<u32>()
            }
        }
    }
}
