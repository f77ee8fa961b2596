//! Vector-valued expressions.
//!
//! A vector expression is built from sub-expressions whose lanes add up to a
//! produced width `size`, then reconciled down to the width the caller asked
//! for: a half/parity suffix when `size` is exactly twice that width,
//! otherwise an explicit component list.
//!
//! The emitted lane values are drawn from the session's lane stream when the
//! expression is created. The sub-expression tree fixes shape and types and
//! is what the hashing and divergence passes inspect.

use crate::context::CgContext;
use crate::error::{GenError, Result};
use crate::expr::{Constant, Expr, Node, VarRef};
use crate::grammar;
use crate::rng::DistributionTable;
use crate::session::Session;
use crate::types::{random_vector_length, Qualifiers, SuffixAccess, Type};

/// Upper bound (exclusive) of an emitted lane value.
const LANE_VALUE_BOUND: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorStrategy {
    /// Lane-by-lane mix of constants, sub-vectors and scalar expressions.
    Literal,
    /// One vector variable.
    Variable,
    /// One vector-typed expression from the general grammar.
    Chained,
    /// One vector builtin call.
    Builtin,
}

/// Weighted tables the synthesizer draws from, owned by the session.
#[derive(Debug, Clone)]
pub struct VectorTables {
    strategy: DistributionTable<VectorStrategy>,
    suffix: DistributionTable<SuffixAccess>,
}

impl Default for VectorTables {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorTables {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategy: DistributionTable::new()
                .with_entry(VectorStrategy::Literal, 10)
                .with_entry(VectorStrategy::Variable, 10)
                .with_entry(VectorStrategy::Chained, 10)
                .with_entry(VectorStrategy::Builtin, 10),
            suffix: DistributionTable::new()
                .with_entry(SuffixAccess::Hi, 10)
                .with_entry(SuffixAccess::Lo, 10)
                .with_entry(SuffixAccess::Even, 10)
                .with_entry(SuffixAccess::Odd, 10),
        }
    }
}

/// How the produced lanes are narrowed to the requested width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Explicit lane indices; empty when no narrowing is needed.
    Components(Vec<u8>),
    Suffix(SuffixAccess),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOrigin {
    /// Depth budget ran out; a single broadcast constant.
    Degraded,
    /// Pinned by [`VectorExpr::make_constant`].
    Constant,
    Literal,
    Variable,
    Chained,
    Builtin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorExpr {
    exprs: Vec<Expr>,
    ty: Type,
    size: u8,
    reconcile: Reconcile,
    origin: VectorOrigin,
    lanes: Vec<i64>,
}

impl VectorExpr {
    /// Random vector expression of type `ty`, produced `size` lanes wide
    /// (`0` picks a width).
    pub fn make_random(
        session: &mut Session,
        cx: &CgContext,
        ty: Type,
        quals: Qualifiers,
        size: u8,
    ) -> Result<Self> {
        let max = session.options().max_expr_depth;
        if cx.expr_depth + 2 > max {
            if !ty.is_vector() {
                return Err(GenError::DepthExhausted {
                    depth: cx.expr_depth,
                    max,
                    ty: ty.name(),
                });
            }
            let constant = Constant::make_random(session.rng(), ty.element());
            let size = ty.lanes();
            return Ok(Self {
                exprs: vec![Expr::Constant(constant)],
                ty,
                size,
                reconcile: Reconcile::Components(Vec::new()),
                origin: VectorOrigin::Degraded,
                lanes: draw_lanes(session, size),
            });
        }

        let size = if size == 0 {
            random_vector_length(session.rng(), 0)
        } else {
            size
        };
        // Drawn before any nested vector so they depend on the lane stream alone.
        let lanes = draw_lanes(session, size);
        let itemize_to = ty.lanes();
        let num = session.rng().rnd_upto(40);
        let strategy = session
            .vector_tables
            .strategy
            .lookup(num)
            .unwrap_or(VectorStrategy::Literal);

        let vec_ty = ty.promote(size);
        let (exprs, origin) = match strategy {
            VectorStrategy::Literal => (
                literal_lanes(session, cx, ty, quals, size)?,
                VectorOrigin::Literal,
            ),
            VectorStrategy::Variable => (
                vec![grammar::vector_variable(session, cx, vec_ty, quals)?],
                VectorOrigin::Variable,
            ),
            VectorStrategy::Chained => (
                vec![grammar::make_random_expr(session, &cx.deeper(), vec_ty)?],
                VectorOrigin::Chained,
            ),
            VectorStrategy::Builtin => (
                vec![grammar::make_builtin(session, &cx.deeper(), vec_ty)?],
                VectorOrigin::Builtin,
            ),
        };

        let reconcile = if u16::from(size) == u16::from(itemize_to) * 2 {
            let num = session.rng().rnd_upto(40);
            Reconcile::Suffix(
                session
                    .vector_tables
                    .suffix
                    .lookup(num)
                    .unwrap_or(SuffixAccess::Lo),
            )
        } else {
            let first = if size == itemize_to { itemize_to } else { 0 };
            let accesses = (first..itemize_to)
                .map(|_| session.rng().rnd_upto(u32::from(size)) as u8)
                .collect();
            Reconcile::Components(accesses)
        };

        tracing::trace!(?strategy, size, ty = %ty, "vector expression");
        Ok(Self {
            exprs,
            ty,
            size,
            reconcile,
            origin,
            lanes,
        })
    }

    /// Every lane pinned to `value`.
    pub fn make_constant(ty: Type, value: i64) -> Result<Self> {
        let Some(size) = ty.vector_length() else {
            return Err(GenError::NotVectorType(ty.name()));
        };
        Ok(Self {
            exprs: vec![Expr::constant(ty.element(), value)],
            ty,
            size,
            reconcile: Reconcile::Components(Vec::new()),
            origin: VectorOrigin::Constant,
            lanes: vec![Constant::new(ty.element(), value).value; usize::from(size)],
        })
    }

    #[must_use]
    pub const fn result_type(&self) -> Type {
        self.ty
    }

    /// Produced width before reconciliation.
    #[must_use]
    pub const fn size(&self) -> u8 {
        self.size
    }

    #[must_use]
    pub const fn reconcile(&self) -> &Reconcile {
        &self.reconcile
    }

    #[must_use]
    pub const fn origin(&self) -> VectorOrigin {
        self.origin
    }

    #[must_use]
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    /// Lanes produced by the sub-expressions; a lone scalar broadcasts.
    #[must_use]
    pub fn lane_count(&self, session: &Session) -> u8 {
        match self.exprs.as_slice() {
            [only] if !only.ty(session).is_vector() => self.size,
            exprs => exprs.iter().map(|e| e.ty(session).lanes()).sum(),
        }
    }

    /// Width after reconciliation.
    #[must_use]
    pub fn reconciled_width(&self) -> u8 {
        match &self.reconcile {
            Reconcile::Suffix(_) => self.size / 2,
            Reconcile::Components(c) if c.is_empty() => self.size,
            Reconcile::Components(c) => c.len() as u8,
        }
    }
}

fn draw_lanes(session: &mut Session, size: u8) -> Vec<i64> {
    (0..size)
        .map(|_| i64::from(session.lane_rng().rnd_upto(LANE_VALUE_BOUND)))
        .collect()
}

/// Sub-expressions for the literal strategy, `size` lanes in total.
fn literal_lanes(
    session: &mut Session,
    cx: &CgContext,
    ty: Type,
    quals: Qualifiers,
    size: u8,
) -> Result<Vec<Expr>> {
    let scalar = ty.demote();
    let mut exprs = Vec::new();
    let mut remain = size;
    while remain > 0 {
        let num = session.rng().rnd_upto(30);
        if remain <= 2 || num < 10 {
            let constant = Constant::make_random(session.rng(), scalar.element());
            exprs.push(Expr::Constant(constant));
            remain -= 1;
        } else if num < 20 {
            // Strictly narrower than the whole vector so recursion terminates.
            let cap = remain - u8::from(remain == size);
            let width = random_vector_length(session.rng(), cap);
            let sub = VectorExpr::make_random(session, &cx.deeper(), ty.promote(width), quals, width)?;
            exprs.push(Expr::Vector(Box::new(sub)));
            remain -= width;
        } else {
            exprs.push(grammar::make_random_expr(session, &cx.deeper(), scalar)?);
            remain -= 1;
        }
    }
    Ok(exprs)
}

impl Node for VectorExpr {
    fn render(&self, _session: &Session, out: &mut String) {
        let lanes: Vec<String> = self.lanes.iter().map(ToString::to_string).collect();
        let base = format!(
            "(({})({}))",
            self.ty.promote(self.size).make_fn(),
            lanes.join(", ")
        );
        // Narrowing goes through runtime-header helpers; CUDA has no swizzles.
        let text = match &self.reconcile {
            Reconcile::Suffix(suffix) => format!("{}({base})", suffix.helper()),
            Reconcile::Components(accesses) if accesses.len() == 1 => {
                format!("vec_lane({base}, {})", accesses[0])
            }
            Reconcile::Components(accesses) if !accesses.is_empty() => {
                let target = self.ty.promote(accesses.len() as u8);
                let indices: Vec<String> = accesses.iter().map(ToString::to_string).collect();
                format!("vec_shuffle<{target}>({base}, {})", indices.join(", "))
            }
            Reconcile::Components(_) => base,
        };
        out.push_str(&text);
    }

    fn referenced_vars(&self, out: &mut Vec<VarRef>) {
        for expr in &self.exprs {
            expr.referenced_vars(out);
        }
    }

    fn eval_subexprs<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        out.extend(self.exprs.iter());
    }

    fn complexity(&self) -> u32 {
        1 + self.exprs.iter().map(Node::complexity).sum::<u32>()
    }
}
