//! Property-based tests for gpusmith.
//!
//! Uses proptest to check generator invariants across arbitrary seeds and
//! buffer shapes.

use gpusmith::buffer::render_access;
use gpusmith::header::header_tokens;
use gpusmith::prelude::*;
use gpusmith::types::Qualifiers;
use gpusmith::vector::Reconcile;
use gpusmith::{KernelFeatures, KernelParam, LaunchHeader};
use proptest::prelude::*;

fn vector_session(seed: u64) -> (Session, CgContext) {
    let mut session = Session::new(GenOptions::default().with_vectors(), Seed::from_u64(seed));
    let root = session.new_block(None);
    (session, CgContext::new(root))
}

fn target_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::uint()),
        Just(Type::int()),
        prop::sample::select(vec![2u8, 3, 4, 8, 16]).prop_map(|len| Type::vector(ScalarKind::UInt, len)),
        prop::sample::select(vec![2u8, 4, 8]).prop_map(|len| Type::vector(ScalarKind::Int, len)),
    ]
}

// === Buffer Model ===

proptest! {
    /// A view renders as its root's name followed by one `[i]` per index.
    #[test]
    fn prop_view_access_text(
        dims in prop::collection::vec(1usize..6, 1..4),
        seed in any::<u64>(),
    ) {
        let mut session = Session::new(GenOptions::default(), Seed::from_u64(seed));
        let root = session.create_buffer(MemorySpace::Private, "l_9", Type::int(), None, dims.clone());
        let indices: Vec<usize> = dims.iter().map(|d| d - 1).collect();
        let view = session.itemize(root, &indices).unwrap();

        let mut text = String::new();
        render_access(&session, view, &mut text);
        let expected = indices.iter().fold("l_9".to_string(), |acc, i| format!("{acc}[{i}]"));
        prop_assert_eq!(text, expected);
    }

    /// Itemizing with the wrong number of indices is always rejected.
    #[test]
    fn prop_itemize_rank_checked(
        dims in prop::collection::vec(1usize..6, 1..4),
        extra in 1usize..3,
    ) {
        let mut session = Session::new(GenOptions::default(), Seed::from_u64(1));
        let root = session.create_buffer(MemorySpace::Private, "l_1", Type::int(), None, dims.clone());
        let indices = vec![0; dims.len() + extra];
        prop_assert!(matches!(
            session.itemize(root, &indices),
            Err(GenError::DimensionMismatch { .. })
        ), "expected DimensionMismatch");
    }

    /// Views cannot be itemized again.
    #[test]
    fn prop_no_nested_itemize(dims in prop::collection::vec(1usize..4, 1..3)) {
        let mut session = Session::new(GenOptions::default(), Seed::from_u64(1));
        let root = session.create_buffer(MemorySpace::Private, "l_1", Type::int(), None, dims.clone());
        let view = session.itemize(root, &vec![0; dims.len()]).unwrap();
        prop_assert!(matches!(
            session.itemize(view, &[0]),
            Err(GenError::AlreadyItemized { .. })
        ), "expected AlreadyItemized");
    }
}

// === Vector Synthesizer ===

proptest! {
    /// Sub-expressions supply exactly `size` lanes and reconciliation lands
    /// on the target width.
    #[test]
    fn prop_vector_lanes_match_size(seed in any::<u64>(), ty in target_type()) {
        let (mut session, cx) = vector_session(seed);
        let v = VectorExpr::make_random(&mut session, &cx, ty, Qualifiers::default(), 0).unwrap();
        prop_assert_eq!(v.lane_count(&session), v.size());
        prop_assert_eq!(v.reconciled_width(), ty.lanes());
        prop_assert_eq!(v.result_type(), ty);
    }

    /// Suffix access is used exactly when the produced width doubles the
    /// target; no accesses at all when the widths already agree.
    #[test]
    fn prop_reconcile_modes_exclusive(seed in any::<u64>(), ty in target_type()) {
        let (mut session, cx) = vector_session(seed);
        let v = VectorExpr::make_random(&mut session, &cx, ty, Qualifiers::default(), 0).unwrap();
        match v.reconcile() {
            Reconcile::Suffix(_) => prop_assert_eq!(u16::from(v.size()), 2 * u16::from(ty.lanes())),
            Reconcile::Components(c) if v.size() == ty.lanes() => prop_assert!(c.is_empty()),
            Reconcile::Components(c) => prop_assert_eq!(c.len(), usize::from(ty.lanes())),
        }
    }

    /// A clone keeps the reconciliation and the sub-expression count.
    #[test]
    fn prop_vector_clone(seed in any::<u64>(), len in prop::sample::select(vec![2u8, 4, 8])) {
        let (mut session, cx) = vector_session(seed);
        let ty = Type::vector(ScalarKind::UInt, len);
        let v = VectorExpr::make_random(&mut session, &cx, ty, Qualifiers::default(), len * 2).unwrap();
        let copy = v.clone();
        prop_assert_eq!(copy.reconcile(), v.reconcile());
        prop_assert_eq!(copy.exprs().len(), v.exprs().len());
        prop_assert!(matches!(copy.reconcile(), Reconcile::Suffix(_)));
    }
}

// === Visibility ===

proptest! {
    /// A variable recorded in a region is visible from the region's
    /// descendants and gone once the region ends.
    #[test]
    fn prop_visibility_scoped(depth in 1usize..5) {
        let mut session = Session::new(GenOptions::default().with_atomics(2), Seed::from_u64(3));
        let root = session.new_block(None);
        let region = session.new_block(Some(root));
        session.begin_region(region);
        let var = session.add_var(Variable::new("v", Type::uint()));
        prop_assert!(session.record_variable(gpusmith::expr::VarRef::Var(var)));

        let mut inner = region;
        for _ in 0..depth {
            inner = session.new_block(Some(inner));
            session.begin_region(inner);
        }
        prop_assert!(session.visible_variables(inner).contains(&gpusmith::expr::VarRef::Var(var)));

        session.end_region(region);
        prop_assert!(session.visible_variables(region).is_empty());
    }
}

// === Whole kernels ===

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Generation is a pure function of seed and options.
    #[test]
    fn prop_deterministic(seed in any::<u64>()) {
        let opts = GenOptions::default().with_atomics(3).with_barriers().with_vectors();
        let a = KernelBuilder::new(Seed::from_u64(seed)).options(opts.clone()).build().unwrap();
        let b = KernelBuilder::new(Seed::from_u64(seed)).options(opts).build().unwrap();
        prop_assert_eq!(a.source, b.source);
    }

    /// Every synthesized barrier pairs one gate with its two sync points, and
    /// generation never fails placement.
    #[test]
    fn prop_barriers_counted(seed in any::<u64>()) {
        let k = KernelBuilder::new(Seed::from_u64(seed))
            .options(GenOptions::default().with_barriers())
            .build()
            .unwrap();
        let gates = k
            .source
            .lines()
            .filter(|l| l.contains("= get_linear_local_id() < (get_linear_local_size() / 2U);"))
            .count();
        prop_assert_eq!(gates, k.stats.barriers);
    }

    /// Atomic regions never exceed the counter lanes.
    #[test]
    fn prop_atomic_regions_bounded(seed in any::<u64>(), regions in 1usize..6) {
        let k = KernelBuilder::new(Seed::from_u64(seed))
            .options(GenOptions::default().with_atomics(regions).with_local_atomics())
            .build()
            .unwrap();
        prop_assert!(k.stats.atomic_regions <= regions);
    }

    /// The header line survives the launcher's tokenizer.
    #[test]
    fn prop_header_tokens(
        local in prop::collection::vec(1usize..64, 1..4),
        atomics in prop::option::of(1usize..8),
        emi in any::<bool>(),
        comm in any::<bool>(),
    ) {
        let header = LaunchHeader {
            global: local.iter().map(|l| l * 4).collect(),
            local: local.clone(),
            features: KernelFeatures { atomics, emi, inter_thread_comm: comm, ..KernelFeatures::default() },
        };
        let tokens = header_tokens(&header.to_line());
        prop_assert_eq!(tokens[0].as_str(), "-l");
        prop_assert_eq!(tokens[2].as_str(), "-g");
        prop_assert_eq!(tokens.contains(&"---emi".to_string()), emi);
        prop_assert_eq!(tokens.contains(&"---inter_thread_comm".to_string()), comm);
        prop_assert_eq!(tokens.contains(&"--atomics".to_string()), atomics.is_some());
    }

    /// The entry signature lists parameters in the positional order.
    #[test]
    fn prop_param_order(seed in any::<u64>(), emi in any::<bool>(), comm in any::<bool>()) {
        let mut opts = GenOptions::default().with_atomics(2);
        opts.emi = emi;
        opts.inter_thread_comm = comm;
        let k = KernelBuilder::new(Seed::from_u64(seed)).options(opts).build().unwrap();
        let decls: Vec<String> = k.header.features.params().into_iter().map(KernelParam::c_decl).collect();
        let signature = format!("entry({})", decls.join(", "));
        prop_assert!(k.source.contains(&signature));
    }
}
