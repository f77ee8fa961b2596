//! Kernel assembly.
//!
//! Generation runs in fixed phases: build the body, analyze divergence,
//! synthesize barriers, then register everything the body touched with the
//! parameter aggregate and render. Barrier legality is checked as its own
//! pass before anything is emitted.

use crate::atomic;
use crate::barrier::{self, DivergenceAnalysis};
use crate::block::{render_stmt, BlockId, Stmt};
use crate::buffer::{self, BufferId, MemorySpace};
use crate::context::CgContext;
use crate::error::{GenError, Result};
use crate::expr::{Constant, Expr, IdKind};
use crate::grammar;
use crate::header::LaunchHeader;
use crate::params::{KernelParam, EMI_INPUT_LEN};
use crate::render::Emitter;
use crate::rng::Seed;
use crate::session::{GenOptions, Session};
use crate::types::{random_scalar_kind, ScalarKind, Type};
use crate::var::Variable;
use serde::{Deserialize, Serialize};

/// Runtime header every kernel includes.
pub const DEFAULT_RUNTIME_HEADER: &str = "gpusmith.h";

/// Summary of what went into a kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStats {
    pub atomic_regions: usize,
    pub barriers: usize,
    pub buffers: usize,
    pub blocks: usize,
}

/// A rendered kernel.
#[derive(Debug, Clone)]
pub struct Kernel {
    pub source: String,
    pub header: LaunchHeader,
    pub seed: Seed,
    pub options: GenOptions,
    pub stats: KernelStats,
}

#[derive(Debug, Clone)]
pub struct KernelBuilder {
    options: GenOptions,
    seed: Seed,
    runtime_header: String,
}

impl KernelBuilder {
    #[must_use]
    pub fn new(seed: Seed) -> Self {
        Self {
            options: GenOptions::default(),
            seed,
            runtime_header: DEFAULT_RUNTIME_HEADER.to_string(),
        }
    }

    #[must_use]
    pub fn options(mut self, options: GenOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn runtime_header(mut self, name: impl Into<String>) -> Self {
        self.runtime_header = name.into();
        self
    }

    pub fn build(self) -> Result<Kernel> {
        self.options.validate()?;
        let mut session = Session::new(self.options.clone(), self.seed);
        let root = session.new_block(None);
        let cx = CgContext::new(root);

        make_globals(&mut session);
        make_kernel_buffers(&mut session);

        grammar::fill_block(&mut session, &cx)?;

        let analysis = DivergenceAnalysis::analyze(&session, root);
        let barriers = if self.options.barriers {
            barrier::synthesize(&analysis, &mut session)?.len()
        } else {
            0
        };
        barrier::verify_placement(&analysis, &session, root)?;

        atomic::add_vars_to_globals(&mut session);
        let has_local = session
            .buffers()
            .roots()
            .any(|(_, b)| b.space == MemorySpace::Local);
        if has_local {
            // Leader lanes fill local buffers before anyone reads them.
            session.block_mut(root).stmts.insert(0, Stmt::GroupBarrier);
        }

        if let Some((_, b)) = session
            .buffers()
            .roots()
            .find(|(_, b)| b.space == MemorySpace::Global && b.param.is_none())
        {
            return Err(GenError::UnboundGlobalBuffer {
                buffer: b.name.clone(),
            });
        }

        let feature_uses = FeatureUses::draw(&mut session);
        let header = LaunchHeader {
            local: self.options.local_size.clone(),
            global: self.options.global_size.clone(),
            features: self.options.features(),
        };
        let source = render(&session, root, &header, &feature_uses, &self.runtime_header);
        let stats = KernelStats {
            atomic_regions: session.atomics().regions_used(),
            barriers,
            buffers: session.buffers().roots().count(),
            blocks: session.blocks().count(),
        };
        tracing::info!(
            seed = %self.seed,
            atomic_regions = stats.atomic_regions,
            barriers = stats.barriers,
            blocks = stats.blocks,
            "generated kernel"
        );
        Ok(Kernel {
            source,
            header,
            seed: self.seed,
            options: self.options,
            stats,
        })
    }
}

/// Reads of the optional input buffers. Each guard is false for the
/// launcher's fixed buffer contents, so the body it protects never runs.
#[derive(Debug, Clone, Copy, Default)]
struct FeatureUses {
    /// `emi_input[a] < emi_input[b]` with `a < b` over a descending buffer.
    emi: Option<(usize, usize)>,
    /// Modulus into `sequence_input`, whose values start at 10.
    sequence: Option<usize>,
    reduction: bool,
}

impl FeatureUses {
    fn draw(session: &mut Session) -> Self {
        let emi = if session.options().emi {
            let a = session.rng().rnd_upto(EMI_INPUT_LEN as u32 - 1) as usize;
            let span = (EMI_INPUT_LEN - 1 - a) as u32;
            let b = a + 1 + session.rng().rnd_upto(span) as usize;
            Some((a, b))
        } else {
            None
        };
        let sequence = session
            .options()
            .fake_divergence
            .then(|| session.options().global_size.iter().copied().max().unwrap_or(1));
        Self {
            emi,
            sequence,
            reduction: session.options().atomic_reductions,
        }
    }

    fn render(&self, em: &mut Emitter) {
        if let Some((a, b)) = self.emi {
            let emi = KernelParam::EmiInput.name();
            em.line(format!("if ({emi}[{a}] < {emi}[{b}])"));
            em.open();
            em.line("crc64_context = 0UL;");
            em.close();
        }
        if let Some(modulus) = self.sequence {
            em.line(format!(
                "if ({}[{} % {modulus}U] < 10)",
                KernelParam::SequenceInput.name(),
                IdKind::LinearGlobal.call()
            ));
            em.open();
            em.line("crc64_context = 0UL;");
            em.close();
        }
        if self.reduction {
            let slot = format!(
                "{}[{}]",
                KernelParam::AtomicReduction.name(),
                IdKind::LinearGroup.call()
            );
            em.line(format!("atomicAdd(&{slot}, 1);"));
            em.line("__syncthreads();");
            em.line(format!(
                "transparent_crc({slot}, \"{}\", print_hash_value);",
                KernelParam::AtomicReduction.name()
            ));
        }
    }
}

/// Scalar fields of the parameter aggregate.
fn make_globals(session: &mut Session) {
    let count = 1 + session.rng().rnd_upto(3);
    for _ in 0..count {
        let kind = random_scalar_kind(session.rng());
        let init = Constant::make_random(session.rng(), kind);
        let name = session.fresh_name("g");
        let id = session.add_var(
            Variable::new(name, Type::Scalar(kind))
                .with_init(Expr::Constant(init))
                .global(),
        );
        session.add_global_var(id);
    }
}

/// Kernel-scope private and constant buffers, plus the communication buffer
/// when inter-thread communication is on.
fn make_kernel_buffers(session: &mut Session) {
    for space in [MemorySpace::Private, MemorySpace::Constant] {
        let count = session.rng().rnd_upto(3);
        for _ in 0..count {
            let kind = random_scalar_kind(session.rng());
            let mut dims = vec![2 + session.rng().rnd_upto(3) as usize];
            if session.rng().rnd_flip(25) {
                dims.push(2 + session.rng().rnd_upto(2) as usize);
            }
            let init = Constant::make_random(session.rng(), kind);
            let prefix = if space == MemorySpace::Constant { "c" } else { "l" };
            let name = session.fresh_name(prefix);
            session.create_buffer(space, name, Type::Scalar(kind), Some(Expr::Constant(init)), dims);
        }
    }
    if session.options().inter_thread_comm {
        let param = KernelParam::CommValues;
        let threads = session.options().total_threads();
        let id = session.create_buffer(
            MemorySpace::Global,
            param.name(),
            param.elem(),
            Some(Expr::constant(ScalarKind::Long, 1)),
            vec![threads],
        );
        session.bind_param(id, param);
        session.add_global_buffer(id);
    }
}

fn roots_in(session: &Session, space: MemorySpace) -> Vec<BufferId> {
    session
        .buffers()
        .roots()
        .filter(|(_, b)| b.space == space)
        .map(|(id, _)| id)
        .collect()
}

fn render(
    session: &Session,
    root: BlockId,
    header: &LaunchHeader,
    uses: &FeatureUses,
    runtime: &str,
) -> String {
    let mut em = Emitter::new();
    em.line(header.to_line());
    em.line(format!("// Seed: {}", session.seed()));
    em.blank();
    em.line(format!("#include \"{runtime}\""));
    em.blank();

    for id in roots_in(session, MemorySpace::Constant) {
        buffer::render_file_scope_def(session, id, &mut em);
    }
    session.globals().render_struct(session, &mut em);
    em.blank();

    let params: Vec<String> = header
        .features
        .params()
        .into_iter()
        .map(KernelParam::c_decl)
        .collect();
    em.line(format!(
        "extern \"C\" __global__ void entry({})",
        params.join(", ")
    ));
    em.open();
    em.line("int i;");
    for id in roots_in(session, MemorySpace::Local)
        .into_iter()
        .chain(roots_in(session, MemorySpace::Private))
    {
        buffer::render_def(session, id, &mut em);
    }
    session.globals().render_init(session, &mut em);
    for id in roots_in(session, MemorySpace::Global) {
        buffer::render_def(session, id, &mut em);
    }

    for stmt in &session.block(root).stmts {
        render_stmt(session, stmt, &mut em);
    }

    em.line("ulong crc64_context = 0xFFFFFFFFFFFFFFFFUL;");
    em.line("int print_hash_value = 0;");
    uses.render(&mut em);
    session.globals().render_hash(session, &mut em);
    for id in roots_in(session, MemorySpace::Private) {
        buffer::render_hash(session, id, &mut em);
    }
    atomic::emit_hashing(session, &mut em);
    em.line(format!(
        "result[{}] = crc64_context ^ 0xFFFFFFFFFFFFFFFFUL;",
        IdKind::LinearGlobal.call()
    ));
    em.close();
    em.finish()
}
