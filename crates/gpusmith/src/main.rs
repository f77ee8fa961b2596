//! gpusmith: generate a random GPU kernel.
//!
//! ```bash
//! gpusmith --seed 42 --atomics --barriers -o kernel.cu --manifest
//! gpusmith --seed 7 --vectors -l 16,2 -g 256,4
//! gpusmith --seed 9 -o out/kernel.cu --runtime-header
//! ```

use clap::Parser;
use gpusmith::{manifest, runtime, GenError, GenOptions, KernelBuilder, Seed};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Random GPU kernel generator
#[derive(Parser, Debug)]
#[command(name = "gpusmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Generation seed
    #[arg(long, env = "GPUSMITH_SEED")]
    seed: u64,

    /// Write the kernel here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit atomic regions
    #[arg(long)]
    atomics: bool,

    /// Counter lanes per group
    #[arg(long, default_value_t = 4)]
    max_atomic_regions: usize,

    /// Allow atomics on group-local counters
    #[arg(long)]
    local_atomics: bool,

    /// Synthesize barrier-paired communication
    #[arg(long)]
    barriers: bool,

    /// Emit vector expressions
    #[arg(long)]
    vectors: bool,

    /// Add the inter-thread communication buffer
    #[arg(long)]
    inter_thread_comm: bool,

    /// Add the EMI input buffer
    #[arg(long)]
    emi: bool,

    /// Add the fake-divergence sequence buffer
    #[arg(long)]
    fake_divergence: bool,

    /// Add the per-group atomic reduction buffer
    #[arg(long)]
    atomic_reductions: bool,

    /// Local size, comma separated
    #[arg(short = 'l', long = "local", value_delimiter = ',', default_value = "32")]
    local: Vec<usize>,

    /// Global size, comma separated
    #[arg(short = 'g', long = "global", value_delimiter = ',', default_value = "1024")]
    global: Vec<usize>,

    /// Write `<output>.manifest.json` next to the kernel
    #[arg(long, requires = "output")]
    manifest: bool,

    /// Also write gpusmith.h next to the kernel
    #[arg(long, requires = "output")]
    runtime_header: bool,

    /// Maximum expression depth
    #[arg(long, default_value_t = 5)]
    max_expr_depth: u32,
}

impl Cli {
    fn options(&self) -> GenOptions {
        let mut opts = GenOptions::default()
            .with_grid(self.local.clone(), self.global.clone())
            .with_max_expr_depth(self.max_expr_depth);
        if self.atomics {
            opts = opts.with_atomics(self.max_atomic_regions);
        }
        if self.local_atomics {
            opts = opts.with_local_atomics();
        }
        if self.barriers {
            opts = opts.with_barriers();
        }
        if self.vectors {
            opts = opts.with_vectors();
        }
        if self.inter_thread_comm {
            opts = opts.with_inter_thread_comm();
        }
        if self.emi {
            opts = opts.with_emi();
        }
        if self.fake_divergence {
            opts = opts.with_fake_divergence();
        }
        if self.atomic_reductions {
            opts = opts.with_atomic_reductions();
        }
        opts
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gpusmith=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), GenError> {
    if cli.local_atomics && !cli.atomics {
        return Err(GenError::InvalidOption(
            "--local-atomics requires --atomics".to_string(),
        ));
    }
    let kernel = KernelBuilder::new(Seed::from_u64(cli.seed))
        .options(cli.options())
        .build()?;

    match &cli.output {
        Some(path) if cli.manifest => {
            let manifest_path = manifest::write_with_manifest(path, &kernel)?;
            tracing::info!(kernel = %path.display(), manifest = %manifest_path.display(), "written");
        }
        Some(path) => std::fs::write(path, &kernel.source)?,
        None => print!("{}", kernel.source),
    }
    if let Some(path) = cli.output.as_deref().filter(|_| cli.runtime_header) {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let header = runtime::write_runtime_header(dir)?;
        tracing::info!(header = %header.display(), "runtime header written");
    }
    Ok(())
}
