//! CLI definition and argument assembly.
//!
//! Flags come from two places: the `//` header line of the kernel file (or
//! of the `-a` file) and the command line. Header tokens are placed first so
//! the command line wins. Triple-dash flags (`---emi`) are accepted as
//! written and normalized to `--emi` before clap sees them.

use crate::error::{LaunchError, LaunchResult};
use clap::{Parser, ValueEnum};
use gpusmith::header_tokens;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Which device API runs the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum BackendKind {
    /// CUDA driver + NVRTC
    Cuda,
    /// Checks the launch without running it; every checksum is 0
    Simulated,
}

/// Run a gpusmith kernel and print one checksum per thread
#[derive(Parser, Debug, Clone)]
#[command(name = "gpusmith-launcher")]
#[command(author, version, about, long_about = None)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Kernel file
    #[arg(short = 'f', long = "filename")]
    pub file: PathBuf,

    /// Platform index
    #[arg(short = 'p', long = "platform_idx")]
    pub platform: Option<usize>,

    /// Device index
    #[arg(short = 'd', long = "device_idx")]
    pub device: Option<usize>,

    /// Device name substring
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Local size, comma separated
    #[arg(short = 'l', long = "locals")]
    pub local: Option<String>,

    /// Global size, comma separated
    #[arg(short = 'g', long = "groups")]
    pub global: Option<String>,

    /// Read the launch header from this file instead of the kernel
    #[arg(short = 'a', long = "args")]
    pub args_file: Option<PathBuf>,

    /// Treat the kernel file as a prebuilt binary of at most N bytes
    #[arg(short = 'b', long = "binary")]
    pub binary: Option<usize>,

    /// Include path for the runtime header
    #[arg(short = 'i', long = "include_path")]
    pub include: Option<String>,

    /// Atomic counter lanes per group
    #[arg(long)]
    pub atomics: Option<usize>,

    /// Allocate the per-group atomic reduction buffer
    #[arg(long = "atomic_reductions")]
    pub atomic_reductions: bool,

    /// Allocate the EMI input buffer
    #[arg(long)]
    pub emi: bool,

    /// Allocate the fake-divergence sequence buffer
    #[arg(long = "fake_divergence")]
    pub fake_divergence: bool,

    /// Allocate the inter-thread communication buffer
    #[arg(long = "inter_thread_comm")]
    pub inter_thread_comm: bool,

    /// Verbose diagnostics and build logs
    #[arg(long)]
    pub debug: bool,

    /// Write the program binary to out.bin and exit
    #[arg(long)]
    pub bin: bool,

    /// Turn off device compiler optimizations
    #[arg(long = "disable_opts")]
    pub disable_opts: bool,

    /// Define NO_GROUP_DIVERGENCE
    #[arg(long = "disable_group")]
    pub disable_group: bool,

    /// Define NO_FAKE_DIVERGENCE
    #[arg(long = "disable_fake")]
    pub disable_fake: bool,

    /// Define NO_ATOMICS
    #[arg(long = "disable_atomics")]
    pub disable_atomics: bool,

    /// Pick the first device whose name contains `-n`
    #[arg(long = "set_device_from_name")]
    pub set_device_from_name: bool,

    /// Device API [default: cuda, when built with the `cuda` feature]
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Flags taken from the header line, after normalization
    #[arg(skip)]
    pub header_flags: Vec<String>,
}

/// `---flag` becomes `--flag`; everything else is untouched.
#[must_use]
pub fn normalize_arg(arg: &str) -> String {
    match arg.strip_prefix("---") {
        Some(rest) => format!("--{rest}"),
        None => arg.to_string(),
    }
}

/// First line of `path`, decoded lossily so binaries do not fail.
fn first_line(path: &Path) -> LaunchResult<String> {
    let file = std::fs::File::open(path).map_err(|_| {
        LaunchError::config(format!(
            "Could not open file {} for argument parsing.",
            path.display()
        ))
    })?;
    let mut buf = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Parse `argv` (program name first), merging in the header flags.
pub fn parse_args<I, S>(argv: I) -> LaunchResult<Cli>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv: Vec<String> = argv.into_iter().map(|a| normalize_arg(a.as_ref())).collect();
    let (program, user) = match argv.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => ("gpusmith-launcher".to_string(), Vec::new()),
    };

    let first = Cli::try_parse_from(std::iter::once(program.clone()).chain(user.iter().cloned()))
        .map_err(LaunchError::Usage)?;
    let header_file = first.args_file.as_deref().unwrap_or(&first.file);
    let tokens: Vec<String> = header_tokens(&first_line(header_file)?)
        .iter()
        .map(|t| normalize_arg(t))
        .collect();
    if tokens.is_empty() {
        return Ok(first);
    }

    let merged = std::iter::once(program)
        .chain(tokens.iter().cloned())
        .chain(user);
    let mut cli = Cli::try_parse_from(merged).map_err(LaunchError::Usage)?;
    cli.header_flags = tokens;
    Ok(cli)
}
