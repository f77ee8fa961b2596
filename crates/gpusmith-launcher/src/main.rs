//! gpusmith-launcher binary

use clap::error::ErrorKind;
use gpusmith_launcher::output::error_prefix;
use gpusmith_launcher::{make_backend, parse_args, phase, run, LaunchError, LaunchResult, RunConfig, RunOutcome};
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(debug: bool) {
    let default = if debug {
        "gpusmith_launcher=debug,gpusmith=debug"
    } else {
        "gpusmith_launcher=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_ansi(console::Term::stderr().is_term())
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    phase::install_panic_hook();
    match launch() {
        Ok(()) => ExitCode::SUCCESS,
        Err(LaunchError::Usage(e))
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            // Prints help or version and exits 0.
            e.exit()
        }
        Err(e) => {
            eprintln!("{} {e}", error_prefix());
            ExitCode::FAILURE
        }
    }
}

fn launch() -> LaunchResult<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;
    init_tracing(cli.debug);
    if !cli.header_flags.is_empty() {
        tracing::debug!(tokens = ?cli.header_flags, "header flags");
    }

    let config = RunConfig::try_from(&cli)?;
    if config.debug {
        if let Ok(json) = serde_json::to_string(&config) {
            tracing::debug!(config = %json, "run config");
        }
    }
    let mut backend = make_backend(config.backend)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&config, backend.as_mut(), &mut out)? {
        RunOutcome::Completed(_) => {}
        RunOutcome::BinaryWritten(path) => {
            tracing::debug!(path = %path.display(), "wrote program binary");
        }
    }
    out.flush()?;
    Ok(())
}
