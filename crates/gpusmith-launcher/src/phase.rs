//! Which stage of a launch the process is in.
//!
//! A panic anywhere (including inside a device driver callback) is reported
//! with the stage it happened in, then the process exits with status 1.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Setup = 0,
    Build = 1,
    Execution = 2,
}

static PHASE: AtomicU8 = AtomicU8::new(Phase::Setup as u8);

pub fn set(phase: Phase) {
    PHASE.store(phase as u8, Ordering::SeqCst);
    tracing::trace!(?phase, "phase");
}

#[must_use]
pub fn current() -> Phase {
    from_raw(PHASE.load(Ordering::SeqCst))
}

const fn from_raw(raw: u8) -> Phase {
    match raw {
        1 => Phase::Build,
        2 => Phase::Execution,
        _ => Phase::Setup,
    }
}

#[must_use]
pub fn describe(phase: Phase) -> &'static str {
    match phase {
        Phase::Setup => "Unknown source of exception",
        Phase::Build => "Exception occurred during build",
        Phase::Execution => "Exception occurred during kernel execution",
    }
}

/// Report panics with the current phase and exit 1.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("Exception detected during test execution!");
        eprintln!("{}", describe(current()));
        eprintln!("{info}");
        std::process::exit(1);
    }));
}
