//! gpusmith-launcher: run generated kernels and print per-thread checksums.
//!
//! ```bash
//! gpusmith-launcher -f kernel.cu -p 0 -d 0
//! gpusmith-launcher -f kernel.cu -n "RTX" ---debug
//! gpusmith-launcher -f kernel.cu -p 0 -d 0 ---bin        # write out.bin and exit
//! ```
//!
//! Launch flags are read from the kernel's first-line `//` header before
//! the command line, so a generated kernel needs only a device selection.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod commands;
pub mod config;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod error;
pub mod grid;
pub mod output;
pub mod phase;
pub mod runner;
pub mod simulated;

pub use backend::{check, ComputeBackend, DeviceInfo, DeviceLimits, HostBuffer, KernelArg, KernelSource};
pub use commands::{normalize_arg, parse_args, BackendKind, Cli};
pub use config::{DeviceSelection, RunConfig};
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
pub use error::{LaunchError, LaunchResult};
pub use grid::Grid;
pub use runner::{allocate, run, RunOutcome};
pub use simulated::SimulatedBackend;

/// Backend for `kind`. With no explicit choice only a real device API is
/// used; the simulated backend must be asked for.
pub fn make_backend(kind: Option<BackendKind>) -> LaunchResult<Box<dyn ComputeBackend>> {
    match kind {
        Some(BackendKind::Simulated) => {
            tracing::warn!("simulated backend: the kernel is not executed and every checksum is 0");
            Ok(Box::new(SimulatedBackend::from_env()))
        }
        #[cfg(feature = "cuda")]
        Some(BackendKind::Cuda) | None => Ok(Box::new(CudaBackend::new())),
        #[cfg(not(feature = "cuda"))]
        Some(BackendKind::Cuda) => Err(LaunchError::config(
            "CUDA backend not enabled. Rebuild with --features cuda",
        )),
        #[cfg(not(feature = "cuda"))]
        None => Err(LaunchError::config(
            "No device backend in this build. Rebuild with --features cuda, \
             or pass --backend simulated to check a launch without running it",
        )),
    }
}
