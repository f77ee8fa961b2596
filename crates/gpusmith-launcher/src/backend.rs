//! Compute backend abstraction.
//!
//! The runner talks to devices only through [`ComputeBackend`]. Failures
//! from the underlying API go through [`check`], which logs the failing
//! operation and turns it into [`LaunchError::Backend`].

use crate::error::{LaunchError, LaunchResult};
use crate::grid::Grid;
use gpusmith::KernelParam;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// What a device can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_dims: usize,
    /// Largest local size per dimension.
    pub max_local: Vec<usize>,
    pub max_group_size: usize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_dims: 3,
            max_local: vec![1024, 1024, 64],
            max_group_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: usize,
    pub index: usize,
    pub name: String,
    pub limits: DeviceLimits,
}

/// Kernel handed to [`ComputeBackend::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    Text(String),
    /// Prebuilt program in the backend's binary format.
    Binary(Vec<u8>),
}

/// Host-side contents of one kernel argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostBuffer {
    U64(Vec<u64>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl HostBuffer {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U64(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One positional kernel argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelArg {
    pub param: KernelParam,
    pub data: HostBuffer,
}

pub trait ComputeBackend {
    fn name(&self) -> &'static str;

    /// Every device on every platform.
    fn devices(&self) -> LaunchResult<Vec<DeviceInfo>>;

    fn select(&mut self, device: &DeviceInfo) -> LaunchResult<()>;

    fn build(&mut self, source: &KernelSource, options: &[String]) -> LaunchResult<()>;

    /// The built program in binary form.
    fn program_binary(&self) -> LaunchResult<Vec<u8>>;

    /// Run `entry` over `grid` and read back the result buffer, which is
    /// always the first argument.
    fn launch(&mut self, grid: &Grid, args: &[KernelArg]) -> LaunchResult<Vec<u64>>;
}

/// Number of parameters the kernel's `entry` declares, when it can be read
/// from the source: C text or PTX.
#[must_use]
pub fn declared_arity(source: &KernelSource) -> Option<usize> {
    match source {
        KernelSource::Text(text) => gpusmith::entry_param_names(text).map(|names| names.len()),
        KernelSource::Binary(bytes) => ptx_entry_arity(std::str::from_utf8(bytes).ok()?),
    }
}

/// `.param` count of `.entry entry(...)` in PTX text.
fn ptx_entry_arity(ptx: &str) -> Option<usize> {
    let start = ptx.find(".entry entry(")? + ".entry entry(".len();
    let len = ptx[start..].find(')')?;
    Some(ptx[start..start + len].matches(".param").count())
}

/// Refuse a launch whose argument count differs from the kernel's.
pub fn check_arity(declared: Option<usize>, args: &[KernelArg]) -> LaunchResult<()> {
    match declared {
        Some(n) if n != args.len() => Err(LaunchError::kernel_args(format!(
            "kernel declares {n} parameters, launch passes {}",
            args.len()
        ))),
        _ => Ok(()),
    }
}

/// Map a backend call's result, logging failures.
pub fn check<T, E: Display>(op: &'static str, result: Result<T, E>) -> LaunchResult<T> {
    result.map_err(|e| {
        tracing::error!(op, status = %e, "backend call failed");
        LaunchError::Backend {
            op,
            status: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_ok_through() {
        let value = check::<_, String>("noop", Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn check_names_operation() {
        let err = check::<(), _>("Error creating kernel", Err("status -46")).unwrap_err();
        assert_eq!(err.to_string(), "Error creating kernel: status -46");
    }

    #[test]
    fn host_buffer_len() {
        assert_eq!(HostBuffer::I32(vec![1, 2, 3]).len(), 3);
        assert!(HostBuffer::U64(Vec::new()).is_empty());
    }

    #[test]
    fn arity_from_text() {
        let source = KernelSource::Text("void entry(ulong *result, int *emi_input) {}".to_string());
        assert_eq!(declared_arity(&source), Some(2));
        let unknown = KernelSource::Text("__global__ void other() {}".to_string());
        assert_eq!(declared_arity(&unknown), None);
    }

    #[test]
    fn arity_from_ptx() {
        let ptx = ".visible .entry entry(\n\t.param .u64 entry_param_0,\n\t.param .u64 entry_param_1\n)\n{\n}\n";
        assert_eq!(declared_arity(&KernelSource::Binary(ptx.as_bytes().to_vec())), Some(2));
        assert_eq!(declared_arity(&KernelSource::Binary(vec![0xff, 0xfe])), None);
    }

    #[test]
    fn arity_mismatch_is_refused() {
        let args = vec![KernelArg {
            param: KernelParam::Result,
            data: HostBuffer::U64(vec![0; 4]),
        }];
        assert!(check_arity(Some(1), &args).is_ok());
        assert!(check_arity(None, &args).is_ok());
        let err = check_arity(Some(3), &args).unwrap_err();
        assert!(matches!(err, LaunchError::KernelArgs { .. }));
    }
}
