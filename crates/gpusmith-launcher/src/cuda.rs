//! CUDA backend: driver API for devices and launches, NVRTC for builds.
//!
//! There is a single platform; device index is the CUDA ordinal and PTX is
//! the program binary format.

#![allow(unsafe_code)]

use crate::backend::{
    check, check_arity, declared_arity, ComputeBackend, DeviceInfo, DeviceLimits, HostBuffer, KernelArg, KernelSource,
};
use crate::error::{LaunchError, LaunchResult};
use crate::grid::Grid;
use cudarc::driver::sys::CUdevice_attribute as Attr;
use cudarc::driver::{sys, CudaDevice, CudaFunction, CudaSlice, DevicePtr, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileError, CompileOptions, Ptx};
use std::ffi::c_void;
use std::sync::Arc;

const MODULE: &str = "gpusmith";
const ENTRY: &str = "entry";

enum DeviceBuffer {
    U64(CudaSlice<u64>),
    U32(CudaSlice<u32>),
    I32(CudaSlice<i32>),
    I64(CudaSlice<i64>),
}

impl DeviceBuffer {
    fn upload(device: &Arc<CudaDevice>, data: &HostBuffer) -> LaunchResult<Self> {
        let op = "Error creating buffer";
        Ok(match data {
            HostBuffer::U64(v) => Self::U64(check(op, device.htod_copy(v.clone()))?),
            HostBuffer::U32(v) => Self::U32(check(op, device.htod_copy(v.clone()))?),
            HostBuffer::I32(v) => Self::I32(check(op, device.htod_copy(v.clone()))?),
            HostBuffer::I64(v) => Self::I64(check(op, device.htod_copy(v.clone()))?),
        })
    }

    /// Pointer to the device address, as the launch parameter array wants.
    fn kernel_param(&self) -> *mut c_void {
        let ptr: &sys::CUdeviceptr = match self {
            Self::U64(s) => s.device_ptr(),
            Self::U32(s) => s.device_ptr(),
            Self::I32(s) => s.device_ptr(),
            Self::I64(s) => s.device_ptr(),
        };
        (ptr as *const sys::CUdeviceptr).cast_mut().cast()
    }
}

#[derive(Default)]
pub struct CudaBackend {
    device: Option<Arc<CudaDevice>>,
    ptx: Option<Ptx>,
    entry: Option<CudaFunction>,
    /// `.param` count of the loaded entry.
    declared: Option<usize>,
}

impl std::fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaBackend")
            .field("selected", &self.device.as_ref().map(|d| d.ordinal()))
            .field("built", &self.entry.is_some())
            .finish()
    }
}

impl CudaBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> LaunchResult<&Arc<CudaDevice>> {
        self.device
            .as_ref()
            .ok_or_else(|| LaunchError::device("no device selected"))
    }
}

fn limits(device: &Arc<CudaDevice>) -> LaunchResult<DeviceLimits> {
    let attr = |a: Attr| {
        check("Error querying device limits", device.attribute(a)).map(|v| v.max(0) as usize)
    };
    Ok(DeviceLimits {
        max_dims: 3,
        max_local: vec![
            attr(Attr::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X)?,
            attr(Attr::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y)?,
            attr(Attr::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z)?,
        ],
        max_group_size: attr(Attr::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?,
    })
}

fn dim3(sizes: &[usize]) -> (u32, u32, u32) {
    let at = |i: usize| sizes.get(i).copied().unwrap_or(1) as u32;
    (at(0), at(1), at(2))
}

impl ComputeBackend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn devices(&self) -> LaunchResult<Vec<DeviceInfo>> {
        let count = check("Error getting device IDs", CudaDevice::count())?;
        let mut out = Vec::new();
        for index in 0..count.max(0) as usize {
            let device = check("Error creating context", CudaDevice::new(index))?;
            out.push(DeviceInfo {
                platform: 0,
                index,
                name: check("Error getting device name", device.name())?,
                limits: limits(&device)?,
            });
        }
        Ok(out)
    }

    fn select(&mut self, device: &DeviceInfo) -> LaunchResult<()> {
        if device.platform != 0 {
            return Err(LaunchError::device(format!(
                "No platform for id {}",
                device.platform
            )));
        }
        self.device = Some(check("Error creating context", CudaDevice::new(device.index))?);
        Ok(())
    }

    fn build(&mut self, source: &KernelSource, options: &[String]) -> LaunchResult<()> {
        let device = Arc::clone(self.device()?);
        let ptx = match source {
            KernelSource::Binary(bytes) => Ptx::from_src(String::from_utf8_lossy(bytes).into_owned()),
            KernelSource::Text(text) => {
                let (include_paths, options): (Vec<String>, Vec<String>) =
                    options.iter().cloned().partition(|o| o.starts_with("-I"));
                let opts = CompileOptions {
                    include_paths: include_paths
                        .into_iter()
                        .map(|p| p.trim_start_matches("-I").to_string())
                        .collect(),
                    options,
                    ..CompileOptions::default()
                };
                compile_ptx_with_opts(text.as_str(), opts).map_err(|e| match e {
                    CompileError::CompileError { nvrtc, log, .. } => {
                        LaunchError::build(nvrtc.to_string(), Some(log.to_string_lossy().into_owned()))
                    }
                    other => LaunchError::build(other.to_string(), None),
                })?
            }
        };
        check("Error creating program", device.load_ptx(ptx.clone(), MODULE, &[ENTRY]))?;
        let entry = device.get_func(MODULE, ENTRY).ok_or(LaunchError::Backend {
            op: "Error creating kernel",
            status: format!("`{ENTRY}` not found in module"),
        })?;
        self.declared = declared_arity(&KernelSource::Binary(ptx.to_src().into_bytes()));
        if self.declared.is_none() {
            tracing::warn!("could not read the parameter list of `{ENTRY}` from PTX");
        }
        self.ptx = Some(ptx);
        self.entry = Some(entry);
        Ok(())
    }

    fn program_binary(&self) -> LaunchResult<Vec<u8>> {
        self.ptx
            .as_ref()
            .map(|ptx| ptx.to_src().into_bytes())
            .ok_or(LaunchError::Backend {
                op: "Error getting binary",
                status: "program not built".to_string(),
            })
    }

    fn launch(&mut self, grid: &Grid, args: &[KernelArg]) -> LaunchResult<Vec<u64>> {
        let device = Arc::clone(self.device()?);
        let entry = self.entry.clone().ok_or(LaunchError::Backend {
            op: "Error creating kernel",
            status: "program not built".to_string(),
        })?;
        check_arity(self.declared, args)?;
        let buffers = args
            .iter()
            .map(|arg| DeviceBuffer::upload(&device, &arg.data))
            .collect::<LaunchResult<Vec<_>>>()?;
        let mut params: Vec<*mut c_void> = buffers.iter().map(DeviceBuffer::kernel_param).collect();

        let config = LaunchConfig {
            grid_dim: dim3(&grid.groups_per_dim()),
            block_dim: dim3(grid.local()),
            shared_mem_bytes: 0,
        };
        // SAFETY: check_arity matched params against the entry's PTX
        // parameter list and the runner matched each name and position, so
        // every slot is a device pointer the kernel expects. `buffers`
        // outlives the launch and the synchronize below.
        unsafe {
            check("Error enqueueing kernel", entry.launch(config, params.as_mut_slice()))?;
        }
        check("Error sending finish command", device.synchronize())?;

        match buffers.first() {
            Some(DeviceBuffer::U64(result)) => {
                check("Error reading output buffer", device.dtoh_sync_copy(result))
            }
            _ => Err(LaunchError::Backend {
                op: "Error reading output buffer",
                status: "first argument is not the result buffer".to_string(),
            }),
        }
    }
}
