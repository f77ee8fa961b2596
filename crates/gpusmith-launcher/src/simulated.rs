//! In-process backend.
//!
//! Does not execute kernels: it checks the call sequence and the argument
//! count, records every build and allocation, and hands back the result
//! buffer as allocated (all zeros). Its checksums say nothing about a real
//! device, so it only runs when asked for with `--backend simulated`.

use crate::backend::{check_arity, declared_arity, ComputeBackend, DeviceInfo, DeviceLimits, HostBuffer, KernelArg, KernelSource};
use crate::error::{LaunchError, LaunchResult};
use crate::grid::Grid;
use gpusmith::KernelParam;

/// Device names for the simulated platform, `;` separated.
pub const DEVICES_ENV: &str = "GPUSMITH_SIM_DEVICES";
pub const DEFAULT_DEVICE_NAME: &str = "gpusmith simulated device";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuild {
    pub source: KernelSource,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAlloc {
    pub param: KernelParam,
    pub len: usize,
}

#[derive(Debug, Default)]
pub struct SimulatedBackend {
    devices: Vec<DeviceInfo>,
    selected: Option<DeviceInfo>,
    build: Option<RecordedBuild>,
    declared: Option<usize>,
    allocations: Vec<RecordedAlloc>,
    launches: usize,
}

impl SimulatedBackend {
    /// One platform with the given devices, default limits.
    #[must_use]
    pub fn with_devices<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let devices = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| DeviceInfo {
                platform: 0,
                index,
                name: name.into(),
                limits: DeviceLimits::default(),
            })
            .collect();
        Self {
            devices,
            ..Self::default()
        }
    }

    /// Devices from [`DEVICES_ENV`], or a single default device.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(DEVICES_ENV) {
            Ok(names) if !names.trim().is_empty() => {
                Self::with_devices(names.split(';').map(str::trim).filter(|n| !n.is_empty()))
            }
            _ => Self::with_devices([DEFAULT_DEVICE_NAME]),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        for device in &mut self.devices {
            device.limits = limits.clone();
        }
        self
    }

    #[must_use]
    pub fn selected(&self) -> Option<&DeviceInfo> {
        self.selected.as_ref()
    }

    #[must_use]
    pub fn recorded_build(&self) -> Option<&RecordedBuild> {
        self.build.as_ref()
    }

    #[must_use]
    pub fn allocations(&self) -> &[RecordedAlloc] {
        &self.allocations
    }

    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches
    }
}

impl ComputeBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn devices(&self) -> LaunchResult<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn select(&mut self, device: &DeviceInfo) -> LaunchResult<()> {
        if !self.devices.contains(device) {
            return Err(LaunchError::device(format!(
                "No device for id {}",
                device.index
            )));
        }
        self.selected = Some(device.clone());
        Ok(())
    }

    fn build(&mut self, source: &KernelSource, options: &[String]) -> LaunchResult<()> {
        if self.selected.is_none() {
            return Err(LaunchError::device("build before device selection"));
        }
        if let KernelSource::Text(text) = source {
            if !text.contains("entry") {
                return Err(LaunchError::build(
                    "no entry point",
                    Some("kernel source does not define `entry`".to_string()),
                ));
            }
        }
        self.declared = declared_arity(source);
        self.build = Some(RecordedBuild {
            source: source.clone(),
            options: options.to_vec(),
        });
        Ok(())
    }

    fn program_binary(&self) -> LaunchResult<Vec<u8>> {
        match &self.build {
            Some(RecordedBuild {
                source: KernelSource::Text(text),
                ..
            }) => Ok(text.as_bytes().to_vec()),
            Some(RecordedBuild {
                source: KernelSource::Binary(bytes),
                ..
            }) => Ok(bytes.clone()),
            None => Err(LaunchError::Backend {
                op: "Error getting binary",
                status: "program not built".to_string(),
            }),
        }
    }

    fn launch(&mut self, grid: &Grid, args: &[KernelArg]) -> LaunchResult<Vec<u64>> {
        if self.build.is_none() {
            return Err(LaunchError::Backend {
                op: "Error creating kernel",
                status: "program not built".to_string(),
            });
        }
        check_arity(self.declared, args)?;
        self.allocations = args
            .iter()
            .map(|arg| RecordedAlloc {
                param: arg.param,
                len: arg.data.len(),
            })
            .collect();
        self.launches += 1;
        match args.first() {
            Some(KernelArg {
                param: KernelParam::Result,
                data: HostBuffer::U64(result),
            }) if result.len() == grid.total_threads() => Ok(result.clone()),
            _ => Err(LaunchError::Backend {
                op: "Error reading output buffer",
                status: "first argument is not the result buffer".to_string(),
            }),
        }
    }
}
