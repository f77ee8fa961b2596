//! One launch, start to finish.
//!
//! Select a device, check the grid against it, build (or load) the program,
//! check the launch flags against the kernel's parameters, then allocate
//! the positional arguments and run. Buffers are allocated only after every
//! check has passed.

use crate::backend::{ComputeBackend, DeviceInfo, HostBuffer, KernelArg, KernelSource};
use crate::config::{DeviceSelection, RunConfig};
use crate::error::{LaunchError, LaunchResult};
use crate::grid::Grid;
use crate::output::write_checksums;
use crate::phase::{self, Phase};
use gpusmith::manifest::{self, KernelManifest};
use gpusmith::{KernelFeatures, KernelParam, DEFAULT_RUNTIME_HEADER, EMI_INPUT_LEN};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Kernel ran; one checksum per thread.
    Completed(Vec<u64>),
    /// `---bin`: the program binary was written here and nothing ran.
    BinaryWritten(PathBuf),
}

/// Positional kernel arguments with their initial contents.
#[must_use]
pub fn allocate(features: &KernelFeatures, grid: &Grid) -> Vec<KernelArg> {
    let threads = grid.total_threads();
    let groups = grid.groups();
    features
        .params()
        .into_iter()
        .map(|param| {
            let data = match param {
                KernelParam::Result => HostBuffer::U64(vec![0; threads]),
                KernelParam::AtomicInput | KernelParam::SpecialValues => {
                    HostBuffer::U32(vec![0; features.atomics.unwrap_or(0) * groups])
                }
                KernelParam::AtomicReduction => HostBuffer::I32(vec![0; groups]),
                KernelParam::EmiInput => HostBuffer::I32(
                    (0..EMI_INPUT_LEN).map(|i| (EMI_INPUT_LEN - i) as i32).collect(),
                ),
                KernelParam::SequenceInput => {
                    HostBuffer::I32((0..grid.max_global()).map(|i| 10 + i as i32).collect())
                }
                KernelParam::CommValues => HostBuffer::I64(vec![1; threads]),
            };
            tracing::debug!(param = %param.name(), len = data.len(), "allocated buffer");
            KernelArg { param, data }
        })
        .collect()
}

/// Resolve the configured selection against what the backend reports.
pub fn select_device(
    selection: &DeviceSelection,
    devices: &[DeviceInfo],
) -> LaunchResult<DeviceInfo> {
    for d in devices {
        tracing::debug!(
            "At platform {} and device {} with name [{}]",
            d.platform,
            d.index,
            d.name
        );
    }
    match selection {
        DeviceSelection::Name(name) => devices
            .iter()
            .find(|d| d.name.contains(name.as_str()))
            .cloned()
            .ok_or_else(|| {
                LaunchError::device(format!(
                    "No matching platform or device found for name {name}"
                ))
            }),
        DeviceSelection::Index {
            platform,
            device,
            name,
        } => {
            if !devices.iter().any(|d| d.platform == *platform) {
                return Err(LaunchError::device(format!("No platform for id {platform}")));
            }
            let found = devices
                .iter()
                .find(|d| d.platform == *platform && d.index == *device)
                .ok_or_else(|| LaunchError::device(format!("No device for id {device}")))?;
            if let Some(name) = name {
                if !found.name.contains(name.as_str()) {
                    return Err(LaunchError::device(format!(
                        "Given name, {name}, not found in device name, {}.",
                        found.name
                    )));
                }
            }
            Ok(found.clone())
        }
    }
}

/// Warn when a generated kernel no longer matches its manifest.
fn check_manifest(config: &RunConfig) {
    if !KernelManifest::manifest_path(&config.kernel).exists() {
        return;
    }
    match manifest::verify(&config.kernel) {
        Ok(m) => tracing::debug!(seed = m.generation.seed, "manifest verified"),
        Err(e) => tracing::warn!("{e}"),
    }
}

fn load_kernel(config: &RunConfig) -> LaunchResult<KernelSource> {
    match config.binary_size {
        Some(limit) => {
            let mut bytes = Vec::with_capacity(limit);
            std::fs::File::open(&config.kernel)
                .map_err(|_| {
                    LaunchError::config(format!("Could not open {}.", config.kernel.display()))
                })?
                .take(limit as u64)
                .read_to_end(&mut bytes)?;
            tracing::debug!(bytes = bytes.len(), "loaded prebuilt binary");
            Ok(KernelSource::Binary(bytes))
        }
        None => {
            let text = std::fs::read_to_string(&config.kernel).map_err(|_| {
                LaunchError::config(format!("Could not open {}.", config.kernel.display()))
            })?;
            if config.debug {
                check_manifest(config);
            }
            let on_path = Path::new(&config.include_path)
                .join(DEFAULT_RUNTIME_HEADER)
                .exists();
            if !on_path {
                if let Some(inlined) = gpusmith::inline_runtime_header(&text) {
                    tracing::debug!(include_path = %config.include_path, "inlined bundled runtime header");
                    return Ok(KernelSource::Text(inlined));
                }
            }
            Ok(KernelSource::Text(text))
        }
    }
}

fn describe(features: &KernelFeatures) -> String {
    let names: Vec<&str> = features.params().into_iter().map(KernelParam::name).collect();
    match features.atomics {
        Some(regions) => format!("({}) with {regions} atomic regions", names.join(", ")),
        None => format!("({})", names.join(", ")),
    }
}

/// Refuse launch flags that disagree with the kernel: the manifest's launch
/// features when one sits next to a text kernel, and the `entry` parameter
/// list of the source itself.
fn check_kernel_args(config: &RunConfig, source: &KernelSource) -> LaunchResult<()> {
    let manifest_path = KernelManifest::manifest_path(&config.kernel);
    if config.binary_size.is_none() && manifest_path.exists() {
        let manifest = KernelManifest::read(&manifest_path).map_err(|e| {
            LaunchError::kernel_args(format!("{}: {e}", manifest_path.display()))
        })?;
        if manifest.launch.features != config.features {
            return Err(LaunchError::kernel_args(format!(
                "kernel was generated for {}, flags give {}",
                describe(&manifest.launch.features),
                describe(&config.features)
            )));
        }
    }
    if let KernelSource::Text(text) = source {
        if let Some(declared) = gpusmith::entry_param_names(text) {
            let expected: Vec<&str> = config
                .features
                .params()
                .into_iter()
                .map(KernelParam::name)
                .collect();
            if declared != expected {
                return Err(LaunchError::kernel_args(format!(
                    "kernel declares ({}), flags give ({})",
                    declared.join(", "),
                    expected.join(", ")
                )));
            }
        }
    }
    Ok(())
}

/// Run `config` on `backend`, writing checksums to `out`.
pub fn run(
    config: &RunConfig,
    backend: &mut dyn ComputeBackend,
    out: &mut dyn Write,
) -> LaunchResult<RunOutcome> {
    phase::set(Phase::Setup);
    let grid = &config.grid;
    tracing::debug!(
        backend = backend.name(),
        local = ?grid.local(),
        global = ?grid.global(),
        total_threads = grid.total_threads(),
        groups = grid.groups(),
        "launch grid"
    );

    let device = select_device(&config.selection, &backend.devices()?)?;
    grid.check_limits(&device.limits)?;
    backend.select(&device)?;
    tracing::debug!("Device: {}", device.name);

    let source = load_kernel(config)?;
    let options = config.build_options();
    phase::set(Phase::Build);
    if let Err(e) = backend.build(&source, &options) {
        if let (true, LaunchError::Build { log: Some(log), .. }) = (config.debug, &e) {
            eprintln!("{log}");
        }
        return Err(e);
    }
    tracing::info!("Compilation terminated successfully...");

    if config.dump_binary {
        let binary = backend.program_binary()?;
        std::fs::write(&config.binary_out, binary).map_err(|_| {
            LaunchError::config(format!(
                "Could not open output file \"{}\"",
                config.binary_out.display()
            ))
        })?;
        return Ok(RunOutcome::BinaryWritten(config.binary_out.clone()));
    }

    check_kernel_args(config, &source)?;
    let args = allocate(&config.features, grid);
    phase::set(Phase::Execution);
    let checksums = backend.launch(grid, &args)?;
    write_checksums(out, &checksums)?;
    Ok(RunOutcome::Completed(checksums))
}
