//! Validated launch configuration

use crate::commands::{BackendKind, Cli};
use crate::error::{LaunchError, LaunchResult};
use crate::grid::{parse_sizes, Grid};
use gpusmith::KernelFeatures;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where `---bin` writes the program binary, relative to the working
/// directory.
pub const BINARY_OUT: &str = "out.bin";

/// How the device is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelection {
    /// Platform and device index; with a name, the device must match it.
    Index {
        platform: usize,
        device: usize,
        name: Option<String>,
    },
    /// First device on any platform whose name contains the substring.
    Name(String),
}

/// Everything a run needs, checked before any device is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub kernel: PathBuf,
    pub selection: DeviceSelection,
    pub grid: Grid,
    /// Read the kernel as a prebuilt binary of at most this many bytes.
    pub binary_size: Option<usize>,
    pub include_path: String,
    pub features: KernelFeatures,
    pub debug: bool,
    pub dump_binary: bool,
    pub binary_out: PathBuf,
    pub disable_opts: bool,
    pub disable_group: bool,
    pub disable_fake: bool,
    pub disable_atomics: bool,
    /// `None` picks the build's default device API.
    pub backend: Option<BackendKind>,
}

impl RunConfig {
    /// Minimal config for `kernel` on device 0 of platform 0.
    #[must_use]
    pub fn new(kernel: impl Into<PathBuf>) -> Self {
        Self {
            kernel: kernel.into(),
            selection: DeviceSelection::Index {
                platform: 0,
                device: 0,
                name: None,
            },
            grid: Grid::default(),
            binary_size: None,
            include_path: ".".to_string(),
            features: KernelFeatures::default(),
            debug: false,
            dump_binary: false,
            binary_out: PathBuf::from(BINARY_OUT),
            disable_opts: false,
            disable_group: false,
            disable_fake: false,
            disable_atomics: false,
            backend: None,
        }
    }

    #[must_use]
    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = grid;
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: KernelFeatures) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: DeviceSelection) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn with_binary_size(mut self, size: usize) -> Self {
        self.binary_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_dump_binary(mut self, out: impl Into<PathBuf>) -> Self {
        self.dump_binary = true;
        self.binary_out = out.into();
        self
    }

    /// Options handed to the device compiler.
    #[must_use]
    pub fn build_options(&self) -> Vec<String> {
        let mut options = vec!["-w".to_string(), format!("-I{}", self.include_path)];
        if self.disable_opts {
            options.push("--device-debug".to_string());
        }
        let defines = [
            (self.disable_group, "-DNO_GROUP_DIVERGENCE"),
            (self.disable_fake, "-DNO_FAKE_DIVERGENCE"),
            (self.disable_atomics, "-DNO_ATOMICS"),
        ];
        for (on, define) in defines {
            if on {
                options.push(define.to_string());
            }
        }
        options
    }
}

impl TryFrom<&Cli> for RunConfig {
    type Error = LaunchError;

    fn try_from(cli: &Cli) -> LaunchResult<Self> {
        let selection = match (cli.platform, cli.device, &cli.name) {
            (_, _, Some(name)) if cli.set_device_from_name => DeviceSelection::Name(name.clone()),
            (Some(platform), Some(device), name) => DeviceSelection::Index {
                platform,
                device,
                name: name.clone(),
            },
            (_, _, Some(name)) => DeviceSelection::Name(name.clone()),
            _ => {
                if cli.set_device_from_name {
                    return Err(LaunchError::config(
                        "Must give '-n NAME' to use --set_device_from_name",
                    ));
                }
                return Err(LaunchError::config(
                    "Require device index (-d) and platform index (-p) arguments, or device name (-n)!",
                ));
            }
        };

        let local = cli
            .local
            .as_deref()
            .map(|s| parse_sizes(s, "local"))
            .transpose()?;
        let global = cli
            .global
            .as_deref()
            .map(|s| parse_sizes(s, "global"))
            .transpose()?;
        let grid = Grid::new(local, global)?;

        if cli.atomics == Some(0) {
            return Err(LaunchError::config("--atomics needs at least one counter"));
        }

        Ok(Self {
            kernel: cli.file.clone(),
            selection,
            grid,
            binary_size: cli.binary,
            include_path: cli
                .include
                .as_deref()
                .unwrap_or(".")
                .replace('\\', "/"),
            features: KernelFeatures {
                atomics: cli.atomics,
                atomic_reductions: cli.atomic_reductions,
                emi: cli.emi,
                fake_divergence: cli.fake_divergence,
                inter_thread_comm: cli.inter_thread_comm,
            },
            debug: cli.debug,
            dump_binary: cli.bin,
            binary_out: PathBuf::from(BINARY_OUT),
            disable_opts: cli.disable_opts,
            disable_group: cli.disable_group,
            disable_fake: cli.disable_fake,
            disable_atomics: cli.disable_atomics,
            backend: cli.backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("launcher").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn index_selection() {
        let config = RunConfig::try_from(&cli(&["-f", "k.cu", "-p", "1", "-d", "2"])).unwrap();
        assert_eq!(
            config.selection,
            DeviceSelection::Index {
                platform: 1,
                device: 2,
                name: None
            }
        );
    }

    #[test]
    fn name_alone_searches() {
        let config = RunConfig::try_from(&cli(&["-f", "k.cu", "-n", "RTX"])).unwrap();
        assert_eq!(config.selection, DeviceSelection::Name("RTX".to_string()));
    }

    #[test]
    fn set_device_from_name_overrides_index() {
        let config = RunConfig::try_from(&cli(&[
            "-f", "k.cu", "-p", "0", "-d", "0", "-n", "RTX", "--set_device_from_name",
        ]))
        .unwrap();
        assert_eq!(config.selection, DeviceSelection::Name("RTX".to_string()));
    }

    #[test]
    fn selection_is_required() {
        let err = RunConfig::try_from(&cli(&["-f", "k.cu", "-p", "0"])).unwrap_err();
        assert!(err.to_string().contains("Require device index"));
        let err = RunConfig::try_from(&cli(&["-f", "k.cu", "--set_device_from_name"])).unwrap_err();
        assert!(err.to_string().contains("Must give '-n NAME'"));
    }

    #[test]
    fn grid_is_validated() {
        let err = RunConfig::try_from(&cli(&["-f", "k.cu", "-n", "X", "-l", "128,8", "-g", "64,64"]))
            .unwrap_err();
        assert!(err.to_string().contains("Local dimension 0 greater than global dimension!"));
    }

    #[test]
    fn build_options_follow_flags() {
        let config = RunConfig::try_from(&cli(&[
            "-f",
            "k.cu",
            "-n",
            "X",
            "-i",
            "C:\\runtime",
            "--disable_atomics",
            "--disable_group",
            "--disable_opts",
        ]))
        .unwrap();
        assert_eq!(
            config.build_options(),
            vec![
                "-w",
                "-IC:/runtime",
                "--device-debug",
                "-DNO_GROUP_DIVERGENCE",
                "-DNO_ATOMICS"
            ]
        );
    }

    #[test]
    fn features_carry_over() {
        let config = RunConfig::try_from(&cli(&[
            "-f", "k.cu", "-n", "X", "--atomics", "4", "--emi", "--inter_thread_comm",
        ]))
        .unwrap();
        assert_eq!(config.features.atomics, Some(4));
        assert!(config.features.emi);
        assert!(config.features.inter_thread_comm);
        assert!(!config.features.fake_divergence);
    }

    #[test]
    fn config_serializes() {
        let config = RunConfig::new("k.cu");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kernel\":\"k.cu\""));
    }
}
