//! Kernel manifests.
//!
//! Every kernel written with [`write_with_manifest`] gets a sibling
//! `<file>.manifest.json` recording a blake3 hash of the source, the launch
//! header and how to regenerate it. The launcher checks the hash in debug
//! mode so a hand-edited kernel is never mistaken for generator output.

use crate::error::{GenError, Result};
use crate::header::LaunchHeader;
use crate::program::Kernel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a kernel came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub tool: String,
    pub version: String,
    pub seed: u64,
    /// RFC 3339 generation time.
    pub timestamp: String,
    pub regenerate_cmd: String,
}

impl GenerationMetadata {
    #[must_use]
    pub fn for_kernel(kernel: &Kernel) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            seed: kernel.seed.value(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            regenerate_cmd: regenerate_cmd(kernel),
        }
    }
}

fn regenerate_cmd(kernel: &Kernel) -> String {
    let opts = &kernel.options;
    let join = |sizes: &[usize]| {
        sizes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    let mut cmd = format!(
        "gpusmith --seed {} -l {} -g {}",
        kernel.seed,
        join(&opts.local_size),
        join(&opts.global_size)
    );
    if opts.atomics {
        cmd.push_str(&format!(" --atomics --max-atomic-regions {}", opts.max_atomic_regions));
    }
    let flags = [
        (opts.local_atomics, " --local-atomics"),
        (opts.barriers, " --barriers"),
        (opts.vectors, " --vectors"),
        (opts.inter_thread_comm, " --inter-thread-comm"),
        (opts.emi, " --emi"),
        (opts.fake_divergence, " --fake-divergence"),
        (opts.atomic_reductions, " --atomic-reductions"),
    ];
    for (on, flag) in flags {
        if on {
            cmd.push_str(flag);
        }
    }
    cmd
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelManifest {
    pub manifest_version: u32,
    /// File name of the kernel, relative to the manifest.
    pub kernel_path: String,
    pub kernel_hash: String,
    pub launch: LaunchHeader,
    pub generation: GenerationMetadata,
}

impl KernelManifest {
    pub const VERSION: u32 = 1;

    #[must_use]
    pub fn new(
        kernel_path: impl Into<String>,
        kernel_hash: impl Into<String>,
        launch: LaunchHeader,
        generation: GenerationMetadata,
    ) -> Self {
        Self {
            manifest_version: Self::VERSION,
            kernel_path: kernel_path.into(),
            kernel_hash: kernel_hash.into(),
            launch,
            generation,
        }
    }

    /// `<dir>/<file>.manifest.json` for `<dir>/<file>`.
    #[must_use]
    pub fn manifest_path(kernel_path: &Path) -> PathBuf {
        let mut filename = kernel_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        filename.push_str(".manifest.json");
        kernel_path.with_file_name(filename)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[must_use]
pub fn hash_kernel_source(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().to_string()
}

/// Check `kernel_path` against its manifest.
pub fn verify(kernel_path: &Path) -> Result<KernelManifest> {
    let manifest_path = KernelManifest::manifest_path(kernel_path);
    let manifest =
        KernelManifest::read(&manifest_path).map_err(|e| GenError::ManifestError {
            path: kernel_path.display().to_string(),
            reason: format!("cannot read {}: {e}", manifest_path.display()),
        })?;
    let source = std::fs::read_to_string(kernel_path)?;
    let actual = hash_kernel_source(&source);
    if actual != manifest.kernel_hash {
        return Err(GenError::HashMismatch {
            path: kernel_path.display().to_string(),
            expected: manifest.kernel_hash,
            actual,
        });
    }
    Ok(manifest)
}

/// Write the kernel source and its manifest next to it.
pub fn write_with_manifest(path: &Path, kernel: &Kernel) -> Result<PathBuf> {
    std::fs::write(path, &kernel.source)?;
    let manifest = KernelManifest::new(
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        hash_kernel_source(&kernel.source),
        kernel.header.clone(),
        GenerationMetadata::for_kernel(kernel),
    );
    let manifest_path = KernelManifest::manifest_path(path);
    manifest.write(&manifest_path)?;
    tracing::debug!(path = %manifest_path.display(), "wrote manifest");
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::KernelBuilder;
    use crate::rng::Seed;
    use crate::session::GenOptions;
    use tempfile::TempDir;

    fn kernel() -> Kernel {
        KernelBuilder::new(Seed::from_u64(42))
            .options(GenOptions::default().with_atomics(2).with_barriers())
            .build()
            .unwrap()
    }

    #[test]
    fn manifest_path_is_sibling() {
        let path = Path::new("/tmp/k/kernel.cu");
        assert_eq!(
            KernelManifest::manifest_path(path),
            PathBuf::from("/tmp/k/kernel.cu.manifest.json")
        );
    }

    #[test]
    fn write_then_verify() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kernel.cu");
        let k = kernel();
        write_with_manifest(&path, &k)?;
        let manifest = verify(&path)?;
        assert_eq!(manifest.generation.seed, 42);
        assert_eq!(manifest.launch, k.header);
        assert!(manifest
            .generation
            .regenerate_cmd
            .starts_with("gpusmith --seed 42 -l 32 -g 1024 --atomics --max-atomic-regions 2"));
        Ok(())
    }

    #[test]
    fn verify_detects_edit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kernel.cu");
        write_with_manifest(&path, &kernel()).unwrap();
        std::fs::write(&path, "// edited\n").unwrap();
        match verify(&path) {
            Err(GenError::HashMismatch { expected, actual, .. }) => assert_ne!(expected, actual),
            other => panic!("expected hash mismatch, got {other:?}"),
        }
    }

    #[test]
    fn verify_without_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kernel.cu");
        std::fs::write(&path, "// -l 1 -g 1\n").unwrap();
        assert!(matches!(verify(&path), Err(GenError::ManifestError { .. })));
    }
}
