//! The runtime header every generated kernel includes.
//!
//! Kernels `#include "gpusmith.h"`; that header supplies the OpenCL-style
//! type names, linear thread ids, vector helpers and `transparent_crc`.
//! It ships inside this crate so a kernel can always be compiled, either by
//! writing it next to the kernel or by splicing it in place of the include.

use crate::program::DEFAULT_RUNTIME_HEADER;
use std::path::{Path, PathBuf};

/// Text of `gpusmith.h`.
pub const RUNTIME_HEADER_SOURCE: &str = include_str!("../runtime/gpusmith.h");

/// Replace the runtime `#include` line of `source` with the header text.
///
/// Returns `None` when `source` does not include the default runtime header.
#[must_use]
pub fn inline_runtime_header(source: &str) -> Option<String> {
    let include = format!("#include \"{DEFAULT_RUNTIME_HEADER}\"");
    let mut found = false;
    let mut out = String::with_capacity(source.len() + RUNTIME_HEADER_SOURCE.len());
    for line in source.split_inclusive('\n') {
        if !found && line.trim_end() == include {
            found = true;
            out.push_str(RUNTIME_HEADER_SOURCE);
            if !RUNTIME_HEADER_SOURCE.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
        }
    }
    found.then_some(out)
}

/// Write `gpusmith.h` into `dir`.
pub fn write_runtime_header(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join(DEFAULT_RUNTIME_HEADER);
    std::fs::write(&path, RUNTIME_HEADER_SOURCE)?;
    Ok(path)
}
