//! Tests for the `gpusmith` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gpusmith() -> Command {
    Command::cargo_bin("gpusmith").unwrap()
}

#[test]
fn prints_kernel_to_stdout() {
    gpusmith()
        .args(["--seed", "11"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("// -l 32 -g 1024\n"))
        .stdout(predicate::str::contains("__global__ void entry(ulong *result)"));
}

#[test]
fn header_carries_features() {
    gpusmith()
        .args(["--seed", "4", "--atomics", "--max-atomic-regions", "2", "--emi", "-l", "8,8", "-g", "64,64"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("// -l 8,8 -g 64,64 --atomics 2 ---emi\n"));
}

#[test]
fn writes_kernel_and_manifest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.cu");
    gpusmith()
        .args(["--seed", "5", "--barriers", "--manifest", "-o"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(path.exists());
    let manifest = gpusmith::verify(&path).unwrap();
    assert_eq!(manifest.generation.seed, 5);
    assert_eq!(manifest.kernel_path, "k.cu");
}

#[test]
fn manifest_needs_output() {
    gpusmith().args(["--seed", "1", "--manifest"]).assert().failure();
}

#[test]
fn bad_grid_fails() {
    gpusmith()
        .args(["--seed", "1", "-l", "3", "-g", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Invalid option"));
}

#[test]
fn local_atomics_need_atomics() {
    gpusmith()
        .args(["--seed", "1", "--local-atomics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--local-atomics requires --atomics"));
}

#[test]
fn runtime_header_written_beside_kernel() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.cu");
    gpusmith()
        .args(["--seed", "6", "--vectors", "--runtime-header", "-o"])
        .arg(&path)
        .assert()
        .success();

    let header = std::fs::read_to_string(dir.path().join("gpusmith.h")).unwrap();
    assert_eq!(header, gpusmith::RUNTIME_HEADER_SOURCE);
}
