//! Kernels must compile against the shipped runtime header: every helper,
//! type name and constructor they use has to be declared there.

use gpusmith::grammar::VECTOR_BUILTINS;
use gpusmith::{GenOptions, KernelBuilder, Seed, RUNTIME_HEADER_SOURCE};
use std::collections::BTreeSet;

/// Language keywords and CUDA intrinsics that need no declaration.
const PROVIDED: &[&str] = &[
    "if", "for", "while", "else", "return", "sizeof", "struct", "const", "volatile", "extern",
    "void", "char", "short", "int", "long", "unsigned", "signed", "entry", "__global__",
    "__shared__", "__constant__", "__device__", "__syncthreads", "atomicAdd", "atomicSub",
    "atomicInc", "atomicDec", "atomicExch", "atomicCAS", "atomicMin", "atomicMax", "atomicAnd",
    "atomicOr", "atomicXor",
];

fn all_features() -> GenOptions {
    GenOptions::default()
        .with_atomics(4)
        .with_local_atomics()
        .with_barriers()
        .with_vectors()
        .with_inter_thread_comm()
        .with_emi()
        .with_fake_divergence()
        .with_atomic_reductions()
        .with_grid(vec![8, 2], vec![32, 4])
}

/// Identifiers the header must supply: anything called or instantiated,
/// vector type names and their constructors, and the OpenCL scalar names.
fn runtime_names(source: &str) -> BTreeSet<String> {
    let bytes = source.as_bytes();
    let mut names = BTreeSet::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            i += 1;
            continue;
        }
        if !(c.is_ascii_alphabetic() || c == b'_') {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        // Skip the tail of literals such as `0xFFUL`.
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            continue;
        }
        let word = &source[start..i];
        let called = matches!(bytes.get(i), Some(b'(' | b'<'));
        let scalar = matches!(word, "uchar" | "ushort" | "uint" | "ulong");
        let vector = word.starts_with("make_") || is_vector_name(word);
        if (called || scalar || vector) && !PROVIDED.contains(&word) {
            names.insert(word.to_string());
        }
    }
    names
}

fn is_vector_name(word: &str) -> bool {
    let digits = word.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let base = &word[..word.len() - digits.len()];
    ["2", "3", "4", "8", "16"].contains(&digits)
        && ["char", "uchar", "short", "ushort", "int", "uint", "long", "ulong"].contains(&base)
}

fn declared(name: &str) -> bool {
    let header = RUNTIME_HEADER_SOURCE;
    header.contains(&format!("#define {name} "))
        || header.contains(&format!("#define {name}("))
        || header.contains(&format!(" {name};"))
        || header.contains(&format!(" {name}("))
        || header.contains(&format!("GS_VEC_FN2({name},"))
}

#[test]
fn every_runtime_name_is_declared() {
    let mut seen = BTreeSet::new();
    for seed in 0..40 {
        let kernel = KernelBuilder::new(Seed::from_u64(seed))
            .options(all_features())
            .build()
            .unwrap();
        for name in runtime_names(&kernel.source) {
            assert!(declared(&name), "seed {seed}: `{name}` is not declared in gpusmith.h");
            seen.insert(name);
        }
    }
    for expected in ["get_linear_global_id", "transparent_crc", "ulong"] {
        assert!(seen.contains(expected), "{expected} never used");
    }
}

#[test]
fn every_vector_builtin_is_declared() {
    for (name, _) in VECTOR_BUILTINS {
        assert!(declared(name), "{name}");
    }
}

#[test]
fn narrowing_helpers_are_declared() {
    for name in ["vec_lane", "vec_shuffle", "vec_lo", "vec_hi", "vec_even", "vec_odd"] {
        assert!(declared(name), "{name}");
    }
}

#[test]
fn every_vector_name_is_redirected() {
    for base in ["char", "uchar", "short", "ushort", "int", "uint", "long", "ulong"] {
        for len in [2, 3, 4, 8, 16] {
            assert!(declared(&format!("{base}{len}")), "{base}{len}");
            assert!(declared(&format!("make_{base}{len}")), "make_{base}{len}");
        }
    }
}

#[test]
fn kernels_do_not_use_member_swizzles() {
    for seed in 0..40 {
        let kernel = KernelBuilder::new(Seed::from_u64(seed))
            .options(all_features())
            .build()
            .unwrap();
        assert!(!kernel.source.contains(")).s"), "seed {seed}");
        for suffix in [".hi", ".lo", ".even", ".odd", ".x", ".xy"] {
            assert!(!kernel.source.contains(&format!(")){suffix}")), "seed {seed}: {suffix}");
        }
    }
}
