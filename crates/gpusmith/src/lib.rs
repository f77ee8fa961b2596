//! gpusmith: random GPU kernel generation.
//!
//! Builds deterministic, checksum-producing compute kernels from a seed.
//! Kernels exercise the memory spaces of a GPU (global, local, private and
//! constant buffers), atomic counters whose results are provably
//! order-independent, work-group barriers placed only where every lane of a
//! group reaches them, and vector expressions.
//!
//! ```no_run
//! use gpusmith::{GenOptions, KernelBuilder, Seed};
//!
//! let kernel = KernelBuilder::new(Seed::from_u64(7))
//!     .options(GenOptions::default().with_atomics(4).with_barriers())
//!     .build()?;
//! println!("{}", kernel.source);
//! # Ok::<(), gpusmith::GenError>(())
//! ```

#![warn(missing_debug_implementations)]

pub mod atomic;
pub mod atomic_result;
pub mod barrier;
pub mod block;
pub mod buffer;
pub mod context;
pub mod error;
pub mod expr;
pub mod globals;
pub mod grammar;
pub mod header;
pub mod manifest;
pub mod params;
pub mod program;
pub mod render;
pub mod rng;
pub mod runtime;
pub mod session;
pub mod types;
pub mod var;
pub mod vector;
pub mod visibility;

pub use error::{GenError, Result};
pub use header::{header_tokens, LaunchHeader};
pub use manifest::{hash_kernel_source, verify, write_with_manifest, KernelManifest};
pub use params::{entry_param_names, KernelFeatures, KernelParam, EMI_INPUT_LEN};
pub use program::{Kernel, KernelBuilder, KernelStats, DEFAULT_RUNTIME_HEADER};
pub use rng::Seed;
pub use runtime::{inline_runtime_header, RUNTIME_HEADER_SOURCE};
pub use session::{GenOptions, Session};

/// Everything needed to drive generation by hand.
pub mod prelude {
    pub use crate::atomic::{AccessClass, AtomicAccess, AtomicExpr, AtomicOp};
    pub use crate::barrier::{BarrierStmt, DivergenceAnalysis};
    pub use crate::block::{BlockId, Stmt};
    pub use crate::buffer::{BufferId, MemorySpace};
    pub use crate::context::CgContext;
    pub use crate::error::{GenError, Result};
    pub use crate::expr::{Expr, Node};
    pub use crate::program::{Kernel, KernelBuilder};
    pub use crate::rng::Seed;
    pub use crate::session::{GenOptions, Session};
    pub use crate::types::{ScalarKind, Type};
    pub use crate::var::{VarId, Variable};
    pub use crate::vector::VectorExpr;
}
