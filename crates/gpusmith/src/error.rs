//! Error types for `gpusmith`.
//!
//! Every variant here is generation-fatal: the generator aborts the current
//! kernel instead of emitting a program that could be silently wrong.

use thiserror::Error;

/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, GenError>;

/// Errors that can occur while generating a kernel.
#[derive(Debug, Error)]
pub enum GenError {
    /// Itemize was called with the wrong number of indices.
    #[error("Buffer '{buffer}' has {expected} dimension(s) but was itemized with {actual} index(es)")]
    DimensionMismatch {
        /// Buffer name
        buffer: String,
        /// Dimensionality of the buffer
        expected: usize,
        /// Number of indices supplied
        actual: usize,
    },

    /// Itemize was called on a view instead of a root buffer.
    #[error("Buffer '{buffer}' is already an itemized view and cannot be itemized again")]
    AlreadyItemized {
        /// Buffer name
        buffer: String,
    },

    /// More atomic expressions were requested than the counter pool holds.
    #[error("Atomic region limit of {limit} exceeded")]
    AtomicRegionLimit {
        /// Configured maximum
        limit: usize,
    },

    /// Expression depth budget was exhausted with no fallback for the type.
    #[error("Expression depth budget exhausted at depth {depth} (max {max}) for non-vector type '{ty}'")]
    DepthExhausted {
        /// Current depth
        depth: u32,
        /// Configured maximum
        max: u32,
        /// Requested type
        ty: String,
    },

    /// A vector-only operation got a scalar type.
    #[error("Type '{0}' is not a vector type")]
    NotVectorType(String),

    /// A global root buffer has no kernel parameter to back its storage.
    #[error("Global buffer '{buffer}' is not bound to a kernel parameter")]
    UnboundGlobalBuffer {
        /// Buffer name
        buffer: String,
    },

    /// A synchronization point ended up in divergent code.
    #[error("Barrier placed in divergent block {block}")]
    DivergentBarrier {
        /// Offending block id
        block: u32,
    },

    /// Invalid generator option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Manifest verification failed
    #[error("Manifest verification failed for '{path}': {reason}")]
    ManifestError {
        /// Path to the kernel file
        path: String,
        /// Why verification failed
        reason: String,
    },

    /// Hash mismatch (kernel file was edited after generation)
    #[error("Hash mismatch for '{path}': expected {expected}, got {actual}")]
    HashMismatch {
        /// Path to the kernel file
        path: String,
        /// Expected hash
        expected: String,
        /// Actual hash
        actual: String,
    },

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_dimension_mismatch() {
        let err = GenError::DimensionMismatch {
            buffer: "l_3".to_string(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Buffer 'l_3' has 2 dimension(s) but was itemized with 1 index(es)"
        );
    }

    #[test]
    fn error_display_region_limit() {
        let err = GenError::AtomicRegionLimit { limit: 4 };
        assert!(err.to_string().contains("limit of 4"));
    }

    #[test]
    fn error_display_hash_mismatch() {
        let err = GenError::HashMismatch {
            path: "kernel.cu".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert!(err.to_string().contains("Hash mismatch"));
        assert!(err.to_string().contains("kernel.cu"));
    }
}
