//! Error types for the launcher

use thiserror::Error;

/// Result type for launcher operations
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Errors that end a launch. Every one of them exits the process with
/// status 1.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Invalid grid or flags
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Platform or device selection, or a device limit
    #[error("Device error: {message}")]
    Device {
        /// Error message
        message: String,
    },

    /// A backend call returned a failure status
    #[error("{op}: {status}")]
    Backend {
        /// Operation that failed
        op: &'static str,
        /// Status reported by the backend
        status: String,
    },

    /// Kernel compilation failed
    #[error("Error building program: {status}")]
    Build {
        /// Compiler status
        status: String,
        /// Build log, when the compiler produced one
        log: Option<String>,
    },

    /// Launch flags disagree with the kernel's parameters
    #[error("Error setting kernel arguments: {message}")]
    KernelArgs {
        /// What disagreed
        message: String,
    },

    /// Command line could not be parsed (also carries `--help`)
    #[error("{0}")]
    Usage(clap::Error),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a device error
    #[must_use]
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Create a kernel argument error
    #[must_use]
    pub fn kernel_args(message: impl Into<String>) -> Self {
        Self::KernelArgs {
            message: message.into(),
        }
    }

    /// Create a build error
    #[must_use]
    pub fn build(status: impl Into<String>, log: Option<String>) -> Self {
        Self::Build {
            status: status.into(),
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = LaunchError::config("Cannot have more than 3 dimensions!");
        assert_eq!(
            err.to_string(),
            "Configuration error: Cannot have more than 3 dimensions!"
        );
    }

    #[test]
    fn test_backend_error() {
        let err = LaunchError::Backend {
            op: "Error creating output buffer",
            status: "CUDA_ERROR_OUT_OF_MEMORY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error creating output buffer: CUDA_ERROR_OUT_OF_MEMORY"
        );
    }

    #[test]
    fn test_build_error_keeps_log() {
        let err = LaunchError::build("compile failed", Some("line 3: error".to_string()));
        match err {
            LaunchError::Build { log, .. } => assert_eq!(log.as_deref(), Some("line 3: error")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_kernel_args_error() {
        let err = LaunchError::kernel_args("kernel declares 1 parameters, launch passes 3");
        assert_eq!(
            err.to_string(),
            "Error setting kernel arguments: kernel declares 1 parameters, launch passes 3"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LaunchError = io_err.into();
        assert!(matches!(err, LaunchError::Io(_)));
    }
}
