//! Error types for all optimarr operations.
//!
//! This module defines the `OptimarrError` enum covering every error
//! condition that can occur while scheduling jobs, scanning directories,
//! driving external tools, and talking to the AI provider. It also provides
//! helper constructors and user-facing message formatting.

use thiserror::Error;

/// Represents all possible errors in the optimarr core.
///
/// Each variant provides specific context to facilitate debugging and
/// user-friendly reporting.
///
/// # Exit Codes
///
/// Each error variant maps to an exit code via `OptimarrError::exit_code`.
#[derive(Error, Debug)]
pub enum OptimarrError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// A user-supplied path escaped the configured root directories.
    #[error("Path not within allowed roots: {path}")]
    PathOutsideRoots {
        /// The offending path, as supplied by the caller
        path: String,
    },

    /// A path input was empty or otherwise malformed before confinement.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No job with the given id is known to the manager.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The pending-job queue is at capacity.
    #[error("Job queue is full")]
    QueueFull,

    /// An external tool binary could not be located.
    #[error("External tool not found: {0}")]
    ToolMissing(String),

    /// An external tool ran but exited unsuccessfully.
    ///
    /// Carries the tool name and a message that includes the tail of the
    /// tool's output so the failure is diagnosable from the job record.
    #[error("{tool} failed: {message}")]
    Tool {
        /// Tool binary name (e.g. "ffmpeg", "makemkvcon")
        tool: String,
        /// Failure description including captured output
        message: String,
    },

    /// Error during directory scanning or file classification.
    #[error("Scan error: {message}")]
    Scan {
        /// Description of the scan failure
        message: String,
    },

    /// AI service encountered an error.
    #[error("AI service error: {0}")]
    AiService(String),

    /// The operation was cancelled by the user or by shutdown.
    #[error("Operation cancelled")]
    Cancelled,

    /// Failure to read or write a persisted store.
    #[error("Persistence error: {message}")]
    Persistence {
        /// Description of the persistence failure
        message: String,
    },

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert reqwest error to AI service error
impl From<reqwest::Error> for OptimarrError {
    fn from(err: reqwest::Error) -> Self {
        OptimarrError::AiService(err.to_string())
    }
}

// Convert file exploration error to scan error
impl From<walkdir::Error> for OptimarrError {
    fn from(err: walkdir::Error) -> Self {
        OptimarrError::Scan {
            message: err.to_string(),
        }
    }
}

// Convert watcher error to scan error
impl From<notify::Error> for OptimarrError {
    fn from(err: notify::Error) -> Self {
        OptimarrError::Scan {
            message: err.to_string(),
        }
    }
}

// Convert config crate error to configuration error
impl From<config::ConfigError> for OptimarrError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => OptimarrError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => OptimarrError::Config { message: msg },
            _ => OptimarrError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<serde_json::Error> for OptimarrError {
    fn from(err: serde_json::Error) -> Self {
        OptimarrError::Persistence {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

/// Specialized `Result` type for optimarr operations.
pub type OptimarrResult<T> = Result<T, OptimarrError>;

impl OptimarrError {
    /// Create a configuration error with the given message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        OptimarrError::Config {
            message: message.into(),
        }
    }

    /// Create a scan error with the given message.
    pub fn scan<S: Into<String>>(message: S) -> Self {
        OptimarrError::Scan {
            message: message.into(),
        }
    }

    /// Create an AI service error with the given message.
    pub fn ai_service<S: Into<String>>(message: S) -> Self {
        OptimarrError::AiService(message.into())
    }

    /// Create an external-tool failure error.
    pub fn tool<S1, S2>(tool: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        OptimarrError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error with the given message.
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        OptimarrError::Persistence {
            message: message.into(),
        }
    }

    /// Whether this error represents a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OptimarrError::Cancelled)
    }

    /// Return the corresponding exit code for this error variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            OptimarrError::Io(_) => 1,
            OptimarrError::Config { .. } => 2,
            OptimarrError::AiService(_) => 3,
            OptimarrError::PathOutsideRoots { .. } | OptimarrError::InvalidPath(_) => 4,
            OptimarrError::Tool { .. } | OptimarrError::ToolMissing(_) => 5,
            OptimarrError::Scan { .. } => 6,
            OptimarrError::Persistence { .. } => 7,
            _ => 1,
        }
    }

    /// Return a user-friendly error message with suggested remedies.
    pub fn user_friendly_message(&self) -> String {
        match self {
            OptimarrError::Io(e) => format!("File operation error: {}", e),
            OptimarrError::Config { message } => format!(
                "Configuration error: {}\nHint: run 'optimarr --help' for configuration details",
                message
            ),
            OptimarrError::PathOutsideRoots { path } => format!(
                "Path not within allowed roots: {}\nHint: check the configured source and output directories",
                path
            ),
            OptimarrError::AiService(msg) => format!(
                "AI service error: {}\nHint: check network connection and API key settings",
                msg
            ),
            OptimarrError::ToolMissing(tool) => format!(
                "External tool not found: {}\nHint: install it or set its path in the tools section",
                tool
            ),
            OptimarrError::Tool { tool, message } => format!("{} failed: {}", tool, message),
            OptimarrError::Scan { message } => format!(
                "Scan error: {}\nHint: verify watch directory paths and patterns",
                message
            ),
            OptimarrError::Other(err) => {
                format!("Unknown error: {}\nHint: please report this issue", err)
            }
            _ => format!("Error: {}", self),
        }
    }
}

// Unit tests: OptimarrError error types and helper methods
#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = OptimarrError::config("test config error");
        assert!(matches!(error, OptimarrError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_tool_error_creation() {
        let error = OptimarrError::tool("ffmpeg", "exit status 1");
        assert!(matches!(error, OptimarrError::Tool { .. }));
        let msg = error.to_string();
        assert!(msg.contains("ffmpeg"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OptimarrError = io_error.into();
        assert!(matches!(err, OptimarrError::Io(_)));
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(OptimarrError::Cancelled.is_cancelled());
        assert!(!OptimarrError::config("x").is_cancelled());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(OptimarrError::config("test").exit_code(), 2);
        assert_eq!(OptimarrError::ai_service("test").exit_code(), 3);
        assert_eq!(OptimarrError::tool("ffmpeg", "test").exit_code(), 5);
        assert_eq!(OptimarrError::scan("test").exit_code(), 6);
    }

    #[test]
    fn test_user_friendly_messages() {
        let config_error = OptimarrError::config("missing key");
        let message = config_error.user_friendly_message();
        assert!(message.contains("Configuration error:"));

        let ai_error = OptimarrError::ai_service("network failure");
        let message = ai_error.user_friendly_message();
        assert!(message.contains("AI service error:"));
        assert!(message.contains("check network connection"));
    }
}
