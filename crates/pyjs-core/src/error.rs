//! Error taxonomy for the builder graph.
//!
//! Nothing here is retried. Every variant propagates to the binary, which
//! logs it and exits with status 1.

use thiserror::Error;

use crate::io::download::DownloadError;
use crate::io::extract::ExtractError;

/// Errors raised while assembling or running a builder graph.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A required setting or path was never supplied.
    #[error("configuration error: {0}")]
    Config(String),

    /// The settings file could not be parsed or contains an unknown key.
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// The factory has no builder registered under this name.
    #[error("builder type '{0}' not found in any factory")]
    UnknownTarget(String),

    /// An external program could not be found on `PATH`.
    #[error("'{program}' not found on PATH")]
    ToolNotFound {
        /// Program name as it was invoked.
        program: String,
    },

    /// An external program exited with a non-zero status.
    #[error("{program} {} failed ({status}): {stderr}", .args.join(" "))]
    CommandFailed {
        /// Program name as it was invoked.
        program: String,
        /// Arguments passed to the program.
        args: Vec<String>,
        /// Exit status as reported by the OS.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// A file a previous stage should have produced is missing.
    #[error("{0}")]
    Invariant(String),

    /// Fetching a source archive failed.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// Unpacking a source archive failed.
    #[error("extraction failed: {0}")]
    Archive(#[from] ExtractError),

    /// Writing the zipped standard library failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Serialising a builder dump failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create a configuration error.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an error for a stage postcondition that did not hold.
    pub fn invariant(msg: impl std::fmt::Display) -> Self {
        Self::Invariant(msg.to_string())
    }
}

impl From<walkdir::Error> for BuildError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

impl From<fs_extra::error::Error> for BuildError {
    fn from(err: fs_extra::error::Error) -> Self {
        Self::Io(std::io::Error::other(err.to_string()))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
