//! Typed error types for the download orchestration core.
//!
//! Failures inside one supervised task never surface here; they end up as
//! the task's terminal `Failed` reason. This enum covers the failures that
//! cross the crate's API boundary.

use thiserror::Error;

/// Unified error type for the downloader core.
#[derive(Debug, Error)]
pub enum DownloaderError {
    /// The mandatory downloader executable was not found in any bundled or
    /// system location.
    #[error("{name} executable not found in bundled resources or system paths")]
    ToolchainMissing { name: String },

    /// The OS refused to start a subprocess.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A `--list-formats` query could not produce a format table.
    #[error("format listing failed for {url}: {reason}")]
    FormatList { url: String, reason: String },

    #[error("io error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

// Convenience constructors
impl DownloaderError {
    pub fn toolchain_missing(name: impl Into<String>) -> Self {
        Self::ToolchainMissing { name: name.into() }
    }

    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn { program: program.into(), source }
    }

    pub fn format_list(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FormatList { url: url.into(), reason: reason.into() }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}
