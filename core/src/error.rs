//! Error types for the orchestrator core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the execution engine.
///
/// Per-hook failures never show up here: they are converted into verdicts so a
/// broken hook cannot abort its siblings. Everything in this enum is fatal for
/// the whole invocation and maps to exit code 1.
#[derive(Debug, Error)]
pub enum HookError {
    /// The event payload could not be read or parsed.
    #[error("input error: {0}")]
    Input(String),

    /// A configuration file is malformed or violates an invariant.
    #[error("configuration error in {file}: {detail}")]
    Config {
        /// File the error was found in.
        file: PathBuf,
        /// Description naming the offending path within the file.
        detail: String,
    },

    /// A spawn was requested after shutdown had started.
    #[error("shutdown in progress, refusing to spawn new hooks")]
    ShutdownInProgress,

    /// Unexpected I/O failure outside any single hook run.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HookError {
    pub fn input(detail: impl Into<String>) -> Self {
        Self::Input(detail.into())
    }

    pub fn config(file: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Config {
            file: file.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HookError>;
