use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error("Runner error: {0}")]
    Runner(String),
}

/// Input validation failures raised before any workflow is instrumented.
///
/// Every variant carries the offending path so the caller can report it
/// without further context.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("workflow directory not found: {}", .0.display())]
    MissingWorkflowDir(PathBuf),

    #[error("no workflow files found in {}", .0.display())]
    NoWorkflows(PathBuf),

    #[error("refusing symlinked workflow path: {}", .0.display())]
    Symlink(PathBuf),

    #[error("workflow path escapes the repository root: {}", .0.display())]
    PathEscape(PathBuf),

    #[error("workflow {} is {size} bytes, over the {limit} byte limit", .path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("workflow {} looks like a binary file", .0.display())]
    Binary(PathBuf),

    #[error("failed to parse workflow {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read workflow {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow worker failed: {0}")]
    Worker(String),
}
