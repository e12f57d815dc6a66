//! Error types shared by the host controller and the panel.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Failures of a single external tool invocation.
///
/// The `Display` text is what the panel shows in its error state, so every
/// variant renders a message a user can act on.
#[derive(thiserror::Error, Debug)]
pub enum InvocationError {
    /// The process could not be started (missing binary, permissions, ...).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The tool ran but exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The tool reported success but its output could not be read.
    #[error("could not read results from {}: {source}", .path.display())]
    Results {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another search owned by the same controller has not finished yet.
    #[error("a search is already running")]
    Busy,
}

/// Local form validation failures. These never leave the panel.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please enter search keywords")]
    EmptyKeywords,

    #[error("{field} must be a date in YYYY-MM-DD form, got {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("start date must not be after end date")]
    ReversedRange,

    #[error("max results must be a whole number between 1 and 100, got {0:?}")]
    MaxResults(String),
}

/// Errors from the persistent settings file.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("settings I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {} is not valid TOML: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors from the search history database.
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("history entry is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("could not create history directory: {0}")]
    Io(#[from] std::io::Error),
}
