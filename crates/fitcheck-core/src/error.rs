//! Error types for avatar synchronization
//!
//! Every network and file failure surfaces through [`FitCheckError`]. Nothing
//! in this crate retries: each operation makes at most one attempt and leaves
//! retry policy to the caller.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the endpoint or managing presets
#[derive(Debug, Error)]
pub enum FitCheckError {
    /// No matching service advertisement was observed in time
    #[error("No endpoint advertisement observed within {0:?}")]
    DiscoveryTimeout(Duration),

    /// The advertisement listener could not be started or failed
    #[error("Service discovery failed: {0}")]
    Discovery(String),

    /// The parameter tree query failed (transport, HTTP status or body)
    #[error("Parameter tree query to {url} failed: {reason}")]
    QueryFailure { url: String, reason: String },

    /// The parameter tree is missing an expected node
    #[error("Parameter tree has no node at '{path}': {reason}")]
    TreeShape { path: String, reason: String },

    /// A JSON value could not be represented as a parameter scalar
    #[error("Unsupported parameter value at '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    /// Lookup miss in the preset index
    #[error("Preset '{preset}' not found for avatar '{avatar_id}'")]
    PresetNotFound { avatar_id: String, preset: String },

    /// A name-only lookup matched presets on several avatars
    #[error("Preset name '{preset}' exists on several avatars: {}", avatar_ids.join(", "))]
    AmbiguousPreset {
        preset: String,
        avatar_ids: Vec<String>,
    },

    /// A rename target already exists
    #[error("Preset '{preset}' already exists for avatar '{avatar_id}'")]
    PresetAlreadyExists { avatar_id: String, preset: String },

    /// Preset names become file names, so they are restricted
    #[error("Invalid preset name '{0}'")]
    InvalidPresetName(String),

    /// The newly selected avatar did not stabilize in time
    #[error("Avatar did not become ready within {0:?}")]
    ReadinessTimeout(Duration),

    /// A preset file exists but could not be parsed
    #[error("Corrupt preset file '{path}': {reason}")]
    PresetFileCorrupt { path: PathBuf, reason: String },

    /// A preset file that the index refers to is absent from disk
    #[error("Preset file missing from disk: {0}")]
    PresetFileMissing(PathBuf),

    /// OSC packet encode/decode failure
    #[error("OSC error: {0}")]
    Osc(String),

    /// IO error during file or socket operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, FitCheckError>;

impl From<mdns_sd::Error> for FitCheckError {
    fn from(e: mdns_sd::Error) -> Self {
        FitCheckError::Discovery(e.to_string())
    }
}

impl From<rosc::OscError> for FitCheckError {
    fn from(e: rosc::OscError) -> Self {
        FitCheckError::Osc(format!("{:?}", e))
    }
}
