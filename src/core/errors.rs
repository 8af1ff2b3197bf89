//! EMB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, EmbError>;

/// Top-level error type for embiggen-disk.
#[derive(Debug, Error)]
pub enum EmbError {
    #[error("[EMB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[EMB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[EMB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[EMB-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[EMB-2001] error reading state of {resizer}: {source}")]
    StateRead {
        resizer: String,
        #[source]
        source: Box<EmbError>,
    },

    #[error("[EMB-2002] error resolving dependency of {resizer}: {source}")]
    DependencyResolution {
        resizer: String,
        #[source]
        source: Box<EmbError>,
    },

    #[error("[EMB-2003] error resizing {resizer}: {source}")]
    ResizeExecution {
        resizer: String,
        #[source]
        source: Box<EmbError>,
    },

    #[error("[EMB-2004] error after successful resize of {resizer}: {source}")]
    PostResizeState {
        resizer: String,
        #[source]
        source: Box<EmbError>,
    },

    #[error("[EMB-2101] error preparing to enlarge {mount_point}: {source}")]
    ChainResolution {
        mount_point: PathBuf,
        #[source]
        source: Box<EmbError>,
    },

    #[error("[EMB-2201] no mount found for {path}")]
    MountNotFound { path: PathBuf },

    #[error("[EMB-2202] unsupported storage layer {layer}: {details}")]
    UnsupportedLayer { layer: String, details: String },

    #[error("[EMB-2301] {program} failed (exit {exit_code}): {stderr}")]
    ToolFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("[EMB-2302] unparsable output from {program}: {details}")]
    ToolOutput { program: String, details: String },

    #[error("[EMB-2401] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[EMB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[EMB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl EmbError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "EMB-1001",
            Self::MissingConfig { .. } => "EMB-1002",
            Self::ConfigParse { .. } => "EMB-1003",
            Self::UnsupportedPlatform { .. } => "EMB-1101",
            Self::StateRead { .. } => "EMB-2001",
            Self::DependencyResolution { .. } => "EMB-2002",
            Self::ResizeExecution { .. } => "EMB-2003",
            Self::PostResizeState { .. } => "EMB-2004",
            Self::ChainResolution { .. } => "EMB-2101",
            Self::MountNotFound { .. } => "EMB-2201",
            Self::UnsupportedLayer { .. } => "EMB-2202",
            Self::ToolFailed { .. } => "EMB-2301",
            Self::ToolOutput { .. } => "EMB-2302",
            Self::Serialization { .. } => "EMB-2401",
            Self::Io { .. } => "EMB-3002",
            Self::Runtime { .. } => "EMB-3900",
        }
    }

    /// Description of the resizer a chain-stage error refers to.
    #[must_use]
    pub fn resizer(&self) -> Option<&str> {
        match self {
            Self::StateRead { resizer, .. }
            | Self::DependencyResolution { resizer, .. }
            | Self::ResizeExecution { resizer, .. }
            | Self::PostResizeState { resizer, .. } => Some(resizer),
            _ => None,
        }
    }

    /// Whether this error was produced by the chain walk itself (as opposed
    /// to a raw collaborator failure that has not been attributed yet).
    #[must_use]
    pub const fn is_chain_stage(&self) -> bool {
        matches!(
            self,
            Self::StateRead { .. }
                | Self::DependencyResolution { .. }
                | Self::ResizeExecution { .. }
                | Self::PostResizeState { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for EmbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for EmbError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
