//! BAL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, BalanceError>;

/// Top-level error type for the branch balancer.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("[BAL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BAL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[BAL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BAL-1004] invalid size {input:?}: {details}")]
    InvalidSize { input: String, details: String },

    #[error("[BAL-1005] invalid glob pattern {pattern:?}: {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("[BAL-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[BAL-2001] {path} is not a mergerfs mount: {details}")]
    NotAUnionMount { path: PathBuf, details: String },

    #[error("[BAL-2002] extended attribute {name} unreadable on {path}: {details}")]
    Attribute {
        path: PathBuf,
        name: String,
        details: String,
    },

    #[error("[BAL-2101] capacity query failure for {path}: {details}")]
    CapacityQuery { path: PathBuf, details: String },

    #[error("[BAL-2201] failed to launch move tool {program}: {source}")]
    MoveSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[BAL-2301] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[BAL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BAL-3100] interrupted")]
    Interrupted,
}

impl BalanceError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "BAL-1001",
            Self::MissingConfig { .. } => "BAL-1002",
            Self::ConfigParse { .. } => "BAL-1003",
            Self::InvalidSize { .. } => "BAL-1004",
            Self::InvalidPattern { .. } => "BAL-1005",
            Self::UnsupportedPlatform { .. } => "BAL-1101",
            Self::NotAUnionMount { .. } => "BAL-2001",
            Self::Attribute { .. } => "BAL-2002",
            Self::CapacityQuery { .. } => "BAL-2101",
            Self::MoveSpawn { .. } => "BAL-2201",
            Self::Serialization { .. } => "BAL-2301",
            Self::Io { .. } => "BAL-3002",
            Self::Interrupted => "BAL-3100",
        }
    }

    /// Whether the error belongs to the user's input rather than the environment.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidSize { .. }
                | Self::InvalidPattern { .. }
                | Self::NotAUnionMount { .. }
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

impl From<serde_json::Error> for BalanceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for BalanceError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
