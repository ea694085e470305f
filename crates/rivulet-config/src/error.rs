//! Error types for configuration files.

use std::path::PathBuf;
use thiserror::Error;

use rivulet_core::EngineError;

/// Errors that can occur while loading, saving or validating a config file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a parent directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A value the TOML layer accepted but a session cannot use.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key, e.g. `audio.sample_rate`.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The converted settings were rejected by the engine.
    #[error(transparent)]
    Settings(#[from] EngineError),
}

impl LoadError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid value error.
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        LoadError::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}
