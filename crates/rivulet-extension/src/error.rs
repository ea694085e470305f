//! Error type for extension loading.

use std::path::PathBuf;

use thiserror::Error;

use rivulet_core::{RegistryError, RequestError};

/// An extension could not be loaded or attached.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The library or its entry point could not be loaded.
    #[error("failed to load extension '{path}': {source}")]
    Load {
        /// Path of the library.
        path: PathBuf,
        /// Underlying loader error.
        #[source]
        source: libloading::Error,
    },

    /// The entry point failed, or a type name clashes with a registered one.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The session rejected the types.
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl ExtensionError {
    /// Create a load error.
    pub fn load(path: impl Into<PathBuf>, source: libloading::Error) -> Self {
        ExtensionError::Load {
            path: path.into(),
            source,
        }
    }
}
