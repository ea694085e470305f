//! Loading libraries and attaching their types.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use rivulet_core::{Controller, ProcessorType, RegistryError, TypeRegistry};

use crate::error::ExtensionError;

/// Name of the exported entry point.
pub const ENTRY_SYMBOL: &[u8] = b"rivulet_extension_init\0";

/// Signature of the exported entry point.
pub type ExtensionInit = fn(&TypeRegistry) -> Result<(), RegistryError>;

/// A loaded library and the types its entry point registered.
pub struct Extension {
    path: PathBuf,
    types: Vec<ProcessorType>,
    /// Declared after `types`, whose descriptors point into it.
    library: Arc<Library>,
}

impl Extension {
    /// Loads the library at `path` and runs its entry point against an empty
    /// staging registry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtensionError> {
        let path = path.as_ref();

        // SAFETY: loading runs the library's initializers. Extensions are
        // trusted code built against this crate; there is no sandbox.
        #[allow(unsafe_code)]
        let library = unsafe { Library::new(path) }.map_err(|e| ExtensionError::load(path, e))?;

        // SAFETY: the symbol is declared by `export_extension!` with exactly
        // the `ExtensionInit` signature. The copied fn pointer is only called
        // below, while `library` is loaded.
        #[allow(unsafe_code)]
        let init: ExtensionInit = {
            let symbol: Symbol<'_, ExtensionInit> =
                unsafe { library.get(ENTRY_SYMBOL) }.map_err(|e| ExtensionError::load(path, e))?;
            *symbol
        };

        let staging = TypeRegistry::new();
        init(&staging)?;
        let types = staging.into_types();
        tracing::debug!("extension_load: {} ({} types)", path.display(), types.len());

        Ok(Self {
            path: path.to_path_buf(),
            types,
            library: Arc::new(library),
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Types the entry point registered, sorted by name.
    pub fn types(&self) -> &[ProcessorType] {
        &self.types
    }

    /// Moves the types into `registry`, each keeping the library loaded.
    ///
    /// Nothing is added if any name is already taken.
    pub fn register(self, registry: &TypeRegistry) -> Result<usize, ExtensionError> {
        let (path, types, owner) = self.into_parts();
        let added = registry.register_owned(types, owner)?;
        tracing::info!(path = %path.display(), types = added, "extension loaded");
        Ok(added)
    }

    /// Moves the types into the session's registry and reports them to its
    /// engine.
    pub fn attach(self, controller: &Controller) -> Result<usize, ExtensionError> {
        let (path, types, owner) = self.into_parts();
        let added = controller.add_extension_types(types, owner)?;
        tracing::info!(path = %path.display(), types = added, "extension loaded");
        Ok(added)
    }

    fn into_parts(self) -> (PathBuf, Vec<ProcessorType>, Arc<dyn Any + Send + Sync>) {
        let owner: Arc<dyn Any + Send + Sync> = self.library;
        (self.path, self.types, owner)
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("path", &self.path)
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

/// Extension loading on a session [`Controller`].
pub trait ControllerExt {
    /// Loads the library at `path` and adds its types to the session.
    ///
    /// Returns the number of types added.
    fn load_extension(&self, path: impl AsRef<Path>) -> Result<usize, ExtensionError>;
}

impl ControllerExt for Controller {
    fn load_extension(&self, path: impl AsRef<Path>) -> Result<usize, ExtensionError> {
        Extension::load(path)?.attach(self)
    }
}
