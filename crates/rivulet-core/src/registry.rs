//! Name-keyed registry of processor types.
//!
//! Types are registered once, before instances are created, and are immutable
//! afterwards. A registry is shared between a session's controller and engine
//! through `Arc`; several sessions may share one.
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::{GeneratorKind, ProcessorType, TypeRegistry};
//! # use rivulet_core::{CreateArgs, Io, ProcessContext, Processor, ProcessorError};
//! # struct Silence;
//! # impl Processor for Silence {
//! #     fn process(&mut self, _io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> { Ok(()) }
//! # }
//! # fn silence(_: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> { Ok(Box::new(Silence)) }
//!
//! let registry = TypeRegistry::new();
//! registry
//!     .register(ProcessorType::new("silence~", GeneratorKind::Always, silence).with_ports(0, 1))
//!     .unwrap();
//! assert!(registry.get("silence~").is_some());
//! assert!(registry.register(ProcessorType::new("silence~", GeneratorKind::Always, silence)).is_err());
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RegistryError;
use crate::processor::ProcessorType;

/// Registry of processor types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<ProcessorType>>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type under its name.
    pub fn register(&self, ty: ProcessorType) -> Result<Arc<ProcessorType>, RegistryError> {
        let mut types = self.types.write();
        if types.contains_key(ty.name()) {
            return Err(RegistryError::Duplicate(ty.name().to_owned()));
        }
        let ty = Arc::new(ty);
        types.insert(ty.name().to_owned(), Arc::clone(&ty));
        tracing::debug!("registry_add: {}", ty.name());
        Ok(ty)
    }

    /// Registers a batch of types tied to `owner`. Either every type is added
    /// or, on a name clash, none is.
    ///
    /// Returns the number of types added.
    pub fn register_owned(
        &self,
        batch: Vec<ProcessorType>,
        owner: Arc<dyn Any + Send + Sync>,
    ) -> Result<usize, RegistryError> {
        let mut types = self.types.write();
        let mut seen = HashSet::with_capacity(batch.len());
        for ty in &batch {
            if types.contains_key(ty.name()) || !seen.insert(ty.name()) {
                return Err(RegistryError::Duplicate(ty.name().to_owned()));
            }
        }
        let count = batch.len();
        for ty in batch {
            let ty = Arc::new(ty.with_owner(Arc::clone(&owner)));
            tracing::debug!("registry_add: {} (extension)", ty.name());
            types.insert(ty.name().to_owned(), ty);
        }
        Ok(count)
    }

    /// Consumes the registry, returning its types sorted by name.
    pub fn into_types(self) -> Vec<ProcessorType> {
        let mut types: Vec<ProcessorType> = self
            .types
            .into_inner()
            .into_values()
            .map(|ty| Arc::try_unwrap(ty).unwrap_or_else(|shared| (*shared).clone()))
            .collect();
        types.sort_by(|a, b| a.name().cmp(b.name()));
        types
    }

    /// Looks up a type by name.
    pub fn get(&self, name: &str) -> Option<Arc<ProcessorType>> {
        self.types.read().get(name).cloned()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered types, sorted by name.
    pub fn types(&self) -> Vec<Arc<ProcessorType>> {
        let mut types: Vec<_> = self.types.read().values().cloned().collect();
        types.sort_by(|a, b| a.name().cmp(b.name()));
        types
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
