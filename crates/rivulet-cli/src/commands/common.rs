//! Shared helpers for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rivulet_config::SessionConfig;
use rivulet_core::TypeRegistry;
use rivulet_processors::register_builtins;

/// Loads the config file if one was given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

/// A registry holding every builtin processor type.
pub fn builtin_registry() -> anyhow::Result<Arc<TypeRegistry>> {
    let registry = TypeRegistry::new();
    register_builtins(&registry)?;
    Ok(Arc::new(registry))
}
