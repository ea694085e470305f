//! Rivulet Extension - dynamically loaded processor libraries
//!
//! An extension is a `cdylib` built against the same `rivulet-core` version and
//! toolchain as the host. It exports one entry point, generated by
//! [`export_extension!`], that registers its processor types.
//!
//! The host loads it into a staging registry, then moves the types into the
//! session registry with the library handle attached to each one. The library
//! stays mapped while any of its types is reachable, from any session sharing
//! the registry.
//!
//! This is the only rivulet crate with `unsafe` code; each unsafe statement
//! opts out of the workspace `unsafe_code = deny` lint on its own.
//!
//! # Writing an extension
//!
//! ```rust,ignore
//! fn register(registry: &rivulet_extension::TypeRegistry) -> Result<(), rivulet_extension::RegistryError> {
//!     registry.register(my_type())?;
//!     Ok(())
//! }
//! rivulet_extension::export_extension!(register);
//! ```
//!
//! # Loading one
//!
//! ```rust,ignore
//! use rivulet_extension::ControllerExt;
//!
//! let added = controller.load_extension("target/release/libmy_ext.so")?;
//! ```

mod error;
mod loader;

pub use error::ExtensionError;
pub use loader::{ControllerExt, ENTRY_SYMBOL, Extension, ExtensionInit};

// Paths used by `export_extension!` expansions.
pub use rivulet_core::{RegistryError, TypeRegistry};

/// Exports `$register` as the extension entry point.
#[macro_export]
macro_rules! export_extension {
    ($register:path) => {
        /// Extension entry point.
        #[allow(unsafe_code)]
        #[unsafe(no_mangle)]
        pub fn rivulet_extension_init(
            registry: &$crate::TypeRegistry,
        ) -> ::core::result::Result<(), $crate::RegistryError> {
            $register(registry)
        }
    };
}
