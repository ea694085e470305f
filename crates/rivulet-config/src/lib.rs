//! Session configuration files for rivulet.
//!
//! A [`SessionConfig`] is a TOML document describing everything fixed for the
//! lifetime of a session: audio format, queue capacities, engine limits and
//! the default log filter. It converts into [`rivulet_core::SessionSettings`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rivulet_config::SessionConfig;
//!
//! let config = SessionConfig::load("session.toml").unwrap();
//! let settings = config.to_settings().unwrap();
//! assert_eq!(settings.block_size, config.audio.block_size);
//! ```
//!
//! # TOML Format
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! block_size = 64
//! input_channels = 2
//! output_channels = 2
//!
//! [queues]
//! request = 1024
//! response = 1024
//! retire = 1024
//! alloc = 16
//! request_backoff_ms = 1
//! response_timeout_ms = 20
//!
//! [engine]
//! max_processors = 1024
//! port_fan = 8
//! schedule_policy = "silence"
//!
//! [logging]
//! filter = "info"
//! ```
//!
//! Every section and key is optional; missing keys take the defaults above.

pub mod error;
pub mod session;

pub use error::LoadError;
pub use session::{AudioSection, EngineSection, LoggingSection, PolicyName, QueueSection, SessionConfig};
