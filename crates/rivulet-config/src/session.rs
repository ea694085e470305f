//! Session config file format and operations.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rivulet_core::{SchedulePolicy, SessionSettings};

use crate::error::LoadError;

/// Highest sample rate a config file may request.
const MAX_SAMPLE_RATE: u32 = 768_000;

/// Highest channel count on either side of the audio boundary.
const MAX_BOUNDARY_CHANNELS: usize = 256;

/// A session config file.
///
/// All sections default, so an empty file is a valid config equal to
/// [`SessionConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Audio format.
    pub audio: AudioSection,
    /// Cross-thread queue sizing.
    pub queues: QueueSection,
    /// Engine limits and policies.
    pub engine: EngineSection,
    /// Log output.
    pub logging: LoggingSection,
}

/// `[audio]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AudioSection {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per block.
    pub block_size: usize,
    /// Engine input channels.
    pub input_channels: usize,
    /// Engine output channels.
    pub output_channels: usize,
}

impl Default for AudioSection {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            sample_rate: settings.sample_rate as u32,
            block_size: settings.block_size,
            input_channels: settings.input_channels,
            output_channels: settings.output_channels,
        }
    }
}

/// `[queues]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSection {
    /// Request queue capacity.
    pub request: usize,
    /// Response queue capacity.
    pub response: usize,
    /// Retire queue capacity.
    pub retire: usize,
    /// Allocator job queue capacity.
    pub alloc: usize,
    /// Producer wait on a full request queue, in milliseconds.
    pub request_backoff_ms: u64,
    /// How long a controller polls for responses, in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            request: settings.request_capacity,
            response: settings.response_capacity,
            retire: settings.retire_capacity,
            alloc: settings.alloc_capacity,
            request_backoff_ms: settings.request_backoff.as_millis() as u64,
            response_timeout_ms: 20,
        }
    }
}

/// Scheduling failure policy as spelled in the file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    /// Output silence until the topology changes.
    #[default]
    Silence,
    /// Keep running the last good order.
    ReuseLastOrder,
}

impl From<PolicyName> for SchedulePolicy {
    fn from(name: PolicyName) -> Self {
        match name {
            PolicyName::Silence => SchedulePolicy::Silence,
            PolicyName::ReuseLastOrder => SchedulePolicy::ReuseLastOrder,
        }
    }
}

impl From<SchedulePolicy> for PolicyName {
    fn from(policy: SchedulePolicy) -> Self {
        match policy {
            SchedulePolicy::Silence => PolicyName::Silence,
            SchedulePolicy::ReuseLastOrder => PolicyName::ReuseLastOrder,
        }
    }
}

/// `[engine]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum number of live processors.
    pub max_processors: usize,
    /// Connections reserved per port at creation.
    pub port_fan: usize,
    /// Behaviour on scheduling failure.
    pub schedule_policy: PolicyName,
}

impl Default for EngineSection {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            max_processors: settings.max_processors,
            port_fan: settings.port_fan,
            schedule_policy: settings.schedule_policy.into(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::read_file(path, e))?;
        let config: SessionConfig = toml::from_str(&content)?;
        tracing::debug!("config_load: {}", path.display());
        Ok(config)
    }

    /// Load a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the config to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| LoadError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LoadError::write_file(path, e))?;
        tracing::debug!("config_save: {}", path.display());
        Ok(())
    }

    /// Serialize the config to a TOML string.
    pub fn to_toml(&self) -> Result<String, LoadError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks the values the engine does not check itself, then the
    /// converted settings.
    pub fn validate(&self) -> Result<(), LoadError> {
        self.to_settings().map(|_| ())
    }

    /// Converts into validated session settings.
    pub fn to_settings(&self) -> Result<SessionSettings, LoadError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.sample_rate > MAX_SAMPLE_RATE {
            return Err(LoadError::invalid(
                "audio.sample_rate",
                format!("{} not in 1..={MAX_SAMPLE_RATE}", audio.sample_rate),
            ));
        }
        if audio.input_channels > MAX_BOUNDARY_CHANNELS {
            return Err(LoadError::invalid(
                "audio.input_channels",
                format!("at most {MAX_BOUNDARY_CHANNELS}"),
            ));
        }
        if audio.output_channels > MAX_BOUNDARY_CHANNELS {
            return Err(LoadError::invalid(
                "audio.output_channels",
                format!("at most {MAX_BOUNDARY_CHANNELS}"),
            ));
        }
        if self.queues.response_timeout_ms == 0 {
            return Err(LoadError::invalid("queues.response_timeout_ms", "must be non-zero"));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(LoadError::invalid("logging.filter", "must not be empty"));
        }

        let settings = SessionSettings {
            sample_rate: audio.sample_rate as f32,
            block_size: audio.block_size,
            input_channels: audio.input_channels,
            output_channels: audio.output_channels,
            request_capacity: self.queues.request,
            response_capacity: self.queues.response,
            retire_capacity: self.queues.retire,
            alloc_capacity: self.queues.alloc,
            request_backoff: Duration::from_millis(self.queues.request_backoff_ms),
            max_processors: self.engine.max_processors,
            port_fan: self.engine.port_fan,
            schedule_policy: self.engine.schedule_policy.into(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Controller poll timeout for responses.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.queues.response_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_settings() {
        let settings = SessionConfig::default().to_settings().unwrap();
        assert_eq!(settings, SessionSettings::default());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(SessionConfig::from_toml("").unwrap(), SessionConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = SessionConfig::from_toml("[audio]\nblock_size = 128\n").unwrap();
        assert_eq!(config.audio.block_size, 128);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.queues, QueueSection::default());
    }

    #[test]
    fn policy_parses_snake_case() {
        let config =
            SessionConfig::from_toml("[engine]\nschedule_policy = \"reuse_last_order\"\n").unwrap();
        let settings = config.to_settings().unwrap();
        assert_eq!(settings.schedule_policy, SchedulePolicy::ReuseLastOrder);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = SessionConfig::from_toml("[engine]\nschedule_policy = \"retry\"\n").unwrap_err();
        assert!(matches!(err, LoadError::TomlParse(_)));
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let err = SessionConfig::from_toml("[audio]\nblocksize = 32\n").unwrap_err();
        assert!(matches!(err, LoadError::TomlParse(_)));
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let mut config = SessionConfig::default();
        config.audio.sample_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(LoadError::InvalidValue { key: "audio.sample_rate", .. })
        ));
    }

    #[test]
    fn zero_block_size_rejected_by_engine() {
        let mut config = SessionConfig::default();
        config.audio.block_size = 0;
        assert!(matches!(config.validate(), Err(LoadError::Settings(_))));
    }

    #[test]
    fn empty_filter_rejected() {
        let mut config = SessionConfig::default();
        config.logging.filter = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = SessionConfig::default();
        config.audio.sample_rate = 44100;
        config.engine.schedule_policy = PolicyName::ReuseLastOrder;
        config.logging.filter = "rivulet_core=debug".to_string();
        let text = config.to_toml().unwrap();
        assert!(text.contains("reuse_last_order"), "{text}");
        assert_eq!(SessionConfig::from_toml(&text).unwrap(), config);
    }
}
