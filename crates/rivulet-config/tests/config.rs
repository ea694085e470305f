//! Integration tests for rivulet-config.
//!
//! Files on disk, and a session actually created from a loaded config.

use std::sync::Arc;

use rivulet_config::{LoadError, PolicyName, SessionConfig};
use rivulet_core::{SchedulePolicy, TypeRegistry, create_session};
use tempfile::TempDir;

#[test]
fn save_then_load_preserves_every_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.toml");

    let mut config = SessionConfig::default();
    config.audio.sample_rate = 96000;
    config.audio.block_size = 32;
    config.queues.response = 64;
    config.queues.response_timeout_ms = 5;
    config.engine.max_processors = 16;
    config.engine.schedule_policy = PolicyName::ReuseLastOrder;
    config.logging.filter = "warn".to_string();
    config.save(&path).unwrap();

    let loaded = SessionConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn save_creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("session.toml");
    SessionConfig::default().save(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn load_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = SessionConfig::load(&path).unwrap_err();
    assert!(matches!(err, LoadError::ReadFile { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn load_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[audio\nsample_rate = ").unwrap();
    assert!(matches!(
        SessionConfig::load(&path),
        Err(LoadError::TomlParse(_))
    ));
}

#[test]
fn loaded_config_drives_a_session() {
    let config = SessionConfig::from_toml(
        r#"
[audio]
sample_rate = 44100
block_size = 16
output_channels = 1

[engine]
schedule_policy = "reuse_last_order"
"#,
    )
    .unwrap();
    let settings = config.to_settings().unwrap();
    assert_eq!(settings.sample_rate, 44100.0);
    assert_eq!(settings.schedule_policy, SchedulePolicy::ReuseLastOrder);

    let (mut engine, _controller) =
        create_session(settings, Arc::new(TypeRegistry::new())).unwrap();
    let mut out = vec![1.0f32; 16];
    engine.process_block(&[], &mut [&mut out[..]]).unwrap();
    assert!(out.iter().all(|&s| s == 0.0));
}
