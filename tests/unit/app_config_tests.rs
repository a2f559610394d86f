/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use syncread::app_config::{Config, LogLevel, OutputKind};

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.server.base_url, "http://localhost:5000");
    assert_eq!(config.server.timeout_secs, 30);
    assert_eq!(config.waveform.ms_per_pixel, 10.0);
    assert_eq!(config.waveform.height_px, 75);
    assert_eq!(config.reading.autosave_threshold, 5);
    assert_eq!(config.controller.cooldown_ms, 250);
    assert_eq!(config.playback.output, OutputKind::Null);
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.server.base_url = "not a url".to_string();
    assert!(config.validate().is_err());
    config.server.base_url = "http://reader.local:8080/".to_string();
    assert!(config.validate().is_ok());

    config.waveform.ms_per_pixel = 0.0;
    assert!(config.validate().is_err());
    config.waveform.ms_per_pixel = 5.0;

    config.waveform.min_width_px = config.waveform.max_width_px + 1;
    assert!(config.validate().is_err());
    config.waveform.min_width_px = 50;

    config.reading.autosave_threshold = 0;
    assert!(config.validate().is_err());
    config.reading.autosave_threshold = 1;

    assert!(config.validate().is_ok());
}

/// Test that a missing file is created with defaults and read back unchanged
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("nested").join("config.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(created, Config::default());

    let reloaded = Config::load(&path)?;
    assert_eq!(reloaded, created);
    Ok(())
}

/// Test reading a hand-written config file
#[test]
fn test_load_withCustomValues_shouldOverrideDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "syncread.json",
        br#"{
            "server": {"base_url": "http://reader.local", "article_id": 7},
            "playback": {"output": "timer"},
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.server.article_id, 7);
    assert_eq!(config.server.timeout_secs, 30);
    assert_eq!(config.playback.output, OutputKind::Timer);
    assert_eq!(config.log_level.to_level_filter(), log::LevelFilter::Debug);
    Ok(())
}

/// Test that a malformed file is reported instead of replaced
#[test]
fn test_load_withMalformedJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "broken.json", b"{ server: ")?;
    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}
