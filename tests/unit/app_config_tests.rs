/*!
 * Tests for application configuration functionality
 */

use std::str::FromStr;

use lingoflow::app_config::{Config, LogLevel, ServiceKind};

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.service, ServiceKind::Ollama);
    assert_eq!(config.log_level, LogLevel::Info);

    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_ms, 7 * 24 * 60 * 60 * 1000);
    assert_eq!(config.cache.max_entries, 10_000);
    assert_eq!(config.cache.flush_debounce_ms, 1000);
    assert_eq!(config.cache.sweep_interval_ms, 60_000);

    assert_eq!(config.adaptive.cooldown_ms, 5000);
    assert_eq!(config.adaptive.evaluation_window, 10);
    assert_eq!(config.adaptive.history_size, 50);
    assert_eq!(config.adaptive.min_samples, 3);

    assert_eq!(config.batching.priority.usage_weight, 10);
    assert_eq!(config.batching.chunking.max_batch_chars, 5000);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    // Invalid source language
    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "en".to_string();

    // Invalid target language
    config.target_language = "".to_string();
    assert!(config.validate().is_err());
    config.target_language = "fre".to_string();
    assert!(config.validate().is_ok());

    // Zero capacity
    config.cache.max_entries = 0;
    assert!(config.validate().is_err());
    config.cache.max_entries = 10;

    // Sweep that would spin
    config.cache.sweep_interval_ms = 0;
    assert!(config.validate().is_err());
    config.cache.sweep_interval_ms = 1_000;

    // History shorter than the evaluation window
    config.adaptive.history_size = 5;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_deserialize_withPartialJson_shouldFillDefaults() {
    let json = r#"{
        "source_language": "en",
        "target_language": "de",
        "service": "deepl",
        "cache": { "ttl_ms": 1000 }
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.service, ServiceKind::DeepL);
    assert_eq!(config.cache.ttl_ms, 1000);
    assert_eq!(config.cache.max_entries, 10_000);
    assert_eq!(config.adaptive.cooldown_ms, 5000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let mut changed = created.clone();
    changed.target_language = "es".to_string();
    changed.service = ServiceKind::Anthropic;
    changed.save(&path).unwrap();

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.target_language, "es");
    assert_eq!(loaded.service, ServiceKind::Anthropic);
}

#[test]
fn test_from_file_withInvalidJson_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_service_kind_fromStr_shouldRoundTripDisplay() {
    for service in ServiceKind::ALL {
        assert_eq!(ServiceKind::from_str(&service.to_string()).unwrap(), service);
    }
    assert_eq!(ServiceKind::from_str("OpenAI").unwrap(), ServiceKind::OpenAI);
    assert!(ServiceKind::from_str("babelfish").is_err());
}

#[test]
fn test_log_level_toLevelFilter_shouldMapEveryLevel() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Debug.to_level_filter(), log::LevelFilter::Debug);
    assert_eq!(LogLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
}
