//! Tests for settings loading.

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn settings_file(extension: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_defaults_are_valid() {
    let settings = ProcessingSettings::load_with_env(None, env(&[])).unwrap();

    assert_eq!(settings, ProcessingSettings::default());
    assert!(settings.validate().is_ok());
}

#[test]
fn test_yaml_file_overrides_defaults() {
    let file = settings_file(
        ".yaml",
        "message_lease_secs: 45\npoison_threshold: 2\nbatch_size: 10\n",
    );

    let settings = ProcessingSettings::load_with_env(Some(file.path()), env(&[])).unwrap();

    assert_eq!(settings.message_lease_secs, 45);
    assert_eq!(settings.poison_threshold, 2);
    assert_eq!(settings.batch_size, 10);
    assert_eq!(settings.poll_frequency_secs, 5);
}

#[test]
fn test_environment_overrides_file() {
    let file = settings_file(".json", r#"{ "poison_threshold": 2, "max_concurrency": 3 }"#);

    let settings = ProcessingSettings::load_with_env(
        Some(file.path()),
        env(&[("XQ__POISON_THRESHOLD", "7")]),
    )
    .unwrap();

    assert_eq!(settings.poison_threshold, 7);
    assert_eq!(settings.max_concurrency, 3);
}

#[test]
fn test_invalid_values_are_rejected() {
    let result =
        ProcessingSettings::load_with_env(None, env(&[("XQ__MESSAGE_LEASE_SECS", "10")]));
    assert!(matches!(result, Err(SettingsError::Invalid(_))));

    let result = ProcessingSettings::load_with_env(None, env(&[("XQ__BATCH_SIZE", "0")]));
    assert!(matches!(result, Err(SettingsError::Invalid(_))));
}

#[test]
fn test_missing_file_is_an_error() {
    let result = ProcessingSettings::load_with_env(
        Some(Path::new("/nonexistent/xq-settings.yaml")),
        env(&[]),
    );
    assert!(matches!(result, Err(SettingsError::Load(_))));
}

#[test]
fn test_processing_options_conversion() {
    let settings = ProcessingSettings {
        time_window_secs: 3600,
        ..ProcessingSettings::default()
    };

    let options = settings.processing_options(CancellationToken::new()).unwrap();

    assert_eq!(options.time_window(), Duration::from_secs(3600));
    assert_eq!(options.message_lease_time(), Duration::from_secs(60));
    assert_eq!(options.poll_frequency(), Duration::from_secs(5));
    assert_eq!(options.poison_threshold(), 5);
}
