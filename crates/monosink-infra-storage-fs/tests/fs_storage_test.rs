use monosink_infra_storage_fs::FsStorage;
use monosink_ports::storage::{SinkSettings, StoragePort};
use monosink_ports::types::FeedStrategy;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("monosink-{name}-{nanos}"))
}

#[test]
fn missing_file_loads_defaults() {
    let storage = FsStorage::new(temp_dir("missing"));
    let settings = storage.load_settings().unwrap();
    assert_eq!(settings, SinkSettings::default());
}

#[test]
fn save_then_load_roundtrip() {
    let dir = temp_dir("roundtrip");
    let storage = FsStorage::new(dir.clone());
    let settings = SinkSettings {
        device: Some("USB Audio".to_string()),
        sample_rate_hz: Some(44_100),
        max_latency_ms: None,
        max_latency_us: Some(2_500),
        feed: FeedStrategy::Push,
        queue_depth_buffers: 3,
        high_water_buffers: 6,
    };

    storage.save_settings(&settings).unwrap();
    assert!(storage.settings_path().exists());
    assert_eq!(storage.load_settings().unwrap(), settings);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = temp_dir("partial");
    std::fs::create_dir_all(&dir).unwrap();
    let storage = FsStorage::new(dir.clone());
    std::fs::write(storage.settings_path(), br#"{ "feed": "push", "sample_rate_hz": 32000 }"#)
        .unwrap();

    let settings = storage.load_settings().unwrap();
    assert_eq!(settings.feed, FeedStrategy::Push);
    assert_eq!(settings.sample_rate_hz, Some(32_000));
    assert_eq!(settings.max_latency_ms, None);
    assert_eq!(settings.queue_depth_buffers, 2);
    assert_eq!(settings.high_water_buffers, 4);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn malformed_file_is_a_serde_error() {
    let dir = temp_dir("malformed");
    std::fs::create_dir_all(&dir).unwrap();
    let storage = FsStorage::new(dir.clone());
    std::fs::write(storage.settings_path(), b"{ not json").unwrap();

    let err = storage.load_settings().unwrap_err();
    assert!(err.to_string().starts_with("serialization error"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn zero_values_on_disk_load_as_defaults() {
    let dir = temp_dir("zeros");
    std::fs::create_dir_all(&dir).unwrap();
    let storage = FsStorage::new(dir.clone());
    std::fs::write(
        storage.settings_path(),
        br#"{ "sample_rate_hz": 0, "max_latency_ms": 0, "queue_depth_buffers": 0, "high_water_buffers": 0, "device": "" }"#,
    )
    .unwrap();

    assert_eq!(storage.load_settings().unwrap(), SinkSettings::default());

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn save_replaces_the_file_without_leaving_a_staging_copy() {
    let dir = temp_dir("rename");
    let storage = FsStorage::new(dir.clone());

    storage.save_settings(&SinkSettings::default()).unwrap();
    let pushed = SinkSettings {
        feed: FeedStrategy::Push,
        high_water_buffers: 8,
        ..SinkSettings::default()
    };
    storage.save_settings(&pushed).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["settings.json".to_string()]);
    assert!(!dir.join("settings.json.tmp").exists());
    assert_eq!(storage.load_settings().unwrap(), pushed);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn saved_zero_values_are_written_as_defaults() {
    let dir = temp_dir("save-zeros");
    let storage = FsStorage::new(dir.clone());
    let zeros = SinkSettings {
        queue_depth_buffers: 0,
        ..SinkSettings::default()
    };
    storage.save_settings(&zeros).unwrap();

    let raw = std::fs::read_to_string(storage.settings_path()).unwrap();
    assert!(raw.contains("\"queue_depth_buffers\": 2"), "{raw}");

    let _ = std::fs::remove_dir_all(dir);
}
