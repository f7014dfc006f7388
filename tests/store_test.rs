use tactus::store::{DATA_KEY, DEFAULT_PRESET_NAME};
use tactus::{FileStore, KeyValueStore, MemoryStore, PersistedData, PresetStore, StoreError, TempoPreset};

fn sample_record() -> PersistedData {
    PersistedData {
        current_name: "Etude".to_string(),
        tempos: vec![
            TempoPreset::new("Default", 120, 1),
            TempoPreset::new("Etude", 176, 2),
            TempoPreset::new("Warmup", 40, 0),
        ],
    }
}

#[test]
fn empty_storage_is_seeded_with_default() {
    let store = PresetStore::open(MemoryStore::new()).unwrap();
    let data = store.get().unwrap();

    assert_eq!(data.current_name, "Default");
    assert_eq!(data.tempos.len(), 1);
    let preset = &data.tempos[0];
    assert_eq!(preset.name, DEFAULT_PRESET_NAME);
    assert_eq!(preset.goal_bpm, 120);
    assert_eq!(preset.order, 1);
    assert_eq!(preset.bpm, 90);
    assert_eq!(data.current(), Some(preset));
}

#[test]
fn seeded_record_uses_wire_names() {
    let store = PresetStore::open(MemoryStore::new()).unwrap();
    let raw = store.storage().get(DATA_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "currentName": "Default",
            "tempos": [{ "name": "Default", "goalBpm": 120, "order": 1, "bpm": 90 }]
        })
    );
}

#[test]
fn save_then_get_round_trips() {
    let mut store = PresetStore::open(MemoryStore::new()).unwrap();
    let record = sample_record();
    store.save(&record).unwrap();
    assert_eq!(store.get().unwrap(), record);
}

#[test]
fn save_overwrites() {
    let mut store = PresetStore::open(MemoryStore::new()).unwrap();
    store.save(&sample_record()).unwrap();

    let mut second = sample_record();
    second.current_name = "Warmup".to_string();
    second.tempos.pop();
    store.save(&second).unwrap();

    assert_eq!(store.get().unwrap(), second);
}

#[test]
fn reopening_does_not_reseed() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = PresetStore::open(FileStore::open(dir.path()).unwrap()).unwrap();
    store.save(&sample_record()).unwrap();
    drop(store);

    let store = PresetStore::open(FileStore::open(dir.path()).unwrap()).unwrap();
    assert_eq!(store.get().unwrap(), sample_record());
}

#[test]
fn file_store_writes_one_file_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = PresetStore::open(FileStore::open(dir.path().join("nested")).unwrap()).unwrap();

    let path = store.storage().dir().join("data.json");
    assert!(path.exists());
    assert!(!store.storage().dir().join("data.json.tmp").exists());

    let raw = std::fs::read_to_string(path).unwrap();
    assert!(raw.contains("\"currentName\":\"Default\""));
}

#[test]
fn file_store_missing_key_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStore::open(dir.path()).unwrap();
    assert_eq!(storage.get("absent").unwrap(), None);
}

#[test]
fn malformed_record_is_a_parse_error_and_left_alone() {
    let mut storage = MemoryStore::new();
    storage.set(DATA_KEY, "{\"currentName\": 7").unwrap();

    let store = PresetStore::open(storage).unwrap();
    let err = store.get().unwrap_err();
    assert!(matches!(err, StoreError::Parse { ref key, .. } if key == DATA_KEY));

    // Not repaired behind the caller's back
    assert_eq!(store.storage().get(DATA_KEY).unwrap().unwrap(), "{\"currentName\": 7");
    assert!(store.get().is_err());
}

#[test]
fn reseed_replaces_a_corrupt_record() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.json"), "not json").unwrap();

    let mut store = PresetStore::open(FileStore::open(dir.path()).unwrap()).unwrap();
    assert!(store.get().is_err());

    let seeded = store.reseed().unwrap();
    assert_eq!(seeded, PersistedData::seed());
    assert_eq!(store.get().unwrap(), seeded);
}

#[test]
fn dangling_selection_is_surfaced() {
    let mut record = sample_record();
    record.current_name = "Gone".to_string();
    assert_eq!(record.current(), None);

    assert!(!record.select("Also gone"));
    assert!(record.select("Warmup"));
    assert_eq!(record.current().map(|t| t.goal_bpm), Some(40));
}

#[test]
fn presets_sort_by_order() {
    let record = sample_record();
    let names: Vec<_> = record.sorted().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Warmup", "Default", "Etude"]);

    let mut record = record;
    if let Some(current) = record.current_mut() {
        current.set_bpm(150.0);
    }
    assert_eq!(record.find("Etude").map(|t| t.bpm), Some(150));
}

#[test]
fn deleted_record_is_missing_until_reseeded() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PresetStore::open(FileStore::open(dir.path()).unwrap()).unwrap();
    std::fs::remove_file(dir.path().join("data.json")).unwrap();

    let err = store.get().unwrap_err();
    assert!(matches!(err, StoreError::Missing { ref key } if key == DATA_KEY));
    // Asking again changes nothing and writes nothing
    assert!(matches!(store.get(), Err(StoreError::Missing { .. })));
    assert_eq!(store.storage().get(DATA_KEY).unwrap(), None);

    store.ensure_seeded().unwrap();
    assert_eq!(store.get().unwrap(), PersistedData::seed());
}
