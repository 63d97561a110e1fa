use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::persist::{self, DOCUMENT_KEYS, LEGACY_KEY_PALETTES, LEGACY_KEY_USED_PALETTES};
use crate::{StoreError, WorkingSet};

/// Single key the whole-app state was kept under by older hosts.
pub const KEY_APP_STATE: &str = "colorPaletteGeneratorState";

/// String key-value storage with local-storage semantics: values are
/// opaque strings, JSON by convention.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store, optionally with a byte quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes once keys plus values would exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(bytes),
        }
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        if let Some(quota) = self.quota
            && self.used_bytes_without(key) + key.len() + value.len() > quota
        {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// All keys in one JSON object file, rewritten atomically on every set.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let payload = serde_json::to_string_pretty(map)?;
        write_atomic(&self.path, payload.as_bytes())?;
        Ok(())
    }

    /// Current contents, starting over if the file is unreadable.
    fn read_map_for_update(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read_map() {
            Err(StoreError::Json(err)) => {
                warn!(path = %self.path.display(), %err, "store file is corrupt, overwriting");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let mut map = self.read_map_for_update()?;
        map.insert(key.to_string(), value);
        self.write_map(&map)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut map = self.read_map_for_update()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_map()?.into_keys().collect())
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Read the working set back. Never fails: missing or corrupt data is
/// logged and replaced by defaults, key by key where possible.
pub fn load_working_set(store: &dyn KeyValueStore) -> WorkingSet {
    let mut object = Map::new();
    let keys = DOCUMENT_KEYS
        .iter()
        .chain([&LEGACY_KEY_PALETTES, &LEGACY_KEY_USED_PALETTES]);

    for key in keys {
        match store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    object.insert((*key).to_string(), value);
                }
                Err(err) => warn!(key = *key, %err, "stored value is not JSON, using default"),
            },
            Ok(None) => {}
            Err(err) => {
                error!(%err, "reading store failed, starting from defaults");
                return WorkingSet::default();
            }
        }
    }

    if object.is_empty() {
        match store.get(KEY_APP_STATE) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(state)) => {
                    debug!("loading whole-app state key");
                    object = state;
                }
                Ok(_) => warn!("whole-app state is not an object, ignoring"),
                Err(err) => warn!(%err, "whole-app state is not JSON, ignoring"),
            },
            Ok(None) => {}
            Err(err) => warn!(%err, "reading whole-app state failed"),
        }
    }

    if object.is_empty() {
        info!("no saved working set, using defaults");
        return WorkingSet::default();
    }

    let mut ws = match persist::deserialize(&Value::Object(object.clone())) {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%err, "stored working set does not match the schema, dropping bad keys");
            object.retain(|key, value| {
                let mut single = Map::new();
                single.insert(key.clone(), value.clone());
                let ok = persist::deserialize(&Value::Object(single)).is_ok();
                if !ok {
                    warn!(key = %key, "discarding unreadable stored key");
                }
                ok
            });
            persist::deserialize(&Value::Object(object)).unwrap_or_else(|err| {
                error!(%err, "stored working set unreadable, using defaults");
                WorkingSet::default()
            })
        }
    };

    ws.sanitize();
    ws
}

/// Outcome of a best-effort save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: usize,
    /// `(key, error)` for every write that failed.
    pub failed: Vec<(String, String)>,
}

impl SaveReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every document key. Failures are logged and collected; keys that
/// did get written stay written.
pub fn save_working_set(store: &mut dyn KeyValueStore, ws: &WorkingSet) -> SaveReport {
    let mut report = SaveReport::default();

    let document = match persist::serialize(ws) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            error!("working set did not encode to an object");
            report
                .failed
                .push(("*".to_string(), "not an object".to_string()));
            return report;
        }
        Err(err) => {
            error!(%err, "encoding working set failed");
            report.failed.push(("*".to_string(), err.to_string()));
            return report;
        }
    };

    for (key, value) in document {
        match store.set(&key, value.to_string()) {
            Ok(()) => report.written += 1,
            Err(err) => {
                warn!(key = %key, %err, "persisting key failed");
                report.failed.push((key, err.to_string()));
            }
        }
    }

    for key in [LEGACY_KEY_PALETTES, LEGACY_KEY_USED_PALETTES, KEY_APP_STATE] {
        if let Err(err) = store.remove(key) {
            debug!(key, %err, "could not remove legacy key");
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, Palette};

    fn test_temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("palette-core-store-{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_set() -> WorkingSet {
        let colors: Vec<Color> = ["#FF0000", "#00FF00", "#0000FF"]
            .iter()
            .map(|v| Color::new(v).unwrap())
            .collect();
        let mut used = Palette::new(vec![colors[1].clone(), colors[2].clone()]);
        used.used = true;
        let unused = Palette::new(vec![colors[0].clone(), colors[2].clone()]);
        WorkingSet {
            input_colors: colors,
            palette_size: 2,
            generated_palettes: vec![used, unused],
            sample_budget: 12,
        }
    }

    #[test]
    fn memory_round_trip() {
        let ws = sample_set();
        let mut store = MemoryStore::new();
        let report = save_working_set(&mut store, &ws);
        assert!(report.is_ok());
        assert_eq!(report.written, DOCUMENT_KEYS.len());
        assert_eq!(load_working_set(&store), ws);
    }

    #[test]
    fn empty_store_gives_defaults() {
        let ws = load_working_set(&MemoryStore::new());
        assert_eq!(ws.input_colors.len(), 6);
        assert_eq!(ws.palette_size, crate::DEFAULT_PALETTE_SIZE);
    }

    #[test]
    fn corrupt_key_falls_back_per_key() {
        let ws = sample_set();
        let mut store = MemoryStore::new();
        save_working_set(&mut store, &ws);
        store
            .set(crate::persist::KEY_PALETTE_SIZE, "{not json".to_string())
            .unwrap();

        let loaded = load_working_set(&store);
        assert_eq!(loaded.palette_size, crate::DEFAULT_PALETTE_SIZE);
        assert_eq!(loaded.input_colors, ws.input_colors);
    }

    #[test]
    fn wrongly_typed_key_is_discarded() {
        let ws = sample_set();
        let mut store = MemoryStore::new();
        save_working_set(&mut store, &ws);
        store
            .set(crate::persist::KEY_NUM_SAMPLES, "\"lots\"".to_string())
            .unwrap();

        let loaded = load_working_set(&store);
        assert_eq!(loaded.sample_budget, crate::DEFAULT_SAMPLE_BUDGET);
        assert_eq!(loaded.generated_palettes, ws.generated_palettes);
    }

    #[test]
    fn quota_failure_is_reported_not_fatal() {
        let mut store = MemoryStore::with_quota(64);
        let report = save_working_set(&mut store, &sample_set());
        assert!(!report.is_ok());
        assert!(
            report
                .failed
                .iter()
                .any(|(key, _)| key == crate::persist::KEY_GENERATED_PALETTES)
        );
    }

    #[test]
    fn legacy_keys_are_migrated_then_removed() {
        let mut store = MemoryStore::new();
        store
            .set("inputColors", r##"["#ffffff","#000000"]"##.to_string())
            .unwrap();
        store.set("paletteSize", "2".to_string()).unwrap();
        store
            .set(
                "palettes",
                r##"[{"colors":["#ffffff","#000000"],"used":true}]"##.to_string(),
            )
            .unwrap();

        let ws = load_working_set(&store);
        assert_eq!(ws.input_colors.len(), 2);
        assert_eq!(ws.used_count(), 1);

        save_working_set(&mut store, &ws);
        assert_eq!(store.get(LEGACY_KEY_PALETTES).unwrap(), None);
        assert_eq!(load_working_set(&store), ws);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = test_temp_dir("round-trip");
        let path = dir.join("nested").join("state.json");
        let ws = sample_set();

        let mut store = FileStore::new(&path);
        assert!(save_working_set(&mut store, &ws).is_ok());
        assert!(path.exists());

        let reopened = FileStore::new(&path);
        assert_eq!(load_working_set(&reopened), ws);
        let mut keys = reopened.keys().unwrap();
        keys.sort();
        let mut expected: Vec<String> = DOCUMENT_KEYS.iter().map(|k| k.to_string()).collect();
        expected.sort();
        assert_eq!(keys, expected);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_loads_defaults_and_is_overwritten() {
        let dir = test_temp_dir("corrupt");
        let path = dir.join("state.json");
        fs::write(&path, "{ this is not valid json").unwrap();

        let mut store = FileStore::new(&path);
        let ws = load_working_set(&store);
        assert_eq!(ws.input_colors.len(), 6);

        assert!(save_working_set(&mut store, &ws).is_ok());
        assert_eq!(load_working_set(&store), ws);

        fs::remove_dir_all(&dir).unwrap();
    }
}
