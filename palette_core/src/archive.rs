use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::store::{KEY_APP_STATE, KeyValueStore, SaveReport, save_working_set};
use crate::{ExportError, ImportError, PersistError, WorkingSet, persist};

/// Name of the single JSON document inside an export archive.
pub const ARCHIVE_ENTRY: &str = "localStorage_data.json";
/// Entry name used by an older export path; accepted on import.
pub const ALT_ARCHIVE_ENTRY: &str = "color-palette-generator-data.json";

/// Gather every store key into one JSON object. Values that parse as JSON
/// are embedded as-is, anything else as a string.
pub fn store_snapshot(store: &dyn KeyValueStore) -> Result<Value, ExportError> {
    let mut object = Map::new();
    for key in store.keys()? {
        let Some(raw) = store.get(&key)? else {
            continue;
        };
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        object.insert(key, value);
    }
    Ok(Value::Object(object))
}

/// Write the whole store as a zip holding one pretty-printed JSON document.
pub fn export_archive<W: Write + Seek>(
    store: &dyn KeyValueStore,
    writer: W,
) -> Result<(), ExportError> {
    let snapshot = store_snapshot(store)?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(ARCHIVE_ENTRY, options)?;
    zip.write_all(json.as_bytes())?;
    zip.finish()?;
    Ok(())
}

pub fn export_archive_to_path(
    store: &dyn KeyValueStore,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let file = File::create(path.as_ref())?;
    export_archive(store, file)?;
    info!(path = %path.as_ref().display(), "exported working set");
    Ok(())
}

/// A decoded import plus how writing it into the store went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imported {
    pub working_set: WorkingSet,
    pub report: SaveReport,
}

fn read_document<R: Read + Seek>(reader: R) -> Result<Map<String, Value>, ImportError> {
    let mut archive = ZipArchive::new(reader)?;

    let entry_name = [ARCHIVE_ENTRY, ALT_ARCHIVE_ENTRY]
        .into_iter()
        .find(|name| archive.file_names().any(|n| n == *name))
        .ok_or(ImportError::MissingDocument(ARCHIVE_ENTRY))?;

    let mut text = String::new();
    archive.by_name(entry_name)?.read_to_string(&mut text)?;

    match serde_json::from_str(&text).map_err(ImportError::Malformed)? {
        Value::Object(document) => Ok(document),
        _ => Err(PersistError::NotAnObject.into()),
    }
}

fn decode(document: &Map<String, Value>) -> Result<WorkingSet, ImportError> {
    let mut ws = persist::deserialize(&Value::Object(document.clone()))?;
    let removed = ws.sanitize();
    if removed > 0 {
        warn!(removed, "imported palettes did not fit the imported colors");
    }
    Ok(ws)
}

/// Read the document out of an archive without touching any store.
pub fn read_archive<R: Read + Seek>(reader: R) -> Result<WorkingSet, ImportError> {
    decode(&read_document(reader)?)
}

/// Import an archive: decode and revalidate, write every other top-level
/// key as-is, then write the sanitized working set over the document keys.
///
/// A failed store write does not fail the import; it shows up in the
/// returned report and the working set is authoritative either way.
pub fn import_archive<R: Read + Seek>(
    reader: R,
    store: &mut dyn KeyValueStore,
) -> Result<Imported, ImportError> {
    let document = read_document(reader)?;
    let ws = decode(&document)?;

    let mut report = SaveReport::default();
    for (key, value) in &document {
        if persist::is_working_set_key(key) || key == KEY_APP_STATE {
            continue;
        }
        let raw = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        match store.set(key, raw) {
            Ok(()) => report.written += 1,
            Err(err) => {
                warn!(key = %key, %err, "persisting imported key failed");
                report.failed.push((key.clone(), err.to_string()));
            }
        }
    }

    let saved = save_working_set(store, &ws);
    report.written += saved.written;
    report.failed.extend(saved.failed);
    if !report.is_ok() {
        warn!(failed = report.failed.len(), "imported set only partially persisted");
    }

    info!(
        colors = ws.input_colors.len(),
        palettes = ws.generated_palettes.len(),
        used = ws.used_count(),
        "imported working set"
    );
    Ok(Imported {
        working_set: ws,
        report,
    })
}

pub fn import_archive_from_path(
    path: impl AsRef<Path>,
    store: &mut dyn KeyValueStore,
) -> Result<Imported, ImportError> {
    let file = File::open(path.as_ref())?;
    import_archive(BufReader::new(file), store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, load_working_set};
    use crate::{Color, Palette};
    use serde_json::json;
    use std::io::Cursor;

    fn sample_set() -> WorkingSet {
        let colors: Vec<Color> = ["#FF0000", "#00FF00", "#0000FF"]
            .iter()
            .map(|v| Color::new(v).unwrap())
            .collect();
        let mut used = Palette::new(vec![colors[0].clone(), colors[1].clone()]);
        used.used = true;
        WorkingSet {
            input_colors: colors.clone(),
            palette_size: 2,
            generated_palettes: vec![used, Palette::new(vec![colors[2].clone(), colors[1].clone()])],
            sample_budget: 10,
        }
    }

    fn zip_with(name: &str, body: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn export_then_import_restores_set() -> anyhow::Result<()> {
        let ws = sample_set();
        let mut source = MemoryStore::new();
        save_working_set(&mut source, &ws);
        source.set("colorInputsOpen", "true".to_string())?;

        let mut buf = Cursor::new(Vec::new());
        export_archive(&source, &mut buf)?;

        let mut target = MemoryStore::new();
        buf.set_position(0);
        let imported = import_archive(buf, &mut target)?;

        assert_eq!(imported.working_set, ws);
        assert!(imported.report.is_ok());
        assert_eq!(load_working_set(&target), ws);
        assert_eq!(target.get("colorInputsOpen")?.as_deref(), Some("true"));
        Ok(())
    }

    #[test]
    fn import_keeps_keys_outside_the_working_set() -> anyhow::Result<()> {
        let ws = sample_set();
        let mut body = persist::serialize(&ws)?;
        body["colorInputsOpen"] = json!(false);
        body["paletteListFilter"] = json!("used");
        body["palettes"] = json!([]);
        let bytes = zip_with(ARCHIVE_ENTRY, &body.to_string());

        let mut store = MemoryStore::new();
        let imported = import_archive(Cursor::new(bytes), &mut store)?;

        assert_eq!(imported.report.written, 7);
        assert_eq!(store.get("colorInputsOpen")?.as_deref(), Some("false"));
        assert_eq!(store.get("paletteListFilter")?.as_deref(), Some("used"));
        assert_eq!(store.get(persist::LEGACY_KEY_PALETTES)?, None);
        assert_eq!(load_working_set(&store), ws);
        Ok(())
    }

    #[test]
    fn import_reports_failed_store_writes() -> anyhow::Result<()> {
        let ws = sample_set();
        let bytes = zip_with(ARCHIVE_ENTRY, &persist::serialize(&ws)?.to_string());
        let mut store = MemoryStore::with_quota(64);

        let imported = import_archive(Cursor::new(bytes), &mut store)?;

        assert_eq!(imported.working_set, ws);
        assert!(!imported.report.is_ok());
        Ok(())
    }

    #[test]
    fn out_of_range_settings_are_replaced_on_import() -> anyhow::Result<()> {
        let body = json!({
            "inputColors": [{ "id": "a", "value": "#AA0000" }, { "id": "b", "value": "#00BB00" }],
            "paletteSize": 1,
            "numSamples": 0,
            "generatedPalettes": [
                { "id": "p1", "used": true, "createdAt": 1,
                  "colors": [{ "id": "a", "value": "#AA0000" }] }
            ]
        });
        let bytes = zip_with(ARCHIVE_ENTRY, &body.to_string());

        let ws = read_archive(Cursor::new(bytes))?;

        assert_eq!(ws.palette_size, crate::DEFAULT_PALETTE_SIZE);
        assert_eq!(ws.sample_budget, crate::DEFAULT_SAMPLE_BUDGET);
        assert!(ws.generated_palettes.is_empty());
        Ok(())
    }

    #[test]
    fn snapshot_keeps_non_json_values_as_strings() -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        store.set("paletteSize", "3".to_string())?;
        store.set("theme", "dark mode".to_string())?;

        let snapshot = store_snapshot(&store)?;
        assert_eq!(snapshot, json!({ "paletteSize": 3, "theme": "dark mode" }));
        Ok(())
    }

    #[test]
    fn used_palettes_are_revalidated_on_import() -> anyhow::Result<()> {
        let body = json!({
            "inputColors": [{ "id": "a", "value": "#AA0000" }, { "id": "b", "value": "#00BB00" }],
            "paletteSize": 2,
            "numSamples": 10,
            "generatedPalettes": [
                { "id": "p1", "used": true, "createdAt": 1,
                  "colors": [{ "id": "a", "value": "#AA0000" }, { "id": "gone", "value": "#FFFFFF" }] },
                { "id": "p2", "used": true, "createdAt": 2,
                  "colors": [{ "id": "b", "value": "#00BB00" }, { "id": "a", "value": "#AA0000" }] }
            ]
        });
        let bytes = zip_with(ARCHIVE_ENTRY, &body.to_string());

        let ws = read_archive(Cursor::new(bytes))?;
        assert_eq!(ws.generated_palettes.len(), 1);
        assert_eq!(ws.generated_palettes[0].id, "p2");
        Ok(())
    }

    #[test]
    fn alternate_entry_name_is_accepted() -> anyhow::Result<()> {
        let bytes = zip_with(ALT_ARCHIVE_ENTRY, r#"{"paletteSize": 4}"#);
        let ws = read_archive(Cursor::new(bytes))?;
        assert_eq!(ws.palette_size, 4);
        Ok(())
    }

    #[test]
    fn missing_document_is_an_error() {
        let bytes = zip_with("something_else.json", "{}");
        assert!(matches!(
            read_archive(Cursor::new(bytes)),
            Err(ImportError::MissingDocument(_))
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let bytes = zip_with(ARCHIVE_ENTRY, "{ nope");
        assert!(matches!(
            read_archive(Cursor::new(bytes)),
            Err(ImportError::Malformed(_))
        ));

        let bytes = zip_with(ARCHIVE_ENTRY, "[1, 2, 3]");
        assert!(matches!(
            read_archive(Cursor::new(bytes)),
            Err(ImportError::Document(_))
        ));
    }

    #[test]
    fn non_zip_input_is_an_error() {
        let mut store = MemoryStore::new();
        let result = import_archive(Cursor::new(b"plain text".to_vec()), &mut store);
        assert!(matches!(result, Err(ImportError::Archive(_))));
        assert!(store.keys().unwrap().is_empty());
    }
}
