use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::color::{known_label, new_id, normalize_value};
use crate::palette::now_millis;
use crate::{
    Color, DEFAULT_PALETTE_SIZE, DEFAULT_SAMPLE_BUDGET, MAX_PALETTE_SIZE, MIN_PALETTE_SIZE,
    Palette, PersistError, WorkingSet, default_input_colors,
};

pub const SCHEMA_VERSION: u32 = 2;

pub const KEY_VERSION: &str = "version";
pub const KEY_INPUT_COLORS: &str = "inputColors";
pub const KEY_PALETTE_SIZE: &str = "paletteSize";
pub const KEY_NUM_SAMPLES: &str = "numSamples";
pub const KEY_GENERATED_PALETTES: &str = "generatedPalettes";

/// Keys of the first storage layout, removed once a set is re-saved.
pub const LEGACY_KEY_PALETTES: &str = "palettes";
pub const LEGACY_KEY_USED_PALETTES: &str = "usedPalettes";

/// Whole-app state exports nest the working set under this key.
const KEY_NESTED_STATE: &str = "palette";

/// Read-side alias of `numSamples`.
const KEY_SAMPLE_BUDGET_ALIAS: &str = "sampleBudget";

/// Every key a current document is written under.
pub const DOCUMENT_KEYS: [&str; 5] = [
    KEY_VERSION,
    KEY_INPUT_COLORS,
    KEY_PALETTE_SIZE,
    KEY_NUM_SAMPLES,
    KEY_GENERATED_PALETTES,
];

/// On-disk shape. Unknown fields are ignored, missing ones defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default = "current_version")]
    version: u32,
    #[serde(default = "default_input_colors")]
    input_colors: Vec<Color>,
    #[serde(default = "default_palette_size")]
    palette_size: usize,
    #[serde(default = "default_sample_budget", alias = "sampleBudget")]
    num_samples: usize,
    #[serde(default)]
    generated_palettes: Vec<Palette>,
}

/// Keys that make up a working set in any layout this module reads.
pub fn is_working_set_key(key: &str) -> bool {
    DOCUMENT_KEYS.contains(&key)
        || [
            LEGACY_KEY_PALETTES,
            LEGACY_KEY_USED_PALETTES,
            KEY_NESTED_STATE,
            KEY_SAMPLE_BUDGET_ALIAS,
        ]
        .contains(&key)
}

/// Settings outside the editable range fall back to defaults.
fn checked_settings(palette_size: usize, sample_budget: usize) -> (usize, usize) {
    let palette_size = if (MIN_PALETTE_SIZE..=MAX_PALETTE_SIZE).contains(&palette_size) {
        palette_size
    } else {
        warn!(
            palette_size,
            min = MIN_PALETTE_SIZE,
            max = MAX_PALETTE_SIZE,
            using = DEFAULT_PALETTE_SIZE,
            "stored palette size out of range, using default"
        );
        DEFAULT_PALETTE_SIZE
    };
    let sample_budget = if sample_budget == 0 {
        warn!(using = DEFAULT_SAMPLE_BUDGET, "stored sample budget is zero, using default");
        DEFAULT_SAMPLE_BUDGET
    } else {
        sample_budget
    };
    (palette_size, sample_budget)
}

fn current_version() -> u32 {
    SCHEMA_VERSION
}

fn default_palette_size() -> usize {
    DEFAULT_PALETTE_SIZE
}

fn default_sample_budget() -> usize {
    DEFAULT_SAMPLE_BUDGET
}

/// Encode a working set as one JSON object.
pub fn serialize(ws: &WorkingSet) -> Result<Value, serde_json::Error> {
    serde_json::to_value(Document {
        version: SCHEMA_VERSION,
        input_colors: ws.input_colors.clone(),
        palette_size: ws.palette_size,
        num_samples: ws.sample_budget,
        generated_palettes: ws.generated_palettes.clone(),
    })
}

/// Decode a JSON object produced by `serialize`, a whole-app export that
/// nests it under `palette`, or a first-generation (string colors) layout.
pub fn deserialize(value: &Value) -> Result<WorkingSet, PersistError> {
    let object = value.as_object().ok_or(PersistError::NotAnObject)?;

    if !object.contains_key(KEY_INPUT_COLORS)
        && let Some(nested) = object.get(KEY_NESTED_STATE).filter(|v| v.is_object())
    {
        debug!("unwrapping nested palette state");
        return deserialize(nested);
    }

    if is_legacy(value) {
        return migrate_legacy(value);
    }

    let doc: Document = serde_json::from_value(value.clone())?;
    if doc.version > SCHEMA_VERSION {
        warn!(
            version = doc.version,
            supported = SCHEMA_VERSION,
            "document is newer than this build, reading known fields only"
        );
    }

    let (palette_size, sample_budget) = checked_settings(doc.palette_size, doc.num_samples);
    Ok(WorkingSet {
        input_colors: doc.input_colors,
        palette_size,
        generated_palettes: doc.generated_palettes,
        sample_budget,
    })
}

/// First-generation documents store colors as bare hex strings and keep
/// palettes under `palettes`.
fn is_legacy(value: &Value) -> bool {
    if value.get(KEY_GENERATED_PALETTES).is_some() {
        return false;
    }
    let string_colors = value
        .get(KEY_INPUT_COLORS)
        .and_then(Value::as_array)
        .and_then(|colors| colors.first())
        .is_some_and(Value::is_string);
    string_colors || value.get(LEGACY_KEY_PALETTES).is_some()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDocument {
    #[serde(default)]
    input_colors: Vec<String>,
    palette_size: Option<usize>,
    num_samples: Option<usize>,
    #[serde(default)]
    palettes: Vec<LegacyPalette>,
    /// JSON-encoded color arrays, the old out-of-band used set.
    #[serde(default)]
    used_palettes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyPalette {
    #[serde(default)]
    colors: Vec<String>,
    #[serde(default)]
    used: bool,
}

fn migrate_legacy(value: &Value) -> Result<WorkingSet, PersistError> {
    let old: LegacyDocument = serde_json::from_value(value.clone())?;

    let mut input_colors = Vec::with_capacity(old.input_colors.len());
    let mut by_value: HashMap<String, Color> = HashMap::new();
    for raw in &old.input_colors {
        match Color::new(raw) {
            Ok(mut color) => {
                color.label = known_label(&color.value).map(str::to_string);
                by_value
                    .entry(color.value.clone())
                    .or_insert_with(|| color.clone());
                input_colors.push(color);
            }
            Err(err) => warn!(color = %raw, %err, "skipping unreadable legacy color"),
        }
    }
    if input_colors.is_empty() {
        input_colors = default_input_colors();
    }

    let used_keys: HashSet<&str> = old.used_palettes.iter().map(String::as_str).collect();
    let created_at = now_millis();
    let generated_palettes = old
        .palettes
        .iter()
        .map(|p| {
            let key = serde_json::to_string(&p.colors).unwrap_or_default();
            let colors = p
                .colors
                .iter()
                .map(|raw| legacy_palette_color(raw, &by_value))
                .collect();
            Palette {
                id: new_id(),
                colors,
                used: p.used || used_keys.contains(key.as_str()),
                created_at,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        colors = input_colors.len(),
        palettes = generated_palettes.len(),
        "migrated legacy document"
    );

    let (palette_size, sample_budget) = checked_settings(
        old.palette_size.unwrap_or(DEFAULT_PALETTE_SIZE),
        old.num_samples.unwrap_or(DEFAULT_SAMPLE_BUDGET),
    );
    Ok(WorkingSet {
        input_colors,
        palette_size,
        generated_palettes,
        sample_budget,
    })
}

/// Resolve a legacy palette color by value. Unknown values become stray
/// colors with their own id, so revalidation drops the palette later.
fn legacy_palette_color(raw: &str, by_value: &HashMap<String, Color>) -> Color {
    let value = normalize_value(raw).unwrap_or_else(|_| raw.to_ascii_uppercase());
    if let Some(color) = by_value.get(&value) {
        return color.clone();
    }
    Color {
        id: new_id(),
        label: Some(
            known_label(&value)
                .map(str::to_string)
                .unwrap_or_else(|| value.clone()),
        ),
        value,
    }
}
