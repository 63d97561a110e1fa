use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::WorkingSetError;

/// Colors are identified by id; two colors may share a value.
pub type ColorId = String;

/// One user-supplied input color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub id: ColorId,
    /// Normalized `#RRGGBB`.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Color {
    /// Parse and normalize `value`, assigning a fresh id.
    pub fn new(value: &str) -> Result<Self, WorkingSetError> {
        Ok(Self {
            id: new_id(),
            value: normalize_value(value)?,
            label: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The label if set, else the hex value.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }

    /// RGB components, or `None` for a value that never went through
    /// normalization (e.g. hand-edited persisted data).
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let value = normalize_value(&self.value).ok()?;
        let r = u8::from_str_radix(&value[1..3], 16).ok()?;
        let g = u8::from_str_radix(&value[3..5], 16).ok()?;
        let b = u8::from_str_radix(&value[5..7], 16).ok()?;
        Some((r, g, b))
    }

    /// Black or white, whichever reads better on top of this color.
    pub fn contrast_text(&self) -> &'static str {
        let Some((r, g, b)) = self.rgb() else {
            return "#000000";
        };
        let luminance = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0;
        if luminance > 0.5 { "#000000" } else { "#FFFFFF" }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Normalize `#rgb`, `#rrggbb` (hash optional, any case) to `#RRGGBB`.
pub fn normalize_value(input: &str) -> Result<String, WorkingSetError> {
    let trimmed = input.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WorkingSetError::InvalidColor(input.to_string()));
    }

    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => return Err(WorkingSetError::InvalidColor(input.to_string())),
    };

    Ok(format!("#{}", expanded.to_ascii_uppercase()))
}

const KNOWN_COLORS: [(&str, &str); 6] = [
    ("#FFFFFF", "White"),
    ("#000000", "Black"),
    ("#A82B3D", "Red"),
    ("#465E7A", "Blue"),
    ("#92A14F", "Green"),
    ("#FAC403", "Yellow"),
];

/// Friendly name for one of the default colors.
pub fn known_label(value: &str) -> Option<&'static str> {
    let value = normalize_value(value).ok()?;
    KNOWN_COLORS
        .iter()
        .find(|(hex, _)| *hex == value)
        .map(|(_, name)| *name)
}

/// The six colors a fresh working set starts with.
pub fn default_input_colors() -> Vec<Color> {
    KNOWN_COLORS
        .iter()
        .map(|(hex, _)| Color {
            id: new_id(),
            value: (*hex).to_string(),
            label: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_long_form() {
        assert_eq!(normalize_value("#a82b3d").unwrap(), "#A82B3D");
        assert_eq!(normalize_value("a82b3d").unwrap(), "#A82B3D");
        assert_eq!(normalize_value("  #FAC403 ").unwrap(), "#FAC403");
    }

    #[test]
    fn expands_short_form() {
        assert_eq!(normalize_value("#f80").unwrap(), "#FF8800");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            normalize_value("#ggg000"),
            Err(WorkingSetError::InvalidColor("#ggg000".to_string()))
        );
        assert!(normalize_value("#1234").is_err());
        assert!(normalize_value("").is_err());
    }

    #[test]
    fn same_value_gets_distinct_ids() {
        let a = Color::new("#112233").unwrap();
        let b = Color::new("#112233").unwrap();
        assert_eq!(a.value, b.value);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn contrast_text_picks_readable_color() {
        assert_eq!(Color::new("#FFFFFF").unwrap().contrast_text(), "#000000");
        assert_eq!(Color::new("#000000").unwrap().contrast_text(), "#FFFFFF");
        assert_eq!(Color::new("#465e7a").unwrap().contrast_text(), "#FFFFFF");
        assert_eq!(Color::new("#fac403").unwrap().contrast_text(), "#000000");
    }

    #[test]
    fn rgb_of_hand_edited_value() {
        let c = Color {
            id: "x".into(),
            value: "abc".into(),
            label: None,
        };
        assert_eq!(c.rgb(), Some((0xaa, 0xbb, 0xcc)));

        let broken = Color {
            id: "y".into(),
            value: "red".into(),
            label: None,
        };
        assert_eq!(broken.rgb(), None);
    }

    #[test]
    fn defaults_are_labelled() {
        let colors = default_input_colors();
        assert_eq!(colors.len(), 6);
        for c in &colors {
            assert!(known_label(&c.value).is_some(), "{} has no label", c.value);
        }
        assert_eq!(known_label("#a82b3d"), Some("Red"));
        assert_eq!(known_label("#123456"), None);
    }
}
