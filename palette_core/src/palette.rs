use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::color::{Color, new_id};

/// An ordered selection of input colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub id: String,
    pub colors: Vec<Color>,
    #[serde(default)]
    pub used: bool,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: u64,
}

impl Palette {
    pub fn new(colors: Vec<Color>) -> Self {
        Self {
            id: new_id(),
            colors,
            used: false,
            created_at: now_millis(),
        }
    }

    pub fn signature(&self) -> Signature {
        Signature::of(&self.colors)
    }
}

/// Ordered color values; the dedup key for palettes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<String>);

impl Signature {
    pub fn of(colors: &[Color]) -> Self {
        Self(colors.iter().map(|c| c.value.clone()).collect())
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

/// Which palettes a listing shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteFilter {
    #[default]
    All,
    Used,
    Unused,
}

impl PaletteFilter {
    pub fn matches(self, palette: &Palette) -> bool {
        match self {
            Self::All => true,
            Self::Used => palette.used,
            Self::Unused => !palette.used,
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
