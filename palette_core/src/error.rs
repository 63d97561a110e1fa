use thiserror::Error;

use crate::{MAX_PALETTE_SIZE, MIN_PALETTE_SIZE};

/// Rejected edits to a working set. The working set is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkingSetError {
    #[error(
        "palette size {0} is outside {min}..={max}",
        min = MIN_PALETTE_SIZE,
        max = MAX_PALETTE_SIZE
    )]
    InvalidPaletteSize(usize),
    #[error("sample budget must be at least 1")]
    InvalidSampleBudget,
    #[error("unknown color id '{0}'")]
    UnknownColor(String),
    #[error("at least one input color is required")]
    LastColor,
    #[error("invalid color value '{0}' (expected #RGB or #RRGGBB)")]
    InvalidColor(String),
}

/// Errors from a key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store IO failed")]
    Io(#[from] std::io::Error),
    #[error("store JSON failed")]
    Json(#[from] serde_json::Error),
    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },
}

/// Errors turning a persisted JSON document back into a working set.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persisted document is not a JSON object")]
    NotAnObject,
    #[error("persisted document does not match the schema")]
    Json(#[from] serde_json::Error),
}

/// Errors writing an export archive.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export IO failed")]
    Io(#[from] std::io::Error),
    #[error("export archive could not be written")]
    Archive(#[from] zip::result::ZipError),
    #[error("reading the store for export failed")]
    Store(#[from] StoreError),
    #[error("export document could not be encoded")]
    Json(#[from] serde_json::Error),
}

/// Errors reading an import archive. Unlike a corrupt local store these
/// are surfaced to the caller, since the user asked for the import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import IO failed")]
    Io(#[from] std::io::Error),
    #[error("import file is not a readable zip archive")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive does not contain a '{0}' document")]
    MissingDocument(&'static str),
    #[error("archive document is not valid JSON")]
    Malformed(#[source] serde_json::Error),
    #[error("archive document has an unexpected shape")]
    Document(#[from] PersistError),
}
