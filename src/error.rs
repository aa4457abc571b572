use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Config directory not found at {0}. Run 'caseledger init' to create it.")]
    ConfigNotFound(PathBuf),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to read ledger document {path}: {source}")]
    DocumentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config directory already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("No free row left in sheet '{sheet}' (all {capacity} rows are in use)")]
    Capacity { sheet: String, capacity: u32 },

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("Sheet '{0}' already exists")]
    SheetExists(String),

    #[error("Sheet '{0}' uses the legacy layout. Run 'caseledger migrate' first.")]
    LegacyLayout(String),

    #[error("Failed to write workbook: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("API transport error: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::validation(field, "required field is missing or blank")
    }

    /// Field named by a validation failure.
    pub fn field(&self) -> Option<&str> {
        match self {
            LedgerError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
