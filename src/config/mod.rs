mod client;
mod settings;

pub use client::{Client, ClientRegistry};
pub use settings::{AuditSettings, Config, LedgerSettings, RateSettings, ServerSettings};

use crate::error::{LedgerError, Result};
use crate::ledger::Document;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub const DOCUMENT_FILE: &str = "ledger.json";

/// Get the config directory path (XDG config dir, falling back to ~/.caseledger/)
pub fn config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "caseledger") {
        return Ok(proj_dirs.config_dir().to_path_buf());
    }

    let home = std::env::var_os("HOME").map(PathBuf::from).ok_or_else(|| {
        LedgerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        ))
    })?;

    Ok(home.join(".caseledger"))
}

/// Load config.toml
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let path = config_dir.join("config.toml");
    if !path.exists() {
        return Err(LedgerError::ConfigFileNotFound(path));
    }
    let content = fs::read_to_string(&path)?;
    let config: Config =
        toml::from_str(&content).map_err(|e| LedgerError::ConfigParse { path, source: e })?;
    if !(1..=12).contains(&config.ledger.start_month) {
        return Err(LedgerError::validation(
            "ledger.start_month",
            format!("{} is not a month (1-12)", config.ledger.start_month),
        ));
    }
    Ok(config)
}

/// Load clients.toml
pub fn load_clients(config_dir: &Path) -> Result<ClientRegistry> {
    let path = config_dir.join("clients.toml");
    if !path.exists() {
        return Err(LedgerError::ConfigFileNotFound(path));
    }
    let content = fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|e| LedgerError::ConfigParse { path, source: e })
}

/// Load ledger.json (an empty document if it does not exist yet)
pub fn load_document(config_dir: &Path, audit_capacity: usize) -> Result<Document> {
    let path = config_dir.join(DOCUMENT_FILE);
    let mut doc = if path.exists() {
        let content = fs::read_to_string(&path)?;
        serde_json::from_str::<Document>(&content)
            .map_err(|e| LedgerError::DocumentParse { path, source: e })?
    } else {
        Document::default()
    };
    doc.audit.set_capacity(audit_capacity);
    Ok(doc)
}

/// Save ledger.json through a temp file and rename
pub fn save_document(config_dir: &Path, doc: &Document) -> Result<()> {
    let path = config_dir.join(DOCUMENT_FILE);
    let tmp = config_dir.join(format!("{DOCUMENT_FILE}.tmp"));
    let content = serde_json::to_string_pretty(doc)?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Template content for config.toml
pub const CONFIG_TEMPLATE: &str = r#"[ledger]
start_month = 11          # first month of the fiscal year (1-12)

[exchange_rate]
url = "https://api.exchangerate-api.com/v4/latest/USD"
timeout_secs = 10
default_rate = 150.0      # USD/JPY used when the lookup fails

[server]
bind = "127.0.0.1:8787"

[audit]
max_entries = 1000
"#;

/// Template content for clients.toml
pub const CLIENTS_TEMPLATE: &str = r#"# Clients accepted in the クライアント column, in display order.
# The order also decides each client's highlight colour.
#
# Example:
#   caseledger register --sheet-type 月別シート --month 11 --client "Example Client" ...

[[client]]
name = "Example Client"
kind = "クライアント"     # optional
# note = "monthly retainer"   # optional
"#;
