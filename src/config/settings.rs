use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub exchange_rate: RateSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub audit: AuditSettings,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LedgerSettings {
    /// First month of the fiscal year (1-12)
    pub start_month: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self { start_month: 11 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateSettings {
    pub url: String,
    pub timeout_secs: u64,
    /// USD→JPY rate used whenever the lookup fails
    pub default_rate: f64,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            url: "https://api.exchangerate-api.com/v4/latest/USD".to_string(),
            timeout_secs: 10,
            default_rate: 150.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuditSettings {
    pub max_entries: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}
