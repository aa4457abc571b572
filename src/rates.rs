use std::fmt;
use std::time::Duration;
use ureq::Agent;

use crate::config::RateSettings;

/// A USD→JPY rate. `fallback` carries the reason when the default was used.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub rate: f64,
    pub fallback: Option<String>,
}

impl RateQuote {
    pub fn live(rate: f64) -> Self {
        Self {
            rate,
            fallback: None,
        }
    }
}

/// Where aggregation gets its exchange rate from. Lookups never fail;
/// a source falls back to a default instead.
pub trait RateSource: Send + Sync {
    fn quote(&self) -> RateQuote;
}

/// A constant rate, for offline use and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub f64);

impl RateSource for FixedRate {
    fn quote(&self) -> RateQuote {
        RateQuote::live(self.0)
    }
}

/// A quote fetched earlier, replayed as-is.
impl RateSource for RateQuote {
    fn quote(&self) -> RateQuote {
        self.clone()
    }
}

#[derive(Debug)]
enum RateError {
    Status(u16),
    Transport(String),
    Payload(String),
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateError::Status(code) => write!(f, "rate service returned HTTP {code}"),
            RateError::Transport(e) => write!(f, "rate service unreachable: {e}"),
            RateError::Payload(e) => write!(f, "unexpected rate payload: {e}"),
        }
    }
}

impl From<ureq::Error> for RateError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => RateError::Status(code),
            other => RateError::Transport(other.to_string()),
        }
    }
}

/// Fetches `rates.JPY` from an exchangerate-api style endpoint.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    url: String,
    timeout: Duration,
    default_rate: f64,
}

impl HttpRateSource {
    pub fn new(url: impl Into<String>, timeout: Duration, default_rate: f64) -> Self {
        Self {
            url: url.into(),
            timeout,
            default_rate,
        }
    }

    pub fn from_settings(settings: &RateSettings) -> Self {
        Self::new(
            settings.url.clone(),
            Duration::from_secs(settings.timeout_secs),
            settings.default_rate,
        )
    }

    fn fetch(&self) -> Result<f64, RateError> {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .into();

        let body: String = agent.get(self.url.as_str()).call()?.body_mut().read_to_string()?;

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RateError::Payload(e.to_string()))?;
        json["rates"]["JPY"]
            .as_f64()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .ok_or_else(|| RateError::Payload("missing rates.JPY".to_string()))
    }
}

impl RateSource for HttpRateSource {
    fn quote(&self) -> RateQuote {
        match self.fetch() {
            Ok(rate) => {
                tracing::debug!(rate, "fetched USD/JPY rate");
                RateQuote::live(rate)
            }
            Err(e) => {
                tracing::warn!(error = %e, default = self.default_rate, "using default exchange rate");
                RateQuote {
                    rate: self.default_rate,
                    fallback: Some(e.to_string()),
                }
            }
        }
    }
}
