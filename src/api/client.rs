use std::time::Duration;
use ureq::Agent;

use super::ApiResponse;
use crate::error::{LedgerError, Result};
use crate::ledger::{CaseRequest, MonthKey, MonthSummary};

/// Talks to a running Record Store API over HTTP.
pub struct RecordStoreClient {
    base: String,
    agent: Agent,
}

impl RecordStoreClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            base: base.into(),
            agent,
        }
    }

    /// Send one GET request and decode the reply.
    ///
    /// HTML or non-JSON bodies are transport errors; `success: false`
    /// replies become [`LedgerError::Remote`].
    pub fn call(&self, params: &[(&str, String)]) -> Result<ApiResponse> {
        let mut request = self.agent.get(self.base.as_str());
        for (key, value) in params {
            request = request.query(*key, value);
        }

        let mut response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => {
                LedgerError::Transport(format!("server returned HTTP {code}"))
            }
            other => LedgerError::Transport(other.to_string()),
        })?;

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if is_html || body.trim_start().starts_with('<') {
            return Err(LedgerError::Transport(
                "server answered with an HTML page instead of JSON".to_string(),
            ));
        }

        let reply: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| LedgerError::Transport(format!("invalid JSON reply: {e}")))?;
        if !reply.success {
            return Err(LedgerError::Remote(
                reply.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(reply)
    }

    fn action(&self, action: &str) -> Result<ApiResponse> {
        self.call(&[("action", action.to_string())])
    }

    pub fn clients(&self) -> Result<Vec<String>> {
        Ok(self.action("clients")?.clients.unwrap_or_default())
    }

    pub fn statuses(&self) -> Result<Vec<String>> {
        Ok(self.action("statuses")?.statuses.unwrap_or_default())
    }

    pub fn months(&self) -> Result<Vec<String>> {
        Ok(self.action("months")?.months.unwrap_or_default())
    }

    /// Register a case; returns the row it was written to.
    pub fn register(&self, request: &CaseRequest) -> Result<u32> {
        let mut params = vec![("action", "registerCase".to_string())];
        params.extend(request.to_params());
        let reply = self.call(&params)?;
        reply
            .row
            .ok_or_else(|| LedgerError::Transport("reply carried no row".to_string()))
    }

    pub fn summary(&self, month: MonthKey) -> Result<MonthSummary> {
        let reply = self.call(&[
            ("action", "summary".to_string()),
            ("month", month.number().to_string()),
        ])?;
        reply
            .summary
            .ok_or_else(|| LedgerError::Transport("reply carried no summary".to_string()))
    }
}
