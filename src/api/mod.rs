//! Record Store API: the JSON endpoint web forms talk to.
//!
//! Every request is answered with HTTP 200 and a `{success, ...}` body so
//! that domain failures stay distinguishable from transport failures.

pub mod client;

pub use client::RecordStoreClient;

use axum::{
    body::Bytes,
    extract::{FromRequest, Query, Request, State},
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Form, Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{Any, CorsLayer};

use crate::config::{save_document, ClientRegistry};
use crate::error::{LedgerError, Result};
use crate::ledger::aggregate::{month_summary, yearly_summary};
use crate::ledger::{
    register, yearly_name, CaseRequest, Document, MonthKey, MonthSummary, YearlySummary,
};
use crate::rates::RateSource;
use crate::sheet::Status;

pub const SUCCESS_MESSAGE: &str = "案件を登録しました";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<MonthSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly: Option<YearlySummary>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// The document together with what the API needs to act on it.
pub struct Store {
    doc: Document,
    registry: ClientRegistry,
    rates: Arc<dyn RateSource>,
    dir: Option<PathBuf>,
}

pub type SharedStore = Arc<Mutex<Store>>;

/// `action`, or its `path` alias used by older form clients.
fn action_of(params: &HashMap<String, String>) -> Option<&str> {
    ["action", "path"]
        .iter()
        .filter_map(|key| params.get(*key))
        .map(|a| a.trim())
        .find(|a| !a.is_empty())
}

fn lock(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Store {
    /// An in-memory store; nothing is written to disk.
    pub fn new(doc: Document, registry: ClientRegistry, rates: Arc<dyn RateSource>) -> Self {
        Self {
            doc,
            registry,
            rates,
            dir: None,
        }
    }

    /// Save the document into `dir` after every request.
    pub fn persist_to(mut self, dir: PathBuf) -> Self {
        self.dir = Some(dir);
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn rate_source(&self) -> Arc<dyn RateSource> {
        Arc::clone(&self.rates)
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    fn fail(&mut self, operation: &str, err: LedgerError) -> ApiResponse {
        self.doc.audit.error(operation, err.to_string());
        ApiResponse::failure(err.to_string())
    }

    /// Record a request that never reached an action, e.g. an unreadable body.
    pub fn reject(&mut self, operation: &str, reason: &str) -> ApiResponse {
        let before = self.doc.clone();
        let response = self.fail(operation, LedgerError::validation("request", reason));
        self.commit(before, response)
    }

    /// Save, or roll the document back to `before` when saving fails.
    fn commit(&mut self, before: Document, response: ApiResponse) -> ApiResponse {
        let Some(dir) = &self.dir else {
            return response;
        };
        match save_document(dir, &self.doc) {
            Ok(()) => response,
            Err(e) => {
                tracing::error!(error = %e, "failed to save ledger document");
                self.doc = before;
                ApiResponse::failure(format!("failed to save ledger: {e}"))
            }
        }
    }

    /// Answer one API request. `today` is the default registration date.
    pub fn dispatch(&mut self, params: &HashMap<String, String>, today: NaiveDate) -> ApiResponse {
        let rates = self.rate_source();
        self.dispatch_with(params, today, rates.as_ref())
    }

    /// Like [`Store::dispatch`] with an explicit rate source for summaries.
    pub fn dispatch_with(
        &mut self,
        params: &HashMap<String, String>,
        today: NaiveDate,
        rates: &dyn RateSource,
    ) -> ApiResponse {
        let before = self.doc.clone();
        let response = self.answer(params, today, rates);
        self.commit(before, response)
    }

    fn answer(
        &mut self,
        params: &HashMap<String, String>,
        today: NaiveDate,
        rates: &dyn RateSource,
    ) -> ApiResponse {
        let action = match action_of(params) {
            Some(action) => action,
            None if params.contains_key("sheetType") => "registerCase",
            None => return self.fail("doGet", LedgerError::missing("action")),
        };
        tracing::debug!(action, "api request");

        match action {
            "clients" => ApiResponse {
                clients: Some(self.registry.names()),
                ..ApiResponse::ok()
            },
            "statuses" => ApiResponse {
                statuses: Some(Status::labels()),
                ..ApiResponse::ok()
            },
            "months" => ApiResponse {
                months: Some(self.doc.monthly_names()),
                ..ApiResponse::ok()
            },
            "registerCase" => {
                let request = CaseRequest::from_params(params);
                match register(&mut self.doc, &request, &self.registry, today) {
                    Ok(registration) => ApiResponse {
                        message: Some(SUCCESS_MESSAGE.to_string()),
                        row: Some(registration.row),
                        ..ApiResponse::ok()
                    },
                    // Already recorded in the audit log by `register`.
                    Err(e) => ApiResponse::failure(e.to_string()),
                }
            }
            "summary" => self.summary(params, rates),
            other => {
                let err = LedgerError::validation("action", format!("unknown action '{other}'"));
                self.fail("doGet", err)
            }
        }
    }

    fn summary(&mut self, params: &HashMap<String, String>, rates: &dyn RateSource) -> ApiResponse {
        if let Some(year) = params.get("year").map(|y| y.trim()).filter(|y| !y.is_empty()) {
            let name = match year.parse::<i32>() {
                Ok(number) => yearly_name(number),
                Err(_) => year.to_string(),
            };
            return match yearly_summary(&self.doc, &name, rates) {
                Ok(summary) => {
                    self.note_fallback(summary.rate_fallback.as_deref());
                    ApiResponse {
                        yearly: Some(summary),
                        ..ApiResponse::ok()
                    }
                }
                Err(e) => self.fail("summary", e),
            };
        }

        let month = match params.get("month").map(String::as_str) {
            Some(raw) if !raw.trim().is_empty() => match MonthKey::parse(raw) {
                Some(month) => month,
                None => {
                    let reason = format!("'{raw}' is not a month (1-12)");
                    let err = LedgerError::validation("month", reason);
                    return self.fail("summary", err);
                }
            },
            _ => return self.fail("summary", LedgerError::missing("month")),
        };
        match month_summary(&self.doc, month, rates) {
            Ok(summary) => {
                self.note_fallback(summary.rate_fallback.as_deref());
                ApiResponse {
                    summary: Some(summary),
                    ..ApiResponse::ok()
                }
            }
            Err(e) => self.fail("summary", e),
        }
    }

    fn note_fallback(&mut self, reason: Option<&str>) {
        if let Some(reason) = reason {
            self.doc
                .audit
                .warning("getExchangeRate", format!("Using default rate: {reason}"));
        }
    }
}

/// Flatten a JSON object body into string parameters.
fn json_params(body: &[u8]) -> std::result::Result<HashMap<String, String>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| format!("request body is not a JSON object: {e}"))?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

async fn body_params(request: Request) -> std::result::Result<HashMap<String, String>, String> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        let Form(params) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| e.body_text())?;
        return Ok(params);
    }
    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| e.body_text())?;
    json_params(&body)
}

/// Run one request on the blocking pool. A summary fetches its exchange
/// rate before taking the store lock so registrations never wait on it.
fn respond(store: &SharedStore, params: &HashMap<String, String>) -> ApiResponse {
    let today = Local::now().date_naive();
    if action_of(params) == Some("summary") {
        let rates = lock(store).rate_source();
        let quote = rates.quote();
        return lock(store).dispatch_with(params, today, &quote);
    }
    lock(store).dispatch(params, today)
}

async fn handle(
    State(store): State<SharedStore>,
    Query(mut params): Query<HashMap<String, String>>,
    request: Request,
) -> Json<ApiResponse> {
    let body = if *request.method() == Method::POST {
        body_params(request).await
    } else {
        Ok(HashMap::new())
    };

    let result = tokio::task::spawn_blocking(move || match body {
        Ok(body) => {
            params.extend(body);
            respond(&store, &params)
        }
        Err(reason) => lock(&store).reject("doPost", &reason),
    })
    .await;

    Json(result.unwrap_or_else(|e| ApiResponse::failure(format!("internal error: {e}"))))
}

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(handle).post(handle))
        .route("/api", get(handle).post(handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(store)
}

/// Serve the API until Ctrl-C.
pub async fn serve(store: SharedStore, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
