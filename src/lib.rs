pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod rates;
pub mod sheet;

pub use api::{ApiResponse, RecordStoreClient, SharedStore, Store};
pub use config::{Client, ClientRegistry, Config};
pub use error::{LedgerError, Result};
pub use ledger::{register, CaseRequest, Document, MonthKey, Registration};
pub use rates::{FixedRate, HttpRateSource, RateQuote, RateSource};
