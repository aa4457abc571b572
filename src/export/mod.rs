mod xlsx;

pub use xlsx::{export, CLIENT_SHEET};
