use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::MonthKey;
use crate::error::{LedgerError, Result};
use crate::sheet::{SheetKind, Status};

/// Which sheet of a month a record goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "月別シート")]
    Monthly,
    #[serde(rename = "月末請求シート")]
    EndOfMonth,
}

impl RecordKind {
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Monthly => "月別シート",
            RecordKind::EndOfMonth => "月末請求シート",
        }
    }

    pub fn sheet_kind(self) -> SheetKind {
        match self {
            RecordKind::Monthly => SheetKind::Monthly,
            RecordKind::EndOfMonth => SheetKind::EndOfMonth,
        }
    }

    pub fn sheet_name(self, month: MonthKey) -> String {
        match self {
            RecordKind::Monthly => month.sheet_name(),
            RecordKind::EndOfMonth => month.end_of_month_name(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "月別シート" => Ok(RecordKind::Monthly),
            "月末請求シート" => Ok(RecordKind::EndOfMonth),
            other => Err(format!(
                "'{other}' is not a sheet type (expected 月別シート or 月末請求シート)"
            )),
        }
    }
}

/// Raw registration payload as it arrives from a form or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRequest {
    pub sheet_type: Option<String>,
    pub month: Option<String>,
    pub registration_date: Option<String>,
    pub client_name: Option<String>,
    pub industry: Option<String>,
    pub expense: Option<String>,
    pub expense_usd: Option<String>,
    pub revenue: Option<String>,
    pub order_date: Option<String>,
    pub delivery_date: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// A validated record ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub month: MonthKey,
    pub registration_date: Option<NaiveDate>,
    pub client_name: String,
    pub industry: Option<String>,
    pub expense: Option<f64>,
    pub expense_usd: Option<f64>,
    pub revenue: f64,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub status: Status,
    pub notes: String,
}

impl Record {
    pub fn sheet_name(&self) -> String {
        self.kind.sheet_name(self.month)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    present(value).ok_or_else(|| LedgerError::missing(field))
}

fn parse_amount(field: &str, raw: &str) -> Result<f64> {
    let amount: f64 = raw
        .parse()
        .map_err(|_| LedgerError::validation(field, format!("'{raw}' is not a number")))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(LedgerError::validation(
            field,
            format!("'{raw}' must be a non-negative amount"),
        ));
    }
    Ok(amount)
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .map_err(|_| LedgerError::validation(field, format!("'{raw}' is not a date (YYYY-MM-DD)")))
}

impl CaseRequest {
    pub const FIELDS: [&'static str; 12] = [
        "sheetType",
        "month",
        "registrationDate",
        "clientName",
        "industry",
        "expense",
        "expenseUsd",
        "revenue",
        "orderDate",
        "deliveryDate",
        "status",
        "notes",
    ];

    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).cloned();
        Self {
            sheet_type: get("sheetType"),
            month: get("month"),
            registration_date: get("registrationDate"),
            client_name: get("clientName"),
            industry: get("industry"),
            expense: get("expense"),
            expense_usd: get("expenseUsd"),
            revenue: get("revenue"),
            order_date: get("orderDate"),
            delivery_date: get("deliveryDate"),
            status: get("status"),
            notes: get("notes"),
        }
    }

    /// Non-blank fields as query parameters, in declaration order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let values = [
            &self.sheet_type,
            &self.month,
            &self.registration_date,
            &self.client_name,
            &self.industry,
            &self.expense,
            &self.expense_usd,
            &self.revenue,
            &self.order_date,
            &self.delivery_date,
            &self.status,
            &self.notes,
        ];
        Self::FIELDS
            .iter()
            .zip(values)
            .filter_map(|(key, value)| present(value).map(|v| (*key, v.to_string())))
            .collect()
    }

    /// Check required fields, then parse every field into its typed form.
    pub fn validate(&self) -> Result<Record> {
        let sheet_type = required(&self.sheet_type, "sheetType")?;
        let month = required(&self.month, "month")?;
        let client_name = required(&self.client_name, "clientName")?;
        let revenue = required(&self.revenue, "revenue")?;
        let status = required(&self.status, "status")?;
        let notes = required(&self.notes, "notes")?;

        let kind = sheet_type
            .parse::<RecordKind>()
            .map_err(|reason| LedgerError::validation("sheetType", reason))?;
        let month = MonthKey::parse(month).ok_or_else(|| {
            LedgerError::validation("month", format!("'{month}' is not a month (1-12)"))
        })?;
        let status = status
            .parse::<Status>()
            .map_err(|reason| LedgerError::validation("status", reason))?;

        let amount = |value: &Option<String>, field: &str| {
            present(value).map(|raw| parse_amount(field, raw)).transpose()
        };
        let date = |value: &Option<String>, field: &str| {
            present(value).map(|raw| parse_date(field, raw)).transpose()
        };

        Ok(Record {
            kind,
            month,
            registration_date: date(&self.registration_date, "registrationDate")?,
            client_name: client_name.to_string(),
            industry: present(&self.industry).map(str::to_string),
            expense: amount(&self.expense, "expense")?,
            expense_usd: amount(&self.expense_usd, "expenseUsd")?,
            revenue: parse_amount("revenue", revenue)?,
            order_date: date(&self.order_date, "orderDate")?,
            delivery_date: date(&self.delivery_date, "deliveryDate")?,
            status,
            notes: notes.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CaseRequest {
        CaseRequest {
            sheet_type: Some("月別シート".into()),
            month: Some("11月".into()),
            client_name: Some("Acme".into()),
            revenue: Some("100000".into()),
            status: Some("入金前".into()),
            notes: Some("初回".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        let record = request().validate().unwrap();
        assert_eq!(record.kind, RecordKind::Monthly);
        assert_eq!(record.month.number(), 11);
        assert_eq!(record.revenue, 100000.0);
        assert_eq!(record.status, Status::AwaitingPayment);
        assert_eq!(record.sheet_name(), "11月");
        assert!(record.registration_date.is_none());
    }

    #[test]
    fn test_required_fields_checked_in_order() {
        let empty = CaseRequest::default();
        assert_eq!(empty.validate().unwrap_err().field(), Some("sheetType"));

        let mut req = request();
        req.client_name = Some("  ".into());
        req.notes = None;
        assert_eq!(req.validate().unwrap_err().field(), Some("clientName"));

        let mut req = request();
        req.notes = Some("".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("notes"));
    }

    #[test]
    fn test_field_parse_errors_name_the_field() {
        let mut req = request();
        req.revenue = Some("-5".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("revenue"));

        let mut req = request();
        req.expense = Some("abc".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("expense"));

        let mut req = request();
        req.delivery_date = Some("2026-13-01".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("deliveryDate"));

        let mut req = request();
        req.sheet_type = Some("年次シート".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("sheetType"));

        let mut req = request();
        req.status = Some("保留".into());
        assert_eq!(req.validate().unwrap_err().field(), Some("status"));
    }

    #[test]
    fn test_blank_optionals_are_absent() {
        let mut req = request();
        req.expense = Some(" ".into());
        req.order_date = Some("".into());
        req.delivery_date = Some("2026/11/20".into());
        let record = req.validate().unwrap();
        assert_eq!(record.expense, None);
        assert_eq!(record.order_date, None);
        assert_eq!(record.delivery_date, NaiveDate::from_ymd_opt(2026, 11, 20));
    }

    #[test]
    fn test_params_round_trip_skips_blanks() {
        let mut req = request();
        req.industry = Some("".into());
        let params: HashMap<String, String> = req
            .to_params()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert!(!params.contains_key("industry"));
        assert_eq!(params["clientName"], "Acme");
        let back = CaseRequest::from_params(&params);
        assert_eq!(back.validate().unwrap(), request().validate().unwrap());
    }
}
