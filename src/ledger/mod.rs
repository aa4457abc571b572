pub mod aggregate;
pub mod audit;
pub mod layout;
pub mod migrate;
pub mod record;
pub mod slots;
pub mod writer;

pub use aggregate::{Evaluator, MonthSummary, Totals, YearlyRow, YearlySummary};
pub use audit::{AuditEntry, AuditLog, Severity};
pub use record::{CaseRequest, Record, RecordKind};
pub use writer::{register, Registration};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::sheet::{Sheet, SheetKind};

/// Suffix that turns a monthly sheet name into its end-of-month pair.
pub const END_OF_MONTH_SUFFIX: &str = "（月末請求分）";

/// A month number (1-12) as used in sheet names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey(u32);

impl MonthKey {
    pub fn new(month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self(month))
    }

    /// Accepts "11", "11月" and surrounding whitespace.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let digits = trimmed.strip_suffix('月').unwrap_or(trimmed).trim();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().and_then(Self::new)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// The month `offset` months later, wrapping after December.
    pub fn plus(self, offset: u32) -> Self {
        Self((self.0 - 1 + offset) % 12 + 1)
    }

    pub fn sheet_name(self) -> String {
        format!("{}月", self.0)
    }

    pub fn end_of_month_name(self) -> String {
        format!("{}月{END_OF_MONTH_SUFFIX}", self.0)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}月", self.0)
    }
}

pub fn yearly_name(year: i32) -> String {
    format!("{year}年度")
}

/// The whole workbook: ordered sheets plus the audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
    #[serde(default)]
    pub audit: AuditLog,
}

impl Document {
    pub fn contains(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Sheet> {
        self.sheet(name)
            .ok_or_else(|| LedgerError::SheetNotFound(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> Result<&mut Sheet> {
        self.sheet_mut(name)
            .ok_or_else(|| LedgerError::SheetNotFound(name.to_string()))
    }

    /// Replace the sheet with the same name in place, or insert it after
    /// `after` (appending when that sheet is absent).
    pub fn upsert(&mut self, sheet: Sheet, after: Option<&str>) {
        if let Some(existing) = self.sheet_mut(&sheet.name) {
            *existing = sheet;
            return;
        }
        let position = after
            .and_then(|name| self.sheets.iter().position(|s| s.name == name))
            .map(|idx| idx + 1)
            .unwrap_or(self.sheets.len());
        self.sheets.insert(position, sheet);
    }

    /// Monthly sheet names ("N月"), sorted by month number.
    pub fn monthly_names(&self) -> Vec<String> {
        let mut months: Vec<(MonthKey, &str)> = self
            .sheets
            .iter()
            .filter(|s| s.kind == SheetKind::Monthly)
            .filter_map(|s| {
                let digits = s.name.strip_suffix('月')?;
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                MonthKey::parse(digits).map(|m| (m, s.name.as_str()))
            })
            .collect();
        months.sort_by_key(|(m, _)| *m);
        months.into_iter().map(|(_, name)| name.to_string()).collect()
    }

    pub fn yearly_names(&self) -> Vec<String> {
        self.sheets
            .iter()
            .filter(|s| s.kind == SheetKind::Yearly)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Re-point indirect references into `sheet` across the whole document
    /// after columns were inserted into it.
    pub fn shift_indirect(&mut self, sheet: &str, at: u32, count: u32) {
        for other in &mut self.sheets {
            for (_, cell) in other.cells_mut() {
                if let crate::sheet::Cell::Formula(expr) = cell {
                    expr.shift_indirect(sheet, at, count);
                }
            }
        }
    }
}
