use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cell::{CellRef, CellValue, Range};
use super::formula::Expr;
use super::schema::{SheetKind, CURRENT_LAYOUT};
use crate::config::ClientRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Value(CellValue),
    Formula(Expr),
}

/// What a data-validation rule accepts. Blank cells are always accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "values", rename_all = "snake_case")]
pub enum Rule {
    Date,
    OneOf(Vec<String>),
    /// Any name in the client registry.
    Registry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub range: Range,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", content = "arg", rename_all = "snake_case")]
pub enum Condition {
    TextEquals(String),
    /// The cell holds the date `today + days`.
    DateOffset(i64),
}

impl Condition {
    /// Spreadsheet formula for the rule, anchored at the range's first cell.
    pub fn formula(&self, anchor: CellRef) -> String {
        match self {
            Condition::TextEquals(text) => format!("={anchor}=\"{text}\""),
            Condition::DateOffset(0) => format!("={anchor}=TODAY()"),
            Condition::DateOffset(days) => format!("={anchor}=TODAY()+{days}"),
        }
    }

    fn matches(&self, value: &CellValue, today: NaiveDate) -> bool {
        match (self, value) {
            (Condition::TextEquals(expected), CellValue::Text(text)) => text == expected,
            (Condition::DateOffset(days), CellValue::Date(date)) => {
                *date == today + Duration::days(*days)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStyle {
    pub background: u32,
    #[serde(default)]
    pub font: Option<u32>,
}

impl CellStyle {
    pub const fn fill(background: u32) -> Self {
        Self {
            background,
            font: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalFormat {
    pub range: Range,
    pub condition: Condition,
    pub style: CellStyle,
}

/// A named grid of cells with its validation and formatting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub kind: SheetKind,
    pub layout_version: u32,
    cells: BTreeMap<CellRef, Cell>,
    #[serde(default)]
    pub validations: Vec<Validation>,
    #[serde(default)]
    pub formats: Vec<ConditionalFormat>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, kind: SheetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            layout_version: CURRENT_LAYOUT,
            cells: BTreeMap::new(),
            validations: Vec::new(),
            formats: Vec::new(),
        }
    }

    /// Drop every cell and rule. The layout version resets to current.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.validations.clear();
        self.formats.clear();
        self.layout_version = CURRENT_LAYOUT;
    }

    pub fn get(&self, cell: CellRef) -> Option<&Cell> {
        self.cells.get(&cell)
    }

    /// Literal value at `cell`; formulas and missing cells read as empty.
    pub fn value(&self, cell: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        match self.cells.get(&cell) {
            Some(Cell::Value(value)) => value,
            _ => &EMPTY,
        }
    }

    pub fn formula(&self, cell: CellRef) -> Option<&Expr> {
        match self.cells.get(&cell) {
            Some(Cell::Formula(expr)) => Some(expr),
            _ => None,
        }
    }

    pub fn set_value(&mut self, cell: CellRef, value: impl Into<CellValue>) {
        match value.into() {
            CellValue::Empty => {
                self.cells.remove(&cell);
            }
            value => {
                self.cells.insert(cell, Cell::Value(value));
            }
        }
    }

    pub fn set_formula(&mut self, cell: CellRef, expr: Expr) {
        self.cells.insert(cell, Cell::Formula(expr));
    }

    pub fn header(&self, col: u32) -> Option<&str> {
        self.value(CellRef::new(1, col)).as_text()
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells.iter()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (&CellRef, &mut Cell)> {
        self.cells.iter_mut()
    }

    /// Insert `count` blank columns before column `at`, moving cells, rule
    /// ranges and same-sheet formula references to the right.
    pub fn insert_columns(&mut self, at: u32, count: u32) {
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .map(|(mut cell, mut content)| {
                cell.shift_columns(at, count);
                if let Cell::Formula(expr) = &mut content {
                    expr.shift_local(at, count);
                }
                (cell, content)
            })
            .collect();

        for validation in &mut self.validations {
            validation.range.shift_columns(at, count);
        }
        for format in &mut self.formats {
            format.range.shift_columns(at, count);
        }
    }

    /// Check `value` against every validation rule covering `cell`.
    pub fn check(
        &self,
        cell: CellRef,
        value: &CellValue,
        registry: &ClientRegistry,
    ) -> Result<(), String> {
        if value.is_blank() {
            return Ok(());
        }
        for validation in self.validations.iter().filter(|v| v.range.contains(cell)) {
            let accepted = match (&validation.rule, value) {
                (Rule::Date, CellValue::Date(_)) => true,
                (Rule::Date, _) => false,
                (Rule::OneOf(options), CellValue::Text(text)) => options.iter().any(|o| o == text),
                (Rule::Registry, CellValue::Text(text)) => registry.contains(text),
                _ => false,
            };
            if !accepted {
                let expected = match &validation.rule {
                    Rule::Date => "a calendar date".to_string(),
                    Rule::OneOf(options) => format!("one of {}", options.join(", ")),
                    Rule::Registry => "a client listed in clients.toml".to_string(),
                };
                return Err(format!("'{value}' is not accepted in {cell}; expected {expected}"));
            }
        }
        Ok(())
    }

    /// First conditional style that applies to `cell` on `today`.
    pub fn style_at(&self, cell: CellRef, today: NaiveDate) -> Option<CellStyle> {
        let value = self.value(cell);
        self.formats
            .iter()
            .find(|f| f.range.contains(cell) && f.condition.matches(value, today))
            .map(|f| f.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Client;

    fn registry(names: &[&str]) -> ClientRegistry {
        ClientRegistry {
            clients: names.iter().map(|n| Client::named(n)).collect(),
        }
    }

    #[test]
    fn test_set_empty_removes_cell() {
        let mut sheet = Sheet::new("s", SheetKind::Monthly);
        let cell = CellRef::new(2, 4);
        sheet.set_value(cell, "Acme");
        assert_eq!(sheet.value(cell).as_text(), Some("Acme"));
        sheet.set_value(cell, CellValue::Empty);
        assert!(sheet.get(cell).is_none());
    }

    #[test]
    fn test_insert_columns_moves_cells_rules_and_formulas() {
        let mut sheet = Sheet::new("s", SheetKind::EndOfMonth);
        sheet.set_value(CellRef::new(2, 1), 1.0);
        sheet.set_value(CellRef::new(2, 3), "Acme");
        sheet.set_formula(CellRef::new(67, 4), Expr::Sum(Range::column(4, 2, 66)));
        sheet.validations.push(Validation {
            range: Range::column(3, 2, 66),
            rule: Rule::Registry,
        });

        sheet.insert_columns(3, 1);

        assert_eq!(sheet.value(CellRef::new(2, 1)).as_number(), Some(1.0));
        assert!(sheet.get(CellRef::new(2, 3)).is_none());
        assert_eq!(sheet.value(CellRef::new(2, 4)).as_text(), Some("Acme"));
        assert_eq!(
            sheet.formula(CellRef::new(67, 5)).map(|e| e.formula()),
            Some("=SUM(E2:E66)".to_string())
        );
        assert_eq!(sheet.validations[0].range, Range::column(4, 2, 66));
    }

    #[test]
    fn test_check_enforces_rules() {
        let mut sheet = Sheet::new("s", SheetKind::Monthly);
        sheet.validations.push(Validation {
            range: Range::column(4, 2, 66),
            rule: Rule::Registry,
        });
        sheet.validations.push(Validation {
            range: Range::column(2, 2, 66),
            rule: Rule::Date,
        });
        let clients = registry(&["Acme"]);

        assert!(sheet.check(CellRef::new(2, 4), &"Acme".into(), &clients).is_ok());
        assert!(sheet.check(CellRef::new(2, 4), &"Globex".into(), &clients).is_err());
        assert!(sheet.check(CellRef::new(2, 2), &"2026-01-01".into(), &clients).is_err());
        assert!(sheet.check(CellRef::new(2, 2), &CellValue::Empty, &clients).is_ok());
        // Cells outside any rule are unrestricted.
        assert!(sheet.check(CellRef::new(2, 5), &"anything".into(), &clients).is_ok());
    }

    #[test]
    fn test_delivery_date_styles() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let mut sheet = Sheet::new("s", SheetKind::Monthly);
        let range = Range::column(3, 2, 66);
        sheet.formats.push(ConditionalFormat {
            range,
            condition: Condition::DateOffset(0),
            style: CellStyle {
                background: 0xFF0000,
                font: Some(0xFFFFFF),
            },
        });
        sheet.formats.push(ConditionalFormat {
            range,
            condition: Condition::DateOffset(1),
            style: CellStyle::fill(0xFFFF00),
        });

        sheet.set_value(CellRef::new(2, 3), today);
        sheet.set_value(CellRef::new(3, 3), today + Duration::days(1));
        sheet.set_value(CellRef::new(4, 3), today + Duration::days(2));

        assert_eq!(sheet.style_at(CellRef::new(2, 3), today).map(|s| s.background), Some(0xFF0000));
        assert_eq!(sheet.style_at(CellRef::new(3, 3), today).map(|s| s.background), Some(0xFFFF00));
        assert_eq!(sheet.style_at(CellRef::new(4, 3), today), None);
        assert_eq!(Condition::DateOffset(1).formula(CellRef::new(2, 3)), "=C2=TODAY()+1");
    }
}
