use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 1-based cell address (`row` 1 is the header row, `col` 1 is column A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Shift the column right by `count` when it sits at or after `at`.
    pub fn shift_columns(&mut self, at: u32, count: u32) {
        if self.col >= at {
            self.col += count;
        }
    }
}

/// Convert a 1-based column number to its letter form (1 -> A, 27 -> AA).
pub fn column_letter(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        if ch.is_ascii_uppercase() {
            acc.checked_mul(26)?.checked_add(ch as u32 - 'A' as u32 + 1)
        } else {
            None
        }
    })
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row)
    }
}

impl FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("invalid cell reference '{s}'"))?;
        let (letters, digits) = s.split_at(split);
        let col = column_number(letters).ok_or_else(|| format!("invalid column in '{s}'"))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| format!("invalid row in '{s}'"))?;
        if row == 0 {
            return Err(format!("invalid row in '{s}'"));
        }
        Ok(CellRef { row, col })
    }
}

impl TryFrom<String> for CellRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

/// An inclusive rectangular range of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// A single-column range spanning `first_row..=last_row`.
    pub const fn column(col: u32, first_row: u32, last_row: u32) -> Self {
        Self {
            start: CellRef::new(first_row, col),
            end: CellRef::new(last_row, col),
        }
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row).flat_map(move |row| {
            (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col))
        })
    }

    pub fn shift_columns(&mut self, at: u32, count: u32) {
        self.start.shift_columns(at, count);
        self.end.shift_columns(at, count);
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// A literal cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl CellValue {
    /// Empty cells and whitespace-only text count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(14), "N");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
    }

    #[test]
    fn test_cell_ref_parse_and_display() {
        let cell: CellRef = "N67".parse().unwrap();
        assert_eq!(cell, CellRef::new(67, 14));
        assert_eq!(cell.to_string(), "N67");
        assert!("67".parse::<CellRef>().is_err());
        assert!("A0".parse::<CellRef>().is_err());
    }

    #[test]
    fn test_overlong_column_is_rejected() {
        assert_eq!(column_number("XFD"), Some(16384));
        assert_eq!(column_number("ZZZZZZ"), Some(321272406));
        assert_eq!(column_number("AAAAAAAAAAAAAAAAAAAA"), None);
        assert!("AAAAAAAAAAAAAAAAAAAA1".parse::<CellRef>().is_err());
    }

    #[test]
    fn test_shift_only_moves_columns_at_or_after_insertion() {
        let mut range = Range::column(4, 2, 66);
        range.shift_columns(2, 2);
        assert_eq!(range.to_string(), "F2:F66");

        let mut before = CellRef::new(2, 1);
        before.shift_columns(2, 2);
        assert_eq!(before.to_string(), "A2");
    }

    #[test]
    fn test_blank_detection() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::from("   ").is_blank());
        assert!(!CellValue::from("Acme").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }
}
