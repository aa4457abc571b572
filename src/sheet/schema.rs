use serde::{Deserialize, Serialize};
use std::fmt;

use super::cell::CellRef;
use super::{TOTAL_ROW, YEARLY_TOTAL_ROW};

/// Layout version written by the current builder.
pub const CURRENT_LAYOUT: u32 = 2;

/// What a column holds, independent of where a layout version puts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ItemNumber,
    OrderDate,
    DeliveryDate,
    Client,
    Industry,
    Expense,
    ExpenseUsd,
    Revenue,
    Profit,
    Status,
    Notes,
    Month,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub field: Field,
    pub header: &'static str,
    /// Display width in pixels.
    pub width: u16,
}

const fn column(field: Field, header: &'static str, width: u16) -> Column {
    Column {
        field,
        header,
        width,
    }
}

const MONTHLY: [Column; 11] = [
    column(Field::ItemNumber, "項番", 40),
    column(Field::OrderDate, "受注日", 70),
    column(Field::DeliveryDate, "納期", 70),
    column(Field::Client, "クライアント", 150),
    column(Field::Industry, "業種", 100),
    column(Field::Expense, "経費", 100),
    column(Field::ExpenseUsd, "経費（ドル）", 120),
    column(Field::Revenue, "売上", 100),
    column(Field::Profit, "利益", 100),
    column(Field::Status, "ステータス", 120),
    column(Field::Notes, "備考", 400),
];

const MONTHLY_V1: [Column; 9] = [
    column(Field::ItemNumber, "項番", 40),
    column(Field::Client, "クライアント", 150),
    column(Field::Industry, "業種", 100),
    column(Field::Expense, "経費", 100),
    column(Field::ExpenseUsd, "経費（ドル）", 120),
    column(Field::Revenue, "売上", 100),
    column(Field::Profit, "利益", 100),
    column(Field::Status, "ステータス", 120),
    column(Field::Notes, "備考", 400),
];

const END_OF_MONTH: [Column; 9] = [
    column(Field::ItemNumber, "項番", 40),
    column(Field::OrderDate, "受注日", 70),
    column(Field::DeliveryDate, "納期", 70),
    column(Field::Client, "クライアント", 150),
    column(Field::Expense, "経費", 100),
    column(Field::Revenue, "売上", 100),
    column(Field::Profit, "利益", 100),
    column(Field::Status, "ステータス", 120),
    column(Field::Notes, "備考", 400),
];

const END_OF_MONTH_V1: [Column; 8] = [
    column(Field::ItemNumber, "項番", 40),
    column(Field::OrderDate, "受注日", 70),
    column(Field::Client, "クライアント", 150),
    column(Field::Expense, "経費", 100),
    column(Field::Revenue, "売上", 100),
    column(Field::Profit, "利益", 100),
    column(Field::Status, "ステータス", 120),
    column(Field::Notes, "備考", 400),
];

const YEARLY: [Column; 5] = [
    column(Field::Month, "対象月", 100),
    column(Field::Expense, "経費", 120),
    column(Field::Revenue, "売上", 120),
    column(Field::Profit, "利益", 120),
    column(Field::Notes, "備考", 200),
];

/// The three sheet kinds share one grid type and differ only in schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Yearly,
    Monthly,
    EndOfMonth,
}

impl SheetKind {
    /// Column schema for the given layout version.
    pub fn columns_for(self, version: u32) -> &'static [Column] {
        match (self, version) {
            (SheetKind::Monthly, 1) => &MONTHLY_V1,
            (SheetKind::EndOfMonth, 1) => &END_OF_MONTH_V1,
            (SheetKind::Monthly, _) => &MONTHLY,
            (SheetKind::EndOfMonth, _) => &END_OF_MONTH,
            (SheetKind::Yearly, _) => &YEARLY,
        }
    }

    pub fn columns(self) -> &'static [Column] {
        self.columns_for(CURRENT_LAYOUT)
    }

    /// 1-based column holding `field` in the current layout.
    pub fn col(self, field: Field) -> Option<u32> {
        self.columns()
            .iter()
            .position(|c| c.field == field)
            .map(|idx| idx as u32 + 1)
    }

    /// Like [`SheetKind::col`] for fields every layout of this kind carries.
    pub fn col_of(self, field: Field) -> u32 {
        self.col(field).unwrap_or(0)
    }

    pub fn width(self) -> u32 {
        self.columns().len() as u32
    }

    pub fn total_row(self) -> u32 {
        match self {
            SheetKind::Yearly => YEARLY_TOTAL_ROW,
            _ => TOTAL_ROW,
        }
    }

    /// Total-row cell for a numeric field.
    pub fn total_cell(self, field: Field) -> CellRef {
        CellRef::new(self.total_row(), self.col_of(field))
    }

    /// Summary labels sit one blank column to the right of the table.
    pub fn summary_label_col(self) -> u32 {
        self.width() + 2
    }

    pub fn summary_value_col(self) -> u32 {
        self.width() + 3
    }

    /// Header colour as `0xRRGGBB`.
    pub fn header_color(self) -> u32 {
        match self {
            SheetKind::Yearly => 0x4285F4,
            SheetKind::Monthly => 0x34A853,
            SheetKind::EndOfMonth => 0xFF9800,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SheetKind::Yearly => "yearly",
            SheetKind::Monthly => "monthly",
            SheetKind::EndOfMonth => "end-of-month",
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
