mod cell;
mod formula;
mod grid;
mod schema;
mod status;

pub use cell::{column_letter, CellRef, CellValue, Range};
pub use formula::{Expr, RATE_NAME};
pub use grid::{Cell, CellStyle, Condition, ConditionalFormat, Rule, Sheet, Validation};
pub use schema::{Column, Field, SheetKind, CURRENT_LAYOUT};
pub use status::Status;

/// Number of record slots in a monthly or end-of-month sheet.
pub const DATA_ROWS: u32 = 65;
pub const HEADER_ROW: u32 = 1;
pub const FIRST_DATA_ROW: u32 = 2;
pub const LAST_DATA_ROW: u32 = FIRST_DATA_ROW + DATA_ROWS - 1;
/// Aggregate row below the data window; never holds record data.
pub const TOTAL_ROW: u32 = LAST_DATA_ROW + 1;

pub const YEARLY_MONTHS: u32 = 12;
pub const YEARLY_TOTAL_ROW: u32 = FIRST_DATA_ROW + YEARLY_MONTHS;

/// The data window of column `col`.
pub const fn data_range(col: u32) -> Range {
    Range::column(col, FIRST_DATA_ROW, LAST_DATA_ROW)
}
