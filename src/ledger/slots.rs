use crate::sheet::{CellRef, Field, Sheet, FIRST_DATA_ROW, LAST_DATA_ROW};

/// First data row whose client cell is empty or whitespace.
///
/// Only rows 2..=66 are scanned; the total row is never handed out.
/// Returns `None` when every slot is taken.
pub fn find_free_row(sheet: &Sheet) -> Option<u32> {
    let col = sheet.kind.col(Field::Client)?;
    (FIRST_DATA_ROW..=LAST_DATA_ROW).find(|&row| sheet.value(CellRef::new(row, col)).is_blank())
}

/// Number of occupied record rows.
pub fn used_rows(sheet: &Sheet) -> usize {
    match sheet.kind.col(Field::Client) {
        Some(col) => (FIRST_DATA_ROW..=LAST_DATA_ROW)
            .filter(|&row| !sheet.value(CellRef::new(row, col)).is_blank())
            .count(),
        None => 0,
    }
}
