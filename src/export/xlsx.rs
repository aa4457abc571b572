use rust_xlsxwriter::{
    ConditionalFormatFormula, DataValidation, DataValidationRule, ExcelDateTime, Format,
    Formula, Workbook, Worksheet, XlsxError,
};
use std::path::Path;

use crate::config::ClientRegistry;
use crate::error::Result;
use crate::ledger::Document;
use crate::sheet::{Cell, CellRef, CellStyle, CellValue, Rule, Sheet, HEADER_ROW, RATE_NAME};

/// Sheet listing the client registry; registry validations point at it.
pub const CLIENT_SHEET: &str = "クライアント";

const DATE_FORMAT: &str = "yyyy/mm/dd";
const NUMBER_FORMAT: &str = "#,##0";

/// Zero-based (row, col) as the writer expects.
fn position(cell: CellRef) -> std::result::Result<(u32, u16), XlsxError> {
    let col = u16::try_from(cell.col.saturating_sub(1))
        .map_err(|_| XlsxError::RowColumnLimitError)?;
    Ok((cell.row.saturating_sub(1), col))
}

fn excel_date(date: chrono::NaiveDate) -> std::result::Result<ExcelDateTime, XlsxError> {
    use chrono::Datelike;
    let year = u16::try_from(date.year())
        .map_err(|_| XlsxError::ParameterError(format!("date {date} is out of range")))?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
}

/// Absolute reference to the registry names on the client sheet.
fn registry_source(registry: &ClientRegistry) -> String {
    let last = registry.names().len().max(1) + 1;
    format!("='{CLIENT_SHEET}'!$A$2:$A${last}")
}

fn style_format(style: CellStyle) -> Format {
    let format = Format::new().set_background_color(style.background);
    match style.font {
        Some(font) => format.set_font_color(font),
        None => format,
    }
}

fn validation(
    rule: &Rule,
    registry: &ClientRegistry,
) -> std::result::Result<DataValidation, XlsxError> {
    Ok(match rule {
        Rule::Date => DataValidation::new().allow_date(DataValidationRule::Between(
            ExcelDateTime::from_ymd(1900, 1, 1)?,
            ExcelDateTime::from_ymd(9999, 12, 31)?,
        )),
        Rule::OneOf(options) => DataValidation::new().allow_list_strings(options.as_slice())?,
        Rule::Registry => {
            DataValidation::new().allow_list_formula(Formula::new(registry_source(registry)))
        }
    })
}

fn write_sheet(
    worksheet: &mut Worksheet,
    sheet: &Sheet,
    registry: &ClientRegistry,
) -> std::result::Result<(), XlsxError> {
    worksheet.set_name(&sheet.name)?;

    let columns = sheet.kind.columns_for(sheet.layout_version);
    for (idx, column) in columns.iter().enumerate() {
        worksheet.set_column_width_pixels(idx as u16, column.width)?;
    }

    let header = Format::new()
        .set_bold()
        .set_background_color(sheet.kind.header_color());
    let date = Format::new().set_num_format(DATE_FORMAT);
    let number = Format::new().set_num_format(NUMBER_FORMAT);
    let wrapped = Format::new().set_text_wrap();
    let width = columns.len() as u32;

    for (cell, content) in sheet.cells() {
        let (row, col) = position(*cell)?;
        let in_header = cell.row == HEADER_ROW && cell.col <= width;
        match content {
            Cell::Value(CellValue::Empty) => {}
            Cell::Value(CellValue::Text(text)) if in_header => {
                worksheet.write_string_with_format(row, col, text, &header)?;
            }
            Cell::Value(CellValue::Text(text)) if text.contains('\n') => {
                worksheet.write_string_with_format(row, col, text, &wrapped)?;
            }
            Cell::Value(CellValue::Text(text)) => {
                worksheet.write_string(row, col, text)?;
            }
            Cell::Value(CellValue::Number(value)) => {
                worksheet.write_number_with_format(row, col, *value, &number)?;
            }
            Cell::Value(CellValue::Date(value)) => {
                worksheet.write_datetime_with_format(row, col, &excel_date(*value)?, &date)?;
            }
            Cell::Formula(expr) => {
                let formula = Formula::new(expr.formula());
                worksheet.write_formula_with_format(row, col, formula, &number)?;
            }
        }
    }

    for rule in &sheet.validations {
        let (first_row, first_col) = position(rule.range.start)?;
        let (last_row, last_col) = position(rule.range.end)?;
        worksheet.add_data_validation(
            first_row,
            first_col,
            last_row,
            last_col,
            &validation(&rule.rule, registry)?,
        )?;
    }

    for format in &sheet.formats {
        let (first_row, first_col) = position(format.range.start)?;
        let (last_row, last_col) = position(format.range.end)?;
        let conditional = ConditionalFormatFormula::new()
            .set_rule(format.condition.formula(format.range.start).as_str())
            .set_format(style_format(format.style));
        worksheet.add_conditional_format(
            first_row,
            first_col,
            last_row,
            last_col,
            &conditional,
        )?;
    }

    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_clients(
    worksheet: &mut Worksheet,
    registry: &ClientRegistry,
) -> std::result::Result<(), XlsxError> {
    worksheet.set_name(CLIENT_SHEET)?;
    worksheet.set_column_width_pixels(0, 200)?;
    worksheet.set_column_width_pixels(1, 120)?;
    worksheet.set_column_width_pixels(2, 300)?;

    let header = Format::new().set_bold();
    for (col, title) in ["名前", "種別", "メモ"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    let clients = registry.clients.iter().filter(|c| !c.name.trim().is_empty());
    for (idx, client) in clients.enumerate() {
        let row = idx as u32 + 1;
        worksheet.write_string(row, 0, client.name.trim())?;
        if let Some(kind) = &client.kind {
            worksheet.write_string(row, 1, kind)?;
        }
        if let Some(note) = &client.note {
            worksheet.write_string(row, 2, note)?;
        }
    }
    Ok(())
}

/// Write every sheet of `doc` to an `.xlsx` workbook at `path`.
///
/// The exchange rate is stored as the workbook name `USDJPY` so the
/// exported totals evaluate without network access.
pub fn export(doc: &Document, registry: &ClientRegistry, path: &Path, rate: f64) -> Result<()> {
    let mut workbook = Workbook::new();
    for sheet in &doc.sheets {
        write_sheet(workbook.add_worksheet(), sheet, registry)?;
    }
    write_clients(workbook.add_worksheet(), registry)?;
    workbook.define_name(RATE_NAME, &format!("={rate}"))?;
    workbook.save(path)?;

    tracing::info!(path = %path.display(), sheets = doc.sheets.len(), "exported workbook");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Client;
    use crate::ledger::layout::{create_month, setup};
    use crate::ledger::{register, CaseRequest, MonthKey};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn registry() -> ClientRegistry {
        ClientRegistry {
            clients: vec![Client::named("Acme"), Client::named("Globex")],
        }
    }

    #[test]
    fn test_registry_source_covers_all_names() {
        assert_eq!(registry_source(&registry()), "='クライアント'!$A$2:$A$3");
        assert_eq!(
            registry_source(&ClientRegistry::default()),
            "='クライアント'!$A$2:$A$2"
        );
    }

    #[test]
    fn test_position_is_zero_based() {
        assert_eq!(position(CellRef::new(1, 1)).unwrap(), (0, 0));
        assert_eq!(position(CellRef::new(67, 14)).unwrap(), (66, 13));
    }

    #[test]
    fn test_exports_full_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.xlsx");
        let mut doc = Document::default();
        let start = MonthKey::new(11).unwrap();
        setup(&mut doc, 2026, start, &registry());
        create_month(&mut doc, MonthKey::new(12).unwrap(), &registry()).unwrap();
        let request = CaseRequest {
            sheet_type: Some("月別シート".into()),
            month: Some("11".into()),
            client_name: Some("Acme".into()),
            revenue: Some("1000".into()),
            status: Some("入金前".into()),
            notes: Some("初回".into()),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        register(&mut doc, &request, &registry(), today).unwrap();

        export(&doc, &registry(), &path, 150.0).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_exports_empty_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");
        export(&Document::default(), &ClientRegistry::default(), &path, 150.0).unwrap();
        assert!(path.exists());
    }
}
