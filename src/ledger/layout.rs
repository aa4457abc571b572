use super::aggregate::{
    update_yearly_references, wire_end_of_month, wire_monthly, wire_yearly, yearly_row_month,
};
use super::{yearly_name, Document, MonthKey, END_OF_MONTH_SUFFIX};
use crate::config::ClientRegistry;
use crate::error::{LedgerError, Result};
use crate::sheet::{
    data_range, CellRef, CellStyle, Condition, ConditionalFormat, Field, Rule, Sheet, SheetKind,
    Status, Validation, CURRENT_LAYOUT, FIRST_DATA_ROW, HEADER_ROW, LAST_DATA_ROW, TOTAL_ROW,
};

/// Highlight colours handed to clients in registry order.
pub const CLIENT_PALETTE: [u32; 20] = [
    0xE3F2FD, 0xF3E5F5, 0xE8F5E9, 0xFFF3E0, 0xFCE4EC, 0xE1F5FE, 0xF1F8E9, 0xFFF8E1, 0xEFEBE9,
    0xE0F2F1, 0xE8EAF6, 0xF9FBE7, 0xFFFDE7, 0xFBE9E7, 0xE8F0FE, 0xF5F5F5, 0xFFF9C4, 0xFFE0B2,
    0xC8E6C9, 0xBBDEFB,
];

const DUE_TODAY: CellStyle = CellStyle {
    background: 0xFF0000,
    font: Some(0xFFFFFF),
};
const DUE_TOMORROW: CellStyle = CellStyle::fill(0xFFFF00);

/// The month a monthly or end-of-month sheet belongs to, from its name.
pub fn sheet_month(sheet: &Sheet) -> Option<MonthKey> {
    match sheet.kind {
        SheetKind::Monthly => MonthKey::parse(&sheet.name),
        SheetKind::EndOfMonth => sheet
            .name
            .strip_suffix(END_OF_MONTH_SUFFIX)
            .and_then(MonthKey::parse),
        SheetKind::Yearly => None,
    }
}

fn validations(kind: SheetKind) -> Vec<Validation> {
    let mut rules = Vec::new();
    for field in [Field::OrderDate, Field::DeliveryDate] {
        if let Some(col) = kind.col(field) {
            rules.push(Validation {
                range: data_range(col),
                rule: Rule::Date,
            });
        }
    }
    if let Some(col) = kind.col(Field::Status) {
        rules.push(Validation {
            range: data_range(col),
            rule: Rule::OneOf(Status::labels()),
        });
    }
    if let Some(col) = kind.col(Field::Client) {
        rules.push(Validation {
            range: data_range(col),
            rule: Rule::Registry,
        });
    }
    rules
}

fn formats(kind: SheetKind, registry: &ClientRegistry) -> Vec<ConditionalFormat> {
    let mut formats = Vec::new();
    if let Some(col) = kind.col(Field::Status) {
        formats.extend(Status::ALL.iter().map(|status| ConditionalFormat {
            range: data_range(col),
            condition: Condition::TextEquals(status.label().to_string()),
            style: CellStyle::fill(status.color()),
        }));
    }
    if let Some(col) = kind.col(Field::Client) {
        formats.extend(registry.names().into_iter().enumerate().map(|(idx, name)| {
            ConditionalFormat {
                range: data_range(col),
                condition: Condition::TextEquals(name),
                style: CellStyle::fill(CLIENT_PALETTE[idx % CLIENT_PALETTE.len()]),
            }
        }));
    }
    if let Some(col) = kind.col(Field::DeliveryDate) {
        for (days, style) in [(0, DUE_TODAY), (1, DUE_TOMORROW)] {
            formats.push(ConditionalFormat {
                range: data_range(col),
                condition: Condition::DateOffset(days),
                style,
            });
        }
    }
    formats
}

/// Headers, item numbers and rules. Record values are left alone.
pub(super) fn dress(sheet: &mut Sheet, registry: &ClientRegistry) {
    let kind = sheet.kind;
    for (idx, column) in kind.columns().iter().enumerate() {
        sheet.set_value(CellRef::new(HEADER_ROW, idx as u32 + 1), column.header);
    }
    if kind != SheetKind::Yearly {
        for row in FIRST_DATA_ROW..=LAST_DATA_ROW {
            sheet.set_value(CellRef::new(row, 1), f64::from(row - 1));
        }
        sheet.set_value(CellRef::new(TOTAL_ROW, 1), "合計");
    }
    sheet.validations = validations(kind);
    sheet.formats = formats(kind, registry);
}

pub fn monthly_sheet(month: MonthKey, registry: &ClientRegistry) -> Sheet {
    let mut sheet = Sheet::new(month.sheet_name(), SheetKind::Monthly);
    dress(&mut sheet, registry);
    wire_monthly(&mut sheet, month);
    sheet
}

pub fn end_of_month_sheet(month: MonthKey, registry: &ClientRegistry) -> Sheet {
    let mut sheet = Sheet::new(month.end_of_month_name(), SheetKind::EndOfMonth);
    dress(&mut sheet, registry);
    wire_end_of_month(&mut sheet);
    sheet
}

pub fn yearly_sheet(name: &str, start: MonthKey) -> Sheet {
    let mut sheet = Sheet::new(name, SheetKind::Yearly);
    dress(&mut sheet, &ClientRegistry::default());
    wire_yearly(&mut sheet, start);
    sheet
}

/// Build (or reset) the monthly sheet of `month`.
pub fn build_monthly(doc: &mut Document, month: MonthKey, registry: &ClientRegistry) {
    let paired = month.end_of_month_name();
    if !doc.contains(&paired) {
        doc.audit.warning(
            "build_monthly",
            format!("Paired sheet '{paired}' not found; its totals read as 0 in {month}"),
        );
    }
    doc.upsert(monthly_sheet(month, registry), None);
}

/// Build (or reset) the end-of-month sheet of `month`.
pub fn build_end_of_month(doc: &mut Document, month: MonthKey, registry: &ClientRegistry) {
    let monthly = month.sheet_name();
    if !doc.contains(&monthly) {
        doc.audit.warning(
            "build_end_of_month",
            format!("Monthly sheet '{monthly}' not found; end-of-month totals are not rolled up"),
        );
    }
    doc.upsert(end_of_month_sheet(month, registry), Some(&monthly));
}

/// Build (or reset) a yearly sheet whose first row is `start`.
pub fn build_yearly(doc: &mut Document, name: &str, start: MonthKey) {
    let sheet = yearly_sheet(name, start);
    if doc.contains(name) {
        doc.upsert(sheet, None);
    } else {
        doc.sheets.insert(0, sheet);
    }
}

/// Create the monthly and end-of-month pair for `month` and point yearly
/// rows at it.
pub fn create_month(doc: &mut Document, month: MonthKey, registry: &ClientRegistry) -> Result<()> {
    let name = month.sheet_name();
    if let Some(taken) = [name.clone(), month.end_of_month_name()]
        .into_iter()
        .find(|n| doc.contains(n))
    {
        let err = LedgerError::SheetExists(taken);
        doc.audit.error("create_month", err.to_string());
        return Err(err);
    }
    doc.upsert(monthly_sheet(month, registry), None);
    doc.upsert(end_of_month_sheet(month, registry), Some(&name));
    let updated = update_yearly_references(doc, month);
    doc.audit.info(
        "create_month",
        format!(
            "Created '{name}' and '{}' ({updated} yearly row(s) linked)",
            month.end_of_month_name()
        ),
    );
    Ok(())
}

pub fn create_year(doc: &mut Document, year: i32, start: MonthKey) -> Result<String> {
    let name = yearly_name(year);
    if doc.contains(&name) {
        let err = LedgerError::SheetExists(name);
        doc.audit.error("create_year", err.to_string());
        return Err(err);
    }
    build_yearly(doc, &name, start);
    doc.audit.info(
        "create_year",
        format!("Created '{name}' starting at {start}"),
    );
    Ok(name)
}

/// Initial setup: the yearly sheet plus the first month's pair. Existing
/// sheets with those names are replaced.
pub fn setup(
    doc: &mut Document,
    year: i32,
    start: MonthKey,
    registry: &ClientRegistry,
) -> Vec<String> {
    let yearly = yearly_name(year);
    build_yearly(doc, &yearly, start);
    doc.upsert(monthly_sheet(start, registry), Some(&yearly));
    doc.upsert(end_of_month_sheet(start, registry), Some(&start.sheet_name()));

    let names = vec![yearly, start.sheet_name(), start.end_of_month_name()];
    doc.audit.info("setup", format!("Initial setup built {}", names.join(", ")));
    names
}

/// Clear and rebuild one existing sheet. Its records are lost.
pub fn recreate(
    doc: &mut Document,
    name: &str,
    registry: &ClientRegistry,
    default_start: MonthKey,
) -> Result<()> {
    if let Err(e) = rebuild(doc, name, registry, default_start) {
        doc.audit.error("recreate", e.to_string());
        return Err(e);
    }
    doc.audit
        .warning("recreate", format!("Recreated '{name}'; existing rows were cleared"));
    Ok(())
}

fn rebuild(
    doc: &mut Document,
    name: &str,
    registry: &ClientRegistry,
    default_start: MonthKey,
) -> Result<()> {
    let sheet = doc.require(name)?;
    match sheet.kind {
        SheetKind::Yearly => {
            let start = yearly_row_month(sheet, FIRST_DATA_ROW).unwrap_or(default_start);
            build_yearly(doc, name, start);
        }
        kind => {
            let month = sheet_month(sheet).ok_or_else(|| {
                LedgerError::validation("sheet", format!("cannot tell the month of '{name}'"))
            })?;
            if kind == SheetKind::Monthly {
                build_monthly(doc, month, registry);
            } else {
                build_end_of_month(doc, month, registry);
            }
        }
    }
    Ok(())
}

/// Re-apply headers, rules and formulas to every current-layout sheet,
/// keeping record values. Returns the number of sheets refreshed.
pub fn refresh(doc: &mut Document, registry: &ClientRegistry) -> usize {
    let Document { sheets, audit } = doc;
    let mut refreshed = 0;
    for sheet in sheets.iter_mut() {
        if sheet.layout_version != CURRENT_LAYOUT {
            audit.warning(
                "refresh",
                format!("Skipped '{}': legacy layout, run migrate first", sheet.name),
            );
            continue;
        }
        match sheet.kind {
            SheetKind::Yearly => match yearly_row_month(sheet, FIRST_DATA_ROW) {
                Some(start) => {
                    dress(sheet, registry);
                    wire_yearly(sheet, start);
                }
                None => {
                    audit.warning(
                        "refresh",
                        format!("Skipped '{}': first row has no month label", sheet.name),
                    );
                    continue;
                }
            },
            SheetKind::Monthly | SheetKind::EndOfMonth => match sheet_month(sheet) {
                Some(month) => {
                    dress(sheet, registry);
                    if sheet.kind == SheetKind::Monthly {
                        wire_monthly(sheet, month);
                    } else {
                        wire_end_of_month(sheet);
                    }
                }
                None => {
                    audit.warning(
                        "refresh",
                        format!("Skipped '{}': name does not identify a month", sheet.name),
                    );
                    continue;
                }
            },
        }
        refreshed += 1;
    }
    audit.info("refresh", format!("Refreshed {refreshed} sheet(s)"));
    refreshed
}
