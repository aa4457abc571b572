use chrono::NaiveDate;
use serde::Serialize;

use super::record::{CaseRequest, Record, RecordKind};
use super::slots::find_free_row;
use super::Document;
use crate::config::ClientRegistry;
use crate::error::{LedgerError, Result};
use crate::sheet::{CellRef, CellValue, Field, CURRENT_LAYOUT, DATA_ROWS};

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub sheet: String,
    pub row: u32,
    pub item_number: u32,
}

fn stamped(registered: NaiveDate, notes: &str) -> String {
    format!("登録日: {}\n{notes}", registered.format("%Y-%m-%d"))
}

/// Validate and write a raw request, recording the outcome in the audit log.
pub fn register(
    doc: &mut Document,
    request: &CaseRequest,
    registry: &ClientRegistry,
    today: NaiveDate,
) -> Result<Registration> {
    let result = request
        .validate()
        .and_then(|record| write(doc, &record, registry, today).map(|reg| (record, reg)));
    match result {
        Ok((record, registration)) => {
            doc.audit.info(
                "registerCase",
                format!(
                    "Registered {} ({}) in '{}' row {}",
                    record.client_name, record.status, registration.sheet, registration.row
                ),
            );
            Ok(registration)
        }
        Err(e) => {
            doc.audit.error("registerCase", e.to_string());
            Err(e)
        }
    }
}

/// Write a validated record into the first free row of its sheet.
///
/// Every check runs before the first cell is written, so a failed call
/// leaves the sheet untouched.
pub fn write(
    doc: &mut Document,
    record: &Record,
    registry: &ClientRegistry,
    today: NaiveDate,
) -> Result<Registration> {
    let name = record.sheet_name();
    let sheet = doc.require_mut(&name)?;
    if sheet.layout_version != CURRENT_LAYOUT {
        return Err(LedgerError::LegacyLayout(name));
    }
    if !registry.contains(&record.client_name) {
        return Err(LedgerError::validation(
            "clientName",
            format!("'{}' is not in the client registry", record.client_name),
        ));
    }
    let row = find_free_row(sheet).ok_or_else(|| LedgerError::Capacity {
        sheet: name.clone(),
        capacity: DATA_ROWS,
    })?;

    let registered = record.registration_date.unwrap_or(today);
    let order_date = record.order_date.unwrap_or(registered);
    let notes = match record.kind {
        RecordKind::Monthly => stamped(registered, &record.notes),
        RecordKind::EndOfMonth => match record.order_date {
            Some(explicit) if explicit != registered => stamped(registered, &record.notes),
            _ => record.notes.clone(),
        },
    };

    let mut values: Vec<(Field, &str, CellValue)> = vec![
        (Field::ItemNumber, "itemNumber", f64::from(row - 1).into()),
        (Field::OrderDate, "orderDate", order_date.into()),
        (Field::DeliveryDate, "deliveryDate", record.delivery_date.into()),
        (Field::Client, "clientName", record.client_name.as_str().into()),
        (Field::Expense, "expense", record.expense.into()),
        (Field::Revenue, "revenue", record.revenue.into()),
        (Field::Status, "status", record.status.label().into()),
        (Field::Notes, "notes", notes.into()),
    ];
    if record.kind == RecordKind::Monthly {
        values.push((Field::Industry, "industry", record.industry.clone().into()));
        values.push((Field::ExpenseUsd, "expenseUsd", record.expense_usd.into()));
    }

    let kind = sheet.kind;
    let mut cells = Vec::with_capacity(values.len());
    for (field, label, value) in values {
        let Some(col) = kind.col(field) else {
            continue;
        };
        let cell = CellRef::new(row, col);
        sheet
            .check(cell, &value, registry)
            .map_err(|reason| LedgerError::validation(label, reason))?;
        cells.push((cell, value));
    }
    for (cell, value) in cells {
        sheet.set_value(cell, value);
    }

    Ok(Registration {
        sheet: name,
        row,
        item_number: row - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Client;
    use crate::ledger::layout::create_month;
    use crate::ledger::{MonthKey, Severity};
    use crate::sheet::{Sheet, FIRST_DATA_ROW, LAST_DATA_ROW};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn registry() -> ClientRegistry {
        ClientRegistry {
            clients: vec![Client::named("Acme"), Client::named("Globex")],
        }
    }

    fn doc() -> Document {
        let mut doc = Document::default();
        create_month(&mut doc, MonthKey::new(11).unwrap(), &registry()).unwrap();
        doc
    }

    fn request(sheet_type: &str) -> CaseRequest {
        CaseRequest {
            sheet_type: Some(sheet_type.into()),
            month: Some("11月".into()),
            client_name: Some("Acme".into()),
            revenue: Some("100000".into()),
            status: Some("入金前".into()),
            notes: Some("初回".into()),
            ..Default::default()
        }
    }

    fn cell(sheet: &Sheet, row: u32, col: u32) -> &CellValue {
        sheet.value(CellRef::new(row, col))
    }

    #[test]
    fn test_monthly_registration() {
        let mut doc = doc();
        let reg = register(&mut doc, &request("月別シート"), &registry(), today()).unwrap();
        assert_eq!(reg.row, 2);
        assert_eq!(reg.item_number, 1);

        let sheet = doc.require("11月").unwrap();
        assert_eq!(cell(sheet, 2, 1).as_number(), Some(1.0));
        assert_eq!(cell(sheet, 2, 2), &CellValue::Date(today()));
        assert_eq!(cell(sheet, 2, 3), &CellValue::Empty);
        assert_eq!(cell(sheet, 2, 4).as_text(), Some("Acme"));
        assert_eq!(cell(sheet, 2, 8).as_number(), Some(100000.0));
        assert_eq!(cell(sheet, 2, 10).as_text(), Some("入金前"));
        assert_eq!(cell(sheet, 2, 11).as_text(), Some("登録日: 2026-10-16\n初回"));
        assert_eq!(doc.audit.latest(1)[0].severity, Severity::Info);
    }

    #[test]
    fn test_claims_lowest_free_row() {
        let mut doc = doc();
        for _ in 0..3 {
            register(&mut doc, &request("月別シート"), &registry(), today()).unwrap();
        }
        doc.require_mut("11月")
            .unwrap()
            .set_value(CellRef::new(3, 4), CellValue::Empty);

        let reg = register(&mut doc, &request("月別シート"), &registry(), today()).unwrap();
        assert_eq!(reg.row, 3);
        assert_eq!(reg.item_number, 2);
    }

    #[test]
    fn test_end_of_month_notes_prefix_only_for_distinct_order_date() {
        let mut doc = doc();
        let mut req = request("月末請求シート");
        req.industry = Some("IT".into());
        req.expense_usd = Some("10".into());
        register(&mut doc, &req, &registry(), today()).unwrap();

        req.order_date = Some("2026-10-16".into());
        register(&mut doc, &req, &registry(), today()).unwrap();

        req.order_date = Some("2026-10-01".into());
        register(&mut doc, &req, &registry(), today()).unwrap();

        let sheet = doc.require("11月（月末請求分）").unwrap();
        assert_eq!(cell(sheet, 2, 9).as_text(), Some("初回"));
        assert_eq!(cell(sheet, 3, 9).as_text(), Some("初回"));
        assert_eq!(cell(sheet, 4, 9).as_text(), Some("登録日: 2026-10-16\n初回"));
        assert_eq!(
            cell(sheet, 4, 2),
            &CellValue::Date(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
        );
        assert_eq!(cell(sheet, 2, 5), &CellValue::Empty);
    }

    #[test]
    fn test_full_sheet_is_a_capacity_error_without_mutation() {
        let mut doc = doc();
        let sheet = doc.require_mut("11月").unwrap();
        for row in FIRST_DATA_ROW..=LAST_DATA_ROW {
            sheet.set_value(CellRef::new(row, 4), "Acme");
        }
        let before = sheet.clone();

        let err = register(&mut doc, &request("月別シート"), &registry(), today()).unwrap_err();
        assert!(matches!(err, LedgerError::Capacity { capacity: 65, .. }));
        assert_eq!(doc.require("11月").unwrap(), &before);
        assert_eq!(doc.audit.latest(1)[0].severity, Severity::Error);
    }

    #[test]
    fn test_unknown_client_and_missing_sheet() {
        let mut doc = doc();
        let mut req = request("月別シート");
        req.client_name = Some("Initech".into());
        let err = register(&mut doc, &req, &registry(), today()).unwrap_err();
        assert_eq!(err.field(), Some("clientName"));

        let mut req = request("月別シート");
        req.month = Some("3".into());
        let err = register(&mut doc, &req, &registry(), today()).unwrap_err();
        assert!(matches!(err, LedgerError::SheetNotFound(name) if name == "3月"));
        assert!(doc.require("11月").unwrap().value(CellRef::new(2, 4)).is_blank());
    }

    #[test]
    fn test_explicit_registration_date() {
        let mut doc = doc();
        let mut req = request("月別シート");
        req.registration_date = Some("2026-11-02".into());
        register(&mut doc, &req, &registry(), today()).unwrap();
        let sheet = doc.require("11月").unwrap();
        assert_eq!(cell(sheet, 2, 11).as_text(), Some("登録日: 2026-11-02\n初回"));
        assert_eq!(
            cell(sheet, 2, 2),
            &CellValue::Date(NaiveDate::from_ymd_opt(2026, 11, 2).unwrap())
        );
    }
}
