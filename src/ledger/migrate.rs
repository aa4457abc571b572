use serde::Serialize;
use std::collections::BTreeSet;

use super::aggregate::rewire_month;
use super::layout::{dress, sheet_month};
use super::{Document, MonthKey};
use crate::config::ClientRegistry;
use crate::sheet::{CellRef, SheetKind, CURRENT_LAYOUT, HEADER_ROW};

/// Outcome of a migration run, by sheet name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Columns a legacy sheet is missing: `(insert before, count)` plus the
/// header that marks them as already present.
fn missing_columns(kind: SheetKind) -> Option<(u32, u32, &'static str)> {
    match kind {
        SheetKind::Monthly => Some((2, 2, "受注日")),
        SheetKind::EndOfMonth => Some((3, 1, "納期")),
        SheetKind::Yearly => None,
    }
}

fn migrate_sheet(
    doc: &mut Document,
    idx: usize,
    registry: &ClientRegistry,
) -> Result<MonthKey, String> {
    let sheet = &doc.sheets[idx];
    let name = sheet.name.clone();
    let (at, count, marker) = missing_columns(sheet.kind)
        .ok_or_else(|| format!("'{name}' has no legacy layout to migrate"))?;
    let month = sheet_month(sheet).ok_or_else(|| format!("cannot tell the month of '{name}'"))?;
    let already_inserted = sheet.header(at) == Some(marker);

    if !already_inserted {
        doc.sheets[idx].insert_columns(at, count);
        doc.shift_indirect(&name, at, count);
    }
    let sheet = &mut doc.sheets[idx];
    sheet.layout_version = CURRENT_LAYOUT;
    dress(sheet, registry);
    Ok(month)
}

/// Bring every legacy sheet to the current layout.
///
/// Missing columns are inserted with existing values, rules and references
/// moved right. Formulas of affected months are then rewired from the
/// current schemas. A failing sheet is logged and left as it was.
pub fn migrate(doc: &mut Document, registry: &ClientRegistry) -> MigrationReport {
    let mut report = MigrationReport::default();
    let mut months = BTreeSet::new();

    for idx in 0..doc.sheets.len() {
        let sheet = &doc.sheets[idx];
        let name = sheet.name.clone();
        if sheet.kind == SheetKind::Yearly {
            continue;
        }
        if sheet.layout_version >= CURRENT_LAYOUT {
            doc.audit
                .info("migrate", format!("'{name}' is already at layout {CURRENT_LAYOUT}"));
            report.skipped.push(name);
            continue;
        }
        match migrate_sheet(doc, idx, registry) {
            Ok(month) => {
                months.insert(month);
                doc.audit.info("migrate", format!("Migrated '{name}' to layout {CURRENT_LAYOUT}"));
                report.migrated.push(name);
            }
            Err(reason) => {
                doc.audit
                    .warning("migrate", format!("Could not migrate '{name}': {reason}"));
                report.failed.push(name);
            }
        }
    }

    for month in months {
        rewire_month(doc, month);
    }
    report
}

/// Whether a sheet's header row matches its recorded layout version.
pub fn header_matches(doc: &Document, name: &str) -> bool {
    doc.sheet(name).is_some_and(|sheet| {
        sheet
            .kind
            .columns_for(sheet.layout_version)
            .iter()
            .enumerate()
            .all(|(idx, column)| {
                sheet.value(CellRef::new(HEADER_ROW, idx as u32 + 1)).as_text() == Some(column.header)
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Client;
    use crate::ledger::aggregate::{wire_yearly, yearly_summary};
    use crate::ledger::layout::monthly_sheet;
    use crate::rates::FixedRate;
    use crate::sheet::{data_range, CellValue, Expr, Sheet, TOTAL_ROW};

    fn registry() -> ClientRegistry {
        ClientRegistry {
            clients: vec![Client::named("Acme")],
        }
    }

    fn legacy(name: &str, kind: SheetKind) -> Sheet {
        let mut sheet = Sheet::new(name, kind);
        sheet.layout_version = 1;
        for (idx, column) in kind.columns_for(1).iter().enumerate() {
            sheet.set_value(CellRef::new(HEADER_ROW, idx as u32 + 1), column.header);
        }
        sheet
    }

    fn profit(sheet: &mut Sheet, revenue: u32, expense: u32, profit: u32) {
        sheet.set_formula(
            CellRef::new(2, profit),
            Expr::blank_unless(
                CellRef::new(2, revenue),
                Expr::cell(2, revenue).sub(Expr::cell(2, expense)),
            ),
        );
    }

    /// v1 monthly: A 項番, B クライアント, D 経費, E 経費（ドル）, F 売上,
    /// G 利益; summary values in L.
    fn legacy_monthly() -> Sheet {
        let mut sheet = legacy("11月", SheetKind::Monthly);
        sheet.set_value(CellRef::new(2, 1), 1.0);
        sheet.set_value(CellRef::new(2, 2), "Acme");
        sheet.set_value(CellRef::new(2, 4), 1000.0);
        sheet.set_value(CellRef::new(2, 6), 5000.0);
        sheet.set_value(CellRef::new(2, 8), "入金前");
        profit(&mut sheet, 6, 4, 7);

        let total = |col| CellRef::new(TOTAL_ROW, col);
        sheet.set_formula(total(4), Expr::Sum(data_range(4)));
        sheet.set_formula(total(5), Expr::Sum(data_range(5)).mul(Expr::ExchangeRate));
        sheet.set_formula(total(6), Expr::Sum(data_range(6)));
        sheet.set_formula(total(7), Expr::Sum(data_range(7)).sub(Expr::Ref(total(5))));

        let eom = "11月（月末請求分）";
        for (row, col) in [(2, 4), (3, 5), (4, 6)] {
            sheet.set_formula(CellRef::new(row, 12), Expr::indirect(eom, total(col)));
        }
        sheet.set_formula(
            CellRef::new(7, 12),
            Expr::Ref(total(4)).add(Expr::Ref(total(5))).add(Expr::cell(2, 12)),
        );
        sheet.set_formula(CellRef::new(8, 12), Expr::Ref(total(6)).add(Expr::cell(3, 12)));
        sheet.set_formula(CellRef::new(9, 12), Expr::Ref(total(7)).add(Expr::cell(4, 12)));
        sheet
    }

    /// v1 end-of-month: C クライアント, D 経費, E 売上, F 利益.
    fn legacy_end_of_month() -> Sheet {
        let mut sheet = legacy("11月（月末請求分）", SheetKind::EndOfMonth);
        sheet.set_value(CellRef::new(2, 3), "Acme");
        sheet.set_value(CellRef::new(2, 4), 200.0);
        sheet.set_value(CellRef::new(2, 5), 800.0);
        profit(&mut sheet, 5, 4, 6);
        for col in [4, 5, 6] {
            sheet.set_formula(CellRef::new(TOTAL_ROW, col), Expr::Sum(data_range(col)));
        }
        sheet
    }

    fn legacy_doc() -> Document {
        let mut doc = Document::default();
        let mut yearly = Sheet::new("2026年度", SheetKind::Yearly);
        wire_yearly(&mut yearly, MonthKey::new(11).unwrap());
        // Point the November row at the legacy summary column.
        for (col, row) in [(2, 7), (3, 8), (4, 9)] {
            yearly.set_formula(CellRef::new(2, col), Expr::indirect("11月", CellRef::new(row, 12)));
        }
        doc.upsert(yearly, None);
        doc.upsert(legacy_monthly(), None);
        doc.upsert(legacy_end_of_month(), None);
        doc
    }

    #[test]
    fn test_migration_preserves_data_and_yearly_totals() {
        let mut doc = legacy_doc();
        let rates = FixedRate(150.0);
        let before = yearly_summary(&doc, "2026年度", &rates).unwrap();
        assert_eq!(before.rows[0].totals.revenue, 5800.0);

        let report = migrate(&mut doc, &registry());
        assert_eq!(report.migrated, vec!["11月", "11月（月末請求分）"]);
        assert!(report.failed.is_empty());

        let monthly = doc.require("11月").unwrap();
        assert_eq!(monthly.layout_version, CURRENT_LAYOUT);
        assert_eq!(monthly.value(CellRef::new(2, 4)).as_text(), Some("Acme"));
        assert_eq!(monthly.value(CellRef::new(2, 6)).as_number(), Some(1000.0));
        assert_eq!(monthly.value(CellRef::new(2, 8)).as_number(), Some(5000.0));
        assert_eq!(monthly.value(CellRef::new(2, 10)).as_text(), Some("入金前"));
        assert_eq!(monthly.value(CellRef::new(2, 2)), &CellValue::Empty);
        assert_eq!(monthly.value(CellRef::new(6, 13)).as_text(), Some("当月全体"));
        assert!(header_matches(&doc, "11月"));

        let eom = doc.require("11月（月末請求分）").unwrap();
        assert_eq!(eom.value(CellRef::new(2, 4)).as_text(), Some("Acme"));
        assert_eq!(eom.value(CellRef::new(2, 6)).as_number(), Some(800.0));
        assert!(header_matches(&doc, "11月（月末請求分）"));

        // A fresh sheet has the same formulas once the data is ignored.
        let fresh = monthly_sheet(MonthKey::new(11).unwrap(), &registry());
        assert_eq!(monthly.formula(CellRef::new(7, 14)), fresh.formula(CellRef::new(7, 14)));
        assert_eq!(monthly.validations, fresh.validations);

        let after = yearly_summary(&doc, "2026年度", &rates).unwrap();
        assert_eq!(after.rows[0].totals, before.rows[0].totals);
        assert_eq!(after.total, before.total);
    }

    #[test]
    fn test_second_run_skips_current_sheets() {
        let mut doc = legacy_doc();
        migrate(&mut doc, &registry());
        let snapshot = doc.sheets.clone();

        let report = migrate(&mut doc, &registry());
        assert!(report.migrated.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(doc.sheets, snapshot);
    }

    #[test]
    fn test_unparseable_sheet_fails_alone() {
        let mut doc = legacy_doc();
        doc.upsert(legacy("臨時", SheetKind::Monthly), None);

        let report = migrate(&mut doc, &registry());
        assert_eq!(report.failed, vec!["臨時"]);
        assert_eq!(report.migrated.len(), 2);
        assert_eq!(doc.require("臨時").unwrap().layout_version, 1);
        assert_eq!(doc.audit.latest(10).iter().filter(|e| e.message.contains("臨時")).count(), 1);
    }

    #[test]
    fn test_header_marker_prevents_double_insert() {
        let mut doc = Document::default();
        let mut sheet = monthly_sheet(MonthKey::new(11).unwrap(), &registry());
        sheet.set_value(CellRef::new(2, 4), "Acme");
        sheet.layout_version = 1;
        doc.upsert(sheet, None);

        migrate(&mut doc, &registry());
        let sheet = doc.require("11月").unwrap();
        assert_eq!(sheet.value(CellRef::new(2, 4)).as_text(), Some("Acme"));
        assert_eq!(sheet.layout_version, CURRENT_LAYOUT);
        assert!(sheet.validations.iter().all(|v| v.range.end.col <= 11));
    }
}
