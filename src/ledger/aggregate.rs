//! Cross-sheet rollups.
//!
//! Totals live in the sheets as formulas. The wiring functions write them
//! from the current column schemas; [`Evaluator`] computes their values on
//! read against the document.

use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

use super::{Document, MonthKey};
use crate::error::{LedgerError, Result};
use crate::rates::{RateQuote, RateSource};
use crate::sheet::{
    data_range, Cell, CellRef, CellValue, Expr, Field, Range, Sheet, SheetKind, CURRENT_LAYOUT,
    FIRST_DATA_ROW, LAST_DATA_ROW, YEARLY_MONTHS, YEARLY_TOTAL_ROW,
};

/// Summary-area rows of a monthly sheet.
const EOM_HEADING_ROW: u32 = 1;
const EOM_EXPENSE_ROW: u32 = 2;
const EOM_REVENUE_ROW: u32 = 3;
const EOM_PROFIT_ROW: u32 = 4;
const COMBINED_HEADING_ROW: u32 = 6;
const COMBINED_EXPENSE_ROW: u32 = 7;
const COMBINED_REVENUE_ROW: u32 = 8;
const COMBINED_PROFIT_ROW: u32 = 9;

const MAX_DEPTH: u32 = 16;

/// Monthly cell holding the month's combined total for `field`.
pub fn combined_cell(field: Field) -> CellRef {
    let row = match field {
        Field::Expense => COMBINED_EXPENSE_ROW,
        Field::Revenue => COMBINED_REVENUE_ROW,
        _ => COMBINED_PROFIT_ROW,
    };
    CellRef::new(row, SheetKind::Monthly.summary_value_col())
}

/// Monthly cell mirroring the paired end-of-month total for `field`.
pub fn end_of_month_cell(field: Field) -> CellRef {
    let row = match field {
        Field::Expense => EOM_EXPENSE_ROW,
        Field::Revenue => EOM_REVENUE_ROW,
        _ => EOM_PROFIT_ROW,
    };
    CellRef::new(row, SheetKind::Monthly.summary_value_col())
}

fn profit_formulas(sheet: &mut Sheet, revenue: u32, expense: u32, profit: u32) {
    for row in FIRST_DATA_ROW..=LAST_DATA_ROW {
        let formula = Expr::blank_unless(
            CellRef::new(row, revenue),
            Expr::cell(row, revenue).sub(Expr::cell(row, expense)),
        );
        sheet.set_formula(CellRef::new(row, profit), formula);
    }
}

fn label(sheet: &mut Sheet, row: u32, col: u32, text: &str) {
    sheet.set_value(CellRef::new(row, col), text);
}

/// Profit, total and summary formulas of a monthly sheet.
pub fn wire_monthly(sheet: &mut Sheet, month: MonthKey) {
    let kind = SheetKind::Monthly;
    let expense = kind.col_of(Field::Expense);
    let usd = kind.col_of(Field::ExpenseUsd);
    let revenue = kind.col_of(Field::Revenue);
    let profit = kind.col_of(Field::Profit);

    profit_formulas(sheet, revenue, expense, profit);

    let usd_total = kind.total_cell(Field::ExpenseUsd);
    sheet.set_formula(kind.total_cell(Field::Expense), Expr::Sum(data_range(expense)));
    sheet.set_formula(usd_total, Expr::Sum(data_range(usd)).mul(Expr::ExchangeRate));
    sheet.set_formula(kind.total_cell(Field::Revenue), Expr::Sum(data_range(revenue)));
    sheet.set_formula(
        kind.total_cell(Field::Profit),
        Expr::Sum(data_range(profit)).sub(Expr::Ref(usd_total)),
    );

    let labels = kind.summary_label_col();
    let eom = month.end_of_month_name();
    let eom_kind = SheetKind::EndOfMonth;

    label(sheet, EOM_HEADING_ROW, labels, "月末請求分");
    label(sheet, COMBINED_HEADING_ROW, labels, "当月全体");
    for (field, text) in [
        (Field::Expense, "経費合計"),
        (Field::Revenue, "売上合計"),
        (Field::Profit, "利益合計"),
    ] {
        let mirror = end_of_month_cell(field);
        let combined = combined_cell(field);
        label(sheet, mirror.row, labels, text);
        label(sheet, combined.row, labels, text);

        sheet.set_formula(mirror, Expr::indirect(&eom, eom_kind.total_cell(field)));
        let own = match field {
            Field::Expense => Expr::Ref(kind.total_cell(Field::Expense)).add(Expr::Ref(usd_total)),
            _ => Expr::Ref(kind.total_cell(field)),
        };
        sheet.set_formula(combined, own.add(Expr::Ref(mirror)));
    }
}

/// Profit, total and summary formulas of an end-of-month sheet.
pub fn wire_end_of_month(sheet: &mut Sheet) {
    let kind = SheetKind::EndOfMonth;
    let expense = kind.col_of(Field::Expense);
    let revenue = kind.col_of(Field::Revenue);
    let profit = kind.col_of(Field::Profit);

    profit_formulas(sheet, revenue, expense, profit);
    for col in [expense, revenue, profit] {
        sheet.set_formula(
            CellRef::new(kind.total_row(), col),
            Expr::Sum(data_range(col)),
        );
    }

    let labels = kind.summary_label_col();
    let values = kind.summary_value_col();
    label(sheet, 1, labels, "当月の合計");
    for (row, field, text) in [
        (2, Field::Expense, "経費"),
        (3, Field::Revenue, "売上"),
        (4, Field::Profit, "利益"),
    ] {
        label(sheet, row, labels, text);
        sheet.set_formula(CellRef::new(row, values), Expr::Ref(kind.total_cell(field)));
    }
}

/// Point a yearly row at the combined totals of `month`'s monthly sheet.
pub fn wire_yearly_row(yearly: &mut Sheet, row: u32, month: MonthKey) {
    let kind = SheetKind::Yearly;
    let name = month.sheet_name();
    yearly.set_value(CellRef::new(row, kind.col_of(Field::Month)), name.as_str());
    for field in [Field::Expense, Field::Revenue, Field::Profit] {
        yearly.set_formula(
            CellRef::new(row, kind.col_of(field)),
            Expr::indirect(&name, combined_cell(field)),
        );
    }
}

/// Month rows and total row of a yearly sheet starting at `start`.
pub fn wire_yearly(yearly: &mut Sheet, start: MonthKey) {
    let kind = SheetKind::Yearly;
    for offset in 0..YEARLY_MONTHS {
        wire_yearly_row(yearly, FIRST_DATA_ROW + offset, start.plus(offset));
    }
    yearly.set_value(CellRef::new(YEARLY_TOTAL_ROW, kind.col_of(Field::Month)), "合計");
    for field in [Field::Expense, Field::Revenue, Field::Profit] {
        let col = kind.col_of(field);
        yearly.set_formula(
            CellRef::new(YEARLY_TOTAL_ROW, col),
            Expr::Sum(Range::column(col, FIRST_DATA_ROW, YEARLY_TOTAL_ROW - 1)),
        );
    }
}

/// The month a yearly row stands for, read from its label.
pub fn yearly_row_month(yearly: &Sheet, row: u32) -> Option<MonthKey> {
    let col = SheetKind::Yearly.col_of(Field::Month);
    yearly
        .value(CellRef::new(row, col))
        .as_text()
        .and_then(MonthKey::parse)
}

/// Re-point every yearly row labelled with `month`. Returns the number of
/// rows updated.
pub fn update_yearly_references(doc: &mut Document, month: MonthKey) -> usize {
    let mut updated = 0;
    for yearly in doc.sheets.iter_mut().filter(|s| s.kind == SheetKind::Yearly) {
        for row in FIRST_DATA_ROW..YEARLY_TOTAL_ROW {
            if yearly_row_month(yearly, row) == Some(month) {
                wire_yearly_row(yearly, row, month);
                updated += 1;
            }
        }
    }
    updated
}

/// Rewrite all three rollup levels for `month` from the current schemas.
pub fn rewire_month(doc: &mut Document, month: MonthKey) -> usize {
    if let Some(sheet) = doc
        .sheet_mut(&month.sheet_name())
        .filter(|s| s.layout_version == CURRENT_LAYOUT)
    {
        wire_monthly(sheet, month);
    }
    if let Some(sheet) = doc
        .sheet_mut(&month.end_of_month_name())
        .filter(|s| s.layout_version == CURRENT_LAYOUT)
    {
        wire_end_of_month(sheet);
    }
    update_yearly_references(doc, month)
}

/// Evaluates stored formulas against a document.
///
/// The exchange rate is fetched lazily, at most once per evaluator.
pub struct Evaluator<'a> {
    doc: &'a Document,
    rates: &'a dyn RateSource,
    quote: OnceCell<RateQuote>,
}

impl<'a> Evaluator<'a> {
    pub fn new(doc: &'a Document, rates: &'a dyn RateSource) -> Self {
        Self {
            doc,
            rates,
            quote: OnceCell::new(),
        }
    }

    /// The rate quote, if any formula needed it.
    pub fn quote(&self) -> Option<&RateQuote> {
        self.quote.get()
    }

    /// Numeric value of `cell`; blanks and text count as 0.
    pub fn cell(&self, sheet: &Sheet, cell: CellRef) -> f64 {
        self.cell_at(sheet, cell, 0)
    }

    pub fn eval(&self, sheet: &Sheet, expr: &Expr) -> f64 {
        self.eval_at(sheet, expr, 0)
    }

    fn cell_at(&self, sheet: &Sheet, cell: CellRef, depth: u32) -> f64 {
        match sheet.get(cell) {
            Some(Cell::Value(CellValue::Number(n))) => *n,
            Some(Cell::Formula(expr)) => self.eval_at(sheet, expr, depth + 1),
            _ => 0.0,
        }
    }

    fn eval_at(&self, sheet: &Sheet, expr: &Expr, depth: u32) -> f64 {
        if depth > MAX_DEPTH {
            return 0.0;
        }
        match expr {
            Expr::Number(n) => *n,
            Expr::Ref(cell) => self.cell_at(sheet, *cell, depth),
            Expr::Sum(range) => range.cells().map(|c| self.cell_at(sheet, c, depth)).sum(),
            Expr::Indirect { sheet: name, cell } => match self.doc.sheet(name) {
                Some(target) => self.cell_at(target, *cell, depth),
                None => 0.0,
            },
            Expr::ExchangeRate => self.quote.get_or_init(|| self.rates.quote()).rate,
            Expr::Add(a, b) => self.eval_at(sheet, a, depth) + self.eval_at(sheet, b, depth),
            Expr::Sub(a, b) => self.eval_at(sheet, a, depth) - self.eval_at(sheet, b, depth),
            Expr::Mul(a, b) => self.eval_at(sheet, a, depth) * self.eval_at(sheet, b, depth),
            Expr::BlankUnless { test, then } => {
                if sheet.value(*test).is_blank() && sheet.formula(*test).is_none() {
                    0.0
                } else {
                    self.eval_at(sheet, then, depth)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub expense: f64,
    pub revenue: f64,
    pub profit: f64,
}

impl Totals {
    fn read(eval: &Evaluator<'_>, sheet: &Sheet, at: impl Fn(Field) -> CellRef) -> Self {
        Self {
            expense: eval.cell(sheet, at(Field::Expense)),
            revenue: eval.cell(sheet, at(Field::Revenue)),
            profit: eval.cell(sheet, at(Field::Profit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    /// The monthly sheet's own totals; expense includes converted USD.
    pub own: Totals,
    /// USD expenses converted to JPY.
    pub converted_usd: f64,
    pub end_of_month: Totals,
    pub end_of_month_present: bool,
    pub combined: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_fallback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyRow {
    pub month: String,
    pub present: bool,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySummary {
    pub sheet: String,
    pub rows: Vec<YearlyRow>,
    pub total: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_fallback: Option<String>,
}

fn require_current<'d>(doc: &'d Document, name: &str) -> Result<&'d Sheet> {
    let sheet = doc.require(name)?;
    if sheet.layout_version != CURRENT_LAYOUT {
        return Err(LedgerError::LegacyLayout(name.to_string()));
    }
    Ok(sheet)
}

/// Evaluate the own, end-of-month and combined totals of a month.
pub fn month_summary(
    doc: &Document,
    month: MonthKey,
    rates: &dyn RateSource,
) -> Result<MonthSummary> {
    let name = month.sheet_name();
    let sheet = require_current(doc, &name)?;
    let eval = Evaluator::new(doc, rates);
    let kind = SheetKind::Monthly;

    let converted_usd = eval.cell(sheet, kind.total_cell(Field::ExpenseUsd));
    let mut own = Totals::read(&eval, sheet, |f| kind.total_cell(f));
    own.expense += converted_usd;

    Ok(MonthSummary {
        month: name,
        own,
        converted_usd,
        end_of_month: Totals::read(&eval, sheet, end_of_month_cell),
        end_of_month_present: doc.contains(&month.end_of_month_name()),
        combined: Totals::read(&eval, sheet, combined_cell),
        rate: eval.quote().map(|q| q.rate),
        rate_fallback: eval.quote().and_then(|q| q.fallback.clone()),
    })
}

/// Evaluate every month row and the total row of a yearly sheet.
pub fn yearly_summary(doc: &Document, name: &str, rates: &dyn RateSource) -> Result<YearlySummary> {
    let sheet = doc.require(name)?;
    if sheet.kind != SheetKind::Yearly {
        return Err(LedgerError::validation(
            "sheet",
            format!("'{name}' is a {} sheet, not a yearly sheet", sheet.kind),
        ));
    }
    let eval = Evaluator::new(doc, rates);
    let kind = SheetKind::Yearly;

    let rows = (FIRST_DATA_ROW..YEARLY_TOTAL_ROW)
        .map(|row| {
            let month = sheet
                .value(CellRef::new(row, kind.col_of(Field::Month)))
                .to_string();
            YearlyRow {
                present: doc.contains(&month),
                totals: Totals::read(&eval, sheet, |f| CellRef::new(row, kind.col_of(f))),
                month,
            }
        })
        .collect();
    let total = Totals::read(&eval, sheet, |f| kind.total_cell(f));

    Ok(YearlySummary {
        sheet: name.to_string(),
        rows,
        total,
        rate: eval.quote().map(|q| q.rate),
        rate_fallback: eval.quote().and_then(|q| q.fallback.clone()),
    })
}

/// Revenue per client on one record sheet, in first-seen order.
pub fn client_revenue(doc: &Document, name: &str) -> Result<Vec<(String, f64)>> {
    let sheet = require_current(doc, name)?;
    let client = sheet.kind.col(Field::Client);
    let revenue = sheet.kind.col(Field::Revenue);
    let (Some(client), Some(revenue)) = (client, revenue) else {
        return Ok(Vec::new());
    };

    let mut totals: Vec<(String, f64)> = Vec::new();
    for row in FIRST_DATA_ROW..=LAST_DATA_ROW {
        let name = sheet.value(CellRef::new(row, client));
        if name.is_blank() {
            continue;
        }
        let name = name.to_string();
        let amount = sheet
            .value(CellRef::new(row, revenue))
            .as_number()
            .unwrap_or(0.0);
        match totals.iter_mut().find(|(n, _)| *n == name) {
            Some((_, sum)) => *sum += amount,
            None => totals.push((name, amount)),
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::FixedRate;

    fn month(n: u32) -> MonthKey {
        MonthKey::new(n).unwrap()
    }

    fn monthly(month: MonthKey) -> Sheet {
        let mut sheet = Sheet::new(month.sheet_name(), SheetKind::Monthly);
        wire_monthly(&mut sheet, month);
        sheet
    }

    fn end_of_month(month: MonthKey) -> Sheet {
        let mut sheet = Sheet::new(month.end_of_month_name(), SheetKind::EndOfMonth);
        wire_end_of_month(&mut sheet);
        sheet
    }

    #[test]
    fn test_monthly_formula_text() {
        let sheet = monthly(month(11));
        let text = |cell: &str| sheet.formula(cell.parse().unwrap()).map(|e| e.formula());

        assert_eq!(text("I2").as_deref(), Some("=IF(H2=\"\",\"\",H2-F2)"));
        assert_eq!(text("F67").as_deref(), Some("=SUM(F2:F66)"));
        assert_eq!(text("G67").as_deref(), Some("=SUM(G2:G66)*USDJPY"));
        assert_eq!(text("I67").as_deref(), Some("=SUM(I2:I66)-G67"));
        assert_eq!(
            text("N2").as_deref(),
            Some("=IFERROR(INDIRECT(\"'11月（月末請求分）'!E67\"),0)")
        );
        assert_eq!(text("N7").as_deref(), Some("=F67+G67+N2"));
        assert_eq!(text("N8").as_deref(), Some("=H67+N3"));
        assert_eq!(text("N9").as_deref(), Some("=I67+N4"));
        assert_eq!(sheet.value("M6".parse().unwrap()).as_text(), Some("当月全体"));
    }

    #[test]
    fn test_combined_total_without_paired_sheet_is_own_total() {
        let mut doc = Document::default();
        let mut sheet = monthly(month(11));
        sheet.set_value(CellRef::new(2, 6), 3000.0);
        sheet.set_value(CellRef::new(2, 8), 10000.0);
        doc.upsert(sheet, None);

        let summary = month_summary(&doc, month(11), &FixedRate(150.0)).unwrap();
        assert!(!summary.end_of_month_present);
        assert_eq!(summary.end_of_month, Totals::default());
        assert_eq!(summary.combined, summary.own);
        assert_eq!(summary.combined.profit, 7000.0);
    }

    #[test]
    fn test_combined_total_adds_paired_sheet_and_converted_usd() {
        let mut doc = Document::default();
        let mut sheet = monthly(month(11));
        sheet.set_value(CellRef::new(2, 6), 1000.0);
        sheet.set_value(CellRef::new(2, 7), 10.0);
        sheet.set_value(CellRef::new(2, 8), 20000.0);
        doc.upsert(sheet, None);

        let mut eom = end_of_month(month(11));
        eom.set_value(CellRef::new(2, 5), 500.0);
        eom.set_value(CellRef::new(2, 6), 4000.0);
        doc.upsert(eom, None);

        let summary = month_summary(&doc, month(11), &FixedRate(150.0)).unwrap();
        assert_eq!(summary.converted_usd, 1500.0);
        assert_eq!(summary.own.expense, 2500.0);
        assert_eq!(summary.own.profit, 20000.0 - 1000.0 - 1500.0);
        assert_eq!(summary.end_of_month.profit, 3500.0);
        assert_eq!(summary.combined.expense, 3000.0);
        assert_eq!(summary.combined.revenue, 24000.0);
        assert_eq!(summary.combined.profit, 17500.0 + 3500.0);
        assert_eq!(summary.rate, Some(150.0));
    }

    #[test]
    fn test_yearly_rows_default_to_zero() {
        let mut doc = Document::default();
        let mut yearly = Sheet::new("2026年度", SheetKind::Yearly);
        wire_yearly(&mut yearly, month(11));
        doc.upsert(yearly, None);

        let mut sheet = monthly(month(12));
        sheet.set_value(CellRef::new(5, 8), 8000.0);
        doc.upsert(sheet, None);

        let summary = yearly_summary(&doc, "2026年度", &FixedRate(150.0)).unwrap();
        assert_eq!(summary.rows.len(), 12);
        assert_eq!(summary.rows[0].month, "11月");
        assert!(!summary.rows[0].present);
        assert_eq!(summary.rows[0].totals, Totals::default());
        assert_eq!(summary.rows[1].totals.revenue, 8000.0);
        assert_eq!(summary.rows[2].month, "1月");
        assert_eq!(summary.total.revenue, 8000.0);
    }

    #[test]
    fn test_rate_is_only_fetched_when_needed() {
        let mut doc = Document::default();
        let mut eom = end_of_month(month(11));
        eom.set_value(CellRef::new(2, 6), 100.0);
        doc.upsert(eom, None);

        let rates = FixedRate(150.0);
        let eval = Evaluator::new(&doc, &rates);
        let sheet = doc.require("11月（月末請求分）").unwrap();
        assert_eq!(eval.cell(sheet, CellRef::new(67, 7)), 100.0);
        assert!(eval.quote().is_none());
    }

    #[test]
    fn test_client_revenue_in_first_seen_order() {
        let mut doc = Document::default();
        let mut eom = end_of_month(month(11));
        for (row, client, revenue) in [(2, "Globex", 100.0), (3, "Acme", 50.0), (4, "Globex", 25.0)] {
            eom.set_value(CellRef::new(row, 4), client);
            eom.set_value(CellRef::new(row, 6), revenue);
        }
        doc.upsert(eom, None);

        let totals = client_revenue(&doc, "11月（月末請求分）").unwrap();
        assert_eq!(
            totals,
            vec![("Globex".to_string(), 125.0), ("Acme".to_string(), 50.0)]
        );
    }

    #[test]
    fn test_update_yearly_references_targets_labelled_row() {
        let mut doc = Document::default();
        let mut yearly = Sheet::new("2026年度", SheetKind::Yearly);
        wire_yearly(&mut yearly, month(11));
        yearly.set_formula(CellRef::new(3, 2), Expr::Number(0.0));
        doc.upsert(yearly, None);

        assert_eq!(update_yearly_references(&mut doc, month(12)), 1);
        let yearly = doc.require("2026年度").unwrap();
        assert_eq!(
            yearly.formula(CellRef::new(3, 2)).map(|e| e.formula()),
            Some("=IFERROR(INDIRECT(\"'12月'!N7\"),0)".to_string())
        );
    }
}
