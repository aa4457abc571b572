use serde::{Deserialize, Serialize};
use std::fmt;

use super::cell::{CellRef, Range};

/// Name under which the USD→JPY rate appears in rendered formulas.
pub const RATE_NAME: &str = "USDJPY";

/// The closed set of formula shapes the ledger writes into its sheets.
///
/// Expressions render to A1 formula text (without the leading `=`) and are
/// evaluated by [`crate::ledger::aggregate::Evaluator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Number(f64),
    Ref(CellRef),
    Sum(Range),
    /// `IFERROR(INDIRECT("'sheet'!cell"),0)`
    Indirect { sheet: String, cell: CellRef },
    ExchangeRate,
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// `IF(test="","",then)`
    BlankUnless { test: CellRef, then: Box<Expr> },
}

impl Expr {
    pub fn cell(row: u32, col: u32) -> Self {
        Expr::Ref(CellRef::new(row, col))
    }

    pub fn indirect(sheet: impl Into<String>, cell: CellRef) -> Self {
        Expr::Indirect {
            sheet: sheet.into(),
            cell,
        }
    }

    pub fn add(self, rhs: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn blank_unless(test: CellRef, then: Expr) -> Self {
        Expr::BlankUnless {
            test,
            then: Box::new(then),
        }
    }

    /// Formula text as it appears in a cell, e.g. `=SUM(F2:F66)`.
    pub fn formula(&self) -> String {
        format!("={self}")
    }

    /// Whether evaluating this expression needs the exchange rate.
    pub fn uses_rate(&self) -> bool {
        match self {
            Expr::ExchangeRate => true,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => a.uses_rate() || b.uses_rate(),
            Expr::BlankUnless { then, .. } => then.uses_rate(),
            _ => false,
        }
    }

    /// Shift same-sheet references after columns were inserted at `at`.
    pub fn shift_local(&mut self, at: u32, count: u32) {
        match self {
            Expr::Ref(cell) => cell.shift_columns(at, count),
            Expr::Sum(range) => range.shift_columns(at, count),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.shift_local(at, count);
                b.shift_local(at, count);
            }
            Expr::BlankUnless { test, then } => {
                test.shift_columns(at, count);
                then.shift_local(at, count);
            }
            Expr::Number(_) | Expr::Indirect { .. } | Expr::ExchangeRate => {}
        }
    }

    /// Re-point indirect references into `sheet` after columns were inserted there.
    pub fn shift_indirect(&mut self, sheet: &str, at: u32, count: u32) {
        match self {
            Expr::Indirect { sheet: target, cell } if target == sheet => {
                cell.shift_columns(at, count)
            }
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.shift_indirect(sheet, at, count);
                b.shift_indirect(sheet, at, count);
            }
            Expr::BlankUnless { then, .. } => then.shift_indirect(sheet, at, count),
            _ => {}
        }
    }

    fn is_additive(&self) -> bool {
        matches!(self, Expr::Add(..) | Expr::Sub(..))
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => fmt_number(f, *n),
            Expr::Ref(cell) => write!(f, "{cell}"),
            Expr::Sum(range) => write!(f, "SUM({range})"),
            Expr::Indirect { sheet, cell } => {
                write!(f, "IFERROR(INDIRECT(\"'{sheet}'!{cell}\"),0)")
            }
            Expr::ExchangeRate => f.write_str(RATE_NAME),
            Expr::Add(a, b) => write!(f, "{a}+{b}"),
            Expr::Sub(a, b) => {
                if b.is_additive() {
                    write!(f, "{a}-({b})")
                } else {
                    write!(f, "{a}-{b}")
                }
            }
            Expr::Mul(a, b) => {
                for (idx, side) in [a, b].into_iter().enumerate() {
                    if idx > 0 {
                        f.write_str("*")?;
                    }
                    if side.is_additive() {
                        write!(f, "({side})")?;
                    } else {
                        write!(f, "{side}")?;
                    }
                }
                Ok(())
            }
            Expr::BlankUnless { test, then } => write!(f, "IF({test}=\"\",\"\",{then})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_profit_and_totals() {
        let profit = Expr::blank_unless(CellRef::new(2, 8), Expr::cell(2, 8).sub(Expr::cell(2, 6)));
        assert_eq!(profit.formula(), "=IF(H2=\"\",\"\",H2-F2)");

        let converted = Expr::Sum(Range::column(7, 2, 66)).mul(Expr::ExchangeRate);
        assert_eq!(converted.formula(), "=SUM(G2:G66)*USDJPY");
        assert!(converted.uses_rate());

        let nested = Expr::cell(1, 1).sub(Expr::cell(1, 2).add(Expr::cell(1, 3)));
        assert_eq!(nested.formula(), "=A1-(B1+C1)");
    }

    #[test]
    fn test_render_indirect() {
        let expr = Expr::indirect("11月（月末請求分）", CellRef::new(67, 5));
        assert_eq!(
            expr.formula(),
            "=IFERROR(INDIRECT(\"'11月（月末請求分）'!E67\"),0)"
        );
        assert!(!expr.uses_rate());
    }

    #[test]
    fn test_shift_local_leaves_indirect_alone() {
        let mut expr = Expr::cell(67, 4).add(Expr::indirect("x", CellRef::new(67, 4)));
        expr.shift_local(2, 2);
        assert_eq!(expr.to_string(), "F67+IFERROR(INDIRECT(\"'x'!D67\"),0)");

        expr.shift_indirect("x", 3, 1);
        assert_eq!(expr.to_string(), "F67+IFERROR(INDIRECT(\"'x'!E67\"),0)");

        expr.shift_indirect("other", 1, 5);
        assert_eq!(expr.to_string(), "F67+IFERROR(INDIRECT(\"'x'!E67\"),0)");
    }
}
