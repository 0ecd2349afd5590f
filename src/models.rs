use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// Twelve monthly values, January at index 0.
pub type MonthValues = [Decimal; 12];

pub const ZERO_MONTHS: MonthValues = [Decimal::ZERO; 12];

/// `a + b`, or `AmountOverflow` when the sum leaves the decimal range.
pub fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| TallyError::AmountOverflow(format!("{a} + {b}")))
}

/// Checked sum of a sequence of amounts.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, checked_add)
}

/// Month-by-month checked sum.
pub fn add_months(a: &MonthValues, b: &MonthValues) -> Result<MonthValues> {
    let mut out = *a;
    for (slot, value) in out.iter_mut().zip(b) {
        *slot = checked_add(*slot, *value)?;
    }
    Ok(out)
}

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "income",
            CategoryType::Expense => "expense",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "income" => Ok(CategoryType::Income),
            "expense" => Ok(CategoryType::Expense),
            other => Err(TallyError::Other(format!(
                "Invalid category type: {other} (must be 'income' or 'expense')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: i64,
    pub category_id: i64,
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
    pub note: Option<String>,
    pub included: bool,
    pub position: i64,
}

impl Entry {
    pub fn cell(&self) -> CellAddr {
        CellAddr {
            category_id: self.category_id,
            year: self.year,
            month: self.month,
        }
    }
}

/// Insert form of an [`Entry`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub category_id: i64,
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
    pub note: Option<String>,
    pub included: bool,
    pub position: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub amount: Option<Decimal>,
    /// `Some(None)` clears the note.
    pub note: Option<Option<String>>,
    pub included: Option<bool>,
}

/// Address of one grid cell. Months are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddr {
    pub category_id: i64,
    pub year: i32,
    pub month: u32,
}

impl CellAddr {
    pub fn new(category_id: i64, year: i32, month: u32) -> Result<Self> {
        if month > 11 {
            return Err(TallyError::InvalidMonth(format!(
                "month index {month} is outside 0..=11"
            )));
        }
        Ok(Self {
            category_id,
            year,
            month,
        })
    }

    /// Parse a `YYYY-MM` label (months one-based, as users write them).
    pub fn parse(category_id: i64, label: &str) -> Result<Self> {
        let (year, month) = parse_year_month(label)?;
        Self::new(category_id, year, month)
    }

    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year, self.month + 1)
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category_id, self.label())
    }
}

/// `YYYY-MM` to `(year, zero-based month)`.
pub fn parse_year_month(label: &str) -> Result<(i32, u32)> {
    let invalid = || TallyError::InvalidMonth(format!("{label} (expected YYYY-MM)"));
    let (y, m) = label.split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month - 1))
}
