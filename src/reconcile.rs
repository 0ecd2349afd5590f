use rust_decimal::Decimal;

use crate::error::{Result, TallyError};
use crate::models::{checked_sum, CellAddr, Entry, NewEntry};

pub const INFLOW_NOTE: &str = "Inflow adjustment";
pub const OUTFLOW_NOTE: &str = "Outflow adjustment";

/// Sum of the included amounts in a cell.
pub fn cell_total(entries: &[Entry]) -> Result<Decimal> {
    checked_sum(entries.iter().filter(|e| e.included).map(|e| e.amount))
}

/// Position for a new entry appended after everything already in the cell.
pub fn next_position(entries: &[Entry]) -> i64 {
    entries
        .iter()
        .map(|e| e.position)
        .max()
        .map_or(0, |p| p + 1)
}

/// The single entry that moves a cell from its current total to `new_total`,
/// or `None` when the totals already match.
pub fn plan_adjustment(
    cell: CellAddr,
    entries: &[Entry],
    new_total: Decimal,
) -> Result<Option<NewEntry>> {
    let current = cell_total(entries)?;
    let delta = new_total.checked_sub(current).ok_or_else(|| {
        TallyError::AmountOverflow(format!("{new_total} - {current} in {cell}"))
    })?;
    if delta.is_zero() {
        return Ok(None);
    }
    let note = if delta.is_sign_positive() {
        INFLOW_NOTE
    } else {
        OUTFLOW_NOTE
    };
    Ok(Some(NewEntry {
        category_id: cell.category_id,
        year: cell.year,
        month: cell.month,
        amount: delta,
        note: Some(note.to_string()),
        included: true,
        position: next_position(entries),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn cell() -> CellAddr {
        CellAddr::new(2, 2025, 0).unwrap()
    }

    fn entry(id: i64, amount: &str, included: bool, position: i64) -> Entry {
        Entry {
            id,
            category_id: 2,
            year: 2025,
            month: 0,
            amount: d(amount),
            note: None,
            included,
            position,
        }
    }

    #[test]
    fn test_cell_total_ignores_excluded() {
        let entries = vec![entry(1, "100", true, 0), entry(2, "40", false, 1), entry(3, "-10.5", true, 2)];
        assert_eq!(cell_total(&entries).unwrap(), d("89.5"));
        assert_eq!(cell_total(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_raise_total_adds_inflow() {
        let entries = vec![entry(1, "100", true, 0)];
        let planned = plan_adjustment(cell(), &entries, d("150")).unwrap().unwrap();
        assert_eq!(planned.amount, d("50"));
        assert!(planned.included);
        assert_eq!(planned.note.as_deref(), Some(INFLOW_NOTE));
        assert_eq!(planned.position, 1);
        assert_eq!(planned.category_id, 2);
    }

    #[test]
    fn test_lower_total_adds_outflow() {
        let entries = vec![entry(1, "100", true, 3), entry(2, "5", false, 7)];
        let planned = plan_adjustment(cell(), &entries, d("60.25")).unwrap().unwrap();
        assert_eq!(planned.amount, d("-39.75"));
        assert_eq!(planned.note.as_deref(), Some(OUTFLOW_NOTE));
        assert_eq!(planned.position, 8);
    }

    #[test]
    fn test_equal_total_plans_nothing() {
        let entries = vec![entry(1, "100.00", true, 0), entry(2, "999", false, 1)];
        assert!(plan_adjustment(cell(), &entries, d("100")).unwrap().is_none());
    }

    #[test]
    fn test_resummed_total_is_exact() {
        let mut entries = vec![entry(1, "0.1", true, 0), entry(2, "0.2", true, 1)];
        let target = d("1234.57");
        let planned = plan_adjustment(cell(), &entries, target).unwrap().unwrap();
        entries.push(entry(3, &planned.amount.to_string(), true, planned.position));
        assert_eq!(cell_total(&entries).unwrap(), target);
    }

    #[test]
    fn test_empty_cell_first_entry_position() {
        let planned = plan_adjustment(cell(), &[], d("-20")).unwrap().unwrap();
        assert_eq!(planned.position, 0);
        assert_eq!(planned.amount, d("-20"));
    }

    #[test]
    fn test_target_out_of_range_is_an_error() {
        let entries = vec![entry(1, "-1", true, 0)];
        let err = plan_adjustment(cell(), &entries, Decimal::MAX).unwrap_err();
        assert!(matches!(err, TallyError::AmountOverflow(_)));
    }

    #[test]
    fn test_cell_total_overflow_is_an_error() {
        let mut entries = vec![entry(1, "1", true, 0), entry(2, "1", true, 1)];
        entries[0].amount = Decimal::MAX;
        assert!(matches!(cell_total(&entries).unwrap_err(), TallyError::AmountOverflow(_)));
    }
}
