use rust_decimal::Decimal;

use crate::error::{Result, TallyError};
use crate::models::{CellAddr, Entry, NewEntry};
use crate::reconcile::next_position;

/// The parts of an entry that travel with a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRecord {
    pub amount: Decimal,
    pub note: Option<String>,
    pub included: bool,
}

/// Session-scoped copy buffer. Each grid owns its own.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    records: Vec<ClipRecord>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffer with `entries`, in position order.
    ///
    /// An empty source is rejected and leaves the previous buffer intact.
    pub fn copy(&mut self, entries: &[Entry]) -> Result<usize> {
        if entries.is_empty() {
            return Err(TallyError::EmptySourceCopy);
        }
        let mut sorted: Vec<&Entry> = entries.iter().collect();
        sorted.sort_by_key(|e| (e.position, e.id));
        self.records = sorted
            .into_iter()
            .map(|e| ClipRecord {
                amount: e.amount,
                note: e.note.clone(),
                included: e.included,
            })
            .collect();
        Ok(self.records.len())
    }

    pub fn has_clipboard(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A snapshot of the buffer to paste from.
    pub fn records(&self) -> Result<Vec<ClipRecord>> {
        if self.records.is_empty() {
            return Err(TallyError::EmptyClipboardPaste);
        }
        Ok(self.records.clone())
    }
}

/// New entries for `cell`, appended after its `existing` entries.
pub fn plan_paste(records: &[ClipRecord], cell: CellAddr, existing: &[Entry]) -> Vec<NewEntry> {
    let start = next_position(existing);
    records
        .iter()
        .zip(start..)
        .map(|(record, position)| NewEntry {
            category_id: cell.category_id,
            year: cell.year,
            month: cell.month,
            amount: record.amount,
            note: record.note.clone(),
            included: record.included,
            position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, amount: i64, note: Option<&str>, included: bool, position: i64) -> Entry {
        Entry {
            id,
            category_id: 1,
            year: 2025,
            month: 0,
            amount: Decimal::from(amount),
            note: note.map(str::to_string),
            included,
            position,
        }
    }

    #[test]
    fn test_copy_keeps_position_order_and_drops_ids() {
        let mut clip = Clipboard::new();
        let source = vec![entry(10, 5, Some("b"), true, 2), entry(11, 7, None, false, 1)];
        assert_eq!(clip.copy(&source).unwrap(), 2);
        let records = clip.records().unwrap();
        assert_eq!(
            records,
            vec![
                ClipRecord { amount: Decimal::from(7), note: None, included: false },
                ClipRecord { amount: Decimal::from(5), note: Some("b".into()), included: true },
            ]
        );
    }

    #[test]
    fn test_copy_empty_source_rejected_and_buffer_kept() {
        let mut clip = Clipboard::new();
        let err = clip.copy(&[]).unwrap_err();
        assert!(matches!(err, TallyError::EmptySourceCopy));
        assert!(!clip.has_clipboard());

        clip.copy(&[entry(1, 3, None, true, 0)]).unwrap();
        assert!(clip.copy(&[]).is_err());
        assert_eq!(clip.len(), 1);
    }

    #[test]
    fn test_records_on_empty_buffer() {
        let clip = Clipboard::new();
        assert!(matches!(clip.records().unwrap_err(), TallyError::EmptyClipboardPaste));
    }

    #[test]
    fn test_copy_replaces_whole_buffer() {
        let mut clip = Clipboard::new();
        clip.copy(&[entry(1, 1, None, true, 0), entry(2, 2, None, true, 1)]).unwrap();
        clip.copy(&[entry(3, 9, None, true, 0)]).unwrap();
        let records = clip.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, Decimal::from(9));
    }

    #[test]
    fn test_plan_paste_continues_positions() {
        let records = vec![
            ClipRecord { amount: Decimal::from(1), note: Some("x".into()), included: true },
            ClipRecord { amount: Decimal::from(2), note: None, included: false },
        ];
        let dest = CellAddr::new(4, 2026, 6).unwrap();
        let existing = vec![entry(20, 0, None, true, 0), entry(21, 0, None, true, 4)];
        let planned = plan_paste(&records, dest, &existing);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].position, 5);
        assert_eq!(planned[1].position, 6);
        assert_eq!(planned[1].category_id, 4);
        assert_eq!(planned[1].year, 2026);
        assert_eq!(planned[1].month, 6);
        assert!(!planned[1].included);
        assert_eq!(planned[0].note.as_deref(), Some("x"));
    }

    #[test]
    fn test_plan_paste_into_empty_cell() {
        let records = vec![ClipRecord { amount: Decimal::from(1), note: None, included: true }];
        let planned = plan_paste(&records, CellAddr::new(1, 2025, 0).unwrap(), &[]);
        assert_eq!(planned[0].position, 0);
    }
}
