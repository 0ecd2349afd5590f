use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{get_connection, init_db};
use crate::error::{Result, TallyError};
use crate::models::{Category, CategoryType, CellAddr, Entry, EntryPatch, NewEntry};

/// Row-level access to categories and ledger entries.
///
/// The grid only ever talks to the ledger through this trait, so any backend
/// that can list and mutate rows will do.
pub trait EntryStore {
    /// Entries of one cell, in position order.
    fn list_entries(&self, cell: CellAddr) -> Result<Vec<Entry>>;
    /// Every entry a user has in a year, across all of their categories.
    fn list_year_entries(&self, user_id: &str, year: i32) -> Result<Vec<Entry>>;
    fn get_entry(&self, id: i64) -> Result<Entry>;
    fn insert_entry(&self, entry: &NewEntry) -> Result<Entry>;
    fn update_entry(&self, id: i64, patch: &EntryPatch) -> Result<Entry>;
    fn delete_entry(&self, id: i64) -> Result<()>;

    fn list_categories(&self, user_id: &str) -> Result<Vec<Category>>;
    fn insert_category(
        &self,
        user_id: &str,
        name: &str,
        category_type: CategoryType,
        parent_id: Option<i64>,
    ) -> Result<Category>;
    fn rename_category(&self, id: i64, name: &str) -> Result<Category>;
    fn move_category(&self, id: i64, parent_id: Option<i64>) -> Result<Category>;
    /// Remove one category row and its entries. Children are left alone.
    fn delete_category(&self, id: i64) -> Result<()>;
}

pub struct SqliteStore {
    conn: Connection,
}

const ENTRY_COLUMNS: &str = "id, category_id, year, month, amount, note, included, position";
const CATEGORY_COLUMNS: &str = "id, name, category_type, parent_id";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let amount: String = row.get(4)?;
    let amount = Decimal::from_str(&amount)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Entry {
        id: row.get(0)?,
        category_id: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        amount,
        note: row.get(5)?,
        included: row.get(6)?,
        position: row.get(7)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind: String = row.get(2)?;
    let category_type = CategoryType::from_str(&kind)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        category_type,
        parent_id: row.get(3)?,
    })
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn get_category(&self, id: i64) -> Result<Category> {
        self.conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                [id],
                category_from_row,
            )
            .optional()?
            .ok_or(TallyError::UnknownCategory(id))
    }
}

impl EntryStore for SqliteStore {
    fn list_entries(&self, cell: CellAddr) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries \
             WHERE category_id = ?1 AND year = ?2 AND month = ?3 \
             ORDER BY position ASC, id ASC"
        ))?;
        let entries = stmt
            .query_map(
                rusqlite::params![cell.category_id, cell.year, cell.month],
                entry_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn list_year_entries(&self, user_id: &str, year: i32) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.category_id, e.year, e.month, e.amount, e.note, e.included, e.position \
             FROM entries e JOIN categories c ON e.category_id = c.id \
             WHERE c.user_id = ?1 AND e.year = ?2 \
             ORDER BY e.category_id, e.month, e.position, e.id",
        )?;
        let entries = stmt
            .query_map(rusqlite::params![user_id, year], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn get_entry(&self, id: i64) -> Result<Entry> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                [id],
                entry_from_row,
            )
            .optional()?
            .ok_or(TallyError::UnknownEntry(id))
    }

    fn insert_entry(&self, entry: &NewEntry) -> Result<Entry> {
        self.get_category(entry.category_id)?;
        self.conn.execute(
            "INSERT INTO entries (category_id, year, month, amount, note, included, position) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                entry.category_id,
                entry.year,
                entry.month,
                entry.amount.to_string(),
                entry.note,
                entry.included,
                entry.position,
            ],
        )?;
        self.get_entry(self.conn.last_insert_rowid())
    }

    fn update_entry(&self, id: i64, patch: &EntryPatch) -> Result<Entry> {
        let mut entry = self.get_entry(id)?;
        if let Some(amount) = patch.amount {
            entry.amount = amount;
        }
        if let Some(note) = &patch.note {
            entry.note = note.clone();
        }
        if let Some(included) = patch.included {
            entry.included = included;
        }
        self.conn.execute(
            "UPDATE entries SET amount = ?1, note = ?2, included = ?3 WHERE id = ?4",
            rusqlite::params![entry.amount.to_string(), entry.note, entry.included, id],
        )?;
        Ok(entry)
    }

    fn delete_entry(&self, id: i64) -> Result<()> {
        let deleted = self.conn.execute("DELETE FROM entries WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(TallyError::UnknownEntry(id));
        }
        Ok(())
    }

    fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE user_id = ?1 \
             ORDER BY CASE category_type WHEN 'income' THEN 0 ELSE 1 END, name ASC"
        ))?;
        let categories = stmt
            .query_map([user_id], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn insert_category(
        &self,
        user_id: &str,
        name: &str,
        category_type: CategoryType,
        parent_id: Option<i64>,
    ) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(TallyError::Other("Name is required".into()));
        }
        self.conn.execute(
            "INSERT INTO categories (user_id, name, category_type, parent_id) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, name.trim(), category_type.as_str(), parent_id],
        )?;
        self.get_category(self.conn.last_insert_rowid())
    }

    fn rename_category(&self, id: i64, name: &str) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(TallyError::Other("Name is required".into()));
        }
        let updated = self.conn.execute(
            "UPDATE categories SET name = ?1 WHERE id = ?2",
            rusqlite::params![name.trim(), id],
        )?;
        if updated == 0 {
            return Err(TallyError::UnknownCategory(id));
        }
        self.get_category(id)
    }

    fn move_category(&self, id: i64, parent_id: Option<i64>) -> Result<Category> {
        let updated = self.conn.execute(
            "UPDATE categories SET parent_id = ?1 WHERE id = ?2",
            rusqlite::params![parent_id, id],
        )?;
        if updated == 0 {
            return Err(TallyError::UnknownCategory(id));
        }
        self.get_category(id)
    }

    fn delete_category(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM entries WHERE category_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(TallyError::UnknownCategory(id));
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn new_entry(category_id: i64, month: u32, amount: &str, position: i64) -> NewEntry {
        NewEntry {
            category_id,
            year: 2025,
            month,
            amount: d(amount),
            note: None,
            included: true,
            position,
        }
    }

    #[test]
    fn test_insert_and_list_entries_in_position_order() {
        let (_dir, store) = test_store();
        let cat = store.insert_category("u", "Food", CategoryType::Expense, None).unwrap();
        store.insert_entry(&new_entry(cat.id, 0, "-12.50", 2)).unwrap();
        store.insert_entry(&new_entry(cat.id, 0, "-7.25", 1)).unwrap();
        store.insert_entry(&new_entry(cat.id, 1, "-1", 1)).unwrap();

        let cell = CellAddr::new(cat.id, 2025, 0).unwrap();
        let entries = store.list_entries(cell).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, d("-7.25"));
        assert_eq!(entries[1].amount, d("-12.50"));
    }

    #[test]
    fn test_amounts_keep_their_exact_decimal_value() {
        let (_dir, store) = test_store();
        let cat = store.insert_category("u", "Salary", CategoryType::Income, None).unwrap();
        let entry = store.insert_entry(&new_entry(cat.id, 3, "0.10", 0)).unwrap();
        assert_eq!(entry.amount, d("0.10"));
        assert_eq!(entry.cell(), CellAddr::new(cat.id, 2025, 3).unwrap());
    }

    #[test]
    fn test_insert_entry_for_unknown_category_rejected() {
        let (_dir, store) = test_store();
        let err = store.insert_entry(&new_entry(404, 0, "1", 0)).unwrap_err();
        assert!(matches!(err, TallyError::UnknownCategory(404)));
    }

    #[test]
    fn test_update_entry_applies_only_given_fields() {
        let (_dir, store) = test_store();
        let cat = store.insert_category("u", "Food", CategoryType::Expense, None).unwrap();
        let mut seed = new_entry(cat.id, 0, "-5", 0);
        seed.note = Some("lunch".into());
        let entry = store.insert_entry(&seed).unwrap();

        let updated = store
            .update_entry(
                entry.id,
                &EntryPatch {
                    included: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.included);
        assert_eq!(updated.amount, d("-5"));
        assert_eq!(updated.note.as_deref(), Some("lunch"));

        let cleared = store
            .update_entry(
                entry.id,
                &EntryPatch {
                    note: Some(None),
                    amount: Some(d("-6")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.note.is_none());
        assert_eq!(cleared.amount, d("-6"));
        assert!(!cleared.included);
    }

    #[test]
    fn test_delete_missing_entry() {
        let (_dir, store) = test_store();
        let err = store.delete_entry(99).unwrap_err();
        assert!(matches!(err, TallyError::UnknownEntry(99)));
    }

    #[test]
    fn test_year_entries_are_scoped_to_user_and_year() {
        let (_dir, store) = test_store();
        let mine = store.insert_category("alice", "Food", CategoryType::Expense, None).unwrap();
        let theirs = store.insert_category("bob", "Food", CategoryType::Expense, None).unwrap();
        store.insert_entry(&new_entry(mine.id, 0, "-1", 0)).unwrap();
        store.insert_entry(&new_entry(theirs.id, 0, "-2", 0)).unwrap();
        let mut last_year = new_entry(mine.id, 0, "-3", 1);
        last_year.year = 2024;
        store.insert_entry(&last_year).unwrap();

        let entries = store.list_year_entries("alice", 2025).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, d("-1"));
    }

    #[test]
    fn test_category_crud() {
        let (_dir, store) = test_store();
        let parent = store.insert_category("u", "Housing", CategoryType::Expense, None).unwrap();
        let child = store
            .insert_category("u", "Rent", CategoryType::Expense, Some(parent.id))
            .unwrap();
        assert_eq!(child.parent_id, Some(parent.id));

        let renamed = store.rename_category(child.id, "Rent & Fees").unwrap();
        assert_eq!(renamed.name, "Rent & Fees");

        let moved = store.move_category(child.id, None).unwrap();
        assert_eq!(moved.parent_id, None);

        store.insert_entry(&new_entry(child.id, 0, "-900", 0)).unwrap();
        store.delete_category(child.id).unwrap();
        let left = store.list_categories("u").unwrap();
        assert_eq!(left.len(), 1);
        assert!(store.list_year_entries("u", 2025).unwrap().is_empty());
    }

    #[test]
    fn test_blank_category_name_rejected() {
        let (_dir, store) = test_store();
        let err = store.insert_category("u", "  ", CategoryType::Income, None).unwrap_err();
        assert!(err.to_string().contains("Name is required"));
    }

    #[test]
    fn test_missing_category_operations() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.rename_category(5, "x").unwrap_err(),
            TallyError::UnknownCategory(5)
        ));
        assert!(matches!(
            store.delete_category(5).unwrap_err(),
            TallyError::UnknownCategory(5)
        ));
    }
}
