use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    category_type TEXT NOT NULL CHECK (category_type IN ('income', 'expense')),
    parent_id INTEGER,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);

CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 0 AND 11),
    amount TEXT NOT NULL,
    note TEXT,
    included INTEGER NOT NULL DEFAULT 1,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_entries_cell ON entries(category_id, year, month);
";

// (name, category_type)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Salary", "income"),
    ("Other Income", "income"),
    ("Housing", "expense"),
    ("Food", "expense"),
    ("Transport", "expense"),
    ("Utilities", "expense"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Give a user with no categories a starter set of top-level rows.
pub fn seed_categories(conn: &Connection, user_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM categories WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    if count > 0 {
        return Ok(0);
    }
    for (name, category_type) in DEFAULT_CATEGORIES {
        conn.execute(
            "INSERT INTO categories (user_id, name, category_type) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, name, category_type],
        )?;
    }
    Ok(DEFAULT_CATEGORIES.len())
}
