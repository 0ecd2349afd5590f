use crate::cache::{cache_key, KvStore, SqliteKv};
use crate::cli::current_year;
use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.ledger_path();

    println!("User:       {}", settings.user_id);
    println!("Data dir:   {}", settings.data_dir);
    println!("Ledger:     {}", db_path.display());

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        let categories: i64 = conn.query_row(
            "SELECT count(*) FROM categories WHERE user_id = ?1",
            [&settings.user_id],
            |r| r.get(0),
        )?;
        let entries: i64 = conn.query_row(
            "SELECT count(*) FROM entries e JOIN categories c ON e.category_id = c.id WHERE c.user_id = ?1",
            [&settings.user_id],
            |r| r.get(0),
        )?;
        let excluded: i64 = conn.query_row(
            "SELECT count(*) FROM entries e JOIN categories c ON e.category_id = c.id \
             WHERE c.user_id = ?1 AND e.included = 0",
            [&settings.user_id],
            |r| r.get(0),
        )?;

        let year = current_year();
        let cached = SqliteKv::open(&settings.cache_path())
            .and_then(|kv| kv.get(&cache_key(&settings.user_id, year)))
            .map(|v| v.is_some())
            .unwrap_or(false);

        println!();
        println!("Categories:    {categories}");
        println!("Entries:       {entries}");
        println!("Excluded:      {excluded}");
        println!("Cached {year}:   {}", if cached { "yes" } else { "no" });
    } else {
        println!();
        println!("Ledger not found. Run `tally init` to set up.");
    }

    Ok(())
}
