pub mod cache;
pub mod categories;
pub mod cell;
pub mod entries;
pub mod grid;
pub mod init;
pub mod status;

use chrono::Datelike;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::cache::SqliteKv;
use crate::error::{Result, TallyError};
use crate::grid::FinanceGrid;
use crate::models::CellAddr;
use crate::settings::load_settings;
use crate::store::SqliteStore;

pub(crate) type CliGrid = FinanceGrid<SqliteStore, SqliteKv>;

pub(crate) fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Open the grid for the configured user, painted from cache if possible.
pub(crate) fn open_grid(year: Option<i32>) -> Result<CliGrid> {
    let settings = load_settings();
    let ledger = settings.ledger_path();
    if !ledger.exists() {
        return Err(TallyError::Settings(format!(
            "No ledger found at {}\nRun `tally init` to set one up.",
            ledger.display()
        )));
    }
    let store = SqliteStore::open(&ledger)?;
    let kv = SqliteKv::open(&settings.cache_path())?;
    Ok(FinanceGrid::open(
        store,
        kv,
        &settings.user_id,
        year.unwrap_or_else(current_year),
        settings.grid_options(),
    ))
}

/// Open the grid and reload it from the ledger. A cyclic category graph is
/// reported but the grid is still returned with direct values only.
pub(crate) fn load_grid(year: Option<i32>) -> Result<CliGrid> {
    let mut grid = open_grid(year)?;
    match grid.refresh() {
        Ok(()) => Ok(grid),
        Err(e @ TallyError::CyclicCategoryGraph { .. }) => {
            eprintln!("Warning: {e}");
            Ok(grid)
        }
        Err(e) => Err(e),
    }
}

/// Parse `CATEGORY:YYYY-MM`, e.g. `12:2025-03`.
pub(crate) fn parse_cell_target(s: &str) -> std::result::Result<CellAddr, String> {
    let (category, month) = s
        .split_once(':')
        .ok_or_else(|| format!("expected CATEGORY:YYYY-MM, got {s}"))?;
    let category_id: i64 = category
        .parse()
        .map_err(|_| format!("invalid category id: {category}"))?;
    CellAddr::parse(category_id, month).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "tally", about = "Monthly income and expense grid with category rollups.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up tally: choose a data directory and initialize the ledger.
    Init {
        /// Path for tally data (default: ~/Documents/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// User whose categories and entries to work with
        #[arg(long)]
        user: Option<String>,
    },
    /// Show the configured ledger and summary statistics.
    Status,
    /// Manage income and expense categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Show the monthly grid for a year.
    Grid {
        /// Year to show (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// Show the cached snapshot without reading the ledger
        #[arg(long)]
        cached: bool,
    },
    /// Inspect or edit a single grid cell.
    Cell {
        #[command(subcommand)]
        command: CellCommands,
    },
    /// Edit individual ledger entries.
    Entries {
        #[command(subcommand)]
        command: EntriesCommands,
    },
    /// Manage the local grid cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        /// Category name, e.g. 'Groceries'
        name: String,
        /// Category type: income or expense
        #[arg(long = "type")]
        category_type: String,
        /// Parent category ID (must have the same type)
        #[arg(long)]
        parent: Option<i64>,
    },
    /// List categories as a tree.
    List,
    /// Rename a category.
    Rename {
        /// Category ID (shown in `tally categories list`)
        id: i64,
        /// New name
        name: String,
    },
    /// Move a category under another parent.
    Move {
        /// Category ID
        id: i64,
        /// New parent ID (omit to make it top-level)
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Delete a category (children follow the configured delete policy).
    Delete {
        /// Category ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CellCommands {
    /// List the entries that make up a cell.
    Show {
        /// Category ID
        category: i64,
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
    },
    /// Set a cell's total; the difference is booked as one adjustment entry.
    Set {
        /// Category ID
        category: i64,
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
        /// New total for the cell
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
    },
    /// Copy a cell's entries into one or more other cells.
    Copy {
        /// Source category ID
        category: i64,
        /// Source month: YYYY-MM
        #[arg(long)]
        month: String,
        /// Destination as CATEGORY:YYYY-MM (repeatable)
        #[arg(long = "to", required = true, value_parser = parse_cell_target)]
        targets: Vec<CellAddr>,
    },
}

#[derive(Subcommand)]
pub enum EntriesCommands {
    /// Change an entry's amount.
    Amount {
        /// Entry ID (shown in `tally cell show`)
        id: i64,
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
    },
    /// Set or clear an entry's note.
    Note {
        id: i64,
        /// New note (omit to clear)
        note: Option<String>,
    },
    /// Count an entry in its cell's total.
    Include { id: i64 },
    /// Keep an entry but leave it out of its cell's total.
    Exclude { id: i64 },
    /// Delete an entry.
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Drop the cached grid for a year.
    Clear {
        /// Year to clear (default: current year)
        #[arg(long)]
        year: Option<i32>,
    },
}
