use rust_decimal::Decimal;

use crate::cli::{load_grid, open_grid};
use crate::error::Result;
use crate::fmt::money;
use crate::models::{Entry, EntryPatch};
use crate::store::EntryStore;

/// Load the grid for the year the entry lives in, then apply the patch.
fn patch(id: i64, patch: EntryPatch) -> Result<Entry> {
    let year = open_grid(None)?.store().get_entry(id)?.year;
    let mut grid = load_grid(Some(year))?;
    grid.update_entry(id, &patch)
}

pub fn amount(id: i64, amount: Decimal) -> Result<()> {
    let entry = patch(
        id,
        EntryPatch {
            amount: Some(amount),
            ..Default::default()
        },
    )?;
    println!("Entry {id} is now {} in {}", money(entry.amount), entry.cell());
    Ok(())
}

pub fn note(id: i64, note: Option<String>) -> Result<()> {
    let note = note.filter(|n| !n.trim().is_empty());
    let cleared = note.is_none();
    patch(
        id,
        EntryPatch {
            note: Some(note),
            ..Default::default()
        },
    )?;
    if cleared {
        println!("Cleared note on entry {id}");
    } else {
        println!("Updated note on entry {id}");
    }
    Ok(())
}

pub fn set_included(id: i64, included: bool) -> Result<()> {
    let entry = patch(
        id,
        EntryPatch {
            included: Some(included),
            ..Default::default()
        },
    )?;
    let verb = if entry.included { "Included" } else { "Excluded" };
    println!("{verb} entry {id} ({}) in {}", money(entry.amount), entry.cell());
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let year = open_grid(None)?.store().get_entry(id)?.year;
    let mut grid = load_grid(Some(year))?;
    grid.delete_entry(id)?;
    println!("Deleted entry {id}");
    Ok(())
}
