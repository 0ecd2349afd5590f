use comfy_table::{Cell, CellAlignment, Table};
use rust_decimal::Decimal;

use crate::cli::load_grid;
use crate::error::{Result, TallyError};
use crate::fmt::money;
use crate::models::CellAddr;
use crate::reconcile::cell_total;

pub fn show(category: i64, month: &str) -> Result<()> {
    let cell = CellAddr::parse(category, month)?;
    let grid = load_grid(Some(cell.year))?;
    let name = grid
        .tree()
        .get(category)
        .map(|c| c.name.clone())
        .ok_or(TallyError::UnknownCategory(category))?;
    let entries = grid.cell_entries(cell)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Amount", "Note", "Included"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(money(entry.amount)).set_alignment(CellAlignment::Right),
            Cell::new(entry.note.clone().unwrap_or_default()),
            Cell::new(if entry.included { "yes" } else { "no" }),
        ]);
    }
    println!("{name} {}\n{table}", cell.label());
    println!("Total: {}", money(cell_total(&entries)?));
    Ok(())
}

pub fn set(category: i64, month: &str, amount: Decimal) -> Result<()> {
    let cell = CellAddr::parse(category, month)?;
    let mut grid = load_grid(Some(cell.year))?;
    if grid.tree().get(category).is_none() {
        return Err(TallyError::UnknownCategory(category));
    }
    match grid.reconcile_cell(cell, amount)? {
        Some(entry) => println!(
            "Set {} to {} ({} {})",
            cell.label(),
            money(amount),
            entry.note.unwrap_or_default(),
            money(entry.amount)
        ),
        None => println!("{} is already {}", cell.label(), money(amount)),
    }
    Ok(())
}

pub fn copy(category: i64, month: &str, targets: &[CellAddr]) -> Result<()> {
    let source = CellAddr::parse(category, month)?;
    let mut grid = load_grid(Some(source.year))?;
    for addr in std::iter::once(&source).chain(targets) {
        if grid.tree().get(addr.category_id).is_none() {
            return Err(TallyError::UnknownCategory(addr.category_id));
        }
    }
    if !grid.can_copy(source) {
        return Err(TallyError::EmptySourceCopy);
    }
    let copied = grid.copy_cell(source)?;

    for target in targets {
        grid.paste_cell(*target)?;
        println!("Pasted {copied} entr{} into {target}", if copied == 1 { "y" } else { "ies" });
    }
    Ok(())
}
