use std::io::Write;

use comfy_table::{Cell, Table};

use crate::cli::{load_grid, CliGrid};
use crate::error::Result;
use crate::models::{Category, CategoryType};

pub fn add(name: &str, category_type: &str, parent: Option<i64>) -> Result<()> {
    let category_type: CategoryType = category_type.parse()?;
    let mut grid = load_grid(None)?;
    let cat = grid.add_category(name, category_type, parent)?;
    println!("Added category {}: {}", cat.id, cat.name);
    Ok(())
}

pub fn list() -> Result<()> {
    let grid = load_grid(None)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Parent"]);
    for category_type in [CategoryType::Income, CategoryType::Expense] {
        for row in grid.rows(category_type) {
            table.add_row(vec![
                Cell::new(row.category.id),
                Cell::new(format!("{}{}", "  ".repeat(row.depth), row.category.name)),
                Cell::new(row.category.category_type),
                Cell::new(row.category.parent_id.map(|p| p.to_string()).unwrap_or_default()),
            ]);
        }
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn rename(id: i64, new_name: &str) -> Result<()> {
    let mut grid = load_grid(None)?;
    grid.rename_category(id, new_name)?;
    println!("Renamed category {id} to: {new_name}");
    Ok(())
}

pub fn move_to(id: i64, parent: Option<i64>) -> Result<()> {
    let mut grid = load_grid(None)?;
    let cat = grid.move_category(id, parent)?;
    match cat.parent_id {
        Some(p) => println!("Moved {} under category {p}", cat.name),
        None => println!("Moved {} to the top level", cat.name),
    }
    Ok(())
}

pub fn delete(id: i64, yes: bool) -> Result<()> {
    let mut grid = load_grid(None)?;
    let scope = grid.deletion_scope(id)?;

    if !yes {
        println!("This will delete:");
        for name in scope_names(&grid, &scope) {
            println!("  {name}");
        }
        print!("Delete {} categor{} and their entries? [y/N] ", scope.len(), if scope.len() == 1 { "y" } else { "ies" });
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !matches!(input.trim(), "y" | "Y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = grid.delete_category(id)?;
    println!("Deleted {} categor{}", removed.len(), if removed.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn scope_names(grid: &CliGrid, ids: &[i64]) -> Vec<String> {
    ids.iter()
        .map(|id| match grid.tree().get(*id) {
            Some(Category { name, .. }) => format!("{id}: {name}"),
            None => id.to_string(),
        })
        .collect()
}
