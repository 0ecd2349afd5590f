use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{load_grid, open_grid};
use crate::error::Result;
use crate::fmt::cell;
use crate::grid::{Freshness, GridRow};
use crate::models::{add_months, CategoryType, MonthValues, MONTH_NAMES};
use crate::rollup::year_total;

pub fn run(year: Option<i32>, cached: bool) -> Result<()> {
    let grid = if cached {
        let grid = open_grid(year)?;
        if grid.freshness() != Freshness::Cached {
            println!("No cached grid for {}.", grid.year());
            return Ok(());
        }
        grid
    } else {
        load_grid(year)?
    };

    let mut table = Table::new();
    let mut header = vec![Cell::new("Category")];
    header.extend(MONTH_NAMES.iter().map(|m| Cell::new(*m)));
    header.push(Cell::new("Total"));
    table.set_header(header);

    let sections = [("INCOME", CategoryType::Income), ("EXPENSES", CategoryType::Expense)];
    for (label, category_type) in sections {
        let heading = match category_type {
            CategoryType::Income => label.green().bold(),
            CategoryType::Expense => label.red().bold(),
        };
        table.add_row(vec![Cell::new(heading)]);
        for row in grid.rows(category_type) {
            table.add_row(grid_row(&row)?);
        }
        let totals = grid.type_totals(category_type)?;
        let total_label = format!("Total {}", label.to_lowercase());
        table.add_row(values_row(Cell::new(total_label.as_str().bold()), &totals)?);
    }

    let net = net_values(
        &grid.type_totals(CategoryType::Income)?,
        &grid.type_totals(CategoryType::Expense)?,
    )?;
    table.add_row(values_row(Cell::new("NET".bold()), &net)?);

    let source = if grid.freshness() == Freshness::Cached { " (cached)" } else { "" };
    println!("Grid {}{source}\n{table}", grid.year());
    Ok(())
}

fn grid_row(row: &GridRow) -> Result<Vec<Cell>> {
    let name = format!("{}{}", "  ".repeat(row.depth), row.category.name);
    let label = if row.is_parent {
        Cell::new(name.as_str().bold())
    } else {
        Cell::new(name)
    };
    values_row(label, &row.values)
}

fn values_row(label: Cell, values: &MonthValues) -> Result<Vec<Cell>> {
    let mut cells = vec![label];
    cells.extend(
        values
            .iter()
            .map(|v| Cell::new(cell(*v)).set_alignment(CellAlignment::Right)),
    );
    cells.push(Cell::new(cell(year_total(values)?)).set_alignment(CellAlignment::Right));
    Ok(cells)
}

/// Income and expense amounts carry their own sign, so net is a plain sum.
fn net_values(income: &MonthValues, expense: &MonthValues) -> Result<MonthValues> {
    add_months(income, expense)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZERO_MONTHS;
    use rust_decimal::Decimal;

    #[test]
    fn test_net_values() {
        let mut income = ZERO_MONTHS;
        let mut expense = ZERO_MONTHS;
        income[0] = Decimal::from(100);
        expense[0] = Decimal::from(-30);
        expense[1] = Decimal::from(-5);
        let net = net_values(&income, &expense).unwrap();
        assert_eq!(net[0], Decimal::from(70));
        assert_eq!(net[1], Decimal::from(-5));
    }

    #[test]
    fn test_values_row_has_label_months_and_total() {
        let row = values_row(Cell::new("x"), &ZERO_MONTHS).unwrap();
        assert_eq!(row.len(), 14);
    }

    #[test]
    fn test_values_row_refuses_unrepresentable_total() {
        let mut values = ZERO_MONTHS;
        values[0] = Decimal::MAX;
        values[1] = Decimal::MAX;
        assert!(values_row(Cell::new("x"), &values).is_err());
    }
}
