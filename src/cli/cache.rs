use crate::cli::open_grid;
use crate::error::Result;

pub fn clear(year: Option<i32>) -> Result<()> {
    let grid = open_grid(year)?;
    grid.cache().clear(grid.user_id(), grid.year());
    println!("Cleared cached grid for {}", grid.year());
    Ok(())
}
