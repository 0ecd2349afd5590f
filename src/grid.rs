//! The monthly finance grid: what the presentation layer reads and edits.
//!
//! A grid is bound to one user and one year. It paints from the local cache
//! when it can, revalidates against the entry store, and routes every edit
//! back through the store before rewriting or clearing the cached snapshot.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cache::{CachedCategory, KvStore, LocalCache, Snapshot};
use crate::clipboard::{plan_paste, Clipboard};
use crate::error::{Result, TallyError};
use crate::models::{
    add_months, checked_add, checked_sum, Category, CategoryType, CellAddr, Entry, EntryPatch,
    MonthValues, ZERO_MONTHS,
};
use crate::reconcile::{cell_total, plan_adjustment};
use crate::rollup::{aggregate, ParentTotals, Rollups};
use crate::store::EntryStore;
use crate::tree::{direct_values, CategoryTree};

/// What happens to the children of a deleted category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Delete the whole subtree with its entries.
    #[default]
    Cascade,
    /// Hand the children to the deleted category's parent.
    Reparent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridOptions {
    pub parent_totals: ParentTotals,
    pub delete_policy: DeletePolicy,
}

/// Where the values currently on screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Empty,
    Cached,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    user_id: String,
    year: i32,
}

/// Rows pulled from the store for one ticket, not yet applied.
#[derive(Debug, Clone)]
pub struct FetchedYear {
    ticket: FetchTicket,
    categories: Vec<Category>,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub category: Category,
    pub depth: usize,
    pub is_parent: bool,
    pub values: MonthValues,
}

pub struct FinanceGrid<S: EntryStore, K: KvStore> {
    store: S,
    cache: LocalCache<K>,
    clipboard: Clipboard,
    user_id: String,
    year: i32,
    options: GridOptions,
    generation: u64,
    freshness: Freshness,
    tree: CategoryTree,
    direct: HashMap<i64, MonthValues>,
    rollups: Rollups,
    entry_counts: HashMap<(i64, u32), usize>,
}

fn remote<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        tracing::warn!(error = %e, "store rejected write");
        TallyError::RemoteWriteFailed(e.to_string())
    })
}

impl<S: EntryStore, K: KvStore> FinanceGrid<S, K> {
    /// Build a grid and paint it from the cache if a snapshot exists.
    pub fn open(store: S, kv: K, user_id: &str, year: i32, options: GridOptions) -> Self {
        let mut grid = Self {
            store,
            cache: LocalCache::new(kv),
            clipboard: Clipboard::new(),
            user_id: user_id.to_string(),
            year,
            options,
            generation: 0,
            freshness: Freshness::Empty,
            tree: CategoryTree::default(),
            direct: HashMap::new(),
            rollups: Rollups::default(),
            entry_counts: HashMap::new(),
        };
        grid.paint_from_cache();
        grid
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache<K> {
        &self.cache
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn tree(&self) -> &CategoryTree {
        &self.tree
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Show the cached snapshot for the current user and year, if any.
    pub fn paint_from_cache(&mut self) -> bool {
        let Some(snapshot) = self.cache.read(&self.user_id, self.year) else {
            tracing::debug!(user = %self.user_id, year = self.year, "no cached grid");
            return false;
        };
        let categories: Vec<Category> = snapshot.rows().map(CachedCategory::category).collect();
        let direct = snapshot.rows().map(|row| (row.id, row.values)).collect();
        self.entry_counts.clear();
        // a cyclic snapshot still paints its direct values
        let _ = self.install(&categories, direct);
        self.freshness = Freshness::Cached;
        tracing::debug!(user = %self.user_id, year = self.year, "painted grid from cache");
        true
    }

    /// Start a fetch. Any fetch started earlier becomes stale.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket {
            generation: self.generation,
            user_id: self.user_id.clone(),
            year: self.year,
        }
    }

    pub fn fetch(&self, ticket: FetchTicket) -> Result<FetchedYear> {
        let categories = self.store.list_categories(&ticket.user_id)?;
        let entries = self.store.list_year_entries(&ticket.user_id, ticket.year)?;
        Ok(FetchedYear {
            ticket,
            categories,
            entries,
        })
    }

    /// Apply fetched rows and cache them. Returns `false` without touching
    /// anything when the fetch was superseded.
    pub fn apply_fetch(&mut self, fetched: FetchedYear) -> Result<bool> {
        let ticket = &fetched.ticket;
        if ticket.generation != self.generation
            || ticket.year != self.year
            || ticket.user_id != self.user_id
        {
            tracing::warn!(
                year = ticket.year,
                current_year = self.year,
                "discarding superseded fetch"
            );
            return Ok(false);
        }

        let direct = direct_values(&fetched.entries)?;
        let mut counts: HashMap<(i64, u32), usize> = HashMap::new();
        for entry in &fetched.entries {
            *counts.entry((entry.category_id, entry.month)).or_default() += 1;
        }
        self.entry_counts = counts;
        let installed = self.install(&fetched.categories, direct);
        self.freshness = Freshness::Fresh;
        self.cache.write(&self.user_id, self.year, &self.snapshot());
        tracing::debug!(
            categories = fetched.categories.len(),
            entries = fetched.entries.len(),
            "applied fetch"
        );
        installed.map(|_| true)
    }

    /// Fetch and apply in one go.
    pub fn refresh(&mut self) -> Result<()> {
        let ticket = self.begin_fetch();
        let fetched = self.fetch(ticket)?;
        self.apply_fetch(fetched)?;
        Ok(())
    }

    /// Switch the grid to another year, painting from cache when possible.
    pub fn set_year(&mut self, year: i32) -> bool {
        self.generation += 1;
        self.year = year;
        self.freshness = Freshness::Empty;
        self.tree = CategoryTree::default();
        self.direct.clear();
        self.rollups = Rollups::default();
        self.entry_counts.clear();
        self.paint_from_cache()
    }

    fn install(&mut self, categories: &[Category], direct: HashMap<i64, MonthValues>) -> Result<()> {
        self.tree = CategoryTree::build(categories);
        self.direct = direct;
        self.recompute()
    }

    fn recompute(&mut self) -> Result<()> {
        match aggregate(&self.tree, &self.direct, self.options.parent_totals) {
            Ok(rollups) => {
                let checked = rollups.check_acyclic();
                self.rollups = rollups;
                checked
            }
            Err(e) => {
                self.rollups = Rollups::default();
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    pub fn direct_values(&self, category_id: i64) -> MonthValues {
        self.direct.get(&category_id).copied().unwrap_or(ZERO_MONTHS)
    }

    pub fn rollup(&self, category_id: i64) -> Option<MonthValues> {
        self.rollups.get(category_id).copied()
    }

    /// Values shown on a category's row, honoring the parent-totals option.
    pub fn displayed_values(&self, category_id: i64) -> MonthValues {
        self.rollups.displayed(category_id, &self.direct)
    }

    /// Month-by-month total of the entries shown on one side of the grid.
    ///
    /// Own entries of a parent that displays descendants only appear on no
    /// row, so they are left out here too.
    pub fn type_totals(&self, category_type: CategoryType) -> Result<MonthValues> {
        let mut totals = ZERO_MONTHS;
        for cat in self.tree.categories().filter(|c| c.category_type == category_type) {
            if self.rollups.hides_own_entries(cat.id) {
                continue;
            }
            if let Some(values) = self.direct.get(&cat.id) {
                totals = add_months(&totals, values)?;
            }
        }
        Ok(totals)
    }

    /// Depth-first rows for one side of the grid, siblings sorted by name.
    pub fn rows(&self, category_type: CategoryType) -> Vec<GridRow> {
        let by_name = |ids: &[i64]| {
            let mut cats: Vec<&Category> = ids.iter().filter_map(|id| self.tree.get(*id)).collect();
            cats.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            cats.into_iter().map(|c| c.id).collect::<Vec<_>>()
        };

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<(i64, usize)> = by_name(self.tree.roots())
            .into_iter()
            .rev()
            .map(|id| (id, 0))
            .collect();

        // rows cut off by a parent cycle are shown at the top level
        let mut stranded: Vec<&Category> = self
            .tree
            .categories()
            .filter(|c| c.category_type == category_type)
            .collect();
        stranded.sort_by_key(|c| c.id);

        loop {
            let Some((id, depth)) = stack.pop() else {
                match stranded.iter().find(|c| !seen.contains(&c.id)) {
                    Some(c) => {
                        stack.push((c.id, 0));
                        continue;
                    }
                    None => break,
                }
            };
            if !seen.insert(id) {
                continue;
            }
            let Some(cat) = self.tree.get(id) else { continue };
            if cat.category_type == category_type {
                rows.push(GridRow {
                    category: cat.clone(),
                    depth,
                    is_parent: self.tree.is_parent(id),
                    values: self.displayed_values(id),
                });
            }
            for child in by_name(self.tree.children(id)).into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        rows
    }

    pub fn cell_entries(&self, cell: CellAddr) -> Result<Vec<Entry>> {
        self.store.list_entries(cell)
    }

    /// Snapshot of the grid as it would be cached.
    pub fn snapshot(&self) -> Snapshot {
        let mut cats: Vec<&Category> = self.tree.categories().collect();
        cats.sort_by_key(|c| c.id);
        let mut snapshot = Snapshot::default();
        for cat in cats {
            let row = CachedCategory::new(cat, self.direct_values(cat.id));
            match cat.category_type {
                CategoryType::Income => snapshot.income.push(row),
                CategoryType::Expense => snapshot.expense.push(row),
            }
        }
        snapshot
    }

    // -----------------------------------------------------------------------
    // Cell edits
    // -----------------------------------------------------------------------

    /// Set a cell's total by booking one adjustment entry for the difference.
    ///
    /// The grid shows `new_total` before the store confirms the write and
    /// goes back to the previous value if the store rejects it.
    pub fn reconcile_cell(&mut self, cell: CellAddr, new_total: Decimal) -> Result<Option<Entry>> {
        self.ensure_own_category(cell.category_id)?;
        let entries = self.store.list_entries(cell)?;
        let Some(planned) = plan_adjustment(cell, &entries, new_total)? else {
            tracing::debug!(%cell, "cell already at requested total");
            return Ok(None);
        };

        let previous = self.set_cell_value(cell, new_total)?;
        match remote(self.store.insert_entry(&planned)) {
            Ok(entry) => {
                self.after_write(cell);
                Ok(Some(entry))
            }
            Err(e) => {
                self.restore_cell_value(cell, previous);
                Err(e)
            }
        }
    }

    /// Fails with `UnknownCategory` unless `id` is one of this user's categories.
    fn ensure_own_category(&self, id: i64) -> Result<()> {
        if self.tree.get(id).is_some() || self.store_tree()?.get(id).is_some() {
            Ok(())
        } else {
            Err(TallyError::UnknownCategory(id))
        }
    }

    pub fn can_copy(&self, cell: CellAddr) -> bool {
        if let Err(e) = self.ensure_own_category(cell.category_id) {
            tracing::debug!(%cell, error = %e, "cell is not copyable");
            return false;
        }
        if cell.year == self.year && self.freshness == Freshness::Fresh {
            return self
                .entry_counts
                .get(&(cell.category_id, cell.month))
                .is_some_and(|n| *n > 0);
        }
        match self.store.list_entries(cell) {
            Ok(entries) => !entries.is_empty(),
            Err(e) => {
                tracing::warn!(%cell, error = %e, "could not check cell entries");
                false
            }
        }
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.has_clipboard()
    }

    /// Copy a cell's entries into this grid's clipboard.
    pub fn copy_cell(&mut self, cell: CellAddr) -> Result<usize> {
        self.ensure_own_category(cell.category_id)?;
        let entries = self.store.list_entries(cell)?;
        let copied = self.clipboard.copy(&entries)?;
        tracing::debug!(%cell, copied, "copied cell");
        Ok(copied)
    }

    /// Append the clipboard's records to a cell as new entries.
    ///
    /// All or nothing: if the store rejects one insert, entries this paste
    /// already created are removed again.
    pub fn paste_cell(&mut self, cell: CellAddr) -> Result<Vec<Entry>> {
        let records = self.clipboard.records()?;
        self.ensure_own_category(cell.category_id)?;
        let existing = self.store.list_entries(cell)?;
        let planned = plan_paste(&records, cell, &existing);

        let added = checked_sum(planned.iter().filter(|e| e.included).map(|e| e.amount))?;
        let total = checked_add(cell_total(&existing)?, added)?;
        let previous = self.set_cell_value(cell, total)?;

        let mut inserted = Vec::with_capacity(planned.len());
        for entry in &planned {
            match remote(self.store.insert_entry(entry)) {
                Ok(row) => inserted.push(row),
                Err(e) => {
                    for row in &inserted {
                        if let Err(undo) = self.store.delete_entry(row.id) {
                            tracing::error!(entry = row.id, error = %undo, "could not undo partial paste");
                        }
                    }
                    self.restore_cell_value(cell, previous);
                    return Err(e);
                }
            }
        }
        self.after_write(cell);
        Ok(inserted)
    }

    pub fn update_entry(&mut self, id: i64, patch: &EntryPatch) -> Result<Entry> {
        self.ensure_own_category(self.store.get_entry(id)?.category_id)?;
        let entry = remote(self.store.update_entry(id, patch))?;
        self.after_write(entry.cell());
        Ok(entry)
    }

    pub fn delete_entry(&mut self, id: i64) -> Result<()> {
        let entry = self.store.get_entry(id)?;
        self.ensure_own_category(entry.category_id)?;
        remote(self.store.delete_entry(id))?;
        self.after_write(entry.cell());
        Ok(())
    }

    /// Overwrite one cell's in-memory value; returns the value it replaced.
    ///
    /// A value whose rollups would overflow is put back and reported.
    fn set_cell_value(&mut self, cell: CellAddr, value: Decimal) -> Result<Option<Decimal>> {
        if cell.year != self.year {
            return Ok(None);
        }
        let previous = self.swap_cell_value(cell, value);
        match self.recompute() {
            Ok(()) => {}
            // cyclic store data was reported when it was loaded; the other rollups are current
            Err(TallyError::CyclicCategoryGraph { ids }) => {
                tracing::debug!(%cell, ?ids, "rollups recomputed around a cycle");
            }
            Err(e) => {
                self.swap_cell_value(cell, previous);
                if let Err(again) = self.recompute() {
                    tracing::debug!(%cell, error = %again, "rollups after undo");
                }
                return Err(e);
            }
        }
        Ok(Some(previous))
    }

    fn swap_cell_value(&mut self, cell: CellAddr, value: Decimal) -> Decimal {
        let slot = &mut self.direct.entry(cell.category_id).or_insert(ZERO_MONTHS)[cell.month as usize];
        std::mem::replace(slot, value)
    }

    fn restore_cell_value(&mut self, cell: CellAddr, previous: Option<Decimal>) {
        if let Some(previous) = previous {
            if let Err(e) = self.set_cell_value(cell, previous) {
                tracing::warn!(%cell, error = %e, "could not restore cell value");
            }
        }
    }

    /// Pull the cell back from the store and write the snapshot through.
    fn after_write(&mut self, cell: CellAddr) {
        if cell.year != self.year {
            // that year's snapshot no longer matches the store
            self.cache.clear(&self.user_id, cell.year);
            return;
        }
        match self.store.list_entries(cell) {
            Ok(entries) => {
                self.entry_counts
                    .insert((cell.category_id, cell.month), entries.len());
                let applied = cell_total(&entries)
                    .and_then(|total| self.set_cell_value(cell, total));
                if let Err(e) = applied {
                    tracing::warn!(%cell, error = %e, "could not show cell after write");
                }
            }
            Err(e) => tracing::warn!(%cell, error = %e, "could not re-read cell after write"),
        }
        self.cache.write(&self.user_id, self.year, &self.snapshot());
    }

    // -----------------------------------------------------------------------
    // Category structure
    // -----------------------------------------------------------------------

    fn store_tree(&self) -> Result<CategoryTree> {
        Ok(CategoryTree::build(&self.store.list_categories(&self.user_id)?))
    }

    /// Drop the cached shape and reload from the store.
    fn after_structure_change(&mut self) -> Result<()> {
        self.cache.clear(&self.user_id, self.year);
        self.refresh()
    }

    pub fn add_category(
        &mut self,
        name: &str,
        category_type: CategoryType,
        parent_id: Option<i64>,
    ) -> Result<Category> {
        self.store_tree()?.check_parent(category_type, parent_id)?;
        let cat = remote(
            self.store
                .insert_category(&self.user_id, name, category_type, parent_id),
        )?;
        self.after_structure_change()?;
        Ok(cat)
    }

    pub fn rename_category(&mut self, id: i64, name: &str) -> Result<Category> {
        if self.store_tree()?.get(id).is_none() {
            return Err(TallyError::UnknownCategory(id));
        }
        let cat = remote(self.store.rename_category(id, name))?;
        self.after_structure_change()?;
        Ok(cat)
    }

    /// Attach a category under a new parent (or make it a root).
    pub fn move_category(&mut self, id: i64, parent_id: Option<i64>) -> Result<Category> {
        let tree = self.store_tree()?;
        let cat = tree.get(id).ok_or(TallyError::UnknownCategory(id))?;
        tree.check_parent(cat.category_type, parent_id)?;
        if let Some(parent) = parent_id {
            if parent == id {
                return Err(TallyError::CyclicCategoryGraph { ids: vec![id] });
            }
            if tree.descendants(id).contains(&parent) {
                return Err(TallyError::CyclicCategoryGraph {
                    ids: vec![id, parent],
                });
            }
        }
        let moved = remote(self.store.move_category(id, parent_id))?;
        self.after_structure_change()?;
        Ok(moved)
    }

    /// Ids that deleting `id` would remove under the configured policy.
    pub fn deletion_scope(&self, id: i64) -> Result<Vec<i64>> {
        let tree = self.store_tree()?;
        if tree.get(id).is_none() {
            return Err(TallyError::UnknownCategory(id));
        }
        Ok(match self.options.delete_policy {
            DeletePolicy::Cascade => {
                let mut ids = vec![id];
                ids.extend(tree.descendants(id));
                ids
            }
            DeletePolicy::Reparent => vec![id],
        })
    }

    /// Delete a category according to the delete policy. Returns the ids
    /// that were removed.
    pub fn delete_category(&mut self, id: i64) -> Result<Vec<i64>> {
        let tree = self.store_tree()?;
        let cat = tree.get(id).ok_or(TallyError::UnknownCategory(id))?.clone();

        let result = match self.options.delete_policy {
            DeletePolicy::Cascade => {
                // deepest first so no row is left pointing at a deleted parent
                let mut doomed = vec![id];
                doomed.extend(tree.descendants(id));
                let mut removed = Vec::with_capacity(doomed.len());
                let mut outcome = Ok(());
                for victim in doomed.into_iter().rev() {
                    match remote(self.store.delete_category(victim)) {
                        Ok(()) => removed.push(victim),
                        Err(e) => {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
                outcome.map(|_| removed)
            }
            DeletePolicy::Reparent => {
                let mut outcome = Ok(());
                for &child in tree.children(id) {
                    if let Err(e) = remote(self.store.move_category(child, cat.parent_id)) {
                        outcome = Err(e);
                        break;
                    }
                }
                outcome
                    .and_then(|_| remote(self.store.delete_category(id)))
                    .map(|_| vec![id])
            }
        };

        // the structure may have changed even when a step failed
        let reloaded = self.after_structure_change();
        let removed = result?;
        reloaded?;
        tracing::debug!(?removed, "deleted categories");
        Ok(removed)
    }
}
