//! Monthly rollups of descendant values into parent categories.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::models::{add_months, checked_sum, MonthValues, ZERO_MONTHS};
use crate::tree::CategoryTree;

/// Whether a parent row shows only what its descendants contribute, or also
/// entries booked directly against the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentTotals {
    #[default]
    DescendantsOnly,
    IncludeOwnEntries,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rollups {
    by_parent: HashMap<i64, MonthValues>,
    /// What each rolled-up parent's row shows.
    shown: HashMap<i64, MonthValues>,
    parent_totals: ParentTotals,
    cycles: Vec<Vec<i64>>,
}

impl Rollups {
    /// Rollup of a parent category; `None` for leaves, unknown ids and
    /// members of a parent cycle.
    pub fn get(&self, id: i64) -> Option<&MonthValues> {
        self.by_parent.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }

    /// The twelve values the grid shows on a category's row.
    pub fn displayed(&self, id: i64, direct: &HashMap<i64, MonthValues>) -> MonthValues {
        match self.shown.get(&id) {
            Some(values) => *values,
            None => direct.get(&id).copied().unwrap_or(ZERO_MONTHS),
        }
    }

    /// True when a category's own entries appear on no row: it is a
    /// rolled-up parent showing descendants only.
    pub fn hides_own_entries(&self, id: i64) -> bool {
        self.parent_totals == ParentTotals::DescendantsOnly && self.by_parent.contains_key(&id)
    }

    /// `CyclicCategoryGraph` for the first skipped cycle, if any.
    pub fn check_acyclic(&self) -> Result<()> {
        match self.cycles.first() {
            Some(ids) => Err(TallyError::CyclicCategoryGraph { ids: ids.clone() }),
            None => Ok(()),
        }
    }
}

pub fn year_total(values: &MonthValues) -> Result<Decimal> {
    checked_sum(values.iter().copied())
}

/// Compute the rollup of every parent in `tree`.
///
/// A parent's rollup is the sum of its children's rows: a leaf contributes
/// its direct values, a child parent what its own row shows under
/// `parent_totals`. With `DescendantsOnly` that is the sum over descendant
/// leaves. Categories without direct values count as zero.
///
/// Members of a parent cycle get no rollup and are recorded on the result;
/// every other parent is still rolled up. Only an amount overflow fails.
pub fn aggregate(
    tree: &CategoryTree,
    direct: &HashMap<i64, MonthValues>,
    parent_totals: ParentTotals,
) -> Result<Rollups> {
    let cycles = tree.cycles();
    for ids in &cycles {
        tracing::error!(?ids, "category parent references form a cycle");
    }
    let cyclic: HashSet<i64> = cycles.iter().flatten().copied().collect();
    let rolled_up = |id: i64| tree.is_parent(id) && !cyclic.contains(&id);

    let mut memo: HashMap<i64, MonthValues> = HashMap::new();
    let mut shown: HashMap<i64, MonthValues> = HashMap::new();
    let mut parents: Vec<i64> = tree.parents().filter(|id| !cyclic.contains(id)).collect();
    parents.sort_unstable();

    for top in parents {
        if memo.contains_key(&top) {
            continue;
        }
        // (id, children already pushed)
        let mut stack = vec![(top, false)];
        while let Some((id, expanded)) = stack.pop() {
            if memo.contains_key(&id) {
                continue;
            }
            if !expanded {
                stack.push((id, true));
                for &child in tree.children(id) {
                    if rolled_up(child) && !memo.contains_key(&child) {
                        stack.push((child, false));
                    }
                }
                continue;
            }
            let mut sum = ZERO_MONTHS;
            for &child in tree.children(id) {
                let row = if rolled_up(child) {
                    shown.get(&child)
                } else {
                    direct.get(&child)
                };
                if let Some(values) = row {
                    sum = add_months(&sum, values)?;
                }
            }
            let own_row = match (parent_totals, direct.get(&id)) {
                (ParentTotals::IncludeOwnEntries, Some(own)) => add_months(&sum, own)?,
                _ => sum,
            };
            memo.insert(id, sum);
            shown.insert(id, own_row);
        }
    }

    tracing::debug!(parents = memo.len(), cycles = cycles.len(), "rollups computed");
    Ok(Rollups {
        by_parent: memo,
        shown,
        parent_totals,
        cycles,
    })
}
