//! Category hierarchy built from flat category rows.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, TallyError};
use crate::models::{checked_add, Category, CategoryType, Entry, MonthValues, ZERO_MONTHS};

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    by_id: HashMap<i64, Category>,
    children: BTreeMap<i64, Vec<i64>>,
    roots: Vec<i64>,
}

impl CategoryTree {
    /// Index the rows by id and link each row to its parent.
    ///
    /// A `parent_id` naming a category that is not in `categories` makes the
    /// row a root. Children and roots are kept in ascending id order.
    pub fn build(categories: &[Category]) -> Self {
        let by_id: HashMap<i64, Category> =
            categories.iter().map(|c| (c.id, c.clone())).collect();

        let mut children: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        let mut roots = Vec::new();
        for cat in by_id.values() {
            match cat.parent_id.filter(|p| by_id.contains_key(p)) {
                Some(parent) => children.entry(parent).or_default().push(cat.id),
                None => roots.push(cat.id),
            }
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }
        roots.sort_unstable();

        Self {
            by_id,
            children,
            roots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn children(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_parent(&self, id: i64) -> bool {
        self.children.contains_key(&id)
    }

    /// Ids of every category that has at least one child.
    pub fn parents(&self) -> impl Iterator<Item = i64> + '_ {
        self.children.keys().copied()
    }

    pub fn roots(&self) -> &[i64] {
        &self.roots
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.by_id.values()
    }

    /// Every category below `id`, nearest first. Safe on cyclic input.
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        let mut queue: Vec<i64> = self.children(id).to_vec();
        let mut next = 0;
        while next < queue.len() {
            let current = queue[next];
            next += 1;
            if !seen.insert(current) {
                continue;
            }
            out.push(current);
            queue.extend_from_slice(self.children(current));
        }
        out
    }

    /// Members of every parent cycle, lowest starting id first.
    ///
    /// Walks each parent chain once; a chain that runs back into itself
    /// before reaching a root (or an already cleared row) is a cycle. Rows
    /// that merely hang below a cycle are not members of it.
    pub fn cycles(&self) -> Vec<Vec<i64>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnPath,
            Clear,
        }

        let mut marks: HashMap<i64, Mark> = HashMap::with_capacity(self.by_id.len());
        let mut ids: Vec<i64> = self.by_id.keys().copied().collect();
        ids.sort_unstable();

        let mut found = Vec::new();
        for start in ids {
            if marks.contains_key(&start) {
                continue;
            }
            let mut path = Vec::new();
            let mut current = Some(start);
            while let Some(id) = current {
                match marks.get(&id) {
                    Some(Mark::Clear) => break,
                    Some(Mark::OnPath) => {
                        let from = path.iter().position(|p| *p == id).unwrap_or(0);
                        found.push(path[from..].to_vec());
                        break;
                    }
                    None => {}
                }
                marks.insert(id, Mark::OnPath);
                path.push(id);
                current = self
                    .by_id
                    .get(&id)
                    .and_then(|c| c.parent_id)
                    .filter(|p| self.by_id.contains_key(p));
            }
            for id in path {
                marks.insert(id, Mark::Clear);
            }
        }
        found
    }

    /// Check that `parent_id` can take a child of `category_type`.
    pub fn check_parent(&self, category_type: CategoryType, parent_id: Option<i64>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        let parent = self
            .get(parent_id)
            .ok_or(TallyError::UnknownCategory(parent_id))?;
        if parent.category_type != category_type {
            return Err(TallyError::TypeMismatch {
                parent: parent.category_type.to_string(),
                child: category_type.to_string(),
            });
        }
        Ok(())
    }
}

/// Sum included entries into per-category monthly totals.
pub fn direct_values(entries: &[Entry]) -> Result<HashMap<i64, MonthValues>> {
    let mut values: HashMap<i64, MonthValues> = HashMap::new();
    for entry in entries.iter().filter(|e| e.included) {
        let Some(slot) = usize::try_from(entry.month).ok().filter(|m| *m < 12) else {
            tracing::warn!(entry = entry.id, month = entry.month, "skipping entry with invalid month");
            continue;
        };
        let cell = &mut values.entry(entry.category_id).or_insert(ZERO_MONTHS)[slot];
        *cell = checked_add(*cell, entry.amount)?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn cat(id: i64, parent_id: Option<i64>) -> Category {
        Category {
            id,
            name: format!("cat {id}"),
            category_type: CategoryType::Expense,
            parent_id,
        }
    }

    fn entry(id: i64, category_id: i64, month: u32, amount: i64, included: bool) -> Entry {
        Entry {
            id,
            category_id,
            year: 2025,
            month,
            amount: Decimal::from(amount),
            note: None,
            included,
            position: id,
        }
    }

    #[test]
    fn test_empty_input_builds_empty_tree() {
        let tree = CategoryTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert_eq!(tree.parents().count(), 0);
        assert!(tree.cycles().is_empty());
    }

    #[test]
    fn test_adjacency_and_roots() {
        let tree = CategoryTree::build(&[cat(3, Some(1)), cat(1, None), cat(2, Some(1)), cat(4, Some(2))]);
        assert_eq!(tree.roots(), &[1]);
        assert_eq!(tree.children(1), &[2, 3]);
        assert_eq!(tree.children(2), &[4]);
        assert!(tree.children(4).is_empty());
        assert!(tree.is_parent(1));
        assert!(!tree.is_parent(3));
        assert_eq!(tree.get(4).unwrap().parent_id, Some(2));
    }

    #[test]
    fn test_dangling_parent_is_root() {
        let tree = CategoryTree::build(&[cat(1, None), cat(2, Some(99))]);
        assert_eq!(tree.roots(), &[1, 2]);
        assert!(!tree.is_parent(99));
    }

    #[test]
    fn test_descendants() {
        let tree = CategoryTree::build(&[cat(1, None), cat(2, Some(1)), cat(3, Some(2)), cat(4, Some(1)), cat(5, None)]);
        assert_eq!(tree.descendants(1), vec![2, 4, 3]);
        assert!(tree.descendants(5).is_empty());
    }

    #[test]
    fn test_finds_cycle() {
        let tree = CategoryTree::build(&[cat(1, None), cat(2, Some(3)), cat(3, Some(4)), cat(4, Some(2))]);
        let mut cycle = tree.cycles().remove(0);
        cycle.sort_unstable();
        assert_eq!(cycle, vec![2, 3, 4]);
        assert_eq!(tree.roots(), &[1]);
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let tree = CategoryTree::build(&[cat(7, Some(7))]);
        assert_eq!(tree.cycles(), vec![vec![7]]);
    }

    #[test]
    fn test_branch_into_cycle_reports_only_members() {
        let tree = CategoryTree::build(&[cat(1, Some(2)), cat(2, Some(1)), cat(5, Some(1))]);
        let mut cycle = tree.cycles().remove(0);
        cycle.sort_unstable();
        assert_eq!(cycle, vec![1, 2]);
    }

    #[test]
    fn test_cycles_lists_each_loop() {
        let tree = CategoryTree::build(&[
            cat(1, Some(2)),
            cat(2, Some(1)),
            cat(3, Some(1)),
            cat(4, Some(4)),
            cat(5, None),
            cat(6, Some(5)),
        ]);
        let mut cycles = tree.cycles();
        for cycle in &mut cycles {
            cycle.sort_unstable();
        }
        assert_eq!(cycles, vec![vec![1, 2], vec![4]]);
    }

    #[test]
    fn test_descendants_terminates_on_cycle() {
        let tree = CategoryTree::build(&[cat(1, Some(2)), cat(2, Some(1))]);
        assert_eq!(tree.descendants(1), vec![2]);
    }

    #[test]
    fn test_check_parent() {
        let mut income = cat(1, None);
        income.category_type = CategoryType::Income;
        let tree = CategoryTree::build(&[income, cat(2, None)]);
        assert!(tree.check_parent(CategoryType::Income, Some(1)).is_ok());
        assert!(tree.check_parent(CategoryType::Expense, None).is_ok());
        assert!(matches!(
            tree.check_parent(CategoryType::Expense, Some(1)).unwrap_err(),
            TallyError::TypeMismatch { .. }
        ));
        assert!(matches!(
            tree.check_parent(CategoryType::Expense, Some(9)).unwrap_err(),
            TallyError::UnknownCategory(9)
        ));
    }

    #[test]
    fn test_direct_values_skip_excluded_entries() {
        let values = direct_values(&[
            entry(1, 10, 0, 100, true),
            entry(2, 10, 0, 50, true),
            entry(3, 10, 0, 1000, false),
            entry(4, 10, 11, -20, true),
            entry(5, 11, 5, 7, true),
        ])
        .unwrap();
        let ten = values[&10];
        assert_eq!(ten[0], Decimal::from(150));
        assert_eq!(ten[11], Decimal::from(-20));
        assert_eq!(ten[1], Decimal::ZERO);
        assert_eq!(values[&11][5], Decimal::from(7));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_direct_values_ignore_bad_month() {
        let values = direct_values(&[entry(1, 10, 12, 5, true)]).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_direct_values_overflow_is_an_error() {
        let mut big = entry(1, 10, 0, 1, true);
        big.amount = Decimal::MAX;
        let err = direct_values(&[big, entry(2, 10, 0, 1, true)]).unwrap_err();
        assert!(matches!(err, TallyError::AmountOverflow(_)));
    }
}
