//! Partially specified sort orders.
//!
//! An [`Order`] is a sequence of sets: items in an earlier set sort before
//! items in a later one, items within a set are mutually unordered. The
//! planner uses it to describe which streams an `OrderBy` sorts on.

use indexmap::IndexSet;
use std::hash::Hash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order<T: Hash + Eq> {
    list: Vec<IndexSet<T>>,
}

impl<T: Hash + Eq> Default for Order<T> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<T: Clone + Hash + Eq> Order<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A total order over `items`, in the given sequence.
    pub fn of(items: impl IntoIterator<Item = T>) -> Self {
        let mut order = Self::new();
        for item in items {
            order.add(item, true);
        }
        order
    }

    /// Add `item` to the last set, or to a fresh set if `new_set` or the order is empty.
    pub fn add(&mut self, item: T, new_set: bool) {
        if new_set || self.list.is_empty() {
            self.list.push(IndexSet::new());
        }
        if let Some(last) = self.list.last_mut() {
            last.insert(item);
        }
    }

    /// A total order compatible with this one.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.list.iter().flatten().cloned().collect()
    }

    #[must_use]
    pub fn sets(&self) -> &[IndexSet<T>] {
        &self.list
    }

    /// Number of items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.list.iter().map(IndexSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove `item`, dropping its set if it becomes empty.
    pub fn remove(&mut self, item: &T) -> bool {
        for i in (0..self.list.len()).rev() {
            if self.list[i].shift_remove(item) {
                if self.list[i].is_empty() {
                    self.list.remove(i);
                }
                return true;
            }
        }
        false
    }

    /// Replace every item through `f`, merging items that map to the same value.
    pub fn remap(&mut self, f: impl Fn(&T) -> T) {
        let mut seen = IndexSet::new();
        for set in &mut self.list {
            *set = set
                .iter()
                .map(&f)
                .filter(|t| seen.insert(t.clone()))
                .collect();
        }
        self.list.retain(|s| !s.is_empty());
    }

    /// Turn into a total order: every item gets its own set.
    pub fn flatten(&mut self) {
        self.list = self
            .items()
            .into_iter()
            .map(|t| IndexSet::from([t]))
            .collect();
    }

    /// Drop items for which some other item of the order is a descendant.
    ///
    /// Sorting on a descendant stream already groups by its ancestors.
    pub fn prune(&mut self, is_ancestor: impl Fn(&T, &T) -> bool) {
        let items = self.items();
        for item in &items {
            if items.iter().any(|other| other != item && is_ancestor(item, other)) {
                self.remove(item);
            }
        }
    }

    /// Combine two or more orders into the most specific order compatible with all.
    ///
    /// Returns `false` with the prefix built so far when the orders conflict.
    #[must_use]
    pub fn combine(orders: &[Order<T>]) -> (bool, Order<T>) {
        let mut iters: Vec<_> = orders.iter().map(|o| o.list.iter()).collect();
        let mut current: Vec<IndexSet<T>> = vec![IndexSet::new(); orders.len()];
        let mut active: Vec<usize> = (0..orders.len()).collect();
        let mut out = Vec::new();

        loop {
            active.retain(|&i| {
                while current[i].is_empty() {
                    match iters[i].next() {
                        Some(set) => current[i].clone_from(set),
                        None => return false,
                    }
                }
                true
            });

            match active.as_slice() {
                [] => return (true, Order { list: out }),
                [only] => out.push(std::mem::take(&mut current[*only])),
                [first, rest @ ..] => {
                    let common: IndexSet<T> = current[*first]
                        .iter()
                        .filter(|t| rest.iter().all(|&i| current[i].contains(*t)))
                        .cloned()
                        .collect();
                    if common.is_empty() {
                        return (false, Order { list: out });
                    }
                    for &i in &active {
                        current[i].retain(|t| !common.contains(t));
                    }
                    out.push(common);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_item_sequence() {
        let mut order = Order::new();
        order.add(1, false);
        order.add(2, false);
        order.add(3, true);
        assert_eq!(order.sets().len(), 2);
        order.flatten();
        assert_eq!(order.sets().len(), 3);
        assert_eq!(order.items(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_drops_empty_sets() {
        let mut order = Order::of([1, 2]);
        assert!(order.remove(&1));
        assert!(!order.remove(&7));
        assert_eq!(order.sets().len(), 1);
        assert_eq!(order.size(), 1);
    }

    #[test]
    fn prune_removes_ancestors() {
        // 1 is an ancestor of 2; 3 is unrelated
        let mut order = Order::of([1, 2, 3]);
        order.prune(|a, b| *a == 1 && *b == 2);
        assert_eq!(order.items(), vec![2, 3]);
    }

    #[test]
    fn combine_compatible_orders() {
        let mut a = Order::new();
        a.add('x', false);
        a.add('y', false);
        a.add('z', true);
        let b = Order::of(['y', 'x', 'z']);

        let (ok, combined) = Order::combine(&[a, b]);
        assert!(ok);
        assert_eq!(combined.items(), vec!['y', 'x', 'z']);
    }

    #[test]
    fn combine_conflicting_orders() {
        let a = Order::of(['x', 'y']);
        let b = Order::of(['y', 'x']);
        let (ok, _) = Order::combine(&[a, b]);
        assert!(!ok);
    }

    #[test]
    fn remap_merges_duplicates() {
        let mut order = Order::of([1, 2, 3]);
        order.remap(|t| if *t == 2 { 1 } else { *t });
        assert_eq!(order.items(), vec![1, 3]);
    }
}
