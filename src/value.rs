//! Values flowing between operators.
//!
//! A [`Value`] is one output item of an operator: its ordinal `id` in that
//! operator's output, the documents it carries (one per merged input), and a
//! [`Context`] recording, for each upstream stream the consumers still care
//! about, which output of that stream this value descends from.
//!
//! The sentinel [`UNBOUND`] marks a stream the value does not descend from,
//! typically because it came through a union branch that never saw it.

use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::sync::Arc;

/// Shared, immutable JSON document produced by a task or supplied as a constant.
pub type Document = Arc<JsonValue>;

/// Per-stream positions of a value, indexed by the operator's context layout.
pub type Context = Vec<i64>;

/// Context entry for a stream the value does not descend from.
pub const UNBOUND: i64 = -1;

/// Wrap any JSON-convertible value into a [`Document`].
pub fn document(value: impl Into<JsonValue>) -> Document {
    Arc::new(value.into())
}

/// One output item of an operator.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    /// Ordinal of this value in its operator's output sequence.
    pub id: u64,
    /// Documents carried by this value; joins and products concatenate them.
    pub nodes: Vec<Document>,
    /// Positions in the upstream streams tracked by the operator.
    pub context: Context,
}

impl Value {
    #[must_use]
    pub fn new(id: u64, nodes: Vec<Document>, context: Context) -> Self {
        Self { id, nodes, context }
    }

    /// Document at `index`, if present.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&Document> {
        self.nodes.get(index)
    }

    /// Position recorded at context `index`, or [`UNBOUND`] when out of range.
    #[must_use]
    pub fn position(&self, index: usize) -> i64 {
        self.context.get(index).copied().unwrap_or(UNBOUND)
    }

    #[must_use]
    pub fn is_bound(&self, index: usize) -> bool {
        self.position(index) != UNBOUND
    }

    /// Positions at the given context indices.
    #[must_use]
    pub fn key(&self, indices: &[usize]) -> Vec<i64> {
        indices.iter().map(|&i| self.position(i)).collect()
    }
}

/// Raw output of an operator step, before the runner assigns an id and
/// computes the operator's own context.
///
/// `contexts` pairs a parent stream index with the context of the parent
/// value that contributed to this output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnValue {
    pub nodes: Vec<Document>,
    pub contexts: Vec<(usize, Context)>,
}

impl ReturnValue {
    #[must_use]
    pub fn new(nodes: Vec<Document>, contexts: Vec<(usize, Context)>) -> Self {
        Self { nodes, contexts }
    }

    /// A value carrying a single document and no upstream context.
    #[must_use]
    pub fn source(node: Document) -> Self {
        Self {
            nodes: vec![node],
            contexts: Vec::new(),
        }
    }

    /// Context contributed by parent `stream`, if any.
    #[must_use]
    pub fn context(&self, stream: usize) -> Option<&Context> {
        self.contexts
            .iter()
            .find(|(s, _)| *s == stream)
            .map(|(_, c)| c)
    }
}

/// Natural ordering of two keys: lexicographic, [`UNBOUND`] sorts first.
#[must_use]
pub fn compare_keys(a: &[i64], b: &[i64]) -> Ordering {
    a.cmp(b)
}

/// Join-buffer ordering of two keys: lexicographic, [`UNBOUND`] sorts last.
#[must_use]
pub fn compare_keys_unbound_last(a: &[i64], b: &[i64]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = match (*x == UNBOUND, *y == UNBOUND) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Whether a partially bound `key` agrees with `position` on every bound entry.
#[must_use]
pub fn is_compatible(key: &[i64], position: &[i64]) -> bool {
    key.iter()
        .zip(position)
        .all(|(k, p)| *k == UNBOUND || k == p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_sorts_first_naturally_and_last_in_buffers() {
        assert_eq!(compare_keys(&[UNBOUND], &[0]), Ordering::Less);
        assert_eq!(compare_keys_unbound_last(&[UNBOUND], &[0]), Ordering::Greater);
        assert_eq!(compare_keys_unbound_last(&[1, UNBOUND], &[1, 5]), Ordering::Greater);
        assert_eq!(compare_keys_unbound_last(&[0, UNBOUND], &[1, 0]), Ordering::Less);
    }

    #[test]
    fn compatibility_ignores_unbound_entries() {
        assert!(is_compatible(&[UNBOUND, 2], &[7, 2]));
        assert!(!is_compatible(&[UNBOUND, 2], &[7, 3]));
        assert!(is_compatible(&[1, 2], &[1, 2]));
    }

    #[test]
    fn key_reads_context_positions() {
        let value = Value::new(0, Vec::new(), vec![4, UNBOUND, 9]);
        assert_eq!(value.key(&[2, 0]), vec![9, 4]);
        assert!(value.is_bound(0));
        assert!(!value.is_bound(1));
    }
}
