//! Dense, topologically ordered numbering of operators with ancestor sets.
//!
//! Parents are always numbered before their children, so every ancestor of
//! an operator has a smaller id than the operator itself.

use crate::operator::OperatorGraph;
use crate::operator_id::OperatorId;
use indexmap::IndexMap;
use roaring::RoaringBitmap;

#[derive(Clone, Debug, Default)]
pub struct OperatorMap {
    ids: IndexMap<OperatorId, u32>,
    ancestors: Vec<RoaringBitmap>,
}

impl OperatorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `op` and all its ancestors; returns its dense id.
    pub fn add(&mut self, graph: &OperatorGraph, op: OperatorId) -> u32 {
        if let Some(&id) = self.ids.get(&op) {
            return id;
        }
        let mut ancestors = RoaringBitmap::new();
        for &parent in &graph.node(op).parents {
            let pid = self.add(graph, parent);
            ancestors.insert(pid);
            ancestors |= &self.ancestors[pid as usize];
        }
        let id = u32::try_from(self.ancestors.len()).unwrap_or(u32::MAX);
        self.ids.insert(op, id);
        self.ancestors.push(ancestors);
        id
    }

    #[must_use]
    pub fn get(&self, op: OperatorId) -> Option<u32> {
        self.ids.get(&op).copied()
    }

    /// Operator registered under dense id `id`.
    #[must_use]
    pub fn operator(&self, id: u32) -> Option<OperatorId> {
        self.ids.get_index(id as usize).map(|(op, _)| *op)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ancestors(&self, op: OperatorId) -> Option<&RoaringBitmap> {
        self.get(op).map(|id| &self.ancestors[id as usize])
    }

    /// Whether `ancestor` is a strict ancestor of `op`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: OperatorId, op: OperatorId) -> bool {
        match (self.get(ancestor), self.get(op)) {
            (Some(a), Some(id)) => self.ancestors[id as usize].contains(a),
            _ => false,
        }
    }

    /// Lowest common ancestors of `a` and `b`: common ancestors (each operator
    /// counting as its own ancestor) that have no common descendant which is
    /// itself a common ancestor.
    #[must_use]
    pub fn find_lcas(&self, a: OperatorId, b: OperatorId) -> Vec<OperatorId> {
        let (Some(ia), Some(ib)) = (self.get(a), self.get(b)) else {
            return Vec::new();
        };
        let mut common = self.ancestors[ia as usize].clone();
        common.insert(ia);
        let mut other = self.ancestors[ib as usize].clone();
        other.insert(ib);
        common &= other;

        let mut lcas = Vec::new();
        while let Some(id) = common.max() {
            common.remove(id);
            common -= &self.ancestors[id as usize];
            lcas.extend(self.operator(id));
        }
        lcas.reverse();
        lcas
    }
}
