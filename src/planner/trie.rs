//! Lattice of dimension sets driving the merge of a task's inputs.
//!
//! Each input operator is filed under its *dimension set*: the (dense ids of
//! the) lowest common ancestors it shares with the other inputs. The lattice
//! is kept closed under pairwise intersection, so the node for "the
//! dimensions shared by these inputs" always exists. The weight of a node is
//! the number of operators filed at or above it (under supersets).
//!
//! Merging walks greedily from the empty set towards the heaviest superset
//! with weight above one, then merges everything filed at or above the node
//! it stopped at: a product when the set is empty, otherwise a join on the
//! set's streams with every participant sorted on them. The merged operator
//! is filed under the union of its participants' sets and the walk repeats
//! until a single operator remains.

use super::operator_map::OperatorMap;
use crate::operator::OperatorGraph;
use crate::operator_id::OperatorId;
use crate::order::Order;
use anyhow::{Result, bail};
use indexmap::{IndexMap, IndexSet};
use roaring::RoaringBitmap;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct TrieNode {
    pub subset: RoaringBitmap,
    pub operators: IndexSet<OperatorId>,
}

/// One merge performed by [`DimensionTrie::merge_step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeStep {
    pub operator: OperatorId,
    pub participants: Vec<OperatorId>,
    /// Streams joined on; empty for a product.
    pub dimensions: Vec<OperatorId>,
}

/// Final operator of a merge, with the document position of every input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeResult {
    pub operator: OperatorId,
    pub positions: IndexMap<OperatorId, usize>,
    pub steps: Vec<MergeStep>,
}

#[derive(Clone, Debug)]
pub struct DimensionTrie {
    nodes: Vec<TrieNode>,
    /// Input operators whose documents each filed operator carries, in order.
    members: IndexMap<OperatorId, Vec<OperatorId>>,
}

impl Default for DimensionTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            members: IndexMap::new(),
        }
    }
}

impl DimensionTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn nodes(&self) -> &[TrieNode] {
        &self.nodes
    }

    fn find(&self, subset: &RoaringBitmap) -> Option<usize> {
        self.nodes.iter().position(|n| n.subset == *subset)
    }

    fn ensure(&mut self, subset: RoaringBitmap) -> usize {
        if let Some(i) = self.find(&subset) {
            return i;
        }
        self.nodes.push(TrieNode {
            subset,
            operators: IndexSet::new(),
        });
        self.nodes.len() - 1
    }

    /// File `op` under `subset`. Returns `false` if it was already there.
    pub fn add(&mut self, subset: RoaringBitmap, op: OperatorId) -> bool {
        let existing: Vec<RoaringBitmap> = self.nodes.iter().map(|n| n.subset.clone()).collect();
        let node = self.ensure(subset.clone());
        for other in existing {
            let meet = other & &subset;
            if !meet.is_empty() {
                self.ensure(meet);
            }
        }
        self.members.entry(op).or_insert_with(|| vec![op]);
        self.nodes[node].operators.insert(op)
    }

    /// Operators filed at `node` or under any superset of its set.
    #[must_use]
    pub fn weight(&self, node: usize) -> usize {
        let subset = &self.nodes[node].subset;
        self.nodes
            .iter()
            .filter(|n| n.subset.is_superset(subset))
            .map(|n| n.operators.len())
            .sum()
    }

    #[must_use]
    pub fn total_weight(&self) -> usize {
        self.weight(0)
    }

    /// Minimal strict supersets of `node`'s set.
    #[must_use]
    pub fn parents(&self, node: usize) -> Vec<usize> {
        let subset = &self.nodes[node].subset;
        let supersets: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| i != node && self.nodes[i].subset.is_superset(subset) && self.nodes[i].subset != *subset)
            .collect();
        supersets
            .iter()
            .copied()
            .filter(|&i| {
                !supersets.iter().any(|&j| {
                    j != i
                        && self.nodes[i].subset.is_superset(&self.nodes[j].subset)
                        && self.nodes[i].subset != self.nodes[j].subset
                })
            })
            .collect()
    }

    /// Perform one merge, or `None` when at most one operator is left.
    pub fn merge_step(&mut self, graph: &mut OperatorGraph, op_map: &OperatorMap) -> Option<MergeStep> {
        if self.total_weight() <= 1 {
            return None;
        }

        let mut current = 0;
        loop {
            let best = self
                .parents(current)
                .into_iter()
                .map(|p| (self.weight(p), p))
                .filter(|(w, _)| *w > 1)
                .fold(None, |best: Option<(usize, usize)>, (w, p)| match best {
                    Some((bw, _)) if bw >= w => best,
                    _ => Some((w, p)),
                });
            match best {
                Some((_, p)) => current = p,
                None => break,
            }
        }

        let target = self.nodes[current].subset.clone();
        let mut participants = Vec::new();
        let mut merged_subset = RoaringBitmap::new();
        for node in &mut self.nodes {
            if node.subset.is_superset(&target) {
                merged_subset |= &node.subset;
                participants.extend(node.operators.drain(..));
            }
        }

        let dimensions: Vec<OperatorId> = if target.is_empty() {
            Vec::new()
        } else {
            let mut order = Order::new();
            for id in &target {
                if let Some(op) = op_map.operator(id) {
                    order.add(op, false);
                }
            }
            order.prune(|a, b| op_map.is_ancestor(*a, *b));
            order.flatten();
            order.items()
        };

        let operator = if dimensions.is_empty() {
            graph.product(participants.clone())
        } else {
            let order = Order::of(dimensions.iter().copied());
            let sorted = participants
                .iter()
                .map(|&p| graph.order_by(p, order.clone()))
                .collect();
            graph.join(sorted, dimensions.clone())
        };
        debug!(%operator, ?participants, ?dimensions, "merged inputs");

        let mut carried = Vec::new();
        for p in &participants {
            carried.extend(self.members.shift_remove(p).unwrap_or_else(|| vec![*p]));
        }
        self.members.insert(operator, carried);
        self.add(merged_subset, operator);

        Some(MergeStep {
            operator,
            participants,
            dimensions,
        })
    }

    /// Merge until a single operator remains.
    ///
    /// # Errors
    ///
    /// If the lattice ends with more than one operator.
    pub fn merge(
        &mut self,
        graph: &mut OperatorGraph,
        op_map: &OperatorMap,
    ) -> Result<Option<MergeResult>> {
        let mut steps = Vec::new();
        while let Some(step) = self.merge_step(graph, op_map) {
            steps.push(step);
        }
        let remaining: Vec<OperatorId> = self
            .nodes
            .iter()
            .flat_map(|n| n.operators.iter().copied())
            .collect();
        match remaining.as_slice() {
            [] => Ok(None),
            [operator] => {
                let positions = self
                    .members
                    .get(operator)
                    .cloned()
                    .unwrap_or_else(|| vec![*operator])
                    .into_iter()
                    .enumerate()
                    .map(|(i, op)| (op, i))
                    .collect();
                Ok(Some(MergeResult {
                    operator: *operator,
                    positions,
                    steps,
                }))
            }
            _ => bail!("merging left {} operators", remaining.len()),
        }
    }
}
