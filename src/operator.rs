//! The operator graph: a DAG of plan operators held in an arena.
//!
//! Operators are added with the builder methods on [`OperatorGraph`] and
//! referenced by [`OperatorId`]. Edges point from parents (inputs) to
//! children. Before execution, [`OperatorGraph::init`] walks the graph reachable
//! from a root and computes, for every operator, which upstream streams its
//! descendants still need (its *context layout*) and how to locate them in
//! the parents' contexts.

use crate::error::PlanError;
use crate::mapping::Mapping;
use crate::operator_id::OperatorId;
use crate::order::Order;
use crate::task::TaskFactory;
use crate::value::{Document, document};
use anyhow::{Result, bail};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{debug, trace};

/// The operator variants of a plan graph.
#[derive(Clone, Debug)]
pub enum OperatorKind {
    /// Emits a fixed list of documents.
    Constant { values: Vec<Document> },
    /// Instantiates and runs a task for every upstream value and mapping.
    Task {
        factory: TaskFactory,
        mappings: Vec<Mapping>,
    },
    /// Cartesian product of the parents.
    Product,
    /// Equi-join of the parents on their positions in shared ancestor streams.
    Join { on: Vec<OperatorId> },
    /// Groups consecutive values agreeing on the positions of `operators`.
    GroupBy { operators: Vec<OperatorId> },
    /// Sorts the parent's output on the positions of the ordered streams.
    OrderBy { order: Order<OperatorId> },
    /// Concatenation of the parents' outputs.
    Union,
    /// Applies a JSON Pointer to every document, flattening arrays.
    Function { pointer: String },
}

impl OperatorKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "Constant",
            Self::Task { .. } => "Task",
            Self::Product => "Product",
            Self::Join { .. } => "Join",
            Self::GroupBy { .. } => "GroupBy",
            Self::OrderBy { .. } => "OrderBy",
            Self::Union => "Union",
            Self::Function { .. } => "Function",
        }
    }

    /// Streams this operator reads from its parents' contexts.
    #[must_use]
    pub fn requires(&self) -> Vec<OperatorId> {
        match self {
            Self::Join { on } => on.clone(),
            Self::GroupBy { operators } => operators.clone(),
            Self::OrderBy { order } => order.items(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn remap(&mut self, f: impl Fn(OperatorId) -> OperatorId) {
        match self {
            Self::Join { on } => remap_unique(on, &f),
            Self::GroupBy { operators } => remap_unique(operators, &f),
            Self::OrderBy { order } => order.remap(|id| f(*id)),
            _ => {}
        }
    }
}

fn remap_unique(ids: &mut Vec<OperatorId>, f: &impl Fn(OperatorId) -> OperatorId) {
    let remapped: IndexSet<OperatorId> = ids.iter().map(|id| f(*id)).collect();
    *ids = remapped.into_iter().collect();
}

/// Location of a stream position in a parent's context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamReference {
    /// Index of the parent.
    pub stream: usize,
    /// Index in that parent's context.
    pub index: usize,
}

/// An operator in the arena.
#[derive(Clone, Debug)]
pub struct OperatorNode {
    pub kind: OperatorKind,
    pub parents: Vec<OperatorId>,
    pub(crate) children: Vec<OperatorId>,
    /// Candidate sources per output context index; empty for the operator's own id.
    pub(crate) layout: Vec<Vec<StreamReference>>,
    pub(crate) streams: IndexMap<OperatorId, usize>,
    pub(crate) self_index: Option<usize>,
    /// Per parent, context indices of the streams the operator sorts, joins or groups on.
    pub(crate) keys: Vec<Vec<usize>>,
}

impl OperatorNode {
    fn new(kind: OperatorKind, parents: Vec<OperatorId>) -> Self {
        Self {
            kind,
            parents,
            children: Vec::new(),
            layout: Vec::new(),
            streams: IndexMap::new(),
            self_index: None,
            keys: Vec::new(),
        }
    }

    /// Streams tracked in this operator's output contexts, with their index.
    #[must_use]
    pub fn streams(&self) -> &IndexMap<OperatorId, usize> {
        &self.streams
    }

    /// Context index of `stream` in this operator's outputs.
    #[must_use]
    pub fn context_index(&self, stream: OperatorId) -> Option<usize> {
        self.streams.get(&stream).copied()
    }

    #[must_use]
    pub fn layout(&self) -> &[Vec<StreamReference>] {
        &self.layout
    }

    /// Whether descendants need this operator's own output positions.
    #[must_use]
    pub fn tracks_self(&self) -> bool {
        self.self_index.is_some()
    }

    #[must_use]
    pub fn children(&self) -> &[OperatorId] {
        &self.children
    }
}

/// Arena of operators.
#[derive(Clone, Debug, Default)]
pub struct OperatorGraph {
    nodes: Vec<OperatorNode>,
}

impl OperatorGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert an operator reading from `parents`.
    pub fn add(&mut self, kind: OperatorKind, parents: Vec<OperatorId>) -> OperatorId {
        let id = OperatorId::new(self.nodes.len());
        trace!(%id, kind = kind.name(), parents = parents.len(), "adding operator");
        self.nodes.push(OperatorNode::new(kind, parents));
        id
    }

    pub fn constant<V: Into<JsonValue>>(&mut self, values: impl IntoIterator<Item = V>) -> OperatorId {
        let values = values.into_iter().map(document).collect();
        self.add(OperatorKind::Constant { values }, Vec::new())
    }

    /// A task node. Without a parent, mappings may only bind constants.
    pub fn task(
        &mut self,
        factory: TaskFactory,
        mappings: Vec<Mapping>,
        parent: Option<OperatorId>,
    ) -> OperatorId {
        let mappings = if mappings.is_empty() {
            vec![Mapping::new()]
        } else {
            mappings
        };
        self.add(
            OperatorKind::Task { factory, mappings },
            parent.into_iter().collect(),
        )
    }

    pub fn product(&mut self, parents: Vec<OperatorId>) -> OperatorId {
        self.add(OperatorKind::Product, parents)
    }

    /// Join `parents` on the positions of the `on` streams. Each parent must
    /// be sorted on those streams, typically through [`Self::order_by`].
    pub fn join(&mut self, parents: Vec<OperatorId>, on: Vec<OperatorId>) -> OperatorId {
        self.add(OperatorKind::Join { on }, parents)
    }

    pub fn order_by(&mut self, parent: OperatorId, order: Order<OperatorId>) -> OperatorId {
        self.add(OperatorKind::OrderBy { order }, vec![parent])
    }

    pub fn group_by(&mut self, parent: OperatorId, operators: Vec<OperatorId>) -> OperatorId {
        self.add(OperatorKind::GroupBy { operators }, vec![parent])
    }

    pub fn union(&mut self, parents: Vec<OperatorId>) -> OperatorId {
        self.add(OperatorKind::Union, parents)
    }

    pub fn function(&mut self, parent: OperatorId, pointer: impl Into<String>) -> OperatorId {
        self.add(
            OperatorKind::Function {
                pointer: pointer.into(),
            },
            vec![parent],
        )
    }

    #[must_use]
    pub fn get(&self, id: OperatorId) -> Option<&OperatorNode> {
        self.nodes.get(id.index())
    }

    /// The operator behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` was not issued by this graph.
    #[must_use]
    pub fn node(&self, id: OperatorId) -> &OperatorNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: OperatorId) -> &mut OperatorNode {
        &mut self.nodes[id.index()]
    }

    /// Operators reachable from `root` through parent edges, parents before children.
    #[must_use]
    pub fn reachable(&self, root: OperatorId) -> Vec<OperatorId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for &parent in self.node(id).parents.iter().rev() {
                if !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }
        order
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: OperatorId, id: OperatorId) -> bool {
        ancestor != id && self.reachable(id).contains(&ancestor)
    }

    /// Compute children, context layouts and key indices for everything
    /// reachable from `root`.
    ///
    /// # Errors
    ///
    /// [`PlanError::MissingStream`] when an operator joins, sorts or groups on
    /// a stream none of its parents expose; a structural error when an
    /// operator has the wrong number of parents.
    pub fn init(&mut self, root: OperatorId) -> Result<()> {
        let order = self.reachable(root);

        for &id in &order {
            self.check_arity(id)?;
            self.node_mut(id).children.clear();
        }
        for &id in &order {
            for parent in self.node(id).parents.clone() {
                let children = &mut self.node_mut(parent).children;
                if !children.contains(&id) {
                    children.push(id);
                }
            }
        }

        // Streams needed by descendants, children first.
        let mut needed: IndexMap<OperatorId, IndexSet<OperatorId>> = IndexMap::new();
        for &id in order.iter().rev() {
            let mut set = IndexSet::new();
            for &child in &self.node(id).children {
                if let Some(child_needed) = needed.get(&child) {
                    set.extend(child_needed.iter().copied().filter(|s| *s != child));
                }
                set.extend(self.node(child).kind.requires());
            }
            set.sort();
            needed.insert(id, set);
        }

        for &id in &order {
            let parent_streams: Vec<IndexMap<OperatorId, usize>> = self
                .node(id)
                .parents
                .iter()
                .map(|p| self.node(*p).streams.clone())
                .collect();

            let mut layout = Vec::new();
            let mut streams = IndexMap::new();
            let mut self_index = None;
            let wanted = needed.get(&id).cloned().unwrap_or_default();
            for &stream in &wanted {
                if stream == id {
                    continue;
                }
                let sources: Vec<StreamReference> = parent_streams
                    .iter()
                    .enumerate()
                    .filter_map(|(i, m)| {
                        m.get(&stream).map(|&index| StreamReference { stream: i, index })
                    })
                    .collect();
                if !sources.is_empty() {
                    streams.insert(stream, layout.len());
                    layout.push(sources);
                }
            }
            if wanted.contains(&id) {
                self_index = Some(layout.len());
                streams.insert(id, layout.len());
                layout.push(Vec::new());
            }

            let keys = self.resolve_keys(id, &parent_streams)?;
            debug!(%id, kind = self.node(id).kind.name(), context = ?streams.keys().collect::<Vec<_>>(), "initialized operator");
            let node = self.node_mut(id);
            node.layout = layout;
            node.streams = streams;
            node.self_index = self_index;
            node.keys = keys;
        }
        Ok(())
    }

    fn check_arity(&self, id: OperatorId) -> Result<()> {
        let node = self.node(id);
        let count = node.parents.len();
        let ok = match node.kind {
            OperatorKind::Constant { .. } => count == 0,
            OperatorKind::Task { .. } => count <= 1,
            OperatorKind::GroupBy { .. }
            | OperatorKind::OrderBy { .. }
            | OperatorKind::Function { .. } => count == 1,
            OperatorKind::Join { .. } => count >= 2,
            OperatorKind::Product | OperatorKind::Union => true,
        };
        if !ok {
            bail!(
                "operator {id} ({}) cannot have {count} parent(s)",
                node.kind.name()
            );
        }
        Ok(())
    }

    fn resolve_keys(
        &self,
        id: OperatorId,
        parent_streams: &[IndexMap<OperatorId, usize>],
    ) -> Result<Vec<Vec<usize>>> {
        let locate = |streams: &IndexMap<OperatorId, usize>, wanted: &[OperatorId]| {
            wanted
                .iter()
                .map(|s| {
                    streams.get(s).copied().ok_or(PlanError::MissingStream {
                        operator: id,
                        stream: *s,
                    })
                })
                .collect::<Result<Vec<usize>, PlanError>>()
        };
        let required = self.node(id).kind.requires();
        match self.node(id).kind {
            OperatorKind::Join { .. } => Ok(parent_streams
                .iter()
                .map(|m| locate(m, &required))
                .collect::<Result<_, _>>()?),
            OperatorKind::GroupBy { .. } | OperatorKind::OrderBy { .. } => {
                Ok(vec![locate(&parent_streams[0], &required)?])
            }
            _ => Ok(Vec::new()),
        }
    }
}
