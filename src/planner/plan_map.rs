//! Plan identities and the operators built for them.
//!
//! A plan referenced from several places is built once: every reference to
//! the same [`PlanId`] resolves to the same operator, which is what makes
//! downstream inputs share ancestors and get joined instead of multiplied.
//! Declared joins unify distinct plans (typically a plan and its copies) in a
//! union-find so that they, too, resolve to one operator.

use crate::error::PlanError;
use crate::operator_id::OperatorId;
use crate::plan::PlanId;
use anyhow::Result;
use egglog_union_find::UnionFind;
use indexmap::IndexMap;
use std::fmt;

#[derive(Clone, Default)]
pub struct PlanMap {
    ids: IndexMap<PlanId, usize>,
    /// Operator built for each node, valid at canonical representatives only
    operators: Vec<Option<OperatorId>>,
    uf: UnionFind<usize>,
}

impl fmt::Debug for PlanMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanMap")
            .field("ids", &self.ids)
            .field("operators", &self.operators)
            .finish_non_exhaustive()
    }
}

impl PlanMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical node of `plan`, registering it if needed.
    pub fn node(&mut self, plan: PlanId) -> usize {
        let node = match self.ids.get(&plan) {
            Some(&node) => node,
            None => {
                let node = self.operators.len();
                self.operators.push(None);
                self.ids.insert(plan, node);
                node
            }
        };
        self.uf.find(node)
    }

    /// Canonical node of `plan`, if registered.
    pub fn find(&mut self, plan: PlanId) -> Option<usize> {
        let node = self.ids.get(&plan).copied()?;
        Some(self.uf.find(node))
    }

    pub fn get(&mut self, node: usize) -> Option<OperatorId> {
        let root = self.uf.find(node);
        self.operators[root]
    }

    pub fn set(&mut self, node: usize, operator: OperatorId) {
        let root = self.uf.find(node);
        self.operators[root] = Some(operator);
    }

    /// Declare that nodes `a` and `b` denote the same plan.
    ///
    /// # Errors
    ///
    /// [`PlanError::InvalidJoin`] when both sides were already built into
    /// different operators.
    pub fn join(&mut self, a: usize, b: usize) -> Result<()> {
        let (ra, rb) = (self.uf.find(a), self.uf.find(b));
        if ra == rb {
            return Ok(());
        }
        let operator = match (self.operators[ra], self.operators[rb]) {
            (Some(x), Some(y)) if x != y => {
                return Err(PlanError::InvalidJoin {
                    reason: format!("plans already built as {x} and {y}"),
                }
                .into());
            }
            (x, y) => x.or(y),
        };
        let (root, _) = self.uf.union(ra, rb);
        self.operators[root] = operator;
        Ok(())
    }

    /// Whether two registered plans resolve to the same node.
    pub fn same(&mut self, a: PlanId, b: PlanId) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
