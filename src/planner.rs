//! Planner: turns a [`Plan`] description into a physical operator graph.
//!
//! For every plan reached from the root, the planner:
//!
//! 1. **Declares joins** -- plans reached through joined paths are unified in
//!    the [`PlanMap`] so they are built into a single operator. A plan
//!    referenced from several places is always built once.
//! 2. **Splits alternatives** -- every combination of sub-plan references in
//!    the plan's mappings becomes its own task node.
//! 3. **Merges inputs** -- the operators feeding one task node are combined
//!    by the [`DimensionTrie`]: joined on their lowest common ancestors when
//!    they share any, multiplied otherwise.
//! 4. **Unions and groups** -- branches are concatenated, and a declared
//!    group-by sorts and groups the result.
//!
//! A final pass collapses single-input unions and products and drops empty
//! sorts. Every merge and rewrite is recorded as an [`OptimizationDecision`].

mod explain;
mod operator_map;
mod plan_map;
mod trie;

pub use explain::{ExplainStep, PlanExplanation, PlanSummary};
pub use operator_map::OperatorMap;
pub use plan_map::PlanMap;
pub use trie::{DimensionTrie, MergeResult, MergeStep, TrieNode};

use crate::error::PlanError;
use crate::mapping::Mappings;
use crate::operator::{OperatorGraph, OperatorKind};
use crate::operator_id::OperatorId;
use crate::order::Order;
use crate::plan::{Plan, PlanId};
use crate::runner::{Execution, RunOptions};
use anyhow::{Result, anyhow, bail};
use indexmap::{IndexMap, IndexSet};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tracing::debug;

/// Represents a decision made by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationDecision {
    /// Inputs of a task were merged into one operator.
    MergedInputs {
        /// Task the inputs feed.
        task: String,
        /// Number of operators merged in this step.
        participants: usize,
        /// Number of streams joined on; zero for a cartesian product.
        dimensions: usize,
    },
    /// Unions with a single input were replaced by that input.
    CollapsedUnions { count: usize },
    /// Products with a single input were replaced by that input.
    CollapsedProducts { count: usize },
    /// Sorts with an empty order were dropped.
    DroppedEmptyOrderBy { count: usize },
}

/// A physical plan: operator graph, root, and the planner's decisions.
#[derive(Clone, Debug)]
pub struct PhysicalPlan {
    pub graph: OperatorGraph,
    pub root: OperatorId,
    pub optimizations: Vec<OptimizationDecision>,
}

impl PhysicalPlan {
    /// Start executing the plan.
    ///
    /// # Errors
    ///
    /// If the graph fails to initialize.
    pub fn run(self, options: RunOptions) -> Result<Execution> {
        Execution::start(self.graph, self.root, options)
    }

    /// Write the initialized graph in DOT form.
    ///
    /// # Errors
    ///
    /// If the graph fails to initialize or `out` fails.
    pub fn write_dot(&self, out: &mut impl Write) -> Result<()> {
        let mut graph = self.graph.clone();
        graph.init(self.root)?;
        crate::dot::write_dot(&graph, self.root, None, out)?;
        Ok(())
    }
}

/// Build the physical plan of `plan`.
///
/// # Errors
///
/// Structural, join-consistency and mapping errors found while planning.
pub fn build_plan(plan: &Plan) -> Result<PhysicalPlan> {
    let mut builder = PlanBuilder::default();
    let root = builder.plan_graph(plan)?;
    let PlanBuilder {
        mut graph,
        mut decisions,
        ..
    } = builder;
    let (root, rewrites) = simplify(&mut graph, root);
    decisions.extend(rewrites);
    debug!(%root, operators = graph.reachable(root).len(), "built physical plan");
    Ok(PhysicalPlan {
        graph,
        root,
        optimizations: decisions,
    })
}

#[derive(Default)]
struct PlanBuilder {
    graph: OperatorGraph,
    map: PlanMap,
    decisions: Vec<OptimizationDecision>,
    building: HashSet<PlanId>,
}

fn describe(path: &[Plan]) -> Vec<String> {
    path.iter().map(ToString::to_string).collect()
}

impl PlanBuilder {
    fn plan_graph(&mut self, plan: &Plan) -> Result<OperatorId> {
        let node = self.map.node(plan.id());
        if let Some(op) = self.map.get(node) {
            return Ok(op);
        }
        if !self.building.insert(plan.id()) {
            bail!("plan {plan} depends on itself");
        }
        let data = plan.data();

        for paths in &data.joins {
            self.declare_join(plan, paths)?;
        }

        let mut tasks = Vec::new();
        for branch in data.alternatives.iter().flat_map(Mappings::branches) {
            let mut inputs: IndexMap<PlanId, OperatorId> = IndexMap::new();
            for sub in branch.plans() {
                let op = self.plan_graph(&sub)?;
                inputs.insert(sub.id(), op);
            }
            let distinct: IndexSet<OperatorId> = inputs.values().copied().collect();
            let (parent, positions) = self.merge_inputs(data.factory.id(), &distinct)?;
            let mappings = branch.resolve(&|p: &Plan| {
                inputs
                    .get(&p.id())
                    .and_then(|op| positions.get(op))
                    .copied()
            })?;
            tasks.push(self.graph.task(data.factory.clone(), mappings, parent));
        }
        let mut output = self.graph.union(tasks);

        if let Some(paths) = &data.group_by {
            let operators = paths
                .iter()
                .map(|path| self.resolve_path(plan, path))
                .collect::<Result<Vec<_>>>()?;
            let sorted = self
                .graph
                .order_by(output, Order::of(operators.iter().copied()));
            output = self.graph.group_by(sorted, operators);
        }

        debug!(%plan, %output, "planned");
        self.map.set(node, output);
        self.building.remove(&plan.id());
        Ok(output)
    }

    fn declare_join(&mut self, plan: &Plan, paths: &[Vec<Plan>]) -> Result<()> {
        if paths.len() < 2 {
            return Err(PlanError::InvalidJoin {
                reason: format!("a join needs at least two paths, {plan} declares {}", paths.len()),
            }
            .into());
        }
        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            let target = plan.resolve(path).ok_or_else(|| PlanError::MissingPath {
                plan: plan.to_string(),
                path: describe(path),
            })?;
            targets.push(target);
        }

        let reference = &targets[0];
        let reference_node = self.map.node(reference.id());
        for target in &targets[1..] {
            if !target.shares_data_with(reference) {
                return Err(PlanError::InconsistentJoin {
                    expected: reference.to_string(),
                    found: target.to_string(),
                }
                .into());
            }
            let node = self.map.node(target.id());
            self.map.join(reference_node, node)?;
        }
        Ok(())
    }

    /// Operator of the plan at the end of `path`, which must already be built.
    fn resolve_path(&mut self, plan: &Plan, path: &[Plan]) -> Result<OperatorId> {
        let missing = || PlanError::MissingPath {
            plan: plan.to_string(),
            path: describe(path),
        };
        let target = plan.resolve(path).ok_or_else(missing)?;
        let node = self.map.find(target.id()).ok_or_else(missing)?;
        Ok(self.map.get(node).ok_or_else(missing)?)
    }

    /// Combine the operators feeding one task node into a single parent.
    fn merge_inputs(
        &mut self,
        task: &str,
        inputs: &IndexSet<OperatorId>,
    ) -> Result<(Option<OperatorId>, IndexMap<OperatorId, usize>)> {
        match inputs.len() {
            0 => return Ok((None, IndexMap::new())),
            1 => return Ok((Some(inputs[0]), IndexMap::from([(inputs[0], 0)]))),
            _ => {}
        }

        let mut op_map = OperatorMap::new();
        for &op in inputs {
            op_map.add(&self.graph, op);
        }
        let mut dimensions = vec![RoaringBitmap::new(); inputs.len()];
        for i in 0..inputs.len() {
            for j in i + 1..inputs.len() {
                for lca in op_map.find_lcas(inputs[i], inputs[j]) {
                    if let Some(id) = op_map.get(lca) {
                        dimensions[i].insert(id);
                        dimensions[j].insert(id);
                    }
                }
            }
        }

        let mut trie = DimensionTrie::new();
        for (&op, set) in inputs.iter().zip(dimensions) {
            trie.add(set, op);
        }
        let merged = trie
            .merge(&mut self.graph, &op_map)?
            .ok_or_else(|| anyhow!("merging the inputs of {task} left nothing"))?;
        self.decisions
            .extend(merged.steps.iter().map(|s| OptimizationDecision::MergedInputs {
                task: task.to_string(),
                participants: s.participants.len(),
                dimensions: s.dimensions.len(),
            }));
        Ok((Some(merged.operator), merged.positions))
    }
}

/// Replace single-input unions and products by their input, drop sorts with
/// an empty order, and rewire every reference accordingly.
fn simplify(graph: &mut OperatorGraph, root: OperatorId) -> (OperatorId, Vec<OptimizationDecision>) {
    let order = graph.reachable(root);
    let mut replacement: HashMap<OperatorId, OperatorId> = HashMap::new();
    let (mut unions, mut products, mut sorts) = (0, 0, 0);

    for &id in &order {
        let node = graph.node(id);
        let target = match (&node.kind, node.parents.as_slice()) {
            (OperatorKind::Union, [p]) => {
                unions += 1;
                Some(*p)
            }
            (OperatorKind::Product, [p]) => {
                products += 1;
                Some(*p)
            }
            (OperatorKind::OrderBy { order }, [p]) if order.is_empty() => {
                sorts += 1;
                Some(*p)
            }
            _ => None,
        };
        if let Some(p) = target {
            let resolved = replacement.get(&p).copied().unwrap_or(p);
            replacement.insert(id, resolved);
        }
    }

    let resolve = |id: OperatorId| replacement.get(&id).copied().unwrap_or(id);
    for &id in &order {
        if replacement.contains_key(&id) {
            continue;
        }
        let node = graph.node_mut(id);
        node.parents = node.parents.iter().map(|p| resolve(*p)).collect();
        node.kind.remap(resolve);
    }

    let mut decisions = Vec::new();
    if unions > 0 {
        decisions.push(OptimizationDecision::CollapsedUnions { count: unions });
    }
    if products > 0 {
        decisions.push(OptimizationDecision::CollapsedProducts { count: products });
    }
    if sorts > 0 {
        decisions.push(OptimizationDecision::DroppedEmptyOrderBy { count: sorts });
    }
    (resolve(root), decisions)
}
