//! Human-readable explanation of a physical plan.

use super::{OptimizationDecision, PhysicalPlan};
use crate::operator::OperatorKind;
use crate::operator_id::OperatorId;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Detailed explanation of a physical plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanExplanation {
    /// Operators reachable from the root, inputs first.
    pub steps: Vec<ExplainStep>,
    pub summary: PlanSummary,
    pub optimizations: Vec<OptimizationDecision>,
}

/// A single operator of the plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainStep {
    pub step: usize,
    pub operator: OperatorId,
    pub node_type: String,
    pub description: String,
    pub parents: Vec<OperatorId>,
    /// Whether the operator materializes its whole input before emitting.
    pub is_barrier: bool,
}

/// Operator counts for the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub total_ops: usize,
    pub tasks: usize,
    pub joins: usize,
    pub products: usize,
    pub barriers: usize,
}

fn list(ids: &[OperatorId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PhysicalPlan {
    /// Generate an explanation of the plan: its operators in execution
    /// order, a summary, and the planner's decisions.
    #[must_use]
    pub fn explain(&self) -> PlanExplanation {
        let mut summary = PlanSummary::default();
        let mut steps = Vec::new();

        for (idx, id) in self.graph.reachable(self.root).into_iter().enumerate() {
            let node = self.graph.node(id);
            summary.total_ops += 1;
            let mut is_barrier = false;
            let description = match &node.kind {
                OperatorKind::Constant { values } => {
                    format!("Emit {} constant document(s)", values.len())
                }
                OperatorKind::Task { factory, mappings } => {
                    summary.tasks += 1;
                    let per = if node.parents.is_empty() {
                        ""
                    } else {
                        " per upstream value"
                    };
                    format!(
                        "Run task `{}` with {} binding(s){per}",
                        factory.id(),
                        mappings.len()
                    )
                }
                OperatorKind::Product => {
                    summary.products += 1;
                    format!("Cartesian product of {} inputs", node.parents.len())
                }
                OperatorKind::Join { on } => {
                    summary.joins += 1;
                    format!("Join {} inputs on [{}]", node.parents.len(), list(on))
                }
                OperatorKind::GroupBy { operators } if operators.is_empty() => {
                    "Group all values".to_string()
                }
                OperatorKind::GroupBy { operators } => {
                    format!("Group consecutive values by [{}]", list(operators))
                }
                OperatorKind::OrderBy { order } => {
                    summary.barriers += 1;
                    is_barrier = true;
                    format!("Sort on [{}] (BARRIER)", list(&order.items()))
                }
                OperatorKind::Union => format!("Concatenate {} inputs", node.parents.len()),
                OperatorKind::Function { pointer } => format!("Select {pointer}"),
            };
            steps.push(ExplainStep {
                step: idx + 1,
                operator: id,
                node_type: node.kind.name().to_string(),
                description,
                parents: node.parents.clone(),
                is_barrier,
            });
        }

        PlanExplanation {
            steps,
            summary,
            optimizations: self.optimizations.clone(),
        }
    }
}

impl Display for PlanExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "╔═══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                 PHYSICAL PLAN EXPLANATION                     ║"
        )?;
        writeln!(
            f,
            "╚═══════════════════════════════════════════════════════════════╝"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ SUMMARY ────────────────────────────────────────────────────┐"
        )?;
        writeln!(f, "│ Total Operators:   {:>10}", self.summary.total_ops)?;
        writeln!(f, "│ Tasks:             {:>10}", self.summary.tasks)?;
        writeln!(f, "│ Joins:             {:>10}", self.summary.joins)?;
        writeln!(f, "│ Products:          {:>10}", self.summary.products)?;
        writeln!(f, "│ Barrier Ops:       {:>10}", self.summary.barriers)?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ OPERATORS ──────────────────────────────────────────────────┐"
        )?;
        for step in &self.steps {
            let barrier_marker = if step.is_barrier { " [BARRIER]" } else { "" };
            writeln!(f, "│")?;
            writeln!(
                f,
                "│ Step {}: {} {}{}",
                step.step, step.node_type, step.operator, barrier_marker
            )?;
            writeln!(f, "│   {}", step.description)?;
            if !step.parents.is_empty() {
                writeln!(f, "│   Inputs: {}", list(&step.parents))?;
            }
        }
        writeln!(f, "│")?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;

        if !self.optimizations.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "┌─ PLANNER DECISIONS ──────────────────────────────────────────┐"
            )?;
            for opt in &self.optimizations {
                match opt {
                    OptimizationDecision::MergedInputs {
                        task,
                        participants,
                        dimensions,
                    } => {
                        if *dimensions == 0 {
                            writeln!(f, "│ • Product of Task Inputs")?;
                            writeln!(f, "│   {participants} inputs of `{task}` share no ancestor")?;
                        } else {
                            writeln!(f, "│ • Join of Task Inputs")?;
                            writeln!(
                                f,
                                "│   {participants} inputs of `{task}` joined on {dimensions} shared stream(s)"
                            )?;
                        }
                    }
                    OptimizationDecision::CollapsedUnions { count } => {
                        writeln!(f, "│ • Collapsed Single-Input Unions")?;
                        writeln!(f, "│   Removed {count} union(s)")?;
                    }
                    OptimizationDecision::CollapsedProducts { count } => {
                        writeln!(f, "│ • Collapsed Single-Input Products")?;
                        writeln!(f, "│   Removed {count} product(s)")?;
                    }
                    OptimizationDecision::DroppedEmptyOrderBy { count } => {
                        writeln!(f, "│ • Dropped Empty Sorts")?;
                        writeln!(f, "│   Removed {count} sort(s) with nothing to order on")?;
                    }
                }
            }
            writeln!(
                f,
                "└──────────────────────────────────────────────────────────────┘"
            )?;
        }

        Ok(())
    }
}
