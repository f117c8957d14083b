//! # Ironplan
//!
//! A **lazy experiment-plan engine**. A plan describes a task together with
//! where its parameters come from: constant values or the outputs of other
//! plans. Ironplan turns a DAG of plans into a graph of operators and pulls
//! task instances out of it one by one, each with its parameters bound.
//!
//! ## Key Features
//!
//! - **Declarative plans** - tasks, constant values, alternatives and products of mappings
//! - **Shared ancestors are joined** - a plan reached through two paths is computed once
//!   and its consumers see only matching combinations
//! - **Explicit joins and copies** - [`Plan::copy`] asks for a cartesian product,
//!   [`Plan::add_join`] unifies copies again
//! - **Group-by** - collect outputs into arrays, per value of chosen ancestors
//! - **Lazy, memoized execution** - operators produce values on demand and share them
//!   between consumers
//! - **Explainable** - DOT output and a textual explanation of the physical plan
//!
//! ## Quick Start
//!
//! ```
//! use ironplan::Plan;
//! use ironplan::mapping::Mappings;
//! use ironplan::testing::{identity_task, mult_task, plus_task, sorted_i64};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let numbers = Plan::new(identity_task(), Mappings::values("x", [1, 2]));
//! let scaled = Plan::new(
//!     mult_task(),
//!     Mappings::product([Mappings::plan("x", &numbers), Mappings::values("y", [3, 5])]),
//! );
//!
//! // `numbers` feeds both parameters, so each sum only combines matching values.
//! let sums = Plan::new(
//!     plus_task(),
//!     Mappings::product([Mappings::plan("x", &numbers), Mappings::plan("y", &scaled)]),
//! );
//! assert_eq!(sorted_i64(&sums.collect_seq()?)?, vec![4, 6, 8, 12]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Plans and mappings
//!
//! A [`Plan`] pairs a [`TaskFactory`] with [`Mappings`](mapping::Mappings). Plans are
//! cheap handles: cloning one refers to the same plan, while [`Plan::copy`] creates a
//! new plan with the same definition.
//!
//! ### Operators
//!
//! The [`planner`] builds an [`OperatorGraph`] out of constants, tasks, products,
//! joins, sorts, groupings and unions. Every value flowing through the graph carries a
//! *context*: its position in each upstream stream that a later join or group-by
//! needs to match on.
//!
//! ### Execution
//!
//! The [`runner`] executes the graph lazily. Each operator keeps a log of the values
//! it produced, so an operator read by several consumers runs once.
//!
//! ## Architecture
//!
//! Ironplan uses a **deferred execution** model:
//! 1. Building plans creates a description only
//! 2. The [`planner`] turns it into an operator graph, merging inputs and simplifying
//! 3. [`OperatorGraph::init`] computes which context streams every operator carries
//! 4. The [`runner`] pulls values from the root operator on demand

pub mod dot;
pub mod error;
pub mod mapping;
pub mod operator;
pub mod operator_id;
pub mod order;
pub mod plan;
pub mod planner;
pub mod runner;
pub mod task;
pub mod testing;
pub mod value;

// General re-exports
pub use error::{ErrorKind, PlanError, error_kind};
pub use operator::{OperatorGraph, OperatorKind};
pub use operator_id::OperatorId;
pub use plan::{Plan, PlanId, PlanRun};
pub use planner::{PhysicalPlan, PlanExplanation, build_plan};
pub use runner::{Execution, RunOptions};
pub use task::{Input, Task, TaskFactory};
pub use value::{Document, UNBOUND, Value};
