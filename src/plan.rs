//! User-facing plans.
//!
//! A [`Plan`] describes one task type and where its parameters come from:
//! constants, or the outputs of other plans. Plans compose into a DAG; a plan
//! referenced from several places is computed once, so its consumers are
//! joined on it rather than multiplied. [`Plan::copy`] gives a plan a new
//! identity (its outputs then combine as a product), and [`Plan::add_join`]
//! unifies copies again.
//!
//! Plan data is shared between copies and cloned on the first mutation.

use crate::dot::write_dot;
use crate::error::PlanError;
use crate::mapping::{Mappings, PlanReference};
use crate::planner::{PhysicalPlan, PlanExplanation, build_plan};
use crate::runner::{Execution, RunOptions};
use crate::task::TaskFactory;
use crate::value::Document;
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a plan. Copies get a fresh one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PlanId(u64);

impl PlanId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PlanData {
    pub(crate) factory: TaskFactory,
    /// Alternative mapping sets; each contributes task nodes to the output.
    pub(crate) alternatives: Vec<Mappings>,
    /// Declared joins: each a list of paths that must denote the same plan.
    pub(crate) joins: Vec<Vec<Vec<Plan>>>,
    /// Paths of the plans the output is grouped by; empty groups everything.
    pub(crate) group_by: Option<Vec<Vec<Plan>>>,
}

struct PlanInner {
    id: PlanId,
    data: Mutex<Arc<PlanData>>,
}

/// A task together with the mappings of its parameters.
///
/// Cloning a `Plan` yields another handle on the same plan (same identity);
/// use [`Plan::copy`] for a distinct plan with the same definition.
#[derive(Clone)]
pub struct Plan {
    inner: Arc<PlanInner>,
}

impl Plan {
    /// Create a plan running `factory` with the given mappings.
    ///
    /// ```
    /// use ironplan::Plan;
    /// use ironplan::mapping::Mappings;
    /// use ironplan::testing::identity_task;
    ///
    /// let plan = Plan::new(identity_task(), Mappings::values("x", [1, 2]));
    /// let values = plan.collect_seq().unwrap();
    /// assert_eq!(values.len(), 2);
    /// ```
    #[must_use]
    pub fn new(factory: TaskFactory, mappings: Mappings) -> Self {
        Self::from_data(Arc::new(PlanData {
            factory,
            alternatives: vec![mappings],
            joins: Vec::new(),
            group_by: None,
        }))
    }

    fn from_data(data: Arc<PlanData>) -> Self {
        Self {
            inner: Arc::new(PlanInner {
                id: PlanId::next(),
                data: Mutex::new(data),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> PlanId {
        self.inner.id
    }

    pub(crate) fn data(&self) -> Arc<PlanData> {
        let guard = self.inner.data.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn update<R>(&self, f: impl FnOnce(&mut PlanData) -> R) -> R {
        let mut guard = self.inner.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    #[must_use]
    pub fn factory(&self) -> TaskFactory {
        self.data().factory.clone()
    }

    /// A new plan with the same definition and a new identity.
    ///
    /// The definition is shared until either plan is modified.
    #[must_use]
    pub fn copy(&self) -> Plan {
        Self::from_data(self.data())
    }

    /// Whether both plans currently share the same definition.
    #[must_use]
    pub fn shares_data_with(&self, other: &Plan) -> bool {
        Arc::ptr_eq(&self.data(), &other.data())
    }

    /// Add an alternative set of mappings.
    pub fn add(&self, mappings: Mappings) {
        self.update(|data| data.alternatives.push(mappings));
    }

    /// Reference this plan's outputs narrowed by a JSON Pointer.
    #[must_use]
    pub fn path(&self, pointer: impl Into<String>) -> PlanReference {
        PlanReference::new(self).path(pointer)
    }

    /// Plans directly referenced by this plan's mappings.
    #[must_use]
    pub fn sub_plans(&self) -> Vec<Plan> {
        let mut found = IndexMap::new();
        for alternative in &self.data().alternatives {
            for plan in alternative.plans() {
                found.entry(plan.id()).or_insert(plan);
            }
        }
        found.into_values().collect()
    }

    /// Follow `path` from this plan, each step a direct sub-plan of the previous.
    #[must_use]
    pub fn resolve(&self, path: &[Plan]) -> Option<Plan> {
        if path.is_empty() {
            return None;
        }
        let mut current = self.clone();
        for step in path {
            if !current.sub_plans().iter().any(|p| p.id() == step.id()) {
                return None;
            }
            current = step.clone();
        }
        Some(current)
    }

    fn check_paths(&self, paths: &[Vec<Plan>]) -> Result<()> {
        for path in paths {
            if self.resolve(path).is_none() {
                return Err(PlanError::MissingPath {
                    plan: self.to_string(),
                    path: path.iter().map(ToString::to_string).collect(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Declare that the plans at the end of `paths` are one and the same, so
    /// their outputs are joined rather than multiplied.
    ///
    /// # Errors
    ///
    /// [`PlanError::InvalidJoin`] with fewer than two paths,
    /// [`PlanError::MissingPath`] if a path does not resolve.
    pub fn add_join(&self, paths: Vec<Vec<Plan>>) -> Result<()> {
        if paths.len() < 2 {
            return Err(PlanError::InvalidJoin {
                reason: format!("a join needs at least two paths, got {}", paths.len()),
            }
            .into());
        }
        self.check_paths(&paths)?;
        self.update(|data| data.joins.push(paths));
        Ok(())
    }

    /// Group this plan's outputs by the plans at the end of `paths`: one
    /// output per combination of their values, holding the array of the
    /// grouped documents. With no paths, everything forms a single group.
    ///
    /// # Errors
    ///
    /// [`PlanError::MissingPath`] if a path does not resolve.
    pub fn group_by(&self, paths: Vec<Vec<Plan>>) -> Result<()> {
        self.check_paths(&paths)?;
        self.update(|data| data.group_by = Some(paths));
        Ok(())
    }

    /// Build the physical plan.
    ///
    /// # Errors
    ///
    /// Planning errors.
    pub fn build(&self) -> Result<PhysicalPlan> {
        build_plan(self)
    }

    /// Run with default options.
    ///
    /// # Errors
    ///
    /// Planning and initialization errors. Execution errors are reported by
    /// the returned iterator.
    pub fn run(&self) -> Result<PlanRun> {
        self.run_with(RunOptions::default())
    }

    /// Run with the given options.
    ///
    /// # Errors
    ///
    /// Planning and initialization errors.
    pub fn run_with(&self, options: RunOptions) -> Result<PlanRun> {
        let physical = self.build()?;
        debug!(plan = %self, operators = physical.graph.len(), "running plan");
        Ok(PlanRun {
            execution: physical.run(options)?,
        })
    }

    /// Run to completion and collect the output documents.
    ///
    /// # Errors
    ///
    /// Any planning or execution error.
    pub fn collect_seq(&self) -> Result<Vec<JsonValue>> {
        self.run()?.collect_values()
    }

    /// Write the physical plan in DOT form.
    ///
    /// # Errors
    ///
    /// Planning errors or I/O errors from `out`.
    pub fn print_plan(&self, out: &mut impl Write) -> Result<()> {
        self.build()?.write_dot(out)
    }

    /// Explain the physical plan.
    ///
    /// # Errors
    ///
    /// Planning errors.
    pub fn explain(&self) -> Result<PlanExplanation> {
        Ok(self.build()?.explain())
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Plan {}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.data().factory.id(), self.id().raw())
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id())
            .field("task", &self.data().factory.id())
            .finish_non_exhaustive()
    }
}

/// A running plan, yielding output documents lazily.
pub struct PlanRun {
    execution: Execution,
}

impl PlanRun {
    #[must_use]
    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Drain the remaining outputs.
    ///
    /// # Errors
    ///
    /// The first execution error encountered.
    pub fn collect_values(self) -> Result<Vec<JsonValue>> {
        self.map(|doc| doc.map(|d| d.as_ref().clone())).collect()
    }

    /// Write the physical plan with the output counts gathered so far, when
    /// counting is enabled.
    ///
    /// # Errors
    ///
    /// I/O errors from `out`.
    pub fn write_dot(&self, out: &mut impl Write) -> Result<()> {
        let counts = self.execution.counts();
        write_dot(
            self.execution.graph(),
            self.execution.root(),
            counts.as_ref(),
            out,
        )?;
        Ok(())
    }
}

impl Iterator for PlanRun {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.execution.next().map(|value| {
            let value = value?;
            value
                .node(0)
                .cloned()
                .ok_or_else(|| anyhow!("plan output {} carries no document", value.id))
        })
    }
}
