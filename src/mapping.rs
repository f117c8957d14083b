//! Parameter mappings.
//!
//! A plan declares, per parameter, where its values come from: constants or
//! the outputs of other plans (optionally narrowed by a JSON Pointer access
//! path). Declarations compose as [`Mappings::Product`] (all parameters
//! together) and [`Mappings::Alternative`] (either set).
//!
//! Once the planner has wired the referenced plans into an operator, the
//! declarations are resolved into concrete [`Mapping`]s whose [`Binding`]s
//! point at document positions in the task's upstream value.

use crate::error::PlanError;
use crate::plan::{Plan, PlanId};
use crate::task::Task;
use crate::value::{Document, Value, document};
use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Reference to the output of another plan.
#[derive(Clone, Debug)]
pub struct PlanReference {
    pub plan: Plan,
    /// JSON Pointer applied to each output document of `plan`.
    pub path: Option<String>,
}

impl PlanReference {
    #[must_use]
    pub fn new(plan: &Plan) -> Self {
        Self {
            plan: plan.clone(),
            path: None,
        }
    }

    /// Narrow each output document with a JSON Pointer (e.g. `/result/score`).
    #[must_use]
    pub fn path(mut self, pointer: impl Into<String>) -> Self {
        self.path = Some(pointer.into());
        self
    }
}

impl From<&Plan> for PlanReference {
    fn from(plan: &Plan) -> Self {
        Self::new(plan)
    }
}

/// Where the values of a parameter come from.
#[derive(Clone, Debug)]
pub enum Source {
    Value(Document),
    Plan(PlanReference),
}

impl From<&Plan> for Source {
    fn from(plan: &Plan) -> Self {
        Self::Plan(PlanReference::new(plan))
    }
}

impl From<PlanReference> for Source {
    fn from(reference: PlanReference) -> Self {
        Self::Plan(reference)
    }
}

impl From<JsonValue> for Source {
    fn from(value: JsonValue) -> Self {
        Self::Value(document(value))
    }
}

/// Declared parameter mappings of a plan.
#[derive(Clone, Debug)]
pub enum Mappings {
    /// One parameter and the sources of its values; each source is an alternative.
    Simple { name: String, sources: Vec<Source> },
    /// All children bound together: the cartesian product of their bindings.
    Product(Vec<Mappings>),
    /// Any of the children: the concatenation of their bindings.
    Alternative(Vec<Mappings>),
}

impl Mappings {
    pub fn simple<S: Into<Source>>(
        name: impl Into<String>,
        sources: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::Simple {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// A parameter taking each of the given constant values.
    pub fn values<V: Into<JsonValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::simple(name, values.into_iter().map(|v| Source::from(v.into())))
    }

    /// A parameter taking one constant value.
    pub fn value(name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::values(name, [value])
    }

    /// A parameter taking the outputs of another plan.
    pub fn plan(name: impl Into<String>, reference: impl Into<PlanReference>) -> Self {
        Self::simple(name, [Source::Plan(reference.into())])
    }

    pub fn product(children: impl IntoIterator<Item = Mappings>) -> Self {
        Self::Product(children.into_iter().collect())
    }

    pub fn alternative(children: impl IntoIterator<Item = Mappings>) -> Self {
        Self::Alternative(children.into_iter().collect())
    }

    /// Plans referenced anywhere in these mappings, deduplicated by identity.
    #[must_use]
    pub fn plans(&self) -> Vec<Plan> {
        let mut found = IndexMap::new();
        self.collect_plans(&mut found);
        found.into_values().collect()
    }

    fn collect_plans(&self, found: &mut IndexMap<PlanId, Plan>) {
        match self {
            Self::Simple { sources, .. } => {
                for source in sources {
                    if let Source::Plan(r) = source {
                        found.entry(r.plan.id()).or_insert_with(|| r.plan.clone());
                    }
                }
            }
            Self::Product(children) | Self::Alternative(children) => {
                for child in children {
                    child.collect_plans(found);
                }
            }
        }
    }

    /// Split into branches, each drawing from a single combination of plan
    /// references.
    ///
    /// Constant sources of a parameter stay together; every plan reference
    /// becomes its own branch. Products distribute over the branches of their
    /// children.
    #[must_use]
    pub fn branches(&self) -> Vec<Mappings> {
        match self {
            Self::Simple { name, sources } => {
                let (constants, plans): (Vec<_>, Vec<_>) = sources
                    .iter()
                    .cloned()
                    .partition(|s| matches!(s, Source::Value(_)));
                let mut out = Vec::new();
                if !constants.is_empty() {
                    out.push(Self::Simple {
                        name: name.clone(),
                        sources: constants,
                    });
                }
                out.extend(plans.into_iter().map(|p| Self::Simple {
                    name: name.clone(),
                    sources: vec![p],
                }));
                out
            }
            Self::Product(children) => {
                let mut combos: Vec<Vec<Mappings>> = vec![Vec::new()];
                for child in children {
                    let branches = child.branches();
                    combos = combos
                        .into_iter()
                        .flat_map(|prefix| {
                            branches.iter().map(move |b| {
                                let mut combo = prefix.clone();
                                combo.push(b.clone());
                                combo
                            })
                        })
                        .collect();
                }
                combos.into_iter().map(Self::Product).collect()
            }
            Self::Alternative(children) => children.iter().flat_map(Self::branches).collect(),
        }
    }

    /// Resolve into concrete mappings, locating each referenced plan's
    /// documents through `locate`.
    ///
    /// # Errors
    ///
    /// Fails when `locate` does not know a referenced plan.
    pub fn resolve(&self, locate: &impl Fn(&Plan) -> Option<usize>) -> Result<Vec<Mapping>> {
        match self {
            Self::Simple { name, sources } => sources
                .iter()
                .map(|source| -> Result<Mapping> {
                    let binding = match source {
                        Source::Value(v) => Binding::Value(v.clone()),
                        Source::Plan(r) => Binding::Node {
                            index: locate(&r.plan).ok_or_else(|| PlanError::MissingPath {
                                plan: r.plan.to_string(),
                                path: vec![r.plan.to_string()],
                            })?,
                            path: r.path.clone(),
                        },
                    };
                    Ok(Mapping::new().with(name.clone(), binding))
                })
                .collect(),
            Self::Product(children) => {
                let mut out = vec![Mapping::new()];
                for child in children {
                    let resolved = child.resolve(locate)?;
                    out = out
                        .iter()
                        .flat_map(|prefix| resolved.iter().map(move |m| prefix.merged(m)))
                        .collect();
                }
                Ok(out)
            }
            Self::Alternative(children) => {
                let mut out = Vec::new();
                for child in children {
                    out.extend(child.resolve(locate)?);
                }
                Ok(out)
            }
        }
    }
}

/// Where a resolved parameter takes its value from.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    Value(Document),
    /// Document `index` of the upstream value, optionally narrowed by a JSON Pointer.
    Node { index: usize, path: Option<String> },
}

impl Binding {
    #[must_use]
    pub fn node(index: usize) -> Self {
        Self::Node { index, path: None }
    }

    /// Evaluate against an upstream value.
    ///
    /// # Errors
    ///
    /// [`PlanError::Evaluation`] if the document is absent or the access path
    /// selects nothing.
    pub fn evaluate(&self, upstream: &Value) -> Result<Document> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Node { index, path } => {
                let node = upstream.node(*index).ok_or_else(|| {
                    PlanError::evaluation(
                        format!("#{index}"),
                        format!("upstream value has {} documents", upstream.nodes.len()),
                    )
                })?;
                match path {
                    None => Ok(node.clone()),
                    Some(pointer) => select(node, pointer),
                }
            }
        }
    }
}

/// Apply a JSON Pointer to a document.
pub(crate) fn select(node: &Document, pointer: &str) -> Result<Document> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(PlanError::evaluation(pointer, "not a JSON pointer").into());
    }
    node.pointer(pointer)
        .map(|v| document(v.clone()))
        .ok_or_else(|| PlanError::evaluation(pointer, "no result").into())
}

/// One concrete assignment of every mapped parameter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mapping {
    assignments: Vec<(String, Binding)>,
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.assignments.push((name.into(), binding));
        self
    }

    #[must_use]
    pub fn assignments(&self) -> &[(String, Binding)] {
        &self.assignments
    }

    fn merged(&self, other: &Mapping) -> Mapping {
        let mut assignments = self.assignments.clone();
        assignments.extend(other.assignments.iter().cloned());
        Mapping { assignments }
    }

    /// Bind every assignment onto `task`, reading plan outputs from `upstream`.
    ///
    /// # Errors
    ///
    /// Binding errors from the task, or evaluation errors from access paths.
    pub fn bind(&self, task: &mut Task, upstream: &Value) -> Result<()> {
        for (name, binding) in &self.assignments {
            let value = binding.evaluate(upstream)?;
            task.set_parameter(name, value)?;
        }
        Ok(())
    }
}
