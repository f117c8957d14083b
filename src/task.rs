//! Tasks: the user-supplied units of work a plan instantiates.
//!
//! A [`TaskFactory`] declares a task's inputs and how to run it. For every
//! combination of inputs the runtime asks the factory for a fresh [`Task`],
//! binds parameters onto it, and runs it to obtain one output document.

use crate::error::PlanError;
use crate::value::Document;
use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Parameter values bound onto a task, in binding order.
pub type Bindings = IndexMap<String, Document>;

type RunFn = Arc<dyn Fn(&Bindings) -> Result<JsonValue> + Send + Sync>;

/// A declared task input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub required: bool,
}

impl Input {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Creates fresh [`Task`] instances of one task type.
///
/// Cloning is cheap; the run closure is shared.
#[derive(Clone)]
pub struct TaskFactory {
    id: String,
    inputs: Vec<Input>,
    run: RunFn,
}

impl TaskFactory {
    /// Declare a task type with its inputs and the function computing its output.
    ///
    /// ```
    /// use ironplan::task::{Input, TaskFactory};
    ///
    /// let double = TaskFactory::new("double", vec![Input::required("x")], |b| {
    ///     let x = b["x"].as_i64().unwrap_or_default();
    ///     Ok(serde_json::json!(x * 2))
    /// });
    /// assert_eq!(double.id(), "double");
    /// ```
    pub fn new<F>(id: impl Into<String>, inputs: Vec<Input>, run: F) -> Self
    where
        F: Fn(&Bindings) -> Result<JsonValue> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            inputs,
            run: Arc::new(run),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// A new, unbound instance of this task.
    #[must_use]
    pub fn create(&self) -> Task {
        Task {
            factory: self.clone(),
            bindings: Bindings::new(),
        }
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// A task instance with its parameters being bound.
#[derive(Debug, Clone)]
pub struct Task {
    factory: TaskFactory,
    bindings: Bindings,
}

impl Task {
    /// Bind `value` to the parameter `name`, replacing any earlier binding.
    ///
    /// # Errors
    ///
    /// [`PlanError::NoSuchParameter`] if the task does not declare `name`.
    pub fn set_parameter(&mut self, name: &str, value: Document) -> Result<()> {
        if self.factory.input(name).is_none() {
            return Err(PlanError::NoSuchParameter {
                task: self.factory.id.clone(),
                parameter: name.to_string(),
            }
            .into());
        }
        self.bindings.insert(name.to_string(), value);
        Ok(())
    }

    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.factory.id
    }

    /// Run the task and return its output document.
    ///
    /// # Errors
    ///
    /// [`PlanError::MissingParameter`] if a required input is unbound, or the
    /// task's own error with the task id attached.
    pub fn run(self) -> Result<Document> {
        if let Some(missing) = self
            .factory
            .inputs
            .iter()
            .find(|i| i.required && !self.bindings.contains_key(&i.name))
        {
            return Err(PlanError::MissingParameter {
                task: self.factory.id.clone(),
                parameter: missing.name.clone(),
            }
            .into());
        }
        let output = (self.factory.run)(&self.bindings)
            .with_context(|| format!("task {} failed", self.factory.id))?;
        Ok(Arc::new(output))
    }
}
