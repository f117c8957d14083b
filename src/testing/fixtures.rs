//! Task factories used throughout the tests and documentation.

use crate::task::{Bindings, Input, TaskFactory};
use anyhow::{Result, anyhow};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn integer(bindings: &Bindings, name: &str) -> Result<i64> {
    bindings
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("parameter `{name}` is not an integer"))
}

/// `identity(x) = x`.
///
/// # Example
///
/// ```
/// use ironplan::testing::identity_task;
///
/// let task = identity_task();
/// assert_eq!(task.id(), "identity");
/// ```
#[must_use]
pub fn identity_task() -> TaskFactory {
    TaskFactory::new("identity", vec![Input::required("x")], |b| {
        Ok(json!(integer(b, "x")?))
    })
}

/// `plus(x, y) = x + y`.
#[must_use]
pub fn plus_task() -> TaskFactory {
    TaskFactory::new(
        "plus",
        vec![Input::required("x"), Input::required("y")],
        |b| Ok(json!(integer(b, "x")? + integer(b, "y")?)),
    )
}

/// `mult(x, y) = x * y`.
#[must_use]
pub fn mult_task() -> TaskFactory {
    TaskFactory::new(
        "mult",
        vec![Input::required("x"), Input::required("y")],
        |b| Ok(json!(integer(b, "x")? * integer(b, "y")?)),
    )
}

/// `sum(x)` over an array of integers, as produced by a group-by.
#[must_use]
pub fn sum_task() -> TaskFactory {
    TaskFactory::new("sum", vec![Input::required("x")], |b| {
        let items = b
            .get("x")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("parameter `x` is not an array"))?;
        let total = items
            .iter()
            .map(|v| v.as_i64().ok_or_else(|| anyhow!("`{v}` is not an integer")))
            .sum::<Result<i64>>()?;
        Ok(json!(total))
    })
}

/// A task that always fails, for error propagation tests.
#[must_use]
pub fn failing_task(message: &'static str) -> TaskFactory {
    TaskFactory::new("failing", vec![Input::optional("x")], move |_| {
        Err(anyhow!(message))
    })
}

/// Wrap `inner` so that every run increments `counter`.
///
/// # Example
///
/// ```
/// use ironplan::testing::{counting, identity_task};
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicUsize;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let task = counting(identity_task(), Arc::clone(&runs));
/// assert_eq!(task.id(), "identity");
/// ```
#[must_use]
pub fn counting(inner: TaskFactory, counter: Arc<AtomicUsize>) -> TaskFactory {
    let id = inner.id().to_string();
    let inputs = inner.inputs().to_vec();
    TaskFactory::new(id, inputs, move |bindings| -> Result<JsonValue> {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut task = inner.create();
        for (name, value) in bindings {
            task.set_parameter(name, Arc::clone(value))?;
        }
        Ok(task.run()?.as_ref().clone())
    })
}
