//! Assertion functions for comparing plan outputs.
//!
//! Plans make no promise about the order of unrelated outputs, so these
//! helpers compare sorted copies.

use crate::plan::Plan;
use anyhow::{Result, anyhow};
use serde_json::Value as JsonValue;

/// Convert documents to integers and sort them.
///
/// # Errors
///
/// If a document is not an integer.
///
/// # Example
///
/// ```
/// use ironplan::testing::sorted_i64;
/// use serde_json::json;
///
/// assert_eq!(sorted_i64(&[json!(3), json!(1)]).unwrap(), vec![1, 3]);
/// ```
pub fn sorted_i64(values: &[JsonValue]) -> Result<Vec<i64>> {
    let mut out = values
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| anyhow!("output `{v}` is not an integer")))
        .collect::<Result<Vec<_>>>()?;
    out.sort_unstable();
    Ok(out)
}

/// Assert that two lists of documents hold the same items, ignoring order.
///
/// # Panics
///
/// Panics if the lists differ.
pub fn assert_documents_unordered_equal(actual: &[JsonValue], expected: &[JsonValue]) {
    let mut a: Vec<String> = actual.iter().map(JsonValue::to_string).collect();
    let mut e: Vec<String> = expected.iter().map(JsonValue::to_string).collect();
    a.sort();
    e.sort();
    assert_eq!(
        a, e,
        "Document mismatch (ignoring order):\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Run `plan` and assert that its integer outputs are `expected`, ignoring order.
///
/// # Errors
///
/// Any planning or execution error, or a non-integer output.
///
/// # Panics
///
/// Panics if the outputs differ.
pub fn assert_outputs_unordered(plan: &Plan, expected: &[i64]) -> Result<()> {
    let actual = sorted_i64(&plan.collect_seq()?)?;
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(
        actual, expected,
        "Plan {plan} output mismatch (ignoring order)"
    );
    Ok(())
}
