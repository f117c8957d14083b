//! Order-dependent operators: `OrderBy` and `GroupBy`.

use super::{Cursor, ExecState};
use crate::error::PlanError;
use crate::operator::OperatorNode;
use crate::operator_id::OperatorId;
use crate::value::{ReturnValue, Value, compare_keys, document};
use anyhow::Result;
use serde_json::Value as JsonValue;
use std::rc::Rc;
use std::vec::IntoIter;
use tracing::debug;

/// Materializes its parent and replays it sorted on the ordered streams.
///
/// The sort is stable and uses natural order, so values with an unbound
/// entry come first.
pub(crate) struct OrderByStream {
    op: OperatorId,
    upstream: Cursor,
    sorted: Option<IntoIter<Rc<Value>>>,
}

impl OrderByStream {
    pub(crate) fn new(op: OperatorId, node: &OperatorNode) -> Self {
        Self {
            op,
            upstream: Cursor::new(node.parents[0]),
            sorted: None,
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        if self.sorted.is_none() {
            let keys = &state.graph().node(self.op).keys[0];
            let mut all = Vec::new();
            while let Some(value) = self.upstream.next(state)? {
                all.push(value);
            }
            all.sort_by_cached_key(|v| v.key(keys));
            debug!(op = %self.op, values = all.len(), "sorted input");
            self.sorted = Some(all.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next).map(|v| {
            ReturnValue::new(v.nodes.clone(), vec![(0, v.context.clone())])
        }))
    }
}

/// Collapses runs of consecutive values that agree on the grouped streams
/// into one value whose document is the array of the members' first documents.
///
/// The group's context is its first member's. Input must be sorted on the
/// grouped streams; a key that reappears after its run ended is rejected.
pub(crate) struct GroupByStream {
    op: OperatorId,
    upstream: Cursor,
    /// Key of the last group emitted; keys must strictly increase.
    previous: Option<Vec<i64>>,
}

impl GroupByStream {
    pub(crate) fn new(op: OperatorId, node: &OperatorNode) -> Self {
        Self {
            op,
            upstream: Cursor::new(node.parents[0]),
            previous: None,
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        let keys = &state.graph().node(self.op).keys[0];
        let Some(first) = self.upstream.next(state)? else {
            return Ok(None);
        };
        let key = first.key(keys);
        if self.previous.as_ref().is_some_and(|prev| compare_keys(&key, prev).is_le()) {
            return Err(PlanError::UnsortedInput {
                operator: self.op,
                stream: 0,
            }
            .into());
        }

        self.previous = Some(key.clone());

        let mut members: Vec<JsonValue> = first.node(0).map(|d| d.as_ref().clone()).into_iter().collect();
        while let Some(value) = self.upstream.peek(state)? {
            if compare_keys(&value.key(keys), &key).is_ne() {
                break;
            }
            members.extend(value.node(0).map(|d| d.as_ref().clone()));
            self.upstream.advance();
        }

        Ok(Some(ReturnValue::new(
            vec![document(JsonValue::Array(members))],
            vec![(0, first.context.clone())],
        )))
    }
}
