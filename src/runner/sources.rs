//! Streams that produce documents: constants, tasks, functions and unions.

use super::{Cursor, ExecState};
use crate::error::PlanError;
use crate::operator::{OperatorKind, OperatorNode};
use crate::operator_id::OperatorId;
use crate::value::{ReturnValue, Value, document};
use anyhow::{Result, anyhow};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

pub(crate) struct ConstantStream {
    op: OperatorId,
    index: usize,
}

impl ConstantStream {
    pub(crate) fn new(op: OperatorId) -> Self {
        Self { op, index: 0 }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        let OperatorKind::Constant { values } = &state.graph().node(self.op).kind else {
            return Err(anyhow!("operator {} is not a constant", self.op));
        };
        let value = values.get(self.index).cloned();
        self.index += 1;
        Ok(value.map(ReturnValue::source))
    }
}

/// Runs the task once per upstream value and mapping.
pub(crate) struct TaskStream {
    op: OperatorId,
    /// `None` for a task without a parent: it sees a single empty upstream value.
    upstream: Option<Cursor>,
    current: Option<Rc<Value>>,
    mapping: usize,
    started: bool,
}

impl TaskStream {
    pub(crate) fn new(op: OperatorId, node: &OperatorNode) -> Self {
        Self {
            op,
            upstream: node.parents.first().copied().map(Cursor::new),
            current: None,
            mapping: 0,
            started: false,
        }
    }

    fn next_upstream(&mut self, state: &ExecState) -> Result<Option<Rc<Value>>> {
        match &mut self.upstream {
            Some(cursor) => cursor.next(state),
            None if !self.started => {
                self.started = true;
                Ok(Some(Rc::new(Value::new(0, Vec::new(), Vec::new()))))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        let OperatorKind::Task { factory, mappings } = &state.graph().node(self.op).kind else {
            return Err(anyhow!("operator {} is not a task", self.op));
        };
        if mappings.is_empty() {
            return Ok(None);
        }
        let upstream = match self
            .current
            .clone()
            .filter(|_| self.mapping < mappings.len())
        {
            Some(v) => v,
            None => match self.next_upstream(state)? {
                Some(v) => {
                    self.current = Some(Rc::clone(&v));
                    self.mapping = 0;
                    v
                }
                None => return Ok(None),
            },
        };
        let mapping = &mappings[self.mapping];
        self.mapping += 1;

        let mut task = factory.create();
        mapping.bind(&mut task, &upstream)?;
        trace!(op = %self.op, task = task.id(), "running task");
        let output = task.run()?;
        Ok(Some(ReturnValue::new(
            vec![output],
            vec![(0, upstream.context.clone())],
        )))
    }
}

/// Applies a JSON Pointer to the first document of each upstream value.
/// Arrays are flattened; a pointer selecting nothing contributes nothing.
pub(crate) struct FunctionStream {
    op: OperatorId,
    upstream: Cursor,
    pending: VecDeque<ReturnValue>,
}

impl FunctionStream {
    pub(crate) fn new(op: OperatorId, node: &OperatorNode) -> Self {
        Self {
            op,
            upstream: Cursor::new(node.parents[0]),
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        let OperatorKind::Function { pointer } = &state.graph().node(self.op).kind else {
            return Err(anyhow!("operator {} is not a function", self.op));
        };
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(PlanError::evaluation(pointer.as_str(), "not a JSON pointer").into());
        }
        loop {
            if let Some(rv) = self.pending.pop_front() {
                return Ok(Some(rv));
            }
            let Some(value) = self.upstream.next(state)? else {
                return Ok(None);
            };
            let selected = match value.node(0).and_then(|n| n.pointer(pointer)) {
                Some(JsonValue::Array(items)) => items.clone(),
                Some(item) => vec![item.clone()],
                None => Vec::new(),
            };
            self.pending.extend(selected.into_iter().map(|item| {
                ReturnValue::new(vec![document(item)], vec![(0, value.context.clone())])
            }));
        }
    }
}

/// Concatenates the parents in order.
pub(crate) struct UnionStream {
    cursors: Vec<Cursor>,
    current: usize,
}

impl UnionStream {
    pub(crate) fn new(node: &OperatorNode) -> Self {
        Self {
            cursors: node.parents.iter().copied().map(Cursor::new).collect(),
            current: 0,
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        while let Some(cursor) = self.cursors.get_mut(self.current) {
            if let Some(value) = cursor.next(state)? {
                return Ok(Some(ReturnValue::new(
                    value.nodes.clone(),
                    vec![(self.current, value.context.clone())],
                )));
            }
            self.current += 1;
        }
        Ok(None)
    }
}
