//! Sort-merge join on shared ancestor positions.
//!
//! Every parent is sorted on the joined streams. The join walks the parents
//! in step: the smallest concrete key among the heads is the candidate
//! position; values of every parent at that position are collected and their
//! cartesian product is emitted.
//!
//! A value whose key has an unbound entry (it came through a union branch
//! that never saw that stream) matches every position agreeing with its
//! bound entries. Such values are kept in a per-parent buffer ordered with
//! unbound entries last, and re-offered at every compatible position with the
//! unbound entries filled in.

use super::{Cursor, ExecState, Odometer};
use crate::error::PlanError;
use crate::operator::OperatorNode;
use crate::operator_id::OperatorId;
use crate::value::{
    Context, ReturnValue, UNBOUND, Value, compare_keys_unbound_last, is_compatible,
};
use anyhow::{Result, anyhow};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::trace;

type Member = (Rc<Value>, Context);

/// A combination in which every parent contributes a value unbound on the
/// joined streams is emitted again at each concrete position.
pub(crate) struct JoinStream {
    op: OperatorId,
    cursors: Vec<Cursor>,
    /// Values with at least one unbound key entry, ordered unbound-last.
    stores: Vec<Vec<(Vec<i64>, Rc<Value>)>>,
    last: Vec<Option<Vec<i64>>>,
    pending: Option<Odometer<Member>>,
    finished: bool,
}

impl JoinStream {
    pub(crate) fn new(op: OperatorId, node: &OperatorNode) -> Self {
        let n = node.parents.len();
        Self {
            op,
            cursors: node.parents.iter().copied().map(Cursor::new).collect(),
            stores: vec![Vec::new(); n],
            last: vec![None; n],
            pending: None,
            finished: false,
        }
    }

    /// Key of the next live value of parent `i` with every entry bound,
    /// moving partially bound values into the store on the way.
    fn head(&mut self, i: usize, state: &ExecState, keys: &[usize]) -> Result<Option<Vec<i64>>> {
        while let Some(value) = self.cursors[i].peek(state)? {
            let key = value.key(keys);
            if key.contains(&UNBOUND) {
                let at = self.stores[i]
                    .partition_point(|(k, _)| compare_keys_unbound_last(k, &key) != Ordering::Greater);
                self.stores[i].insert(at, (key, value));
                self.cursors[i].advance();
                continue;
            }
            match &self.last[i] {
                Some(last) if key < *last => {
                    return Err(PlanError::UnsortedInput {
                        operator: self.op,
                        stream: i,
                    }
                    .into());
                }
                _ => self.last[i] = Some(key.clone()),
            }
            return Ok(Some(key));
        }
        Ok(None)
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        let keys = &state.graph().node(self.op).keys;
        loop {
            if let Some(odometer) = &mut self.pending {
                if let Some(members) = odometer.next() {
                    return Ok(Some(emit(members)));
                }
                self.pending = None;
            }
            if self.finished {
                return Ok(None);
            }

            let mut heads = Vec::with_capacity(self.cursors.len());
            for (i, k) in keys.iter().enumerate() {
                heads.push(self.head(i, state, k)?);
            }
            // A parent without live values or buffered ones can never match again.
            let starved = heads
                .iter()
                .zip(&self.stores)
                .any(|(h, s)| h.is_none() && s.is_empty());
            let position = heads.iter().flatten().min().cloned();
            let Some(position) = position.filter(|_| !starved) else {
                self.finished = true;
                continue;
            };

            let mut groups: Vec<Vec<Member>> = Vec::with_capacity(keys.len());
            for (i, k) in keys.iter().enumerate() {
                let mut members = Vec::new();
                while self.head(i, state, k)?.as_ref() == Some(&position) {
                    let value = self.cursors[i]
                        .next(state)?
                        .ok_or_else(|| anyhow!("join input {i} vanished"))?;
                    let context = value.context.clone();
                    members.push((value, context));
                }
                for (key, value) in &self.stores[i] {
                    if is_compatible(key, &position) {
                        members.push((Rc::clone(value), fill(value, k, &position)));
                    }
                }
                groups.push(members);
            }
            for store in &mut self.stores {
                store.retain(|(k, _)| compare_keys_unbound_last(k, &position) != Ordering::Less);
            }

            if groups.iter().all(|g| !g.is_empty()) {
                trace!(op = %self.op, ?position, sizes = ?groups.iter().map(Vec::len).collect::<Vec<_>>(), "join match");
                self.pending = Some(Odometer::new(groups));
            } else {
                trace!(op = %self.op, ?position, "join position without match on every input");
            }
        }
    }
}

/// Context of a buffered value with its unbound key entries set to `position`.
fn fill(value: &Value, keys: &[usize], position: &[i64]) -> Context {
    let mut context = value.context.clone();
    for (&index, &p) in keys.iter().zip(position) {
        if let Some(entry) = context.get_mut(index) {
            if *entry == UNBOUND {
                *entry = p;
            }
        }
    }
    context
}

fn emit(members: Vec<Member>) -> ReturnValue {
    let mut rv = ReturnValue::default();
    for (i, (value, context)) in members.into_iter().enumerate() {
        rv.nodes.extend(value.nodes.iter().cloned());
        rv.contexts.push((i, context));
    }
    rv
}
