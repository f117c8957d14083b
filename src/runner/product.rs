//! Cartesian products, streamed as an odometer.
//!
//! Digit 0 turns fastest: on every step the lowest parent that can still
//! advance does, and every parent below it restarts from its first value.
//! Restarts replay the parents' memoized logs, so no task runs twice.

use super::{Cursor, ExecState};
use crate::operator::OperatorNode;
use crate::operator_id::OperatorId;
use crate::value::{ReturnValue, Value};
use anyhow::{Result, anyhow};
use std::rc::Rc;

pub(crate) struct ProductStream {
    parents: Vec<OperatorId>,
    cursors: Vec<Cursor>,
    current: Vec<Option<Rc<Value>>>,
    started: bool,
    done: bool,
}

impl ProductStream {
    pub(crate) fn new(node: &OperatorNode) -> Self {
        Self {
            parents: node.parents.clone(),
            cursors: node.parents.iter().copied().map(Cursor::new).collect(),
            current: vec![None; node.parents.len()],
            started: false,
            done: false,
        }
    }

    fn advance(&mut self, i: usize, state: &ExecState) -> Result<bool> {
        self.current[i] = self.cursors[i].next(state)?;
        Ok(self.current[i].is_some())
    }

    fn restart(&mut self, i: usize, state: &ExecState) -> Result<()> {
        self.cursors[i] = Cursor::new(self.parents[i]);
        if self.advance(i, state)? {
            Ok(())
        } else {
            Err(anyhow!(
                "product input {} produced no value on restart",
                self.parents[i]
            ))
        }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        if self.done {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            for i in 0..self.cursors.len() {
                if !self.advance(i, state)? {
                    self.done = true;
                    return Ok(None);
                }
            }
            return Ok(Some(self.emit()));
        }
        for i in 0..self.cursors.len() {
            if self.advance(i, state)? {
                for j in 0..i {
                    self.restart(j, state)?;
                }
                return Ok(Some(self.emit()));
            }
        }
        self.done = true;
        Ok(None)
    }

    fn emit(&self) -> ReturnValue {
        let mut rv = ReturnValue::default();
        for (i, value) in self.current.iter().enumerate() {
            if let Some(value) = value {
                rv.nodes.extend(value.nodes.iter().cloned());
                rv.contexts.push((i, value.context.clone()));
            }
        }
        rv
    }
}

/// Odometer over in-memory lists, digit 0 fastest.
pub(crate) struct Odometer<T> {
    lists: Vec<Vec<T>>,
    digits: Vec<usize>,
    started: bool,
    done: bool,
}

impl<T: Clone> Odometer<T> {
    pub(crate) fn new(lists: Vec<Vec<T>>) -> Self {
        let done = lists.iter().any(Vec::is_empty);
        Self {
            digits: vec![0; lists.len()],
            lists,
            started: false,
            done,
        }
    }

    fn current(&self) -> Vec<T> {
        self.digits
            .iter()
            .zip(&self.lists)
            .map(|(&d, list)| list[d].clone())
            .collect()
    }
}

impl<T: Clone> Iterator for Odometer<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.current());
        }
        for i in 0..self.digits.len() {
            self.digits[i] += 1;
            if self.digits[i] < self.lists[i].len() {
                return Some(self.current());
            }
            self.digits[i] = 0;
        }
        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::Odometer;

    #[test]
    fn odometer_turns_first_digit_fastest() {
        let combos: Vec<Vec<i32>> = Odometer::new(vec![vec![1, 2], vec![10, 20]]).collect();
        assert_eq!(
            combos,
            vec![vec![1, 10], vec![2, 10], vec![1, 20], vec![2, 20]]
        );
    }

    #[test]
    fn odometer_with_empty_list_yields_nothing() {
        let mut odometer = Odometer::new(vec![vec![1], Vec::<i32>::new()]);
        assert!(odometer.next().is_none());
    }
}
