//! Lightweight identifier for operators within an [`OperatorGraph`](crate::operator::OperatorGraph).
//!
//! Every operator inserted into the graph arena is assigned a sequential
//! `OperatorId`. Ids are only meaningful for the graph that issued them. They
//! are small, `Copy`, and ordered, so the planner uses them as keys in maps and
//! as stream identifiers in value contexts.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Unique numeric identifier for an operator in a graph arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct OperatorId(u32);

impl OperatorId {
    /// Create an `OperatorId` from an arena slot.
    #[must_use]
    pub fn new(slot: usize) -> Self {
        Self(u32::try_from(slot).unwrap_or(u32::MAX))
    }

    /// Return the underlying numeric value.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for OperatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "op{}", self.0)
    }
}
