//! Error types raised while planning and executing plans.
//!
//! Failures surface through `anyhow::Result` like everywhere else in the
//! crate, but the engine's own failures are raised as [`PlanError`] so callers
//! can `downcast_ref` them and branch on [`ErrorKind`].

use crate::operator_id::OperatorId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a [`PlanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The plan is malformed: a path does not resolve or a required stream is missing.
    Structural,
    /// A join relates provably distinct plans.
    JoinConsistency,
    /// A value cannot be bound to a task parameter.
    Binding,
    /// An access path or function expression failed to produce a result.
    Evaluation,
    /// An order-dependent operator received out-of-order input.
    Ordering,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Structural => "structural",
            Self::JoinConsistency => "join consistency",
            Self::Binding => "binding",
            Self::Evaluation => "evaluation",
            Self::Ordering => "ordering",
        };
        f.write_str(s)
    }
}

/// Error raised by the planner or the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A join or group-by path names a plan that is not reachable.
    MissingPath { plan: String, path: Vec<String> },
    /// An operator needs a stream that none of its parents expose.
    MissingStream { operator: OperatorId, stream: OperatorId },
    /// A join declaration is unusable (fewer than two paths, conflicting sides).
    InvalidJoin { reason: String },
    /// The paths of a join end in plans with different data.
    InconsistentJoin { expected: String, found: String },
    /// A mapping targets a parameter the task does not declare.
    NoSuchParameter { task: String, parameter: String },
    /// A required parameter was left unset.
    MissingParameter { task: String, parameter: String },
    /// An access path or function expression failed.
    Evaluation { expression: String, reason: String },
    /// An order-dependent operator saw keys going backwards.
    UnsortedInput { operator: OperatorId, stream: usize },
}

impl PlanError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPath { .. } | Self::MissingStream { .. } | Self::InvalidJoin { .. } => {
                ErrorKind::Structural
            }
            Self::InconsistentJoin { .. } => ErrorKind::JoinConsistency,
            Self::NoSuchParameter { .. } | Self::MissingParameter { .. } => ErrorKind::Binding,
            Self::Evaluation { .. } => ErrorKind::Evaluation,
            Self::UnsortedInput { .. } => ErrorKind::Ordering,
        }
    }

    pub(crate) fn evaluation(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind())?;
        match self {
            Self::MissingPath { plan, path } => {
                write!(f, "plan {plan} has no sub-plan at path [{}]", path.join(", "))
            }
            Self::MissingStream { operator, stream } => {
                write!(f, "operator {operator} needs stream {stream} but no parent exposes it")
            }
            Self::InvalidJoin { reason } => write!(f, "invalid join: {reason}"),
            Self::InconsistentJoin { expected, found } => {
                write!(f, "cannot join two distinct plans ({expected} and {found})")
            }
            Self::NoSuchParameter { task, parameter } => {
                write!(f, "task {task} has no parameter named {parameter}")
            }
            Self::MissingParameter { task, parameter } => {
                write!(f, "task {task} requires parameter {parameter}")
            }
            Self::Evaluation { expression, reason } => {
                write!(f, "expression {expression:?} failed: {reason}")
            }
            Self::UnsortedInput { operator, stream } => {
                write!(f, "operator {operator} received unsorted input on stream {stream}")
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Classify an `anyhow` error raised by this crate, if it wraps a [`PlanError`].
#[must_use]
pub fn error_kind(error: &anyhow::Error) -> Option<ErrorKind> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PlanError>())
        .map(PlanError::kind)
}
