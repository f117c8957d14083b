//! Lazy, memoizing execution of an initialized operator graph.
//!
//! Every operator owns an output log. The first consumer to ask for position
//! `n` of an operator drives that operator's stream forward and appends the
//! result to the log; every later consumer (another child, a restarted
//! product digit, a re-run of the plan) replays the log instead of
//! recomputing. Tasks therefore run once per distinct combination of inputs,
//! however many times their outputs are iterated.
//!
//! Execution is single-threaded and pull-based: nothing runs until the
//! returned [`Execution`] is iterated.

mod grouping;
mod join;
mod product;
mod sources;

use crate::operator::{OperatorGraph, OperatorKind};
use crate::operator_id::OperatorId;
use crate::value::{ReturnValue, UNBOUND, Value};
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

pub(crate) use grouping::{GroupByStream, OrderByStream};
pub(crate) use join::JoinStream;
pub(crate) use product::{Odometer, ProductStream};
pub(crate) use sources::{ConstantStream, FunctionStream, TaskStream, UnionStream};

/// Execution settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Expose per-operator output counts through [`Execution::counts`].
    pub count_outputs: bool,
    /// Log the physical plan in DOT form at debug level before running.
    pub trace_plans: bool,
}

#[derive(Default)]
struct OperatorLog {
    values: Vec<Rc<Value>>,
    stream: Option<OperatorStream>,
    done: bool,
    failure: Option<String>,
}

/// Shared state of one execution: the graph and every operator's output log.
pub(crate) struct ExecState {
    graph: OperatorGraph,
    logs: Vec<RefCell<OperatorLog>>,
}

impl ExecState {
    fn new(graph: OperatorGraph) -> Self {
        let logs = (0..graph.len())
            .map(|_| RefCell::new(OperatorLog::default()))
            .collect();
        Self { graph, logs }
    }

    pub(crate) fn graph(&self) -> &OperatorGraph {
        &self.graph
    }

    /// Output `position` of `op`, computing it if the log does not have it yet.
    fn fetch(&self, op: OperatorId, position: usize) -> Result<Option<Rc<Value>>> {
        let log = &self.logs[op.index()];
        loop {
            {
                let log = log.borrow();
                if let Some(value) = log.values.get(position) {
                    return Ok(Some(Rc::clone(value)));
                }
                if let Some(failure) = &log.failure {
                    return Err(anyhow!("operator {op} failed earlier: {failure}"));
                }
                if log.done {
                    return Ok(None);
                }
            }

            // The stream is taken out of the log while it runs so that
            // parents can be fetched without holding this borrow.
            let taken = log.borrow_mut().stream.take();
            let mut stream = taken.unwrap_or_else(|| OperatorStream::open(&self.graph, op));
            let step = stream.next(self);

            let mut log = log.borrow_mut();
            match step {
                Ok(Some(rv)) => {
                    let id = log.values.len();
                    let value = self.assemble(op, rv, id);
                    trace!(%op, id, context = ?value.context, "operator output");
                    log.values.push(Rc::new(value));
                    log.stream = Some(stream);
                }
                Ok(None) => {
                    debug!(%op, outputs = log.values.len(), "operator exhausted");
                    log.done = true;
                }
                Err(e) => {
                    log.failure = Some(format!("{e:#}"));
                    return Err(e);
                }
            }
        }
    }

    /// Build the operator's output value: assign its id and pick, for every
    /// context index, the first parent that has a bound position for it.
    fn assemble(&self, op: OperatorId, rv: ReturnValue, id: usize) -> Value {
        let own = i64::try_from(id).unwrap_or(i64::MAX);
        let context = self
            .graph
            .node(op)
            .layout
            .iter()
            .map(|sources| {
                if sources.is_empty() {
                    return own;
                }
                sources
                    .iter()
                    .find_map(|r| {
                        rv.context(r.stream)
                            .and_then(|c| c.get(r.index).copied())
                            .filter(|p| *p != UNBOUND)
                    })
                    .unwrap_or(UNBOUND)
            })
            .collect();
        Value::new(id as u64, rv.nodes, context)
    }

    fn count(&self, op: OperatorId) -> usize {
        self.logs[op.index()].borrow().values.len()
    }
}

/// A position in an operator's output sequence.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cursor {
    op: OperatorId,
    position: usize,
}

impl Cursor {
    pub(crate) fn new(op: OperatorId) -> Self {
        Self { op, position: 0 }
    }

    pub(crate) fn next(&mut self, state: &ExecState) -> Result<Option<Rc<Value>>> {
        let value = state.fetch(self.op, self.position)?;
        if value.is_some() {
            self.position += 1;
        }
        Ok(value)
    }

    pub(crate) fn peek(&self, state: &ExecState) -> Result<Option<Rc<Value>>> {
        state.fetch(self.op, self.position)
    }

    pub(crate) fn advance(&mut self) {
        self.position += 1;
    }
}

/// Per-operator stream state, one variant per operator kind.
pub(crate) enum OperatorStream {
    Constant(ConstantStream),
    Task(TaskStream),
    Function(FunctionStream),
    Union(UnionStream),
    Product(ProductStream),
    Join(JoinStream),
    GroupBy(GroupByStream),
    OrderBy(OrderByStream),
}

impl OperatorStream {
    fn open(graph: &OperatorGraph, op: OperatorId) -> Self {
        let node = graph.node(op);
        match node.kind {
            OperatorKind::Constant { .. } => Self::Constant(ConstantStream::new(op)),
            OperatorKind::Task { .. } => Self::Task(TaskStream::new(op, node)),
            OperatorKind::Function { .. } => Self::Function(FunctionStream::new(op, node)),
            OperatorKind::Union => Self::Union(UnionStream::new(node)),
            OperatorKind::Product => Self::Product(ProductStream::new(node)),
            OperatorKind::Join { .. } => Self::Join(JoinStream::new(op, node)),
            OperatorKind::GroupBy { .. } => Self::GroupBy(GroupByStream::new(op, node)),
            OperatorKind::OrderBy { .. } => Self::OrderBy(OrderByStream::new(op, node)),
        }
    }

    fn next(&mut self, state: &ExecState) -> Result<Option<ReturnValue>> {
        match self {
            Self::Constant(s) => s.next(state),
            Self::Task(s) => s.next(state),
            Self::Function(s) => s.next(state),
            Self::Union(s) => s.next(state),
            Self::Product(s) => s.next(state),
            Self::Join(s) => s.next(state),
            Self::GroupBy(s) => s.next(state),
            Self::OrderBy(s) => s.next(state),
        }
    }
}

/// Lazy iterator over the outputs of one operator.
///
/// Iterators over the same operator share its memoized log.
pub struct Values {
    state: Rc<ExecState>,
    cursor: Cursor,
}

impl Iterator for Values {
    type Item = Result<Rc<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(&self.state).transpose()
    }
}

/// A running plan: iterate it to pull the root operator's outputs.
pub struct Execution {
    state: Rc<ExecState>,
    root: OperatorId,
    options: RunOptions,
    outputs: Values,
}

impl Execution {
    /// Initialize `graph` from `root` and prepare to run it.
    ///
    /// # Errors
    ///
    /// Any error from [`OperatorGraph::init`].
    pub fn start(mut graph: OperatorGraph, root: OperatorId, options: RunOptions) -> Result<Self> {
        graph.init(root)?;
        if options.trace_plans {
            let mut dot = Vec::new();
            crate::dot::write_dot(&graph, root, None, &mut dot)?;
            debug!(plan = %String::from_utf8_lossy(&dot), "physical plan");
        }
        let state = Rc::new(ExecState::new(graph));
        let outputs = Values {
            state: Rc::clone(&state),
            cursor: Cursor::new(root),
        };
        Ok(Self {
            state,
            root,
            options,
            outputs,
        })
    }

    #[must_use]
    pub fn root(&self) -> OperatorId {
        self.root
    }

    #[must_use]
    pub fn graph(&self) -> &OperatorGraph {
        &self.state.graph
    }

    /// A fresh iterator over any operator's outputs, replaying what was
    /// already computed.
    #[must_use]
    pub fn values(&self, op: OperatorId) -> Values {
        Values {
            state: Rc::clone(&self.state),
            cursor: Cursor::new(op),
        }
    }

    /// Outputs produced so far by every operator reachable from the root, when
    /// [`RunOptions::count_outputs`] is set.
    #[must_use]
    pub fn counts(&self) -> Option<IndexMap<OperatorId, usize>> {
        self.options.count_outputs.then(|| {
            self.state
                .graph
                .reachable(self.root)
                .into_iter()
                .map(|op| (op, self.state.count(op)))
                .collect()
        })
    }
}

impl Iterator for Execution {
    type Item = Result<Rc<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.outputs.next()
    }
}
