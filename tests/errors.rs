// tests/errors.rs
use anyhow::Result;
use ironplan::mapping::{Mapping, Mappings};
use ironplan::operator::OperatorGraph;
use ironplan::order::Order;
use ironplan::testing::*;
use ironplan::*;
use serde_json::json;

fn identity(values: &[i64]) -> Plan {
    Plan::new(identity_task(), Mappings::values("x", values.iter().copied()))
}

#[test]
fn join_needs_two_paths() {
    let plan1 = identity(&[1]);
    let plan2 = Plan::new(identity_task(), Mappings::plan("x", &plan1));
    let err = plan2.add_join(vec![vec![plan1.clone()]]).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Structural));
    assert!(err.to_string().contains("at least two paths"));
}

#[test]
fn join_path_must_exist() {
    let plan1 = identity(&[1]);
    let stranger = identity(&[2]);
    let plan2 = Plan::new(identity_task(), Mappings::plan("x", &plan1));
    let err = plan2
        .add_join(vec![vec![plan1.clone()], vec![stranger.clone()]])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PlanError>(),
        Some(PlanError::MissingPath { .. })
    ));
}

#[test]
fn group_by_path_must_exist() {
    let plan1 = identity(&[1]);
    let stranger = identity(&[2]);
    let plan2 = Plan::new(identity_task(), Mappings::plan("x", &plan1));
    let err = plan2.group_by(vec![vec![stranger]]).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Structural));
}

#[test]
fn joining_distinct_plans_is_inconsistent() {
    let plan1 = identity(&[1]);
    let plan2 = identity(&[2]);
    let sum = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan2)]),
    );
    let result = sum
        .add_join(vec![vec![plan1.clone()], vec![plan2.clone()]])
        .and_then(|()| sum.build());
    let err = result.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::JoinConsistency));
}

#[test]
fn unknown_parameter_is_a_binding_error() {
    let plan = Plan::new(identity_task(), Mappings::value("nope", 1));
    let err = plan.collect_seq().unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Binding));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn missing_required_parameter_is_a_binding_error() {
    let plan = Plan::new(plus_task(), Mappings::value("x", 1));
    let err = plan.collect_seq().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PlanError>(),
        Some(PlanError::MissingParameter { parameter, .. }) if parameter == "y"
    ));
}

#[test]
fn access_path_selecting_nothing_fails() {
    let plan1 = identity(&[1]);
    let plan2 = Plan::new(identity_task(), Mappings::plan("x", plan1.path("/missing")));
    let err = plan2.collect_seq().unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Evaluation));
}

#[test]
fn task_failure_carries_task_id() {
    let plan = Plan::new(failing_task("boom"), Mappings::value("x", 1));
    let err = plan.collect_seq().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("task failing failed"));
    assert!(message.contains("boom"));
    assert_eq!(error_kind(&err), None);
}

#[test]
fn failure_is_remembered() -> Result<()> {
    let plan = Plan::new(failing_task("boom"), Mappings::value("x", 1));
    let physical = plan.build()?;
    let root = physical.root;
    let execution = physical.run(RunOptions::default())?;
    assert!(execution.values(root).next().is_some_and(|r| r.is_err()));
    let again = execution.values(root).next();
    let err = again.and_then(Result::err).map(|e| e.to_string());
    assert!(err.is_some_and(|m| m.contains("failed earlier")));
    Ok(())
}

#[test]
fn sorting_on_unknown_stream_fails_at_init() {
    let mut graph = OperatorGraph::new();
    let a = graph.constant([1, 2]);
    let b = graph.constant([3]);
    let sorted = graph.order_by(a, Order::of([b]));
    let err = graph.init(sorted).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PlanError>(),
        Some(PlanError::MissingStream { stream, .. }) if *stream == b
    ));
}

#[test]
fn wrong_arity_fails_at_init() {
    let mut graph = OperatorGraph::new();
    let a = graph.constant([1]);
    let join = graph.join(vec![a], Vec::new());
    assert!(graph.init(join).is_err());
}

#[test]
fn group_by_rejects_unsorted_input() -> Result<()> {
    let mut graph = OperatorGraph::new();
    let numbers = graph.constant([1, 2]);
    let task = graph.task(
        identity_task(),
        vec![Mapping::new().with("x", mapping::Binding::node(0))],
        Some(numbers),
    );
    let doubled = graph.task(
        identity_task(),
        vec![
            Mapping::new().with("x", mapping::Binding::node(0)),
            Mapping::new().with("x", mapping::Binding::Value(value::document(json!(0)))),
        ],
        Some(task),
    );
    // The union yields positions of `task` as 0, 0, 1, 1, 0, 1.
    let tail = graph.task(
        identity_task(),
        vec![Mapping::new().with("x", mapping::Binding::node(0))],
        Some(task),
    );
    let union = graph.union(vec![doubled, tail]);
    let grouped = graph.group_by(union, vec![task]);

    let mut execution = Execution::start(graph, grouped, RunOptions::default())?;
    let mut failure = None;
    for value in execution.by_ref() {
        if let Err(e) = value {
            failure = Some(e);
            break;
        }
    }
    let failure = failure.ok_or_else(|| anyhow::anyhow!("expected an ordering error"))?;
    assert_eq!(error_kind(&failure), Some(ErrorKind::Ordering));
    Ok(())
}
