// tests/explain.rs
use anyhow::Result;
use ironplan::mapping::Mappings;
use ironplan::planner::OptimizationDecision;
use ironplan::testing::*;
use ironplan::*;
use std::fs;
use tempfile::tempdir;

fn joined_plan() -> Plan {
    let plan1 = Plan::new(identity_task(), Mappings::values("x", [1, 2]));
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [3, 5])]),
    );
    Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan2)]),
    )
}

#[test]
fn explain_summarizes_operators() -> Result<()> {
    let explanation = joined_plan().explain()?;
    assert_eq!(explanation.summary.tasks, 3);
    assert_eq!(explanation.summary.joins, 1);
    assert_eq!(explanation.summary.products, 0);
    assert_eq!(explanation.summary.barriers, 2);
    assert_eq!(explanation.summary.total_ops, explanation.steps.len());
    assert!(explanation.steps.iter().any(|s| s.is_barrier));

    let text = explanation.to_string();
    assert!(text.contains("PHYSICAL PLAN EXPLANATION"));
    assert!(text.contains("Run task `plus`"));
    assert!(text.contains("Join of Task Inputs"));

    let json = serde_json::to_value(&explanation)?;
    assert_eq!(json["summary"]["tasks"], 3);
    assert_eq!(json["steps"].as_array().map(Vec::len), Some(explanation.steps.len()));
    Ok(())
}

#[test]
fn explain_records_planner_decisions() -> Result<()> {
    let plan1 = Plan::new(identity_task(), Mappings::values("x", [2, 3]));
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([
            Mappings::plan("x", &plan1),
            Mappings::plan("y", &plan1.copy()),
        ]),
    );
    let physical = plan2.build()?;
    assert!(physical.optimizations.contains(&OptimizationDecision::MergedInputs {
        task: "plus".to_string(),
        participants: 2,
        dimensions: 0,
    }));
    assert!(
        physical
            .optimizations
            .iter()
            .any(|d| matches!(d, OptimizationDecision::CollapsedUnions { count } if *count >= 3))
    );
    assert!(physical.explain().to_string().contains("Product of Task Inputs"));
    Ok(())
}

#[test]
fn dot_output_lists_every_operator() -> Result<()> {
    let plan = joined_plan();
    let physical = plan.build()?;
    let operators = physical.graph.reachable(physical.root).len();

    let dir = tempdir()?;
    let path = dir.path().join("plan.dot");
    let mut file = fs::File::create(&path)?;
    plan.print_plan(&mut file)?;
    drop(file);

    let dot = fs::read_to_string(&path)?;
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.trim_end().ends_with('}'));
    let labels = dot.lines().filter(|l| l.contains("[label=\"") && !l.contains("->")).count();
    assert_eq!(labels, operators);
    assert!(dot.contains("style=\"dashed\""));
    assert!(dot.contains("style=\"dotted\""));
    Ok(())
}

#[test]
fn dot_output_shows_counts_after_a_run() -> Result<()> {
    let mut run = joined_plan().run_with(RunOptions {
        count_outputs: true,
        trace_plans: true,
    })?;
    let values: Vec<_> = run.by_ref().collect::<Result<_>>()?;
    assert_eq!(values.len(), 4);

    let mut dot = Vec::new();
    run.write_dot(&mut dot)?;
    let dot = String::from_utf8(dot)?;
    assert!(dot.contains("# = 4"));
    assert!(dot.contains("peripheries=2"));
    Ok(())
}
