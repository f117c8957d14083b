// tests/memo.rs
use anyhow::Result;
use ironplan::mapping::Mappings;
use ironplan::testing::*;
use ironplan::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn shared_plan_runs_once_per_value() -> Result<()> {
    let runs1 = counter();
    let runs2 = counter();
    let plan1 = Plan::new(
        counting(identity_task(), Arc::clone(&runs1)),
        Mappings::values("x", [1, 2]),
    );
    let plan2 = Plan::new(
        counting(mult_task(), Arc::clone(&runs2)),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [3, 5])]),
    );
    let plan3 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan2)]),
    );

    assert_eq!(plan3.collect_seq()?.len(), 4);
    assert_eq!(runs1.load(Ordering::SeqCst), 2);
    assert_eq!(runs2.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn product_restarts_replay_outputs() -> Result<()> {
    let runs = counter();
    let plan1 = Plan::new(
        counting(identity_task(), Arc::clone(&runs)),
        Mappings::values("x", [1, 2, 3]),
    );
    let copy = plan1.copy();
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &copy)]),
    );

    assert_eq!(plan2.collect_seq()?.len(), 9);
    // Three runs for the plan and three for its copy, however often the
    // product restarts.
    assert_eq!(runs.load(Ordering::SeqCst), 6);
    Ok(())
}

#[test]
fn nothing_runs_before_iteration() -> Result<()> {
    let runs = counter();
    let plan = Plan::new(
        counting(identity_task(), Arc::clone(&runs)),
        Mappings::values("x", [1, 2, 3]),
    );
    let mut run = plan.run()?;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    run.next().transpose()?;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn counts_report_outputs_per_operator() -> Result<()> {
    let plan1 = Plan::new(identity_task(), Mappings::values("x", [1, 2]));
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [3, 5])]),
    );
    let mut run = plan2.run_with(RunOptions {
        count_outputs: true,
        ..RunOptions::default()
    })?;
    let values: Vec<_> = run.by_ref().collect::<Result<_>>()?;
    assert_eq!(values.len(), 4);

    let counts = run
        .execution()
        .counts()
        .ok_or_else(|| anyhow::anyhow!("counts are enabled"))?;
    let mut totals: Vec<usize> = counts.values().copied().collect();
    totals.sort_unstable();
    assert_eq!(totals, vec![2, 4]);
    Ok(())
}

#[test]
fn counts_are_off_by_default() -> Result<()> {
    let plan = Plan::new(identity_task(), Mappings::values("x", [1]));
    let run = plan.run()?;
    assert!(run.execution().counts().is_none());
    Ok(())
}
