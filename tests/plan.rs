// tests/plan.rs
use anyhow::Result;
use ironplan::mapping::{Mappings, Source};
use ironplan::testing::*;
use ironplan::*;
use serde_json::json;

fn identity(values: &[i64]) -> Plan {
    Plan::new(identity_task(), Mappings::values("x", values.iter().copied()))
}

#[test]
fn constants_multiply() -> Result<()> {
    let plan1 = identity(&[1, 2]);
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [3, 5])]),
    );
    assert_outputs_unordered(&plan2, &[3, 5, 6, 10])
}

#[test]
fn shared_ancestor_is_joined() -> Result<()> {
    let plan1 = identity(&[1, 2]);
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [3, 5])]),
    );
    let plan3 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan2)]),
    );
    assert_outputs_unordered(&plan3, &[4, 6, 8, 12])
}

#[test]
fn union_branch_without_ancestor_matches_everything() -> Result<()> {
    let plan1 = identity(&[1, 2]);
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([
            Mappings::simple("x", [Source::from(&plan1), Source::from(json!(-1))]),
            Mappings::values("y", [3, 5]),
        ]),
    );
    let plan3 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan2)]),
    );
    assert_outputs_unordered(&plan3, &[-4, -3, -2, -1, 4, 6, 8, 12])
}

#[test]
fn same_plan_twice_is_implicitly_joined() -> Result<()> {
    let plan1 = identity(&[2, 3]);
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &plan1)]),
    );
    assert_outputs_unordered(&plan2, &[4, 6])
}

#[test]
fn copy_gives_a_product() -> Result<()> {
    let plan1 = identity(&[2, 3]);
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([
            Mappings::plan("x", &plan1),
            Mappings::plan("y", &plan1.copy()),
        ]),
    );
    assert_outputs_unordered(&plan2, &[4, 5, 5, 6])
}

#[test]
fn explicit_join_unifies_copies() -> Result<()> {
    let plan1 = identity(&[2, 3]);
    let copy = plan1.copy();
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::plan("y", &copy)]),
    );
    plan2.add_join(vec![vec![plan1.clone()], vec![copy.clone()]])?;
    assert_outputs_unordered(&plan2, &[4, 6])
}

#[test]
fn alternatives_are_concatenated() -> Result<()> {
    let plan = Plan::new(
        plus_task(),
        Mappings::product([Mappings::values("x", [1, 2]), Mappings::value("y", 3)]),
    );
    plan.add(Mappings::product([
        Mappings::values("x", [4, 5]),
        Mappings::value("y", 2),
    ]));
    assert_outputs_unordered(&plan, &[4, 5, 6, 7])
}

#[test]
fn alternative_mappings_in_one_set() -> Result<()> {
    let plan = Plan::new(
        identity_task(),
        Mappings::alternative([Mappings::values("x", [1, 2]), Mappings::value("x", 10)]),
    );
    assert_outputs_unordered(&plan, &[1, 2, 10])
}

#[test]
fn group_everything() -> Result<()> {
    let plan1 = identity(&[1, 2, 3]);
    plan1.group_by(Vec::new())?;
    let total = Plan::new(sum_task(), Mappings::plan("x", &plan1));
    assert_outputs_unordered(&total, &[6])
}

#[test]
fn group_by_ancestor() -> Result<()> {
    let plan1 = identity(&[1, 2, 3]);
    let plan2 = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [10, 20])]),
    );
    plan2.group_by(vec![vec![plan1.clone()]])?;
    let total = Plan::new(sum_task(), Mappings::plan("x", &plan2));
    assert_outputs_unordered(&total, &[32, 34, 36])
}

#[test]
fn grouped_output_is_an_array() -> Result<()> {
    let plan1 = identity(&[1, 2]);
    let plan2 = Plan::new(
        mult_task(),
        Mappings::product([Mappings::plan("x", &plan1), Mappings::values("y", [1, 100])]),
    );
    plan2.group_by(vec![vec![plan1.clone()]])?;
    let mut groups = plan2.collect_seq()?;
    for group in &mut groups {
        if let Some(items) = group.as_array_mut() {
            items.sort_by_key(serde_json::Value::as_i64);
        }
    }
    assert_documents_unordered_equal(&groups, &[json!([1, 100]), json!([2, 200])]);
    Ok(())
}

#[test]
fn plan_reference_with_pointer() -> Result<()> {
    let records = Plan::new(
        TaskFactory::new("record", vec![Input::required("x")], |b| {
            Ok(json!({ "value": b["x"].as_ref(), "tags": ["a", "b"] }))
        }),
        Mappings::values("x", [1, 2]),
    );
    let plan = Plan::new(identity_task(), Mappings::plan("x", records.path("/value")));
    assert_outputs_unordered(&plan, &[1, 2])
}

#[test]
fn optional_input_may_stay_unbound() -> Result<()> {
    let task = TaskFactory::new(
        "default",
        vec![Input::required("x"), Input::optional("y")],
        |b| {
            let x = b["x"].as_i64().unwrap_or_default();
            let y = b.get("y").and_then(|v| v.as_i64()).unwrap_or(100);
            Ok(json!(x + y))
        },
    );
    let plan = Plan::new(task, Mappings::values("x", [1, 2]));
    assert_outputs_unordered(&plan, &[101, 102])
}

#[test]
fn clones_share_identity_copies_do_not() {
    let plan1 = identity(&[1]);
    let handle = plan1.clone();
    let copy = plan1.copy();
    assert_eq!(plan1, handle);
    assert_eq!(plan1.id(), handle.id());
    assert_ne!(plan1, copy);
    assert!(plan1.shares_data_with(&copy));

    copy.add(Mappings::value("x", 2));
    assert!(!plan1.shares_data_with(&copy));
}

#[test]
fn copy_is_independent_after_modification() -> Result<()> {
    let plan1 = identity(&[1]);
    let copy = plan1.copy();
    copy.add(Mappings::value("x", 2));
    assert_outputs_unordered(&plan1, &[1])?;
    assert_outputs_unordered(&copy, &[1, 2])
}

#[test]
fn resolve_follows_sub_plans() {
    let plan1 = identity(&[1]);
    let plan2 = Plan::new(identity_task(), Mappings::plan("x", &plan1));
    let plan3 = Plan::new(identity_task(), Mappings::plan("x", &plan2));

    assert_eq!(plan3.sub_plans(), vec![plan2.clone()]);
    assert_eq!(plan3.resolve(&[plan2.clone(), plan1.clone()]), Some(plan1.clone()));
    assert_eq!(plan3.resolve(&[plan1.clone()]), None);
    assert_eq!(plan3.resolve(&[]), None);
}

#[test]
fn plan_run_is_lazy_iterator() -> Result<()> {
    let plan = identity(&[5, 6, 7]);
    let mut run = plan.run()?;
    let first = run.next().transpose()?;
    assert_eq!(first.as_deref(), Some(&json!(5)));
    let rest = run.collect::<Result<Vec<_>>>()?;
    assert_eq!(rest.len(), 2);
    Ok(())
}
