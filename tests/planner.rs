// tests/planner.rs
use anyhow::Result;
use ironplan::mapping::Mappings;
use ironplan::operator::OperatorGraph;
use ironplan::planner::{DimensionTrie, OperatorMap, OptimizationDecision, PlanMap};
use ironplan::testing::*;
use ironplan::*;
use roaring::RoaringBitmap;
use serde_json::json;

fn identity(values: &[i64]) -> Plan {
    Plan::new(identity_task(), Mappings::values("x", values.iter().copied()))
}

fn with(task: TaskFactory, x: &Plan, y: Mappings) -> Plan {
    Plan::new(task, Mappings::product([Mappings::plan("x", x), y]))
}

#[test]
fn descendant_input_is_joined_on_the_nearer_ancestor() -> Result<()> {
    let a = identity(&[1, 2]);
    let b = with(mult_task(), &a, Mappings::values("y", [1, 10]));
    let c = with(plus_task(), &b, Mappings::value("y", 0));
    let d = with(plus_task(), &b, Mappings::plan("y", &c));
    assert_outputs_unordered(&d, &[2, 4, 20, 40])
}

#[test]
fn diamond_is_joined_on_the_common_root() -> Result<()> {
    let a = identity(&[1, 2]);
    let b = with(mult_task(), &a, Mappings::values("y", [1, 10]));
    let e = with(mult_task(), &a, Mappings::value("y", 2));
    let d = with(plus_task(), &b, Mappings::plan("y", &e));
    assert_outputs_unordered(&d, &[3, 6, 12, 24])
}

#[test]
fn independent_input_is_multiplied_after_the_join() -> Result<()> {
    let sum3 = TaskFactory::new(
        "sum3",
        vec![Input::required("a"), Input::required("b"), Input::required("c")],
        |b| {
            let total: i64 = ["a", "b", "c"]
                .iter()
                .filter_map(|k| b.get(*k).and_then(|v| v.as_i64()))
                .sum();
            Ok(json!(total))
        },
    );
    let a = identity(&[1, 2]);
    let x = with(mult_task(), &a, Mappings::value("y", 10));
    let y = with(plus_task(), &a, Mappings::value("y", 100));
    let z = identity(&[0, 1000]);
    let plan = Plan::new(
        sum3,
        Mappings::product([
            Mappings::plan("a", &x),
            Mappings::plan("b", &y),
            Mappings::plan("c", &z),
        ]),
    );

    let physical = plan.build()?;
    let merges: Vec<_> = physical
        .optimizations
        .iter()
        .filter_map(|d| match d {
            OptimizationDecision::MergedInputs {
                participants,
                dimensions,
                ..
            } => Some((*participants, *dimensions)),
            _ => None,
        })
        .collect();
    assert_eq!(merges, vec![(2, 1), (2, 0)]);
    assert_outputs_unordered(&plan, &[111, 122, 1111, 1122])
}

#[test]
fn operator_map_finds_lowest_common_ancestors() {
    let mut graph = OperatorGraph::new();
    let root = graph.constant([1]);
    let left = graph.task(identity_task(), Vec::new(), Some(root));
    let right = graph.task(identity_task(), Vec::new(), Some(root));
    let below_left = graph.task(identity_task(), Vec::new(), Some(left));
    let other = graph.constant([2]);

    let mut map = OperatorMap::new();
    for op in [below_left, right, other] {
        map.add(&graph, op);
    }
    assert_eq!(map.len(), 5);
    assert!(map.is_ancestor(root, below_left));
    assert!(!map.is_ancestor(right, below_left));
    assert_eq!(map.find_lcas(below_left, right), vec![root]);
    assert_eq!(map.find_lcas(below_left, left), vec![left]);
    assert!(map.find_lcas(right, other).is_empty());
}

#[test]
fn operator_map_numbers_parents_first() {
    let mut graph = OperatorGraph::new();
    let a = graph.constant([1]);
    let b = graph.task(identity_task(), Vec::new(), Some(a));
    let c = graph.task(identity_task(), Vec::new(), Some(b));

    let mut map = OperatorMap::new();
    let id = map.add(&graph, c);
    assert_eq!(id, 2);
    assert_eq!(map.get(a), Some(0));
    assert_eq!(map.operator(1), Some(b));
    assert_eq!(map.ancestors(c).map(RoaringBitmap::len), Some(2));
}

#[test]
fn trie_weights_count_supersets() {
    let mut graph = OperatorGraph::new();
    let ops: Vec<_> = (0..3).map(|i| graph.constant([i])).collect();

    let mut trie = DimensionTrie::new();
    assert!(trie.add(RoaringBitmap::from_iter([0u32, 1]), ops[0]));
    assert!(trie.add(RoaringBitmap::from_iter([0u32]), ops[1]));
    assert!(trie.add(RoaringBitmap::new(), ops[2]));
    assert!(!trie.add(RoaringBitmap::new(), ops[2]));

    assert_eq!(trie.total_weight(), 3);
    let zero = trie
        .nodes()
        .iter()
        .position(|n| n.subset == RoaringBitmap::from_iter([0u32]))
        .unwrap();
    assert_eq!(trie.weight(zero), 2);
    let parents = trie.parents(0);
    assert_eq!(parents, vec![zero]);
}

#[test]
fn trie_closes_under_intersection() {
    let mut graph = OperatorGraph::new();
    let a = graph.constant([1]);
    let b = graph.constant([2]);

    let mut trie = DimensionTrie::new();
    trie.add(RoaringBitmap::from_iter([0u32, 1]), a);
    trie.add(RoaringBitmap::from_iter([1u32, 2]), b);
    assert!(
        trie.nodes()
            .iter()
            .any(|n| n.subset == RoaringBitmap::from_iter([1u32]))
    );
}

#[test]
fn trie_merge_without_shared_dimensions_is_a_product() -> Result<()> {
    let mut graph = OperatorGraph::new();
    let a = graph.constant([1, 2]);
    let b = graph.constant([3]);
    let map = OperatorMap::new();

    let mut trie = DimensionTrie::new();
    trie.add(RoaringBitmap::new(), a);
    trie.add(RoaringBitmap::new(), b);
    let merged = trie
        .merge(&mut graph, &map)?
        .ok_or_else(|| anyhow::anyhow!("expected a merged operator"))?;
    assert_eq!(graph.node(merged.operator).kind.name(), "Product");
    assert_eq!(merged.positions.get(&a), Some(&0));
    assert_eq!(merged.positions.get(&b), Some(&1));
    assert_eq!(merged.steps.len(), 1);
    Ok(())
}

#[test]
fn each_merge_step_removes_all_but_one_participant() {
    let mut graph = OperatorGraph::new();
    let r = graph.constant([1, 2]);
    let s = graph.constant([3]);
    let x = graph.product(vec![r, s]);
    let y = graph.product(vec![r, s]);
    let z = graph.union(vec![r]);
    let w = graph.constant([4]);

    let mut map = OperatorMap::new();
    for op in [x, y, z] {
        map.add(&graph, op);
    }
    let (rid, sid) = (map.get(r).unwrap(), map.get(s).unwrap());

    let mut trie = DimensionTrie::new();
    trie.add(RoaringBitmap::from_iter([rid, sid]), x);
    trie.add(RoaringBitmap::from_iter([rid, sid]), y);
    trie.add(RoaringBitmap::from_iter([rid]), z);
    trie.add(RoaringBitmap::new(), w);
    assert_eq!(trie.total_weight(), 4);

    let mut kinds = Vec::new();
    loop {
        let before = trie.total_weight();
        let Some(step) = trie.merge_step(&mut graph, &map) else {
            break;
        };
        assert_eq!(before - trie.total_weight(), step.participants.len() - 1);
        kinds.push((graph.node(step.operator).kind.name(), step.dimensions.len()));
    }
    assert!(trie.total_weight() <= 1);
    assert_eq!(kinds, vec![("Join", 2), ("Join", 1), ("Product", 0)]);
}

#[test]
fn plan_map_joins_plans() -> Result<()> {
    let a = identity(&[1]);
    let b = a.copy();
    let c = identity(&[2]);
    let mut graph = OperatorGraph::new();
    let op = graph.constant([1]);
    let other = graph.constant([2]);

    let mut map = PlanMap::new();
    let na = map.node(a.id());
    let nb = map.node(b.id());
    assert!(!map.same(a.id(), b.id()));
    map.set(na, op);
    map.join(na, nb)?;
    assert!(map.same(a.id(), b.id()));
    assert_eq!(map.get(nb), Some(op));

    let nc = map.node(c.id());
    map.set(nc, other);
    let err = map.join(na, nc).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Structural));
    assert_eq!(map.len(), 3);
    Ok(())
}

#[test]
fn shared_plan_is_built_once() -> Result<()> {
    let a = identity(&[1, 2]);
    let d = Plan::new(
        plus_task(),
        Mappings::product([Mappings::plan("x", &a), Mappings::plan("y", &a)]),
    );
    let explanation = d.explain()?;
    assert_eq!(explanation.summary.tasks, 2);
    assert_eq!(explanation.summary.joins, 0);
    assert_eq!(explanation.summary.products, 0);
    Ok(())
}

#[test]
fn plan_cycle_is_rejected() {
    let a = identity(&[1]);
    let b = Plan::new(identity_task(), Mappings::plan("x", &a));
    a.add(Mappings::plan("x", &b));
    let err = a.build().unwrap_err();
    assert!(err.to_string().contains("depends on itself"));
}
