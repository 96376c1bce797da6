use super::*;
use std::convert::Infallible;

fn map(edges: &[(&str, &str)]) -> ParentMap {
    edges
        .iter()
        .map(|(parent, child)| (parent.to_string(), child.to_string()))
        .collect()
}

fn lookup(graph: &ParentMap) -> impl FnMut(&str) -> Result<Vec<String>, Infallible> + '_ {
    |id| Ok(graph.parents_of(id).to_vec())
}

#[test]
fn ancestors_record_shortest_distance() {
    // root -> a -> b -> tip, root -> tip (shortcut via merge)
    let graph = map(&[("root", "a"), ("a", "b"), ("b", "tip"), ("root", "tip")]);
    let depths = ancestors_with_depth("tip", None, lookup(&graph)).unwrap();
    assert_eq!(depths.get("tip"), Some(&0));
    assert_eq!(depths.get("b"), Some(&1));
    assert_eq!(depths.get("root"), Some(&1));
    assert_eq!(depths.get("a"), Some(&2));
}

#[test]
fn ancestors_respect_depth_bound() {
    let graph = map(&[("c0", "c1"), ("c1", "c2"), ("c2", "c3")]);
    let depths = ancestors_with_depth("c3", Some(1), lookup(&graph)).unwrap();
    assert_eq!(depths.len(), 2);
    assert!(depths.contains_key("c2"));
}

#[test]
fn lca_of_diverged_branches_is_fork_point() {
    let graph = map(&[
        ("base", "left-1"),
        ("left-1", "left-2"),
        ("base", "right-1"),
        ("root", "base"),
    ]);
    let found = lowest_common_ancestor("left-2", "right-1", lookup(&graph)).unwrap();
    assert_eq!(found.as_deref(), Some("base"));
}

#[test]
fn lca_returns_input_when_it_is_an_ancestor_of_the_other() {
    let graph = map(&[("a", "b"), ("b", "c")]);
    let found = lowest_common_ancestor("a", "c", lookup(&graph)).unwrap();
    assert_eq!(found.as_deref(), Some("a"));
}

#[test]
fn lca_of_disjoint_graphs_is_none() {
    let graph = map(&[("x0", "x1"), ("y0", "y1")]);
    assert_eq!(lowest_common_ancestor("x1", "y1", lookup(&graph)).unwrap(), None);
}

#[test]
fn lca_gives_up_past_the_depth_cap() {
    let mut edges = Vec::new();
    for i in 0..150 {
        edges.push((format!("l{}", i + 1), format!("l{i}")));
    }
    let mut graph: ParentMap = edges.into_iter().collect();
    graph.insert_edge("l150", "other");
    // "other" is a direct child of l150, but l0 needs 150 levels to reach it.
    assert_eq!(lowest_common_ancestor("l0", "other", lookup(&graph)).unwrap(), None);
    assert_eq!(
        lowest_common_ancestor("l60", "other", lookup(&graph)).unwrap().as_deref(),
        Some("l150")
    );
}

#[test]
fn lca_terminates_on_cyclic_input() {
    let graph = map(&[("a", "b"), ("b", "a"), ("z", "y")]);
    assert_eq!(lowest_common_ancestor("a", "y", lookup(&graph)).unwrap(), None);
}

#[test]
fn inheritance_cycle_detection() {
    let parents = [("child", "parent"), ("parent", "global")];
    let parent_of = |id: &str| -> Result<Option<String>, Infallible> {
        Ok(parents
            .iter()
            .find(|(child, _)| *child == id)
            .map(|(_, parent)| parent.to_string()))
    };

    let chain = inheritance_chain("child", parent_of).unwrap();
    assert_eq!(chain.ids, vec!["child", "parent", "global"]);
    assert!(!chain.cyclic);

    assert!(would_create_cycle("global", "child", parent_of).unwrap());
    assert!(would_create_cycle("x", "x", parent_of).unwrap());
    assert!(!would_create_cycle("other", "child", parent_of).unwrap());
}
