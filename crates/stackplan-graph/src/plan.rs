//! Dependency resolution into a layered deployment plan.
//!
//! Edges come from two places: each node's explicit `dependsOn` set and the
//! ids named by its reference attributes (`networkId`, `clusterId`,
//! `databaseRef`, `targetId`, `taskDefinitionId`). The edges are loaded into
//! a `petgraph` map pointing from dependency to dependent, then peeled with
//! Kahn's algorithm one layer at a time. Within a layer ids are sorted, so
//! identical input always yields an identical plan.
//!
//! Before sorting, every reference attribute must name a node of a kind it
//! accepts (see [`reference_targets`]): a service's `clusterId` must be a
//! container cluster, a `networkId` must be the network, and so on.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use stackplan_common::error::{Result, StackError};
use stackplan_common::types::ResourceId;

use crate::graph::ResourceGraph;
use crate::model::reference_targets;

/// Ordered layers of node ids; every node in a layer can be provisioned
/// concurrently once all earlier layers are done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedPlan {
    layers: Vec<Vec<ResourceId>>,
}

impl OrderedPlan {
    /// The layers, first to last.
    #[must_use]
    pub fn layers(&self) -> &[Vec<ResourceId>] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` for the plan of an empty graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total number of node ids across all layers.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Index of the layer containing `id`.
    #[must_use]
    pub fn layer_of(&self, id: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.iter().any(|n| n.as_str() == id))
    }

    /// All ids in plan order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceId> {
        self.layers.iter().flatten()
    }
}

/// Resolves a sealed graph into a layered plan.
///
/// # Errors
///
/// - [`StackError::UnknownReference`] if any explicit or implicit edge names
///   an id absent from the graph. Checked before sorting.
/// - [`StackError::CyclicDependency`] if the graph has a cycle; the error
///   carries one cycle in dependency order and no partial plan is returned.
/// - [`StackError::InvalidNode`] if a reference attribute is not a string,
///   or names a node of a kind it does not accept. Checked before sorting.
pub fn resolve(graph: &ResourceGraph) -> Result<OrderedPlan> {
    let dag = build_dag(graph)?;

    let mut in_degree: BTreeMap<&ResourceId, usize> = dag
        .nodes()
        .map(|n| (n, dag.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut layers: Vec<Vec<ResourceId>> = Vec::new();
    loop {
        let ready: Vec<&ResourceId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in &ready {
            let _ = in_degree.remove(id);
        }
        for id in &ready {
            for dependent in dag.neighbors_directed(*id, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                }
            }
        }
        tracing::debug!(layer = layers.len(), nodes = ready.len(), "layer resolved");
        layers.push(ready.into_iter().cloned().collect());
    }

    if !in_degree.is_empty() {
        let residual: BTreeSet<&ResourceId> = in_degree.keys().copied().collect();
        let cycle = find_cycle(&dag, &residual);
        tracing::warn!(cycle = ?cycle, "dependency cycle");
        return Err(StackError::CyclicDependency { cycle });
    }

    let plan = OrderedPlan { layers };
    tracing::info!(layers = plan.len(), nodes = plan.node_count(), "plan resolved");
    Ok(plan)
}

fn build_dag(graph: &ResourceGraph) -> Result<DiGraphMap<&ResourceId, ()>> {
    let mut dag: DiGraphMap<&ResourceId, ()> = DiGraphMap::with_capacity(graph.len(), graph.len());
    for node in graph.nodes() {
        let _ = dag.add_node(node.id());
    }
    for node in graph.nodes() {
        for dep in node.dependencies()? {
            let Some(target) = graph.id_of(dep) else {
                return Err(StackError::UnknownReference {
                    from: node.id().to_string(),
                    to: dep.to_string(),
                });
            };
            let _ = dag.add_edge(target, node.id(), ());
        }
    }
    check_reference_kinds(graph)?;
    Ok(dag)
}

fn check_reference_kinds(graph: &ResourceGraph) -> Result<()> {
    for node in graph.nodes() {
        for (key, target) in node.references()? {
            let accepted = reference_targets(key);
            match graph.node(target) {
                Some(found) if !accepted.contains(&found.kind()) => {
                    let expected: Vec<String> = accepted.iter().map(ToString::to_string).collect();
                    return Err(StackError::invalid_node(
                        node.id().as_str(),
                        format!(
                            "`{key}` must name a {}, but {target} is a {}",
                            expected.join(" or "),
                            found.kind()
                        ),
                    ));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Walks dependencies among the residual nodes, always taking the smallest
/// id, until a node repeats. Every residual node has at least one residual
/// dependency, so the walk always closes a loop.
fn find_cycle(dag: &DiGraphMap<&ResourceId, ()>, residual: &BTreeSet<&ResourceId>) -> Vec<String> {
    let Some(&start) = residual.first() else {
        return Vec::new();
    };
    let mut path: Vec<&ResourceId> = vec![start];
    let mut seen: BTreeMap<&ResourceId, usize> = BTreeMap::from([(start, 0)]);
    let mut current = start;
    while let Some(next) = dag
        .neighbors_directed(current, Direction::Incoming)
        .filter(|n| residual.contains(n))
        .min()
    {
        if let Some(&pos) = seen.get(&next) {
            return path[pos..].iter().map(ToString::to_string).collect();
        }
        let _ = seen.insert(next, path.len());
        path.push(next);
        current = next;
    }
    path.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::graph::GraphBuilder;
    use crate::model::{Attributes, ResourceKind, ResourceNode};

    fn node(id: &str, attrs: serde_json::Value) -> ResourceNode {
        typed(id, ResourceKind::ContainerService, attrs)
    }

    fn typed(id: &str, kind: ResourceKind, attrs: serde_json::Value) -> ResourceNode {
        let attributes: Attributes = match attrs {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => Attributes::new(),
        };
        ResourceNode::new(ResourceId::new(id).expect("id"), kind, attributes)
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> ResourceGraph {
        let builder = GraphBuilder::new();
        for id in nodes {
            builder.add_node(node(id, json!({}))).expect("add");
        }
        for (from, to) in edges {
            builder.add_dependency(from, to).expect("edge");
        }
        builder.seal().expect("seal")
    }

    fn ids(plan: &OrderedPlan) -> Vec<Vec<&str>> {
        plan.layers()
            .iter()
            .map(|layer| layer.iter().map(ResourceId::as_str).collect())
            .collect()
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let plan = resolve(&graph(&[], &[])).expect("should resolve");
        assert!(plan.is_empty());
        assert_eq!(plan.node_count(), 0);
    }

    #[test]
    fn edgeless_graph_is_one_sorted_layer() {
        let plan = resolve(&graph(&["zeta", "alpha", "mid", "beta"], &[])).expect("should resolve");
        assert_eq!(ids(&plan), vec![vec!["alpha", "beta", "mid", "zeta"]]);
    }

    #[test]
    fn linear_dependency_chain() {
        let plan = resolve(&graph(&["api", "db", "net"], &[("api", "db"), ("db", "net")]))
            .expect("should resolve");
        assert_eq!(ids(&plan), vec![vec!["net"], vec!["db"], vec!["api"]]);
    }

    #[test]
    fn diamond_dependency() {
        let plan = resolve(&graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        ))
        .expect("should resolve");
        assert_eq!(ids(&plan), vec![vec!["d"], vec!["b", "c"], vec!["a"]]);
    }

    #[test]
    fn implicit_references_order_nodes() {
        let builder = GraphBuilder::new();
        builder
            .add_node(typed("net", ResourceKind::Network, json!({})))
            .expect("add");
        builder
            .add_node(typed("cluster", ResourceKind::ContainerCluster, json!({"networkId": "net"})))
            .expect("add");
        builder
            .add_node(node("svc", json!({"clusterId": "cluster", "networkId": "net"})))
            .expect("add");
        let plan = resolve(&builder.seal().expect("seal")).expect("should resolve");
        assert_eq!(ids(&plan), vec![vec!["net"], vec!["cluster"], vec!["svc"]]);
    }

    #[test]
    fn every_edge_points_to_an_earlier_layer() {
        let builder = GraphBuilder::new();
        builder
            .add_node(typed("a", ResourceKind::Database, json!({})))
            .expect("add");
        for id in ["b", "c", "d", "e", "f"] {
            builder.add_node(node(id, json!({}))).expect("add");
        }
        builder
            .add_node(node("g", json!({"targetId": "e", "databaseRef": "a"})))
            .expect("add");
        for (from, to) in [("b", "a"), ("c", "a"), ("d", "b"), ("d", "c"), ("f", "d"), ("e", "c")] {
            builder.add_dependency(from, to).expect("edge");
        }
        let graph = builder.seal().expect("seal");
        let plan = resolve(&graph).expect("should resolve");

        assert_eq!(plan.node_count(), graph.len());
        for n in graph.nodes() {
            let own = plan.layer_of(n.id().as_str()).expect("placed");
            for dep in n.dependencies().expect("deps") {
                let theirs = plan.layer_of(dep).expect("placed");
                assert!(theirs < own, "{dep} must precede {}", n.id());
            }
        }
    }

    #[test]
    fn unknown_reference_fails_before_sorting() {
        let builder = GraphBuilder::new();
        builder.add_node(node("a", json!({}))).expect("add");
        builder
            .add_node(node("svc", json!({"clusterId": "ghost"})))
            .expect("add");
        builder.add_dependency("a", "svc").expect("edge");
        builder.add_dependency("svc", "a").expect("edge");
        let err = resolve(&builder.seal().expect("seal")).unwrap_err();
        assert!(
            matches!(err, StackError::UnknownReference { ref from, ref to } if from == "svc" && to == "ghost"),
            "got: {err}"
        );
    }

    fn reference_error(nodes: Vec<ResourceNode>) -> StackError {
        let builder = GraphBuilder::new();
        for n in nodes {
            builder.add_node(n).expect("add");
        }
        resolve(&builder.seal().expect("seal")).unwrap_err()
    }

    #[test]
    fn cluster_reference_to_a_database_is_invalid() {
        let err = reference_error(vec![
            typed("net-1", ResourceKind::Network, json!({})),
            typed("db-1", ResourceKind::Database, json!({"networkId": "net-1"})),
            typed("cl-1", ResourceKind::ContainerCluster, json!({"networkId": "net-1"})),
            node("svc-1", json!({"clusterId": "db-1", "networkId": "net-1"})),
        ]);
        assert!(
            matches!(err, StackError::InvalidNode { ref id, ref reason }
                if id == "svc-1" && reason.contains("clusterId") && reason.contains("Database")),
            "got: {err}"
        );
    }

    #[test]
    fn network_reference_to_a_cluster_is_invalid() {
        let err = reference_error(vec![
            typed("net-1", ResourceKind::Network, json!({})),
            typed("cl-1", ResourceKind::ContainerCluster, json!({"networkId": "net-1"})),
            node("svc-1", json!({"clusterId": "cl-1", "networkId": "cl-1"})),
        ]);
        assert!(
            matches!(err, StackError::InvalidNode { ref id, ref reason } if id == "svc-1" && reason.contains("networkId")),
            "got: {err}"
        );
    }

    #[test]
    fn database_and_task_references_must_match_their_kinds() {
        let err = reference_error(vec![
            typed("cl-1", ResourceKind::ContainerCluster, json!({})),
            node("other", json!({"clusterId": "cl-1"})),
            node("svc-1", json!({"clusterId": "cl-1", "databaseRef": "other"})),
        ]);
        assert!(matches!(err, StackError::InvalidNode { ref id, .. } if id == "svc-1"), "got: {err}");

        let err = reference_error(vec![
            typed("cl-1", ResourceKind::ContainerCluster, json!({})),
            node("svc-1", json!({"clusterId": "cl-1", "taskDefinitionId": "cl-1"})),
        ]);
        assert!(
            matches!(err, StackError::InvalidNode { ref reason, .. } if reason.contains("ContainerTaskDefinition")),
            "got: {err}"
        );
    }

    #[test]
    fn health_check_must_target_a_database_or_service() {
        let err = reference_error(vec![
            typed("net-1", ResourceKind::Network, json!({})),
            typed("hc-1", ResourceKind::HealthCheck, json!({"targetId": "net-1"})),
        ]);
        assert!(
            matches!(err, StackError::InvalidNode { ref id, ref reason }
                if id == "hc-1" && reason.contains("Database or ContainerService or LoadBalancedService")),
            "got: {err}"
        );
    }

    #[test]
    fn health_checks_on_databases_and_services_resolve() {
        let builder = GraphBuilder::new();
        builder
            .add_node(typed("db-1", ResourceKind::Database, json!({})))
            .expect("add");
        builder.add_node(node("svc-1", json!({}))).expect("add");
        builder
            .add_node(typed("hc-db", ResourceKind::HealthCheck, json!({"targetId": "db-1"})))
            .expect("add");
        builder
            .add_node(typed("hc-svc", ResourceKind::HealthCheck, json!({"targetId": "svc-1"})))
            .expect("add");
        let plan = resolve(&builder.seal().expect("seal")).expect("should resolve");
        assert_eq!(ids(&plan), vec![vec!["db-1", "svc-1"], vec!["hc-db", "hc-svc"]]);
    }

    #[test]
    fn unknown_reference_wins_over_kind_mismatch() {
        let err = reference_error(vec![
            typed("db-1", ResourceKind::Database, json!({})),
            node("a-svc", json!({"clusterId": "db-1"})),
            node("b-svc", json!({"networkId": "ghost"})),
        ]);
        assert!(matches!(err, StackError::UnknownReference { ref to, .. } if to == "ghost"), "got: {err}");
    }

    #[test]
    fn two_node_cycle_names_both() {
        let err = resolve(&graph(&["a", "b"], &[("a", "b"), ("b", "a")])).unwrap_err();
        match err {
            StackError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a", "b"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn three_node_cycle_detection() {
        let err = resolve(&graph(
            &["a", "b", "c", "root"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("a", "root")],
        ))
        .unwrap_err();
        match err {
            StackError::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 3);
                for id in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|n| n == id), "{id} missing from {cycle:?}");
                }
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn cycle_behind_acyclic_prefix_is_isolated() {
        let err = resolve(&graph(
            &["app", "x", "y", "base"],
            &[("app", "x"), ("x", "y"), ("y", "x"), ("x", "base")],
        ))
        .unwrap_err();
        match err {
            StackError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["x", "y"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = resolve(&graph(&["a"], &[("a", "a")])).unwrap_err();
        match err {
            StackError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn plan_serializes_as_nested_arrays() {
        let plan = resolve(&graph(&["a", "b"], &[("b", "a")])).expect("should resolve");
        let json = serde_json::to_string(&plan).expect("serialize");
        assert_eq!(json, r#"[["a"],["b"]]"#);
    }

    // ── Generated graphs ─────────────────────────────────────────────────

    const MAX_NODES: usize = 12;
    const MAX_PAIRS: usize = MAX_NODES * (MAX_NODES - 1) / 2;

    fn gid(i: usize) -> String {
        format!("n{i:02}")
    }

    /// Acyclic graph of `n` nodes where node `j` may only depend on `i < j`.
    /// One pick per pair: 1 adds an explicit edge, 2 a `targetId` reference
    /// (explicit once the node already has one), anything else no edge.
    fn dag_builder(n: usize, picks: &[u8]) -> GraphBuilder {
        let mut explicit = Vec::new();
        let mut implicit: BTreeMap<usize, usize> = BTreeMap::new();
        let mut pairs = picks.iter().copied();
        for j in 0..n {
            for i in 0..j {
                match pairs.next() {
                    Some(1) => explicit.push((j, i)),
                    Some(2) if !implicit.contains_key(&j) => {
                        let _ = implicit.insert(j, i);
                    }
                    Some(2) => explicit.push((j, i)),
                    _ => {}
                }
            }
        }
        let builder = GraphBuilder::new();
        for j in 0..n {
            let attrs = implicit
                .get(&j)
                .map_or_else(|| json!({}), |i| json!({"targetId": gid(*i)}));
            builder.add_node(node(&gid(j), attrs)).expect("add");
        }
        for (from, to) in explicit {
            builder.add_dependency(&gid(from), &gid(to)).expect("edge");
        }
        builder
    }

    /// Each id in `cycle` depends on the next, and the last on the first.
    fn closes_loop(graph: &ResourceGraph, cycle: &[String]) -> bool {
        cycle.iter().enumerate().all(|(m, id)| {
            let next = cycle[(m + 1) % cycle.len()].as_str();
            graph
                .node(id)
                .is_some_and(|n| n.dependencies().is_ok_and(|deps| deps.contains(next)))
        })
    }

    fn expect_cycle(graph: &ResourceGraph) -> Vec<String> {
        match resolve(graph) {
            Err(StackError::CyclicDependency { cycle }) => cycle,
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn generated_dag_places_dependencies_in_earlier_layers(
            n in 1..=MAX_NODES,
            picks in prop::collection::vec(0u8..3, MAX_PAIRS),
        ) {
            let graph = dag_builder(n, &picks).seal().expect("seal");
            let plan = resolve(&graph).expect("acyclic graph resolves");
            prop_assert_eq!(plan.node_count(), n);

            for layer in plan.layers() {
                prop_assert!(layer.windows(2).all(|w| w[0] < w[1]), "unsorted layer {:?}", layer);
            }
            for resource in graph.nodes() {
                let own = plan.layer_of(resource.id().as_str()).expect("placed");
                let deps = resource.dependencies().expect("deps");
                for dep in &deps {
                    let theirs = plan.layer_of(dep).expect("placed");
                    prop_assert!(theirs < own, "{} must precede {}", dep, resource.id());
                }
                if own > 0 {
                    prop_assert!(
                        deps.iter().any(|d| plan.layer_of(d) == Some(own - 1)),
                        "{} could sit in an earlier layer",
                        resource.id()
                    );
                }
            }
        }

        #[test]
        fn edgeless_graph_is_one_sorted_layer_for_any_ids(
            names in prop::collection::btree_set("[a-z][a-z0-9_.-]{0,10}", 0..24),
        ) {
            let builder = GraphBuilder::new();
            for name in &names {
                builder.add_node(node(name, json!({}))).expect("add");
            }
            let plan = resolve(&builder.seal().expect("seal")).expect("resolve");
            let expected: Vec<Vec<&str>> = if names.is_empty() {
                Vec::new()
            } else {
                vec![names.iter().map(String::as_str).collect()]
            };
            prop_assert_eq!(ids(&plan), expected);
        }

        #[test]
        fn injected_cycle_is_reported_whole(
            n in 1..=MAX_NODES,
            picks in prop::collection::vec(0u8..3, MAX_PAIRS),
            ring_len in 1usize..=5,
        ) {
            let builder = dag_builder(n, &picks);
            let ring: Vec<String> = (0..ring_len).map(|m| format!("c{m}")).collect();
            for (m, id) in ring.iter().enumerate() {
                let anchor = ResourceId::new(gid(m % n)).expect("id");
                builder
                    .add_node(node(id, json!({})).with_dependencies([anchor]))
                    .expect("add");
            }
            for (m, id) in ring.iter().enumerate() {
                builder.add_dependency(id, &ring[(m + 1) % ring_len]).expect("edge");
            }
            let graph = builder.seal().expect("seal");

            let cycle = expect_cycle(&graph);
            let reported: BTreeSet<&str> = cycle.iter().map(String::as_str).collect();
            let injected: BTreeSet<&str> = ring.iter().map(String::as_str).collect();
            prop_assert_eq!(cycle.len(), ring_len);
            prop_assert_eq!(reported, injected);
            prop_assert!(closes_loop(&graph, &cycle), "{:?} is not a loop", cycle);
        }

        #[test]
        fn cycle_through_a_dag_yields_a_real_loop(
            picks in prop::collection::vec(0u8..3, MAX_PAIRS),
            ring in prop::collection::btree_set(0..MAX_NODES, 1..6),
        ) {
            let builder = dag_builder(MAX_NODES, &picks);
            let ring: Vec<usize> = ring.into_iter().collect();
            for (m, from) in ring.iter().enumerate() {
                builder
                    .add_dependency(&gid(*from), &gid(ring[(m + 1) % ring.len()]))
                    .expect("edge");
            }
            let graph = builder.seal().expect("seal");

            let cycle = expect_cycle(&graph);
            prop_assert!(!cycle.is_empty());
            prop_assert!(closes_loop(&graph, &cycle), "{:?} is not a loop", cycle);
        }
    }
}
