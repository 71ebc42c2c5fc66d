/// Workflow graph validation and execution planning
///
/// Converts a workflow into a petgraph DAG, rejects malformed and cyclic
/// graphs before anything is scheduled, and answers the dependency questions
/// the coordinator asks while dispatching.

use crate::error::{EngineError, Result};
use crate::workflow::types::Workflow;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Validated dependency graph of one workflow snapshot
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Node weights are node ids; indices follow declaration order
    graph: DiGraph<String, ()>,
    /// Mapping from node ID to graph node index
    index_of: HashMap<String, NodeIndex>,
    /// Topological order, ties broken by declaration order
    order: Vec<String>,
}

impl ExecutionPlan {
    /// Build and validate the plan
    ///
    /// Fails on duplicate node ids, edges naming unknown nodes and cycles.
    pub fn build(workflow: &Workflow) -> Result<Self> {
        tracing::debug!("🏗️ Building execution plan for '{}' ({} nodes, {} edges)",
            workflow.id, workflow.nodes.len(), workflow.edges.len());

        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for node in &workflow.nodes {
            if node.id.trim().is_empty() {
                return Err(EngineError::Validation("Node with empty id".to_string()));
            }
            if index_of.contains_key(&node.id) {
                return Err(EngineError::Validation(format!("Duplicate node id: {}", node.id)));
            }
            let index = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), index);
        }

        for edge in &workflow.edges {
            let from = *index_of.get(&edge.source).ok_or_else(|| {
                EngineError::Validation(format!("Edge references unknown node: {}", edge.source))
            })?;
            let to = *index_of.get(&edge.target).ok_or_else(|| {
                EngineError::Validation(format!("Edge references unknown node: {}", edge.target))
            })?;
            if from == to {
                return Err(EngineError::CycleDetected(edge.source.clone()));
            }
            graph.update_edge(from, to, ());
        }

        if let Some(node_id) = find_cycle(&graph) {
            tracing::error!("❌ Workflow '{}' contains a cycle through '{}'", workflow.id, node_id);
            return Err(EngineError::CycleDetected(node_id));
        }

        let order = topological_order(&graph);
        tracing::debug!("📋 Execution order: {:?}", order);

        Ok(Self { graph, index_of, order })
    }

    /// Node ids in dependency order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Number of nodes in the plan
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index_of.contains_key(node_id)
    }

    /// Direct upstream nodes, in declaration order
    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Number of direct dependencies of a node
    pub fn in_degree(&self, node_id: &str) -> usize {
        self.index_of
            .get(node_id)
            .map(|&idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    /// Every node reachable from `node_id`, excluding itself, in dependency order
    pub fn downstream_of(&self, node_id: &str) -> Vec<String> {
        let Some(&start) = self.index_of.get(node_id) else {
            return Vec::new();
        };

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                reachable.insert(self.graph[idx].as_str());
            }
        }

        self.order
            .iter()
            .filter(|id| reachable.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// True when every direct predecessor is in `completed`
    pub fn dependencies_met(&self, node_id: &str, completed: &HashSet<String>) -> bool {
        self.predecessors(node_id)
            .iter()
            .all(|pred| completed.contains(*pred))
    }

    /// Nodes outside `completed` and `in_flight` whose dependencies are all completed, in plan order
    pub fn ready<'a>(
        &'a self,
        completed: &HashSet<String>,
        in_flight: &HashSet<String>,
    ) -> Vec<&'a str> {
        self.order
            .iter()
            .filter(|id| !completed.contains(*id) && !in_flight.contains(*id))
            .filter(|id| self.dependencies_met(id, completed))
            .map(String::as_str)
            .collect()
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index_of.get(node_id) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort();
        found.into_iter().map(|n| self.graph[n].as_str()).collect()
    }
}

/// DFS with a recursion stack; returns the node that closes a cycle
fn find_cycle(graph: &DiGraph<String, ()>) -> Option<String> {
    fn visit(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        on_stack: &mut HashSet<NodeIndex>,
    ) -> Option<NodeIndex> {
        visited.insert(node);
        on_stack.insert(node);

        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if on_stack.contains(&next) {
                return Some(next);
            }
            if !visited.contains(&next) {
                if let Some(found) = visit(graph, next, visited, on_stack) {
                    return Some(found);
                }
            }
        }

        on_stack.remove(&node);
        None
    }

    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    for node in graph.node_indices() {
        if !visited.contains(&node) {
            if let Some(found) = visit(graph, node, &mut visited, &mut on_stack) {
                return Some(graph[found].clone());
            }
        }
    }
    None
}

/// Kahn's algorithm over in-degrees, lowest declaration index first
fn topological_order(graph: &DiGraph<String, ()>) -> Vec<String> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<NodeIndex>> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(graph[idx].clone());
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node};
    use serde_json::json;

    fn workflow(ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        Workflow {
            id: "wf".to_string(),
            name: "test".to_string(),
            nodes: ids.iter().map(|id| Node::new(id, "noop", json!({}))).collect(),
            edges: edges.iter().map(|(s, t)| Edge::new(s, t)).collect(),
        }
    }

    fn position(plan: &ExecutionPlan, id: &str) -> usize {
        plan.order().iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn order_respects_every_edge() {
        let edges = [("a", "c"), ("b", "c"), ("c", "e"), ("d", "e"), ("a", "d")];
        let wf = workflow(&["e", "d", "c", "b", "a"], &edges);
        let plan = ExecutionPlan::build(&wf).unwrap();

        assert_eq!(plan.len(), 5);
        for (source, target) in edges {
            assert!(position(&plan, source) < position(&plan, target));
        }
        assert_eq!(plan.in_degree("e"), 2);
        assert_eq!(plan.predecessors("c"), vec!["b", "a"]);
    }

    #[test]
    fn independent_nodes_follow_declaration_order() {
        let plan = ExecutionPlan::build(&workflow(&["x", "y", "z"], &[])).unwrap();
        assert_eq!(plan.order(), ["x", "y", "z"]);
    }

    #[test]
    fn rejects_cycles() {
        let cyclic = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(matches!(ExecutionPlan::build(&cyclic), Err(EngineError::CycleDetected(_))));

        let self_loop = workflow(&["a"], &[("a", "a")]);
        assert!(matches!(
            ExecutionPlan::build(&self_loop),
            Err(EngineError::CycleDetected(id)) if id == "a"
        ));
    }

    #[test]
    fn rejects_malformed_graphs() {
        let dangling = workflow(&["a"], &[("a", "ghost")]);
        assert!(matches!(ExecutionPlan::build(&dangling), Err(EngineError::Validation(_))));

        let duplicate = workflow(&["a", "a"], &[]);
        assert!(matches!(ExecutionPlan::build(&duplicate), Err(EngineError::Validation(_))));
    }

    #[test]
    fn downstream_and_readiness() {
        let wf = workflow(&["t", "l", "r", "join", "side"], &[("t", "l"), ("t", "r"), ("l", "join"), ("r", "join")]);
        let plan = ExecutionPlan::build(&wf).unwrap();

        assert_eq!(plan.downstream_of("l"), vec!["join".to_string()]);
        assert_eq!(plan.downstream_of("t").len(), 3);

        let mut completed = HashSet::from(["t".to_string(), "l".to_string()]);
        assert!(!plan.dependencies_met("join", &completed));
        completed.insert("r".to_string());
        assert!(plan.dependencies_met("join", &completed));
        assert!(plan.dependencies_met("side", &HashSet::new()));

        let done = HashSet::from(["t".to_string()]);
        let running = HashSet::from(["l".to_string()]);
        assert_eq!(plan.ready(&done, &running), vec!["r", "side"]);
    }
}
