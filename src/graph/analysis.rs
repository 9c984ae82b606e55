//! Structural analysis of a graph flow.
//!
//! Built once per execution from the configured nodes and edges:
//! adjacency, DFS edge classification (white/gray/black coloring; an edge
//! into a gray node is a back-edge), Kahn topological ordering for the
//! DAG fast path, cycle-participant identification, and the port-gated
//! edge firing rules. Traversal follows declaration order throughout, so
//! tie-breaks are deterministic.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::config::{EdgeConfig, NodeConfig};
use crate::error::FlowError;

pub(crate) struct GraphAnalysis {
    node_order: Vec<String>,
    edges: Vec<EdgeConfig>,
    /// Outgoing edge indexes per node id.
    forward: FxHashMap<String, Vec<usize>>,
    /// Incoming edge indexes per node id.
    reverse: FxHashMap<String, Vec<usize>>,
    back_edges: FxHashSet<(String, String)>,
}

impl GraphAnalysis {
    pub fn new(nodes: &[NodeConfig], edges: &[EdgeConfig]) -> Self {
        let node_order: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let edges: Vec<EdgeConfig> = edges.to_vec();

        let mut forward: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut reverse: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for id in &node_order {
            forward.insert(id.clone(), Vec::new());
            reverse.insert(id.clone(), Vec::new());
        }
        for (idx, edge) in edges.iter().enumerate() {
            if let Some(out) = forward.get_mut(&edge.source) {
                out.push(idx);
            }
            if let Some(inc) = reverse.get_mut(&edge.target) {
                inc.push(idx);
            }
        }

        let mut analysis = GraphAnalysis {
            node_order,
            edges,
            forward,
            reverse,
            back_edges: FxHashSet::default(),
        };
        analysis.back_edges = analysis.classify_back_edges();
        analysis
    }

    /// DFS edge classification. An edge whose target is gray (on the
    /// current traversal stack) is a back-edge.
    fn classify_back_edges(&self) -> FxHashSet<(String, String)> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            node: &str,
            color: &mut FxHashMap<String, Color>,
            forward: &FxHashMap<String, Vec<usize>>,
            edges: &[EdgeConfig],
            back_edges: &mut FxHashSet<(String, String)>,
        ) {
            color.insert(node.to_string(), Color::Gray);
            if let Some(outgoing) = forward.get(node) {
                for &edge_idx in outgoing {
                    let target = &edges[edge_idx].target;
                    match color.get(target).copied().unwrap_or(Color::White) {
                        Color::Gray => {
                            back_edges.insert((node.to_string(), target.clone()));
                        }
                        Color::White => dfs(target, color, forward, edges, back_edges),
                        Color::Black => {}
                    }
                }
            }
            color.insert(node.to_string(), Color::Black);
        }

        let mut color: FxHashMap<String, Color> = self
            .node_order
            .iter()
            .map(|id| (id.clone(), Color::White))
            .collect();
        let mut back_edges = FxHashSet::default();
        for node in &self.node_order {
            if color.get(node) == Some(&Color::White) {
                dfs(node, &mut color, &self.forward, &self.edges, &mut back_edges);
            }
        }
        back_edges
    }

    pub fn has_cycles(&self) -> bool {
        !self.back_edges.is_empty()
    }

    pub fn is_back_edge(&self, source: &str, target: &str) -> bool {
        self.back_edges
            .contains(&(source.to_string(), target.to_string()))
    }

    /// Nodes with no incoming edges: the entry points of a DAG.
    pub fn roots(&self) -> Vec<String> {
        self.node_order
            .iter()
            .filter(|id| self.reverse.get(*id).map_or(true, Vec::is_empty))
            .cloned()
            .collect()
    }

    /// Entry points of a cyclic graph: nodes whose every incoming edge is
    /// a back-edge. Handles self-loops: a self-looping node with no other
    /// incoming edges is still a root.
    pub fn cyclic_roots(&self) -> Vec<String> {
        self.node_order
            .iter()
            .filter(|id| {
                self.reverse
                    .get(*id)
                    .map_or(true, |incoming| {
                        incoming.iter().all(|&idx| {
                            let edge = &self.edges[idx];
                            self.back_edges
                                .contains(&(edge.source.clone(), edge.target.clone()))
                        })
                    })
            })
            .cloned()
            .collect()
    }

    /// Kahn's algorithm. Declaration order breaks ties: the queue is
    /// seeded in declaration order and edges fire in declaration order.
    pub fn topological_order(&self) -> Result<Vec<String>, FlowError> {
        let mut in_degree: FxHashMap<&str, usize> = self
            .node_order
            .iter()
            .map(|id| (id.as_str(), 0))
            .collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .node_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()) == Some(&0))
            .map(String::as_str)
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(self.node_order.len());
        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(outgoing) = self.forward.get(node) {
                for &edge_idx in outgoing {
                    let target = self.edges[edge_idx].target.as_str();
                    if let Some(d) = in_degree.get_mut(target) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        if order.len() != self.node_order.len() {
            return Err(FlowError::Configuration {
                message: "cycle detected in graph flow".to_string(),
                details: vec![format!(
                    "processed {} of {} nodes; remaining nodes are part of a cycle",
                    order.len(),
                    self.node_order.len()
                )],
            });
        }
        Ok(order)
    }

    /// Nodes participating in any cycle: everything on a forward path
    /// from a back-edge target to its back-edge source.
    pub fn cycle_nodes(&self) -> FxHashSet<String> {
        let mut cycle_nodes: FxHashSet<String> = FxHashSet::default();
        for (source, target) in &self.back_edges {
            // BFS from the back-edge target toward its source, skipping
            // back-edges, then trace the parent chain.
            let mut visited: FxHashSet<&str> = FxHashSet::default();
            let mut parent: FxHashMap<&str, Option<&str>> = FxHashMap::default();
            let mut queue: VecDeque<&str> = VecDeque::new();
            queue.push_back(target.as_str());
            parent.insert(target.as_str(), None);

            while let Some(current) = queue.pop_front() {
                if !visited.insert(current) {
                    continue;
                }
                if current == source {
                    let mut path_node = Some(source.as_str());
                    while let Some(node) = path_node {
                        cycle_nodes.insert(node.to_string());
                        path_node = parent.get(node).copied().flatten();
                    }
                    break;
                }
                if let Some(outgoing) = self.forward.get(current) {
                    for &edge_idx in outgoing {
                        let edge = &self.edges[edge_idx];
                        if self
                            .back_edges
                            .contains(&(edge.source.clone(), edge.target.clone()))
                        {
                            continue;
                        }
                        if !visited.contains(edge.target.as_str()) {
                            parent.entry(edge.target.as_str()).or_insert(Some(current));
                            queue.push_back(edge.target.as_str());
                        }
                    }
                }
            }
        }
        cycle_nodes
    }

    /// Which downstream nodes an executed node activates, given its
    /// active port.
    ///
    /// Rules: portless edges always fire; when port-gated edges exist and
    /// an active port is set, a gated edge fires iff its port matches;
    /// gated edges without an active port never fire.
    pub fn reachable_targets(&self, node_id: &str, active_port: Option<&str>) -> Vec<String> {
        let outgoing = match self.forward.get(node_id) {
            Some(edges) if !edges.is_empty() => edges,
            _ => return Vec::new(),
        };
        let has_port_edges = outgoing
            .iter()
            .any(|&idx| self.edges[idx].port.is_some());

        let mut targets = Vec::new();
        for &idx in outgoing {
            let edge = &self.edges[idx];
            match &edge.port {
                None => targets.push(edge.target.clone()),
                Some(port) => {
                    if has_port_edges && active_port == Some(port.as_str()) {
                        targets.push(edge.target.clone());
                    }
                }
            }
        }
        targets
    }
}
