//! Graph analysis: cycle enumeration, topological order, subgraphs, paths,
//! statistics.
//!
//! Cycle enumeration and topological sort are deliberately separate passes.
//! `topological_sort` stops at the first back edge; `find_cycles` walks the
//! whole graph and materializes every cycle it meets for diagnostics.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use super::{DependencyGraph, NodeMetadata};
use crate::{error::GraphError, provider::Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Graph statistics
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub average_fan_out: f64,
    pub max_outgoing_dependencies: usize,
    pub max_incoming_dependencies: usize,
    pub most_dependent: Option<Token>,
    pub most_depended_upon: Option<Token>,
    pub missing_dependencies: usize,
}

impl DependencyGraph {
    /// Every cycle found by a DFS with a recursion stack. Each cycle starts
    /// and ends with the same token, e.g. `[A, B, C, A]`.
    pub fn find_cycles(&self) -> Vec<Vec<Token>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut current_path = Vec::new();

        for token in self.tokens() {
            if !visited.contains(token.as_str()) {
                self.dfs_cycles(
                    token,
                    &mut visited,
                    &mut rec_stack,
                    &mut current_path,
                    &mut cycles,
                );
            }
        }
        cycles
    }

    fn dfs_cycles<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        current_path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<Token>>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        current_path.push(node);

        for neighbor in self.known_dependencies(node) {
            if !visited.contains(neighbor) {
                self.dfs_cycles(neighbor, visited, rec_stack, current_path, cycles);
            } else if rec_stack.contains(neighbor) {
                if let Some(start) = current_path.iter().position(|t| *t == neighbor) {
                    let mut cycle: Vec<Token> =
                        current_path[start..].iter().map(|t| t.to_string()).collect();
                    cycle.push(neighbor.to_string());
                    debug!("🔄 Cycle found: {}", cycle.join(" -> "));
                    cycles.push(cycle);
                }
            }
        }

        current_path.pop();
        rec_stack.remove(node);
    }

    pub fn has_cycles(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Order in which every token comes after all of its dependencies.
    /// Fails fast on the first node found in progress twice.
    pub fn topological_sort(&self) -> Result<Vec<Token>, GraphError> {
        let mut colors: HashMap<&str, Color> = self
            .tokens()
            .iter()
            .map(|t| (t.as_str(), Color::White))
            .collect();
        let mut order = Vec::with_capacity(self.node_count());

        for token in self.tokens() {
            if colors.get(token.as_str()) == Some(&Color::White) {
                self.visit_topo(token, &mut colors, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit_topo<'a>(
        &'a self,
        node: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        order: &mut Vec<Token>,
    ) -> Result<(), GraphError> {
        colors.insert(node, Color::Gray);
        for dep in self.known_dependencies(node) {
            match colors.get(dep).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    return Err(GraphError::Cycle {
                        token: dep.to_string(),
                    })
                }
                Color::White => self.visit_topo(dep, colors, order)?,
                Color::Black => {}
            }
        }
        colors.insert(node, Color::Black);
        order.push(node.to_string());
        Ok(())
    }

    /// Copy of the part of the graph reachable from `start` within
    /// `max_depth` dependency hops.
    pub fn subgraph(&self, start: &str, max_depth: usize) -> Result<DependencyGraph, GraphError> {
        if !self.contains(start) {
            return Err(GraphError::UnknownNode {
                token: start.to_string(),
            });
        }

        let mut visited: Vec<&str> = vec![start];
        let mut seen: HashSet<&str> = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for dep in self.known_dependencies(node) {
                if seen.insert(dep) {
                    visited.push(dep);
                    queue.push_back((dep, depth + 1));
                }
            }
        }

        let mut sub = DependencyGraph::new();
        for token in &visited {
            let metadata = self
                .node(token)
                .map(|n| n.metadata.clone())
                .unwrap_or_else(NodeMetadata::default);
            sub.add_node(*token, metadata);
        }
        for edge in self.edges() {
            if seen.contains(edge.from.as_str()) && seen.contains(edge.to.as_str()) {
                sub.add_edge(&edge.from, &edge.to)?;
            }
        }
        Ok(sub)
    }

    /// All simple paths from `from` to `to` using at most `max_depth` edges
    pub fn find_paths(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<Token>>, GraphError> {
        for token in [from, to] {
            if !self.contains(token) {
                return Err(GraphError::UnknownNode {
                    token: token.to_string(),
                });
            }
        }

        let mut paths = Vec::new();
        let mut path = vec![from];
        self.walk_paths(from, to, max_depth, &mut path, &mut paths);
        Ok(paths)
    }

    fn walk_paths<'a>(
        &'a self,
        node: &'a str,
        target: &str,
        remaining: usize,
        path: &mut Vec<&'a str>,
        paths: &mut Vec<Vec<Token>>,
    ) {
        if node == target && path.len() > 1 {
            paths.push(path.iter().map(|t| t.to_string()).collect());
            return;
        }
        if remaining == 0 {
            return;
        }
        for dep in self.known_dependencies(node) {
            if path.contains(&dep) {
                continue;
            }
            path.push(dep);
            self.walk_paths(dep, target, remaining - 1, path, paths);
            path.pop();
        }
    }

    /// Counts, fan-out and the busiest nodes in both directions
    pub fn stats(&self) -> GraphStats {
        let total_nodes = self.node_count();
        let total_edges = self.edge_count();
        let average_fan_out = if total_nodes > 0 {
            total_edges as f64 / total_nodes as f64
        } else {
            0.0
        };

        let mut max_out = 0;
        let mut max_in = 0;
        let mut most_dependent = None;
        let mut most_depended_upon = None;
        for node in self.nodes() {
            if node.dependencies.len() > max_out {
                max_out = node.dependencies.len();
                most_dependent = Some(node.token.clone());
            }
            if node.dependents.len() > max_in {
                max_in = node.dependents.len();
                most_depended_upon = Some(node.token.clone());
            }
        }

        GraphStats {
            total_nodes,
            total_edges,
            average_fan_out,
            max_outgoing_dependencies: max_out,
            max_incoming_dependencies: max_in,
            most_dependent,
            most_depended_upon,
            missing_dependencies: self.missing_dependencies().len(),
        }
    }

    /// Human-readable summary including every cycle
    pub fn report(&self) -> String {
        let stats = self.stats();
        let cycles = self.find_cycles();

        let mut report = format!(
            "=== Dependency Graph Report ===\n\
             Total nodes: {}\n\
             Total edges: {}\n\
             Average fan-out: {:.2}\n\
             Max outgoing dependencies: {}\n\
             Max incoming dependencies: {}\n\
             Most dependent: {}\n\
             Most depended upon: {}\n\
             Missing dependencies: {}\n\
             Circular dependencies found: {}\n",
            stats.total_nodes,
            stats.total_edges,
            stats.average_fan_out,
            stats.max_outgoing_dependencies,
            stats.max_incoming_dependencies,
            stats.most_dependent.as_deref().unwrap_or("None"),
            stats.most_depended_upon.as_deref().unwrap_or("None"),
            stats.missing_dependencies,
            cycles.len(),
        );
        for (i, cycle) in cycles.iter().enumerate() {
            report.push_str(&format!("Cycle {}: {}\n", i + 1, cycle.join(" -> ")));
        }
        for edge in self.missing_dependencies() {
            report.push_str(&format!("Missing: {} -> {}\n", edge.from, edge.to));
        }
        report.push_str("=============================");
        report
    }
}
