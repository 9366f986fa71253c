//! Dependency graph over provider tokens.
//!
//! Built from a snapshot of the container's providers and never touches the
//! live registry afterwards. Edges point from dependent to dependency.
//! Analysis (cycles, topological order, subgraphs, paths) lives in
//! [`analysis`].

pub mod analysis;

use serde::Serialize;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::debug;

use crate::{
    error::GraphError,
    provider::{Provider, Scope, Token},
};

pub use analysis::GraphStats;

/// Descriptive provider data carried by a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMetadata {
    pub kind: &'static str,
    pub scope: Scope,
    pub priority: i32,
    pub tags: Vec<String>,
    pub module: Option<String>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            kind: "value",
            scope: Scope::Singleton,
            priority: 0,
            tags: Vec::new(),
            module: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub token: Token,
    pub metadata: NodeMetadata,
    /// Outgoing edges in insertion order, without duplicates
    pub dependencies: Vec<Token>,
    pub dependents: BTreeSet<Token>,
}

impl GraphNode {
    fn new(token: Token, metadata: NodeMetadata) -> Self {
        Self {
            token,
            metadata,
            dependencies: Vec::new(),
            dependents: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub from: Token,
    pub to: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    order: Vec<Token>,
    nodes: HashMap<Token, GraphNode>,
    edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot providers: one node each, one edge per declared dependency.
    /// Aliases get an edge to their target.
    pub fn from_providers(providers: &[Arc<Provider>]) -> Self {
        let mut graph = Self::new();
        for provider in providers {
            graph.add_node(
                provider.token(),
                NodeMetadata {
                    kind: provider.kind().name(),
                    scope: provider.scope(),
                    priority: provider.priority(),
                    tags: provider.tags().iter().cloned().collect(),
                    module: provider.module().map(str::to_string),
                },
            );
        }

        for provider in providers {
            let targets = provider
                .dependencies()
                .iter()
                .map(String::as_str)
                .chain(provider.alias_target());
            for target in targets {
                // source node was added above
                let _ = graph.add_edge(provider.token(), target);
            }
        }

        debug!(
            "Built dependency graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    /// Add a node; re-adding an existing token only refreshes its metadata.
    /// Dangling edges already pointing at a new token become its dependents.
    pub fn add_node(&mut self, token: impl Into<Token>, metadata: NodeMetadata) {
        let token = token.into();
        match self.nodes.get_mut(&token) {
            Some(node) => node.metadata = metadata,
            None => {
                let mut node = GraphNode::new(token.clone(), metadata);
                node.dependents = self
                    .edges
                    .iter()
                    .filter(|e| e.to == token)
                    .map(|e| e.from.clone())
                    .collect();
                self.order.push(token.clone());
                self.nodes.insert(token, node);
            }
        }
    }

    /// Add `from -> to`. The target may be unregistered (a dangling edge).
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(from).ok_or_else(|| GraphError::UnknownNode {
            token: from.to_string(),
        })?;
        if node.dependencies.iter().any(|d| d == to) {
            return Ok(());
        }
        node.dependencies.push(to.to_string());

        if let Some(target) = self.nodes.get_mut(to) {
            target.dependents.insert(from.to_string());
        }
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Node for `token`, `None` when it only appears as an edge target
    pub fn node(&self, token: &str) -> Option<&GraphNode> {
        self.nodes.get(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.nodes.contains_key(token)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(|t| self.nodes.get(t))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.order
    }

    /// Edges in insertion order, dangling ones included
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes nothing depends on
    pub fn entry_points(&self) -> Vec<Token> {
        self.nodes()
            .filter(|n| n.dependents.is_empty())
            .map(|n| n.token.clone())
            .collect()
    }

    /// Nodes with no dependencies
    pub fn leaves(&self) -> Vec<Token> {
        self.nodes()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.token.clone())
            .collect()
    }

    /// Edges whose target has no node
    pub fn missing_dependencies(&self) -> Vec<GraphEdge> {
        self.edges
            .iter()
            .filter(|e| !self.nodes.contains_key(&e.to))
            .cloned()
            .collect()
    }

    /// Dependencies of `token` that exist as nodes
    pub(crate) fn known_dependencies<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a str> {
        self.nodes
            .get(token)
            .into_iter()
            .flat_map(|n| n.dependencies.iter())
            .filter(move |d| self.nodes.contains_key(*d))
            .map(String::as_str)
    }
}
