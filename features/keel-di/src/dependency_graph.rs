use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet, VecDeque},
    hash::Hash,
};

/// Directed graph of nodes and the nodes they depend on
///
/// Used to order providers inside a module and modules inside the application.
/// Nodes and edges keep their insertion order, which makes [DependencyGraph::get_init_order] deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    nodes: Vec<T>,
    index: HashMap<T, usize>,
    /// Outgoing edges per node, in insertion order
    edges: Vec<Vec<usize>>,
}
impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }
}

struct NodeMetadata {
    node: usize,
    depends_on: usize,
    required_by: usize,
}

impl<T: Clone + Eq + Hash> DependencyGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn contains(&self, node: &T) -> bool {
        self.index.contains_key(node)
    }

    pub fn add_node(&mut self, node: T) -> &mut Self {
        self.node_index(node);
        self
    }

    /// Adds an edge from `node` to `dependency`, both nodes are added if missing
    pub fn add_dependency(&mut self, node: T, dependency: T) -> &mut Self {
        let node = self.node_index(node);
        let dependency = self.node_index(dependency);
        if !self.edges[node].contains(&dependency) {
            self.edges[node].push(dependency);
        }
        self
    }

    /// Direct dependencies of a node, empty for unknown nodes
    pub fn get_dependencies(&self, node: &T) -> Vec<T> {
        match self.index.get(node) {
            Some(&index) => self.edges[index]
                .iter()
                .map(|&dependency| self.nodes[dependency].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns every node, dependencies first whenever the graph allows it
    ///
    /// Nodes without outstanding dependencies are emitted in FIFO order.
    /// If only cyclic nodes remain, the node with the fewest outstanding dependencies is picked,
    /// ties go to the node required by the most others, then to the node seen first.
    pub fn get_init_order(&self) -> Vec<T> {
        let count = self.nodes.len();
        let mut metadata: Vec<NodeMetadata> = Vec::with_capacity(count);
        let mut position: Vec<Option<usize>> = vec![None; count];
        let mut queue = VecDeque::new();

        // Metadata is recorded in the order nodes are first seen, either as node or as dependency
        for (node, dependencies) in self.edges.iter().enumerate() {
            if dependencies.is_empty() {
                queue.push_back(node);
            }
            let entry = metadata_entry(&mut metadata, &mut position, node);
            metadata[entry].depends_on = dependencies.len();
            for &dependency in dependencies {
                let entry = metadata_entry(&mut metadata, &mut position, dependency);
                metadata[entry].required_by += 1;
            }
        }

        let mut ordered = vec![false; count];
        let mut order = Vec::with_capacity(count);
        while let Some(current) = queue
            .pop_front()
            .or_else(|| pick_cyclic_node(&metadata, &ordered))
        {
            if ordered[current] {
                continue;
            }
            ordered[current] = true;
            order.push(current);

            for (node, dependencies) in self.edges.iter().enumerate() {
                if !dependencies.contains(&current) {
                    continue;
                }
                let Some(entry) = position[node] else {
                    continue;
                };
                let entry = &mut metadata[entry];
                entry.depends_on = entry.depends_on.saturating_sub(1);
                if entry.depends_on == 0 && !ordered[node] {
                    queue.push_back(node);
                }
            }
        }

        return order.into_iter().map(|node| self.nodes[node].clone()).collect();

        fn metadata_entry(
            metadata: &mut Vec<NodeMetadata>,
            position: &mut [Option<usize>],
            node: usize,
        ) -> usize {
            *position[node].get_or_insert_with(|| {
                metadata.push(NodeMetadata {
                    node,
                    depends_on: 0,
                    required_by: 0,
                });
                metadata.len() - 1
            })
        }

        fn pick_cyclic_node(metadata: &[NodeMetadata], ordered: &[bool]) -> Option<usize> {
            metadata
                .iter()
                .filter(|entry| !ordered[entry.node] && entry.depends_on > 0)
                .min_by(|a, b| match a.depends_on.cmp(&b.depends_on) {
                    Ordering::Equal => b.required_by.cmp(&a.required_by),
                    other => other,
                })
                .map(|entry| entry.node)
        }
    }

    /// Returns every circular dependency chain of the graph
    ///
    /// Each chain starts and ends with the same node.
    pub fn find_cycles(&self) -> Vec<Vec<T>> {
        let mut checked = HashSet::new();
        let mut cycles = Vec::new();
        for node in 0..self.nodes.len() {
            let mut dependency_chain = Vec::new();
            check_recurse(self, &mut checked, &mut cycles, &mut dependency_chain, node);
        }

        return cycles
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|node| self.nodes[node].clone()).collect())
            .collect();

        fn check_recurse<T>(
            graph: &DependencyGraph<T>,
            checked: &mut HashSet<usize>,
            cycles: &mut Vec<Vec<usize>>,
            dependency_chain: &mut Vec<usize>,
            node: usize,
        ) {
            if let Some(start) = dependency_chain.iter().position(|&entry| entry == node) {
                let mut cycle = dependency_chain[start..].to_vec();
                cycle.push(node); // Add current so chain is complete
                cycles.push(cycle);
                return;
            }

            // Skip if already checked
            if !checked.insert(node) {
                return;
            }

            dependency_chain.push(node);
            for &dependency in &graph.edges[node] {
                check_recurse(graph, checked, cycles, dependency_chain, dependency);
            }
            dependency_chain.pop();
        }
    }

    fn node_index(&mut self, node: T) -> usize {
        if let Some(&index) = self.index.get(&node) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(node.clone());
        self.index.insert(node, index);
        self.edges.push(Vec::new());
        index
    }
}
