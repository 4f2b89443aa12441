//! Register dependency graph.
//!
//! Provides the `RegisterGraph` type. An edge `a -> b` means the formula
//! producing `b` reads `a`, so a change to `a` must invalidate `b`. The
//! store uses it to compute dependency closures and to report the path
//! of a circular reference.

use crate::error::AttribError;
use crate::register::Register;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Directed graph of "is read by" edges between registers.
///
/// # Examples
///
/// ```rust
/// use zzattrib::graph::RegisterGraph;
/// use zzattrib::Register;
///
/// let (r0, r1, r2) = (Register::new(0), Register::new(1), Register::new(2));
/// let mut graph = RegisterGraph::new();
///
/// // R1 reads R0, R2 reads R1
/// graph.add_dependency(r1, r0);
/// graph.add_dependency(r2, r1);
///
/// assert_eq!(graph.dependents_of(r0), vec![r1, r2]);
/// assert!(graph.detect_cycles().is_ok());
/// ```
pub struct RegisterGraph {
    graph: DiGraph<Register, ()>,
    node_map: HashMap<Register, NodeIndex>,
}

impl RegisterGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a node if it doesn't exist and return its index.
    fn add_node(&mut self, register: Register) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&register) {
            idx
        } else {
            let idx = self.graph.add_node(register);
            self.node_map.insert(register, idx);
            idx
        }
    }

    /// Record that `dependent` is computed from `source`.
    ///
    /// Repeated reads of the same source add a single edge.
    ///
    /// # Arguments
    ///
    /// * `dependent` - The register whose formula reads `source`
    /// * `source` - The register being read
    pub fn add_dependency(&mut self, dependent: Register, source: Register) {
        let from_idx = self.add_node(source);
        let to_idx = self.add_node(dependent);
        self.graph.update_edge(from_idx, to_idx, ());
    }

    /// Detect cycles in the graph.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the graph is acyclic
    /// * `Err(AttribError::Cycle)` with a closed path such as `[R0, R1, R0]`
    pub fn detect_cycles(&self) -> Result<(), AttribError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node_idx in self.graph.node_indices() {
            if !visited.contains(&node_idx) {
                let mut cycle_path = Vec::new();
                if let Some(cycle) =
                    self.dfs_cycle_detect(node_idx, &mut visited, &mut rec_stack, &mut cycle_path)
                {
                    return Err(cycle);
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        cycle_path: &mut Vec<Register>,
    ) -> Option<AttribError> {
        visited.insert(node);
        rec_stack.insert(node);
        cycle_path.push(self.graph[node]);

        for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.dfs_cycle_detect(neighbor, visited, rec_stack, cycle_path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&neighbor) {
                let back = self.graph[neighbor];
                let start = cycle_path.iter().position(|r| *r == back).unwrap_or(0);
                let mut path = cycle_path[start..].to_vec();
                path.push(back);
                return Some(AttribError::Cycle { path });
            }
        }

        rec_stack.remove(&node);
        cycle_path.pop();
        None
    }

    /// Every register reachable from `register`, sorted by index.
    ///
    /// This is the dependency closure: all registers whose value is
    /// derived, directly or indirectly, from `register`. The register
    /// itself is only included if it sits on a cycle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattrib::graph::RegisterGraph;
    /// use zzattrib::Register;
    ///
    /// let r = Register::new;
    /// let mut graph = RegisterGraph::new();
    /// // Diamond: R0 feeds R1 and R2, both feed R3
    /// graph.add_dependency(r(1), r(0));
    /// graph.add_dependency(r(2), r(0));
    /// graph.add_dependency(r(3), r(1));
    /// graph.add_dependency(r(3), r(2));
    ///
    /// assert_eq!(graph.dependents_of(r(0)), vec![r(1), r(2), r(3)]);
    /// assert!(graph.dependents_of(r(3)).is_empty());
    /// ```
    pub fn dependents_of(&self, register: Register) -> Vec<Register> {
        let Some(&start) = self.node_map.get(&register) else {
            return Vec::new();
        };
        let mut closure = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                closure.push(self.graph[idx]);
            }
        }
        if self
            .graph
            .neighbors_directed(start, Direction::Incoming)
            .any(|n| dfs.discovered.contains(n.index()))
        {
            closure.push(register);
        }
        closure.sort_unstable();
        closure
    }
}

impl Default for RegisterGraph {
    fn default() -> Self {
        Self::new()
    }
}
