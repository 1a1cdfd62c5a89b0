//! Resource dependency graph
//!
//! Infrastructure is declared as a graph of [`ResourceNode`]s and executed in
//! dependency order: validation up front (duplicate roles, unknown
//! dependencies, cycles), then topological waves where every node in a wave
//! only depends on earlier waves. Waves run concurrently; destroy walks the
//! same waves in reverse.

mod executor;
mod node;
mod outputs;

pub use executor::{apply, destroy, ApplyReport, DestroyReport, ResourceProvisioner};
pub use node::{
    FirewallAllow, OutputField, OutputRef, ResourceNode, ResourceSpec, RollingUpdatePolicy,
};
pub use outputs::{OutputStore, ResourceOutputs};

use std::collections::HashMap;

use crate::error::GraphError;

/// A validated, acyclic set of resources.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    waves: Vec<Vec<usize>>,
}

impl ResourceGraph {
    /// Validate the node set and precompute execution waves.
    pub fn new(nodes: Vec<ResourceNode>) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.role.as_str(), i).is_some() {
                return Err(GraphError::DuplicateRole {
                    role: node.role.clone(),
                });
            }
        }

        for node in &nodes {
            for dep in &node.depends_on {
                if !index.contains_key(dep.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        role: node.role.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let waves = compute_waves(&nodes, &index)?;
        Ok(Self { nodes, waves })
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, role: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.role == role)
    }

    /// Execution waves in apply order. Nodes within a wave are independent.
    pub fn waves(&self) -> Vec<Vec<&ResourceNode>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|&i| &self.nodes[i]).collect())
            .collect()
    }

    /// Waves in reverse, for teardown.
    pub fn waves_reversed(&self) -> Vec<Vec<&ResourceNode>> {
        let mut waves = self.waves();
        waves.reverse();
        waves
    }
}

/// Kahn's algorithm, layered: each wave is the set of nodes whose
/// dependencies all sit in earlier waves.
fn compute_waves(
    nodes: &[ResourceNode],
    index: &HashMap<&str, usize>,
) -> Result<Vec<Vec<usize>>, GraphError> {
    let mut indegree: Vec<usize> = nodes.iter().map(|n| n.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.depends_on {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut waves = Vec::new();
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut placed = 0;

    while !ready.is_empty() {
        placed += ready.len();
        let mut next = Vec::new();
        for &i in &ready {
            for &j in &dependents[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    next.push(j);
                }
            }
        }
        waves.push(std::mem::replace(&mut ready, next));
    }

    if placed != nodes.len() {
        let remaining: Vec<&str> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, n)| n.role.as_str())
            .collect();
        return Err(GraphError::Cycle {
            remaining: remaining.join(", "),
        });
    }

    Ok(waves)
}
