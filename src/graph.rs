//! Dependency graph over the step catalog.
//!
//! The graph validates the catalog at startup and computes a deterministic
//! topological order. Steps caught in a dependency cycle are excluded from
//! the order (with a warning) rather than aborting the whole pipeline.

use crate::errors::EngineError;
use crate::step::Step;
use std::collections::HashMap;
use tracing::warn;

pub type StepIndex = usize;

/// A directed graph of steps keyed by catalog position.
#[derive(Debug)]
pub struct StepGraph {
    steps: Vec<Step>,
    index_map: HashMap<String, StepIndex>,
    /// index -> steps that depend on it
    forward_edges: Vec<Vec<StepIndex>>,
    /// index -> steps it depends on
    reverse_edges: Vec<Vec<StepIndex>>,
}

impl StepGraph {
    /// Build a graph from the catalog. Fails on duplicate ids and unknown
    /// dependencies; cycles are tolerated and surface later through
    /// `topological_order`.
    pub fn build(steps: Vec<Step>) -> Result<Self, EngineError> {
        let mut index_map = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index_map.insert(step.id.clone(), i).is_some() {
                return Err(EngineError::DuplicateStep(step.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); steps.len()];
        let mut reverse_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); steps.len()];

        for (to_idx, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| EngineError::UnknownDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                        })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        Ok(Self {
            steps,
            index_map,
            forward_edges,
            reverse_edges,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, step_id: &str) -> Option<&Step> {
        self.index_map.get(step_id).map(|&i| &self.steps[i])
    }

    /// Steps that depend on the given step.
    pub fn dependents(&self, index: StepIndex) -> &[StepIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Steps the given step depends on.
    pub fn dependencies(&self, index: StepIndex) -> &[StepIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Deterministic topological order via Kahn's algorithm.
    ///
    /// Ties are broken by catalog position so the order is stable. Steps on
    /// a cycle never reach in-degree zero; they are logged and excluded.
    pub fn topological_order(&self) -> TopologicalOrder {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(|d| d.len()).collect();

        let mut ready: Vec<StepIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut ordered = Vec::with_capacity(self.steps.len());
        while !ready.is_empty() {
            // lowest catalog index first
            ready.sort_unstable_by(|a, b| b.cmp(a));
            let node = ready.pop().expect("ready list is non-empty");
            ordered.push(self.steps[node].id.clone());

            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        let excluded: Vec<String> = if ordered.len() != self.steps.len() {
            let cyclic: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(i, _)| !ordered.contains(&self.steps[i].id))
                .map(|(i, _)| self.steps[i].id.clone())
                .collect();
            warn!(steps = ?cyclic, "dependency cycle detected, excluding steps from order");
            cyclic
        } else {
            Vec::new()
        };

        TopologicalOrder { ordered, excluded }
    }
}

/// Result of ordering the catalog.
#[derive(Debug, Clone)]
pub struct TopologicalOrder {
    /// Steps in dependency order.
    pub ordered: Vec<String>,
    /// Steps excluded because they sit on a cycle.
    pub excluded: Vec<String>,
}

impl TopologicalOrder {
    pub fn has_cycle(&self) -> bool {
        !self.excluded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Step, StepPhase};

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, id, "test step", StepPhase::Planning, deps, 5)
    }

    #[test]
    fn builds_simple_graph() {
        let graph = StepGraph::build(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a", "b"]),
        ])
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependencies(2), &[0, 1]);
        assert_eq!(graph.dependents(0), &[1, 2]);
    }

    #[test]
    fn rejects_unknown_dependency() {
        let result = StepGraph::build(vec![step("a", &["ghost"])]);
        assert!(matches!(
            result,
            Err(EngineError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = StepGraph::build(vec![step("a", &[]), step("a", &[])]);
        assert!(matches!(result, Err(EngineError::DuplicateStep(_))));
    }

    #[test]
    fn topological_order_is_stable() {
        let graph = StepGraph::build(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ])
        .unwrap();

        let order = graph.topological_order();
        assert!(!order.has_cycle());
        assert_eq!(order.ordered, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_members_are_excluded_not_fatal() {
        // a <-> b form a cycle; c is independent and must survive.
        let graph = StepGraph::build(vec![
            step("a", &["b"]),
            step("b", &["a"]),
            step("c", &[]),
        ])
        .unwrap();

        let order = graph.topological_order();
        assert!(order.has_cycle());
        assert_eq!(order.ordered, vec!["c"]);
        assert_eq!(order.excluded.len(), 2);
        assert!(order.excluded.contains(&"a".to_string()));
        assert!(order.excluded.contains(&"b".to_string()));
    }

    #[test]
    fn cycle_downstream_of_cycle_is_also_excluded() {
        let graph = StepGraph::build(vec![
            step("a", &["b"]),
            step("b", &["a"]),
            step("c", &["a"]),
        ])
        .unwrap();

        let order = graph.topological_order();
        assert!(order.ordered.is_empty());
        assert_eq!(order.excluded.len(), 3);
    }

    #[test]
    fn default_catalog_is_acyclic() {
        let graph = StepGraph::build(crate::step::default_catalog()).unwrap();
        let order = graph.topological_order();
        assert!(!order.has_cycle());
        assert_eq!(order.ordered.len(), 19);
    }
}
