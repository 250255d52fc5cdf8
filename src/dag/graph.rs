// src/dag/graph.rs

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::task_info::{TaskTable, Work};
use crate::engine::TaskName;
use crate::errors::{PipedagError, Result};

/// Internal node structure: stores immediate deps, dependents and the work.
#[derive(Debug, Clone)]
struct DagNode {
    /// Effective dependencies: declared `after` entries followed by group
    /// members, without duplicates.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that list this one as a dependency.
    dependents: Vec<TaskName>,
    work: Work,
}

/// Immutable, validated task graph keyed by task name.
///
/// Construction through [`TaskGraph::build`] guarantees that every dependency
/// resolves and that there are no cycles, so the scheduler never has to
/// re-check either.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: BTreeMap<TaskName, DagNode>,
}

impl TaskGraph {
    /// Validate a task table and build the adjacency structure.
    pub fn build(table: &TaskTable) -> Result<Self> {
        let mut nodes: BTreeMap<TaskName, DagNode> = BTreeMap::new();

        // First pass: effective dependency lists, checking every name resolves.
        for (name, def) in table.iter() {
            let mut deps: Vec<TaskName> = Vec::new();
            let members: &[TaskName] = match &def.work {
                Work::Group(members) => members,
                Work::Transform(_) => &[],
            };

            for dep in def.deps.iter().chain(members.iter()) {
                if !table.contains_key(dep) {
                    return Err(PipedagError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }

            nodes.insert(
                name.clone(),
                DagNode {
                    deps,
                    dependents: Vec::new(),
                    work: def.work.clone(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let edges: Vec<(TaskName, TaskName)> = nodes
            .iter()
            .flat_map(|(name, node)| {
                node.deps
                    .iter()
                    .map(move |dep| (dep.clone(), name.clone()))
            })
            .collect();
        for (dep, task) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(task);
            }
        }

        let graph = Self { nodes };
        graph.ensure_acyclic()?;

        debug!(tasks = graph.nodes.len(), "task graph validated");
        Ok(graph)
    }

    /// Reject the graph if any strongly connected component forms a cycle.
    ///
    /// Edge direction: dep -> task.
    fn ensure_acyclic(&self) -> Result<()> {
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            g.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                g.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        for component in tarjan_scc(&g) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|n| g.contains_edge(*n, *n));
            if is_cycle {
                let mut members: Vec<TaskName> =
                    component.iter().map(|s| s.to_string()).collect();
                members.sort();
                return Err(PipedagError::CyclicDependency { members });
            }
        }

        Ok(())
    }

    /// Return all task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Effective dependencies of a task (declared `after` plus group members).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn work_of(&self, name: &str) -> Option<&Work> {
        self.nodes.get(name).map(|n| &n.work)
    }

    /// The target plus everything it transitively depends on.
    pub fn closure(&self, target: &str) -> Result<HashSet<TaskName>> {
        if !self.contains(target) {
            return Err(PipedagError::UnknownTask(target.to_string()));
        }

        let mut stack: Vec<&str> = vec![target];
        let mut visited: HashSet<TaskName> = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.to_string()) {
                continue;
            }
            stack.extend(self.dependencies_of(name).iter().map(|s| s.as_str()));
        }

        Ok(visited)
    }

    /// Execution plan for `target`: tasks grouped into waves, where every
    /// task of a wave depends only on tasks of earlier waves. Each wave is
    /// sorted.
    ///
    /// This is the order an unbounded, failure-free run dispatches in.
    pub fn waves(&self, target: &str) -> Result<Vec<Vec<TaskName>>> {
        let closure = self.closure(target)?;
        let mut remaining: BTreeMap<&str, usize> = closure
            .iter()
            .map(|name| (name.as_str(), self.dependencies_of(name).len()))
            .collect();

        let mut waves = Vec::new();
        while !remaining.is_empty() {
            let wave: Vec<TaskName> = remaining
                .iter()
                .filter(|(_, deps)| **deps == 0)
                .map(|(name, _)| name.to_string())
                .collect();
            // Unreachable for a validated graph, but never loop forever.
            if wave.is_empty() {
                let members = remaining.keys().map(|s| s.to_string()).collect();
                return Err(PipedagError::CyclicDependency { members });
            }
            for name in &wave {
                remaining.remove(name.as_str());
                for dependent in self.dependents_of(name) {
                    if let Some(count) = remaining.get_mut(dependent.as_str()) {
                        *count -= 1;
                    }
                }
            }
            waves.push(wave);
        }

        Ok(waves)
    }
}
