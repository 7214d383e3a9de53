//! Dependency ordering of entity types for a commit.

use crate::config::CyclePolicy;
use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    NotVisited,
    InProgress,
    Visited,
}

#[derive(Debug)]
struct Node {
    descriptor: Arc<EntityDescriptor>,
    dependents: Vec<usize>,
}

/// Topological sorter over entity types.
///
/// An edge `from -> to` means rows of `from` must be written before rows of
/// `to`. Sorting is a depth-first search emitting nodes in reversed
/// post-order, visiting nodes and edges in insertion order so the result
/// is deterministic.
///
/// # Example
///
/// ```rust
/// use ormkit_core::{CommitOrderCalculator, CyclePolicy, EntityDescriptor};
/// use std::sync::Arc;
///
/// let mut calc = CommitOrderCalculator::new();
/// calc.add_node(Arc::new(EntityDescriptor::structured("product")));
/// calc.add_node(Arc::new(EntityDescriptor::structured("category")));
/// calc.add_dependency("category", "product");
///
/// let order: Vec<_> = calc
///     .sort(CyclePolicy::Fail)
///     .unwrap()
///     .iter()
///     .map(|d| d.type_name().to_string())
///     .collect();
/// assert_eq!(order, ["category", "product"]);
/// ```
#[derive(Debug, Default)]
pub struct CommitOrderCalculator {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl CommitOrderCalculator {
    /// Creates an empty calculator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a node exists for `type_name`.
    #[must_use]
    pub fn has_node(&self, type_name: &str) -> bool {
        self.index.contains_key(type_name)
    }

    /// Adds a node. Adding an existing type is a no-op.
    pub fn add_node(&mut self, descriptor: Arc<EntityDescriptor>) {
        if self.has_node(descriptor.type_name()) {
            return;
        }
        self.index
            .insert(descriptor.type_name().to_string(), self.nodes.len());
        self.nodes.push(Node {
            descriptor,
            dependents: Vec::new(),
        });
    }

    /// Records that `from` must come before `to`.
    ///
    /// Self edges, duplicate edges and edges naming unknown nodes are ignored.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let (Some(&from), Some(&to)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        let dependents = &mut self.nodes[from].dependents;
        if !dependents.contains(&to) {
            dependents.push(to);
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if there are no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the descriptors in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CyclicDependency`] under [`CyclePolicy::Fail`]
    /// if the graph has a cycle.
    pub fn sort(&self, policy: CyclePolicy) -> CoreResult<Vec<Arc<EntityDescriptor>>> {
        let mut marks = vec![Visit::NotVisited; self.nodes.len()];
        let mut path = Vec::new();
        let mut post_order = Vec::with_capacity(self.nodes.len());

        for start in 0..self.nodes.len() {
            if marks[start] == Visit::NotVisited {
                self.visit(start, policy, &mut marks, &mut path, &mut post_order)?;
            }
        }

        Ok(post_order
            .into_iter()
            .rev()
            .map(|i| Arc::clone(&self.nodes[i].descriptor))
            .collect())
    }

    fn visit(
        &self,
        node: usize,
        policy: CyclePolicy,
        marks: &mut [Visit],
        path: &mut Vec<usize>,
        post_order: &mut Vec<usize>,
    ) -> CoreResult<()> {
        marks[node] = Visit::InProgress;
        path.push(node);

        for &next in &self.nodes[node].dependents {
            match marks[next] {
                Visit::NotVisited => self.visit(next, policy, marks, path, post_order)?,
                Visit::InProgress => {
                    let cycle = self.cycle_path(path, next);
                    match policy {
                        CyclePolicy::Fail => {
                            return Err(CoreError::CyclicDependency { path: cycle })
                        }
                        CyclePolicy::Break => warn!(
                            cycle = %cycle.join(" -> "),
                            "ignoring dependency that closes a cycle"
                        ),
                    }
                }
                Visit::Visited => {}
            }
        }

        path.pop();
        marks[node] = Visit::Visited;
        post_order.push(node);
        Ok(())
    }

    fn cycle_path(&self, path: &[usize], back_to: usize) -> Vec<String> {
        let start = path.iter().position(|&n| n == back_to).unwrap_or(0);
        path[start..]
            .iter()
            .chain(std::iter::once(&back_to))
            .map(|&n| self.nodes[n].descriptor.type_name().to_string())
            .collect()
    }
}
