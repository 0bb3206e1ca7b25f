use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::errors::DependencyError;
use crate::domain::models::ServiceSpec;

/// Resolves start order and reverse dependencies over a set of services.
///
/// Edges point from a service to the services it `needs`. Names are kept in a
/// sorted map so every traversal is reproducible for identical input.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    needs: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyResolver {
    pub fn new(specs: &[ServiceSpec]) -> Self {
        Self {
            needs: specs
                .iter()
                .map(|spec| (spec.name.clone(), spec.needs.clone()))
                .collect(),
        }
    }

    /// Declared names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.needs.keys().map(String::as_str)
    }

    /// Direct dependencies of `name`, in declared order.
    pub fn needs(&self, name: &str) -> &[String] {
        self.needs.get(name).map_or(&[], Vec::as_slice)
    }

    /// Every service, each placed after all services it transitively needs.
    ///
    /// Depth-first with three-coloring, roots visited in name order. Fails on
    /// the first undeclared reference or back-edge; no partial order is
    /// returned.
    pub fn start_order(&self) -> Result<Vec<String>, DependencyError> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.needs.len());
        let mut order = Vec::with_capacity(self.needs.len());

        for root in self.needs.keys() {
            if marks.contains_key(root.as_str()) {
                continue;
            }

            // (node, index of the next need to visit)
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            marks.insert(root.as_str(), Mark::InProgress);

            while let Some(&(node, next)) = stack.last() {
                let node_needs = self.needs(node);
                let Some(dep) = node_needs.get(next) else {
                    marks.insert(node, Mark::Done);
                    order.push(node.to_string());
                    stack.pop();
                    continue;
                };
                let top = stack.len() - 1;
                stack[top].1 += 1;

                let Some((dep, _)) = self.needs.get_key_value(dep.as_str()) else {
                    return Err(DependencyError::MissingDependency {
                        service: node.to_string(),
                        dependency: dep.clone(),
                    });
                };

                match marks.get(dep.as_str()) {
                    None => {
                        marks.insert(dep.as_str(), Mark::InProgress);
                        stack.push((dep.as_str(), 0));
                    }
                    Some(Mark::InProgress) => {
                        return Err(DependencyError::Cycle {
                            service: dep.clone(),
                        });
                    }
                    Some(Mark::Done) => {}
                }
            }
        }

        Ok(order)
    }

    /// Services whose `needs` list contains `name`. Single scan, no traversal.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.needs
            .iter()
            .filter(|(_, needs)| needs.iter().any(|n| n == name))
            .map(|(service, _)| service.clone())
            .collect()
    }

    /// Every service that transitively needs `name`, deepest dependents first.
    ///
    /// Stopping in this order never stops a service while something that needs
    /// it is still running. `name` itself is not included.
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        post_order(name, |node| self.dependents(node))
    }

    /// Every service `name` transitively needs, dependencies first.
    ///
    /// `name` itself is not included.
    pub fn dependency_closure(&self, name: &str) -> Vec<String> {
        post_order(name, |node| self.needs(node).to_vec())
    }
}

/// Iterative post-order walk from `root`, excluding `root`.
fn post_order<F>(root: &str, mut edges: F) -> Vec<String>
where
    F: FnMut(&str) -> Vec<String>,
{
    let children = |node: &str, edges: &mut F| {
        let mut next = edges(node);
        next.reverse();
        next
    };

    let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
    let mut order = Vec::new();
    let mut stack = vec![(root.to_string(), children(root, &mut edges))];

    while let Some((_, pending)) = stack.last_mut() {
        if let Some(child) = pending.pop() {
            if visited.insert(child.clone()) {
                let next = children(&child, &mut edges);
                stack.push((child, next));
            }
        } else if let Some((node, _)) = stack.pop() {
            order.push(node);
        }
    }

    // root finishes last
    order.pop();
    order
}
