//! Dependency DAG over declared resources.
//!
//! Edges come from two places: explicit [`ResourceGraph::link`] calls and the
//! references held by each resource's attributes. Reference edges are
//! resolved lazily, when the graph is ordered, so declarations may reference
//! resources registered after them.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::debug;

use crate::error::GraphError;

use super::resource::{Resource, ResourceId};

/// A set of declared resources and the dependencies between them.
#[derive(Debug, Default, Clone)]
pub struct ResourceGraph {
    /// Nodes in declaration order.
    nodes: Vec<Resource>,
    /// Identifier to declaration index.
    index: HashMap<ResourceId, usize>,
    /// Explicit links: `links[from]` holds the indices `from` depends on.
    links: Vec<BTreeSet<usize>>,
}

impl ResourceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its declaration index.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidIdentifier`] if the identifier would not
    /// round-trip through its `<type>.<name>` form, and
    /// [`GraphError::DuplicateResource`] if it is taken.
    pub fn register(&mut self, resource: Resource) -> Result<usize, GraphError> {
        resource.id.check()?;
        if self.index.contains_key(&resource.id) {
            return Err(GraphError::DuplicateResource { id: resource.id });
        }

        let idx = self.nodes.len();
        debug!("Registering {} at position {idx}", resource.id);
        self.index.insert(resource.id.clone(), idx);
        self.nodes.push(resource);
        self.links.push(BTreeSet::new());
        Ok(idx)
    }

    /// Records that `from` depends on `to`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] if either end is not registered.
    pub fn link(&mut self, from: &ResourceId, to: &ResourceId) -> Result<(), GraphError> {
        let from_idx = self.require(from, None)?;
        let to_idx = self.require(to, Some(from))?;
        self.links[from_idx].insert(to_idx);
        Ok(())
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Looks up a resource by identifier.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Returns the declaration index of a resource.
    #[must_use]
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns the resource declared at `idx`.
    #[must_use]
    pub fn at(&self, idx: usize) -> Option<&Resource> {
        self.nodes.get(idx)
    }

    /// Iterates resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.nodes.iter()
    }

    /// Computes every node's dependency set, merging explicit links and
    /// attribute references.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] for a reference to an
    /// unregistered resource.
    pub(crate) fn edges(&self) -> Result<Vec<BTreeSet<usize>>, GraphError> {
        let mut edges = self.links.clone();
        for (idx, node) in self.nodes.iter().enumerate() {
            for reference in node.references() {
                let target = self.require(&reference.resource, Some(&node.id))?;
                edges[idx].insert(target);
            }
        }
        Ok(edges)
    }

    /// Orders the graph and returns declaration indices, dependencies first,
    /// along with the merged edge sets.
    ///
    /// Among nodes whose dependencies are all resolved, the one declared
    /// first is emitted first (see [`sort_by_index`]).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] with the full cycle path, or
    /// [`GraphError::UnknownResource`] for dangling references.
    pub(crate) fn sorted_indices(&self) -> Result<(Vec<usize>, Vec<BTreeSet<usize>>), GraphError> {
        let edges = self.edges()?;
        match sort_by_index(&edges) {
            Ok(order) => Ok((order, edges)),
            Err(path) => Err(GraphError::CyclicDependency {
                cycle: path.into_iter().map(|i| self.nodes[i].id.clone()).collect(),
            }),
        }
    }

    /// Returns identifiers in dependency order.
    ///
    /// Ties break by declaration order: whenever several resources have all
    /// their dependencies emitted, the one registered first goes next.
    ///
    /// # Errors
    ///
    /// See [`Self::sorted_indices`].
    pub fn topological_order(&self) -> Result<Vec<ResourceId>, GraphError> {
        let (order, _) = self.sorted_indices()?;
        Ok(order.into_iter().map(|i| self.nodes[i].id.clone()).collect())
    }

    /// Returns the direct dependencies of a resource, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] if `id` or a reference target
    /// is not registered.
    pub fn dependencies(&self, id: &ResourceId) -> Result<Vec<ResourceId>, GraphError> {
        let idx = self.require(id, None)?;
        let edges = self.edges()?;
        Ok(edges[idx].iter().map(|&i| self.nodes[i].id.clone()).collect())
    }

    /// Returns the resources that directly depend on `id`, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] if `id` or a reference target
    /// is not registered.
    pub fn dependents(&self, id: &ResourceId) -> Result<Vec<ResourceId>, GraphError> {
        let idx = self.require(id, None)?;
        let edges = self.edges()?;
        Ok(edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&idx))
            .map(|(i, _)| self.nodes[i].id.clone())
            .collect())
    }

    /// Returns every resource `id` transitively depends on.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] on unknown identifiers.
    pub fn ancestors(&self, id: &ResourceId) -> Result<Vec<ResourceId>, GraphError> {
        let idx = self.require(id, None)?;
        let edges = self.edges()?;
        let reached = closure(idx, |i| edges[i].iter().copied().collect());
        Ok(reached.into_iter().map(|i| self.nodes[i].id.clone()).collect())
    }

    /// Returns every resource that transitively depends on `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] on unknown identifiers.
    pub fn descendants(&self, id: &ResourceId) -> Result<Vec<ResourceId>, GraphError> {
        let idx = self.require(id, None)?;
        let edges = self.edges()?;
        let reached = closure(idx, |i| {
            edges
                .iter()
                .enumerate()
                .filter(|(_, deps)| deps.contains(&i))
                .map(|(j, _)| j)
                .collect()
        });
        Ok(reached.into_iter().map(|i| self.nodes[i].id.clone()).collect())
    }

    /// Returns true if neither resource is an ancestor of the other, so an
    /// executor may apply them concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] on unknown identifiers.
    pub fn independent(&self, a: &ResourceId, b: &ResourceId) -> Result<bool, GraphError> {
        if a == b {
            self.require(a, None)?;
            return Ok(false);
        }
        Ok(!self.ancestors(a)?.contains(b) && !self.ancestors(b)?.contains(a))
    }

    /// Partitions the topological order into waves.
    ///
    /// A resource's wave is one more than the deepest wave among its
    /// dependencies; resources in the same wave share no ancestor/descendant
    /// relation. Each wave keeps topological order.
    ///
    /// # Errors
    ///
    /// See [`Self::sorted_indices`].
    pub fn levels(&self) -> Result<Vec<Vec<ResourceId>>, GraphError> {
        let (order, edges) = self.sorted_indices()?;
        let mut depth = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<ResourceId>> = Vec::new();

        for idx in order {
            let d = edges[idx].iter().map(|&dep| depth[dep] + 1).max().unwrap_or(0);
            depth[idx] = d;
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(self.nodes[idx].id.clone());
        }

        Ok(levels)
    }

    fn require(&self, id: &ResourceId, referenced_by: Option<&ResourceId>) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownResource {
                id: id.clone(),
                referenced_by: referenced_by.cloned(),
            })
    }
}

/// Kahn's algorithm over `deps`, where `deps[i]` holds the nodes that must
/// precede `i`.
///
/// Tie-break: among nodes whose predecessors are all emitted, the lowest
/// index goes first. Callers number nodes in priority order (declaration
/// order for the resource graph), which makes the output fully determined
/// by the input.
///
/// On a cycle, returns the cycle path with its first node repeated at the end.
pub(crate) fn sort_by_index(deps: &[BTreeSet<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];
    for (idx, before) in deps.iter().enumerate() {
        in_degree[idx] = before.len();
        for &dep in before {
            successors[dep].push(idx);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &next in &successors[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(find_cycle(deps, &in_degree))
    }
}

/// Walks predecessor edges among unsorted nodes until one repeats.
///
/// Every node left over by Kahn's algorithm still has an unsorted
/// predecessor, so the walk always closes a cycle.
fn find_cycle(deps: &[BTreeSet<usize>], in_degree: &[usize]) -> Vec<usize> {
    let Some(start) = in_degree.iter().position(|&d| d > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut on_path: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    while let Some(&next) = deps[current].iter().find(|&&dep| in_degree[dep] > 0) {
        if let Some(&pos) = on_path.get(&next) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(next);
            return cycle;
        }
        on_path.insert(next, path.len());
        path.push(next);
        current = next;
    }

    path
}

/// Breadth-first reachability from `start`, excluding `start`, sorted by index.
fn closure<F>(start: usize, next: F) -> BTreeSet<usize>
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut seen = BTreeSet::new();
    let mut queue = vec![start];
    while let Some(i) = queue.pop() {
        for j in next(i) {
            if j != start && seen.insert(j) {
                queue.push(j);
            }
        }
    }
    seen
}
