use {
    crate::thread_key::ThreadKey,
    std::{
        collections::HashMap,
        fmt::{Display, Formatter},
    },
    tracing::trace,
};

#[cfg(test)]
mod tests;

/// The identity of a lock in its registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(usize);

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct ThreadIndex(usize);

/// A circular wait that was refused.
///
/// Each entry is a request edge: the thread waits for the resource, and the resource is
/// held by the thread of the next entry. The holder of the last resource is the thread
/// of the first entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cycle {
    edges: Vec<(ThreadKey, ResourceId)>,
}

impl Cycle {
    /// The request edges that form the cycle, in wait order.
    pub fn edges(&self) -> &[(ThreadKey, ResourceId)] {
        &self.edges
    }

    /// The threads on the cycle.
    pub fn threads(&self) -> impl Iterator<Item = ThreadKey> + '_ {
        self.edges.iter().map(|&(thread, _)| thread)
    }

    /// The resources on the cycle.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.edges.iter().map(|&(_, resource)| resource)
    }

    /// The number of threads on the cycle.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Always `false`, a cycle contains at least one request edge.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Display for Cycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (thread, resource) in &self.edges {
            write!(f, "{thread} -> {resource} -> ")?;
        }
        match self.edges.first() {
            Some((first, _)) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

struct ThreadNode {
    key: ThreadKey,
    request: Option<ResourceId>,
}

struct ResourceNode {
    assignment: Option<ThreadIndex>,
}

/// The resource-allocation graph.
///
/// Threads and resources live in two arenas. Edges are indices into those arenas: a
/// thread has at most one request edge and a resource has at most one assignment edge.
/// Nodes are only ever appended; [`Graph::clear`] drops all of them at once.
///
/// The graph itself is not synchronized. All access goes through the lock of the
/// owning registry.
#[derive(Default)]
pub(crate) struct Graph {
    threads: Vec<ThreadNode>,
    resources: Vec<ResourceNode>,
    by_key: HashMap<ThreadKey, ThreadIndex>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Node {
    Thread(ThreadIndex),
    Resource(ResourceId),
}

impl Graph {
    pub(crate) fn with_capacity(threads: usize, resources: usize) -> Self {
        Self {
            threads: Vec::with_capacity(threads),
            resources: Vec::with_capacity(resources),
            by_key: HashMap::with_capacity(threads),
        }
    }

    pub(crate) fn insert_resource(&mut self) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(ResourceNode { assignment: None });
        trace!(resource = %id, "resource registered");
        id
    }

    pub(crate) fn insert_thread(&mut self, key: ThreadKey) -> ThreadIndex {
        debug_assert!(!self.by_key.contains_key(&key));
        let idx = ThreadIndex(self.threads.len());
        self.threads.push(ThreadNode { key, request: None });
        self.by_key.insert(key, idx);
        trace!(thread = %key, "thread registered");
        idx
    }

    pub(crate) fn thread(&self, key: ThreadKey) -> Option<ThreadIndex> {
        self.by_key.get(&key).copied()
    }

    pub(crate) fn thread_or_insert(&mut self, key: ThreadKey) -> ThreadIndex {
        match self.thread(key) {
            Some(idx) => idx,
            None => self.insert_thread(key),
        }
    }

    pub(crate) fn contains_resource(&self, id: ResourceId) -> bool {
        id.0 < self.resources.len()
    }

    pub(crate) fn key(&self, thread: ThreadIndex) -> ThreadKey {
        self.threads[thread.0].key
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn request(&self, thread: ThreadIndex) -> Option<ResourceId> {
        self.threads[thread.0].request
    }

    pub(crate) fn holder(&self, resource: ResourceId) -> Option<ThreadIndex> {
        self.resources[resource.0].assignment
    }

    pub(crate) fn set_request(&mut self, thread: ThreadIndex, resource: ResourceId) {
        let node = &mut self.threads[thread.0];
        debug_assert_eq!(node.request, None, "thread already waits for a resource");
        node.request = Some(resource);
        trace!(thread = %node.key, %resource, "request edge set");
    }

    pub(crate) fn clear_request(&mut self, thread: ThreadIndex) {
        let node = &mut self.threads[thread.0];
        node.request = None;
        trace!(thread = %node.key, "request edge cleared");
    }

    pub(crate) fn set_assignment(&mut self, resource: ResourceId, thread: ThreadIndex) {
        let node = &mut self.resources[resource.0];
        debug_assert_eq!(node.assignment, None, "resource is already assigned");
        node.assignment = Some(thread);
        trace!(%resource, thread = %self.threads[thread.0].key, "assignment edge set");
    }

    pub(crate) fn clear_assignment(&mut self, resource: ResourceId) {
        self.resources[resource.0].assignment = None;
        trace!(%resource, "assignment edge cleared");
    }

    /// All assignment edges as `(resource, holder)` pairs.
    pub(crate) fn assignments(&self) -> impl Iterator<Item = (ResourceId, ThreadKey)> + '_ {
        self.resources
            .iter()
            .enumerate()
            .filter_map(|(i, node)| Some((ResourceId(i), self.key(node.assignment?))))
    }

    /// All request edges as `(thread, resource)` pairs.
    pub(crate) fn requests(&self) -> impl Iterator<Item = (ThreadKey, ResourceId)> + '_ {
        self.threads
            .iter()
            .filter_map(|node| Some((node.key, node.request?)))
    }

    /// Drops every node.
    pub(crate) fn clear(&mut self) {
        self.threads = Vec::new();
        self.resources = Vec::new();
        self.by_key = HashMap::new();
    }

    /// Returns whether following edges from `start` runs into a cycle.
    pub(crate) fn would_deadlock(&self, start: ThreadIndex) -> bool {
        self.find_cycle(start).is_some()
    }

    /// Walks from `start` along request and assignment edges and returns the cycle the
    /// walk runs into, if any.
    ///
    /// Every node has at most one outgoing edge, so the walk is a single path. It ends
    /// either at a thread without a request, at a resource without a holder, or at the
    /// first node that is visited a second time. The visited markers belong to this
    /// call; nothing is written to the graph.
    pub(crate) fn find_cycle(&self, start: ThreadIndex) -> Option<Cycle> {
        let mut visited_threads = vec![false; self.threads.len()];
        let mut visited_resources = vec![false; self.resources.len()];
        let mut path = Vec::new();
        let mut thread = start;
        let revisited = loop {
            debug_assert!(path.len() <= self.threads.len() + self.resources.len());
            if visited_threads[thread.0] {
                break Node::Thread(thread);
            }
            visited_threads[thread.0] = true;
            path.push(Node::Thread(thread));
            let resource = self.request(thread)?;
            if visited_resources[resource.0] {
                break Node::Resource(resource);
            }
            visited_resources[resource.0] = true;
            path.push(Node::Resource(resource));
            thread = self.holder(resource)?;
        };
        let first = path.iter().position(|&node| node == revisited)?;
        let mut cycle = path.split_off(first);
        if let Node::Resource(_) = revisited {
            cycle.rotate_left(1);
        }
        let edges = cycle
            .chunks_exact(2)
            .filter_map(|pair| match *pair {
                [Node::Thread(t), Node::Resource(r)] => Some((self.key(t), r)),
                _ => None,
            })
            .collect();
        Some(Cycle { edges })
    }

    /// Returns whether no walk from any thread runs into a cycle.
    pub(crate) fn is_acyclic(&self) -> bool {
        (0..self.threads.len()).all(|i| !self.would_deadlock(ThreadIndex(i)))
    }
}
