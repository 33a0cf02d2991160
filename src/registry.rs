use {
    crate::{
        error::{Error, Result},
        graph::{Graph, ResourceId},
        lock::SmartLock,
        thread_key::ThreadKey,
    },
    debug_fn::debug_fn,
    parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard},
    std::{
        fmt::{Debug, Formatter},
        sync::{Arc, LazyLock},
    },
    tracing::{info, warn},
};

#[cfg(test)]
mod tests;

/// The resource-allocation graph shared by a set of locks.
///
/// Every [`SmartLock`] belongs to exactly one registry. Before a thread is allowed to
/// wait for a lock, the registry proves that the wait cannot close a circular wait among
/// the threads and locks it knows about. Locks of different registries never see each
/// other, so deadlocks across registries are not prevented.
///
/// Cloning a registry is cheap and yields a handle to the same graph.
///
/// # Example
///
/// ```
/// use smart_lock::Registry;
///
/// let registry = Registry::new();
/// let lock = registry.create_lock().unwrap();
/// let guard = lock.lock().unwrap();
/// assert_eq!(registry.snapshot().held.len(), 1);
/// drop(guard);
/// registry.teardown().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    graph: Graph,
    torn_down: bool,
}

/// A consistent view of a registry's graph.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Snapshot {
    /// The number of threads that have ever acquired a lock of the registry.
    pub threads: usize,
    /// The number of locks created in the registry.
    pub resources: usize,
    /// Assignment edges: each lock that is currently held and its holder.
    pub held: Vec<(ResourceId, ThreadKey)>,
    /// Request edges: each thread that is currently waiting and the lock it waits for.
    pub waiting: Vec<(ThreadKey, ResourceId)>,
    /// Whether [`Registry::teardown`] has completed.
    pub torn_down: bool,
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

impl State {
    fn check_alive(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::TornDown);
        }
        Ok(())
    }

    fn check_resource(&self, resource: ResourceId) -> Result<()> {
        self.check_alive()?;
        if !self.graph.contains_resource(resource) {
            return Err(Error::UnknownResource(resource));
        }
        Ok(())
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with room for the given number of threads and locks.
    pub fn with_capacity(threads: usize, resources: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                graph: Graph::with_capacity(threads, resources),
                torn_down: false,
            })),
        }
    }

    /// Returns the process-wide registry used by [`SmartLock::new`].
    ///
    /// The registry is created the first time this function is called.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Creates a new lock in this registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TornDown`] if the registry has been torn down.
    pub fn create_lock(&self) -> Result<SmartLock> {
        SmartLock::new_in(self)
    }

    pub(crate) fn register_resource(&self) -> Result<ResourceId> {
        let mut state = self.state.write();
        state.check_alive()?;
        Ok(state.graph.insert_resource())
    }

    /// Records that `key` wants to wait for `resource`.
    ///
    /// On success the request edge stays in place and the caller may block on the
    /// resource. If the wait would close a cycle, the request edge is withdrawn again
    /// before this function returns.
    ///
    /// The request edge is set under write permission. The permission is then
    /// downgraded for the cycle check without letting another writer in, so the result of
    /// the check cannot be invalidated by a concurrent request.
    ///
    /// Only one upgradable reader can exist at a time, so cycle checks of different
    /// threads are serialized with each other. They still run concurrently with
    /// [`Registry::snapshot`], [`Registry::is_acyclic`] and other plain readers.
    pub(crate) fn request(&self, key: ThreadKey, resource: ResourceId) -> Result<()> {
        let mut state = self.state.write();
        state.check_resource(resource)?;
        let graph = &mut state.graph;
        let thread = graph.thread_or_insert(key);
        if graph.holder(resource) == Some(thread) {
            return Err(Error::AlreadyHeld {
                thread: key,
                resource,
            });
        }
        graph.set_request(thread, resource);
        let state = RwLockWriteGuard::downgrade_to_upgradable(state);
        let Some(cycle) = state.graph.find_cycle(thread) else {
            return Ok(());
        };
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        state.graph.clear_request(thread);
        warn!(thread = %key, %resource, %cycle, "lock request refused");
        Err(Error::Deadlock(cycle))
    }

    /// Records that `key` now holds `resource` and no longer waits for anything.
    ///
    /// The caller must have just locked the resource's mutex.
    pub(crate) fn grant(&self, key: ThreadKey, resource: ResourceId) -> Result<()> {
        let mut state = self.state.write();
        state.check_resource(resource)?;
        let graph = &mut state.graph;
        let thread = graph.thread_or_insert(key);
        graph.clear_request(thread);
        graph.set_assignment(resource, thread);
        Ok(())
    }

    /// Removes the assignment edge of `resource`.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not hold `resource`.
    pub(crate) fn release(&self, key: ThreadKey, resource: ResourceId) {
        let mut state = self.state.write();
        let graph = &mut state.graph;
        let held = graph.contains_resource(resource)
            && graph.holder(resource).map(|thread| graph.key(thread)) == Some(key);
        assert!(held, "lock is not held by the current thread");
        graph.clear_assignment(resource);
    }

    pub(crate) fn holder(&self, resource: ResourceId) -> Option<ThreadKey> {
        let state = self.state.read();
        let graph = &state.graph;
        if !graph.contains_resource(resource) {
            return None;
        }
        graph.holder(resource).map(|thread| graph.key(thread))
    }

    /// Returns whether the graph is free of circular waits.
    ///
    /// The lock protocol never lets a cycle form, so this always returns `true`. It is
    /// meant as an independent audit for tests and diagnostics.
    pub fn is_acyclic(&self) -> bool {
        self.state.read().graph.is_acyclic()
    }

    /// Takes a consistent snapshot of the graph.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        let graph = &state.graph;
        Snapshot {
            threads: graph.thread_count(),
            resources: graph.resource_count(),
            held: graph.assignments().collect(),
            waiting: graph.requests().collect(),
            torn_down: state.torn_down,
        }
    }

    /// Releases every node of the graph.
    ///
    /// After this function succeeds, creating or acquiring locks of this registry fails
    /// with [`Error::TornDown`]. A registry cannot be re-initialized.
    ///
    /// # Errors
    ///
    /// - [`Error::InUse`] if a lock is held or a thread is waiting for one.
    /// - [`Error::TornDown`] if the registry has already been torn down.
    pub fn teardown(&self) -> Result<()> {
        let mut state = self.state.write();
        state.check_alive()?;
        let held = state.graph.assignments().count();
        let waiting = state.graph.requests().count();
        if held > 0 || waiting > 0 {
            return Err(Error::InUse { held, waiting });
        }
        info!(
            threads = state.graph.thread_count(),
            resources = state.graph.resource_count(),
            "registry torn down"
        );
        state.graph.clear();
        state.torn_down = true;
        Ok(())
    }
}

/// Tears down the process-wide registry.
///
/// This must be the last call into this crate that involves locks created with
/// [`SmartLock::new`].
///
/// # Errors
///
/// See [`Registry::teardown`].
pub fn teardown() -> Result<()> {
    Registry::global().teardown()
}

impl PartialEq for Registry {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for Registry {}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field(
                "graph",
                &debug_fn(|fmt| match self.state.try_read() {
                    Some(state) if state.torn_down => fmt.write_str("<torn down>"),
                    Some(state) => fmt
                        .debug_struct("Graph")
                        .field("threads", &state.graph.thread_count())
                        .field("resources", &state.graph.resource_count())
                        .finish(),
                    None => fmt.write_str("<locked>"),
                }),
            )
            .finish_non_exhaustive()
    }
}
