use crate::{
    graph::{Cycle, ResourceId},
    thread_key::ThreadKey,
};

#[cfg(test)]
mod tests;

/// Errors returned by the lock protocol.
///
/// Only [`Error::Deadlock`] is an expected runtime outcome. The remaining variants
/// report misuse of the API.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Waiting for the lock would close a circular wait.
    ///
    /// The calling thread does not hold the lock and was never suspended.
    #[error("acquiring the lock would deadlock: {0}")]
    Deadlock(Cycle),

    /// The calling thread already holds the lock it tried to acquire.
    #[error("thread {thread} already holds resource {resource}")]
    AlreadyHeld {
        thread: ThreadKey,
        resource: ResourceId,
    },

    /// The resource handle does not belong to the registry.
    ///
    /// Every [`SmartLock`](crate::SmartLock) only ever talks to the registry that created
    /// it, so the public API does not produce this error. It guards the registry's
    /// internal bookkeeping against mismatched handles.
    #[error("resource {0} is not registered")]
    UnknownResource(ResourceId),

    /// The registry still has threads holding or waiting for locks.
    #[error("registry is in use: {held} held, {waiting} waiting")]
    InUse { held: usize, waiting: usize },

    /// The registry has been torn down.
    #[error("registry has been torn down")]
    TornDown,
}

impl Error {
    /// Returns whether the caller may retry the operation later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Deadlock(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
