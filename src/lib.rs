//! This crate provides [`SmartLock`], a mutex that avoids deadlocks by refusing to wait.
//!
//! # Motivation
//!
//! Two threads that acquire the same two mutexes in opposite order can deadlock:
//!
//! ```text
//! thread A: lock(m1); lock(m2);
//! thread B: lock(m2); lock(m1);
//! ```
//!
//! Each thread ends up holding one mutex and waiting forever for the other. The usual
//! remedy is a global lock order, which is hard to maintain in large programs.
//!
//! # Deadlock avoidance
//!
//! Every [`SmartLock`] belongs to a [`Registry`] that maintains a resource-allocation
//! graph of the threads and locks it knows about:
//!
//! - a *request edge* from a thread to the lock it is waiting for,
//! - an *assignment edge* from a lock to the thread holding it.
//!
//! Before a thread blocks in [`SmartLock::lock`], the registry adds the request edge and
//! follows the edges from the requesting thread. If the walk returns to a node it has
//! already visited, waiting would close a circular wait. The request edge is removed
//! again and [`SmartLock::lock`] returns [`Error::Deadlock`] without ever suspending the
//! thread. In the example above, exactly one of the two threads is refused and can back
//! off by releasing its first lock.
//!
//! # Example
//!
//! ```
//! use std::sync::Barrier;
//! use std::thread;
//! use smart_lock::{Error, Registry, SmartLock};
//!
//! // Returns whether acquiring `second` was refused.
//! fn cross(first: &SmartLock, second: &SmartLock, barrier: &Barrier) -> bool {
//!     let _first = first.lock().unwrap();
//!     barrier.wait();
//!     match second.lock() {
//!         Ok(_second) => false,
//!         Err(Error::Deadlock(_)) => true,
//!         Err(e) => panic!("{e}"),
//!     }
//! }
//!
//! let registry = Registry::new();
//! let m1 = registry.create_lock().unwrap();
//! let m2 = registry.create_lock().unwrap();
//! let barrier = Barrier::new(2);
//!
//! let refused = thread::scope(|scope| {
//!     let a = scope.spawn(|| cross(&m1, &m2, &barrier));
//!     let b = scope.spawn(|| cross(&m2, &m1, &barrier));
//!     [a.join().unwrap(), b.join().unwrap()]
//! });
//! assert_eq!(refused.iter().filter(|&&r| r).count(), 1);
//! ```
//!
//! # Registries
//!
//! [`SmartLock::new`] creates locks in a process-wide registry that is created on first
//! use and can be released with [`teardown`]. [`Registry::new`] creates an independent
//! registry. Deadlocks are only avoided among locks of the same registry.
//!
//! # Guarded data
//!
//! [`SmartLock::wrap`] creates a [`Locked`] value that can only be accessed through a
//! [`Guard`] of the lock, which allows one lock to protect several objects.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: graph mutations at `TRACE`, acquisitions and
//! releases at `DEBUG`, refused requests at `WARN` and teardown at `INFO`. No
//! subscriber is installed.

pub use {
    error::{Error, Result},
    graph::{Cycle, ResourceId},
    lock::{Guard, SmartLock},
    locked::Locked,
    registry::{Registry, Snapshot, teardown},
    thread_key::ThreadKey,
};

mod error;
mod graph;
mod lock;
mod locked;
mod registry;
mod thread_key;
