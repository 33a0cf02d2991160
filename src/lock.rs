#[cfg(doc)]
use crate::{error::Error, locked::Locked};
use {
    crate::{
        error::Result,
        graph::ResourceId,
        registry::Registry,
        thread_key::ThreadKey,
    },
    opera::{PhantomNotSend, PhantomNotSync},
    parking_lot::{
        RawMutex,
        lock_api::{RawMutex as RawMutexTrait, RawMutexFair},
    },
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        fmt::{Debug, Formatter},
        mem::ManuallyDrop,
        sync::Arc,
    },
    tracing::debug,
};


/// A mutex that refuses to wait if waiting could deadlock.
///
/// Before the calling thread blocks in [`SmartLock::lock`], the lock's [`Registry`]
/// checks whether the wait would close a circular wait: a chain of threads in which each
/// thread waits for a lock held by the next and the last waits for a lock held by the
/// first. If so, [`SmartLock::lock`] returns [`Error::Deadlock`] immediately and the
/// thread is never suspended.
///
/// The lock is not re-entrant. Acquiring a lock that the current thread already holds
/// fails with [`Error::AlreadyHeld`].
///
/// Cloning a [`SmartLock`] yields another handle to the same lock.
///
/// # Example
///
/// ```
/// use smart_lock::SmartLock;
///
/// let lock = SmartLock::new();
/// let guard = lock.lock().unwrap();
/// assert!(lock.is_locked_by_current_thread());
/// drop(guard);
/// assert!(!lock.is_locked());
/// ```
#[derive(Clone)]
pub struct SmartLock {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Registry,
    resource: ResourceId,
    // Locked if and only if a thread holds this lock or is about to record itself as
    // the holder in the registry.
    raw_mutex: RawMutex,
}

/// An acquired lock guard.
///
/// This object is created by calling [`SmartLock::lock`] or [`SmartLock::try_lock`].
/// The lock is released when the guard is dropped.
///
/// A [`Guard`] can be used to access [`Locked`] data by calling [`Locked::get`].
///
/// The guard is neither [`Send`] nor [`Sync`]: a lock is always released by the thread
/// that acquired it.
///
/// The [`Guard`] can be passed to [`std::mem::forget`] to keep the lock held without
/// leaking any memory. See [`SmartLock::force_unlock`].
pub struct Guard<'a> {
    lock: &'a SmartLock,
    key: ThreadKey,
    _phantom_not_send: PhantomNotSend,
    _phantom_not_sync: PhantomNotSync,
}

assert_impl_all!(SmartLock: Send, Sync);
assert_not_impl_any!(Guard<'_>: Sync, Send);

impl SmartLock {
    /// Creates a new lock in the process-wide [`Registry::global`].
    ///
    /// # Panics
    ///
    /// Panics if the process-wide registry has been torn down.
    pub fn new() -> Self {
        match Self::new_in(Registry::global()) {
            Ok(lock) => lock,
            Err(e) => panic!("cannot create lock: {e}"),
        }
    }

    /// Creates a new lock in the given registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TornDown`] if the registry has been torn down.
    pub fn new_in(registry: &Registry) -> Result<Self> {
        let resource = registry.register_resource()?;
        Ok(Self {
            shared: Arc::new(Shared {
                registry: registry.clone(),
                resource,
                raw_mutex: RawMutex::INIT,
            }),
        })
    }

    /// Returns the identity of this lock in its registry.
    #[inline]
    pub fn id(&self) -> ResourceId {
        self.shared.resource
    }

    /// Returns the registry this lock belongs to.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Acquires this lock.
    ///
    /// If the lock is held by another thread, this function blocks until the lock is
    /// released, unless waiting could deadlock. In that case it returns immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::Deadlock`] if waiting for the lock would close a circular wait. The
    ///   lock is not acquired. The caller can release other locks and retry.
    /// - [`Error::AlreadyHeld`] if the current thread already holds this lock.
    /// - [`Error::TornDown`] if the registry has been torn down.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Barrier;
    /// use std::thread;
    /// use smart_lock::{Error, Registry};
    ///
    /// let registry = Registry::new();
    /// let lock1 = registry.create_lock().unwrap();
    /// let lock2 = registry.create_lock().unwrap();
    ///
    /// let guard1 = lock1.lock().unwrap();
    /// let barrier = Barrier::new(2);
    /// thread::scope(|scope| {
    ///     scope.spawn(|| {
    ///         let _guard2 = lock2.lock().unwrap();
    ///         barrier.wait();
    ///         // Blocks until the main thread gives up.
    ///         let _guard1 = lock1.lock().unwrap();
    ///     });
    ///     barrier.wait();
    ///     while registry.snapshot().waiting.is_empty() {
    ///         thread::yield_now();
    ///     }
    ///     // The other thread holds lock2 and waits for lock1.
    ///     assert!(matches!(lock2.lock(), Err(Error::Deadlock(_))));
    ///     drop(guard1);
    /// });
    /// ```
    pub fn lock(&self) -> Result<Guard<'_>> {
        let shared = &*self.shared;
        let key = ThreadKey::current();
        shared.registry.request(key, shared.resource)?;
        shared.raw_mutex.lock();
        // SAFETY: - We've just locked the mutex.
        unsafe { self.guard_after_lock(key) }
    }

    /// Attempts to acquire this lock without blocking.
    ///
    /// Returns `None` if the lock is held, including by the current thread. Since this
    /// function never waits, it never needs to check for circular waits.
    ///
    /// # Panics
    ///
    /// Panics if the registry has been torn down.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// let _guard = lock.lock().unwrap();
    /// assert!(lock.try_lock().is_none());
    ///
    /// thread::scope(|scope| {
    ///     scope.spawn(|| assert!(lock.try_lock().is_none()));
    /// });
    /// ```
    pub fn try_lock(&self) -> Option<Guard<'_>> {
        match self.try_lock_() {
            Ok(guard) => guard,
            Err(e) => panic!("cannot acquire lock: {e}"),
        }
    }

    pub(crate) fn try_lock_(&self) -> Result<Option<Guard<'_>>> {
        if !self.shared.raw_mutex.try_lock() {
            return Ok(None);
        }
        // SAFETY: - We've just locked the mutex.
        unsafe { self.guard_after_lock(ThreadKey::current()) }.map(Some)
    }

    /// # Safety
    ///
    /// - The current thread must just have succeeded in locking the raw mutex.
    unsafe fn guard_after_lock(&self, key: ThreadKey) -> Result<Guard<'_>> {
        let shared = &*self.shared;
        if let Err(e) = shared.registry.grant(key, shared.resource) {
            // SAFETY: - By the requirements of this function, we hold the mutex.
            //         - No guard has been created.
            unsafe {
                shared.raw_mutex.unlock();
            }
            return Err(e);
        }
        debug!(thread = %key, resource = %shared.resource, "lock acquired");
        // SAFETY: - We hold the mutex and have recorded the current thread as the
        //           holder. The new guard takes ownership of both.
        Ok(unsafe { self.make_guard_unchecked_(key) })
    }

    /// Forcibly releases this lock.
    ///
    /// This can be used to release the lock held by a [`Guard`] that was passed to
    /// [`std::mem::forget`].
    ///
    /// # Safety
    ///
    /// - No [`Guard`] of this lock may be used or dropped after this call.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold this lock.
    ///
    /// # Example
    ///
    /// ```
    /// use std::mem;
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// let guard = lock.lock().unwrap();
    /// mem::forget(guard);
    /// assert!(lock.is_locked());
    /// // SAFETY: The only guard has been forgotten.
    /// unsafe {
    ///     lock.force_unlock();
    /// }
    /// assert!(!lock.is_locked());
    /// ```
    #[inline]
    pub unsafe fn force_unlock(&self) {
        // SAFETY: The requirement is forwarded to the caller.
        unsafe {
            self.force_unlock_::<false>();
        }
    }

    /// Forcibly releases this lock using a fair protocol.
    ///
    /// # Safety
    ///
    /// - No [`Guard`] of this lock may be used or dropped after this call.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold this lock.
    #[inline]
    pub unsafe fn force_unlock_fair(&self) {
        // SAFETY: The requirement is forwarded to the caller.
        unsafe {
            self.force_unlock_::<true>();
        }
    }

    /// # Safety
    ///
    /// - No [`Guard`] of this lock may be used or dropped after this call.
    unsafe fn force_unlock_<const FAIR: bool>(&self) {
        // SAFETY: The requirement is forwarded to the caller.
        unsafe {
            self.release_::<FAIR>(ThreadKey::current());
        }
    }

    /// # Safety
    ///
    /// - `key` must be the key of the current thread.
    /// - No [`Guard`] of this lock may be used or dropped after this call.
    unsafe fn release_<const FAIR: bool>(&self, key: ThreadKey) {
        let shared = &*self.shared;
        // This panics unless `key` is the recorded holder.
        shared.registry.release(key, shared.resource);
        debug!(thread = %key, resource = %shared.resource, "lock released");
        // SAFETY: - The registry records the holder only after the raw mutex has been
        //           locked and clears it before the raw mutex is unlocked. The current
        //           thread is the recorded holder, so it holds the raw mutex.
        unsafe {
            if FAIR {
                shared.raw_mutex.unlock_fair();
            } else {
                shared.raw_mutex.unlock();
            }
        }
    }

    /// Creates a new [`Guard`] without checking if the lock is held.
    ///
    /// # Safety
    ///
    /// - The current thread must hold the lock.
    /// - At most one [`Guard`] of this lock may exist at any time.
    ///
    /// # Example
    ///
    /// ```
    /// use std::mem;
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// mem::forget(lock.lock().unwrap());
    /// // SAFETY: This recovers the guard we just forgot.
    /// let _guard = unsafe { lock.make_guard_unchecked() };
    /// ```
    #[inline]
    pub unsafe fn make_guard_unchecked(&self) -> Guard<'_> {
        // SAFETY: The requirements are forwarded to the caller.
        unsafe { self.make_guard_unchecked_(ThreadKey::current()) }
    }

    /// # Safety
    ///
    /// - The current thread must hold the lock and `key` must be its key.
    /// - At most one [`Guard`] of this lock may exist at any time.
    #[inline]
    unsafe fn make_guard_unchecked_(&self, key: ThreadKey) -> Guard<'_> {
        Guard {
            lock: self,
            key,
            _phantom_not_send: Default::default(),
            _phantom_not_sync: Default::default(),
        }
    }

    /// Returns whether this lock is locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.shared.raw_mutex.is_locked()
    }

    /// Returns whether this lock is locked by the guard.
    ///
    /// # Example
    ///
    /// ```
    /// use smart_lock::SmartLock;
    ///
    /// let lock1 = SmartLock::new();
    /// let lock2 = SmartLock::new();
    ///
    /// let guard1 = &lock1.lock().unwrap();
    /// let guard2 = &lock2.lock().unwrap();
    ///
    /// assert!(lock1.is_locked_by(guard1));
    /// assert!(!lock1.is_locked_by(guard2));
    /// ```
    #[inline]
    pub fn is_locked_by(&self, guard: &Guard<'_>) -> bool {
        self == guard.lock
    }

    /// Returns whether the current thread holds this lock.
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.holder() == Some(ThreadKey::current())
    }

    /// Returns the thread that holds this lock.
    pub fn holder(&self) -> Option<ThreadKey> {
        self.shared.registry.holder(self.shared.resource)
    }
}

impl Default for SmartLock {
    /// Same as [`SmartLock::new`].
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SmartLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartLock")
            .field("id", &self.shared.resource)
            .finish_non_exhaustive()
    }
}

impl PartialEq for SmartLock {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SmartLock {}

impl Guard<'_> {
    /// Releases the lock.
    ///
    /// This is the same as dropping the guard.
    #[inline]
    pub fn unlock(self) {
        drop(self);
    }

    /// Releases the lock using a fair protocol.
    ///
    /// If threads are waiting for the lock, ownership is handed to one of them directly.
    ///
    /// # Example
    ///
    /// ```
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// let guard = lock.lock().unwrap();
    /// guard.unlock_fair();
    /// assert!(!lock.is_locked());
    /// ```
    #[inline]
    pub fn unlock_fair(self) {
        let slf = ManuallyDrop::new(self);
        // SAFETY: - This guard owns the lock. Guards are not Send, so its key is the
        //           key of the current thread.
        //         - Since we've wrapped self in ManuallyDrop, it won't be used after
        //           this.
        unsafe {
            slf.lock.release_::<true>(slf.key);
        }
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: - This guard owns the lock and is being dropped. Guards are not Send,
        //           so its key is the key of the current thread.
        unsafe {
            self.lock.release_::<false>(self.key);
        }
    }
}

impl Debug for Guard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("lock_id", &self.lock.shared.resource)
            .field("thread", &self.key)
            .finish_non_exhaustive()
    }
}
