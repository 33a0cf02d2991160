use {
    crate::lock::{Guard, SmartLock},
    debug_fn::debug_fn,
    opera::PhantomNotSync,
    static_assertions::assert_not_impl_any,
    std::{
        cell::UnsafeCell,
        fmt::{Debug, Formatter},
        ops::Deref,
    },
};


/// A value protected by a [`SmartLock`].
///
/// Objects of this type are created with [`SmartLock::wrap`]. The value can only be
/// accessed through a [`Guard`] of that lock.
///
/// - `Locked<T>: Sync` if and only if `T: Send`.
/// - Only one thread can access the contained value at a time.
///
/// This object derefs to the underlying [`SmartLock`].
///
/// # Example
///
/// ```
/// use smart_lock::Registry;
///
/// let registry = Registry::new();
/// let accounts = registry.create_lock().unwrap();
/// let checking = accounts.wrap(100);
/// let savings = accounts.wrap(0);
///
/// let mut guard = accounts.lock().unwrap();
/// *checking.get_mut_guarded(&mut guard) -= 40;
/// *savings.get_mut_guarded(&mut guard) += 40;
/// assert_eq!(*checking.get(&guard) + *savings.get(&guard), 100);
/// ```
pub struct Locked<T>
where
    T: ?Sized,
{
    lock: SmartLock,
    _phantom_not_sync: PhantomNotSync,
    value: UnsafeCell<T>,
}

// SAFETY: - SmartLock is Sync.
//         - The phantom field only exists so that we don't accidentally implement Sync.
//         - Locked only gives access to the thread holding the lock, meaning that Sync
//           can be modeled as transferring ownership every time the holder changes.
unsafe impl<T> Sync for Locked<T> where T: ?Sized + Send {}

impl<T> Deref for Locked<T>
where
    T: ?Sized,
{
    type Target = SmartLock;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.lock
    }
}

impl SmartLock {
    /// Wraps a value in a [`Locked`] protected by this lock.
    ///
    /// # Example
    ///
    /// ```
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// let locked = lock.wrap(5);
    /// let guard = &lock.lock().unwrap();
    /// assert_eq!(*locked.get(guard), 5);
    /// ```
    #[inline]
    pub fn wrap<T>(&self, value: T) -> Locked<T> {
        Locked {
            lock: self.clone(),
            _phantom_not_sync: Default::default(),
            value: UnsafeCell::new(value),
        }
    }
}

impl<T> Locked<T>
where
    T: ?Sized,
{
    #[inline]
    fn check_guard(&self, guard: &Guard<'_>) {
        assert_not_impl_any!(Guard<'_>: Sync, Send);
        assert!(
            self.lock.is_locked_by(guard),
            "guard does not guard this object",
        );
    }

    /// Accesses the locked value.
    ///
    /// # Panic
    ///
    /// Panics if the guard was not created from the lock that protects this object.
    #[inline]
    pub fn get<'a>(&'a self, guard: &'a Guard<'_>) -> &'a T {
        self.check_guard(guard);
        // SAFETY: - The guard belongs to self.lock and is neither Send nor Sync, so the
        //           current thread holds self.lock and no other thread can hold a guard
        //           for it.
        //         - Mutable references are only handed out by get_mut, which borrows
        //           self mutably, and by get_mut_guarded, which borrows the only guard
        //           mutably. Neither can be alive while `guard` is shared.
        unsafe { &*self.value.get() }
    }

    /// Mutably accesses the locked value.
    ///
    /// Since the lock is not re-entrant, there is at most one guard per lock and
    /// borrowing it mutably proves exclusive access.
    ///
    /// # Panic
    ///
    /// Panics if the guard was not created from the lock that protects this object.
    ///
    /// # Example
    ///
    /// ```
    /// use smart_lock::SmartLock;
    ///
    /// let lock = SmartLock::new();
    /// let locked = lock.wrap(vec![1]);
    /// let mut guard = lock.lock().unwrap();
    /// locked.get_mut_guarded(&mut guard).push(2);
    /// assert_eq!(*locked.get(&guard), [1, 2]);
    /// ```
    #[inline]
    pub fn get_mut_guarded<'a>(&'a self, guard: &'a mut Guard<'_>) -> &'a mut T {
        self.check_guard(guard);
        // SAFETY: - As in get, the current thread holds self.lock.
        //         - All other references handed out by get and get_mut_guarded borrow
        //           the guard, which is now borrowed mutably.
        unsafe { &mut *self.value.get() }
    }

    /// Unwraps the value, consuming this object.
    #[inline]
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.value.into_inner()
    }

    /// Returns a mutable reference to the contained value without locking.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Returns a pointer to the underlying value.
    #[inline]
    pub fn data_ptr(&self) -> *const T {
        self.value.get()
    }
}

impl<T> Debug for Locked<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locked")
            .field("lock_id", &self.lock.id())
            .field(
                "value",
                &debug_fn(|fmt| {
                    match self.lock.try_lock_() {
                        Ok(Some(guard)) => Debug::fmt(self.get(&guard), fmt),
                        Ok(None) => fmt.write_str("<locked>"),
                        Err(_) => fmt.write_str("<torn down>"),
                    }
                }),
            )
            .finish_non_exhaustive()
    }
}
