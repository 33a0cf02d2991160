use std::{
    fmt::{Display, Formatter},
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};


/// The identity of a thread as seen by the lock graph.
///
/// Keys are handed out from a process-wide counter the first time a thread asks for
/// one. Unlike the address of a thread-local, a key is never reused after the thread
/// terminates, so a thread node in the graph always describes exactly one OS thread.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadKey(NonZeroU64);

impl ThreadKey {
    /// Returns the key of the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the thread-local storage of the calling thread has already been
    /// destroyed.
    #[inline]
    pub fn current() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        thread_local!(static KEY: ThreadKey = ThreadKey::allocate(&NEXT));
        match KEY.try_with(|key| *key) {
            Ok(key) => key,
            Err(_) => panic!("thread key accessed during thread-local destruction"),
        }
    }

    #[cold]
    fn allocate(next: &AtomicU64) -> Self {
        let raw = next.fetch_add(1, Relaxed);
        match NonZeroU64::new(raw) {
            Some(id) => Self(id),
            // 2^64 threads would have to be spawned first.
            None => unreachable!("thread key counter wrapped"),
        }
    }

    /// Returns the numeric value of this key. The value is never 0.
    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl Display for ThreadKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}
