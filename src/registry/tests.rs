use {
    crate::{Error, Registry, Snapshot, thread_key::ThreadKey},
    std::{sync::Barrier, thread},
};

#[test]
fn empty() {
    let registry = Registry::new();
    assert_eq!(registry.snapshot(), Snapshot::default());
    assert!(registry.is_acyclic());
}

#[test]
fn clone_shares_graph() {
    let registry = Registry::new();
    let clone = registry.clone();
    assert_eq!(registry, clone);
    assert_ne!(registry, Registry::new());
    let _lock = clone.create_lock().unwrap();
    assert_eq!(registry.snapshot().resources, 1);
}

#[test]
fn threads_registered_lazily() {
    let registry = Registry::new();
    let lock = registry.create_lock().unwrap();
    assert_eq!(registry.snapshot().threads, 0);
    drop(lock.lock().unwrap());
    assert_eq!(registry.snapshot().threads, 1);
    drop(lock.lock().unwrap());
    assert_eq!(registry.snapshot().threads, 1);
    thread::scope(|s| {
        s.spawn(|| drop(lock.lock().unwrap()));
    });
    assert_eq!(registry.snapshot().threads, 2);
}

#[test]
fn snapshot() {
    let registry = Registry::new();
    let lock1 = registry.create_lock().unwrap();
    let lock2 = registry.create_lock().unwrap();
    let guard1 = lock1.lock().unwrap();
    let barrier = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let _guard2 = lock2.lock().unwrap();
            barrier.wait();
            let _guard1 = lock1.lock().unwrap();
        });
        barrier.wait();
        while registry.snapshot().waiting.is_empty() {
            thread::yield_now();
        }
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.threads, 2);
        assert_eq!(snapshot.resources, 2);
        assert_eq!(snapshot.held.len(), 2);
        assert!(snapshot.held.contains(&(lock1.id(), ThreadKey::current())));
        assert_eq!(snapshot.waiting.len(), 1);
        let (waiter, resource) = snapshot.waiting[0];
        assert_eq!(resource, lock1.id());
        assert!(snapshot.held.contains(&(lock2.id(), waiter)));
        assert!(!snapshot.torn_down);
        assert!(registry.is_acyclic());
        drop(guard1);
    });
}

#[test]
fn unknown_resource() {
    let registry1 = Registry::new();
    let registry2 = Registry::new();
    let _lock = registry1.create_lock().unwrap();
    let _lock = registry1.create_lock().unwrap();
    let lock = registry1.create_lock().unwrap();
    let res = registry2.request(ThreadKey::current(), lock.id());
    assert_eq!(res, Err(Error::UnknownResource(lock.id())));
    assert_eq!(registry2.holder(lock.id()), None);
}

#[test]
fn teardown() {
    let registry = Registry::new();
    let lock = registry.create_lock().unwrap();
    drop(lock.lock().unwrap());
    registry.teardown().unwrap();
    let snapshot = registry.snapshot();
    assert!(snapshot.torn_down);
    assert_eq!(snapshot.threads, 0);
    assert_eq!(snapshot.resources, 0);
    assert_eq!(registry.teardown(), Err(Error::TornDown));
}

#[test]
fn teardown_with_waiter() {
    let registry = Registry::new();
    let lock = registry.create_lock().unwrap();
    let guard = lock.lock().unwrap();
    thread::scope(|s| {
        s.spawn(|| drop(lock.lock().unwrap()));
        while registry.snapshot().waiting.is_empty() {
            thread::yield_now();
        }
        assert_eq!(
            registry.teardown(),
            Err(Error::InUse {
                held: 1,
                waiting: 1
            }),
        );
        drop(guard);
    });
    registry.teardown().unwrap();
}

#[test]
fn debug() {
    let registry = Registry::new();
    let _lock = registry.create_lock().unwrap();
    let formatted = format!("{registry:?}");
    assert!(formatted.contains("resources: 1"));
    registry.teardown().unwrap();
    assert!(format!("{registry:?}").contains("<torn down>"));
}
