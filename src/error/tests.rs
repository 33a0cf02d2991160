use {
    crate::{Error, Registry},
    std::{sync::Barrier, thread},
};

fn deadlock() -> Error {
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
        let err = lock2.lock().unwrap_err();
        drop(guard1);
        err
    })
}

#[test]
fn recoverable() {
    assert!(deadlock().is_recoverable());
    assert!(!Error::TornDown.is_recoverable());
    assert!(!Error::InUse { held: 1, waiting: 0 }.is_recoverable());
}

#[test]
fn display() {
    let msg = deadlock().to_string();
    assert!(msg.starts_with("acquiring the lock would deadlock: T"));
    assert_eq!(msg.matches(" -> ").count(), 4);
    assert_eq!(
        Error::InUse { held: 2, waiting: 1 }.to_string(),
        "registry is in use: 2 held, 1 waiting",
    );
    assert_eq!(Error::TornDown.to_string(), "registry has been torn down");
}
