use {
    crate::{
        graph::{Graph, ResourceId, ThreadIndex},
        thread_key::ThreadKey,
    },
    std::thread,
};

fn keys<const N: usize>() -> [ThreadKey; N] {
    std::array::from_fn(|_| thread::spawn(ThreadKey::current).join().unwrap())
}

fn graph<const T: usize, const R: usize>() -> (Graph, [ThreadIndex; T], [ResourceId; R]) {
    let mut graph = Graph::default();
    let threads = keys::<T>().map(|key| graph.insert_thread(key));
    let resources = [(); R].map(|_| graph.insert_resource());
    (graph, threads, resources)
}

#[test]
fn insert() {
    let (mut graph, [a, b], [r1]) = graph::<2, 1>();
    assert_eq!(graph.thread_count(), 2);
    assert_eq!(graph.resource_count(), 1);
    assert!(graph.contains_resource(r1));
    assert_ne!(a, b);
    assert_eq!(graph.thread(graph.key(a)), Some(a));
    assert_eq!(graph.thread(graph.key(b)), Some(b));
    let r2 = graph.insert_resource();
    assert_ne!(r1, r2);
    assert!(graph.contains_resource(r2));
}

#[test]
fn unknown_thread() {
    let (graph, _, _) = graph::<1, 0>();
    assert_eq!(graph.thread(ThreadKey::current()), None);
}

#[test]
fn thread_or_insert() {
    let mut graph = Graph::default();
    let key = ThreadKey::current();
    let idx = graph.thread_or_insert(key);
    assert_eq!(graph.thread_or_insert(key), idx);
    assert_eq!(graph.thread_count(), 1);
}

#[test]
fn edges() {
    let (mut graph, [a], [r]) = graph::<1, 1>();
    assert_eq!(graph.request(a), None);
    assert_eq!(graph.holder(r), None);
    graph.set_request(a, r);
    assert_eq!(graph.request(a), Some(r));
    assert_eq!(graph.requests().collect::<Vec<_>>(), [(graph.key(a), r)]);
    graph.clear_request(a);
    graph.set_assignment(r, a);
    assert_eq!(graph.holder(r), Some(a));
    assert_eq!(graph.assignments().collect::<Vec<_>>(), [(r, graph.key(a))]);
    graph.clear_assignment(r);
    assert_eq!(graph.holder(r), None);
    assert_eq!(graph.requests().count(), 0);
    assert_eq!(graph.assignments().count(), 0);
}

#[test]
fn no_request_no_cycle() {
    let (graph, [a], _) = graph::<1, 1>();
    assert!(graph.find_cycle(a).is_none());
}

#[test]
fn free_resource_no_cycle() {
    let (mut graph, [a], [r]) = graph::<1, 1>();
    graph.set_request(a, r);
    assert!(!graph.would_deadlock(a));
}

#[test]
fn chain_no_cycle() {
    let (mut graph, [a, b, c], [r1, r2]) = graph::<3, 2>();
    graph.set_assignment(r1, b);
    graph.set_assignment(r2, c);
    graph.set_request(a, r1);
    graph.set_request(b, r2);
    assert!(!graph.would_deadlock(a));
    assert!(!graph.would_deadlock(b));
    assert!(graph.is_acyclic());
}

#[test]
fn crossed() {
    let (mut graph, [a, b], [r1, r2]) = graph::<2, 2>();
    graph.set_assignment(r1, a);
    graph.set_assignment(r2, b);
    graph.set_request(a, r2);
    assert!(!graph.would_deadlock(a));
    graph.set_request(b, r1);
    let cycle = graph.find_cycle(b).unwrap();
    assert_eq!(cycle.edges(), [(graph.key(b), r1), (graph.key(a), r2)]);
    assert_eq!(cycle.len(), 2);
    assert_eq!(
        cycle.to_string(),
        format!("{} -> {r1} -> {} -> {r2} -> {}", graph.key(b), graph.key(a), graph.key(b)),
    );
    assert!(!graph.is_acyclic());
    graph.clear_request(b);
    assert!(graph.is_acyclic());
}

#[test]
fn self_loop() {
    let (mut graph, [a], [r]) = graph::<1, 1>();
    graph.set_assignment(r, a);
    graph.set_request(a, r);
    let cycle = graph.find_cycle(a).unwrap();
    assert_eq!(cycle.edges(), [(graph.key(a), r)]);
}

#[test]
fn cycle_behind_start() {
    // a waits on a cycle between b and c but is not part of it.
    let (mut graph, [a, b, c], [r1, r2, r3]) = graph::<3, 3>();
    graph.set_assignment(r1, b);
    graph.set_assignment(r2, c);
    graph.set_assignment(r3, b);
    graph.set_request(a, r1);
    graph.set_request(b, r2);
    graph.set_request(c, r3);
    let cycle = graph.find_cycle(a).unwrap();
    assert_eq!(cycle.edges(), [(graph.key(b), r2), (graph.key(c), r3)]);
}

#[test]
fn repeated_checks_agree() {
    let (mut graph, [a, b, c], [r1, r2, r3]) = graph::<3, 3>();
    graph.set_assignment(r1, a);
    graph.set_assignment(r2, b);
    graph.set_assignment(r3, c);
    graph.set_request(a, r2);
    graph.set_request(b, r3);
    for _ in 0..3 {
        assert!(!graph.would_deadlock(a));
    }
    graph.set_request(c, r1);
    for _ in 0..3 {
        assert_eq!(graph.find_cycle(c).unwrap().len(), 3);
        assert_eq!(graph.find_cycle(a).unwrap().len(), 3);
    }
    graph.clear_request(c);
    for _ in 0..3 {
        assert!(!graph.would_deadlock(a));
        assert!(!graph.would_deadlock(c));
    }
}

#[test]
fn long_chain() {
    const N: usize = 1_000;
    let mut graph = Graph::with_capacity(N, N);
    let threads: Vec<_> = (0..N)
        .map(|_| thread::spawn(ThreadKey::current).join().unwrap())
        .map(|key| graph.insert_thread(key))
        .collect();
    let resources: Vec<_> = (0..N).map(|_| graph.insert_resource()).collect();
    for i in 0..N {
        graph.set_assignment(resources[i], threads[i]);
    }
    for i in 0..N - 1 {
        graph.set_request(threads[i], resources[i + 1]);
    }
    assert!(!graph.would_deadlock(threads[0]));
    graph.set_request(threads[N - 1], resources[0]);
    assert_eq!(graph.find_cycle(threads[0]).unwrap().len(), N);
}

#[test]
fn clear() {
    let (mut graph, [a], [r]) = graph::<1, 1>();
    let key = graph.key(a);
    graph.set_assignment(r, a);
    graph.clear();
    assert_eq!(graph.thread_count(), 0);
    assert_eq!(graph.resource_count(), 0);
    assert_eq!(graph.thread(key), None);
    assert!(!graph.contains_resource(r));
}
