//! Pooled bindings: acquisition through the pool and exactly-once return.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::task::Poll;
use std::time::Duration;

use keeper_resource::{
    DependencyRegistry, Disposal, Escalation, FailureKind, IdlePool, ManagedObject,
    ManagedObjectPool, ManagedObjectSource, ManualClock, PoolConfig, ResourceMetaData, Scope,
    SourceHandle, Visit, VisitId,
};
use mockall::mock;
use parking_lot::Mutex;
use tokio::task::JoinSet;

use common::{Behaviour, CountingRecycle, ImmediateSource, TestObject, counting_waker};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

mock! {
    Pool {}

    impl ManagedObjectPool for Pool {
        fn acquire(&self, handle: SourceHandle);
        fn release(&self, object: Arc<dyn ManagedObject>);
        fn lost(&self, object: Arc<dyn ManagedObject>, cause: Option<Escalation>);
    }
}

fn acquire_now(container: &keeper_resource::ManagedContainer) -> keeper_resource::Result<()> {
    let (_wakes, waker) = counting_waker();
    match container.poll_acquire(&Visit::new(VisitId::new(), &waker)) {
        Poll::Ready(result) => result.map(|_| ()),
        Poll::Pending => panic!("pool completes acquisitions synchronously"),
    }
}

/// Source that keeps objects handed back for reuse and serves them first.
#[derive(Default)]
struct RecyclingSource {
    spare: Mutex<Vec<Arc<dyn ManagedObject>>>,
    next_id: AtomicU32,
    reused: AtomicUsize,
}

impl ManagedObjectSource for RecyclingSource {
    fn source(&self, handle: SourceHandle) {
        let spare = self.spare.lock().pop();
        match spare {
            Some(object) => handle.sourced_shared(object),
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                handle.sourced(TestObject::new(id, Behaviour::default()));
            }
        }
    }

    fn reuse(&self, object: Arc<dyn ManagedObject>) {
        self.reused.fetch_add(1, Ordering::SeqCst);
        self.spare.lock().push(object);
    }
}

/// Workers repeatedly open a function scope, acquire `meta` and end the
/// scope. Fails if two live containers ever hold the same object.
async fn churn(meta: Arc<ResourceMetaData>, workers: usize, rounds: usize) {
    let process = Scope::process();
    let live: Arc<Mutex<HashSet<usize>>> = Arc::default();
    let mut tasks = JoinSet::new();
    for _ in 0..workers {
        let process = process.clone();
        let meta = Arc::clone(&meta);
        let live = Arc::clone(&live);
        tasks.spawn(async move {
            for _ in 0..rounds {
                let scope = process.function().unwrap();
                let container = scope
                    .container(Arc::clone(&meta), DependencyRegistry::empty())
                    .unwrap();
                let object = container.acquire_as::<TestObject>().await.unwrap();
                let address = Arc::as_ptr(&object) as usize;
                assert!(
                    live.lock().insert(address),
                    "object {} held by two live containers",
                    object.id
                );
                tokio::task::yield_now().await;
                live.lock().remove(&address);
                scope.end();
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("worker panicked");
    }
}

// ---------------------------------------------------------------------------
// Mocked pool
// ---------------------------------------------------------------------------

#[test]
fn each_container_acquires_and_returns_once() {
    common::init_logging();
    let mut pool = MockPool::new();
    pool.expect_acquire()
        .times(2)
        .returning(|handle| handle.sourced(TestObject::new(7, Behaviour::default())));
    pool.expect_release().times(2).return_const(());
    pool.expect_lost().never();

    let meta = ResourceMetaData::builder("db", ImmediateSource::new(Behaviour::default()))
        .pool(Arc::new(pool))
        .build()
        .unwrap();

    let process = Scope::process();
    let first = process.function().unwrap();
    let second = process.function().unwrap();
    let a = first
        .container(Arc::clone(&meta), DependencyRegistry::empty())
        .unwrap();
    let b = second
        .container(Arc::clone(&meta), DependencyRegistry::empty())
        .unwrap();

    acquire_now(&a).unwrap();
    acquire_now(&b).unwrap();
    acquire_now(&a).unwrap();

    assert_eq!(first.end(), vec![("db".to_string(), Disposal::Pooled)]);
    assert_eq!(b.release(), Disposal::Pooled);
    assert_eq!(second.end(), vec![("db".to_string(), Disposal::AlreadyReleased)]);
    assert_eq!(b.release(), Disposal::AlreadyReleased);
}

#[test]
fn failed_object_is_reported_lost_with_its_cause() {
    common::init_logging();
    let mut pool = MockPool::new();
    pool.expect_acquire().times(1).returning(|handle| {
        handle.sourced(TestObject::new(
            1,
            Behaviour {
                reject_listener: true,
                ..Behaviour::exposing(keeper_resource::Capabilities {
                    asynchronous: true,
                    ..Default::default()
                })
            },
        ));
    });
    pool.expect_release().never();
    pool.expect_lost()
        .withf(|_, cause| {
            cause
                .as_ref()
                .is_some_and(|cause| cause.kind() == FailureKind::OperationRegistration)
        })
        .times(1)
        .return_const(());

    let recycle = CountingRecycle::new(true);
    let meta = ResourceMetaData::builder("channel", ImmediateSource::new(Behaviour::default()))
        .asynchronous()
        .pool(Arc::new(pool))
        .recycle(recycle.clone())
        .build()
        .unwrap();
    let scope = Scope::process();
    let container = scope
        .container(meta, DependencyRegistry::empty())
        .unwrap();

    let err = acquire_now(&container).unwrap_err();
    assert_eq!(err.kind(), FailureKind::OperationRegistration);
    assert_eq!(container.release(), Disposal::Lost);
    assert_eq!(recycle.calls(), 0, "failed objects are never recycled");
}

#[test]
fn recycled_object_is_released_to_the_pool() {
    common::init_logging();
    let mut pool = MockPool::new();
    pool.expect_acquire()
        .times(1)
        .returning(|handle| handle.sourced(TestObject::new(1, Behaviour::default())));
    pool.expect_release().times(1).return_const(());
    pool.expect_lost().never();

    let recycle = CountingRecycle::new(true);
    let meta = ResourceMetaData::builder("db", ImmediateSource::new(Behaviour::default()))
        .pool(Arc::new(pool))
        .recycle(recycle.clone())
        .build()
        .unwrap();
    let scope = Scope::process();
    let container = scope
        .container(meta, DependencyRegistry::empty())
        .unwrap();

    acquire_now(&container).unwrap();
    assert_eq!(container.release(), Disposal::Recycled);
    assert_eq!(recycle.calls(), 1);
}

// ---------------------------------------------------------------------------
// IdlePool
// ---------------------------------------------------------------------------

#[test]
fn idle_pool_serves_the_next_scope_from_idle_objects() {
    common::init_logging();
    let source = ImmediateSource::new(Behaviour::default());
    let clock = ManualClock::new();
    let pool = Arc::new(
        IdlePool::with_clock(
            source.clone(),
            PoolConfig {
                max_idle: 2,
                idle_timeout: Duration::from_secs(10),
                max_lifetime: Duration::from_secs(60),
            },
            clock.shared(),
        )
        .unwrap(),
    );
    let meta = ResourceMetaData::builder("db", source.clone())
        .pool(pool.clone())
        .build()
        .unwrap();
    let process = Scope::process();

    let first_id = {
        let scope = process.function().unwrap();
        let container = scope
            .container(Arc::clone(&meta), DependencyRegistry::empty())
            .unwrap();
        acquire_now(&container).unwrap();
        let id = container.object_as::<TestObject>().unwrap().id;
        scope.end();
        id
    };

    let scope = process.function().unwrap();
    let container = scope
        .container(Arc::clone(&meta), DependencyRegistry::empty())
        .unwrap();
    acquire_now(&container).unwrap();
    assert_eq!(container.object_as::<TestObject>().unwrap().id, first_id);
    assert_eq!(source.calls(), 1, "second acquisition reused the idle object");

    scope.end();
    clock.advance(Duration::from_secs(30));
    assert_eq!(pool.prune(), 1);

    let stats = pool.stats();
    assert_eq!(stats.total_acquisitions, 2);
    assert_eq!(stats.reused, 1);
    assert_eq!(stats.sourced, 1);
    assert_eq!(stats.total_releases, 2);
    assert_eq!(stats.idle, 0);
}

#[test]
fn lifetime_counts_from_sourcing_not_first_release() {
    common::init_logging();
    let source = ImmediateSource::new(Behaviour::default());
    let clock = ManualClock::new();
    let pool = Arc::new(
        IdlePool::with_clock(
            source.clone(),
            PoolConfig {
                max_idle: 2,
                idle_timeout: Duration::from_secs(10),
                max_lifetime: Duration::from_secs(20),
            },
            clock.shared(),
        )
        .unwrap(),
    );
    let meta = ResourceMetaData::builder("db", source.clone())
        .pool(pool.clone())
        .build()
        .unwrap();
    let process = Scope::process();

    let scope = process.function().unwrap();
    let container = scope
        .container(Arc::clone(&meta), DependencyRegistry::empty())
        .unwrap();
    acquire_now(&container).unwrap();
    clock.advance(Duration::from_secs(60));
    scope.end();
    assert_eq!(pool.stats().idle, 0, "outlived max_lifetime while in use");

    let scope = process.function().unwrap();
    let container = scope
        .container(Arc::clone(&meta), DependencyRegistry::empty())
        .unwrap();
    acquire_now(&container).unwrap();
    assert_eq!(source.calls(), 2);
    assert_eq!(pool.stats().reused, 0);
}

// ---------------------------------------------------------------------------
// Reuse under concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_reuse_never_shares_an_object_between_live_containers() {
    common::init_logging();
    let source = ImmediateSource::new(Behaviour::default());
    let pool = Arc::new(IdlePool::new(source.clone(), PoolConfig::default()).unwrap());
    let recycle = CountingRecycle::new(true);
    let meta = ResourceMetaData::builder("db", source.clone())
        .pool(pool.clone())
        .recycle(recycle.clone())
        .build()
        .unwrap();

    churn(meta, 8, 25).await;

    let stats = pool.stats();
    assert_eq!(recycle.calls(), 200);
    assert_eq!(stats.total_acquisitions, 200);
    assert!(stats.reused > 0);
    assert_eq!(stats.reused + stats.sourced, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn source_reuse_never_shares_an_object_between_live_containers() {
    common::init_logging();
    let source = Arc::new(RecyclingSource::default());
    let recycle = CountingRecycle::new(true);
    let meta = ResourceMetaData::builder("db", source.clone())
        .recycle(recycle.clone())
        .build()
        .unwrap();

    churn(meta, 8, 25).await;

    assert_eq!(recycle.calls(), 200);
    assert_eq!(source.reused.load(Ordering::SeqCst), 200);
    assert!(source.next_id.load(Ordering::SeqCst) <= 8);
}
