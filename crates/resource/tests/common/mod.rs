//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::task::{Wake, Waker};

use keeper_resource::{
    AsynchronousObject, BoxError, Capabilities, CoordinatingObject, DependencyRegistry,
    Escalation, ManagedContainer, ManagedObject, ManagedObjectPool, ManagedObjectSource,
    NameAware, ObjectRegistry,
    OperationListener, OversightEvaluator, RecycleHandle, RecycleRoutine, ResourceMetaData,
    RuleId, Scope, SourceHandle,
};
use parking_lot::Mutex;

pub fn init_logging() {
    let _ = keeper_log::init_test();
}

// ---------------------------------------------------------------------------
// Managed object
// ---------------------------------------------------------------------------

/// Behaviour switches for [`TestObject`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    /// Capabilities the object exposes.
    pub exposes: Capabilities,
    /// Reject the operation listener.
    pub reject_listener: bool,
    /// Reject injected dependencies.
    pub reject_dependencies: bool,
    /// Start an operation from inside `register_listener`.
    pub start_on_register: bool,
}

impl Behaviour {
    pub fn exposing(exposes: Capabilities) -> Self {
        Self {
            exposes,
            ..Self::default()
        }
    }
}

/// Managed object recording every callback it receives.
pub struct TestObject {
    pub id: u32,
    behaviour: Behaviour,
    bound_name: Mutex<Option<String>>,
    listener: Mutex<Option<OperationListener>>,
    injected: Mutex<Vec<u32>>,
    load_calls: AtomicUsize,
}

impl TestObject {
    pub fn new(id: u32, behaviour: Behaviour) -> Self {
        Self {
            id,
            behaviour,
            bound_name: Mutex::new(None),
            listener: Mutex::new(None),
            injected: Mutex::new(Vec::new()),
            load_calls: AtomicUsize::new(0),
        }
    }

    pub fn bound_name(&self) -> Option<String> {
        self.bound_name.lock().clone()
    }

    pub fn listener(&self) -> Option<OperationListener> {
        self.listener.lock().clone()
    }

    /// Ids of the dependency objects injected, in index order.
    pub fn injected(&self) -> Vec<u32> {
        self.injected.lock().clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn start_operation(&self) {
        if let Some(listener) = self.listener() {
            listener.started();
        }
    }

    pub fn complete_operation(&self) {
        if let Some(listener) = self.listener() {
            listener.completed();
        }
    }
}

impl ManagedObject for TestObject {
    fn name_aware(&self) -> Option<&dyn NameAware> {
        self.behaviour.exposes.name_aware.then_some(self as &dyn NameAware)
    }

    fn asynchronous(&self) -> Option<&dyn AsynchronousObject> {
        self.behaviour
            .exposes
            .asynchronous
            .then_some(self as &dyn AsynchronousObject)
    }

    fn coordinating(&self) -> Option<&dyn CoordinatingObject> {
        self.behaviour
            .exposes
            .coordinating
            .then_some(self as &dyn CoordinatingObject)
    }
}

impl NameAware for TestObject {
    fn bind_name(&self, name: &str) {
        *self.bound_name.lock() = Some(name.to_string());
    }
}

impl AsynchronousObject for TestObject {
    fn register_listener(&self, listener: OperationListener) -> Result<(), BoxError> {
        if self.behaviour.reject_listener {
            return Err("listener rejected".into());
        }
        *self.listener.lock() = Some(listener.clone());
        if self.behaviour.start_on_register {
            listener.started();
        }
        Ok(())
    }
}

impl CoordinatingObject for TestObject {
    fn load_objects(&self, registry: &ObjectRegistry<'_>) -> Result<(), BoxError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.reject_dependencies {
            return Err("dependencies rejected".into());
        }
        let mut injected = Vec::with_capacity(registry.len());
        for index in 0..registry.len() {
            injected.push(registry.get_as::<TestObject>(index)?.id);
        }
        *self.injected.lock() = injected;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Source that delivers a fresh [`TestObject`] synchronously.
pub struct ImmediateSource {
    behaviour: Behaviour,
    calls: AtomicUsize,
    reused: AtomicUsize,
    next_id: AtomicU32,
}

impl ImmediateSource {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Self::starting_at(behaviour, 1)
    }

    /// Source whose objects are numbered from `first_id`.
    pub fn starting_at(behaviour: Behaviour, first_id: u32) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            next_id: AtomicU32::new(first_id),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::SeqCst)
    }
}

impl ManagedObjectSource for ImmediateSource {
    fn source(&self, handle: SourceHandle) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        handle.sourced(TestObject::new(id, self.behaviour));
    }

    fn reuse(&self, _object: Arc<dyn ManagedObject>) {
        self.reused.fetch_add(1, Ordering::SeqCst);
    }
}

/// Source that holds every handle until told to complete it.
pub struct DeferredSource {
    behaviour: Behaviour,
    calls: AtomicUsize,
    next_id: AtomicU32,
    pending: Mutex<VecDeque<SourceHandle>>,
}

impl DeferredSource {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            next_id: AtomicU32::new(1),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn take(&self) -> SourceHandle {
        self.pending
            .lock()
            .pop_front()
            .expect("a sourcing attempt is outstanding")
    }

    /// Deliver a fresh object to the oldest outstanding attempt.
    pub fn complete(&self) -> u32 {
        let handle = self.take();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        handle.sourced(TestObject::new(id, self.behaviour));
        id
    }

    /// Report the oldest outstanding attempt as failed.
    pub fn fail(&self, cause: &str) {
        self.take().failed(cause.to_string());
    }

    /// Hand the oldest outstanding attempt back to the test.
    pub fn take_handle(&self) -> SourceHandle {
        self.take()
    }
}

impl ManagedObjectSource for DeferredSource {
    fn source(&self, handle: SourceHandle) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push_back(handle);
    }
}

/// Source that always fails.
pub struct FailingSource;

impl ManagedObjectSource for FailingSource {
    fn source(&self, handle: SourceHandle) {
        handle.failed("connection refused");
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Pool that sources every acquisition and records what comes back.
pub struct RecordingPool {
    source: Arc<dyn ManagedObjectSource>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    lost: Mutex<Vec<Option<Escalation>>>,
}

impl RecordingPool {
    pub fn new(source: Arc<dyn ManagedObjectSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            lost: Mutex::new(Vec::new()),
        })
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Causes passed to `lost`, in call order.
    pub fn lost(&self) -> Vec<Option<Escalation>> {
        self.lost.lock().clone()
    }
}

impl ManagedObjectPool for RecordingPool {
    fn acquire(&self, handle: SourceHandle) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.source.source(handle);
    }

    fn release(&self, _object: Arc<dyn ManagedObject>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn lost(&self, _object: Arc<dyn ManagedObject>, cause: Option<Escalation>) {
        self.lost.lock().push(cause);
    }
}

// ---------------------------------------------------------------------------
// Oversight and recycling
// ---------------------------------------------------------------------------

/// Evaluator returning a configurable rule set and counting its calls.
#[derive(Default)]
pub struct CountingEvaluator {
    calls: AtomicUsize,
    rules: Mutex<BTreeSet<RuleId>>,
}

impl CountingEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_rules(&self, rules: &[&str]) {
        *self.rules.lock() = rules.iter().map(|rule| RuleId::new(rule)).collect();
    }
}

impl OversightEvaluator for CountingEvaluator {
    fn active_rules(&self, _binding: &str, _object: &dyn ManagedObject) -> BTreeSet<RuleId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rules.lock().clone()
    }
}

/// Recycle routine counting its calls, reusing or discarding.
pub struct CountingRecycle {
    calls: AtomicUsize,
    reuse: bool,
}

impl CountingRecycle {
    pub fn new(reuse: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reuse,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecycleRoutine for CountingRecycle {
    fn recycle(&self, handle: RecycleHandle) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reuse {
            handle.reuse();
        }
    }
}

// ---------------------------------------------------------------------------
// Wakers
// ---------------------------------------------------------------------------

/// Waker counting how often it was woken.
#[derive(Default)]
pub struct WakeCounter(AtomicUsize);

impl WakeCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counting_waker() -> (Arc<WakeCounter>, Waker) {
    let counter = Arc::new(WakeCounter::default());
    let waker = Waker::from(Arc::clone(&counter));
    (counter, waker)
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// A container without dependencies in a fresh process scope.
pub fn standalone(meta: Arc<ResourceMetaData>) -> (Scope, ManagedContainer) {
    let scope = Scope::process();
    let container = scope
        .container(meta, DependencyRegistry::empty())
        .expect("container");
    (scope, container)
}
