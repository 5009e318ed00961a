//! Managed resource container
//!
//! A [`ManagedContainer`] drives one binding's object through
//!
//! ```text
//! Unsourced → Sourcing → Sourced → Governed → Coordinated → Ready ⇄ InOperation
//! ```
//!
//! ending in `Failed` or `Released`. Callers advance it with
//! [`load`](ManagedContainer::load), [`govern`](ManagedContainer::govern),
//! [`coordinate`](ManagedContainer::coordinate),
//! [`check_ready`](ManagedContainer::check_ready) and
//! [`object`](ManagedContainer::object), in that order, within one [`Visit`].
//! A step that cannot finish parks the visit's waker and returns
//! [`Poll::Pending`]; the caller is woken when the step may progress.
//!
//! External threads call back through [`SourceHandle`](crate::SourceHandle)
//! and [`OperationListener`]. All state lives under the owning scope's lock;
//! no callback into user code and no waker runs while it is held.

use std::any::type_name;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::task::{Poll, ready};
use std::time::Duration;

use futures::future::poll_fn;
use uuid::Uuid;

use crate::error::{BoxError, Error, Escalation, Result};
use crate::events::{ContainerEvent, ContainerEventKind};
use crate::metadata::ResourceMetaData;
use crate::object::{ManagedObject, OperationListener, downcast};
use crate::oversight::{OversightAttachment, RuleId, Visit, VisitId};
use crate::phase::Phase;
use crate::recycle::{self, Disposal};
use crate::registry::{DependencyRegistry, ObjectRegistry};
use crate::scope::Scope;
use crate::source::SourceHandle;
use crate::wait_queue::{Concern, Enqueued, WaitQueue, Wakeups};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Mutable state of one container, owned by its scope.
pub(crate) struct State {
    pub(crate) meta: Arc<ResourceMetaData>,
    phase: Phase,
    object: Option<Arc<dyn ManagedObject>>,
    failure: Option<Escalation>,
    sourcing: WaitQueue,
    operation: Option<WaitQueue>,
    oversight: OversightAttachment,
    /// Dependencies are being injected outside the lock.
    injecting: bool,
    /// The operation listener has been handed out.
    listening: bool,
    disposed: bool,
}

/// What is left to do once a container's state has been released.
pub(crate) struct ReleaseWork {
    pub(crate) meta: Arc<ResourceMetaData>,
    pub(crate) object: Option<Arc<dyn ManagedObject>>,
    pub(crate) failure: Option<Escalation>,
}

/// Outcome of a step decided under the lock.
enum Step<T> {
    Done(Result<()>),
    Pending,
    Proceed(T),
}

/// Side effects collected under the lock and applied after it is dropped.
#[derive(Default)]
struct Effects {
    wakeups: Wakeups,
    events: Vec<ContainerEventKind>,
}

impl Effects {
    fn wake(&mut self, wakeups: Wakeups) {
        self.wakeups.extend(wakeups);
    }

    fn event(&mut self, kind: ContainerEventKind) {
        self.events.push(kind);
    }
}

impl State {
    pub(crate) fn new(meta: Arc<ResourceMetaData>) -> Self {
        let timeout = meta.timeout();
        Self {
            operation: meta
                .is_asynchronous()
                .then(|| WaitQueue::new(Concern::Operation, timeout)),
            sourcing: WaitQueue::new(Concern::Sourcing, timeout),
            meta,
            phase: Phase::Unsourced,
            object: None,
            failure: None,
            oversight: OversightAttachment::default(),
            injecting: false,
            listening: false,
            disposed: false,
        }
    }

    fn violation(&self, operation: &'static str) -> Escalation {
        Escalation::new(Error::protocol_violation(
            self.meta.binding(),
            operation,
            self.phase,
        ))
    }

    /// The answer for a caller that cannot proceed: the recorded failure,
    /// an unloaded escalation, or a protocol violation.
    fn replay(&self, operation: &'static str) -> Escalation {
        match (&self.failure, self.phase) {
            (Some(failure), _) => failure.clone(),
            (None, Phase::Released) => Escalation::new(Error::Unloaded {
                binding: self.meta.binding().to_string(),
            }),
            _ => self.violation(operation),
        }
    }

    fn fail(&mut self, failure: Escalation, fx: &mut Effects) {
        debug_assert!(self.phase.can_transition_to(Phase::Failed));
        tracing::warn!(
            binding = %self.meta.binding(),
            kind = %failure.kind(),
            phase = %self.phase,
            error = %failure,
            "Container failed"
        );
        self.phase = Phase::Failed;
        self.failure = Some(failure.clone());
        fx.wake(self.sourcing.release_all());
        if let Some(operation) = &mut self.operation {
            fx.wake(operation.release_all());
        }
        fx.event(ContainerEventKind::Failed {
            kind: failure.kind(),
        });
    }

    /// Fail the container if its outstanding phase ran past the timeout.
    fn expire(&mut self, now: Duration, fx: &mut Effects) -> bool {
        let queue = match self.phase {
            Phase::Sourcing => &self.sourcing,
            Phase::InOperation => match &self.operation {
                Some(queue) => queue,
                None => return false,
            },
            _ => return false,
        };
        if !queue.check_timeout(now) {
            return false;
        }
        let error = queue.timeout_error(self.meta.binding(), self.meta.object_type());
        self.fail(Escalation::new(error), fx);
        true
    }

    /// Park the visit on the queue of the outstanding phase.
    fn wait<T>(
        &mut self,
        operation: &'static str,
        now: Duration,
        visit: &Visit<'_>,
        fx: &mut Effects,
    ) -> Step<T> {
        if self.expire(now, fx) {
            return Step::Done(Err(self.replay(operation)));
        }
        let enqueued = match self.phase {
            Phase::Unsourced | Phase::Sourcing => Some(self.sourcing.enqueue(visit.waker())),
            Phase::InOperation => self
                .operation
                .as_mut()
                .map(|queue| queue.enqueue(visit.waker())),
            _ => None,
        };
        match enqueued {
            Some(Enqueued::Queued | Enqueued::AlreadyQueued) => Step::Pending,
            Some(Enqueued::Closed) => Step::Done(Err(self.replay(operation))),
            None => Step::Done(Err(self.violation(operation))),
        }
    }

    /// Park the visit on the sourcing queue while another caller injects.
    fn await_injection<T>(&mut self, visit: &Visit<'_>) -> Step<T> {
        match self.sourcing.enqueue(visit.waker()) {
            Enqueued::Closed => Step::Done(Err(self.replay("coordinate"))),
            Enqueued::Queued | Enqueued::AlreadyQueued => Step::Pending,
        }
    }

    fn attach(&mut self, visit: VisitId, rules: BTreeSet<RuleId>) {
        self.oversight.attach(visit, rules);
        if self.phase == Phase::Sourced {
            self.phase = Phase::Governed;
            tracing::trace!(binding = %self.meta.binding(), "Container governed");
        }
    }

    /// Release the state exactly once.
    pub(crate) fn release(&mut self) -> Option<(Wakeups, ReleaseWork)> {
        if self.disposed {
            return None;
        }
        self.disposed = true;
        if self.phase != Phase::Failed {
            self.phase = Phase::Released;
        }
        let mut wakeups = self.sourcing.close();
        if let Some(operation) = &mut self.operation {
            wakeups.extend(operation.close());
        }
        self.oversight.clear();
        Some((
            wakeups,
            ReleaseWork {
                meta: Arc::clone(&self.meta),
                object: self.object.take(),
                failure: self.failure.clone(),
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Immutable part of a container, shared by every handle to it.
pub(crate) struct Shared {
    id: Uuid,
    slot: usize,
    scope: Scope,
    meta: Arc<ResourceMetaData>,
    dependencies: DependencyRegistry,
}

impl Shared {
    /// Run `f` on this container's state under the scope lock, then apply
    /// the collected side effects.
    fn locked<R>(&self, f: impl FnOnce(&mut State, &mut Effects) -> R) -> R {
        let mut effects = Effects::default();
        let result = {
            let mut scope = self.scope.lock();
            f(&mut scope.containers[self.slot], &mut effects)
        };
        effects.wakeups.wake();
        for kind in effects.events {
            self.scope.emit(ContainerEvent::new(
                self.meta.binding(),
                self.scope.kind(),
                kind,
            ));
        }
        result
    }

    fn late(state: &State, callback: &'static str, fx: &mut Effects) {
        tracing::warn!(
            binding = %state.meta.binding(),
            phase = %state.phase,
            callback,
            "Late callback ignored"
        );
        fx.event(ContainerEventKind::LateCallback {
            callback,
            phase: state.phase,
        });
    }

    pub(crate) fn deliver_object(&self, object: Arc<dyn ManagedObject>) {
        let missing = self.meta.missing_capability(&*object);
        if missing.is_none()
            && self.meta.is_name_aware()
            && let Some(named) = object.name_aware()
        {
            named.bind_name(self.meta.binding());
        }

        let rejected = self.locked(move |state, fx| {
            if state.phase != Phase::Sourcing {
                Self::late(state, "sourced", fx);
                return Some((object, state.failure.clone()));
            }
            if let Some(capability) = missing {
                let failure = Escalation::new(Error::SourcingFailed {
                    binding: state.meta.binding().to_string(),
                    object_type: state.meta.object_type().to_string(),
                    source: format!("sourced object does not expose {capability}").into(),
                });
                state.fail(failure.clone(), fx);
                return Some((object, Some(failure)));
            }
            state.phase = Phase::Sourced;
            state.object = Some(object);
            state.oversight.clear();
            fx.wake(state.sourcing.release_all());
            fx.event(ContainerEventKind::Sourced);
            tracing::debug!(binding = %state.meta.binding(), "Object sourced");
            None
        });

        if let Some((object, failure)) = rejected {
            let disposal = recycle::discard_unused(&self.meta, object, failure);
            tracing::debug!(binding = %self.meta.binding(), %disposal, "Rejected object disposed");
        }
    }

    pub(crate) fn deliver_failure(&self, cause: BoxError) {
        self.locked(move |state, fx| {
            if state.phase != Phase::Sourcing {
                Self::late(state, "failed", fx);
                return;
            }
            let failure = Escalation::new(Error::SourcingFailed {
                binding: state.meta.binding().to_string(),
                object_type: state.meta.object_type().to_string(),
                source: cause,
            });
            state.fail(failure, fx);
        });
    }

    pub(crate) fn operation_started(&self) {
        let now = self.scope.now();
        self.locked(|state, fx| match state.phase {
            Phase::Ready => {
                state.phase = Phase::InOperation;
                if let Some(operation) = &mut state.operation {
                    operation.start(now);
                }
                fx.event(ContainerEventKind::OperationStarted);
                tracing::debug!(binding = %state.meta.binding(), "Operation started");
            }
            Phase::InOperation => {
                tracing::trace!(binding = %state.meta.binding(), "Operation already started");
            }
            Phase::Failed | Phase::Released => Self::late(state, "started", fx),
            phase => tracing::warn!(
                binding = %state.meta.binding(),
                %phase,
                "Operation start before the container is ready ignored"
            ),
        });
    }

    pub(crate) fn operation_completed(&self) {
        self.locked(|state, fx| match state.phase {
            Phase::InOperation => {
                state.phase = Phase::Ready;
                if let Some(operation) = &mut state.operation {
                    fx.wake(operation.release_all());
                }
                fx.event(ContainerEventKind::OperationCompleted);
                tracing::debug!(binding = %state.meta.binding(), "Operation completed");
            }
            Phase::Failed | Phase::Released => Self::late(state, "completed", fx),
            phase => tracing::debug!(
                binding = %state.meta.binding(),
                %phase,
                "Operation completion without an outstanding operation ignored"
            ),
        });
    }

    pub(crate) fn operation_failed(&self, cause: BoxError) {
        self.locked(move |state, fx| match state.phase {
            Phase::Ready | Phase::InOperation => {
                let failure = Escalation::new(Error::OperationFailed {
                    binding: state.meta.binding().to_string(),
                    object_type: state.meta.object_type().to_string(),
                    source: cause,
                });
                state.fail(failure, fx);
            }
            Phase::Failed | Phase::Released => Self::late(state, "operation failed", fx),
            phase => tracing::warn!(
                binding = %state.meta.binding(),
                %phase,
                error = %cause,
                "Operation failure before the container is ready ignored"
            ),
        });
    }
}

// ---------------------------------------------------------------------------
// ManagedContainer
// ---------------------------------------------------------------------------

/// Result of [`ManagedContainer::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This call started sourcing.
    Started,
    /// Sourcing had already been started.
    AlreadyLoaded,
}

/// Handle to one binding's container in one scope.
///
/// Cloning yields another handle to the same container.
#[derive(Clone)]
pub struct ManagedContainer {
    shared: Arc<Shared>,
}

impl ManagedContainer {
    pub(crate) fn new(
        scope: Scope,
        slot: usize,
        meta: Arc<ResourceMetaData>,
        dependencies: DependencyRegistry,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                slot,
                scope,
                meta,
                dependencies,
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    /// Unique id of this container.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The binding name.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.shared.meta.binding()
    }

    /// The binding metadata.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ResourceMetaData> {
        &self.shared.meta
    }

    /// The owning scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.shared.scope
    }

    /// Containers providing this container's dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.shared.dependencies
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.locked(|state, _| state.phase)
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<Escalation> {
        self.shared.locked(|state, _| state.failure.clone())
    }

    /// Callers parked until sourcing completes.
    #[must_use]
    pub fn sourcing_waiters(&self) -> usize {
        self.shared.locked(|state, _| state.sourcing.len())
    }

    /// Callers parked until the outstanding operation completes.
    #[must_use]
    pub fn operation_waiters(&self) -> usize {
        self.shared
            .locked(|state, _| state.operation.as_ref().map_or(0, WaitQueue::len))
    }

    /// Oversight rules attached by the latest visit.
    #[must_use]
    pub fn active_rules(&self) -> BTreeSet<RuleId> {
        self.shared.locked(|state, _| state.oversight.rules().clone())
    }

    /// How often oversight has been attached to the current object.
    #[must_use]
    pub fn oversight_evaluations(&self) -> u64 {
        self.shared.locked(|state, _| state.oversight.evaluations())
    }

    /// Start sourcing the object unless it was already started.
    ///
    /// The source (or pool) is called at most once per container.
    pub fn load(&self) -> LoadOutcome {
        let now = self.shared.scope.now();
        let started = self.shared.locked(|state, _| {
            if state.phase != Phase::Unsourced {
                return false;
            }
            state.phase = Phase::Sourcing;
            state.sourcing.start(now);
            true
        });
        if !started {
            return LoadOutcome::AlreadyLoaded;
        }

        let meta = &self.shared.meta;
        tracing::debug!(
            binding = %meta.binding(),
            scope = %self.shared.scope.kind(),
            pooled = meta.is_pooled(),
            "Sourcing object"
        );
        let handle = SourceHandle::new(self.downgrade(), Arc::clone(meta));
        match meta.pool() {
            Some(pool) => pool.acquire(handle),
            None => meta.source().source(handle),
        }
        LoadOutcome::Started
    }

    /// Attach oversight for this visit.
    ///
    /// Still loading until an object is sourced: the visit is parked on the
    /// sourcing queue, also before [`load`](Self::load) was called. The
    /// oversight evaluator only ever sees a sourced object and runs at most
    /// once per visit.
    pub fn govern(&self, visit: &Visit<'_>) -> Poll<Result<()>> {
        let now = self.shared.scope.now();
        let step = self.shared.locked(|state, fx| match state.phase {
            Phase::Failed | Phase::Released => Step::Done(Err(state.replay("govern"))),
            Phase::Unsourced | Phase::Sourcing => state.wait("govern", now, visit, fx),
            _ if state.oversight.governed_in(visit.id()) => Step::Done(Ok(())),
            _ => {
                let evaluate = match (state.meta.oversight(), &state.object) {
                    (Some(evaluator), Some(object)) => {
                        Some((Arc::clone(evaluator), Arc::clone(object)))
                    }
                    _ => None,
                };
                match evaluate {
                    Some(inputs) => Step::Proceed(inputs),
                    None => {
                        state.attach(visit.id(), BTreeSet::new());
                        Step::Done(Ok(()))
                    }
                }
            }
        });

        let (evaluator, object) = match step {
            Step::Done(result) => return Poll::Ready(result),
            Step::Pending => return Poll::Pending,
            Step::Proceed(inputs) => inputs,
        };
        let rules = evaluator.active_rules(self.binding(), &*object);
        Poll::Ready(self.shared.locked(|state, _| {
            if state.phase.is_terminal() {
                return Err(state.replay("govern"));
            }
            state.attach(visit.id(), rules);
            Ok(())
        }))
    }

    /// Inject dependencies, driving each dependency container to readiness
    /// within this visit first.
    ///
    /// While a dependency is not ready the visit is parked on that
    /// dependency's queue, not this container's.
    pub fn coordinate(&self, visit: &Visit<'_>) -> Poll<Result<()>> {
        let step = self.shared.locked(|state, _| match state.phase {
            Phase::Failed | Phase::Released => Step::Done(Err(state.replay("coordinate"))),
            Phase::Unsourced | Phase::Sourcing | Phase::Sourced => {
                Step::Done(Err(state.violation("coordinate")))
            }
            _ if !state.oversight.governed_in(visit.id()) => {
                Step::Done(Err(state.violation("coordinate")))
            }
            Phase::Coordinated | Phase::Ready | Phase::InOperation => Step::Done(Ok(())),
            _ if !state.meta.is_coordinating() => {
                state.phase = Phase::Coordinated;
                tracing::trace!(binding = %state.meta.binding(), "Container coordinated");
                Step::Done(Ok(()))
            }
            _ if state.injecting => state.await_injection(visit),
            _ => Step::Proceed(()),
        });
        match step {
            Step::Done(result) => return Poll::Ready(result),
            Step::Pending => return Poll::Pending,
            Step::Proceed(()) => {}
        }

        let meta = &self.shared.meta;
        let mut values = Vec::with_capacity(meta.dependencies().len());
        let slots = meta
            .dependencies()
            .iter()
            .zip(self.shared.dependencies.iter());
        for (dependency, container) in slots {
            let object = match container.poll_acquire(visit) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(object)) => object,
                Poll::Ready(Err(failure)) => {
                    tracing::debug!(
                        binding = %meta.binding(),
                        dependency = %dependency.name(),
                        "Dependency failed"
                    );
                    return Poll::Ready(Err(self.adopt_failure(failure)));
                }
            };
            match dependency.resolve(object) {
                Ok(value) => values.push(value),
                Err(cause) => return Poll::Ready(Err(self.coordination_failed(cause))),
            }
        }

        let claim = self.shared.locked(|state, _| match state.phase {
            Phase::Governed if state.injecting => state.await_injection(visit),
            Phase::Governed => match &state.object {
                Some(object) => {
                    state.injecting = true;
                    Step::Proceed(Arc::clone(object))
                }
                None => Step::Done(Err(state.violation("coordinate"))),
            },
            Phase::Coordinated | Phase::Ready | Phase::InOperation => Step::Done(Ok(())),
            _ => Step::Done(Err(state.replay("coordinate"))),
        });
        let object = match claim {
            Step::Done(result) => return Poll::Ready(result),
            Step::Pending => return Poll::Pending,
            Step::Proceed(object) => object,
        };

        let registry = ObjectRegistry::new(meta.binding(), meta.dependencies(), values);
        let outcome = match object.coordinating() {
            Some(coordinating) => coordinating.load_objects(&registry),
            None => Err("object does not expose CoordinatingObject".into()),
        };

        Poll::Ready(self.shared.locked(|state, fx| {
            state.injecting = false;
            fx.wake(state.sourcing.release_all());
            match (state.phase, outcome) {
                (Phase::Governed, Ok(())) => {
                    state.phase = Phase::Coordinated;
                    tracing::debug!(
                        binding = %state.meta.binding(),
                        dependencies = registry.len(),
                        "Dependencies injected"
                    );
                    Ok(())
                }
                (Phase::Governed, Err(cause)) => {
                    let failure = Escalation::new(Error::CoordinationFailed {
                        binding: state.meta.binding().to_string(),
                        source: cause,
                    });
                    state.fail(failure.clone(), fx);
                    Err(failure)
                }
                _ => Err(state.replay("coordinate")),
            }
        }))
    }

    /// Record a dependency's failure as this container's own.
    fn adopt_failure(&self, failure: Escalation) -> Escalation {
        self.shared.locked(|state, fx| {
            if state.phase.is_terminal() {
                return state.replay("coordinate");
            }
            state.fail(failure.clone(), fx);
            failure
        })
    }

    fn coordination_failed(&self, cause: BoxError) -> Escalation {
        self.shared.locked(move |state, fx| {
            if state.phase.is_terminal() {
                return state.replay("coordinate");
            }
            let failure = Escalation::new(Error::CoordinationFailed {
                binding: state.meta.binding().to_string(),
                source: cause,
            });
            state.fail(failure.clone(), fx);
            failure
        })
    }

    /// Check that the object may be used.
    ///
    /// Pending while sourcing or while an asynchronous operation is
    /// outstanding. Times the outstanding phase out against the scope's
    /// clock.
    pub fn check_ready(&self, visit: &Visit<'_>) -> Poll<Result<()>> {
        let now = self.shared.scope.now();
        let step = self.shared.locked(|state, fx| match state.phase {
            Phase::Failed | Phase::Released => Step::Done(Err(state.replay("check_ready"))),
            Phase::Unsourced | Phase::Sourced | Phase::Governed => {
                Step::Done(Err(state.violation("check_ready")))
            }
            Phase::Sourcing | Phase::InOperation => state.wait("check_ready", now, visit, fx),
            Phase::Ready => Step::Done(Ok(())),
            Phase::Coordinated => {
                state.phase = Phase::Ready;
                tracing::trace!(binding = %state.meta.binding(), "Container ready");
                if !state.meta.is_asynchronous() || state.listening {
                    return Step::Done(Ok(()));
                }
                state.listening = true;
                match &state.object {
                    Some(object) => Step::Proceed(Arc::clone(object)),
                    None => Step::Done(Err(state.violation("check_ready"))),
                }
            }
        });

        match step {
            Step::Done(result) => Poll::Ready(result),
            Step::Pending => Poll::Pending,
            Step::Proceed(object) => {
                if let Err(failure) = self.register_listener(object) {
                    return Poll::Ready(Err(failure));
                }
                // The object may have started an operation while registering.
                self.check_ready(visit)
            }
        }
    }

    fn register_listener(&self, object: Arc<dyn ManagedObject>) -> Result<()> {
        let listener = OperationListener::new(self.downgrade(), self.shared.meta.binding_arc());
        let outcome = match object.asynchronous() {
            Some(asynchronous) => asynchronous.register_listener(listener),
            None => Err("object does not expose AsynchronousObject".into()),
        };
        let Err(cause) = outcome else {
            return Ok(());
        };
        self.shared.locked(move |state, fx| {
            if state.phase.is_terminal() {
                return Err(state.replay("check_ready"));
            }
            let failure = Escalation::new(Error::OperationRegistration {
                binding: state.meta.binding().to_string(),
                object_type: state.meta.object_type().to_string(),
                source: cause,
            });
            state.fail(failure.clone(), fx);
            Err(failure)
        })
    }

    /// The managed object.
    ///
    /// Valid once coordinated; a failed container replays its failure.
    pub fn object(&self) -> Result<Arc<dyn ManagedObject>> {
        self.shared.locked(|state, _| {
            if state.phase.exposes_object()
                && let Some(object) = &state.object
            {
                return Ok(Arc::clone(object));
            }
            Err(state.replay("object"))
        })
    }

    /// The managed object as its concrete type.
    pub fn object_as<T: ManagedObject>(&self) -> Result<Arc<T>> {
        let object = self.object()?;
        downcast::<T>(object).ok_or_else(|| {
            Escalation::new(Error::TypeMismatch {
                binding: self.binding().to_string(),
                expected: type_name::<T>(),
            })
        })
    }

    /// Run every step of one visit: load, govern, coordinate, check ready,
    /// then fetch the object.
    pub fn poll_acquire(&self, visit: &Visit<'_>) -> Poll<Result<Arc<dyn ManagedObject>>> {
        self.load();
        ready!(self.govern(visit))?;
        ready!(self.coordinate(visit))?;
        ready!(self.check_ready(visit))?;
        Poll::Ready(self.object())
    }

    /// Drive one visit to completion.
    pub async fn acquire(&self) -> Result<Arc<dyn ManagedObject>> {
        let id = VisitId::new();
        poll_fn(|cx| self.poll_acquire(&Visit::from_context(id, cx))).await
    }

    /// Drive one visit to completion and downcast the object.
    pub async fn acquire_as<T: ManagedObject>(&self) -> Result<Arc<T>> {
        let object = self.acquire().await?;
        downcast::<T>(object).ok_or_else(|| {
            Escalation::new(Error::TypeMismatch {
                binding: self.binding().to_string(),
                expected: type_name::<T>(),
            })
        })
    }

    /// Fail the container if its outstanding phase has timed out.
    ///
    /// Idempotent; a terminal container never times out.
    pub fn check_timeout(&self) -> bool {
        self.check_timeout_at(self.shared.scope.now())
    }

    /// [`check_timeout`](Self::check_timeout) at an explicit time.
    pub fn check_timeout_at(&self, now: Duration) -> bool {
        self.shared.locked(|state, fx| state.expire(now, fx))
    }

    /// Release the container, disposing of its object exactly once.
    pub fn release(&self) -> Disposal {
        let released = self.shared.locked(|state, fx| {
            state.release().map(|(wakeups, work)| {
                fx.wake(wakeups);
                work
            })
        });
        let Some(work) = released else {
            tracing::trace!(binding = %self.binding(), "Container already released");
            return Disposal::AlreadyReleased;
        };

        let disposal = recycle::dispose(&work.meta, work.object, work.failure.as_ref());
        tracing::debug!(binding = %self.binding(), %disposal, "Container released");
        self.shared.scope.emit(ContainerEvent::new(
            self.binding(),
            self.shared.scope.kind(),
            ContainerEventKind::Released { disposal },
        ));
        disposal
    }
}

impl fmt::Debug for ManagedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedContainer")
            .field("id", &self.shared.id)
            .field("binding", &self.binding())
            .field("scope", &self.shared.scope.kind())
            .field("phase", &self.phase())
            .finish()
    }
}
