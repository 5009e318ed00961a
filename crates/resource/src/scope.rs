//! Scopes: process, thread and function lifetimes
//!
//! Every container belongs to exactly one scope, and the scope owns the
//! container's mutable state. All containers of a scope share the scope's
//! single lock; no operation ever holds two scope locks at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::container::{ManagedContainer, State};
use crate::error::Error;
#[cfg(feature = "tokio")]
use crate::events::EventBus;
use crate::events::ContainerEvent;
use crate::metadata::ResourceMetaData;
use crate::monitor::TimeoutMonitor;
use crate::recycle::{self, Disposal};
use crate::registry::DependencyRegistry;

/// The lifetime a scope stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScopeKind {
    /// The whole process
    Process,
    /// One worker thread
    Thread,
    /// One function invocation
    Function,
}

impl ScopeKind {
    /// Whether a scope of this kind may have a child of kind `child`.
    #[must_use]
    pub fn can_parent(&self, child: ScopeKind) -> bool {
        matches!(
            (self, child),
            (Self::Process, Self::Thread | Self::Function) | (Self::Thread, Self::Function)
        )
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Thread => write!(f, "thread"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// Collaborators shared by a scope and inherited by its children.
#[derive(Clone)]
pub struct ScopeOptions {
    clock: Arc<dyn Clock>,
    monitor: Option<TimeoutMonitor>,
    #[cfg(feature = "tokio")]
    events: Option<Arc<EventBus>>,
}

impl ScopeOptions {
    /// Measure phases with `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register containers with finite timeouts on `monitor`.
    pub fn with_monitor(mut self, monitor: TimeoutMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Publish container events on `events`.
    #[cfg(feature = "tokio")]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            clock: SystemClock::shared(),
            monitor: None,
            #[cfg(feature = "tokio")]
            events: None,
        }
    }
}

impl fmt::Debug for ScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeOptions")
            .field("clock", &self.clock)
            .field("monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

/// Mutable state of every container in a scope.
pub(crate) struct ScopeState {
    pub(crate) containers: Vec<State>,
    ended: bool,
}

struct ScopeInner {
    id: Uuid,
    kind: ScopeKind,
    parent: Option<Scope>,
    options: ScopeOptions,
    state: Mutex<ScopeState>,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.ended {
            return;
        }
        // Nobody can be parked on a scope nothing refers to any more.
        for container in state.containers.iter_mut().rev() {
            if let Some((wakeups, work)) = container.release() {
                wakeups.wake();
                recycle::dispose(&work.meta, work.object, work.failure.as_ref());
            }
        }
    }
}

/// A process, thread or function scope.
///
/// Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// A new process scope with default options.
    #[must_use]
    pub fn process() -> Self {
        Self::process_with(ScopeOptions::default())
    }

    /// A new process scope.
    #[must_use]
    pub fn process_with(options: ScopeOptions) -> Self {
        Self::create(ScopeKind::Process, None, options)
    }

    fn create(kind: ScopeKind, parent: Option<Scope>, options: ScopeOptions) -> Self {
        let scope = Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                kind,
                parent,
                options,
                state: Mutex::new(ScopeState {
                    containers: Vec::new(),
                    ended: false,
                }),
            }),
        };
        tracing::trace!(scope = %kind, id = %scope.id(), "Scope entered");
        scope
    }

    /// A child scope inheriting this scope's options.
    pub fn child(&self, kind: ScopeKind) -> Result<Self, Error> {
        if !self.inner.kind.can_parent(kind) {
            return Err(Error::configuration(format!(
                "a {kind} scope cannot be nested in a {} scope",
                self.inner.kind
            )));
        }
        if self.is_ended() {
            return Err(Error::configuration(format!(
                "{} scope {} has ended",
                self.inner.kind,
                self.id()
            )));
        }
        Ok(Self::create(
            kind,
            Some(self.clone()),
            self.inner.options.clone(),
        ))
    }

    /// A child thread scope.
    pub fn thread(&self) -> Result<Self, Error> {
        self.child(ScopeKind::Thread)
    }

    /// A child function scope.
    pub fn function(&self) -> Result<Self, Error> {
        self.child(ScopeKind::Function)
    }

    /// Unique id of this scope.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The kind of this scope.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.inner.kind
    }

    /// The enclosing scope.
    #[must_use]
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Whether `other` is this scope or nested in it.
    #[must_use]
    pub fn contains(&self, other: &Scope) -> bool {
        let mut current = Some(other);
        while let Some(scope) = current {
            if Arc::ptr_eq(&self.inner, &scope.inner) {
                return true;
            }
            current = scope.parent();
        }
        false
    }

    /// The clock containers of this scope measure phases with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.options.clock
    }

    pub(crate) fn now(&self) -> Duration {
        self.inner.options.clock.now()
    }

    /// Number of containers created in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().containers.len()
    }

    /// Whether no container was created in this scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`end`](Self::end) has run.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Create a container for `meta` in this scope.
    ///
    /// `dependencies` must provide one container per declared dependency,
    /// each living in this scope or an enclosing one.
    pub fn container(
        &self,
        meta: Arc<ResourceMetaData>,
        dependencies: DependencyRegistry,
    ) -> Result<ManagedContainer, Error> {
        if dependencies.len() != meta.dependencies().len() {
            return Err(Error::configuration(format!(
                "binding '{}' declares {} dependencies but {} were bound",
                meta.binding(),
                meta.dependencies().len(),
                dependencies.len()
            )));
        }
        for (dep, container) in meta.dependencies().iter().zip(dependencies.iter()) {
            if !container.scope().contains(self) {
                return Err(Error::configuration(format!(
                    "dependency '{}' of '{}' lives in a {} scope that does not enclose this {} scope",
                    dep.name(),
                    meta.binding(),
                    container.scope().kind(),
                    self.kind()
                )));
            }
        }

        let slot = {
            let mut state = self.lock();
            if state.ended {
                return Err(Error::configuration(format!(
                    "cannot create '{}' in an ended {} scope",
                    meta.binding(),
                    self.kind()
                )));
            }
            state.containers.push(State::new(Arc::clone(&meta)));
            state.containers.len() - 1
        };

        let container = ManagedContainer::new(self.clone(), slot, Arc::clone(&meta), dependencies);
        if meta.timeout().is_some()
            && let Some(monitor) = &self.inner.options.monitor
        {
            monitor.watch(&container);
        }
        tracing::debug!(
            binding = %meta.binding(),
            scope = %self.kind(),
            slot,
            "Container created"
        );
        Ok(container)
    }

    /// Release every container of this scope, newest first.
    ///
    /// Containers already released report [`Disposal::AlreadyReleased`].
    pub fn end(&self) -> Vec<(String, Disposal)> {
        let (wakeups, work) = {
            let mut state = self.lock();
            state.ended = true;
            let mut wakeups = crate::wait_queue::Wakeups::default();
            let mut work = Vec::with_capacity(state.containers.len());
            for container in state.containers.iter_mut().rev() {
                let binding = container.meta.binding().to_string();
                match container.release() {
                    Some((woken, released)) => {
                        wakeups.extend(woken);
                        work.push((binding, Some(released)));
                    }
                    None => work.push((binding, None)),
                }
            }
            (wakeups, work)
        };
        wakeups.wake();

        let disposals: Vec<(String, Disposal)> = work
            .into_iter()
            .map(|(binding, released)| {
                let disposal = match released {
                    Some(released) => {
                        let disposal = recycle::dispose(
                            &released.meta,
                            released.object,
                            released.failure.as_ref(),
                        );
                        self.emit(ContainerEvent::new(
                            &binding,
                            self.kind(),
                            crate::events::ContainerEventKind::Released { disposal },
                        ));
                        disposal
                    }
                    None => Disposal::AlreadyReleased,
                };
                (binding, disposal)
            })
            .collect();

        tracing::debug!(
            scope = %self.kind(),
            id = %self.id(),
            containers = disposals.len(),
            "Scope ended"
        );
        disposals
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.inner.state.lock()
    }

    #[cfg_attr(not(feature = "tokio"), allow(clippy::unused_self))]
    pub(crate) fn emit(&self, event: ContainerEvent) {
        #[cfg(feature = "tokio")]
        if let Some(events) = &self.inner.options.events {
            events.emit(event);
        }
        #[cfg(not(feature = "tokio"))]
        drop(event);
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("parent", &self.inner.parent.as_ref().map(Scope::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_rules() {
        assert!(ScopeKind::Process.can_parent(ScopeKind::Thread));
        assert!(ScopeKind::Process.can_parent(ScopeKind::Function));
        assert!(ScopeKind::Thread.can_parent(ScopeKind::Function));
        assert!(!ScopeKind::Function.can_parent(ScopeKind::Function));
        assert!(!ScopeKind::Thread.can_parent(ScopeKind::Process));
    }

    #[test]
    fn child_scopes_follow_nesting_rules() {
        let process = Scope::process();
        let thread = process.thread().expect("thread in process");
        let function = thread.function().expect("function in thread");

        assert!(function.function().is_err());
        assert!(thread.thread().is_err());
        assert!(process.child(ScopeKind::Process).is_err());
        assert_eq!(function.parent(), Some(&thread));
    }

    #[test]
    fn contains_walks_the_parent_chain() {
        let process = Scope::process();
        let thread = process.thread().unwrap();
        let function = thread.function().unwrap();
        let sibling = process.thread().unwrap();

        assert!(process.contains(&function));
        assert!(thread.contains(&function));
        assert!(function.contains(&function));
        assert!(!function.contains(&thread));
        assert!(!sibling.contains(&function));
        assert!(!Scope::process().contains(&function));
    }

    #[test]
    fn ended_scope_refuses_children() {
        let process = Scope::process();
        assert!(process.end().is_empty());
        assert!(process.is_ended());
        assert!(process.thread().is_err());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ScopeKind::Process.to_string(), "process");
        assert_eq!(ScopeKind::Function.to_string(), "function");
    }
}
