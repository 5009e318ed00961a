//! Object sources and the sourcing callback handle

use std::fmt;
use std::sync::{Arc, Weak};

use crate::container::Shared;
use crate::error::BoxError;
use crate::metadata::ResourceMetaData;
use crate::object::ManagedObject;
use crate::recycle;

/// Produces managed objects for a binding.
///
/// Sourcing is callback based: the source receives a [`SourceHandle`] and
/// completes it now or later, from any thread.
pub trait ManagedObjectSource: Send + Sync + 'static {
    /// Start producing an object and complete `handle` with the outcome.
    fn source(&self, handle: SourceHandle);

    /// Take back an object a recycle routine decided to reuse.
    ///
    /// Only called for bindings without a pool. The default drops it.
    fn reuse(&self, object: Arc<dyn ManagedObject>) {
        drop(object);
    }
}

/// One-shot completion handle for a sourcing attempt.
///
/// Consumed by [`sourced`](Self::sourced), [`sourced_shared`](Self::sourced_shared)
/// or [`failed`](Self::failed). Dropping it without either reports the
/// attempt as failed.
pub struct SourceHandle {
    container: Weak<Shared>,
    meta: Arc<ResourceMetaData>,
    on_sourced: Option<OnSourced>,
    delivered: bool,
}

/// Runs with the object before it reaches the container.
pub(crate) type OnSourced = Box<dyn FnOnce(&Arc<dyn ManagedObject>) + Send + Sync>;

impl SourceHandle {
    pub(crate) fn new(container: Weak<Shared>, meta: Arc<ResourceMetaData>) -> Self {
        Self {
            container,
            meta,
            on_sourced: None,
            delivered: false,
        }
    }

    /// Observe the delivered object, e.g. to stamp its creation time.
    pub(crate) fn on_sourced(mut self, observer: OnSourced) -> Self {
        self.on_sourced = Some(observer);
        self
    }

    /// The binding being sourced.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.meta.binding()
    }

    /// The declared object type.
    #[must_use]
    pub fn object_type(&self) -> &str {
        self.meta.object_type()
    }

    /// Deliver a freshly built object.
    pub fn sourced<M: ManagedObject>(self, object: M) {
        self.sourced_shared(Arc::new(object));
    }

    /// Deliver a shared object.
    pub fn sourced_shared(mut self, object: Arc<dyn ManagedObject>) {
        self.delivered = true;
        if let Some(observer) = self.on_sourced.take() {
            observer(&object);
        }
        match self.container.upgrade() {
            Some(shared) => shared.deliver_object(object),
            None => {
                tracing::debug!(
                    binding = %self.meta.binding(),
                    "Object sourced for a dropped container"
                );
                recycle::discard_unused(&self.meta, object, None);
            }
        }
    }

    /// Report that no object can be provided.
    pub fn failed(mut self, cause: impl Into<BoxError>) {
        self.delivered = true;
        self.fail(cause.into());
    }

    fn fail(&self, cause: BoxError) {
        match self.container.upgrade() {
            Some(shared) => shared.deliver_failure(cause),
            None => tracing::debug!(
                binding = %self.meta.binding(),
                error = %cause,
                "Sourcing failure for a dropped container ignored"
            ),
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if !self.delivered {
            self.fail("source abandoned the sourcing handle".into());
        }
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("binding", &self.meta.binding())
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

/// A source backed by a factory closure that completes immediately.
pub struct FnSource<F> {
    factory: F,
}

impl<F> FnSource<F> {
    /// Wrap a factory.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> ManagedObjectSource for FnSource<F>
where
    F: Fn() -> Result<Arc<dyn ManagedObject>, BoxError> + Send + Sync + 'static,
{
    fn source(&self, handle: SourceHandle) {
        match (self.factory)() {
            Ok(object) => handle.sourced_shared(object),
            Err(cause) => handle.failed(cause),
        }
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}
