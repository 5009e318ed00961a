//! Recycle/pool dispatch on release
//!
//! When a container is released its object is disposed of exactly once:
//! handed to the binding's recycle routine, returned to its pool, reported
//! lost, or dropped. The recycle routine receives a [`RecycleHandle`], an
//! RAII handle that discards the object unless [`RecycleHandle::reuse`] is
//! called.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Escalation;
use crate::metadata::ResourceMetaData;
use crate::object::{ManagedObject, downcast};

/// One-shot routine run when a binding's object is released.
pub trait RecycleRoutine: Send + Sync + 'static {
    /// Decide whether the object is reused. Dropping `handle` discards it.
    fn recycle(&self, handle: RecycleHandle);
}

impl<F> RecycleRoutine for F
where
    F: Fn(RecycleHandle) + Send + Sync + 'static,
{
    fn recycle(&self, handle: RecycleHandle) {
        self(handle);
    }
}

/// What release did with the container's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Disposal {
    /// Handed to the recycle routine.
    Recycled,
    /// Returned to the pool.
    Pooled,
    /// Reported lost to the pool.
    Lost,
    /// Dropped.
    Discarded,
    /// No object had been sourced.
    Empty,
    /// The container had already been released.
    AlreadyReleased,
}

impl fmt::Display for Disposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recycled => "recycled",
            Self::Pooled => "pooled",
            Self::Lost => "lost",
            Self::Discarded => "discarded",
            Self::Empty => "empty",
            Self::AlreadyReleased => "already released",
        };
        f.write_str(name)
    }
}

/// RAII handle given to a [`RecycleRoutine`].
///
/// [`reuse`](Self::reuse) offers the object for sourcing again: to the pool
/// when the binding is pooled, otherwise to the source. Dropping the handle
/// discards the object, reporting it lost to a pool.
pub struct RecycleHandle {
    object: Option<Arc<dyn ManagedObject>>,
    meta: Arc<ResourceMetaData>,
}

impl RecycleHandle {
    fn new(meta: Arc<ResourceMetaData>, object: Arc<dyn ManagedObject>) -> Self {
        Self {
            object: Some(object),
            meta,
        }
    }

    /// The binding the object was released from.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.meta.binding()
    }

    /// The released object.
    #[must_use]
    pub fn object(&self) -> Option<&Arc<dyn ManagedObject>> {
        self.object.as_ref()
    }

    /// The released object as its concrete type.
    #[must_use]
    pub fn object_as<T: ManagedObject>(&self) -> Option<Arc<T>> {
        self.object.clone().and_then(downcast::<T>)
    }

    /// Offer the object for sourcing again.
    pub fn reuse(mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        tracing::debug!(binding = %self.meta.binding(), "Released object offered for reuse");
        match self.meta.pool() {
            Some(pool) => pool.release(object),
            None => self.meta.source().reuse(object),
        }
    }

    /// Discard the object now.
    pub fn discard(mut self) {
        self.discard_inner();
    }

    fn discard_inner(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        tracing::debug!(binding = %self.meta.binding(), "Released object discarded");
        if let Some(pool) = self.meta.pool() {
            pool.lost(object, None);
        }
    }
}

impl Drop for RecycleHandle {
    fn drop(&mut self) {
        self.discard_inner();
    }
}

impl fmt::Debug for RecycleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecycleHandle")
            .field("binding", &self.meta.binding())
            .field("pending", &self.object.is_some())
            .finish()
    }
}

/// Dispose of a released container's object.
pub(crate) fn dispose(
    meta: &Arc<ResourceMetaData>,
    object: Option<Arc<dyn ManagedObject>>,
    failure: Option<&Escalation>,
) -> Disposal {
    let Some(object) = object else {
        return Disposal::Empty;
    };

    // A failed object is never recycled.
    if let Some(failure) = failure {
        return match meta.pool() {
            Some(pool) => {
                pool.lost(object, Some(failure.clone()));
                Disposal::Lost
            }
            None => Disposal::Discarded,
        };
    }

    if let Some(routine) = meta.recycle() {
        routine.recycle(RecycleHandle::new(Arc::clone(meta), object));
        return Disposal::Recycled;
    }

    match meta.pool() {
        Some(pool) => {
            pool.release(object);
            Disposal::Pooled
        }
        None => Disposal::Discarded,
    }
}

/// Dispose of an object delivered after its container stopped accepting one.
///
/// The object was never used, so a pool gets it back unless the container
/// failed.
pub(crate) fn discard_unused(
    meta: &ResourceMetaData,
    object: Arc<dyn ManagedObject>,
    failure: Option<Escalation>,
) -> Disposal {
    match (meta.pool(), failure) {
        (Some(pool), Some(failure)) => {
            pool.lost(object, Some(failure));
            Disposal::Lost
        }
        (Some(pool), None) => {
            pool.release(object);
            Disposal::Pooled
        }
        (None, _) => Disposal::Discarded,
    }
}
