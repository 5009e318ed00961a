//! Managed object contract
//!
//! A managed object is whatever a [`ManagedObjectSource`](crate::ManagedObjectSource)
//! delivers. Optional behaviour is exposed through explicit capability
//! accessors instead of runtime type inspection: a binding declares the
//! capabilities it needs in its [`ResourceMetaData`](crate::ResourceMetaData),
//! and the container asks the object for exactly those.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::container::Shared;
use crate::error::BoxError;
use crate::registry::ObjectRegistry;

/// Type-erasure helpers implemented for every `'static` type.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into a shared [`Any`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object whose lifecycle is governed by a container.
///
/// Every capability accessor defaults to `None`. Override the ones the
/// object supports and declare them on the binding's metadata.
pub trait ManagedObject: AsAny {
    /// Capability: wants to know the name it is bound under.
    fn name_aware(&self) -> Option<&dyn NameAware> {
        None
    }

    /// Capability: performs asynchronous operations.
    fn asynchronous(&self) -> Option<&dyn AsynchronousObject> {
        None
    }

    /// Capability: depends on other managed objects.
    fn coordinating(&self) -> Option<&dyn CoordinatingObject> {
        None
    }
}

/// Receives the binding name once the object is sourced.
pub trait NameAware: Send + Sync {
    /// Called before the object becomes visible to any caller.
    fn bind_name(&self, name: &str);
}

/// Reports the start and end of asynchronous operations.
pub trait AsynchronousObject: Send + Sync {
    /// Take the listener used to report operations.
    ///
    /// Returning an error fails the container with an operation-registration
    /// escalation.
    fn register_listener(&self, listener: OperationListener) -> Result<(), BoxError>;
}

/// Receives its dependencies before first use.
pub trait CoordinatingObject: Send + Sync {
    /// Pull dependency objects out of `registry`.
    ///
    /// Called at most once per sourced object. Dependencies are borrowed and
    /// must not be mutated.
    fn load_objects(&self, registry: &ObjectRegistry<'_>) -> Result<(), BoxError>;
}

/// Downcast a managed object to its concrete type.
pub fn downcast<T: ManagedObject>(object: Arc<dyn ManagedObject>) -> Option<Arc<T>> {
    object.into_any().downcast::<T>().ok()
}

/// Handle an asynchronous object uses to report its operations.
///
/// Safe to clone and to call from any thread. Calls after the container
/// failed or was released are logged and ignored.
#[derive(Clone)]
pub struct OperationListener {
    container: Weak<Shared>,
    binding: Arc<str>,
}

impl OperationListener {
    pub(crate) fn new(container: Weak<Shared>, binding: Arc<str>) -> Self {
        Self { container, binding }
    }

    /// The binding this listener reports for.
    #[must_use]
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// An asynchronous operation has started.
    pub fn started(&self) {
        match self.container.upgrade() {
            Some(shared) => shared.operation_started(),
            None => self.dropped("started"),
        }
    }

    /// The outstanding asynchronous operation has completed.
    pub fn completed(&self) {
        match self.container.upgrade() {
            Some(shared) => shared.operation_completed(),
            None => self.dropped("completed"),
        }
    }

    /// The outstanding asynchronous operation has failed.
    pub fn failed(&self, cause: impl Into<BoxError>) {
        match self.container.upgrade() {
            Some(shared) => shared.operation_failed(cause.into()),
            None => self.dropped("failed"),
        }
    }

    fn dropped(&self, callback: &'static str) {
        tracing::debug!(
            binding = %self.binding,
            callback,
            "Operation notification for a dropped container ignored"
        );
    }
}

impl fmt::Debug for OperationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationListener")
            .field("binding", &self.binding)
            .field("attached", &(self.container.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(u32);

    impl ManagedObject for Plain {}

    struct Named(parking_lot::Mutex<Option<String>>);

    impl ManagedObject for Named {
        fn name_aware(&self) -> Option<&dyn NameAware> {
            Some(self)
        }
    }

    impl NameAware for Named {
        fn bind_name(&self, name: &str) {
            *self.0.lock() = Some(name.to_string());
        }
    }

    #[test]
    fn downcast_recovers_concrete_type() {
        let object: Arc<dyn ManagedObject> = Arc::new(Plain(7));
        let plain = downcast::<Plain>(Arc::clone(&object)).expect("plain");
        assert_eq!(plain.0, 7);
        assert!(downcast::<Named>(object).is_none());
    }

    #[test]
    fn capabilities_default_to_none() {
        let object = Plain(1);
        assert!(object.name_aware().is_none());
        assert!(object.asynchronous().is_none());
        assert!(object.coordinating().is_none());
    }

    #[test]
    fn name_aware_capability_is_reachable() {
        let object = Named(parking_lot::Mutex::new(None));
        object.name_aware().expect("capability").bind_name("db");
        assert_eq!(object.0.lock().as_deref(), Some("db"));
    }

    #[test]
    fn listener_without_container_is_inert() {
        let listener = OperationListener::new(Weak::new(), Arc::from("gone"));
        listener.started();
        listener.completed();
        listener.failed("late");
        assert_eq!(listener.binding(), "gone");
    }
}
