//! # Keeper Resource Containers
//!
//! Lifecycle management for pluggable, possibly asynchronous managed
//! objects used by short-lived units of work on a pool of worker threads.
//!
//! One [`ManagedContainer`] per binding per [`Scope`] sources the object,
//! attaches oversight, injects its dependencies, tracks its asynchronous
//! operations, times out stalled phases, and finally recycles, pools or
//! discards the object exactly once.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keeper_resource::{
//!     DependencyRegistry, ManagedObject, ManagedObjectSource, ResourceMetaData, Scope,
//!     SourceHandle,
//! };
//!
//! struct Connection;
//! impl ManagedObject for Connection {}
//!
//! struct Connector;
//! impl ManagedObjectSource for Connector {
//!     fn source(&self, handle: SourceHandle) {
//!         handle.sourced(Connection);
//!     }
//! }
//!
//! # async fn run() -> keeper_resource::Result<()> {
//! let meta = ResourceMetaData::builder("db", Arc::new(Connector))
//!     .object_type("Connection")
//!     .build()?;
//! let scope = Scope::process();
//! let db = scope.container(meta, DependencyRegistry::empty())?;
//! let connection = db.acquire_as::<Connection>().await?;
//! # drop(connection);
//! scope.end();
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod container;
pub mod error;
pub mod events;
pub mod metadata;
pub mod monitor;
pub mod object;
pub mod oversight;
pub mod phase;
pub mod pool;
pub mod recycle;
pub mod registry;
pub mod scope;
pub mod source;
pub mod wait_queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use container::{LoadOutcome, ManagedContainer};
pub use error::{BoxError, Error, Escalation, FailureKind, Result};
pub use events::{ContainerEvent, ContainerEventKind};
pub use metadata::{
    BindingConfig, Capabilities, DependencyConfig, DependencyMeta, DependencyValue,
    MetaDataBuilder, ResourceMetaData,
};
pub use monitor::{SweepConfig, SweepReport, TimeoutMonitor};
pub use object::{
    AsAny, AsynchronousObject, CoordinatingObject, ManagedObject, NameAware, OperationListener,
    downcast,
};
pub use oversight::{OversightEvaluator, RuleId, Visit, VisitId};
pub use phase::Phase;
pub use pool::{IdlePool, ManagedObjectPool, PoolConfig, PoolStats};
pub use recycle::{Disposal, RecycleHandle, RecycleRoutine};
pub use registry::{DependencyRegistry, ObjectRegistry};
pub use scope::{Scope, ScopeKind, ScopeOptions};
pub use source::{FnSource, ManagedObjectSource, SourceHandle};

#[cfg(feature = "tokio")]
pub use events::EventBus;
