// Container lifecycle walkthrough.
//
// A repository depends on a connection whose source answers after a delay
// on another thread. Each simulated worker opens a function scope, acquires
// the repository, and ends the scope, which returns the connection to an
// idle pool for the next worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use keeper_resource::{
    BoxError, CoordinatingObject, DependencyMeta, DependencyRegistry, IdlePool, ManagedObject,
    ManagedObjectSource, ObjectRegistry, PoolConfig, ResourceMetaData, Scope, ScopeOptions,
    SourceHandle, SweepConfig, TimeoutMonitor,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

// -- Connection -------------------------------------------------------------

struct Connection {
    id: u32,
}

impl ManagedObject for Connection {}

/// Opens connections on a background thread.
struct Connector {
    next: AtomicU32,
}

impl ManagedObjectSource for Connector {
    fn source(&self, handle: SourceHandle) {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tracing::info!(id, "connection opened");
            handle.sourced(Connection { id });
        });
    }
}

// -- Repository -------------------------------------------------------------

#[derive(Default)]
struct Repository {
    connection: Mutex<Option<Arc<Connection>>>,
}

impl ManagedObject for Repository {
    fn coordinating(&self) -> Option<&dyn CoordinatingObject> {
        Some(self)
    }
}

impl CoordinatingObject for Repository {
    fn load_objects(&self, registry: &ObjectRegistry<'_>) -> Result<(), BoxError> {
        *self.connection.lock() = Some(registry.named::<Connection>("db")?);
        Ok(())
    }
}

struct RepositorySource;

impl ManagedObjectSource for RepositorySource {
    fn source(&self, handle: SourceHandle) {
        handle.sourced(Repository::default());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    keeper_log::init()?;

    let monitor = TimeoutMonitor::new();
    let cancel = CancellationToken::new();
    let sweeper = monitor.spawn(SweepConfig::default(), cancel.clone())?;
    let process = Scope::process_with(ScopeOptions::default().with_monitor(monitor));

    let connector: Arc<dyn ManagedObjectSource> = Arc::new(Connector {
        next: AtomicU32::new(1),
    });
    let pool = Arc::new(IdlePool::new(Arc::clone(&connector), PoolConfig::default())?);
    let db = ResourceMetaData::builder("db", connector)
        .object_type("Connection")
        .timeout(Duration::from_secs(1))
        .pool(pool.clone())
        .build()?;
    let repo = ResourceMetaData::builder("repo", Arc::new(RepositorySource))
        .object_type("Repository")
        .coordinating()
        .dependency(DependencyMeta::new("db", "Connection"))
        .build()?;

    for worker in 0..3 {
        let scope = process.function()?;
        let connection = scope.container(Arc::clone(&db), DependencyRegistry::empty())?;
        let repository = scope.container(
            Arc::clone(&repo),
            DependencyRegistry::ordered([connection]),
        )?;

        let repository = repository.acquire_as::<Repository>().await?;
        let id = repository.connection.lock().as_ref().map(|c| c.id);
        tracing::info!(worker, connection = ?id, "repository ready");

        for (binding, disposal) in scope.end() {
            tracing::info!(worker, binding = %binding, %disposal, "released");
        }
    }

    tracing::info!(stats = ?pool.stats(), "pool after run");
    cancel.cancel();
    sweeper.await?;
    Ok(())
}
