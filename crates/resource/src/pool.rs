//! Object pools
//!
//! A pooled binding obtains objects through [`ManagedObjectPool::acquire`]
//! instead of its source, and hands them back through `release` or `lost`
//! when its container is released. [`IdlePool`] is a ready-made pool that
//! keeps a bounded set of idle objects and delegates misses to a source.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Escalation};
use crate::object::ManagedObject;
use crate::source::{ManagedObjectSource, SourceHandle};

/// Pool collaborator of a pooled binding.
pub trait ManagedObjectPool: Send + Sync + 'static {
    /// Complete `handle` with a pooled object, now or later.
    fn acquire(&self, handle: SourceHandle);

    /// Take back an object that is fit for reuse.
    fn release(&self, object: Arc<dyn ManagedObject>);

    /// Forget an object that must not be reused.
    ///
    /// `cause` is the container's failure when the object is lost because
    /// its container failed.
    fn lost(&self, object: Arc<dyn ManagedObject>, cause: Option<Escalation>);
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Configuration for [`IdlePool`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of idle objects kept
    pub max_idle: usize,
    /// Time after which idle objects are dropped
    pub idle_timeout: Duration,
    /// Maximum lifetime of an object
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 8,
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_idle == 0 {
            return Err(Error::configuration("max_idle must be greater than 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::configuration(
                "idle_timeout must be greater than zero",
            ));
        }
        if self.max_lifetime < self.idle_timeout {
            return Err(Error::configuration(format!(
                "max_lifetime ({:?}) must not be shorter than idle_timeout ({:?})",
                self.max_lifetime, self.idle_timeout
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

struct Entry {
    object: Arc<dyn ManagedObject>,
    created_at: Duration,
    last_used: Duration,
}

impl Entry {
    fn is_expired(&self, now: Duration, config: &PoolConfig) -> bool {
        now.saturating_sub(self.created_at) > config.max_lifetime
            || now.saturating_sub(self.last_used) > config.idle_timeout
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolStats {
    /// Total acquisitions served.
    pub total_acquisitions: u64,
    /// Acquisitions served from the idle set.
    pub reused: u64,
    /// Acquisitions delegated to the source.
    pub sourced: u64,
    /// Total releases back to the pool.
    pub total_releases: u64,
    /// Total objects reported lost.
    pub total_lost: u64,
    /// Current number of idle objects.
    pub idle: usize,
    /// Total objects dropped by the pool.
    pub destroyed: u64,
}

/// Creation time of an object currently handed out.
struct Born {
    object: Weak<dyn ManagedObject>,
    created_at: Duration,
}

impl Born {
    fn new(object: &Arc<dyn ManagedObject>, created_at: Duration) -> Self {
        Self {
            object: Arc::downgrade(object),
            created_at,
        }
    }

    /// Whether this stamp belongs to `object` and not to an earlier
    /// allocation at the same address.
    fn is(&self, object: &Arc<dyn ManagedObject>) -> bool {
        self.object
            .upgrade()
            .is_some_and(|born| Arc::ptr_eq(&born, object))
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Entry>,
    /// Objects handed out, sourced on a miss or taken from the idle set.
    born: HashMap<usize, Born>,
    stats: PoolStats,
}

fn key(object: &Arc<dyn ManagedObject>) -> usize {
    Arc::as_ptr(object).cast::<()>() as usize
}

// ---------------------------------------------------------------------------
// IdlePool
// ---------------------------------------------------------------------------

/// Pool keeping up to `max_idle` released objects for reuse.
///
/// Acquisitions are served from the most recently released idle object
/// that has not expired; otherwise they are delegated to the source.
pub struct IdlePool {
    source: Arc<dyn ManagedObjectSource>,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<PoolState>>,
}

impl IdlePool {
    /// Create a pool in front of `source`.
    ///
    /// # Errors
    /// Returns error if `config` is invalid (e.g. max_idle == 0).
    pub fn new(source: Arc<dyn ManagedObjectSource>, config: PoolConfig) -> Result<Self, Error> {
        Self::with_clock(source, config, SystemClock::shared())
    }

    /// Create a pool that measures expiry with `clock`.
    pub fn with_clock(
        source: Arc<dyn ManagedObjectSource>,
        config: PoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            clock,
            state: Arc::new(Mutex::new(PoolState::default())),
        })
    }

    /// Get a snapshot of pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.idle = state.idle.len();
        stats
    }

    /// Drop every idle object that has expired.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<Entry> = {
            let mut state = self.state.lock();
            let (keep, expired): (VecDeque<Entry>, VecDeque<Entry>) = state
                .idle
                .drain(..)
                .partition(|entry| !entry.is_expired(now, &self.config));
            state.idle = keep;
            state.born.retain(|_, born| born.object.strong_count() > 0);
            state.stats.destroyed += expired.len() as u64;
            expired.into_iter().collect()
        };
        let count = expired.len();
        if count > 0 {
            tracing::debug!(count, "Pruned expired idle objects");
        }
        count
    }

    /// Drop every idle object.
    pub fn clear(&self) {
        let drained: Vec<Entry> = {
            let mut state = self.state.lock();
            state.stats.destroyed += state.idle.len() as u64;
            state.idle.drain(..).collect()
        };
        drop(drained);
    }
}

impl ManagedObjectPool for IdlePool {
    fn acquire(&self, handle: SourceHandle) {
        let now = self.clock.now();
        let (reused, expired) = {
            let mut state = self.state.lock();
            state.stats.total_acquisitions += 1;
            let mut expired = Vec::new();
            let mut reused = None;
            while let Some(entry) = state.idle.pop_back() {
                if entry.is_expired(now, &self.config) {
                    state.stats.destroyed += 1;
                    expired.push(entry);
                } else {
                    reused = Some(entry);
                    break;
                }
            }
            match &reused {
                Some(entry) => {
                    state.stats.reused += 1;
                    let born = Born::new(&entry.object, entry.created_at);
                    state.born.insert(key(&entry.object), born);
                }
                None => state.stats.sourced += 1,
            }
            (reused, expired)
        };
        drop(expired);

        match reused {
            Some(entry) => {
                tracing::trace!(binding = %handle.binding(), "Acquired idle object");
                handle.sourced_shared(entry.object);
            }
            None => {
                tracing::trace!(binding = %handle.binding(), "No idle object, sourcing");
                let state = Arc::clone(&self.state);
                let clock = Arc::clone(&self.clock);
                let handle = handle.on_sourced(Box::new(move |object| {
                    let born = Born::new(object, clock.now());
                    state.lock().born.insert(key(object), born);
                }));
                self.source.source(handle);
            }
        }
    }

    fn release(&self, object: Arc<dyn ManagedObject>) {
        let now = self.clock.now();
        let overflow = {
            let mut state = self.state.lock();
            state.stats.total_releases += 1;
            let created_at = state
                .born
                .remove(&key(&object))
                .filter(|born| born.is(&object))
                .map_or(now, |born| born.created_at);
            let entry = Entry {
                object,
                created_at,
                last_used: now,
            };
            if entry.is_expired(now, &self.config) || state.idle.len() >= self.config.max_idle {
                state.stats.destroyed += 1;
                Some(entry)
            } else {
                state.idle.push_back(entry);
                None
            }
        };
        drop(overflow);
    }

    fn lost(&self, object: Arc<dyn ManagedObject>, cause: Option<Escalation>) {
        {
            let mut state = self.state.lock();
            state.born.remove(&key(&object));
            state.stats.total_lost += 1;
            state.stats.destroyed += 1;
        }
        match cause {
            Some(cause) => tracing::debug!(error = %cause, "Pooled object lost to a failure"),
            None => tracing::trace!("Pooled object discarded"),
        }
    }
}

impl fmt::Debug for IdlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdlePool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
