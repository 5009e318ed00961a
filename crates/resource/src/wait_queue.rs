//! Wait queues for callers blocked on a container
//!
//! A caller that cannot make progress parks its [`Waker`] in a [`WaitQueue`]
//! and yields. Releasing the queue hands every parked waker back as
//! [`Wakeups`], which the container wakes once its scope lock is dropped.
//! Each queue also tracks when its phase started, which is all the timeout
//! check needs.

use std::fmt;
use std::task::Waker;
use std::time::Duration;

use crate::error::Error;

/// What a queue is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    /// The source has not delivered the object yet.
    Sourcing,
    /// An asynchronous operation is outstanding.
    Operation,
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sourcing => f.write_str("sourcing"),
            Self::Operation => f.write_str("operation"),
        }
    }
}

/// Result of [`WaitQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The waker was parked.
    Queued,
    /// An equivalent waker was already parked.
    AlreadyQueued,
    /// The queue is closed and parks nothing.
    Closed,
}

/// Wakers taken out of a queue, to be woken after the lock is dropped.
#[derive(Default)]
#[must_use = "wakeups must be woken or callers stay parked"]
pub struct Wakeups(Vec<Waker>);

impl Wakeups {
    /// Number of wakers held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no waker is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take over the wakers of `other`.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Wake every held waker.
    pub fn wake(self) {
        for waker in self.0 {
            waker.wake();
        }
    }
}

impl fmt::Debug for Wakeups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Wakeups").field(&self.0.len()).finish()
    }
}

/// Queue of callers blocked on one concern of a container.
pub struct WaitQueue {
    concern: Concern,
    timeout: Option<Duration>,
    started_at: Option<Duration>,
    waiters: Vec<Waker>,
    closed: bool,
}

impl WaitQueue {
    /// Create an idle queue.
    pub fn new(concern: Concern, timeout: Option<Duration>) -> Self {
        Self {
            concern,
            timeout,
            started_at: None,
            waiters: Vec::new(),
            closed: false,
        }
    }

    /// The concern this queue waits on.
    pub fn concern(&self) -> Concern {
        self.concern
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Mark the start of the waited-on phase.
    pub fn start(&mut self, now: Duration) {
        self.started_at = Some(now);
    }

    /// Mark the end of the waited-on phase.
    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// Whether the waited-on phase is in progress.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Time spent in the current phase.
    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        self.started_at.map(|start| now.saturating_sub(start))
    }

    /// Whether the current phase has run past the timeout.
    ///
    /// A queue that is not started, has no timeout, or is closed never
    /// times out.
    pub fn check_timeout(&self, now: Duration) -> bool {
        if self.closed {
            return false;
        }
        match (self.timeout, self.elapsed(now)) {
            (Some(timeout), Some(elapsed)) => elapsed > timeout,
            _ => false,
        }
    }

    /// Park a caller.
    pub fn enqueue(&mut self, waker: &Waker) -> Enqueued {
        if self.closed {
            return Enqueued::Closed;
        }
        if self.waiters.iter().any(|parked| parked.will_wake(waker)) {
            return Enqueued::AlreadyQueued;
        }
        self.waiters.push(waker.clone());
        Enqueued::Queued
    }

    /// Number of parked callers.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether nobody is parked.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Take every parked caller. The queue stays usable.
    pub fn release_all(&mut self) -> Wakeups {
        self.started_at = None;
        Wakeups(std::mem::take(&mut self.waiters))
    }

    /// Take every parked caller and refuse any more.
    pub fn close(&mut self) -> Wakeups {
        self.closed = true;
        self.release_all()
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The failure a timeout of this queue escalates.
    pub fn timeout_error(&self, binding: &str, object_type: &str) -> Error {
        let timeout_ms = self
            .timeout
            .map_or(0, |timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        match self.concern {
            Concern::Sourcing => Error::SourcingTimeout {
                binding: binding.to_string(),
                object_type: object_type.to_string(),
                timeout_ms,
            },
            Concern::Operation => Error::OperationTimeout {
                binding: binding.to_string(),
                object_type: object_type.to_string(),
                timeout_ms,
            },
        }
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("concern", &self.concern)
            .field("timeout", &self.timeout)
            .field("started_at", &self.started_at)
            .field("waiters", &self.waiters.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    use super::*;
    use crate::error::FailureKind;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_waker() -> (Arc<CountingWaker>, Waker) {
        let inner = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&inner));
        (inner, waker)
    }

    #[test]
    fn same_waker_is_parked_once() {
        let (_, waker) = counting_waker();
        let mut queue = WaitQueue::new(Concern::Sourcing, None);
        assert_eq!(queue.enqueue(&waker), Enqueued::Queued);
        assert_eq!(queue.enqueue(&waker), Enqueued::AlreadyQueued);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn release_wakes_every_waiter() {
        let (a_count, a) = counting_waker();
        let (b_count, b) = counting_waker();
        let mut queue = WaitQueue::new(Concern::Operation, None);
        let _ = queue.enqueue(&a);
        let _ = queue.enqueue(&b);

        let wakeups = queue.release_all();
        assert_eq!(wakeups.len(), 2);
        assert!(queue.is_empty());
        wakeups.wake();

        assert_eq!(a_count.0.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_queue_refuses_waiters() {
        let (_, waker) = counting_waker();
        let mut queue = WaitQueue::new(Concern::Sourcing, None);
        queue.close().wake();
        assert_eq!(queue.enqueue(&waker), Enqueued::Closed);
        assert!(queue.is_closed());
    }

    #[test]
    fn timeout_requires_start_and_limit() {
        let mut queue = WaitQueue::new(Concern::Sourcing, Some(Duration::from_millis(10)));
        assert!(!queue.check_timeout(Duration::from_secs(60)));

        queue.start(Duration::from_millis(5));
        assert!(!queue.check_timeout(Duration::from_millis(15)));
        assert!(queue.check_timeout(Duration::from_millis(16)));

        queue.stop();
        assert!(!queue.check_timeout(Duration::from_secs(60)));

        let mut unlimited = WaitQueue::new(Concern::Operation, None);
        unlimited.start(Duration::ZERO);
        assert!(!unlimited.check_timeout(Duration::from_secs(3600)));
    }

    #[test]
    fn timeout_error_matches_concern() {
        let sourcing = WaitQueue::new(Concern::Sourcing, Some(Duration::from_millis(10)));
        let operation = WaitQueue::new(Concern::Operation, Some(Duration::from_millis(10)));

        let err = sourcing.timeout_error("db", "Connection");
        assert_eq!(err.kind(), FailureKind::SourcingTimeout);

        let err = operation.timeout_error("db", "Connection");
        assert_eq!(err.kind(), FailureKind::OperationTimeout);
        assert_eq!(err.object_type(), Some("Connection"));
    }
}
