//! Oversight attachment
//!
//! Each sourced object carries the set of oversight rules active for it.
//! The rule set is computed by an [`OversightEvaluator`] once per caller
//! visit, never before the object exists.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Waker};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object::ManagedObject;

/// Identifies one caller's pass through a container.
///
/// A caller keeps the same id while it is re-polled after being woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisitId(Uuid);

impl VisitId {
    /// A fresh visit id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VisitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller's visit: who it is and how to wake it.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    id: VisitId,
    waker: &'a Waker,
}

impl<'a> Visit<'a> {
    /// Build a visit from an id and a waker.
    #[must_use]
    pub fn new(id: VisitId, waker: &'a Waker) -> Self {
        Self { id, waker }
    }

    /// Build a visit from a task context.
    #[must_use]
    pub fn from_context(id: VisitId, cx: &'a Context<'_>) -> Self {
        Self::new(id, cx.waker())
    }

    /// The visit id.
    #[must_use]
    pub fn id(&self) -> VisitId {
        self.id
    }

    /// The waker parked when the caller has to wait.
    #[must_use]
    pub fn waker(&self) -> &'a Waker {
        self.waker
    }
}

/// Name of an oversight rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleId(Arc<str>);

impl RuleId {
    /// Create a rule id.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The rule name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RuleId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides which oversight rules apply to a sourced object.
///
/// Called outside every container lock. May run once per visit, so it
/// should be cheap.
pub trait OversightEvaluator: Send + Sync {
    /// Rules active for `object` bound under `binding`.
    fn active_rules(&self, binding: &str, object: &dyn ManagedObject) -> BTreeSet<RuleId>;
}

impl<F> OversightEvaluator for F
where
    F: Fn(&str, &dyn ManagedObject) -> BTreeSet<RuleId> + Send + Sync,
{
    fn active_rules(&self, binding: &str, object: &dyn ManagedObject) -> BTreeSet<RuleId> {
        self(binding, object)
    }
}

/// Oversight state attached to a container's object.
///
/// Concurrent visits may interleave on one container, so every visit that
/// governed the current object is remembered until the object is replaced
/// or released.
#[derive(Debug, Default)]
pub struct OversightAttachment {
    rules: BTreeSet<RuleId>,
    governed: HashSet<VisitId>,
    evaluations: u64,
}

impl OversightAttachment {
    /// Whether `visit` already governed the object.
    pub fn governed_in(&self, visit: VisitId) -> bool {
        self.governed.contains(&visit)
    }

    /// Record the rules computed during `visit`.
    pub fn attach(&mut self, visit: VisitId, rules: BTreeSet<RuleId>) {
        self.rules = rules;
        self.evaluations += 1;
        self.governed.insert(visit);
    }

    /// Number of visits that governed the object.
    pub fn governed_visits(&self) -> usize {
        self.governed.len()
    }

    /// The active rules.
    pub fn rules(&self) -> &BTreeSet<RuleId> {
        &self.rules
    }

    /// How often rules have been attached.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Drop everything attached.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
