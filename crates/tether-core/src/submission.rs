#![forbid(unsafe_code)]

//! Proposed value changes and the bookkeeping around applying them.
//!
//! A [`Submission`] is built from hooks, but the manager works on nexuses:
//! each target is resolved to the nexus it belongs to when the submission is
//! handed to [`NexusManager::submit`](crate::manager::NexusManager::submit),
//! not when the entry is inserted. Two entries that land on the same nexus
//! must carry equal values, otherwise the submission fails with a conflict.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;

use crate::hook::{AnyHook, Hook, HookNode};
use crate::ids::{HookId, NexusId, OwnerId};
use crate::nexus::Nexus;
use crate::value::{AnyValue, HookValue};

#[derive(Clone)]
enum Target {
    Hook(Rc<HookNode>),
    Nexus(Rc<Nexus>),
}

impl Target {
    fn nexus(&self) -> Rc<Nexus> {
        match self {
            Self::Hook(node) => node.nexus(),
            Self::Nexus(nexus) => Rc::clone(nexus),
        }
    }
}

/// An ordered list of proposed `{hook -> value}` changes.
#[derive(Clone, Default)]
pub struct Submission {
    items: Vec<(Target, AnyValue)>,
}

impl Submission {
    /// Empty submission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose a value for a typed hook.
    pub fn insert<T: HookValue>(&mut self, hook: &Hook<T>, value: T) -> &mut Self {
        self.items
            .push((Target::Hook(Rc::clone(hook.node())), AnyValue::new(value)));
        self
    }

    /// Propose an erased value for an erased hook. The value type is checked
    /// against the hook's nexus at submit time.
    pub fn insert_any(&mut self, hook: &AnyHook, value: AnyValue) -> &mut Self {
        self.items.push((Target::Hook(Rc::clone(hook.node())), value));
        self
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: HookValue>(mut self, hook: &Hook<T>, value: T) -> Self {
        self.insert(hook, value);
        self
    }

    pub(crate) fn insert_nexus(&mut self, nexus: &Rc<Nexus>, value: AnyValue) -> &mut Self {
        self.items.push((Target::Nexus(Rc::clone(nexus)), value));
        self
    }

    /// Number of proposed entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is proposed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a proposed entry targets this hook's current nexus.
    #[must_use]
    pub fn contains(&self, hook: &AnyHook) -> bool {
        self.value_for(hook).is_some()
    }

    /// The first value proposed for this hook's current nexus.
    #[must_use]
    pub fn value_for(&self, hook: &AnyHook) -> Option<AnyValue> {
        let nexus = hook.nexus();
        self.items
            .iter()
            .find(|(target, _)| target.nexus().id() == nexus.id())
            .map(|(_, value)| value.clone())
    }

    /// Resolve every entry to the nexus it targets right now.
    pub(crate) fn resolve(&self) -> Vec<(Rc<Nexus>, AnyValue)> {
        self.items
            .iter()
            .map(|(target, value)| (target.nexus(), value.clone()))
            .collect()
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (target, value) in &self.items {
            list.entry(&(target.nexus().id(), value));
        }
        list.finish()
    }
}

/// One resolved `{nexus -> value}` entry.
#[derive(Clone)]
pub(crate) struct SubmissionEntry {
    pub(crate) nexus: Rc<Nexus>,
    pub(crate) value: AnyValue,
}

/// Resolved entries keyed by nexus, in nexus creation order.
pub(crate) type EntryMap = BTreeMap<NexusId, SubmissionEntry>;

/// A listener target that can be left out of the notify phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyTarget {
    Hook(HookId),
    Owner(OwnerId),
}

/// Per-call knobs for [`NexusManager::submit`](crate::manager::NexusManager::submit).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    check_only: bool,
    suppress: AHashSet<NotifyTarget>,
}

impl SubmitOptions {
    /// Commit and notify everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after validation.
    #[must_use]
    pub fn check_only(mut self) -> Self {
        self.check_only = true;
        self
    }

    /// Skip this hook's listeners in the notify phase.
    #[must_use]
    pub fn suppress_hook(self, hook: HookId) -> Self {
        self.suppress(NotifyTarget::Hook(hook))
    }

    /// Skip this owner's listeners in the notify phase.
    #[must_use]
    pub fn suppress_owner(self, owner: OwnerId) -> Self {
        self.suppress(NotifyTarget::Owner(owner))
    }

    #[must_use]
    pub fn suppress(mut self, target: NotifyTarget) -> Self {
        self.suppress.insert(target);
        self
    }

    #[must_use]
    pub fn is_check_only(&self) -> bool {
        self.check_only
    }

    #[must_use]
    pub fn is_suppressed(&self, target: NotifyTarget) -> bool {
        self.suppress.contains(&target)
    }
}

/// What a successful submission did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Completion passes, including the pass that found nothing new.
    pub passes: usize,
    /// Entries added by owner completion.
    pub derived: usize,
    /// Nexuses whose value changed.
    pub committed: usize,
    /// Owners whose `invalidate` ran.
    pub invalidated: usize,
    /// Hook reactions that ran.
    pub reacted: usize,
    /// Listener callbacks invoked.
    pub notified: usize,
}

impl SubmitReport {
    /// Whether nothing was committed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.committed == 0
    }
}

/// The result of running completion alone.
#[derive(Clone)]
pub struct Completion {
    pub(crate) entries: EntryMap,
    pub(crate) passes: usize,
    pub(crate) added: usize,
}

impl Completion {
    /// Passes taken, including the final confirming pass.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Entries derived by owners.
    #[must_use]
    pub fn added(&self) -> usize {
        self.added
    }

    /// Number of distinct nexuses in the completed map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the nexuses in the completed map.
    #[must_use]
    pub fn nexus_ids(&self) -> Vec<NexusId> {
        self.entries.keys().copied().collect()
    }

    /// Completed value for this hook's nexus, if it is part of the map.
    #[must_use]
    pub fn value_for(&self, hook: &AnyHook) -> Option<AnyValue> {
        self.entries
            .get(&hook.nexus().id())
            .map(|entry| entry.value.clone())
    }

    /// Typed form of [`value_for`](Self::value_for).
    #[must_use]
    pub fn value_of<T: HookValue>(&self, hook: &Hook<T>) -> Option<T> {
        self.entries
            .get(&hook.nexus().id())
            .and_then(|entry| entry.value.cloned::<T>())
    }

    /// Turn the completed map back into a submission.
    #[must_use]
    pub fn into_submission(self) -> Submission {
        let mut submission = Submission::new();
        for entry in self.entries.into_values() {
            submission.insert_nexus(&entry.nexus, entry.value);
        }
        submission
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("passes", &self.passes)
            .field("added", &self.added)
            .field("nexuses", &self.nexus_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::SyncMode;
    use crate::manager::NexusManager;

    #[test]
    fn targets_resolve_at_submit_time() {
        let m = NexusManager::default();
        let a = Hook::new_in(&m, 1_i32);
        let b = Hook::new_in(&m, 2_i32);
        let submission = Submission::new().with(&a, 5);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();

        let resolved = submission.resolve();
        assert_eq!(resolved.len(), 1);
        assert!(Rc::ptr_eq(&resolved[0].0, &b.nexus()));
        assert!(submission.contains(&b.erase()));
    }

    #[test]
    fn value_for_finds_first_entry() {
        let m = NexusManager::default();
        let a = Hook::new_in(&m, 1_i32);
        let other = Hook::new_in(&m, 1_i32);
        let mut submission = Submission::new();
        submission.insert(&a, 3).insert(&a, 4);
        assert_eq!(submission.len(), 2);
        assert_eq!(
            submission.value_for(&a.erase()).and_then(|v| v.cloned::<i32>()),
            Some(3)
        );
        assert!(!submission.contains(&other.erase()));
    }

    #[test]
    fn options_track_suppression() {
        let m = NexusManager::default();
        let h = Hook::new_in(&m, 0_u8);
        let options = SubmitOptions::new().check_only().suppress_hook(h.id());
        assert!(options.is_check_only());
        assert!(options.is_suppressed(NotifyTarget::Hook(h.id())));
        assert!(!SubmitOptions::default().is_suppressed(NotifyTarget::Hook(h.id())));
    }

    #[test]
    fn default_report_is_noop() {
        assert!(SubmitReport::default().is_noop());
        let report = SubmitReport {
            committed: 1,
            ..SubmitReport::default()
        };
        assert!(!report.is_noop());
    }
}
