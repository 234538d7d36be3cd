#![forbid(unsafe_code)]

//! The nexus manager: the only component that changes nexus values.
//!
//! Every submission runs the same six phases, in order:
//!
//! 1. **Completion**: owners touched by the proposed entries derive
//!    additional entries until a pass adds nothing.
//! 2. **Validation**: each touched owner validates its full view with the
//!    submitted values overlaid; each member hook's isolation validator
//!    checks its candidate value.
//! 3. **Commit**: each nexus shifts `previous := value, value := new`.
//! 4. **Invalidation**: touched owners' `invalidate` runs once each.
//! 5. **Reaction**: each member hook's reaction runs with the new value.
//! 6. **Notification**: owner listeners run once per owner; listeners of
//!    hooks without a live owner run once per hook.
//!
//! # Invariants
//!
//! 1. Phases 1 and 2 have no side effects on nexus state. Any error they
//!    return leaves every value and previous value untouched.
//! 2. Phase 3 is a plain multi-location assignment with no callbacks in
//!    between, so no observer sees a half-committed state.
//! 3. Owners and nexuses are visited in creation order, so a submission is
//!    deterministic for a given graph.
//! 4. Connecting merges nexuses after phase 3 and before phase 4, so no
//!    callback observes the synchronized but still separate nexuses.
//! 5. A reaction only runs with a value its hook still holds; a nested
//!    submission that replaced it has already run its own reactions.
//!
//! # Failure Modes
//!
//! | Failure | Phase | Result |
//! |---------|-------|--------|
//! | Two values for one nexus | 1 | `SubmitError::Conflict` |
//! | Owner completion fails | 1 | `SubmitError::Rejected` |
//! | Pass cap reached | 1 | `SubmitError::NotConverged` |
//! | Validator refuses | 2 | `SubmitError::Rejected` |
//! | Submit from a completion or validation callback | any | `SubmitError::Reentrant` |
//!
//! Submissions started from invalidation, reaction or listener callbacks run
//! as complete nested submissions.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::rc::Rc;

use crate::config::ManagerConfig;
use crate::equality::{self, EqualityRegistry};
use crate::error::{HookError, Rejector, SubmitError};
use crate::hook::{AnyHook, HookNode, check_compatible};
use crate::ids::{ManagerId, NexusId, OwnerId};
use crate::nexus::Nexus;
use crate::owner::OwnerCore;
use crate::submission::{
    Completion, EntryMap, NotifyTarget, SubmissionEntry, SubmitOptions, SubmitReport, Submission,
};
use crate::value::AnyValue;

thread_local! {
    static GLOBAL_MANAGER: NexusManager = NexusManager::new(ManagerConfig::from_env());
}

/// The phase a manager is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitPhase {
    Completion,
    Validation,
    Commit,
    Invalidation,
    Reaction,
    Notification,
}

impl SubmitPhase {
    /// Whether callbacks running in this phase may start a new submission.
    #[must_use]
    pub const fn allows_nested_submission(self) -> bool {
        matches!(
            self,
            Self::Invalidation | Self::Reaction | Self::Notification
        )
    }
}

impl fmt::Display for SubmitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completion => "completion",
            Self::Validation => "validation",
            Self::Commit => "commit",
            Self::Invalidation => "invalidation",
            Self::Reaction => "reaction",
            Self::Notification => "notification",
        })
    }
}

/// Marks the manager as busy for the lifetime of one submission and restores
/// the outer phase on drop, including on early return.
struct PhaseGuard<'a> {
    slot: &'a Cell<Option<SubmitPhase>>,
    outer: Option<SubmitPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(slot: &'a Cell<Option<SubmitPhase>>, phase: SubmitPhase) -> Result<Self, SubmitError> {
        let outer = slot.get();
        if let Some(current) = outer
            && !current.allows_nested_submission()
        {
            return Err(SubmitError::Reentrant { phase: current });
        }
        slot.set(Some(phase));
        Ok(Self { slot, outer })
    }

    fn advance(&self, phase: SubmitPhase) {
        self.slot.set(Some(phase));
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.slot.set(self.outer);
    }
}

struct ManagerInner {
    id: ManagerId,
    config: ManagerConfig,
    equality: RefCell<EqualityRegistry>,
    phase: Cell<Option<SubmitPhase>>,
}

/// Runs submissions for every hook, nexus and owner registered with it.
///
/// Cloning shares the same manager.
#[derive(Clone)]
pub struct NexusManager {
    inner: Rc<ManagerInner>,
}

impl Default for NexusManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl NexusManager {
    /// Create a manager with the default equality registry.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_equality(config, EqualityRegistry::new())
    }

    /// Create a manager with an explicit equality registry.
    #[must_use]
    pub fn with_equality(config: ManagerConfig, equality: EqualityRegistry) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                id: ManagerId::fresh(),
                config,
                equality: RefCell::new(equality),
                phase: Cell::new(None),
            }),
        }
    }

    /// This thread's default manager, configured from the environment on
    /// first use. Intended for top-level call sites.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_MANAGER.with(Clone::clone)
    }

    #[must_use]
    pub fn id(&self) -> ManagerId {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same manager.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register (or replace) the equality predicate for `T`.
    pub fn register_equality<T: 'static>(&self, eq: impl Fn(&T, &T) -> bool + 'static) {
        self.inner.equality.borrow_mut().register::<T>(eq);
    }

    /// Compare two values with this manager's registry.
    #[must_use]
    pub fn values_equal(&self, a: &AnyValue, b: &AnyValue) -> bool {
        let predicate = self.inner.equality.borrow().predicate(a.type_id());
        equality::compare_with(predicate, a, b)
    }

    /// The phase of the submission in flight, if any.
    #[must_use]
    pub fn phase(&self) -> Option<SubmitPhase> {
        self.inner.phase.get()
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.phase().is_some()
    }

    /// Run completion alone and return the completed map.
    pub fn complete(&self, submission: &Submission) -> Result<Completion, SubmitError> {
        let _guard = PhaseGuard::enter(&self.inner.phase, SubmitPhase::Completion)?;
        let mut entries = self.collect_entries(submission)?;
        let (passes, added) = self.run_completion(&mut entries)?;
        Ok(Completion {
            entries,
            passes,
            added,
        })
    }

    /// Complete, validate, commit, invalidate, react and notify.
    pub fn submit(
        &self,
        submission: Submission,
        options: &SubmitOptions,
    ) -> Result<SubmitReport, SubmitError> {
        let span = tracing::debug_span!(
            "nexus_submit",
            manager = %self.id(),
            entries = submission.len(),
            check_only = options.is_check_only()
        );
        let _entered = span.enter();

        let result = PhaseGuard::enter(&self.inner.phase, SubmitPhase::Completion)
            .and_then(|guard| {
                let applied = self.apply(&guard, &submission, options)?;
                Ok(self.fan_out(&guard, applied, options))
            });
        log_outcome(result.as_ref());
        result
    }

    /// Submit, then run `regroup` after the commit and before any
    /// invalidation, reaction or listener callback. Connecting uses this so
    /// callbacks only ever observe the merged nexus.
    pub(crate) fn submit_then<R>(
        &self,
        submission: Submission,
        regroup: impl FnOnce() -> R,
    ) -> Result<(SubmitReport, R), SubmitError> {
        let span = tracing::debug_span!(
            "nexus_submit",
            manager = %self.id(),
            entries = submission.len(),
            regroup = true
        );
        let _entered = span.enter();

        let options = SubmitOptions::default();
        let result = PhaseGuard::enter(&self.inner.phase, SubmitPhase::Completion)
            .and_then(|guard| {
                let applied = self.apply(&guard, &submission, &options)?;
                let regrouped = regroup();
                Ok((self.fan_out(&guard, applied, &options), regrouped))
            });
        log_outcome(result.as_ref().map(|(report, _)| report));
        result
    }

    /// Complete and validate without committing anything.
    pub fn check(&self, submission: Submission) -> Result<SubmitReport, SubmitError> {
        self.submit(submission, &SubmitOptions::new().check_only())
    }

    /// Connect many `(source, target)` pairs at once.
    ///
    /// The resulting values equal connecting the pairs one by one with
    /// [`SyncMode::UseCallerValue`](crate::hook::SyncMode), but all value
    /// changes go through one atomic submission and the nexuses are merged
    /// only after it succeeds. Returns the number of merges performed;
    /// pairs that already share a nexus are skipped.
    pub fn connect_pairs(&self, pairs: &[(AnyHook, AnyHook)]) -> Result<usize, HookError> {
        for (source, target) in pairs {
            if Rc::ptr_eq(source.node(), target.node()) {
                return Err(HookError::SelfConnection);
            }
            for hook in [source, target] {
                if hook.manager().id() != self.id() {
                    return Err(HookError::ManagerMismatch {
                        left: self.id(),
                        right: hook.manager().id(),
                    });
                }
            }
            check_compatible(source.node(), target.node())?;
        }

        let mut plan = SyncPlan::default();
        for (source, target) in pairs {
            plan.link(source.nexus(), target.nexus());
        }
        let (_, merged) = self.submit_then(plan.into_submission(), || {
            let mut merged = 0;
            for (source, target) in pairs {
                let (source_nexus, target_nexus) = (source.nexus(), target.nexus());
                if !Rc::ptr_eq(&source_nexus, &target_nexus) {
                    Nexus::merge(&[source_nexus, target_nexus]);
                    merged += 1;
                }
            }
            merged
        })?;
        Ok(merged)
    }

    /// Phases 1-3: complete, validate and commit.
    fn apply(
        &self,
        guard: &PhaseGuard<'_>,
        submission: &Submission,
        options: &SubmitOptions,
    ) -> Result<Applied, SubmitError> {
        let mut entries = self.collect_entries(submission)?;
        let (passes, derived) = self.run_completion(&mut entries)?;
        let mut applied = Applied {
            report: SubmitReport {
                passes,
                derived,
                ..SubmitReport::default()
            },
            owners: BTreeMap::new(),
            members: Vec::new(),
        };

        guard.advance(SubmitPhase::Validation);
        self.run_validation(&entries)?;
        if options.is_check_only() {
            return Ok(applied);
        }

        if self.inner.config.skip_unchanged {
            entries.retain(|_, entry| !self.values_equal(&entry.nexus.value(), &entry.value));
        }
        if entries.is_empty() {
            return Ok(applied);
        }

        guard.advance(SubmitPhase::Commit);
        for entry in entries.values() {
            entry.nexus.commit(entry.value.clone());
        }
        applied.report.committed = entries.len();

        // Snapshot before any callback can regroup hooks.
        applied.owners = touched_owners(&entries);
        applied.members = entries
            .values()
            .map(|entry| (entry.value.clone(), entry.nexus.live_members()))
            .collect();
        Ok(applied)
    }

    /// Phases 4-6: invalidate, react and notify.
    fn fan_out(
        &self,
        guard: &PhaseGuard<'_>,
        applied: Applied,
        options: &SubmitOptions,
    ) -> SubmitReport {
        let Applied {
            mut report,
            owners,
            members,
        } = applied;
        if report.committed == 0 {
            return report;
        }

        guard.advance(SubmitPhase::Invalidation);
        for owner in owners.values() {
            owner.behavior().invalidate();
        }
        report.invalidated = owners.len();

        guard.advance(SubmitPhase::Reaction);
        for (value, nodes) in &members {
            for node in nodes {
                let Some(react) = node.reaction() else {
                    continue;
                };
                // A nested submission may have replaced the value already;
                // it ran its own reactions.
                if !self.values_equal(&node.nexus().value(), value) {
                    continue;
                }
                react(value);
                report.reacted += 1;
            }
        }

        guard.advance(SubmitPhase::Notification);
        for (id, owner) in &owners {
            if !options.is_suppressed(NotifyTarget::Owner(*id)) {
                report.notified += owner.listeners().notify();
            }
        }
        for node in members.iter().flat_map(|(_, nodes)| nodes) {
            if node.owner().is_some() || options.is_suppressed(NotifyTarget::Hook(node.id())) {
                continue;
            }
            report.notified += node.listeners().notify();
        }

        report
    }

    fn collect_entries(&self, submission: &Submission) -> Result<EntryMap, SubmitError> {
        let mut entries = EntryMap::new();
        for (nexus, value) in submission.resolve() {
            self.insert_entry(&mut entries, nexus, value)?;
        }
        Ok(entries)
    }

    /// Insert an entry. Returns whether it was new.
    fn insert_entry(
        &self,
        entries: &mut EntryMap,
        nexus: Rc<Nexus>,
        value: AnyValue,
    ) -> Result<bool, SubmitError> {
        self.check_target(&nexus, &value)?;
        match entries.entry(nexus.id()) {
            Entry::Occupied(existing) => {
                let existing = &existing.get().value;
                if self.values_equal(existing, &value) {
                    Ok(false)
                } else {
                    tracing::debug!(nexus = %nexus.id(), ?existing, proposed = ?value, "conflicting entries");
                    Err(SubmitError::Conflict {
                        nexus: nexus.id(),
                        existing: format!("{existing:?}"),
                        proposed: format!("{value:?}"),
                    })
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(SubmissionEntry { nexus, value });
                Ok(true)
            }
        }
    }

    fn check_target(&self, nexus: &Nexus, value: &AnyValue) -> Result<(), SubmitError> {
        if nexus.manager_id() != self.id() {
            return Err(SubmitError::ForeignManager {
                nexus: nexus.id(),
                nexus_manager: nexus.manager_id(),
                manager: self.id(),
            });
        }
        let current = nexus.value();
        if current.type_id() != value.type_id() {
            return Err(SubmitError::TypeMismatch {
                nexus: nexus.id(),
                expected: current.type_name(),
                actual: value.type_name(),
            });
        }
        Ok(())
    }

    /// Returns `(passes, entries added)`.
    fn run_completion(&self, entries: &mut EntryMap) -> Result<(usize, usize), SubmitError> {
        let limit = self.inner.config.completion_limit;
        let mut passes = 0;
        let mut derived = 0;
        loop {
            if limit.is_some_and(|limit| passes >= limit) {
                tracing::debug!(passes, derived, "completion did not converge");
                return Err(SubmitError::NotConverged { passes });
            }
            passes += 1;

            let mut added = 0;
            for owner in touched_owners(entries).values() {
                let submitted = owner.submitted_values(entries);
                let current = owner.current_values();
                let extra = owner
                    .behavior()
                    .complete(&submitted, &current)
                    .map_err(|reason| SubmitError::Rejected {
                        by: Rejector::Owner(owner.id()),
                        reason,
                    })?;
                for (key, value) in extra {
                    let Some(node) = owner.node(&key) else {
                        return Err(SubmitError::UnknownKey {
                            owner: owner.id(),
                            key,
                        });
                    };
                    if self.insert_entry(entries, node.nexus(), value)? {
                        added += 1;
                    }
                }
            }

            tracing::trace!(pass = passes, added, total = entries.len(), "completion pass");
            derived += added;
            if added == 0 {
                return Ok((passes, derived));
            }
        }
    }

    fn run_validation(&self, entries: &EntryMap) -> Result<(), SubmitError> {
        for owner in touched_owners(entries).values() {
            let mut view = owner.current_values();
            view.extend(owner.submitted_values(entries));
            if let Err(reason) = owner.behavior().validate(&view) {
                tracing::debug!(owner = %owner.id(), %reason, "owner rejected submission");
                return Err(SubmitError::Rejected {
                    by: Rejector::Owner(owner.id()),
                    reason,
                });
            }
        }
        for entry in entries.values() {
            for node in entry.nexus.live_members() {
                let Some(check) = node.validator() else {
                    continue;
                };
                if let Err(reason) = check(&entry.value) {
                    tracing::debug!(hook = %node.id(), %reason, "hook rejected submission");
                    return Err(SubmitError::Rejected {
                        by: Rejector::Hook(node.id()),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NexusManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NexusManager")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("phase", &self.inner.phase.get())
            .finish()
    }
}

/// Committed state waiting for phases 4-6.
struct Applied {
    report: SubmitReport,
    owners: BTreeMap<OwnerId, Rc<OwnerCore>>,
    members: Vec<(AnyValue, Vec<Rc<HookNode>>)>,
}

fn log_outcome(result: Result<&SubmitReport, &SubmitError>) {
    match result {
        Ok(report) => tracing::debug!(
            passes = report.passes,
            derived = report.derived,
            committed = report.committed,
            notified = report.notified,
            "submission applied"
        ),
        Err(err) => tracing::debug!(error = %err, "submission refused"),
    }
}

/// Live owners of any member of any entry's nexus, in creation order.
fn touched_owners(entries: &EntryMap) -> BTreeMap<OwnerId, Rc<OwnerCore>> {
    let mut owners = BTreeMap::new();
    for entry in entries.values() {
        for node in entry.nexus.live_members() {
            if let Some(owner) = node.owner() {
                owners.entry(owner.id()).or_insert(owner);
            }
        }
    }
    owners
}

/// Union-find over the nexuses named by a batch of connect pairs.
///
/// Each component's value is its root's value; linking makes the source
/// component's root the root of the joined component, which matches
/// applying the pairs in order.
#[derive(Default)]
struct SyncPlan {
    nexuses: Vec<Rc<Nexus>>,
    index: BTreeMap<NexusId, usize>,
    parent: Vec<usize>,
}

impl SyncPlan {
    fn slot(&mut self, nexus: Rc<Nexus>) -> usize {
        if let Some(&slot) = self.index.get(&nexus.id()) {
            return slot;
        }
        let slot = self.nexuses.len();
        self.index.insert(nexus.id(), slot);
        self.nexuses.push(nexus);
        self.parent.push(slot);
        slot
    }

    fn root(&mut self, mut slot: usize) -> usize {
        while self.parent[slot] != slot {
            self.parent[slot] = self.parent[self.parent[slot]];
            slot = self.parent[slot];
        }
        slot
    }

    fn link(&mut self, source: Rc<Nexus>, target: Rc<Nexus>) {
        let source = self.slot(source);
        let target = self.slot(target);
        let (source_root, target_root) = (self.root(source), self.root(target));
        if source_root != target_root {
            self.parent[target_root] = source_root;
        }
    }

    fn into_submission(mut self) -> Submission {
        let mut submission = Submission::new();
        for slot in 0..self.nexuses.len() {
            let root = self.root(slot);
            if root != slot {
                let value = self.nexuses[root].value();
                submission.insert_nexus(&self.nexuses[slot], value);
            }
        }
        submission
    }
}
