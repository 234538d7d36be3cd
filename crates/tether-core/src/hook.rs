#![forbid(unsafe_code)]

//! Hooks: addressable value slots that can be grouped into a shared nexus.
//!
//! [`Hook<T>`] is the typed handle; [`AnyHook`] is the same hook with its
//! value type erased, which is what owners and bulk operations work with.
//! Cloning either handle shares the same hook node.
//!
//! # Usage
//!
//! ```
//! use tether_core::hook::{Hook, SyncMode};
//! use tether_core::manager::NexusManager;
//!
//! let manager = NexusManager::default();
//! let a = Hook::new_in(&manager, 1);
//! let b = Hook::new_in(&manager, 2);
//!
//! a.connect(&b, SyncMode::UseCallerValue)?;
//! assert_eq!(b.value(), 1);
//!
//! b.submit(5)?;
//! assert_eq!(a.value(), 5);
//!
//! a.disconnect();
//! b.submit(9)?;
//! assert_eq!(a.value(), 5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Invariants
//!
//! 1. A hook belongs to exactly one nexus at all times.
//! 2. Connected hooks observe the same value outside of an in-flight
//!    submission.
//! 3. Connecting never changes values directly: the winning value is first
//!    submitted into the losing nexus, then the nexuses are merged.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Self-connection | `h.connect(&h)` | `HookError::SelfConnection` |
//! | Different managers | hooks built on different managers | `HookError::ManagerMismatch` |
//! | Sync rejected | a validator refuses the winning value | `HookError::Submit`, nothing merged |

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::error::{HookError, SubmitError};
use crate::ids::{HookId, OwnerId};
use crate::listener::{Listenable, Listeners};
use crate::manager::NexusManager;
use crate::nexus::Nexus;
use crate::owner::OwnerCore;
use crate::submission::{SubmitOptions, SubmitReport, Submission};
use crate::value::{AnyValue, HookValue, expect_typed, expect_typed_rc};

/// Which side's value wins when two hooks are first connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// The hook `connect` is called on keeps its value.
    #[default]
    UseCallerValue,
    /// The hook passed to `connect` keeps its value.
    UseTargetValue,
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The nexuses were synchronized and merged.
    Connected,
    /// The hooks already shared a nexus; nothing changed.
    AlreadyConnected,
}

/// Result of `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The hook moved to a fresh singleton nexus.
    Disconnected,
    /// The hook was already the only live member of its nexus.
    AlreadyIsolated,
}

pub(crate) type ErasedValidator = Rc<dyn Fn(&AnyValue) -> Result<(), String>>;
pub(crate) type ErasedReaction = Rc<dyn Fn(&AnyValue)>;

/// Back-reference from an owned hook to its owner.
pub(crate) struct OwnerLink {
    pub(crate) owner: Weak<OwnerCore>,
    pub(crate) key: String,
}

/// Shared state behind every handle to one hook.
pub(crate) struct HookNode {
    id: HookId,
    manager: NexusManager,
    nexus: RefCell<Rc<Nexus>>,
    owner: Option<OwnerLink>,
    validator: Option<ErasedValidator>,
    reaction: Option<ErasedReaction>,
    listeners: Listeners,
}

impl HookNode {
    /// Create a node seeded into a brand-new singleton nexus.
    pub(crate) fn create(
        manager: &NexusManager,
        value: AnyValue,
        owner: Option<OwnerLink>,
        validator: Option<ErasedValidator>,
        reaction: Option<ErasedReaction>,
    ) -> Rc<Self> {
        let nexus = Nexus::seed(manager.id(), value);
        let node = Rc::new(Self {
            id: HookId::fresh(),
            manager: manager.clone(),
            nexus: RefCell::new(Rc::clone(&nexus)),
            owner,
            validator,
            reaction,
            listeners: Listeners::new(),
        });
        nexus.insert_member(&node);
        node
    }

    pub(crate) fn id(&self) -> HookId {
        self.id
    }

    pub(crate) fn manager(&self) -> &NexusManager {
        &self.manager
    }

    pub(crate) fn nexus(&self) -> Rc<Nexus> {
        Rc::clone(&self.nexus.borrow())
    }

    pub(crate) fn set_nexus(&self, nexus: Rc<Nexus>) {
        *self.nexus.borrow_mut() = nexus;
    }

    /// The owner, if this hook has one and it is still alive.
    pub(crate) fn owner(&self) -> Option<Rc<OwnerCore>> {
        self.owner.as_ref().and_then(|link| link.owner.upgrade())
    }

    pub(crate) fn owner_key(&self) -> Option<&str> {
        self.owner.as_ref().map(|link| link.key.as_str())
    }

    pub(crate) fn validator(&self) -> Option<&ErasedValidator> {
        self.validator.as_ref()
    }

    pub(crate) fn reaction(&self) -> Option<&ErasedReaction> {
        self.reaction.as_ref()
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}

impl Drop for HookNode {
    fn drop(&mut self) {
        let id = self.id;
        self.nexus.get_mut().remove_member(id);
    }
}

/// Connect two hook nodes: sync the winning value, then merge.
pub(crate) fn connect_nodes(
    caller: &Rc<HookNode>,
    target: &Rc<HookNode>,
    mode: SyncMode,
) -> Result<ConnectOutcome, HookError> {
    if Rc::ptr_eq(caller, target) {
        return Err(HookError::SelfConnection);
    }
    check_compatible(caller, target)?;

    let (caller_nexus, target_nexus) = (caller.nexus(), target.nexus());
    if Rc::ptr_eq(&caller_nexus, &target_nexus) {
        return Ok(ConnectOutcome::AlreadyConnected);
    }

    let (losing, winning_value) = match mode {
        SyncMode::UseCallerValue => (&target_nexus, caller_nexus.value()),
        SyncMode::UseTargetValue => (&caller_nexus, target_nexus.value()),
    };
    let mut submission = Submission::new();
    submission.insert_nexus(losing, winning_value);
    // Merge before any callback runs, so listeners see one group.
    caller.manager().submit_then(submission, || {
        let (caller_nexus, target_nexus) = (caller.nexus(), target.nexus());
        if !Rc::ptr_eq(&caller_nexus, &target_nexus) {
            let inputs = match mode {
                SyncMode::UseCallerValue => [caller_nexus, target_nexus],
                SyncMode::UseTargetValue => [target_nexus, caller_nexus],
            };
            Nexus::merge(&inputs);
        }
    })?;
    Ok(ConnectOutcome::Connected)
}

/// Same manager and same value type, or the hooks cannot share a nexus.
pub(crate) fn check_compatible(a: &HookNode, b: &HookNode) -> Result<(), HookError> {
    if a.manager().id() != b.manager().id() {
        return Err(HookError::ManagerMismatch {
            left: a.manager().id(),
            right: b.manager().id(),
        });
    }
    let (left, right) = (a.nexus().value(), b.nexus().value());
    if left.type_id() != right.type_id() {
        return Err(HookError::TypeMismatch {
            left: left.type_name(),
            right: right.type_name(),
        });
    }
    Ok(())
}

/// Move a hook out of its nexus into a fresh singleton seeded with the
/// nexus's current and previous values.
pub(crate) fn disconnect_node(node: &Rc<HookNode>) -> DisconnectOutcome {
    let old = node.nexus();
    if old.member_count() <= 1 {
        return DisconnectOutcome::AlreadyIsolated;
    }
    old.remove_member(node.id());
    let fresh = Nexus::seed_with_previous(old.manager_id(), old.value(), old.previous_value());
    fresh.insert_member(node);
    node.set_nexus(Rc::clone(&fresh));
    tracing::trace!(hook = %node.id(), from = %old.id(), to = %fresh.id(), "hook disconnected");
    DisconnectOutcome::Disconnected
}

// ---------------------------------------------------------------------------
// Hook<T>: typed handle
// ---------------------------------------------------------------------------

/// A typed handle to a hook.
pub struct Hook<T> {
    node: Rc<HookNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: HookValue> Hook<T> {
    /// Create a hook on this thread's default manager.
    pub fn new(value: T) -> Self {
        Self::new_in(&NexusManager::global(), value)
    }

    /// Create a hook on an explicit manager.
    pub fn new_in(manager: &NexusManager, value: T) -> Self {
        Self::from_node(HookNode::create(
            manager,
            AnyValue::new(value),
            None,
            None,
            None,
        ))
    }

    /// Start building a hook with a validator and/or reaction.
    pub fn builder(value: T) -> HookBuilder<T> {
        HookBuilder::new(value)
    }

    pub(crate) fn from_node(node: Rc<HookNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// Identity of the hook.
    #[must_use]
    pub fn id(&self) -> HookId {
        self.node.id()
    }

    /// A copy of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        expect_typed::<T>(&self.node.nexus().value()).clone()
    }

    /// The live shared value. Values are immutable once committed.
    #[must_use]
    pub fn value_ref(&self) -> Rc<T> {
        expect_typed_rc::<T>(&self.node.nexus().value())
    }

    /// A copy of the value before the last commit.
    #[must_use]
    pub fn previous_value(&self) -> T {
        expect_typed::<T>(&self.node.nexus().previous_value()).clone()
    }

    /// The nexus this hook currently belongs to.
    #[must_use]
    pub fn nexus(&self) -> Rc<Nexus> {
        self.node.nexus()
    }

    /// The manager this hook is registered with.
    #[must_use]
    pub fn manager(&self) -> &NexusManager {
        self.node.manager()
    }

    /// Connect to another hook; see [`SyncMode`] for which value wins.
    pub fn connect(&self, other: &Hook<T>, mode: SyncMode) -> Result<ConnectOutcome, HookError> {
        connect_nodes(&self.node, &other.node, mode)
    }

    /// Leave the current nexus, keeping the current value.
    pub fn disconnect(&self) -> DisconnectOutcome {
        disconnect_node(&self.node)
    }

    /// Whether both hooks share a nexus.
    #[must_use]
    pub fn is_connected_to<U>(&self, other: &Hook<U>) -> bool {
        Rc::ptr_eq(&self.node.nexus(), &other.node.nexus())
    }

    /// Submit a new value for this hook's nexus.
    pub fn submit(&self, value: T) -> Result<SubmitReport, SubmitError> {
        let mut submission = Submission::new();
        submission.insert(self, value);
        self.manager().submit(submission, &SubmitOptions::default())
    }

    /// Check whether a value would be accepted, without changing anything.
    pub fn validate(&self, value: T) -> Result<(), SubmitError> {
        let mut submission = Submission::new();
        submission.insert(self, value);
        self.manager().check(submission).map(|_| ())
    }

    /// The same hook with its value type erased.
    #[must_use]
    pub fn erase(&self) -> AnyHook {
        AnyHook::from_node(Rc::clone(&self.node))
    }

    /// Whether the hook has an isolation validator.
    #[must_use]
    pub fn has_isolation_validator(&self) -> bool {
        self.node.validator().is_some()
    }

    /// Whether the hook has a reaction callback.
    #[must_use]
    pub fn has_reaction(&self) -> bool {
        self.node.reaction().is_some()
    }

    /// Whether the hook belongs to a live owner.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.node.owner().is_some()
    }

    /// Key under which the owner holds this hook.
    #[must_use]
    pub fn owner_key(&self) -> Option<&str> {
        self.node.owner_key()
    }

    /// Id of the live owner, if any.
    #[must_use]
    pub fn owner_id(&self) -> Option<OwnerId> {
        self.node.owner().map(|owner| owner.id())
    }

    pub(crate) fn node(&self) -> &Rc<HookNode> {
        &self.node
    }
}

impl<T> Listenable for Hook<T> {
    fn listeners(&self) -> &Listeners {
        self.node.listeners()
    }
}

impl<T: HookValue> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.node.id())
            .field("value", &self.node.nexus().value())
            .field("nexus", &self.node.nexus().id())
            .finish()
    }
}

/// Builder for hooks with an isolation validator or reaction.
pub struct HookBuilder<T> {
    value: T,
    manager: Option<NexusManager>,
    validator: Option<Box<dyn Fn(&T) -> Result<(), String>>>,
    reaction: Option<Box<dyn Fn(&T)>>,
}

impl<T: HookValue> HookBuilder<T> {
    /// Start from an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            manager: None,
            validator: None,
            reaction: None,
        }
    }

    /// Register the hook with this manager instead of the thread default.
    #[must_use]
    pub fn manager(mut self, manager: &NexusManager) -> Self {
        self.manager = Some(manager.clone());
        self
    }

    /// Check each candidate value on its own before it is committed.
    #[must_use]
    pub fn validator(mut self, check: impl Fn(&T) -> Result<(), String> + 'static) -> Self {
        self.validator = Some(Box::new(check));
        self
    }

    /// Run right after each commit that changes this hook's nexus.
    #[must_use]
    pub fn reaction(mut self, react: impl Fn(&T) + 'static) -> Self {
        self.reaction = Some(Box::new(react));
        self
    }

    /// Build the hook. Fails if the validator refuses the initial value.
    pub fn build(self) -> Result<Hook<T>, HookError> {
        if let Some(check) = &self.validator {
            check(&self.value).map_err(|reason| HookError::InvalidInitialValue { reason })?;
        }
        let manager = self.manager.unwrap_or_else(NexusManager::global);

        let validator = self.validator.map(|check| {
            let erased: ErasedValidator =
                Rc::new(move |value: &AnyValue| match value.downcast_ref::<T>() {
                    Some(typed) => check(typed),
                    None => Err(format!(
                        "expected {}, got {}",
                        std::any::type_name::<T>(),
                        value.type_name()
                    )),
                });
            erased
        });
        let reaction = self.reaction.map(|react| {
            let erased: ErasedReaction = Rc::new(move |value: &AnyValue| {
                if let Some(typed) = value.downcast_ref::<T>() {
                    react(typed);
                }
            });
            erased
        });

        Ok(Hook::from_node(HookNode::create(
            &manager,
            AnyValue::new(self.value),
            None,
            validator,
            reaction,
        )))
    }
}

impl<T: HookValue> fmt::Debug for HookBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBuilder")
            .field("value", &self.value)
            .field("validator", &self.validator.is_some())
            .field("reaction", &self.reaction.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AnyHook: type-erased handle
// ---------------------------------------------------------------------------

/// A hook handle with its value type erased.
#[derive(Clone)]
pub struct AnyHook {
    node: Rc<HookNode>,
}

impl AnyHook {
    pub(crate) fn from_node(node: Rc<HookNode>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Rc<HookNode> {
        &self.node
    }

    /// Identity of the hook.
    #[must_use]
    pub fn id(&self) -> HookId {
        self.node.id()
    }

    /// The current value (shared, not copied).
    #[must_use]
    pub fn value(&self) -> AnyValue {
        self.node.nexus().value()
    }

    /// The value before the last commit.
    #[must_use]
    pub fn previous_value(&self) -> AnyValue {
        self.node.nexus().previous_value()
    }

    /// The nexus this hook currently belongs to.
    #[must_use]
    pub fn nexus(&self) -> Rc<Nexus> {
        self.node.nexus()
    }

    /// The manager this hook is registered with.
    #[must_use]
    pub fn manager(&self) -> &NexusManager {
        self.node.manager()
    }

    /// Recover the typed handle.
    #[must_use]
    pub fn downcast<T: HookValue>(&self) -> Option<Hook<T>> {
        self.value()
            .is::<T>()
            .then(|| Hook::from_node(Rc::clone(&self.node)))
    }

    /// Connect to another hook; see [`SyncMode`] for which value wins.
    pub fn connect(&self, other: &AnyHook, mode: SyncMode) -> Result<ConnectOutcome, HookError> {
        connect_nodes(&self.node, &other.node, mode)
    }

    /// Leave the current nexus, keeping the current value.
    pub fn disconnect(&self) -> DisconnectOutcome {
        disconnect_node(&self.node)
    }

    /// Whether both hooks share a nexus.
    #[must_use]
    pub fn is_connected_to(&self, other: &AnyHook) -> bool {
        Rc::ptr_eq(&self.node.nexus(), &other.node.nexus())
    }

    /// Submit a new value for this hook's nexus.
    pub fn submit(&self, value: AnyValue) -> Result<SubmitReport, SubmitError> {
        let mut submission = Submission::new();
        submission.insert_any(self, value);
        self.manager().submit(submission, &SubmitOptions::default())
    }

    /// Check whether a value would be accepted, without changing anything.
    pub fn validate(&self, value: AnyValue) -> Result<(), SubmitError> {
        let mut submission = Submission::new();
        submission.insert_any(self, value);
        self.manager().check(submission).map(|_| ())
    }

    /// Whether the hook has an isolation validator.
    #[must_use]
    pub fn has_isolation_validator(&self) -> bool {
        self.node.validator().is_some()
    }

    /// Whether the hook has a reaction callback.
    #[must_use]
    pub fn has_reaction(&self) -> bool {
        self.node.reaction().is_some()
    }

    /// Whether the hook belongs to a live owner.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.node.owner().is_some()
    }

    /// Key under which the owner holds this hook.
    #[must_use]
    pub fn owner_key(&self) -> Option<&str> {
        self.node.owner_key()
    }
}

impl<T: HookValue> From<&Hook<T>> for AnyHook {
    fn from(hook: &Hook<T>) -> Self {
        hook.erase()
    }
}

impl Listenable for AnyHook {
    fn listeners(&self) -> &Listeners {
        self.node.listeners()
    }
}

impl fmt::Debug for AnyHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyHook")
            .field("id", &self.node.id())
            .field("value", &self.node.nexus().value())
            .field("nexus", &self.node.nexus().id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn manager() -> NexusManager {
        NexusManager::default()
    }

    #[test]
    fn new_hook_is_isolated() {
        let m = manager();
        let h = Hook::new_in(&m, 3_i32);
        assert_eq!(h.value(), 3);
        assert_eq!(h.previous_value(), 3);
        assert_eq!(h.nexus().member_count(), 1);
        assert_eq!(h.disconnect(), DisconnectOutcome::AlreadyIsolated);
    }

    #[test]
    fn connect_use_caller_value() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32);
        let b = Hook::new_in(&m, 2_i32);
        assert_eq!(
            a.connect(&b, SyncMode::UseCallerValue),
            Ok(ConnectOutcome::Connected)
        );
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 1);
        assert_eq!(b.previous_value(), 2);
        assert!(a.is_connected_to(&b));
    }

    #[test]
    fn connect_use_target_value() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32);
        let b = Hook::new_in(&m, 2_i32);
        a.connect(&b, SyncMode::UseTargetValue).unwrap();
        assert_eq!(a.value(), 2);
        assert_eq!(b.value(), 2);
    }

    #[test]
    fn connect_twice_reports_already_connected() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32);
        let b = Hook::new_in(&m, 2_i32);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        assert_eq!(
            b.connect(&a, SyncMode::UseCallerValue),
            Ok(ConnectOutcome::AlreadyConnected)
        );
    }

    #[test]
    fn connect_to_self_is_a_usage_error() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32);
        let alias = a.clone();
        assert_eq!(
            a.connect(&alias, SyncMode::UseCallerValue),
            Err(HookError::SelfConnection)
        );
    }

    #[test]
    fn connect_across_managers_fails() {
        let a = Hook::new_in(&manager(), 1_i32);
        let b = Hook::new_in(&manager(), 1_i32);
        assert!(matches!(
            a.connect(&b, SyncMode::UseCallerValue),
            Err(HookError::ManagerMismatch { .. })
        ));
        assert!(!a.is_connected_to(&b));
    }

    #[test]
    fn erased_connect_checks_types() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32).erase();
        let b = Hook::new_in(&m, String::from("x")).erase();
        assert!(matches!(
            a.connect(&b, SyncMode::UseCallerValue),
            Err(HookError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn submit_propagates_to_connected_hooks() {
        let m = manager();
        let a = Hook::new_in(&m, 0_i32);
        let b = Hook::new_in(&m, 0_i32);
        let c = Hook::new_in(&m, 0_i32);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        b.connect(&c, SyncMode::UseCallerValue).unwrap();
        c.submit(42).unwrap();
        assert_eq!((a.value(), b.value(), c.value()), (42, 42, 42));
        assert_eq!(a.previous_value(), 0);
    }

    #[test]
    fn disconnect_keeps_value_and_splits() {
        let m = manager();
        let a = Hook::new_in(&m, 5_i32);
        let b = Hook::new_in(&m, 6_i32);
        let c = Hook::new_in(&m, 7_i32);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        a.connect(&c, SyncMode::UseCallerValue).unwrap();

        assert_eq!(a.disconnect(), DisconnectOutcome::Disconnected);
        assert_eq!(a.value(), 5);
        assert!(!a.is_connected_to(&b));
        assert!(b.is_connected_to(&c));

        b.submit(8).unwrap();
        assert_eq!(a.value(), 5);
        assert_eq!(c.value(), 8);
    }

    #[test]
    fn validator_blocks_connect() {
        let m = manager();
        let positive = Hook::builder(1_i32)
            .manager(&m)
            .validator(|v| if *v > 0 { Ok(()) } else { Err(format!("{v} is not positive")) })
            .build()
            .unwrap();
        let negative = Hook::new_in(&m, -4_i32);
        let err = negative
            .connect(&positive, SyncMode::UseCallerValue)
            .unwrap_err();
        assert!(matches!(err, HookError::Submit(SubmitError::Rejected { .. })));
        assert_eq!(positive.value(), 1);
        assert!(!negative.is_connected_to(&positive));
    }

    #[test]
    fn builder_rejects_invalid_initial_value() {
        let result = Hook::builder(0_u8)
            .manager(&manager())
            .validator(|v| if *v == 0 { Err("zero".into()) } else { Ok(()) })
            .build();
        assert_eq!(
            result.unwrap_err(),
            HookError::InvalidInitialValue {
                reason: "zero".into()
            }
        );
    }

    #[test]
    fn validate_does_not_mutate() {
        let m = manager();
        let h = Hook::builder(10_i32)
            .manager(&m)
            .validator(|v| if *v < 100 { Ok(()) } else { Err("too big".into()) })
            .build()
            .unwrap();
        assert!(h.validate(50).is_ok());
        assert!(h.validate(500).is_err());
        assert_eq!(h.value(), 10);
    }

    #[test]
    fn reaction_sees_new_value() {
        let m = manager();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let h = Hook::builder(1_i32)
            .manager(&m)
            .reaction(move |v| s.set(*v))
            .build()
            .unwrap();
        assert!(h.has_reaction());
        assert!(!h.has_isolation_validator());
        h.submit(9).unwrap();
        assert_eq!(seen.get(), 9);
    }

    #[test]
    fn value_ref_shares_committed_value() {
        let m = manager();
        let a = Hook::new_in(&m, vec![1, 2, 3]);
        let b = Hook::new_in(&m, Vec::<i32>::new());
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        assert!(Rc::ptr_eq(&a.value_ref(), &b.value_ref()));
    }

    #[test]
    fn downcast_round_trip() {
        let m = manager();
        let h = Hook::new_in(&m, 2.5_f64);
        let erased = h.erase();
        assert!(erased.downcast::<i32>().is_none());
        let back = erased.downcast::<f64>().unwrap();
        assert_eq!(back.id(), h.id());
        assert_eq!(AnyHook::from(&h).id(), h.id());
    }

    #[test]
    fn listeners_fire_on_commit() {
        let m = manager();
        let a = Hook::new_in(&m, 0_i32);
        let b = Hook::new_in(&m, 0_i32);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let id = b.add_listener(move || c.set(c.get() + 1));
        a.submit(1).unwrap();
        assert_eq!(count.get(), 1);
        assert!(b.is_listening_to(id));
        assert!(b.remove_listener(id));
        a.submit(2).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unchanged_submit_does_not_notify() {
        let m = manager();
        let h = Hook::new_in(&m, 4_i32);
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _sub = h.subscribe(move || c.set(c.get() + 1));
        let report = h.submit(4).unwrap();
        assert_eq!(report.committed, 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn dropping_a_grouped_hook_leaves_the_rest_intact() {
        let m = manager();
        let a = Hook::new_in(&m, 1_i32);
        let b = Hook::new_in(&m, 1_i32);
        let c = Hook::new_in(&m, 1_i32);
        a.connect(&b, SyncMode::UseCallerValue).unwrap();
        a.connect(&c, SyncMode::UseCallerValue).unwrap();
        drop(b);
        assert_eq!(a.nexus().member_count(), 2);
        c.submit(3).unwrap();
        assert_eq!(a.value(), 3);
    }
}
