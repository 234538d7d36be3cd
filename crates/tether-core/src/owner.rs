#![forbid(unsafe_code)]

//! Owners: objects that hold a named set of hooks and take part in
//! submissions through [`OwnerBehavior`].
//!
//! An owner creates its hooks, keeps them alive, and gives the manager three
//! optional hooks into the submission protocol:
//!
//! - `complete`: derive extra `{key -> value}` entries from a partial
//!   submission (a changed "key" pulls the matching "value" out of a "dict").
//! - `validate`: accept or refuse the complete view of the owner's values.
//! - `invalidate`: react after a commit changed any of the owner's hooks.
//!
//! # Usage
//!
//! ```
//! use tether_core::manager::NexusManager;
//! use tether_core::owner::{Owner, OwnerCallbacks, typed_value};
//!
//! let manager = NexusManager::default();
//! let owner = Owner::builder_in(&manager)
//!     .hook("celsius", 0.0_f64)
//!     .hook("fahrenheit", 32.0_f64)
//!     .behavior(OwnerCallbacks::new().on_complete(|submitted, _current| {
//!         let mut extra = tether_core::value_map! {};
//!         if let Some(c) = typed_value::<f64>(submitted, "celsius") {
//!             extra.insert("fahrenheit".into(), tether_core::value::AnyValue::new(c * 9.0 / 5.0 + 32.0));
//!         }
//!         Ok(extra)
//!     }))
//!     .build()?;
//!
//! owner.submit_value("celsius", 100.0_f64)?;
//! assert_eq!(owner.value::<f64>("fahrenheit")?, 212.0);
//! # Ok::<(), tether_core::error::OwnerError>(())
//! ```
//!
//! # Invariants
//!
//! 1. After every successful submission touching an owner, its `validate`
//!    accepts the owner's complete set of values.
//! 2. Owned hooks are never notified individually; the owner's listeners
//!    are notified once instead.
//! 3. Keys are unique within one owner and fixed at build time.

use std::any::type_name;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{HookError, OwnerError, SubmitError};
use crate::hook::{
    AnyHook, ConnectOutcome, DisconnectOutcome, Hook, HookNode, OwnerLink, SyncMode,
    connect_nodes, disconnect_node,
};
use crate::ids::OwnerId;
use crate::listener::{Listenable, Listeners};
use crate::manager::NexusManager;
use crate::nexus::Nexus;
use crate::submission::{EntryMap, SubmitOptions, SubmitReport, Submission};
use crate::value::{AnyValue, HookValue};

/// `{key -> value}` view of an owner's hooks.
pub type ValueMap = BTreeMap<String, AnyValue>;

/// Build a [`ValueMap`] from `key => value` pairs.
///
/// ```
/// let map = tether_core::value_map! { "count" => 3_i32, "label" => String::from("x") };
/// assert_eq!(map.len(), 2);
/// ```
#[macro_export]
macro_rules! value_map {
    () => {
        $crate::owner::ValueMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::owner::ValueMap::new();
        $(
            map.insert(::std::string::String::from($key), $crate::value::AnyValue::new($value));
        )+
        map
    }};
}

/// Borrow a typed value out of a [`ValueMap`].
#[must_use]
pub fn typed_value<'a, T: 'static>(values: &'a ValueMap, key: &str) -> Option<&'a T> {
    values.get(key).and_then(|value| value.downcast_ref::<T>())
}

/// Owner participation in the submission protocol. Every method defaults
/// to a no-op that accepts everything.
pub trait OwnerBehavior {
    /// Derive extra entries. `submitted` holds the entries that currently
    /// target this owner's hooks; `current` holds every hook's live value.
    /// Returned keys must belong to the owner. An `Err` rejects the whole
    /// submission.
    fn complete(&self, submitted: &ValueMap, current: &ValueMap) -> Result<ValueMap, String> {
        let _ = (submitted, current);
        Ok(ValueMap::new())
    }

    /// Accept or refuse the complete view (current values overlaid with
    /// submitted ones).
    fn validate(&self, values: &ValueMap) -> Result<(), String> {
        let _ = values;
        Ok(())
    }

    /// Called once after a commit changed any of the owner's hooks.
    fn invalidate(&self) {}
}

impl OwnerBehavior for () {}

type CompleteFn = Box<dyn Fn(&ValueMap, &ValueMap) -> Result<ValueMap, String>>;
type ValidateFn = Box<dyn Fn(&ValueMap) -> Result<(), String>>;
type InvalidateFn = Box<dyn Fn()>;

/// [`OwnerBehavior`] assembled from optional closures.
#[derive(Default)]
pub struct OwnerCallbacks {
    complete: Option<CompleteFn>,
    validate: Option<ValidateFn>,
    invalidate: Option<InvalidateFn>,
}

impl OwnerCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_complete(
        mut self,
        f: impl Fn(&ValueMap, &ValueMap) -> Result<ValueMap, String> + 'static,
    ) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_validate(mut self, f: impl Fn(&ValueMap) -> Result<(), String> + 'static) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_invalidate(mut self, f: impl Fn() + 'static) -> Self {
        self.invalidate = Some(Box::new(f));
        self
    }
}

impl OwnerBehavior for OwnerCallbacks {
    fn complete(&self, submitted: &ValueMap, current: &ValueMap) -> Result<ValueMap, String> {
        match &self.complete {
            Some(f) => f(submitted, current),
            None => Ok(ValueMap::new()),
        }
    }

    fn validate(&self, values: &ValueMap) -> Result<(), String> {
        match &self.validate {
            Some(f) => f(values),
            None => Ok(()),
        }
    }

    fn invalidate(&self) {
        if let Some(f) = &self.invalidate {
            f();
        }
    }
}

impl fmt::Debug for OwnerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerCallbacks")
            .field("complete", &self.complete.is_some())
            .field("validate", &self.validate.is_some())
            .field("invalidate", &self.invalidate.is_some())
            .finish()
    }
}

/// Shared owner state. Owned hooks point back here weakly.
pub(crate) struct OwnerCore {
    id: OwnerId,
    manager: NexusManager,
    hooks: BTreeMap<String, Rc<HookNode>>,
    behavior: Box<dyn OwnerBehavior>,
    listeners: Listeners,
}

impl OwnerCore {
    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }

    pub(crate) fn node(&self, key: &str) -> Option<&Rc<HookNode>> {
        self.hooks.get(key)
    }

    pub(crate) fn behavior(&self) -> &dyn OwnerBehavior {
        self.behavior.as_ref()
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub(crate) fn current_values(&self) -> ValueMap {
        self.hooks
            .iter()
            .map(|(key, node)| (key.clone(), node.nexus().value()))
            .collect()
    }

    /// Entries of `entries` that target one of this owner's hooks.
    pub(crate) fn submitted_values(&self, entries: &EntryMap) -> ValueMap {
        self.hooks
            .iter()
            .filter_map(|(key, node)| {
                entries
                    .get(&node.nexus().id())
                    .map(|entry| (key.clone(), entry.value.clone()))
            })
            .collect()
    }

    fn lookup(&self, key: &str) -> Result<&Rc<HookNode>, OwnerError> {
        self.hooks.get(key).ok_or_else(|| OwnerError::UnknownKey {
            key: key.to_string(),
        })
    }
}

enum HookSeed {
    Value(AnyValue),
    Connected(AnyHook),
}

/// Builder for [`Owner`].
pub struct OwnerBuilder {
    manager: NexusManager,
    seeds: Vec<(String, HookSeed)>,
    behavior: Box<dyn OwnerBehavior>,
}

impl Default for OwnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnerBuilder {
    /// Builder on this thread's default manager.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(&NexusManager::global())
    }

    /// Builder on an explicit manager.
    #[must_use]
    pub fn new_in(manager: &NexusManager) -> Self {
        Self {
            manager: manager.clone(),
            seeds: Vec::new(),
            behavior: Box::new(()),
        }
    }

    /// Declare a hook with an initial value.
    #[must_use]
    pub fn hook<T: HookValue>(self, key: impl Into<String>, value: T) -> Self {
        self.hook_any(key, AnyValue::new(value))
    }

    /// Declare a hook with an erased initial value.
    #[must_use]
    pub fn hook_any(mut self, key: impl Into<String>, value: AnyValue) -> Self {
        self.seeds.push((key.into(), HookSeed::Value(value)));
        self
    }

    /// Declare a hook that starts connected to `external`, adopting its
    /// value.
    #[must_use]
    pub fn connected(mut self, key: impl Into<String>, external: &AnyHook) -> Self {
        self.seeds
            .push((key.into(), HookSeed::Connected(external.clone())));
        self
    }

    #[must_use]
    pub fn behavior(mut self, behavior: impl OwnerBehavior + 'static) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    /// Create the hooks, validate the initial state, then connect the
    /// hooks declared with [`connected`](Self::connected).
    pub fn build(self) -> Result<Owner, OwnerError> {
        let mut seen = BTreeSet::new();
        for (key, seed) in &self.seeds {
            if !seen.insert(key.as_str()) {
                return Err(OwnerError::DuplicateKey { key: key.clone() });
            }
            if let HookSeed::Connected(external) = seed
                && external.manager().id() != self.manager.id()
            {
                return Err(HookError::ManagerMismatch {
                    left: self.manager.id(),
                    right: external.manager().id(),
                }
                .into());
            }
        }

        let Self {
            manager,
            seeds,
            behavior,
        } = self;
        let core = Rc::new_cyclic(|weak: &Weak<OwnerCore>| {
            let hooks = seeds
                .iter()
                .map(|(key, seed)| {
                    let value = match seed {
                        HookSeed::Value(value) => value.clone(),
                        HookSeed::Connected(external) => external.value(),
                    };
                    let link = OwnerLink {
                        owner: weak.clone(),
                        key: key.clone(),
                    };
                    let node = HookNode::create(&manager, value, Some(link), None, None);
                    (key.clone(), node)
                })
                .collect();
            OwnerCore {
                id: OwnerId::fresh(),
                manager: manager.clone(),
                hooks,
                behavior,
                listeners: Listeners::new(),
            }
        });

        core.behavior
            .validate(&core.current_values())
            .map_err(|reason| OwnerError::InvalidInitialState { reason })?;

        for (key, seed) in &seeds {
            if let (HookSeed::Connected(external), Some(node)) = (seed, core.hooks.get(key)) {
                connect_nodes(node, external.node(), SyncMode::UseTargetValue)?;
            }
        }

        tracing::trace!(owner = %core.id, hooks = core.hooks.len(), "owner built");
        Ok(Owner { core })
    }
}

impl fmt::Debug for OwnerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerBuilder")
            .field("manager", &self.manager.id())
            .field("hooks", &self.seeds.iter().map(|(key, _)| key).collect::<Vec<_>>())
            .finish()
    }
}

/// An object holding a named set of hooks.
///
/// Dropping an owner releases its hooks like any other hook handle;
/// [`destroy`](Owner::destroy) additionally disconnects them first and
/// clears the owner's listeners.
pub struct Owner {
    core: Rc<OwnerCore>,
}

impl Owner {
    /// Builder on this thread's default manager.
    #[must_use]
    pub fn builder() -> OwnerBuilder {
        OwnerBuilder::new()
    }

    /// Builder on an explicit manager.
    #[must_use]
    pub fn builder_in(manager: &NexusManager) -> OwnerBuilder {
        OwnerBuilder::new_in(manager)
    }

    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.core.id
    }

    #[must_use]
    pub fn manager(&self) -> &NexusManager {
        &self.core.manager
    }

    /// Hook keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.core.hooks.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.core.hooks.contains_key(key)
    }

    /// The erased hook under `key`.
    pub fn any_hook(&self, key: &str) -> Result<AnyHook, OwnerError> {
        self.core
            .lookup(key)
            .map(|node| AnyHook::from_node(Rc::clone(node)))
    }

    /// The typed hook under `key`.
    pub fn hook<T: HookValue>(&self, key: &str) -> Result<Hook<T>, OwnerError> {
        let node = self.core.lookup(key)?;
        let value = node.nexus().value();
        if !value.is::<T>() {
            return Err(OwnerError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
                actual: value.type_name(),
            });
        }
        Ok(Hook::from_node(Rc::clone(node)))
    }

    /// A copy of the value under `key`.
    pub fn value<T: HookValue>(&self, key: &str) -> Result<T, OwnerError> {
        self.hook::<T>(key).map(|hook| hook.value())
    }

    /// The shared value under `key`.
    pub fn value_ref<T: HookValue>(&self, key: &str) -> Result<Rc<T>, OwnerError> {
        self.hook::<T>(key).map(|hook| hook.value_ref())
    }

    pub fn any_value(&self, key: &str) -> Result<AnyValue, OwnerError> {
        self.core.lookup(key).map(|node| node.nexus().value())
    }

    /// Every hook's current value.
    #[must_use]
    pub fn values(&self) -> ValueMap {
        self.core.current_values()
    }

    /// Key of an owned hook.
    #[must_use]
    pub fn key_of(&self, hook: &AnyHook) -> Option<&str> {
        self.core
            .hooks
            .iter()
            .find(|(_, node)| Rc::ptr_eq(node, hook.node()))
            .map(|(key, _)| key.as_str())
    }

    /// Key of the first owned hook that belongs to `nexus`.
    #[must_use]
    pub fn key_of_nexus(&self, nexus: &Nexus) -> Option<&str> {
        self.core
            .hooks
            .iter()
            .find(|(_, node)| node.nexus().id() == nexus.id())
            .map(|(key, _)| key.as_str())
    }

    /// Connect the hook under `key` to an external hook.
    pub fn connect_hook(
        &self,
        key: &str,
        external: &AnyHook,
        mode: SyncMode,
    ) -> Result<ConnectOutcome, OwnerError> {
        let node = self.core.lookup(key)?;
        Ok(connect_nodes(node, external.node(), mode)?)
    }

    /// Connect several owned hooks at once, atomically. Returns the number
    /// of merges performed.
    pub fn connect_hooks<'k>(
        &self,
        targets: impl IntoIterator<Item = (&'k str, AnyHook)>,
        mode: SyncMode,
    ) -> Result<usize, OwnerError> {
        let mut pairs = Vec::new();
        for (key, external) in targets {
            let own = AnyHook::from_node(Rc::clone(self.core.lookup(key)?));
            pairs.push(match mode {
                SyncMode::UseCallerValue => (own, external),
                SyncMode::UseTargetValue => (external, own),
            });
        }
        Ok(self.core.manager.connect_pairs(&pairs)?)
    }

    pub fn disconnect_hook(&self, key: &str) -> Result<DisconnectOutcome, OwnerError> {
        self.core.lookup(key).map(disconnect_node)
    }

    /// Disconnect several owned hooks. Every key is checked before any
    /// hook is disconnected. Returns how many were actually connected.
    pub fn disconnect_hooks<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Result<usize, OwnerError> {
        let nodes = keys
            .into_iter()
            .map(|key| self.core.lookup(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes
            .into_iter()
            .filter(|node| disconnect_node(node) == DisconnectOutcome::Disconnected)
            .count())
    }

    /// Disconnect every owned hook. Returns how many were actually
    /// connected.
    pub fn disconnect_all(&self) -> usize {
        self.core
            .hooks
            .values()
            .filter(|node| disconnect_node(node) == DisconnectOutcome::Disconnected)
            .count()
    }

    /// Translate `{key -> value}` into a submission, checking keys and
    /// value types.
    pub fn submission(&self, values: ValueMap) -> Result<Submission, OwnerError> {
        let mut submission = Submission::new();
        for (key, value) in values {
            let node = self.core.lookup(&key)?;
            let current = node.nexus().value();
            if current.type_id() != value.type_id() {
                return Err(OwnerError::TypeMismatch {
                    key,
                    expected: current.type_name(),
                    actual: value.type_name(),
                });
            }
            submission.insert_any(&AnyHook::from_node(Rc::clone(node)), value);
        }
        Ok(submission)
    }

    pub fn submit_value<T: HookValue>(&self, key: &str, value: T) -> Result<SubmitReport, OwnerError> {
        self.submit_values(value_map! { key => value })
    }

    pub fn submit_values(&self, values: ValueMap) -> Result<SubmitReport, OwnerError> {
        self.submit_values_with(values, &SubmitOptions::default())
    }

    pub fn submit_values_with(
        &self,
        values: ValueMap,
        options: &SubmitOptions,
    ) -> Result<SubmitReport, OwnerError> {
        let submission = self.submission(values)?;
        Ok(self.core.manager.submit(submission, options)?)
    }

    /// Check whether a value would be accepted.
    pub fn validate_value<T: HookValue>(&self, key: &str, value: T) -> Result<(), OwnerError> {
        self.validate_values(value_map! { key => value })
    }

    /// Check whether values would be accepted. Nothing is committed.
    pub fn validate_values(&self, values: ValueMap) -> Result<(), OwnerError> {
        let submission = self.submission(values)?;
        self.core
            .manager
            .check(submission)
            .map(|_| ())
            .map_err(OwnerError::from)
    }

    /// Like [`validate_values`](Self::validate_values), but returns the
    /// submission error itself for callers that only care about the reason.
    pub fn rejection(&self, values: ValueMap) -> Option<SubmitError> {
        match self.validate_values(values) {
            Err(OwnerError::Submit(err)) => Some(err),
            _ => None,
        }
    }

    /// Disconnect every hook and clear the owner's listeners.
    pub fn destroy(self) {
        let disconnected = self.disconnect_all();
        self.core.listeners.remove_all_listeners();
        tracing::trace!(owner = %self.core.id, disconnected, "owner destroyed");
    }
}

impl Listenable for Owner {
    fn listeners(&self) -> &Listeners {
        &self.core.listeners
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.core.id)
            .field("values", &self.values())
            .finish()
    }
}
