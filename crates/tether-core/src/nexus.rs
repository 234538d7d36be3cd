#![forbid(unsafe_code)]

//! Shared value storage for a group of connected hooks.
//!
//! A [`Nexus`] holds the authoritative value for every hook connected to it.
//! Hooks hold their nexus strongly; the nexus holds its members only weakly,
//! keyed by [`HookId`], so a hook can be dropped while it is still grouped.
//! Stale entries are removed eagerly when a hook node drops and lazily
//! whenever members are enumerated.
//!
//! # Invariants
//!
//! 1. Every live hook is a member of exactly one nexus, and that nexus is the
//!    one the hook points at.
//! 2. All live members observe the nexus value; the value only changes in the
//!    manager's commit phase.
//! 3. Nexuses are never merged in place: a merge builds a new nexus and
//!    repoints every member. A split (disconnect) seeds a new singleton.
//! 4. Nexuses being merged are pairwise disjoint and share one manager.
//!    Violations panic; they mean the engine lost track of membership.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::hook::HookNode;
use crate::ids::{HookId, ManagerId, NexusId};
use crate::value::AnyValue;

struct NexusState {
    value: AnyValue,
    previous: AnyValue,
}

/// Authoritative storage for one shared value.
pub struct Nexus {
    id: NexusId,
    manager: ManagerId,
    state: RefCell<NexusState>,
    members: RefCell<BTreeMap<HookId, Weak<HookNode>>>,
}

impl Nexus {
    /// Seed a nexus whose previous value equals its current value.
    pub(crate) fn seed(manager: ManagerId, value: AnyValue) -> Rc<Self> {
        Self::seed_with_previous(manager, value.clone(), value)
    }

    pub(crate) fn seed_with_previous(
        manager: ManagerId,
        value: AnyValue,
        previous: AnyValue,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: NexusId::fresh(),
            manager,
            state: RefCell::new(NexusState { value, previous }),
            members: RefCell::new(BTreeMap::new()),
        })
    }

    /// Identity of this nexus object.
    #[must_use]
    pub fn id(&self) -> NexusId {
        self.id
    }

    /// Manager this nexus is registered with.
    #[must_use]
    pub fn manager_id(&self) -> ManagerId {
        self.manager
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> AnyValue {
        self.state.borrow().value.clone()
    }

    /// Value before the last commit.
    #[must_use]
    pub fn previous_value(&self) -> AnyValue {
        self.state.borrow().previous.clone()
    }

    /// Type name of the stored value.
    #[must_use]
    pub fn value_type_name(&self) -> &'static str {
        self.state.borrow().value.type_name()
    }

    /// Number of live member hooks.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.live_members().len()
    }

    /// Ids of the live member hooks, in creation order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<HookId> {
        self.live_members().iter().map(|node| node.id()).collect()
    }

    /// Whether the hook is a live member.
    #[must_use]
    pub fn contains(&self, hook: HookId) -> bool {
        self.members
            .borrow()
            .get(&hook)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Live members, sweeping entries whose hook has been dropped.
    pub(crate) fn live_members(&self) -> Vec<Rc<HookNode>> {
        let mut live = Vec::new();
        self.members.borrow_mut().retain(|_, weak| match weak.upgrade() {
            Some(node) => {
                live.push(node);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn insert_member(&self, node: &Rc<HookNode>) {
        self.members
            .borrow_mut()
            .insert(node.id(), Rc::downgrade(node));
    }

    pub(crate) fn remove_member(&self, hook: HookId) -> bool {
        self.members.borrow_mut().remove(&hook).is_some()
    }

    /// Commit step: `previous := value`, `value := new`.
    pub(crate) fn commit(&self, value: AnyValue) {
        let mut state = self.state.borrow_mut();
        state.previous = std::mem::replace(&mut state.value, value);
    }

    /// Merge nexuses into one new nexus and repoint every live member.
    ///
    /// The merged nexus is seeded with the first input's value; callers
    /// must have already made all input values equal through a submission.
    ///
    /// # Panics
    ///
    /// Panics on an empty input, on inputs registered with different
    /// managers, and on inputs that share a live member.
    pub(crate) fn merge(nexuses: &[Rc<Nexus>]) -> Rc<Nexus> {
        let Some(first) = nexuses.first() else {
            panic!("nexus merge requires at least one nexus");
        };

        let mut collected: BTreeMap<HookId, Rc<HookNode>> = BTreeMap::new();
        for nexus in nexuses {
            assert!(
                nexus.manager == first.manager,
                "cannot merge {} ({}) with {} ({})",
                nexus.id,
                nexus.manager,
                first.id,
                first.manager
            );
            for node in nexus.live_members() {
                let id = node.id();
                if collected.insert(id, node).is_some() {
                    panic!(
                        "nexus merge invariant violated: {id} is a member of more than one input nexus"
                    );
                }
            }
        }

        let merged = {
            let state = first.state.borrow();
            Self::seed_with_previous(first.manager, state.value.clone(), state.previous.clone())
        };
        for node in collected.values() {
            merged.insert_member(node);
            node.set_nexus(Rc::clone(&merged));
        }

        tracing::trace!(
            nexus = %merged.id,
            inputs = nexuses.len(),
            members = collected.len(),
            "nexus merged"
        );
        merged
    }
}

impl fmt::Debug for Nexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Nexus")
            .field("id", &self.id)
            .field("manager", &self.manager)
            .field("value", &state.value)
            .field("previous", &state.previous)
            .field("members", &self.members.borrow().len())
            .finish()
    }
}
