#![forbid(unsafe_code)]

//! Change listeners for hooks and owners.
//!
//! Listeners take no arguments: when notified they re-read whatever state
//! they care about. Each listener is identified by a [`ListenerId`] so it can
//! be removed explicitly, or held by a [`Subscription`] guard that removes it
//! on drop.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. `notify()` snapshots the listener list first, so a callback may add or
//!    remove listeners (including itself) without affecting the current round.
//! 3. Dropping a [`Subscription`] removes its callback before the next
//!    notification round.
//! 4. A [`ListenerScope`] releases its subscriptions in reverse registration
//!    order when dropped or cleared.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a registered listener, unique within one [`Listeners`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

type Callback = Rc<dyn Fn()>;

#[derive(Default)]
struct ListenerSlots {
    next_id: u64,
    entries: Vec<(ListenerId, Callback)>,
}

/// An ordered list of argument-less callbacks.
///
/// Cloning shares the same list.
#[derive(Clone, Default)]
pub struct Listeners {
    slots: Rc<RefCell<ListenerSlots>>,
}

impl Listeners {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn add_listener(&self, callback: impl Fn() + 'static) -> ListenerId {
        let mut slots = self.slots.borrow_mut();
        let id = ListenerId(slots.next_id);
        slots.next_id += 1;
        slots.entries.push((id, Rc::new(callback)));
        id
    }

    /// Register several callbacks at once.
    pub fn add_listeners<F>(&self, callbacks: impl IntoIterator<Item = F>) -> Vec<ListenerId>
    where
        F: Fn() + 'static,
    {
        callbacks
            .into_iter()
            .map(|callback| self.add_listener(callback))
            .collect()
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.entries.len();
        slots.entries.retain(|(entry, _)| *entry != id);
        slots.entries.len() != before
    }

    /// Remove several callbacks. Returns how many were registered.
    pub fn remove_listeners(&self, ids: impl IntoIterator<Item = ListenerId>) -> usize {
        ids.into_iter()
            .filter(|id| self.remove_listener(*id))
            .count()
    }

    /// Remove every callback.
    pub fn remove_all_listeners(&self) {
        self.slots.borrow_mut().entries.clear();
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_listening_to(&self, id: ListenerId) -> bool {
        self.slots
            .borrow()
            .entries
            .iter()
            .any(|(entry, _)| *entry == id)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().entries.is_empty()
    }

    /// Register a callback held by an RAII guard.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let id = self.add_listener(callback);
        Subscription {
            slots: Rc::downgrade(&self.slots),
            id,
        }
    }

    /// Call every registered callback once. Returns how many were called.
    pub fn notify(&self) -> usize {
        let snapshot: Vec<Callback> = self
            .slots
            .borrow()
            .entries
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in &snapshot {
            callback();
        }
        snapshot.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

/// Anything that exposes a [`Listeners`] list.
///
/// Implemented by hooks and owners; the provided methods are the public
/// listener surface of both.
pub trait Listenable {
    /// The underlying list.
    fn listeners(&self) -> &Listeners;

    /// Register a callback.
    fn add_listener(&self, callback: impl Fn() + 'static) -> ListenerId
    where
        Self: Sized,
    {
        self.listeners().add_listener(callback)
    }

    /// Remove a callback. Returns whether it was registered.
    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners().remove_listener(id)
    }

    /// Remove every callback.
    fn remove_all_listeners(&self) {
        self.listeners().remove_all_listeners();
    }

    /// Whether the callback is still registered.
    fn is_listening_to(&self, id: ListenerId) -> bool {
        self.listeners().is_listening_to(id)
    }

    /// Register a callback held by an RAII guard.
    fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription
    where
        Self: Sized,
    {
        self.listeners().subscribe(callback)
    }
}

impl Listenable for Listeners {
    fn listeners(&self) -> &Listeners {
        self
    }
}

/// RAII guard that removes its listener on drop.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    slots: Weak<RefCell<ListenerSlots>>,
    id: ListenerId,
}

impl Subscription {
    /// Id of the held listener.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether the listener list this subscription points at still exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slots.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.borrow_mut().entries.retain(|(entry, _)| *entry != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Collects subscriptions for a logical scope (for example, one view of a
/// set of hooks). Dropping the scope releases them all.
#[derive(Default)]
pub struct ListenerScope {
    subscriptions: Vec<Subscription>,
}

impl ListenerScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep an existing subscription alive for the scope's lifetime.
    pub fn hold(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Subscribe to a hook or owner within this scope.
    pub fn subscribe(
        &mut self,
        target: &impl Listenable,
        callback: impl Fn() + 'static,
    ) -> &mut Self {
        let subscription = target.listeners().subscribe(callback);
        self.subscriptions.push(subscription);
        self
    }

    /// Number of held subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every subscription now; the scope stays usable.
    pub fn clear(&mut self) {
        while let Some(subscription) = self.subscriptions.pop() {
            drop(subscription);
        }
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for ListenerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerScope")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
