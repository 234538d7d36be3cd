#![forbid(unsafe_code)]

//! Per-type equality predicates used by the manager.
//!
//! Naive `PartialEq` is wrong for some value types the engine carries:
//! `NaN != NaN` would make a float nexus look "changed" forever, and
//! unit-aware numeric wrappers may want tolerance-based comparison. The
//! registry lets each manager decide equality per `TypeId`.
//!
//! Equality is consulted for completion conflicts, duplicate entries in a
//! submission, and skipping entries that do not change their nexus.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::AnyValue;

/// Erased equality predicate. Both arguments have the registered type.
pub type EqualityFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Registry of type-specific equality predicates.
#[derive(Clone)]
pub struct EqualityRegistry {
    predicates: AHashMap<TypeId, EqualityFn>,
}

impl Default for EqualityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EqualityRegistry {
    /// Registry with NaN-aware float equality for `f32` and `f64`.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register::<f64>(|a, b| a == b || (a.is_nan() && b.is_nan()));
        registry.register::<f32>(|a, b| a == b || (a.is_nan() && b.is_nan()));
        registry
    }

    /// Registry without any predicates; every type uses `PartialEq`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            predicates: AHashMap::new(),
        }
    }

    /// Register (or replace) the predicate for `T`.
    pub fn register<T: 'static>(&mut self, eq: impl Fn(&T, &T) -> bool + 'static) {
        let erased: EqualityFn = Rc::new(move |a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => eq(a, b),
                _ => false,
            }
        });
        self.predicates.insert(TypeId::of::<T>(), erased);
    }

    /// Remove the predicate for `T`. Returns whether one was registered.
    pub fn unregister<T: 'static>(&mut self) -> bool {
        self.predicates.remove(&TypeId::of::<T>()).is_some()
    }

    /// Whether a predicate is registered for `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.predicates.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether no predicates are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The predicate registered for a type, if any.
    #[must_use]
    pub fn predicate(&self, type_id: TypeId) -> Option<EqualityFn> {
        self.predicates.get(&type_id).cloned()
    }

    /// Compare two values. Values of different types are never equal.
    #[must_use]
    pub fn values_equal(&self, a: &AnyValue, b: &AnyValue) -> bool {
        compare_with(self.predicate(a.type_id()), a, b)
    }
}

/// Compare with an already looked-up predicate.
///
/// The manager looks the predicate up first and releases its registry borrow
/// before calling here, so a predicate may itself touch the registry.
pub(crate) fn compare_with(predicate: Option<EqualityFn>, a: &AnyValue, b: &AnyValue) -> bool {
    if a.type_id() != b.type_id() {
        return false;
    }
    if a.ptr_eq(b) {
        return true;
    }
    match predicate {
        Some(eq) => eq(a.as_any(), b.as_any()),
        None => a.eq_default(b),
    }
}

impl fmt::Debug for EqualityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqualityRegistry")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
