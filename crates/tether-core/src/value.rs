#![forbid(unsafe_code)]

//! Type-erased values stored in a [`Nexus`](crate::nexus::Nexus).
//!
//! A nexus holds hooks of one value type, but a single submission spans
//! nexuses of many types, and owners see their hooks as one
//! `{key -> value}` map. [`AnyValue`] is the common currency for both.
//!
//! # Invariants
//!
//! 1. An `AnyValue` is immutable. Committing a new value swaps the handle;
//!    it never writes through a shared reference.
//! 2. `type_id()` is the `TypeId` of the value that was wrapped, never of a
//!    wrapper around it.
//! 3. Cloning an `AnyValue` is O(1) and shares the underlying value.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// Bound for every value a hook can carry.
///
/// `Clone` backs the copy returned by `Hook::value()`, and
/// `PartialEq` is the fallback equality when no predicate is registered for
/// the type.
pub trait HookValue: Any + Clone + PartialEq + fmt::Debug {}

impl<T: Any + Clone + PartialEq + fmt::Debug> HookValue for T {}

trait ErasedValue: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
    fn eq_erased(&self, other: &dyn Any) -> bool;
}

impl<T: HookValue> ErasedValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn eq_erased(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// A shared, immutable, type-erased hook value.
#[derive(Clone)]
pub struct AnyValue {
    inner: Rc<dyn ErasedValue>,
    type_id: TypeId,
    type_name: &'static str,
}

impl AnyValue {
    /// Wrap a value.
    pub fn new<T: HookValue>(value: T) -> Self {
        Self::from_rc(Rc::new(value))
    }

    /// Wrap an already shared value without copying it.
    pub fn from_rc<T: HookValue>(value: Rc<T>) -> Self {
        Self {
            inner: value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// `TypeId` of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the wrapped value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the wrapped value is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrow the wrapped value as `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Get a shared handle to the wrapped value as `T`.
    #[must_use]
    pub fn downcast_rc<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.inner).into_any_rc().downcast::<T>().ok()
    }

    /// Clone the wrapped value out as `T`.
    #[must_use]
    pub fn cloned<T: HookValue>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Whether both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    /// `PartialEq` of the wrapped values; `false` across types.
    pub(crate) fn eq_default(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.inner.eq_erased(other.as_any())
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

/// Borrow a nexus value as the hook's declared type.
///
/// Submissions reject values whose type differs from the nexus value, so a
/// mismatch here means the engine broke its own type invariant.
pub(crate) fn expect_typed<T: 'static>(value: &AnyValue) -> &T {
    match value.downcast_ref::<T>() {
        Some(typed) => typed,
        None => type_invariant_violated::<T>(value),
    }
}

/// Shared-handle form of [`expect_typed`].
pub(crate) fn expect_typed_rc<T: 'static>(value: &AnyValue) -> Rc<T> {
    match value.downcast_rc::<T>() {
        Some(shared) => shared,
        None => type_invariant_violated::<T>(value),
    }
}

fn type_invariant_violated<T: 'static>(value: &AnyValue) -> ! {
    panic!(
        "nexus value type invariant violated: expected {}, found {}",
        std::any::type_name::<T>(),
        value.type_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_matches_wrapped_type() {
        let v = AnyValue::new(42_i32);
        assert!(v.is::<i32>());
        assert!(!v.is::<i64>());
        assert_eq!(v.downcast_ref::<i32>(), Some(&42));
        assert_eq!(v.downcast_ref::<u8>(), None);
        assert_eq!(v.cloned::<i32>(), Some(42));
    }

    #[test]
    fn downcast_rc_shares_allocation() {
        let shared = Rc::new(String::from("tether"));
        let v = AnyValue::from_rc(Rc::clone(&shared));
        let back = v.downcast_rc::<String>().unwrap();
        assert!(Rc::ptr_eq(&shared, &back));
    }

    #[test]
    fn clone_is_shallow() {
        let v = AnyValue::new(vec![1, 2, 3]);
        let w = v.clone();
        assert!(v.ptr_eq(&w));
        assert!(!v.ptr_eq(&AnyValue::new(vec![1, 2, 3])));
    }

    #[test]
    fn default_equality_is_partial_eq() {
        assert!(AnyValue::new(1_u8).eq_default(&AnyValue::new(1_u8)));
        assert!(!AnyValue::new(1_u8).eq_default(&AnyValue::new(2_u8)));
        assert!(!AnyValue::new(1_u8).eq_default(&AnyValue::new(1_u16)));
        assert!(!AnyValue::new(f64::NAN).eq_default(&AnyValue::new(f64::NAN)));
    }

    #[test]
    fn debug_shows_inner_value() {
        assert_eq!(format!("{:?}", AnyValue::new("a")), "\"a\"");
    }

    #[test]
    #[should_panic(expected = "type invariant violated")]
    fn expect_typed_panics_on_mismatch() {
        let v = AnyValue::new(1_i32);
        let _ = expect_typed::<String>(&v);
    }

    #[test]
    fn expect_typed_rc_shares_the_value() {
        let v = AnyValue::new(String::from("x"));
        let shared = expect_typed_rc::<String>(&v);
        assert!(Rc::ptr_eq(&shared, &v.downcast_rc::<String>().unwrap()));
    }

    #[test]
    #[should_panic(expected = "type invariant violated")]
    fn expect_typed_rc_panics_on_mismatch() {
        let v = AnyValue::new(1_i32);
        let _ = expect_typed_rc::<String>(&v);
    }
}
