#![forbid(unsafe_code)]

//! Identifiers for engine objects.
//!
//! All identifiers are drawn from one process-wide monotonic counter, so two
//! ids never collide even across kinds or managers, and ordering by id is
//! ordering by creation time. Submissions rely on that ordering to visit
//! nexuses and owners in a stable order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RAW_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw() -> u64 {
    NEXT_RAW_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! engine_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub(crate) fn fresh() -> Self {
                Self(next_raw())
            }

            /// Get the raw id value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

engine_id!(
    /// Identity of a single hook node. Shared by every handle to that hook.
    HookId,
    "hook"
);

engine_id!(
    /// Identity of a nexus object. A merge or split always produces a new id.
    NexusId,
    "nexus"
);

engine_id!(
    /// Identity of an owner.
    OwnerId,
    "owner"
);

engine_id!(
    /// Identity of a [`NexusManager`](crate::manager::NexusManager).
    ManagerId,
    "manager"
);
