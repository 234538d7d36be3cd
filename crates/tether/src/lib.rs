#![forbid(unsafe_code)]

//! Tether public facade.
//!
//! Re-exports the engine from `tether-core` and adds convenience entry
//! points bound to this thread's default manager. Library code should pass
//! an explicit [`NexusManager`] instead; the free functions here are meant
//! for top-level call sites such as `main` and tests.
//!
//! ```
//! use tether::prelude::*;
//!
//! let a = tether::hook(String::from("left"));
//! let b = tether::hook(String::from("right"));
//! a.connect(&b, SyncMode::UseTargetValue)?;
//! assert_eq!(a.value(), "right");
//! # Ok::<(), HookError>(())
//! ```

pub use tether_core::{
    AnyHook, AnyValue, Completion, ConfigError, ConnectOutcome, DisconnectOutcome,
    EqualityRegistry, Hook, HookBuilder, HookError, HookId, HookValue, Listenable, ListenerId,
    ListenerScope, Listeners, ManagerConfig, ManagerId, Nexus, NexusId, NexusManager,
    NotifyTarget, Owner, OwnerBehavior, OwnerBuilder, OwnerCallbacks, OwnerError, OwnerId,
    Rejector, SubmitError, SubmitOptions, SubmitPhase, SubmitReport, Submission, Subscription,
    SyncMode, ValueMap, typed_value, value_map,
};

/// Module-level access to the engine.
pub mod engine {
    pub use tether_core::{
        config, equality, error, hook, ids, listener, manager, nexus, owner, submission, value,
    };
}

/// This thread's default manager.
#[must_use]
pub fn manager() -> NexusManager {
    NexusManager::global()
}

/// A hook on this thread's default manager.
pub fn hook<T: HookValue>(value: T) -> Hook<T> {
    Hook::new(value)
}

/// An owner builder on this thread's default manager.
#[must_use]
pub fn owner() -> OwnerBuilder {
    OwnerBuilder::new()
}

/// Bulk connect on this thread's default manager.
pub fn connect_pairs(pairs: &[(AnyHook, AnyHook)]) -> Result<usize, HookError> {
    manager().connect_pairs(pairs)
}

/// Submit on this thread's default manager.
pub fn submit(submission: Submission) -> Result<SubmitReport, SubmitError> {
    manager().submit(submission, &SubmitOptions::default())
}

/// Everything a typical call site needs.
pub mod prelude {
    pub use tether_core::{
        AnyHook, AnyValue, ConnectOutcome, DisconnectOutcome, Hook, HookError, Listenable,
        NexusManager, Owner, OwnerBehavior, OwnerCallbacks, OwnerError, SubmitError,
        SubmitOptions, Submission, SyncMode, ValueMap, typed_value, value_map,
    };
}
