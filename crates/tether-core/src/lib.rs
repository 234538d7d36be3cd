#![forbid(unsafe_code)]

//! Value synchronization engine for Tether.
//!
//! This crate provides the primitives that typed observable containers are
//! built on:
//!
//! - [`Hook`]: an addressable value slot. Hooks can be connected so they
//!   share one value.
//! - [`Nexus`]: the storage behind a group of connected hooks.
//! - [`Owner`]: a named set of hooks with optional completion, validation
//!   and invalidation behavior ([`OwnerBehavior`]).
//! - [`NexusManager`]: the only writer of nexus values. It runs every
//!   [`Submission`] through completion, validation, commit, invalidation,
//!   reaction and notification.
//!
//! # Architecture
//!
//! Everything is single-threaded: handles share state through `Rc` and
//! interior mutability, and none of them are `Send`. Hooks hold their nexus
//! strongly; a nexus holds its members weakly, so dropping a hook never
//! needs the rest of its group to cooperate. Owners hold their hooks
//! strongly; hooks point back at their owner weakly.
//!
//! # Invariants
//!
//! 1. Every hook belongs to exactly one nexus.
//! 2. Connected hooks observe the same value outside of an in-flight
//!    submission.
//! 3. A failed submission changes no value and no previous value.
//! 4. Owned hooks are reported to listeners through their owner, once per
//!    submission.
//!
//! # Example
//!
//! ```
//! use tether_core::{Hook, NexusManager, SyncMode};
//!
//! let manager = NexusManager::default();
//! let h1 = Hook::new_in(&manager, 1);
//! let h2 = Hook::new_in(&manager, 2);
//! manager.connect_pairs(&[(h1.erase(), h2.erase())])?;
//! assert_eq!((h1.value(), h2.value()), (1, 1));
//! assert!(h1.is_connected_to(&h2));
//! # let _ = SyncMode::UseCallerValue;
//! # Ok::<(), tether_core::HookError>(())
//! ```

pub mod config;
pub mod equality;
pub mod error;
pub mod hook;
pub mod ids;
pub mod listener;
pub mod manager;
pub mod nexus;
pub mod owner;
pub mod submission;
pub mod value;

pub use config::ManagerConfig;
pub use equality::EqualityRegistry;
pub use error::{ConfigError, HookError, OwnerError, Rejector, SubmitError};
pub use hook::{AnyHook, ConnectOutcome, DisconnectOutcome, Hook, HookBuilder, SyncMode};
pub use ids::{HookId, ManagerId, NexusId, OwnerId};
pub use listener::{Listenable, ListenerId, ListenerScope, Listeners, Subscription};
pub use manager::{NexusManager, SubmitPhase};
pub use nexus::Nexus;
pub use owner::{Owner, OwnerBehavior, OwnerBuilder, OwnerCallbacks, ValueMap, typed_value};
pub use submission::{Completion, NotifyTarget, SubmitOptions, SubmitReport, Submission};
pub use value::{AnyValue, HookValue};
