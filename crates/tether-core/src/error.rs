#![forbid(unsafe_code)]

//! Error types.
//!
//! # Taxonomy
//!
//! | Kind | Where | Surfaced as |
//! |------|-------|-------------|
//! | Usage error | hook/owner calls (self-connection, unknown key) | `Err` from the call |
//! | Conflict | completion derives two values for one nexus | [`SubmitError::Conflict`] |
//! | Rejection | a validator refuses the completed state | [`SubmitError::Rejected`] |
//! | Non-convergence | completion exceeds its pass limit | [`SubmitError::NotConverged`] |
//! | Invariant violation | merging non-disjoint or cross-manager nexuses | panic |
//!
//! Every `SubmitError` leaves all nexus values and previous values exactly
//! as they were before the call.

use std::fmt;

use thiserror::Error;

use crate::ids::{HookId, ManagerId, NexusId, OwnerId};
use crate::manager::SubmitPhase;

/// Who refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejector {
    /// An owner's `complete` or `validate` callback.
    Owner(OwnerId),
    /// A hook's isolation validator.
    Hook(HookId),
}

impl fmt::Display for Rejector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner(id) => write!(f, "{id}"),
            Self::Hook(id) => write!(f, "{id}"),
        }
    }
}

/// Why a submission failed. No state was changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Two entries for the same nexus disagree.
    #[error("conflicting values for {nexus}: {existing} vs {proposed}")]
    Conflict {
        nexus: NexusId,
        existing: String,
        proposed: String,
    },
    /// A validator (or a failing completion callback) refused the state.
    #[error("rejected by {by}: {reason}")]
    Rejected { by: Rejector, reason: String },
    /// Completion still derived new entries at the configured pass limit.
    #[error("completion did not converge within {passes} passes")]
    NotConverged { passes: usize },
    /// A value does not have the type of the nexus it targets.
    #[error("type mismatch for {nexus}: expected {expected}, got {actual}")]
    TypeMismatch {
        nexus: NexusId,
        expected: &'static str,
        actual: &'static str,
    },
    /// A nexus belongs to another manager.
    #[error("{nexus} is registered with {nexus_manager}, not {manager}")]
    ForeignManager {
        nexus: NexusId,
        nexus_manager: ManagerId,
        manager: ManagerId,
    },
    /// An owner's completion named a key it does not own.
    #[error("{owner} derived a value for unknown key '{key}'")]
    UnknownKey { owner: OwnerId, key: String },
    /// A submission was started from inside completion, validation or commit.
    #[error("submission started during the {phase} phase of another submission")]
    Reentrant { phase: SubmitPhase },
}

/// Errors from hook operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// A hook cannot be connected to itself.
    #[error("cannot connect a hook to itself")]
    SelfConnection,
    /// The hooks are registered with different managers.
    #[error("hooks belong to different managers ({left} and {right})")]
    ManagerMismatch { left: ManagerId, right: ManagerId },
    /// The hooks carry values of different types.
    #[error("cannot connect a {left} hook to a {right} hook")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },
    /// The hook's isolation validator refused its initial value.
    #[error("initial value rejected: {reason}")]
    InvalidInitialValue { reason: String },
    /// Synchronizing the values before a merge failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Errors from owner operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnerError {
    /// The owner has no hook under this key.
    #[error("unknown hook key '{key}'")]
    UnknownKey { key: String },
    /// The hook under this key carries another type.
    #[error("hook '{key}' holds {actual}, not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// A key was declared twice while building the owner.
    #[error("hook key '{key}' declared twice")]
    DuplicateKey { key: String },
    /// The owner's validator refused the initial values.
    #[error("initial state rejected: {reason}")]
    InvalidInitialState { reason: String },
    /// A hook operation failed.
    #[error(transparent)]
    Hook(#[from] HookError),
    /// A submission failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Errors from loading a [`ManagerConfig`](crate::config::ManagerConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("invalid manager configuration: {0}")]
    Parse(String),
}
