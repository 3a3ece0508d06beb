//! Progress record - the single mutable entity per identity
//!
//! The record is a total function of the key-value store contents: no
//! component may hold progress state that cannot be reconstructed from
//! a stored record.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Lifecycle of a route for one identity.
///
/// Replaces the original pair of loose booleans (`routeInitialized`,
/// `routeCompleted`) with an explicit three-state machine:
/// `NotStarted -> Active -> Completed`, with `Completed -> NotStarted`
/// only via an explicit new-route reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLifecycle {
    #[default]
    NotStarted,
    Active,
    Completed,
}

/// Reference to an accepted evidence artifact. At most one per activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub filename: String,
    /// Lowercased file extension; always "pdf" once accepted
    pub extension: String,
    pub size_bytes: u64,
}

/// Persisted progress state for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Ids of activities marked done. Membership is what matters.
    #[serde(default)]
    pub completed: BTreeSet<u32>,

    /// Accepted evidence artifact per activity id.
    #[serde(default)]
    pub evidence: BTreeMap<u32, EvidenceRef>,

    #[serde(default)]
    pub lifecycle: RouteLifecycle,

    /// Monotonic save counter; `save` is a compare-and-swap against the
    /// version the writer last loaded.
    #[serde(default)]
    pub version: u64,
}

impl ProgressRecord {
    pub fn route_initialized(&self) -> bool {
        self.lifecycle != RouteLifecycle::NotStarted
    }

    pub fn route_completed(&self) -> bool {
        self.lifecycle == RouteLifecycle::Completed
    }

    /// First-ever mutation moves a fresh record into the active state.
    pub fn touch(&mut self) {
        if self.lifecycle == RouteLifecycle::NotStarted {
            self.lifecycle = RouteLifecycle::Active;
        }
    }

    /// Clear progress for a new route. The lifetime completed-routes
    /// counter lives under its own key and is untouched by this.
    /// The version is kept so compare-and-swap stays monotonic across
    /// the reset.
    pub fn reset(&mut self) {
        self.completed.clear();
        self.evidence.clear();
        self.lifecycle = RouteLifecycle::NotStarted;
    }
}
