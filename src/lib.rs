//! Mobility Route - progress tracking core for student mobility routes
//!
//! Tracks a user's progression through a fixed, ordered sequence of
//! mandatory and optional mobility activities, gates each step on
//! completion of its predecessor, and keeps several independent UI
//! surfaces consistent through a shared key-value store.
//!
//! ## Architecture
//!
//! ```text
//! RouteTracker (per identity, mutations)
//!     │  load / CAS save
//!     ▼
//! RouteStore ──► KvStore (sled or in-memory)
//!     │              │
//!     │ publishes    │ changed-key watch
//!     ▼              ▼
//! EventBus ◄──── Reconciler (per passive surface, 1s poll)
//! ```
//!
//! ## Stored layout (one namespace per identity)
//!
//! ```text
//! progress:<identity>                 full progress record (JSON)
//! pendingTask:<identity>              denormalized pending-task summary
//! lifetimeCompletedRoutes:<identity>  monotonic counter
//! ```
//!
//! The store is the single source of truth: every derived view is a
//! pure function of its contents, and consumers replace derived state
//! wholesale on every reload. Saves are whole-record compare-and-swap;
//! writers that lose the race reload and reapply.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod evidence;
pub mod poller;
pub mod record;
pub mod store;
pub mod sync;
pub mod tracker;

// Re-exports
pub use catalog::{Activity, ActivityCatalog, Phase};
pub use config::Config;
pub use engine::ProgressEngine;
pub use error::{EvidenceRejection, RouteError};
pub use events::{EventBus, RouteEvent};
pub use evidence::{EvidenceUpload, MAX_EVIDENCE_BYTES};
pub use poller::{Reconciler, DEFAULT_POLL_INTERVAL};
pub use record::{EvidenceRef, ProgressRecord, RouteLifecycle};
pub use store::{KvStore, MemoryStore, SledStore};
pub use sync::{PendingTaskSummary, RouteStore, RouteView};
pub use tracker::{CompletionOutcome, RouteTracker};
