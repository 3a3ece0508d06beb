//! Sync layer - the persistence and reconciliation contract
//!
//! Independent consumers (several UI surfaces, potentially several
//! processes over the same database) share nothing but the key-value
//! store. `RouteStore` owns the stored layout for one identity:
//!
//! ```text
//! progress:<identity>                 full ProgressRecord (JSON)
//! pendingTask:<identity>              denormalized pending-task projection
//! lifetimeCompletedRoutes:<identity>  monotonic counter
//! ```
//!
//! Saves are whole-record compare-and-swap keyed on the record version;
//! a writer that lost the race gets `VersionConflict` and must reload
//! and reapply its mutation. Every successful save republishes the
//! pending-task projection and emits a `ProgressChanged` event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{Activity, ActivityCatalog};
use crate::engine::ProgressEngine;
use crate::error::RouteError;
use crate::events::{EventBus, RouteEvent};
use crate::record::{ProgressRecord, RouteLifecycle};
use crate::store::KvStore;

/// Stored key layout, one namespace per identity.
pub mod keys {
    pub fn progress(identity: &str) -> String {
        format!("progress:{identity}")
    }

    pub fn pending_task(identity: &str) -> String {
        format!("pendingTask:{identity}")
    }

    pub fn lifetime_completed_routes(identity: &str) -> String {
        format!("lifetimeCompletedRoutes:{identity}")
    }
}

/// Denormalized "current pending task" projection. Exists so summary
/// surfaces can render without the full catalog or record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTaskSummary {
    pub id: u32,
    pub title: String,
    pub deadline: String,
    pub mandatory: bool,
}

impl From<&Activity> for PendingTaskSummary {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id,
            title: activity.title.clone(),
            deadline: activity.deadline.clone(),
            mandatory: activity.mandatory,
        }
    }
}

/// Fully derived snapshot for one identity. Consumers replace this
/// wholesale on every reconcile; it is never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteView {
    pub lifecycle: RouteLifecycle,
    pub progress_percent: u8,
    pub mandatory_done: usize,
    pub mandatory_total: usize,
    pub pending_task: Option<PendingTaskSummary>,
    pub next_activity_id: Option<u32>,
    pub lifetime_completed_routes: u64,
    pub version: u64,
}

/// Persistence facade over the key-value store for route progress.
pub struct RouteStore {
    store: Arc<dyn KvStore>,
    catalog: Arc<ActivityCatalog>,
    events: Arc<EventBus>,
}

impl RouteStore {
    pub fn new(store: Arc<dyn KvStore>, catalog: Arc<ActivityCatalog>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            catalog,
            events,
        }
    }

    pub fn catalog(&self) -> &ActivityCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribe to best-effort changed-key notifications from the
    /// underlying store.
    pub fn watch_store(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.store.watch()
    }

    /// Load the progress record for an identity. Absent records yield
    /// the all-defaults record; a corrupt stored record is treated as
    /// absent rather than crashing the consumer, since the store has no
    /// schema enforcement.
    pub fn load(&self, identity: &str) -> Result<ProgressRecord, RouteError> {
        match self.store.get(&keys::progress(identity))? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(record) => Ok(record),
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Corrupt progress record, using defaults");
                    Ok(ProgressRecord::default())
                }
            },
            None => Ok(ProgressRecord::default()),
        }
    }

    /// Persist the record via whole-record compare-and-swap.
    ///
    /// The caller's record must carry the version it loaded; on success
    /// the record's version is bumped in place. On `VersionConflict`
    /// nothing was written and the caller must reload and reapply.
    pub fn save(&self, identity: &str, record: &mut ProgressRecord) -> Result<(), RouteError> {
        let key = keys::progress(identity);
        let current_raw = self.store.get(&key)?;

        // A parseable stored record must still be at the version the
        // caller loaded; a corrupt one is overwritten like an absent one.
        if let Some(raw) = &current_raw {
            if let Ok(stored) = serde_json::from_str::<ProgressRecord>(raw) {
                if stored.version != record.version {
                    return Err(RouteError::VersionConflict {
                        identity: identity.to_string(),
                    });
                }
            }
        }

        let mut next = record.clone();
        next.version += 1;
        let new_raw = serde_json::to_string(&next)?;

        let swapped = self
            .store
            .compare_and_swap(&key, current_raw.as_deref(), Some(&new_raw))?;
        if !swapped {
            return Err(RouteError::VersionConflict {
                identity: identity.to_string(),
            });
        }

        *record = next;
        debug!(identity = %identity, version = record.version, "Progress record saved");

        self.publish_pending_task(identity, record)?;
        self.events.emit(RouteEvent::ProgressChanged {
            identity: identity.to_string(),
            version: record.version,
        });
        Ok(())
    }

    /// (Re)write the pending-task projection for a saved record, or
    /// remove the key when there is nothing to surface. A route that
    /// was never started publishes no projection.
    fn publish_pending_task(
        &self,
        identity: &str,
        record: &ProgressRecord,
    ) -> Result<(), RouteError> {
        let key = keys::pending_task(identity);
        if record.lifecycle == RouteLifecycle::NotStarted {
            return self.store.delete(&key);
        }

        let engine = ProgressEngine::new(&self.catalog, record);
        match engine.pending_task() {
            Some(activity) => {
                let summary = PendingTaskSummary::from(activity);
                self.store.set(&key, &serde_json::to_string(&summary)?)
            }
            None => self.store.delete(&key),
        }
    }

    /// Read the denormalized pending-task projection without touching
    /// the full record or catalog.
    pub fn pending_task(&self, identity: &str) -> Result<Option<PendingTaskSummary>, RouteError> {
        match self.store.get(&keys::pending_task(identity))? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(summary) => Ok(Some(summary)),
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Corrupt pending-task projection");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Lifetime completed-routes counter. Monotonically non-decreasing,
    /// preserved across route resets.
    pub fn lifetime_completed_routes(&self, identity: &str) -> Result<u64, RouteError> {
        let raw = self.store.get(&keys::lifetime_completed_routes(identity))?;
        Ok(raw
            .as_deref()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0))
    }

    /// Increment the lifetime counter by exactly one, retrying the
    /// compare-and-swap until the increment lands.
    pub fn increment_lifetime_completed_routes(&self, identity: &str) -> Result<u64, RouteError> {
        let key = keys::lifetime_completed_routes(identity);
        loop {
            let raw = self.store.get(&key)?;
            let current: u64 = raw
                .as_deref()
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0);
            let next = current + 1;
            if self
                .store
                .compare_and_swap(&key, raw.as_deref(), Some(&next.to_string()))?
            {
                debug!(identity = %identity, lifetime = next, "Lifetime counter incremented");
                return Ok(next);
            }
        }
    }

    /// Derive the full view for an identity from a fresh load.
    pub fn view(&self, identity: &str) -> Result<RouteView, RouteError> {
        let record = self.load(identity)?;
        let engine = ProgressEngine::new(&self.catalog, &record);
        let (mandatory_done, mandatory_total) = engine.mandatory_ratio();
        Ok(RouteView {
            lifecycle: record.lifecycle,
            progress_percent: engine.progress_percent(),
            mandatory_done,
            mandatory_total,
            pending_task: if record.route_initialized() {
                engine.pending_task().map(PendingTaskSummary::from)
            } else {
                None
            },
            next_activity_id: engine.next_unlocked_incomplete().map(|a| a.id),
            lifetime_completed_routes: self.lifetime_completed_routes(identity)?,
            version: record.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Activity, Phase};
    use crate::store::MemoryStore;

    fn test_store() -> RouteStore {
        let catalog = ActivityCatalog::new(vec![
            Activity::new(1, "uno", Phase::Before, true, "d1"),
            Activity::new(2, "dos", Phase::Before, false, "d2"),
            Activity::new(3, "tres", Phase::After, true, "d3"),
        ])
        .unwrap();
        RouteStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(catalog),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn absent_record_loads_as_defaults() {
        let store = test_store();
        let record = store.load("ana").unwrap();
        assert_eq!(record, ProgressRecord::default());
    }

    #[test]
    fn corrupt_record_loads_as_defaults() {
        let store = test_store();
        store.store.set(&keys::progress("ana"), "not json {").unwrap();
        let record = store.load("ana").unwrap();
        assert_eq!(record, ProgressRecord::default());
    }

    #[test]
    fn save_bumps_version_and_round_trips() {
        let store = test_store();
        let mut record = store.load("ana").unwrap();
        record.touch();
        record.completed.insert(1);
        store.save("ana", &mut record).unwrap();
        assert_eq!(record.version, 1);

        let loaded = store.load("ana").unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn stale_save_is_rejected() {
        let store = test_store();

        let mut writer_a = store.load("ana").unwrap();
        let mut writer_b = store.load("ana").unwrap();

        writer_a.touch();
        writer_a.completed.insert(1);
        store.save("ana", &mut writer_a).unwrap();

        writer_b.touch();
        writer_b.evidence.insert(
            1,
            crate::record::EvidenceRef {
                filename: "a.pdf".into(),
                extension: "pdf".into(),
                size_bytes: 10,
            },
        );
        let result = store.save("ana", &mut writer_b);
        assert!(matches!(result, Err(RouteError::VersionConflict { .. })));

        // The store still holds writer A's record
        let loaded = store.load("ana").unwrap();
        assert_eq!(loaded, writer_a);
    }

    #[test]
    fn pending_projection_tracks_saves() {
        let store = test_store();

        // Never-started route publishes no projection
        let mut record = store.load("ana").unwrap();
        store.save("ana", &mut record).unwrap();
        assert!(store.pending_task("ana").unwrap().is_none());

        record.touch();
        store.save("ana", &mut record).unwrap();
        let summary = store.pending_task("ana").unwrap().unwrap();
        assert_eq!(summary.id, 1);
        assert_eq!(summary.title, "uno");
        assert_eq!(summary.deadline, "d1");
        assert!(summary.mandatory);

        // Completing both mandatory steps removes the projection
        record.completed.insert(1);
        record.completed.insert(3);
        store.save("ana", &mut record).unwrap();
        assert!(store.pending_task("ana").unwrap().is_none());
    }

    #[test]
    fn lifetime_counter_is_monotonic_and_isolated() {
        let store = test_store();
        assert_eq!(store.lifetime_completed_routes("ana").unwrap(), 0);
        assert_eq!(store.increment_lifetime_completed_routes("ana").unwrap(), 1);
        assert_eq!(store.increment_lifetime_completed_routes("ana").unwrap(), 2);
        assert_eq!(store.lifetime_completed_routes("ana").unwrap(), 2);
        assert_eq!(store.lifetime_completed_routes("luis").unwrap(), 0);
    }

    #[tokio::test]
    async fn save_emits_progress_changed() {
        let store = test_store();
        let mut events = store.events().subscribe();

        let mut record = store.load("ana").unwrap();
        record.touch();
        store.save("ana", &mut record).unwrap();

        let event = events.recv().await.unwrap();
        match event {
            RouteEvent::ProgressChanged { identity, version } => {
                assert_eq!(identity, "ana");
                assert_eq!(version, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
