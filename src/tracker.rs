//! Route tracker - the mutating operations and the completion trigger
//!
//! One tracker per identity. Every mutation is a load-modify-save cycle
//! against the shared store; a save that loses the compare-and-swap race
//! is retried from a fresh load, so the mutation is reapplied rather
//! than clobbering another writer's update.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::Activity;
use crate::engine::ProgressEngine;
use crate::error::RouteError;
use crate::events::RouteEvent;
use crate::evidence::{self, EvidenceUpload};
use crate::record::{EvidenceRef, ProgressRecord, RouteLifecycle};
use crate::sync::{RouteStore, RouteView};

/// How many times a lost compare-and-swap is retried from a fresh load
/// before the conflict surfaces to the caller.
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// Result of a `mark_complete` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub activity_id: u32,
    /// True when the id was already completed and nothing changed.
    pub already_completed: bool,
    /// True when this call newly completed the whole route.
    pub route_completed: bool,
    pub lifetime_completed_routes: u64,
}

/// Mutating operations over one identity's route progress.
pub struct RouteTracker {
    store: Arc<RouteStore>,
    identity: String,
}

impl RouteTracker {
    pub fn new(store: Arc<RouteStore>, identity: impl Into<String>) -> Self {
        Self {
            store,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn store(&self) -> &Arc<RouteStore> {
        &self.store
    }

    /// Open an activity for viewing. Read-only: succeeds with the
    /// activity definition when unlocked, fails with `ActivityLocked`
    /// (and emits a blocked event for the UI notice) otherwise.
    pub fn open_activity(&self, activity_id: u32) -> Result<Activity, RouteError> {
        let record = self.store.load(&self.identity)?;
        let engine = ProgressEngine::new(self.store.catalog(), &record);
        if !engine.is_unlocked(activity_id)? {
            self.store.events().emit(RouteEvent::ActivityBlocked {
                identity: self.identity.clone(),
                activity_id,
            });
            return Err(RouteError::ActivityLocked(activity_id));
        }
        Ok(self.store.catalog().get(activity_id)?.clone())
    }

    /// Submit an evidence artifact for an activity.
    ///
    /// The gate validates format then size; a rejection leaves any
    /// previously accepted artifact untouched. Acceptance replaces the
    /// stored artifact for that id and counts as the route's first
    /// mutation if none happened before. Replacement stays allowed
    /// after the activity is completed; completion membership is never
    /// re-validated.
    pub fn submit_evidence(
        &self,
        activity_id: u32,
        upload: EvidenceUpload,
    ) -> Result<EvidenceRef, RouteError> {
        self.store.catalog().get(activity_id)?;
        let artifact = evidence::accept(upload)?;

        let stored = artifact.clone();
        self.mutate(move |record| {
            record.touch();
            record.evidence.insert(activity_id, stored.clone());
            Ok(true)
        })?;

        debug!(
            identity = %self.identity,
            activity = activity_id,
            filename = %artifact.filename,
            "Evidence accepted"
        );
        Ok(artifact)
    }

    /// Mark an activity complete.
    ///
    /// Preconditions: the activity is unlocked and has accepted
    /// evidence. An already-completed id is an idempotent no-op that
    /// never re-fires the completion trigger. When the mutation makes
    /// every mandatory activity complete, the route moves to
    /// `Completed`, the lifetime counter increments by exactly one and
    /// a one-shot congratulations event fires.
    pub fn mark_complete(&self, activity_id: u32) -> Result<CompletionOutcome, RouteError> {
        self.store.catalog().get(activity_id)?;

        let mut already_completed = false;
        let mut newly_completed_route = false;
        self.mutate(|record| {
            already_completed = false;
            newly_completed_route = false;
            let engine = ProgressEngine::new(self.store.catalog(), record);

            if engine.is_completed(activity_id)? {
                already_completed = true;
                return Ok(false);
            }
            if !engine.is_unlocked(activity_id)? {
                self.store.events().emit(RouteEvent::ActivityBlocked {
                    identity: self.identity.clone(),
                    activity_id,
                });
                return Err(RouteError::ActivityLocked(activity_id));
            }
            if !record.evidence.contains_key(&activity_id) {
                return Err(RouteError::NoEvidence(activity_id));
            }

            record.touch();
            record.completed.insert(activity_id);

            let engine = ProgressEngine::new(self.store.catalog(), record);
            if engine.mandatory_all_done() && record.lifecycle != RouteLifecycle::Completed {
                record.lifecycle = RouteLifecycle::Completed;
                newly_completed_route = true;
            }
            Ok(true)
        })?;

        if already_completed {
            // Idempotent no-op: nothing was written, nothing re-fires
            return Ok(CompletionOutcome {
                activity_id,
                already_completed: true,
                route_completed: false,
                lifetime_completed_routes: self.store.lifetime_completed_routes(&self.identity)?,
            });
        }

        self.store.events().emit(RouteEvent::ActivityCompleted {
            identity: self.identity.clone(),
            activity_id,
        });

        let lifetime = if newly_completed_route {
            let lifetime = self
                .store
                .increment_lifetime_completed_routes(&self.identity)?;
            info!(identity = %self.identity, lifetime = lifetime, "Route completed");
            self.store.events().emit(RouteEvent::RouteCompleted {
                identity: self.identity.clone(),
                lifetime_completed_routes: lifetime,
            });
            lifetime
        } else {
            self.store.lifetime_completed_routes(&self.identity)?
        };

        Ok(CompletionOutcome {
            activity_id,
            already_completed: false,
            route_completed: newly_completed_route,
            lifetime_completed_routes: lifetime,
        })
    }

    /// Start a new route: clear completed activities, evidence and
    /// lifecycle. The lifetime completed-routes counter is preserved.
    pub fn start_new_route(&self) -> Result<(), RouteError> {
        self.mutate(|record| {
            record.reset();
            Ok(true)
        })?;
        info!(identity = %self.identity, "Route reset for a new destination");
        Ok(())
    }

    /// Fresh derived view for this identity.
    pub fn view(&self) -> Result<RouteView, RouteError> {
        self.store.view(&self.identity)
    }

    /// Load-modify-save with compare-and-swap retry. The closure runs
    /// against a freshly loaded record on every attempt; returning
    /// `Ok(false)` short-circuits without writing.
    fn mutate(
        &self,
        mut apply: impl FnMut(&mut ProgressRecord) -> Result<bool, RouteError>,
    ) -> Result<(), RouteError> {
        for attempt in 0..MAX_SAVE_ATTEMPTS {
            let mut record = self.store.load(&self.identity)?;
            if !apply(&mut record)? {
                return Ok(());
            }
            match self.store.save(&self.identity, &mut record) {
                Ok(()) => return Ok(()),
                Err(RouteError::VersionConflict { .. }) if attempt + 1 < MAX_SAVE_ATTEMPTS => {
                    debug!(
                        identity = %self.identity,
                        attempt = attempt + 1,
                        "Save lost the race, reloading"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(RouteError::VersionConflict {
            identity: self.identity.clone(),
        })
    }
}
