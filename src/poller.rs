//! Reconcile loop for passive consumers
//!
//! Surfaces that only read progress (a home screen showing the pending
//! task, a rewards counter) do not share memory with the surface doing
//! the writes. Each one runs a `Reconciler`: re-load on a fixed
//! interval and on a store change notification, fully replace the
//! cached view, and emit `PendingTaskChanged` when the projection
//! actually differs. Notifications are best-effort; the interval is the
//! backstop for missed or coalesced signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::RouteError;
use crate::events::RouteEvent;
use crate::sync::{RouteStore, RouteView};

/// Default reconcile interval, matching the original surfaces' 1s poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Background reconciler for one identity.
pub struct Reconciler {
    state: Arc<RwLock<RouteView>>,
    handle: tokio::task::JoinHandle<()>,
}

impl Reconciler {
    /// Spawn the reconcile loop. The initial view is derived before the
    /// task starts so `latest` never observes a placeholder.
    pub fn spawn(
        store: Arc<RouteStore>,
        identity: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self, RouteError> {
        let identity = identity.into();
        let initial = store.view(&identity)?;
        let state = Arc::new(RwLock::new(initial));

        let task_state = state.clone();
        let handle = tokio::spawn(async move {
            run_reconcile_loop(store, identity, poll_interval, task_state).await;
        });

        Ok(Self { state, handle })
    }

    /// The most recently reconciled view. Always a full snapshot; the
    /// loop never patches fields in place.
    pub async fn latest(&self) -> RouteView {
        self.state.read().await.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_reconcile_loop(
    store: Arc<RouteStore>,
    identity: String,
    poll_interval: Duration,
    state: Arc<RwLock<RouteView>>,
) {
    let mut watch = store.watch_store();
    let mut ticker = tokio::time::interval(poll_interval);
    // The first tick fires immediately; that reload is harmless
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let key_suffix = format!(":{identity}");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = watch.recv() => {
                match changed {
                    // Only this identity's keys are interesting
                    Ok(key) if key.ends_with(&key_suffix) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        debug!(identity = %identity, skipped = n, "Change notifications lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        let fresh = match store.view(&identity) {
            Ok(view) => view,
            Err(err) => {
                warn!(identity = %identity, error = %err, "Reconcile load failed");
                continue;
            }
        };

        let mut current = state.write().await;
        if fresh.pending_task != current.pending_task {
            store.events().emit(RouteEvent::PendingTaskChanged {
                identity: identity.clone(),
                task: fresh.pending_task.clone(),
            });
        }
        // Replace wholesale, never patch
        *current = fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Activity, ActivityCatalog, Phase};
    use crate::events::EventBus;
    use crate::evidence::EvidenceUpload;
    use crate::record::RouteLifecycle;
    use crate::store::MemoryStore;
    use crate::tracker::RouteTracker;
    use tokio::time::timeout;

    fn route_store() -> Arc<RouteStore> {
        let catalog = ActivityCatalog::new(vec![
            Activity::new(1, "uno", Phase::Before, true, "d1"),
            Activity::new(2, "dos", Phase::After, true, "d2"),
        ])
        .unwrap();
        Arc::new(RouteStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(catalog),
            Arc::new(EventBus::new()),
        ))
    }

    #[tokio::test]
    async fn reconciler_picks_up_writes_from_another_consumer() {
        let store = route_store();
        let reconciler =
            Reconciler::spawn(store.clone(), "ana", Duration::from_millis(20)).unwrap();

        assert_eq!(reconciler.latest().await.lifecycle, RouteLifecycle::NotStarted);

        // A different consumer mutates through its own tracker
        let tracker = RouteTracker::new(store.clone(), "ana");
        tracker
            .submit_evidence(1, EvidenceUpload::from_filename("a.pdf", 100))
            .unwrap();
        tracker.mark_complete(1).unwrap();

        // The reconciler converges within a few polls
        let converged = timeout(Duration::from_secs(2), async {
            loop {
                let view = reconciler.latest().await;
                if view.mandatory_done == 1 {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reconciler did not converge");

        assert_eq!(converged.lifecycle, RouteLifecycle::Active);
        assert_eq!(converged.pending_task.as_ref().unwrap().id, 2);
        reconciler.stop();
    }

    #[tokio::test]
    async fn pending_task_change_is_broadcast_once_converged() {
        let store = route_store();
        let mut events = store.events().subscribe();
        let reconciler =
            Reconciler::spawn(store.clone(), "ana", Duration::from_millis(20)).unwrap();

        let tracker = RouteTracker::new(store.clone(), "ana");
        tracker
            .submit_evidence(1, EvidenceUpload::from_filename("a.pdf", 100))
            .unwrap();

        let observed = timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(RouteEvent::PendingTaskChanged { identity, task }) => {
                        return (identity, task);
                    }
                    Ok(_) => continue,
                    Err(err) => panic!("event stream closed: {err}"),
                }
            }
        })
        .await
        .expect("no pending-task event");

        assert_eq!(observed.0, "ana");
        assert_eq!(observed.1.unwrap().id, 1);
        reconciler.stop();
    }
}
