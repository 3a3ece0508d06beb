//! Progress engine - pure derivations over a catalog and a record snapshot
//!
//! Everything here is a read-only function of `(ActivityCatalog,
//! ProgressRecord)`. Consumers re-derive these views wholesale on every
//! reload; none of them may be patched incrementally.

use crate::catalog::{Activity, ActivityCatalog, Phase};
use crate::error::RouteError;
use crate::record::ProgressRecord;

/// Pure view derivations over a progress snapshot.
pub struct ProgressEngine<'a> {
    catalog: &'a ActivityCatalog,
    record: &'a ProgressRecord,
}

impl<'a> ProgressEngine<'a> {
    pub fn new(catalog: &'a ActivityCatalog, record: &'a ProgressRecord) -> Self {
        Self { catalog, record }
    }

    /// An activity is unlocked iff it is first in the catalog or its
    /// predecessor is completed. The catalog is strictly linear; there
    /// is no dependency DAG.
    pub fn is_unlocked(&self, id: u32) -> Result<bool, RouteError> {
        let position = self.catalog.position(id)?;
        if position == 0 {
            return Ok(true);
        }
        let previous = &self.catalog.activities()[position - 1];
        Ok(self.record.completed.contains(&previous.id))
    }

    pub fn is_completed(&self, id: u32) -> Result<bool, RouteError> {
        self.catalog.get(id)?;
        Ok(self.record.completed.contains(&id))
    }

    /// Overall progress across all activities, mandatory and optional,
    /// rounded to the nearest whole percent.
    pub fn progress_percent(&self) -> u8 {
        let total = self.catalog.len();
        if total == 0 {
            return 0;
        }
        let done = self
            .catalog
            .iter()
            .filter(|a| self.record.completed.contains(&a.id))
            .count();
        (100.0 * done as f64 / total as f64).round() as u8
    }

    /// "X of Y required steps": counts mandatory activities only, in
    /// both numerator and denominator.
    pub fn mandatory_ratio(&self) -> (usize, usize) {
        let mandatory: Vec<&Activity> = self.catalog.iter().filter(|a| a.mandatory).collect();
        let done = mandatory
            .iter()
            .filter(|a| self.record.completed.contains(&a.id))
            .count();
        (done, mandatory.len())
    }

    /// Completed/total counts for one phase of the route.
    pub fn phase_ratio(&self, phase: Phase) -> (usize, usize) {
        let in_phase: Vec<&Activity> = self.catalog.iter().filter(|a| a.phase == phase).collect();
        let done = in_phase
            .iter()
            .filter(|a| self.record.completed.contains(&a.id))
            .count();
        (done, in_phase.len())
    }

    /// True iff every mandatory activity is completed.
    pub fn mandatory_all_done(&self) -> bool {
        self.catalog
            .iter()
            .filter(|a| a.mandatory)
            .all(|a| self.record.completed.contains(&a.id))
    }

    /// The lowest-id mandatory activity not yet completed, or `None`
    /// when all mandatory steps are done. A fresh, never-initialized
    /// record also yields the first mandatory step here; callers that
    /// must distinguish "never started" consult the record lifecycle.
    pub fn pending_task(&self) -> Option<&'a Activity> {
        self.catalog
            .iter()
            .find(|a| a.mandatory && !self.record.completed.contains(&a.id))
    }

    /// The lowest-id activity that is simultaneously unlocked and not
    /// completed, regardless of mandatory flag. This is the "current"
    /// step a UI highlights.
    pub fn next_unlocked_incomplete(&self) -> Option<&'a Activity> {
        let mut previous_done = true;
        for activity in self.catalog.iter() {
            let done = self.record.completed.contains(&activity.id);
            if !done && previous_done {
                return Some(activity);
            }
            previous_done = done;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Activity;

    fn catalog_of(ids: &[(u32, bool)]) -> ActivityCatalog {
        ActivityCatalog::new(
            ids.iter()
                .map(|(id, mandatory)| {
                    Activity::new(*id, format!("step {id}"), Phase::Before, *mandatory, "")
                })
                .collect(),
        )
        .unwrap()
    }

    fn record_with(completed: &[u32]) -> ProgressRecord {
        let mut record = ProgressRecord::default();
        for id in completed {
            record.completed.insert(*id);
        }
        if !completed.is_empty() {
            record.touch();
        }
        record
    }

    #[test]
    fn first_activity_is_always_unlocked() {
        let catalog = catalog_of(&[(1, true), (2, true)]);
        let record = ProgressRecord::default();
        let engine = ProgressEngine::new(&catalog, &record);
        assert!(engine.is_unlocked(1).unwrap());
        assert!(!engine.is_unlocked(2).unwrap());
    }

    #[test]
    fn unlock_follows_predecessor_completion() {
        let catalog = catalog_of(&[(1, true), (2, true), (3, true), (4, true), (5, true)]);
        let record = record_with(&[1, 2]);
        let engine = ProgressEngine::new(&catalog, &record);

        assert!(engine.is_unlocked(3).unwrap());
        assert!(!engine.is_unlocked(4).unwrap());
        assert!(!engine.is_unlocked(5).unwrap());
    }

    #[test]
    fn unknown_ids_fail_fast() {
        let catalog = catalog_of(&[(1, true)]);
        let record = ProgressRecord::default();
        let engine = ProgressEngine::new(&catalog, &record);
        assert!(matches!(
            engine.is_unlocked(9),
            Err(RouteError::UnknownActivity(9))
        ));
        assert!(matches!(
            engine.is_completed(9),
            Err(RouteError::UnknownActivity(9))
        ));
    }

    #[test]
    fn progress_percent_counts_all_activities() {
        // 4 mandatory + 2 optional; all mandatory done
        let catalog = catalog_of(&[
            (1, true),
            (2, true),
            (3, false),
            (4, true),
            (5, true),
            (6, false),
        ]);
        let record = record_with(&[1, 2, 4, 5]);
        let engine = ProgressEngine::new(&catalog, &record);

        assert_eq!(engine.progress_percent(), 67); // round(100 * 4/6)
        assert_eq!(engine.mandatory_ratio(), (4, 4));
        assert!(engine.mandatory_all_done());
    }

    #[test]
    fn pending_task_is_lowest_incomplete_mandatory() {
        let catalog = catalog_of(&[(1, true), (2, false), (3, true), (4, false), (5, true)]);

        let record = record_with(&[1]);
        let engine = ProgressEngine::new(&catalog, &record);
        assert_eq!(engine.pending_task().unwrap().id, 3);

        let record = record_with(&[1, 3, 5]);
        let engine = ProgressEngine::new(&catalog, &record);
        assert!(engine.pending_task().is_none());
    }

    #[test]
    fn next_unlocked_incomplete_ignores_mandatory_flag() {
        let catalog = catalog_of(&[(1, true), (2, false), (3, true)]);
        let record = record_with(&[1]);
        let engine = ProgressEngine::new(&catalog, &record);
        assert_eq!(engine.next_unlocked_incomplete().unwrap().id, 2);

        let record = record_with(&[1, 2, 3]);
        let engine = ProgressEngine::new(&catalog, &record);
        assert!(engine.next_unlocked_incomplete().is_none());
    }

    #[test]
    fn phase_ratio_counts_only_that_phase() {
        let catalog = ActivityCatalog::new(vec![
            Activity::new(1, "a", Phase::Before, true, ""),
            Activity::new(2, "b", Phase::During, true, ""),
            Activity::new(3, "c", Phase::During, false, ""),
            Activity::new(4, "d", Phase::After, true, ""),
        ])
        .unwrap();
        let record = record_with(&[1, 2]);
        let engine = ProgressEngine::new(&catalog, &record);

        assert_eq!(engine.phase_ratio(Phase::Before), (1, 1));
        assert_eq!(engine.phase_ratio(Phase::During), (1, 2));
        assert_eq!(engine.phase_ratio(Phase::After), (0, 1));
    }

    #[test]
    fn empty_catalog_has_zero_percent() {
        let catalog = ActivityCatalog::new(vec![]).unwrap();
        let record = ProgressRecord::default();
        let engine = ProgressEngine::new(&catalog, &record);
        assert_eq!(engine.progress_percent(), 0);
        assert!(engine.mandatory_all_done());
    }
}
