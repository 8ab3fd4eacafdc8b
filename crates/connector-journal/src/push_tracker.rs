use chrono::Utc;
use connector_types::{CompletionStatus, PushKind, PushRunState};
use parking_lot::Mutex;

/// Bookkeeping for full and incremental push runs. Enforces the
/// at-most-one-active-run-per-kind invariant from the data model: the
/// caller starting a second concurrent run of the same kind is a
/// programming error.
#[derive(Default)]
pub struct PushTracker {
    full: Mutex<PushRunState>,
    incremental: Mutex<PushRunState>,
    most_recent: Mutex<Option<(PushKind, CompletionStatus)>>,
}

impl PushTracker {
    fn state_for(&self, kind: PushKind) -> &Mutex<PushRunState> {
        match kind {
            PushKind::Full => &self.full,
            PushKind::Incremental => &self.incremental,
        }
    }

    pub fn start_run(&self, kind: PushKind) {
        let mut state = self.state_for(kind).lock();
        assert!(
            state.current_start.is_none(),
            "starting a {kind:?} push while one is already running"
        );
        state.current_start = Some(Utc::now());
    }

    pub fn finish_run(&self, kind: PushKind, status: CompletionStatus) {
        let mut state = self.state_for(kind).lock();
        let start = state.current_start.take();
        if status == CompletionStatus::Success {
            state.last_successful_start = start;
            state.last_successful_end = Some(Utc::now());
        }
        state.last_status = Some(status);
        *self.most_recent.lock() = Some((kind, status));
    }

    pub fn snapshot(&self, kind: PushKind) -> PushRunState {
        self.state_for(kind).lock().clone()
    }

    pub fn most_recent_status(&self) -> Option<(PushKind, CompletionStatus)> {
        *self.most_recent.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracks_last_successful_window() {
        let tracker = PushTracker::default();
        tracker.start_run(PushKind::Full);
        assert!(tracker.snapshot(PushKind::Full).is_active());
        tracker.finish_run(PushKind::Full, CompletionStatus::Success);

        let state = tracker.snapshot(PushKind::Full);
        assert!(!state.is_active());
        assert!(state.last_successful_start.is_some());
        assert!(state.last_successful_end.is_some());
        assert_eq!(tracker.most_recent_status(), Some((PushKind::Full, CompletionStatus::Success)));
    }

    #[test]
    #[should_panic(expected = "while one is already running")]
    fn starting_while_active_is_a_programming_error() {
        let tracker = PushTracker::default();
        tracker.start_run(PushKind::Incremental);
        tracker.start_run(PushKind::Incremental);
    }

    #[test]
    fn failed_run_does_not_update_last_successful() {
        let tracker = PushTracker::default();
        tracker.start_run(PushKind::Incremental);
        tracker.finish_run(PushKind::Incremental, CompletionStatus::Failure);
        let state = tracker.snapshot(PushKind::Incremental);
        assert!(state.last_successful_start.is_none());
        assert_eq!(state.last_status, Some(CompletionStatus::Failure));
    }
}
