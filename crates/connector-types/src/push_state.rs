use chrono::{DateTime, Utc};

/// Which enumeration mode a push run belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PushKind {
    Full,
    Incremental,
}

/// How the most recent run of a given kind ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Interruption,
    Failure,
}

/// Bookkeeping for one push kind (full or incremental). `current_start`
/// is `None` while idle; setting it while already `Some` is a
/// programming error enforced by the journal that owns this state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PushRunState {
    pub current_start: Option<DateTime<Utc>>,
    pub last_successful_start: Option<DateTime<Utc>>,
    pub last_successful_end: Option<DateTime<Utc>>,
    pub last_status: Option<CompletionStatus>,
}

impl PushRunState {
    pub fn is_active(&self) -> bool {
        self.current_start.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idle_state_has_no_current_start() {
        let state = PushRunState::default();
        assert!(!state.is_active());
        assert!(state.last_status.is_none());
    }
}
