use longship_pipeline::{ProgressSnapshot, SyncReport};
use uuid::Uuid;

pub type RunId = Uuid;

/// What the presentation layer hears from a running update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    Started {
        run_id: RunId,
    },
    /// Coalesced progress. Read [`crate::UpdateController::progress`] for the live value.
    Progress(ProgressSnapshot),
    /// The server is rescanning; the cycle waits and tries again.
    Retrying {
        attempt: u32,
        max_attempts: u32,
    },
    /// Success with counters, or the reason shown next to "update failed".
    Finished(Result<SyncReport, String>),
    /// The user stopped the cycle. Not a failure.
    Cancelled,
    /// Announcement text to show, `None` hides the panel.
    Announcement(Option<String>),
}

impl UpdateEvent {
    /// True for the last event of a cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateEvent::Finished(_) | UpdateEvent::Cancelled)
    }
}
