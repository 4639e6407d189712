use tokio::sync::mpsc::UnboundedSender;

use super::session::UploadSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Quiescent, but some items failed. The session stays stored so the
    /// failed items can be resumed.
    CompletedWithFailures,
    Cancelled,
}

/// Progress notifications published while a run is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Preparing { pending: usize, total: usize },
    ItemCompleted { path: String, completed: usize, total: usize },
    /// `retryable` failures are worth a resume; the others need user action.
    ItemFailed { path: String, error: String, retryable: bool },
    Speed { bytes_per_sec: u64, label: String },
    Finished(RunOutcome),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub uploaded: usize,
    pub failed: usize,
    pub final_limit: usize,
    pub session: UploadSession,
}

/// Optional event sender. A closed receiver is ignored; notifications never
/// affect the run.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<UnboundedSender<UploadEvent>>);

impl EventSink {
    pub(crate) fn new(sender: Option<UnboundedSender<UploadEvent>>) -> Self {
        Self(sender)
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}
