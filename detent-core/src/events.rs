// Run Events
// Progress events produced while a prepared batch runs

use crate::manifest::ManifestJob;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for run progress events
pub type ProgressSender = mpsc::UnboundedSender<RunEvent>;

/// Receiver for run progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// The job graph of the run, as decoded from the manifest marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEvent {
    pub jobs: Vec<ManifestJob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Start,
    Finish,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: String,
    pub action: JobAction,
    /// Set for `Finish`
    pub success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEvent {
    pub job_id: String,
    pub step_index: usize,
    pub step_name: String,
}

/// A structured error reported by an external log extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneEvent {
    pub error_count: usize,
    pub duration: Duration,
    pub exit_code: i32,
    pub errors: Option<Vec<ExtractedError>>,
    /// Set when the run was stopped by a cancellation request
    pub cancelled: bool,
}

impl DoneEvent {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}

/// Events emitted while a run is observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Manifest(ManifestEvent),
    Job(JobEvent),
    Step(StepEvent),
    /// A runner output line that is not a marker
    Output(String),
    Done(DoneEvent),
    Error(ErrorEvent),
}

impl RunEvent {
    pub fn manifest(jobs: Vec<ManifestJob>) -> Self {
        Self::Manifest(ManifestEvent { jobs })
    }

    pub fn job_started(job_id: impl Into<String>) -> Self {
        Self::Job(JobEvent {
            job_id: job_id.into(),
            action: JobAction::Start,
            success: None,
        })
    }

    pub fn job_finished(job_id: impl Into<String>, success: bool) -> Self {
        Self::Job(JobEvent {
            job_id: job_id.into(),
            action: JobAction::Finish,
            success: Some(success),
        })
    }

    pub fn job_skipped(job_id: impl Into<String>) -> Self {
        Self::Job(JobEvent {
            job_id: job_id.into(),
            action: JobAction::Skip,
            success: None,
        })
    }

    pub fn step_started(
        job_id: impl Into<String>,
        step_index: usize,
        step_name: impl Into<String>,
    ) -> Self {
        Self::Step(StepEvent {
            job_id: job_id.into(),
            step_index,
            step_name: step_name.into(),
        })
    }

    pub fn output(line: impl Into<String>) -> Self {
        Self::Output(line.into())
    }

    pub fn done(error_count: usize, duration: Duration, exit_code: i32) -> Self {
        Self::Done(DoneEvent {
            error_count,
            duration,
            exit_code,
            errors: None,
            cancelled: false,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorEvent {
            message: message.into(),
        })
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Done(_) | RunEvent::Error(_))
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: RunEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: RunEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: RunEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(RunEvent::job_started("build"));
        tx.send_event(RunEvent::step_started("build", 0, "checkout"));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            RunEvent::Job(JobEvent {
                action: JobAction::Start,
                ..
            })
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, RunEvent::Step(StepEvent { step_index: 0, .. })));
    }

    #[test]
    fn test_event_construction() {
        let RunEvent::Job(event) = RunEvent::job_finished("test", false) else {
            panic!("wrong event type");
        };
        assert_eq!(event.job_id, "test");
        assert_eq!(event.action, JobAction::Finish);
        assert_eq!(event.success, Some(false));

        let done = RunEvent::done(2, Duration::from_secs(30), 1);
        assert!(done.is_terminal());
        let RunEvent::Done(done) = done else {
            panic!("wrong event type");
        };
        assert!(done.has_errors());
        assert!(!done.cancelled);
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(RunEvent::output("test"));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(RunEvent::error("gone"));
    }
}
