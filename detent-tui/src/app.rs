use crate::events::EventHandler;
use crate::tracker::{RunPhase, TrackedJob, Tracker};
use crate::ui;

use color_eyre::Result;
use ratatui::DefaultTerminal;

use std::time::{Duration, Instant};

use detent_core::{DoneEvent, ProgressReceiver, RunnerHandle};
use tracing::{debug, info};

/// How long the final state stays on screen after the run ends.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(1500);

/// How the interactive run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub done: Option<DoneEvent>,
    pub error: Option<String>,
    /// Quit before the runner finished cleaning up
    pub forced: bool,
    pub jobs: Vec<TrackedJob>,
}

impl RunOutcome {
    /// Process exit code mirroring the run.
    pub fn exit_code(&self) -> i32 {
        match (&self.done, &self.error) {
            (_, Some(_)) => 1,
            (Some(done), None) if done.cancelled => 130,
            (Some(done), None) if done.has_errors() => done.exit_code.max(1),
            (Some(_), None) => 0,
            (None, None) => 130,
        }
    }
}

pub struct App {
    title: String,
    tracker: Tracker,
    receiver: ProgressReceiver,
    runner: RunnerHandle,
    interrupts: u8,
    exit_grace: Duration,
    exit_at: Option<Instant>,
    forced: bool,
    should_quit: bool,
}

impl App {
    pub fn new(title: impl Into<String>, receiver: ProgressReceiver, runner: RunnerHandle) -> Self {
        Self {
            title: title.into(),
            tracker: Tracker::new(),
            receiver,
            runner,
            interrupts: 0,
            exit_grace: DEFAULT_EXIT_GRACE,
            exit_at: None,
            forced: false,
            should_quit: false,
        }
    }

    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    pub async fn run(mut self, mut terminal: DefaultTerminal) -> Result<RunOutcome> {
        while !self.should_quit {
            terminal.draw(|frame| ui::render(&self, frame))?;
            self.handle_events()?;
            self.process_run_events();
            self.check_exit_grace();
        }
        Ok(self.into_outcome())
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn footer_hint(&self) -> &'static str {
        if self.tracker.is_finished() {
            "q/Esc: Quit"
        } else if self.interrupts > 0 {
            "Stopping runner... | q/Esc/Ctrl-C again: Force quit"
        } else {
            "q/Esc/Ctrl-C: Stop run"
        }
    }

    /// Drain everything the runner sent since the last frame.
    pub fn process_run_events(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.tracker.apply(event);
        }

        if self.tracker.is_finished() && self.exit_at.is_none() {
            debug!("run finished, starting exit grace period");
            self.exit_at = Some(Instant::now() + self.exit_grace);
        }
    }

    fn check_exit_grace(&mut self) {
        if self.exit_at.is_some_and(|at| Instant::now() >= at) {
            self.quit();
        }
    }

    /// Quit key handling: cancel first, force on the second press.
    pub fn interrupt(&mut self) {
        if self.tracker.is_finished() {
            self.quit();
            return;
        }

        self.interrupts = self.interrupts.saturating_add(1);
        if self.interrupts == 1 {
            info!("cancellation requested");
            self.runner.cancel();
        } else {
            info!("forced quit");
            self.runner.abort();
            self.forced = true;
            self.quit();
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub(crate) fn into_outcome(self) -> RunOutcome {
        let (done, error) = match self.tracker.phase() {
            RunPhase::Finished(done) => (Some(done.clone()), None),
            RunPhase::Failed(message) => (None, Some(message.clone())),
            RunPhase::Waiting | RunPhase::Running => (None, None),
        };
        RunOutcome {
            done,
            error,
            forced: self.forced,
            jobs: self.tracker.jobs().to_vec(),
        }
    }
}
