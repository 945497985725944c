// Detent TUI
// Live run tracking and the terminal view over it

mod app;
mod events;
pub mod tracker;
mod ui;

pub use app::{App, RunOutcome, DEFAULT_EXIT_GRACE};
pub use tracker::{JobStatus, RunPhase, StepStatus, TrackedJob, TrackedStep, Tracker};
pub use ui::components::format_duration;

use color_eyre::Result;
use detent_core::{ProgressReceiver, RunnerHandle};

/// Run the live view until the run ends (plus a short grace period) or the
/// user forces an exit. The terminal is restored either way.
pub async fn run(
    title: impl Into<String>,
    receiver: ProgressReceiver,
    runner: RunnerHandle,
) -> Result<RunOutcome> {
    let terminal = ratatui::init();
    let result = App::new(title, receiver, runner).run(terminal).await;
    ratatui::restore();
    result
}
