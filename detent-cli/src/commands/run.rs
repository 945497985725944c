use super::{OverrideArgs, WorkflowArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use detent_core::runner::DEFAULT_RUNNER;
use detent_core::{
    progress_channel, JobAction, PreparedWorkflows, ProgressReceiver, RunEvent, Runner,
    RunnerConfig, RunnerHandle, WorkflowPreparer,
};
use detent_tui::{format_duration, JobStatus, RunOutcome, RunPhase, Tracker};

/// Run the workflows locally and follow them live
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Print events as lines instead of opening the live view
    #[arg(long)]
    pub plain: bool,

    /// Runner executable
    #[arg(long, value_name = "BIN", default_value = DEFAULT_RUNNER)]
    pub runner: String,

    /// Keep the instrumented directory after the run
    #[arg(long)]
    pub keep: bool,

    /// Extra arguments passed to the runner
    #[arg(last = true, value_name = "ARGS")]
    pub runner_args: Vec<String>,
}

/// Returns the exit code mirroring the run.
pub async fn execute(args: RunArgs) -> Result<i32> {
    let overrides = args.overrides.overrides();
    let options = args.workflow.options()?.with_overrides(overrides.clone());
    let repo = options.repo_root.clone();

    let prepared = WorkflowPreparer::new(options).prepare().await?;
    args.overrides.check_against(&prepared.manifest);
    output::status(
        "Prepared",
        &format!(
            "{} workflow(s), {} job(s)",
            prepared.files.len(),
            prepared.manifest.jobs.len()
        ),
    );

    let config = RunnerConfig::default()
        .with_program(args.runner.clone())
        .with_args(args.runner_args.clone())
        .with_working_dir(&repo)
        .with_skipped(overrides.skipped());
    let (tx, rx) = progress_channel();
    let handle = Runner::new(config).spawn(prepared.path().to_path_buf(), tx);

    let outcome = if args.plain {
        follow_plain(rx, handle).await?
    } else {
        let title = repo
            .file_name()
            .map(|name| format!("detent · {}", name.to_string_lossy()))
            .unwrap_or_else(|| "detent".to_string());
        detent_tui::run(title, rx, handle).await?
    };

    report(&outcome);
    finish(prepared, args.keep);
    Ok(outcome.exit_code())
}

fn finish(prepared: PreparedWorkflows, keep: bool) {
    if keep {
        let dir = prepared.keep();
        output::info(&format!("Instrumented workflows kept in {}", dir.display()));
    } else if let Err(e) = prepared.cleanup() {
        output::warning(&format!("Failed to remove the instrumented workflows: {}", e));
    }
}

/// Follow the run on plain stderr/stdout lines.
///
/// The first Ctrl-C cancels the runner and keeps following until it has
/// cleaned up; a second one stops waiting.
async fn follow_plain(mut receiver: ProgressReceiver, runner: RunnerHandle) -> Result<RunOutcome> {
    let mut tracker = Tracker::new();
    let mut forced = false;

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Some(event) = event else { break };
                print_event(&tracker, &event);
                tracker.apply(event);
                if tracker.is_finished() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if runner.is_cancelled() {
                    output::warning("Not waiting for the runner to stop");
                    runner.abort();
                    forced = true;
                    break;
                }
                output::warning("Stopping the runner (press Ctrl-C again to quit now)");
                runner.cancel();
            }
        }
    }
    runner.wait().await;

    let (done, error) = match tracker.phase() {
        RunPhase::Finished(done) => (Some(done.clone()), None),
        RunPhase::Failed(message) => (None, Some(message.clone())),
        RunPhase::Waiting | RunPhase::Running => (None, None),
    };
    Ok(RunOutcome {
        done,
        error,
        forced,
        jobs: tracker.jobs().to_vec(),
    })
}

fn print_event(tracker: &Tracker, event: &RunEvent) {
    let name = |id: &str| {
        tracker
            .job(id)
            .map(|job| job.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    match event {
        RunEvent::Manifest(manifest) => {
            // only the first manifest counts
            if !tracker.jobs().is_empty() {
                return;
            }
            output::header(&format!("Running {} job(s)", manifest.jobs.len()));
            for job in manifest.jobs.iter().filter(|job| job.sensitive) {
                output::warning(&format!("'{}' looks sensitive", job.name));
            }
        }
        RunEvent::Job(job) => match (job.action, job.success) {
            (JobAction::Start, _) => output::status("Started", &name(&job.job_id)),
            (JobAction::Finish, Some(true)) => output::success(&name(&job.job_id)),
            (JobAction::Finish, _) => output::failure(&name(&job.job_id)),
            (JobAction::Skip, _) => output::dim(&format!("  {} skipped", name(&job.job_id))),
        },
        RunEvent::Step(step) => output::dim(&format!(
            "    {} › {}",
            name(&step.job_id),
            step.step_name
        )),
        RunEvent::Output(line) => output::step_output(line),
        RunEvent::Done(_) | RunEvent::Error(_) => {}
    }
}

fn report(outcome: &RunOutcome) {
    let count = |status: JobStatus| outcome.jobs.iter().filter(|j| j.status == status).count();
    let summary = format!(
        "{} succeeded, {} failed, {} skipped",
        count(JobStatus::Success),
        count(JobStatus::Failed),
        count(JobStatus::Skipped) + count(JobStatus::SkippedSecurity)
    );

    eprintln!();
    match (&outcome.done, &outcome.error) {
        (_, Some(message)) => output::error(message),
        (Some(done), None) if done.cancelled => output::warning(&format!(
            "Run cancelled after {} ({})",
            format_duration(done.duration),
            summary
        )),
        (Some(done), None) if done.has_errors() => output::failure(&format!(
            "Run failed after {} with exit code {} ({})",
            format_duration(done.duration),
            done.exit_code,
            summary
        )),
        (Some(done), None) => output::success(&format!(
            "Run completed in {} ({})",
            format_duration(done.duration),
            summary
        )),
        (None, None) => output::warning("Quit before the runner finished"),
    }
}
