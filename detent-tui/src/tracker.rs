// Live Execution Tracker
// Rebuilds per-job and per-step state from the run event stream

use detent_core::{
    DependencyGraph, DoneEvent, JobAction, JobEvent, ManifestJob, RunEvent, StepEvent,
};

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Output lines kept for the output panel.
const OUTPUT_TAIL: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    /// Predicted not to run because the job is sensitive
    SkippedSecurity,
}

impl JobStatus {
    /// Whether later start and step events are ignored for the job.
    pub fn is_final(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Skipped)
    }

    pub fn is_done(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TrackedStep {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub reusable: bool,
    pub sensitive: bool,
    pub steps: Vec<TrackedStep>,
    pub active_step: Option<usize>,
    pub needs: Vec<String>,
    pub depth: usize,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TrackedJob {
    fn from_manifest(job: ManifestJob, depth: usize) -> Self {
        let (status, step_status) = if job.sensitive {
            (JobStatus::SkippedSecurity, StepStatus::Skipped)
        } else {
            (JobStatus::Pending, StepStatus::Pending)
        };

        let reusable = job.is_reusable();
        let steps = job
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, name)| TrackedStep {
                index,
                name,
                status: step_status,
            })
            .collect();

        Self {
            id: job.id,
            name: job.name,
            status,
            reusable,
            sensitive: job.sensitive,
            steps,
            active_step: None,
            needs: job.needs,
            depth,
            started_at: None,
            finished_at: None,
        }
    }

    /// Name of the step currently running, if any.
    pub fn active_step_name(&self) -> Option<&str> {
        self.active_step
            .and_then(|i| self.steps.get(i))
            .filter(|step| step.status == StepStatus::Running)
            .map(|step| step.name.as_str())
    }

    /// Time spent running, up to now for a running job.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.finished_at.unwrap_or(now).saturating_duration_since(started))
    }

    fn start(&mut self, now: Instant) {
        // A sensitive job that shows up in the stream did run after all
        if self.status == JobStatus::SkippedSecurity {
            for step in &mut self.steps {
                step.status = StepStatus::Pending;
            }
        }
        if matches!(self.status, JobStatus::Pending | JobStatus::SkippedSecurity) {
            self.status = JobStatus::Running;
            self.started_at.get_or_insert(now);
        }
    }

    fn finish(&mut self, success: bool, now: Instant) {
        for step in &mut self.steps {
            step.status = match (step.status, success) {
                (StepStatus::Running | StepStatus::Pending, true) => StepStatus::Success,
                (StepStatus::Running, false) => StepStatus::Failed,
                (StepStatus::Pending, false) => StepStatus::Cancelled,
                (other, _) => other,
            };
        }
        self.active_step = None;
        self.status = if success {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        self.finished_at = Some(now);
    }

    fn skip(&mut self, now: Instant) {
        for step in &mut self.steps {
            step.status = StepStatus::Skipped;
        }
        self.active_step = None;
        self.status = if self.sensitive {
            JobStatus::SkippedSecurity
        } else {
            JobStatus::Skipped
        };
        self.finished_at.get_or_insert(now);
    }

    fn cancel(&mut self, now: Instant) {
        for step in &mut self.steps {
            step.status = StepStatus::Cancelled;
        }
        self.active_step = None;
        self.status = JobStatus::Failed;
        self.finished_at = Some(now);
    }
}

/// Overall state of the observed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// No manifest yet
    Waiting,
    Running,
    Finished(DoneEvent),
    /// Fatal error; jobs keep whatever state they had
    Failed(String),
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Finished(_) | RunPhase::Failed(_))
    }
}

/// Consumer-side state machine over [`RunEvent`]s.
///
/// Events are applied in arrival order. Events for unknown jobs or steps
/// are dropped one by one, and nothing is applied after the run ended.
#[derive(Debug)]
pub struct Tracker {
    jobs: Vec<TrackedJob>,
    index: HashMap<String, usize>,
    phase: RunPhase,
    current_step: Option<String>,
    output: VecDeque<String>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            index: HashMap::new(),
            phase: RunPhase::Waiting,
            current_step: None,
            output: VecDeque::new(),
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    pub fn jobs(&self) -> &[TrackedJob] {
        &self.jobs
    }

    pub fn job(&self, id: &str) -> Option<&TrackedJob> {
        self.index.get(id).map(|&i| &self.jobs[i])
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// "job › step" label of the most recently started step.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn output(&self) -> impl Iterator<Item = &String> {
        self.output.iter()
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started_at)
    }

    /// Jobs that reached a terminal state, and the total.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.jobs.iter().filter(|j| j.status.is_done()).count();
        (done, self.jobs.len())
    }

    /// Apply one event. Returns whether any state changed.
    pub fn apply(&mut self, event: RunEvent) -> bool {
        self.apply_at(event, Instant::now())
    }

    fn apply_at(&mut self, event: RunEvent, now: Instant) -> bool {
        if self.phase.is_terminal() {
            return false;
        }

        match event {
            RunEvent::Manifest(manifest) => self.on_manifest(manifest.jobs),
            RunEvent::Job(event) => self.on_job(event, now),
            RunEvent::Step(event) => self.on_step(event, now),
            RunEvent::Output(line) => {
                if self.output.len() == OUTPUT_TAIL {
                    self.output.pop_front();
                }
                self.output.push_back(line);
                true
            }
            RunEvent::Done(done) => {
                self.on_done(done, now);
                true
            }
            RunEvent::Error(error) => {
                self.phase = RunPhase::Failed(error.message);
                self.finished_at = Some(now);
                true
            }
        }
    }

    fn on_manifest(&mut self, jobs: Vec<ManifestJob>) -> bool {
        if self.phase != RunPhase::Waiting {
            return false;
        }

        let graph = DependencyGraph::from_edges(
            jobs.iter().map(|job| (job.id.clone(), job.needs.clone())),
        );
        let mut by_id: HashMap<String, ManifestJob> =
            jobs.into_iter().map(|job| (job.id.clone(), job)).collect();

        self.jobs = graph
            .topological_order()
            .into_iter()
            .filter_map(|id| {
                let depth = graph.depth(&id);
                by_id
                    .remove(&id)
                    .map(|job| TrackedJob::from_manifest(job, depth))
            })
            .collect();
        self.index = self
            .jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.id.clone(), i))
            .collect();
        self.phase = RunPhase::Running;
        true
    }

    fn job_mut(&mut self, id: &str) -> Option<&mut TrackedJob> {
        let i = *self.index.get(id)?;
        self.jobs.get_mut(i)
    }

    fn on_job(&mut self, event: JobEvent, now: Instant) -> bool {
        let Some(job) = self.job_mut(&event.job_id) else {
            return false;
        };

        match event.action {
            JobAction::Start => {
                if job.status.is_final() {
                    return false;
                }
                job.start(now);
            }
            JobAction::Finish => {
                if job.status.is_final() {
                    return false;
                }
                if job.status == JobStatus::SkippedSecurity {
                    job.start(now);
                }
                job.finish(event.success.unwrap_or(false), now);
            }
            JobAction::Skip => {
                if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                    return false;
                }
                job.skip(now);
            }
        }
        true
    }

    fn on_step(&mut self, event: StepEvent, now: Instant) -> bool {
        let Some(job) = self.job_mut(&event.job_id) else {
            return false;
        };
        if job.status.is_final() || event.step_index >= job.steps.len() {
            return false;
        }

        job.start(now);

        if let Some(previous) = job.active_step.filter(|&i| i != event.step_index) {
            if let Some(step) = job.steps.get_mut(previous) {
                if step.status == StepStatus::Running {
                    step.status = StepStatus::Success;
                }
            }
        }

        let step = &mut job.steps[event.step_index];
        step.status = StepStatus::Running;
        job.active_step = Some(event.step_index);

        let step_name = if step.name.is_empty() {
            event.step_name
        } else {
            step.name.clone()
        };
        self.current_step = Some(format!("{} › {}", job.name, step_name));
        true
    }

    fn on_done(&mut self, done: DoneEvent, now: Instant) {
        let success = !done.has_errors();
        for job in &mut self.jobs {
            match job.status {
                JobStatus::Running => job.finish(success, now),
                JobStatus::Pending => job.cancel(now),
                _ => {}
            }
        }
        self.current_step = None;
        self.finished_at = Some(now);
        self.phase = RunPhase::Finished(done);
    }
}
