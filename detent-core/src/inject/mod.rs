// Instrumentation Injector
// Rewrites jobs so a runner keeps going after failures and reports progress

mod overrides;
mod timeout;

pub use overrides::{JobOverride, JobOverrides};
pub use timeout::{
    TimeoutConfig, DEFAULT_JOB_TIMEOUT_MINUTES, DEFAULT_STEP_TIMEOUT_MINUTES, JOB_TIMEOUT_ENV,
    MAX_TIMEOUT_MINUTES, MIN_TIMEOUT_MINUTES, STEP_TIMEOUT_ENV,
};

use crate::manifest::ManifestHost;
use crate::marker::{is_valid_job_id, Marker};
use crate::sensitivity::SensitivityRules;
use crate::workflow::{Condition, ContinueOnError, Job, Step, Workflow};

use serde_yaml::{Number, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runner expression expanded to the job's final status.
const JOB_STATUS_EXPR: &str = "${{ job.status }}";

const MANIFEST_STEP_NAME: &str = "detent: manifest";
const JOB_START_STEP_NAME: &str = "detent: job start";
const JOB_END_STEP_NAME: &str = "detent: job end";

/// One rewrite over every job of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// `continue-on-error: true` on every job
    Continuation,
    /// `always()` conditions per the override map
    ForcedContinuation,
    /// Lifecycle marker steps
    Markers,
    /// Default `timeout-minutes` on jobs and steps
    Timeouts,
}

/// Passes in the order they are applied. Timeouts run after markers so the
/// injected steps are bounded too.
pub const PASS_ORDER: [Pass; 4] = [
    Pass::Continuation,
    Pass::ForcedContinuation,
    Pass::Markers,
    Pass::Timeouts,
];

/// Applies the instrumentation passes to workflow documents.
///
/// Cheap to clone; workers of the preparer each hold one.
#[derive(Debug, Clone)]
pub struct Injector {
    overrides: Arc<JobOverrides>,
    timeouts: TimeoutConfig,
    rules: SensitivityRules,
}

impl Injector {
    pub fn new(overrides: Arc<JobOverrides>, timeouts: TimeoutConfig, rules: SensitivityRules) -> Self {
        Self {
            overrides,
            timeouts,
            rules,
        }
    }

    /// Instrument every job of `workflow` in place.
    ///
    /// `host` is the manifest host of the batch when it lives in this
    /// document. Jobs whose ids are unsafe to embed in shell commands are
    /// left untouched.
    pub fn inject(&self, workflow: &mut Workflow, host: Option<&ManifestHost>) {
        for (id, job) in workflow.jobs.iter_mut() {
            if !is_valid_job_id(id) {
                warn!(job = %id, "skipping instrumentation of job with invalid id");
                continue;
            }
            let host = host.filter(|h| h.job_id == *id);
            for pass in PASS_ORDER {
                self.apply(pass, id, job, host);
            }
        }
    }

    fn apply(&self, pass: Pass, id: &str, job: &mut Job, host: Option<&ManifestHost>) {
        match pass {
            Pass::Continuation => {
                job.continue_on_error = Some(ContinueOnError::Bool(true));
            }
            // Reusable workflow calls accept neither conditions rewritten by
            // us nor extra steps nor timeouts.
            _ if job.is_reusable() => {}
            Pass::ForcedContinuation => self.force_continuation(id, job),
            Pass::Markers => inject_markers(id, job, host),
            Pass::Timeouts => self.inject_timeouts(job),
        }
    }

    fn force_continuation(&self, id: &str, job: &mut Job) {
        let force = match self.overrides.get(id) {
            JobOverride::Skip => {
                debug!(job = %id, "job skipped by override");
                job.if_condition = Some(Condition::Bool(false));
                return;
            }
            JobOverride::Run => true,
            JobOverride::Auto => !job.needs.is_empty() && !self.rules.is_sensitive(id, job),
        };

        if !force {
            return;
        }
        match always_condition(job.if_condition.as_ref()) {
            Some(condition) => job.if_condition = Some(Condition::Expression(condition)),
            None => warn!(
                job = %id,
                "condition is not a single expression, leaving it unchanged"
            ),
        }
    }

    fn inject_timeouts(&self, job: &mut Job) {
        if job.timeout_minutes.is_none() {
            job.timeout_minutes = Some(minutes(self.timeouts.job_minutes));
        }
        for step in job.steps.iter_mut().flatten() {
            if step.timeout_minutes.is_none() {
                step.timeout_minutes = Some(minutes(self.timeouts.step_minutes));
            }
        }
    }
}

/// `always()`, combined with an existing condition when there is one.
/// `None` when the existing condition cannot be combined.
fn always_condition(existing: Option<&Condition>) -> Option<String> {
    match existing {
        None => Some("always()".to_string()),
        Some(condition) => condition
            .expression()
            .map(|expr| format!("always() && ({})", expr)),
    }
}

fn minutes(value: u32) -> Value {
    Value::Number(Number::from(value))
}

fn marker_step(name: &str, marker: &Marker) -> Step {
    Step::run_step(name, marker.echo_command())
}

fn inject_markers(id: &str, job: &mut Job, host: Option<&ManifestHost>) {
    let original = job.steps.take().unwrap_or_default();
    let mut steps = Vec::with_capacity(original.len() * 2 + 3);

    if let Some(host) = host {
        steps.push(marker_step(MANIFEST_STEP_NAME, &host.marker));
    }

    steps.push(marker_step(
        JOB_START_STEP_NAME,
        &Marker::JobStart {
            job_id: id.to_string(),
        },
    ));

    for (index, step) in original.into_iter().enumerate() {
        let marker = Marker::StepStart {
            job_id: id.to_string(),
            index,
            name: step.display_name(),
        };
        let mut start = marker_step(&format!("detent: step {}", index), &marker);
        // The marker only fires when the step itself would run
        start.if_condition = step.if_condition.clone();
        steps.push(start);
        steps.push(step);
    }

    let mut end = marker_step(
        JOB_END_STEP_NAME,
        &Marker::JobEnd {
            job_id: id.to_string(),
            status: JOB_STATUS_EXPR.to_string(),
        },
    );
    end.if_condition = Some(Condition::Expression("always()".to_string()));
    steps.push(end);

    job.steps = Some(steps);
}
