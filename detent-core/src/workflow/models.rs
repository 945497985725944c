use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use std::collections::BTreeMap;

/// Maximum number of characters kept from an inline command when it is used
/// as a step's display name.
pub const RUN_NAME_BUDGET: usize = 40;

/// A GitHub Actions-compatible workflow document.
///
/// Only the fields the instrumenter reads or rewrites are typed. Everything
/// else (`on`, `env`, `permissions`, `concurrency`, ...) is carried in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The name of the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fields not modeled explicitly
    #[serde(flatten)]
    pub extra: Mapping,

    /// The jobs that make up this workflow, keyed by job id
    pub jobs: BTreeMap<String, Job>,
}

/// A job within a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    /// Display name for the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Jobs that must complete before this job runs
    #[serde(default, skip_serializing_if = "JobNeeds::is_none")]
    pub needs: JobNeeds,

    /// Conditional expression for job execution
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<Condition>,

    /// Reusable workflow reference (`owner/repo/.github/workflows/x.yml@ref`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Fields not modeled explicitly
    #[serde(flatten)]
    pub extra: Mapping,

    /// Whether the workflow continues if this job fails
    #[serde(
        default,
        rename = "continue-on-error",
        skip_serializing_if = "Option::is_none"
    )]
    pub continue_on_error: Option<ContinueOnError>,

    /// Job timeout in minutes (a number or an expression)
    #[serde(
        default,
        rename = "timeout-minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<Value>,

    /// The steps that make up this job (absent for reusable workflow calls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
}

impl Job {
    /// Whether this job calls a reusable workflow instead of running steps.
    pub fn is_reusable(&self) -> bool {
        self.uses.is_some()
    }

    /// Display name, falling back to the job id.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }

    /// The job's steps, or an empty slice.
    pub fn steps(&self) -> &[Step] {
        self.steps.as_deref().unwrap_or(&[])
    }
}

/// Job dependencies - can be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum JobNeeds {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl JobNeeds {
    /// Convert to a vector of job IDs, as declared.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            JobNeeds::None => vec![],
            JobNeeds::Single(s) => vec![s.clone()],
            JobNeeds::Multiple(v) => v.clone(),
        }
    }

    /// Check if there are any dependencies.
    pub fn is_empty(&self) -> bool {
        match self {
            JobNeeds::None => true,
            JobNeeds::Single(_) => false,
            JobNeeds::Multiple(v) => v.is_empty(),
        }
    }

    /// Whether the field was absent from the document.
    pub fn is_none(&self) -> bool {
        matches!(self, JobNeeds::None)
    }
}

/// An `if:` value - YAML allows both a literal boolean and an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Bool(bool),
    Expression(String),
}

impl Condition {
    /// The bare expression text, with a `${{ }}` wrapper removed.
    ///
    /// `None` when the value is not a single expression, as in
    /// `${{ a }} && ${{ b }}`; such a value cannot be combined with another
    /// condition by wrapping it.
    pub fn expression(&self) -> Option<String> {
        match self {
            Condition::Bool(b) => Some(b.to_string()),
            Condition::Expression(expr) => {
                let trimmed = expr.trim();
                let inner = match trimmed
                    .strip_prefix("${{")
                    .and_then(|rest| rest.strip_suffix("}}"))
                {
                    Some(inner) => inner,
                    None => trimmed,
                };
                if inner.contains("${{") || inner.contains("}}") {
                    return None;
                }
                Some(inner.trim().to_string())
            }
        }
    }
}

/// Continue-on-error setting - can be a boolean or an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContinueOnError {
    Bool(bool),
    Expression(String),
}

/// A step within a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    /// Display name for the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Unique identifier for the step (used in outputs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Conditional expression for step execution
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<Condition>,

    /// Action to use (e.g., "actions/checkout@v4")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Shell command to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Fields not modeled explicitly (`with`, `env`, `shell`, ...)
    #[serde(flatten)]
    pub extra: Mapping,

    /// Step timeout in minutes (a number or an expression)
    #[serde(
        default,
        rename = "timeout-minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<Value>,
}

impl Step {
    /// Build a plain `run` step.
    pub fn run_step(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            run: Some(script.into()),
            ..Default::default()
        }
    }

    /// Get a display name for the step.
    ///
    /// Falls back to the id, then the last path segment of the action
    /// reference, then the first line of the command.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            name.to_string()
        } else if let Some(id) = self.id.as_deref().filter(|i| !i.trim().is_empty()) {
            id.to_string()
        } else if let Some(uses) = &self.uses {
            action_basename(uses).to_string()
        } else if let Some(run) = &self.run {
            let first_line = run.lines().map(str::trim).find(|l| !l.is_empty());
            truncate_chars(first_line.unwrap_or(""), RUN_NAME_BUDGET)
        } else {
            "step".to_string()
        }
    }
}

/// Trailing path segment of an action reference, without its `@ref`.
fn action_basename(uses: &str) -> &str {
    let without_ref = uses.split('@').next().unwrap_or(uses);
    without_ref
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_ref)
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let kept: String = text.chars().take(budget).collect();
    format!("{}...", kept)
}
