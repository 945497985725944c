use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Per-job decision on whether a job runs after an upstream failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOverride {
    /// Force dependents of failed jobs to run unless the job is sensitive
    #[default]
    Auto,
    /// Always force the job to run
    Run,
    /// Never run the job
    Skip,
}

impl fmt::Display for JobOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobOverride::Auto => "auto",
            JobOverride::Run => "run",
            JobOverride::Skip => "skip",
        };
        f.write_str(text)
    }
}

impl FromStr for JobOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(JobOverride::Auto),
            "run" => Ok(JobOverride::Run),
            "skip" => Ok(JobOverride::Skip),
            other => Err(format!(
                "unknown job override '{}', expected auto, run or skip",
                other
            )),
        }
    }
}

/// Override map keyed by job id. Jobs not present are `Auto`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobOverrides(HashMap<String, JobOverride>);

impl JobOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `--run` and `--skip` lists. A job named in both is skipped.
    pub fn from_args(run: &[String], skip: &[String]) -> Self {
        let mut overrides = Self::new();
        for id in run {
            overrides.insert(id.clone(), JobOverride::Run);
        }
        for id in skip {
            overrides.insert(id.clone(), JobOverride::Skip);
        }
        overrides
    }

    pub fn insert(&mut self, id: impl Into<String>, value: JobOverride) {
        self.0.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> JobOverride {
        self.0.get(id).copied().unwrap_or_default()
    }

    /// Job ids overridden to `skip`, sorted.
    pub fn skipped(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .0
            .iter()
            .filter(|(_, value)| **value == JobOverride::Skip)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
