pub mod manifest;
pub mod prepare;
pub mod run;

use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use detent_core::prepare::DEFAULT_WORKFLOWS_DIR;
use detent_core::utils::resolve_working_dir;
use detent_core::{JobOverrides, Manifest, PrepareOptions, TimeoutConfig};

/// Where the workflows live
#[derive(Args, Debug, Clone)]
pub struct WorkflowArgs {
    /// Repository root (defaults to the enclosing git repository)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Workflow directory, relative to the repository root
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORKFLOWS_DIR)]
    pub workflows: PathBuf,
}

impl WorkflowArgs {
    /// Preparation options for the selected repository. Timeout overrides
    /// are read from the environment and any adjustment is reported.
    pub fn options(&self) -> Result<PrepareOptions> {
        let repo = self.repo.clone().unwrap_or_else(resolve_working_dir);
        if !repo.is_dir() {
            color_eyre::eyre::bail!("Repository directory not found: {}", repo.display());
        }

        let (timeouts, diagnostics) = TimeoutConfig::from_env_with_diagnostics();
        for diagnostic in &diagnostics {
            output::warning(diagnostic);
        }

        Ok(PrepareOptions::default()
            .with_repo_root(repo)
            .with_workflows_dir(&self.workflows)
            .with_timeouts(timeouts))
    }
}

/// Per-job overrides
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Force a job to run even if it looks sensitive (repeatable)
    #[arg(long = "run", value_name = "JOB")]
    pub run: Vec<String>,

    /// Force a job to be skipped; wins over --run (repeatable)
    #[arg(long = "skip", value_name = "JOB")]
    pub skip: Vec<String>,
}

impl OverrideArgs {
    pub fn overrides(&self) -> JobOverrides {
        JobOverrides::from_args(&self.run, &self.skip)
    }

    /// Warn about overrides naming jobs the manifest does not know.
    pub fn check_against(&self, manifest: &Manifest) {
        for id in self.run.iter().chain(&self.skip) {
            if manifest.job(id).is_none() {
                output::warning(&format!("No job named '{}' in the workflows", id));
            }
        }
    }
}
