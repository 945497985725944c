use super::{OverrideArgs, WorkflowArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use detent_core::{JobOverride, ManifestJob, PreparedWorkflows, WorkflowPreparer};

/// Instrument the workflow directory and show what a run would do
#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Keep the instrumented directory and print its path on stdout
    #[arg(long)]
    pub keep: bool,
}

pub async fn execute(args: PrepareArgs) -> Result<()> {
    let overrides = args.overrides.overrides();
    let options = args.workflow.options()?.with_overrides(overrides.clone());
    let repo = options.repo_root.clone();

    output::status("Preparing", &format!("{}", repo.join(&options.workflows_dir).display()));
    let prepared = WorkflowPreparer::new(options).prepare().await?;
    args.overrides.check_against(&prepared.manifest);

    report(&prepared, |job| overrides.get(&job.id));

    if args.keep {
        let dir = prepared.keep();
        output::info(&format!("Kept {}", dir.display()));
        println!("{}", dir.display());
    } else {
        prepared.cleanup()?;
        output::dim("  Removed the instrumented files; pass --keep to inspect them");
    }
    Ok(())
}

fn report(prepared: &PreparedWorkflows, override_for: impl Fn(&ManifestJob) -> JobOverride) {
    output::success(&format!(
        "{} workflow(s) instrumented in {}",
        prepared.files.len(),
        prepared.path().display()
    ));
    for file in &prepared.files {
        if let Some(name) = file.file_name() {
            output::dim(&format!("    {}", name.to_string_lossy()));
        }
    }

    eprintln!();
    output::header(&format!("Jobs ({} in run order)", prepared.manifest.jobs.len()));
    for job in &prepared.manifest.jobs {
        let mut line = if job.name == job.id {
            format!("  {}", job.id)
        } else {
            format!("  {} ({})", job.id, job.name)
        };
        if !job.needs.is_empty() {
            line.push_str(&format!(" <- {}", job.needs.join(", ")));
        }

        match (override_for(job), &job.uses) {
            (JobOverride::Skip, _) => output::dim(&format!("{} [skip]", line)),
            (_, Some(uses)) => output::dim(&format!("{} [reusable: {}]", line, uses)),
            (JobOverride::Run, _) => eprintln!("{} [run]", line),
            (JobOverride::Auto, None) if job.sensitive => {
                output::warning(&format!("{} looks sensitive", line.trim_start()))
            }
            (JobOverride::Auto, None) => eprintln!("{} ({} steps)", line, job.steps.len()),
        }
    }

    eprintln!();
    match &prepared.host {
        Some(host) => output::info(&format!(
            "Manifest emitted by '{}' from {}",
            host.job_id,
            host.path.display()
        )),
        None => output::warning("No job can emit the manifest; live tracking will stay empty"),
    }
}
