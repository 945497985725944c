use super::WorkflowArgs;

use clap::Args;
use color_eyre::Result;

use detent_core::WorkflowPreparer;

/// Print the manifest JSON without writing any files
#[derive(Args, Debug)]
pub struct ManifestArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// Print the JSON on one line
    #[arg(long)]
    pub compact: bool,
}

pub fn execute(args: ManifestArgs) -> Result<()> {
    let preparer = WorkflowPreparer::new(args.workflow.options()?);
    let manifest = preparer.manifest()?;

    let json = if args.compact {
        serde_json::to_string(&manifest)?
    } else {
        serde_json::to_string_pretty(&manifest)?
    };
    println!("{}", json);
    Ok(())
}
