//! Run command - execute the workflow branch the switches select

use clap::Args;
use tracing::info;

use armada_common::config::load_readiness;

use super::{execute, RunSource, Switches};
use crate::Result;

/// Run the workflow
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: RunSource,

    #[command(flatten)]
    pub switches: Switches,
}

/// Execute the run command
///
/// Exits non-zero when any stage failed. A run with no actionable switch
/// only reports a diagnostic.
pub async fn run(args: RunArgs) -> Result<()> {
    let config = load_readiness(&args.source.config)?;
    let run = args.source.resolve(&args.switches)?;
    info!(
        provision_id = %run.provision_id,
        root = %run.artifacts_root_dir.display(),
        "starting run"
    );
    execute(config, run).await
}
