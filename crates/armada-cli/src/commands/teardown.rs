//! Teardown command - destroy everything recorded for a provision id

use std::path::PathBuf;

use clap::Args;

use armada_common::config::{default_artifacts_base, load_readiness};
use armada_common::run::{EnableConfig, ProvisionRun};

use super::execute;
use crate::{Error, Result};

/// Destroy a previous run's infrastructure and artifacts
#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Readiness configuration the run was provisioned with
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Provision id of the run to destroy
    #[arg(long, env = "ARMADA_PROVISION_ID")]
    pub provision_id: String,

    /// Base directory for run artifacts
    #[arg(long, env = "ARMADA_ARTIFACTS_DIR")]
    pub artifacts_dir: Option<PathBuf>,

    /// Record what would be destroyed without destroying it
    #[arg(long)]
    pub simulate: bool,
}

impl TeardownArgs {
    fn to_run(&self) -> Result<ProvisionRun> {
        let id = self.provision_id.trim();
        if id.is_empty() {
            return Err(Error::validation("provision id must not be empty"));
        }
        let base = self
            .artifacts_dir
            .clone()
            .unwrap_or_else(default_artifacts_base);
        Ok(ProvisionRun::new(
            id,
            &base,
            EnableConfig {
                remove_all: true,
                simulate: self.simulate,
                ..Default::default()
            },
        ))
    }
}

pub async fn run(args: TeardownArgs) -> Result<()> {
    let config = load_readiness(&args.config)?;
    let run = args.to_run()?;
    execute(config, run).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_targets_the_recorded_root() {
        let args = TeardownArgs {
            config: PathBuf::from("readiness.yaml"),
            provision_id: "abc123".to_string(),
            artifacts_dir: Some(PathBuf::from("/var/armada")),
            simulate: true,
        };
        let run = args.to_run().unwrap();
        assert_eq!(run.artifacts_root_dir, PathBuf::from("/var/armada/abc123"));
        assert!(run.enable.remove_all);
        assert!(run.enable.simulate);
    }

    #[test]
    fn test_blank_provision_id_is_rejected() {
        let args = TeardownArgs {
            config: PathBuf::from("readiness.yaml"),
            provision_id: "  ".to_string(),
            artifacts_dir: None,
            simulate: false,
        };
        assert!(matches!(args.to_run(), Err(Error::Validation { .. })));
    }
}
