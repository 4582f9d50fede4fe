//! CLI commands
//!
//! `run` and `mode` share how a run is put together: a readiness file, an
//! optional run file, then overrides from flags and the environment.

pub mod mode;
pub mod run;
pub mod teardown;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;

use armada::{Orchestrator, RunReport};
use armada_common::config::{default_artifacts_base, load_run};
use armada_common::exec::ProcessRunner;
use armada_common::model::ReadinessConfig;
use armada_common::run::{generate_provision_id, EnableConfig, ProvisionRun};

use crate::{Error, Result};

/// Where a run's configuration comes from
#[derive(Args, Debug, Clone)]
pub struct RunSource {
    /// Readiness configuration (contexts, cloud, chart settings)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Run description; a fresh run is created when omitted
    #[arg(short = 'r', long = "run")]
    pub run_file: Option<PathBuf>,

    /// Provision id, overriding the run file
    #[arg(long, env = "ARMADA_PROVISION_ID")]
    pub provision_id: Option<String>,

    /// Base directory for run artifacts; the root is `<dir>/<provision id>`
    #[arg(long, env = "ARMADA_ARTIFACTS_DIR")]
    pub artifacts_dir: Option<PathBuf>,
}

/// Enable switches; each one set here turns the run file's switch on
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct Switches {
    /// Record every external call without making it
    #[arg(long)]
    pub simulate: bool,

    /// Destroy everything recorded for the provision id
    #[arg(long)]
    pub remove_all: bool,

    /// Provision cluster infrastructure
    #[arg(long)]
    pub provision_infra: bool,

    /// Install and deploy onto provisioned clusters
    #[arg(long)]
    pub install: bool,

    /// Only register chart repositories and install prerequisites
    #[arg(long)]
    pub pre_install_setup: bool,
}

impl Switches {
    fn apply(&self, enable: &mut EnableConfig) {
        enable.simulate |= self.simulate;
        enable.remove_all |= self.remove_all;
        enable.provision_infra |= self.provision_infra;
        enable.install |= self.install;
        enable.pre_install_setup |= self.pre_install_setup;
    }
}

impl RunSource {
    /// Build the run: run file (or a fresh one), then flag overrides
    pub fn resolve(&self, switches: &Switches) -> Result<ProvisionRun> {
        let mut run = match &self.run_file {
            Some(path) => load_run(path)?,
            None => ProvisionRun::new(
                generate_provision_id(),
                &default_artifacts_base(),
                EnableConfig::default(),
            ),
        };

        let id = self
            .provision_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if id.is_some() || self.artifacts_dir.is_some() {
            if let Some(id) = id {
                validate_provision_id(id)?;
                run.provision_id = id.to_string();
            }
            let base = match &self.artifacts_dir {
                Some(dir) => dir.clone(),
                None => run
                    .artifacts_root_dir
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(default_artifacts_base),
            };
            run.artifacts_root_dir = base.join(&run.provision_id);
        }

        switches.apply(&mut run.enable);
        Ok(run)
    }
}

/// Provision ids end up in cloud resource names and directory names
fn validate_provision_id(id: &str) -> Result<()> {
    let valid = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid && !id.starts_with('-') {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "provision id '{}' must be lower-case letters, digits and dashes",
            id
        )))
    }
}

/// Run the orchestrator against the real tools and report the outcome
pub(crate) async fn execute(config: ReadinessConfig, run: ProvisionRun) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(ProcessRunner))?;
    let report = orchestrator.run(run).await?;
    print!("{}", render_report(&report)?);

    if report.succeeded() {
        Ok(())
    } else {
        Err(Error::workflow_failed(report.failure_summary()))
    }
}

/// Text report of a run; simulated runs append the audit trail as JSON
pub fn render_report(report: &RunReport) -> Result<String> {
    let mut out = format!(
        "provision {}: {}{}\n",
        report.provision_id,
        report.mode,
        if report.simulated { " (simulated)" } else { "" }
    );
    for result in &report.results {
        let status = if result.succeeded {
            "ok"
        } else if result.ignorable {
            "note"
        } else {
            "FAILED"
        };
        let scope = match &result.context {
            Some(ctx) => format!("{} [{}]", result.stage, ctx),
            None => result.stage.clone(),
        };
        out.push_str(&format!("  {:<7} {}: {}\n", status, scope, result.detail));
    }
    for (context, info) in &report.connections {
        out.push_str(&format!("  {:<7} {}: {}\n", "cluster", context, info.endpoint));
    }
    if report.simulated {
        out.push_str(&serde_json::to_string_pretty(&report.audit)?);
        out.push('\n');
    }
    Ok(out)
}
