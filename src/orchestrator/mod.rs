//! Orchestrator: sequences the stages for one run
//!
//! The run's enable switches resolve once into a [`WorkflowMode`]; each mode
//! is one fixed branch:
//!
//! - `RemoveAll`: teardown from the recorded manifests
//! - `ProvisionOnly`: provision every context concurrently and record the
//!   connection material
//! - `InstallOnly`: identity, sessions, node gate, repositories,
//!   prerequisites, backup secret, control-plane operator, data-plane
//!   operators, credential exchange, cluster deployment, data-plane role patch
//! - `PreInstallOnly`: identity, sessions, repositories, prerequisites
//! - `NoOp`: a diagnostic, not a failure
//!
//! A failed step ends its branch. Steps that fan out over contexts
//! (provisioning, data-plane operators) attempt every context first and
//! fail afterwards. Every outcome lands in the [`RunReport`].

mod mode;
mod report;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use armada_common::exec::CommandRunner;
use armada_common::model::{ContextSet, ReadinessConfig};
use armada_common::run::ProvisionRun;
use armada_common::session::ClusterSession;
use armada_common::tools::Toolbox;
use armada_common::{Error, Result};

use crate::credentials::{CredentialExchange, CredentialReader, KubectlCredentialReader};
use crate::deploy::Deployer;
use crate::install::Installer;
use crate::provision::{teardown, Provisioner};
use crate::sessions::{connection_of, SessionFactory};

pub use mode::WorkflowMode;
pub use report::{RunReport, StageResult};

/// Runs the workflow for one readiness configuration
pub struct Orchestrator {
    config: ReadinessConfig,
    contexts: ContextSet,
    runner: Arc<dyn CommandRunner>,
    reader: Option<Arc<dyn CredentialReader>>,
}

impl Orchestrator {
    /// Validate the contexts and create an orchestrator over `runner`
    pub fn new(config: ReadinessConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let contexts = config.context_set()?;
        Ok(Self {
            config,
            contexts,
            runner,
            reader: None,
        })
    }

    /// Read service-account credentials with `reader` instead of the cluster API
    pub fn with_credential_reader(mut self, reader: Arc<dyn CredentialReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// The validated contexts
    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    /// Run the branch selected by the run's enable switches
    ///
    /// Stage failures are reported, not returned. An `Err` means the run
    /// state itself could not be read or written.
    pub async fn run(&self, run: ProvisionRun) -> Result<RunReport> {
        let tools = Toolbox::new(self.runner.clone(), run.enable.simulate);
        let mode = WorkflowMode::resolve(&run.enable);
        let mut report = RunReport::new(&run.provision_id, mode, tools.simulate());
        info!(
            provision_id = %run.provision_id,
            mode = %mode,
            simulate = tools.simulate(),
            contexts = self.contexts.len(),
            "[Phase 0] Workflow mode resolved"
        );

        let mut run = run;
        match mode {
            WorkflowMode::RemoveAll => self.remove_all(&tools, &run, &mut report).await,
            WorkflowMode::NoOp => {
                warn!("no actionable enable switch set, nothing to do");
                report.push(StageResult::diagnostic(
                    "mode",
                    "no actionable enable switch set (remove_all, provision_infra, install, pre_install_setup)",
                ));
            }
            WorkflowMode::ProvisionOnly => {
                run = run.resume()?;
                run.persist()?;
                self.provision_only(&tools, &mut run, &mut report).await?;
            }
            WorkflowMode::InstallOnly | WorkflowMode::PreInstallOnly => {
                run = run.resume()?;
                run.persist()?;
                let branch = if mode == WorkflowMode::InstallOnly {
                    self.install_only(&tools, &mut run, &mut report).await
                } else {
                    self.pre_install_only(&tools, &mut run, &mut report).await
                };
                if let Err(e) = branch {
                    if report.succeeded() {
                        report.push(StageResult::failed(mode.to_string(), e.to_string()));
                    }
                    warn!(mode = %mode, error = %e, "branch stopped");
                }
            }
        }

        report.connections = run.connections.clone();
        report.audit = tools.audit().entries();
        if report.succeeded() {
            info!(provision_id = %run.provision_id, mode = %mode, "workflow complete");
        } else {
            error!(provision_id = %run.provision_id, failures = %report.failure_summary(), "workflow failed");
        }
        Ok(report)
    }

    async fn remove_all(&self, tools: &Toolbox, run: &ProvisionRun, report: &mut RunReport) {
        info!(root = %run.artifacts_root_dir.display(), "[Phase 1] Removing all infrastructure");
        match teardown(tools, &run.layout()).await {
            Ok(outcome) => {
                for (context, message) in &outcome.failed {
                    report.push(StageResult::failed("teardown", message.clone()).for_context(context));
                }
                let summary = outcome.summary();
                if outcome.succeeded() {
                    report.push(StageResult::ok("teardown", summary));
                } else {
                    warn!(summary = %summary, "partial teardown");
                }
            }
            Err(e) => report.push(StageResult::failed("teardown", e.to_string())),
        }
    }

    async fn provision_only(
        &self,
        tools: &Toolbox,
        run: &mut ProvisionRun,
        report: &mut RunReport,
    ) -> Result<()> {
        info!(contexts = self.contexts.len(), "[Phase 1] Provisioning infrastructure");
        let outcome = Provisioner::new(tools, &self.config, run)
            .provision_all(&self.contexts)
            .await;

        for (name, info) in &outcome.connections {
            let detail = format!("endpoint {}", info.endpoint);
            report.push(StageResult::ok("provision", detail).for_context(name));
        }
        for (name, e) in &outcome.failures {
            report.push(StageResult::failed("provision", e.to_string()).for_context(name));
        }

        run.connections.extend(outcome.connections);
        run.persist()
    }

    async fn open_sessions(
        &self,
        tools: &Toolbox,
        run: &mut ProvisionRun,
        report: &mut RunReport,
    ) -> Result<BTreeMap<String, ClusterSession>> {
        info!("[Phase 1] Opening cluster sessions");
        let factory = SessionFactory::new(tools, &self.config, run);
        step(report, "identity", None, factory.switch_identity().await)?;
        let sessions = step(report, "sessions", None, factory.open_all(&self.contexts).await)?;

        for (name, session) in &sessions {
            run.connections.insert(name.clone(), connection_of(session));
            report.push(StageResult::ok("sessions", session.full_name.clone()).for_context(name));
        }
        step(report, "sessions", None, run.persist())?;
        Ok(sessions)
    }

    async fn prerequisites(
        &self,
        installer: &Installer<'_>,
        sessions: &BTreeMap<String, ClusterSession>,
        report: &mut RunReport,
    ) -> Result<()> {
        let control_plane = &sessions[&self.contexts.control_plane().name];
        info!("[Phase 3] Registering chart repositories");
        step(
            report,
            "repositories",
            None,
            installer.register_repositories(&control_plane.env).await,
        )?;

        info!("[Phase 4] Installing prerequisites");
        for ctx in self.contexts.control_plane_first() {
            let session = &sessions[&ctx.name];
            step(
                report,
                "prerequisites",
                Some(&ctx.name),
                installer.install_prerequisites(session).await,
            )?;
            report.push(StageResult::ok("prerequisites", "cert-manager and ingress").for_context(&ctx.name));
        }
        Ok(())
    }

    async fn pre_install_only(
        &self,
        tools: &Toolbox,
        run: &mut ProvisionRun,
        report: &mut RunReport,
    ) -> Result<()> {
        let sessions = self.open_sessions(tools, run, report).await?;
        let installer = Installer::new(tools, &self.config);
        self.prerequisites(&installer, &sessions, report).await
    }

    async fn install_only(
        &self,
        tools: &Toolbox,
        run: &mut ProvisionRun,
        report: &mut RunReport,
    ) -> Result<()> {
        let sessions = self.open_sessions(tools, run, report).await?;
        let installer = Installer::new(tools, &self.config);
        let control_plane = &sessions[&self.contexts.control_plane().name];
        let data_planes: Vec<&ClusterSession> = self
            .contexts
            .data_planes()
            .map(|ctx| &sessions[&ctx.name])
            .collect();

        info!(expected = self.config.expected_node_count, "[Phase 2] Waiting for nodes");
        for ctx in self.contexts.control_plane_first() {
            step(
                report,
                "nodes",
                Some(&ctx.name),
                installer.wait_for_nodes(&sessions[&ctx.name]).await,
            )?;
        }

        self.prerequisites(&installer, &sessions, report).await?;

        for ctx in self.contexts.control_plane_first() {
            let stored = step(
                report,
                "backup-secret",
                Some(&ctx.name),
                installer.install_backup_secret(&sessions[&ctx.name]).await,
            )?;
            if stored {
                report.push(StageResult::ok("backup-secret", "stored").for_context(&ctx.name));
            }
        }

        info!("[Phase 5] Installing control-plane operator");
        let cp_ctx = self.contexts.control_plane();
        step(
            report,
            "operator",
            Some(&cp_ctx.name),
            installer.install_operator(control_plane, cp_ctx.role()).await,
        )?;
        report.push(StageResult::ok("operator", cp_ctx.role().to_string()).for_context(&cp_ctx.name));

        info!(count = data_planes.len(), "[Phase 6] Installing data-plane operators");
        let mut failures = Vec::new();
        for ctx in self.contexts.data_planes() {
            match installer.install_operator(&sessions[&ctx.name], ctx.role()).await {
                Ok(()) => {
                    report.push(StageResult::ok("operator", ctx.role().to_string()).for_context(&ctx.name));
                }
                Err(e) => {
                    error!(context = %ctx.name, error = %e, "data-plane operator install failed");
                    report.push(StageResult::failed("operator", e.to_string()).for_context(&ctx.name));
                    failures.push(format!("{}: {}", ctx.name, e));
                }
            }
        }
        if !failures.is_empty() {
            return Err(Error::stage_failed("operator", failures));
        }

        info!("[Phase 7] Exchanging credentials");
        let reader: Arc<dyn CredentialReader> = match &self.reader {
            Some(reader) => reader.clone(),
            None => Arc::new(KubectlCredentialReader::new(tools.kubectl.clone())),
        };
        let layout = run.layout();
        step(
            report,
            "credentials",
            None,
            CredentialExchange::new(tools, reader.as_ref(), &layout)
                .exchange(control_plane, &data_planes)
                .await,
        )?;
        report.push(StageResult::ok(
            "credentials",
            format!("{} ClientConfig(s) on {}", data_planes.len(), control_plane.context_name),
        ));

        match &self.config.provision_config.k8c_config.values_file_path {
            Some(manifest) => {
                info!("[Phase 8] Deploying cluster");
                step(
                    report,
                    "deploy",
                    Some(&control_plane.context_name),
                    Deployer::new(tools, &self.config)
                        .deploy(control_plane, manifest, None)
                        .await,
                )?;
                report.push(
                    StageResult::ok("deploy", manifest.display().to_string())
                        .for_context(&control_plane.context_name),
                );
            }
            None => report.push(StageResult::diagnostic(
                "deploy",
                "no values_file_path configured, cluster manifest not applied",
            )),
        }

        for ctx in self.contexts.data_planes() {
            let patched = step(
                report,
                "role-patch",
                Some(&ctx.name),
                installer.patch_role(&sessions[&ctx.name], ctx.role()).await,
            )?;
            if patched {
                report.push(StageResult::ok("role-patch", "restarted").for_context(&ctx.name));
            }
        }
        Ok(())
    }
}

/// Record a failed step in the report; the error ends the branch
fn step<T>(
    report: &mut RunReport,
    stage: &str,
    context: Option<&str>,
    result: Result<T>,
) -> Result<T> {
    result.map_err(|e| {
        error!(stage, context = context.unwrap_or("-"), error = %e, "step failed");
        let failed = StageResult::failed(stage, e.to_string());
        report.push(match context {
            Some(ctx) => failed.for_context(ctx),
            None => failed,
        });
        let entry = match context {
            Some(ctx) => format!("{}: {}", ctx, e),
            None => e.to_string(),
        };
        Error::stage_failed(stage, vec![entry])
    })
}
