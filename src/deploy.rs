//! Cluster deployment stage
//!
//! Applies the top-level multi-datacenter manifest on the control plane once
//! every CRD is established and the operator's admission webhook has an
//! endpoint address. Applying before that gets the manifest rejected, so a
//! CRD wait or webhook that never completes fails the stage and the manifest
//! is not applied.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use armada_common::model::ReadinessConfig;
use armada_common::poll::{wait_until, PollPolicy};
use armada_common::session::ClusterSession;
use armada_common::tools::Toolbox;
use armada_common::Result;

/// Deploys the database cluster through the control plane
pub struct Deployer<'a> {
    tools: &'a Toolbox,
    config: &'a ReadinessConfig,
}

impl<'a> Deployer<'a> {
    /// Create the stage
    pub fn new(tools: &'a Toolbox, config: &'a ReadinessConfig) -> Self {
        Self { tools, config }
    }

    /// Wait for CRDs and the webhook, apply `manifest` with validation, then settle
    ///
    /// `deadline` lets the caller shrink the webhook wait below its
    /// configured timeout.
    pub async fn deploy(
        &self,
        control_plane: &ClusterSession,
        manifest: &Path,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let timeout = self.config.provision_config.default_timeout_secs;
        info!(context = %control_plane.context_name, timeout_secs = timeout, "waiting for CRDs to be established");
        self.tools
            .kubectl
            .wait_crds_established(control_plane, timeout)
            .await?;
        self.wait_for_webhook(control_plane, deadline).await?;

        let path = manifest.to_string_lossy();
        info!(context = %control_plane.context_name, manifest = %path, "[Phase 1] Applying cluster manifest");
        self.tools
            .kubectl
            .apply_file(control_plane, &control_plane.namespace, &path, true)
            .await?;

        let settle = self.config.provision_config.settle_secs;
        if self.tools.simulate() {
            info!(settle_secs = settle, "[simulate] settle delay skipped");
        } else if settle > 0 {
            info!(settle_secs = settle, "[Phase 2] Waiting for reconciliation to settle");
            tokio::time::sleep(Duration::from_secs(settle)).await;
        }
        Ok(())
    }

    /// Wait until the operator's webhook service has an endpoint address
    pub async fn wait_for_webhook(
        &self,
        control_plane: &ClusterSession,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let policy = PollPolicy::webhook(self.config.provision_config.webhook_timeout_secs);
        let description = format!(
            "{} endpoint on {}",
            armada_common::OPERATOR_WEBHOOK_SERVICE,
            control_plane.context_name
        );
        let kubectl = &self.tools.kubectl;

        wait_until(&description, policy, deadline, || async move {
            let ip = kubectl
                .endpoint_ip(
                    control_plane,
                    &control_plane.namespace,
                    armada_common::OPERATOR_WEBHOOK_SERVICE,
                )
                .await?;
            Ok(!ip.is_empty())
        })
        .await?;
        info!(context = %control_plane.context_name, "operator webhook ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{readiness, session_in};
    use armada_common::testing::ScriptedRunner;
    use armada_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn story_webhook_never_ready_means_manifest_never_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = readiness(&["dc1"]);
        let runner = ScriptedRunner::new();
        runner.respond("kubectl", &["get", "endpoints"], "''");
        let tools = Toolbox::new(runner.clone(), false);
        let start = Instant::now();

        let err = Deployer::new(&tools, &config)
            .deploy(
                &session_in(dir.path(), "cp"),
                Path::new("/cfg/k8c.yaml"),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ReadinessTimeout { .. }));
        assert!(err.to_string().contains("k8ssandra-operator-webhook-service endpoint on cp"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(40));
        assert!(elapsed <= Duration::from_millis(40_250));
        // one observation immediately, then one every 250ms up to the bound
        assert_eq!(runner.calls_matching("kubectl", &["get", "endpoints"]).len(), 161);
        assert!(runner.position("kubectl", &["apply"]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn story_manifest_applied_with_validation_once_webhook_is_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = readiness(&[]);
        config.provision_config.settle_secs = 30;
        let runner = ScriptedRunner::new();
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();
        runner.on(move |inv| {
            inv.has_args(&["get", "endpoints"]).then(|| {
                let n = p.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 4 { "''" } else { "'10.4.0.7'" }.to_string())
            })
        });
        let tools = Toolbox::new(runner.clone(), false);
        let start = Instant::now();

        Deployer::new(&tools, &config)
            .deploy(
                &session_in(dir.path(), "cp"),
                Path::new("/cfg/k8c.yaml"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(1_000 + 30_000));
        let apply = runner.position("kubectl", &["apply"]).unwrap();
        assert!(runner.calls()[apply].has_args(&[
            "-n",
            "k8ssandra",
            "apply",
            "--validate=true",
            "-f",
            "/cfg/k8c.yaml"
        ]));
    }

    #[tokio::test]
    async fn story_unestablished_crds_block_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = readiness(&[]);
        config.provision_config.default_timeout_secs = 120;
        let runner = ScriptedRunner::new();
        runner.fail(
            "kubectl",
            &["wait", "--for", "condition=established"],
            "error: timed out waiting for the condition on customresourcedefinitions/k8ssandraclusters.k8ssandra.io",
        );
        let tools = Toolbox::new(runner.clone(), false);

        let err = Deployer::new(&tools, &config)
            .deploy(
                &session_in(dir.path(), "cp"),
                Path::new("/cfg/k8c.yaml"),
                None,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timed out waiting for the condition"));
        let waits = runner.calls_matching("kubectl", &["wait"]);
        assert_eq!(waits.len(), 1);
        assert!(waits[0].has_args(&["--timeout=120s", "--all", "crd"]));
        assert!(runner.position("kubectl", &["get", "endpoints"]).is_none());
        assert!(runner.position("kubectl", &["apply"]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_shortens_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let config = readiness(&[]);
        let runner = ScriptedRunner::new();
        let tools = Toolbox::new(runner, false);
        let start = Instant::now();

        let err = Deployer::new(&tools, &config)
            .wait_for_webhook(
                &session_in(dir.path(), "cp"),
                Some(start + Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadinessTimeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_deploy_skips_settle() {
        let dir = tempfile::tempdir().unwrap();
        let config = readiness(&[]);
        let runner = ScriptedRunner::new();
        let tools = Toolbox::new(runner.clone(), true);
        let start = Instant::now();

        Deployer::new(&tools, &config)
            .deploy(
                &session_in(dir.path(), "cp"),
                Path::new("/cfg/k8c.yaml"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(runner.calls().is_empty());
        assert_eq!(tools.audit().mutations().len(), 1);
    }
}
