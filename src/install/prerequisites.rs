//! Chart repositories, certificate-authority controller and ingress controller

use std::collections::BTreeMap;

use tracing::{info, warn};

use armada_common::retry::retry_once;
use armada_common::session::ClusterSession;
use armada_common::Result;

use super::Installer;

impl Installer<'_> {
    /// Remove then re-add every chart repository, then update the index
    ///
    /// Runs once per run. A failed remove (usually "repo not found") is
    /// only logged.
    pub async fn register_repositories(&self, env: &BTreeMap<String, String>) -> Result<()> {
        let helm = &self.tools.helm;
        for (name, url) in armada_common::CHART_REPOSITORIES {
            if let Err(e) = helm.repo_remove(name, env).await {
                warn!(repository = name, error = %e, "repository remove failed, continuing");
            }
            helm.repo_add(name, url, env).await?;
        }
        helm.repo_update(env).await?;
        info!(
            repositories = armada_common::CHART_REPOSITORIES.len(),
            "chart repositories registered"
        );
        Ok(())
    }

    /// Certificate-authority controller, then ingress controller
    pub async fn install_prerequisites(&self, session: &ClusterSession) -> Result<()> {
        self.install_cert_manager(session).await?;
        self.install_ingress(session).await
    }

    /// Apply the certificate-authority controller manifest
    ///
    /// A failed first apply is always retried exactly once.
    pub async fn install_cert_manager(&self, session: &ClusterSession) -> Result<()> {
        let operation = format!("cert-manager on {}", session.context_name);
        retry_once(&operation, || {
            self.tools
                .kubectl
                .apply_url(session, armada_common::CERT_MANAGER_MANIFEST)
        })
        .await?;
        info!(context = %session.context_name, "cert-manager applied");
        Ok(())
    }

    /// Install the ingress controller after clearing stale cluster RBAC
    ///
    /// Skipped when the context configures no ingress chart version.
    pub async fn install_ingress(&self, session: &ClusterSession) -> Result<()> {
        let Some(network) = self
            .config
            .contexts
            .get(&session.context_name)
            .map(|ctx| &ctx.network_config)
        else {
            return Ok(());
        };
        let Some(version) = &network.traefik_version else {
            info!(context = %session.context_name, "no ingress version configured, skipping ingress");
            return Ok(());
        };

        let kubectl = &self.tools.kubectl;
        let release = armada_common::INGRESS_RELEASE;
        kubectl
            .delete_cluster_object(session, "ClusterRoleBinding", release)
            .await?;
        kubectl
            .delete_cluster_object(session, "ClusterRole", release)
            .await?;
        if let Err(e) = self.tools.helm.uninstall(session, release, None).await {
            info!(context = %session.context_name, error = %e, "no previous ingress release removed");
        }

        let mut args = vec!["--version".to_string(), version.clone()];
        if let Some(values) = &network.traefik_values_file {
            args.push("-f".to_string());
            args.push(values.to_string_lossy().to_string());
        }
        self.tools
            .helm
            .install(
                session,
                release,
                armada_common::INGRESS_CHART,
                None,
                &args,
                &session.env,
            )
            .await?;
        info!(context = %session.context_name, version = %version, "ingress controller installed");
        Ok(())
    }
}
