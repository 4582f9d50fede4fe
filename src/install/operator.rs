//! Operator install with its control-plane/data-plane role

use tracing::{info, warn};

use armada_common::model::ClusterRole;
use armada_common::session::ClusterSession;
use armada_common::{
    Result, CONTROL_PLANE_CHART_VALUE, CONTROL_PLANE_ENV_KEY, OPERATOR_CHART, OPERATOR_RELEASE,
};

use super::Installer;

impl Installer<'_> {
    /// Install the operator into the session's namespace with `role`
    ///
    /// The role discriminator is passed both as the chart value and in the
    /// install's environment. When the chart does not accept the value, see
    /// [`Installer::patch_role`].
    ///
    /// A release left behind by an earlier run is uninstalled and the install
    /// retried once.
    pub async fn install_operator(&self, session: &ClusterSession, role: ClusterRole) -> Result<()> {
        let args = self.operator_args(role);
        let env = session.env_with([(CONTROL_PLANE_ENV_KEY, role.discriminator())]);
        let helm = &self.tools.helm;
        let namespace = Some(session.namespace.as_str());

        info!(context = %session.context_name, role = %role, "[Phase 1] Installing operator");
        match helm
            .install(session, OPERATOR_RELEASE, OPERATOR_CHART, namespace, &args, &env)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_release_conflict() => {
                warn!(context = %session.context_name, "operator release exists, reinstalling");
                helm.uninstall(session, OPERATOR_RELEASE, namespace).await?;
                helm.install(session, OPERATOR_RELEASE, OPERATOR_CHART, namespace, &args, &env)
                    .await?;
            }
            Err(e) => return Err(e),
        }

        info!(context = %session.context_name, role = %role, "operator installed");
        Ok(())
    }

    /// Set the data-plane role on the running operator and restart it
    ///
    /// Only needed when the chart does not take the role as an install-time
    /// value; the control plane keeps the operator's default role. Returns
    /// whether the deployment was patched.
    pub async fn patch_role(&self, session: &ClusterSession, role: ClusterRole) -> Result<bool> {
        if self.config.provision_config.k8c_config.role_via_chart_value || role.is_control_plane() {
            return Ok(false);
        }

        info!(context = %session.context_name, "[Phase 2] Setting data-plane role on deployment");
        let kubectl = &self.tools.kubectl;
        kubectl
            .set_env(
                session,
                &session.namespace,
                OPERATOR_RELEASE,
                CONTROL_PLANE_ENV_KEY,
                role.discriminator(),
            )
            .await?;
        kubectl
            .rollout_restart(session, &session.namespace, OPERATOR_RELEASE)
            .await?;
        Ok(true)
    }

    fn operator_args(&self, role: ClusterRole) -> Vec<String> {
        let k8c = &self.config.provision_config.k8c_config;
        let mut args = vec!["--create-namespace".to_string()];
        if k8c.role_via_chart_value {
            args.push("--set".to_string());
            args.push(format!("{}={}", CONTROL_PLANE_CHART_VALUE, role.discriminator()));
        }
        if k8c.cluster_scoped {
            args.push("--set".to_string());
            args.push("global.clusterScoped=true".to_string());
        }
        if let Some(version) = &k8c.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        args
    }
}
