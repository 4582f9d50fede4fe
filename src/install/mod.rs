//! Install stage
//!
//! Installs onto one session at a time:
//!
//! - chart repositories, once per run ([`Installer::register_repositories`])
//! - prerequisites: certificate-authority controller and ingress controller
//!   ([`Installer::install_prerequisites`])
//! - the operator, with its role discriminator ([`Installer::install_operator`],
//!   [`Installer::patch_role`])
//! - the backup credential secret ([`Installer::install_backup_secret`])
//!
//! Before any of that, [`Installer::wait_for_nodes`] gates on the cluster
//! reporting enough Ready nodes.

mod operator;
mod prerequisites;

use tracing::info;

use armada_common::model::ReadinessConfig;
use armada_common::poll::{wait_until, PollPolicy};
use armada_common::session::ClusterSession;
use armada_common::tools::Toolbox;
use armada_common::Result;

use crate::credentials::put_secret;

/// Installs software onto cluster sessions
pub struct Installer<'a> {
    tools: &'a Toolbox,
    config: &'a ReadinessConfig,
}

impl<'a> Installer<'a> {
    /// Create an installer
    pub fn new(tools: &'a Toolbox, config: &'a ReadinessConfig) -> Self {
        Self { tools, config }
    }

    /// Wait until the cluster reports the expected number of Ready nodes
    pub async fn wait_for_nodes(&self, session: &ClusterSession) -> Result<()> {
        let provision = &self.config.provision_config;
        let expected = self.config.expected_node_count;
        let policy = PollPolicy::attempts(provision.default_retries, provision.default_sleep_secs);
        let description = format!("{} Ready nodes on {}", expected, session.context_name);

        let kubectl = &self.tools.kubectl;
        wait_until(&description, policy, None, || async move {
            let ready = kubectl.ready_node_count(session, expected).await?;
            Ok(ready >= expected)
        })
        .await?;
        info!(context = %session.context_name, expected, "nodes ready");
        Ok(())
    }

    /// Create the backup credential secret when one is configured
    ///
    /// Returns whether a secret was written.
    pub async fn install_backup_secret(&self, session: &ClusterSession) -> Result<bool> {
        let k8c = &self.config.provision_config.k8c_config;
        let (Some(name), Some(file)) = (&k8c.medusa_secret_name, &k8c.medusa_secret_from_file)
        else {
            return Ok(false);
        };
        let key = k8c
            .medusa_secret_from_file_key
            .as_deref()
            .unwrap_or(armada_common::MEDUSA_SECRET_KEY);
        let file = file.to_string_lossy();

        put_secret(
            &self.tools.kubectl,
            session,
            &session.namespace,
            name,
            &[(key, &*file)],
        )
        .await?;
        info!(context = %session.context_name, secret = %name, "backup secret stored");
        Ok(true)
    }
}
