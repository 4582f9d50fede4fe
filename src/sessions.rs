//! Opening cluster sessions
//!
//! A session is opened by fetching the cluster's credentials into a
//! kubeconfig file owned by that session alone, then reading the server and
//! CA back out of it. Contexts never share a kubeconfig path.

use std::collections::BTreeMap;

use tracing::{info, warn};

use armada_common::kubeconfig::find_cluster;
use armada_common::model::{ClusterContext, ContextSet, ReadinessConfig};
use armada_common::run::ProvisionRun;
use armada_common::session::{ClusterSession, ConnectionInfo};
use armada_common::tools::gcloud::{full_context_name, identity_env};
use armada_common::tools::Toolbox;
use armada_common::Result;

/// Opens authenticated sessions for a run
pub struct SessionFactory<'a> {
    tools: &'a Toolbox,
    config: &'a ReadinessConfig,
    run: &'a ProvisionRun,
}

impl<'a> SessionFactory<'a> {
    /// Create a factory for one run
    pub fn new(tools: &'a Toolbox, config: &'a ReadinessConfig, run: &'a ProvisionRun) -> Self {
        Self { tools, config, run }
    }

    /// Switch the cloud CLI to the run's admin identity
    pub async fn switch_identity(&self) -> Result<()> {
        let identity = self.run.resolved_identity();
        let cloud = &self.config.provision_config.cloud_config;
        let env = identity_env(&self.run.kube_config_path, &identity, &cloud.cred_path);
        info!(identity = %identity, "switching cloud identity");
        self.tools.cloud.switch_identity(&identity, &env).await
    }

    /// Open a session for one context
    pub async fn open(&self, ctx: &ClusterContext) -> Result<ClusterSession> {
        let cloud = self.config.cloud_for(ctx);
        let full_name = full_context_name(cloud, &ctx.name);
        let kubeconfig = self.run.layout().session_kubeconfig(&full_name);
        let env = identity_env(&kubeconfig, &self.run.resolved_identity(), &cloud.cred_path);

        if let Some(parent) = kubeconfig.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.tools.cloud.fetch_credentials(&ctx.name, cloud, &env).await?;

        let (endpoint, ca_data) = if self.tools.simulate() {
            let info = self
                .run
                .connections
                .get(&ctx.name)
                .cloned()
                .unwrap_or_else(|| ConnectionInfo::simulated(&ctx.name));
            (info.endpoint, info.ca_data)
        } else {
            let cluster = find_cluster(&kubeconfig, &ctx.name)?;
            if let Some(recorded) = self.run.connections.get(&ctx.name) {
                if recorded.endpoint != cluster.server {
                    warn!(
                        context = %ctx.name,
                        recorded = %recorded.endpoint,
                        fetched = %cluster.server,
                        "fetched endpoint differs from the one recorded at provisioning"
                    );
                }
            }
            (cluster.server, cluster.ca_data)
        };

        info!(context = %ctx.name, full_name = %full_name, endpoint = %endpoint, "session opened");
        Ok(ClusterSession {
            context_name: ctx.name.clone(),
            full_name,
            endpoint,
            ca_data,
            namespace: ctx.namespace.clone(),
            kubeconfig,
            env,
            simulated: self.tools.simulate(),
        })
    }

    /// Open a session per context, control plane first; stops at the first failure
    pub async fn open_all(&self, contexts: &ContextSet) -> Result<BTreeMap<String, ClusterSession>> {
        let mut sessions = BTreeMap::new();
        for ctx in contexts.control_plane_first() {
            let session = self.open(ctx).await.map_err(|e| {
                warn!(context = %ctx.name, error = %e, "failed to open session");
                e
            })?;
            sessions.insert(ctx.name.clone(), session);
        }
        Ok(sessions)
    }
}

/// Connection material of an open session
pub fn connection_of(session: &ClusterSession) -> ConnectionInfo {
    ConnectionInfo {
        context_name: session.context_name.clone(),
        endpoint: session.endpoint.clone(),
        ca_data: session.ca_data.clone(),
        simulated: session.simulated,
    }
}
