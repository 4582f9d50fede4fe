//! Cloud CLI wrapper and naming helpers

use std::collections::BTreeMap;
use std::path::Path;

use crate::exec::{Executor, Invocation};
use crate::model::CloudConfig;
use crate::Result;

/// Audit scope of identity changes, which are not bound to a cluster
const IDENTITY_SCOPE: &str = "cloud-identity";

/// `gcloud`
#[derive(Clone, Debug)]
pub struct CloudCli {
    exec: Executor,
}

impl CloudCli {
    /// Create the wrapper
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }

    /// `gcloud config set account <identity>`
    pub async fn switch_identity(
        &self,
        identity: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let inv = Invocation::new("gcloud")
            .args(["config", "set", "account", identity])
            .envs(env);
        self.exec.mutate(IDENTITY_SCOPE, inv).await.map(drop)
    }

    /// Fetch cluster credentials into the kubeconfig named by `env`
    pub async fn fetch_credentials(
        &self,
        context: &str,
        cloud: &CloudConfig,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let inv = Invocation::new("gcloud")
            .args(["container", "clusters", "get-credentials"])
            .arg(cloud_cluster_name(cloud, context))
            .args(["--region", cloud.region.as_str(), "--project", cloud.project.as_str()])
            .envs(env);
        self.exec.mutate(context, inv).await.map(drop)
    }
}

/// `gke_<project>_<region>_<environment>-<name>`
pub fn full_context_name(cloud: &CloudConfig, context: &str) -> String {
    format!(
        "gke_{}_{}_{}",
        cloud.project,
        cloud.region,
        cloud_cluster_name(cloud, context)
    )
}

/// `<environment>-<name>`
pub fn cloud_cluster_name(cloud: &CloudConfig, context: &str) -> String {
    format!("{}-{}", cloud.environment, context)
}

/// `<cloudClusterName>-<suffix>@<identity domain>`
pub fn service_account_identity(cloud_cluster: &str, suffix: &str) -> String {
    format!("{}-{}@{}", cloud_cluster, suffix, crate::IDENTITY_DOMAIN)
}

/// Explicit environment for identity-bound cloud calls
pub fn identity_env(
    kubeconfig: &Path,
    identity: &str,
    credentials: &Path,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "KUBECONFIG".to_string(),
            kubeconfig.to_string_lossy().to_string(),
        ),
        ("GOOGLE_IDENTITY_EMAIL".to_string(), identity.to_string()),
        (
            "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
            credentials.to_string_lossy().to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn cloud() -> CloudConfig {
        CloudConfig {
            project: "community-ecosystem".to_string(),
            region: "us-central1".to_string(),
            environment: "dev".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_naming() {
        let cloud = cloud();
        assert_eq!(
            full_context_name(&cloud, "rio-c1walle100"),
            "gke_community-ecosystem_us-central1_dev-rio-c1walle100"
        );
        assert_eq!(cloud_cluster_name(&cloud, "dc1"), "dev-dc1");
        assert_eq!(
            service_account_identity("dev-dc1", "sa"),
            "dev-dc1-sa@community-ecosystem.iam.gserviceaccount.com"
        );
    }

    #[tokio::test]
    async fn story_credentials_land_in_the_session_kubeconfig() {
        let runner = ScriptedRunner::new();
        let cli = CloudCli::new(Executor::new(runner.clone(), false));
        let env = identity_env(
            Path::new("/tmp/run/gke_x/admin.kubeconfig"),
            "admin@example.com",
            Path::new("/creds/sa.json"),
        );

        cli.switch_identity("admin@example.com", &env).await.unwrap();
        cli.fetch_credentials("dc1", &cloud(), &env).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].to_string(), "gcloud config set account admin@example.com");
        assert!(calls[1].has_args(&[
            "get-credentials",
            "dev-dc1",
            "--region",
            "us-central1",
            "--project",
            "community-ecosystem"
        ]));
        assert_eq!(calls[1].env["KUBECONFIG"], "/tmp/run/gke_x/admin.kubeconfig");
        assert_eq!(calls[1].env["GOOGLE_IDENTITY_EMAIL"], "admin@example.com");
    }
}
