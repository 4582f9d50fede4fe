//! Package-manager wrapper

use std::collections::BTreeMap;

use crate::exec::{Executor, Invocation};
use crate::session::ClusterSession;
use crate::Result;

/// Audit scope of repository operations, which are not bound to a cluster
const REPO_SCOPE: &str = "helm-repositories";

/// `helm` bound to sessions
#[derive(Clone, Debug)]
pub struct Helm {
    exec: Executor,
}

impl Helm {
    /// Create the wrapper
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }

    fn base(&self, session: &ClusterSession, env: &BTreeMap<String, String>) -> Invocation {
        Invocation::new("helm")
            .args([
                "--kubeconfig".to_string(),
                session.kubeconfig_arg(),
                "--kube-context".to_string(),
                session.full_name.clone(),
            ])
            .envs(env)
    }

    /// `helm repo add <name> <url>`
    pub async fn repo_add(
        &self,
        name: &str,
        url: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let inv = Invocation::new("helm")
            .args(["repo", "add", name, url])
            .envs(env);
        self.exec.mutate(REPO_SCOPE, inv).await.map(drop)
    }

    /// `helm repo remove <name>`
    pub async fn repo_remove(&self, name: &str, env: &BTreeMap<String, String>) -> Result<()> {
        let inv = Invocation::new("helm")
            .args(["repo", "remove", name])
            .envs(env);
        self.exec.mutate(REPO_SCOPE, inv).await.map(drop)
    }

    /// `helm repo update`
    pub async fn repo_update(&self, env: &BTreeMap<String, String>) -> Result<()> {
        let inv = Invocation::new("helm").args(["repo", "update"]).envs(env);
        self.exec.mutate(REPO_SCOPE, inv).await.map(drop)
    }

    /// `helm install <release> <chart> [-n <namespace>] <extra_args>`
    ///
    /// `env` replaces the session environment for this call, so callers can
    /// add role discriminators without touching the session.
    pub async fn install(
        &self,
        session: &ClusterSession,
        release: &str,
        chart: &str,
        namespace: Option<&str>,
        extra_args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut inv = self.base(session, env).args(["install", release, chart]);
        if let Some(ns) = namespace {
            inv = inv.args(["-n", ns]);
        }
        let inv = inv.args(extra_args.iter().cloned());
        self.exec.mutate(&session.context_name, inv).await
    }

    /// `helm uninstall <release> [-n <namespace>]`
    pub async fn uninstall(
        &self,
        session: &ClusterSession,
        release: &str,
        namespace: Option<&str>,
    ) -> Result<()> {
        let mut inv = self.base(session, &session.env).args(["uninstall", release]);
        if let Some(ns) = namespace {
            inv = inv.args(["-n", ns]);
        }
        self.exec.mutate(&session.context_name, inv).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use std::path::PathBuf;

    fn session() -> ClusterSession {
        ClusterSession {
            context_name: "dc1".to_string(),
            full_name: "gke_p_r_dev-dc1".to_string(),
            endpoint: "https://10.0.0.2".to_string(),
            ca_data: String::new(),
            namespace: "k8ssandra".to_string(),
            kubeconfig: PathBuf::from("/tmp/run/gke_p_r_dev-dc1/admin.kubeconfig"),
            env: BTreeMap::new(),
            simulated: false,
        }
    }

    #[tokio::test]
    async fn story_install_carries_explicit_role_env() {
        let runner = ScriptedRunner::new();
        let helm = Helm::new(Executor::new(runner.clone(), false));
        let s = session();
        let env = s.env_with([("K8SSANDRA_CONTROL_PLANE", "false")]);

        helm.install(
            &s,
            "k8ssandra-operator",
            "k8ssandra/k8ssandra-operator",
            Some("k8ssandra"),
            &["--create-namespace".to_string()],
            &env,
        )
        .await
        .unwrap();

        let call = &runner.calls()[0];
        assert!(call.has_args(&[
            "--kube-context",
            "gke_p_r_dev-dc1",
            "install",
            "k8ssandra-operator",
            "k8ssandra/k8ssandra-operator",
            "-n",
            "k8ssandra",
            "--create-namespace"
        ]));
        assert_eq!(call.env["K8SSANDRA_CONTROL_PLANE"], "false");
        assert!(std::env::var("K8SSANDRA_CONTROL_PLANE").is_err());
    }

    #[tokio::test]
    async fn test_repo_commands() {
        let runner = ScriptedRunner::new();
        let helm = Helm::new(Executor::new(runner.clone(), false));
        let env = BTreeMap::new();

        helm.repo_remove("jetstack", &env).await.unwrap();
        helm.repo_add("jetstack", "https://charts.jetstack.io", &env)
            .await
            .unwrap();
        helm.repo_update(&env).await.unwrap();

        let rendered: Vec<String> = runner.calls().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "helm repo remove jetstack",
                "helm repo add jetstack https://charts.jetstack.io",
                "helm repo update",
            ]
        );
    }
}
