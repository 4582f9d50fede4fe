//! Cluster API wrapper
//!
//! Every call is bound to a [`ClusterSession`]: its kubeconfig, context name
//! and environment are passed explicitly on each invocation.

use tracing::debug;

use crate::exec::{Executor, Invocation};
use crate::session::ClusterSession;
use crate::Result;

/// Placeholder endpoint address returned for simulated observations
pub const SIMULATED_ENDPOINT_IP: &str = "10.0.0.1";

/// jsonpath printing one Ready-condition status per node
const NODE_READY_JSONPATH: &str =
    "jsonpath={range .items[*]}{.status.conditions[?(@.type==\"Ready\")].status}{\"\\n\"}{end}";

/// `kubectl` bound to sessions
#[derive(Clone, Debug)]
pub struct Kubectl {
    exec: Executor,
}

impl Kubectl {
    /// Create the wrapper
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }

    fn base(&self, session: &ClusterSession, namespace: Option<&str>) -> Invocation {
        let inv = Invocation::new("kubectl")
            .args([
                "--kubeconfig".to_string(),
                session.kubeconfig_arg(),
                "--context".to_string(),
                session.full_name.clone(),
            ])
            .envs(&session.env);
        match namespace {
            Some(ns) => inv.args(["-n", ns]),
            None => inv,
        }
    }

    /// `kubectl apply <args>`
    pub async fn apply(
        &self,
        session: &ClusterSession,
        namespace: Option<&str>,
        args: &[&str],
    ) -> Result<String> {
        let inv = self.base(session, namespace).arg("apply").args(args.iter().copied());
        self.exec.mutate(&session.context_name, inv).await
    }

    /// `kubectl delete <args>`
    pub async fn delete(
        &self,
        session: &ClusterSession,
        namespace: Option<&str>,
        args: &[&str],
    ) -> Result<String> {
        let inv = self.base(session, namespace).arg("delete").args(args.iter().copied());
        self.exec.mutate(&session.context_name, inv).await
    }

    /// `kubectl get <args>`; simulated calls return `placeholder`
    pub async fn get(
        &self,
        session: &ClusterSession,
        namespace: Option<&str>,
        args: &[&str],
        placeholder: &str,
    ) -> Result<String> {
        let inv = self.base(session, namespace).arg("get").args(args.iter().copied());
        self.exec
            .observe(&session.context_name, inv, placeholder)
            .await
    }

    /// Any other state-changing `kubectl` subcommand
    pub async fn exec(
        &self,
        session: &ClusterSession,
        namespace: Option<&str>,
        args: &[&str],
    ) -> Result<String> {
        let inv = self.base(session, namespace).args(args.iter().copied());
        self.exec.mutate(&session.context_name, inv).await
    }

    /// Apply a remote manifest that carries its own namespaces
    pub async fn apply_url(&self, session: &ClusterSession, url: &str) -> Result<()> {
        self.apply(session, None, &["-f", url]).await.map(drop)
    }

    /// Apply a local manifest into a namespace
    pub async fn apply_file(
        &self,
        session: &ClusterSession,
        namespace: &str,
        path: &str,
        validate: bool,
    ) -> Result<()> {
        let mut args = Vec::with_capacity(3);
        if validate {
            args.push("--validate=true");
        }
        args.extend(["-f", path]);
        self.apply(session, Some(namespace), &args).await.map(drop)
    }

    /// Delete a cluster-scoped object, tolerating its absence
    pub async fn delete_cluster_object(
        &self,
        session: &ClusterSession,
        kind: &str,
        name: &str,
    ) -> Result<()> {
        self.delete(session, None, &[kind, name, "--ignore-not-found"])
            .await
            .map(drop)
    }

    /// Create a generic secret from files, as (key, path) pairs
    pub async fn create_generic_secret(
        &self,
        session: &ClusterSession,
        namespace: &str,
        name: &str,
        files: &[(&str, &str)],
    ) -> Result<()> {
        let from_files: Vec<String> = files
            .iter()
            .map(|(key, path)| format!("--from-file={}={}", key, path))
            .collect();
        let mut args = vec!["create", "secret", "generic", name];
        args.extend(from_files.iter().map(String::as_str));
        self.exec(session, Some(namespace), &args).await.map(drop)
    }

    /// Delete a secret, tolerating its absence
    pub async fn delete_secret(
        &self,
        session: &ClusterSession,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.delete(session, Some(namespace), &["secret", name, "--ignore-not-found"])
            .await
            .map(drop)
    }

    /// Evaluate a jsonpath against one object
    pub async fn jsonpath(
        &self,
        session: &ClusterSession,
        namespace: Option<&str>,
        kind: &str,
        name: &str,
        path: &str,
        placeholder: &str,
    ) -> Result<String> {
        let output = format!("jsonpath={}", path);
        let raw = self
            .get(session, namespace, &[kind, name, "-o", &output], placeholder)
            .await?;
        Ok(unquote(&raw))
    }

    /// First address of a service's endpoints; empty when not populated yet
    pub async fn endpoint_ip(
        &self,
        session: &ClusterSession,
        namespace: &str,
        service: &str,
    ) -> Result<String> {
        let ip = self
            .jsonpath(
                session,
                Some(namespace),
                "endpoints",
                service,
                "{.subsets[0].addresses[0].ip}",
                SIMULATED_ENDPOINT_IP,
            )
            .await?;
        debug!(context = %session.context_name, service, ip = %ip, "endpoint address");
        Ok(ip)
    }

    /// Number of nodes whose Ready condition is True
    pub async fn ready_node_count(
        &self,
        session: &ClusterSession,
        simulated_count: u32,
    ) -> Result<u32> {
        let placeholder = "True\n".repeat(simulated_count as usize);
        let out = self
            .get(session, None, &["nodes", "-o", NODE_READY_JSONPATH], &placeholder)
            .await?;
        Ok(out.lines().filter(|l| l.trim() == "True").count() as u32)
    }

    /// Set an environment variable on a deployment's containers
    pub async fn set_env(
        &self,
        session: &ClusterSession,
        namespace: &str,
        deployment: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let target = format!("deployment/{}", deployment);
        let assignment = format!("{}={}", key, value);
        self.exec(session, Some(namespace), &["set", "env", &target, &assignment])
            .await
            .map(drop)
    }

    /// Trigger a rolling restart of a deployment
    pub async fn rollout_restart(
        &self,
        session: &ClusterSession,
        namespace: &str,
        deployment: &str,
    ) -> Result<()> {
        let target = format!("deployment/{}", deployment);
        self.exec(session, Some(namespace), &["rollout", "restart", &target])
            .await
            .map(drop)
    }

    /// Delete pods matching a label selector
    pub async fn delete_pods(
        &self,
        session: &ClusterSession,
        namespace: &str,
        selector: &str,
    ) -> Result<()> {
        self.delete(session, Some(namespace), &["pod", "-l", selector, "--ignore-not-found"])
            .await
            .map(drop)
    }

    /// Block until every CRD in the cluster reports `established`
    pub async fn wait_crds_established(
        &self,
        session: &ClusterSession,
        timeout_secs: u64,
    ) -> Result<()> {
        let timeout = format!("--timeout={}s", timeout_secs);
        let inv = self.base(session, None).args([
            "wait",
            "--for",
            "condition=established",
            timeout.as_str(),
            "--all",
            "crd",
        ]);
        self.exec
            .observe(&session.context_name, inv, "")
            .await
            .map(drop)
    }
}

/// Trim whitespace and one pair of surrounding single quotes
///
/// An unpopulated jsonpath printed through a quoted template comes back as
/// the two-character string `''`; both that and the empty string mean "none".
pub fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn session() -> ClusterSession {
        ClusterSession {
            context_name: "cp".to_string(),
            full_name: "gke_p_r_dev-cp".to_string(),
            endpoint: "https://10.0.0.1".to_string(),
            ca_data: String::new(),
            namespace: "k8ssandra".to_string(),
            kubeconfig: PathBuf::from("/tmp/run/gke_p_r_dev-cp/admin.kubeconfig"),
            env: BTreeMap::from([(
                "KUBECONFIG".to_string(),
                "/tmp/run/gke_p_r_dev-cp/admin.kubeconfig".to_string(),
            )]),
            simulated: false,
        }
    }

    #[test]
    fn test_unquote_sentinels() {
        assert_eq!(unquote("''"), "");
        assert_eq!(unquote("  "), "");
        assert_eq!(unquote("'10.4.0.7'\n"), "10.4.0.7");
        assert_eq!(unquote("10.4.0.7"), "10.4.0.7");
    }

    #[tokio::test]
    async fn story_every_call_is_bound_to_its_session() {
        let runner = ScriptedRunner::new();
        runner.respond("kubectl", &["get", "endpoints"], "'10.4.0.7'");
        let kubectl = Kubectl::new(Executor::new(runner.clone(), false));
        let s = session();

        let ip = kubectl
            .endpoint_ip(&s, "k8ssandra", "k8ssandra-operator-webhook-service")
            .await
            .unwrap();
        assert_eq!(ip, "10.4.0.7");

        let call = &runner.calls()[0];
        assert!(call.has_args(&[
            "--kubeconfig",
            "/tmp/run/gke_p_r_dev-cp/admin.kubeconfig",
            "--context",
            "gke_p_r_dev-cp",
            "-n",
            "k8ssandra"
        ]));
        assert_eq!(
            call.env["KUBECONFIG"],
            "/tmp/run/gke_p_r_dev-cp/admin.kubeconfig"
        );
    }

    #[tokio::test]
    async fn test_generic_secret_is_created_from_files() {
        let runner = ScriptedRunner::new();
        let kubectl = Kubectl::new(Executor::new(runner.clone(), false));

        kubectl
            .create_generic_secret(
                &session(),
                "k8ssandra",
                "k8s-contexts",
                &[("kubeconfig", "/tmp/run/gke_p_r_dev-cp/kubeconfig")],
            )
            .await
            .unwrap();

        let call = &runner.calls()[0];
        assert!(call.has_args(&[
            "create",
            "secret",
            "generic",
            "k8s-contexts",
            "--from-file=kubeconfig=/tmp/run/gke_p_r_dev-cp/kubeconfig"
        ]));
    }

    #[tokio::test]
    async fn test_ready_node_count() {
        let runner = ScriptedRunner::new();
        runner.respond("kubectl", &["get", "nodes"], "True\nFalse\nTrue\n");
        let kubectl = Kubectl::new(Executor::new(runner.clone(), false));
        assert_eq!(kubectl.ready_node_count(&session(), 0).await.unwrap(), 2);

        let simulated = Kubectl::new(Executor::new(Arc::new(ScriptedRunner::default()), true));
        assert_eq!(simulated.ready_node_count(&session(), 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_validated_apply_and_restart_arguments() {
        let runner = ScriptedRunner::new();
        let kubectl = Kubectl::new(Executor::new(runner.clone(), false));
        let s = session();

        kubectl
            .apply_file(&s, "k8ssandra", "/cfg/k8c.yaml", true)
            .await
            .unwrap();
        kubectl
            .rollout_restart(&s, "k8ssandra", "k8ssandra-operator")
            .await
            .unwrap();

        let calls = runner.calls();
        assert!(calls[0].has_args(&["apply", "--validate=true", "-f", "/cfg/k8c.yaml"]));
        assert!(calls[1].has_args(&["rollout", "restart", "deployment/k8ssandra-operator"]));
    }
}
