//! Fixtures shared by the stage tests

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use armada_common::model::{
    CloudConfig, ClusterContext, ClusterLabel, NetworkConfig, ProvisionConfig, ReadinessConfig,
};
use armada_common::run::{EnableConfig, ProvisionRun};
use armada_common::session::ClusterSession;
use armada_common::testing::ScriptedRunner;
use armada_common::tools::gcloud::{full_context_name, identity_env};

pub const PROVISION_ID: &str = "abc123";

pub fn cloud() -> CloudConfig {
    CloudConfig {
        cloud_type: "gcp".to_string(),
        region: "us-central1".to_string(),
        project: "community-ecosystem".to_string(),
        environment: "dev".to_string(),
        cred_path: "/creds/sa.json".into(),
        cred_key: "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
        machine_type: "e2-standard-4".to_string(),
        ..Default::default()
    }
}

fn context(name: &str, label: ClusterLabel) -> (String, ClusterContext) {
    (
        name.to_string(),
        ClusterContext {
            name: name.to_string(),
            namespace: "k8ssandra".to_string(),
            cluster_labels: [label].into_iter().collect(),
            cloud_config: None,
            network_config: NetworkConfig::default(),
        },
    )
}

/// A control plane named `cp` plus one data plane per name
pub fn readiness(data_planes: &[&str]) -> ReadinessConfig {
    let mut contexts: BTreeMap<String, ClusterContext> =
        [context("cp", ClusterLabel::ControlPlane)].into();
    contexts.extend(
        data_planes
            .iter()
            .map(|name| context(name, ClusterLabel::DataPlane)),
    );

    ReadinessConfig {
        provision_config: ProvisionConfig {
            cloud_config: cloud(),
            ..Default::default()
        },
        contexts,
        service_account_name_suffix: String::new(),
        expected_node_count: 1,
    }
}

/// [`readiness`] with an infra module folder created under `dir`
pub fn readiness_with_module(dir: &Path, data_planes: &[&str]) -> ReadinessConfig {
    let module = dir.join("module");
    let env = module.join("env");
    std::fs::create_dir_all(&env).unwrap();
    std::fs::write(env.join("main.tf"), "module \"gke\" {}\n").unwrap();
    std::fs::write(module.join("variables.tf"), "variable \"name\" {}\n").unwrap();

    let mut config = readiness(data_planes);
    config.provision_config.tf_config.module_folder = module;
    config
}

/// A run rooted under `base`
pub fn run_in(base: &Path, simulate: bool) -> ProvisionRun {
    let mut run = ProvisionRun::new(
        PROVISION_ID,
        base,
        EnableConfig {
            simulate,
            ..Default::default()
        },
    );
    run.admin_identity = "admin@community-ecosystem.iam.gserviceaccount.com".to_string();
    run.kube_config_path = base.join("kube").join("config");
    run
}

/// Answer credential fetches by writing a kubeconfig where the cloud CLI would
pub fn script_credentials(runner: &ScriptedRunner, config: &ReadinessConfig) {
    let cloud = config.provision_config.cloud_config.clone();
    runner.on(move |inv| {
        if inv.program != "gcloud" || !inv.has_arg("get-credentials") {
            return None;
        }
        let position = inv.args.iter().position(|a| a == "get-credentials")?;
        let cluster = inv.args.get(position + 1)?;
        let name = format!("gke_{}_{}_{}", cloud.project, cloud.region, cluster);
        let kubeconfig = format!(
            "apiVersion: v1\nkind: Config\nclusters:\n- name: {name}\n  cluster:\n    server: https://{cluster}.example.internal\n    certificate-authority-data: {ca}\ncontexts:\n- name: {name}\n  context:\n    cluster: {name}\n    user: {name}\nusers:\n- name: {name}\n  user: {{}}\ncurrent-context: {name}\n",
            name = name,
            cluster = cluster,
            ca = STANDARD.encode(format!("ca-{}", cluster)),
        );
        let path = inv.env.get("KUBECONFIG")?;
        Some(
            std::fs::write(path, kubeconfig)
                .map(|_| String::new())
                .map_err(Into::into),
        )
    });
}

/// Answer the operator service-account and secret lookups
pub fn script_service_accounts(runner: &ScriptedRunner) {
    runner.respond(
        "kubectl",
        &["get", "serviceaccount", "k8ssandra-operator"],
        "k8ssandra-operator-token-x7k2p",
    );
    runner.respond(
        "kubectl",
        &["-o", "jsonpath={.data.token}"],
        &STANDARD.encode("operator-token"),
    );
    runner.respond(
        "kubectl",
        &["-o", "jsonpath={.data['ca.crt']}"],
        &STANDARD.encode("-----BEGIN CERTIFICATE-----"),
    );
}

/// A live-looking session for context `name` with its kubeconfig under `dir`
pub fn session_in(dir: &Path, name: &str) -> ClusterSession {
    let full_name = full_context_name(&cloud(), name);
    let kubeconfig = dir.join(&full_name).join("admin.kubeconfig");
    let env = identity_env(
        &kubeconfig,
        "admin@community-ecosystem.iam.gserviceaccount.com",
        Path::new("/creds/sa.json"),
    );
    ClusterSession {
        context_name: name.to_string(),
        full_name,
        endpoint: format!("https://{}.example.internal", name),
        ca_data: STANDARD.encode(format!("ca-{}", name)),
        namespace: "k8ssandra".to_string(),
        kubeconfig,
        env,
        simulated: false,
    }
}
