//! Provisioning stage
//!
//! Drives the infra tool once per context. Each context runs in its own copy
//! of the infra module under `<artifactsRoot>/modules/<context>/`, so
//! contexts can be provisioned in parallel without sharing any local state.
//! Per-context failures are isolated: every context is attempted and the
//! outcome reports each one.

pub mod teardown;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, error, info};

use armada_common::artifacts::ManifestRecord;
use armada_common::model::{ClusterContext, ContextSet, ReadinessConfig};
use armada_common::run::ProvisionRun;
use armada_common::session::ConnectionInfo;
use armada_common::tools::gcloud::{cloud_cluster_name, full_context_name};
use armada_common::tools::{TfOptions, Toolbox};
use armada_common::{Error, Result};

pub use teardown::{teardown, TeardownReport};

/// Sub-folder of the module copy the infra tool runs in
pub const MODULE_ENV_DIR: &str = "env";

/// Control-plane range used when the context configures none
const DEFAULT_MASTER_CIDR: &str = "10.0.0.0/28";

/// Role granted to the cluster's service account on its bucket
const STORAGE_ROLE: &str = "roles/storage.admin";

/// Result of provisioning every context
#[derive(Debug, Default)]
pub struct ProvisionOutcome {
    /// Connection material of contexts that succeeded
    pub connections: BTreeMap<String, ConnectionInfo>,
    /// Contexts that failed, with their error
    pub failures: Vec<(String, Error)>,
}

impl ProvisionOutcome {
    /// Whether every context succeeded
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Provisions cluster infrastructure for one run
pub struct Provisioner<'a> {
    tools: &'a Toolbox,
    config: &'a ReadinessConfig,
    run: &'a ProvisionRun,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner for one run
    pub fn new(tools: &'a Toolbox, config: &'a ReadinessConfig, run: &'a ProvisionRun) -> Self {
        Self { tools, config, run }
    }

    /// Provision every context concurrently
    pub async fn provision_all(&self, contexts: &ContextSet) -> ProvisionOutcome {
        let targets: Vec<&ClusterContext> = contexts.control_plane_first().collect();
        let results = join_all(targets.iter().map(|ctx| self.provision(ctx))).await;

        let mut outcome = ProvisionOutcome::default();
        for (ctx, result) in targets.into_iter().zip(results) {
            match result {
                Ok(info) => {
                    outcome.connections.insert(ctx.name.clone(), info);
                }
                Err(e) => {
                    error!(context = %ctx.name, error = %e, "provisioning failed");
                    outcome.failures.push((ctx.name.clone(), e));
                }
            }
        }
        outcome
    }

    /// Provision one context and return its connection material
    ///
    /// The manifest record is written as soon as the module copy exists and
    /// before the infra tool runs, so a failed or interrupted apply still
    /// leaves teardown something to destroy. It is rewritten with
    /// `applied: true` once the outputs are read. A failed init or plan
    /// never reaches apply.
    pub async fn provision(&self, ctx: &ClusterContext) -> Result<ConnectionInfo> {
        let layout = self.run.layout();
        let cloud = self.config.cloud_for(ctx);
        let modules_folder = layout.modules_dir(&ctx.name);
        let kubeconfig = layout.session_kubeconfig(&full_context_name(cloud, &ctx.name));

        let options = TfOptions {
            working_dir: modules_folder.join(MODULE_ENV_DIR),
            vars: infra_variables(self.config, ctx, &self.run.provision_id, &kubeconfig),
            env: BTreeMap::from([(
                cloud.cred_key.clone(),
                cloud.cred_path.to_string_lossy().to_string(),
            )]),
        };

        if self.tools.simulate() {
            info!(context = %ctx.name, "[simulate] module copy skipped");
        } else {
            stage_module(
                self.config.provision_config.tf_config.module_folder.clone(),
                modules_folder.clone(),
            )
            .await?;
        }

        let mut record = ManifestRecord {
            name: ctx.name.clone(),
            modules_folder,
            vars: options.vars.clone(),
            env: options.env.clone(),
            simulated: self.tools.simulate(),
            applied: false,
        };
        let path = layout.write_manifest(&record)?;
        debug!(context = %ctx.name, manifest = %path.display(), "footprint recorded before apply");

        info!(context = %ctx.name, cluster = %options.vars["cluster_name"], "planning infrastructure");
        self.tools.terraform.init_and_plan(&ctx.name, &options).await?;
        info!(context = %ctx.name, "applying infrastructure");
        self.tools.terraform.apply(&ctx.name, &options).await?;

        let info = if self.tools.simulate() {
            let info = ConnectionInfo::simulated(&ctx.name);
            info!(context = %ctx.name, endpoint = %info.endpoint, simulated = true, "[simulate] placeholder connection");
            info
        } else {
            let outputs = self
                .tools
                .terraform
                .outputs(&ctx.name, &options, &BTreeMap::new())
                .await?;
            connection_from_outputs(&ctx.name, &outputs)?
        };

        record.applied = true;
        layout.write_manifest(&record)?;
        info!(context = %ctx.name, manifest = %path.display(), endpoint = %info.endpoint, "provisioned");
        Ok(info)
    }
}

/// Input variables for one context's infra module
pub fn infra_variables(
    config: &ReadinessConfig,
    ctx: &ClusterContext,
    provision_id: &str,
    kubeconfig: &Path,
) -> BTreeMap<String, String> {
    let cloud = config.cloud_for(ctx);
    let network = &ctx.network_config;
    let cluster = cloud_cluster_name(cloud, &ctx.name);
    let unique = |base: &str| format!("{}-{}", base, provision_id).to_lowercase();

    let service_account = if config.service_account_name_suffix.is_empty() {
        unique(&cluster)
    } else {
        unique(&format!("{}-{}", cluster, config.service_account_name_suffix))
    };
    let bucket = if cloud.bucket.is_empty() {
        unique(&cluster)
    } else {
        unique(&cloud.bucket)
    };
    let zone = cloud.zones.first().unwrap_or(&cloud.region).clone();
    let location = cloud.locations.first().unwrap_or(&cloud.region).clone();

    let mut vars = BTreeMap::from([
        ("project_id".to_string(), cloud.project.clone()),
        ("name".to_string(), ctx.name.clone()),
        ("environment".to_string(), cloud.environment.clone()),
        ("region".to_string(), cloud.region.clone()),
        ("zone".to_string(), zone),
        ("location".to_string(), location),
        (
            "kubectl_config_path".to_string(),
            kubeconfig.to_string_lossy().to_string(),
        ),
        (
            "initial_node_count".to_string(),
            config.expected_node_count.to_string(),
        ),
        ("cluster_name".to_string(), unique(&cluster)),
        ("service_account".to_string(), service_account),
        ("machine_type".to_string(), cloud.machine_type.clone()),
        ("bucket".to_string(), bucket),
        ("role".to_string(), STORAGE_ROLE.to_string()),
        ("enable_private_endpoint".to_string(), "false".to_string()),
        ("enable_private_nodes".to_string(), "false".to_string()),
        (
            "master_ipv4_cidr_block".to_string(),
            network
                .master_ipv4_cidr_block
                .clone()
                .unwrap_or_else(|| DEFAULT_MASTER_CIDR.to_string()),
        ),
        ("bucket_policy_only".to_string(), "true".to_string()),
    ]);
    if let Some(range) = &network.subnet_cidr_range {
        vars.insert("subnet_cidr_range".to_string(), range.clone());
    }
    if let Some(range) = &network.secondary_cidr_range {
        vars.insert("secondary_cidr_range".to_string(), range.clone());
    }
    vars
}

fn connection_from_outputs(
    context: &str,
    outputs: &BTreeMap<String, String>,
) -> Result<ConnectionInfo> {
    let endpoint = outputs
        .get("endpoint")
        .filter(|e| !e.is_empty())
        .ok_or_else(|| Error::infra_apply(context, "no endpoint output"))?;
    let ca_data = outputs
        .get("ca_certificate")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::infra_apply(context, "no ca_certificate output"))?;

    let endpoint = if endpoint.starts_with("https://") {
        endpoint.clone()
    } else {
        format!("https://{}", endpoint)
    };
    Ok(ConnectionInfo {
        context_name: context.to_string(),
        endpoint,
        ca_data: ca_data.clone(),
        simulated: false,
    })
}

/// Copy the infra module into a context's private folder
///
/// An existing copy is kept as is: it holds the infra tool's state from an
/// earlier run with the same provision id. The copy runs on the blocking
/// pool so the other contexts keep making progress.
async fn stage_module(source: PathBuf, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || copy_module(&source, &dest))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn copy_module(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        info!(folder = %dest.display(), "reusing existing module copy");
        return Ok(());
    }
    if !source.is_dir() {
        return Err(Error::invalid_field(
            "provision_config.tf_config.module_folder",
            format!("{} is not a directory", source.display()),
        ));
    }
    copy_dir(source, dest)
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
