//! Provision runs
//!
//! A [`ProvisionRun`] is created once per invocation and persisted to
//! `<artifactsRoot>/run.json`. A later invocation with the same
//! `provision_id` reads it back, which is how install-only runs find the
//! connection material recorded by an earlier provision-only run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::session::ConnectionInfo;
use crate::Result;

/// Workflow switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnableConfig {
    /// Exercise control flow without mutating anything
    pub simulate: bool,
    /// Destroy everything a previous run created
    pub remove_all: bool,
    /// Provision cluster infrastructure
    pub provision_infra: bool,
    /// Install and deploy onto existing clusters
    pub install: bool,
    /// Only register repositories and install prerequisites
    pub pre_install_setup: bool,
}

/// One workflow invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRun {
    /// Join key for every artifact of the run; generated when empty
    #[serde(default)]
    pub provision_id: String,
    /// Root directory of the run's artifacts
    #[serde(default)]
    pub artifacts_root_dir: PathBuf,
    /// Workflow switches
    #[serde(default)]
    pub enable: EnableConfig,
    /// Cloud identity, or the name of an environment variable holding it
    #[serde(default)]
    pub admin_identity: String,
    /// Default kubeconfig location of the operator running the tool
    #[serde(default)]
    pub kube_config_path: PathBuf,
    /// Connection material per context, filled in by provisioning
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionInfo>,
    /// Creation time of the run
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ProvisionRun {
    /// Create a run rooted at `<base>/<provision_id>`
    pub fn new(provision_id: impl Into<String>, base: &Path, enable: EnableConfig) -> Self {
        let provision_id = provision_id.into();
        Self {
            artifacts_root_dir: base.join(&provision_id),
            provision_id,
            enable,
            admin_identity: String::new(),
            kube_config_path: default_kube_config_path(),
            connections: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Artifact layout of this run
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.artifacts_root_dir)
    }

    /// Write the run to `run.json`
    pub fn persist(&self) -> Result<()> {
        let layout = self.layout();
        std::fs::create_dir_all(layout.root())?;
        std::fs::write(layout.run_file(), serde_json::to_vec_pretty(self)?)?;
        debug!(provision_id = %self.provision_id, path = %layout.run_file().display(), "persisted run");
        Ok(())
    }

    /// Read a persisted run, if one exists at `root`
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = ArtifactLayout::new(root).run_file();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Re-enter a previous run with the same id
    ///
    /// Keeps this invocation's switches and identity, and adopts connection
    /// material recorded earlier for contexts that have none yet.
    pub fn resume(mut self) -> Result<Self> {
        if let Some(previous) = Self::load(&self.artifacts_root_dir)? {
            if previous.provision_id == self.provision_id {
                info!(
                    provision_id = %self.provision_id,
                    recorded = previous.connections.len(),
                    "resuming recorded run"
                );
                for (name, info) in previous.connections {
                    self.connections.entry(name).or_insert(info);
                }
                self.created_at = previous.created_at;
            }
        }
        Ok(self)
    }

    /// Resolve `admin_identity`: an environment variable name or the identity itself
    pub fn resolved_identity(&self) -> String {
        std::env::var(&self.admin_identity)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.admin_identity.clone())
    }
}

/// `~/.kube/config`, or `.kube/config` when no home directory is known
pub fn default_kube_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".kube")
        .join("config")
}

/// Generate a short readable provision id (6 hex chars).
///
/// Cloud resource names are suffixed with it, so it stays lower-case.
pub fn generate_provision_id() -> String {
    use rand::Rng;
    format!("{:06x}", rand::thread_rng().gen_range(0..0x0100_0000u32))
}
