//! On-disk layout of a run's artifacts
//!
//! ```text
//! <root>/                       one directory per provisionId
//!   run.json                    persisted ProvisionRun
//!   manifests/<context>.json    infra footprint record per context
//!   modules/<context>/          private copy of the infra module
//!   <fullName>/admin.kubeconfig session credentials
//!   <fullName>/kubeconfig       consolidated client configuration
//!   <fullName>/<context>-client_config.yaml
//! ```
//!
//! Every context writes below its own sub-path; nothing is shared between
//! contexts except `run.json`, which only the orchestrator writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

const RUN_FILE: &str = "run.json";
const MANIFESTS_DIR: &str = "manifests";
const MODULES_DIR: &str = "modules";
const SESSION_KUBECONFIG: &str = "admin.kubeconfig";
const CLIENT_KUBECONFIG: &str = "kubeconfig";

/// Paths of one run's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted run state
    pub fn run_file(&self) -> PathBuf {
        self.root.join(RUN_FILE)
    }

    /// Directory of manifest records
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join(MANIFESTS_DIR)
    }

    /// Manifest record of one context
    pub fn manifest_path(&self, context: &str) -> PathBuf {
        self.manifests_dir().join(format!("{}.json", context))
    }

    /// Private copy of the infra module for one context
    pub fn modules_dir(&self, context: &str) -> PathBuf {
        self.root.join(MODULES_DIR).join(context)
    }

    /// Per-context directory, named by the fully-qualified context name
    pub fn context_dir(&self, full_name: &str) -> PathBuf {
        self.root.join(full_name)
    }

    /// Kubeconfig owned by one session
    pub fn session_kubeconfig(&self, full_name: &str) -> PathBuf {
        self.context_dir(full_name).join(SESSION_KUBECONFIG)
    }

    /// Consolidated client configuration written for one context
    pub fn client_kubeconfig(&self, full_name: &str) -> PathBuf {
        self.context_dir(full_name).join(CLIENT_KUBECONFIG)
    }

    /// ClientConfig manifest for one context
    pub fn client_config(&self, full_name: &str, context: &str) -> PathBuf {
        self.context_dir(full_name)
            .join(format!("{}-client_config.yaml", context))
    }

    /// Whether `path` lies inside the root
    ///
    /// Compares canonical paths when both exist, so `..` segments and
    /// symlinks cannot escape.
    pub fn contains(&self, path: &Path) -> bool {
        match (self.root.canonicalize(), path.canonicalize()) {
            (Ok(root), Ok(path)) => path.starts_with(&root) && path != root,
            _ => {
                path.starts_with(&self.root)
                    && path != self.root
                    && !path
                        .components()
                        .any(|c| matches!(c, std::path::Component::ParentDir))
            }
        }
    }

    /// Persist a manifest record
    pub fn write_manifest(&self, record: &ManifestRecord) -> Result<PathBuf> {
        let path = self.manifest_path(&record.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(record)?)?;
        Ok(path)
    }

    /// All manifest records, sorted by context name
    ///
    /// A missing manifests directory yields an empty list.
    pub fn read_manifests(&self) -> Result<Vec<ManifestRecord>> {
        let dir = self.manifests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read(&path)?;
            records.push(serde_json::from_slice::<ManifestRecord>(&data)?);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Module folders under `modules/` that no manifest record names
    pub fn unrecorded_modules(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(MODULES_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let recorded: Vec<PathBuf> = self
            .read_manifests()?
            .into_iter()
            .map(|r| r.modules_folder)
            .collect();
        let mut orphans = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() && !recorded.contains(&path) {
                orphans.push(path);
            }
        }
        orphans.sort();
        Ok(orphans)
    }

    /// Remove a manifest record; a missing record is not an error
    pub fn remove_manifest(&self, context: &str) -> Result<()> {
        match std::fs::remove_file(self.manifest_path(context)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Everything teardown needs to destroy one context's infrastructure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Context name
    pub name: String,
    /// Private copy of the infra module
    pub modules_folder: PathBuf,
    /// Variables the module was applied with
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Environment the infra tool ran with
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Written by a simulated run; nothing to destroy
    #[serde(default)]
    pub simulated: bool,
    /// Apply completed and its outputs were read
    ///
    /// Records are written before apply, so a record with `applied: false`
    /// marks a footprint that may be partially created.
    #[serde(default)]
    pub applied: bool,
}
