//! Kube-style configuration files
//!
//! Two directions: reading the server and CA of a freshly fetched cluster out
//! of a session's own kubeconfig (via `kube::config::Kubeconfig`), and writing
//! the consolidated client configuration the control plane uses to reach
//! every data plane.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kube::config::Kubeconfig;
use serde::{Deserialize, Serialize};

use crate::session::ServiceAccountCredential;
use crate::{Error, Result};

/// Kubeconfig document as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeConfigDocument {
    /// Always `v1`
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `Config`
    pub kind: String,
    /// Named clusters
    pub clusters: Vec<NamedCluster>,
    /// Named users (auth infos)
    pub users: Vec<NamedUser>,
    /// Named contexts
    pub contexts: Vec<NamedContext>,
    /// Context selected by default
    #[serde(rename = "current-context")]
    pub current_context: String,
    /// Empty preferences block
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
}

/// Cluster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Entry name
    pub name: String,
    /// Connection details
    pub cluster: ClusterEntry,
}

/// Cluster connection details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    /// API server endpoint
    pub server: String,
    /// Base64 CA bundle
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

/// User entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Entry name
    pub name: String,
    /// Credentials
    pub user: UserEntry,
}

/// Bearer-token credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Bearer token
    pub token: String,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Context entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Entry name
    pub name: String,
    /// Cluster and user binding
    pub context: ContextEntry,
}

/// Cluster and user binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Cluster entry name
    pub cluster: String,
    /// User entry name
    pub user: String,
}

/// One cluster's contribution to the consolidated configuration
#[derive(Debug, Clone, Copy)]
pub struct ClientEntry<'a> {
    /// Fully-qualified context name
    pub full_name: &'a str,
    /// API server endpoint
    pub endpoint: &'a str,
    /// Service-account credential read from that cluster
    pub credential: &'a ServiceAccountCredential,
}

impl KubeConfigDocument {
    /// Build one document with a cluster, user and context per entry
    ///
    /// `current_context` must name one of the entries.
    pub fn consolidate(entries: &[ClientEntry<'_>], current_context: &str) -> Result<Self> {
        if !entries.iter().any(|e| e.full_name == current_context) {
            return Err(Error::Kubeconfig(format!(
                "current context {} is not among the consolidated entries",
                current_context
            )));
        }

        let mut doc = Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: Vec::with_capacity(entries.len()),
            users: Vec::with_capacity(entries.len()),
            contexts: Vec::with_capacity(entries.len()),
            current_context: current_context.to_string(),
            preferences: serde_json::Map::new(),
        };

        for entry in entries {
            doc.clusters.push(NamedCluster {
                name: entry.full_name.to_string(),
                cluster: ClusterEntry {
                    server: entry.endpoint.to_string(),
                    certificate_authority_data: STANDARD
                        .encode(&entry.credential.certificate_authority),
                },
            });
            doc.users.push(NamedUser {
                name: entry.full_name.to_string(),
                user: UserEntry {
                    token: entry.credential.token.clone(),
                },
            });
            doc.contexts.push(NamedContext {
                name: entry.full_name.to_string(),
                context: ContextEntry {
                    cluster: entry.full_name.to_string(),
                    user: entry.full_name.to_string(),
                },
            });
        }

        Ok(doc)
    }

    /// Write to `path`, replacing any previous file, owner-only permissions
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        restrict_permissions(path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Server endpoint and CA of a cluster in a kubeconfig file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    /// Cluster entry name
    pub name: String,
    /// API server endpoint
    pub server: String,
    /// Base64 CA bundle
    pub ca_data: String,
}

/// Find the cluster entry whose name contains `fragment`
///
/// Cloud credential fetches name entries after the full context name, which
/// embeds the short name, so a substring match is enough to pick the right one.
pub fn find_cluster(path: &Path, fragment: &str) -> Result<ClusterEndpoint> {
    let config = Kubeconfig::read_from(path).map_err(|e| {
        Error::Kubeconfig(format!("failed to read {}: {}", path.display(), e))
    })?;

    let named = config
        .clusters
        .iter()
        .find(|c| c.name.contains(fragment))
        .ok_or_else(|| {
            Error::Kubeconfig(format!(
                "no cluster matching {} in {}",
                fragment,
                path.display()
            ))
        })?;

    let cluster = named.cluster.as_ref().ok_or_else(|| {
        Error::Kubeconfig(format!("cluster {} has no connection details", named.name))
    })?;

    let server = cluster
        .server
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Kubeconfig(format!("cluster {} has no server", named.name)))?;

    Ok(ClusterEndpoint {
        name: named.name.clone(),
        server,
        ca_data: cluster.certificate_authority_data.clone().unwrap_or_default(),
    })
}
