//! `ClientConfig` resource registering a data plane with the control plane

use std::path::Path;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use armada_common::Result;

/// API version of the ClientConfig resource
pub const API_VERSION: &str = "config.k8ssandra.io/v1beta1";

/// Kind of the ClientConfig resource
pub const KIND: &str = "ClientConfig";

/// Points the control-plane operator at one context of the consolidated
/// client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Always [`API_VERSION`]
    pub api_version: String,
    /// Always [`KIND`]
    pub kind: String,
    /// Object metadata
    pub metadata: ObjectMeta,
    /// Context and secret to use
    pub spec: ClientConfigSpec,
}

/// Spec of a [`ClientConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigSpec {
    /// Context inside the consolidated configuration
    pub context_name: String,
    /// Secret holding the consolidated configuration
    pub kube_config_secret: SecretName,
}

/// Reference to a secret in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretName {
    /// Secret name
    pub name: String,
}

impl ClientConfig {
    /// ClientConfig for a data plane, created in the control plane's namespace
    ///
    /// Resource names cannot contain `_`, so the full context name is
    /// rewritten with `-`.
    pub fn for_data_plane(full_name: &str, namespace: &str) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ObjectMeta {
                name: Some(full_name.replace('_', "-")),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: ClientConfigSpec {
                context_name: full_name.to_string(),
                kube_config_secret: SecretName {
                    name: armada_common::CONTEXTS_SECRET.to_string(),
                },
            },
        }
    }

    /// Resource name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Write as YAML, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}
