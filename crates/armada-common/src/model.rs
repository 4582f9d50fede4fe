//! Context model: typed description of every cluster taking part in a run
//!
//! Field names follow the snake_case YAML used by readiness configuration
//! files. A [`ContextSet`] is the validated, immutable view the stages use.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Label a cluster context carries to mark its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterLabel {
    /// Hosts the coordinating operator
    ControlPlane,
    /// Hosts database workloads
    DataPlane,
}

/// Role an operator is installed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRole {
    /// The single coordinating cluster
    ControlPlane,
    /// A cluster directed by the control plane
    DataPlane,
}

impl ClusterRole {
    /// Whether this is the control-plane role
    pub fn is_control_plane(self) -> bool {
        matches!(self, Self::ControlPlane)
    }

    /// Value used for the operator's role discriminator
    pub fn discriminator(self) -> &'static str {
        if self.is_control_plane() {
            "true"
        } else {
            "false"
        }
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlPlane => write!(f, "control-plane"),
            Self::DataPlane => write!(f, "data-plane"),
        }
    }
}

/// Cloud parameters for provisioning and naming a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Provider type (only `gcp` naming is implemented)
    #[serde(rename = "type")]
    pub cloud_type: String,
    /// Node locations
    pub locations: Vec<String>,
    /// Availability zones
    pub zones: Vec<String>,
    /// Region
    pub region: String,
    /// Cloud project id
    pub project: String,
    /// Base name for cloud resources
    pub name: String,
    /// Path to the cloud credential file
    pub cred_path: PathBuf,
    /// Environment variable the infra tool reads the credential path from
    pub cred_key: String,
    /// Environment prefix used in cluster names
    pub environment: String,
    /// Node machine type
    pub machine_type: String,
    /// Storage bucket base name
    pub bucket: String,
}

/// Network parameters for a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Values file for the ingress controller chart
    pub traefik_values_file: Option<PathBuf>,
    /// Ingress controller chart version; ingress is skipped when unset
    pub traefik_version: Option<String>,
    /// Primary subnet range
    pub subnet_cidr_range: Option<String>,
    /// Secondary (pod) range
    pub secondary_cidr_range: Option<String>,
    /// Control-plane range for private clusters
    pub master_ipv4_cidr_block: Option<String>,
}

/// One target cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterContext {
    /// Short context name, unique within a run
    #[serde(default)]
    pub name: String,
    /// Namespace the product is installed into
    pub namespace: String,
    /// Role labels
    #[serde(default)]
    pub cluster_labels: BTreeSet<ClusterLabel>,
    /// Per-context cloud override; the shared provision cloud config applies otherwise
    #[serde(default)]
    pub cloud_config: Option<CloudConfig>,
    /// Network parameters
    #[serde(default)]
    pub network_config: NetworkConfig,
}

impl ClusterContext {
    /// Whether the context carries the control-plane label
    pub fn is_control_plane(&self) -> bool {
        self.cluster_labels.contains(&ClusterLabel::ControlPlane)
    }

    /// Whether the context carries the data-plane label
    pub fn is_data_plane(&self) -> bool {
        self.cluster_labels.contains(&ClusterLabel::DataPlane)
    }

    /// Role the operator is installed with in this context
    pub fn role(&self) -> ClusterRole {
        if self.is_control_plane() {
            ClusterRole::ControlPlane
        } else {
            ClusterRole::DataPlane
        }
    }
}

/// Infra tool settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfConfig {
    /// Folder holding the infra module; copied per context before use
    pub module_folder: PathBuf,
}

/// Product settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct K8cConfig {
    /// Operator chart version; the latest is used when unset
    pub version: Option<String>,
    /// Name of the backup credential secret
    pub medusa_secret_name: Option<String>,
    /// Key inside the backup credential secret
    pub medusa_secret_from_file_key: Option<String>,
    /// File holding the backup credentials
    pub medusa_secret_from_file: Option<PathBuf>,
    /// Top-level multi-datacenter manifest
    pub values_file_path: Option<PathBuf>,
    /// Install the operator cluster-scoped
    pub cluster_scoped: bool,
    /// Name of the deployed database cluster
    pub cluster_name: String,
    /// Whether the chart takes the role discriminator as an install-time value
    pub role_via_chart_value: bool,
}

impl Default for K8cConfig {
    fn default() -> Self {
        Self {
            version: None,
            medusa_secret_name: None,
            medusa_secret_from_file_key: None,
            medusa_secret_from_file: None,
            values_file_path: None,
            cluster_scoped: false,
            cluster_name: String::new(),
            role_via_chart_value: true,
        }
    }
}

/// Shared provisioning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Poll attempts for node readiness
    pub default_retries: u32,
    /// Seconds between node readiness polls
    pub default_sleep_secs: u64,
    /// Bound on the wait for every CRD to be established before deploying
    pub default_timeout_secs: u64,
    /// Timeout for the operator's webhook endpoint
    pub webhook_timeout_secs: u64,
    /// Delay after applying the cluster manifest
    pub settle_secs: u64,
    /// Cloud parameters shared by all contexts
    pub cloud_config: CloudConfig,
    /// Infra tool settings
    pub tf_config: TfConfig,
    /// Product settings
    pub k8c_config: K8cConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            default_retries: crate::DEFAULT_RETRIES,
            default_sleep_secs: crate::DEFAULT_SLEEP_SECS,
            default_timeout_secs: crate::DEFAULT_TIMEOUT_SECS,
            webhook_timeout_secs: crate::DEFAULT_WEBHOOK_TIMEOUT_SECS,
            settle_secs: crate::DEFAULT_SETTLE_SECS,
            cloud_config: CloudConfig::default(),
            tf_config: TfConfig::default(),
            k8c_config: K8cConfig::default(),
        }
    }
}

/// Everything a run needs to know about the target clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Shared provisioning settings
    #[serde(default)]
    pub provision_config: ProvisionConfig,
    /// Target clusters keyed by context name
    pub contexts: BTreeMap<String, ClusterContext>,
    /// Suffix of the cloud service-account identity
    #[serde(default)]
    pub service_account_name_suffix: String,
    /// Nodes each cluster must report ready before install
    #[serde(default = "default_node_count")]
    pub expected_node_count: u32,
}

fn default_node_count() -> u32 {
    1
}

impl ReadinessConfig {
    /// Cloud parameters in effect for a context
    pub fn cloud_for<'a>(&'a self, ctx: &'a ClusterContext) -> &'a CloudConfig {
        ctx.cloud_config
            .as_ref()
            .unwrap_or(&self.provision_config.cloud_config)
    }

    /// Validate the contexts and return the immutable view used by the stages
    pub fn context_set(&self) -> Result<ContextSet> {
        ContextSet::new(self.contexts.clone())
    }
}

/// Validated set of contexts for one run
///
/// Exactly one context carries `control-plane`. Every other context is a
/// data plane whether or not it carries the label explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSet {
    contexts: BTreeMap<String, ClusterContext>,
    control_plane: String,
}

impl ContextSet {
    /// Validate contexts, filling empty names from their keys
    pub fn new(mut contexts: BTreeMap<String, ClusterContext>) -> Result<Self> {
        if contexts.is_empty() {
            return Err(Error::invalid_field("contexts", "at least one context is required"));
        }

        for (key, ctx) in contexts.iter_mut() {
            if ctx.name.is_empty() {
                ctx.name = key.clone();
            }
            if &ctx.name != key {
                return Err(Error::invalid_field(
                    format!("contexts.{}.name", key),
                    format!("name '{}' does not match its key", ctx.name),
                ));
            }
            validate_dns_label(key)?;
            if ctx.namespace.trim().is_empty() {
                return Err(Error::invalid_field(
                    format!("contexts.{}.namespace", key),
                    "namespace must not be empty",
                ));
            }
        }

        let control_planes: Vec<&String> = contexts
            .iter()
            .filter(|(_, ctx)| ctx.is_control_plane())
            .map(|(name, _)| name)
            .collect();

        let control_plane = match control_planes.as_slice() {
            [one] => (*one).clone(),
            [] => {
                return Err(Error::invalid_field(
                    "contexts",
                    "exactly one context must carry the control-plane label, found none",
                ))
            }
            many => {
                return Err(Error::invalid_field(
                    "contexts",
                    format!(
                        "exactly one context must carry the control-plane label, found {}",
                        many.iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                ))
            }
        };

        Ok(Self {
            contexts,
            control_plane,
        })
    }

    /// The control-plane context
    pub fn control_plane(&self) -> &ClusterContext {
        &self.contexts[&self.control_plane]
    }

    /// Every context other than the control plane, in name order
    pub fn data_planes(&self) -> impl Iterator<Item = &ClusterContext> {
        self.contexts
            .values()
            .filter(move |ctx| ctx.name != self.control_plane)
    }

    /// All contexts, control plane first
    pub fn control_plane_first(&self) -> impl Iterator<Item = &ClusterContext> {
        std::iter::once(self.control_plane()).chain(self.data_planes())
    }

    /// Look up a context by name
    pub fn get(&self, name: &str) -> Option<&ClusterContext> {
        self.contexts.get(name)
    }

    /// Number of contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Always false for a validated set
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

fn validate_dns_label(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_field(
            format!("contexts.{}", name),
            "context names must be lower-case DNS labels",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(name: &str, labels: &[ClusterLabel]) -> ClusterContext {
        ClusterContext {
            name: name.to_string(),
            namespace: "k8ssandra".to_string(),
            cluster_labels: labels.iter().copied().collect(),
            cloud_config: None,
            network_config: NetworkConfig::default(),
        }
    }

    fn set(entries: Vec<ClusterContext>) -> Result<ContextSet> {
        ContextSet::new(entries.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    #[test]
    fn story_one_control_plane_and_many_data_planes() {
        let contexts = set(vec![
            context("dc2", &[ClusterLabel::DataPlane]),
            context("cp", &[ClusterLabel::ControlPlane, ClusterLabel::DataPlane]),
            context("dc1", &[ClusterLabel::DataPlane]),
        ])
        .unwrap();

        assert_eq!(contexts.control_plane().name, "cp");
        let order: Vec<_> = contexts
            .control_plane_first()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(order, vec!["cp", "dc1", "dc2"]);
        assert_eq!(contexts.data_planes().count(), 2);
        assert!(contexts.control_plane().is_data_plane());
    }

    #[test]
    fn story_control_plane_label_is_required_exactly_once() {
        let none = set(vec![context("dc1", &[ClusterLabel::DataPlane])]);
        assert!(none.unwrap_err().to_string().contains("found none"));

        let two = set(vec![
            context("a", &[ClusterLabel::ControlPlane]),
            context("b", &[ClusterLabel::ControlPlane]),
        ]);
        assert!(two.unwrap_err().to_string().contains("a, b"));
    }

    #[test]
    fn test_names_fill_from_keys_and_must_match() {
        let mut unnamed = context("", &[ClusterLabel::ControlPlane]);
        unnamed.name.clear();
        let contexts = ContextSet::new([("cp".to_string(), unnamed)].into()).unwrap();
        assert_eq!(contexts.control_plane().name, "cp");

        let mismatched = context("other", &[ClusterLabel::ControlPlane]);
        let err = ContextSet::new([("cp".to_string(), mismatched)].into()).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_rejects_bad_names_and_empty_namespace() {
        assert!(set(vec![context("Bad_Name", &[ClusterLabel::ControlPlane])]).is_err());

        let mut no_ns = context("cp", &[ClusterLabel::ControlPlane]);
        no_ns.namespace = " ".to_string();
        assert!(set(vec![no_ns]).is_err());
    }

    #[test]
    fn test_role_discriminator() {
        assert_eq!(ClusterRole::ControlPlane.discriminator(), "true");
        assert_eq!(ClusterRole::DataPlane.discriminator(), "false");
        assert_eq!(ClusterRole::DataPlane.to_string(), "data-plane");
    }

    #[test]
    fn test_parses_readiness_yaml() {
        let yaml = r#"
provision_config:
  default_retries: 10
  cloud_config:
    type: gcp
    project: community-ecosystem
    region: us-central1
    environment: dev
  k8c_config:
    cluster_scoped: true
contexts:
  rio-c1walle100:
    namespace: bootz
    cluster_labels: [control-plane, data-plane]
    network_config:
      traefik_version: "v10.3.2"
  rio-c2walle100:
    namespace: bootz
    cluster_labels: [data-plane]
service_account_name_suffix: sa
expected_node_count: 3
"#;
        let config: ReadinessConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provision_config.default_retries, 10);
        assert_eq!(config.provision_config.default_sleep_secs, crate::DEFAULT_SLEEP_SECS);
        assert!(config.provision_config.k8c_config.role_via_chart_value);
        assert_eq!(config.expected_node_count, 3);

        let contexts = config.context_set().unwrap();
        assert_eq!(contexts.control_plane().name, "rio-c1walle100");
        let cp = contexts.control_plane();
        assert_eq!(config.cloud_for(cp).project, "community-ecosystem");
        assert_eq!(cp.network_config.traefik_version.as_deref(), Some("v10.3.2"));
    }
}
