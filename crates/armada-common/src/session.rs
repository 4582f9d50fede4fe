//! Authenticated per-cluster handles and the credentials read from them

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Connection material produced by provisioning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Short context name
    pub context_name: String,
    /// API server endpoint
    pub endpoint: String,
    /// Base64 cluster CA
    pub ca_data: String,
    /// Synthesized in simulate mode; never a live cluster
    #[serde(default)]
    pub simulated: bool,
}

impl ConnectionInfo {
    /// Deterministic placeholder for simulate mode
    pub fn simulated(context_name: &str) -> Self {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        Self {
            context_name: context_name.to_string(),
            endpoint: format!("https://{}.simulated.invalid", context_name),
            ca_data: STANDARD.encode(format!("simulated-ca-{}", context_name)),
            simulated: true,
        }
    }
}

/// Bound handle to one authenticated cluster
///
/// Each session owns its kubeconfig file. Every cluster-affecting call takes
/// a session and passes its kubeconfig, context and environment explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSession {
    /// Short context name
    pub context_name: String,
    /// Fully-qualified context name inside the kubeconfig
    pub full_name: String,
    /// API server endpoint
    pub endpoint: String,
    /// Base64 cluster CA
    pub ca_data: String,
    /// Namespace the product lives in
    pub namespace: String,
    /// Kubeconfig owned by this session
    pub kubeconfig: PathBuf,
    /// Environment passed to every tool invoked for this session
    pub env: BTreeMap<String, String>,
    /// Synthesized in simulate mode
    pub simulated: bool,
}

impl ClusterSession {
    /// Environment for this session plus extra entries
    pub fn env_with<I, K, V>(&self, extra: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = self.env.clone();
        env.extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
        env
    }

    /// Path of the kubeconfig as a string argument
    pub fn kubeconfig_arg(&self) -> String {
        self.kubeconfig.to_string_lossy().to_string()
    }
}

/// Service-account credential read from a cluster
///
/// The token and CA are secret material: `Debug` redacts them and nothing
/// in this crate logs them.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredential {
    /// Secret backing the service account
    pub secret_ref: String,
    /// Decoded bearer token
    pub token: String,
    /// Decoded CA certificate (PEM)
    pub certificate_authority: Vec<u8>,
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("secret_ref", &self.secret_ref)
            .field("token", &"<redacted>")
            .field(
                "certificate_authority",
                &format_args!("<{} bytes>", self.certificate_authority.len()),
            )
            .finish()
    }
}
