//! Common types for armada: context model, errors, tool wrappers and polling
//!
//! # Modules
//!
//! - [`model`] - Cluster contexts and readiness configuration
//! - [`run`] - Provision runs, enable switches and persisted run state
//! - [`config`] - Loading configuration files
//! - [`poll`] - Bounded readiness polling
//! - [`retry`] - Retry with backoff for transient tool failures
//! - [`exec`] - Subprocess seam, simulate gate and audit trail
//! - [`tools`] - Cloud CLI, infra tool, package manager and cluster API wrappers
//! - [`session`] - Authenticated per-cluster handles and credentials
//! - [`kubeconfig`] - Reading and writing kube-style configuration files
//! - [`artifacts`] - On-disk layout of a run's artifacts

#![cfg_attr(not(test), deny(missing_docs))]

pub mod artifacts;
pub mod config;
pub mod error;
pub mod exec;
pub mod kubeconfig;
pub mod model;
pub mod poll;
pub mod retry;
pub mod run;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod tools;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Defaults
// =============================================================================

/// Node readiness poll attempts
pub const DEFAULT_RETRIES: u32 = 30;

/// Seconds between node readiness polls
pub const DEFAULT_SLEEP_SECS: u64 = 20;

/// Timeout for the CRD `established` wait
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Timeout for the operator's admission webhook endpoint
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 40;

/// Poll interval for the admission webhook endpoint
pub const DEFAULT_WEBHOOK_INTERVAL_MS: u64 = 250;

/// Delay after applying the cluster manifest
pub const DEFAULT_SETTLE_SECS: u64 = 30;

// =============================================================================
// Product constants
// =============================================================================

/// Operator release name
pub const OPERATOR_RELEASE: &str = "k8ssandra-operator";

/// Operator chart reference
pub const OPERATOR_CHART: &str = "k8ssandra/k8ssandra-operator";

/// Label selecting operator pods
pub const OPERATOR_POD_SELECTOR: &str = "app.kubernetes.io/name=k8ssandra-operator";

/// Cassandra operator deployment the operator chart installs
pub const CASS_OPERATOR_DEPLOYMENT: &str = "k8ssandra-operator-cass-operator";

/// Label selecting Cassandra operator pods
pub const CASS_OPERATOR_POD_SELECTOR: &str = "app.kubernetes.io/name=cass-operator";

/// Admission webhook service of the operator
pub const OPERATOR_WEBHOOK_SERVICE: &str = "k8ssandra-operator-webhook-service";

/// Environment variable the operator reads its role from
pub const CONTROL_PLANE_ENV_KEY: &str = "K8SSANDRA_CONTROL_PLANE";

/// Chart value carrying the role discriminator
pub const CONTROL_PLANE_CHART_VALUE: &str = "controlPlane";

/// Generic secret holding the consolidated client configuration
pub const CONTEXTS_SECRET: &str = "k8s-contexts";

/// Key of the consolidated configuration inside [`CONTEXTS_SECRET`]
pub const CONTEXTS_SECRET_KEY: &str = "kubeconfig";

/// Default key of the backup credential secret
pub const MEDUSA_SECRET_KEY: &str = "medusa_s3_credentials";

/// Domain of cloud service-account identities
pub const IDENTITY_DOMAIN: &str = "community-ecosystem.iam.gserviceaccount.com";

/// Certificate-authority controller manifest
pub const CERT_MANAGER_MANIFEST: &str =
    "https://github.com/jetstack/cert-manager/releases/download/v1.5.3/cert-manager.yaml";

/// Ingress controller release and stale RBAC object name
pub const INGRESS_RELEASE: &str = "traefik";

/// Ingress controller chart reference
pub const INGRESS_CHART: &str = "traefik/traefik";

/// Chart repositories registered before any install, as (name, url)
pub const CHART_REPOSITORIES: &[(&str, &str)] = &[
    ("jetstack", "https://charts.jetstack.io"),
    ("k8ssandra", "https://helm.k8ssandra.io/stable"),
    ("traefik", "https://helm.traefik.io/traefik"),
];
