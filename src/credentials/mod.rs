//! Credential exchange stage
//!
//! Lets the control-plane operator address every data-plane cluster:
//!
//! 1. Read the operator's service-account token and CA out of every session
//!    (control plane first). Any missing or empty credential aborts here,
//!    before anything is written.
//! 2. Consolidate them into one client configuration whose current context
//!    is the control plane, and store it as the `k8s-contexts` secret in every
//!    context's namespace. An existing secret is deleted and recreated.
//! 3. Apply one `ClientConfig` per data plane on the control plane.
//! 4. Restart both operators in every context so they pick up the new
//!    secret and ClientConfigs.
//!
//! A failed secret write stops the stage; secrets written before it stay in
//! place.

pub mod client_config;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use tracing::{info, warn};

use armada_common::artifacts::ArtifactLayout;
use armada_common::kubeconfig::{ClientEntry, KubeConfigDocument};
use armada_common::session::{ClusterSession, ServiceAccountCredential};
use armada_common::tools::{Kubectl, Toolbox};
use armada_common::{Error, Result};

pub use client_config::ClientConfig;

/// Placeholder secret name returned under simulate
const SIMULATED_SECRET: &str = "k8ssandra-operator-token-simulated";

/// Reads the operator's service-account credential from a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialReader: Send + Sync {
    /// Name of the secret backing the operator's service account
    async fn fetch_secret_name(&self, session: &ClusterSession) -> Result<String>;

    /// Decoded bearer token stored in `secret`
    async fn fetch_token(&self, session: &ClusterSession, secret: &str) -> Result<String>;

    /// Decoded CA certificate stored in `secret`
    async fn fetch_certificate(&self, session: &ClusterSession, secret: &str) -> Result<Vec<u8>>;
}

/// [`CredentialReader`] over the cluster API wrapper
#[derive(Clone, Debug)]
pub struct KubectlCredentialReader {
    kubectl: Kubectl,
}

impl KubectlCredentialReader {
    /// Create a reader
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    async fn secret_field(
        &self,
        session: &ClusterSession,
        secret: &str,
        path: &str,
        placeholder: &str,
    ) -> Result<Vec<u8>> {
        let encoded = self
            .kubectl
            .jsonpath(
                session,
                Some(&session.namespace),
                "secret",
                secret,
                path,
                &STANDARD.encode(placeholder),
            )
            .await?;
        STANDARD.decode(encoded.trim()).map_err(|e| {
            Error::missing_credential(
                &session.context_name,
                format!("{} of secret {} is not valid base64: {}", path, secret, e),
            )
        })
    }
}

#[async_trait]
impl CredentialReader for KubectlCredentialReader {
    async fn fetch_secret_name(&self, session: &ClusterSession) -> Result<String> {
        self.kubectl
            .jsonpath(
                session,
                Some(&session.namespace),
                "serviceaccount",
                armada_common::OPERATOR_RELEASE,
                "{.secrets[0].name}",
                SIMULATED_SECRET,
            )
            .await
    }

    async fn fetch_token(&self, session: &ClusterSession, secret: &str) -> Result<String> {
        let raw = self
            .secret_field(session, secret, "{.data.token}", "simulated-token")
            .await?;
        String::from_utf8(raw).map_err(|_| {
            Error::missing_credential(&session.context_name, "token is not valid UTF-8")
        })
    }

    async fn fetch_certificate(&self, session: &ClusterSession, secret: &str) -> Result<Vec<u8>> {
        self.secret_field(session, secret, "{.data['ca.crt']}", "simulated-ca")
            .await
    }
}

/// Read one session's credential, rejecting empty parts
pub async fn read_credential(
    reader: &dyn CredentialReader,
    session: &ClusterSession,
) -> Result<ServiceAccountCredential> {
    let context = &session.context_name;
    let missing = |what: &str, e: Error| {
        Error::missing_credential(context, format!("failed to read {}: {}", what, e))
    };

    let secret_ref = reader
        .fetch_secret_name(session)
        .await
        .map_err(|e| missing("service-account secret name", e))?;
    if secret_ref.is_empty() {
        return Err(Error::missing_credential(
            context,
            "operator service account has no secret",
        ));
    }

    let token = reader
        .fetch_token(session, &secret_ref)
        .await
        .map_err(|e| missing("token", e))?;
    if token.is_empty() {
        return Err(Error::missing_credential(
            context,
            format!("secret {} has an empty token", secret_ref),
        ));
    }

    let certificate_authority = reader
        .fetch_certificate(session, &secret_ref)
        .await
        .map_err(|e| missing("certificate", e))?;
    if certificate_authority.is_empty() {
        return Err(Error::missing_credential(
            context,
            format!("secret {} has an empty certificate", secret_ref),
        ));
    }

    Ok(ServiceAccountCredential {
        secret_ref,
        token,
        certificate_authority,
    })
}

/// Create a generic secret from files, replacing one that already exists
pub async fn put_secret(
    kubectl: &Kubectl,
    session: &ClusterSession,
    namespace: &str,
    name: &str,
    files: &[(&str, &str)],
) -> Result<()> {
    match kubectl
        .create_generic_secret(session, namespace, name, files)
        .await
    {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_exists() => {
            info!(context = %session.context_name, secret = name, "secret exists, recreating");
            kubectl.delete_secret(session, namespace, name).await?;
            kubectl
                .create_generic_secret(session, namespace, name, files)
                .await
        }
        Err(e) => Err(e),
    }
}

/// The credential exchange stage
pub struct CredentialExchange<'a> {
    tools: &'a Toolbox,
    reader: &'a dyn CredentialReader,
    layout: &'a ArtifactLayout,
}

impl<'a> CredentialExchange<'a> {
    /// Create the stage
    pub fn new(
        tools: &'a Toolbox,
        reader: &'a dyn CredentialReader,
        layout: &'a ArtifactLayout,
    ) -> Self {
        Self {
            tools,
            reader,
            layout,
        }
    }

    /// Exchange credentials between the control plane and the data planes
    pub async fn exchange(
        &self,
        control_plane: &ClusterSession,
        data_planes: &[&ClusterSession],
    ) -> Result<()> {
        let sessions: Vec<&ClusterSession> = std::iter::once(control_plane)
            .chain(data_planes.iter().copied())
            .collect();

        let mut credentials = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let credential = read_credential(self.reader, session).await?;
            info!(context = %session.context_name, secret = %credential.secret_ref, "read service-account credential");
            credentials.push(credential);
        }

        let entries: Vec<ClientEntry<'_>> = sessions
            .iter()
            .zip(&credentials)
            .map(|(session, credential)| ClientEntry {
                full_name: &session.full_name,
                endpoint: &session.endpoint,
                credential,
            })
            .collect();
        let document = KubeConfigDocument::consolidate(&entries, &control_plane.full_name)?;

        for session in &sessions {
            let path = self.layout.client_kubeconfig(&session.full_name);
            document.write_to(&path)?;
            let path = path.to_string_lossy();
            put_secret(
                &self.tools.kubectl,
                session,
                &session.namespace,
                armada_common::CONTEXTS_SECRET,
                &[(armada_common::CONTEXTS_SECRET_KEY, &*path)],
            )
            .await?;
            info!(context = %session.context_name, secret = armada_common::CONTEXTS_SECRET, "client configuration stored");
        }

        for data_plane in data_planes {
            let manifest = ClientConfig::for_data_plane(&data_plane.full_name, &control_plane.namespace);
            let path = self
                .layout
                .client_config(&data_plane.full_name, &data_plane.context_name);
            manifest.write_to(&path)?;
            self.tools
                .kubectl
                .apply_file(control_plane, &control_plane.namespace, &path.to_string_lossy(), false)
                .await?;
            info!(context = %data_plane.context_name, client_config = %manifest.name(), "ClientConfig applied on control plane");
        }

        for session in &sessions {
            self.restart_operators(session).await?;
        }
        Ok(())
    }

    async fn restart_operators(&self, session: &ClusterSession) -> Result<()> {
        let operators = [
            (armada_common::OPERATOR_RELEASE, armada_common::OPERATOR_POD_SELECTOR),
            (
                armada_common::CASS_OPERATOR_DEPLOYMENT,
                armada_common::CASS_OPERATOR_POD_SELECTOR,
            ),
        ];
        let ns = &session.namespace;
        for (deployment, selector) in operators {
            if let Err(e) = self.tools.kubectl.delete_pods(session, ns, selector).await {
                warn!(context = %session.context_name, selector, error = %e, "failed to delete operator pods");
            }
            self.tools
                .kubectl
                .rollout_restart(session, ns, deployment)
                .await?;
        }
        info!(context = %session.context_name, "operators restarted");
        Ok(())
    }
}
