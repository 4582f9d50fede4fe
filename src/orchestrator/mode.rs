//! Workflow mode resolution

use std::fmt;

use serde::Serialize;

use armada_common::run::EnableConfig;

/// The one branch a run takes, resolved once from its switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowMode {
    /// Destroy every recorded infra footprint and the run's artifacts
    RemoveAll,
    /// Provision infrastructure without installing software
    ProvisionOnly,
    /// Install onto clusters provisioned earlier
    InstallOnly,
    /// Register repositories and install prerequisites only
    PreInstallOnly,
    /// Nothing actionable was requested
    NoOp,
}

impl WorkflowMode {
    /// Resolve switches in strict priority order; the first match wins
    ///
    /// Provisioning and installing in one invocation is not a supported
    /// combination and resolves to [`WorkflowMode::NoOp`].
    pub fn resolve(enable: &EnableConfig) -> Self {
        if enable.remove_all {
            Self::RemoveAll
        } else if enable.provision_infra && !enable.install {
            Self::ProvisionOnly
        } else if enable.install && !enable.provision_infra {
            Self::InstallOnly
        } else if enable.pre_install_setup && !enable.provision_infra {
            Self::PreInstallOnly
        } else {
            Self::NoOp
        }
    }

    /// Whether the mode touches installed software
    pub fn needs_sessions(self) -> bool {
        matches!(self, Self::InstallOnly | Self::PreInstallOnly)
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RemoveAll => "remove-all",
            Self::ProvisionOnly => "provision-only",
            Self::InstallOnly => "install-only",
            Self::PreInstallOnly => "pre-install-only",
            Self::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable(remove: bool, provision: bool, install: bool, pre: bool) -> EnableConfig {
        EnableConfig {
            simulate: false,
            remove_all: remove,
            provision_infra: provision,
            install,
            pre_install_setup: pre,
        }
    }

    #[test]
    fn story_first_matching_switch_wins() {
        assert_eq!(
            WorkflowMode::resolve(&enable(true, true, true, true)),
            WorkflowMode::RemoveAll
        );
        assert_eq!(
            WorkflowMode::resolve(&enable(false, true, false, true)),
            WorkflowMode::ProvisionOnly
        );
        assert_eq!(
            WorkflowMode::resolve(&enable(false, false, true, true)),
            WorkflowMode::InstallOnly
        );
        assert_eq!(
            WorkflowMode::resolve(&enable(false, false, false, true)),
            WorkflowMode::PreInstallOnly
        );
    }

    #[test]
    fn story_nothing_actionable_is_noop() {
        assert_eq!(
            WorkflowMode::resolve(&EnableConfig::default()),
            WorkflowMode::NoOp
        );
        // provision and install together match neither exclusive branch
        assert_eq!(
            WorkflowMode::resolve(&enable(false, true, true, false)),
            WorkflowMode::NoOp
        );
        // simulate alone changes nothing about the branch
        let simulate_only = EnableConfig {
            simulate: true,
            ..Default::default()
        };
        assert_eq!(WorkflowMode::resolve(&simulate_only), WorkflowMode::NoOp);
    }

    #[test]
    fn test_display_and_session_needs() {
        assert_eq!(WorkflowMode::InstallOnly.to_string(), "install-only");
        assert!(WorkflowMode::PreInstallOnly.needs_sessions());
        assert!(!WorkflowMode::ProvisionOnly.needs_sessions());
    }
}
