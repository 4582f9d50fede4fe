//! Thin wrappers around the external tools
//!
//! Each wrapper builds [`Invocation`](crate::exec::Invocation)s and hands them
//! to the shared [`Executor`], marking each call as a mutation or an
//! observation. None of them hold state beyond the executor.

use std::sync::Arc;

use crate::exec::{AuditTrail, CommandRunner, Executor};

pub mod gcloud;
pub mod helm;
pub mod kubectl;
pub mod terraform;

pub use gcloud::CloudCli;
pub use helm::Helm;
pub use kubectl::Kubectl;
pub use terraform::{Terraform, TfOptions};

/// All tool wrappers of a run, sharing one executor
#[derive(Clone, Debug)]
pub struct Toolbox {
    /// Cluster API wrapper
    pub kubectl: Kubectl,
    /// Package-manager wrapper
    pub helm: Helm,
    /// Infra tool wrapper
    pub terraform: Terraform,
    /// Cloud CLI wrapper
    pub cloud: CloudCli,
    exec: Executor,
}

impl Toolbox {
    /// Create the wrappers over `runner`; `simulate` gates every mutation
    pub fn new(runner: Arc<dyn CommandRunner>, simulate: bool) -> Self {
        let exec = Executor::new(runner, simulate);
        Self {
            kubectl: Kubectl::new(exec.clone()),
            helm: Helm::new(exec.clone()),
            terraform: Terraform::new(exec.clone()),
            cloud: CloudCli::new(exec.clone()),
            exec,
        }
    }

    /// Whether calls are simulated
    pub fn simulate(&self) -> bool {
        self.exec.simulate()
    }

    /// Audit trail shared by all wrappers
    pub fn audit(&self) -> &AuditTrail {
        self.exec.audit()
    }
}
