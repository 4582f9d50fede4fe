//! Armada - multi-cluster provisioning and installation orchestrator
//!
//! Brings up one database deployment across a control-plane cluster and any
//! number of data-plane clusters: provisions the infrastructure, installs the
//! prerequisites and the operator with the right role on each cluster, lets
//! the control plane reach every data plane, and applies the cluster manifest.
//!
//! # Modules
//!
//! - [`orchestrator`] - Workflow modes and the stage sequence of one run
//! - [`provision`] - Infra provisioning per context and teardown
//! - [`sessions`] - Authenticated per-cluster sessions
//! - [`install`] - Prerequisites, operator and backup secret
//! - [`credentials`] - Credential exchange between control and data planes
//! - [`deploy`] - Cluster manifest deployment behind the webhook gate
//!
//! Shared types (context model, tool wrappers, polling, errors) live in
//! `armada_common`.

#![deny(missing_docs)]

pub mod credentials;
pub mod deploy;
pub mod install;
pub mod orchestrator;
pub mod provision;
pub mod sessions;
#[cfg(test)]
mod test_support;

pub use armada_common::{Error, Result};
pub use orchestrator::{Orchestrator, RunReport, StageResult, WorkflowMode};
