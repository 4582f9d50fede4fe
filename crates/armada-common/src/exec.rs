//! Subprocess seam, simulate gate and audit trail
//!
//! Every external tool call goes through an [`Executor`]. The executor tags
//! each call as a mutation or an observation. In simulate mode nothing reaches
//! the [`CommandRunner`]: mutations return an empty output and observations
//! return the caller's placeholder. Every call is recorded in the
//! [`AuditTrail`] either way.
//!
//! Environment is passed per invocation. Nothing here touches the process
//! environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// One external command: program, arguments, explicit environment, working directory
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment for this call only
    pub env: BTreeMap<String, String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Start an invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Merge environment entries
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Whether the argument list contains `needle` as one argument
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Whether the argument list contains `seq` as a contiguous run
    pub fn has_args(&self, seq: &[&str]) -> bool {
        !seq.is_empty()
            && self
                .args
                .windows(seq.len())
                .any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external commands
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return stdout, or `CommandFailed` with stderr
    async fn run(&self, invocation: &Invocation) -> Result<String>;
}

/// [`CommandRunner`] backed by real subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        debug!(command = %invocation, "running");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).envs(&invocation.env);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            Error::command_failed(invocation.to_string(), format!("failed to spawn: {}", e))
        })?;

        if !output.status.success() {
            return Err(Error::command_failed(
                invocation.to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Whether a call changes external state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Changes cluster, infra, or tool state
    Mutate,
    /// Read-only
    Observe,
}

/// One recorded call
#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    /// Context or scope the call was made for
    pub scope: String,
    /// Command line
    pub command: String,
    /// Mutation or observation
    pub effect: Effect,
    /// Whether the call was skipped because of simulate mode
    pub simulated: bool,
    /// When the call was made
    pub at: DateTime<Utc>,
}

/// Shared, append-only record of every external call in a run
#[derive(Clone, Debug, Default)]
pub struct AuditTrail {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditTrail {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }

    /// Snapshot of all entries so far
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Mutations recorded so far
    pub fn mutations(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.effect == Effect::Mutate)
            .cloned()
            .collect()
    }
}

/// Gatekeeper for external calls
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    simulate: bool,
    audit: AuditTrail,
}

impl Executor {
    /// Create an executor; with `simulate` set nothing reaches `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, simulate: bool) -> Self {
        Self {
            runner,
            simulate,
            audit: AuditTrail::default(),
        }
    }

    /// Whether calls are simulated
    pub fn simulate(&self) -> bool {
        self.simulate
    }

    /// The run's audit trail
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Run a state-changing command; simulated calls return empty output
    pub async fn mutate(&self, scope: &str, invocation: Invocation) -> Result<String> {
        self.dispatch(scope, invocation, Effect::Mutate, String::new())
            .await
    }

    /// Run a read-only command; simulated calls return `placeholder`
    pub async fn observe(
        &self,
        scope: &str,
        invocation: Invocation,
        placeholder: impl Into<String>,
    ) -> Result<String> {
        self.dispatch(scope, invocation, Effect::Observe, placeholder.into())
            .await
    }

    async fn dispatch(
        &self,
        scope: &str,
        invocation: Invocation,
        effect: Effect,
        placeholder: String,
    ) -> Result<String> {
        self.audit.record(AuditEntry {
            scope: scope.to_string(),
            command: invocation.to_string(),
            effect,
            simulated: self.simulate,
            at: Utc::now(),
        });

        if self.simulate {
            info!(context = %scope, command = %invocation, simulated = true, "[simulate] skipped");
            return Ok(placeholder);
        }

        self.runner.run(&invocation).await
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("simulate", &self.simulate)
            .finish_non_exhaustive()
    }
}
