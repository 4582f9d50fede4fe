//! Stage results and the aggregated run report

use std::collections::BTreeMap;

use serde::Serialize;

use armada_common::exec::AuditEntry;
use armada_common::session::ConnectionInfo;

use super::WorkflowMode;

/// Outcome of one stage, optionally for one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    /// Stage name
    pub stage: String,
    /// Context the result applies to; `None` for run-wide steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Whether the stage succeeded
    pub succeeded: bool,
    /// Human-readable detail
    pub detail: String,
    /// A failure that does not fail the run
    pub ignorable: bool,
}

impl StageResult {
    /// A successful run-wide step
    pub fn ok(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            context: None,
            succeeded: true,
            detail: detail.into(),
            ignorable: false,
        }
    }

    /// A failed run-wide step
    pub fn failed(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            ..Self::ok(stage, detail)
        }
    }

    /// A diagnostic that is reported but never fails the run
    pub fn diagnostic(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            ignorable: true,
            ..Self::ok(stage, detail)
        }
    }

    /// Attach the context this result applies to
    pub fn for_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Whether this result fails the run
    pub fn is_fatal(&self) -> bool {
        !self.succeeded && !self.ignorable
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier
    pub provision_id: String,
    /// Branch the run took
    pub mode: WorkflowMode,
    /// Whether external calls were simulated
    pub simulated: bool,
    /// Stage outcomes in execution order
    pub results: Vec<StageResult>,
    /// Connection material known at the end of the run, per context
    pub connections: BTreeMap<String, ConnectionInfo>,
    /// Every external call the run made or would have made
    pub audit: Vec<AuditEntry>,
}

impl RunReport {
    /// Empty report for a run
    pub fn new(provision_id: impl Into<String>, mode: WorkflowMode, simulated: bool) -> Self {
        Self {
            provision_id: provision_id.into(),
            mode,
            simulated,
            results: Vec::new(),
            connections: BTreeMap::new(),
            audit: Vec::new(),
        }
    }

    /// Append a result
    pub fn push(&mut self, result: StageResult) {
        self.results.push(result);
    }

    /// True unless some result is a non-ignorable failure
    pub fn succeeded(&self) -> bool {
        !self.results.iter().any(StageResult::is_fatal)
    }

    /// Non-ignorable failures
    pub fn failures(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter().filter(|r| r.is_fatal())
    }

    /// One-line summary of the failures, empty when the run succeeded
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|r| match &r.context {
                Some(ctx) => format!("{} [{}]: {}", r.stage, ctx, r.detail),
                None => format!("{}: {}", r.stage, r.detail),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
