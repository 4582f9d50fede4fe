//! Infra tool wrapper
//!
//! Init and plan failures surface as [`Error::InfraPlan`], apply failures as
//! [`Error::InfraApply`]. Nothing here retries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::exec::{Executor, Invocation};
use crate::{Error, Result};

/// Name of the saved plan inside the working directory
const PLAN_FILE: &str = "tfplan";

/// Working directory, variables and environment of one module run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TfOptions {
    /// Directory holding the module's root configuration
    pub working_dir: PathBuf,
    /// Input variables
    pub vars: BTreeMap<String, String>,
    /// Environment for the tool, such as the credential path
    pub env: BTreeMap<String, String>,
}

impl TfOptions {
    fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(k, v)| ["-var".to_string(), format!("{}={}", k, v)])
            .collect()
    }

    fn invocation(&self) -> Invocation {
        Invocation::new("terraform")
            .cwd(&self.working_dir)
            .envs(&self.env)
    }
}

/// `terraform`
#[derive(Clone, Debug)]
pub struct Terraform {
    exec: Executor,
}

impl Terraform {
    /// Create the wrapper
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }

    /// `terraform init` then `terraform plan -out=tfplan`
    pub async fn init_and_plan(&self, context: &str, options: &TfOptions) -> Result<()> {
        let init = options.invocation().args(["init", "-input=false"]);
        self.exec
            .mutate(context, init)
            .await
            .map_err(|e| Error::infra_plan(context, format!("init: {}", e)))?;

        let plan = options
            .invocation()
            .args(["plan", "-input=false"])
            .arg(format!("-out={}", PLAN_FILE))
            .args(options.var_args());
        self.exec
            .mutate(context, plan)
            .await
            .map_err(|e| Error::infra_plan(context, format!("plan: {}", e)))?;
        Ok(())
    }

    /// `terraform apply` of the saved plan
    pub async fn apply(&self, context: &str, options: &TfOptions) -> Result<()> {
        let apply = options
            .invocation()
            .args(["apply", "-input=false", "-auto-approve", PLAN_FILE]);
        self.exec
            .mutate(context, apply)
            .await
            .map_err(|e| Error::infra_apply(context, e.to_string()))?;
        Ok(())
    }

    /// `terraform destroy`, returning the tool's output
    pub async fn destroy(&self, context: &str, options: &TfOptions) -> Result<String> {
        let destroy = options
            .invocation()
            .args(["destroy", "-input=false", "-auto-approve"])
            .args(options.var_args());
        self.exec.mutate(context, destroy).await
    }

    /// `terraform output -json`, flattened to name → value
    pub async fn outputs(
        &self,
        context: &str,
        options: &TfOptions,
        placeholder: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let placeholder_json: serde_json::Map<String, Value> = placeholder
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::json!({ "value": v })))
            .collect();
        let inv = options.invocation().args(["output", "-json"]);
        let raw = self
            .exec
            .observe(context, inv, Value::Object(placeholder_json).to_string())
            .await?;
        parse_outputs(&raw)
    }
}

/// Parse `terraform output -json`, keeping string values
fn parse_outputs(raw: &str) -> Result<BTreeMap<String, String>> {
    let parsed: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    Ok(parsed
        .into_iter()
        .filter_map(|(name, output)| match output.get("value") {
            Some(Value::String(s)) => Some((name, s.clone())),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn options() -> TfOptions {
        TfOptions {
            working_dir: PathBuf::from("/tmp/run/modules/dc1/env"),
            vars: BTreeMap::from([
                ("name".to_string(), "dev-dc1-abc123".to_string()),
                ("region".to_string(), "us-central1".to_string()),
            ]),
            env: BTreeMap::from([(
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                "/creds/sa.json".to_string(),
            )]),
        }
    }

    #[tokio::test]
    async fn story_plan_failure_is_distinct_from_apply_failure() {
        let runner = ScriptedRunner::new();
        runner.fail("terraform", &["plan"], "Error: invalid provider credentials");
        let tf = Terraform::new(Executor::new(runner.clone(), false));

        let err = tf.init_and_plan("dc1", &options()).await.unwrap_err();
        assert!(matches!(err, Error::InfraPlan { .. }));
        assert!(err.to_string().contains("invalid provider credentials"));

        let runner = ScriptedRunner::new();
        runner.fail("terraform", &["apply"], "Error: quota exceeded");
        let tf = Terraform::new(Executor::new(runner.clone(), false));
        let err = tf.apply("dc1", &options()).await.unwrap_err();
        assert!(matches!(err, Error::InfraApply { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir_with_vars_and_env() {
        let runner = ScriptedRunner::new();
        let tf = Terraform::new(Executor::new(runner.clone(), false));
        tf.init_and_plan("dc1", &options()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].has_args(&["init", "-input=false"]));
        assert!(calls[1].has_args(&["-var", "name=dev-dc1-abc123"]));
        assert!(calls[1].has_arg("-out=tfplan"));
        for call in &calls {
            assert_eq!(call.cwd, Some(PathBuf::from("/tmp/run/modules/dc1/env")));
            assert_eq!(call.env["GOOGLE_APPLICATION_CREDENTIALS"], "/creds/sa.json");
        }
    }

    #[tokio::test]
    async fn test_outputs_keep_string_values() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "terraform",
            &["output", "-json"],
            r#"{"endpoint":{"sensitive":false,"type":"string","value":"34.1.2.3"},
                "ca_certificate":{"sensitive":true,"type":"string","value":"Y2E="},
                "node_pools":{"type":["list","string"],"value":["a"]}}"#,
        );
        let tf = Terraform::new(Executor::new(runner.clone(), false));

        let outputs = tf.outputs("dc1", &options(), &BTreeMap::new()).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["endpoint"], "34.1.2.3");
        assert_eq!(outputs["ca_certificate"], "Y2E=");
    }

    #[tokio::test]
    async fn test_simulated_outputs_use_placeholder() {
        let runner = ScriptedRunner::new();
        let tf = Terraform::new(Executor::new(runner.clone(), true));
        let placeholder = BTreeMap::from([("endpoint".to_string(), "sim".to_string())]);

        let outputs = tf.outputs("dc1", &options(), &placeholder).await.unwrap();
        assert_eq!(outputs["endpoint"], "sim");
        assert!(runner.calls().is_empty());
    }
}
