//! Mode command - show what a run would do without doing it

use clap::Args;

use armada::WorkflowMode;
use armada_common::config::load_readiness;
use armada_common::model::ReadinessConfig;
use armada_common::run::ProvisionRun;

use super::{RunSource, Switches};
use crate::Result;

/// Show the resolved workflow mode and topology
#[derive(Args, Debug)]
pub struct ModeArgs {
    #[command(flatten)]
    pub source: RunSource,

    #[command(flatten)]
    pub switches: Switches,
}

pub async fn run(args: ModeArgs) -> Result<()> {
    let config = load_readiness(&args.source.config)?;
    let run = args.source.resolve(&args.switches)?;
    print!("{}", describe(&config, &run)?);
    Ok(())
}

/// Mode, run location and contexts, one per line
pub fn describe(config: &ReadinessConfig, run: &ProvisionRun) -> Result<String> {
    let contexts = config.context_set()?;
    let mode = WorkflowMode::resolve(&run.enable);
    let mut out = format!(
        "mode:          {}{}\nprovision id:  {}\nartifacts:     {}\n",
        mode,
        if run.enable.simulate { " (simulated)" } else { "" },
        run.provision_id,
        run.artifacts_root_dir.display()
    );
    for ctx in contexts.control_plane_first() {
        out.push_str(&format!(
            "{:<14} {} (namespace {})\n",
            format!("{}:", ctx.role()),
            ctx.name,
            ctx.namespace
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_common::run::EnableConfig;
    use std::path::Path;

    fn config(yaml: &str) -> ReadinessConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn story_mode_lists_control_plane_first() {
        let config = config(
            "contexts:\n  alpha:\n    name: alpha\n    namespace: k8ssandra\n    cluster_labels: [data-plane]\n  cp:\n    name: cp\n    namespace: k8ssandra\n    cluster_labels: [control-plane]\n",
        );
        let run = ProvisionRun::new(
            "abc123",
            Path::new("/tmp/armada"),
            EnableConfig {
                install: true,
                simulate: true,
                ..Default::default()
            },
        );

        let text = describe(&config, &run).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "mode:          install-only (simulated)");
        assert_eq!(lines[1], "provision id:  abc123");
        assert_eq!(lines[2], "artifacts:     /tmp/armada/abc123");
        assert!(lines[3].starts_with("control-plane:"));
        assert!(lines[3].ends_with("cp (namespace k8ssandra)"));
        assert!(lines[4].starts_with("data-plane:"));
        assert!(lines[4].ends_with("alpha (namespace k8ssandra)"));
    }

    #[test]
    fn test_missing_control_plane_is_an_error() {
        let config = config(
            "contexts:\n  dc1:\n    name: dc1\n    namespace: k8ssandra\n    cluster_labels: [data-plane]\n",
        );
        let run = ProvisionRun::new("abc123", Path::new("/tmp"), EnableConfig::default());
        assert!(describe(&config, &run).is_err());
    }
}
