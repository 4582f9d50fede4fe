//! Teardown of every infra footprint a run recorded
//!
//! Driven entirely by the manifest records, so it needs none of the
//! context objects. Destroy failures are best-effort: every record is
//! attempted, and the artifacts root (with `run.json` and the records) is
//! removed only once nothing is left to destroy. A module folder without a
//! record may still hold the infra tool's state, so it also keeps the root.

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use armada_common::artifacts::{ArtifactLayout, ManifestRecord};
use armada_common::tools::{TfOptions, Toolbox};
use armada_common::Result;

use super::MODULE_ENV_DIR;

/// What teardown did with each record
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Contexts whose infrastructure was destroyed
    pub destroyed: Vec<String>,
    /// Contexts with nothing left to destroy
    pub skipped: Vec<String>,
    /// Contexts whose destroy failed, with the error
    pub failed: Vec<(String, String)>,
    /// Whether the artifacts root was removed
    pub root_removed: bool,
}

impl TeardownReport {
    /// Whether every record was destroyed or skipped
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// `destroyed=N skipped=N failed=N`
    pub fn summary(&self) -> String {
        format!(
            "destroyed={} skipped={} failed={}",
            self.destroyed.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

enum Disposition {
    Destroyed,
    Skipped(&'static str),
}

/// Destroy every recorded footprint, then remove the artifacts root
pub async fn teardown(tools: &Toolbox, layout: &ArtifactLayout) -> Result<TeardownReport> {
    let records = layout.read_manifests()?;
    info!(root = %layout.root().display(), records = records.len(), "tearing down");

    let mut report = TeardownReport::default();
    for record in &records {
        match destroy_one(tools, layout, record).await {
            Ok(Disposition::Destroyed) => report.destroyed.push(record.name.clone()),
            Ok(Disposition::Skipped(reason)) => {
                info!(context = %record.name, reason, "nothing to destroy");
                report.skipped.push(record.name.clone());
            }
            Err(e) => {
                error!(context = %record.name, error = %e, "destroy failed, record kept");
                report.failed.push((record.name.clone(), e.to_string()));
            }
        }
    }

    if !tools.simulate() {
        for folder in layout.unrecorded_modules()? {
            let name = folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            error!(context = %name, folder = %folder.display(), "module folder has no manifest record");
            report.failed.push((
                name,
                format!(
                    "unrecorded module folder {} may hold infra state; destroy it manually",
                    folder.display()
                ),
            ));
        }
    }

    if !report.succeeded() {
        warn!(summary = %report.summary(), "artifacts root kept for the next teardown");
    } else if tools.simulate() {
        info!(root = %layout.root().display(), "[simulate] artifacts root kept");
    } else {
        remove_dir_if_present(layout.root())?;
        report.root_removed = true;
        info!(root = %layout.root().display(), "artifacts removed");
    }
    Ok(report)
}

async fn destroy_one(
    tools: &Toolbox,
    layout: &ArtifactLayout,
    record: &ManifestRecord,
) -> Result<Disposition> {
    let disposition = if record.simulated {
        Disposition::Skipped("recorded by a simulated run")
    } else if !record.modules_folder.exists() {
        Disposition::Skipped("modules folder already gone")
    } else {
        let options = TfOptions {
            working_dir: record.modules_folder.join(MODULE_ENV_DIR),
            vars: record.vars.clone(),
            env: record.env.clone(),
        };
        info!(context = %record.name, folder = %record.modules_folder.display(), "destroying infrastructure");
        tools.terraform.destroy(&record.name, &options).await?;
        Disposition::Destroyed
    };

    if tools.simulate() {
        return Ok(disposition);
    }

    if record.modules_folder.exists() {
        if layout.contains(&record.modules_folder) {
            remove_dir_if_present(&record.modules_folder)?;
        } else {
            warn!(
                context = %record.name,
                folder = %record.modules_folder.display(),
                "modules folder is outside the artifacts root, not deleting"
            );
        }
    }
    layout.remove_manifest(&record.name)?;
    Ok(disposition)
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_common::testing::ScriptedRunner;
    use armada_common::Error;
    use std::collections::BTreeMap;

    fn record(layout: &ArtifactLayout, name: &str, create_folder: bool) -> ManifestRecord {
        let modules_folder = layout.modules_dir(name);
        if create_folder {
            std::fs::create_dir_all(modules_folder.join("env")).unwrap();
        }
        let record = ManifestRecord {
            name: name.to_string(),
            modules_folder,
            vars: BTreeMap::from([("name".to_string(), name.to_string())]),
            env: BTreeMap::from([(
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                "/creds/sa.json".to_string(),
            )]),
            simulated: false,
            applied: true,
        };
        layout.write_manifest(&record).unwrap();
        record
    }

    #[tokio::test]
    async fn story_already_destroyed_folder_is_skipped_and_the_rest_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        record(&layout, "cp", true);
        record(&layout, "dc1", false);
        let runner = ScriptedRunner::new();
        let tools = Toolbox::new(runner.clone(), false);

        let report = teardown(&tools, &layout).await.unwrap();

        assert_eq!(report.destroyed, vec!["cp"]);
        assert_eq!(report.skipped, vec!["dc1"]);
        assert!(report.succeeded());
        assert!(report.root_removed);
        assert!(!layout.root().exists());

        let destroys = runner.calls_matching("terraform", &["destroy"]);
        assert_eq!(destroys.len(), 1);
        assert!(destroys[0].has_args(&["-var", "name=cp"]));
        assert_eq!(destroys[0].cwd, Some(layout.modules_dir("cp").join("env")));
        assert_eq!(destroys[0].env["GOOGLE_APPLICATION_CREDENTIALS"], "/creds/sa.json");
    }

    #[tokio::test]
    async fn story_partial_failure_keeps_the_artifacts_index() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        record(&layout, "cp", true);
        record(&layout, "dc1", true);
        let runner = ScriptedRunner::new();
        runner.on(|inv| {
            (inv.program == "terraform" && inv.has_args(&["-var", "name=dc1"]))
                .then(|| Err(Error::command_failed(inv.to_string(), "resource in use")))
        });
        let tools = Toolbox::new(runner.clone(), false);

        let report = teardown(&tools, &layout).await.unwrap();

        assert_eq!(report.destroyed, vec!["cp"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("resource in use"));
        assert!(!report.root_removed);
        assert!(layout.root().exists());
        assert!(!layout.modules_dir("cp").exists());
        assert!(layout.modules_dir("dc1").exists());

        let remaining: Vec<_> = layout
            .read_manifests()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(remaining, vec!["dc1"]);
    }

    #[tokio::test]
    async fn test_folder_outside_root_is_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("shared-module");
        std::fs::create_dir_all(outside.join("env")).unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        let mut rec = record(&layout, "cp", false);
        rec.modules_folder = outside.clone();
        layout.write_manifest(&rec).unwrap();
        let tools = Toolbox::new(ScriptedRunner::new(), false);

        let report = teardown(&tools, &layout).await.unwrap();

        assert_eq!(report.destroyed, vec!["cp"]);
        assert!(outside.exists());
        assert!(!layout.root().exists());
    }

    #[tokio::test]
    async fn test_simulated_teardown_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        record(&layout, "cp", true);
        let runner = ScriptedRunner::new();
        let tools = Toolbox::new(runner.clone(), true);

        let report = teardown(&tools, &layout).await.unwrap();

        assert_eq!(report.destroyed, vec!["cp"]);
        assert!(!report.root_removed);
        assert!(runner.calls().is_empty());
        assert_eq!(tools.audit().mutations().len(), 1);
        assert!(layout.modules_dir("cp").exists());
        assert_eq!(layout.read_manifests().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn story_unrecorded_module_folder_keeps_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        record(&layout, "cp", true);
        let stray = layout.modules_dir("dc1").join("env");
        std::fs::create_dir_all(&stray).unwrap();
        std::fs::write(stray.join("terraform.tfstate"), "{}").unwrap();
        let tools = Toolbox::new(ScriptedRunner::new(), false);

        let report = teardown(&tools, &layout).await.unwrap();

        assert_eq!(report.destroyed, vec!["cp"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "dc1");
        assert!(!report.root_removed);
        assert!(stray.join("terraform.tfstate").exists());
    }

    #[tokio::test]
    async fn test_no_records_removes_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("abc123"));
        std::fs::create_dir_all(layout.root()).unwrap();
        let tools = Toolbox::new(ScriptedRunner::new(), false);

        let report = teardown(&tools, &layout).await.unwrap();
        assert_eq!(report.summary(), "destroyed=0 skipped=0 failed=0");
        assert!(!layout.root().exists());
    }
}
