//! Loading configuration files
//!
//! Relative paths inside a readiness configuration (value files, manifest,
//! infra module, credential file) are resolved against the directory of the
//! file that names them.

use std::path::{Path, PathBuf};

use crate::model::ReadinessConfig;
use crate::run::{default_kube_config_path, generate_provision_id, ProvisionRun};
use crate::{Error, Result};

/// Environment variable overriding the provision id
pub const PROVISION_ID_ENV: &str = "ARMADA_PROVISION_ID";

/// Environment variable overriding the artifacts base directory
pub const ARTIFACTS_DIR_ENV: &str = "ARMADA_ARTIFACTS_DIR";

/// Default artifacts base directory: `<tmp>/armada`
pub fn default_artifacts_base() -> PathBuf {
    std::env::temp_dir().join("armada")
}

/// Load and validate a readiness configuration
pub fn load_readiness(path: &Path) -> Result<ReadinessConfig> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut config: ReadinessConfig = serde_yaml::from_str(&data).map_err(|e| {
        Error::invalid_config(format!("failed to parse {}: {}", path.display(), e))
    })?;

    let base = base_dir(path);
    resolve_paths(&mut config, &base);

    // fills empty context names and checks the control-plane invariant
    let contexts = config.context_set()?;
    for ctx in contexts.control_plane_first() {
        if let Some(slot) = config.contexts.get_mut(&ctx.name) {
            slot.name = ctx.name.clone();
        }
    }
    Ok(config)
}

/// Load a run description
pub fn load_run(path: &Path) -> Result<ProvisionRun> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut run: ProvisionRun = serde_yaml::from_str(&data).map_err(|e| {
        Error::invalid_config(format!("failed to parse {}: {}", path.display(), e))
    })?;
    if run.provision_id.is_empty() {
        run.provision_id = generate_provision_id();
    }
    if run.artifacts_root_dir.as_os_str().is_empty() {
        run.artifacts_root_dir = default_artifacts_base().join(&run.provision_id);
    } else if run.artifacts_root_dir.is_relative() {
        run.artifacts_root_dir = base_dir(path).join(&run.artifacts_root_dir);
    }
    if run.kube_config_path.as_os_str().is_empty() {
        run.kube_config_path = default_kube_config_path();
    }
    Ok(run)
}

fn base_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if !path.as_os_str().is_empty() && path.is_relative() {
        *path = base.join(&*path);
    }
}

fn resolve_opt(base: &Path, path: &mut Option<PathBuf>) {
    if let Some(p) = path.as_mut() {
        resolve(base, p);
    }
}

fn resolve_paths(config: &mut ReadinessConfig, base: &Path) {
    let provision = &mut config.provision_config;
    resolve(base, &mut provision.tf_config.module_folder);
    resolve(base, &mut provision.cloud_config.cred_path);
    resolve_opt(base, &mut provision.k8c_config.values_file_path);
    resolve_opt(base, &mut provision.k8c_config.medusa_secret_from_file);

    for ctx in config.contexts.values_mut() {
        resolve_opt(base, &mut ctx.network_config.traefik_values_file);
        if let Some(cloud) = ctx.cloud_config.as_mut() {
            resolve(base, &mut cloud.cred_path);
        }
    }
}
