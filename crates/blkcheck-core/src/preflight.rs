//! Locating the module binary before anything privileged happens.

use crate::lifecycle::ModuleSource;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Module file {name}.ko not found (searched {searched})")]
    ModuleNotFound { name: String, searched: String },

    #[error("invalid module name {0:?}")]
    InvalidName(String),
}

/// Install location first, then `<cwd>/<name>.ko`.
pub fn candidate_paths(name: &str, kernel_release: &str, cwd: &Path) -> Vec<PathBuf> {
    let file = format!("{name}.ko");
    vec![
        Path::new("/lib/modules")
            .join(kernel_release)
            .join("extra/src")
            .join(&file),
        cwd.join(&file),
    ]
}

pub fn locate_module(name: &str, kernel_release: &str, cwd: &Path) -> Result<ModuleSource, PreflightError> {
    if name.is_empty() || name.contains('/') || name.ends_with(".ko") {
        return Err(PreflightError::InvalidName(name.to_string()));
    }
    let candidates = candidate_paths(name, kernel_release, cwd);
    if candidates[0].is_file() {
        return Ok(ModuleSource::Installed(candidates[0].clone()));
    }
    if candidates[1].is_file() {
        return Ok(ModuleSource::File(candidates[1].clone()));
    }
    Err(PreflightError::ModuleNotFound {
        name: name.to_string(),
        searched: candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
