// src/state.rs

//! Installed package state
//!
//! The installed state is derived fresh on every invocation by scanning the
//! install root. Each installed package is a directory named by its id whose
//! root holds the `manifest.json` it was extracted with; manifests nested
//! deeper (an app's own data, say) are deliberately not picked up.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::repository::{metadata, INSTALLED_REPO_ID};
use crate::resolver::VersionedPackage;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Scan `pkgs_dir` for installed packages
///
/// Only `<pkgs_dir>/<package>/manifest.json` is considered. A missing
/// install root yields an empty map (nothing has been installed yet).
/// Multiple historical entries per id are kept in scan order.
pub fn installed_packages(
    pkgs_dir: &Path,
) -> Result<BTreeMap<String, Vec<VersionedPackage>>> {
    let mut installed: BTreeMap<String, Vec<VersionedPackage>> = BTreeMap::new();

    if !pkgs_dir.exists() {
        debug!(path = %pkgs_dir.display(), "install root does not exist yet");
        return Ok(installed);
    }

    let mut entries: Vec<_> = fs::read_dir(pkgs_dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {e}", pkgs_dir.display())))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::IoError(format!("Failed to read {}: {e}", pkgs_dir.display())))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.is_file() {
            warn!(path = %dir.display(), "installed directory has no manifest, ignoring");
            continue;
        }

        let data = fs::read(&manifest_path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {e}", manifest_path.display()))
        })?;
        let manifest: Manifest = serde_json::from_slice(&data).map_err(|e| {
            Error::ParseError(format!(
                "Malformed manifest {}: {e}",
                manifest_path.display()
            ))
        })?;
        debug!(package = %manifest.id, version = %manifest.version, "found installed package");

        let record = metadata::versioned_package_from_manifest(&manifest, INSTALLED_REPO_ID);
        installed.entry(record.id.clone()).or_default().push(record);
    }

    Ok(installed)
}
