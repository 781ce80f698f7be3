// src/config.rs

//! Runtime configuration
//!
//! All path conventions flow from one small value passed explicitly through
//! the pipeline. On the device itself (hostname `kindle`) the base directory
//! lives on the userstore; anywhere else a throwaway directory under the
//! system temp dir is used so development machines are never touched.

use std::path::{Path, PathBuf};
use tracing::info;

/// Base directory used on the e-reader itself
const DEVICE_BASE_DIR: &str = "/mnt/us/kpm";

/// The userstore mount on the device
const DEVICE_USERSTORE_DIR: &str = "/mnt/us";

/// Hostname reported by the device
const DEVICE_HOSTNAME: &str = "kindle";

/// Paths the package manager operates under
#[derive(Debug, Clone)]
pub struct KpmConfig {
    base_dir: PathBuf,
    userstore_dir: PathBuf,
}

impl KpmConfig {
    /// Configuration rooted at an explicit base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let userstore_dir = base_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.clone());
        Self {
            base_dir,
            userstore_dir,
        }
    }

    /// Detect the environment from the hostname
    ///
    /// Returns the on-device layout when running on the e-reader and a temp
    /// directory otherwise.
    pub fn detect() -> Self {
        let hostname = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();

        if hostname == DEVICE_HOSTNAME {
            return Self {
                base_dir: PathBuf::from(DEVICE_BASE_DIR),
                userstore_dir: PathBuf::from(DEVICE_USERSTORE_DIR),
            };
        }

        let base_dir = std::env::temp_dir().join("kpmbase");
        info!(base_dir = %base_dir.display(), "using temporary base dir for non-device host");
        Self {
            userstore_dir: base_dir.clone(),
            base_dir,
        }
    }

    /// The base directory holding all package manager state
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The install root: one subdirectory per installed package
    pub fn pkgs_dir(&self) -> PathBuf {
        self.base_dir.join("pkgs")
    }

    /// The directory of one installed package
    pub fn package_dir(&self, package_id: &str) -> PathBuf {
        self.pkgs_dir().join(package_id)
    }

    /// The device userstore, exported to install hooks
    pub fn userstore_dir(&self) -> &Path {
        &self.userstore_dir
    }
}
