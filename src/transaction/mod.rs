// src/transaction/mod.rs

//! Transaction execution
//!
//! Consumes a [`TransitionPlan`]: removals run first, then additions, each
//! as one sequential step. A failing step aborts the remaining plan; steps
//! already performed are not rolled back. Dry-run mode prints every would-be
//! action and touches nothing.
//!
//! An addition stages through temp locations (download to a temp file,
//! extract to a temp directory) before files are copied into the package
//! directory, so a failed download or extraction never leaves a partial
//! package behind. Temp locations are cleaned up on every exit path.

mod planner;

pub use planner::{plan_transition, TransitionPlan};

use crate::cancel::CancelToken;
use crate::config::KpmConfig;
use crate::error::{Error, Result};
use crate::kpkg::Kpkg;
use crate::repository::MultiRepository;
use crate::resolver::VersionedPackage;
use crate::scriptlet;
use indicatif::ProgressBar;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, warn};

/// Executes a transition plan against the install root
pub struct TransactionEngine<'a> {
    repo: &'a MultiRepository,
    config: &'a KpmConfig,
    dry_run: bool,
    cancel: CancelToken,
}

impl<'a> TransactionEngine<'a> {
    pub fn new(
        repo: &'a MultiRepository,
        config: &'a KpmConfig,
        dry_run: bool,
        cancel: CancelToken,
    ) -> Self {
        Self {
            repo,
            config,
            dry_run,
            cancel,
        }
    }

    /// Run the plan: removals first, then additions
    pub fn execute(&self, plan: &TransitionPlan) -> Result<()> {
        debug!(
            removals = plan.removals.len(),
            additions = plan.additions.len(),
            dry_run = self.dry_run,
            "performing package changes"
        );

        for record in &plan.removals {
            self.cancel.check()?;
            self.remove_package(record)?;
        }
        for record in &plan.additions {
            self.cancel.check()?;
            self.add_package(record)?;
            println!("{}: installed successfully", record.id);
        }

        if self.dry_run {
            println!("\nDry run finished! No changes were made.");
        }
        Ok(())
    }

    /// Run the uninstall hook, then delete the package directory
    fn remove_package(&self, record: &VersionedPackage) -> Result<()> {
        let package_dir = self.config.package_dir(&record.id);
        let uninstaller = package_dir.join("uninstall.sh");

        println!(
            "Running uninstall script for {} (version {})",
            record.id, record.version
        );

        if self.dry_run {
            println!(" - [dry-run] /bin/sh -l {}", uninstaller.display());
            println!(
                " - [dry-run] Removed package directory {}",
                package_dir.display()
            );
            return Ok(());
        }

        if uninstaller.is_file() {
            scriptlet::run_hook(&uninstaller, &package_dir, self.config, &self.cancel)?;
        } else {
            debug!(package = %record.id, "no uninstall script for package");
        }

        fs::remove_dir_all(&package_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to remove package dir {}: {e}",
                package_dir.display()
            ))
        })
    }

    /// Download, extract, copy into place, and run the install hook
    fn add_package(&self, record: &VersionedPackage) -> Result<()> {
        let package_dir = self.config.package_dir(&record.id);

        if self.dry_run {
            println!(
                " - [dry-run] Downloading and unpacking package {} to {}",
                record, package_dir.display()
            );
            self.repo
                .download(record, Path::new("/dev/null"), true, None, &self.cancel)?;
            return Ok(());
        }

        fs::create_dir_all(&package_dir).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", package_dir.display()))
        })?;

        // Download into a temp file that disappears with this scope
        let temp_file = tempfile::Builder::new()
            .suffix(".kpkg")
            .tempfile()
            .map_err(|e| Error::IoError(format!("Failed to create temp file: {e}")))?;

        let progress = ProgressBar::new(0);
        progress.set_message(record.to_string());
        let download_result = self.repo.download(
            record,
            temp_file.path(),
            false,
            Some(&progress),
            &self.cancel,
        );
        progress.finish_and_clear();
        download_result?;

        let mut kpkg = Kpkg::open(temp_file.path(), &self.cancel)?;

        let staging = tempfile::Builder::new()
            .prefix(&format!("kpm-extract-{}-", record.id))
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create staging dir: {e}")))?;
        kpkg.extract_all(staging.path(), &self.cancel)?;

        copy_tree(staging.path(), &package_dir, &self.cancel)?;

        let installer = package_dir.join("install.sh");
        if !installer.is_file() {
            debug!(package = %record.id, "no install script for package");
            return Ok(());
        }
        fs::set_permissions(&installer, fs::Permissions::from_mode(0o755)).map_err(|e| {
            Error::IoError(format!(
                "Failed to make installer {} executable: {e}",
                installer.display()
            ))
        })?;

        println!(
            "Running install script for {} (version {})",
            record.id, record.version
        );
        scriptlet::run_hook(&installer, &package_dir, self.config, &self.cancel)
    }
}

/// Copy an extracted tree into the package directory
///
/// Symlinks are skipped with a warning: the device userstore is vfat and
/// cannot hold them.
fn copy_tree(src_dir: &Path, dest_dir: &Path, cancel: &CancelToken) -> Result<()> {
    let entries = fs::read_dir(src_dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {e}", src_dir.display())))?;

    for entry in entries {
        cancel.check()?;
        let entry =
            entry.map_err(|e| Error::IoError(format!("Failed to read directory entry: {e}")))?;
        let src_path = entry.path();
        let dest_path = dest_dir.join(entry.file_name());

        let file_type = entry
            .file_type()
            .map_err(|e| Error::IoError(format!("Failed to stat {}: {e}", src_path.display())))?;

        if file_type.is_symlink() {
            warn!(path = %src_path.display(), "link copying is not supported on the userstore, skipping");
        } else if file_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {e}", dest_path.display()))
            })?;
            copy_tree(&src_path, &dest_path, cancel)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dest_path).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} to {}: {e}",
                    src_path.display(),
                    dest_path.display()
                ))
            })?;
        } else {
            warn!(path = %src_path.display(), "unsupported file type, skipping");
        }
    }

    Ok(())
}
