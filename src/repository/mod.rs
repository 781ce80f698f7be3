// src/repository/mod.rs

//! Package catalog sources
//!
//! Three kinds of source provide package records to the resolver: remote
//! catalogs (http, https, or file URLs), sets of local .kpkg archive files,
//! and the installed tree itself. A [`MultiRepository`] concatenates the
//! records of its sources in insertion order and dispatches downloads to
//! the source whose id matches the package's repository id.

pub mod client;
pub mod metadata;

pub use client::RepositoryClient;

use crate::cancel::{CancelReader, CancelToken};
use crate::error::{Error, Result};
use crate::kpkg::Kpkg;
use crate::resolver::VersionedPackage;
use indicatif::ProgressBar;
use metadata::RepositoryCatalog;
use reqwest::Url;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reserved repository id for packages sourced from local archive files
pub const ARCHIVE_FILE_REPO_ID: &str = "$kpkgfile";

/// Reserved repository id for packages scanned from the installed tree
pub const INSTALLED_REPO_ID: &str = "<installed>";

/// One catalog source behind the shared fetch/download contract
pub enum Source {
    Http(HttpRepository),
    ArchiveFile(ArchiveFileRepository),
    Installed(InstalledRepository),
}

impl Source {
    /// Stable identifier used to route downloads
    pub fn id(&self) -> &str {
        match self {
            Source::Http(repo) => repo.id(),
            Source::ArchiveFile(_) => ARCHIVE_FILE_REPO_ID,
            Source::Installed(_) => INSTALLED_REPO_ID,
        }
    }

    /// Enumerate this source's package records
    pub fn fetch_records(&mut self, cancel: &CancelToken) -> Result<Vec<VersionedPackage>> {
        match self {
            Source::Http(repo) => repo.fetch_records(cancel),
            Source::ArchiveFile(repo) => repo.fetch_records(cancel),
            Source::Installed(repo) => repo.fetch_records(cancel),
        }
    }

    /// Download a package's archive bytes to `dest_path`
    pub fn download(
        &self,
        package: &VersionedPackage,
        dest_path: &Path,
        dry_run: bool,
        progress: Option<&ProgressBar>,
        cancel: &CancelToken,
    ) -> Result<()> {
        match self {
            Source::Http(repo) => repo.download(package, dest_path, dry_run, progress, cancel),
            Source::ArchiveFile(repo) => repo.download(package, dest_path, dry_run, cancel),
            Source::Installed(_) => Err(Error::InitError(format!(
                "cannot download package {} from the installed tree",
                package.id
            ))),
        }
    }
}

/// Source backed by a remote catalog document
pub struct HttpRepository {
    url: Url,
    catalog: Option<RepositoryCatalog>,
}

impl HttpRepository {
    /// Create a source for a catalog URL; only http, https, and file
    /// schemes are accepted
    pub fn new(raw_url: &str) -> Result<Self> {
        let url = Url::parse(raw_url)
            .map_err(|e| Error::InitError(format!("invalid URL {raw_url:?}: {e}")))?;
        match url.scheme() {
            "http" | "https" | "file" => Ok(Self { url, catalog: None }),
            other => Err(Error::InitError(format!(
                "invalid URL scheme {other:?} in repository {raw_url:?}"
            ))),
        }
    }

    /// The catalog's declared id; empty until the catalog has been fetched
    pub fn id(&self) -> &str {
        self.catalog.as_ref().map(|c| c.id.as_str()).unwrap_or("")
    }

    pub fn fetch_records(&mut self, cancel: &CancelToken) -> Result<Vec<VersionedPackage>> {
        cancel.check()?;

        let catalog = match self.url.scheme() {
            "file" => {
                let path = self.url.to_file_path().map_err(|_| {
                    Error::InitError(format!("invalid file URL {}", self.url))
                })?;
                let file = File::open(&path).map_err(|e| {
                    Error::IoError(format!("Failed to open catalog {}: {e}", path.display()))
                })?;
                serde_json::from_reader(file).map_err(|e| {
                    Error::ParseError(format!(
                        "Failed to parse catalog {}: {e}",
                        path.display()
                    ))
                })?
            }
            _ => RepositoryClient::new()?.fetch_catalog(self.url.as_str())?,
        };

        let records = catalog.flatten();
        debug!(repo = %catalog.id, records = records.len(), "fetched catalog records");
        self.catalog = Some(catalog);
        Ok(records)
    }

    pub fn download(
        &self,
        package: &VersionedPackage,
        dest_path: &Path,
        dry_run: bool,
        progress: Option<&ProgressBar>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let catalog = self.catalog.as_ref().ok_or_else(|| {
            Error::InitError("catalog has not been fetched yet".to_string())
        })?;

        if package.repository_id != catalog.id {
            return Err(Error::NotFound(format!(
                "package {} does not belong to repository {}",
                package.id, catalog.id
            )));
        }

        let artifact = catalog
            .find_artifact(&package.id, &package.version)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no artifact for package {} version {}",
                    package.id, package.version
                ))
            })?;

        if dry_run {
            println!(
                "  [dry-run] Downloading package {} version {} from {} to {}",
                package.id,
                package.version,
                artifact.url,
                dest_path.display()
            );
            return Ok(());
        }

        // Artifact URLs in file-backed catalogs point at the local disk
        if let Some(local) = artifact.url.strip_prefix("file://") {
            return copy_local(Path::new(local), dest_path, cancel);
        }

        RepositoryClient::new()?.download_file(&artifact.url, dest_path, progress, cancel)
    }
}

/// Source backed by a set of .kpkg files on disk
#[derive(Default)]
pub struct ArchiveFileRepository {
    paths: Vec<PathBuf>,
    path_for_package: HashMap<String, PathBuf>,
}

impl ArchiveFileRepository {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            path_for_package: HashMap::new(),
        }
    }

    pub fn fetch_records(&mut self, cancel: &CancelToken) -> Result<Vec<VersionedPackage>> {
        let mut records = Vec::new();
        for path in &self.paths {
            cancel.check()?;

            let meta = std::fs::metadata(path).map_err(|e| {
                Error::IoError(format!("Failed to stat {}: {e}", path.display()))
            })?;
            if meta.is_dir() {
                // TODO: scan directories for .kpkg files
                warn!(path = %path.display(), "skipping directory in archive file set");
                continue;
            }

            let kpkg = Kpkg::open(path, cancel)?;
            let record =
                metadata::versioned_package_from_manifest(kpkg.manifest(), ARCHIVE_FILE_REPO_ID);

            // First path naming an id wins
            self.path_for_package
                .entry(record.id.clone())
                .or_insert_with(|| path.clone());
            records.push(record);
        }
        Ok(records)
    }

    pub fn download(
        &self,
        package: &VersionedPackage,
        dest_path: &Path,
        dry_run: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        if dry_run {
            println!(
                "  [dry-run] Copying package {} version {} to {}",
                package.id,
                package.version,
                dest_path.display()
            );
            return Ok(());
        }

        let src_path = self.path_for_package.get(&package.id).ok_or_else(|| {
            Error::NotFound(format!(
                "package {} not found in local archive files",
                package.id
            ))
        })?;

        copy_local(src_path, dest_path, cancel)
    }
}

/// Source backed by the installed package tree
pub struct InstalledRepository {
    pkgs_dir: PathBuf,
}

impl InstalledRepository {
    pub fn new(pkgs_dir: impl Into<PathBuf>) -> Self {
        Self {
            pkgs_dir: pkgs_dir.into(),
        }
    }

    pub fn fetch_records(&mut self, cancel: &CancelToken) -> Result<Vec<VersionedPackage>> {
        cancel.check()?;
        let installed = crate::state::installed_packages(&self.pkgs_dir)?;
        Ok(installed.into_values().flatten().collect())
    }
}

/// Ordered collection of sources sharing one fetch/download contract
#[derive(Default)]
pub struct MultiRepository {
    sources: Vec<Source>,
}

impl MultiRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection of remote sources from catalog URLs
    pub fn from_urls(urls: &[String]) -> Result<Self> {
        let mut multi = Self::new();
        for url in urls {
            multi.add(Source::Http(HttpRepository::new(url)?));
        }
        Ok(multi)
    }

    pub fn add(&mut self, source: Source) {
        self.sources.push(source);
    }

    /// Fetch every source in insertion order and concatenate the records
    pub fn fetch_records(&mut self, cancel: &CancelToken) -> Result<Vec<VersionedPackage>> {
        let mut records = Vec::new();
        for source in &mut self.sources {
            records.extend(source.fetch_records(cancel)?);
        }
        Ok(records)
    }

    /// Route a download to the source whose id matches the package
    pub fn download(
        &self,
        package: &VersionedPackage,
        dest_path: &Path,
        dry_run: bool,
        progress: Option<&ProgressBar>,
        cancel: &CancelToken,
    ) -> Result<()> {
        for source in &self.sources {
            if source.id() == package.repository_id {
                debug!(repo = source.id(), package = %package.id, "dispatching download");
                return source.download(package, dest_path, dry_run, progress, cancel);
            }
        }
        Err(Error::NotFound(format!(
            "package {} not found in any repository",
            package.id
        )))
    }
}

/// Copy a local file, checking the cancellation token between reads
fn copy_local(src: &Path, dest: &Path, cancel: &CancelToken) -> Result<()> {
    let src_file = File::open(src)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", src.display())))?;
    let mut dest_file = File::create(dest)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", dest.display())))?;

    let mut reader = CancelReader::new(cancel, src_file);
    io::copy(&mut reader, &mut dest_file).map_err(|e| {
        if cancel.is_cancelled() {
            Error::Cancelled
        } else {
            Error::IoError(format!(
                "Failed to copy {} to {}: {e}",
                src.display(),
                dest.display()
            ))
        }
    })?;

    Ok(())
}
