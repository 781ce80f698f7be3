// src/kpkg/mod.rs

//! The .kpkg package archive format
//!
//! A .kpkg file is a normalized GNU tar stream, optionally wrapped in xz or
//! gzip. Every archive carries a `manifest.json` at its root; opening an
//! archive locates, parses, and caches that manifest.
//!
//! The underlying file is read twice (metadata first, then content), so the
//! entry stream is restartable: each call to [`Kpkg::entries`] re-seeks the
//! file and re-wraps the compression layer, returning a fresh tar reader.

mod build;
mod extract;

pub use build::build;

use crate::cancel::CancelToken;
use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An opened .kpkg archive with its parsed manifest
///
/// Methods that iterate entries take `&mut self`: the archive owns a single
/// file cursor and concurrent iteration is not supported.
#[derive(Debug)]
pub struct Kpkg {
    path: PathBuf,
    file: File,
    format: CompressionFormat,
    manifest: Manifest,
}

impl Kpkg {
    /// Open an archive, detect its compression, and read its manifest
    pub fn open(path: impl AsRef<Path>, cancel: &CancelToken) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;

        let format = compression::detect_format(&mut file)?;
        debug!(path = %path.display(), format = %format, "opened package archive");

        let manifest = read_manifest(&mut file, format, path, cancel)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            format,
            manifest,
        })
    }

    /// The manifest cached at open time
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The path this archive was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh pass over the archive entries
    ///
    /// Seeks the file back to zero and re-wraps the compression layer, so
    /// each call yields the full entry sequence from the beginning.
    pub(crate) fn entries(&mut self) -> Result<tar::Archive<Box<dyn Read + '_>>> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::IoError(format!("Failed to rewind {}: {e}", self.path.display())))?;
        let reader = compression::create_decoder(&mut self.file, self.format);
        Ok(tar::Archive::new(reader))
    }
}

/// Scan the archive for a root-level manifest.json and parse it
fn read_manifest(
    file: &mut File,
    format: CompressionFormat,
    path: &Path,
    cancel: &CancelToken,
) -> Result<Manifest> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::IoError(format!("Failed to rewind {}: {e}", path.display())))?;
    let reader = compression::create_decoder(&mut *file, format);
    let mut archive = tar::Archive::new(reader);

    let entries = archive
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read tar stream in {}: {e}", path.display())))?;

    for entry in entries {
        cancel.check()?;
        let mut entry = entry
            .map_err(|e| Error::ParseError(format!("Failed to read tar entry in {}: {e}", path.display())))?;

        let entry_path = entry
            .path()
            .map_err(|e| Error::ParseError(format!("Bad entry name in {}: {e}", path.display())))?
            .to_string_lossy()
            .into_owned();
        let name = entry_path.strip_prefix("./").unwrap_or(&entry_path);
        if name.is_empty() || name == "." {
            continue;
        }

        if name == "manifest.json" {
            if !entry.header().entry_type().is_file() {
                return Err(Error::ParseError(format!(
                    "manifest.json in {} is not a regular file",
                    path.display()
                )));
            }
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::IoError(format!("Failed to read manifest.json: {e}")))?;
            let manifest: Manifest = serde_json::from_slice(&data).map_err(|e| {
                Error::ParseError(format!("Malformed manifest.json in {}: {e}", path.display()))
            })?;
            return Ok(manifest);
        }
    }

    Err(Error::NotFound(format!(
        "archive {} does not contain a manifest.json",
        path.display()
    )))
}
