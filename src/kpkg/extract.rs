// src/kpkg/extract.rs

//! Extracting .kpkg archives
//!
//! Extraction runs in one of two modes: materialize (create files under a
//! target root) or a dry-run listing written to the given writer. Both modes
//! make a fresh pass over the restartable entry stream.
//!
//! Entry names are cleaned before use; a name whose cleaned form escapes the
//! target root (a `..` segment) fails the extraction.

use crate::cancel::{CancelReader, CancelToken};
use crate::error::{Error, Result};
use crate::kpkg::Kpkg;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::{debug, info};

impl Kpkg {
    /// Extract every entry under `target_dir`, creating it if absent
    pub fn extract_all(&mut self, target_dir: &Path, cancel: &CancelToken) -> Result<()> {
        if target_dir.as_os_str().is_empty() {
            return Err(Error::InitError("no target directory specified".to_string()));
        }
        if !target_dir.exists() {
            fs::create_dir_all(target_dir).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {e}", target_dir.display()))
            })?;
            fs::set_permissions(target_dir, fs::Permissions::from_mode(0o755)).map_err(|e| {
                Error::IoError(format!("Failed to chmod {}: {e}", target_dir.display()))
            })?;
        }

        let mut archive = self.entries()?;
        let entries = archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read tar stream: {e}")))?;

        for entry in entries {
            cancel.check()?;
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read tar entry: {e}")))?;

            let name = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Bad entry name: {e}")))?
                .to_string_lossy()
                .into_owned();
            debug!(name = %name, "extracting entry");

            let Some(rel) = clean_entry_path(&name)? else {
                // The archive's root directory entry; the target root exists
                continue;
            };
            let full_path = target_dir.join(&rel);

            let header = entry.header();
            let mode = header
                .mode()
                .map_err(|e| Error::ParseError(format!("Bad mode for {name}: {e}")))?;

            match header.entry_type() {
                EntryType::Directory => {
                    fs::create_dir_all(&full_path).map_err(|e| {
                        Error::IoError(format!("Failed to create {}: {e}", full_path.display()))
                    })?;
                    fs::set_permissions(&full_path, fs::Permissions::from_mode(mode)).map_err(
                        |e| Error::IoError(format!("Failed to chmod {}: {e}", full_path.display())),
                    )?;
                }
                EntryType::Regular => {
                    let mut file = OpenOptions::new()
                        .create(true)
                        .write(true)
                        .truncate(true)
                        .mode(mode)
                        .open(&full_path)
                        .map_err(|e| {
                            Error::IoError(format!("Failed to create {}: {e}", full_path.display()))
                        })?;
                    let mut reader = CancelReader::new(cancel, &mut entry);
                    io::copy(&mut reader, &mut file).map_err(|e| {
                        if cancel.is_cancelled() {
                            Error::Cancelled
                        } else {
                            Error::IoError(format!("Failed to write {}: {e}", full_path.display()))
                        }
                    })?;
                }
                EntryType::Symlink => {
                    let target = link_target(&entry, &name)?;
                    symlink(&target, &full_path).map_err(|e| {
                        Error::IoError(format!(
                            "Failed to link {} -> {}: {e}",
                            full_path.display(),
                            target.display()
                        ))
                    })?;
                }
                EntryType::Link => {
                    // Hard link targets are archive paths; resolve them under
                    // the same root the link itself lands in.
                    let target = link_target(&entry, &name)?;
                    let target_rel = clean_entry_path(&target.to_string_lossy())?.ok_or_else(|| {
                        Error::ParseError(format!("empty hard link target for {name}"))
                    })?;
                    fs::hard_link(target_dir.join(&target_rel), &full_path).map_err(|e| {
                        Error::IoError(format!(
                            "Failed to hard link {}: {e}",
                            full_path.display()
                        ))
                    })?;
                }
                other => {
                    return Err(Error::UnsupportedEntry(format!(
                        "package archive has unsupported entry type {:?} for {}",
                        other, name
                    )));
                }
            }
        }

        info!(target = %target_dir.display(), "extraction finished");
        Ok(())
    }

    /// Write the dry-run listing, one line per entry, to `out`
    ///
    /// Line format: the entry name with a leading `./` stripped, followed by
    /// `type`, `mode`, `size`, `uid`, `gid`, and (for links) `link` fields.
    pub fn list_entries(&mut self, out: &mut dyn Write, cancel: &CancelToken) -> Result<()> {
        let mut archive = self.entries()?;
        let entries = archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read tar stream: {e}")))?;

        for entry in entries {
            cancel.check()?;
            let entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read tar entry: {e}")))?;
            write_entry_line(out, &entry)?;
        }

        Ok(())
    }
}

/// Attribute order matches mtree output, which reads nicer than random
const ATTR_ORDER: [&str; 6] = ["type", "mode", "size", "uid", "gid", "link"];

fn write_entry_line<R: Read>(out: &mut dyn Write, entry: &tar::Entry<'_, R>) -> Result<()> {
    let header = entry.header();
    let raw_name = entry
        .path()
        .map_err(|e| Error::ParseError(format!("Bad entry name: {e}")))?
        .to_string_lossy()
        .into_owned();
    let name = escape_whitespace(raw_name.strip_prefix("./").unwrap_or(&raw_name));

    let mode = header
        .mode()
        .map_err(|e| Error::ParseError(format!("Bad mode for {name}: {e}")))?;
    let size = header
        .size()
        .map_err(|e| Error::ParseError(format!("Bad size for {name}: {e}")))?;
    let uid = header
        .uid()
        .map_err(|e| Error::ParseError(format!("Bad uid for {name}: {e}")))?;
    let gid = header
        .gid()
        .map_err(|e| Error::ParseError(format!("Bad gid for {name}: {e}")))?;

    let mut attrs: Vec<(&str, String)> = vec![
        ("mode", format!("{:o}", mode)),
        ("size", size.to_string()),
        ("uid", uid.to_string()),
        ("gid", gid.to_string()),
    ];

    let type_token = match header.entry_type() {
        EntryType::Directory => "dir",
        EntryType::Regular => "file",
        EntryType::Link | EntryType::Symlink => {
            let target = link_target(entry, &name)?;
            attrs.push(("link", target.to_string_lossy().into_owned()));
            "link"
        }
        EntryType::Char => "char",
        EntryType::Block => "block",
        EntryType::Fifo => "fifo",
        other => {
            return Err(Error::UnsupportedEntry(format!(
                "unsupported entry type {:?} for {}",
                other, name
            )));
        }
    };
    attrs.push(("type", type_token.to_string()));

    write!(out, "{}", name).map_err(|e| Error::IoError(format!("Failed to write listing: {e}")))?;
    for key in ATTR_ORDER {
        if let Some((_, value)) = attrs.iter().find(|(k, _)| *k == key) {
            write!(out, " {}={}", key, value)
                .map_err(|e| Error::IoError(format!("Failed to write listing: {e}")))?;
        }
    }
    writeln!(out).map_err(|e| Error::IoError(format!("Failed to write listing: {e}")))?;

    Ok(())
}

/// Rewrite whitespace characters in an entry name as octal escapes
fn escape_whitespace(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\t' | '\n' | '\x0b' | '\x0c' | '\r' => {
                escaped.push_str(&format!("\\{:o}", ch as u32));
            }
            other => escaped.push(other),
        }
    }
    escaped
}

fn link_target<R: Read>(entry: &tar::Entry<'_, R>, name: &str) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| Error::ParseError(format!("Bad link target for {name}: {e}")))?
        .map(|t| t.into_owned())
        .ok_or_else(|| Error::ParseError(format!("missing link target for {name}")))
}

/// Clean an entry name for joining under the target root
///
/// Strips the leading `./`, drops `.` components, and rejects `..`. Returns
/// `None` for names that clean to nothing (the archive root entry).
fn clean_entry_path(name: &str) -> Result<Option<PathBuf>> {
    let trimmed = name.strip_prefix("./").unwrap_or(name);
    let trimmed = trimmed.trim_start_matches('/');

    let mut cleaned = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(name.to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if cleaned.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(cleaned))
    }
}
