// src/kpkg/build.rs

//! Building .kpkg archives from a package directory
//!
//! The build walks the input tree in sorted order and writes one normalized
//! GNU tar header per entry. Normalization strips everything host-specific:
//! uid/gid are zeroed, user/group names are emptied, the mode keeps only its
//! permission bits, and the modification time is pinned to a constant. Two
//! builds of the same tree therefore produce identical bytes.

use crate::compression::{CompressionFormat, Compressor};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tar::{Builder, EntryType, Header};
use tracing::debug;

/// All archive entries carry this mtime: 2000-01-01T00:00:00Z
const ARCHIVE_MTIME: u64 = 946_684_800;

/// Build a .kpkg archive from `root_path` into `dest`
///
/// The input directory must contain a `manifest.json` at its root. Entries
/// other than regular files, directories, and symlinks are refused.
pub fn build(root_path: &Path, dest: &Path, compression: CompressionFormat) -> Result<()> {
    let manifest_path = root_path.join("manifest.json");
    if !manifest_path.is_file() {
        return Err(Error::NotFound(format!(
            "manifest.json must be present in the package directory {}",
            root_path.display()
        )));
    }

    let dest_file = File::create(dest)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", dest.display())))?;
    let compressor = Compressor::new(dest_file, compression);
    let mut builder = Builder::new(compressor);

    // Root entry first, then the sorted tree below it.
    let root_meta = fs::metadata(root_path)
        .map_err(|e| Error::IoError(format!("Failed to stat {}: {e}", root_path.display())))?;
    append_dir(&mut builder, "./", root_meta.permissions().mode())?;
    append_tree(&mut builder, root_path, Path::new(""))?;

    let compressor = builder
        .into_inner()
        .map_err(|e| Error::IoError(format!("Failed to finish tar stream: {e}")))?;
    compressor.finish()?;

    debug!(dest = %dest.display(), compression = %compression, "built package archive");
    Ok(())
}

/// Append the contents of `dir` (relative name `rel`) in sorted order
fn append_tree<W: io::Write>(
    builder: &mut Builder<W>,
    root_path: &Path,
    rel: &Path,
) -> Result<()> {
    let dir = root_path.join(rel);
    let mut children: Vec<_> = fs::read_dir(&dir)
        .map_err(|e| Error::IoError(format!("Failed to read directory {}: {e}", dir.display())))?
        .collect::<io::Result<_>>()
        .map_err(|e| Error::IoError(format!("Failed to read directory {}: {e}", dir.display())))?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let child_rel = rel.join(child.file_name());
        let child_path = root_path.join(&child_rel);
        let meta = child_path.symlink_metadata().map_err(|e| {
            Error::IoError(format!("Failed to stat {}: {e}", child_path.display()))
        })?;
        let mode = meta.permissions().mode();
        let name = child_rel.to_string_lossy().into_owned();

        if meta.file_type().is_dir() {
            append_dir(builder, &format!("./{}/", name), mode)?;
            append_tree(builder, root_path, &child_rel)?;
        } else if meta.file_type().is_file() {
            let mut header = normalized_header(EntryType::Regular, mode);
            header.set_size(meta.len());
            let file = File::open(&child_path).map_err(|e| {
                Error::IoError(format!("Failed to open {}: {e}", child_path.display()))
            })?;
            append_raw(builder, header, &format!("./{}", name), None, file).map_err(|e| {
                Error::IoError(format!("Failed to archive {}: {e}", child_path.display()))
            })?;
        } else if meta.file_type().is_symlink() {
            // The link target is stored verbatim, without canonicalization
            let target = fs::read_link(&child_path).map_err(|e| {
                Error::IoError(format!("Failed to read link {}: {e}", child_path.display()))
            })?;
            let mut header = normalized_header(EntryType::Symlink, mode);
            header.set_size(0);
            append_raw(
                builder,
                header,
                &format!("./{}", name),
                Some(target.as_os_str().as_bytes()),
                io::empty(),
            )
            .map_err(|e| {
                Error::IoError(format!("Failed to archive link {}: {e}", child_path.display()))
            })?;
        } else {
            return Err(Error::UnsupportedEntry(format!(
                "cannot add non-regular file {}",
                child_path.display()
            )));
        }
    }

    Ok(())
}

fn append_dir<W: io::Write>(builder: &mut Builder<W>, name: &str, mode: u32) -> Result<()> {
    let mut header = normalized_header(EntryType::Directory, mode);
    header.set_size(0);
    append_raw(builder, header, name, None, io::empty())
        .map_err(|e| Error::IoError(format!("Failed to archive directory {name}: {e}")))
}

/// A GNU header with all host-specific metadata stripped
fn normalized_header(entry_type: EntryType, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode & 0o777);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(ARCHIVE_MTIME);
    header
}

/// Write a header with the on-wire name stored byte-for-byte
///
/// `Header::set_path` rewrites names (the leading `./` is dropped, the
/// trailing `/` on directories is not guaranteed), so the name and link
/// target bytes go into the GNU header fields directly. Longer values
/// spill into GNU long-name/long-link entries first.
pub(crate) fn append_raw<W: io::Write, R: io::Read>(
    builder: &mut Builder<W>,
    mut header: Header,
    name: &str,
    link_target: Option<&[u8]>,
    data: R,
) -> io::Result<()> {
    if name.len() > 100 {
        append_long_entry(builder, EntryType::GNULongName, name.as_bytes())?;
    }
    if let Some(target) = link_target {
        if target.len() > 100 {
            append_long_entry(builder, EntryType::GNULongLink, target)?;
        }
    }

    {
        let gnu = header.as_gnu_mut().expect("header was created as GNU");
        let name_len = name.len().min(gnu.name.len());
        gnu.name[..name_len].copy_from_slice(&name.as_bytes()[..name_len]);
        if let Some(target) = link_target {
            let target_len = target.len().min(gnu.linkname.len());
            gnu.linkname[..target_len].copy_from_slice(&target[..target_len]);
        }
    }
    header.set_cksum();
    builder.append(&header, data)
}

/// GNU long-name/long-link pseudo entry carrying an oversized value
fn append_long_entry<W: io::Write>(
    builder: &mut Builder<W>,
    entry_type: EntryType,
    value: &[u8],
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(ARCHIVE_MTIME);

    let mut data = value.to_vec();
    data.push(0);
    header.set_size(data.len() as u64);

    let marker = b"././@LongLink";
    header.as_gnu_mut().expect("header was created as GNU").name[..marker.len()]
        .copy_from_slice(marker);
    header.set_cksum();
    builder.append(&header, data.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::kpkg::Kpkg;
    use std::os::unix::fs::symlink;

    const TEST_MANIFEST: &str = r#"{
        "id": "com.example.build",
        "name": "Build Test",
        "author": "tester",
        "description": "build test package",
        "version": [1, 0, 0]
    }"#;

    fn make_package_dir(root: &Path) {
        fs::write(root.join("manifest.json"), TEST_MANIFEST).unwrap();
        fs::create_dir(root.join("app")).unwrap();
        fs::write(root.join("app/some-bin"), b"#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(root.join("app/some-bin"), fs::Permissions::from_mode(0o755)).unwrap();
        symlink("some-bin", root.join("app/legacy-some-bin")).unwrap();
    }

    #[test]
    fn test_build_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.kpkg");
        let err = build(dir.path(), &out, CompressionFormat::None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_build_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();
        make_package_dir(&pkg_dir);

        let out = dir.path().join("out.kpkg");
        build(&pkg_dir, &out, CompressionFormat::Gzip).unwrap();

        let kpkg = Kpkg::open(&out, &CancelToken::new()).unwrap();
        assert_eq!(kpkg.manifest().id, "com.example.build");
    }

    #[test]
    fn test_headers_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();
        make_package_dir(&pkg_dir);

        let out = dir.path().join("out.kpkg");
        build(&pkg_dir, &out, CompressionFormat::None).unwrap();

        let file = File::open(&out).unwrap();
        let mut archive = tar::Archive::new(file);
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            assert_eq!(header.mtime().unwrap(), ARCHIVE_MTIME);
            assert_eq!(header.mode().unwrap() & !0o777, 0);
            names.push(entry.path().unwrap().to_string_lossy().into_owned());
        }

        // Sorted walk: directories first at each level, children inline
        assert_eq!(
            names,
            vec![
                "./",
                "./app/",
                "./app/legacy-some-bin",
                "./app/some-bin",
                "./manifest.json",
            ]
        );
    }

    #[test]
    fn test_build_preserves_link_target_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();
        make_package_dir(&pkg_dir);

        let out = dir.path().join("out.kpkg");
        build(&pkg_dir, &out, CompressionFormat::None).unwrap();

        let file = File::open(&out).unwrap();
        let mut archive = tar::Archive::new(file);
        let mut saw_link = false;
        let mut saw_content = false;
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            if name == "./app/legacy-some-bin" {
                assert_eq!(entry.header().entry_type(), EntryType::Symlink);
                let target = entry.link_name().unwrap().unwrap();
                assert_eq!(target.to_string_lossy(), "some-bin");
                saw_link = true;
            }
            if name == "./app/some-bin" {
                assert_eq!(entry.header().mode().unwrap(), 0o755);
                let mut content = Vec::new();
                io::Read::read_to_end(&mut entry, &mut content).unwrap();
                assert_eq!(content, b"#!/bin/sh\necho hi\n");
                saw_content = true;
            }
        }
        assert!(saw_link && saw_content);
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();
        make_package_dir(&pkg_dir);

        let out_a = dir.path().join("a.kpkg");
        let out_b = dir.path().join("b.kpkg");
        build(&pkg_dir, &out_a, CompressionFormat::None).unwrap();
        build(&pkg_dir, &out_b, CompressionFormat::None).unwrap();

        assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
    }

    #[test]
    fn test_build_refuses_special_files() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("manifest.json"), TEST_MANIFEST).unwrap();

        // A unix socket is neither file, directory, nor symlink
        let socket_path = pkg_dir.join("control.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket_path).unwrap();

        let out = dir.path().join("out.kpkg");
        let err = build(&pkg_dir, &out, CompressionFormat::None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEntry(_)));
    }
}
