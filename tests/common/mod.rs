// tests/common/mod.rs

//! Shared test utilities building fixture packages and archives.

use kpm::compression::CompressionFormat;
use std::fmt::Write as _;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write a package directory with a manifest, hooks, and a payload file.
///
/// The install hook drops a `.installed` marker in the package directory so
/// tests can prove it ran; the uninstall hook drops `.uninstalled` next to
/// the install root.
pub fn write_package_dir(
    parent: &Path,
    id: &str,
    version: [u32; 3],
    deps: &[(&str, [u32; 3])],
) -> PathBuf {
    let dir = parent.join(format!("{id}-src"));
    fs::create_dir_all(&dir).unwrap();

    let mut dep_entries = String::new();
    for (i, (dep_id, min)) in deps.iter().enumerate() {
        if i > 0 {
            dep_entries.push(',');
        }
        write!(
            dep_entries,
            r#""{dep_id}": {{"min": [{}, {}, {}]}}"#,
            min[0], min[1], min[2]
        )
        .unwrap();
    }

    let manifest = format!(
        r#"{{
            "id": "{id}",
            "name": "{id}",
            "author": "test",
            "description": "fixture package",
            "version": [{}, {}, {}],
            "supported_arch": ["armhf"],
            "dependencies": {{{dep_entries}}}
        }}"#,
        version[0], version[1], version[2]
    );
    fs::write(dir.join("manifest.json"), manifest).unwrap();

    fs::write(dir.join("payload.txt"), format!("payload of {id}\n")).unwrap();

    let install = dir.join("install.sh");
    fs::write(
        &install,
        "#!/bin/sh\ntouch \"$KPM_INSTALL_DIR/.installed\"\n",
    )
    .unwrap();
    fs::set_permissions(&install, fs::Permissions::from_mode(0o755)).unwrap();

    let uninstall = dir.join("uninstall.sh");
    fs::write(
        &uninstall,
        "#!/bin/sh\ntouch \"$KPM_BASE_DIR/.uninstalled-$(basename \"$KPM_INSTALL_DIR\")\"\n",
    )
    .unwrap();
    fs::set_permissions(&uninstall, fs::Permissions::from_mode(0o755)).unwrap();

    dir
}

/// Build a .kpkg archive for a fixture package and return its path.
pub fn build_archive(
    parent: &Path,
    id: &str,
    version: [u32; 3],
    deps: &[(&str, [u32; 3])],
) -> PathBuf {
    let pkg_dir = write_package_dir(parent, id, version, deps);
    let archive = parent.join(format!(
        "{id}-{}.{}.{}.kpkg",
        version[0], version[1], version[2]
    ));
    kpm::kpkg::build(&pkg_dir, &archive, CompressionFormat::Gzip).unwrap();
    fs::remove_dir_all(&pkg_dir).unwrap();
    archive
}
