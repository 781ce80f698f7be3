// src/scriptlet/mod.rs

//! Install/uninstall hook execution
//!
//! Each package may ship `install.sh` and `uninstall.sh` at its root. Hooks
//! run through a login shell with the package directory as working
//! directory and the package manager's paths in the environment:
//!
//! - `KPM_INSTALL_DIR` — the package's own directory
//! - `KPM_BASE_DIR` — the package manager base directory
//! - `KPM_USERSTORE_DIR` — the device userstore
//!
//! The child is polled so a tripped cancellation token kills it instead of
//! waiting for completion.

use crate::cancel::CancelToken;
use crate::config::KpmConfig;
use crate::error::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How long to wait between cancellation checks on a running hook
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Environment variable naming the package's install directory
pub const ENV_INSTALL_DIR: &str = "KPM_INSTALL_DIR";
/// Environment variable naming the base directory
pub const ENV_BASE_DIR: &str = "KPM_BASE_DIR";
/// Environment variable naming the userstore directory
pub const ENV_USERSTORE_DIR: &str = "KPM_USERSTORE_DIR";

/// Run a hook script in `package_dir`
///
/// The script is invoked as `/bin/sh -l <script>`, inheriting stdout and
/// stderr so the user sees hook output directly. A non-zero exit status is
/// an error.
pub fn run_hook(
    script_path: &Path,
    package_dir: &Path,
    config: &KpmConfig,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;
    debug!(script = %script_path.display(), "running hook");

    let mut child = Command::new("/bin/sh")
        .arg("-l")
        .arg(script_path)
        .current_dir(package_dir)
        .env(ENV_INSTALL_DIR, package_dir)
        .env(ENV_BASE_DIR, config.base_dir())
        .env(ENV_USERSTORE_DIR, config.userstore_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            Error::HookError(format!("Failed to start {}: {e}", script_path.display()))
        })?;

    loop {
        if cancel.is_cancelled() {
            warn!(script = %script_path.display(), "cancelled, killing hook");
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }

        match child.wait_timeout(POLL_INTERVAL) {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(Error::HookError(format!(
                    "{} exited with status {}",
                    script_path.display(),
                    status
                )));
            }
            Ok(None) => continue,
            Err(e) => {
                return Err(Error::HookError(format!(
                    "Failed to wait for {}: {e}",
                    script_path.display()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config(dir: &Path) -> KpmConfig {
        KpmConfig::with_base_dir(dir.join("base"))
    }

    #[test]
    fn test_successful_hook_runs() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();

        let script = pkg_dir.join("install.sh");
        fs::write(&script, "#!/bin/sh\ntest -n \"$KPM_INSTALL_DIR\"\n").unwrap();

        run_hook(
            &script,
            &pkg_dir,
            &test_config(dir.path()),
            &CancelToken::new(),
        )
        .unwrap();
    }

    #[test]
    fn test_environment_reaches_the_hook() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();

        // The hook records its environment for the test to inspect
        let script = pkg_dir.join("install.sh");
        fs::write(
            &script,
            "#!/bin/sh\necho \"$KPM_INSTALL_DIR:$KPM_BASE_DIR\" > env.txt\n",
        )
        .unwrap();

        let config = test_config(dir.path());
        run_hook(&script, &pkg_dir, &config, &CancelToken::new()).unwrap();

        let recorded = fs::read_to_string(pkg_dir.join("env.txt")).unwrap();
        assert_eq!(
            recorded.trim(),
            format!(
                "{}:{}",
                pkg_dir.display(),
                config.base_dir().display()
            )
        );
    }

    #[test]
    fn test_failing_hook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();

        let script = pkg_dir.join("uninstall.sh");
        fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();

        let err = run_hook(
            &script,
            &pkg_dir,
            &test_config(dir.path()),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::HookError(_)));
    }

    #[test]
    fn test_pre_cancelled_hook_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        fs::create_dir(&pkg_dir).unwrap();

        let script = pkg_dir.join("install.sh");
        fs::write(&script, "#!/bin/sh\ntouch ran.txt\n").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_hook(&script, &pkg_dir, &test_config(dir.path()), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!pkg_dir.join("ran.txt").exists());
    }
}
