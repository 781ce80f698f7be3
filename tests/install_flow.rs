// tests/install_flow.rs

//! End-to-end install and uninstall flows against a temp base directory.

mod common;

use kpm::repository::{ArchiveFileRepository, InstalledRepository, MultiRepository, Source};
use kpm::repository::INSTALLED_REPO_ID;
use kpm::{
    plan_transition, state, CancelToken, Constraint, KpmConfig, ResolvedSet, Resolver,
    TransactionEngine,
};

fn install_fixture(base: &tempfile::TempDir) -> (KpmConfig, MultiRepository, ResolvedSet) {
    let config = KpmConfig::with_base_dir(base.path().join("kpm"));
    let cancel = CancelToken::new();

    // org.example.app depends on org.example.lib
    let app = common::build_archive(
        base.path(),
        "org.example.app",
        [1, 2, 0],
        &[("org.example.lib", [1, 0, 0])],
    );
    let lib = common::build_archive(base.path(), "org.example.lib", [1, 0, 3], &[]);

    let mut multi = MultiRepository::new();
    multi.add(Source::ArchiveFile(ArchiveFileRepository::new(vec![
        app, lib,
    ])));
    let universe = multi.fetch_records(&cancel).unwrap();
    assert_eq!(universe.len(), 2);

    let resolver = Resolver::new(universe);
    let resolved = resolver
        .resolve(&[Constraint::parse("org.example.app>=1.2.0").unwrap()])
        .unwrap();
    assert_eq!(resolved.len(), 2);

    (config, multi, resolved)
}

#[test]
fn test_install_extracts_and_runs_hooks() {
    let base = tempfile::tempdir().unwrap();
    let (config, multi, resolved) = install_fixture(&base);
    let cancel = CancelToken::new();

    let installed = state::installed_packages(&config.pkgs_dir()).unwrap();
    assert!(installed.is_empty());

    let plan = plan_transition(&installed, &resolved);
    assert!(plan.removals.is_empty());
    // Dependency order: the library installs before the app
    assert_eq!(
        plan.additions
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>(),
        vec!["org.example.lib", "org.example.app"]
    );

    let engine = TransactionEngine::new(&multi, &config, false, cancel);
    engine.execute(&plan).unwrap();

    for id in ["org.example.app", "org.example.lib"] {
        let pkg_dir = config.package_dir(id);
        assert!(pkg_dir.join("manifest.json").is_file(), "{id} manifest");
        assert!(pkg_dir.join("payload.txt").is_file(), "{id} payload");
        assert!(pkg_dir.join(".installed").is_file(), "{id} hook marker");
    }

    // The fresh scan agrees with the resolved set
    let installed = state::installed_packages(&config.pkgs_dir()).unwrap();
    assert_eq!(installed.len(), 2);
    let follow_up = plan_transition(&installed, &resolved);
    assert!(follow_up.is_empty());
}

#[test]
fn test_dry_run_changes_nothing() {
    let base = tempfile::tempdir().unwrap();
    let (config, multi, resolved) = install_fixture(&base);
    let cancel = CancelToken::new();

    let plan = plan_transition(&state::installed_packages(&config.pkgs_dir()).unwrap(), &resolved);
    let engine = TransactionEngine::new(&multi, &config, true, cancel);
    engine.execute(&plan).unwrap();

    assert!(!config.pkgs_dir().exists());
}

#[test]
fn test_uninstall_removes_matched_packages_in_order() {
    let base = tempfile::tempdir().unwrap();
    let (config, multi, resolved) = install_fixture(&base);

    let engine = TransactionEngine::new(&multi, &config, false, CancelToken::new());
    engine
        .execute(&plan_transition(
            &state::installed_packages(&config.pkgs_dir()).unwrap(),
            &resolved,
        ))
        .unwrap();

    // Re-plan with both packages uninstalled: the universe is the installed
    // tree, the keep set is empty.
    let cancel = CancelToken::new();
    let mut installed_source = MultiRepository::new();
    installed_source.add(Source::Installed(InstalledRepository::new(
        config.pkgs_dir(),
    )));
    let universe = installed_source.fetch_records(&cancel).unwrap();
    assert_eq!(universe.len(), 2);
    assert!(universe
        .iter()
        .all(|record| record.repository_id == INSTALLED_REPO_ID));

    let resolver = Resolver::new(universe);
    let kept = resolver.resolve(&[]).unwrap();
    assert!(kept.is_empty());

    let installed = state::installed_packages(&config.pkgs_dir()).unwrap();
    let plan = plan_transition(&installed, &kept);
    assert!(plan.additions.is_empty());
    // The library is removed before the app that depends on it
    assert_eq!(
        plan.removals
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>(),
        vec!["org.example.lib", "org.example.app"]
    );

    let engine = TransactionEngine::new(&installed_source, &config, false, cancel);
    engine.execute(&plan).unwrap();

    assert!(!config.package_dir("org.example.app").exists());
    assert!(!config.package_dir("org.example.lib").exists());
    // Uninstall hooks left their markers next to the install root
    assert!(config
        .base_dir()
        .join(".uninstalled-org.example.app")
        .is_file());
    assert!(config
        .base_dir()
        .join(".uninstalled-org.example.lib")
        .is_file());

    let installed = state::installed_packages(&config.pkgs_dir()).unwrap();
    assert!(installed.is_empty());
}

#[test]
fn test_keep_constraints_spare_unmatched_packages() {
    let base = tempfile::tempdir().unwrap();
    let (config, multi, resolved) = install_fixture(&base);

    let engine = TransactionEngine::new(&multi, &config, false, CancelToken::new());
    engine
        .execute(&plan_transition(
            &state::installed_packages(&config.pkgs_dir()).unwrap(),
            &resolved,
        ))
        .unwrap();

    // Uninstall only the app, keeping the library pinned in place
    let cancel = CancelToken::new();
    let mut installed_source = MultiRepository::new();
    installed_source.add(Source::Installed(InstalledRepository::new(
        config.pkgs_dir(),
    )));
    let universe = installed_source.fetch_records(&cancel).unwrap();

    let installed = state::installed_packages(&config.pkgs_dir()).unwrap();
    let target = Constraint::parse("org.example.app").unwrap();
    let mut keep_constraints = Vec::new();
    for records in installed.values() {
        for record in records {
            if target.allows(record) {
                continue;
            }
            let mut keep = Constraint::exactly(record.id.clone(), record.version);
            keep.repository_id = Some(INSTALLED_REPO_ID.to_string());
            keep_constraints.push(keep);
        }
    }

    let resolver = Resolver::new(universe);
    let kept = resolver.resolve(&keep_constraints).unwrap();
    assert_eq!(kept.len(), 1);
    assert!(kept.contains_key("org.example.lib"));

    let plan = plan_transition(&installed, &kept);
    assert_eq!(plan.removals.len(), 1);
    assert_eq!(plan.removals[0].id, "org.example.app");
    assert!(plan.additions.is_empty());

    let engine = TransactionEngine::new(&installed_source, &config, false, cancel);
    engine.execute(&plan).unwrap();

    assert!(!config.package_dir("org.example.app").exists());
    assert!(config.package_dir("org.example.lib").is_dir());
}
