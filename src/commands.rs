// src/commands.rs
//! Command handlers for the kpm CLI

use anyhow::{bail, Context, Result};
use kpm::compression::CompressionFormat;
use kpm::kpkg::{self, Kpkg};
use kpm::repository::{ArchiveFileRepository, MultiRepository, Source, INSTALLED_REPO_ID};
use kpm::{
    plan_transition, state, CancelToken, Constraint, KpmConfig, Resolver, TransactionEngine,
    TransitionPlan, VersionedPackage,
};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List packages: every record from the catalogs, or the installed set
pub fn cmd_list(repo_urls: &[String], installed_only: bool, config: &KpmConfig) -> Result<()> {
    if installed_only {
        let installed = state::installed_packages(&config.pkgs_dir())?;
        for (package_id, records) in &installed {
            println!("{}:", package_id);
            for record in records {
                println!("  {}", record.version);
            }
        }
        return Ok(());
    }

    let cancel = CancelToken::new();
    let mut multi = repositories_from_urls(repo_urls)?;
    let records = multi
        .fetch_records(&cancel)
        .context("failed to fetch packages from repositories")?;

    // Group by repository, then package, for readable output
    let mut by_repo: BTreeMap<&str, BTreeMap<&str, Vec<&VersionedPackage>>> = BTreeMap::new();
    for record in &records {
        by_repo
            .entry(record.repository_id.as_str())
            .or_default()
            .entry(record.id.as_str())
            .or_default()
            .push(record);
    }

    for (repo_id, packages) in &by_repo {
        println!("Repository: {}", repo_id);
        for (package_id, records) in packages {
            println!("{}:", package_id);
            for record in records {
                println!("  {}", record.version);
            }
        }
    }

    Ok(())
}

/// Resolve constraint expressions against the catalogs and print the result
pub fn cmd_resolve(repo_urls: &[String], args: &[String]) -> Result<()> {
    let cancel = CancelToken::new();
    let mut multi = repositories_from_urls(repo_urls)?;
    let universe = multi
        .fetch_records(&cancel)
        .context("failed to fetch packages from repositories")?;
    report_loaded(universe.len());

    let constraints =
        Constraint::parse_all(args).context("failed to parse package constraints from args")?;

    let resolver = Resolver::new(universe);
    let result = resolver
        .resolve(&constraints)
        .context("failed to resolve packages")?;

    println!("Resolved packages:");
    for record in result.values() {
        println!("  - {} (repo: {})", record, record.repository_id);
    }

    Ok(())
}

/// Install packages named by .kpkg files and constraint expressions
pub fn cmd_install(
    repo_urls: &[String],
    args: &[String],
    dry_run: bool,
    config: &KpmConfig,
) -> Result<()> {
    let cancel = CancelToken::new();
    let installed = state::installed_packages(&config.pkgs_dir())?;

    let (file_args, constraint_args) = split_file_args(args)?;

    // Archives named on the command line both seed the universe and pin
    // their own id to the version inside the file.
    let mut constraints = Vec::new();
    for path in &file_args {
        let archive = Kpkg::open(path, &cancel)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let manifest = archive.manifest();
        constraints.push(Constraint::exactly(manifest.id.clone(), manifest.version));
        for (dep_id, spec) in &manifest.dependencies {
            constraints.push(Constraint {
                package_id: dep_id.clone(),
                range: spec.range(),
                repository_id: spec.repository_id.clone(),
            });
        }
    }
    constraints.extend(
        Constraint::parse_all(&constraint_args)
            .context("failed to parse package constraints from args")?,
    );

    let mut multi = repositories_from_urls(repo_urls)?;
    if !file_args.is_empty() {
        multi.add(Source::ArchiveFile(ArchiveFileRepository::new(file_args)));
    }

    let universe = multi
        .fetch_records(&cancel)
        .context("failed to fetch packages from repositories")?;
    report_loaded(universe.len());

    let resolver = Resolver::new(universe);
    let result = resolver
        .resolve(&constraints)
        .context("failed to resolve packages")?;
    debug!(resolved = result.len(), "resolved packages");

    let plan = plan_transition(&installed, &result);
    print_plan(&plan);

    println!("\nPerforming package changes...");
    let engine = TransactionEngine::new(&multi, config, dry_run, cancel);
    engine
        .execute(&plan)
        .context("failed to install packages")?;

    Ok(())
}

/// Uninstall installed packages matched by the constraint expressions
pub fn cmd_uninstall(
    repo_urls: &[String],
    args: &[String],
    dry_run: bool,
    config: &KpmConfig,
) -> Result<()> {
    let cancel = CancelToken::new();
    let installed = state::installed_packages(&config.pkgs_dir())?;

    let constraints =
        Constraint::parse_all(args).context("failed to parse package constraints from args")?;
    if constraints.is_empty() {
        bail!("no packages requested for removal");
    }
    for constraint in &constraints {
        if !installed.contains_key(&constraint.package_id) {
            bail!("package {:?} is not installed", constraint.package_id);
        }
    }

    let mut multi = repositories_from_urls(repo_urls)?;
    multi.add(Source::Installed(kpm::repository::InstalledRepository::new(
        config.pkgs_dir(),
    )));

    let universe = multi
        .fetch_records(&cancel)
        .context("failed to fetch packages from repositories")?;
    report_loaded(universe.len());

    // Every installed package not matched by an argument is pinned in
    // place; the matched ones fall out of the resolved set and become
    // removals in the diff.
    let mut keep_constraints = Vec::new();
    for records in installed.values() {
        for record in records {
            let matched = constraints.iter().any(|c| c.allows(record));
            if matched {
                debug!(package = %record, "will uninstall package");
                continue;
            }
            let mut keep = Constraint::exactly(record.id.clone(), record.version);
            keep.repository_id = Some(INSTALLED_REPO_ID.to_string());
            keep_constraints.push(keep);
        }
    }

    let resolver = Resolver::new(universe);
    let result = resolver
        .resolve(&keep_constraints)
        .context("failed to resolve packages")?;

    let plan = plan_transition(&installed, &result);
    print_plan(&plan);

    println!("\nPerforming package changes...");
    let engine = TransactionEngine::new(&multi, config, dry_run, cancel);
    engine
        .execute(&plan)
        .context("failed to remove packages")?;

    Ok(())
}

/// Inspect or extract a .kpkg archive
pub fn cmd_extract(archive: &Path, output: &Path, test: bool) -> Result<()> {
    let cancel = CancelToken::new();
    let mut kpkg = Kpkg::open(archive, &cancel)
        .with_context(|| format!("failed to open {}", archive.display()))?;

    if test {
        let mut stdout = io::stdout().lock();
        kpkg.list_entries(&mut stdout, &cancel)
            .context("failed to list archive entries")?;
        return Ok(());
    }

    kpkg.extract_all(output, &cancel)
        .with_context(|| format!("failed to extract to {}", output.display()))?;
    Ok(())
}

/// Build a .kpkg archive from a package directory
pub fn cmd_create(input_dir: &Path, output: Option<PathBuf>, compress: &str) -> Result<()> {
    if !input_dir.is_dir() {
        bail!("input path {} must be a directory", input_dir.display());
    }
    let format = CompressionFormat::parse(compress)?;

    // Default to <dirname>.kpkg next to the current directory
    let output = match output {
        Some(path) => path,
        None => {
            let base = input_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "package".to_string());
            PathBuf::from(format!("{base}.kpkg"))
        }
    };

    kpkg::build(input_dir, &output, format)
        .with_context(|| format!("failed to build {}", output.display()))?;
    println!("Created {}", output.display());
    Ok(())
}

fn repositories_from_urls(repo_urls: &[String]) -> Result<MultiRepository> {
    if !repo_urls.is_empty() {
        println!("Using packages from repositories:");
        for url in repo_urls {
            println!("  - {}", url);
        }
    }
    MultiRepository::from_urls(repo_urls).context("failed to create repository from URLs")
}

fn report_loaded(count: usize) {
    let suffix = if count == 1 { "" } else { "s" };
    println!("Loaded {count} package{suffix}");
}

/// Separate .kpkg file arguments from constraint expression arguments
///
/// Naming a .kpkg path that does not exist is an error rather than a fall
/// back to package-name parsing.
fn split_file_args(args: &[String]) -> Result<(Vec<PathBuf>, Vec<String>)> {
    let mut files = Vec::new();
    let mut rest = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        let exists = path.is_file();
        if arg.ends_with(".kpkg") || exists {
            if !exists {
                bail!("file {arg:?} does not exist");
            }
            files.push(path.to_path_buf());
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((files, rest))
}

fn print_plan(plan: &TransitionPlan) {
    if !plan.removals.is_empty() {
        println!("Packages to be removed:");
        for record in &plan.removals {
            println!("  - {}", record);
        }
    }
    if !plan.additions.is_empty() {
        println!("Packages to be installed:");
        for record in &plan.additions {
            println!("  - {}", record);
        }
    }
    if plan.is_empty() {
        println!("Nothing to do.");
    }
}
