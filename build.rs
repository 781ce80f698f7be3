// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: repository catalog URL
fn repo_arg() -> Arg {
    Arg::new("repo")
        .long("repo")
        .value_name("URL")
        .action(clap::ArgAction::Append)
        .help("Repository catalog URL (repeatable)")
}

/// Common argument: dry run
fn dry_run_arg() -> Arg {
    Arg::new("dry_run")
        .short('n')
        .long("dry-run")
        .action(clap::ArgAction::SetTrue)
        .help("Perform a trial run with no changes made")
}

fn build_cli() -> Command {
    Command::new("kpm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Package manager for jailbroken Kindle e-readers")
        .arg(
            Arg::new("base_dir")
                .long("base-dir")
                .value_name("DIR")
                .help("Override the base directory"),
        )
        .subcommand(
            Command::new("list")
                .about("List available packages")
                .arg(repo_arg())
                .arg(
                    Arg::new("installed")
                        .short('i')
                        .long("installed")
                        .action(clap::ArgAction::SetTrue)
                        .help("List installed packages only"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve package requests without installing anything")
                .arg(repo_arg())
                .arg(Arg::new("constraints").num_args(0..).help("Constraint expressions")),
        )
        .subcommand(
            Command::new("install")
                .about("Install .kpkg files and packages from repositories")
                .arg(repo_arg())
                .arg(dry_run_arg())
                .arg(Arg::new("args").num_args(0..).help(".kpkg files and constraint expressions")),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Uninstall installed packages by id")
                .arg(repo_arg())
                .arg(dry_run_arg())
                .arg(Arg::new("args").num_args(0..).help("Constraint expressions naming installed packages")),
        )
        .subcommand(
            Command::new("extract")
                .about("Inspect or extract a .kpkg archive")
                .arg(Arg::new("archive").required(true).help("Archive to read"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Directory to extract into"),
                )
                .arg(
                    Arg::new("test")
                        .short('t')
                        .long("test")
                        .action(clap::ArgAction::SetTrue)
                        .help("List entries instead of extracting"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Create a .kpkg archive from a package directory")
                .arg(Arg::new("input_dir").required(true).help("Package directory"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Output archive path"),
                )
                .arg(
                    Arg::new("compress")
                        .short('c')
                        .long("compress")
                        .default_value("none")
                        .help("Compression to apply: none, gzip, or xz"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    if let Err(e) = fs::write(man_dir.join("kpm.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
