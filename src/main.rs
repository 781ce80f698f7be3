// src/main.rs
//! kpm - CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use kpm::KpmConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "kpm")]
#[command(version)]
#[command(about = "Package manager for jailbroken Kindle e-readers", long_about = None)]
struct Cli {
    /// Repository catalog URL (repeatable)
    #[arg(long = "repo", global = true, value_name = "URL")]
    repos: Vec<String>,

    /// Override the base directory (defaults to the device layout on a
    /// Kindle, a temp directory elsewhere)
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available packages
    List {
        /// List installed packages only
        #[arg(short, long)]
        installed: bool,
    },

    /// Resolve package requests without installing anything
    Resolve {
        /// Constraint expressions, e.g. org.example.pkg>=1.2.0
        constraints: Vec<String>,
    },

    /// Install .kpkg files and packages from repositories
    Install {
        /// .kpkg file paths and constraint expressions
        args: Vec<String>,

        /// Perform a trial run with no changes made
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Uninstall installed packages by id
    Uninstall {
        /// Constraint expressions naming installed packages
        args: Vec<String>,

        /// Perform a trial run with no changes made
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Inspect or extract a .kpkg archive
    Extract {
        /// Archive to read
        archive: PathBuf,

        /// Directory to extract into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// List entries instead of extracting
        #[arg(short, long)]
        test: bool,
    },

    /// Create a .kpkg archive from a package directory
    Create {
        /// Directory containing manifest.json and the package files
        input_dir: PathBuf,

        /// Output archive path (defaults to <dirname>.kpkg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression to apply: none, gzip, or xz
        #[arg(short, long, default_value = "none")]
        compress: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.base_dir {
        Some(dir) => KpmConfig::with_base_dir(dir),
        None => KpmConfig::detect(),
    };

    match cli.command {
        Some(Commands::List { installed }) => commands::cmd_list(&cli.repos, installed, &config),

        Some(Commands::Resolve { constraints }) => commands::cmd_resolve(&cli.repos, &constraints),

        Some(Commands::Install { args, dry_run }) => {
            commands::cmd_install(&cli.repos, &args, dry_run, &config)
        }

        Some(Commands::Uninstall { args, dry_run }) => {
            commands::cmd_uninstall(&cli.repos, &args, dry_run, &config)
        }

        Some(Commands::Extract {
            archive,
            output,
            test,
        }) => commands::cmd_extract(&archive, &output, test),

        Some(Commands::Create {
            input_dir,
            output,
            compress,
        }) => commands::cmd_create(&input_dir, output, &compress),

        None => {
            println!("kpm v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'kpm --help' for usage information");
            Ok(())
        }
    }
}
