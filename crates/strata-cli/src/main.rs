//! # strata CLI
//!
//! Inspect the store files of a Strata storage tree.
//!
//! ## Commands
//!
//! - `strata classify <path>...` - Report what each store file is
//! - `strata scan <dir>` - Classify every file below a directory
//! - `strata resolve <path>` - Print the file whose bytes a store file reads
//! - `strata locality <path>` - Show the block distribution of a store file
//! - `strata config show|path` - Inspect configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_config::logging::{init_logging, LogLevel};
use strata_config::{log_cli_info, log_cli_warn, Config};
use strata_storefile::LocalFileSystem;

mod report;

use report::{FileReport, ScanSummary};

/// Strata - store file inspection
#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage root directory (overrides configuration)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report what each store file is
    Classify {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Emit JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Classify every file below a directory
    Scan {
        #[arg(value_name = "DIR")]
        directory: PathBuf,

        /// Emit a JSON document instead of text
        #[arg(long)]
        json: bool,

        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Print the file a store file reads its bytes from
    Resolve {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Show the block distribution of a store file
    Locality {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Report the locality index for this host
        #[arg(long)]
        host: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });

    let mut config = Config::load().unwrap_or_else(|e| {
        log_cli_warn!("Falling back to default configuration", error = display(&e));
        Config::default()
    });
    if let Some(root) = &cli.root {
        config.layout.root_dir = root.clone();
    }
    let fs = LocalFileSystem::new(&config.local_fs);

    match cli.command {
        Commands::Classify { paths, json } => cmd_classify(&config, &fs, &paths, json),
        Commands::Scan {
            directory,
            json,
            threads,
        } => cmd_scan(&config, &fs, &directory, json, threads),
        Commands::Resolve { path } => cmd_resolve(&config, &fs, &path),
        Commands::Locality { path, host } => cmd_locality(&config, &fs, &path, host.as_deref()),
        Commands::Config { command } => cmd_config(&config, command),
    }
}

fn cmd_classify(
    config: &Config,
    fs: &LocalFileSystem,
    paths: &[PathBuf],
    json: bool,
) -> Result<()> {
    let mut failed = 0usize;
    for path in paths {
        let report = FileReport::classify(&config.layout, fs, path);
        if report.error.is_some() {
            failed += 1;
        }
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report);
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} paths are not store files", failed, paths.len());
    }
    Ok(())
}

fn cmd_scan(
    config: &Config,
    fs: &LocalFileSystem,
    directory: &Path,
    json: bool,
    threads: Option<usize>,
) -> Result<()> {
    let files: Vec<PathBuf> = walkdir::WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log_cli_warn!("Skipping unreadable entry", error = display(&e));
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    log_cli_info!(
        "Scanning",
        directory = display(directory.display()),
        files = files.len()
    );

    let reports = report::scan(&config.layout, fs, &files, threads)?;
    let summary = ScanSummary::from_reports(&reports);

    if json {
        let doc = serde_json::json!({ "summary": summary, "files": reports });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for report in &reports {
            println!("{}", report);
        }
        println!();
        println!("{}", summary);
    }
    Ok(())
}

fn cmd_resolve(config: &Config, fs: &LocalFileSystem, path: &Path) -> Result<()> {
    let source = report::resolve_source(&config.layout, fs, path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    println!("{}", source.display());
    Ok(())
}

fn cmd_locality(
    config: &Config,
    fs: &LocalFileSystem,
    path: &Path,
    host: Option<&str>,
) -> Result<()> {
    let info = strata_storefile::StoreFileInfo::from_path(&config.layout, fs, path)
        .with_context(|| format!("Failed to classify {}", path.display()))?;
    let Some(distribution) = info.compute_block_distribution(fs)? else {
        println!("{}: no block distribution (source unavailable)", path.display());
        return Ok(());
    };

    println!("{}", info);
    println!(
        "  unique blocks weight: {}",
        distribution.unique_blocks_total_weight()
    );
    for (name, weight) in distribution.top_hosts_with_weights() {
        println!("  {:<24} {}", name, weight);
    }
    if let Some(host) = host {
        println!(
            "  locality index ({}): {:.3}",
            host,
            distribution.locality_index(host)
        );
    }
    Ok(())
}

fn cmd_config(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", Config::project_config_path().display());
        }
    }
    Ok(())
}
