use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tilebuilder::cli::commands;
use tilebuilder::config::builder::BuilderConfig;
use tilebuilder::map::Location;
use tilebuilder::persistence;

#[derive(Parser)]
#[command(name = "tilebuilder")]
#[command(about = "A rule-based terrain tile compositing engine for hex-grid maps")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tilebuilder.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build terrain images for a map
    Build {
        /// Terrain map file (rows of comma-separated terrain codes)
        #[arg(short, long)]
        map: PathBuf,

        /// Level-specific rule file, compiled after the global rules
        #[arg(short, long)]
        level: Option<PathBuf>,

        /// Time of day to resolve variants for
        #[arg(short, long)]
        tod: Option<String>,

        /// Save a snapshot of the result
        #[arg(long)]
        snapshot: bool,
    },

    /// Show the flags and images of one cell
    Inspect {
        #[arg(short, long)]
        map: PathBuf,

        #[arg(short, long, allow_negative_numbers = true)]
        x: i32,

        #[arg(short, long, allow_negative_numbers = true)]
        y: i32,

        #[arg(short, long)]
        level: Option<PathBuf>,

        #[arg(short, long)]
        tod: Option<String>,

        /// Print the cell as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage build snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List available snapshots
    List {
        /// Snapshot directory (defaults to the configured one)
        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Load a snapshot file and print its summary
    Restore {
        /// Path to the snapshot file
        file: String,
    },
}

fn init_logging(config: &BuilderConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match BuilderConfig::from_file_or_default(Path::new(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config);

    match cli.command {
        Commands::Build {
            map,
            level,
            tod,
            snapshot,
        } => {
            if let Err(e) =
                commands::build(&config, &map, level.as_deref(), tod.as_deref(), snapshot)
            {
                eprintln!("Build error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Inspect {
            map,
            x,
            y,
            level,
            tod,
            json,
        } => {
            if let Err(e) = commands::inspect(
                &config,
                &map,
                Location::new(x, y),
                level.as_deref(),
                tod.as_deref(),
                json,
            ) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Snapshots { action } => match action {
            SnapshotAction::List { dir } => {
                let dir = dir.unwrap_or_else(|| config.snapshot_directory.clone());
                let snapshot_dir = Path::new(&dir);
                match persistence::list_snapshots(snapshot_dir) {
                    Ok(snapshots) => {
                        if snapshots.is_empty() {
                            println!("No snapshots found in {}", snapshot_dir.display());
                        } else {
                            println!("{:<40} {:>9} {:>12}", "File", "Map", "Size");
                            println!("{}", "-".repeat(63));
                            for s in &snapshots {
                                let name = s
                                    .path
                                    .file_name()
                                    .and_then(|n| n.to_str())
                                    .unwrap_or("?");
                                let size_kb = s.file_size / 1024;
                                println!(
                                    "{:<40} {:>9} {:>9} KB",
                                    name,
                                    format!("{}x{}", s.width, s.height),
                                    size_kb
                                );
                            }
                            println!(
                                "\n{} snapshot(s) in {}",
                                snapshots.len(),
                                snapshot_dir.display()
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Error listing snapshots: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            SnapshotAction::Restore { file } => {
                let path = Path::new(&file);
                match persistence::load_snapshot(path) {
                    Ok(snapshot) => {
                        println!("Restored build from {}", path.display());
                        commands::print_snapshot_summary(&snapshot);
                    }
                    Err(e) => {
                        eprintln!("Error restoring snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
