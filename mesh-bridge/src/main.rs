//! memory-mesh — operator CLI for a memory mesh directory

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mesh_bridge::{BridgeFileConfig, MemoryMeshBridge};
use mesh_core::{Category, CategoryHint, Metadata};

/// Inspect and maintain a memory mesh
#[derive(Parser)]
#[command(name = "memory-mesh")]
#[command(about = "Inspect and maintain a memory mesh")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Memory directory (overrides the config file)
    #[arg(long, short = 'd', global = true)]
    pub memory_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, short, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show tier counts and counters
    Stats,

    /// Store a memory and consolidate it to disk
    Store {
        /// Memory content
        content: String,
        /// Category (auto-detected when omitted)
        #[arg(long)]
        category: Option<Category>,
        /// Importance, 0.0 to 1.0
        #[arg(long, default_value_t = 0.5)]
        importance: f32,
    },

    /// Search memories
    Recall {
        /// Search query
        query: String,
        /// Only search this category
        #[arg(long)]
        category: Option<Category>,
        /// Maximum results
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Move working memory into long-term storage
    Consolidate {
        /// Consolidate even below the threshold
        #[arg(long)]
        force: bool,
    },

    /// Rotate a backup of the persisted documents
    Backup,

    /// Delete every memory
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.mesh.general.log_level);

    let bridge = MemoryMeshBridge::open(config).context("failed to open memory mesh")?;
    let mesh = bridge.mesh();

    match cli.command {
        Command::Stats => {
            let stats = bridge.get_memory_stats();
            if cli.json {
                #[derive(Serialize)]
                struct Report<'a> {
                    #[serde(flatten)]
                    stats: &'a mesh_bridge::BridgeStats,
                    counters: mesh_core::metrics::CounterSnapshot,
                }
                print_json(&Report {
                    stats: &stats,
                    counters: mesh.counters().snapshot(),
                })?;
            } else {
                println!("Memory directory:   {}", mesh.memory_dir().display());
                println!("Working memories:   {}", stats.mesh.working_memory_count);
                println!("Episodic memories:  {}", stats.mesh.episodic_memory_count);
                println!("Semantic memories:  {}", stats.mesh.semantic_memory_count);
                println!("Last consolidation: {}", stats.mesh.last_consolidation.to_rfc3339());
                for (category, count) in &stats.mesh.categories {
                    println!("  {category:<14} {count}");
                }
            }
        }
        Command::Store {
            content,
            category,
            importance,
        } => {
            let hint = CategoryHint::from(category);
            let id = mesh.store(&content, hint, importance, Metadata::new())?;
            // A one-shot process only keeps what reaches disk.
            let report = mesh.consolidate_all(true);
            if !report.persisted {
                mesh.save().context("failed to save memory")?;
            }
            if cli.json {
                print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Stored {id}");
            }
        }
        Command::Recall { query, category, limit } => {
            let limit = limit.unwrap_or(mesh.config().retrieval.default_limit);
            let hits = mesh.retrieve_scored(&query, category, limit);
            // Persist the access bookkeeping.
            mesh.save().context("failed to save access statistics")?;
            if cli.json {
                print_json(&hits)?;
            } else if hits.is_empty() {
                println!("No matching memories");
            } else {
                for hit in &hits {
                    println!("{}  [{}] {}", hit.score, hit.memory.category, hit.memory.content);
                }
            }
        }
        Command::Consolidate { force } => {
            let report = bridge.consolidate(force);
            if cli.json {
                print_json(&report)?;
            } else if report.ran {
                println!(
                    "Consolidated {} memories (saved: {})",
                    report.consolidated, report.persisted
                );
            } else {
                println!("Below consolidation threshold; nothing to do (use --force)");
            }
        }
        Command::Backup => match mesh.backup().context("backup failed")? {
            Some(dest) => println!("Backup written to {}", dest.display()),
            None => println!("Backups are disabled (persistence.backup_count = 0)"),
        },
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear memories without --yes");
            }
            mesh.clear_all();
            mesh.save().context("failed to save cleared state")?;
            println!("All memories cleared");
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<BridgeFileConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeFileConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BridgeFileConfig::default(),
    };
    if let Some(dir) = &cli.memory_dir {
        config.mesh.persistence.memory_dir.clone_from(dir);
    }
    Ok(config)
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
