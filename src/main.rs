use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;
use tabledoc::config::Config;
use tabledoc::errors::DocError;
use tabledoc::metadata::{
    BackupStatus, GenerateOutcome, MetadataDiff, MetadataFile, Reconciler, UpdateStats,
};
use tabledoc::TableDocument;

#[derive(Parser)]
#[command(name = "tabledoc", about = "Document a MySQL schema with a hand-edited metadata file")]
struct Cli {
    /// Metadata file (overrides TABLE_DOC_METADATA_PATH).
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,

    /// Connection URL (overrides DATABASE_URL).
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the metadata file, or merge into it when it already exists.
    Generate {
        /// Overwrite an existing file instead of merging.
        #[arg(long)]
        force: bool,
    },
    /// Merge the current schema into the metadata file.
    Update {
        #[arg(long)]
        no_backup: bool,
    },
    /// Show what an update would change.
    Diff,
    /// Permanently delete tombstoned tables and columns.
    Cleanup {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Print enriched table documentation as JSON.
    Doc {
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, DocError> {
    let mut config = Config::from_env();
    if let Some(path) = cli.metadata {
        config.metadata_path = path;
    }
    if let Some(url) = cli.database_url {
        let database = config.connection.take().and_then(|c| c.database);
        config.connection = Some(tabledoc::models::connections::ConnectionConfig {
            database_url: url,
            database,
        });
    }

    match cli.command {
        Command::Cleanup { yes } => {
            if !yes {
                println!("Refusing to delete tombstoned entries without --yes.");
                return Ok(ExitCode::FAILURE);
            }
            let mut reconciler = Reconciler::open(MetadataFile::new(&config.metadata_path))?;
            match reconciler.cleanup_removed_items()? {
                0 => println!("Nothing to clean up."),
                count => println!("Cleaned up {} items.", count),
            }
        }
        Command::Generate { force } => {
            let mut doc = TableDocument::connect(&config).await?;
            match doc.generate_metadata(force).await? {
                GenerateOutcome::Created { tables } => println!(
                    "Generated {} with {} tables.",
                    config.metadata_path.display(),
                    tables
                ),
                GenerateOutcome::Updated(stats) => print_stats(&stats),
            }
        }
        Command::Update { no_backup } => {
            let mut doc = TableDocument::connect(&config).await?;
            let stats = doc.update_metadata(!no_backup).await?;
            print_stats(&stats);
        }
        Command::Diff => {
            let doc = TableDocument::connect(&config).await?;
            print_diff(&doc.check_diff().await?);
        }
        Command::Doc { table, output } => {
            let doc = TableDocument::connect(&config).await?;
            let tables = match table {
                Some(name) => vec![doc.table_info(&name).await?],
                None => doc.all_tables_info().await?,
            };
            let json = serde_json::to_string_pretty(&tables)
                .map_err(|e| DocError::Serialize(e.to_string()))?;

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        fs::create_dir_all(parent).map_err(|e| DocError::io(parent, e))?;
                    }
                    fs::write(&path, json).map_err(|e| DocError::io(&path, e))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_stats(stats: &UpdateStats) {
    println!("Metadata updated:");
    println!("  new tables       {:>5}", stats.new_tables);
    println!("  new columns      {:>5}", stats.new_columns);
    println!("  removed tables   {:>5}", stats.removed_tables);
    println!("  removed columns  {:>5}", stats.removed_columns);
    println!("  preserved items  {:>5}", stats.preserved_items);
    if stats.tombstone_conflicts > 0 {
        println!(
            "WARNING: {} removed entries collided with older tombstones of the same name; \
             the older tombstones were kept. Run `tabledoc cleanup --yes` before reusing names.",
            stats.tombstone_conflicts
        );
    }

    match &stats.backup {
        BackupStatus::Created(path) => println!("Backup: {}", path.display()),
        BackupStatus::Failed(reason) => println!("WARNING: no backup was written ({})", reason),
        BackupStatus::Skipped => {}
    }

    if stats.has_removals() {
        println!("Removed tables and columns are kept with the \"_removed_\" prefix.");
        println!("Run `tabledoc cleanup --yes` to delete them permanently.");
    }
}

fn print_diff(diff: &MetadataDiff) {
    if diff.is_empty() {
        println!("Database and metadata are in sync.");
        return;
    }

    if !diff.new_tables.is_empty() {
        println!("New tables:");
        for name in &diff.new_tables {
            println!("  + {}", name);
        }
    }
    if !diff.removed_tables.is_empty() {
        println!("Removed tables:");
        for name in &diff.removed_tables {
            println!("  - {}", name);
        }
    }
    if !diff.modified_tables.is_empty() {
        println!("Modified tables:");
        for (name, changes) in &diff.modified_tables {
            println!("  * {}", name);
            for column in &changes.new_columns {
                println!("    + {}", column);
            }
            for column in &changes.removed_columns {
                println!("    - {}", column);
            }
        }
    }
    println!("Run `tabledoc update` to apply these changes.");
}
