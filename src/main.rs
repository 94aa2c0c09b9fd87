//! # Catalog Harvest CLI (`harvest`)
//!
//! The `harvest` binary is the primary interface for Catalog Harvest. It
//! provides commands for database initialization, catalog scraping, semantic
//! search, course inspection, and vector management.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest sync <department>` | Scrape a department (or `all`) and reconcile it |
//! | `harvest search "<query>"` | Semantic search over stored courses |
//! | `harvest course <code>` | Show one course with semester history and vector status |
//! | `harvest embed pending` | Backfill missing or stale vectors |
//! | `harvest embed rebuild` | Delete and regenerate all vectors |
//! | `harvest stats` | Database overview |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! harvest init --config ./config/harvest.toml
//!
//! # Scrape one department for one semester
//! harvest sync cmpe --semester "Fall 2025"
//!
//! # Scrape everything the config names
//! harvest sync all
//!
//! # Search the stored catalog
//! harvest search "concurrent programming" --top-k 3
//!
//! # Inspect a single course
//! harvest course CMPE211
//! ```

mod config;
mod db;
mod dedup;
mod embed_cmd;
mod embedding;
mod extract;
mod fetch;
mod get;
mod migrate;
mod models;
mod pipeline;
mod search;
mod stats;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog Harvest CLI — a course-catalog scraping, deduplication, and
/// semantic indexing pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Catalog Harvest — a course-catalog scraping, deduplication, and semantic indexing pipeline",
    version,
    long_about = "Catalog Harvest scrapes university course-catalog sites into structured records, \
    embeds each course's text, deduplicates re-scrapes by semantic similarity, and stores \
    everything in SQLite for semantic search."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. The catalog site, departments,
    /// semesters, database path, and embedding settings are read from here.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (courses,
    /// course_vectors, scrape_failures). This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Scrape a department and reconcile it against the database.
    ///
    /// Lists the department's courses for a semester, fetches each detail
    /// page, extracts a structured record, embeds it, and decides per course
    /// whether it is new, changed, or a duplicate of what is already stored.
    /// Individual course failures are recorded and do not stop the batch.
    Sync {
        /// Department slug from the config (e.g. `cmpe`), or `all` for every
        /// configured department.
        department: String,

        /// Semester to scrape (e.g. "Fall 2025"). Defaults to every semester
        /// in the config.
        #[arg(long)]
        semester: Option<String>,

        /// Maximum number of courses to process per batch.
        #[arg(long)]
        limit: Option<usize>,

        /// List courses without fetching details or writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search stored courses by meaning.
    ///
    /// Embeds the query and ranks every stored course vector by cosine
    /// similarity. Requires an embedding provider to be configured.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Only return courses from this department.
        #[arg(long)]
        department: Option<String>,
    },

    /// Show one course by its code.
    ///
    /// Prints the stored record, its offered-semester history, and the
    /// status of its embedding vector. The code is normalized first, so
    /// `cmpe211`, `CMPE-211`, and `CMPE 211` all name the same course.
    Course {
        /// Course code in any recognizable form.
        code: String,
    },

    /// Manage embedding vectors.
    ///
    /// Subcommands for backfilling vectors the sync could not write and for
    /// regenerating everything after a model change.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Show database statistics.
    ///
    /// Course counts, vector coverage, pending backfills, failures, and a
    /// per-department breakdown.
    Stats,
}

/// Vector management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed courses that are missing vectors or carry stale ones.
    ///
    /// Finds rows flagged vector-pending, rows with no vector for the active
    /// model, and rows whose content changed since their vector was written.
    Pending {
        /// Maximum number of courses to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all vectors.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so report output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            department,
            semester,
            limit,
            dry_run,
        } => {
            pipeline::run_sync(&cfg, &department, semester, limit, dry_run).await?;
        }
        Commands::Search {
            query,
            top_k,
            department,
        } => {
            search::run_search(&cfg, &query, top_k, department).await?;
        }
        Commands::Course { code } => {
            get::run_get(&cfg, &code).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                embed_cmd::run_embed_pending(&cfg, limit, dry_run).await?;
            }
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
