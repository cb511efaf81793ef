//! # Journal CLI (`journal`)
//!
//! The `journal` binary creates the databases, loads fixtures, rebuilds the
//! document store and search index, lists entities through the aggregator,
//! and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! journal --config ./config/journal.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `journal init` | Create both SQLite databases and run schema migrations |
//! | `journal seed <file>` | Load a JSON fixture into empty relational tables |
//! | `journal sync documents <target>` | Rebuild the document store from relational rows |
//! | `journal sync search <target>` | Rebuild the full-text search entries |
//! | `journal list <entity>` | List exercises, workouts, or muscles as JSON |
//! | `journal serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! journal init
//! journal seed fixtures/journal.json
//! journal sync documents all
//! journal sync search all
//! journal list exercises --include muscles --sort-by name --page-index 0 --page-size 10
//! journal list workouts --search-term bench --include exercise.muscles
//! journal serve
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `info,sqlx=warn`). Command output on stdout is JSON.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use journal::aggregator::Aggregator;
use journal::config::{self, Config};
use journal::document::{DocumentStore, SqliteDocumentStore};
use journal::query::{ListParams, Page};
use journal::search::{open_search_index, SearchKind};
use journal::sync::{self, RetryPolicy};
use journal::{db, migrate, relational, seed, server};

/// Journal CLI: a dual-store read aggregator for a fitness journal.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/journal.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "journal",
    about = "Fitness journal with a document-store fast path and relational fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/journal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both database schemas.
    ///
    /// Idempotent; running it again leaves existing rows untouched.
    Init,

    /// Load a JSON fixture of muscles, exercises, and workouts.
    ///
    /// Tables that already contain rows are skipped.
    Seed {
        /// Path to the fixture file.
        file: PathBuf,
    },

    /// Rebuild a derived store from the relational rows.
    Sync {
        #[command(subcommand)]
        store: SyncStore,
    },

    /// List entities as a JSON page.
    List {
        entity: Entity,

        #[command(flatten)]
        args: ListArgs,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum SyncStore {
    /// Replace the exercise and/or workout documents.
    Documents { target: SyncTarget },
    /// Replace the exercise and/or workout search entries.
    Search { target: SyncTarget },
}

#[derive(Clone, Copy, ValueEnum)]
enum SyncTarget {
    Exercises,
    Workouts,
    All,
}

impl SyncTarget {
    fn kinds(self) -> &'static [SearchKind] {
        match self {
            SyncTarget::Exercises => &[SearchKind::Exercises],
            SyncTarget::Workouts => &[SearchKind::Workouts],
            SyncTarget::All => &[SearchKind::Exercises, SearchKind::Workouts],
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Entity {
    Exercises,
    Workouts,
    Muscles,
}

/// Same parameters as the HTTP list endpoints.
#[derive(Args, Default)]
struct ListArgs {
    /// Comma-separated ids.
    #[arg(long)]
    ids: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Exercise type.
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    exercise_id: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    created_date: Option<String>,
    #[arg(long)]
    last_updated: Option<String>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    sort_order: Option<String>,
    #[arg(long)]
    page_index: Option<i64>,
    #[arg(long)]
    page_size: Option<i64>,
    /// Relations to expand, e.g. `muscles` or `exercise.muscles,weekplans.weekplansets`.
    #[arg(long)]
    include: Option<String>,
    #[arg(long)]
    search_term: Option<String>,
    #[arg(long)]
    muscles_sort_by: Option<String>,
    #[arg(long)]
    muscles_sort_order: Option<String>,
}

impl From<ListArgs> for ListParams {
    fn from(a: ListArgs) -> Self {
        ListParams {
            ids: a.ids,
            name: a.name,
            description: a.description,
            kind: a.kind,
            exercise_id: a.exercise_id,
            user_id: a.user_id,
            created_date: a.created_date,
            last_updated: a.last_updated,
            sort_by: a.sort_by,
            sort_order: a.sort_order,
            page_index: a.page_index,
            page_size: a.page_size,
            include: a.include,
            search_term: a.search_term,
            muscles_sort_by: a.muscles_sort_by,
            muscles_sort_order: a.muscles_sort_order,
        }
    }
}

#[derive(Serialize)]
struct SyncSummary {
    target: &'static str,
    synced: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { file } => {
            let pool = db::connect(&cfg).await?;
            let report = seed::seed_from_file(&pool, &file).await?;
            print_json(&report)?;
        }
        Commands::Sync { store } => {
            let summaries = run_sync(&cfg, store).await?;
            print_json(&summaries)?;
        }
        Commands::List { entity, args } => {
            run_list(&cfg, entity, args.into()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_sync(cfg: &Config, store: SyncStore) -> Result<Vec<SyncSummary>> {
    let pool = db::connect(cfg).await?;
    let mut summaries = Vec::new();

    match store {
        SyncStore::Documents { target } => {
            let documents = SqliteDocumentStore::new(db::connect_documents(cfg).await?);
            let retry = RetryPolicy::from(&cfg.sync);
            for kind in target.kinds() {
                let synced = match kind {
                    SearchKind::Exercises => {
                        sync::sync_exercises_to_documents(&pool, &documents, &retry).await?
                    }
                    SearchKind::Workouts => {
                        sync::sync_workouts_to_documents(&pool, &documents, &retry).await?
                    }
                };
                summaries.push(SyncSummary {
                    target: kind.as_str(),
                    synced,
                });
            }
        }
        SyncStore::Search { target } => {
            let index = open_search_index(&cfg.search, &pool);
            for kind in target.kinds() {
                let synced = sync::sync_search_index(&pool, index.as_ref(), *kind).await?;
                summaries.push(SyncSummary {
                    target: kind.as_str(),
                    synced,
                });
            }
        }
    }

    Ok(summaries)
}

async fn run_list(cfg: &Config, entity: Entity, params: ListParams) -> Result<()> {
    let pool = db::connect(cfg).await?;

    match entity {
        Entity::Muscles => {
            let query = params.muscle_query()?;
            let listing = relational::list_muscles(&pool, &query).await?;
            print_json(&Page::new(listing, params.page_index, params.page_size))
        }
        Entity::Exercises | Entity::Workouts => {
            let documents: Arc<dyn DocumentStore> =
                Arc::new(SqliteDocumentStore::new(db::connect_documents(cfg).await?));
            let search = open_search_index(&cfg.search, &pool);
            let aggregator = Aggregator::from_config(cfg, pool, documents, search);

            if let Entity::Exercises = entity {
                let query = params.exercise_query()?;
                let result = aggregator.exercises(&query).await?;
                print_json(&Page::new(result.into_listing(), params.page_index, params.page_size))
            } else {
                let query = params.workout_query()?;
                let result = aggregator.workouts(&query).await?;
                print_json(&Page::new(result.into_listing(), params.page_index, params.page_size))
            }
        }
    }
}
