use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use crate::analytics::Analytics;
use crate::config::Config;
use crate::database::Database;
use crate::error::WaxPulseError;
use crate::remote::RemoteClient;
use crate::reports::Reports;
use crate::schema::Migrator;
use crate::sync::{SyncOrchestrator, SyncSettings};

#[derive(Parser)]
#[command(
    name = "waxpulse",
    version,
    about = "WaxPulse: market value and demand tracking for a Discogs collection"
)]
pub struct Cli {
    /// Database file path (default: the platform data directory)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch collection, wantlist, and stale marketplace prices
    Sync {
        /// Worker thread count (overrides the config file)
        #[arg(long = "threads", short = 't')]
        threads: Option<usize>,

        /// Releases fetched per batch (overrides the config file)
        #[arg(long = "batch", short = 'b')]
        batch: Option<usize>,

        /// Staleness threshold in hours (overrides the config file)
        #[arg(long = "staleness")]
        staleness: Option<i64>,

        /// Refresh every release regardless of staleness
        #[arg(long = "force", default_value_t = false)]
        force: bool,
    },

    /// Price movement between the two most recent observations
    Trends {
        /// Minimum percentage increase to show
        #[arg(long = "min", short = 'm', default_value_t = 5.0)]
        min: f64,

        /// Include decreases and small changes
        #[arg(long = "all", default_value_t = false)]
        all: bool,

        /// Narrow to a format substring (e.g. "Vinyl")
        #[arg(long = "format", short = 'f')]
        format: Option<String>,

        /// Show at most N rows
        #[arg(long = "limit", short = 'l')]
        limit: Option<usize>,
    },

    /// Rank releases by demand, or by composite sell score
    Demand {
        /// Minimum want count to consider
        #[arg(long = "wants", short = 'w', default_value_t = 100)]
        wants: i64,

        /// Rank by sell score instead of the wants/price ratio
        #[arg(long = "sell", default_value_t = false)]
        sell: bool,

        /// Narrow to a format substring
        #[arg(long = "format", short = 'f')]
        format: Option<String>,

        /// Show at most N rows
        #[arg(long = "limit", short = 'l')]
        limit: Option<usize>,
    },

    /// List tracked releases with their latest observed prices
    List {
        /// Title or artist search term
        #[arg(long = "search", short = 's')]
        search: Option<String>,

        /// Narrow to a format substring
        #[arg(long = "format", short = 'f')]
        format: Option<String>,
    },

    /// Observation history for one release
    History {
        /// Discogs release id
        release_id: i64,

        /// Trailing window in days
        #[arg(long = "days", short = 'd', default_value_t = 90)]
        days: i64,
    },

    /// Collection value from the latest observations
    Value {
        /// Include the per-format breakdown
        #[arg(long = "formats", default_value_t = false)]
        formats: bool,

        /// Number of most-valuable releases to list
        #[arg(long = "top", default_value_t = 10)]
        top: usize,
    },

    /// Inspect or roll back schema migrations
    Migrate {
        /// Roll the schema back to this version
        #[arg(long = "rollback")]
        rollback: Option<i64>,
    },
}

impl Cli {
    pub fn handle_command_line(config: &Config) -> Result<(), WaxPulseError> {
        let args = Cli::parse();
        let db = Database::open(args.db.as_deref())?;

        match args.command {
            Command::Sync {
                threads,
                batch,
                staleness,
                force,
            } => Self::run_sync(config, &db, threads, batch, staleness, force),
            Command::Trends {
                min,
                all,
                format,
                limit,
            } => {
                let trends = Analytics::price_trends(&db, min, all, format.as_deref(), limit)?;
                Reports::report_trends(&trends)
            }
            Command::Demand {
                wants,
                sell,
                format,
                limit,
            } => {
                if sell {
                    let candidates =
                        Analytics::sell_candidates(&db, wants, format.as_deref(), limit)?;
                    Reports::report_sell_candidates(&candidates)
                } else {
                    let entries = Analytics::demand(&db, wants, format.as_deref(), limit)?;
                    Reports::report_demand(&entries)
                }
            }
            Command::List { search, format } => {
                Reports::report_releases(&db, search.as_deref(), format.as_deref())
            }
            Command::History { release_id, days } => {
                Reports::report_history(&db, release_id, days)
            }
            Command::Value { formats, top } => {
                let summary = Analytics::collection_value(&db, top, None)?;
                Reports::report_value(&db, &summary, formats)
            }
            Command::Migrate { rollback } => Self::run_migrate(&db, rollback),
        }
    }

    fn run_sync(
        config: &Config,
        db: &Database,
        threads: Option<usize>,
        batch: Option<usize>,
        staleness: Option<i64>,
        force: bool,
    ) -> Result<(), WaxPulseError> {
        if !config.remote.is_configured() {
            return Err(WaxPulseError::Config(
                "Discogs username and token are not configured; \
                 set them in config.toml or via WAXPULSE_REMOTE__USERNAME / \
                 WAXPULSE_REMOTE__TOKEN"
                    .to_string(),
            ));
        }

        let remote = Arc::new(RemoteClient::new(&config.remote)?);
        let settings = SyncSettings::from_config(&config.sync, threads, batch, staleness, force);
        info!(
            "Starting sync: {} worker(s), batch size {}, staleness {}h",
            settings.workers, settings.batch_size, settings.staleness_hours
        );

        let summary = SyncOrchestrator::new(db, remote, settings).run()?;

        println!(
            "Synced {} folder(s), {} collected release(s), {} want(s)",
            summary.folders, summary.collected, summary.wants
        );
        println!(
            "Prices: {} refreshed, {} fresh (skipped), {} unlisted, {} failed",
            summary.refreshed, summary.skipped, summary.no_listings, summary.failed
        );
        for error in &summary.errors {
            eprintln!("  {}", error);
        }
        Ok(())
    }

    fn run_migrate(db: &Database, rollback: Option<i64>) -> Result<(), WaxPulseError> {
        let migrator = Migrator::new(db.conn());

        if let Some(target) = rollback {
            let reverted = migrator.rollback(target)?;
            println!("Rolled back {} migration(s) to version {}", reverted, target);
        }

        // Opening the database already applied anything pending
        let statuses = migrator.status()?;
        Reports::report_migrations(&statuses)
    }
}
