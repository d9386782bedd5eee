use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use garmin_sync::cli::commands;
use garmin_sync::config::{self, SyncConfig, DEFAULT_DAYS_BACK};
use garmin_sync::storage::default_database_path;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "garmin-sync")]
#[command(author, version, about = "Sync Garmin Connect health metrics into a local database", long_about = None)]
struct Cli {
    /// Owner id written on every stored metric
    user_id: String,

    /// Garmin Connect account email
    email: String,

    /// Garmin Connect account password
    password: String,

    /// Number of days to sync, counting today
    #[arg(default_value_t = DEFAULT_DAYS_BACK)]
    days_back: u32,

    /// SQLite database file
    #[arg(long, env = "GARMIN_SYNC_DATABASE")]
    database: Option<PathBuf>,

    /// Garmin domain (garmin.com, garmin.cn)
    #[arg(long, env = "GARMIN_DOMAIN", default_value = "garmin.com")]
    domain: String,

    /// Reference date (YYYY-MM-DD), defaults to the current UTC date
    #[arg(long, value_parser = config::parse_date)]
    today: Option<NaiveDate>,

    /// Ignore cached tokens and log in with the password
    #[arg(long)]
    fresh_login: bool,
}

#[tokio::main]
async fn main() -> garmin_sync::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("garmin_sync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = SyncConfig {
        user_id: cli.user_id,
        email: cli.email,
        password: cli.password,
        days_back: cli.days_back,
        database: cli.database.unwrap_or_else(default_database_path),
        domain: cli.domain,
        today: cli.today.unwrap_or_else(|| Utc::now().date_naive()),
        fresh_login: cli.fresh_login,
    };

    if let Err(e) = commands::sync_run(config).await {
        eprintln!("Error: {}", garmin_sync::error::format_user_error(&e));
        std::process::exit(1);
    }

    Ok(())
}
