//! The `garmin-sync` run: open the store, resume or start a Garmin session,
//! sync the window and cache the session for next time

use tracing::warn;

use crate::client::{GarminConnect, SessionTokens};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::storage::SqliteStore;
use crate::sync::{SyncOrchestrator, SyncStats};

/// Run one sync as configured
pub async fn run(config: SyncConfig) -> Result<SyncStats> {
    config.validate()?;

    println!("Using database: {}", config.database.display());
    let store = SqliteStore::open(&config.database)?;
    store.ensure_connection(&config.user_id, &config.email)?;

    let cached = if config.fresh_login {
        None
    } else {
        cached_tokens(&store, &config)
    };

    let client =
        GarminConnect::new(&config.domain, &config.email, &config.password)?.with_tokens(cached);
    let mut orchestrator = SyncOrchestrator::new(client, &store);

    let result = orchestrator
        .run(&config.user_id, config.days_back, config.today)
        .await;

    if let Some(tokens) = orchestrator.source().tokens() {
        if let Err(e) = store.save_tokens(&config.user_id, tokens) {
            warn!(error = %e, "failed to cache Garmin tokens");
        }
    }

    let stats = result?;
    match store.count_metrics(&config.user_id) {
        Ok(total) => println!("{} metrics stored for {}", total, config.user_id),
        Err(e) => warn!(error = %e, "failed to count stored metrics"),
    }
    Ok(stats)
}

/// Tokens from a previous run against the same domain, if readable
fn cached_tokens(store: &SqliteStore, config: &SyncConfig) -> Option<SessionTokens> {
    match store.load_tokens(&config.user_id) {
        Ok(tokens) => tokens.filter(|t| t.oauth1.domain == config.domain),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable cached tokens");
            None
        }
    }
}
