//! # tutorlink-migrate
//!
//! Brings a marketplace database up to the current schema and checks the
//! rule catalogue against it.
//!
//! Configuration comes from the `TUTORLINK_*` environment variables (see
//! [`CoreConfig::from_env`]); log verbosity from `RUST_LOG`.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tutorlink_core::{CoreConfig, Marketplace};
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::constants::APP_NAME;
use tutorlink_shared::rules::Rule;
use tutorlink_store::migrations::CURRENT_VERSION;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tutorlink_core=debug,tutorlink_store=info")
        }))
        .init();

    info!("{APP_NAME} migrate v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::from_env();
    info!(?config, "loaded configuration");

    // Opening runs any pending migrations and compiles the rule catalogue.
    let market = Marketplace::open(config).context("failed to open marketplace")?;

    let version: u32 = market
        .database()
        .conn()
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;
    info!(
        path = ?market.database().path(),
        schema_version = version,
        "database ready"
    );
    if version != CURRENT_VERSION {
        warn!(
            found = version,
            expected = CURRENT_VERSION,
            "schema version differs from this build"
        );
    }

    for collection in Collection::ALL {
        let summary: Vec<String> = Action::ALL
            .into_iter()
            .map(|action| {
                let state = match market.access().rule(collection, action) {
                    Rule::Locked => "locked",
                    Rule::Open => "open",
                    Rule::Expr(_) => "expr",
                };
                format!("{action}={state}")
            })
            .collect();
        info!(collection = collection.name(), rules = %summary.join(" "), "access rules");
    }

    Ok(())
}
