//! Lists the dates the server offers for filtering.

use std::path::Path;

use anyhow::{Context, Result};
use tailview_core::{DateCatalog, config::ConfigOverrides};

use super::{build_client, resolve_config};
use crate::logging::initialize_tracing;

/// Prints the dates offered by the server, one per line.
pub async fn list_dates(config_path: Option<&Path>, server: Option<String>) -> Result<()> {
    let overrides = ConfigOverrides {
        server_url: server,
        ..ConfigOverrides::default()
    };
    let config = resolve_config(config_path, &overrides)?;
    initialize_tracing(&config.logging);

    let url = config.dates_url()?;
    let catalog = DateCatalog::fetch(&build_client()?, url.clone(), config.auth_token.as_deref())
        .await
        .with_context(|| format!("failed to fetch dates from {url}"))?;

    if catalog.is_empty() {
        eprintln!("No dates available.");
    }
    for date in catalog.dates() {
        println!("{date}");
    }
    Ok(())
}
