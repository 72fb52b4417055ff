//! Inventory listings printed as JSON.

use std::sync::Arc;

use anyhow::{bail, Result};
use ooi_m2m::{Config, HttpTransport, Inventory};

use crate::cli::{create_spinner, Commands};

pub async fn inventory(config: &Config, command: &Commands) -> Result<String> {
    let transport = Arc::new(HttpTransport::authenticated(config)?);
    let inventory = Inventory::new(transport, &config.base_url);

    let bar = create_spinner("Querying inventory...".to_string());
    let listing = match command {
        Commands::Sites {} => inventory.list_sites().await,
        Commands::Nodes { site } => inventory.list_nodes(site).await,
        Commands::Sensors { site, node } => inventory.list_sensors(site, node).await,
        Commands::Methods { site, node, sensor } => {
            inventory.list_methods(site, node, sensor).await
        }
        Commands::Streams {
            site,
            node,
            sensor,
            method,
        } => inventory.list_streams(site, node, sensor, method).await,
        Commands::Metadata { site, node, sensor } => {
            inventory.get_metadata(site, node, sensor).await
        }
        Commands::Files(_) | Commands::Fetch { .. } => {
            bar.finish_and_clear();
            bail!("not an inventory listing")
        }
    };
    bar.finish_and_clear();

    Ok(serde_json::to_string_pretty(&listing?)?)
}
