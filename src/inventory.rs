//! Browsing the sensor inventory: sites, nodes, sensors, methods and streams.
//!
//! Each call is a single authenticated GET below the inventory root.

use std::sync::Arc;

use serde_json::Value;

use crate::{error::Result, transport::Transport};

pub struct Inventory {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl Inventory {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Self {
        Inventory {
            transport,
            base_url: base_url.to_string(),
        }
    }

    pub async fn list_sites(&self) -> Result<Value> {
        self.get("").await
    }

    pub async fn list_nodes(&self, site: &str) -> Result<Value> {
        self.get(&format!("{}/", site)).await
    }

    pub async fn list_sensors(&self, site: &str, node: &str) -> Result<Value> {
        self.get(&format!("{}/{}/", site, node)).await
    }

    pub async fn list_methods(&self, site: &str, node: &str, sensor: &str) -> Result<Value> {
        self.get(&format!("{}/{}/{}/", site, node, sensor)).await
    }

    pub async fn list_streams(
        &self,
        site: &str,
        node: &str,
        sensor: &str,
        method: &str,
    ) -> Result<Value> {
        self.get(&format!("{}/{}/{}/{}/", site, node, sensor, method))
            .await
    }

    pub async fn get_metadata(&self, site: &str, node: &str, sensor: &str) -> Result<Value> {
        self.get(&format!("{}/{}/{}/metadata", site, node, sensor))
            .await
    }

    async fn get(&self, endpoint: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.transport.get_json(&url, &[]).await
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::DEFAULT_BASE_URL, transport::fake::FakeTransport};

    #[tokio::test]
    async fn should_build_inventory_urls() {
        let fake = Arc::new(
            FakeTransport::new()
                .with_json(DEFAULT_BASE_URL, json!(["CE01ISSM", "CE02SHSM"]))
                .with_json(&format!("{}CE02SHSM/RID27/", DEFAULT_BASE_URL), json!(["03-CTDBPC000"]))
                .with_json(
                    &format!("{}CE02SHSM/RID27/03-CTDBPC000/metadata", DEFAULT_BASE_URL),
                    json!({ "parameters": [] }),
                ),
        );
        let inventory = Inventory::new(fake.clone(), DEFAULT_BASE_URL);

        assert_eq!(inventory.list_sites().await.unwrap(), json!(["CE01ISSM", "CE02SHSM"]));
        assert_eq!(
            inventory.list_sensors("CE02SHSM", "RID27").await.unwrap(),
            json!(["03-CTDBPC000"])
        );
        assert!(inventory
            .get_metadata("CE02SHSM", "RID27", "03-CTDBPC000")
            .await
            .is_ok());
        assert!(inventory.list_nodes("NOPE").await.is_err());
        assert_eq!(fake.calls().len(), 4);
    }
}
