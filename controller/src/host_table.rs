use std::sync::Arc;

use tokio::sync::RwLock;

use crate::errors::Error;
use crate::grpc_client::NodeClient;
use crate::model::host::{HostInfo, Inventory};

pub struct HostEntry {
    pub name: String,
    pub address: String,
    pub inventory: Inventory,
    pub client: NodeClient,
}

/// Registry of host daemons the controller can place VMs on. Hosts are
/// registered once at startup (by bootstrapping their inventory) and kept
/// in registration order, which is what EnsureWarm and Fork iterate over
/// when spreading spawns across hosts.
#[derive(Default)]
pub struct HostTable {
    hosts: RwLock<Vec<Arc<HostEntry>>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to the host daemon at `address`, pulls its inventory, and
    /// registers it. Returns the registered entry's name.
    pub async fn bootstrap(&self, address: &str) -> Result<String, Error> {
        let client = NodeClient::from_address(address);
        let inv = client.report_inventory().await?;

        let entry = Arc::new(HostEntry {
            name: inv.host.clone(),
            address: address.to_string(),
            inventory: Inventory {
                cpus: inv.cpus,
                mem_bytes: inv.mem_bytes,
                gpus_bdf: inv.gpus_bdf,
            },
            client,
        });

        let name = entry.name.clone();
        self.hosts.write().await.push(entry);
        Ok(name)
    }

    pub async fn snapshot(&self) -> Vec<Arc<HostEntry>> {
        self.hosts.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<HostEntry>> {
        self.hosts.read().await.iter().find(|h| h.name == name).cloned()
    }

    pub async fn list(&self) -> Vec<HostInfo> {
        self.hosts
            .read()
            .await
            .iter()
            .map(|h| HostInfo {
                name: h.name.clone(),
                address: h.address.clone(),
                inventory: h.inventory.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> Arc<HostEntry> {
        Arc::new(HostEntry {
            name: name.to_string(),
            address: format!("{name}:50052"),
            inventory: Inventory { cpus: 8, mem_bytes: 1 << 34, gpus_bdf: vec![] },
            client: NodeClient::from_address(&format!("{name}:50052")),
        })
    }

    #[tokio::test]
    async fn snapshot_preserves_registration_order() {
        let table = HostTable::new();
        table.hosts.write().await.push(entry("h1"));
        table.hosts.write().await.push(entry("h2"));

        let names: Vec<_> = table.snapshot().await.iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn get_finds_by_name_and_misses_unknown() {
        let table = HostTable::new();
        table.hosts.write().await.push(entry("h1"));

        assert!(table.get("h1").await.is_some());
        assert!(table.get("missing").await.is_none());
    }
}
