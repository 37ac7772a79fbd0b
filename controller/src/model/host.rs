use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Inventory {
    pub cpus: u32,
    pub mem_bytes: u64,
    pub gpus_bdf: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostInfo {
    pub name: String,
    pub address: String,
    pub inventory: Inventory,
}
