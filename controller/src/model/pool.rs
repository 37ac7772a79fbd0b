use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PoolSpec {
    pub name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoolSummary {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub hosts: Vec<String>,
}

/// Mutable membership state for a pool: `guests` is an insertion-ordered
/// log of every VM ever admitted (not a live set — entries are never
/// removed on release), and `warm` holds the FIFO of paused instances
/// ready to be acquired, keyed by shape.
#[derive(Debug, Default)]
pub struct PoolState {
    pub guests: Vec<String>,
    pub warm: HashMap<String, VecDeque<String>>,
}

pub struct Pool {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub state: Mutex<PoolState>,
}

impl Pool {
    pub fn new(id: String, name: String, tenant_id: String) -> Self {
        Self { id, name, tenant_id, state: Mutex::new(PoolState::default()) }
    }

    pub async fn summary(&self) -> PoolSummary {
        let state = self.state.lock().await;
        PoolSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            tenant_id: self.tenant_id.clone(),
            hosts: state.guests.clone(),
        }
    }
}
