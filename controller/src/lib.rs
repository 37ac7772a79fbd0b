pub mod acquire_release;
pub mod configuration;
pub mod errors;
pub mod grpc_client;
pub mod handlers;
pub mod host_table;
pub mod model;
pub mod placement;
pub mod registry;
pub mod startup;
pub mod vm_index;

use std::sync::Arc;

use crate::acquire_release::AcquireRelease;
use crate::host_table::HostTable;
use crate::placement::Placement;
use crate::registry::PoolRegistry;
use crate::vm_index::VmIndex;

/// Shared application state handed to every axum handler via an Extension
/// layer. Everything here is an `Arc` over interior-mutable state, so
/// cloning `App` is cheap and safe to do per-request.
#[derive(Clone)]
pub struct App {
    pub registry: Arc<PoolRegistry>,
    pub hosts: Arc<HostTable>,
    pub placement: Arc<Placement>,
    pub acquire_release: Arc<AcquireRelease>,
}

impl App {
    pub fn new(registry: Arc<PoolRegistry>, hosts: Arc<HostTable>, vm_index: Arc<VmIndex>) -> Self {
        let placement = Arc::new(Placement::new(registry.clone(), hosts.clone(), vm_index.clone()));
        let acquire_release = Arc::new(AcquireRelease::new(registry.clone(), hosts.clone(), vm_index));
        Self { registry, hosts, placement, acquire_release }
    }
}
