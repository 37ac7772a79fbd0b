use std::sync::Arc;

use axum::{Router, routing::IntoMakeService, serve::Serve};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::configuration::HostsSettings;
use crate::host_table::HostTable;
use crate::registry::PoolRegistry;
use crate::vm_index::VmIndex;
use crate::{App, handlers::app};

/// Connects to every configured host daemon and pulls its inventory. A host
/// that can't be reached at startup is logged and skipped rather than
/// failing the whole controller — it can still be reached once it comes up,
/// the controller just won't place VMs on it in the meantime.
async fn bootstrap_hosts(hosts: &HostTable, settings: &HostsSettings) {
    for address in &settings.addresses {
        match hosts.bootstrap(address).await {
            Ok(name) => info!(address, host = %name, "registered host daemon"),
            Err(e) => warn!(address, error = %e, "failed to bootstrap host daemon, skipping"),
        }
    }
}

pub async fn run(
    listener: TcpListener,
    hosts_settings: HostsSettings,
) -> Result<Serve<IntoMakeService<Router>, Router>, Box<dyn std::error::Error + Send>> {
    let hosts = Arc::new(HostTable::new());
    bootstrap_hosts(&hosts, &hosts_settings).await;

    let registry = Arc::new(PoolRegistry::new());
    let vm_index = Arc::new(VmIndex::new());
    let app_state = App::new(registry, hosts, vm_index);

    let router = app(app_state);
    let server = axum::serve(listener, router.into_make_service());
    Ok(server)
}
