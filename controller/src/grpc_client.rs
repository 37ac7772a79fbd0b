// gRPC client for talking to a host daemon.

use std::collections::HashMap;

use thiserror::Error;
use tonic::transport::Channel;
use tracing::{debug, instrument};

use crate::model::shape::Shape;

pub mod hostd {
    tonic::include_proto!("hostd");
}

use hostd::{
    Empty, ExecRequest, Shape as ProtoShape, SpawnWarmRequest, VmId,
    host_service_client::HostServiceClient,
};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to connect to host daemon: {0}")]
    Connect(#[source] tonic::transport::Error),
    #[error("host daemon rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
}

#[derive(Debug, Clone)]
pub struct Inventory {
    pub host: String,
    pub cpus: u32,
    pub mem_bytes: u64,
    pub gpus_bdf: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Client for a single host daemon, addressed by `host:port`. Stateless:
/// every call opens a fresh channel, matching how cheap a local gRPC
/// connection is relative to the operations it guards (process spawn,
/// disk snapshot).
#[derive(Clone)]
pub struct NodeClient {
    address: String,
}

impl NodeClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self { address: format!("http://{host}:{port}") }
    }

    pub fn from_address(address: &str) -> Self {
        Self { address: format!("http://{address}") }
    }

    async fn connect(&self) -> Result<HostServiceClient<Channel>, NodeError> {
        HostServiceClient::connect(self.address.clone())
            .await
            .map_err(NodeError::Connect)
    }

    #[instrument(skip(self))]
    pub async fn report_inventory(&self) -> Result<Inventory, NodeError> {
        let mut client = self.connect().await?;
        let resp = client.report_inventory(Empty {}).await?.into_inner();
        Ok(Inventory {
            host: resp.host,
            cpus: resp.cpus,
            mem_bytes: resp.mem_bytes,
            gpus_bdf: resp.gpus_bdf,
        })
    }

    #[instrument(skip(self, snapshot))]
    pub async fn spawn_warm(
        &self,
        shape: Shape,
        gpu_bdf: String,
        snapshot: Option<HashMap<String, String>>,
    ) -> Result<String, NodeError> {
        let mut client = self.connect().await?;
        let request = SpawnWarmRequest {
            shape: Some(ProtoShape {
                vcpu: shape.vcpu,
                ram_gb: shape.ram_gb,
                gpu_model: shape.gpu_model,
            }),
            gpu_bdf,
            snapshot: snapshot.unwrap_or_default(),
        };
        let resp = client.spawn_warm(request).await?.into_inner();
        debug!(vm_id = %resp.vm_id, "spawned warm vm");
        Ok(resp.vm_id)
    }

    #[instrument(skip(self))]
    pub async fn get_overlays(&self, vm_id: &str) -> Result<HashMap<String, String>, NodeError> {
        let mut client = self.connect().await?;
        let resp = client
            .get_overlays(VmId { id: vm_id.to_string() })
            .await?
            .into_inner();
        Ok(resp.overlays)
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, vm_id: &str) -> Result<(), NodeError> {
        let mut client = self.connect().await?;
        client.pause(VmId { id: vm_id.to_string() }).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unpause(&self, vm_id: &str) -> Result<(), NodeError> {
        let mut client = self.connect().await?;
        client.unpause(VmId { id: vm_id.to_string() }).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn destroy(&self, vm_id: &str) -> Result<(), NodeError> {
        let mut client = self.connect().await?;
        client.destroy(VmId { id: vm_id.to_string() }).await?;
        Ok(())
    }

    #[instrument(skip(self, argv))]
    pub async fn exec(&self, vm_id: &str, argv: Vec<String>, timeout_sec: u32) -> Result<ExecOutcome, NodeError> {
        let mut client = self.connect().await?;
        let resp = client
            .exec(ExecRequest { vm_id: vm_id.to_string(), argv, timeout_sec })
            .await?
            .into_inner();
        Ok(ExecOutcome {
            exit_code: resp.exit_code,
            stdout: resp.stdout,
            stderr: resp.stderr,
        })
    }
}
