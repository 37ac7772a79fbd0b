use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{error, info};

use crate::exec;
use crate::model::Shape as HostShape;
use crate::monitor::MonitorError;
use crate::overlay::OverlayError;
use crate::rpc::hostd::{
    Empty, ExecRequest, ExecResponse, InventoryResponse, OverlaysResponse, SpawnWarmRequest,
    SpawnWarmResponse, VmId, host_service_server::HostService as HostServiceTrait,
};
use crate::supervisor::{EmulatorSupervisor, SupervisorError};

pub struct HostServiceImpl {
    supervisor: Arc<EmulatorSupervisor>,
    hostname: String,
    gpus_bdf: Vec<String>,
}

impl HostServiceImpl {
    pub fn new(supervisor: Arc<EmulatorSupervisor>, hostname: String, gpus_bdf: Vec<String>) -> Self {
        Self { supervisor, hostname, gpus_bdf }
    }
}

#[tonic::async_trait]
impl HostServiceTrait for HostServiceImpl {
    async fn report_inventory(&self, _request: Request<Empty>) -> Result<Response<InventoryResponse>, Status> {
        let mem_bytes = read_mem_total_bytes().unwrap_or(0);

        Ok(Response::new(InventoryResponse {
            host: self.hostname.clone(),
            cpus: num_cpus::get() as u32,
            mem_bytes,
            gpus_bdf: self.gpus_bdf.clone(),
        }))
    }

    async fn spawn_warm(&self, request: Request<SpawnWarmRequest>) -> Result<Response<SpawnWarmResponse>, Status> {
        let req = request.into_inner();
        let proto_shape = req
            .shape
            .ok_or_else(|| Status::invalid_argument("missing shape"))?;
        let shape = HostShape {
            vcpu: proto_shape.vcpu,
            ram_gb: proto_shape.ram_gb,
            gpu_model: proto_shape.gpu_model,
        };
        let snapshot = if req.snapshot.is_empty() { None } else { Some(req.snapshot) };

        match self.supervisor.spawn_warm(shape, req.gpu_bdf, snapshot).await {
            Ok(vm_id) => Ok(Response::new(SpawnWarmResponse { vm_id })),
            Err(e) => {
                error!(error = %e, "spawn_warm failed");
                Err(map_supervisor_error(e))
            }
        }
    }

    async fn get_overlays(&self, request: Request<VmId>) -> Result<Response<OverlaysResponse>, Status> {
        let vm_id = request.into_inner().id;
        match self.supervisor.get_overlays(&vm_id).await {
            Ok(overlays) => Ok(Response::new(OverlaysResponse { overlays })),
            Err(e) => Err(map_supervisor_error(e)),
        }
    }

    async fn pause(&self, request: Request<VmId>) -> Result<Response<Empty>, Status> {
        let vm_id = request.into_inner().id;
        self.supervisor.pause(&vm_id).await.map_err(map_supervisor_error)?;
        Ok(Response::new(Empty {}))
    }

    async fn unpause(&self, request: Request<VmId>) -> Result<Response<Empty>, Status> {
        let vm_id = request.into_inner().id;
        self.supervisor.unpause(&vm_id).await.map_err(map_supervisor_error)?;
        Ok(Response::new(Empty {}))
    }

    async fn destroy(&self, request: Request<VmId>) -> Result<Response<Empty>, Status> {
        let vm_id = request.into_inner().id;
        info!(vm_id = %vm_id, "destroying vm");
        self.supervisor.destroy(&vm_id).await.map_err(map_supervisor_error)?;
        Ok(Response::new(Empty {}))
    }

    async fn exec(&self, request: Request<ExecRequest>) -> Result<Response<ExecResponse>, Status> {
        let req = request.into_inner();
        match exec::exec(req.argv, req.timeout_sec).await {
            Ok(outcome) => Ok(Response::new(ExecResponse {
                exit_code: outcome.exit_code,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            })),
            Err(e) => Err(Status::internal(e.to_string())),
        }
    }
}

/// `MonitorError::NotReady` is the 5 s monitor-connect deadline of §4.5
/// expiring, not an internal fault — it maps to `DEADLINE_EXCEEDED` so it
/// round-trips to the controller as a 504 instead of a 500.
fn map_monitor_error(e: MonitorError) -> Status {
    match e {
        MonitorError::NotReady(socket) => {
            Status::deadline_exceeded(format!("monitor socket {socket} did not come up in time"))
        }
        other => Status::internal(format!("monitor error: {other}")),
    }
}

fn map_supervisor_error(e: SupervisorError) -> Status {
    match e {
        SupervisorError::NotFound(id) => Status::not_found(format!("vm {id} not found")),
        SupervisorError::Spawn(e) => Status::internal(format!("spawn failed: {e}")),
        SupervisorError::Overlay(OverlayError::Monitor(e)) => map_monitor_error(e),
        SupervisorError::Overlay(e) => Status::internal(format!("overlay error: {e}")),
        SupervisorError::Monitor(e) => map_monitor_error(e),
    }
}

fn read_mem_total_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = contents.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
