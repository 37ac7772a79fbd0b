use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// CPU/memory/GPU footprint a VM is booted with. Host-side mirror of the
/// shape the controller tracks; the two never need to agree on a wire
/// format because the shape travels through `SpawnWarmRequest` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    pub vcpu: u32,
    pub ram_gb: u32,
    pub gpu_model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    PausedWarm,
    Running,
    Destroyed,
}

/// A live emulator process this host is supervising.
pub struct VmRec {
    pub id: String,
    pub pid: u32,
    pub socket_path: PathBuf,
    pub disk_path: PathBuf,
    pub log_path: PathBuf,
    pub shape: Shape,
    pub gpu_bdf: String,
    pub state: VmState,
    pub child: tokio::process::Child,
}
