use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::model::{Shape, VmRec, VmState};
use crate::monitor::{MonitorClient, MonitorError};
use crate::overlay::{OverlayError, OverlayHarvester};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("vm {0} not found")]
    NotFound(String),
    #[error("failed to spawn emulator: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

/// Everything needed to boot a VM on this host: the emulator binary, its
/// kernel, and the golden root image warm instances are forked from.
pub struct EmulatorConfig {
    pub qemu_binary: PathBuf,
    pub qemu_img_binary: PathBuf,
    pub kernel: PathBuf,
    pub root_image: PathBuf,
    pub runtime_dir: PathBuf,
}

/// Owns the table of VMs this host is running and supervises their emulator
/// processes. One instance per hostd.
pub struct EmulatorSupervisor {
    config: EmulatorConfig,
    overlays: OverlayHarvester,
    vms: Mutex<HashMap<String, Arc<Mutex<VmRec>>>>,
}

impl EmulatorSupervisor {
    pub fn new(config: EmulatorConfig) -> Self {
        let overlays = OverlayHarvester::new(config.qemu_img_binary.clone(), config.runtime_dir.clone());
        Self {
            config,
            overlays,
            vms: Mutex::new(HashMap::new()),
        }
    }

    fn socket_path(&self, vm_id: &str) -> PathBuf {
        self.config.runtime_dir.join(format!("{vm_id}.monitor.sock"))
    }

    fn log_path(&self, vm_id: &str) -> PathBuf {
        self.config.runtime_dir.join(format!("{vm_id}.log"))
    }

    /// Boots a new, paused VM of `shape`. When `snapshot` is present its
    /// `"root"` entry is used as the overlay's backing file (a fork); when
    /// absent, a fresh overlay backed by the configured golden image is used.
    #[instrument(skip(self, snapshot))]
    pub async fn spawn_warm(
        &self,
        shape: Shape,
        gpu_bdf: String,
        snapshot: Option<HashMap<String, String>>,
    ) -> Result<String, SupervisorError> {
        let vm_id = common::ids::random_hex(8);
        let socket_path = self.socket_path(&vm_id);
        let log_path = self.log_path(&vm_id);

        let disk_path = match snapshot.and_then(|mut m| m.remove("root")) {
            Some(backing) => {
                let child_path = self.config.runtime_dir.join(format!("{vm_id}.qcow2"));
                self.overlays
                    .create_child_overlay(std::path::Path::new(&backing), &child_path)
                    .await?;
                child_path
            }
            None => {
                self.overlays
                    .create_base_overlay(&vm_id, &self.config.root_image)
                    .await?
            }
        };

        let log_file = std::fs::File::create(&log_path)?;

        let mut cmd = Command::new(&self.config.qemu_binary);
        cmd.arg("-m")
            .arg(format!("{}G", shape.ram_gb))
            .arg("-smp")
            .arg(shape.vcpu.to_string())
            .arg("-kernel")
            .arg(&self.config.kernel)
            .arg("-drive")
            .arg(format!("file={},if=virtio", disk_path.display()))
            .arg("-qmp")
            .arg(format!("unix:{},server,nowait", socket_path.display()))
            .arg("-display")
            .arg("none")
            .arg("-S")
            .stdout(log_file.try_clone()?)
            .stderr(log_file)
            .kill_on_drop(true);

        if gpu_bdf != "0000:00:00.0" {
            cmd.arg("-device").arg(format!("vfio-pci,host={gpu_bdf}"));
        }

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("emulator exited immediately"))?;

        MonitorClient::wait_ready(&socket_path).await?;

        let rec = VmRec {
            id: vm_id.clone(),
            pid,
            socket_path,
            disk_path,
            log_path,
            shape,
            gpu_bdf,
            state: VmState::PausedWarm,
            child,
        };

        self.vms
            .lock()
            .await
            .insert(vm_id.clone(), Arc::new(Mutex::new(rec)));
        info!(vm_id = %vm_id, pid, "spawned warm vm");
        Ok(vm_id)
    }

    pub async fn get_overlays(&self, vm_id: &str) -> Result<HashMap<String, String>, SupervisorError> {
        let rec = self.get(vm_id).await?;
        let rec = rec.lock().await;
        Ok(self.overlays.harvest(&rec).await?)
    }

    pub async fn pause(&self, vm_id: &str) -> Result<(), SupervisorError> {
        let rec = self.get(vm_id).await?;
        let socket_path = rec.lock().await.socket_path.clone();
        MonitorClient::stop(&socket_path).await?;
        rec.lock().await.state = VmState::PausedWarm;
        Ok(())
    }

    pub async fn unpause(&self, vm_id: &str) -> Result<(), SupervisorError> {
        let rec = self.get(vm_id).await?;
        let socket_path = rec.lock().await.socket_path.clone();
        MonitorClient::cont(&socket_path).await?;
        rec.lock().await.state = VmState::Running;
        Ok(())
    }

    /// Sends `quit` and awaits the emulator's own shutdown before removing
    /// it from the table, so a failed quit never orphans a running process
    /// with no VMRec left to clean it up.
    #[instrument(skip(self))]
    pub async fn destroy(&self, vm_id: &str) -> Result<(), SupervisorError> {
        let rec = self.get(vm_id).await?;
        let socket_path = rec.lock().await.socket_path.clone();

        if let Err(e) = MonitorClient::quit(&socket_path).await {
            error!(vm_id, error = %e, "quit failed; leaving vm in table for a retry");
            return Err(e.into());
        }

        let mut table = self.vms.lock().await;
        if let Some(rec) = table.remove(vm_id) {
            let rec = rec.lock().await;
            let _ = std::fs::remove_file(&rec.socket_path);
            let _ = std::fs::remove_file(&rec.disk_path);
            let _ = std::fs::remove_file(&rec.log_path);
        }
        Ok(())
    }

    async fn get(&self, vm_id: &str) -> Result<Arc<Mutex<VmRec>>, SupervisorError> {
        self.vms
            .lock()
            .await
            .get(vm_id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(vm_id.to_string()))
    }
}
