use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument};

use crate::model::VmRec;
use crate::monitor::{MonitorClient, MonitorError};

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const FILE_POLL_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("monitor error while pausing/resuming parent: {0}")]
    Monitor(#[from] MonitorError),
    #[error("qemu-img failed: {0}")]
    QemuImg(String),
    #[error("overlay file {0} never appeared")]
    NeverAppeared(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Freezes a running/paused parent's disk into a new qcow2 overlay, without
/// disturbing the parent beyond the pause/resume bracket.
pub struct OverlayHarvester {
    qemu_img_binary: PathBuf,
    runtime_dir: PathBuf,
}

impl OverlayHarvester {
    pub fn new(qemu_img_binary: PathBuf, runtime_dir: PathBuf) -> Self {
        Self { qemu_img_binary, runtime_dir }
    }

    #[instrument(skip(self, parent))]
    pub async fn harvest(&self, parent: &VmRec) -> Result<HashMap<String, String>, OverlayError> {
        MonitorClient::stop(&parent.socket_path).await?;

        let result = self.snapshot_disk(&parent.id, &parent.disk_path).await;

        // Always try to resume the parent, even if the snapshot failed.
        MonitorClient::cont(&parent.socket_path).await?;

        let overlay_path = result?;
        let mut overlays = HashMap::new();
        overlays.insert("root".to_string(), overlay_path.display().to_string());
        Ok(overlays)
    }

    async fn snapshot_disk(&self, vm_id: &str, parent_disk: &Path) -> Result<PathBuf, OverlayError> {
        let overlay_path = self
            .runtime_dir
            .join(format!("{vm_id}.snapshot.qcow2"));

        let output = Command::new(&self.qemu_img_binary)
            .arg("create")
            .arg("-f")
            .arg("qcow2")
            .arg("-F")
            .arg("qcow2")
            .arg("-b")
            .arg(parent_disk)
            .arg(&overlay_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OverlayError::QemuImg(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        self.wait_for_file(&overlay_path).await?;
        debug!(path = %overlay_path.display(), "overlay snapshot ready");
        Ok(overlay_path)
    }

    async fn wait_for_file(&self, path: &Path) -> Result<(), OverlayError> {
        let deadline = Instant::now() + FILE_POLL_DEADLINE;
        loop {
            if tokio::fs::metadata(path).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(OverlayError::NeverAppeared(path.display().to_string()));
            }
            sleep(FILE_POLL_INTERVAL).await;
        }
    }

    /// Creates a fresh overlay backed directly by `base_image`, used when
    /// spawning a warm-pool instance that isn't forked from anything.
    pub async fn create_base_overlay(&self, vm_id: &str, base_image: &Path) -> Result<PathBuf, OverlayError> {
        let overlay_path = self.runtime_dir.join(format!("{vm_id}.qcow2"));
        self.create_child_overlay(base_image, &overlay_path).await?;
        Ok(overlay_path)
    }

    /// Creates a new overlay backed by `backing`, which may itself be an
    /// overlay (a chain), used when forking a VM from a harvested snapshot.
    pub async fn create_child_overlay(&self, backing: &Path, overlay_path: &Path) -> Result<(), OverlayError> {
        let output = Command::new(&self.qemu_img_binary)
            .arg("create")
            .arg("-f")
            .arg("qcow2")
            .arg("-F")
            .arg("qcow2")
            .arg("-b")
            .arg(backing)
            .arg(overlay_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OverlayError::QemuImg(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        self.wait_for_file(overlay_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes a shell script standing in for `qemu-img`: it touches its
    /// last argument (the overlay path qemu-img would otherwise create)
    /// and exits with `status`.
    fn fake_qemu_img(dir: &std::path::Path, status: i32) -> PathBuf {
        let path = dir.join("qemu-img");
        let script = format!("#!/bin/sh\nfor last; do :; done\ntouch \"$last\"\nexit {status}\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn create_child_overlay_waits_for_the_file_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let harvester = OverlayHarvester::new(fake_qemu_img(dir.path(), 0), dir.path().to_path_buf());
        let backing = dir.path().join("parent.qcow2");
        std::fs::write(&backing, b"").unwrap();
        let overlay_path = dir.path().join("child.qcow2");

        harvester.create_child_overlay(&backing, &overlay_path).await.unwrap();
        assert!(overlay_path.exists());
    }

    #[tokio::test]
    async fn create_base_overlay_names_it_after_the_vm_id() {
        let dir = tempfile::tempdir().unwrap();
        let harvester = OverlayHarvester::new(fake_qemu_img(dir.path(), 0), dir.path().to_path_buf());
        let base_image = dir.path().join("root.qcow2");
        std::fs::write(&base_image, b"").unwrap();

        let overlay_path = harvester.create_base_overlay("vm123", &base_image).await.unwrap();
        assert_eq!(overlay_path, dir.path().join("vm123.qcow2"));
        assert!(overlay_path.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_as_qemu_img_error() {
        let dir = tempfile::tempdir().unwrap();
        let harvester = OverlayHarvester::new(fake_qemu_img(dir.path(), 1), dir.path().to_path_buf());
        let backing = dir.path().join("parent.qcow2");
        std::fs::write(&backing, b"").unwrap();
        let overlay_path = dir.path().join("child.qcow2");

        let result = harvester.create_child_overlay(&backing, &overlay_path).await;
        assert!(matches!(result, Err(OverlayError::QemuImg(_))));
    }
}
