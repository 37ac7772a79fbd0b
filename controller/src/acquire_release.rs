use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::Error;
use crate::grpc_client::ExecOutcome;
use crate::host_table::HostTable;
use crate::model::shape::Shape;
use crate::model::vm::VmState;
use crate::registry::PoolRegistry;
use crate::vm_index::VmIndex;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VmHandle {
    pub vm_id: String,
    pub host: String,
    pub ip: String,
    pub ssh_key_ref: String,
}

/// Implements Acquire, Release, and Exec: the tenant-facing surface that
/// hands out and reclaims already-warm VMs without ever spawning new ones.
pub struct AcquireRelease {
    registry: Arc<PoolRegistry>,
    hosts: Arc<HostTable>,
    vm_index: Arc<VmIndex>,
}

impl AcquireRelease {
    pub fn new(registry: Arc<PoolRegistry>, hosts: Arc<HostTable>, vm_index: Arc<VmIndex>) -> Self {
        Self { registry, hosts, vm_index }
    }

    /// Peeks the warm queue for `shape`'s key, unpauses the VM at its head,
    /// and only dequeues it once the unpause actually succeeds. If unpause
    /// fails, the VM is left queued rather than silently dropped — a
    /// reimplementation that dequeues before confirming unpause can leak a
    /// VM that never becomes reachable.
    pub async fn acquire(&self, shape: &Shape) -> Result<VmHandle, Error> {
        let shape_key = shape.shape_key();
        let Some((pool_id, vm_id)) = self.registry.peek_warm(&shape_key).await else {
            return Err(Error::ResourceExhausted);
        };

        let vm = self
            .vm_index
            .get(&vm_id)
            .await
            .ok_or_else(|| Error::Internal(format!("warm queue referenced unknown vm {vm_id}")))?;
        let host = self.hosts.get(&vm.host).await.ok_or(Error::NotFound)?;

        host.client.unpause(&vm_id).await?;

        self.registry.commit_dequeue(&pool_id, &shape_key, &vm_id).await;
        self.vm_index.set_state(&vm_id, VmState::Running).await;

        Ok(VmHandle {
            vm_id,
            host: vm.host,
            ip: vm.ip.unwrap_or_default(),
            ssh_key_ref: "devbox-default".to_string(),
        })
    }

    /// Recycles a VM back to its pool's warm queue (pause, requeue) or
    /// tears it down entirely, depending on `recycle`.
    pub async fn release(&self, vm_id: &str, recycle: bool) -> Result<(), Error> {
        let vm = self.vm_index.get(vm_id).await.ok_or(Error::NotFound)?;
        let host = self.hosts.get(&vm.host).await.ok_or(Error::NotFound)?;

        if recycle {
            host.client.pause(vm_id).await?;
            self.vm_index.set_state(vm_id, VmState::PausedWarm).await;
            let shape_key = vm.shape.shape_key();
            self.registry.requeue_warm(&vm.pool_id, &shape_key, vm_id.to_string()).await?;
        } else {
            host.client.destroy(vm_id).await?;
            self.vm_index.remove(vm_id).await;
        }

        Ok(())
    }

    pub async fn exec(&self, vm_id: &str, argv: Vec<String>, timeout_sec: u32) -> Result<ExecOutcome, Error> {
        let vm = self.vm_index.get(vm_id).await.ok_or(Error::NotFound)?;
        let host = self.hosts.get(&vm.host).await.ok_or(Error::NotFound)?;
        Ok(host.client.exec(vm_id, argv, timeout_sec).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pool::PoolSpec;

    fn acquire_release() -> (AcquireRelease, Arc<PoolRegistry>, Arc<HostTable>, Arc<VmIndex>) {
        let registry = Arc::new(PoolRegistry::new());
        let hosts = Arc::new(HostTable::new());
        let vm_index = Arc::new(VmIndex::new());
        let ar = AcquireRelease::new(registry.clone(), hosts.clone(), vm_index.clone());
        (ar, registry, hosts, vm_index)
    }

    #[tokio::test]
    async fn acquire_on_empty_warm_queue_is_resource_exhausted() {
        let (ar, _registry, _hosts, _vm_index) = acquire_release();
        let shape = Shape { vcpu: 2, ram_gb: 1, gpu_model: String::new() };
        let result = ar.acquire(&shape).await;
        assert!(matches!(result, Err(Error::ResourceExhausted)));
    }

    #[tokio::test]
    async fn release_of_unknown_vm_is_not_found() {
        let (ar, _registry, _hosts, _vm_index) = acquire_release();
        let result = ar.release("no-such-vm", true).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn exec_on_unknown_vm_is_not_found() {
        let (ar, _registry, _hosts, _vm_index) = acquire_release();
        let result = ar.exec("no-such-vm", vec!["true".into()], 1).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn acquire_ignores_other_pools_non_matching_shapes() {
        let (ar, registry, _hosts, _vm_index) = acquire_release();
        let pool = registry.create_pool(PoolSpec { name: None, tenant_id: None }).await;
        registry.admit_and_warm(&pool.id, "4c-8g-", "vm1".into()).await.unwrap();

        let shape = Shape { vcpu: 2, ram_gb: 1, gpu_model: String::new() };
        let result = ar.acquire(&shape).await;
        assert!(matches!(result, Err(Error::ResourceExhausted)));
    }
}
