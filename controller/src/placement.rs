use std::sync::Arc;

use tracing::error;

use crate::errors::Error;
use crate::host_table::{HostEntry, HostTable};
use crate::model::shape::Shape;
use crate::model::vm::{Vm, VmState};
use crate::registry::PoolRegistry;
use crate::vm_index::VmIndex;

/// GPUs are assigned round-robin across a host's advertised BDFs. Hosts
/// with no GPUs report an empty list, and every VM placed on them gets the
/// sentinel BDF rather than an error.
const NO_GPU_SENTINEL: &str = "0000:00:00.0";

fn pick_gpu_bdf(host: &HostEntry, i: usize) -> String {
    if host.inventory.gpus_bdf.is_empty() {
        NO_GPU_SENTINEL.to_string()
    } else {
        host.inventory.gpus_bdf[i % host.inventory.gpus_bdf.len()].clone()
    }
}

/// Implements EnsureWarm and Fork: the two operations that create new VMs
/// and admit them into a pool's warm queue.
pub struct Placement {
    registry: Arc<PoolRegistry>,
    hosts: Arc<HostTable>,
    vm_index: Arc<VmIndex>,
}

impl Placement {
    pub fn new(registry: Arc<PoolRegistry>, hosts: Arc<HostTable>, vm_index: Arc<VmIndex>) -> Self {
        Self { registry, hosts, vm_index }
    }

    /// Tops up `pool_id`'s warm queue for `shape` to `target` instances.
    /// Iterates every registered host once; within a host, spawns enough
    /// instances to close the remaining gap. A spawn failure is logged and
    /// skipped rather than aborting the whole operation — a partial top-up
    /// is better than none. Returns the warm count actually reached.
    ///
    /// Hosts are always iterated (even once `cur >= target`), but the
    /// per-host spawn loop runs zero iterations in that case, so no RPCs
    /// fire once the target is already met.
    pub async fn ensure_warm(&self, pool_id: &str, shape: &Shape, target: i64) -> Result<i64, Error> {
        let pool = self.registry.get(pool_id).await?;
        let shape_key = shape.shape_key();

        let mut cur: i64 = {
            let state = pool.state.lock().await;
            state.warm.get(&shape_key).map(|q| q.len() as i64).unwrap_or(0)
        };

        let hosts = self.hosts.snapshot().await;
        for host in &hosts {
            let need = (target - cur).max(0);
            for i in 0..need {
                let gpu_bdf = pick_gpu_bdf(host, i as usize);
                match host.client.spawn_warm(shape.clone(), gpu_bdf.clone(), None).await {
                    Ok(vm_id) => {
                        self.admit(pool_id, &shape_key, &vm_id, host, shape, gpu_bdf).await;
                        cur += 1;
                    }
                    Err(e) => {
                        error!(host = %host.name, error = %e, "spawn_warm failed during ensure_warm");
                    }
                }
            }
            if cur >= target {
                break;
            }
        }

        Ok(cur)
    }

    /// Forks `how_many` children off `vm_id`'s current disk state onto the
    /// same host the parent lives on. Harvests one overlay snapshot from
    /// the parent and backs every child off it. Partial failure (some
    /// children spawn, some don't) is non-fatal; failed spawns are logged
    /// and simply absent from the returned list.
    pub async fn fork(&self, vm_id: &str, how_many: u32) -> Result<Vec<String>, Error> {
        let parent = self.vm_index.get(vm_id).await.ok_or(Error::NotFound)?;
        let host = self.hosts.get(&parent.host).await.ok_or(Error::NotFound)?;
        let shape_key = parent.shape.shape_key();

        let overlays = host.client.get_overlays(vm_id).await?;

        let mut children = Vec::new();
        for i in 0..how_many {
            let gpu_bdf = pick_gpu_bdf(&host, i as usize);
            match host
                .client
                .spawn_warm(parent.shape.clone(), gpu_bdf.clone(), Some(overlays.clone()))
                .await
            {
                Ok(child_id) => {
                    self.admit(&parent.pool_id, &shape_key, &child_id, &host, &parent.shape, gpu_bdf).await;
                    children.push(child_id);
                }
                Err(e) => {
                    error!(host = %host.name, error = %e, "spawn_warm failed during fork");
                }
            }
        }

        Ok(children)
    }

    async fn admit(
        &self,
        pool_id: &str,
        shape_key: &str,
        vm_id: &str,
        host: &HostEntry,
        shape: &Shape,
        gpu_bdf: String,
    ) {
        let vm = Vm {
            id: vm_id.to_string(),
            host: host.name.clone(),
            shape: shape.clone(),
            gpu_bdf,
            ip: None,
            pool_id: pool_id.to_string(),
            state: VmState::PausedWarm,
        };
        self.vm_index.insert(vm).await;
        if let Err(e) = self.registry.admit_and_warm(pool_id, shape_key, vm_id.to_string()).await {
            error!(pool_id, vm_id, error = %e, "failed to admit newly spawned vm into pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::host::Inventory;

    fn host_with_gpus(gpus: Vec<&str>) -> HostEntry {
        HostEntry {
            name: "h1".into(),
            address: "127.0.0.1:50052".into(),
            inventory: Inventory {
                cpus: 8,
                mem_bytes: 1 << 34,
                gpus_bdf: gpus.into_iter().map(String::from).collect(),
            },
            client: crate::grpc_client::NodeClient::from_address("127.0.0.1:50052"),
        }
    }

    #[test]
    fn gpu_less_host_always_returns_sentinel() {
        let host = host_with_gpus(vec![]);
        assert_eq!(pick_gpu_bdf(&host, 0), NO_GPU_SENTINEL);
        assert_eq!(pick_gpu_bdf(&host, 5), NO_GPU_SENTINEL);
    }

    #[test]
    fn gpu_assignment_round_robins() {
        let host = host_with_gpus(vec!["0000:01:00.0", "0000:02:00.0"]);
        assert_eq!(pick_gpu_bdf(&host, 0), "0000:01:00.0");
        assert_eq!(pick_gpu_bdf(&host, 1), "0000:02:00.0");
        assert_eq!(pick_gpu_bdf(&host, 2), "0000:01:00.0");
    }
}
