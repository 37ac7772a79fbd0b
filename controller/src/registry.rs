use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::errors::Error;
use crate::model::pool::{Pool, PoolSpec, PoolSummary};

/// Owns every pool the controller knows about. Pools are created once and
/// never removed, so lookups never need to handle a pool disappearing out
/// from under a concurrent caller.
///
/// Warm queues are pool-scoped (`Pool::state.warm`). Acquire doesn't name a
/// pool, so `peek_warm`/`commit_dequeue` scan pools in creation order to
/// find one with a matching shape key — this is how legacy (pool-less)
/// Acquire and pool-scoped EnsureWarm/Fork end up sharing the same queues
/// instead of needing two independent warm-instance sources.
pub struct PoolRegistry {
    create_lock: Mutex<()>,
    order: RwLock<Vec<String>>,
    pools: RwLock<HashMap<String, Arc<Pool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            create_lock: Mutex::new(()),
            order: RwLock::new(Vec::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_pool(&self, spec: PoolSpec) -> Arc<Pool> {
        let _guard = self.create_lock.lock().await;
        let id = common::ids::random_hex(8);
        let tenant_id = spec.tenant_id.unwrap_or_else(|| "default".to_string());
        let name = spec.name.unwrap_or_else(|| id.clone());
        let pool = Arc::new(Pool::new(id.clone(), name, tenant_id));

        self.pools.write().await.insert(id.clone(), pool.clone());
        self.order.write().await.push(id);
        pool
    }

    pub async fn list_pools(&self) -> Vec<PoolSummary> {
        let order = self.order.read().await;
        let pools = self.pools.read().await;
        let mut out = Vec::with_capacity(order.len());
        for id in order.iter() {
            if let Some(pool) = pools.get(id) {
                out.push(pool.summary().await);
            }
        }
        out
    }

    pub async fn get(&self, pool_id: &str) -> Result<Arc<Pool>, Error> {
        self.pools.read().await.get(pool_id).cloned().ok_or(Error::NotFound)
    }

    pub async fn list_pool_hosts(&self, pool_id: &str) -> Result<Vec<String>, Error> {
        let pool = self.get(pool_id).await?;
        let state = pool.state.lock().await;
        Ok(state.guests.clone())
    }

    /// Admits a freshly spawned VM into `pool_id`'s membership log and warm
    /// queue. Used by EnsureWarm and Fork, which always create new VMs.
    pub async fn admit_and_warm(&self, pool_id: &str, shape_key: &str, vm_id: String) -> Result<(), Error> {
        let pool = self.get(pool_id).await?;
        let mut state = pool.state.lock().await;
        state.guests.push(vm_id.clone());
        state.warm.entry(shape_key.to_string()).or_default().push_back(vm_id);
        Ok(())
    }

    /// Returns a VM already admitted to `pool_id` to its warm queue. Used
    /// by Release(recycle=true); does not touch the membership log since
    /// the VM was already admitted when it was first created.
    pub async fn requeue_warm(&self, pool_id: &str, shape_key: &str, vm_id: String) -> Result<(), Error> {
        let pool = self.get(pool_id).await?;
        let mut state = pool.state.lock().await;
        state.warm.entry(shape_key.to_string()).or_default().push_back(vm_id);
        Ok(())
    }

    /// Scans pools in creation order for one with a non-empty warm queue for
    /// `shape_key`, returning the id at the front without removing it.
    pub async fn peek_warm(&self, shape_key: &str) -> Option<(String, String)> {
        let order = self.order.read().await;
        let pools = self.pools.read().await;
        for pool_id in order.iter() {
            let Some(pool) = pools.get(pool_id) else { continue };
            let state = pool.state.lock().await;
            if let Some(queue) = state.warm.get(shape_key)
                && let Some(vm_id) = queue.front()
            {
                return Some((pool_id.clone(), vm_id.clone()));
            }
        }
        None
    }

    /// Commits a previous `peek_warm` by removing `vm_id` from the front of
    /// `pool_id`'s queue for `shape_key`. Re-checks the front before
    /// popping, since an await point sits between peek and commit and
    /// another task may have mutated the queue in between; if `vm_id` isn't
    /// at the front anymore it is still removed, wherever it sits.
    pub async fn commit_dequeue(&self, pool_id: &str, shape_key: &str, vm_id: &str) {
        let Ok(pool) = self.get(pool_id).await else { return };
        let mut state = pool.state.lock().await;
        let Some(queue) = state.warm.get_mut(shape_key) else { return };

        if queue.front().map(|v| v.as_str()) == Some(vm_id) {
            queue.pop_front();
            return;
        }

        warn!(pool_id, shape_key, vm_id, "warm queue mutated between peek and commit");
        if let Some(pos) = queue.iter().position(|v| v == vm_id) {
            queue.remove(pos);
        }
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pool::PoolSpec;

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let registry = PoolRegistry::new();
        let pool = registry.create_pool(PoolSpec { name: Some("p1".into()), tenant_id: None }).await;
        let pools = registry.list_pools().await;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, pool.id);
        assert_eq!(pools[0].tenant_id, "default");
    }

    #[tokio::test]
    async fn peek_then_commit_dequeues_in_fifo_order() {
        let registry = PoolRegistry::new();
        let pool = registry.create_pool(PoolSpec { name: None, tenant_id: None }).await;
        registry.admit_and_warm(&pool.id, "shape", "vm1".into()).await.unwrap();
        registry.admit_and_warm(&pool.id, "shape", "vm2".into()).await.unwrap();

        let (pool_id, vm_id) = registry.peek_warm("shape").await.unwrap();
        assert_eq!(vm_id, "vm1");
        registry.commit_dequeue(&pool_id, "shape", &vm_id).await;

        let (_, vm_id) = registry.peek_warm("shape").await.unwrap();
        assert_eq!(vm_id, "vm2");
    }

    #[tokio::test]
    async fn peek_without_commit_leaves_the_vm_queued() {
        let registry = PoolRegistry::new();
        let pool = registry.create_pool(PoolSpec { name: None, tenant_id: None }).await;
        registry.admit_and_warm(&pool.id, "shape", "vm1".into()).await.unwrap();

        let _ = registry.peek_warm("shape").await.unwrap();
        let (_, vm_id) = registry.peek_warm("shape").await.unwrap();
        assert_eq!(vm_id, "vm1");
    }
}
