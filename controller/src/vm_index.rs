use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::model::vm::{Vm, VmState};

/// Flat index of every VM the controller currently knows about, regardless
/// of which pool it belongs to. Pool warm queues hold ids, not VMs; this is
/// where the VM record itself lives.
#[derive(Default)]
pub struct VmIndex {
    vms: RwLock<HashMap<String, Vm>>,
}

impl VmIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, vm: Vm) {
        self.vms.write().await.insert(vm.id.clone(), vm);
    }

    pub async fn get(&self, id: &str) -> Option<Vm> {
        self.vms.read().await.get(id).cloned()
    }

    pub async fn set_state(&self, id: &str, state: VmState) {
        if let Some(vm) = self.vms.write().await.get_mut(id) {
            vm.state = state;
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Vm> {
        self.vms.write().await.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shape::Shape;

    fn vm(id: &str) -> Vm {
        Vm {
            id: id.to_string(),
            host: "h1".to_string(),
            shape: Shape { vcpu: 2, ram_gb: 1, gpu_model: String::new() },
            gpu_bdf: "0000:00:00.0".to_string(),
            ip: None,
            pool_id: "p1".to_string(),
            state: VmState::PausedWarm,
        }
    }

    #[tokio::test]
    async fn set_state_updates_the_stored_record() {
        let index = VmIndex::new();
        index.insert(vm("vm1")).await;
        index.set_state("vm1", VmState::Running).await;
        assert_eq!(index.get("vm1").await.unwrap().state, VmState::Running);
    }

    #[tokio::test]
    async fn remove_drops_it_from_the_index() {
        let index = VmIndex::new();
        index.insert(vm("vm1")).await;
        assert!(index.remove("vm1").await.is_some());
        assert!(index.get("vm1").await.is_none());
    }
}
