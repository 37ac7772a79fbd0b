use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// CPU/memory/GPU footprint a tenant asks for. Two VMs only share a warm
/// queue if their shapes produce the same [`Shape::shape_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Shape {
    pub vcpu: u32,
    pub ram_gb: u32,
    #[serde(default)]
    pub gpu_model: String,
}

impl Shape {
    pub fn shape_key(&self) -> String {
        format!("{}c-{}g-{}", self.vcpu, self.ram_gb, self.gpu_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_with_same_fields_share_a_key() {
        let a = Shape { vcpu: 4, ram_gb: 8, gpu_model: "".into() };
        let b = Shape { vcpu: 4, ram_gb: 8, gpu_model: "".into() };
        assert_eq!(a.shape_key(), b.shape_key());
    }

    #[test]
    fn gpu_model_is_part_of_the_key() {
        let a = Shape { vcpu: 4, ram_gb: 8, gpu_model: "a100".into() };
        let b = Shape { vcpu: 4, ram_gb: 8, gpu_model: "".into() };
        assert_ne!(a.shape_key(), b.shape_key());
    }
}
