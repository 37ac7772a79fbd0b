use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::shape::Shape;

#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumString, Display, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VmState {
    PausedWarm,
    Running,
    Destroyed,
}

/// Controller-side view of a VM: where it lives and what it's made of.
/// The host daemon keeps its own, separate record (VMRec) for the same VM.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Vm {
    pub id: String,
    pub host: String,
    pub shape: Shape,
    pub gpu_bdf: String,
    pub ip: Option<String>,
    pub pool_id: String,
    pub state: VmState,
}
