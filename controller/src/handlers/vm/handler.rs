use axum::{Extension, Json, extract::Path};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::App;
use crate::handlers::{ApiResponse, Result};
use crate::acquire_release::VmHandle;
use crate::model::shape::Shape;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForkRequest {
    pub how_many: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForkResponse {
    pub children: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/vms/{vm_id}/fork",
    params(("vm_id" = String, Path, description = "Parent VM identifier")),
    request_body = ForkRequest,
    responses(
        (status = 200, description = "Children spawned from the parent's disk state", body = ForkResponse),
        (status = 404, description = "Parent VM not found")
    ),
    tag = "vms"
)]
#[instrument(skip(env))]
pub async fn fork(
    Extension(env): Extension<App>,
    Path(vm_id): Path<String>,
    Json(body): Json<ForkRequest>,
) -> Result<ApiResponse<ForkResponse>> {
    let children = env.placement.fork(&vm_id, body.how_many).await?;
    Ok(ApiResponse::ok(ForkResponse { children }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AcquireRequest {
    pub shape: Shape,
}

#[utoipa::path(
    post,
    path = "/acquire",
    request_body = AcquireRequest,
    responses(
        (status = 200, description = "A warm VM was handed out", body = VmHandle),
        (status = 429, description = "No warm instance available for the requested shape")
    ),
    tag = "vms"
)]
#[instrument(skip(env))]
pub async fn acquire(Extension(env): Extension<App>, Json(body): Json<AcquireRequest>) -> Result<ApiResponse<VmHandle>> {
    let handle = env.acquire_release.acquire(&body.shape).await?;
    Ok(ApiResponse::ok(handle))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseRequest {
    pub recycle: bool,
}

#[utoipa::path(
    post,
    path = "/vms/{vm_id}/release",
    params(("vm_id" = String, Path, description = "VM identifier")),
    request_body = ReleaseRequest,
    responses(
        (status = 200, description = "VM released"),
        (status = 404, description = "VM not found")
    ),
    tag = "vms"
)]
#[instrument(skip(env))]
pub async fn release(
    Extension(env): Extension<App>,
    Path(vm_id): Path<String>,
    Json(body): Json<ReleaseRequest>,
) -> Result<ApiResponse<()>> {
    env.acquire_release.release(&vm_id, body.recycle).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub timeout_sec: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[utoipa::path(
    post,
    path = "/vms/{vm_id}/exec",
    params(("vm_id" = String, Path, description = "VM identifier")),
    request_body = ExecRequest,
    responses(
        (status = 200, description = "Command ran to completion or timed out", body = ExecResponse),
        (status = 404, description = "VM not found")
    ),
    tag = "vms"
)]
#[instrument(skip(env))]
pub async fn exec(
    Extension(env): Extension<App>,
    Path(vm_id): Path<String>,
    Json(body): Json<ExecRequest>,
) -> Result<ApiResponse<ExecResponse>> {
    let outcome = env.acquire_release.exec(&vm_id, body.argv, body.timeout_sec).await?;
    Ok(ApiResponse::ok(ExecResponse {
        exit_code: outcome.exit_code,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
    }))
}

pub async fn health() -> &'static str {
    "ok"
}
