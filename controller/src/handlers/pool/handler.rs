use axum::{Extension, Json, extract::Path};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::App;
use crate::handlers::{ApiResponse, Result};
use crate::model::pool::{PoolSpec, PoolSummary};
use crate::model::shape::Shape;

#[utoipa::path(
    post,
    path = "/pools",
    request_body = PoolSpec,
    responses((status = 200, description = "Pool created", body = PoolSummary)),
    tag = "pools"
)]
#[instrument(skip(env))]
pub async fn create(Extension(env): Extension<App>, Json(spec): Json<PoolSpec>) -> Result<ApiResponse<PoolSummary>> {
    let pool = env.registry.create_pool(spec).await;
    Ok(ApiResponse::ok(pool.summary().await))
}

#[utoipa::path(
    get,
    path = "/pools",
    responses((status = 200, description = "List all pools", body = Vec<PoolSummary>)),
    tag = "pools"
)]
#[instrument(skip(env))]
pub async fn list(Extension(env): Extension<App>) -> Result<ApiResponse<Vec<PoolSummary>>> {
    Ok(ApiResponse::ok(env.registry.list_pools().await))
}

#[utoipa::path(
    get,
    path = "/pools/{pool_id}/hosts",
    params(("pool_id" = String, Path, description = "Pool identifier")),
    responses(
        (status = 200, description = "VM ids ever admitted to this pool", body = Vec<String>),
        (status = 404, description = "Pool not found")
    ),
    tag = "pools"
)]
#[instrument(skip(env))]
pub async fn list_hosts(Extension(env): Extension<App>, Path(pool_id): Path<String>) -> Result<ApiResponse<Vec<String>>> {
    Ok(ApiResponse::ok(env.registry.list_pool_hosts(&pool_id).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnsureWarmRequest {
    pub shape: Shape,
    pub target: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnsureWarmResponse {
    pub warm: i64,
}

#[utoipa::path(
    post,
    path = "/pools/{pool_id}/warm",
    params(("pool_id" = String, Path, description = "Pool identifier")),
    request_body = EnsureWarmRequest,
    responses(
        (status = 200, description = "Warm queue topped up", body = EnsureWarmResponse),
        (status = 404, description = "Pool not found")
    ),
    tag = "pools"
)]
#[instrument(skip(env))]
pub async fn ensure_warm(
    Extension(env): Extension<App>,
    Path(pool_id): Path<String>,
    Json(body): Json<EnsureWarmRequest>,
) -> Result<ApiResponse<EnsureWarmResponse>> {
    let warm = env.placement.ensure_warm(&pool_id, &body.shape, body.target).await?;
    Ok(ApiResponse::ok(EnsureWarmResponse { warm }))
}
