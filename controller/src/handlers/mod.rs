use crate::App;
use crate::errors::Error;
use axum::{
    Extension, Router,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::{Request, StatusCode, header::HeaderName};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod pool;
pub mod vm;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

#[derive(OpenApi)]
#[openapi(
    paths(
        pool::handler::create,
        pool::handler::list,
        pool::handler::list_hosts,
        pool::handler::ensure_warm,
        vm::handler::fork,
        vm::handler::acquire,
        vm::handler::release,
        vm::handler::exec,
        vm::handler::health,
    ),
    components(
        schemas(
            crate::model::shape::Shape,
            crate::model::pool::PoolSpec,
            crate::model::pool::PoolSummary,
            crate::acquire_release::VmHandle,
            pool::handler::EnsureWarmRequest,
            pool::handler::EnsureWarmResponse,
            vm::handler::ForkRequest,
            vm::handler::ForkResponse,
            vm::handler::AcquireRequest,
            vm::handler::ReleaseRequest,
            vm::handler::ExecRequest,
            vm::handler::ExecResponse,
        )
    ),
    tags(
        (name = "pools", description = "Pool lifecycle and warm-queue management"),
        (name = "vms", description = "Acquiring, releasing, and forking VMs")
    ),
    info(
        title = "Controller API",
        version = "0.1.0",
        description = "Control plane for warm-pool VM fleet orchestration"
    )
)]
pub struct ApiDoc;

pub fn app(env: App) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/", get(|| async { "hello" }))
        .route("/health", get(vm::handler::health))
        .merge(pools())
        .merge(vms())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
                .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<axum::body::Body>| {
                        let request_id = request
                            .extensions()
                            .get::<RequestId>()
                            .map(|value| value.header_value().to_str().unwrap_or_default())
                            .unwrap_or_default();

                        tracing::info_span!(
                            "HTTP",
                            http.method = %request.method(),
                            http.url = %request.uri(),
                            request_id = %request_id,
                        )
                    }),
                ),
        )
        .layer(Extension(env))
}

fn pools() -> Router {
    Router::new()
        .route("/pools", get(pool::handler::list).post(pool::handler::create))
        .route("/pools/{pool_id}/hosts", get(pool::handler::list_hosts))
        .route("/pools/{pool_id}/warm", post(pool::handler::ensure_warm))
}

fn vms() -> Router {
    Router::new()
        .route("/vms/{vm_id}/fork", post(vm::handler::fork))
        .route("/acquire", post(vm::handler::acquire))
        .route("/vms/{vm_id}/release", post(vm::handler::release))
        .route("/vms/{vm_id}/exec", post(vm::handler::exec))
}

pub struct ApiResponse<T> {
    data: T,
    code: StatusCode,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { data, code: StatusCode::OK }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Send + Sync + Serialize,
{
    fn into_response(self) -> Response {
        let mut response = axum::response::Json(self.data).into_response();
        *response.status_mut() = self.code;
        response
    }
}
