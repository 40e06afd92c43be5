use utoipa::OpenApi;

use super::handlers;

/// OpenAPI document for the fixed system/admin surface. Routes contributed
/// dynamically by a `ServiceEngine::routes()` builder aren't macro-annotated
/// (they're assembled from trait-object closures at runtime, not standalone
/// functions `utoipa::path` can point at) and are instead self-described via
/// `GET /system/descriptors`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::healthz,
        handlers::livez,
        handlers::readyz,
        handlers::metrics,
        handlers::system_descriptors,
        handlers::system_version,
        handlers::system_status,
        handlers::system_events_replay,
        handlers::system_events_publish,
        handlers::system_rpc,
        handlers::auth_login,
        handlers::auth_refresh,
        handlers::auth_wallet_challenge,
        handlers::auth_wallet_login,
        handlers::auth_whoami,
        handlers::admin_audit,
    ),
    info(title = "Platform API", description = "System, admin, and service-substrate API")
)]
pub struct ApiDoc;
