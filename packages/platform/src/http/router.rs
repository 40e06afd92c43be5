use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utils::http::auth::verify_bearer_with_realm;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wildmatch::WildMatch;

use super::{handlers, middleware as platform_middleware, openapi::ApiDoc, state::HttpState};
use crate::error::ApiError;
use crate::service_engine::{ApiRequest, RouteDescriptor};

const REALM: &str = "platform";

/// Assembles the full router: ungated system endpoints, the tenant-scoped
/// API surface contributed by every registered `ServiceEngine`, and an
/// admin surface gated by a single bearer secret. Mirrors the teacher's
/// `wavs::http::server::make_router` split between public and protected
/// sub-routers merged at the end.
pub fn make_router(state: HttpState, admin_bearer_token: Option<String>) -> Router {
    let system = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/healthz", get(handlers::healthz))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .route("/system/descriptors", get(handlers::system_descriptors))
        .route("/system/version", get(handlers::system_version))
        .route("/system/status", get(handlers::system_status))
        .route(
            "/system/events/{chain_id}/replay",
            post(handlers::system_events_replay),
        )
        .route("/auth/login", post(handlers::auth_login))
        .route("/auth/refresh", post(handlers::auth_refresh))
        .route("/auth/wallet/challenge", post(handlers::auth_wallet_challenge))
        .route("/auth/wallet/login", post(handlers::auth_wallet_login));

    let mut admin = Router::new()
        .route("/admin/audit", get(handlers::admin_audit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            platform_middleware::tenant_extraction,
        ));
    if let Some(token) = admin_bearer_token {
        admin = admin.layer(middleware::from_fn_with_state(
            (token, REALM.to_string()),
            verify_bearer_with_realm,
        ));
    }

    // Tenant-identified substrate endpoints that aren't contributed by any
    // one `ServiceEngine` — they read/write the bus and policy state
    // directly rather than a service's own store.
    let tenant_system = Router::new()
        .route("/system/events", post(handlers::system_events_publish))
        .route("/system/rpc", post(handlers::system_rpc))
        .route("/auth/whoami", get(handlers::auth_whoami))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            platform_middleware::tenant_extraction,
        ));

    let mut services = Router::new();
    for service in state.services.iter() {
        for route in service.routes() {
            services = mount_service_route(services, service.domain(), route);
        }
    }

    let rate_limiter = platform_middleware::RateLimiter::new(120, Duration::from_secs(60));

    let api = Router::new()
        .merge(services)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            platform_middleware::tenant_extraction,
        ))
        .route_layer(middleware::from_fn_with_state(
            rate_limiter,
            platform_middleware::rate_limit,
        ));

    let mut router = Router::new()
        .merge(system)
        .merge(admin)
        .merge(tenant_system)
        .merge(api)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), platform_middleware::audit))
        .layer(middleware::from_fn(platform_middleware::request_id))
        .layer(CatchPanicLayer::custom(|_: Box<dyn std::any::Any + Send>| {
            platform_middleware::panic_response()
        }))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.bus_max_bytes as usize))
        .with_state(state.clone());

    if let Some(cors) = cors_layer(&state) {
        router = router.layer(cors);
    }

    router
}

fn mount_service_route(router: Router<HttpState>, domain: &str, route: RouteDescriptor) -> Router<HttpState> {
    let pattern = format!("/{}{}", domain, route.pattern);
    let handler = route.handler.clone();
    let method = route.method.clone();

    let service = move |state: axum::extract::State<HttpState>,
                         req: axum::extract::Request| {
        let handler = handler.clone();
        async move {
            use axum::extract::FromRequestParts;

            let (mut parts, body) = req.into_parts();

            let account_id = parts
                .extensions
                .get::<platform_types::AccountId>()
                .copied()
                .unwrap_or_else(platform_types::AccountId::new);
            let headers = parts
                .headers
                .iter()
                .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
                .collect();
            let query = parts.uri.query().map(parse_query).unwrap_or_default();
            let path_params =
                axum::extract::Path::<std::collections::HashMap<String, String>>::from_request_parts(
                    &mut parts, &state,
                )
                .await
                .map(|p| p.0)
                .unwrap_or_default();

            let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let body = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);

            let api_request = ApiRequest {
                account_id,
                headers,
                query,
                path_params,
                body,
            };
            handler(api_request).await
        }
    };

    match method {
        m if m == axum::http::Method::GET => router.route(&pattern, get(service)),
        m if m == axum::http::Method::POST => router.route(&pattern, post(service)),
        m if m == axum::http::Method::DELETE => router.route(&pattern, axum::routing::delete(service)),
        m if m == axum::http::Method::PUT => router.route(&pattern, axum::routing::put(service)),
        m if m == axum::http::Method::PATCH => router.route(&pattern, axum::routing::patch(service)),
        _ => router,
    }
}

fn parse_query(raw: &str) -> std::collections::HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn cors_layer(state: &HttpState) -> Option<CorsLayer> {
    if state.config.cors_allowed_origins.is_empty() {
        return None;
    }
    if state.config.cors_allowed_origins.iter().any(|o| o == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );
    }

    let allowed: Vec<WildMatch> = state
        .config
        .cors_allowed_origins
        .iter()
        .map(|s| WildMatch::new(s))
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::predicate(move |origin, _parts| {
                origin
                    .to_str()
                    .map(|origin| allowed.iter().any(|pattern| pattern.matches(origin)))
                    .unwrap_or(false)
            }))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

#[allow(dead_code)]
fn assert_error_into_response(err: ApiError) -> axum::response::Response {
    axum::response::IntoResponse::into_response(err)
}
