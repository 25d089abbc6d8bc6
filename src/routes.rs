use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::protected::attachments::FILE_NAME_HEADER;
use crate::handlers::{elevated, protected, public};
use crate::middleware::firm_context::FIRM_HEADER;
use crate::middleware::idempotency::{IDEMPOTENCY_HEADER, REPLAYED_HEADER};
use crate::middleware::{
    firm_context_middleware, idempotency_middleware, jwt_auth_middleware, require_superadmin_middleware,
    transaction_middleware, validate_user_middleware,
};
use crate::state::AppState;

/// The full application router.
///
/// Middleware listed first in each `ServiceBuilder` runs first.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        .merge(public_routes())
        .merge(session_routes(state.clone()))
        .merge(protected_routes(state.clone()))
        .merge(elevated_routes(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login", post(public::login))
}

/// `/api/auth/*`: a signed-in user, no firm required
fn session_routes(state: AppState) -> Router<AppState> {
    use protected::auth;

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/password", put(auth::change_password))
        .route_layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
                .layer(from_fn_with_state(state.clone(), validate_user_middleware))
                .layer(from_fn_with_state(state.clone(), idempotency_middleware))
                .layer(from_fn_with_state(state, transaction_middleware)),
        )
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{attachments, audit, cases, clients, firm, tasks, users};

    Router::new()
        .route("/api/firm", get(firm::show).patch(firm::update))
        // Users
        .route("/api/users", get(users::list).post(users::create))
        .route(
            "/api/users/:id",
            get(users::show).patch(users::update).delete(users::delete),
        )
        .route("/api/users/:id/restore", post(users::restore))
        // Clients
        .route("/api/clients", get(clients::list).post(clients::create))
        .route("/api/clients/find", post(clients::find))
        .route(
            "/api/clients/:id",
            get(clients::show).patch(clients::update).delete(clients::delete),
        )
        .route("/api/clients/:id/restore", post(clients::restore))
        // Cases
        .route("/api/cases", get(cases::list).post(cases::create))
        .route("/api/cases/find", post(cases::find))
        .route(
            "/api/cases/:id",
            get(cases::show).patch(cases::update).delete(cases::delete),
        )
        .route("/api/cases/:id/restore", post(cases::restore))
        .route("/api/cases/:id/tasks", get(cases::tasks))
        .route(
            "/api/cases/:id/attachments",
            get(attachments::list_for_case).post(attachments::upload),
        )
        // Tasks
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route(
            "/api/tasks/:id",
            get(tasks::show).patch(tasks::update).delete(tasks::delete),
        )
        .route("/api/tasks/:id/restore", post(tasks::restore))
        // Attachments
        .route(
            "/api/attachments/:id",
            get(attachments::show).delete(attachments::delete),
        )
        .route("/api/attachments/:id/content", get(attachments::content))
        .route("/api/attachments/:id/restore", post(attachments::restore))
        // Audit trail
        .route("/api/audit", get(audit::list))
        .route_layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
                .layer(from_fn_with_state(state.clone(), firm_context_middleware))
                .layer(from_fn_with_state(state.clone(), validate_user_middleware))
                .layer(from_fn_with_state(state.clone(), idempotency_middleware))
                .layer(from_fn_with_state(state, transaction_middleware)),
        )
}

fn elevated_routes(state: AppState) -> Router<AppState> {
    use elevated::{audit, firms, stats};

    Router::new()
        .route("/api/admin/firms", get(firms::list).post(firms::create))
        .route(
            "/api/admin/firms/:id",
            get(firms::show).patch(firms::update).delete(firms::delete),
        )
        .route("/api/admin/firms/:id/restore", post(firms::restore))
        .route("/api/admin/firms/:id/suspend", post(firms::suspend))
        .route("/api/admin/firms/:id/activate", post(firms::activate))
        .route("/api/admin/firms/:id/impersonate", post(firms::impersonate))
        .route("/api/admin/stats", get(stats::stats))
        .route("/api/admin/audit", get(audit::list))
        .route_layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
                .layer(axum::middleware::from_fn(require_superadmin_middleware))
                .layer(from_fn_with_state(state.clone(), validate_user_middleware))
                .layer(from_fn_with_state(state.clone(), idempotency_middleware))
                .layer(from_fn_with_state(state, transaction_middleware)),
        )
}

/// Configured origins only; an origin list of `*` allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(IDEMPOTENCY_HEADER),
            HeaderName::from_static(FIRM_HEADER),
            HeaderName::from_static(FILE_NAME_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REPLAYED_HEADER)]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(tower_http::cors::Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    base.allow_origin(allowed)
}
