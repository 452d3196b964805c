use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore, cookie::SameSite};

use crate::config::{Config, SessionConfig, SessionExpiry};
use crate::services::{AuthService, GoogleOAuthClient, UserService};
use crate::state::SharedState;

pub mod auth;
mod blood_pressure;
mod error;
mod feature_flags;
mod music;
mod observability;
pub mod session;
mod system;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use session::CurrentUser;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserService> {
        &self.shared.user_service
    }

    #[must_use]
    pub fn google(&self) -> Option<&GoogleOAuthClient> {
        self.shared.google.as_deref()
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

/// Session cookie settings shared by every store backend.
///
/// In inactivity mode every request saves the session so the deadline
/// slides. Absolute deadlines are pinned per session by [`session::bind`].
pub fn session_layer<S>(store: S, config: &SessionConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    let layer = SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_http_only(true)
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_path("/")
        .with_expiry(Expiry::OnInactivity(config.ttl()))
        .with_always_save(config.expiry == SessionExpiry::Inactivity);

    match &config.cookie_domain {
        Some(domain) => layer.with_domain(domain.clone()),
        None => layer,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

pub fn router<S>(state: Arc<AppState>, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config().clone();

    let public_routes = Router::new()
        .route("/health", get(system::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/activate", post(auth::activate))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/google", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/music", get(music::list_music))
        .route("/music/{id}", get(music::get_music));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(create_protected_router(state.clone()))
        .merge(create_admin_router(state.clone()))
        .layer(session_layer(session_store, &config.session))
        .with_state(state);

    // Outermost first. Trace wraps CORS, which needs a defaultable body.
    Router::new().nest("/api", api_router).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server.cors_allowed_origins))
            .layer(middleware::from_fn(observability::logging_middleware))
            .layer(middleware::from_fn(
                observability::security_headers_middleware,
            )),
    )
}

/// Routes open to any signed-in user.
fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/change-password", put(auth::change_password))
        .route(
            "/blood-pressure",
            get(blood_pressure::list_measurements).post(blood_pressure::create_measurement),
        )
        .route(
            "/blood-pressure/{id}",
            get(blood_pressure::get_measurement)
                .put(blood_pressure::update_measurement)
                .delete(blood_pressure::delete_measurement),
        )
        .route("/music", post(music::create_music))
        .route(
            "/music/{id}",
            put(music::update_music).delete(music::delete_music),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            session::require_session,
        ))
}

/// Routes that additionally need the `admin` permission.
fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user).put(users::update_user))
        .route("/users/{id}/password", put(users::set_password))
        .route("/users/{id}/permissions", put(users::set_permissions))
        .route(
            "/feature-flags",
            get(feature_flags::get_feature_flags).put(feature_flags::update_feature_flags),
        )
        .route("/metrics", get(system::metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_admin,
        ))
        .route_layer(middleware::from_fn_with_state(
            state,
            session::require_session,
        ))
}
