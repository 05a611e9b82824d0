use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::config;
use crate::database::Store;
use crate::error::ApiError;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{jwt_auth_middleware, require_admin, require_staff, validate_user_middleware};
use crate::push::PushDispatcher;
use crate::services::Services;

/// Shared handler state: the data gateway and the services built on it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub services: Services,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, push: PushDispatcher) -> Self {
        Self {
            services: Services::new(store.clone(), push),
            store,
        }
    }
}

/// Full application router.
///
/// Route layers wrap from the inside out, so the JWT check (added last)
/// runs before the profile lookup, which runs before the role tiers.
pub fn router(state: AppState) -> Router {
    let staff = sales_ops_routes().route_layer(from_fn(require_staff));
    let admin = admin_routes().route_layer(from_fn(require_admin));

    let protected = Router::new()
        .merge(profile_routes())
        .merge(property_routes())
        .merge(request_routes())
        .merge(viewing_routes())
        .merge(notification_routes())
        .merge(saved_property_routes())
        .merge(staff)
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), validate_user_middleware))
        .route_layer(from_fn(jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(protected)
        .fallback(route_not_found)
        // Global middleware, outermost first
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors_layer()))
        .with_state(state)
}

fn no_store() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    )
}

fn profile_routes() -> Router<AppState> {
    use protected::profile;

    Router::new().route("/api/profile", get(profile::profile_get).put(profile::profile_put))
}

fn property_routes() -> Router<AppState> {
    use protected::properties;

    Router::new()
        .route("/api/properties", get(properties::properties_get))
        .route("/api/properties/:id", get(properties::property_get))
}

fn request_routes() -> Router<AppState> {
    use protected::property_requests as requests;

    Router::new()
        .route("/api/property-requests", get(requests::requests_get).post(requests::requests_post))
        .route(
            "/api/property-requests/:id",
            get(requests::request_get)
                .put(requests::request_put)
                .delete(requests::request_delete),
        )
        .route("/api/property-requests/:id/history", get(requests::request_history_get))
        .layer(no_store())
}

fn viewing_routes() -> Router<AppState> {
    use protected::scheduled_viewings as viewings;

    Router::new()
        .route("/api/scheduled-viewings", get(viewings::viewings_get).post(viewings::viewings_post))
        .route("/api/scheduled-viewings/:id", get(viewings::viewing_get))
        .route("/api/scheduled-viewings/:id/select", post(viewings::viewing_select))
        .route("/api/scheduled-viewings/:id/cancel", post(viewings::viewing_cancel))
        .layer(no_store())
}

fn notification_routes() -> Router<AppState> {
    use protected::notifications;

    Router::new()
        .route("/api/notifications", get(notifications::notifications_get))
        .route("/api/notifications/unread-count", get(notifications::unread_count_get))
        .route("/api/notifications/read-all", put(notifications::read_all_put))
        .route("/api/notifications/:id/read", put(notifications::notification_read_put))
        .layer(no_store())
}

fn saved_property_routes() -> Router<AppState> {
    use protected::saved_properties as saved;

    Router::new()
        .route("/api/saved-properties", get(saved::saved_get))
        .route("/api/saved-properties/:id", post(saved::saved_post).delete(saved::saved_delete))
}

fn sales_ops_routes() -> Router<AppState> {
    use elevated::sales_ops;

    Router::new()
        .route("/api/sales-ops/team", get(sales_ops::team_get))
        .route("/api/sales-ops/properties", post(sales_ops::properties_post))
        .route(
            "/api/sales-ops/properties/:id",
            put(sales_ops::property_put).delete(sales_ops::property_delete),
        )
        .route("/api/sales-ops/properties/:id/availability", patch(sales_ops::property_availability_patch))
        .route("/api/sales-ops/property-requests/:id/assign", post(sales_ops::request_assign))
        .route("/api/sales-ops/property-requests/:id/status", post(sales_ops::request_status))
        .route("/api/sales-ops/scheduled-viewings/:id/propose", post(sales_ops::viewing_propose))
        .route("/api/sales-ops/scheduled-viewings/:id/confirm", post(sales_ops::viewing_confirm))
        .route("/api/sales-ops/scheduled-viewings/:id/complete", post(sales_ops::viewing_complete))
}

fn admin_routes() -> Router<AppState> {
    use elevated::admin;

    Router::new()
        .route("/api/admin/users", get(admin::users_get).post(admin::users_post))
        .route("/api/admin/users/:id", get(admin::user_get).patch(admin::user_patch))
}

fn cors_layer() -> CorsLayer {
    if crate::is_development!() {
        return CorsLayer::permissive();
    }

    let origins = config()
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
