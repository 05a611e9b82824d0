// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Route Prefix: none (`/`, `/health`)
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET / - service banner and route overview
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Realty API",
            "version": version,
            "description": "Real-estate marketplace backend built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "profile": "/api/profile (protected)",
                "properties": "/api/properties[/:id] (protected)",
                "property_requests": "/api/property-requests[/:id[/history]] (protected)",
                "scheduled_viewings": "/api/scheduled-viewings[/:id[/select|/cancel]] (protected)",
                "notifications": "/api/notifications[/unread-count|/read-all|/:id/read] (protected)",
                "saved_properties": "/api/saved-properties[/:property_id] (protected)",
                "sales_ops": "/api/sales-ops/* (sales_ops and admin)",
                "admin": "/api/admin/* (admin only)",
            }
        }
    }))
}

/// GET /health - pings the data gateway
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": { "message": "database unavailable", "code": "SERVICE_UNAVAILABLE" },
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
