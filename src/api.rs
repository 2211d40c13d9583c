//! Read-only HTTP surface of the ledger
//!
//! Serves a tenant's entries and on-demand verification results to audit
//! tooling. There is no write route; recording happens in-process.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::LedgerError;
use crate::ledger::{ChainVerification, ChainVerifier, Ledger, LedgerEntry};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub verifier: ChainVerifier,
}

pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::MissingTenantContext => StatusCode::BAD_REQUEST,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Ledger API error ({}): {}", status, self.0);
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tenants/:tenant_id/entries", get(list_entries))
        .route("/tenants/:tenant_id/verify", get(verify_tenant))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "site-ledger",
        "timestamp": chrono::Utc::now()
    }))
}

async fn list_entries(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(state.ledger.list_by_tenant(&tenant_id).await?))
}

async fn verify_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<ChainVerification>, ApiError> {
    Ok(Json(state.verifier.verify(&tenant_id).await?))
}
