//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/organizations` | Create an organization (201) |
//! | `GET`  | `/organizations/{id}` | Fetch an organization |
//! | `POST` | `/organizations/{org_id}/products` | Embed and store a product (201) |
//! | `GET`  | `/organizations/{org_id}/products/search` | Search one organization's products |
//! | `GET`  | `/products/search` | Search across all organizations |
//! | `GET`  | `/debug/collection-info` | Vector collection statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "Organization not found", "code": "not_found" }
//! ```
//!
//! | Kind | Status | Code |
//! |------|--------|------|
//! | NotFound | 404 | `not_found` |
//! | BadRequest | 400 | `bad_request` |
//! | Timeout | 504 | `timeout` |
//! | Unauthorized | 502 | `upstream_unauthorized` |
//! | RateLimited | 503 | `rate_limited` |
//! | Upstream | 502 | `upstream_error` |
//! | Internal | 500 | `internal` |
//!
//! Malformed JSON bodies and query strings are BadRequest too.
//! Only NotFound and BadRequest carry their own message. Other kinds
//! answer with a fixed per-kind message unless
//! `server.expose_error_details = true`; the full error is always logged.
//!
//! # CORS
//!
//! Origins come from `server.cors_origins` (`"*"` allows any).

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::error::{ErrorKind, ServiceError};
use crate::ingest::create_product;
use crate::models::{NewOrganization, NewProduct, Organization, StoredProduct};
use crate::search::{search_products, SearchParams, SearchResponse};
use crate::services::Services;
use crate::vector::CollectionInfo;

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

impl AppState {
    /// Log a failure and turn it into a response.
    fn fail(&self, route: &'static str, err: ServiceError) -> AppError {
        let kind = err.kind();
        match kind {
            ErrorKind::NotFound | ErrorKind::BadRequest => {
                tracing::debug!(route, code = kind.code(), error = %err, "request rejected");
            }
            _ => tracing::error!(route, code = kind.code(), error = %err, "request failed"),
        }

        let detail = match kind {
            ErrorKind::NotFound | ErrorKind::BadRequest => err.to_string(),
            _ if self.services.config.server.expose_error_details => err.to_string(),
            _ => kind.generic_message().to_string(),
        };
        AppError { kind, detail }
    }

    /// Malformed bodies and query strings go through the same error table.
    fn reject(&self, route: &'static str, detail: String) -> AppError {
        self.fail(route, ServiceError::BadRequest(detail))
    }
}

/// Start the server described by `config`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(Services::from_config(config).await?);
    services.prepare_collection().await;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    serve(listener, services).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, services: Arc<Services>) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = router(services);
    tracing::info!(%addr, "search API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(services: Arc<Services>) -> Router {
    let cors = cors_layer(&services.config.server.cors_origins);
    let state = AppState { services };

    Router::new()
        .route("/health", get(handle_health))
        .route("/organizations", post(handle_create_organization))
        .route("/organizations/{id}", get(handle_get_organization))
        .route("/organizations/{org_id}/products", post(handle_create_product))
        .route(
            "/organizations/{org_id}/products/search",
            get(handle_search_organization),
        )
        .route("/products/search", get(handle_search_all))
        .route("/debug/collection-info", get(handle_collection_info))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

struct AppError {
    kind: ErrorKind,
    detail: String,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unauthorized => StatusCode::BAD_GATEWAY,
        ErrorKind::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            code: self.kind.code(),
        };
        (status_for(self.kind), Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Organizations ============

async fn handle_create_organization(
    State(state): State<AppState>,
    body: Result<Json<NewOrganization>, JsonRejection>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    const ROUTE: &str = "POST /organizations";
    let Json(body) = body.map_err(|e| state.reject(ROUTE, e.body_text()))?;
    if body.name.trim().is_empty() {
        return Err(state.fail(
            ROUTE,
            ServiceError::BadRequest("name must not be empty".to_string()),
        ));
    }

    let org = state
        .services
        .organizations
        .create(body)
        .await
        .map_err(|e| state.fail(ROUTE, e.into()))?;

    tracing::info!(org_id = %org.id, name = %org.name, "organization created");
    Ok((StatusCode::CREATED, Json(org)))
}

async fn handle_get_organization(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Organization>, AppError> {
    const ROUTE: &str = "GET /organizations/{id}";
    let org = state
        .services
        .organizations
        .get(&id)
        .await
        .map_err(|e| state.fail(ROUTE, e.into()))?
        .ok_or_else(|| state.fail(ROUTE, ServiceError::organization_not_found()))?;
    Ok(Json(org))
}

// ============ Products ============

async fn handle_create_product(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredProduct>), AppError> {
    const ROUTE: &str = "POST /organizations/{org_id}/products";
    let Json(body) = body.map_err(|e| state.reject(ROUTE, e.body_text()))?;
    let stored = create_product(&state.services, &org_id, body)
        .await
        .map_err(|e| state.fail(ROUTE, e))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn handle_search_organization(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    const ROUTE: &str = "GET /organizations/{org_id}/products/search";
    let Query(params) = params.map_err(|e| state.reject(ROUTE, e.body_text()))?;
    let response = search_products(&state.services, Some(&org_id), &params)
        .await
        .map_err(|e| state.fail(ROUTE, e))?;
    Ok(Json(response))
}

async fn handle_search_all(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    const ROUTE: &str = "GET /products/search";
    let Query(params) = params.map_err(|e| state.reject(ROUTE, e.body_text()))?;
    let response = search_products(&state.services, None, &params)
        .await
        .map_err(|e| state.fail(ROUTE, e))?;
    Ok(Json(response))
}

// ============ GET /debug/collection-info ============

async fn handle_collection_info(
    State(state): State<AppState>,
) -> Result<Json<CollectionInfo>, AppError> {
    let info = state
        .services
        .index
        .collection_info()
        .await
        .map_err(|e| state.fail("GET /debug/collection-info", e))?;
    Ok(Json(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::RateLimited), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
