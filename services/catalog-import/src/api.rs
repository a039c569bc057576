use crate::auth::{rejection_status, Authorizer};
use crate::config::ApiConfig;
use crate::error::{describe, PipelineError};
use crate::model::{CatalogProduct, QueuedRecord};
use crate::ports::CatalogStore;
use crate::upload_handle::UploadHandleIssuer;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<UploadHandleIssuer>,
    pub catalog: Arc<dyn CatalogStore>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Query parameters for `GET /import`
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub name: Option<String>,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error_response(status, self.public_message())
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
        if config.cors_origins.is_empty() {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    } else {
        CorsLayer::new()
    };

    let import = Router::new()
        .route("/import", get(import_products_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authorization,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product))
        .merge(import)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn require_authorization(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let decision = state.authorizer.authorize(authorization.as_deref()).await;

    match rejection_status(authorization.as_deref(), decision) {
        None => next.run(request).await,
        Some(status) => {
            warn!(status = status.as_u16(), "Rejected unauthorized import request");
            let message = if status == StatusCode::UNAUTHORIZED {
                "Unauthorized"
            } else {
                "Forbidden"
            };
            error_response(status, message)
        }
    }
}

/// Issue a signed upload URL for `?name=<fileName>`
#[instrument(skip(state))]
pub async fn import_products_file(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
) -> Response {
    match state.issuer.issue(query.name.as_deref()).await {
        Ok(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.url,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// All products with their stock counts
pub async fn list_products(State(state): State<AppState>) -> Response {
    match state.catalog.list_products().await {
        Ok(products) => Json(products).into_response(),
        Err(e) => {
            error!(error = %describe(&e), "Failed to list products");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

#[instrument(skip(state))]
pub async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.catalog.get_product(&id).await {
        Ok(Some(product)) => Json(product).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Product not found"),
        Err(e) => {
            error!(error = %describe(&e), "Failed to fetch product");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Create one product and its stock row from a JSON body
pub async fn create_product(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let record = match QueuedRecord::from_create_request(&body) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Rejected create product request");
            return e.into_response();
        }
    };
    let (product, stock) = record.to_store_records();

    if let Err(e) = state.catalog.upsert(&product, &stock).await {
        let e = PipelineError::Persistence {
            id: product.id.clone(),
            message: describe(&e),
        };
        error!(error = %e, "Failed to create product");
        return e.into_response();
    }

    info!(id = %product.id, "Product created");
    Json(CatalogProduct::from_records(product, stock)).into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-import"
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": describe(&e)
            })),
        ),
    }
}

/// Start the catalog API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
