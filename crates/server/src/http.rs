//! HTTP endpoints
//!
//! Health, the WebSocket upgrade, and the bearer-authenticated tool-data
//! endpoints with their `{ success, data, metadata }` envelope.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use opsvoice_tools::{default_scope, is_valid_scope, Scope};

use crate::auth::require_bearer;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors_origins);

    let tool_routes = Router::new()
        .route("/web-search", post(web_search))
        .route("/:tool_key", post(tool_data))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(crate::ws::ws_handler))
        .nest("/api/tools", tool_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().expect("static origin"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    info!(count = parsed.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.coordinator.registry().count(),
    }))
}

#[derive(Debug, Deserialize)]
struct ToolDataRequest {
    user_id: String,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    scope: Option<Scope>,
    #[serde(default)]
    limit: Option<u32>,
}

/// Fetch scoped business data for a tool key
async fn tool_data(
    State(state): State<AppState>,
    Path(tool_key): Path<String>,
    Json(request): Json<ToolDataRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if opsvoice_tools::data_source(&tool_key).is_none() {
        return Err(ServerError::UnknownTool(tool_key));
    }

    let scope = request.scope.unwrap_or_else(|| default_scope(&tool_key));
    if !is_valid_scope(&tool_key, scope) {
        return Err(ServerError::InvalidScope {
            tool_key,
            scope: scope.as_str().to_string(),
        });
    }

    let limit = request
        .limit
        .unwrap_or(state.settings.tools.max_limit)
        .min(state.settings.tools.max_limit);

    let rows = state
        .tool_data
        .fetch(
            &tool_key,
            scope,
            &request.user_id,
            request.team_id.as_deref(),
            limit,
        )
        .await;
    let count = rows.len();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": rows,
        "metadata": {
            "count": count,
            "scope": scope.as_str(),
            "tool_key": tool_key,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct WebSearchRequest {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
}

/// Proxy a web search for the agent
async fn web_search(
    State(state): State<AppState>,
    Json(request): Json<WebSearchRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::BadRequest("query must not be empty".to_string()));
    }

    let max_results = request.max_results.unwrap_or(5).min(10);
    let response = state.web_search.search(&request.query, max_results).await?;
    let count = response.results.len();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": response,
        "metadata": {
            "count": count,
            "tool_key": "web-search",
        },
    })))
}
