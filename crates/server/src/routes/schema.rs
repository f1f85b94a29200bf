use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// GET /api/schema
pub async fn list_tables(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(json!({ "tables": state.schemas.tables() }))
}

/// GET /api/schema/{table}
pub async fn get_table(
    State(state): State<Arc<ServerState>>,
    Path(table): Path<String>,
) -> ServerResult<impl IntoResponse> {
    state
        .schemas
        .snapshot(&table)
        .map(Json)
        .ok_or(ServerError::TableNotFound(table))
}
