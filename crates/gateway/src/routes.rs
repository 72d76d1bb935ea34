//! One handler per gateway operation.
//!
//! Each handler is a mapping from validated parameters to a backend
//! argument vector, then from the command result to the envelope.
//! Resource lookups (content, history, change detail) map backend
//! failure to 404; collection and action operations map it to 500.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, Query},
    http::{StatusCode, Uri},
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

use p4_runner::CommandResult;

use crate::{
    envelope::{self, ApiError},
    validate::{self, specs, FieldError, Validated},
    AppState,
};

pub const DEPOT_WILDCARD: &str = "//depot/...";
pub const DEFAULT_MAX_FILES: i64 = 100;
pub const DEFAULT_MAX_CHANGES: i64 = 20;
pub const DEFAULT_MAX_HISTORY: i64 = 10;

const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /api/info",
    "GET /api/files",
    "GET /api/files/content",
    "GET /api/files/history",
    "GET /api/changes",
    "GET /api/changes/:id",
    "GET /api/users",
    "POST /api/sync",
    "GET /api/docs",
];

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn query_map(query: HashMap<String, String>) -> Map<String, Value> {
    query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn non_blank_count(raw: &str) -> usize {
    raw.lines().filter(|line| !line.trim().is_empty()).count()
}

fn collection_error(message: &str, result: CommandResult) -> ApiError {
    ApiError::Backend {
        message: message.to_string(),
        detail: result
            .error
            .unwrap_or_else(|| "unknown backend failure".to_string()),
    }
}

fn lookup_error(message: String, result: CommandResult) -> ApiError {
    ApiError::NotFound {
        message,
        detail: result
            .error
            .unwrap_or_else(|| "unknown backend failure".to_string()),
    }
}

/// Required field missing after validation passed is a handler bug, not
/// a client error.
fn require_str(state: &AppState, params: &Validated, name: &str) -> Result<String, ApiError> {
    params
        .get_str(name)
        .map(str::to_string)
        .ok_or_else(|| ApiError::Internal {
            detail: format!("validated parameter '{name}' is missing"),
            expose: state.expose_errors(),
        })
}

/// Liveness plus backend reachability. Always 200; the backend state is
/// reported in the payload rather than through the error mapping used by
/// `/api/info`.
pub async fn health(Extension(state): Extension<AppState>) -> Json<Value> {
    let result = state.runner().run(&args(&["info"])).await;
    Json(json!({
        "status": if result.succeeded { "healthy" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339(),
        "backendConnected": result.succeeded,
    }))
}

pub async fn server_info(Extension(state): Extension<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state.runner().run(&args(&["info"])).await;
    if !result.succeeded {
        return Err(collection_error("Failed to retrieve server info", result));
    }

    // `p4 info` emits one `Key: value` line per attribute.
    let mut info = Map::new();
    for line in result.output_text().lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                info.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
        }
    }

    Ok(envelope::ok(Value::Object(info)))
}

pub async fn list_files(
    Extension(state): Extension<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params = validate::check(&query_map(query), specs::FILE_LIST)?;
    let path = params.str_or("path", DEPOT_WILDCARD);
    let max = params.int_or("max", DEFAULT_MAX_FILES);

    let result = state
        .runner()
        .run(&args(&["files", "-m", &max.to_string(), &path]))
        .await;
    if !result.succeeded {
        return Err(collection_error("Failed to list files", result));
    }

    let raw = result.output_text();
    Ok(envelope::ok(json!({
        "rawOutput": raw,
        "count": non_blank_count(raw),
        "path": path,
    })))
}

pub async fn file_content(
    Extension(state): Extension<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params = validate::check(&query_map(query), specs::FILE_CONTENT)?;
    let path = require_str(&state, &params, "path")?;
    let revision = params.get_int("revision");

    let target = match revision {
        Some(rev) => format!("{path}#{rev}"),
        None => path.clone(),
    };

    let result = state.runner().run(&args(&["print", "-q", &target])).await;
    if !result.succeeded {
        return Err(lookup_error(format!("File not found: {path}"), result));
    }

    Ok(envelope::ok(json!({
        "path": path,
        "revision": revision,
        "content": result.output_text(),
    })))
}

pub async fn file_history(
    Extension(state): Extension<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params = validate::check(&query_map(query), specs::FILE_HISTORY)?;
    let path = require_str(&state, &params, "path")?;
    let max = params.int_or("max", DEFAULT_MAX_HISTORY);

    let result = state
        .runner()
        .run(&args(&["filelog", "-m", &max.to_string(), &path]))
        .await;
    if !result.succeeded {
        return Err(lookup_error(format!("History not found: {path}"), result));
    }

    Ok(envelope::ok(json!({
        "path": path,
        "history": result.output_text(),
    })))
}

pub async fn list_changes(
    Extension(state): Extension<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params = validate::check(&query_map(query), specs::CHANGE_LIST)?;
    let max = params.int_or("max", DEFAULT_MAX_CHANGES);

    let mut command = args(&["changes", "-m", &max.to_string()]);
    if let Some(status) = params.get_str("status") {
        command.push("-s".to_string());
        command.push(status.to_string());
    }
    if let Some(user) = params.get_str("user") {
        command.push("-u".to_string());
        command.push(user.to_string());
    }

    let result = state.runner().run(&command).await;
    if !result.succeeded {
        return Err(collection_error("Failed to list changes", result));
    }

    let raw = result.output_text();
    Ok(envelope::ok(json!({
        "rawOutput": raw,
        "count": non_blank_count(raw),
    })))
}

pub async fn change_detail(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let change_id: i64 = id.trim().parse().map_err(|_| {
        vec![FieldError {
            field: "id".to_string(),
            constraint: "integer".to_string(),
            message: "'id' must be an integer".to_string(),
        }]
    })?;

    let result = state
        .runner()
        .run(&args(&["describe", "-s", &change_id.to_string()]))
        .await;
    if !result.succeeded {
        return Err(lookup_error(format!("Change {change_id} not found"), result));
    }

    Ok(envelope::ok(json!({
        "changeId": change_id,
        "rawOutput": result.output_text(),
    })))
}

pub async fn list_users(Extension(state): Extension<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state.runner().run(&args(&["users"])).await;
    if !result.succeeded {
        return Err(collection_error("Failed to list users", result));
    }

    let raw = result.output_text();
    Ok(envelope::ok(json!({
        "rawOutput": raw,
        "count": non_blank_count(raw),
    })))
}

/// Sync deliberately reports `success: true` even when the backend
/// command failed: `p4 sync` uses the error channel for advisory
/// conditions such as "file(s) up-to-date", and those belong in the
/// normal result, not in an error envelope.
pub async fn sync_files(
    Extension(state): Extension<AppState>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ApiError> {
    let params = match body {
        Some(Json(Value::Object(map))) => map,
        _ => Map::new(),
    };
    let params = validate::check(&params, specs::SYNC)?;
    let path = params.str_or("path", DEPOT_WILDCARD);
    let force = params.bool_or("force", false);

    let mut command = args(&["sync"]);
    if force {
        command.push("-f".to_string());
    }
    command.push(path.clone());

    let result = state.runner().run(&command).await;
    let raw = if result.succeeded {
        result.output_text().to_string()
    } else {
        result.error_text().to_string()
    };

    Ok(envelope::ok(json!({
        "path": path,
        "rawOutput": raw,
        "forced": force,
    })))
}

/// Static capability listing.
pub async fn docs() -> Json<Value> {
    Json(json!({
        "name": "p4-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "REST gateway over the Perforce command-line client",
        "endpoints": [
            { "method": "GET", "path": "/health", "description": "Liveness and backend reachability" },
            { "method": "GET", "path": "/api/info", "description": "Backend server info as a key/value map" },
            { "method": "GET", "path": "/api/files", "description": "List depot files", "params": { "path": "optional depot path", "max": "1-1000, default 100" } },
            { "method": "GET", "path": "/api/files/content", "description": "Print file content", "params": { "path": "required depot path", "revision": "optional revision number" } },
            { "method": "GET", "path": "/api/files/history", "description": "File revision history", "params": { "path": "required depot path", "max": "1-100, default 10" } },
            { "method": "GET", "path": "/api/changes", "description": "List changes", "params": { "max": "1-100, default 20", "status": "pending|submitted", "user": "filter by user" } },
            { "method": "GET", "path": "/api/changes/:id", "description": "Describe one change" },
            { "method": "GET", "path": "/api/users", "description": "List backend users" },
            { "method": "POST", "path": "/api/sync", "description": "Sync a depot path", "body": { "path": "optional depot path", "force": "boolean, default false" } },
        ],
    }))
}

pub async fn unmatched(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": format!("Endpoint {} not found", uri.path()),
            "availableEndpoints": AVAILABLE_ENDPOINTS,
        })),
    )
}
