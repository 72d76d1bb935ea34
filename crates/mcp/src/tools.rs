//! Fixed tool catalog mapping MCP calls onto the REST gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use mcp_core::{text_result, Tool, ToolError, ToolResult};

use crate::client::{parse_change_ids, Gateway};

pub const DEFAULT_SCAN_CHANGES: i64 = 10;
pub const DEFAULT_SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "secret",
    "credential",
    "token",
    "api_key",
    "private key",
];

/// All gateway-backed tools, in catalog order.
pub fn default_tools(gateway: Arc<dyn Gateway>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ServerInfoTool::new(Arc::clone(&gateway))),
        Arc::new(ListFilesTool::new(Arc::clone(&gateway))),
        Arc::new(FileContentTool::new(Arc::clone(&gateway))),
        Arc::new(FileHistoryTool::new(Arc::clone(&gateway))),
        Arc::new(ListChangesTool::new(Arc::clone(&gateway))),
        Arc::new(ChangeDetailsTool::new(Arc::clone(&gateway))),
        Arc::new(ListUsersTool::new(Arc::clone(&gateway))),
        Arc::new(SyncFilesTool::new(Arc::clone(&gateway))),
        Arc::new(SensitiveScanTool::new(gateway)),
    ]
}

fn opt_str(params: &Value, key: &str) -> ToolResult<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ToolError::InvalidParams(format!("'{key}' must be a string"))),
    }
}

fn req_str(params: &Value, key: &str) -> ToolResult<String> {
    match opt_str(params, key)? {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ToolError::InvalidParams(format!("'{key}' is required"))),
    }
}

fn opt_int(params: &Value, key: &str) -> ToolResult<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidParams(format!("'{key}' must be an integer"))),
    }
}

fn opt_bool(params: &Value, key: &str) -> ToolResult<Option<bool>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(ToolError::InvalidParams(format!(
            "'{key}' must be a boolean"
        ))),
    }
}

fn opt_str_list(params: &Value, key: &str) -> ToolResult<Option<Vec<String>>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ToolError::InvalidParams(format!("'{key}' must be an array of strings"))
                })
            })
            .collect::<ToolResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(ToolError::InvalidParams(format!(
            "'{key}' must be an array of strings"
        ))),
    }
}

fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn int_field(data: &Value, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or_default()
}

pub struct ServerInfoTool {
    gateway: Arc<dyn Gateway>,
}

impl ServerInfoTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ServerInfoTool {
    fn name(&self) -> &str {
        "get_server_info"
    }

    fn description(&self) -> &str {
        "Retrieve Perforce server information (version, address, uptime)"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _params: Value) -> ToolResult<Value> {
        let data = self.gateway.info().await?;
        let mut lines = vec!["Perforce server info:".to_string()];
        if let Some(map) = data.as_object() {
            for (key, value) in map {
                lines.push(format!("  {}: {}", key, value.as_str().unwrap_or_default()));
            }
        }
        Ok(text_result(lines.join("\n")))
    }
}

pub struct ListFilesTool {
    gateway: Arc<dyn Gateway>,
}

impl ListFilesTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List depot files under a path"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Depot path, defaults to //depot/..." },
                "max": { "type": "integer", "minimum": 1, "maximum": 1000 }
            }
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let path = opt_str(&params, "path")?;
        let max = opt_int(&params, "max")?;
        let data = self.gateway.files(path.as_deref(), max).await?;
        Ok(text_result(format!(
            "Found {} file(s) under {}:\n\n{}",
            int_field(&data, "count"),
            str_field(&data, "path"),
            str_field(&data, "rawOutput"),
        )))
    }
}

pub struct FileContentTool {
    gateway: Arc<dyn Gateway>,
}

impl FileContentTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for FileContentTool {
    fn name(&self) -> &str {
        "get_file_content"
    }

    fn description(&self) -> &str {
        "Print the content of a depot file, optionally at a revision"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "revision": { "type": "integer" }
            },
            "required": ["path"]
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let path = req_str(&params, "path")?;
        let revision = opt_int(&params, "revision")?;
        let data = self.gateway.file_content(&path, revision).await?;
        let label = match revision {
            Some(rev) => format!("{path}#{rev}"),
            None => format!("{path} (head)"),
        };
        Ok(text_result(format!(
            "Content of {}:\n\n{}",
            label,
            str_field(&data, "content"),
        )))
    }
}

pub struct FileHistoryTool {
    gateway: Arc<dyn Gateway>,
}

impl FileHistoryTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for FileHistoryTool {
    fn name(&self) -> &str {
        "get_file_history"
    }

    fn description(&self) -> &str {
        "Show the revision history of a depot file"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "max": { "type": "integer", "minimum": 1, "maximum": 100 }
            },
            "required": ["path"]
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let path = req_str(&params, "path")?;
        let max = opt_int(&params, "max")?;
        let data = self.gateway.file_history(&path, max).await?;
        Ok(text_result(format!(
            "Revision history for {}:\n\n{}",
            path,
            str_field(&data, "history"),
        )))
    }
}

pub struct ListChangesTool {
    gateway: Arc<dyn Gateway>,
}

impl ListChangesTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ListChangesTool {
    fn name(&self) -> &str {
        "list_changes"
    }

    fn description(&self) -> &str {
        "List recent changes, optionally filtered by status or user"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max": { "type": "integer", "minimum": 1, "maximum": 100 },
                "status": { "type": "string", "enum": ["pending", "submitted"] },
                "user": { "type": "string" }
            }
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let max = opt_int(&params, "max")?;
        let status = opt_str(&params, "status")?;
        let user = opt_str(&params, "user")?;
        let data = self
            .gateway
            .changes(max, status.as_deref(), user.as_deref())
            .await?;
        Ok(text_result(format!(
            "Found {} change(s):\n\n{}",
            int_field(&data, "count"),
            str_field(&data, "rawOutput"),
        )))
    }
}

pub struct ChangeDetailsTool {
    gateway: Arc<dyn Gateway>,
}

impl ChangeDetailsTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ChangeDetailsTool {
    fn name(&self) -> &str {
        "get_change_details"
    }

    fn description(&self) -> &str {
        "Describe one change by its numeric identifier"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "changeId": { "type": "integer" }
            },
            "required": ["changeId"]
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let change_id = opt_int(&params, "changeId")?
            .ok_or_else(|| ToolError::InvalidParams("'changeId' is required".to_string()))?;
        let data = self.gateway.change_detail(change_id).await?;
        Ok(text_result(format!(
            "Change {}:\n\n{}",
            change_id,
            str_field(&data, "rawOutput"),
        )))
    }
}

pub struct ListUsersTool {
    gateway: Arc<dyn Gateway>,
}

impl ListUsersTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ListUsersTool {
    fn name(&self) -> &str {
        "list_users"
    }

    fn description(&self) -> &str {
        "List users known to the backend"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _params: Value) -> ToolResult<Value> {
        let data = self.gateway.users().await?;
        Ok(text_result(format!(
            "{} user(s):\n\n{}",
            int_field(&data, "count"),
            str_field(&data, "rawOutput"),
        )))
    }
}

pub struct SyncFilesTool {
    gateway: Arc<dyn Gateway>,
}

impl SyncFilesTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for SyncFilesTool {
    fn name(&self) -> &str {
        "sync_files"
    }

    fn description(&self) -> &str {
        "Sync a depot path into the gateway workspace"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Depot path, defaults to //depot/..." },
                "force": { "type": "boolean", "default": false }
            }
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let path = opt_str(&params, "path")?;
        let force = opt_bool(&params, "force")?.unwrap_or(false);
        let data = self.gateway.sync(path.as_deref(), force).await?;
        Ok(text_result(format!(
            "Sync result for {} (forced: {}):\n\n{}",
            str_field(&data, "path"),
            data.get("forced").and_then(Value::as_bool).unwrap_or(force),
            str_field(&data, "rawOutput"),
        )))
    }
}

/// Composite read-only scan: list recent changes, fetch each detail,
/// and report which descriptions mention any sensitive keyword.
pub struct SensitiveScanTool {
    gateway: Arc<dyn Gateway>,
}

impl SensitiveScanTool {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for SensitiveScanTool {
    fn name(&self) -> &str {
        "analyze_sensitive_changes"
    }

    fn description(&self) -> &str {
        "Scan recent change descriptions for sensitive keywords (read-only)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "maxChanges": { "type": "integer", "minimum": 1, "maximum": 100, "default": DEFAULT_SCAN_CHANGES },
                "keywords": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Case-insensitive substrings to look for"
                }
            }
        })
    }

    async fn call(&self, params: Value) -> ToolResult<Value> {
        let max_changes = opt_int(&params, "maxChanges")?.unwrap_or(DEFAULT_SCAN_CHANGES);
        if !(1..=100).contains(&max_changes) {
            return Err(ToolError::InvalidParams(
                "'maxChanges' must be between 1 and 100".to_string(),
            ));
        }
        let keywords = opt_str_list(&params, "keywords")?.unwrap_or_else(|| {
            DEFAULT_SENSITIVE_KEYWORDS
                .iter()
                .map(|kw| kw.to_string())
                .collect()
        });
        let keywords: Vec<String> = keywords.iter().map(|kw| kw.to_lowercase()).collect();

        let listing = self.gateway.changes(Some(max_changes), None, None).await?;
        let ids = parse_change_ids(str_field(&listing, "rawOutput"));

        let mut flagged: Vec<(i64, Vec<String>)> = Vec::new();
        for id in &ids {
            // A change submitted between the listing and the detail
            // fetch can vanish; skip it rather than failing the scan.
            let detail = match self.gateway.change_detail(*id).await {
                Ok(detail) => detail,
                Err(ToolError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let text = str_field(&detail, "rawOutput").to_lowercase();
            let hits: Vec<String> = keywords
                .iter()
                .filter(|kw| text.contains(kw.as_str()))
                .cloned()
                .collect();
            if !hits.is_empty() {
                flagged.push((*id, hits));
            }
        }

        info!(
            scanned = ids.len(),
            flagged = flagged.len(),
            "sensitive-content scan finished"
        );

        let mut lines = vec![format!(
            "Scanned {} change(s); {} flagged for sensitive content.",
            ids.len(),
            flagged.len(),
        )];
        if flagged.is_empty() {
            lines.push("No changes flagged.".to_string());
        } else {
            lines.push(String::new());
            for (id, hits) in &flagged {
                lines.push(format!("Change {}: matches {}", id, hits.join(", ")));
            }
        }

        Ok(text_result(lines.join("\n")))
    }
}
