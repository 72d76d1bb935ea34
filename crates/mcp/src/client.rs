//! HTTP client for the REST gateway, plus the one place that parses
//! backend listing text.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use mcp_core::{ToolError, ToolResult};

/// Narrow surface the tools depend on; tests substitute a stub.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn info(&self) -> ToolResult<Value>;
    async fn files(&self, path: Option<&str>, max: Option<i64>) -> ToolResult<Value>;
    async fn file_content(&self, path: &str, revision: Option<i64>) -> ToolResult<Value>;
    async fn file_history(&self, path: &str, max: Option<i64>) -> ToolResult<Value>;
    async fn changes(
        &self,
        max: Option<i64>,
        status: Option<&str>,
        user: Option<&str>,
    ) -> ToolResult<Value>;
    async fn change_detail(&self, id: i64) -> ToolResult<Value>;
    async fn users(&self) -> ToolResult<Value>;
    async fn sync(&self, path: Option<&str>, force: bool) -> ToolResult<Value>;
}

pub struct HttpGateway {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> ToolResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ToolError::Internal(format!("http client error: {err}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ToolResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "gateway GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| ToolError::Gateway(format!("gateway unreachable: {err}")))?;
        Self::unwrap_envelope(response).await
    }

    async fn post(&self, path: &str, body: Value) -> ToolResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "gateway POST");
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ToolError::Gateway(format!("gateway unreachable: {err}")))?;
        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope(response: reqwest::Response) -> ToolResult<Value> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| ToolError::Gateway(format!("invalid gateway response: {err}")))?;
        envelope_data(status, body)
    }
}

/// Map a gateway envelope to the tool error taxonomy: 404 stays a
/// not-found, 400 a parameter problem, everything else a gateway fault.
fn envelope_data(status: StatusCode, body: Value) -> ToolResult<Value> {
    if body.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("gateway request failed");
    let detail = body.get("error").and_then(Value::as_str).unwrap_or("");
    let combined = if detail.is_empty() {
        message.to_string()
    } else {
        format!("{message}: {detail}")
    };

    match status {
        StatusCode::NOT_FOUND => Err(ToolError::NotFound(combined)),
        StatusCode::BAD_REQUEST => Err(ToolError::InvalidParams(combined)),
        _ => Err(ToolError::Gateway(combined)),
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn info(&self) -> ToolResult<Value> {
        self.get("/api/info", &[]).await
    }

    async fn files(&self, path: Option<&str>, max: Option<i64>) -> ToolResult<Value> {
        let mut query = Vec::new();
        if let Some(path) = path {
            query.push(("path", path.to_string()));
        }
        if let Some(max) = max {
            query.push(("max", max.to_string()));
        }
        self.get("/api/files", &query).await
    }

    async fn file_content(&self, path: &str, revision: Option<i64>) -> ToolResult<Value> {
        let mut query = vec![("path", path.to_string())];
        if let Some(revision) = revision {
            query.push(("revision", revision.to_string()));
        }
        self.get("/api/files/content", &query).await
    }

    async fn file_history(&self, path: &str, max: Option<i64>) -> ToolResult<Value> {
        let mut query = vec![("path", path.to_string())];
        if let Some(max) = max {
            query.push(("max", max.to_string()));
        }
        self.get("/api/files/history", &query).await
    }

    async fn changes(
        &self,
        max: Option<i64>,
        status: Option<&str>,
        user: Option<&str>,
    ) -> ToolResult<Value> {
        let mut query = Vec::new();
        if let Some(max) = max {
            query.push(("max", max.to_string()));
        }
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        if let Some(user) = user {
            query.push(("user", user.to_string()));
        }
        self.get("/api/changes", &query).await
    }

    async fn change_detail(&self, id: i64) -> ToolResult<Value> {
        self.get(&format!("/api/changes/{id}"), &[]).await
    }

    async fn users(&self) -> ToolResult<Value> {
        self.get("/api/users", &[]).await
    }

    async fn sync(&self, path: Option<&str>, force: bool) -> ToolResult<Value> {
        let mut body = json!({ "force": force });
        if let Some(path) = path {
            body["path"] = Value::String(path.to_string());
        }
        self.post("/api/sync", body).await
    }
}

/// Extract change identifiers from `p4 changes` listing text.
///
/// The coupling to the backend's line format lives here and nowhere
/// else; a format change touches only this function.
pub fn parse_change_ids(raw: &str) -> Vec<i64> {
    static CHANGE_LINE: OnceLock<Regex> = OnceLock::new();
    let pattern = CHANGE_LINE
        .get_or_init(|| Regex::new(r"^Change\s+(\d+)").expect("static change-line pattern"));

    raw.lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1))
        .filter_map(|id| id.as_str().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_from_listing_lines() {
        let raw = "Change 312 on 2024/05/01 by alice@ws 'tune cache'\n\
                   Change 310 on 2024/04/28 by bob@ws 'fix build'\n\
                   \n\
                   Change 9 on 2024/01/01 by carol@ws 'initial'";
        assert_eq!(parse_change_ids(raw), vec![312, 310, 9]);
    }

    #[test]
    fn ignores_indented_and_unrelated_lines() {
        let raw = "  Change 55 indented does not count\n\
                   Submitted by alice\n\
                   Change abc not numeric";
        assert!(parse_change_ids(raw).is_empty());
    }

    #[test]
    fn envelope_success_yields_data() {
        let body = serde_json::json!({ "success": true, "data": { "count": 2 } });
        let data = envelope_data(StatusCode::OK, body).unwrap();
        assert_eq!(data["count"], 2);
    }

    #[test]
    fn envelope_404_becomes_not_found() {
        let body = serde_json::json!({
            "success": false,
            "message": "Change 999999 not found",
            "error": "Change 999999 unknown.",
        });
        match envelope_data(StatusCode::NOT_FOUND, body) {
            Err(ToolError::NotFound(message)) => assert!(message.contains("999999")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn envelope_500_becomes_gateway_error() {
        let body = serde_json::json!({ "success": false, "message": "Failed to list users" });
        assert!(matches!(
            envelope_data(StatusCode::INTERNAL_SERVER_ERROR, body),
            Err(ToolError::Gateway(_))
        ));
    }
}
