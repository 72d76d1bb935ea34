use std::env;
use std::path::PathBuf;

pub const DEFAULT_P4_PORT: &str = "localhost:1666";
pub const DEFAULT_P4_USER: &str = "admin";
pub const DEFAULT_P4_CLIENT: &str = "gateway-client";
pub const DEFAULT_P4_BIN: &str = "p4";

/// Connection settings for the backend CLI. Immutable after startup;
/// every spawned command inherits these through its environment.
#[derive(Debug, Clone)]
pub struct P4Config {
    /// Backend server address (`P4PORT`).
    pub port: String,
    /// Principal used for backend authentication (`P4USER`).
    pub user: String,
    /// Credential forwarded to the CLI (`P4PASSWD`). Never logged.
    password: String,
    /// Workspace/client name (`P4CLIENT`).
    pub client: String,
    /// Binary to invoke, normally `p4`.
    pub binary: String,
    /// Working directory for spawned commands (workspace root).
    pub workspace_root: PathBuf,
}

impl P4Config {
    pub fn from_env() -> Self {
        let workspace_root = env::var("P4_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .or_else(|_| env::current_dir())
            .unwrap_or_else(|_| PathBuf::from("."));

        Self {
            port: env_or("P4PORT", DEFAULT_P4_PORT),
            user: env_or("P4USER", DEFAULT_P4_USER),
            password: env::var("P4PASSWD").unwrap_or_default(),
            client: env_or("P4CLIENT", DEFAULT_P4_CLIENT),
            binary: env_or("P4_BIN", DEFAULT_P4_BIN),
            workspace_root,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = root;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Environment entries injected into every backend invocation.
    pub fn backend_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("P4PORT", self.port.clone()),
            ("P4USER", self.user.clone()),
            ("P4PASSWD", self.password.clone()),
            ("P4CLIENT", self.client.clone()),
        ]
    }

    /// Loggable summary with the credential masked.
    pub fn redacted_summary(&self) -> String {
        format!(
            "P4PORT={} P4USER={} P4CLIENT={} P4PASSWD={}",
            self.port,
            self.user,
            self.client,
            if self.password.is_empty() { "<unset>" } else { "***" }
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}
