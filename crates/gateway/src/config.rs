use std::env;

pub const DEFAULT_PORT: u16 = 3000;

/// Runtime mode gates how much internal error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    Production,
}

impl RuntimeMode {
    pub fn from_env() -> Self {
        Self::parse(&env::var("GATEWAY_MODE").unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "development" | "dev" => RuntimeMode::Development,
            _ => RuntimeMode::Production,
        }
    }
}

pub fn port_from_env() -> Option<u16> {
    env::var("GATEWAY_PORT").ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_defaults_to_production() {
        assert_eq!(RuntimeMode::parse("dev"), RuntimeMode::Development);
        assert_eq!(RuntimeMode::parse("development"), RuntimeMode::Development);
        assert_eq!(RuntimeMode::parse("staging"), RuntimeMode::Production);
        assert_eq!(RuntimeMode::parse(""), RuntimeMode::Production);
    }
}
