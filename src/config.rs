//! Process configuration from environment variables. None of these alter
//! matching semantics; they only shape the serving surface.

/// Runtime configuration.
///
/// | Variable          | Default | Meaning                          |
/// |-------------------|---------|----------------------------------|
/// | `PORT`            | 8080    | HTTP listen port                 |
/// | `METRICS_ENABLED` | true    | mount `/metrics*` endpoints      |
/// | `WS_ENABLED`      | true    | mount the `/ws/{symbol}` endpoint |
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub metrics_enabled: bool,
    pub ws_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080),
            metrics_enabled: env_bool("METRICS_ENABLED", true),
            ws_enabled: env_bool("WS_ENABLED", true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            metrics_enabled: true,
            ws_enabled: true,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => parse_bool(&value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
