use crate::TradingMode;

/// Process-level configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
///
/// Trading parameters live in the TOML file named by `engine_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Database
    pub database_url: String,
    pub truncate_on_startup: bool,

    // Engine parameters file
    pub engine_config_path: String,

    // Bar feed (broker proxy or local mock server)
    pub bar_source_url: String,

    // Broker, required in live mode only
    pub broker_api_url: String,
    pub broker_api_key: Option<String>,
    pub broker_access_token: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        let (broker_api_key, broker_access_token) = match trading_mode {
            TradingMode::Live => (
                Some(required_env("BROKER_API_KEY")),
                Some(required_env("BROKER_ACCESS_TOKEN")),
            ),
            TradingMode::Paper => (optional_env("BROKER_API_KEY"), optional_env("BROKER_ACCESS_TOKEN")),
        };

        Config {
            trading_mode,
            database_url: required_env("DATABASE_URL"),
            truncate_on_startup: optional_env("TRUNCATE_ON_STARTUP")
                .map(|v| parse_bool("TRUNCATE_ON_STARTUP", &v))
                .unwrap_or(true),
            engine_config_path: optional_env("TRAILBOT_CONFIG")
                .unwrap_or_else(|| "config/trailbot.toml".to_string()),
            bar_source_url: optional_env("BAR_SOURCE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            broker_api_url: optional_env("BROKER_API_URL")
                .unwrap_or_else(|| "https://api.kite.trade".to_string()),
            broker_api_key,
            broker_access_token,
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_bool(key: &str, value: &str) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        other => panic!("{key} must be a boolean, got: '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn bool_flags_accept_common_spellings() {
        assert!(parse_bool("X", "TRUE"));
        assert!(parse_bool("X", "1"));
        assert!(!parse_bool("X", "no"));
    }

    #[test]
    #[should_panic(expected = "must be a boolean")]
    fn bool_flags_reject_garbage() {
        parse_bool("X", "maybe");
    }
}
