use crate::TradingMode;

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    /// Contract symbol, e.g. "BTC_USDT".
    pub symbol: String,
    /// Operating seed in USDT; drives base-unit sizing and the daily
    /// volume target.
    pub seed_usdt: f64,
    /// Exchange UID, checked against the whitelist before anything starts.
    pub uid: String,
    /// Whitelisted UIDs. Empty list disables the gate.
    pub allowed_uids: Vec<String>,

    pub trading_mode: TradingMode,
    /// Base URL of the UI-automation driver (live mode only).
    pub driver_url: String,

    pub poll_interval_ms: u64,
    pub journal_path: String,
    pub strategy_config_path: String,
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

        let seed_usdt: f64 = required_env("SEED_USDT").parse().unwrap_or_else(|_| {
            panic!("SEED_USDT must be a number")
        });
        if seed_usdt <= 0.0 {
            panic!("SEED_USDT must be positive, got {seed_usdt}");
        }

        let driver_url = match trading_mode {
            TradingMode::Live => required_env("DRIVER_URL"),
            TradingMode::Paper => optional_env("DRIVER_URL").unwrap_or_default(),
        };

        let allowed_uids = optional_env("ALLOWED_UIDS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Config {
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTC_USDT".to_string()),
            seed_usdt,
            uid: required_env("EXCHANGE_UID"),
            allowed_uids,
            trading_mode,
            driver_url,
            poll_interval_ms: optional_env("POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            journal_path: optional_env("JOURNAL_PATH")
                .unwrap_or_else(|| "trading_journal.csv".to_string()),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
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
