use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,
    pub odds_json_path: String,
    pub scrape_interval_seconds: u64,
    pub arbitrage_threshold: f64,
    pub value_bet_threshold: f64,
    /// The bookmaker whose raw names define canonical team names; the only
    /// source allowed to auto-create teams. Stored lowercased.
    pub primary_bookmaker: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let server_port = port_str.parse().unwrap_or_else(|_| {
            eprintln!("Warning: Invalid PORT '{}', defaulting to 8080", port_str);
            8080
        });

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            storage_url: env::var("STORAGE_URL").unwrap_or_default(),
            storage_service_key: env::var("STORAGE_SERVICE_KEY").unwrap_or_default(),
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "odds-data".to_string()),
            odds_json_path: env::var("ODDS_JSON_PATH").unwrap_or_else(|_| "odds.json".to_string()),
            scrape_interval_seconds: parse_env("SCRAPE_INTERVAL_SECONDS", 30),
            arbitrage_threshold: parse_env("ARBITRAGE_THRESHOLD", 1.0),
            value_bet_threshold: parse_env("VALUE_BET_THRESHOLD", 10.0),
            primary_bookmaker: env::var("PRIMARY_BOOKMAKER")
                .expect("PRIMARY_BOOKMAKER must be set")
                .trim()
                .to_lowercase(),
            server_port,
        }
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
