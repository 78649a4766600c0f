use std::env;

/// Secrets loaded from environment variables. Tunables live in the TOML
/// config (`file_config`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub apify_token: String,
    pub anthropic_api_key: String,
}

impl Config {
    /// Load configuration for the scrape stage.
    /// Panics with a clear message if required vars are missing.
    pub fn scrape_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            apify_token: required_env("APIFY_TOKEN"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
        }
    }

    /// Load configuration for the enrichment stage.
    pub fn enrich_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            apify_token: env::var("APIFY_TOKEN").unwrap_or_default(),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
        }
    }

    /// Load a minimal config for store-only stages (seed, unify, score, stats)
    /// which need no external API keys.
    pub fn store_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            apify_token: env::var("APIFY_TOKEN").unwrap_or_default(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
