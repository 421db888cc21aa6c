//! Upstream feed configuration.

use serde::{Deserialize, Serialize};

/// Open-data API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Resource base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key (usually supplied through `MANDI__FEED__API_KEY`).
    #[serde(default)]
    pub api_key: String,
    /// Resource serving today's prices.
    #[serde(default = "default_live_resource")]
    pub live_resource: String,
    /// Resource serving the per-date archive.
    #[serde(default = "default_daily_resource")]
    pub daily_resource: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Record limit for a single market query.
    #[serde(default = "default_market_limit")]
    pub market_limit: usize,
    /// Record limit for a whole-state daily archive query.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: usize,
}

fn default_base_url() -> String {
    "https://api.data.gov.in/resource".to_string()
}

fn default_live_resource() -> String {
    "9ef84268-d588-465a-a308-a864a43d0070".to_string()
}

fn default_daily_resource() -> String {
    "35985678-0d79-46b4-9ed6-6f13308a1d24".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_market_limit() -> usize {
    3000
}

fn default_daily_limit() -> usize {
    3000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            live_resource: default_live_resource(),
            daily_resource: default_daily_resource(),
            timeout_secs: default_timeout_secs(),
            market_limit: default_market_limit(),
            daily_limit: default_daily_limit(),
        }
    }
}
