//! HTTP client for the open-data price API.

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::parser::parse_records;
use crate::source::{BoxFuture, FeedScope, LiveFeedClient};
use chrono::NaiveDate;
use mandi_core::LiveRecord;
use mandi_telemetry::Metrics;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Client for the data.gov.in resource API.
pub struct DataGovClient {
    client: Client,
    config: FeedConfig,
}

impl DataGovClient {
    /// Create a new client. Every request is bounded by `config.timeout_secs`.
    pub fn new(config: FeedConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Query parameters for the live resource.
    fn live_params(&self, scope: &FeedScope) -> Vec<(&'static str, String)> {
        let mut params = self.base_params(scope.limit.unwrap_or(self.config.market_limit));
        if let Some(state) = &scope.state {
            params.push(("filters[state.keyword]", state.clone()));
        }
        if let Some(district) = &scope.district {
            params.push(("filters[district]", district.clone()));
        }
        if let Some(market) = &scope.market {
            params.push(("filters[market]", market.clone()));
        }
        params
    }

    /// Query parameters for the daily archive resource.
    fn daily_params(&self, state: &str, date: NaiveDate) -> Vec<(&'static str, String)> {
        let mut params = self.base_params(self.config.daily_limit);
        params.push(("filters[State]", state.to_string()));
        params.push(("filters[Arrival_Date]", date.format("%d-%m-%Y").to_string()));
        params
    }

    fn base_params(&self, limit: usize) -> Vec<(&'static str, String)> {
        vec![
            ("api-key", self.config.api_key.clone()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ]
    }

    /// Fetch one resource and record its latency or failure under `kind`.
    async fn get(
        &self,
        kind: &'static str,
        resource: &str,
        params: Vec<(&'static str, String)>,
    ) -> FeedResult<Vec<LiveRecord>> {
        let started = Instant::now();
        let result = self.request(resource, params).await;
        match &result {
            Ok(_) => Metrics::upstream_latency(kind, started.elapsed().as_secs_f64() * 1000.0),
            Err(_) => Metrics::upstream_failure(kind),
        }
        result
    }

    async fn request(
        &self,
        resource: &str,
        params: Vec<(&'static str, String)>,
    ) -> FeedResult<Vec<LiveRecord>> {
        if self.config.api_key.is_empty() {
            return Err(FeedError::NotConfigured("api_key is empty".to_string()));
        }

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), resource);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let records = parse_records(&body)?;

        debug!(
            resource,
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched upstream records"
        );

        Ok(records)
    }

    fn map_send_error(&self, e: reqwest::Error) -> FeedError {
        if e.is_timeout() {
            FeedError::Timeout(self.config.timeout_secs)
        } else {
            FeedError::Http(format!("HTTP request failed: {e}"))
        }
    }
}

impl LiveFeedClient for DataGovClient {
    fn fetch_live(&self, scope: FeedScope) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>> {
        Box::pin(async move {
            info!(
                state = ?scope.state,
                district = ?scope.district,
                market = ?scope.market,
                "Fetching live prices"
            );
            let params = self.live_params(&scope);
            self.get("live", &self.config.live_resource, params).await
        })
    }

    fn fetch_daily(
        &self,
        state: String,
        date: NaiveDate,
    ) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>> {
        Box::pin(async move {
            info!(%state, %date, "Fetching daily archive prices");
            let params = self.daily_params(&state, date);
            self.get("daily", &self.config.daily_resource, params).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DataGovClient {
        DataGovClient::new(FeedConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_live_params() {
        let params = client().live_params(&FeedScope::market("Gujarat", "Rajkot", "Gondal"));
        assert!(params.contains(&("api-key", "test-key".to_string())));
        assert!(params.contains(&("limit", "3000".to_string())));
        assert!(params.contains(&("filters[state.keyword]", "Gujarat".to_string())));
        assert!(params.contains(&("filters[market]", "Gondal".to_string())));
    }

    #[test]
    fn test_live_params_limit_override() {
        let params = client().live_params(&FeedScope::state("Gujarat").with_limit(2000));
        assert!(params.contains(&("limit", "2000".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "filters[market]"));
    }

    #[test]
    fn test_daily_params_date_format() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let params = client().daily_params("Gujarat", date);
        assert!(params.contains(&("filters[Arrival_Date]", "10-02-2024".to_string())));
        assert!(params.contains(&("filters[State]", "Gujarat".to_string())));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let client = DataGovClient::new(FeedConfig::default()).unwrap();
        let err = client
            .fetch_live(FeedScope::state("Gujarat"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::NotConfigured(_)));
    }
}
