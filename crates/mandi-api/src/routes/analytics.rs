//! Market analytics, commodity trends and comparisons.

use super::success;
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use mandi_analytics::{AnalyticsError, AnalyticsResult};
use mandi_core::{CommodityId, MarketId};
use mandi_registry::MarketFilter;
use mandi_telemetry::Metrics;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub(crate) struct DaysQuery {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompareQuery {
    commodity_id: Option<CommodityId>,
    market_id_a: Option<MarketId>,
    market_id_b: Option<MarketId>,
    days: Option<u32>,
}

/// Count the request under `endpoint` and convert the error.
fn observe<T>(endpoint: &str, result: AnalyticsResult<T>) -> ApiResult<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(AnalyticsError::NotFound { .. }) => "not_found",
        Err(AnalyticsError::InvalidWindow(_)) => "invalid",
        Err(AnalyticsError::Upstream(_)) => "upstream",
    };
    Metrics::analytics_request(endpoint, outcome);
    result.map_err(ApiError::from)
}

pub(crate) async fn list_markets(
    State(state): State<ApiState>,
    Query(filter): Query<MarketFilter>,
) -> impl IntoResponse {
    let markets = state.analytics.list_markets(&filter);
    Metrics::analytics_request("markets", "ok");
    success(json!({
        "count": markets.len(),
        "markets": markets,
    }))
}

pub(crate) async fn market_analytics(
    State(state): State<ApiState>,
    Path(market_id): Path<MarketId>,
) -> ApiResult<impl IntoResponse> {
    let report = observe(
        "market",
        state
            .analytics
            .market_analytics(market_id, state.today())
            .await,
    )?;
    Ok(success(report))
}

pub(crate) async fn commodity_analytics(
    State(state): State<ApiState>,
    Path((market_id, commodity_id)): Path<(MarketId, CommodityId)>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<impl IntoResponse> {
    let report = observe(
        "commodity",
        state
            .analytics
            .commodity_analytics(market_id, commodity_id, query.days, state.today())
            .await,
    )?;
    Ok(success(report))
}

pub(crate) async fn compare(
    State(state): State<ApiState>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<impl IntoResponse> {
    let (Some(commodity), Some(a), Some(b)) =
        (query.commodity_id, query.market_id_a, query.market_id_b)
    else {
        Metrics::analytics_request("compare", "invalid");
        return Err(ApiError::bad_request(
            "Missing required parameters: commodityId, marketIdA, marketIdB",
        ));
    };
    let report = observe(
        "compare",
        state
            .analytics
            .compare(commodity, a, b, query.days, state.today())
            .await,
    )?;
    Ok(success(report))
}
