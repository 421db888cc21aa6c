//! Upstream payload parsing.
//!
//! The open-data API serves two resource shapes:
//! 1. Live resource: lower-case keys (`state`, `modal_price`, ...)
//! 2. Daily archive resource: capitalised keys (`State`, `Modal_Price`,
//!    `Commodity_Code`, ...)
//!
//! Price fields arrive as strings, occasionally as numbers, and are
//! sometimes missing. Both shapes deserialize into `RawPriceRecord`.

use crate::error::{FeedError, FeedResult};
use mandi_core::{parse_arrival_date, LiveRecord, ParsedPriceFields};
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Top-level response of the open-data API.
#[derive(Debug, Deserialize)]
pub struct UpstreamEnvelope {
    #[serde(default)]
    pub records: Vec<RawPriceRecord>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    /// Present when the API rejects the request with a 200 status.
    #[serde(default)]
    pub error: Option<String>,
}

/// One raw upstream price record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPriceRecord {
    #[serde(default, alias = "State", deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, alias = "District", deserialize_with = "lenient_string")]
    pub district: Option<String>,
    #[serde(default, alias = "Market", deserialize_with = "lenient_string")]
    pub market: Option<String>,
    #[serde(default, alias = "Commodity", deserialize_with = "lenient_string")]
    pub commodity: Option<String>,
    #[serde(default, alias = "Commodity_Code", deserialize_with = "lenient_string")]
    pub commodity_code: Option<String>,
    #[serde(default, alias = "Variety", deserialize_with = "lenient_string")]
    pub variety: Option<String>,
    #[serde(default, alias = "Grade", deserialize_with = "lenient_string")]
    pub grade: Option<String>,
    #[serde(default, alias = "Arrival_Date", deserialize_with = "lenient_string")]
    pub arrival_date: Option<String>,
    #[serde(default, alias = "Min_Price", deserialize_with = "lenient_string")]
    pub min_price: Option<String>,
    #[serde(default, alias = "Max_Price", deserialize_with = "lenient_string")]
    pub max_price: Option<String>,
    #[serde(default, alias = "Modal_Price", deserialize_with = "lenient_string")]
    pub modal_price: Option<String>,
}

/// Accept a string, a number, or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn clean(name: Option<String>) -> String {
    name.map(|s| s.trim().to_string()).unwrap_or_default()
}

impl RawPriceRecord {
    /// Convert into a `LiveRecord`, tagging unparsable prices instead of dropping them.
    pub fn into_live_record(self) -> LiveRecord {
        let prices = ParsedPriceFields::parse(
            self.min_price.as_deref(),
            self.max_price.as_deref(),
            self.modal_price.as_deref(),
        );
        if let ParsedPriceFields::Invalid { reason, .. } = &prices {
            debug!(
                market = ?self.market,
                commodity = ?self.commodity,
                %reason,
                "Upstream record has invalid price fields"
            );
        }

        let arrival_date_raw = clean(self.arrival_date);
        let arrival_date = parse_arrival_date(&arrival_date_raw).ok();

        LiveRecord {
            state: clean(self.state),
            district: clean(self.district),
            market: clean(self.market),
            commodity: clean(self.commodity),
            variety: clean(self.variety),
            grade: clean(self.grade),
            commodity_code: self
                .commodity_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            arrival_date_raw,
            arrival_date,
            prices,
        }
    }
}

/// Parse an upstream JSON body into live records.
pub fn parse_records(body: &str) -> FeedResult<Vec<LiveRecord>> {
    let envelope: UpstreamEnvelope =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Err(FeedError::Decode(format!("upstream error: {error}")));
    }

    Ok(envelope
        .records
        .into_iter()
        .map(RawPriceRecord::into_live_record)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mandi_core::Price;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_live_shape() {
        let body = r#"{
            "total": 1, "count": 1,
            "records": [{
                "state": "Gujarat", "district": "Rajkot", "market": "Rajkot",
                "commodity": "Wheat", "variety": "Lokwan", "grade": "FAQ",
                "arrival_date": "05/03/2024",
                "min_price": "1900", "max_price": "2200", "modal_price": "2100"
            }]
        }"#;
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.market, "Rajkot");
        assert_eq!(r.arrival_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(r.prices.modal_price(), Some(Price::new(dec!(2100))));
        assert!(r.prices.is_valid());
    }

    #[test]
    fn test_parse_archive_shape_with_numbers() {
        let body = r#"{
            "records": [{
                "State": "Gujarat", "District": "Amreli", "Market": "Amreli",
                "Commodity": "Cotton", "Commodity_Code": "15",
                "Variety": "Other", "Grade": "FAQ",
                "Arrival_Date": "10-02-2024",
                "Min_Price": 6000, "Max_Price": 7000, "Modal_Price": 6500.5
            }]
        }"#;
        let records = parse_records(body).unwrap();
        let r = &records[0];
        assert_eq!(r.commodity_code.as_deref(), Some("15"));
        assert_eq!(r.arrival_date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(r.prices.modal_price(), Some(Price::new(dec!(6500.5))));
    }

    #[test]
    fn test_parse_missing_prices_are_tagged() {
        let body = r#"{"records": [{"market": " Rajkot ", "commodity": "Wheat", "modal_price": "NR"}]}"#;
        let records = parse_records(body).unwrap();
        let r = &records[0];
        assert_eq!(r.market, "Rajkot");
        assert!(!r.prices.is_valid());
        assert_eq!(r.modal_or_zero(), Price::ZERO);
        assert_eq!(r.arrival_date, None);
    }

    #[test]
    fn test_parse_upstream_error_field() {
        let body = r#"{"error": "Invalid API key", "records": []}"#;
        assert!(matches!(parse_records(body), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(parse_records("<html>"), Err(FeedError::Decode(_))));
    }
}
