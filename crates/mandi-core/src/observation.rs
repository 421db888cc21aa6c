//! Price observations (persisted) and live records (from the upstream feed).

use crate::decimal::Price;
use crate::error::{CoreError, Result};
use crate::ids::{CommodityId, GradeId, MarketId, VarietyId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date formats used by the upstream feed, most common first.
const ARRIVAL_DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parse an upstream arrival date (`DD/MM/YYYY`, `DD-MM-YYYY` or ISO).
pub fn parse_arrival_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    ARRIVAL_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| CoreError::InvalidDate(raw.to_string()))
}

/// Min/max/modal price triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTriple {
    pub min_price: Price,
    pub max_price: Price,
    pub modal_price: Price,
}

impl PriceTriple {
    pub fn new(min_price: Price, max_price: Price, modal_price: Price) -> Self {
        Self {
            min_price,
            max_price,
            modal_price,
        }
    }
}

/// Price field name, used to report which upstream fields failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Min,
    Max,
    Modal,
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "min_price"),
            Self::Max => write!(f, "max_price"),
            Self::Modal => write!(f, "modal_price"),
        }
    }
}

/// Result of parsing the string-typed upstream price fields.
///
/// Missing, non-numeric or out-of-range fields do not disappear: `Invalid`
/// keeps the lenient values (each bad field coerced to 0) for callers that
/// need the legacy zero behaviour, plus the list of fields that failed.
/// A price is out of range when negative or above [`Price::CEILING`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParsedPriceFields {
    Valid(PriceTriple),
    Invalid {
        reason: String,
        fields: Vec<PriceField>,
        lenient: PriceTriple,
    },
}

impl ParsedPriceFields {
    /// Parse raw upstream values.
    pub fn parse(min: Option<&str>, max: Option<&str>, modal: Option<&str>) -> Self {
        let mut fields = Vec::new();
        let mut reasons = Vec::new();

        let mut field = |raw: Option<&str>, which: PriceField| -> Price {
            match raw.map(str::trim) {
                Some(s) if !s.is_empty() => match s.parse::<Price>() {
                    Ok(p) if p.is_plausible() => p,
                    Ok(_) => {
                        fields.push(which);
                        reasons.push(format!("{which} is out of range ({s:?})"));
                        Price::ZERO
                    }
                    Err(_) => {
                        fields.push(which);
                        reasons.push(format!("{which} is not numeric ({s:?})"));
                        Price::ZERO
                    }
                },
                _ => {
                    fields.push(which);
                    reasons.push(format!("{which} is missing"));
                    Price::ZERO
                }
            }
        };

        let triple = PriceTriple::new(
            field(min, PriceField::Min),
            field(max, PriceField::Max),
            field(modal, PriceField::Modal),
        );

        if fields.is_empty() {
            Self::Valid(triple)
        } else {
            Self::Invalid {
                reason: reasons.join(", "),
                fields,
                lenient: triple,
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Prices with every unparsable field treated as 0.
    pub fn lenient(&self) -> PriceTriple {
        match self {
            Self::Valid(t) => *t,
            Self::Invalid { lenient, .. } => *lenient,
        }
    }

    /// One price, only if that field itself parsed.
    pub fn price(&self, field: PriceField) -> Option<Price> {
        let triple = match self {
            Self::Valid(t) => t,
            Self::Invalid {
                fields, lenient, ..
            } if !fields.contains(&field) => lenient,
            Self::Invalid { .. } => return None,
        };
        Some(match field {
            PriceField::Min => triple.min_price,
            PriceField::Max => triple.max_price,
            PriceField::Modal => triple.modal_price,
        })
    }

    /// Modal price, only if the modal field itself parsed.
    pub fn modal_price(&self) -> Option<Price> {
        self.price(PriceField::Modal)
    }
}

/// One record from the live upstream feed. Names are free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRecord {
    pub state: String,
    pub district: String,
    pub market: String,
    pub commodity: String,
    pub variety: String,
    pub grade: String,
    #[serde(default)]
    pub commodity_code: Option<String>,
    /// Arrival date as sent upstream.
    pub arrival_date_raw: String,
    /// Parsed arrival date, `None` if the upstream text was not a date.
    pub arrival_date: Option<NaiveDate>,
    pub prices: ParsedPriceFields,
}

impl LiveRecord {
    /// Modal price with the legacy missing-is-zero behaviour.
    pub fn modal_or_zero(&self) -> Price {
        self.prices.lenient().modal_price
    }

    /// Case-insensitive market name match.
    pub fn is_market(&self, name: &str) -> bool {
        self.market.trim().eq_ignore_ascii_case(name.trim())
    }

    /// Case-insensitive commodity name match.
    pub fn is_commodity(&self, name: &str) -> bool {
        self.commodity.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Uniqueness key of a persisted observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub market: MarketId,
    pub commodity: CommodityId,
    pub variety: VarietyId,
    pub grade: GradeId,
    pub arrival_date: NaiveDate,
}

/// Historical price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub market: MarketId,
    pub commodity: CommodityId,
    pub variety: VarietyId,
    pub grade: GradeId,
    pub arrival_date: NaiveDate,
    pub min_price: Price,
    pub max_price: Price,
    pub modal_price: Price,
}

impl PriceObservation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            market: self.market,
            commodity: self.commodity,
            variety: self.variety,
            grade: self.grade,
            arrival_date: self.arrival_date,
        }
    }

    pub fn prices(&self) -> PriceTriple {
        PriceTriple::new(self.min_price, self.max_price, self.modal_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_arrival_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_arrival_date("05/03/2024").unwrap(), expected);
        assert_eq!(parse_arrival_date("05-03-2024").unwrap(), expected);
        assert_eq!(parse_arrival_date("2024-03-05").unwrap(), expected);
        assert!(parse_arrival_date("yesterday").is_err());
    }

    #[test]
    fn test_parse_valid_prices() {
        let parsed = ParsedPriceFields::parse(Some("1900"), Some("2200"), Some("2100"));
        assert!(parsed.is_valid());
        assert_eq!(parsed.modal_price(), Some(Price::new(dec!(2100))));
    }

    #[test]
    fn test_parse_invalid_keeps_lenient_values() {
        let parsed = ParsedPriceFields::parse(Some("NA"), Some("2200"), Some("2100"));
        assert!(!parsed.is_valid());
        let lenient = parsed.lenient();
        assert_eq!(lenient.min_price, Price::ZERO);
        assert_eq!(lenient.max_price, Price::new(dec!(2200)));
        // modal parsed fine, so it is still usable
        assert_eq!(parsed.modal_price(), Some(Price::new(dec!(2100))));
        assert_eq!(parsed.price(PriceField::Min), None);
        assert_eq!(parsed.price(PriceField::Max), Some(Price::new(dec!(2200))));
    }

    #[test]
    fn test_parse_missing_modal() {
        let parsed = ParsedPriceFields::parse(Some("1"), Some("2"), None);
        match &parsed {
            ParsedPriceFields::Invalid { fields, reason, .. } => {
                assert_eq!(fields, &vec![PriceField::Modal]);
                assert!(reason.contains("modal_price is missing"));
            }
            ParsedPriceFields::Valid(_) => panic!("expected invalid"),
        }
        assert_eq!(parsed.modal_price(), None);
        assert_eq!(parsed.lenient().modal_price, Price::ZERO);
    }

    #[test]
    fn test_parse_rejects_out_of_range_prices() {
        let parsed = ParsedPriceFields::parse(
            Some("-5"),
            Some("2200"),
            Some("79228162514264337593543950335"),
        );
        match &parsed {
            ParsedPriceFields::Invalid { fields, reason, .. } => {
                assert_eq!(fields, &vec![PriceField::Min, PriceField::Modal]);
                assert!(reason.contains("modal_price is out of range"));
            }
            ParsedPriceFields::Valid(_) => panic!("expected invalid"),
        }
        assert_eq!(parsed.modal_price(), None);
        assert_eq!(parsed.lenient().modal_price, Price::ZERO);
        assert_eq!(parsed.lenient().max_price, Price::new(dec!(2200)));
    }
}
