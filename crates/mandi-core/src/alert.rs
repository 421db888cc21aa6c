//! User price alerts.
//!
//! An alert is either armed (stored, possibly inactive) or consumed. There
//! is no "fired" flag: evaluating a qualifying price moves the alert out of
//! `PriceAlert` into a `TriggeredAlert`, whose only use is to notify once and
//! then retire (delete) the stored record.

use crate::decimal::Price;
use crate::ids::{AlertId, CommodityId, DistrictId, GradeId, MarketId, VarietyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Owner of an alert (the authenticated user's ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of the price movement the owner is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    /// Fires when the price reaches or exceeds the target.
    Up,
    /// Fires when the price falls to or below the target.
    Down,
}

impl AlertDirection {
    /// Check whether `current` satisfies this direction against `target`.
    #[inline]
    pub fn is_triggered_by(&self, current: Price, target: Price) -> bool {
        match self {
            Self::Up => current >= target,
            Self::Down => current <= target,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("direction must be \"up\" or \"down\", got {other:?}")),
        }
    }
}

/// A stored price alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub district: DistrictId,
    pub market: MarketId,
    pub commodity: CommodityId,
    #[serde(default)]
    pub variety: Option<VarietyId>,
    #[serde(default)]
    pub grade: Option<GradeId>,
    pub target_price: Price,
    pub direction: AlertDirection,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of evaluating an alert against a live price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvaluation {
    /// Condition not met (or alert inactive); the alert stays stored.
    Armed(PriceAlert),
    /// Condition met; the alert is consumed.
    Triggered(TriggeredAlert),
}

impl PriceAlert {
    /// Whether this alert competes for the (owner, market, commodity, direction) slot.
    pub fn occupies_slot(
        &self,
        owner: &OwnerId,
        market: MarketId,
        commodity: CommodityId,
        direction: AlertDirection,
    ) -> bool {
        &self.owner == owner
            && self.market == market
            && self.commodity == commodity
            && self.direction == direction
    }

    /// Evaluate against a live price, consuming the alert if it fires.
    pub fn evaluate(self, current: Price) -> AlertEvaluation {
        if self.is_active && self.direction.is_triggered_by(current, self.target_price) {
            AlertEvaluation::Triggered(TriggeredAlert {
                alert: self,
                current_price: current,
            })
        } else {
            AlertEvaluation::Armed(self)
        }
    }
}

/// An alert whose condition was met. It can be notified once and retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredAlert {
    alert: PriceAlert,
    current_price: Price,
}

impl TriggeredAlert {
    pub fn alert(&self) -> &PriceAlert {
        &self.alert
    }

    pub fn current_price(&self) -> Price {
        self.current_price
    }

    /// Retire the alert, yielding the ID to delete.
    pub fn retire(self) -> AlertId {
        self.alert.id
    }
}
