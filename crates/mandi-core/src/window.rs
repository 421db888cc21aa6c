//! Analytics day windows.

use crate::error::CoreError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Day window accepted by the commodity and comparison analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AnalyticsWindow {
    Week,
    Fortnight,
    Month,
}

impl AnalyticsWindow {
    pub fn days(&self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Fortnight => 15,
            Self::Month => 30,
        }
    }

    /// First date inside the window ending the day before `today`.
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.days()))
    }
}

impl TryFrom<u32> for AnalyticsWindow {
    type Error = CoreError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            7 => Ok(Self::Week),
            15 => Ok(Self::Fortnight),
            30 => Ok(Self::Month),
            other => Err(CoreError::InvalidWindow(other)),
        }
    }
}

impl From<AnalyticsWindow> for u32 {
    fn from(window: AnalyticsWindow) -> Self {
        window.days()
    }
}

impl fmt::Display for AnalyticsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days", self.days())
    }
}
