//! Reference entities.

use mandi_core::{CommodityId, DistrictId, GradeId, MarketId, StateId, VarietyId};
use serde::{Deserialize, Serialize};

/// Normalized lookup key for a free-text name.
pub(crate) fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub name: String,
    pub state: StateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub name: String,
    pub district: DistrictId,
    pub state: StateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: CommodityId,
    pub name: String,
    /// Upstream commodity code, when the archive resource supplied one.
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variety {
    pub id: VarietyId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub name: String,
}

/// `{id, name}` pair used in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef<I> {
    pub id: I,
    pub name: String,
}

/// Market with its location, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDirectoryEntry {
    pub id: MarketId,
    pub name: String,
    pub district: NamedRef<DistrictId>,
    pub state: NamedRef<StateId>,
}

/// Case-insensitive substring filters for the market listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarketFilter {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

impl MarketFilter {
    pub(crate) fn matches(&self, state: &str, district: &str) -> bool {
        let contains = |needle: &Option<String>, hay: &str| {
            needle
                .as_deref()
                .map(|n| name_key(hay).contains(&name_key(n)))
                .unwrap_or(true)
        };
        contains(&self.state, state) && contains(&self.district, district)
    }
}

/// Entity counts per dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub states: usize,
    pub districts: usize,
    pub markets: usize,
    pub commodities: usize,
    pub varieties: usize,
    pub grades: usize,
}
