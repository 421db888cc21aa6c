//! Owner-scoped alert management.
//!
//! Every operation takes the caller's `OwnerId`. Alerts belonging to someone
//! else are reported as not found.

use crate::devices::DeviceDirectory;
use crate::error::{AlertError, AlertResult};
use chrono::Utc;
use mandi_core::{
    AlertDirection, AlertId, CommodityId, DistrictId, GradeId, MarketId, OwnerId, Price,
    PriceAlert, VarietyId,
};
use mandi_persistence::{AlertFilter, AlertStore, PersistenceError};
use mandi_registry::EntityResolver;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::info;

const DIRECTION_REQUIRED: &str = "Direction is required (either \"up\" or \"down\")";
const DIRECTION_INVALID: &str = "Direction must be either \"up\" or \"down\"";
const TARGET_NOT_POSITIVE: &str = "Target price must be greater than 0";

/// Body of a create request. Everything is optional so that missing fields
/// produce a validation message rather than a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertRequest {
    pub district_id: Option<DistrictId>,
    pub market_id: Option<MarketId>,
    pub commodity_id: Option<CommodityId>,
    pub variety_id: Option<VarietyId>,
    pub grade_id: Option<GradeId>,
    pub target_price: Option<Price>,
    pub direction: Option<String>,
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of an update request. Absent fields are left unchanged; a `null`
/// variety or grade clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    pub target_price: Option<Price>,
    pub direction: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "explicit")]
    pub variety_id: Option<Option<VarietyId>>,
    #[serde(default, deserialize_with = "explicit")]
    pub grade_id: Option<Option<GradeId>>,
}

/// An alert with its reference names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: PriceAlert,
    pub district_name: Option<String>,
    pub market_name: Option<String>,
    pub commodity_name: Option<String>,
    pub variety_name: Option<String>,
    pub grade_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Listing filter from query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub is_active: Option<bool>,
    pub market_id: Option<MarketId>,
    pub commodity_id: Option<CommodityId>,
}

impl From<AlertQuery> for AlertFilter {
    fn from(q: AlertQuery) -> Self {
        AlertFilter {
            is_active: q.is_active,
            market: q.market_id,
            commodity: q.commodity_id,
        }
    }
}

fn parse_direction(raw: &str, message: &str) -> AlertResult<AlertDirection> {
    raw.parse().map_err(|_| AlertError::validation(message))
}

fn check_target(target: Price) -> AlertResult<Price> {
    if target.is_positive() {
        Ok(target)
    } else {
        Err(AlertError::validation(TARGET_NOT_POSITIVE))
    }
}

fn slot_error(direction: AlertDirection) -> impl FnOnce(PersistenceError) -> AlertError {
    move |e| match e {
        PersistenceError::SlotTaken(_) => AlertError::Duplicate(direction),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct AlertService {
    resolver: Arc<dyn EntityResolver>,
    alerts: Arc<dyn AlertStore>,
    devices: Arc<dyn DeviceDirectory>,
}

impl AlertService {
    pub fn new(
        resolver: Arc<dyn EntityResolver>,
        alerts: Arc<dyn AlertStore>,
        devices: Arc<dyn DeviceDirectory>,
    ) -> Self {
        Self {
            resolver,
            alerts,
            devices,
        }
    }

    pub fn create(&self, owner: &OwnerId, request: NewAlertRequest) -> AlertResult<AlertView> {
        let (Some(district_id), Some(market_id), Some(commodity_id)) =
            (request.district_id, request.market_id, request.commodity_id)
        else {
            return Err(AlertError::validation(
                "District, Market, and Commodity are required",
            ));
        };
        let target = request
            .target_price
            .ok_or_else(|| AlertError::validation("Target price is required"))?;
        let target = check_target(target)?;
        let direction = match request.direction.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_direction(raw, DIRECTION_REQUIRED)?,
            _ => return Err(AlertError::validation(DIRECTION_REQUIRED)),
        };

        self.resolver
            .district(district_id)
            .ok_or(AlertError::NotFound("District"))?;
        let market = self
            .resolver
            .market(market_id)
            .ok_or(AlertError::NotFound("Market"))?;
        if market.district != district_id {
            return Err(AlertError::validation(
                "Selected market does not belong to the selected district",
            ));
        }
        self.resolver
            .commodity(commodity_id)
            .ok_or(AlertError::NotFound("Commodity"))?;
        self.check_variety_grade(request.variety_id, request.grade_id)?;

        let now = Utc::now();
        let alert = PriceAlert {
            id: AlertId::new(),
            owner: owner.clone(),
            district: district_id,
            market: market_id,
            commodity: commodity_id,
            variety: request.variety_id,
            grade: request.grade_id,
            target_price: target,
            direction,
            is_active: request.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        self.alerts
            .insert(alert.clone())
            .map_err(slot_error(direction))?;

        info!(
            alert = %alert.id,
            %owner,
            market = %market_id,
            commodity = %commodity_id,
            %direction,
            target = %target,
            "Price alert created"
        );
        Ok(self.view(alert))
    }

    /// The owner's alerts, newest first.
    pub fn list(&self, owner: &OwnerId, query: AlertQuery) -> Vec<AlertView> {
        self.alerts
            .list_for_owner(owner, &query.into())
            .into_iter()
            .map(|a| self.view(a))
            .collect()
    }

    pub fn get(&self, owner: &OwnerId, id: AlertId) -> AlertResult<AlertView> {
        self.owned(owner, id).map(|a| self.view(a))
    }

    pub fn update(
        &self,
        owner: &OwnerId,
        id: AlertId,
        update: AlertUpdate,
    ) -> AlertResult<AlertView> {
        let mut alert = self.owned(owner, id)?;

        if let Some(target) = update.target_price {
            alert.target_price = check_target(target)?;
        }
        if let Some(raw) = update.direction.as_deref() {
            alert.direction = parse_direction(raw, DIRECTION_INVALID)?;
        }
        if let Some(active) = update.is_active {
            alert.is_active = active;
        }
        if let Some(variety) = update.variety_id {
            alert.variety = variety;
        }
        if let Some(grade) = update.grade_id {
            alert.grade = grade;
        }
        self.check_variety_grade(alert.variety, alert.grade)?;
        alert.updated_at = Utc::now();

        let direction = alert.direction;
        if !self
            .alerts
            .update(alert.clone())
            .map_err(slot_error(direction))?
        {
            return Err(AlertError::NotFound("Alert"));
        }
        Ok(self.view(alert))
    }

    /// Delete an alert. Deleting an alert that is already gone succeeds with `false`.
    pub fn delete(&self, owner: &OwnerId, id: AlertId) -> AlertResult<bool> {
        match self.alerts.get(id) {
            None => Ok(false),
            Some(alert) if &alert.owner != owner => Err(AlertError::NotFound("Alert")),
            Some(_) => Ok(self.alerts.delete_many(&[id])? > 0),
        }
    }

    /// Flip the active flag. Returns the updated alert and a message naming the new state.
    pub fn toggle(&self, owner: &OwnerId, id: AlertId) -> AlertResult<(AlertView, &'static str)> {
        let mut alert = self.owned(owner, id)?;
        alert.is_active = !alert.is_active;
        alert.updated_at = Utc::now();
        if !self.alerts.update(alert.clone())? {
            return Err(AlertError::NotFound("Alert"));
        }
        let message = if alert.is_active {
            "Alert activated successfully"
        } else {
            "Alert deactivated successfully"
        };
        Ok((self.view(alert), message))
    }

    pub fn stats(&self, owner: &OwnerId) -> AlertStats {
        let alerts = self.alerts.list_for_owner(owner, &AlertFilter::default());
        let active = alerts.iter().filter(|a| a.is_active).count();
        AlertStats {
            total: alerts.len(),
            active,
            inactive: alerts.len() - active,
        }
    }

    pub fn register_device(&self, owner: &OwnerId, token: &str) -> AlertResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AlertError::validation("Device token is required"));
        }
        self.devices.register(owner.clone(), token.to_string())?;
        Ok(())
    }

    fn owned(&self, owner: &OwnerId, id: AlertId) -> AlertResult<PriceAlert> {
        self.alerts
            .get(id)
            .filter(|a| &a.owner == owner)
            .ok_or(AlertError::NotFound("Alert"))
    }

    fn check_variety_grade(
        &self,
        variety: Option<VarietyId>,
        grade: Option<GradeId>,
    ) -> AlertResult<()> {
        if let Some(id) = variety {
            self.resolver
                .variety(id)
                .ok_or(AlertError::NotFound("Variety"))?;
        }
        if let Some(id) = grade {
            self.resolver.grade(id).ok_or(AlertError::NotFound("Grade"))?;
        }
        Ok(())
    }

    fn view(&self, alert: PriceAlert) -> AlertView {
        AlertView {
            district_name: self.resolver.district(alert.district).map(|d| d.name),
            market_name: self.resolver.market(alert.market).map(|m| m.name),
            commodity_name: self.resolver.commodity(alert.commodity).map(|c| c.name),
            variety_name: alert
                .variety
                .and_then(|id| self.resolver.variety(id))
                .map(|v| v.name),
            grade_name: alert
                .grade
                .and_then(|id| self.resolver.grade(id))
                .map(|g| g.name),
            alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::InMemoryDeviceDirectory;
    use mandi_persistence::InMemoryAlertStore;
    use mandi_registry::ReferenceStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        service: AlertService,
        devices: Arc<InMemoryDeviceDirectory>,
        district: DistrictId,
        other_district: DistrictId,
        market: MarketId,
        commodity: CommodityId,
        variety: VarietyId,
    }

    fn fixture() -> Fixture {
        let refs = Arc::new(ReferenceStore::new());
        let state = refs.resolve_or_create_state("Gujarat").unwrap();
        let district = refs.resolve_or_create_district(state.id, "Rajkot").unwrap();
        let other = refs.resolve_or_create_district(state.id, "Amreli").unwrap();
        let market = refs.resolve_or_create_market(district.id, "Gondal").unwrap();
        let commodity = refs.resolve_or_create_commodity("Cotton", None).unwrap();
        let variety = refs.resolve_or_create_variety("Shankar-6").unwrap();
        let devices = Arc::new(InMemoryDeviceDirectory::new());
        let service = AlertService::new(
            refs,
            Arc::new(InMemoryAlertStore::new()),
            devices.clone(),
        );
        Fixture {
            service,
            devices,
            district: district.id,
            other_district: other.id,
            market: market.id,
            commodity: commodity.id,
            variety: variety.id,
        }
    }

    impl Fixture {
        fn request(&self, direction: &str, target: Price) -> NewAlertRequest {
            NewAlertRequest {
                district_id: Some(self.district),
                market_id: Some(self.market),
                commodity_id: Some(self.commodity),
                target_price: Some(target),
                direction: Some(direction.to_string()),
                ..Default::default()
            }
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("farmer-1")
    }

    fn message(err: AlertError) -> String {
        err.to_string()
    }

    #[test]
    fn test_create_populates_names() {
        let f = fixture();
        let mut request = f.request("up", Price::new(dec!(7000)));
        request.variety_id = Some(f.variety);

        let view = f.service.create(&owner(), request).unwrap();

        assert!(view.alert.is_active);
        assert_eq!(view.market_name.as_deref(), Some("Gondal"));
        assert_eq!(view.variety_name.as_deref(), Some("Shankar-6"));
        assert_eq!(view.grade_name, None);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["direction"], "up");
        assert_eq!(json["districtName"], "Rajkot");
        assert_eq!(json["isActive"], true);
    }

    #[test]
    fn test_create_validation_messages() {
        let f = fixture();

        let mut missing = f.request("up", Price::new(dec!(1)));
        missing.commodity_id = None;
        assert_eq!(
            message(f.service.create(&owner(), missing).unwrap_err()),
            "District, Market, and Commodity are required"
        );

        let mut no_target = f.request("up", Price::new(dec!(1)));
        no_target.target_price = None;
        assert_eq!(
            message(f.service.create(&owner(), no_target).unwrap_err()),
            "Target price is required"
        );

        let zero = f.request("up", Price::ZERO);
        assert_eq!(
            message(f.service.create(&owner(), zero).unwrap_err()),
            TARGET_NOT_POSITIVE
        );

        let sideways = f.request("sideways", Price::new(dec!(1)));
        assert_eq!(
            message(f.service.create(&owner(), sideways).unwrap_err()),
            DIRECTION_REQUIRED
        );

        let mut wrong_district = f.request("up", Price::new(dec!(1)));
        wrong_district.district_id = Some(f.other_district);
        assert_eq!(
            message(f.service.create(&owner(), wrong_district).unwrap_err()),
            "Selected market does not belong to the selected district"
        );

        let mut unknown_market = f.request("up", Price::new(dec!(1)));
        unknown_market.market_id = Some(MarketId::new(999));
        assert!(matches!(
            f.service.create(&owner(), unknown_market),
            Err(AlertError::NotFound("Market"))
        ));

        let mut unknown_grade = f.request("up", Price::new(dec!(1)));
        unknown_grade.grade_id = Some(GradeId::new(999));
        assert_eq!(
            message(f.service.create(&owner(), unknown_grade).unwrap_err()),
            "Grade not found"
        );
    }

    #[test]
    fn test_one_alert_per_direction() {
        let f = fixture();
        f.service
            .create(&owner(), f.request("up", Price::new(dec!(7000))))
            .unwrap();
        f.service
            .create(&owner(), f.request("down", Price::new(dec!(6000))))
            .unwrap();

        let err = f
            .service
            .create(&owner(), f.request("UP", Price::new(dec!(7500))))
            .unwrap_err();
        assert!(matches!(err, AlertError::Duplicate(AlertDirection::Up)));
        assert!(message(err).starts_with("You already have a \"up\" alert"));

        // Another owner has their own slots.
        f.service
            .create(
                &OwnerId::new("farmer-2"),
                f.request("up", Price::new(dec!(7000))),
            )
            .unwrap();
        assert_eq!(f.service.stats(&owner()).total, 2);
    }

    #[test]
    fn test_update_direction_rechecks_slot() {
        let f = fixture();
        let up = f
            .service
            .create(&owner(), f.request("up", Price::new(dec!(7000))))
            .unwrap();
        f.service
            .create(&owner(), f.request("down", Price::new(dec!(6000))))
            .unwrap();

        let flip = AlertUpdate {
            direction: Some("down".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(&owner(), up.alert.id, flip),
            Err(AlertError::Duplicate(AlertDirection::Down))
        ));

        // Re-asserting its own direction is not a conflict.
        let same = AlertUpdate {
            direction: Some("up".to_string()),
            target_price: Some(Price::new(dec!(7200))),
            ..Default::default()
        };
        let updated = f.service.update(&owner(), up.alert.id, same).unwrap();
        assert_eq!(updated.alert.target_price, Price::new(dec!(7200)));

        let bad = AlertUpdate {
            direction: Some("flat".to_string()),
            ..Default::default()
        };
        assert_eq!(
            message(f.service.update(&owner(), up.alert.id, bad).unwrap_err()),
            DIRECTION_INVALID
        );
    }

    #[test]
    fn test_update_body_null_clears_variety() {
        let f = fixture();
        let mut request = f.request("up", Price::new(dec!(7000)));
        request.variety_id = Some(f.variety);
        let created = f.service.create(&owner(), request).unwrap();

        let untouched: AlertUpdate = serde_json::from_str(r#"{"targetPrice": "7100"}"#).unwrap();
        let view = f
            .service
            .update(&owner(), created.alert.id, untouched)
            .unwrap();
        assert_eq!(view.alert.variety, Some(f.variety));

        let cleared: AlertUpdate = serde_json::from_str(r#"{"varietyId": null}"#).unwrap();
        let view = f.service.update(&owner(), created.alert.id, cleared).unwrap();
        assert_eq!(view.alert.variety, None);
        assert_eq!(view.alert.target_price, Price::new(dec!(7100)));
    }

    #[test]
    fn test_other_owner_cannot_see_alert() {
        let f = fixture();
        let created = f
            .service
            .create(&owner(), f.request("up", Price::new(dec!(7000))))
            .unwrap();
        let stranger = OwnerId::new("stranger");

        assert!(matches!(
            f.service.get(&stranger, created.alert.id),
            Err(AlertError::NotFound("Alert"))
        ));
        assert!(matches!(
            f.service.delete(&stranger, created.alert.id),
            Err(AlertError::NotFound("Alert"))
        ));
        assert!(f.service.list(&stranger, AlertQuery::default()).is_empty());
        assert!(f.service.get(&owner(), created.alert.id).is_ok());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let f = fixture();
        let created = f
            .service
            .create(&owner(), f.request("down", Price::new(dec!(6000))))
            .unwrap();

        assert!(f.service.delete(&owner(), created.alert.id).unwrap());
        assert!(!f.service.delete(&owner(), created.alert.id).unwrap());
        assert!(!f.service.delete(&owner(), AlertId::new()).unwrap());
    }

    #[test]
    fn test_toggle_and_stats() {
        let f = fixture();
        let created = f
            .service
            .create(&owner(), f.request("up", Price::new(dec!(7000))))
            .unwrap();
        f.service
            .create(&owner(), f.request("down", Price::new(dec!(6000))))
            .unwrap();

        let (view, msg) = f.service.toggle(&owner(), created.alert.id).unwrap();
        assert!(!view.alert.is_active);
        assert_eq!(msg, "Alert deactivated successfully");
        assert_eq!(
            f.service.stats(&owner()),
            AlertStats {
                total: 2,
                active: 1,
                inactive: 1
            }
        );

        let inactive = f.service.list(
            &owner(),
            AlertQuery {
                is_active: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(inactive.len(), 1);

        let (_, msg) = f.service.toggle(&owner(), created.alert.id).unwrap();
        assert_eq!(msg, "Alert activated successfully");
    }

    #[test]
    fn test_register_device() {
        let f = fixture();
        assert!(matches!(
            f.service.register_device(&owner(), "  "),
            Err(AlertError::Validation(_))
        ));
        f.service.register_device(&owner(), " fcm-token ").unwrap();
        assert_eq!(f.devices.token_for(&owner()).as_deref(), Some("fcm-token"));
    }
}
