//! Push notification delivery.
//!
//! The matcher only sees the `NotificationDispatcher` trait, so delivery can
//! be swapped between FCM, a log sink and the recording mock used in tests.

use mandi_core::{AlertDirection, Price};
use mandi_feed::BoxFuture;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Accepted by the push provider.
    Delivered { message_id: String },
    /// The device token is unknown or expired.
    InvalidToken,
    /// Provider rate limit.
    Throttled,
    /// Any other failure.
    Failed(String),
}

impl DispatchResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Delivered { .. })
    }

    /// Whether the same notification could succeed later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchResult::Throttled)
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchResult::Delivered { .. } => "delivered",
            DispatchResult::InvalidToken => "invalid_token",
            DispatchResult::Throttled => "throttled",
            DispatchResult::Failed(_) => "failed",
        }
    }
}

/// Names and prices of a fired alert, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContext {
    pub district: String,
    pub market: String,
    pub commodity: String,
    pub variety: Option<String>,
    pub grade: Option<String>,
    pub direction: AlertDirection,
    pub target_price: Price,
    pub current_price: Price,
}

/// A push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub title: String,
    pub body: String,
    /// Flat string map delivered to the app alongside the visible text.
    pub data: BTreeMap<String, String>,
}

impl AlertNotification {
    pub fn price_alert(ctx: &AlertContext) -> Self {
        let mut body = format!("{}, {}\n", ctx.market, ctx.district);
        if let Some(variety) = &ctx.variety {
            body.push_str(&format!("Variety: {variety}\n"));
        }
        if let Some(grade) = &ctx.grade {
            body.push_str(&format!("Grade: {grade}\n"));
        }
        match ctx.direction {
            AlertDirection::Up => body.push_str(&format!(
                "Price reached ₹{} (Target: ₹{})\nPrice went above your target!",
                ctx.current_price, ctx.target_price
            )),
            AlertDirection::Down => body.push_str(&format!(
                "Price dropped to ₹{} (Target: ₹{})\nPrice went below your target!",
                ctx.current_price, ctx.target_price
            )),
        }

        let data = [
            ("type", "PRICE_ALERT".to_string()),
            ("district", ctx.district.clone()),
            ("market", ctx.market.clone()),
            ("commodity", ctx.commodity.clone()),
            ("variety", ctx.variety.clone().unwrap_or_default()),
            ("grade", ctx.grade.clone().unwrap_or_default()),
            ("targetPrice", ctx.target_price.to_string()),
            ("currentPrice", ctx.current_price.to_string()),
            ("direction", ctx.direction.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            title: format!("Price Alert: {}", ctx.commodity),
            body,
            data,
        }
    }
}

/// Delivers notifications to a device token.
pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, token: String, notification: AlertNotification)
        -> BoxFuture<'_, DispatchResult>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

pub type DynDispatcher = Arc<dyn NotificationDispatcher>;

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com/fcm/send".to_string()
}

fn default_fcm_timeout_secs() -> u64 {
    10
}

/// Firebase Cloud Messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub server_key: String,
    #[serde(default = "default_fcm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_fcm_endpoint(),
            server_key: String::new(),
            timeout_secs: default_fcm_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    to: &'a str,
    priority: &'static str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    sound: &'static str,
    android_channel_id: &'static str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    message_id: Option<String>,
    error: Option<String>,
}

/// Sends through the FCM HTTP endpoint.
pub struct FcmDispatcher {
    client: Client,
    config: FcmConfig,
}

impl FcmDispatcher {
    pub fn new(config: FcmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn deliver(&self, token: &str, notification: &AlertNotification) -> DispatchResult {
        let message = FcmMessage {
            to: token,
            priority: "high",
            notification: FcmNotification {
                title: &notification.title,
                body: &notification.body,
                sound: "default",
                android_channel_id: "price_alerts",
            },
            data: &notification.data,
        };

        let response = match self
            .client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.config.server_key),
            )
            .json(&message)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DispatchResult::Failed(format!("FCM request failed: {e}")),
        };

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return DispatchResult::Throttled,
            StatusCode::NOT_FOUND => return DispatchResult::InvalidToken,
            status if !status.is_success() => {
                return DispatchResult::Failed(format!("FCM returned HTTP {}", status.as_u16()))
            }
            _ => {}
        }

        match response.json::<FcmResponse>().await {
            Ok(body) => classify_fcm_result(body.results.into_iter().next()),
            Err(e) => DispatchResult::Failed(format!("Unreadable FCM response: {e}")),
        }
    }
}

fn classify_fcm_result(result: Option<FcmResult>) -> DispatchResult {
    match result {
        Some(FcmResult {
            message_id: Some(message_id),
            ..
        }) => DispatchResult::Delivered { message_id },
        Some(FcmResult {
            error: Some(error), ..
        }) => match error.as_str() {
            "NotRegistered" | "InvalidRegistration" | "MismatchSenderId" => {
                DispatchResult::InvalidToken
            }
            "DeviceMessageRateExceeded" | "TopicsMessageRateExceeded" => DispatchResult::Throttled,
            _ => DispatchResult::Failed(error),
        },
        _ => DispatchResult::Failed("FCM response carried no result".to_string()),
    }
}

impl NotificationDispatcher for FcmDispatcher {
    fn send(
        &self,
        token: String,
        notification: AlertNotification,
    ) -> BoxFuture<'_, DispatchResult> {
        Box::pin(async move {
            let result = self.deliver(&token, &notification).await;
            debug!(title = %notification.title, result = result.label(), "FCM delivery");
            result
        })
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogDispatcher {
    sent: AtomicU64,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationDispatcher for LogDispatcher {
    fn send(
        &self,
        token: String,
        notification: AlertNotification,
    ) -> BoxFuture<'_, DispatchResult> {
        Box::pin(async move {
            let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
            info!(
                token = %token,
                title = %notification.title,
                body = %notification.body,
                "Price alert notification"
            );
            DispatchResult::Delivered {
                message_id: format!("log-{n}"),
            }
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Recording dispatcher for tests.
#[derive(Debug)]
pub struct MockDispatcher {
    sends: Mutex<Vec<(String, AlertNotification)>>,
    next_result: Mutex<DispatchResult>,
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            next_result: Mutex::new(DispatchResult::Delivered {
                message_id: "mock".to_string(),
            }),
        }
    }

    /// Result returned by every following send.
    pub fn set_next_result(&self, result: DispatchResult) {
        *self.next_result.lock() = result;
    }

    /// Recorded (token, notification) pairs.
    pub fn get_sends(&self) -> Vec<(String, AlertNotification)> {
        self.sends.lock().clone()
    }

    pub fn clear_sends(&self) {
        self.sends.lock().clear();
    }
}

impl NotificationDispatcher for MockDispatcher {
    fn send(
        &self,
        token: String,
        notification: AlertNotification,
    ) -> BoxFuture<'_, DispatchResult> {
        Box::pin(async move {
            self.sends.lock().push((token, notification));
            self.next_result.lock().clone()
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
