//! Live feed trait.
//!
//! Abstracts the upstream price source so analytics, ingestion and the
//! alert sweep can be tested without network access.

use crate::error::{FeedError, FeedResult};
use chrono::NaiveDate;
use mandi_core::LiveRecord;
use parking_lot::Mutex;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Location scope for a live query. Matching is best-effort on the provider side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedScope {
    pub state: Option<String>,
    pub district: Option<String>,
    pub market: Option<String>,
    /// Maximum number of records; `None` uses the client's default.
    pub limit: Option<usize>,
}

impl FeedScope {
    /// Scope covering a whole state.
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            ..Default::default()
        }
    }

    /// Scope for a single market.
    pub fn market(
        state: impl Into<String>,
        district: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        Self {
            state: Some(state.into()),
            district: Some(district.into()),
            market: Some(market.into()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &LiveRecord) -> bool {
        let eq = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map(|w| w.trim().eq_ignore_ascii_case(have.trim()))
                .unwrap_or(true)
        };
        eq(&self.state, &record.state)
            && eq(&self.district, &record.district)
            && eq(&self.market, &record.market)
    }
}

/// Source of live and archived price records.
pub trait LiveFeedClient: Send + Sync {
    /// Fetch today's records for a location scope.
    fn fetch_live(&self, scope: FeedScope) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>>;

    /// Fetch the archived records of one state for one arrival date.
    fn fetch_daily(
        &self,
        state: String,
        date: NaiveDate,
    ) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>>;
}

/// In-memory feed for testing.
///
/// Filters its records by scope the way the provider does, so callers still
/// have to apply their own exact-name post-filter.
#[derive(Debug, Default)]
pub struct MockFeedClient {
    live: Mutex<Vec<LiveRecord>>,
    daily: Mutex<Vec<LiveRecord>>,
    fail_with: Mutex<Option<String>>,
    calls: Mutex<Vec<FeedScope>>,
}

impl MockFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace today's records.
    pub fn set_live(&self, records: Vec<LiveRecord>) {
        *self.live.lock() = records;
    }

    /// Replace the archive records.
    pub fn set_daily(&self, records: Vec<LiveRecord>) {
        *self.daily.lock() = records;
    }

    /// Make every subsequent call fail with an upstream HTTP error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    /// Scopes requested so far.
    pub fn calls(&self) -> Vec<FeedScope> {
        self.calls.lock().clone()
    }

    fn check_failure(&self) -> FeedResult<()> {
        match self.fail_with.lock().clone() {
            Some(message) => Err(FeedError::Http(message)),
            None => Ok(()),
        }
    }
}

impl LiveFeedClient for MockFeedClient {
    fn fetch_live(&self, scope: FeedScope) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>> {
        Box::pin(async move {
            self.calls.lock().push(scope.clone());
            self.check_failure()?;
            let limit = scope.limit.unwrap_or(usize::MAX);
            Ok(self
                .live
                .lock()
                .iter()
                .filter(|r| scope.matches(r))
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn fetch_daily(
        &self,
        state: String,
        date: NaiveDate,
    ) -> BoxFuture<'_, FeedResult<Vec<LiveRecord>>> {
        Box::pin(async move {
            self.check_failure()?;
            let scope = FeedScope::state(state);
            Ok(self
                .daily
                .lock()
                .iter()
                .filter(|r| scope.matches(r) && r.arrival_date == Some(date))
                .cloned()
                .collect())
        })
    }
}
