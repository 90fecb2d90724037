use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_MAX_REQUESTS: u32 = 20;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// Requests seen from one caller in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub identifier: String,
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RateWindow {
    fn open(identifier: &str, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            identifier: identifier.to_string(),
            count: 1,
            window_reset_at: now + to_chrono(window),
        }
    }

    fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        now > self.window_reset_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds the caller should wait, set only on rejection.
    pub retry_after_secs: Option<u64>,
}

impl AdmissionDecision {
    pub fn status(&self) -> StatusCode {
        if self.allowed {
            StatusCode::OK
        } else {
            StatusCode::TOO_MANY_REQUESTS
        }
    }

    /// Rate-limit headers for the HTTP layer; `Retry-After` only on rejection.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(self.limit));
        headers.insert(
            HeaderName::from_static(REMAINING_HEADER),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static(RESET_HEADER),
            HeaderValue::from(self.reset_at.timestamp()),
        );
        if let Some(secs) = self.retry_after_secs {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        headers
    }
}

/// Fixed-window admission control keyed by caller identity.
///
/// - Scoped to this process's memory; each instance enforces its own budget
/// - Rejected calls still count against the window
/// - Up to twice the limit can pass around a window boundary
pub struct AdmissionController {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateWindow>> {
        // Counters stay meaningful after a panicking holder; keep serving.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn check(&self, identifier: &str, max_requests: u32, window: Duration) -> AdmissionDecision {
        self.check_at(identifier, max_requests, window, Utc::now())
    }

    pub fn check_rule(&self, identifier: &str, rule: &RateLimitRule) -> AdmissionDecision {
        self.check(identifier, rule.max_requests, rule.window)
    }

    pub fn check_at(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        let mut table = self.table();
        let current = table
            .entry(identifier.to_string())
            .and_modify(|w| {
                if w.is_lapsed_at(now) {
                    *w = RateWindow::open(identifier, now, window);
                } else {
                    w.count = w.count.saturating_add(1);
                }
            })
            .or_insert_with(|| RateWindow::open(identifier, now, window));

        let allowed = current.count <= max_requests;
        let decision = AdmissionDecision {
            allowed,
            limit: max_requests,
            remaining: max_requests.saturating_sub(current.count),
            reset_at: current.window_reset_at,
            retry_after_secs: (!allowed).then(|| seconds_until(now, current.window_reset_at)),
        };
        if !allowed {
            warn!(
                identifier,
                count = current.count,
                limit = max_requests,
                "request rejected by admission control"
            );
        }
        decision
    }

    /// Current window for `identifier`, if one is tracked.
    pub fn window(&self, identifier: &str) -> Option<RateWindow> {
        self.table().get(identifier).cloned()
    }

    pub fn tracked(&self) -> usize {
        self.table().len()
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Drop windows that have lapsed, returning how many were removed.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, w| !w.is_lapsed_at(now));
        before - table.len()
    }

    /// Run [`AdmissionController::sweep_expired`] every `interval` until the
    /// controller is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                let removed = controller.sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept lapsed rate windows");
                }
            }
        })
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

/// Windows longer than this are clamped.
const MAX_WINDOW_DAYS: i64 = 3650;

fn to_chrono(window: Duration) -> ChronoDuration {
    ChronoDuration::from_std(window)
        .unwrap_or_else(|_| ChronoDuration::days(MAX_WINDOW_DAYS))
        .min(ChronoDuration::days(MAX_WINDOW_DAYS))
}

fn seconds_until(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let ms = reset_at.signed_duration_since(now).num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}
