//! Per-source rate limiting with adaptive governor instances.
//!
//! Every remote lookup waits for its source's governor permit before the
//! request goes out. A 429 slows that source's governor down; the original
//! rate comes back after a minute without further 429s.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::db::{self, ExternalRecord, LookupQuery, LookupSource};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Error from a lookup source, separating rate limiting from everything else.
#[derive(Debug, Clone)]
pub enum LookupError {
    /// Server returned 429 Too Many Requests.
    RateLimited { retry_after: Option<Duration> },
    /// Any other failure (transport, HTTP status, malformed body).
    Other(String),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "Rate limited (429), retry after {:.1}s", d.as_secs_f64()),
            LookupError::RateLimited { retry_after: None } => write!(f, "Rate limited (429)"),
            LookupError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LookupError {}

impl From<String> for LookupError {
    fn from(s: String) -> Self {
        LookupError::Other(s)
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Other(e.to_string())
    }
}

/// Governor for one source whose rate drops on 429 and recovers after 60s.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, capped at 16.
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// A limiter allowing one request per `period`. A zero period is bumped
    /// to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            limiter: ArcSwap::from(Arc::new(Self::direct(period))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    fn direct(period: Duration) -> DirectLimiter {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(std::num::NonZeroU32::MIN));
        DirectLimiter::direct(quota)
    }

    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter.store(Arc::new(Self::direct(scaled)));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 60))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter.store(Arc::new(Self::direct(self.base_period)));
        }
    }
}

/// Rate limiters keyed by source name.
pub struct RateLimiters {
    limiters: HashMap<&'static str, AdaptiveLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for RateLimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.limiters.keys().collect();
        names.sort();
        f.debug_struct("RateLimiters").field("sources", &names).finish()
    }
}

impl RateLimiters {
    pub fn new(has_s2_api_key: bool) -> Self {
        let mut limiters = HashMap::new();

        // Semantic Scholar: keyed 1/s, keyless ~100 req / 5 min
        if has_s2_api_key {
            limiters.insert(db::SEMANTIC_SCHOLAR, AdaptiveLimiter::per_second(1));
        } else {
            limiters.insert(
                db::SEMANTIC_SCHOLAR,
                AdaptiveLimiter::new(Duration::from_secs(3)),
            );
        }

        // OpenCitations publishes no hard limit; stay polite
        limiters.insert(db::OPENCITATIONS, AdaptiveLimiter::per_second(2));

        // arXiv asks for no more than one request every 3 seconds
        limiters.insert(db::ARXIV, AdaptiveLimiter::new(Duration::from_secs(3)));

        // Web search is self-hosted and skips limiting (`is_local`)

        Self { limiters }
    }

    pub fn get(&self, source_name: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(source_name)
    }
}

/// Map a 429 response to [`LookupError::RateLimited`], carrying Retry-After.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), LookupError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(LookupError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After value: integer seconds, or an HTTP-date which is
/// approximated as 5 seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Outcome of a rate-limited lookup.
pub struct RateLimitedResult {
    pub result: Result<Vec<ExternalRecord>, LookupError>,
    /// Time spent in the source itself, excluding the governor wait.
    pub elapsed: Duration,
}

/// Run one lookup behind the source's governor.
///
/// On 429 the governor is slowed, Retry-After is honoured (capped at
/// `timeout`), and the lookup is retried exactly once.
pub async fn lookup_with_rate_limit(
    source: &dyn LookupSource,
    queries: &[LookupQuery],
    client: &reqwest::Client,
    timeout: Duration,
    rate_limiters: &RateLimiters,
) -> RateLimitedResult {
    let limiter = if source.is_local() {
        None
    } else {
        rate_limiters.get(source.name())
    };

    if let Some(lim) = limiter {
        lim.acquire().await;
    }

    let start = Instant::now();

    let result = match source.lookup(queries, client, timeout).await {
        Ok(records) => Ok(records),
        Err(LookupError::RateLimited { retry_after }) => {
            if let Some(lim) = limiter {
                lim.on_rate_limited();
            }

            let wait = retry_after.unwrap_or(Duration::from_secs(2)).min(timeout);
            tracing::info!(
                source = source.name(),
                wait_secs = wait.as_secs_f64(),
                "rate limited, waiting then retrying"
            );
            tokio::time::sleep(wait).await;

            if let Some(lim) = limiter {
                lim.acquire().await;
            }

            source.lookup(queries, client, timeout).await
        }
        Err(other) => Err(other),
    };

    RateLimitedResult {
        result,
        elapsed: start.elapsed(),
    }
}
