pub mod cache;
pub mod store;

pub use cache::FileCache;
pub use store::PreloadedHistory;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use scoring_core::{Bar, ScoringError};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("rate limiter: waiting {:.1}s for API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Market-data client for daily aggregates, with rate limiting,
/// bounded 429 retry, and an optional file-backed response cache.
#[derive(Clone)]
pub struct MarketDataClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    cache: Option<Arc<FileCache>>,
    cache_ttl: Duration,
}

impl MarketDataClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min. Free-tier users should set MARKET_DATA_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
            cache: None,
            cache_ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_cache(mut self, cache: FileCache, ttl_hours: u64) -> Self {
        self.cache = Some(Arc::new(cache));
        self.cache_ttl = Duration::from_secs(ttl_hours * 3600);
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ScoringError> {
        let request = builder
            .build()
            .map_err(|e| ScoringError::Api(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| ScoringError::Api("cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| ScoringError::Api(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "rate limited by data provider, waiting {}s before retry {}/3",
                wait_secs,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(ScoringError::Api(
            "rate limited by data provider after 3 retries".to_string(),
        ))
    }

    /// Fetch daily bars for a symbol over [from, to], cache-first.
    pub async fn daily_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ScoringError> {
        let cache_key = format!("{symbol}_daily_{from}_{to}");
        if let Some(cache) = &self.cache {
            if let Some(bars) = cache.get::<Vec<Bar>>(&cache_key, Some(self.cache_ttl)) {
                tracing::debug!("cache hit for {symbol} daily history");
                return Ok(bars);
            }
        }

        let url = format!(
            "{BASE_URL}/v2/aggs/ticker/{symbol}/range/1/day/{from}/{to}",
        );
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(ScoringError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let agg: AggregateResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Api(e.to_string()))?;

        let mut bars: Vec<Bar> = agg
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let date = chrono::DateTime::from_timestamp_millis(r.t)?.date_naive();
                Some(Bar {
                    date,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();
        bars.sort_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(ScoringError::InsufficientData(format!(
                "no daily bars for {symbol} in {from}..{to}"
            )));
        }

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &bars);
        }
        Ok(bars)
    }
}

#[derive(Deserialize)]
struct AggregateResponse {
    results: Option<Vec<AggregateBar>>,
}

#[derive(Deserialize)]
struct AggregateBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}
