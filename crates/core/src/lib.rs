pub mod domain;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod scoring;
pub mod time;
pub mod universe;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
            })
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }
    }

    /// Tuning knobs for one screening pass and for the result cache.
    #[derive(Debug, Clone)]
    pub struct ScanOptions {
        /// Target size of the sector-balanced pool (the sampler's T).
        pub pool_size: usize,

        /// Shortlist size used when a caller does not pass one.
        pub default_max_tickers: usize,

        /// Market-cap bounds in crore units. Unknown caps are never excluded.
        pub market_cap_min: f64,
        pub market_cap_max: f64,

        /// Minimum average daily volume, applied only when volume is known.
        pub min_volume: f64,

        pub prefilter_window: usize,
        pub prefilter_threshold: f64,

        /// Sessions of price history fetched per ticker.
        pub history_lookback: usize,

        /// Fewer sessions than this and the ticker is skipped at scoring.
        pub min_history_bars: usize,

        pub max_concurrent_fetches: usize,
        pub request_delay: Duration,

        /// Freshness window of the cached snapshot.
        pub cache_ttl: Duration,

        /// Start a background scan when a read finds the cache stale.
        pub refresh_on_stale: bool,

        /// Fixed seed for the universe sampler. Entropy when unset.
        pub seed: Option<u64>,

        /// Restrict the universe to one exchange segment (e.g. "NSE").
        pub segment: Option<String>,
    }

    impl Default for ScanOptions {
        fn default() -> Self {
            Self {
                pool_size: 200,
                default_max_tickers: 20,
                market_cap_min: 500.0,
                market_cap_max: 50_000.0,
                min_volume: 100_000.0,
                prefilter_window: 30,
                prefilter_threshold: 0.4,
                history_lookback: 90,
                min_history_bars: 35,
                max_concurrent_fetches: 4,
                request_delay: Duration::from_millis(150),
                cache_ttl: Duration::from_secs(300),
                refresh_on_stale: true,
                seed: None,
                segment: None,
            }
        }
    }

    impl ScanOptions {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut out = Self::default();

            if let Some(n) = env_parse::<usize>("SCAN_POOL_SIZE") {
                out.pool_size = n;
            }
            if let Some(n) = env_parse::<usize>("SCAN_DEFAULT_MAX_TICKERS") {
                out.default_max_tickers = n;
            }
            if let Some(v) = env_parse::<f64>("SCAN_MARKET_CAP_MIN") {
                out.market_cap_min = v;
            }
            if let Some(v) = env_parse::<f64>("SCAN_MARKET_CAP_MAX") {
                out.market_cap_max = v;
            }
            if let Some(v) = env_parse::<f64>("SCAN_MIN_VOLUME") {
                out.min_volume = v;
            }
            if let Some(n) = env_parse::<usize>("SCAN_PREFILTER_WINDOW") {
                out.prefilter_window = n;
            }
            if let Some(v) = env_parse::<f64>("SCAN_PREFILTER_THRESHOLD") {
                out.prefilter_threshold = v;
            }
            if let Some(n) = env_parse::<usize>("SCAN_HISTORY_LOOKBACK") {
                out.history_lookback = n;
            }
            if let Some(n) = env_parse::<usize>("SCAN_MIN_HISTORY_BARS") {
                out.min_history_bars = n;
            }
            if let Some(n) = env_parse::<usize>("SCAN_MAX_CONCURRENT_FETCHES") {
                out.max_concurrent_fetches = n;
            }
            if let Some(ms) = env_parse::<u64>("SCAN_REQUEST_DELAY_MS") {
                out.request_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = env_parse::<u64>("SCAN_CACHE_TTL_SECS") {
                out.cache_ttl = Duration::from_secs(secs);
            }
            if let Some(b) = env_parse::<bool>("SCAN_REFRESH_ON_STALE") {
                out.refresh_on_stale = b;
            }
            if let Some(seed) = env_parse::<u64>("SCAN_SEED") {
                out.seed = Some(seed);
            }
            out.segment = std::env::var("SCAN_SEGMENT")
                .ok()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty());

            out.validate()?;
            Ok(out)
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(self.pool_size >= 1, "SCAN_POOL_SIZE must be >= 1");
            anyhow::ensure!(
                self.default_max_tickers >= 1,
                "SCAN_DEFAULT_MAX_TICKERS must be >= 1"
            );
            anyhow::ensure!(
                self.market_cap_min <= self.market_cap_max,
                "market cap bounds are inverted: min={} max={}",
                self.market_cap_min,
                self.market_cap_max
            );
            anyhow::ensure!(
                self.prefilter_window >= 2,
                "SCAN_PREFILTER_WINDOW must be >= 2 (got {})",
                self.prefilter_window
            );
            anyhow::ensure!(
                self.history_lookback >= self.prefilter_window,
                "SCAN_HISTORY_LOOKBACK ({}) must cover SCAN_PREFILTER_WINDOW ({})",
                self.history_lookback,
                self.prefilter_window
            );
            anyhow::ensure!(
                self.max_concurrent_fetches >= 1,
                "SCAN_MAX_CONCURRENT_FETCHES must be >= 1"
            );
            Ok(())
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_are_valid() {
            let opts = ScanOptions::default();
            assert!(opts.validate().is_ok());
            assert_eq!(opts.pool_size, 200);
            assert_eq!(opts.cache_ttl, Duration::from_secs(300));
        }

        #[test]
        fn rejects_inverted_cap_bounds() {
            let opts = ScanOptions {
                market_cap_min: 10_000.0,
                market_cap_max: 500.0,
                ..ScanOptions::default()
            };
            assert!(opts.validate().is_err());
        }

        #[test]
        fn rejects_lookback_shorter_than_prefilter_window() {
            let opts = ScanOptions {
                history_lookback: 10,
                prefilter_window: 30,
                ..ScanOptions::default()
            };
            assert!(opts.validate().is_err());
        }
    }
}
