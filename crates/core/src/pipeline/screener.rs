use crate::config::ScanOptions;
use crate::domain::contract::ListQuery;
use crate::domain::{OpportunityScore, ScanSnapshot, ScanStats, Signal};
use crate::error::{ProviderError, ScanError, ScanResult};
use crate::ingest::provider::DataSource;
use crate::ingest::types::{FundamentalsRecord, PriceBar};
use crate::pipeline::query;
use crate::pipeline::shortlist::{smart_sample, Prefiltered};
use crate::pipeline::state::{ScanGuard, ScanState};
use crate::scoring::{self, prefilter_score, Subject};
use crate::universe::{self, average_volume, Candidate, SegmentBounds};
use chrono::Utc;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const MAX_TICKERS_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { scan_id: Uuid },
    AlreadyRunning,
    UsingCache { age_seconds: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub in_progress: bool,
    pub state: ScanPhase,
    pub cached_count: usize,
    pub last_scan_time: Option<chrono::DateTime<Utc>>,
    pub cache_age_seconds: Option<i64>,
    pub scan_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub stats: ScanStats,
}

/// Runs scans in the background and serves the cached ranking.
pub struct Screener {
    source: Arc<dyn DataSource>,
    opts: ScanOptions,
    state: Arc<ScanState>,
    rng: Mutex<StdRng>,
}

struct Fetched {
    candidate: Candidate,
    bars: Vec<PriceBar>,
    fundamentals: Option<FundamentalsRecord>,
}

impl Screener {
    pub fn new(source: Arc<dyn DataSource>, opts: ScanOptions) -> Arc<Self> {
        let rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Arc::new(Self {
            source,
            opts,
            state: ScanState::new(),
            rng: Mutex::new(rng),
        })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.opts
    }

    pub fn snapshot(&self) -> Arc<ScanSnapshot> {
        self.state.snapshot()
    }

    /// Launches a scan in the background and returns at once.
    ///
    /// With `force == false` a fresh cache is served instead of rescanning.
    /// Must be called from within a tokio runtime.
    pub fn start_scan(
        self: &Arc<Self>,
        max_tickers: Option<usize>,
        force: bool,
    ) -> ScanResult<StartOutcome> {
        let n = max_tickers.unwrap_or(self.opts.default_max_tickers);
        if !(1..=MAX_TICKERS_LIMIT).contains(&n) {
            return Err(ScanError::InvalidParameter(format!(
                "max_tickers must be between 1 and {MAX_TICKERS_LIMIT} (got {n})"
            )));
        }

        if !force {
            if let Some(age_seconds) = self.fresh_cache_age() {
                tracing::debug!(age_seconds, "cache is fresh; not scanning");
                return Ok(StartOutcome::UsingCache { age_seconds });
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ScanError::Internal(format!("no async runtime to scan on: {e}")))?;

        let Some(guard) = self.state.try_begin() else {
            tracing::info!("scan already in progress; not starting another");
            return Ok(StartOutcome::AlreadyRunning);
        };
        let scan_id = guard.scan_id();

        let this = Arc::clone(self);
        runtime.spawn(async move { this.supervise(guard, n).await });

        tracing::info!(%scan_id, max_tickers = n, force, "scan started");
        Ok(StartOutcome::Started { scan_id })
    }

    /// Owns the guard so the flag is only cleared once the outcome is recorded.
    async fn supervise(self: Arc<Self>, guard: ScanGuard, n: usize) {
        let scan_id = guard.scan_id();
        let this = Arc::clone(&self);
        let outcome = tokio::spawn(async move { this.run_scan(scan_id, n).await }).await;

        match outcome {
            Ok(Ok(snapshot)) => {
                tracing::info!(
                    %scan_id,
                    scored = snapshot.stats.scored,
                    skipped = snapshot.stats.skipped,
                    "scan finished; publishing snapshot"
                );
                self.state.publish(snapshot);
            }
            Ok(Err(err)) => {
                tracing::error!(%scan_id, error = %err, "scan failed; keeping previous snapshot");
                self.state.record_failure(scan_id, err.to_string());
            }
            Err(join_err) => {
                tracing::error!(%scan_id, error = %join_err, "scan task aborted; keeping previous snapshot");
                self.state
                    .record_failure(scan_id, format!("scan task aborted: {join_err}"));
            }
        }
        drop(guard);
    }

    /// Runs every stage once and returns the snapshot without publishing it.
    pub async fn run_scan(&self, scan_id: Uuid, max_tickers: usize) -> ScanResult<ScanSnapshot> {
        let opts = &self.opts;
        let mut stats = ScanStats::default();

        let instruments = self.source.list_instruments().await?;
        stats.universe = instruments.len();

        let tradeable: Vec<_> = instruments
            .into_iter()
            .filter(|i| match &opts.segment {
                Some(seg) => i.segment.eq_ignore_ascii_case(seg),
                None => true,
            })
            .filter(universe::is_tradeable)
            .collect();
        stats.tradeable = tradeable.len();

        let pool = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            universe::sample_balanced(tradeable, opts.pool_size, &mut *rng)
        };
        stats.sampled = pool.len();
        tracing::info!(
            %scan_id,
            provider = self.source.provider_name(),
            universe = stats.universe,
            tradeable = stats.tradeable,
            sampled = stats.sampled,
            "universe sampled"
        );

        let fetched = self.fetch_pool(pool).await?;

        let bounds = SegmentBounds::from_options(opts);
        let mut passed = Vec::with_capacity(fetched.len());
        for f in fetched {
            let ticker = f.candidate.instrument.symbol.as_str();
            let cap = f
                .fundamentals
                .as_ref()
                .and_then(|r| r.market_cap)
                .filter(|c| c.is_finite());
            let avg_vol = average_volume(&f.bars, opts.prefilter_window);
            if let Err(rejection) = bounds.check(cap, avg_vol) {
                tracing::debug!(ticker, reason = %rejection, "dropped by segment filter");
                continue;
            }
            passed.push(f);
        }
        stats.segment_passed = passed.len();

        let mut admitted = Vec::with_capacity(passed.len());
        for f in passed {
            let Some(pre) = prefilter_score(&f.bars, opts.prefilter_window) else {
                continue;
            };
            if !pre.admits(opts.prefilter_threshold) {
                tracing::debug!(
                    ticker = %f.candidate.instrument.symbol,
                    score = pre.score,
                    "dropped by technical prefilter"
                );
                continue;
            }
            admitted.push(Prefiltered {
                candidate: f.candidate,
                bars: f.bars,
                fundamentals: f.fundamentals,
                prefilter: pre,
            });
        }
        stats.prefilter_passed = admitted.len();

        let shortlist = smart_sample(admitted, max_tickers);
        stats.shortlisted = shortlist.len();
        tracing::info!(
            %scan_id,
            segment_passed = stats.segment_passed,
            prefilter_passed = stats.prefilter_passed,
            shortlisted = stats.shortlisted,
            "shortlist ready; scoring"
        );

        let mut opportunities = Vec::with_capacity(shortlist.len());
        for p in &shortlist {
            match self.score_prefiltered(p) {
                Ok(score) => opportunities.push(score),
                Err(err) => {
                    tracing::warn!(ticker = %p.ticker(), error = %err, "skipping ticker");
                    stats.skipped += 1;
                }
            }
        }
        stats.scored = opportunities.len();
        query::rank(&mut opportunities);

        Ok(ScanSnapshot {
            scan_id: Some(scan_id),
            completed_at: Some(Utc::now()),
            opportunities,
            stats,
        })
    }

    fn score_prefiltered(&self, p: &Prefiltered) -> ScanResult<OpportunityScore> {
        let ticker = p.ticker();
        let Some(record) = &p.fundamentals else {
            return Err(ScanError::data_unavailable(ticker, "missing fundamental data"));
        };
        let name = record
            .name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| p.candidate.instrument.display_name());

        scoring::score(
            Subject {
                ticker,
                name,
                sector: p.sector(),
            },
            &p.bars,
            record,
            self.opts.min_history_bars,
        )
    }

    /// Price history and fundamentals for every pooled name, at most
    /// `max_concurrent_fetches` names in flight. A systemic provider error
    /// aborts the whole scan; anything else only drops the one name.
    async fn fetch_pool(&self, pool: Vec<Candidate>) -> ScanResult<Vec<Fetched>> {
        let total = pool.len();
        let mut out = Vec::with_capacity(total);
        let mut stream = futures::stream::iter(pool)
            .map(|c| self.fetch_one(c))
            .buffered(self.opts.max_concurrent_fetches.max(1));

        let mut done = 0usize;
        while let Some(res) = stream.next().await {
            done += 1;
            match res {
                Ok(Some(f)) => out.push(f),
                Ok(None) => {}
                Err(err) => return Err(ScanError::Provider(err)),
            }
            if done % 25 == 0 || done == total {
                tracing::info!(done, total, usable = out.len(), "fetch progress");
            }
        }
        Ok(out)
    }

    async fn fetch_one(&self, candidate: Candidate) -> Result<Option<Fetched>, ProviderError> {
        if !self.opts.request_delay.is_zero() {
            tokio::time::sleep(self.opts.request_delay).await;
        }
        let symbol = candidate.instrument.symbol.as_str();

        let bars = match self
            .source
            .get_price_history(symbol, self.opts.history_lookback)
            .await
        {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                tracing::warn!(
                    ticker = symbol,
                    reason = %scoring::scorer::history_shortfall(0, self.opts.min_history_bars),
                    "skipping ticker"
                );
                return Ok(None);
            }
            Err(err) if err.is_systemic() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    ticker = symbol,
                    reason = scoring::scorer::INSUFFICIENT_HISTORY,
                    error = %err,
                    "skipping ticker"
                );
                return Ok(None);
            }
        };

        let fundamentals = match self.source.get_fundamentals(symbol).await {
            Ok(record) => Some(record),
            Err(err) if err.is_systemic() => return Err(err),
            Err(err) => {
                tracing::debug!(ticker = symbol, reason = %err, "fundamentals unavailable");
                None
            }
        };

        Ok(Some(Fetched {
            candidate,
            bars,
            fundamentals,
        }))
    }

    pub fn status(&self) -> ScanStatus {
        let snap = self.state.snapshot();
        let in_progress = self.state.is_running();
        let failure = self.state.last_failure();

        let state = if in_progress {
            ScanPhase::Running
        } else if failure.is_some() {
            ScanPhase::Failed
        } else {
            ScanPhase::Idle
        };

        ScanStatus {
            in_progress,
            state,
            cached_count: snap.opportunities.len(),
            last_scan_time: snap.completed_at,
            cache_age_seconds: snap
                .completed_at
                .map(|t| (Utc::now() - t).num_seconds().max(0)),
            scan_id: self.state.current_scan(),
            last_error: failure.map(|f| f.message),
            stats: snap.stats.clone(),
        }
    }

    /// A failed scan still counts: automatic refreshes wait out the TTL
    /// instead of retrying on every read. Forced scans ignore this.
    fn attempted_within_ttl(&self) -> bool {
        let Some(at) = self.state.last_attempt_at() else {
            return false;
        };
        chrono::Duration::from_std(self.opts.cache_ttl)
            .map(|ttl| Utc::now() - at < ttl)
            .unwrap_or(false)
    }

    fn fresh_cache_age(&self) -> Option<i64> {
        let completed_at = self.state.snapshot().completed_at?;
        let age = Utc::now() - completed_at;
        let ttl = chrono::Duration::from_std(self.opts.cache_ttl).ok()?;
        (age < ttl).then(|| age.num_seconds().max(0))
    }

    /// Filtered view of the cached ranking. A stale cache is still served;
    /// with `refresh_on_stale` it also kicks off a background scan.
    pub fn list_opportunities(
        self: &Arc<Self>,
        query: ListQuery,
    ) -> ScanResult<Vec<OpportunityScore>> {
        let filter = query.validate_and_into_filter()?;
        self.refresh_if_stale();
        let snap = self.state.snapshot();
        Ok(query::select(&snap.opportunities, &filter))
    }

    pub fn top(&self, count: usize) -> Vec<OpportunityScore> {
        let snap = self.state.snapshot();
        snap.opportunities.iter().take(count).cloned().collect()
    }

    pub fn signal_distribution(&self) -> BTreeMap<Signal, usize> {
        query::signal_distribution(&self.state.snapshot().opportunities)
    }

    fn refresh_if_stale(self: &Arc<Self>) {
        if !self.opts.refresh_on_stale
            || self.state.is_running()
            || self.fresh_cache_age().is_some()
            || self.attempted_within_ttl()
            || tokio::runtime::Handle::try_current().is_err()
        {
            return;
        }
        match self.start_scan(None, false) {
            Ok(outcome) => tracing::info!(?outcome, "cache stale; background refresh requested"),
            Err(err) => tracing::warn!(error = %err, "cache stale; background refresh failed to start"),
        }
    }

    /// Scores one ticker from fresh data, skipping every universe stage. When
    /// the ticker is in the cached ranking, a new snapshot carrying the fresh
    /// score is published.
    pub async fn analyze_one(&self, symbol: &str) -> ScanResult<OpportunityScore> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(ScanError::InvalidParameter("symbol must not be empty".to_string()));
        }

        let bars = self
            .source
            .get_price_history(&symbol, self.opts.history_lookback)
            .await
            .map_err(|err| match err {
                ProviderError::NotFound { .. } => ScanError::NotFound(symbol.clone()),
                e if e.is_systemic() => ScanError::Provider(e),
                e => ScanError::data_unavailable(&symbol, e.to_string()),
            })?;

        let record = self
            .source
            .get_fundamentals(&symbol)
            .await
            .map_err(|err| match err {
                e if e.is_systemic() => ScanError::Provider(e),
                e => ScanError::data_unavailable(&symbol, format!("missing fundamental data: {e}")),
            })?;

        let cached_name = self
            .state
            .snapshot()
            .opportunities
            .iter()
            .find(|o| o.ticker == symbol)
            .map(|o| o.name.clone());
        let name = record
            .name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or(cached_name)
            .unwrap_or_else(|| symbol.clone());

        let score = scoring::score(
            Subject {
                ticker: &symbol,
                name: &name,
                sector: universe::classify(&symbol),
            },
            &bars,
            &record,
            self.opts.min_history_bars,
        )?;

        if self.state.replace_entry(score.clone()) {
            tracing::info!(ticker = %symbol, overall = score.overall_score, "cached entry refreshed");
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::memory::{InMemoryDataSource, MarketFixture};
    use crate::ingest::types::Instrument;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn rising_bars(n: usize, volume: f64) -> Vec<PriceBar> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                PriceBar {
                    timestamp: t0 + ChronoDuration::days(i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: Some(volume),
                }
            })
            .collect()
    }

    fn fading_bars(n: usize) -> Vec<PriceBar> {
        let mut bars = rising_bars(n, 200_000.0);
        let len = bars.len();
        for (i, b) in bars.iter_mut().enumerate() {
            b.close = 300.0 - i as f64;
            b.open = b.close;
            b.high = b.close;
            b.low = b.close;
            if i >= len - 15 {
                b.volume = Some(100_000.0);
            }
        }
        bars
    }

    fn good_fundamentals(pe: f64) -> FundamentalsRecord {
        FundamentalsRecord {
            pe_ratio: Some(pe),
            debt_to_equity: Some(0.1),
            roe: Some(22.0),
            revenue_growth: Some(25.0),
            market_cap: Some(1_000.0),
            ..FundamentalsRecord::default()
        }
    }

    const GOOD: [&str; 10] = [
        "TCS", "INFY", "WIPRO", "SUNPHARMA", "CIPLA", "HDFCBANK", "SBIN", "MARUTI", "TATASTEEL",
        "RELIANCE",
    ];

    fn fixture() -> MarketFixture {
        let mut f = MarketFixture::default();
        for s in GOOD {
            f.instruments.push(Instrument::equity(s, "NSE"));
            f.prices.insert(s.to_string(), rising_bars(90, 200_000.0));
            let pe = if s == "RELIANCE" { 35.0 } else { 15.0 };
            f.fundamentals.insert(s.to_string(), good_fundamentals(pe));
        }

        // Partial fundamentals: scored stage skips it.
        f.instruments.push(Instrument::equity("BADFUND", "NSE"));
        f.prices.insert("BADFUND".to_string(), rising_bars(90, 200_000.0));
        let mut partial = good_fundamentals(15.0);
        partial.roe = None;
        f.fundamentals.insert("BADFUND".to_string(), partial);

        // Falling price, fading volume: prefilter rejects it.
        f.instruments.push(Instrument::equity("FALLER", "NSE"));
        f.prices.insert("FALLER".to_string(), fading_bars(90));
        f.fundamentals.insert("FALLER".to_string(), good_fundamentals(15.0));

        // Below the cap floor: segment filter rejects it.
        f.instruments.push(Instrument::equity("SMALLCAP", "NSE"));
        f.prices.insert("SMALLCAP".to_string(), rising_bars(90, 200_000.0));
        let mut small = good_fundamentals(15.0);
        small.market_cap = Some(100.0);
        f.fundamentals.insert("SMALLCAP".to_string(), small);

        // No prices at all: dropped before the segment filter.
        f.instruments.push(Instrument::equity("NOPRICE", "NSE"));
        f.fundamentals.insert("NOPRICE".to_string(), good_fundamentals(15.0));

        // Not tradeable.
        f.instruments.push(Instrument::equity("ABC-BE", "NSE"));

        f
    }

    fn opts() -> ScanOptions {
        ScanOptions {
            request_delay: std::time::Duration::ZERO,
            refresh_on_stale: false,
            seed: Some(42),
            ..ScanOptions::default()
        }
    }

    async fn wait_idle(s: &Screener) {
        for _ in 0..500 {
            if !s.status().in_progress {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scan did not finish");
    }

    #[tokio::test]
    async fn full_scan_counts_every_stage() {
        let src = Arc::new(InMemoryDataSource::new(fixture()));
        let screener = Screener::new(src.clone(), opts());

        let snap = screener.run_scan(Uuid::new_v4(), 20).await.unwrap();
        assert_eq!(
            snap.stats,
            ScanStats {
                universe: 15,
                tradeable: 14,
                sampled: 14,
                segment_passed: 12,
                prefilter_passed: 11,
                shortlisted: 11,
                scored: 10,
                skipped: 1,
            }
        );

        let tickers: Vec<_> = snap.opportunities.iter().map(|o| o.ticker.as_str()).collect();
        assert!(!tickers.contains(&"BADFUND"));
        // Equal scores rank alphabetically; RELIANCE scores lower.
        assert_eq!(tickers.last(), Some(&"RELIANCE"));
        assert_eq!(&tickers[..3], &["CIPLA", "HDFCBANK", "INFY"]);
        for o in &snap.opportunities {
            assert!((0.0..=100.0).contains(&o.overall_score));
        }

        // One history and one fundamentals call per pooled ticker.
        let calls = src.calls();
        assert_eq!(calls.list_instruments, 1);
        assert_eq!(calls.price_history, 14);
        assert_eq!(calls.fundamentals, 13);
    }

    #[tokio::test]
    async fn final_sampling_caps_the_shortlist() {
        let screener = Screener::new(Arc::new(InMemoryDataSource::new(fixture())), opts());
        let snap = screener.run_scan(Uuid::new_v4(), 4).await.unwrap();
        assert_eq!(snap.stats.shortlisted, 4);

        let sectors: std::collections::HashSet<_> =
            snap.opportunities.iter().map(|o| o.sector).collect();
        // Round-robin picks from four different sectors before repeating one.
        assert_eq!(sectors.len(), snap.opportunities.len());
    }

    #[tokio::test]
    async fn start_scan_publishes_and_serves_cache() {
        let screener = Screener::new(Arc::new(InMemoryDataSource::new(fixture())), opts());
        assert_eq!(screener.status().state, ScanPhase::Idle);
        assert_eq!(screener.status().cached_count, 0);

        let outcome = screener.start_scan(None, false).unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
        wait_idle(&screener).await;

        let status = screener.status();
        assert_eq!(status.state, ScanPhase::Idle);
        assert_eq!(status.cached_count, 10);
        assert!(status.last_scan_time.is_some());
        assert!(status.cache_age_seconds.unwrap() <= 1);

        // Within the freshness window: no rescan.
        assert!(matches!(
            screener.start_scan(None, false).unwrap(),
            StartOutcome::UsingCache { .. }
        ));

        let all = screener
            .list_opportunities(ListQuery {
                signal: Some("all".to_string()),
                ..ListQuery::default()
            })
            .unwrap();
        let unfiltered = screener.list_opportunities(ListQuery::default()).unwrap();
        assert_eq!(all, unfiltered);

        let buys = screener
            .list_opportunities(ListQuery {
                signal: Some("BUY".to_string()),
                ..ListQuery::default()
            })
            .unwrap();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].ticker, "RELIANCE");

        assert!(matches!(
            screener.list_opportunities(ListQuery {
                signal: Some("BOGUS".to_string()),
                ..ListQuery::default()
            }),
            Err(ScanError::InvalidParameter(_))
        ));

        let dist = screener.signal_distribution();
        assert_eq!(dist[&Signal::StrongBuy], 9);
        assert_eq!(dist[&Signal::Buy], 1);
        assert_eq!(dist[&Signal::Sell], 0);

        assert_eq!(screener.top(2).len(), 2);
        assert_eq!(screener.top(2)[0].ticker, "CIPLA");
    }

    #[tokio::test]
    async fn rejects_out_of_range_max_tickers() {
        let screener = Screener::new(Arc::new(InMemoryDataSource::new(fixture())), opts());
        for n in [0, 101] {
            assert!(matches!(
                screener.start_scan(Some(n), true),
                Err(ScanError::InvalidParameter(_))
            ));
        }
        assert!(!screener.status().in_progress);
    }

    /// Blocks `list_instruments` until released.
    struct GatedSource {
        inner: InMemoryDataSource,
        gate: Notify,
        list_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DataSource for GatedSource {
        fn provider_name(&self) -> &'static str {
            "gated"
        }

        async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.inner.list_instruments().await
        }

        async fn get_price_history(
            &self,
            symbol: &str,
            lookback: usize,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            self.inner.get_price_history(symbol, lookback).await
        }

        async fn get_fundamentals(
            &self,
            symbol: &str,
        ) -> Result<FundamentalsRecord, ProviderError> {
            self.inner.get_fundamentals(symbol).await
        }
    }

    #[tokio::test]
    async fn second_scan_while_running_is_not_started() {
        let src = Arc::new(GatedSource {
            inner: InMemoryDataSource::new(fixture()),
            gate: Notify::new(),
            list_calls: AtomicUsize::new(0),
        });
        let screener = Screener::new(src.clone(), opts());

        let first = screener.start_scan(Some(5), true).unwrap();
        assert!(matches!(first, StartOutcome::Started { .. }));
        assert_eq!(screener.status().state, ScanPhase::Running);

        let second = screener.start_scan(Some(5), true).unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning);

        // notify_one stores a permit if the scan has not reached the gate yet.
        src.gate.notify_one();
        wait_idle(&screener).await;

        assert_eq!(src.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(screener.status().stats.shortlisted, 5);
    }

    /// Fails authentication on demand.
    struct FlakySource {
        inner: InMemoryDataSource,
        reject_auth: AtomicBool,
    }

    impl FlakySource {
        fn check(&self) -> Result<(), ProviderError> {
            if self.reject_auth.load(Ordering::SeqCst) {
                return Err(ProviderError::Authentication("token expired".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl DataSource for FlakySource {
        fn provider_name(&self) -> &'static str {
            "flaky"
        }

        async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
            self.inner.list_instruments().await
        }

        async fn get_price_history(
            &self,
            symbol: &str,
            lookback: usize,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            self.check()?;
            self.inner.get_price_history(symbol, lookback).await
        }

        async fn get_fundamentals(
            &self,
            symbol: &str,
        ) -> Result<FundamentalsRecord, ProviderError> {
            self.check()?;
            self.inner.get_fundamentals(symbol).await
        }
    }

    #[tokio::test]
    async fn systemic_failure_aborts_and_keeps_previous_snapshot() {
        let src = Arc::new(FlakySource {
            inner: InMemoryDataSource::new(fixture()),
            reject_auth: AtomicBool::new(false),
        });
        let screener = Screener::new(src.clone(), opts());

        screener.start_scan(None, true).unwrap();
        wait_idle(&screener).await;
        let good = screener.snapshot();
        assert_eq!(good.opportunities.len(), 10);

        src.reject_auth.store(true, Ordering::SeqCst);
        screener.start_scan(None, true).unwrap();
        wait_idle(&screener).await;

        let status = screener.status();
        assert_eq!(status.state, ScanPhase::Failed);
        assert!(status
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("authentication"));
        assert!(Arc::ptr_eq(&good, &screener.snapshot()));
        assert_eq!(status.cached_count, 10);

        // A later success clears the failure.
        src.reject_auth.store(false, Ordering::SeqCst);
        screener.start_scan(None, true).unwrap();
        wait_idle(&screener).await;
        assert_eq!(screener.status().state, ScanPhase::Idle);
    }

    #[tokio::test]
    async fn per_ticker_provider_errors_only_drop_that_ticker() {
        let src = InMemoryDataSource::new(fixture())
            .with_failure("TCS", ProviderError::Transport("timeout".to_string()))
            .with_failure("INFY", ProviderError::RateLimited);
        let screener = Screener::new(Arc::new(src), opts());
        let snap = screener.run_scan(Uuid::new_v4(), 20).await.unwrap();
        assert_eq!(snap.stats.scored, 8);
        assert!(snap.opportunities.iter().all(|o| o.ticker != "TCS" && o.ticker != "INFY"));
    }

    #[tokio::test]
    async fn analyze_one_scores_and_refreshes_cache_entry() {
        let screener = Screener::new(Arc::new(InMemoryDataSource::new(fixture())), opts());

        // Not cached yet: scored, nothing published.
        let tcs = screener.analyze_one(" tcs ").await.unwrap();
        assert_eq!(tcs.ticker, "TCS");
        assert_eq!(tcs.sector, crate::domain::Sector::Technology);
        assert_eq!(screener.status().cached_count, 0);

        screener.start_scan(None, true).unwrap();
        wait_idle(&screener).await;
        let before = screener.snapshot();

        let again = screener.analyze_one("TCS").await.unwrap();
        assert_eq!(again, tcs);
        let after = screener.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.opportunities.len(), after.opportunities.len());
    }

    #[tokio::test]
    async fn analyze_one_errors() {
        let screener = Screener::new(Arc::new(InMemoryDataSource::new(fixture())), opts());
        assert!(matches!(
            screener.analyze_one("NOSUCH").await,
            Err(ScanError::NotFound(s)) if s == "NOSUCH"
        ));
        assert!(matches!(
            screener.analyze_one("BADFUND").await,
            Err(ScanError::DataUnavailable { .. })
        ));
        assert!(matches!(
            screener.analyze_one("  ").await,
            Err(ScanError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn stale_read_triggers_background_refresh() {
        let screener = Screener::new(
            Arc::new(InMemoryDataSource::new(fixture())),
            ScanOptions {
                refresh_on_stale: true,
                ..opts()
            },
        );
        // Empty cache counts as stale.
        let first = screener.list_opportunities(ListQuery::default()).unwrap();
        assert!(first.is_empty());
        assert!(screener.status().in_progress);
        wait_idle(&screener).await;

        assert_eq!(screener.list_opportunities(ListQuery::default()).unwrap().len(), 10);
        // Fresh now: reading does not start another scan.
        assert!(!screener.status().in_progress);
    }

    #[tokio::test]
    async fn failed_scan_holds_off_automatic_refresh_for_a_ttl() {
        let src = Arc::new(
            InMemoryDataSource::new(fixture())
                .with_failure("*", ProviderError::Authentication("token expired".to_string())),
        );
        let screener = Screener::new(
            src.clone(),
            ScanOptions {
                refresh_on_stale: true,
                ..opts()
            },
        );

        for _ in 0..5 {
            let rows = screener.list_opportunities(ListQuery::default()).unwrap();
            assert!(rows.is_empty());
            wait_idle(&screener).await;
        }
        assert_eq!(src.calls().list_instruments, 1);
        assert_eq!(screener.status().state, ScanPhase::Failed);

        // An explicit refresh still retries.
        assert!(matches!(
            screener.start_scan(None, true).unwrap(),
            StartOutcome::Started { .. }
        ));
        wait_idle(&screener).await;
        assert_eq!(src.calls().list_instruments, 2);
    }

    /// Counts how many provider calls are outstanding at once.
    struct PeakSource {
        inner: InMemoryDataSource,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PeakSource {
        fn new() -> Self {
            Self {
                inner: InMemoryDataSource::new(fixture()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl DataSource for PeakSource {
        fn provider_name(&self) -> &'static str {
            "peak"
        }

        async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
            self.inner.list_instruments().await
        }

        async fn get_price_history(
            &self,
            symbol: &str,
            lookback: usize,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            self.enter().await;
            let out = self.inner.get_price_history(symbol, lookback).await;
            self.leave();
            out
        }

        async fn get_fundamentals(
            &self,
            symbol: &str,
        ) -> Result<FundamentalsRecord, ProviderError> {
            self.enter().await;
            let out = self.inner.get_fundamentals(symbol).await;
            self.leave();
            out
        }
    }

    #[tokio::test]
    async fn fetches_stay_within_concurrency_limit() {
        for limit in [1, 3] {
            let src = Arc::new(PeakSource::new());
            let screener = Screener::new(
                src.clone(),
                ScanOptions {
                    max_concurrent_fetches: limit,
                    ..opts()
                },
            );
            let snap = screener.run_scan(Uuid::new_v4(), 20).await.unwrap();
            assert_eq!(snap.stats.scored, 10);

            let peak = src.peak.load(Ordering::SeqCst);
            assert!(peak <= limit, "peak {peak} over limit {limit}");
            if limit > 1 {
                assert!(peak > 1, "fetches never overlapped");
            } else {
                assert_eq!(peak, 1);
            }
        }
    }
}
