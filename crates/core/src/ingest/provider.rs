use crate::config::Settings;
use crate::error::ProviderError;
use crate::ingest::types::{
    FundamentalsRecord, Instrument, InstrumentsResponse, PriceBar, PriceHistoryResponse,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_EXCHANGE: &str = "NSE";

/// External market-data collaborator. Implementations own their rate limiting;
/// callers bound how many calls are outstanding at once.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError>;

    /// Up to `lookback` most recent sessions, oldest first.
    async fn get_price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<PriceBar>, ProviderError>;

    async fn get_fundamentals(&self, symbol: &str) -> Result<FundamentalsRecord, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonDataSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    exchange: String,
    retries: u32,
    /// Pinned last session for price history; `None` follows the clock.
    as_of: Option<NaiveDate>,
}

impl HttpJsonDataSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let exchange = std::env::var("DATA_PROVIDER_EXCHANGE")
            .ok()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            exchange,
            retries,
            as_of: None,
        })
    }

    /// Serve price history ending at `date` instead of the latest session.
    pub fn with_as_of_date(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    fn session_date(&self, now_utc: DateTime<Utc>) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| crate::time::market::latest_session_date(now_utc))
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| ProviderError::Authentication(format!("invalid api key header: {e}")))?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, ProviderError> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read provider response: {e}")))?;

        if !status.is_success() {
            return Err(map_status(status, subject, &text));
        }

        serde_json::from_str::<T>(&text).map_err(|e| {
            ProviderError::InvalidResponse(format!("{path}: {e}"))
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(path, query, subject).await {
                Ok(v) => return Ok(v),
                Err(err) if is_retryable(&err) && attempt < self.retries => {
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, path, error = %err, "data provider request failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait::async_trait]
impl DataSource for HttpJsonDataSource {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
        let resp: InstrumentsResponse = self
            .get_json(
                "/v1/instruments",
                &[("exchange", self.exchange.clone())],
                &self.exchange,
            )
            .await?;
        Ok(resp.items)
    }

    async fn get_price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let as_of = self.session_date(Utc::now());
        let resp: PriceHistoryResponse = self
            .get_json(
                &format!("/v1/prices/{symbol}"),
                &[("lookback", lookback.to_string()), ("to", as_of.to_string())],
                symbol,
            )
            .await?;

        let bars = normalize_bars(resp.bars, lookback);
        if bars.is_empty() {
            return Err(ProviderError::Unavailable {
                symbol: symbol.to_string(),
                reason: "empty price history".to_string(),
            });
        }
        Ok(bars)
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<FundamentalsRecord, ProviderError> {
        self.get_json(&format!("/v1/fundamentals/{symbol}"), &[], symbol)
            .await
    }
}

fn map_status(status: StatusCode, subject: &str, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Authentication(format!("HTTP {status}: {body}"))
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound {
            symbol: subject.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        s if s.is_server_error() => ProviderError::Transport(format!("HTTP {status}: {body}")),
        _ => ProviderError::InvalidResponse(format!("HTTP {status}: {body}")),
    }
}

fn is_retryable(err: &ProviderError) -> bool {
    matches!(err, ProviderError::RateLimited | ProviderError::Transport(_))
}

/// Oldest first, bars with non-finite close dropped, trimmed to `lookback`.
pub(crate) fn normalize_bars(mut bars: Vec<PriceBar>, lookback: usize) -> Vec<PriceBar> {
    bars.retain(|b| b.close.is_finite());
    bars.sort_by_key(|b| b.timestamp);
    if bars.len() > lookback {
        bars.drain(..bars.len() - lookback);
    }
    bars
}
