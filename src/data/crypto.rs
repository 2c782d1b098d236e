use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ohlcv_cache::OhlcvCache;
use super::{MarketKind, OhlcvBar};
use crate::error::{CoreError, CoreResult};

/// Ticker snapshot from an exchange.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Ticker {
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub quote_volume: Option<f64>,
    pub percentage: Option<f64>,
    pub timestamp: i64,
}

/// Duck-typed exchange client. `fetch_ohlcv` rows are
/// `[timestamp_ms, open, high, low, close, volume]` in exchange order.
/// Implementations report failures through `anyhow`; the feed classifies
/// them into the adapter taxonomy.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_ticker(&self, symbol: &str) -> anyhow::Result<Ticker>;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<i64>,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<[f64; 6]>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CandleRequest {
    pub symbol: String,
    pub timeframe: String,
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub exchange_id: Option<String>,
}

/// Read-through candle feed over an exchange client.
///
/// Serves from the cache when it can, tops the cache up from the exchange
/// when it cannot, and always leaves the cache in a state where the next
/// identical request is a pure cache hit.
pub struct CryptoFeed {
    cache: Arc<OhlcvCache>,
    client: Arc<dyn ExchangeClient>,
}

impl CryptoFeed {
    pub fn new(cache: Arc<OhlcvCache>, client: Arc<dyn ExchangeClient>) -> Self {
        Self { cache, client }
    }

    pub async fn ticker(&self, symbol: &str) -> CoreResult<Ticker> {
        self.client
            .fetch_ticker(symbol)
            .await
            .map_err(|e| CoreError::from_adapter_failure(&e))
    }

    pub async fn candles(&self, req: &CandleRequest) -> CoreResult<Vec<OhlcvBar>> {
        let market = MarketKind::Crypto;
        let cached = self
            .cache
            .query(&req.symbol, market, &req.timeframe, req.since, None)
            .await?;

        // Cache hit: enough rows at-or-after `since` to satisfy `limit`.
        if let (Some(_), Some(limit)) = (req.since, req.limit) {
            if cached.len() >= limit {
                return Ok(cached.into_iter().take(limit).collect());
            }
        }

        let cached_range = self
            .cache
            .range(&req.symbol, market, &req.timeframe)
            .await?;

        // Fetch forward from whichever is later: the cache frontier or the
        // requested start.
        let fetch_since = match (cached_range, req.since) {
            (Some((_, latest)), Some(since)) => Some((latest + 1).max(since)),
            (Some((_, latest)), None) => Some(latest + 1),
            (None, since) => since,
        };

        let fetched = self
            .client
            .fetch_ohlcv(&req.symbol, &req.timeframe, fetch_since, req.limit)
            .await
            .map_err(|e| CoreError::from_adapter_failure(&e))?;

        let rows: Vec<OhlcvBar> = fetched.iter().map(|r| row_to_bar(r)).collect();
        if !rows.is_empty() {
            self.cache
                .upsert_batch(&req.symbol, market, &req.timeframe, &rows)
                .await?;
        }

        if cached_range.is_none() && req.since.is_none() {
            // Full miss with no anchor: the exchange response is the answer.
            return Ok(rows);
        }

        // Return the full cached range from `since` onward.
        self.cache
            .query(&req.symbol, market, &req.timeframe, req.since, None)
            .await
    }
}

fn row_to_bar(row: &[f64; 6]) -> OhlcvBar {
    OhlcvBar {
        timestamp_ms: row[0] as i64,
        open: row[1],
        high: row[2],
        low: row[3],
        close: row[4],
        volume: row[5],
    }
}
