use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ohlcv_cache::OhlcvCache;
use super::{MarketKind, OhlcvBar};
use crate::error::{CoreError, CoreResult};

/// One daily row as the datahub gateway returns it. `trade_date` is a
/// `YYYYMMDD` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatahubRow {
    pub trade_date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vol: f64,
    #[serde(default)]
    pub pre_close: Option<f64>,
    #[serde(default)]
    pub pct_chg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatahubResponse {
    pub success: bool,
    pub data: Vec<DatahubRow>,
}

/// Duck-typed datahub gateway (tushare-style POST API).
#[async_trait]
pub trait DatahubGateway: Send + Sync {
    async fn tushare_post(
        &self,
        api_name: &str,
        params: &serde_json::Value,
        fields: &str,
    ) -> anyhow::Result<DatahubResponse>;
}

const DAILY_FIELDS: &str = "trade_date,open,high,low,close,vol,pre_close,pct_chg";

/// Read-through daily-bar feed for equities, routing each symbol to the
/// gateway endpoint its market uses.
pub struct EquityFeed {
    cache: Arc<OhlcvCache>,
    gateway: Arc<dyn DatahubGateway>,
}

impl EquityFeed {
    pub fn new(cache: Arc<OhlcvCache>, gateway: Arc<dyn DatahubGateway>) -> Self {
        Self { cache, gateway }
    }

    pub async fn bars(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<i64>,
        until: Option<i64>,
    ) -> CoreResult<Vec<OhlcvBar>> {
        let (api_name, market) = endpoint_for(symbol, timeframe)?;

        let cached = self
            .cache
            .query(symbol, market, timeframe, since, until)
            .await?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        let mut params = json!({ "ts_code": symbol });
        if let Some(since) = since {
            params["start_date"] = json!(ms_to_yyyymmdd(since));
        }
        if let Some(until) = until {
            params["end_date"] = json!(ms_to_yyyymmdd(until));
        }

        let response = self
            .gateway
            .tushare_post(api_name, &params, DAILY_FIELDS)
            .await
            .map_err(|e| CoreError::from_adapter_failure(&e))?;
        if !response.success {
            return Err(CoreError::adapter(
                crate::error::AdapterErrorKind::Unknown,
                format!("datahub returned failure for {api_name}"),
            ));
        }

        let mut rows = Vec::with_capacity(response.data.len());
        for row in &response.data {
            let Some(ts) = yyyymmdd_to_ms(&row.trade_date) else {
                tracing::warn!(%symbol, trade_date = %row.trade_date, "unparseable trade date");
                continue;
            };
            rows.push(OhlcvBar {
                timestamp_ms: ts,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.vol,
            });
        }
        rows.sort_by_key(|r| r.timestamp_ms);
        rows.dedup_by_key(|r| r.timestamp_ms);

        if !rows.is_empty() {
            self.cache
                .upsert_batch(symbol, market, timeframe, &rows)
                .await?;
        }

        self.cache.query(symbol, market, timeframe, since, until).await
    }
}

/// Map a symbol and timeframe to the datahub endpoint and cache market:
/// `.HK` → `hk_daily`, bare 5-letter uppercase tickers → `us_daily`,
/// everything else → `daily`/`weekly`/`monthly` by timeframe.
fn endpoint_for(symbol: &str, timeframe: &str) -> CoreResult<(&'static str, MarketKind)> {
    if symbol.to_uppercase().ends_with(".HK") {
        return Ok(("hk_daily", MarketKind::Hk));
    }
    if symbol.len() <= 5
        && !symbol.is_empty()
        && symbol.chars().all(|c| c.is_ascii_uppercase())
    {
        return Ok(("us_daily", MarketKind::Us));
    }
    let api = match timeframe {
        "1d" | "daily" => "daily",
        "1w" | "weekly" => "weekly",
        "1M" | "monthly" => "monthly",
        other => {
            return Err(CoreError::InvalidInput(format!(
                "unsupported equity timeframe: {other}"
            )))
        }
    };
    Ok((api, MarketKind::Cn))
}

fn ms_to_yyyymmdd(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y%m%d").to_string(),
        None => "19700101".to_string(),
    }
}

fn yyyymmdd_to_ms(s: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y%m%d").ok()?;
    let dt = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&dt).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedGateway {
        rows: Vec<DatahubRow>,
        last_api: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl DatahubGateway for ScriptedGateway {
        async fn tushare_post(
            &self,
            api_name: &str,
            _params: &serde_json::Value,
            _fields: &str,
        ) -> anyhow::Result<DatahubResponse> {
            *self.last_api.lock().unwrap() = Some(api_name.to_string());
            Ok(DatahubResponse {
                success: true,
                data: self.rows.clone(),
            })
        }
    }

    fn dh_row(trade_date: &str, close: f64) -> DatahubRow {
        DatahubRow {
            trade_date: trade_date.to_string(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            vol: 100.0,
            pre_close: None,
            pct_chg: None,
        }
    }

    fn feed_with(rows: Vec<DatahubRow>) -> (EquityFeed, Arc<ScriptedGateway>) {
        let cache = Arc::new(OhlcvCache::open_in_memory().unwrap());
        let gateway = Arc::new(ScriptedGateway {
            rows,
            last_api: std::sync::Mutex::new(None),
        });
        (EquityFeed::new(cache, gateway.clone()), gateway)
    }

    #[test]
    fn date_round_trip() {
        let ms = yyyymmdd_to_ms("20240115").unwrap();
        assert_eq!(ms_to_yyyymmdd(ms), "20240115");
    }

    #[test]
    fn endpoint_routing() {
        assert_eq!(endpoint_for("0700.HK", "1d").unwrap().0, "hk_daily");
        assert_eq!(endpoint_for("AAPL", "1d").unwrap().0, "us_daily");
        assert_eq!(endpoint_for("600519.SH", "1d").unwrap().0, "daily");
        assert_eq!(endpoint_for("600519.SH", "1w").unwrap().0, "weekly");
        assert_eq!(endpoint_for("600519.SH", "1M").unwrap().0, "monthly");
        assert!(endpoint_for("600519.SH", "5m").is_err());
    }

    #[tokio::test]
    async fn rows_are_sorted_ascending_before_upsert() {
        // Gateway returns newest-first, as tushare does.
        let (feed, gateway) = feed_with(vec![
            dh_row("20240117", 12.0),
            dh_row("20240116", 11.0),
            dh_row("20240115", 10.0),
        ]);

        let bars = feed.bars("600519.SH", "1d", None, None).await.unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert_eq!(bars[0].close, 10.0);
        assert_eq!(
            gateway.last_api.lock().unwrap().as_deref(),
            Some("daily")
        );
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (feed, gateway) = feed_with(vec![dh_row("20240115", 10.0)]);
        feed.bars("AAPL", "1d", None, None).await.unwrap();
        *gateway.last_api.lock().unwrap() = None;

        let bars = feed.bars("AAPL", "1d", None, None).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert!(gateway.last_api.lock().unwrap().is_none(), "gateway was hit");
    }
}
