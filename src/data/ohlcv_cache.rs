use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::{MarketKind, OhlcvBar};
use crate::error::{CoreError, CoreResult};

/// Content-addressed candle store keyed by
/// `(symbol, market, timeframe, timestamp)`.
///
/// Inserting an existing key overwrites (upsert semantics). Range queries
/// come back ordered ascending by timestamp. Data for distinct
/// `(symbol, market, timeframe)` triples never collides, regardless of
/// symbol string reuse across markets.
#[derive(Clone)]
pub struct OhlcvCache {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl OhlcvCache {
    pub fn open(db_path: impl AsRef<Path>) -> CoreResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// In-memory cache, used by tests and short-lived hosts.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ohlcv (
                symbol TEXT NOT NULL,
                market TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, market, timeframe, timestamp)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ohlcv_series
             ON ohlcv(symbol, market, timeframe, timestamp ASC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Upsert a batch of candles atomically: either the whole batch lands
    /// or none of it does.
    ///
    /// Non-monotonic timestamps within the batch are logged and still
    /// applied; the primary key makes the end state well-defined.
    pub async fn upsert_batch(
        &self,
        symbol: &str,
        market: MarketKind,
        timeframe: &str,
        rows: &[OhlcvBar],
    ) -> CoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        for w in rows.windows(2) {
            if w[1].timestamp_ms <= w[0].timestamp_ms {
                tracing::warn!(
                    %symbol,
                    %market,
                    timeframe,
                    prev = w[0].timestamp_ms,
                    next = w[1].timestamp_ms,
                    "non-monotonic timestamps in OHLCV batch"
                );
            }
        }

        let mut guard = self.conn.lock().await;
        let conn = Self::live(&mut guard)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO ohlcv
                    (symbol, market, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(symbol, market, timeframe, timestamp) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume",
            )?;
            for bar in rows {
                stmt.execute(params![
                    symbol,
                    market.as_str(),
                    timeframe,
                    bar.timestamp_ms,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Candles for one series, ascending by timestamp. `since`/`until` are
    /// inclusive bounds in epoch ms.
    pub async fn query(
        &self,
        symbol: &str,
        market: MarketKind,
        timeframe: &str,
        since: Option<i64>,
        until: Option<i64>,
    ) -> CoreResult<Vec<OhlcvBar>> {
        let mut guard = self.conn.lock().await;
        let conn = Self::live(&mut guard)?;
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, open, high, low, close, volume FROM ohlcv
             WHERE symbol = ?1 AND market = ?2 AND timeframe = ?3
               AND timestamp >= ?4 AND timestamp <= ?5
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(
            params![
                symbol,
                market.as_str(),
                timeframe,
                since.unwrap_or(i64::MIN),
                until.unwrap_or(i64::MAX),
            ],
            |row| {
                Ok(OhlcvBar {
                    timestamp_ms: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Earliest and latest stored timestamps for a series, or `None` when
    /// the series is empty.
    pub async fn range(
        &self,
        symbol: &str,
        market: MarketKind,
        timeframe: &str,
    ) -> CoreResult<Option<(i64, i64)>> {
        let mut guard = self.conn.lock().await;
        let conn = Self::live(&mut guard)?;
        let mut stmt = conn.prepare_cached(
            "SELECT MIN(timestamp), MAX(timestamp) FROM ohlcv
             WHERE symbol = ?1 AND market = ?2 AND timeframe = ?3",
        )?;
        let result = stmt.query_row(params![symbol, market.as_str(), timeframe], |row| {
            let earliest: Option<i64> = row.get(0)?;
            let latest: Option<i64> = row.get(1)?;
            Ok(earliest.zip(latest))
        })?;
        Ok(result)
    }

    /// Close the underlying connection. Idempotent; later operations fail
    /// with `InvalidInput`.
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        *guard = None;
    }

    fn live(guard: &mut Option<Connection>) -> CoreResult<&mut Connection> {
        guard
            .as_mut()
            .ok_or_else(|| CoreError::InvalidInput("OHLCV cache is closed".into()))
    }
}
