pub mod crypto;
pub mod equity;
pub mod ohlcv_cache;

pub use crypto::{CandleRequest, CryptoFeed, ExchangeClient, Ticker};
pub use equity::{DatahubGateway, DatahubResponse, DatahubRow, EquityFeed};
pub use ohlcv_cache::OhlcvCache;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One OHLCV candle. Timestamps are milliseconds since the Unix epoch and
/// strictly increasing within a (symbol, market, timeframe) series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OhlcvBar {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Market a symbol trades on. Doubles as the `market` component of the
/// OHLCV cache key and as the selector for paper-trading market rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Crypto,
    Us,
    Cn,
    Hk,
}

impl MarketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Us => "us",
            Self::Cn => "cn",
            Self::Hk => "hk",
        }
    }

    /// Resolve a symbol to its market by suffix convention:
    /// `.SH`/`.SZ` → cn, `.HK` → hk, slash pairs (`BTC/USDT`) → crypto,
    /// anything else → us.
    pub fn resolve(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if upper.ends_with(".SH") || upper.ends_with(".SZ") {
            Self::Cn
        } else if upper.ends_with(".HK") {
            Self::Hk
        } else if upper.contains('/') {
            Self::Crypto
        } else {
            Self::Us
        }
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_cn_suffixes() {
        assert_eq!(MarketKind::resolve("600519.SH"), MarketKind::Cn);
        assert_eq!(MarketKind::resolve("000001.SZ"), MarketKind::Cn);
    }

    #[test]
    fn resolve_hk_suffix() {
        assert_eq!(MarketKind::resolve("0700.HK"), MarketKind::Hk);
    }

    #[test]
    fn resolve_crypto_pair() {
        assert_eq!(MarketKind::resolve("BTC/USDT"), MarketKind::Crypto);
    }

    #[test]
    fn resolve_defaults_to_us() {
        assert_eq!(MarketKind::resolve("AAPL"), MarketKind::Us);
    }
}
