use rustc_hash::FxHashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Signal;
use crate::data::OhlcvBar;
use crate::indicators;

/// Coarse market-state tag derived from recent price action. Strategies
/// may use it to gate entries; it carries no guarantees beyond being a
/// deterministic function of the history slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Unknown,
}

const REGIME_LOOKBACK: usize = 20;
const REGIME_TREND_THRESHOLD: f64 = 0.02;

impl Regime {
    /// Classify from the close-to-SMA displacement over the last
    /// `REGIME_LOOKBACK` bars.
    pub fn classify(history: &[OhlcvBar]) -> Self {
        if history.len() < REGIME_LOOKBACK {
            return Self::Unknown;
        }
        let tail = &history[history.len() - REGIME_LOOKBACK..];
        let mean_close = tail.iter().map(|b| b.close).sum::<f64>() / REGIME_LOOKBACK as f64;
        if mean_close <= 0.0 {
            return Self::Unknown;
        }
        let last = tail[REGIME_LOOKBACK - 1].close;
        if ((last - mean_close) / mean_close).abs() > REGIME_TREND_THRESHOLD {
            Self::Trending
        } else {
            Self::Ranging
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PortfolioView {
    pub cash: f64,
    pub equity: f64,
    pub position: Option<PositionView>,
}

/// Everything a strategy sees on one bar: a portfolio snapshot, the bar
/// history up to and including the current bar, indicator access over
/// that history, a regime tag, and an engine-owned scratch map that
/// survives across bars within one run.
pub struct StrategyContext<'a> {
    pub portfolio: PortfolioView,
    pub history: &'a [OhlcvBar],
    pub regime: Regime,
    pub memory: &'a mut FxHashMap<String, serde_json::Value>,
    pub strategy_id: &'a str,
    /// Symbol the bar series belongs to.
    pub symbol: &'a str,
}

impl StrategyContext<'_> {
    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|b| b.close).collect()
    }

    pub fn sma(&self, period: usize) -> Vec<f64> {
        indicators::sma(&self.closes(), period)
    }

    pub fn ema(&self, period: usize) -> Vec<f64> {
        indicators::ema(&self.closes(), period)
    }

    pub fn rsi(&self, period: usize) -> Vec<f64> {
        indicators::rsi(&self.closes(), period)
    }

    pub fn macd(&self, fast: usize, slow: usize, signal: usize) -> indicators::MacdOutput {
        indicators::macd(&self.closes(), fast, slow, signal)
    }

    pub fn bollinger(&self, period: usize, k: f64) -> indicators::BollingerOutput {
        indicators::bollinger_bands(&self.closes(), period, k)
    }

    pub fn atr(&self, period: usize) -> Vec<f64> {
        let highs: Vec<f64> = self.history.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = self.history.iter().map(|b| b.low).collect();
        indicators::atr(&highs, &lows, &self.closes(), period)
    }

    /// Read a numeric value previously stashed in `memory`.
    pub fn recall(&self, key: &str) -> Option<f64> {
        self.memory.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Stash a numeric value in `memory` for later bars of this run.
    pub fn remember(&mut self, key: &str, value: f64) {
        if let Some(num) = serde_json::Number::from_f64(value) {
            self.memory
                .insert(key.to_string(), serde_json::Value::Number(num));
        }
    }
}

/// A trading strategy. `on_bar` must be deterministic given
/// (bar, context); anything it needs to carry across bars goes through
/// `ctx.memory`. Errors are logged by the engine and treated as a no-op
/// for that bar.
pub trait Strategy: Send + Sync {
    fn on_bar(
        &self,
        bar: &OhlcvBar,
        ctx: &mut StrategyContext<'_>,
    ) -> anyhow::Result<Option<Signal>>;

    fn init(&self, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_day_end(&self, _bar: &OhlcvBar, _ctx: &mut StrategyContext<'_>) {}
}

/// Builds executable strategy instances from a definition's parameter
/// map. Registered in the runtime catalog keyed by strategy id; registry
/// records re-hydrate against it.
pub trait StrategyFactory: Send + Sync {
    fn id(&self) -> &str;

    fn build(&self, params: &std::collections::HashMap<String, f64>) -> Box<dyn Strategy>;
}
