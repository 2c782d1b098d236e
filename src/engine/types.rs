use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::data::MarketKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

/// A strategy's intent for one bar. `size_pct` is the percentage of
/// equity (buys) or of the open position (sells) to commit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Signal {
    pub action: SignalAction,
    pub symbol: String,
    pub size_pct: f64,
    #[serde(default)]
    pub order_type: OrderKind,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub reason: String,
    pub confidence: f64,
}

impl Signal {
    /// A signal outside these bounds is skipped by the engine with a
    /// logged warning rather than aborting the run.
    pub fn is_well_formed(&self) -> bool {
        self.size_pct.is_finite()
            && (0.0..=100.0).contains(&self.size_pct)
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct BacktestConfig {
    #[garde(range(min = 0.01))]
    pub capital: f64,
    /// Symbol the bar series belongs to; labels positions and trades.
    #[serde(default = "default_symbol")]
    #[garde(skip)]
    pub symbol: String,
    /// Commission as a fraction of notional (0.001 = 10 bps).
    #[serde(default = "default_commission_rate")]
    #[garde(range(min = 0.0, max = 0.1))]
    pub commission_rate: f64,
    /// Slippage in basis points applied against the fill.
    #[serde(default = "default_slippage_bps")]
    #[garde(range(min = 0.0, max = 1000.0))]
    pub slippage_bps: f64,
    #[serde(default = "default_market")]
    #[garde(skip)]
    pub market: MarketKind,
}

fn default_symbol() -> String {
    "ASSET".to_string()
}

fn default_commission_rate() -> f64 {
    0.001
}

fn default_slippage_bps() -> f64 {
    5.0
}

fn default_market() -> MarketKind {
    MarketKind::Us
}

impl BacktestConfig {
    pub fn new(capital: f64) -> Self {
        Self {
            capital,
            symbol: default_symbol(),
            commission_rate: default_commission_rate(),
            slippage_bps: default_slippage_bps(),
            market: default_market(),
        }
    }
}

/// One matched round trip (one FIFO lot closed against an exit fill).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_time_ms: i64,
    pub exit_time_ms: i64,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_commission: f64,
    pub exit_commission: f64,
    /// `(exit − entry) × qty − entry_commission − exit_commission`
    pub pnl: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub start_date_ms: i64,
    pub end_date_ms: i64,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown_pct: f64,
    pub calmar: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub daily_returns: Vec<f64>,
}
