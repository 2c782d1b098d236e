use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::paper::decay::DecayLevel;
use crate::registry::{StrategyLevel, StrategyRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct FundConfig {
    #[garde(range(min = 0.01))]
    pub total_capital: f64,
    #[serde(default = "default_cash_reserve_pct")]
    #[garde(range(min = 0.0, max = 100.0))]
    pub cash_reserve_pct: f64,
    #[serde(default = "default_max_single_pct")]
    #[garde(range(min = 0.0, max = 100.0))]
    pub max_single_strategy_pct: f64,
    #[serde(default = "default_max_exposure_pct")]
    #[garde(range(min = 0.0, max = 100.0))]
    pub max_total_exposure_pct: f64,
    #[serde(default)]
    #[garde(skip)]
    pub rebalance_frequency: RebalanceFrequency,
}

fn default_cash_reserve_pct() -> f64 {
    30.0
}

fn default_max_single_pct() -> f64 {
    30.0
}

fn default_max_exposure_pct() -> f64 {
    70.0
}

impl FundConfig {
    pub fn new(total_capital: f64) -> Self {
        Self {
            total_capital,
            cash_reserve_pct: default_cash_reserve_pct(),
            max_single_strategy_pct: default_max_single_pct(),
            max_total_exposure_pct: default_max_exposure_pct(),
            rebalance_frequency: RebalanceFrequency::default(),
        }
    }
}

/// Paper-trading evidence for one strategy, as fused during rebalance.
/// The caller extracts this from the paper engine (snapshots + decay
/// metrics + order history).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaperPerformance {
    pub days_active: i64,
    pub trade_count: usize,
    /// Sharpe over the full paper history.
    pub sharpe: f64,
    pub rolling_sharpe_7d: f64,
    pub rolling_sharpe_30d: f64,
    pub max_drawdown_pct: f64,
    pub current_drawdown_pct: f64,
    /// Cumulative return vs. the initial paper capital; the kill rule
    /// watches this.
    pub cumulative_return_pct: f64,
    pub consecutive_loss_days: usize,
    pub decay_level: DecayLevel,
}

/// Fused view of one strategy used by the leaderboard, allocator and
/// promotion gates. Profiles for killed records never reach downstream
/// computation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategyProfile {
    pub strategy_id: String,
    pub name: String,
    pub level: StrategyLevel,
    pub fitness: f64,
    /// Long-term (backtest) Sharpe; leaderboard tie-breaker.
    pub sharpe: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub walk_forward_passed: bool,
    pub paper: Option<PaperPerformance>,
}

impl StrategyProfile {
    pub fn from_record(
        record: &StrategyRecord,
        paper: Option<PaperPerformance>,
        fitness: f64,
    ) -> Self {
        let bt = record.last_backtest;
        Self {
            strategy_id: record.id.clone(),
            name: record.name.clone(),
            level: record.level,
            fitness,
            sharpe: bt.map_or(0.0, |b| b.sharpe),
            max_drawdown_pct: bt.map_or(0.0, |b| b.max_drawdown_pct),
            total_trades: bt.map_or(0, |b| b.total_trades),
            walk_forward_passed: record.last_walk_forward.is_some_and(|wf| wf.passed),
            paper,
        }
    }

    pub fn paper_days_active(&self) -> i64 {
        self.paper.map_or(0, |p| p.days_active)
    }
}
