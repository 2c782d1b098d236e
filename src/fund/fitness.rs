//! Fitness: a scalar ranking a strategy against its peers, blending
//! long-term, recent and paper evidence.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One evidence source: a Sharpe ratio, the trade count behind it, and
/// the max drawdown of the underlying run (negative percent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerfTerm {
    pub sharpe: f64,
    pub trades: usize,
    pub max_drawdown_pct: f64,
}

impl PerfTerm {
    /// `sharpe × min(1, trades/100) × (1 − min(1, |maxDD|))` with the
    /// drawdown taken as a fraction. Non-finite Sharpe collapses to 0 so
    /// one degenerate run cannot dominate the blend.
    fn score(self) -> f64 {
        let sharpe = if self.sharpe.is_finite() {
            self.sharpe
        } else {
            0.0
        };
        let sample_weight = (self.trades as f64 / 100.0).min(1.0);
        let dd_fraction = (self.max_drawdown_pct.abs() / 100.0).min(1.0);
        sharpe * sample_weight * (1.0 - dd_fraction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitnessInputs {
    /// Full-history backtest evidence.
    pub long_term: PerfTerm,
    /// Recent-window backtest evidence; falls back to `long_term`.
    pub recent: Option<PerfTerm>,
    /// Paper-trading evidence; falls back to `long_term`.
    pub paper: Option<PerfTerm>,
    /// Days since the strategy launched; dampens short-term evidence
    /// for young strategies.
    pub days_since_launch: i64,
}

const BASE_LONG_WEIGHT: f64 = 0.3;
const BASE_RECENT_WEIGHT: f64 = 0.3;
const BASE_PAPER_WEIGHT: f64 = 0.4;
const MATURITY_RAMP_DAYS: f64 = 90.0;

/// Blend the three evidence terms. The short-term weights ramp linearly
/// from 0 to their full 0.3/0.4 share over the first 90 days, with the
/// remainder resting on long-term evidence.
pub fn fitness_score(inputs: &FitnessInputs) -> f64 {
    let long = inputs.long_term.score();
    let recent = inputs.recent.unwrap_or(inputs.long_term).score();
    let paper = inputs.paper.unwrap_or(inputs.long_term).score();

    let maturity = (inputs.days_since_launch as f64 / MATURITY_RAMP_DAYS).clamp(0.0, 1.0);
    let recent_w = BASE_RECENT_WEIGHT * maturity;
    let paper_w = BASE_PAPER_WEIGHT * maturity;
    let long_w = 1.0 - recent_w - paper_w;

    debug_assert!((long_w + recent_w + paper_w - 1.0).abs() < 1e-12);
    long_w * long + recent_w * recent + paper_w * paper
}
