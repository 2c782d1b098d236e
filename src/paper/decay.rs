use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::EquitySnapshot;
use crate::stats;

/// Snapshots required before decay metrics are meaningful.
pub const MIN_DAYS: usize = 7;

const ROLLING_SHORT: usize = 7;
const ROLLING_LONG: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DecayLevel {
    Healthy,
    Warning,
    Degrading,
    Critical,
}

/// Derived (never stored) assessment of a paper account's recent
/// degradation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecayState {
    pub rolling_sharpe_7d: f64,
    pub rolling_sharpe_30d: f64,
    pub sharpe_momentum: f64,
    pub consecutive_loss_days: usize,
    pub current_drawdown_pct: f64,
    pub peak_equity: f64,
    pub decay_level: DecayLevel,
}

impl DecayState {
    fn baseline(initial_capital: f64) -> Self {
        Self {
            rolling_sharpe_7d: 0.0,
            rolling_sharpe_30d: 0.0,
            sharpe_momentum: 0.0,
            consecutive_loss_days: 0,
            current_drawdown_pct: 0.0,
            peak_equity: initial_capital,
            decay_level: DecayLevel::Healthy,
        }
    }
}

/// Compute a `DecayState` from the snapshot series. Fewer than
/// `MIN_DAYS` snapshots yield the healthy zero-state.
pub fn compute(initial_capital: f64, snapshots: &[EquitySnapshot]) -> DecayState {
    if snapshots.len() < MIN_DAYS {
        return DecayState::baseline(initial_capital);
    }

    // Equity series anchored at the initial capital, so n snapshots
    // produce n daily returns.
    let mut equity = Vec::with_capacity(snapshots.len() + 1);
    equity.push(initial_capital);
    equity.extend(snapshots.iter().map(|s| s.equity));
    let returns = stats::curve_returns(&equity);

    let rolling_sharpe_7d = rolling_sharpe(&returns, ROLLING_SHORT);
    let rolling_sharpe_30d = rolling_sharpe(&returns, ROLLING_LONG);
    let sharpe_momentum = momentum(rolling_sharpe_7d, rolling_sharpe_30d);

    let consecutive_loss_days = snapshots
        .iter()
        .rev()
        .take_while(|s| s.daily_pnl < 0.0)
        .count();

    let peak_equity = equity.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last_equity = *equity.last().expect("non-empty");
    let current_drawdown_pct = if peak_equity > 0.0 {
        (last_equity - peak_equity) / peak_equity * 100.0
    } else {
        0.0
    };

    let decay_level = classify(
        rolling_sharpe_7d,
        sharpe_momentum,
        consecutive_loss_days,
        current_drawdown_pct,
    );

    DecayState {
        rolling_sharpe_7d,
        rolling_sharpe_30d,
        sharpe_momentum,
        consecutive_loss_days,
        current_drawdown_pct,
        peak_equity,
        decay_level,
    }
}

/// Sharpe over the trailing `window` daily returns; fewer bars than the
/// window, or a non-finite result, collapse to 0.
fn rolling_sharpe(returns: &[f64], window: usize) -> f64 {
    if returns.len() < window {
        return 0.0;
    }
    let tail = &returns[returns.len() - window..];
    let s = stats::sharpe(tail);
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

/// Short/long Sharpe ratio. A non-positive denominator degenerates to a
/// directional comparison: 1.0 when the short window is no worse than
/// the long one, 0.0 otherwise.
fn momentum(short: f64, long: f64) -> f64 {
    if long > 0.0 {
        let m = short / long;
        if m.is_finite() {
            m
        } else {
            0.0
        }
    } else if short >= long {
        1.0
    } else {
        0.0
    }
}

fn classify(
    sharpe_7d: f64,
    momentum: f64,
    loss_days: usize,
    drawdown_pct: f64,
) -> DecayLevel {
    if drawdown_pct <= -25.0 || loss_days >= 5 {
        DecayLevel::Critical
    } else if sharpe_7d < 0.0 || loss_days >= 3 {
        DecayLevel::Degrading
    } else if drawdown_pct <= -10.0 || momentum < 0.5 {
        DecayLevel::Warning
    } else {
        DecayLevel::Healthy
    }
}
