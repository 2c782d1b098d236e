use super::types::{BacktestResult, TradeRecord};
use crate::stats;

/// Floor applied to |max drawdown| in the Calmar denominator so a
/// drawdown-free run does not blow up the ratio.
const CALMAR_DD_FLOOR: f64 = 0.01;

/// Assemble a `BacktestResult` from the raw run artefacts, applying the
/// metric edge-case rules (flat-series Sharpe, all-positive Sortino,
/// drawdown floor for Calmar, profit-factor extremes).
pub fn build_result(
    strategy_id: &str,
    initial_capital: f64,
    final_equity: f64,
    start_date_ms: i64,
    end_date_ms: i64,
    equity_curve: Vec<f64>,
    trades: Vec<TradeRecord>,
) -> BacktestResult {
    let daily_returns = stats::curve_returns(&equity_curve);

    let sharpe = stats::sharpe(&daily_returns);
    let sortino = stats::sortino(&daily_returns);
    let max_drawdown_pct = stats::max_drawdown_pct(&equity_curve);

    let total_return_pct = if initial_capital > 0.0 {
        (final_equity / initial_capital - 1.0) * 100.0
    } else {
        0.0
    };
    let calmar = total_return_pct / max_drawdown_pct.abs().max(CALMAR_DD_FLOOR);

    let wins: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > 0.0).collect();
    let win_sum: f64 = wins.iter().map(|t| t.pnl).sum();
    let loss_sum: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).sum();

    let win_rate_pct = if trades.is_empty() {
        0.0
    } else {
        100.0 * wins.len() as f64 / trades.len() as f64
    };
    let profit_factor = if loss_sum < 0.0 {
        win_sum / loss_sum.abs()
    } else if win_sum > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    BacktestResult {
        strategy_id: strategy_id.to_string(),
        start_date_ms,
        end_date_ms,
        initial_capital,
        final_equity,
        total_return_pct,
        sharpe,
        sortino,
        max_drawdown_pct,
        calmar,
        win_rate_pct,
        profit_factor,
        total_trades: trades.len(),
        trades,
        equity_curve,
        daily_returns,
    }
}
