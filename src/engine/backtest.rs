use std::collections::VecDeque;

use garde::Validate;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use super::context::{PortfolioView, PositionView, Regime, Strategy, StrategyContext};
use super::metrics;
use super::types::{BacktestConfig, BacktestResult, Signal, SignalAction, TradeRecord};
use crate::data::OhlcvBar;
use crate::error::{CoreError, CoreResult};

const MS_PER_DAY: i64 = 86_400_000;

struct OpenLot {
    quantity: f64,
    entry_price: f64,
    entry_commission: f64,
    entry_time_ms: i64,
}

struct OpenPosition {
    symbol: String,
    quantity: f64,
    entry_price: f64,
    current_price: f64,
    lots: VecDeque<OpenLot>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl OpenPosition {
    fn view(&self) -> PositionView {
        PositionView {
            symbol: self.symbol.clone(),
            quantity: self.quantity,
            entry_price: self.entry_price,
            current_price: self.current_price,
            unrealized_pnl: (self.current_price - self.entry_price) * self.quantity,
        }
    }
}

/// Deterministic bar-by-bar simulator: one account, one strategy, no
/// intra-bar events. Pure over its inputs, so callers may run many
/// instances in parallel as long as each run gets its own memory map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestEngine;

impl BacktestEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run `strategy` over `bars`. Cancellation is honored between bars;
    /// a cancelled run finalizes from the bars processed so far.
    pub fn run(
        &self,
        strategy_id: &str,
        strategy: &dyn Strategy,
        bars: &[OhlcvBar],
        config: &BacktestConfig,
        cancel: Option<&CancellationToken>,
    ) -> CoreResult<BacktestResult> {
        config
            .validate()
            .map_err(|e| CoreError::InvalidInput(format!("backtest config: {e}")))?;

        if bars.is_empty() {
            return Ok(metrics::build_result(
                strategy_id,
                config.capital,
                config.capital,
                0,
                0,
                vec![],
                vec![],
            ));
        }

        let mut cash = config.capital;
        let mut position: Option<OpenPosition> = None;
        let mut equity_curve: Vec<f64> = Vec::with_capacity(bars.len());
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut memory: FxHashMap<String, serde_json::Value> = FxHashMap::default();

        {
            let mut ctx = StrategyContext {
                portfolio: PortfolioView {
                    cash,
                    equity: cash,
                    position: None,
                },
                history: &bars[..0],
                regime: Regime::Unknown,
                memory: &mut memory,
                strategy_id,
                symbol: &config.symbol,
            };
            if let Err(err) = strategy.init(&mut ctx) {
                tracing::warn!(strategy_id, error = %format!("{err:#}"), "strategy init failed");
            }
        }

        let last = bars.len() - 1;
        for (i, bar) in bars.iter().enumerate() {
            // 1. Mark any open position to this bar's close.
            if let Some(pos) = position.as_mut() {
                pos.current_price = bar.close;
            }

            // 2. Record equity before any trading on this bar.
            let marked = cash
                + position
                    .as_ref()
                    .map_or(0.0, |p| p.quantity * p.current_price);
            equity_curve.push(marked);

            // 3. Protective exits take priority over the strategy.
            let protective_exit = position.as_ref().and_then(|pos| {
                if let Some(sl) = pos.stop_loss {
                    if bar.low <= sl {
                        return Some((sl, "stop-loss"));
                    }
                }
                if let Some(tp) = pos.take_profit {
                    if bar.high >= tp {
                        return Some((tp, "take-profit"));
                    }
                }
                None
            });

            if let Some((trigger_price, reason)) = protective_exit {
                Self::close_fraction(
                    &mut position,
                    100.0,
                    trigger_price,
                    bar.timestamp_ms,
                    reason,
                    config.commission_rate,
                    &mut cash,
                    &mut trades,
                );
            } else {
                // 4. Let the strategy see the bar.
                let history = &bars[..=i];
                let mut ctx = StrategyContext {
                    portfolio: PortfolioView {
                        cash,
                        equity: marked,
                        position: position.as_ref().map(OpenPosition::view),
                    },
                    history,
                    regime: Regime::classify(history),
                    memory: &mut memory,
                    strategy_id,
                    symbol: &config.symbol,
                };

                match strategy.on_bar(bar, &mut ctx) {
                    Ok(Some(signal)) => {
                        if signal.is_well_formed() {
                            Self::apply_signal(
                                &signal,
                                bar,
                                marked,
                                config,
                                strategy_id,
                                &mut cash,
                                &mut position,
                                &mut trades,
                            );
                        } else {
                            tracing::warn!(
                                strategy_id,
                                size_pct = signal.size_pct,
                                confidence = signal.confidence,
                                "malformed signal skipped"
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            strategy_id,
                            timestamp = bar.timestamp_ms,
                            error = %format!("{err:#}"),
                            "strategy error treated as no-op"
                        );
                    }
                }

                let day_boundary = i == last
                    || bars[i + 1].timestamp_ms / MS_PER_DAY != bar.timestamp_ms / MS_PER_DAY;
                if day_boundary {
                    let history = &bars[..=i];
                    let mut ctx = StrategyContext {
                        portfolio: PortfolioView {
                            cash,
                            equity: cash
                                + position
                                    .as_ref()
                                    .map_or(0.0, |p| p.quantity * p.current_price),
                            position: position.as_ref().map(OpenPosition::view),
                        },
                        history,
                        regime: Regime::classify(history),
                        memory: &mut memory,
                        strategy_id,
                        symbol: &config.symbol,
                    };
                    strategy.on_day_end(bar, &mut ctx);
                }
            }

            let cancelled = cancel.is_some_and(CancellationToken::is_cancelled);

            // 7. Force out of the market at the end of the data (or on
            // cancellation, so the result is self-consistent).
            if (i == last || cancelled) && position.is_some() {
                let fill = bar.close * (1.0 - config.slippage_bps / 10_000.0);
                Self::close_fraction(
                    &mut position,
                    100.0,
                    fill,
                    bar.timestamp_ms,
                    "end-of-data",
                    config.commission_rate,
                    &mut cash,
                    &mut trades,
                );
            }

            if cancelled {
                tracing::info!(strategy_id, bar = i, "backtest cancelled between bars");
                break;
            }
        }

        let final_equity = cash;
        let start = bars[0].timestamp_ms;
        let end = bars[equity_curve.len() - 1].timestamp_ms;
        Ok(metrics::build_result(
            strategy_id,
            config.capital,
            final_equity,
            start,
            end,
            equity_curve,
            trades,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_signal(
        signal: &Signal,
        bar: &OhlcvBar,
        equity: f64,
        config: &BacktestConfig,
        strategy_id: &str,
        cash: &mut f64,
        position: &mut Option<OpenPosition>,
        trades: &mut Vec<TradeRecord>,
    ) {
        match signal.action {
            SignalAction::Buy => Self::execute_buy(
                signal,
                bar,
                equity,
                config,
                strategy_id,
                cash,
                position,
            ),
            SignalAction::Sell | SignalAction::Close => {
                let fraction = if signal.action == SignalAction::Close {
                    100.0
                } else {
                    signal.size_pct
                };
                if position.is_none() {
                    tracing::debug!(strategy_id, "sell signal with no open position");
                    return;
                }
                let fill = bar.close * (1.0 - config.slippage_bps / 10_000.0);
                Self::close_fraction(
                    position,
                    fraction,
                    fill,
                    bar.timestamp_ms,
                    &signal.reason,
                    config.commission_rate,
                    cash,
                    trades,
                );
            }
        }
    }

    fn execute_buy(
        signal: &Signal,
        bar: &OhlcvBar,
        equity: f64,
        config: &BacktestConfig,
        strategy_id: &str,
        cash: &mut f64,
        position: &mut Option<OpenPosition>,
    ) {
        if let Some(pos) = position.as_ref() {
            if pos.symbol != signal.symbol {
                tracing::warn!(
                    strategy_id,
                    open = %pos.symbol,
                    requested = %signal.symbol,
                    "buy for a different symbol while a position is open; skipped"
                );
                return;
            }
        }

        let fill = bar.close * (1.0 + config.slippage_bps / 10_000.0);
        let budget = equity * signal.size_pct / 100.0;
        let qty = (budget / (fill * (1.0 + config.commission_rate))).floor();
        if qty <= 0.0 {
            tracing::debug!(strategy_id, size_pct = signal.size_pct, "buy sizing to zero units");
            return;
        }
        let commission = fill * qty * config.commission_rate;
        let cost = qty * fill + commission;
        if cost > *cash {
            tracing::debug!(strategy_id, cost, cash = *cash, "buy rejected: insufficient cash");
            return;
        }

        *cash -= cost;
        let lot = OpenLot {
            quantity: qty,
            entry_price: fill,
            entry_commission: commission,
            entry_time_ms: bar.timestamp_ms,
        };
        match position.as_mut() {
            Some(pos) => {
                let total = pos.quantity + qty;
                pos.entry_price = (pos.entry_price * pos.quantity + fill * qty) / total;
                pos.quantity = total;
                pos.current_price = bar.close;
                pos.lots.push_back(lot);
                if signal.stop_loss.is_some() {
                    pos.stop_loss = signal.stop_loss;
                }
                if signal.take_profit.is_some() {
                    pos.take_profit = signal.take_profit;
                }
            }
            None => {
                *position = Some(OpenPosition {
                    symbol: signal.symbol.clone(),
                    quantity: qty,
                    entry_price: fill,
                    current_price: bar.close,
                    lots: VecDeque::from([lot]),
                    stop_loss: signal.stop_loss,
                    take_profit: signal.take_profit,
                });
            }
        }
    }

    /// Close `fraction`% of the open position FIFO across lots at
    /// `fill_price`, emitting one trade record per consumed lot chunk.
    #[allow(clippy::too_many_arguments)]
    fn close_fraction(
        position: &mut Option<OpenPosition>,
        fraction: f64,
        fill_price: f64,
        timestamp_ms: i64,
        reason: &str,
        commission_rate: f64,
        cash: &mut f64,
        trades: &mut Vec<TradeRecord>,
    ) {
        let Some(pos) = position.as_mut() else {
            return;
        };
        let mut remaining = if fraction >= 100.0 {
            pos.quantity
        } else {
            (pos.quantity * fraction / 100.0).floor()
        };
        if remaining <= 0.0 {
            return;
        }

        while remaining > 0.0 {
            let Some(front) = pos.lots.front_mut() else {
                break;
            };
            let take = front.quantity.min(remaining);
            let entry_share = if front.quantity > 0.0 {
                front.entry_commission * (take / front.quantity)
            } else {
                0.0
            };
            let exit_commission = fill_price * take * commission_rate;
            let pnl =
                (fill_price - front.entry_price) * take - entry_share - exit_commission;

            *cash += take * fill_price - exit_commission;
            trades.push(TradeRecord {
                symbol: pos.symbol.clone(),
                entry_time_ms: front.entry_time_ms,
                exit_time_ms: timestamp_ms,
                quantity: take,
                entry_price: front.entry_price,
                exit_price: fill_price,
                entry_commission: entry_share,
                exit_commission,
                pnl,
                reason: reason.to_string(),
            });

            front.quantity -= take;
            front.entry_commission -= entry_share;
            remaining -= take;
            pos.quantity -= take;
            if front.quantity <= 0.0 {
                pos.lots.pop_front();
            }
        }

        if pos.quantity <= 0.0 {
            *position = None;
        }
    }
}
