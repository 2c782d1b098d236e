//! Mean reverter: buys oversold RSI readings, exits once the oscillator
//! recovers past the overbought threshold.

use std::collections::HashMap;

use crate::data::OhlcvBar;
use crate::engine::context::{Strategy, StrategyContext, StrategyFactory};
use crate::engine::types::{OrderKind, Signal, SignalAction};

pub struct RsiReversion {
    period: usize,
    oversold: f64,
    overbought: f64,
    size_pct: f64,
}

impl RsiReversion {
    pub fn new(params: &HashMap<String, f64>) -> Self {
        Self {
            period: params.get("period").copied().unwrap_or(14.0).max(2.0) as usize,
            oversold: params.get("oversold").copied().unwrap_or(30.0),
            overbought: params.get("overbought").copied().unwrap_or(70.0),
            size_pct: params.get("size_pct").copied().unwrap_or(50.0),
        }
    }
}

impl Strategy for RsiReversion {
    fn on_bar(
        &self,
        _bar: &OhlcvBar,
        ctx: &mut StrategyContext<'_>,
    ) -> anyhow::Result<Option<Signal>> {
        let n = ctx.history.len();
        if n < self.period + 2 {
            return Ok(None);
        }
        let rsi = ctx.rsi(self.period);
        let value = rsi[n - 1];
        if value.is_nan() {
            return Ok(None);
        }

        if value < self.oversold && ctx.portfolio.position.is_none() {
            // Deeper oversold readings carry more conviction.
            let depth = ((self.oversold - value) / self.oversold).clamp(0.0, 1.0);
            return Ok(Some(Signal {
                action: SignalAction::Buy,
                symbol: ctx.symbol.to_string(),
                size_pct: self.size_pct,
                order_type: OrderKind::Market,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                reason: format!("RSI({}) at {value:.1}, oversold", self.period),
                confidence: (0.5 + depth / 2.0).clamp(0.1, 0.95),
            }));
        }
        if value > self.overbought && ctx.portfolio.position.is_some() {
            return Ok(Some(Signal {
                action: SignalAction::Close,
                symbol: ctx.symbol.to_string(),
                size_pct: 100.0,
                order_type: OrderKind::Market,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                reason: format!("RSI({}) at {value:.1}, overbought", self.period),
                confidence: 0.7,
            }));
        }
        Ok(None)
    }
}

pub struct RsiReversionFactory;

impl StrategyFactory for RsiReversionFactory {
    fn id(&self) -> &str {
        "rsi-reversion"
    }

    fn build(&self, params: &HashMap<String, f64>) -> Box<dyn Strategy> {
        Box::new(RsiReversion::new(params))
    }
}
