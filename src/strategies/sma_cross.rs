//! Trend follower: long when the fast SMA crosses above the slow SMA,
//! flat when it crosses back below.

use std::collections::HashMap;

use crate::data::OhlcvBar;
use crate::engine::context::{Strategy, StrategyContext, StrategyFactory};
use crate::engine::types::{OrderKind, Signal, SignalAction};

pub struct SmaCross {
    fast: usize,
    slow: usize,
    size_pct: f64,
}

impl SmaCross {
    pub fn new(params: &HashMap<String, f64>) -> Self {
        let fast = params.get("fast").copied().unwrap_or(10.0).max(1.0) as usize;
        let slow = params.get("slow").copied().unwrap_or(30.0).max(2.0) as usize;
        Self {
            fast: fast.min(slow.saturating_sub(1)).max(1),
            slow,
            size_pct: params.get("size_pct").copied().unwrap_or(90.0),
        }
    }
}

impl Strategy for SmaCross {
    fn on_bar(
        &self,
        _bar: &OhlcvBar,
        ctx: &mut StrategyContext<'_>,
    ) -> anyhow::Result<Option<Signal>> {
        let n = ctx.history.len();
        if n < self.slow + 1 {
            return Ok(None);
        }
        let fast = ctx.sma(self.fast);
        let slow = ctx.sma(self.slow);
        let (f_now, f_prev) = (fast[n - 1], fast[n - 2]);
        let (s_now, s_prev) = (slow[n - 1], slow[n - 2]);
        if f_now.is_nan() || f_prev.is_nan() || s_now.is_nan() || s_prev.is_nan() {
            return Ok(None);
        }

        let crossed_up = f_prev <= s_prev && f_now > s_now;
        let crossed_down = f_prev >= s_prev && f_now < s_now;

        if crossed_up && ctx.portfolio.position.is_none() {
            let spread = if s_now > 0.0 { (f_now - s_now) / s_now } else { 0.0 };
            return Ok(Some(Signal {
                action: SignalAction::Buy,
                symbol: ctx.symbol.to_string(),
                size_pct: self.size_pct,
                order_type: OrderKind::Market,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                reason: format!("fast SMA({}) crossed above slow SMA({})", self.fast, self.slow),
                confidence: (0.5 + spread * 10.0).clamp(0.1, 0.95),
            }));
        }
        if crossed_down && ctx.portfolio.position.is_some() {
            return Ok(Some(Signal {
                action: SignalAction::Close,
                symbol: ctx.symbol.to_string(),
                size_pct: 100.0,
                order_type: OrderKind::Market,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                reason: format!("fast SMA({}) crossed below slow SMA({})", self.fast, self.slow),
                confidence: 0.7,
            }));
        }
        Ok(None)
    }
}

pub struct SmaCrossFactory;

impl StrategyFactory for SmaCrossFactory {
    fn id(&self) -> &str {
        "sma-cross"
    }

    fn build(&self, params: &HashMap<String, f64>) -> Box<dyn Strategy> {
        Box::new(SmaCross::new(params))
    }
}
