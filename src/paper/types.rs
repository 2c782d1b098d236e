use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::data::MarketKind;
use crate::engine::types::OrderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Rejected,
    Pending,
}

/// A buy tranche. Locked (not sellable) while `now < settlable_after_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Lot {
    pub quantity: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub settlable_after_ms: Option<i64>,
}

impl Lot {
    pub fn is_settled(&self, now_ms: i64) -> bool {
        self.settlable_after_ms.is_none_or(|t| now_ms >= t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    /// Volume-weighted average entry price.
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub lots: Vec<Lot>,
}

impl Position {
    /// Quantity currently free to sell: the sum of settled lots. A
    /// position with no lot metadata is fully sellable.
    pub fn sellable_quantity(&self, now_ms: i64) -> f64 {
        if self.lots.is_empty() {
            return self.quantity;
        }
        self.lots
            .iter()
            .filter(|l| l.is_settled(now_ms))
            .map(|l| l.quantity)
            .sum()
    }

    pub fn refresh_unrealized(&mut self) {
        let sign = match self.side {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        };
        self.unrealized_pnl = (self.current_price - self.entry_price) * self.quantity * sign;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaperAccount {
    pub id: String,
    pub name: String,
    pub initial_capital: f64,
    pub cash: f64,
    /// `cash + Σ position.quantity × position.current_price`; refreshed
    /// on every read and persist.
    pub equity: f64,
    pub positions: Vec<Position>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl PaperAccount {
    pub fn refresh_equity(&mut self) {
        self.equity = self.cash
            + self
                .positions
                .iter()
                .map(|p| p.quantity * p.current_price)
                .sum::<f64>();
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.symbol == symbol)
    }
}

/// Caller intent for one order. `prev_close`/`is_st` feed the daily
/// price-limit check on markets that have one.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default)]
    pub order_type: OrderKind,
    pub quantity: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    #[serde(default)]
    pub market: Option<MarketKind>,
    #[serde(default)]
    pub prev_close: Option<f64>,
    #[serde(default)]
    pub is_st: bool,
}

/// The full audit record of an order: intent plus, when filled, the
/// outcome. Rejected and pending orders are kept for audit; only filled
/// orders appear in trade summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaperOrder {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderKind,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: OrderStatus,
    pub created_at_ms: i64,
    pub fill_price: Option<f64>,
    pub commission: Option<f64>,
    pub slippage_bps: Option<f64>,
    pub reason: Option<String>,
    pub strategy_id: Option<String>,
    pub market: Option<MarketKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EquitySnapshot {
    pub timestamp_ms: i64,
    pub equity: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub daily_pnl: f64,
    pub daily_pnl_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(qty: f64, settlable_after: Option<i64>) -> Lot {
        Lot {
            quantity: qty,
            entry_price: 100.0,
            settlable_after_ms: settlable_after,
        }
    }

    fn position(lots: Vec<Lot>) -> Position {
        let quantity = lots.iter().map(|l| l.quantity).sum();
        Position {
            symbol: "600519.SH".into(),
            side: PositionSide::Long,
            quantity,
            entry_price: 100.0,
            current_price: 100.0,
            unrealized_pnl: 0.0,
            lots,
        }
    }

    #[test]
    fn sellable_excludes_locked_lots() {
        let pos = position(vec![lot(100.0, Some(1000)), lot(200.0, Some(5000))]);
        assert_eq!(pos.sellable_quantity(1000), 100.0);
        assert_eq!(pos.sellable_quantity(999), 0.0);
        assert_eq!(pos.sellable_quantity(5000), 300.0);
    }

    #[test]
    fn no_lot_metadata_is_fully_sellable() {
        let mut pos = position(vec![]);
        pos.quantity = 500.0;
        assert_eq!(pos.sellable_quantity(0), 500.0);
    }

    #[test]
    fn equity_is_cash_plus_positions() {
        let mut account = PaperAccount {
            id: "a".into(),
            name: "test".into(),
            initial_capital: 10_000.0,
            cash: 4_000.0,
            equity: 0.0,
            positions: vec![Position {
                symbol: "AAPL".into(),
                side: PositionSide::Long,
                quantity: 30.0,
                entry_price: 150.0,
                current_price: 200.0,
                unrealized_pnl: 0.0,
                lots: vec![],
            }],
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        account.refresh_equity();
        assert_eq!(account.equity, 4_000.0 + 30.0 * 200.0);
    }

    #[test]
    fn unrealized_pnl_sign_for_shorts() {
        let mut pos = position(vec![lot(100.0, None)]);
        pos.side = PositionSide::Short;
        pos.current_price = 90.0;
        pos.refresh_unrealized();
        assert_eq!(pos.unrealized_pnl, 1000.0);
    }
}
