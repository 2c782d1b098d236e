use std::collections::HashMap;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::decay::{self, DecayState};
use super::market::MarketRules;
use super::store::PaperStore;
use super::types::{
    EquitySnapshot, Lot, OrderRequest, OrderSide, OrderStatus, PaperAccount, PaperOrder, Position,
    PositionSide,
};
use crate::data::MarketKind;
use crate::engine::types::OrderKind;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct PaperEngineConfig {
    /// Slippage in basis points, applied with side-dependent sign.
    pub slippage_bps: f64,
    /// Force every order onto one market instead of resolving by symbol.
    pub default_market: Option<MarketKind>,
}

impl Default for PaperEngineConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 5.0,
            default_market: None,
        }
    }
}

/// Stateful order/position/lot accountant driven by externally-supplied
/// marks. Owns its account state exclusively: accounts load lazily on
/// first access, stay cached for the engine's lifetime, and every
/// state-changing operation persists before returning.
pub struct PaperEngine {
    store: PaperStore,
    rules: MarketRules,
    config: PaperEngineConfig,
    accounts: Mutex<FxHashMap<String, PaperAccount>>,
}

impl PaperEngine {
    pub fn new(store: PaperStore, rules: MarketRules, config: PaperEngineConfig) -> Self {
        Self {
            store,
            rules,
            config,
            accounts: Mutex::new(FxHashMap::default()),
        }
    }

    pub async fn create_account(
        &self,
        name: &str,
        initial_capital: f64,
        now_ms: i64,
    ) -> CoreResult<PaperAccount> {
        if initial_capital <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "initial capital must be positive, got {initial_capital}"
            )));
        }
        let mut account = PaperAccount {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            initial_capital,
            cash: initial_capital,
            equity: 0.0,
            positions: vec![],
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        account.refresh_equity();
        self.store.save_account(&account).await?;

        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.id.clone(), account.clone());
        tracing::info!(account_id = %account.id, initial_capital, "paper account created");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: &str) -> CoreResult<PaperAccount> {
        let mut accounts = self.accounts.lock().await;
        let account = self
            .load_cached(&mut accounts, account_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("account {account_id}")))?;
        account.refresh_equity();
        Ok(account.clone())
    }

    pub async fn list_account_ids(&self) -> CoreResult<Vec<String>> {
        self.store.list_account_ids().await
    }

    pub async fn orders(&self, account_id: &str) -> CoreResult<Vec<PaperOrder>> {
        self.store.orders_for(account_id).await
    }

    pub async fn snapshots(&self, account_id: &str) -> CoreResult<Vec<EquitySnapshot>> {
        self.store.snapshots_for(account_id).await
    }

    pub async fn sellable_quantity(
        &self,
        account_id: &str,
        symbol: &str,
        now_ms: i64,
    ) -> CoreResult<f64> {
        let account = self.get_account(account_id).await?;
        Ok(account
            .position(symbol)
            .map_or(0.0, |p| p.sellable_quantity(now_ms)))
    }

    /// Submit one order. Market-rule failures come back as a rejected
    /// order (never an error); a limit order that does not cross comes
    /// back `pending`. Fills mutate the account and persist before
    /// returning.
    pub async fn submit_order(
        &self,
        account_id: &str,
        req: &OrderRequest,
        current_price: f64,
        now_ms: i64,
    ) -> CoreResult<PaperOrder> {
        let mut order = PaperOrder {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            quantity: req.quantity,
            limit_price: req.limit_price,
            stop_loss: req.stop_loss,
            take_profit: req.take_profit,
            status: OrderStatus::Rejected,
            created_at_ms: now_ms,
            fill_price: None,
            commission: None,
            slippage_bps: None,
            reason: None,
            strategy_id: req.strategy_id.clone(),
            market: None,
        };

        let mut accounts = self.accounts.lock().await;

        // 1. Account existence.
        let Some(account) = self.load_cached(&mut accounts, account_id).await? else {
            return self.finish_rejected(order, "Account not found").await;
        };

        // 2. Market session.
        let market = req
            .market
            .or(self.config.default_market)
            .unwrap_or_else(|| MarketKind::resolve(&req.symbol));
        order.market = Some(market);
        if !self.rules.is_open(market, now_ms)? {
            return self
                .finish_rejected(order, &format!("Market {market} is currently closed"))
                .await;
        }

        // 3. Lot-size validity.
        if !self.rules.lot_valid(market, req.quantity)? {
            return self
                .finish_rejected(
                    order,
                    &format!("Quantity {} is not a valid lot multiple", req.quantity),
                )
                .await;
        }

        // 4. Sellable quantity.
        if req.side == OrderSide::Sell {
            let sellable = account
                .position(&req.symbol)
                .map_or(0.0, |p| p.sellable_quantity(now_ms));
            if req.quantity > sellable + 1e-9 {
                return self
                    .finish_rejected(
                        order,
                        &format!("Insufficient sellable quantity: {sellable} available"),
                    )
                    .await;
            }
        }

        // 5. Limit-price condition: an uncrossed limit order parks as
        // pending, not rejected.
        if req.order_type == OrderKind::Limit {
            let Some(limit) = req.limit_price else {
                return self
                    .finish_rejected(order, "Limit order without a limit price")
                    .await;
            };
            let crosses = match req.side {
                OrderSide::Buy => current_price <= limit,
                OrderSide::Sell => current_price >= limit,
            };
            if !crosses {
                order.status = OrderStatus::Pending;
                order.reason = Some("Limit price not reached".to_string());
                self.store.insert_order(&order).await?;
                return Ok(order);
            }
        }

        // 6. Slippage, side-dependent sign.
        let slip = self.config.slippage_bps / 10_000.0;
        let fill_price = match req.side {
            OrderSide::Buy => current_price * (1.0 + slip),
            OrderSide::Sell => current_price * (1.0 - slip),
        };

        // 7. Daily price limits.
        if let Some(prev_close) = req.prev_close {
            if let Some((lower, upper)) = self.rules.price_band(market, prev_close, req.is_st)? {
                if fill_price < lower || fill_price > upper {
                    return self
                        .finish_rejected(
                            order,
                            &format!(
                                "Fill price {fill_price:.4} outside daily limit band [{lower:.4}, {upper:.4}]"
                            ),
                        )
                        .await;
                }
            }
        }

        // 8. Commission.
        let commission = self
            .rules
            .commission(market, req.side, fill_price * req.quantity)?;

        // 9. Settlement lockout for the new lot.
        let settlable_after_ms = if req.side == OrderSide::Buy {
            self.rules.settlable_after(market, now_ms)?
        } else {
            None
        };

        // 10. Execute against the account.
        match req.side {
            OrderSide::Buy => {
                let cost = req.quantity * fill_price + commission;
                if cost > account.cash {
                    let reason = format!(
                        "Insufficient cash: need {cost:.2}, have {:.2}",
                        account.cash
                    );
                    return self.finish_rejected(order, &reason).await;
                }
                Self::apply_buy(
                    account,
                    &req.symbol,
                    req.quantity,
                    fill_price,
                    current_price,
                    commission,
                    settlable_after_ms,
                );
            }
            OrderSide::Sell => {
                Self::apply_sell(
                    account,
                    &req.symbol,
                    req.quantity,
                    fill_price,
                    current_price,
                    commission,
                    now_ms,
                );
            }
        }

        account.updated_at_ms = now_ms;
        account.refresh_equity();

        order.status = OrderStatus::Filled;
        order.fill_price = Some(fill_price);
        order.commission = Some(commission);
        order.slippage_bps = Some(self.config.slippage_bps);

        let snapshot = account.clone();
        self.store.save_account(&snapshot).await?;
        self.store.insert_order(&order).await?;
        tracing::debug!(
            account_id,
            symbol = %req.symbol,
            side = ?req.side,
            fill_price,
            commission,
            "paper order filled"
        );
        Ok(order)
    }

    /// Mark-to-market: update each matching position's price and
    /// unrealized P&L, recompute equity, persist.
    pub async fn update_prices(
        &self,
        account_id: &str,
        marks: &HashMap<String, f64>,
        now_ms: i64,
    ) -> CoreResult<PaperAccount> {
        let mut accounts = self.accounts.lock().await;
        let account = self
            .load_cached(&mut accounts, account_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("account {account_id}")))?;

        for pos in &mut account.positions {
            if let Some(&price) = marks.get(&pos.symbol) {
                pos.current_price = price;
                pos.refresh_unrealized();
            }
        }
        account.updated_at_ms = now_ms;
        account.refresh_equity();

        let snapshot = account.clone();
        self.store.save_account(&snapshot).await?;
        Ok(snapshot)
    }

    /// Append an equity snapshot, with daily P&L measured against the
    /// most recent prior snapshot (or initial capital when none).
    pub async fn record_snapshot(
        &self,
        account_id: &str,
        now_ms: i64,
    ) -> CoreResult<EquitySnapshot> {
        let account = self.get_account(account_id).await?;
        let previous = self.store.snapshots_for(account_id).await?;
        let baseline = previous
            .last()
            .map_or(account.initial_capital, |s| s.equity);

        let daily_pnl = account.equity - baseline;
        let daily_pnl_pct = if baseline > 0.0 {
            daily_pnl / baseline * 100.0
        } else {
            0.0
        };
        let snap = EquitySnapshot {
            timestamp_ms: now_ms,
            equity: account.equity,
            cash: account.cash,
            positions_value: account.equity - account.cash,
            daily_pnl,
            daily_pnl_pct,
        };
        self.store.append_snapshot(account_id, &snap).await?;
        Ok(snap)
    }

    /// Decay metrics over the account's snapshot series.
    pub async fn get_metrics(&self, account_id: &str) -> CoreResult<DecayState> {
        let account = self.get_account(account_id).await?;
        let snapshots = self.store.snapshots_for(account_id).await?;
        Ok(decay::compute(account.initial_capital, &snapshots))
    }

    fn apply_buy(
        account: &mut PaperAccount,
        symbol: &str,
        quantity: f64,
        fill_price: f64,
        current_price: f64,
        commission: f64,
        settlable_after_ms: Option<i64>,
    ) {
        account.cash -= quantity * fill_price + commission;
        let lot = Lot {
            quantity,
            entry_price: fill_price,
            settlable_after_ms,
        };
        match account.position_mut(symbol) {
            Some(pos) => {
                let total = pos.quantity + quantity;
                pos.entry_price =
                    (pos.entry_price * pos.quantity + fill_price * quantity) / total;
                pos.quantity = total;
                pos.current_price = current_price;
                pos.lots.push(lot);
                pos.refresh_unrealized();
            }
            None => {
                let mut pos = Position {
                    symbol: symbol.to_string(),
                    side: PositionSide::Long,
                    quantity,
                    entry_price: fill_price,
                    current_price,
                    unrealized_pnl: 0.0,
                    lots: vec![lot],
                };
                pos.refresh_unrealized();
                account.positions.push(pos);
            }
        }
    }

    /// Consume settled lots FIFO. The caller has already verified the
    /// sellable quantity covers the request.
    fn apply_sell(
        account: &mut PaperAccount,
        symbol: &str,
        quantity: f64,
        fill_price: f64,
        current_price: f64,
        commission: f64,
        now_ms: i64,
    ) {
        account.cash += quantity * fill_price - commission;

        let Some(pos) = account.position_mut(symbol) else {
            return;
        };
        let mut remaining = quantity;
        if pos.lots.is_empty() {
            pos.quantity -= remaining;
        } else {
            for lot in &mut pos.lots {
                if remaining <= 0.0 {
                    break;
                }
                if !lot.is_settled(now_ms) {
                    continue;
                }
                let take = lot.quantity.min(remaining);
                lot.quantity -= take;
                pos.quantity -= take;
                remaining -= take;
            }
            pos.lots.retain(|l| l.quantity > 0.0);
        }
        pos.current_price = current_price;
        pos.refresh_unrealized();

        if pos.quantity <= 1e-9 {
            account.positions.retain(|p| p.symbol != symbol);
        }
    }

    async fn load_cached<'a>(
        &self,
        accounts: &'a mut FxHashMap<String, PaperAccount>,
        account_id: &str,
    ) -> CoreResult<Option<&'a mut PaperAccount>> {
        if !accounts.contains_key(account_id) {
            match self.store.load_account(account_id).await? {
                Some(account) => {
                    accounts.insert(account_id.to_string(), account);
                }
                None => return Ok(None),
            }
        }
        Ok(accounts.get_mut(account_id))
    }

    async fn finish_rejected(
        &self,
        mut order: PaperOrder,
        reason: &str,
    ) -> CoreResult<PaperOrder> {
        order.status = OrderStatus::Rejected;
        order.reason = Some(reason.to_string());
        self.store.insert_order(&order).await?;
        tracing::debug!(order_id = %order.id, reason, "paper order rejected");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MS_PER_DAY: i64 = 86_400_000;

    fn engine() -> PaperEngine {
        PaperEngine::new(
            PaperStore::open_in_memory().unwrap(),
            MarketRules::builtin(),
            PaperEngineConfig::default(),
        )
    }

    /// Wednesday 2024-01-17 10:00 Shanghai, inside the CN session.
    fn cn_open_ms() -> i64 {
        chrono_tz::Asia::Shanghai
            .with_ymd_and_hms(2024, 1, 17, 10, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn buy(symbol: &str, quantity: f64) -> OrderRequest {
        OrderRequest {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            order_type: OrderKind::Market,
            quantity,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            strategy_id: None,
            market: None,
            prev_close: None,
            is_st: false,
        }
    }

    fn sell(symbol: &str, quantity: f64) -> OrderRequest {
        OrderRequest {
            side: OrderSide::Sell,
            ..buy(symbol, quantity)
        }
    }

    async fn assert_equity_invariant(engine: &PaperEngine, account_id: &str) {
        let account = engine.get_account(account_id).await.unwrap();
        let expected = account.cash
            + account
                .positions
                .iter()
                .map(|p| p.quantity * p.current_price)
                .sum::<f64>();
        assert!(
            (account.equity - expected).abs() < 1e-9,
            "equity {} != cash+positions {}",
            account.equity,
            expected
        );
        for pos in &account.positions {
            if !pos.lots.is_empty() {
                let lot_sum: f64 = pos.lots.iter().map(|l| l.quantity).sum();
                assert!(
                    (pos.quantity - lot_sum).abs() < 1e-9,
                    "position {} != lot sum {}",
                    pos.quantity,
                    lot_sum
                );
            }
            assert!(pos.quantity > 0.0, "zero-quantity position survived");
        }
    }

    #[tokio::test]
    async fn create_account_rejects_non_positive_capital() {
        let engine = engine();
        assert!(engine.create_account("a", 0.0, 0).await.is_err());
        assert!(engine.create_account("a", -100.0, 0).await.is_err());
    }

    #[tokio::test]
    async fn unknown_account_is_rejected_order() {
        let engine = engine();
        let order = engine
            .submit_order("missing", &buy("BTC/USDT", 1.0), 100.0, 0)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.reason.as_deref(), Some("Account not found"));
    }

    #[tokio::test]
    async fn crypto_buy_fills_with_slippage_and_commission() {
        let engine = engine();
        let account = engine.create_account("crypto", 100_000.0, 0).await.unwrap();

        let order = engine
            .submit_order(&account.id, &buy("BTC/USDT", 1.0), 40_000.0, 0)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        let fill = order.fill_price.unwrap();
        assert!((fill - 40_000.0 * 1.0005).abs() < 1e-6);
        let commission = order.commission.unwrap();
        assert!((commission - fill * 0.001).abs() < 1e-6);

        let loaded = engine.get_account(&account.id).await.unwrap();
        assert!((loaded.cash - (100_000.0 - fill - commission)).abs() < 1e-6);
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].lots.len(), 1);
        assert_equity_invariant(&engine, &account.id).await;
    }

    #[tokio::test]
    async fn market_closed_rejection() {
        let engine = engine();
        let account = engine.create_account("cn", 1_000_000.0, 0).await.unwrap();
        // Sunday 2024-01-14 10:00 Shanghai
        let sunday = chrono_tz::Asia::Shanghai
            .with_ymd_and_hms(2024, 1, 14, 10, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        let order = engine
            .submit_order(&account.id, &buy("600519.SH", 100.0), 1_600.0, sunday)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(
            order.reason.as_deref(),
            Some("Market cn is currently closed")
        );
    }

    #[tokio::test]
    async fn lot_size_rejection() {
        let engine = engine();
        let account = engine.create_account("cn", 1_000_000.0, 0).await.unwrap();
        let order = engine
            .submit_order(&account.id, &buy("600519.SH", 150.0), 1_600.0, cn_open_ms())
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(order.reason.unwrap().contains("lot"));
    }

    #[tokio::test]
    async fn t_plus_one_lockout() {
        let engine = engine();
        let account = engine
            .create_account("cn", 10_000_000.0, 0)
            .await
            .unwrap();
        let t0 = cn_open_ms();

        // First lot settles at t0 + 1d.
        let first = engine
            .submit_order(&account.id, &buy("600519.SH", 100.0), 1_600.0, t0)
            .await
            .unwrap();
        assert_eq!(first.status, OrderStatus::Filled);

        // Second lot two days later (Friday), settles the next day.
        let t1 = t0 + 2 * MS_PER_DAY;
        let second = engine
            .submit_order(&account.id, &buy("600519.SH", 200.0), 1_620.0, t1)
            .await
            .unwrap();
        assert_eq!(second.status, OrderStatus::Filled);

        // At t1 only the first lot is settled.
        let sellable = engine
            .sellable_quantity(&account.id, "600519.SH", t1)
            .await
            .unwrap();
        assert_eq!(sellable, 100.0);

        // Selling more than the settled quantity is rejected.
        let over = engine
            .submit_order(&account.id, &sell("600519.SH", 200.0), 1_620.0, t1)
            .await
            .unwrap();
        assert_eq!(over.status, OrderStatus::Rejected);
        assert!(over.reason.unwrap().contains("Insufficient sellable"));

        // Selling exactly the settled quantity fills.
        let ok = engine
            .submit_order(&account.id, &sell("600519.SH", 100.0), 1_620.0, t1)
            .await
            .unwrap();
        assert_eq!(ok.status, OrderStatus::Filled);

        // The locked lot remains.
        let loaded = engine.get_account(&account.id).await.unwrap();
        assert_eq!(loaded.positions[0].quantity, 200.0);
        assert_eq!(loaded.positions[0].lots.len(), 1);
        assert_equity_invariant(&engine, &account.id).await;
    }

    #[tokio::test]
    async fn uncrossed_limit_order_is_pending() {
        let engine = engine();
        let account = engine.create_account("a", 100_000.0, 0).await.unwrap();
        let req = OrderRequest {
            order_type: OrderKind::Limit,
            limit_price: Some(95.0),
            ..buy("BTC/USDT", 1.0)
        };
        let order = engine
            .submit_order(&account.id, &req, 100.0, 0)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        // Crossed: buy limit above the market fills.
        let req = OrderRequest {
            order_type: OrderKind::Limit,
            limit_price: Some(105.0),
            ..buy("BTC/USDT", 1.0)
        };
        let order = engine
            .submit_order(&account.id, &req, 100.0, 0)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn price_limit_band_rejection() {
        let engine = engine();
        let account = engine.create_account("cn", 10_000_000.0, 0).await.unwrap();
        let req = OrderRequest {
            prev_close: Some(100.0),
            ..buy("600519.SH", 100.0)
        };
        // Fill 110.5 * 1.0005 ≈ 110.56 > 110 upper band.
        let order = engine
            .submit_order(&account.id, &req, 110.5, cn_open_ms())
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(order.reason.unwrap().contains("limit band"));

        // ST symbols get the tighter ±5% band.
        let req = OrderRequest {
            prev_close: Some(100.0),
            is_st: true,
            ..buy("600519.SH", 100.0)
        };
        let order = engine
            .submit_order(&account.id, &req, 104.0, cn_open_ms())
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let req = OrderRequest {
            prev_close: Some(100.0),
            is_st: true,
            ..buy("600519.SH", 100.0)
        };
        let order = engine
            .submit_order(&account.id, &req, 104.98, cn_open_ms())
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn insufficient_cash_rejection() {
        let engine = engine();
        let account = engine.create_account("small", 1_000.0, 0).await.unwrap();
        let order = engine
            .submit_order(&account.id, &buy("BTC/USDT", 1.0), 40_000.0, 0)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(order.reason.unwrap().contains("Insufficient cash"));
        // Account untouched.
        let loaded = engine.get_account(&account.id).await.unwrap();
        assert_eq!(loaded.cash, 1_000.0);
    }

    #[tokio::test]
    async fn buy_blends_entry_price_and_sell_consumes_fifo() {
        let engine = engine();
        let account = engine.create_account("a", 1_000_000.0, 0).await.unwrap();

        engine
            .submit_order(&account.id, &buy("ETH/USDT", 10.0), 2_000.0, 0)
            .await
            .unwrap();
        engine
            .submit_order(&account.id, &buy("ETH/USDT", 10.0), 3_000.0, 0)
            .await
            .unwrap();

        let loaded = engine.get_account(&account.id).await.unwrap();
        let pos = loaded.position("ETH/USDT").unwrap();
        assert_eq!(pos.quantity, 20.0);
        // Volume-weighted entry between the two fills.
        let expected_entry = (2_000.0 * 1.0005 * 10.0 + 3_000.0 * 1.0005 * 10.0) / 20.0;
        assert!((pos.entry_price - expected_entry).abs() < 1e-6);
        assert_eq!(pos.lots.len(), 2);

        // Sell 15: fully consumes the first lot, half the second.
        engine
            .submit_order(&account.id, &sell("ETH/USDT", 15.0), 2_500.0, 0)
            .await
            .unwrap();
        let loaded = engine.get_account(&account.id).await.unwrap();
        let pos = loaded.position("ETH/USDT").unwrap();
        assert_eq!(pos.quantity, 5.0);
        assert_eq!(pos.lots.len(), 1);
        assert!((pos.lots[0].entry_price - 3_000.0 * 1.0005).abs() < 1e-6);
        assert_equity_invariant(&engine, &account.id).await;

        // Selling the rest deletes the position.
        engine
            .submit_order(&account.id, &sell("ETH/USDT", 5.0), 2_500.0, 0)
            .await
            .unwrap();
        let loaded = engine.get_account(&account.id).await.unwrap();
        assert!(loaded.position("ETH/USDT").is_none());
        assert_equity_invariant(&engine, &account.id).await;
    }

    #[tokio::test]
    async fn update_prices_marks_to_market() {
        let engine = engine();
        let account = engine.create_account("a", 1_000_000.0, 0).await.unwrap();
        engine
            .submit_order(&account.id, &buy("ETH/USDT", 10.0), 2_000.0, 0)
            .await
            .unwrap();

        let marks = HashMap::from([("ETH/USDT".to_string(), 2_500.0)]);
        let updated = engine.update_prices(&account.id, &marks, 1).await.unwrap();
        let pos = updated.position("ETH/USDT").unwrap();
        assert_eq!(pos.current_price, 2_500.0);
        assert!((pos.unrealized_pnl - (2_500.0 - pos.entry_price) * 10.0).abs() < 1e-6);
        assert_equity_invariant(&engine, &account.id).await;
    }

    #[tokio::test]
    async fn snapshots_chain_daily_pnl() {
        let engine = engine();
        let account = engine.create_account("a", 100_000.0, 0).await.unwrap();

        let s1 = engine.record_snapshot(&account.id, MS_PER_DAY).await.unwrap();
        assert_eq!(s1.daily_pnl, 0.0);

        engine
            .submit_order(&account.id, &buy("BTC/USDT", 1.0), 50_000.0, MS_PER_DAY + 1)
            .await
            .unwrap();
        let marks = HashMap::from([("BTC/USDT".to_string(), 55_000.0)]);
        engine
            .update_prices(&account.id, &marks, MS_PER_DAY + 2)
            .await
            .unwrap();

        let s2 = engine.record_snapshot(&account.id, 2 * MS_PER_DAY).await.unwrap();
        // Gained 5k on the position minus entry costs.
        assert!(s2.daily_pnl > 4_000.0);
        assert!((s2.equity - (s1.equity + s2.daily_pnl)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn metrics_healthy_below_min_days() {
        let engine = engine();
        let account = engine.create_account("a", 100_000.0, 0).await.unwrap();
        engine.record_snapshot(&account.id, 1).await.unwrap();
        let metrics = engine.get_metrics(&account.id).await.unwrap();
        assert_eq!(metrics.decay_level, decay::DecayLevel::Healthy);
        assert_eq!(metrics.rolling_sharpe_7d, 0.0);
    }

    #[tokio::test]
    async fn rejected_orders_are_kept_for_audit() {
        let engine = engine();
        let account = engine.create_account("a", 1_000.0, 0).await.unwrap();
        engine
            .submit_order(&account.id, &buy("BTC/USDT", 1.0), 40_000.0, 0)
            .await
            .unwrap();
        let orders = engine.orders(&account.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);
    }
}
