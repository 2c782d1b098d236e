use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::types::{
    EquitySnapshot, Lot, OrderSide, OrderStatus, PaperAccount, PaperOrder, Position, PositionSide,
};
use crate::data::MarketKind;
use crate::engine::types::OrderKind;
use crate::error::{CoreError, CoreResult};

/// Transactional embedded store for paper accounts, positions, lots,
/// orders and equity snapshots. Single-writer; concurrent access is
/// serialised by the connection mutex.
#[derive(Clone)]
pub struct PaperStore {
    conn: Arc<Mutex<Connection>>,
}

impl PaperStore {
    pub fn open(db_path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                initial_capital REAL NOT NULL,
                cash REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS positions (
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                entry_price REAL NOT NULL,
                current_price REAL NOT NULL,
                PRIMARY KEY (account_id, symbol)
            );
            CREATE TABLE IF NOT EXISTS lots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity REAL NOT NULL,
                entry_price REAL NOT NULL,
                settlable_after INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_lots_account_symbol
                ON lots(account_id, symbol, id ASC);
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                quantity REAL NOT NULL,
                limit_price REAL,
                stop_loss REAL,
                take_profit REAL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                fill_price REAL,
                commission REAL,
                slippage_bps REAL,
                reason TEXT,
                strategy_id TEXT,
                market TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_orders_account_created
                ON orders(account_id, created_at ASC);
            CREATE TABLE IF NOT EXISTS equity_snapshots (
                account_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                equity REAL NOT NULL,
                cash REAL NOT NULL,
                positions_value REAL NOT NULL,
                daily_pnl REAL NOT NULL,
                daily_pnl_pct REAL NOT NULL,
                PRIMARY KEY (account_id, timestamp)
            );",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist an account with its positions and lots in one transaction.
    pub async fn save_account(&self, account: &PaperAccount) -> CoreResult<()> {
        let mut guard = self.conn.lock().await;
        let tx = guard.transaction()?;

        tx.execute(
            "INSERT INTO accounts (id, name, initial_capital, cash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                initial_capital = excluded.initial_capital,
                cash = excluded.cash,
                updated_at = excluded.updated_at",
            params![
                account.id,
                account.name,
                account.initial_capital,
                account.cash,
                account.created_at_ms,
                account.updated_at_ms,
            ],
        )?;

        tx.execute(
            "DELETE FROM positions WHERE account_id = ?1",
            params![account.id],
        )?;
        tx.execute("DELETE FROM lots WHERE account_id = ?1", params![account.id])?;

        {
            let mut pos_stmt = tx.prepare_cached(
                "INSERT INTO positions
                    (account_id, symbol, side, quantity, entry_price, current_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut lot_stmt = tx.prepare_cached(
                "INSERT INTO lots (account_id, symbol, quantity, entry_price, settlable_after)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for pos in &account.positions {
                pos_stmt.execute(params![
                    account.id,
                    pos.symbol,
                    side_str(pos.side),
                    pos.quantity,
                    pos.entry_price,
                    pos.current_price,
                ])?;
                for lot in &pos.lots {
                    lot_stmt.execute(params![
                        account.id,
                        pos.symbol,
                        lot.quantity,
                        lot.entry_price,
                        lot.settlable_after_ms,
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn load_account(&self, id: &str) -> CoreResult<Option<PaperAccount>> {
        let guard = self.conn.lock().await;

        let account = guard
            .query_row(
                "SELECT id, name, initial_capital, cash, created_at, updated_at
                 FROM accounts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PaperAccount {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        initial_capital: row.get(2)?,
                        cash: row.get(3)?,
                        equity: 0.0,
                        positions: vec![],
                        created_at_ms: row.get(4)?,
                        updated_at_ms: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(mut account) = account else {
            return Ok(None);
        };

        let mut stmt = guard.prepare_cached(
            "SELECT symbol, side, quantity, entry_price, current_price
             FROM positions WHERE account_id = ?1 ORDER BY symbol ASC",
        )?;
        let positions = stmt.query_map(params![id], |row| {
            let side: String = row.get(1)?;
            Ok(Position {
                symbol: row.get(0)?,
                side: parse_side(&side),
                quantity: row.get(2)?,
                entry_price: row.get(3)?,
                current_price: row.get(4)?,
                unrealized_pnl: 0.0,
                lots: vec![],
            })
        })?;
        for pos in positions {
            account.positions.push(pos?);
        }

        let mut lot_stmt = guard.prepare_cached(
            "SELECT symbol, quantity, entry_price, settlable_after
             FROM lots WHERE account_id = ?1 ORDER BY id ASC",
        )?;
        let lots = lot_stmt.query_map(params![id], |row| {
            let symbol: String = row.get(0)?;
            Ok((
                symbol,
                Lot {
                    quantity: row.get(1)?,
                    entry_price: row.get(2)?,
                    settlable_after_ms: row.get(3)?,
                },
            ))
        })?;
        for lot in lots {
            let (symbol, lot) = lot?;
            if let Some(pos) = account.positions.iter_mut().find(|p| p.symbol == symbol) {
                pos.lots.push(lot);
            }
        }

        for pos in &mut account.positions {
            pos.refresh_unrealized();
        }
        account.refresh_equity();
        Ok(Some(account))
    }

    pub async fn list_account_ids(&self) -> CoreResult<Vec<String>> {
        let guard = self.conn.lock().await;
        let mut stmt = guard.prepare_cached("SELECT id FROM accounts ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn insert_order(&self, order: &PaperOrder) -> CoreResult<()> {
        let guard = self.conn.lock().await;
        guard.execute(
            "INSERT INTO orders
                (id, account_id, symbol, side, order_type, quantity, limit_price,
                 stop_loss, take_profit, status, created_at, fill_price, commission,
                 slippage_bps, reason, strategy_id, market)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                order.id,
                order.account_id,
                order.symbol,
                order_side_str(order.side),
                order_kind_str(order.order_type),
                order.quantity,
                order.limit_price,
                order.stop_loss,
                order.take_profit,
                status_str(order.status),
                order.created_at_ms,
                order.fill_price,
                order.commission,
                order.slippage_bps,
                order.reason,
                order.strategy_id,
                order.market.map(MarketKind::as_str),
            ],
        )?;
        Ok(())
    }

    pub async fn orders_for(&self, account_id: &str) -> CoreResult<Vec<PaperOrder>> {
        let guard = self.conn.lock().await;
        let mut stmt = guard.prepare_cached(
            "SELECT id, account_id, symbol, side, order_type, quantity, limit_price,
                    stop_loss, take_profit, status, created_at, fill_price, commission,
                    slippage_bps, reason, strategy_id, market
             FROM orders WHERE account_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![account_id], |row| {
            let side: String = row.get(3)?;
            let kind: String = row.get(4)?;
            let status: String = row.get(9)?;
            let market: Option<String> = row.get(16)?;
            Ok(PaperOrder {
                id: row.get(0)?,
                account_id: row.get(1)?,
                symbol: row.get(2)?,
                side: parse_order_side(&side),
                order_type: parse_order_kind(&kind),
                quantity: row.get(5)?,
                limit_price: row.get(6)?,
                stop_loss: row.get(7)?,
                take_profit: row.get(8)?,
                status: parse_status(&status),
                created_at_ms: row.get(10)?,
                fill_price: row.get(11)?,
                commission: row.get(12)?,
                slippage_bps: row.get(13)?,
                reason: row.get(14)?,
                strategy_id: row.get(15)?,
                market: market.as_deref().and_then(parse_market),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn append_snapshot(
        &self,
        account_id: &str,
        snap: &EquitySnapshot,
    ) -> CoreResult<()> {
        let guard = self.conn.lock().await;
        guard.execute(
            "INSERT INTO equity_snapshots
                (account_id, timestamp, equity, cash, positions_value, daily_pnl, daily_pnl_pct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account_id, timestamp) DO UPDATE SET
                equity = excluded.equity,
                cash = excluded.cash,
                positions_value = excluded.positions_value,
                daily_pnl = excluded.daily_pnl,
                daily_pnl_pct = excluded.daily_pnl_pct",
            params![
                account_id,
                snap.timestamp_ms,
                snap.equity,
                snap.cash,
                snap.positions_value,
                snap.daily_pnl,
                snap.daily_pnl_pct,
            ],
        )?;
        Ok(())
    }

    pub async fn snapshots_for(&self, account_id: &str) -> CoreResult<Vec<EquitySnapshot>> {
        let guard = self.conn.lock().await;
        let mut stmt = guard.prepare_cached(
            "SELECT timestamp, equity, cash, positions_value, daily_pnl, daily_pnl_pct
             FROM equity_snapshots WHERE account_id = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![account_id], |row| {
            Ok(EquitySnapshot {
                timestamp_ms: row.get(0)?,
                equity: row.get(1)?,
                cash: row.get(2)?,
                positions_value: row.get(3)?,
                daily_pnl: row.get(4)?,
                daily_pnl_pct: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn side_str(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "long",
        PositionSide::Short => "short",
    }
}

fn parse_side(s: &str) -> PositionSide {
    if s == "short" {
        PositionSide::Short
    } else {
        PositionSide::Long
    }
}

fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn parse_order_side(s: &str) -> OrderSide {
    if s == "sell" {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

fn order_kind_str(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "market",
        OrderKind::Limit => "limit",
    }
}

fn parse_order_kind(s: &str) -> OrderKind {
    if s == "limit" {
        OrderKind::Limit
    } else {
        OrderKind::Market
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Filled => "filled",
        OrderStatus::Rejected => "rejected",
        OrderStatus::Pending => "pending",
    }
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "rejected" => OrderStatus::Rejected,
        "pending" => OrderStatus::Pending,
        _ => OrderStatus::Filled,
    }
}

fn parse_market(s: &str) -> Option<MarketKind> {
    match s {
        "crypto" => Some(MarketKind::Crypto),
        "us" => Some(MarketKind::Us),
        "cn" => Some(MarketKind::Cn),
        "hk" => Some(MarketKind::Hk),
        _ => None,
    }
}
