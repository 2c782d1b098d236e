pub mod backtest;
pub mod context;
pub mod metrics;
pub mod types;
pub mod walkforward;

pub use backtest::BacktestEngine;
pub use context::{PortfolioView, PositionView, Regime, Strategy, StrategyContext, StrategyFactory};
pub use types::{
    BacktestConfig, BacktestResult, OrderKind, Signal, SignalAction, TradeRecord,
};
pub use walkforward::{WalkForwardOptions, WalkForwardReport, WalkForwardValidator};
