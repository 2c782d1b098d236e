//! Trading bridge contract consumed by fund-manager hosts.
//!
//! The core never places real orders itself; it defines the duck-typed
//! surface a live execution venue must expose, classifies its failures
//! into the adapter taxonomy, and wraps read calls with a single retry
//! on transient network failures. Write calls are never retried.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::types::OrderKind;
use crate::error::{AdapterErrorKind, CoreError, CoreResult};
use crate::paper::types::OrderSide;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderKind,
    pub quantity: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeOrder {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: String,
    pub filled_quantity: f64,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeBalance {
    pub total_usd: f64,
    pub free_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgePosition {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
}

/// Live execution venue surface. Implementations report failures via
/// `anyhow`; consumers classify them with [`AdapterErrorKind::classify`].
#[async_trait]
pub trait TradingBridge: Send + Sync {
    async fn place_order(&self, req: &BridgeOrderRequest) -> anyhow::Result<BridgeOrder>;

    async fn cancel_order(&self, id: &str, symbol: &str) -> anyhow::Result<()>;

    async fn fetch_balance(&self) -> anyhow::Result<BridgeBalance>;

    async fn fetch_ticker(&self, symbol: &str) -> anyhow::Result<crate::data::Ticker>;

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> anyhow::Result<Vec<BridgeOrder>>;

    async fn fetch_order(&self, id: &str, symbol: &str) -> anyhow::Result<BridgeOrder>;

    async fn fetch_positions(&self, symbol: Option<&str>) -> anyhow::Result<Vec<BridgePosition>>;
}

/// Read-call wrapper: one retry on network/timeout failures, structured
/// error classification on everything. Writes (`place_order`,
/// `cancel_order`) pass through untouched so a timed-out order is never
/// double-submitted.
pub struct RetryingBridge<B> {
    inner: B,
}

impl<B: TradingBridge> RetryingBridge<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    pub async fn place_order(&self, req: &BridgeOrderRequest) -> CoreResult<BridgeOrder> {
        self.inner
            .place_order(req)
            .await
            .map_err(|e| CoreError::from_adapter_failure(&e))
    }

    pub async fn cancel_order(&self, id: &str, symbol: &str) -> CoreResult<()> {
        self.inner
            .cancel_order(id, symbol)
            .await
            .map_err(|e| CoreError::from_adapter_failure(&e))
    }

    pub async fn fetch_balance(&self) -> CoreResult<BridgeBalance> {
        retry_read(|| self.inner.fetch_balance()).await
    }

    pub async fn fetch_ticker(&self, symbol: &str) -> CoreResult<crate::data::Ticker> {
        retry_read(|| self.inner.fetch_ticker(symbol)).await
    }

    pub async fn fetch_open_orders(&self, symbol: Option<&str>) -> CoreResult<Vec<BridgeOrder>> {
        retry_read(|| self.inner.fetch_open_orders(symbol)).await
    }

    pub async fn fetch_order(&self, id: &str, symbol: &str) -> CoreResult<BridgeOrder> {
        retry_read(|| self.inner.fetch_order(id, symbol)).await
    }

    pub async fn fetch_positions(&self, symbol: Option<&str>) -> CoreResult<Vec<BridgePosition>> {
        retry_read(|| self.inner.fetch_positions(symbol)).await
    }
}

async fn retry_read<T, F, Fut>(mut call: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(first) => {
            let classified = CoreError::from_adapter_failure(&first);
            let retryable = matches!(
                classified,
                CoreError::Adapter {
                    kind: AdapterErrorKind::Network,
                    ..
                }
            );
            if !retryable {
                return Err(classified);
            }
            tracing::debug!(error = %format!("{first:#}"), "retrying bridge read once");
            call()
                .await
                .map_err(|e| CoreError::from_adapter_failure(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyBridge {
        balance_calls: AtomicUsize,
        place_calls: AtomicUsize,
        auth_fail: bool,
    }

    #[async_trait]
    impl TradingBridge for FlakyBridge {
        async fn place_order(&self, req: &BridgeOrderRequest) -> anyhow::Result<BridgeOrder> {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection timed out placing {}", req.symbol)
        }

        async fn cancel_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn fetch_balance(&self) -> anyhow::Result<BridgeBalance> {
            let n = self.balance_calls.fetch_add(1, Ordering::SeqCst);
            if self.auth_fail {
                anyhow::bail!("invalid API key");
            }
            if n == 0 {
                anyhow::bail!("request timed out");
            }
            Ok(BridgeBalance {
                total_usd: 1_000.0,
                free_usd: 900.0,
            })
        }

        async fn fetch_ticker(&self, _symbol: &str) -> anyhow::Result<crate::data::Ticker> {
            anyhow::bail!("unreachable in tests")
        }

        async fn fetch_open_orders(
            &self,
            _symbol: Option<&str>,
        ) -> anyhow::Result<Vec<BridgeOrder>> {
            Ok(vec![])
        }

        async fn fetch_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<BridgeOrder> {
            anyhow::bail!("unknown order")
        }

        async fn fetch_positions(
            &self,
            _symbol: Option<&str>,
        ) -> anyhow::Result<Vec<BridgePosition>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn reads_retry_once_on_network_failure() {
        let bridge = RetryingBridge::new(FlakyBridge::default());
        let balance = bridge.fetch_balance().await.unwrap();
        assert_eq!(balance.total_usd, 1_000.0);
        assert_eq!(bridge.into_inner().balance_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reads_do_not_retry_auth_failures() {
        let bridge = RetryingBridge::new(FlakyBridge {
            auth_fail: true,
            ..FlakyBridge::default()
        });
        let err = bridge.fetch_balance().await.unwrap_err();
        match err {
            CoreError::Adapter { kind, .. } => assert_eq!(kind, AdapterErrorKind::Auth),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bridge.into_inner().balance_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn writes_are_never_retried() {
        let bridge = RetryingBridge::new(FlakyBridge::default());
        let err = bridge
            .place_order(&BridgeOrderRequest {
                symbol: "BTC/USDT".into(),
                side: OrderSide::Buy,
                order_type: OrderKind::Market,
                quantity: 1.0,
                limit_price: None,
                client_order_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), "adapter");
        assert_eq!(bridge.into_inner().place_calls.load(Ordering::SeqCst), 1);
    }
}
