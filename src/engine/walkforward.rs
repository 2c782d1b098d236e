use garde::Validate;
use std::collections::HashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::backtest::BacktestEngine;
use super::context::StrategyFactory;
use super::types::BacktestConfig;
use crate::data::OhlcvBar;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct WalkForwardOptions {
    #[serde(default = "default_windows")]
    #[garde(range(min = 1, max = 100))]
    pub windows: usize,
    #[serde(default = "default_in_sample_pct")]
    #[garde(range(min = 0.1, max = 0.9))]
    pub in_sample_pct: f64,
    #[serde(default = "default_threshold")]
    #[garde(range(min = 0.0, max = 10.0))]
    pub threshold: f64,
}

fn default_windows() -> usize {
    5
}

fn default_in_sample_pct() -> f64 {
    0.7
}

fn default_threshold() -> f64 {
    0.6
}

impl Default for WalkForwardOptions {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            in_sample_pct: default_in_sample_pct(),
            threshold: default_threshold(),
        }
    }
}

/// One train/test fold. Timestamps are the first and last bar of each
/// fold (inclusive); folds never overlap.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WalkForwardWindow {
    pub train_start_ms: i64,
    pub train_end_ms: i64,
    pub test_start_ms: i64,
    pub test_end_ms: i64,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WalkForwardReport {
    pub passed: bool,
    pub windows: Vec<WalkForwardWindow>,
    pub combined_test_sharpe: f64,
    pub avg_train_sharpe: f64,
    pub ratio: f64,
    pub threshold: f64,
}

/// Rolling train/test splitter deciding whether a backtest generalises.
///
/// Each fold re-instantiates the strategy from its factory, so no memory
/// leaks across folds and every run is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkForwardValidator {
    engine: BacktestEngine,
}

impl WalkForwardValidator {
    pub fn new(engine: BacktestEngine) -> Self {
        Self { engine }
    }

    pub fn validate(
        &self,
        strategy_id: &str,
        factory: &dyn StrategyFactory,
        params: &HashMap<String, f64>,
        bars: &[OhlcvBar],
        config: &BacktestConfig,
        options: &WalkForwardOptions,
    ) -> CoreResult<WalkForwardReport> {
        options
            .validate()
            .map_err(|e| CoreError::InvalidInput(format!("walk-forward options: {e}")))?;

        if bars.len() < 2 * options.windows {
            tracing::debug!(
                strategy_id,
                bars = bars.len(),
                windows = options.windows,
                "walk-forward skipped: series too short"
            );
            return Ok(WalkForwardReport {
                passed: false,
                windows: vec![],
                combined_test_sharpe: 0.0,
                avg_train_sharpe: 0.0,
                ratio: 0.0,
                threshold: options.threshold,
            });
        }

        let window_size = bars.len() / options.windows;
        let train_len = ((window_size as f64) * options.in_sample_pct).floor() as usize;
        let train_len = train_len.clamp(1, window_size - 1);

        let mut windows = Vec::with_capacity(options.windows);
        let mut train_sharpes = Vec::with_capacity(options.windows);
        let mut test_sharpes = Vec::with_capacity(options.windows);

        for w in 0..options.windows {
            let start = w * window_size;
            let split = start + train_len;
            let end = start + window_size;

            let train = &bars[start..split];
            let test = &bars[split..end];

            let train_result =
                self.engine
                    .run(strategy_id, &*factory.build(params), train, config, None)?;
            let test_result =
                self.engine
                    .run(strategy_id, &*factory.build(params), test, config, None)?;

            let train_sharpe = sanitize(train_result.sharpe);
            let test_sharpe = sanitize(test_result.sharpe);
            train_sharpes.push(train_sharpe);
            test_sharpes.push(test_sharpe);

            windows.push(WalkForwardWindow {
                train_start_ms: train[0].timestamp_ms,
                train_end_ms: train[train.len() - 1].timestamp_ms,
                test_start_ms: test[0].timestamp_ms,
                test_end_ms: test[test.len() - 1].timestamp_ms,
                train_sharpe,
                test_sharpe,
            });
        }

        let avg_train_sharpe = mean(&train_sharpes);
        let combined_test_sharpe = mean(&test_sharpes);

        let ratio = if avg_train_sharpe == 0.0 {
            if combined_test_sharpe >= 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            let r = combined_test_sharpe / avg_train_sharpe;
            if r.is_finite() {
                r
            } else {
                0.0
            }
        };

        let passed = ratio >= options.threshold;
        tracing::info!(
            strategy_id,
            passed,
            ratio,
            avg_train_sharpe,
            combined_test_sharpe,
            "walk-forward validation complete"
        );

        Ok(WalkForwardReport {
            passed,
            windows,
            combined_test_sharpe,
            avg_train_sharpe,
            ratio,
            threshold: options.threshold,
        })
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Strategy, StrategyContext};
    use crate::engine::types::{OrderKind, Signal, SignalAction};

    struct Passive;

    impl Strategy for Passive {
        fn on_bar(
            &self,
            _bar: &OhlcvBar,
            _ctx: &mut StrategyContext<'_>,
        ) -> anyhow::Result<Option<Signal>> {
            Ok(None)
        }
    }

    struct PassiveFactory;

    impl StrategyFactory for PassiveFactory {
        fn id(&self) -> &str {
            "passive"
        }

        fn build(&self, _params: &HashMap<String, f64>) -> Box<dyn Strategy> {
            Box::new(Passive)
        }
    }

    /// Buys the first bar of every run with a fixed size; its per-fold
    /// performance tracks the fold's price drift.
    struct FirstBarBuyer;

    impl Strategy for FirstBarBuyer {
        fn on_bar(
            &self,
            _bar: &OhlcvBar,
            ctx: &mut StrategyContext<'_>,
        ) -> anyhow::Result<Option<Signal>> {
            if ctx.recall("done").is_some() {
                return Ok(None);
            }
            ctx.remember("done", 1.0);
            Ok(Some(Signal {
                action: SignalAction::Buy,
                symbol: "TEST".into(),
                size_pct: 90.0,
                order_type: OrderKind::Market,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                reason: "first bar".into(),
                confidence: 0.8,
            }))
        }
    }

    struct BuyerFactory;

    impl StrategyFactory for BuyerFactory {
        fn id(&self) -> &str {
            "buyer"
        }

        fn build(&self, _params: &HashMap<String, f64>) -> Box<dyn Strategy> {
            Box::new(FirstBarBuyer)
        }
    }

    fn rising_bars(n: usize) -> Vec<OhlcvBar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5;
                OhlcvBar {
                    timestamp_ms: i as i64 * 86_400_000,
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 100.0,
                }
            })
            .collect()
    }

    #[test]
    fn short_series_fails_without_windows() {
        let v = WalkForwardValidator::default();
        let report = v
            .validate(
                "s",
                &PassiveFactory,
                &HashMap::new(),
                &rising_bars(8),
                &BacktestConfig::new(10_000.0),
                &WalkForwardOptions::default(),
            )
            .unwrap();
        assert!(!report.passed);
        assert!(report.windows.is_empty());
    }

    #[test]
    fn folds_never_overlap() {
        let v = WalkForwardValidator::default();
        let report = v
            .validate(
                "s",
                &BuyerFactory,
                &HashMap::new(),
                &rising_bars(100),
                &BacktestConfig::new(10_000.0),
                &WalkForwardOptions::default(),
            )
            .unwrap();
        assert_eq!(report.windows.len(), 5);
        for w in &report.windows {
            assert!(w.train_start_ms <= w.train_end_ms);
            assert!(w.train_end_ms < w.test_start_ms);
            assert!(w.test_start_ms <= w.test_end_ms);
        }
        for pair in report.windows.windows(2) {
            assert!(pair[0].test_end_ms < pair[1].train_start_ms);
        }
    }

    #[test]
    fn fold_sizes_follow_in_sample_pct() {
        // 100 bars, 5 windows → window 20, train 14, test 6
        let bars = rising_bars(100);
        let v = WalkForwardValidator::default();
        let report = v
            .validate(
                "s",
                &PassiveFactory,
                &HashMap::new(),
                &bars,
                &BacktestConfig::new(10_000.0),
                &WalkForwardOptions::default(),
            )
            .unwrap();
        let w = &report.windows[0];
        let train_bars = (w.train_end_ms - w.train_start_ms) / 86_400_000 + 1;
        let test_bars = (w.test_end_ms - w.test_start_ms) / 86_400_000 + 1;
        assert_eq!(train_bars, 14);
        assert_eq!(test_bars, 6);
    }

    #[test]
    fn passive_strategy_ratio_is_one() {
        // All fold sharpes are NaN → collapse to 0; avg train 0 and
        // combined test 0 ⇒ ratio 1 ⇒ passes at the default threshold.
        let v = WalkForwardValidator::default();
        let report = v
            .validate(
                "s",
                &PassiveFactory,
                &HashMap::new(),
                &rising_bars(50),
                &BacktestConfig::new(10_000.0),
                &WalkForwardOptions::default(),
            )
            .unwrap();
        assert_eq!(report.avg_train_sharpe, 0.0);
        assert_eq!(report.combined_test_sharpe, 0.0);
        assert_eq!(report.ratio, 1.0);
        assert!(report.passed);
    }

    #[test]
    fn consistent_uptrend_passes() {
        let v = WalkForwardValidator::default();
        let report = v
            .validate(
                "s",
                &BuyerFactory,
                &HashMap::new(),
                &rising_bars(200),
                &BacktestConfig::new(100_000.0),
                &WalkForwardOptions::default(),
            )
            .unwrap();
        // Steady drift generalises: test folds perform like train folds,
        // so the ratio lands well clear of zero.
        assert!(report.ratio > 0.3, "ratio was {}", report.ratio);
        assert!(report.avg_train_sharpe > 0.0);
        assert!(report.combined_test_sharpe > 0.0);
    }

    #[test]
    fn invalid_options_rejected() {
        let v = WalkForwardValidator::default();
        let bad = WalkForwardOptions {
            windows: 0,
            ..WalkForwardOptions::default()
        };
        let err = v
            .validate(
                "s",
                &PassiveFactory,
                &HashMap::new(),
                &rising_bars(50),
                &BacktestConfig::new(10_000.0),
                &bad,
            )
            .unwrap_err();
        assert_eq!(err.category(), "invalid_input");
    }
}
