#![allow(dead_code)]

use quantfund::data::OhlcvBar;

pub const MS_PER_DAY: i64 = 86_400_000;

/// Opt-in log capture for debugging: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Daily bars from a close series; highs/lows straddle the close by 1%.
pub fn daily_bars(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp_ms: i as i64 * MS_PER_DAY,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 10_000.0,
        })
        .collect()
}

/// A deterministic tape: flat for the first third (small periodic
/// wobble), then a steady climb. The flat head lets moving averages
/// converge so the later trend produces a genuine crossover.
pub fn trending_closes(n: usize, start: f64, drift: f64) -> Vec<f64> {
    let flat = n / 3;
    (0..n)
        .map(|i| {
            let wobble = match i % 4 {
                0 => 0.0,
                1 => 0.6,
                2 => -0.3,
                _ => 0.3,
            };
            let trend = if i > flat { (i - flat) as f64 * drift } else { 0.0 };
            start + trend + wobble
        })
        .collect()
}

/// Flat tape, then a selloff, then a recovery past the old high.
pub fn v_shape_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + f64::from(i % 2)).collect();
    closes.extend((0..10).map(|i| 99.0 - f64::from(i) * 2.5));
    closes.extend((0..20).map(|i| 76.5 + f64::from(i) * 2.0));
    closes
}
