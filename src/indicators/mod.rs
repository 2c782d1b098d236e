//! Pure indicator functions over numeric sequences.
//!
//! Every function returns output the same length as its input, with `NaN`
//! in positions where the indicator is not yet defined (warm-up). No
//! hidden state anywhere.

/// Rolling arithmetic mean. Defined from index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = window_sum / period as f64;
    for i in period..n {
        window_sum += values[i] - values[i - period];
        out[i] = window_sum / period as f64;
    }
    out
}

/// Exponential moving average seeded by the SMA of the first `period`
/// values, then `ema_i = v_i * k + ema_{i-1} * (1 - k)` with
/// `k = 2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    ema_seeded(values, period, 0)
}

/// EMA where the series only becomes meaningful at `offset` (used for the
/// MACD signal line, whose input carries a NaN warm-up prefix).
fn ema_seeded(values: &[f64], period: usize, offset: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || offset >= n || n - offset < period {
        return out;
    }
    let seed_end = offset + period;
    let seed: f64 = values[offset..seed_end].iter().sum::<f64>() / period as f64;
    let k = 2.0 / (period as f64 + 1.0);
    out[seed_end - 1] = seed;
    for i in seed_end..n {
        out[i] = values[i] * k + out[i - 1] * (1.0 - k);
    }
    out
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first `period + 1` positions are undefined. A zero average loss
/// pins RSI at 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period + 2 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let diff = values[i] - values[i - 1];
        if diff > 0.0 {
            avg_gain += diff;
        } else {
            avg_loss += -diff;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let p = period as f64;
    for i in (period + 1)..n {
        let diff = values[i] - values[i - 1];
        let gain = diff.max(0.0);
        let loss = (-diff).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
    }
    out
}

#[derive(Debug, Clone)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line, signal line and histogram as three same-length arrays.
/// NaN warm-up windows propagate through all three.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdOutput {
    let n = values.len();
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let mut macd_line = vec![f64::NAN; n];
    for i in 0..n {
        if !fast_ema[i].is_nan() && !slow_ema[i].is_nan() {
            macd_line[i] = fast_ema[i] - slow_ema[i];
        }
    }

    let first_defined = macd_line.iter().position(|v| !v.is_nan());
    let signal_line = match first_defined {
        Some(offset) => ema_seeded(&macd_line, signal, offset),
        None => vec![f64::NAN; n],
    };

    let mut histogram = vec![f64::NAN; n];
    for i in 0..n {
        if !macd_line[i].is_nan() && !signal_line[i].is_nan() {
            histogram[i] = macd_line[i] - signal_line[i];
        }
    }

    MacdOutput {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

#[derive(Debug, Clone)]
pub struct BollingerOutput {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands: SMA middle, ±`k` sample standard deviations.
/// Variance uses a two-pass computation per window.
pub fn bollinger_bands(values: &[f64], period: usize, k: f64) -> BollingerOutput {
    let n = values.len();
    let mut middle = vec![f64::NAN; n];
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    if period < 2 || n < period {
        return BollingerOutput {
            middle,
            upper,
            lower,
        };
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let m = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        let sd = var.sqrt();
        middle[i] = m;
        upper[i] = m + k * sd;
        lower[i] = m - k * sd;
    }

    BollingerOutput {
        middle,
        upper,
        lower,
    }
}

/// Average True Range with Wilder smoothing. The first bar's true range
/// falls back to high − low.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = highs.len().min(lows.len()).min(closes.len());
    let mut out = vec![f64::NAN; n.max(highs.len())];
    if period == 0 || n < period {
        return out;
    }

    let mut tr = Vec::with_capacity(n);
    for i in 0..n {
        let range = highs[i] - lows[i];
        if i == 0 {
            tr.push(range);
        } else {
            let prev_close = closes[i - 1];
            tr.push(range.max((highs[i] - prev_close).abs()).max((lows[i] - prev_close).abs()));
        }
    }

    let mut value = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = value;
    let p = period as f64;
    for i in period..n {
        value = (value * (p - 1.0) + tr[i]) / p;
        out[i] = value;
    }
    out
}
