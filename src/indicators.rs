//! Technical indicators over a daily close series
//!
//! Pure functions, no I/O. Each indicator returns the value at the last
//! point of the series, or `None` when the series is too short.

use std::collections::BTreeMap;

pub const SMA_PERIOD: usize = 20;
pub const EMA_PERIOD: usize = 20;
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BBANDS_PERIOD: usize = 20;
pub const BBANDS_STD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle, in percent
    pub bandwidth: Option<f64>,
    /// Position of the last close inside the bands (%B)
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub bollinger: Option<Bollinger>,
}

impl IndicatorSnapshot {
    pub fn compute(closes: &[f64]) -> Self {
        let (macd_line, macd_signal) = macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL)
            .map(|(line, signal)| (Some(line), signal))
            .unwrap_or((None, None));

        Self {
            close: closes.last().copied(),
            rsi: rsi(closes, RSI_PERIOD),
            macd_line,
            macd_signal,
            sma: sma(closes, SMA_PERIOD),
            ema: ema(closes, EMA_PERIOD),
            bollinger: bollinger(closes, BBANDS_PERIOD, BBANDS_STD),
        }
    }

    /// Flatten into the `Today` metrics category.
    pub fn to_metrics(&self) -> BTreeMap<String, Option<f64>> {
        let bands = self.bollinger;
        [
            ("Close", self.close),
            ("RSI", self.rsi),
            ("MACD_Line", self.macd_line),
            ("MACD_Signal", self.macd_signal),
            ("SMA_20", self.sma),
            ("EMA_20", self.ema),
            ("BB_upper", bands.map(|b| b.upper)),
            ("BB_middle", bands.map(|b| b.middle)),
            ("BB_lower", bands.map(|b| b.lower)),
            ("BB_bandwidth", bands.and_then(|b| b.bandwidth)),
            ("BB_percent", bands.and_then(|b| b.percent)),
        ]
        .into_iter()
        .map(|(label, value)| (label.to_string(), value))
        .collect()
    }
}

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Full EMA series, seeded with the SMA of the first `period` values.
/// Index `i` of the result corresponds to `values[i + period - 1]`.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    for value in &values[period..] {
        let prev = out[out.len() - 1];
        out.push(alpha * value + (1.0 - alpha) * prev);
    }
    out
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// Wilder's RSI.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

    for delta in &deltas[period..] {
        avg_gain = (avg_gain * (period as f64 - 1.0) + delta.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-delta).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line and, when enough history exists, its signal line.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, Option<f64>)> {
    if fast == 0 || slow <= fast || values.len() < slow {
        return None;
    }
    let fast_series = ema_series(values, fast);
    let slow_series = ema_series(values, slow);

    // Align both series on the slow EMA's first point.
    let offset = slow - fast;
    let line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, slow_value)| fast_series[i + offset] - slow_value)
        .collect();

    let last = *line.last()?;
    Some((last, ema(&line, signal)))
}

pub fn bollinger(values: &[f64], period: usize, std_devs: f64) -> Option<Bollinger> {
    let middle = sma(values, period)?;
    let window = &values[values.len() - period..];
    // Population standard deviation (ddof = 0).
    let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let deviation = variance.sqrt() * std_devs;

    let upper = middle + deviation;
    let lower = middle - deviation;
    let close = *values.last()?;

    let bandwidth = (middle != 0.0).then(|| (upper - lower) / middle * 100.0);
    let percent = (upper != lower).then(|| (close - lower) / (upper - lower));

    Some(Bollinger {
        upper,
        middle,
        lower,
        bandwidth,
        percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 5), Some(3.0));
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 2), Some(4.5));
        assert_eq!(sma(&[1.0, 2.0], 5), None);
    }

    #[test]
    fn test_ema_of_constant_series() {
        let values = vec![10.0; 40];
        assert!(approx(ema(&values, 20).unwrap(), 10.0));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = [2.0, 4.0, 6.0];
        // seed = 3.0, alpha = 2/3 -> 2/3 * 6 + 1/3 * 3 = 5
        assert!(approx(ema(&values, 2).unwrap(), 5.0));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (1..=30).map(f64::from).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let flat = vec![5.0; 30];
        assert_eq!(rsi(&flat, 14), Some(50.0));

        let falling: Vec<f64> = (1..=30).rev().map(f64::from).collect();
        assert!(approx(rsi(&falling, 14).unwrap(), 0.0));

        assert_eq!(rsi(&rising[..14], 14), None);
    }

    #[test]
    fn test_macd_of_constant_series_is_zero() {
        let values = vec![100.0; 60];
        let (line, signal) = macd(&values, 12, 26, 9).unwrap();
        assert!(approx(line, 0.0));
        assert!(approx(signal.unwrap(), 0.0));
    }

    #[test]
    fn test_macd_signal_needs_history() {
        let values: Vec<f64> = (1..=30).map(f64::from).collect();
        let (line, signal) = macd(&values, 12, 26, 9).unwrap();
        assert!(line > 0.0);
        assert_eq!(signal, None);
        assert!(macd(&values[..20], 12, 26, 9).is_none());
    }

    #[test]
    fn test_bollinger_flat_series() {
        let bands = bollinger(&vec![50.0; 20], 20, 2.0).unwrap();
        assert!(approx(bands.upper, 50.0));
        assert!(approx(bands.lower, 50.0));
        assert_eq!(bands.bandwidth, Some(0.0));
        assert_eq!(bands.percent, None);
    }

    #[test]
    fn test_snapshot_metrics_labels() {
        let closes: Vec<f64> = (1..=60).map(|v| f64::from(v) * 1.5).collect();
        let snapshot = IndicatorSnapshot::compute(&closes);
        let metrics = snapshot.to_metrics();

        assert_eq!(metrics.get("Close"), Some(&Some(90.0)));
        assert!(metrics["RSI"].is_some());
        assert!(metrics["MACD_Signal"].is_some());
        assert!(metrics["BB_percent"].is_some());
        assert_eq!(metrics.len(), 11);
    }

    #[test]
    fn test_snapshot_of_short_series() {
        let snapshot = IndicatorSnapshot::compute(&[1.0, 2.0]);
        assert_eq!(snapshot.close, Some(2.0));
        assert_eq!(snapshot.rsi, None);
        assert_eq!(snapshot.bollinger, None);
    }
}
