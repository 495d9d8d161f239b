//! Indicators: pure functions from bar history to one number per bar.
//!
//! Incremental runs evaluate [`Indicator::value`] on the trailing window each
//! tick; vectorized runs call [`Indicator::compute`] once per stream before
//! the loop. The default `compute` is built on `value`, so both schedules
//! produce bit-identical series.

use crate::domain::Bar;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Trait for indicators.
///
/// No value at bar t may depend on bars after t.
pub trait Indicator: Send + Sync {
    /// Lookup key, unique within a strategy (e.g. "sma_20").
    fn name(&self) -> &str;

    /// Bars of history needed before the current one.
    fn lookback(&self) -> usize;

    /// Value at the last bar of `window`. The window ends at the current bar
    /// and holds at most `lookback() + 1` bars. `f64::NAN` while warming up.
    fn value(&self, window: &[Bar]) -> f64;

    /// Whole-series evaluation. Overrides must agree with `value` exactly.
    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let span = self.lookback() + 1;
        (0..bars.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(span);
                self.value(&bars[start..=i])
            })
            .collect()
    }
}

/// Compute every indicator for every stream, streams in parallel.
///
/// Result is indexed `[stream][indicator]`, each series as long as that
/// stream's bars.
pub fn precompute_indicators(
    bars_by_stream: &[Vec<Bar>],
    indicators: &[Box<dyn Indicator>],
) -> Vec<Vec<Vec<f64>>> {
    bars_by_stream
        .par_iter()
        .map(|bars| {
            indicators
                .iter()
                .map(|indicator| {
                    let series = indicator.compute(bars);
                    debug_assert_eq!(series.len(), bars.len(), "{}", indicator.name());
                    series
                })
                .collect()
        })
        .collect()
}

/// Largest lookback across `indicators`.
pub fn compute_warmup(indicators: &[Box<dyn Indicator>]) -> usize {
    indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
}

/// Simple moving average of closes.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// `period` of zero is treated as one.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn value(&self, window: &[Bar]) -> f64 {
        if window.len() < self.period {
            return f64::NAN;
        }
        // exact decimal sum, one conversion at the end
        let sum: Decimal = window[window.len() - self.period..]
            .iter()
            .map(|bar| bar.close)
            .sum();
        (sum / Decimal::from(self.period))
            .to_f64()
            .unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
pub(crate) fn make_bars(closes: &[i64]) -> Vec<Bar> {
    use chrono::NaiveDate;
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let c = Decimal::from(c);
            Bar::new(
                start + chrono::Duration::days(i as i64),
                c,
                c,
                c,
                c,
                Decimal::from(1000),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warms_up_then_averages() {
        let bars = make_bars(&[10, 11, 12, 13, 14]);
        let series = Sma::new(3).compute(&bars);
        assert!(series[0].is_nan());
        assert!(series[1].is_nan());
        assert_eq!(series[2], 11.0);
        assert_eq!(series[4], 13.0);
    }

    #[test]
    fn window_value_matches_full_series() {
        let bars = make_bars(&[5, 9, 2, 7, 7, 1, 8]);
        let sma = Sma::new(4);
        let full = sma.compute(&bars);
        for i in 0..bars.len() {
            let start = (i + 1).saturating_sub(sma.lookback() + 1);
            let v = sma.value(&bars[start..=i]);
            assert!(v == full[i] || (v.is_nan() && full[i].is_nan()));
        }
    }

    #[test]
    fn truncated_history_does_not_change_past_values() {
        let bars = make_bars(&[3, 4, 5, 6, 7, 8, 9]);
        let sma = Sma::new(3);
        let full = sma.compute(&bars);
        let truncated = sma.compute(&bars[..5]);
        assert_eq!(&full[2..5], &truncated[2..5]);
    }

    #[test]
    fn precompute_covers_every_stream() {
        let streams = vec![make_bars(&[1, 2, 3]), make_bars(&[4, 5])];
        let indicators: Vec<Box<dyn Indicator>> = vec![Box::new(Sma::new(2))];
        let out = precompute_indicators(&streams, &indicators);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0].len(), 3);
        assert_eq!(out[1][0][1], 4.5);
        assert_eq!(compute_warmup(&indicators), 1);
    }
}
