use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Trailing window (daily samples) for the long-term trend anchor.
pub const TREND_WINDOW: usize = 200;
/// Trailing window (daily samples) for the swing-high reference.
pub const SWING_WINDOW: usize = 180;
/// Minimum series length for a full evaluation: the trend window plus margin.
pub const MIN_SAMPLES: usize = 210;

/// Accumulation band: drawdown from the swing high, closed on both ends.
const ACCUMULATION_DRAWDOWN_MIN: f64 = -40.0;
const ACCUMULATION_DRAWDOWN_MAX: f64 = -30.0;
/// Extension above trend at which profit management kicks in (inclusive).
const PROFIT_TAKING_EXTENSION: f64 = 25.0;

/// Daily close series for one coin, ascending by date, one sample per day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<f64>,
}

impl PriceSeries {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Accumulation,
    ProfitTaking,
    None,
}

impl SignalType {
    /// Status label used by the weekly digest.
    pub fn status_label(self) -> &'static str {
        match self {
            SignalType::Accumulation => "Accumulate",
            SignalType::ProfitTaking => "Profit Management",
            SignalType::None => "Hold",
        }
    }
}

/// Derived view of one series: trend anchor, swing high and the two
/// percentages the classification reads. Fields are `None` when there is not
/// enough history or the reference value is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSnapshot {
    pub current_price: f64,
    pub moving_average: Option<f64>,
    pub swing_high: Option<f64>,
    pub drawdown_pct: Option<f64>,
    pub extension_pct: Option<f64>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Compute the trend snapshot for an ascending daily close series.
///
/// The moving average needs a full [`TREND_WINDOW`] of samples; the swing
/// window clamps to whatever history exists. Percentages are rounded to two
/// decimals before anything reads them, so boundary checks are exact.
/// Returns `None` only for an empty series (no current price).
pub fn analyze(series: &PriceSeries) -> Option<TrendSnapshot> {
    let current_price = series.last_price()?;
    let n = series.len();

    let moving_average = (n >= TREND_WINDOW).then(|| {
        let tail = &series.prices[n - TREND_WINDOW..];
        tail.mean()
    });
    let swing_high = Some(
        series.prices[n - SWING_WINDOW.min(n)..]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max),
    );

    let drawdown_pct = swing_high
        .filter(|h| *h != 0.0)
        .map(|h| round2((current_price - h) / h * 100.0));
    let extension_pct = moving_average
        .filter(|m| *m != 0.0)
        .map(|m| round2((current_price - m) / m * 100.0));

    Some(TrendSnapshot {
        current_price,
        moving_average,
        swing_high,
        drawdown_pct,
        extension_pct,
    })
}

/// Classify a snapshot. Accumulation wins over profit-taking; a condition
/// with an undefined operand simply does not match.
pub fn classify(snap: &TrendSnapshot) -> SignalType {
    if let (Some(dd), Some(ext)) = (snap.drawdown_pct, snap.extension_pct)
        && (ACCUMULATION_DRAWDOWN_MIN..=ACCUMULATION_DRAWDOWN_MAX).contains(&dd)
        && ext < 0.0
    {
        return SignalType::Accumulation;
    }
    if let Some(ext) = snap.extension_pct
        && ext >= PROFIT_TAKING_EXTENSION
    {
        return SignalType::ProfitTaking;
    }
    SignalType::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(prices: Vec<f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..prices.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        PriceSeries { dates, prices }
    }

    fn flat_then_last(level: f64, n: usize, last: f64) -> PriceSeries {
        let mut prices = vec![level; n - 1];
        prices.push(last);
        series(prices)
    }

    fn snapshot(dd: Option<f64>, ext: Option<f64>) -> TrendSnapshot {
        TrendSnapshot {
            current_price: 100.0,
            moving_average: ext.map(|_| 100.0),
            swing_high: dd.map(|_| 100.0),
            drawdown_pct: dd,
            extension_pct: ext,
        }
    }

    #[test]
    fn moving_average_undefined_below_window() {
        let snap = analyze(&series(vec![100.0; 199])).unwrap();
        assert!(snap.moving_average.is_none());
        assert!(snap.extension_pct.is_none());

        let snap = analyze(&series(vec![100.0; 200])).unwrap();
        assert_eq!(snap.moving_average, Some(100.0));
    }

    #[test]
    fn moving_average_ignores_samples_older_than_window() {
        let mut prices = vec![1.0; 50];
        prices.extend(vec![100.0; 200]);
        let a = analyze(&series(prices)).unwrap();

        let mut prices = vec![9999.0; 50];
        prices.extend(vec![100.0; 200]);
        let b = analyze(&series(prices)).unwrap();

        assert_eq!(a.moving_average, Some(100.0));
        assert_eq!(a.moving_average, b.moving_average);
    }

    #[test]
    fn swing_high_clamps_to_short_history() {
        let snap = analyze(&series(vec![10.0, 50.0, 20.0])).unwrap();
        assert_eq!(snap.swing_high, Some(50.0));
    }

    #[test]
    fn swing_high_uses_exactly_last_window() {
        // The 300.0 peak sits outside the trailing 180 samples.
        let mut prices = vec![300.0; 70];
        prices.extend(vec![100.0; 180]);
        let snap = analyze(&series(prices)).unwrap();
        assert_eq!(snap.swing_high, Some(100.0));
    }

    #[test]
    fn empty_series_has_no_snapshot() {
        assert!(analyze(&PriceSeries::default()).is_none());
    }

    #[test]
    fn drawdown_at_exact_boundary() {
        // 199 closes at 100, last at 60: drawdown is exactly -40.0 and the
        // price sits below the 200-day mean.
        let snap = analyze(&flat_then_last(100.0, 200, 60.0)).unwrap();
        assert_eq!(snap.drawdown_pct, Some(-40.0));
        assert!(snap.extension_pct.unwrap() < 0.0);
        assert_eq!(classify(&snap), SignalType::Accumulation);
    }

    #[test]
    fn drawdown_past_band_is_not_accumulation() {
        let snap = analyze(&flat_then_last(100.0, 200, 59.0)).unwrap();
        assert_eq!(snap.drawdown_pct, Some(-41.0));
        assert_eq!(classify(&snap), SignalType::None);
    }

    #[test]
    fn rounding_happens_before_classification() {
        // Raw drawdown -40.004% rounds to the -40.0 boundary.
        let snap = analyze(&flat_then_last(100.0, 200, 59.996)).unwrap();
        assert_eq!(snap.drawdown_pct, Some(-40.0));
        assert_eq!(classify(&snap), SignalType::Accumulation);
    }

    #[test]
    fn extension_boundary_is_inclusive() {
        assert_eq!(
            classify(&snapshot(Some(-5.0), Some(25.0))),
            SignalType::ProfitTaking
        );
        assert_eq!(
            classify(&snapshot(Some(-5.0), Some(24.99))),
            SignalType::None
        );
    }

    #[test]
    fn accumulation_needs_both_conditions() {
        // In the drawdown band but above trend: falls through profit-taking
        // (extension < 25) down to None.
        assert_eq!(classify(&snapshot(Some(-35.0), Some(5.0))), SignalType::None);
        // Band + below trend is the real thing.
        assert_eq!(
            classify(&snapshot(Some(-35.0), Some(-5.0))),
            SignalType::Accumulation
        );
    }

    #[test]
    fn undefined_operands_never_match() {
        assert_eq!(classify(&snapshot(Some(-35.0), None)), SignalType::None);
        assert_eq!(classify(&snapshot(None, Some(30.0))), SignalType::ProfitTaking);
        assert_eq!(classify(&snapshot(None, None)), SignalType::None);
    }

    #[test]
    fn zero_references_leave_percentages_undefined() {
        let snap = analyze(&series(vec![0.0; 210])).unwrap();
        assert!(snap.drawdown_pct.is_none());
        assert!(snap.extension_pct.is_none());
        assert_eq!(classify(&snap), SignalType::None);
    }

    #[test]
    fn classification_is_deterministic() {
        let s = flat_then_last(100.0, 210, 65.0);
        let a = analyze(&s).unwrap();
        let b = analyze(&s).unwrap();
        assert_eq!(a, b);
        assert_eq!(classify(&a), classify(&b));
    }
}
