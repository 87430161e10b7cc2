// Crop-production estimators driven by WRSI.
use crate::util::quantile;

/// WRSI at or below this value means the minimum observed production.
pub const LINEAR_ANCHOR: f64 = 50.0;

/// Minimum number of historical production points a series needs before it
/// can be used for estimation.
pub const MIN_SERIES_POINTS: usize = 5;

/// Summary of one historical production series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Option<SeriesStats> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(SeriesStats { min, max, count: values.len() })
    }

    pub fn diff(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_usable(&self) -> bool {
        self.count >= MIN_SERIES_POINTS
    }
}

/// How a unit's estimate is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method<'a> {
    /// Scale WRSI between the historical min and max production.
    Linear(SeriesStats),
    /// Use the WRSI percent rank as a quantile of historical production.
    Quantile(&'a [f64]),
    /// No production history: the WRSI index itself is the estimate.
    RawIndex,
}

/// Linear scaling anchored at WRSI 50: `min + diff * (wrsi - 50) / 50`,
/// clamped to the minimum at or below the anchor.
pub fn linear_scaling(stats: &SeriesStats, wrsi: f64) -> f64 {
    if wrsi <= LINEAR_ANCHOR {
        stats.min
    } else {
        stats.min + stats.diff() * (wrsi - LINEAR_ANCHOR) / LINEAR_ANCHOR
    }
}

/// Quantile mapping: the WRSI percent rank picks the matching quantile of the
/// production series.
pub fn quantile_mapping(series: &[f64], rank: f64) -> Option<f64> {
    if series.len() < MIN_SERIES_POINTS {
        return None;
    }
    quantile(series, rank)
}

impl Method<'_> {
    /// `wrsi` is the raw index for `Linear`/`RawIndex` and the percent rank
    /// for `Quantile`.
    pub fn estimate(&self, wrsi: Option<f64>) -> Option<f64> {
        let w = wrsi?;
        match self {
            Method::Linear(stats) if stats.is_usable() => Some(linear_scaling(stats, w)),
            Method::Linear(_) => None,
            Method::Quantile(series) => quantile_mapping(series, w),
            Method::RawIndex => Some(w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn stats() -> SeriesStats {
        SeriesStats { min: 1000.0, max: 3000.0, count: 6 }
    }

    #[test]
    fn linear_scaling_clamps_below_anchor() {
        assert_eq!(linear_scaling(&stats(), 10.0), 1000.0);
        assert_eq!(linear_scaling(&stats(), 50.0), 1000.0);
        assert_eq!(linear_scaling(&stats(), 100.0), 3000.0);
        assert!((linear_scaling(&stats(), 75.0) - 2000.0).abs() < EPS);
    }

    #[test]
    fn short_series_are_not_estimated() {
        let short = SeriesStats { count: 4, ..stats() };
        assert_eq!(Method::Linear(short).estimate(Some(80.0)), None);
        assert_eq!(quantile_mapping(&[1.0, 2.0, 3.0, 4.0], 0.5), None);
    }

    #[test]
    fn quantile_mapping_spans_series() {
        let series = [500.0, 100.0, 300.0, 200.0, 400.0];
        assert_eq!(quantile_mapping(&series, 0.0), Some(100.0));
        assert_eq!(quantile_mapping(&series, 1.0), Some(500.0));
        assert!((quantile_mapping(&series, 0.5).unwrap() - 300.0).abs() < EPS);
        assert!((quantile_mapping(&series, 0.6).unwrap() - 340.0).abs() < EPS);
    }

    #[test]
    fn missing_wrsi_yields_missing_estimate() {
        assert_eq!(Method::RawIndex.estimate(None), None);
        assert_eq!(Method::RawIndex.estimate(Some(42.0)), Some(42.0));
        assert_eq!(Method::Linear(stats()).estimate(None), None);
    }

    #[test]
    fn stats_from_values() {
        let s = SeriesStats::from_values(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!((s.min, s.max, s.count), (1.0, 3.0, 3));
        assert!(SeriesStats::from_values(&[]).is_none());
    }
}
