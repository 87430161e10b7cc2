// Historical crop-production series.
//
// Facts come from the data warehouse one row per unit/crop/season/year. Each
// country joins them onto WRSI units differently, so aggregation is generic
// over the grouping key and the country modules supply their own.
use crate::estimate::{SeriesStats, MIN_SERIES_POINTS};
use crate::types::{Crop, RawProductionRow, Season};
use crate::util::{parse_f64_safe, season_year};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionRecord {
    pub fnid: String,
    pub admin1: String,
    pub admin2: String,
    pub crop: Crop,
    pub season: Option<Season>,
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub not_collected: usize,
    pub unknown_product: usize,
    pub invalid_rows: usize,
}

/// Turn raw warehouse rows into typed records. Rows flagged "Not Collected",
/// rows for crops outside the model, and rows without a year or value are
/// dropped and counted.
pub fn parse_records(rows: &[RawProductionRow]) -> (Vec<ProductionRecord>, ParseReport) {
    let mut report = ParseReport { total_rows: rows.len(), ..ParseReport::default() };
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.status.as_deref().map(str::trim) == Some("Not Collected") {
            report.not_collected += 1;
            continue;
        }
        let Some(crop) = row.product.as_deref().and_then(Crop::from_product) else {
            report.unknown_product += 1;
            continue;
        };
        let year = row.season_year.as_deref().and_then(season_year);
        let value = parse_f64_safe(row.value.as_deref());
        let (Some(year), Some(value)) = (year, value) else {
            report.invalid_rows += 1;
            continue;
        };
        records.push(ProductionRecord {
            fnid: row.fnid.clone().unwrap_or_default().trim().to_string(),
            admin1: row.admin_1.clone().unwrap_or_default().trim().to_string(),
            admin2: row.admin_2.clone().unwrap_or_default().trim().to_string(),
            crop,
            season: row.season_name.as_deref().and_then(Season::parse),
            year,
            value,
        });
    }
    report.kept_rows = records.len();
    (records, report)
}

/// Yearly production per grouping key.
pub type SeriesMap<K> = BTreeMap<K, BTreeMap<i32, f64>>;

/// Sum production per key and year. Records for which `key` returns `None`
/// are left out.
pub fn aggregate<K, F>(records: &[ProductionRecord], key: F) -> SeriesMap<K>
where
    K: Ord,
    F: Fn(&ProductionRecord) -> Option<K>,
{
    let mut out: SeriesMap<K> = BTreeMap::new();
    for r in records {
        if let Some(k) = key(r) {
            *out.entry(k).or_default().entry(r.year).or_insert(0.0) += r.value;
        }
    }
    out
}

/// Drop series with fewer than five data points; they cannot anchor an
/// estimate.
pub fn retain_usable<K: Ord>(series: &mut SeriesMap<K>) {
    series.retain(|_, years| years.len() >= MIN_SERIES_POINTS);
}

pub fn stats<K: Ord + Clone>(series: &SeriesMap<K>) -> BTreeMap<K, SeriesStats> {
    series
        .iter()
        .filter_map(|(k, years)| {
            let values: Vec<f64> = years.values().copied().collect();
            SeriesStats::from_values(&values).map(|s| (k.clone(), s))
        })
        .collect()
}

pub fn values<K: Ord>(series: &SeriesMap<K>, key: &K) -> Vec<f64> {
    series
        .get(key)
        .map(|years| years.values().copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(product: &str, season: &str, year: &str, value: &str, status: &str) -> RawProductionRow {
        RawProductionRow {
            fnid: Some("SO1".to_string()),
            admin_1: Some("Bay".to_string()),
            admin_2: Some("Baidoa".to_string()),
            season_name: Some(season.to_string()),
            season_year: Some(year.to_string()),
            value: Some(value.to_string()),
            product: Some(product.to_string()),
            status: Some(status.to_string()),
        }
    }

    #[test]
    fn parse_drops_uncollected_and_unknown() {
        let rows = vec![
            raw("Maize (Corn)", "Gu off-season", "Gu 2010", "1,200", "Collected"),
            raw("Sorghum", "Deyr", "Deyr 2010", "300", "Not Collected"),
            raw("Sesame", "Gu", "Gu 2010", "10", "Collected"),
            raw("Sorghum", "Gu", "Gu 2010", "", "Collected"),
        ];
        let (records, report) = parse_records(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].crop, Crop::Maize);
        assert_eq!(records[0].season, Some(Season::Gu));
        assert_eq!(records[0].year, 2010);
        assert_eq!(records[0].value, 1200.0);
        assert_eq!(report.not_collected, 1);
        assert_eq!(report.unknown_product, 1);
        assert_eq!(report.invalid_rows, 1);
    }

    #[test]
    fn aggregate_sums_and_filters_short_series() {
        let mut records = Vec::new();
        for (i, year) in (2001..=2006).enumerate() {
            records.push(ProductionRecord {
                fnid: "A".into(),
                admin1: "X".into(),
                admin2: "A".into(),
                crop: Crop::Maize,
                season: Some(Season::Meher),
                year,
                value: 100.0 * (i + 1) as f64,
            });
        }
        // Off-season duplicate for 2001 is summed in.
        records.push(ProductionRecord { value: 50.0, year: 2001, ..records[0].clone() });
        records.push(ProductionRecord { admin2: "B".into(), ..records[0].clone() });

        let mut series = aggregate(&records, |r| Some((r.admin2.clone(), r.crop)));
        assert_eq!(series[&("A".to_string(), Crop::Maize)][&2001], 150.0);
        retain_usable(&mut series);
        assert_eq!(series.len(), 1);

        let s = stats(&series);
        let a = s[&("A".to_string(), Crop::Maize)];
        assert_eq!((a.min, a.max, a.count), (150.0, 600.0, 6));
        assert_eq!(values(&series, &("B".to_string(), Crop::Maize)), Vec::<f64>::new());
    }
}
