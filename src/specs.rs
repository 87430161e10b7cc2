// Problem specifications: a value expressed as a percent of its value in a
// reference period. Shared by the staple price and crop production jobs.
use crate::types::{RawCropFact, SpecPreviewRow};
use crate::util::{format_number, season_year};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Mean,
    Sum,
}

/// Values per (period, product). Periods are labels such as `2019` or
/// `2017-2018` and sort as strings.
#[derive(Debug, Clone, Default)]
pub struct SpecTable {
    pub label: String,
    pub values: BTreeMap<(String, String), f64>,
}

impl SpecTable {
    pub fn build<I>(label: &str, rows: I, reduce: Reduce) -> Self
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let mut acc: BTreeMap<(String, String), (f64, usize)> = BTreeMap::new();
        for (period, product, value) in rows {
            let e = acc.entry((period, product)).or_default();
            e.0 += value;
            e.1 += 1;
        }
        let values = acc
            .into_iter()
            .map(|(key, (sum, count))| match reduce {
                Reduce::Sum => (key, sum),
                Reduce::Mean => (key, sum / count as f64),
            })
            .collect();
        SpecTable { label: label.to_string(), values }
    }

    pub fn products(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.values.keys().map(|(_, p)| p.as_str()).collect();
        set.into_iter().collect()
    }

    pub fn periods(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.values.keys().map(|(p, _)| p.as_str()).collect();
        set.into_iter().collect()
    }

    pub fn get(&self, period: &str, product: &str) -> Option<f64> {
        self.values.get(&(period.to_string(), product.to_string())).copied()
    }

    /// Percent of the baseline period per (period, product). Products with
    /// no usable baseline get no values.
    pub fn problem_specs(&self, baseline: &str) -> BTreeMap<(String, String), f64> {
        let mut out = BTreeMap::new();
        for product in self.products() {
            let base = self.get(baseline, product).filter(|b| *b != 0.0);
            let Some(base) = base else {
                warn!(product, baseline, "no reference value; problem specs left empty");
                continue;
            };
            for ((period, p), value) in &self.values {
                if p == product {
                    out.insert((period.clone(), p.clone()), value / base * 100.0);
                }
            }
        }
        out
    }

    pub fn header(&self) -> Vec<String> {
        let products = self.products();
        let mut header = vec![self.label.clone()];
        header.extend(products.iter().map(|p| p.to_string()));
        header.extend(products.iter().map(|p| format!("{}_PS", p)));
        header
    }

    /// One record per period: the values, then the problem specs.
    pub fn records(&self, baseline: &str) -> Vec<Vec<String>> {
        let specs = self.problem_specs(baseline);
        let products = self.products();
        let cell = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        self.periods()
            .into_iter()
            .map(|period| {
                let mut rec = vec![period.to_string()];
                rec.extend(products.iter().map(|p| cell(self.get(period, p))));
                rec.extend(products.iter().map(|p| {
                    cell(specs.get(&(period.to_string(), p.to_string())).copied())
                }));
                rec
            })
            .collect()
    }

    pub fn preview(&self, baseline: &str) -> Vec<SpecPreviewRow> {
        let specs = self.problem_specs(baseline);
        self.values
            .iter()
            .map(|(key, value)| SpecPreviewRow {
                period: key.0.clone(),
                product: key.1.clone(),
                value: format_number(*value, 2),
                problem_spec: specs
                    .get(key)
                    .map(|v| format!("{:.1}", v))
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect()
    }
}

/// Production per (harvest year, product) for one named area. `level`
/// picks the admin column the area is matched on.
pub fn crop_production(
    facts: &[RawCropFact],
    level: u8,
    area: &str,
    first_year: i32,
) -> SpecTable {
    let rows = facts.iter().filter_map(|f| {
        let name = match level {
            1 => f.admin_1.as_deref(),
            2 => f.admin_2.as_deref(),
            _ => f.admin_3.as_deref(),
        };
        if name.map(str::trim) != Some(area) {
            return None;
        }
        let year = season_year(f.season_year.as_deref()?)?;
        let product = f.product.as_deref().unwrap_or("Unknown").trim().to_string();
        (year >= first_year).then_some((year.to_string(), product, f.value?))
    });
    SpecTable::build("year", rows, Reduce::Sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(period: &str, product: &str, value: f64) -> (String, String, f64) {
        (period.into(), product.into(), value)
    }

    #[test]
    fn mean_and_problem_specs() {
        let table = SpecTable::build(
            "consumption_year",
            vec![
                row("2017-2018", "Maize", 10.0),
                row("2017-2018", "Maize", 30.0),
                row("2018-2019", "Maize", 30.0),
                row("2018-2019", "Rice", 50.0),
            ],
            Reduce::Mean,
        );
        assert_eq!(table.get("2017-2018", "Maize"), Some(20.0));
        let specs = table.problem_specs("2017-2018");
        let key = ("2018-2019".to_string(), "Maize".to_string());
        assert_eq!(specs.get(&key), Some(&150.0));
        // Rice has no 2017-2018 value, so no specs at all.
        assert!(specs.keys().all(|(_, p)| p == "Maize"));

        assert_eq!(
            table.header(),
            vec!["consumption_year", "Maize", "Rice", "Maize_PS", "Rice_PS"]
        );
        let records = table.records("2017-2018");
        assert_eq!(records[0], vec!["2017-2018", "20", "", "100", ""]);
        assert_eq!(records[1], vec!["2018-2019", "30", "50", "150", ""]);
    }

    #[test]
    fn crop_production_sums_the_area() {
        let fact = |admin_2: &str, season: &str, product: &str, value: f64| RawCropFact {
            country: Some("Madagascar".into()),
            admin_1: Some("Androy".into()),
            admin_2: Some(admin_2.into()),
            admin_3: None,
            value: Some(value),
            season_year: Some(season.into()),
            product: Some(product.into()),
        };
        let facts = vec![
            fact("Androy", "Annual 2017", "Maize", 100.0),
            fact("Androy", "Annual 2017", "Maize", 20.0),
            fact("Androy", "Annual 2018", "Maize", 60.0),
            fact("Androy", "Annual 1999", "Maize", 500.0),
            fact("Anosy", "Annual 2018", "Maize", 900.0),
            fact("Androy", "Annual 2018", "Cassava", 40.0),
        ];
        let table = crop_production(&facts, 2, "Androy", 2000);
        assert_eq!(table.periods(), vec!["2017", "2018"]);
        assert_eq!(table.get("2017", "Maize"), Some(120.0));
        let specs = table.problem_specs("2017");
        assert_eq!(specs.get(&("2018".to_string(), "Maize".to_string())), Some(&50.0));
        assert!(specs.get(&("2018".to_string(), "Cassava".to_string())).is_none());

        // Admin 1 matching picks up every district of the region.
        let region = crop_production(&facts, 1, "Androy", 2000);
        assert_eq!(region.get("2018", "Maize"), Some(960.0));
    }

    #[test]
    fn zero_baseline_gives_no_specs() {
        let table = SpecTable::build(
            "year",
            vec![row("2017", "Maize", 0.0), row("2018", "Maize", 5.0)],
            Reduce::Sum,
        );
        assert!(table.problem_specs("2017").is_empty());
        let preview = table.preview("2017");
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[1].problem_spec, "-");
    }
}
