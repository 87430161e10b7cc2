// Wide crop-estimate table fed to the GDHI model: one row per geographic
// unit, one column per crop per year plus a long-run average per crop.
use crate::types::{Crop, EstimatePreviewRow, EstimateSummary, UnitInfo};
use crate::util::{format_number, mean_present};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Years the long-run average is taken over. Fixed so the average does not
/// drift as new seasons are added.
pub const AVERAGE_YEARS: RangeInclusive<i32> = 2001..=2020;

/// No-data code expected by the GDHI workbook for the East Africa tables.
pub const NO_DATA: f64 = -99.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Average,
    Year(i32),
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Average => f.write_str("AV"),
            Period::Year(y) => write!(f, "{}", y),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EstimateRow {
    pub info: UnitInfo,
    /// Extra identifying column (rain pattern code in Ethiopia).
    pub region: String,
    pub cells: BTreeMap<(Crop, Period), f64>,
}

impl EstimateRow {
    pub fn new(info: UnitInfo) -> Self {
        EstimateRow { info, ..EstimateRow::default() }
    }

    pub fn get(&self, crop: Crop, period: Period) -> Option<f64> {
        self.cells.get(&(crop, period)).copied()
    }

    pub fn set(&mut self, crop: Crop, period: Period, value: Option<f64>) {
        match value {
            Some(v) => {
                self.cells.insert((crop, period), v);
            }
            None => {
                self.cells.remove(&(crop, period));
            }
        }
    }

    /// Fill `Period::Average` for every crop from the fixed averaging window.
    pub fn compute_averages(&mut self, crops: &[Crop]) {
        for &crop in crops {
            let avg = mean_present(AVERAGE_YEARS.map(|y| self.get(crop, Period::Year(y))));
            self.set(crop, Period::Average, avg);
        }
    }
}

/// How missing cells are written out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Missing {
    Blank,
    Code(f64),
}

#[derive(Debug, Clone)]
pub struct EstimateTable {
    pub name: String,
    pub crops: Vec<Crop>,
    pub years: RangeInclusive<i32>,
    pub missing: Missing,
    pub rows: Vec<EstimateRow>,
}

impl EstimateTable {
    pub fn new(name: &str, crops: &[Crop], years: RangeInclusive<i32>, missing: Missing) -> Self {
        EstimateTable {
            name: name.to_string(),
            crops: crops.to_vec(),
            years,
            missing,
            rows: Vec::new(),
        }
    }

    pub fn sort_by_fnid(&mut self) {
        self.rows.sort_by(|a, b| a.info.fnid.cmp(&b.info.fnid));
    }

    pub fn compute_averages(&mut self) {
        let crops = self.crops.clone();
        for row in &mut self.rows {
            row.compute_averages(&crops);
        }
    }

    pub fn periods(&self) -> Vec<Period> {
        std::iter::once(Period::Average)
            .chain(self.years.clone().map(Period::Year))
            .collect()
    }

    pub fn header(&self) -> Vec<String> {
        const ID_COLUMNS: [&str; 8] =
            ["FNID", "COUNTRY", "ADMIN0", "ADMIN1", "ADMIN2", "ADMIN3", "PCODE", "REGION"];
        let mut header: Vec<String> = ID_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .collect();
        for year in self.years.clone() {
            for crop in &self.crops {
                header.push(format!("{}_p{}", crop, year));
            }
        }
        for crop in &self.crops {
            header.push(format!("{}_pAV", crop));
        }
        header
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let info = &row.info;
                let mut rec = vec![
                    info.fnid.clone(),
                    info.country.clone(),
                    info.admin0.clone(),
                    info.admin1.clone(),
                    info.admin2.clone(),
                    info.admin3.clone(),
                    info.pcode.clone(),
                    row.region.clone(),
                ];
                for year in self.years.clone() {
                    for &crop in &self.crops {
                        rec.push(self.render(row.get(crop, Period::Year(year))));
                    }
                }
                for &crop in &self.crops {
                    rec.push(self.render(row.get(crop, Period::Average)));
                }
                rec
            })
            .collect()
    }

    fn render(&self, value: Option<f64>) -> String {
        match (value, self.missing) {
            (Some(v), _) => v.to_string(),
            (None, Missing::Blank) => String::new(),
            (None, Missing::Code(code)) => code.to_string(),
        }
    }

    fn in_range(&self, period: Period) -> bool {
        match period {
            Period::Average => true,
            Period::Year(y) => self.years.contains(&y),
        }
    }

    /// Cells written as missing. Only the crops and periods the table writes
    /// out are counted.
    pub fn missing_cells(&self) -> usize {
        let per_row = self.crops.len() * self.periods().len();
        self.rows
            .iter()
            .map(|r| {
                let present = r
                    .cells
                    .keys()
                    .filter(|(crop, period)| self.crops.contains(crop) && self.in_range(*period))
                    .count();
                per_row.saturating_sub(present)
            })
            .sum()
    }

    pub fn preview(&self, year: i32) -> Vec<EstimatePreviewRow> {
        let show = |v: Option<f64>| {
            v.map(|v| format_number(v, 2))
                .unwrap_or_else(|| "-".to_string())
        };
        self.rows
            .iter()
            .flat_map(|row| {
                self.crops.iter().map(move |&crop| EstimatePreviewRow {
                    fnid: row.info.fnid.clone(),
                    admin1: row.info.admin1.clone(),
                    admin2: row.info.admin2.clone(),
                    crop: crop.to_string(),
                    current: show(row.get(crop, Period::Year(year))),
                    average: show(row.get(crop, Period::Average)),
                })
            })
            .collect()
    }

    pub fn summary(&self, rains_year: i32) -> EstimateSummary {
        EstimateSummary {
            table: self.name.clone(),
            units: self.rows.len(),
            crops: self.crops.iter().map(|c| c.to_string()).collect(),
            first_year: *self.years.start(),
            last_year: *self.years.end(),
            rains_year,
            missing_cells: self.missing_cells(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EstimateTable {
        let crops = [Crop::Maize, Crop::Sorghum];
        let mut t = EstimateTable::new("test", &crops, 2001..=2002, Missing::Code(NO_DATA));
        let mut row = EstimateRow::new(UnitInfo { fnid: "B".into(), ..UnitInfo::default() });
        row.set(Crop::Maize, Period::Year(2001), Some(10.0));
        row.set(Crop::Maize, Period::Year(2002), Some(20.0));
        t.rows.push(row);
        t.rows.push(EstimateRow::new(UnitInfo { fnid: "A".into(), ..UnitInfo::default() }));
        t
    }

    #[test]
    fn averages_skip_missing_years() {
        let mut t = table();
        t.compute_averages();
        assert_eq!(t.rows[0].get(Crop::Maize, Period::Average), Some(15.0));
        assert_eq!(t.rows[0].get(Crop::Sorghum, Period::Average), None);
    }

    #[test]
    fn header_orders_years_then_crops_then_average() {
        let t = table();
        let header = t.header();
        assert_eq!(
            &header[8..],
            &[
                "Maize_p2001",
                "Sorghum_p2001",
                "Maize_p2002",
                "Sorghum_p2002",
                "Maize_pAV",
                "Sorghum_pAV",
            ]
        );
    }

    #[test]
    fn records_render_missing_with_code() {
        let mut t = table();
        t.sort_by_fnid();
        let recs = t.records();
        assert_eq!(recs[0][0], "A");
        assert_eq!(recs[0][8], "-99");
        assert_eq!(recs[1][8], "10");
        assert_eq!(t.missing_cells(), 6 + 4);
    }

    #[test]
    fn missing_cells_ignore_out_of_range_years() {
        let mut t = table();
        t.rows[0].set(Crop::Maize, Period::Year(2025), Some(5.0));
        t.rows[1].set(Crop::Teff, Period::Year(2001), Some(5.0));
        // Same count as before: neither cell is written out.
        assert_eq!(t.missing_cells(), 6 + 4);
        assert_eq!(t.summary(2025).missing_cells, 10);
    }
}
