// Crop fallback substitution.
//
// Where a crop has no estimate for a period, it borrows the value of a
// related crop in the same unit and period. Rules are applied in order,
// repeatedly, until a pass changes nothing.
use crate::gdhi::{EstimateRow, EstimateTable, Period};
use crate::types::Crop;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct FallbackRule {
    pub target: Crop,
    /// Tried in order; the first crop with a value wins.
    pub sources: &'static [Crop],
}

pub const ETHIOPIA_CHAIN: &[FallbackRule] = &[
    FallbackRule { target: Crop::Teff, sources: &[Crop::Wheat, Crop::Sorghum, Crop::Maize] },
    FallbackRule { target: Crop::Wheat, sources: &[Crop::Sorghum, Crop::Maize] },
    FallbackRule { target: Crop::Sorghum, sources: &[Crop::Maize, Crop::Wheat] },
    FallbackRule { target: Crop::Maize, sources: &[Crop::Sorghum, Crop::Wheat] },
];

pub const SOMALIA_CHAIN: &[FallbackRule] = &[
    FallbackRule { target: Crop::Cowpeas, sources: &[Crop::Sorghum, Crop::Maize] },
    FallbackRule { target: Crop::Sorghum, sources: &[Crop::Maize] },
    FallbackRule { target: Crop::Maize, sources: &[Crop::Sorghum] },
];

/// Fill one period of one row. Returns the number of cells filled.
pub fn apply_chain(row: &mut EstimateRow, period: Period, chain: &[FallbackRule]) -> usize {
    let mut filled = 0;
    // Each productive pass fills at least one distinct crop, so the loop ends
    // within one pass per crop plus a final quiet one.
    loop {
        let mut changed = false;
        for rule in chain {
            if row.get(rule.target, period).is_some() {
                continue;
            }
            let substitute = rule.sources.iter().find_map(|&c| row.get(c, period));
            if let Some(v) = substitute {
                row.set(rule.target, period, Some(v));
                filled += 1;
                changed = true;
            }
        }
        if !changed {
            return filled;
        }
    }
}

/// The rains year a run belongs to: January and February runs are still in
/// the previous year's short rains.
pub fn rains_year(run_year: i32, run_month: u32) -> i32 {
    if run_month <= 2 {
        run_year - 1
    } else {
        run_year
    }
}

/// Apply the chain to every period of every row, then fill what is still
/// missing in the current rains year with the crop's long-run average (the
/// season may not have started there yet). A rains year outside the table's
/// year range has no column, so nothing is filled for it.
pub fn apply(table: &mut EstimateTable, chain: &[FallbackRule], current_year: i32) -> usize {
    let periods = table.periods();
    let crops = table.crops.clone();
    let fill_current = table.years.contains(&current_year);
    if !fill_current {
        warn!(
            table = %table.name,
            current_year,
            "rains year outside the table's years; no average fill"
        );
    }
    let mut filled = 0;
    for row in &mut table.rows {
        for &period in &periods {
            filled += apply_chain(row, period, chain);
        }
        if !fill_current {
            continue;
        }
        let current = Period::Year(current_year);
        for &crop in &crops {
            if row.get(crop, current).is_none() {
                if let Some(avg) = row.get(crop, Period::Average) {
                    row.set(crop, current, Some(avg));
                    filled += 1;
                }
            }
        }
    }
    debug!(table = %table.name, filled, "fallback applied");
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdhi::Missing;
    use crate::types::UnitInfo;

    fn row(values: &[(Crop, f64)]) -> EstimateRow {
        let mut r = EstimateRow::new(UnitInfo::default());
        for (c, v) in values {
            r.set(*c, Period::Year(2010), Some(*v));
        }
        r
    }

    #[test]
    fn teff_falls_back_through_chain() {
        let mut r = row(&[(Crop::Maize, 5.0)]);
        let filled = apply_chain(&mut r, Period::Year(2010), ETHIOPIA_CHAIN);
        assert_eq!(filled, 3);
        for c in [Crop::Teff, Crop::Wheat, Crop::Sorghum] {
            assert_eq!(r.get(c, Period::Year(2010)), Some(5.0));
        }
    }

    #[test]
    fn nearest_crop_wins() {
        let mut r = row(&[(Crop::Maize, 5.0), (Crop::Sorghum, 7.0), (Crop::Wheat, 9.0)]);
        apply_chain(&mut r, Period::Year(2010), ETHIOPIA_CHAIN);
        assert_eq!(r.get(Crop::Teff, Period::Year(2010)), Some(9.0));
    }

    #[test]
    fn maize_borrows_from_wheat_when_sorghum_missing() {
        let mut r = row(&[(Crop::Wheat, 3.0)]);
        apply_chain(&mut r, Period::Year(2010), ETHIOPIA_CHAIN);
        assert_eq!(r.get(Crop::Maize, Period::Year(2010)), Some(3.0));
        assert_eq!(r.get(Crop::Sorghum, Period::Year(2010)), Some(3.0));
    }

    #[test]
    fn chain_is_idempotent() {
        let mut r = row(&[(Crop::Sorghum, 4.0)]);
        apply_chain(&mut r, Period::Year(2010), SOMALIA_CHAIN);
        let once = r.cells.clone();
        assert_eq!(apply_chain(&mut r, Period::Year(2010), SOMALIA_CHAIN), 0);
        assert_eq!(r.cells, once);
    }

    #[test]
    fn empty_row_stays_empty() {
        let mut r = row(&[]);
        assert_eq!(apply_chain(&mut r, Period::Year(2010), ETHIOPIA_CHAIN), 0);
        assert!(r.cells.is_empty());
    }

    #[test]
    fn rains_year_rolls_back_in_early_months() {
        assert_eq!(rains_year(2025, 1), 2024);
        assert_eq!(rains_year(2025, 2), 2024);
        assert_eq!(rains_year(2025, 3), 2025);
    }

    #[test]
    fn current_season_takes_average() {
        let crops = [Crop::Maize, Crop::Sorghum];
        let mut t = EstimateTable::new("t", &crops, 2001..=2021, Missing::Blank);
        let mut r = EstimateRow::new(UnitInfo::default());
        r.set(Crop::Maize, Period::Year(2001), Some(10.0));
        r.set(Crop::Maize, Period::Year(2002), Some(30.0));
        t.rows.push(r);
        t.compute_averages();
        apply(&mut t, SOMALIA_CHAIN, 2021);
        let r = &t.rows[0];
        assert_eq!(r.get(Crop::Maize, Period::Year(2021)), Some(20.0));
        assert_eq!(r.get(Crop::Sorghum, Period::Average), Some(20.0));
        assert_eq!(r.get(Crop::Sorghum, Period::Year(2021)), Some(20.0));
        // Past years are not back-filled with the average.
        assert_eq!(r.get(Crop::Maize, Period::Year(2010)), None);
    }

    #[test]
    fn rains_year_past_the_table_is_not_filled() {
        let crops = [Crop::Maize, Crop::Sorghum];
        let mut t = EstimateTable::new("t", &crops, 2019..=2020, Missing::Blank);
        let mut r = EstimateRow::new(UnitInfo::default());
        r.set(Crop::Maize, Period::Year(2019), Some(10.0));
        r.set(Crop::Maize, Period::Year(2020), Some(30.0));
        t.rows.push(r);
        t.compute_averages();
        apply(&mut t, SOMALIA_CHAIN, 2025);
        let r = &t.rows[0];
        assert_eq!(r.get(Crop::Maize, Period::Year(2025)), None);
        assert_eq!(r.get(Crop::Sorghum, Period::Year(2025)), None);
        assert_eq!(r.get(Crop::Sorghum, Period::Year(2020)), Some(30.0));
        // Every written cell is filled: two years and the average, two crops.
        assert_eq!(t.summary(2025).missing_cells, 0);
    }
}
