// Somalia, Kenya and Uganda crop estimates.
//
// Somalia and Kenya map the percent rank of a season's WRSI onto the same
// quantile of historical production. Uganda (Karamoja) has no production
// series, so the GDHI takes raw WRSI there.
use crate::estimate::Method;
use crate::fallback::{self, SOMALIA_CHAIN};
use crate::gdhi::{EstimateRow, EstimateTable, Missing, Period, NO_DATA};
use crate::production::{self, ProductionRecord, SeriesMap};
use crate::region::{somalia_product, SecondRains};
use crate::types::{Crop, RawProductionRow, Season, UnitInfo};
use crate::wrsi::{PercentRanks, WrsiProduct, WrsiTable};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use tracing::{info, warn};

pub const CROPS: [Crop; 3] = [Crop::Maize, Crop::Sorghum, Crop::Cowpeas];

/// WRSI years every percent rank is compared against.
pub const RANK_BASELINE: RangeInclusive<i32> = 2001..=2015;

const AFMADOW_FNID: &str = "SO1990A22802";
const BELED_XAAWO_FNID: &str = "SO1990A22603";
const CEEL_WAAQ_FNID: &str = "SO1990A22604";

/// Awdal reports production at region level only; its districts share it.
static AWDAL_DISTRICTS: Lazy<Vec<(&'static str, &'static str)>> =
    Lazy::new(|| vec![("Borama", "SO1990A21101"), ("Baki", "SO1990A21102")]);

static KE_COUNTIES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["Mandera", "Wajir", "Turkana", "Marsabit"]));

const KE_PRODUCT: &str = "Maize Grain (White)";

/// Kenya moved to counties in 2015; earlier rows carry the county name as
/// admin 2.
const KE_COUNTY_REFORM: i32 = 2015;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rains {
    Long,
    Short,
}

impl Rains {
    fn somalia_season(self) -> Season {
        match self {
            Rains::Long => Season::Gu,
            Rains::Short => Season::Deyr,
        }
    }

    fn rangeland_product(self) -> WrsiProduct {
        match self {
            Rains::Long => WrsiProduct::RangeL,
            Rains::Short => WrsiProduct::RangeS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Rains::Long => "long",
            Rains::Short => "short",
        }
    }
}

/// Percent ranks for every product, over Kenyan and Somali units.
pub fn rank_products(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
) -> HashMap<WrsiProduct, PercentRanks> {
    wrsi.iter()
        .map(|(product, table)| {
            info!(product = %product, "Calculating WRSI percent ranks");
            let units = table
                .units
                .iter()
                .filter(|u| matches!(u.info.admin0.as_str(), "Kenya" | "Somalia"));
            (*product, PercentRanks::compute(units, RANK_BASELINE))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Somalia
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SoKey {
    pub fnid: String,
    pub admin1: String,
    pub season: Season,
    pub crop: Crop,
}

pub fn somalia_series(records: Vec<ProductionRecord>) -> SeriesMap<SoKey> {
    let mut records: Vec<ProductionRecord> = records
        .into_iter()
        .filter(|r| CROPS.contains(&r.crop))
        .map(|mut r| {
            // Production data carries a different FNID for Afmadow.
            if r.admin2 == "Afmadow" {
                r.fnid = AFMADOW_FNID.to_string();
            }
            r
        })
        .collect();

    let awdal: Vec<ProductionRecord> =
        records.iter().filter(|r| r.admin1 == "Awdal").cloned().collect();
    for (district, fnid) in AWDAL_DISTRICTS.iter() {
        records.extend(awdal.iter().cloned().map(|mut r| {
            r.admin2 = district.to_string();
            r.fnid = fnid.to_string();
            r
        }));
    }

    let mut series = production::aggregate(&records, |r| {
        r.season.map(|season| SoKey {
            fnid: r.fnid.clone(),
            admin1: r.admin1.clone(),
            season,
            crop: r.crop,
        })
    });

    // Ceel Waaq has no production data; it borrows neighbouring Beled Xaawo.
    let borrowed: Vec<(SoKey, BTreeMap<i32, f64>)> = series
        .iter()
        .filter(|(k, _)| k.fnid == BELED_XAAWO_FNID)
        .map(|(k, v)| (SoKey { fnid: CEEL_WAAQ_FNID.to_string(), ..k.clone() }, v.clone()))
        .collect();
    series.extend(borrowed);

    production::retain_usable(&mut series);
    series
}

fn somalia_rows(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    ranks: &HashMap<WrsiProduct, PercentRanks>,
    series: &SeriesMap<SoKey>,
    rains: Rains,
    years: RangeInclusive<i32>,
    rains_year: i32,
) -> Vec<EstimateRow> {
    let season = rains.somalia_season();
    let Some(units) = wrsi.get(&WrsiProduct::MaizeL) else {
        warn!("MaizeL WRSI table missing; no Somalia units");
        return Vec::new();
    };
    let mut table = EstimateTable::new("SO", &CROPS, years.clone(), Missing::Code(NO_DATA));
    let mut by_fnid: HashMap<String, usize> = HashMap::new();
    for unit in units.units.iter().filter(|u| u.info.country == "SO") {
        by_fnid.insert(unit.info.fnid.clone(), table.rows.len());
        table.rows.push(EstimateRow::new(unit.info.clone()));
    }

    for (key, history) in series.iter().filter(|(k, _)| k.season == season) {
        let rains_pattern = SecondRains::for_admin1(&key.admin1);
        let Some(product) = somalia_product(season, key.crop, rains_pattern) else { continue };
        let Some(product_ranks) = ranks.get(&product) else { continue };
        let Some(&idx) = by_fnid.get(&key.fnid) else { continue };
        let values: Vec<f64> = history.values().copied().collect();
        let method = Method::Quantile(&values);
        let row = &mut table.rows[idx];
        for year in years.clone() {
            let estimate = method.estimate(product_ranks.get(&key.fnid, year));
            if estimate.is_some() {
                row.set(key.crop, Period::Year(year), estimate);
            }
        }
    }

    table.compute_averages();
    fallback::apply(&mut table, SOMALIA_CHAIN, rains_year);
    table.rows
}

// ---------------------------------------------------------------------------
// Kenya
// ---------------------------------------------------------------------------

/// Annual white-maize production per county, used for both seasons.
pub fn kenya_series(rows: &[RawProductionRow]) -> SeriesMap<String> {
    let maize: Vec<RawProductionRow> = rows
        .iter()
        .filter(|r| r.product.as_deref().map(str::trim) == Some(KE_PRODUCT))
        .cloned()
        .collect();
    let (records, _) = production::parse_records(&maize);
    let mut series = production::aggregate(&records, |r| {
        let county = if r.year < KE_COUNTY_REFORM { &r.admin2 } else { &r.admin1 };
        KE_COUNTIES.contains(county.as_str()).then(|| county.clone())
    });
    production::retain_usable(&mut series);
    series
}

fn kenya_rows(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    ranks: &HashMap<WrsiProduct, PercentRanks>,
    series: &SeriesMap<String>,
    rains: Rains,
    years: RangeInclusive<i32>,
) -> Vec<EstimateRow> {
    let product = rains.rangeland_product();
    let (Some(table), Some(product_ranks)) = (wrsi.get(&product), ranks.get(&product)) else {
        warn!(product = %product, "rangeland WRSI missing; no Kenya estimates");
        return Vec::new();
    };
    table
        .units
        .iter()
        .filter(|u| u.info.admin0 == "Kenya")
        .map(|unit| {
            let values = production::values(series, &unit.info.admin1);
            let method = Method::Quantile(&values);
            let mut row = EstimateRow::new(unit.info.clone());
            for year in years.clone() {
                let maize = method.estimate(product_ranks.get(&unit.info.fnid, year));
                // Same WRSI and production series, so sorghum mirrors maize.
                row.set(Crop::Maize, Period::Year(year), maize);
                row.set(Crop::Sorghum, Period::Year(year), maize);
                // No cowpea production in northern Kenya.
                row.set(Crop::Cowpeas, Period::Year(year), Some(NO_DATA));
            }
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Uganda
// ---------------------------------------------------------------------------

fn uganda_unit(unit: &UnitInfo) -> bool {
    unit.country == "UG"
}

/// Karamoja has a single season; maize reads the maize product and sorghum
/// the grains product.
fn uganda_rows(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    rains: Rains,
    years: RangeInclusive<i32>,
) -> Vec<EstimateRow> {
    let Some(maize) = wrsi.get(&WrsiProduct::MaizeL) else { return Vec::new() };
    let grains = wrsi.get(&WrsiProduct::GrainsL);
    maize
        .units
        .iter()
        .filter(|u| uganda_unit(&u.info))
        .map(|unit| {
            let mut row = EstimateRow::new(unit.info.clone());
            if rains == Rains::Long {
                let sorghum = grains.and_then(|g| g.get(&unit.info.fnid));
                for year in years.clone() {
                    row.set(Crop::Maize, Period::Year(year), unit.index(year));
                    let index = sorghum.and_then(|s| s.index(year));
                    row.set(Crop::Sorghum, Period::Year(year), index);
                }
            }
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Combined tables
// ---------------------------------------------------------------------------

pub fn run(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    so_records: Vec<ProductionRecord>,
    ke_rows: &[RawProductionRow],
    years: RangeInclusive<i32>,
    rains_year: i32,
) -> Vec<EstimateTable> {
    let ranks = rank_products(wrsi);
    let so_series = somalia_series(so_records);
    let ke_series = kenya_series(ke_rows);
    info!(
        so_series = so_series.len(),
        ke_counties = ke_series.len(),
        "production series with enough data"
    );

    [Rains::Long, Rains::Short]
        .into_iter()
        .map(|rains| {
            info!("Estimating KE/SO/UG {} rains", rains.label());
            let mut table = EstimateTable::new(
                &format!("KEUGSO_{}", rains.label()),
                &CROPS,
                years.clone(),
                Missing::Code(NO_DATA),
            );
            table.rows.extend(kenya_rows(wrsi, &ranks, &ke_series, rains, years.clone()));
            let somalia = somalia_rows(wrsi, &ranks, &so_series, rains, years.clone(), rains_year);
            table.rows.extend(somalia);
            table.rows.extend(uganda_rows(wrsi, rains, years.clone()));
            table.sort_by_fnid();
            table.compute_averages();
            table
        })
        .collect()
}
