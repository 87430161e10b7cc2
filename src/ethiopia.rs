// Ethiopia crop estimates: linear scaling of WRSI between historical minimum
// and maximum production, per rain pattern, for the Meher and Belg seasons.
use crate::estimate::{Method, SeriesStats};
use crate::fallback::{self, ETHIOPIA_CHAIN};
use crate::gdhi::{EstimateRow, EstimateTable, Missing, Period};
use crate::production::{self, ProductionRecord};
use crate::region::RainPattern;
use crate::types::{Crop, Season, UnitInfo};
use crate::wrsi::{WrsiProduct, WrsiTable};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use tracing::{info, warn};

pub const CROPS: [Crop; 4] = [Crop::Maize, Crop::Sorghum, Crop::Wheat, Crop::Teff];
pub const SEASONS: [Season; 2] = [Season::Meher, Season::Belg];

/// Zones created since 2003, mapped onto the zone they split from so that
/// production series stay comparable over time.
static CHANGED_ADMIN: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Argoba", "South Wollo"),
        ("Southeast Tigray", "South Tigray"),
        ("Pawe", "Metekel"),
        ("West Omo", "Bench Maji"),
        ("Gofa", "Gamo Gofa"),
        ("Gamo", "Gamo Gofa"),
        ("Alle", "Derashe"),
        ("West Guji", "Borena"),
        ("Buno Bedele", "Ilubabor"),
        ("Dire Dawa rural", "Dire Dawa"),
        ("West Gondar", "North Gondar"),
        ("Central Gondar", "North Gondar"),
    ])
});

/// Pastoral regions: WRSI is used as is, there are no usable production
/// statistics.
static RAW_INDEX_REGIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["Afar", "Somali"]));

/// Zones that were later split and only report for a year or two.
static DROPPED_ZONES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["Keficho Shekicho", "Kembata Alaba Tembaro", "North Omo"]));

/// Gambela's zones changed repeatedly; Meher production is compared at
/// region level.
const GAMBELA: &str = "Gambela";

pub fn crop_zone(admin2: &str) -> String {
    CHANGED_ADMIN.get(admin2).copied().unwrap_or(admin2).to_string()
}

/// Keep the production facts usable for the GDHI and put them into the 2003
/// zone geography.
pub fn clean_records(records: Vec<ProductionRecord>) -> Vec<ProductionRecord> {
    records
        .into_iter()
        .filter(|r| !RAW_INDEX_REGIONS.contains(r.admin1.as_str()))
        .filter(|r| !DROPPED_ZONES.contains(r.admin2.as_str()))
        .filter(|r| r.year > 2000)
        // Bale sorghum before 2008 is implausibly low.
        .filter(|r| !(r.admin2 == "Bale" && r.crop == Crop::Sorghum && r.year < 2008))
        .map(|mut r| {
            if r.admin1 == GAMBELA && r.season == Some(Season::Meher) {
                r.admin2 = GAMBELA.to_string();
            }
            r.admin2 = crop_zone(&r.admin2);
            r
        })
        .collect()
}

pub type StatsKey = (String, String, Crop, Season);

pub fn production_stats(records: &[ProductionRecord]) -> BTreeMap<StatsKey, SeriesStats> {
    let mut series = production::aggregate(records, |r| {
        r.season.map(|s| (r.admin1.clone(), r.admin2.clone(), r.crop, s))
    });
    production::retain_usable(&mut series);
    production::stats(&series)
}

/// Meher statistics join on zone, Belg statistics on region only (Belg is
/// reported at region level).
fn lookup_stats(
    stats: &BTreeMap<StatsKey, SeriesStats>,
    unit: &UnitInfo,
    season: Season,
    crop: Crop,
) -> Option<SeriesStats> {
    match season {
        Season::Belg => stats
            .iter()
            .find(|((a1, _, c, s), _)| *a1 == unit.admin1 && *c == crop && *s == season)
            .map(|(_, v)| *v),
        _ => {
            let zone = if unit.admin1 == GAMBELA {
                GAMBELA.to_string()
            } else {
                crop_zone(&unit.admin2)
            };
            stats.get(&(unit.admin1.clone(), zone, crop, season)).copied()
        }
    }
}

fn method_for(
    stats: &BTreeMap<StatsKey, SeriesStats>,
    unit: &UnitInfo,
    season: Season,
    crop: Crop,
) -> Option<Method<'static>> {
    if RAW_INDEX_REGIONS.contains(unit.admin1.as_str()) {
        return Some(Method::RawIndex);
    }
    // Tigray's Belg production series is too short to scale against.
    if season == Season::Belg && unit.admin1 == "Tigray" {
        return Some(Method::RawIndex);
    }
    lookup_stats(stats, unit, season, crop).map(Method::Linear)
}

fn is_ethiopia(unit: &UnitInfo) -> bool {
    unit.country == "ET" || unit.admin0 == "Ethiopia"
}

/// Estimates for one season across all three rain patterns, with averages
/// and fallback applied.
pub fn estimate_season(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    stats: &BTreeMap<StatsKey, SeriesStats>,
    season: Season,
    years: RangeInclusive<i32>,
    rains_year: i32,
) -> EstimateTable {
    let name = format!("ET_{}", season);
    let mut table = EstimateTable::new(&name, &CROPS, years.clone(), Missing::Blank);

    for pattern in RainPattern::ALL {
        let mut products: Vec<WrsiProduct> =
            CROPS.iter().filter_map(|&crop| pattern.product_for(season, crop)).collect();
        products.sort();
        products.dedup();

        // A unit is estimated when any of the pattern's products covers it.
        let mut units: BTreeMap<&str, &UnitInfo> = BTreeMap::new();
        for product in &products {
            let Some(source) = wrsi.get(product) else {
                warn!(
                    product = %product,
                    pattern = %pattern,
                    season = %season,
                    "WRSI table missing"
                );
                continue;
            };
            let in_pattern = source
                .units
                .iter()
                .filter(|u| is_ethiopia(&u.info))
                .filter(|u| RainPattern::classify(&u.info) == Some(pattern));
            for unit in in_pattern {
                units.entry(unit.info.fnid.as_str()).or_insert(&unit.info);
            }
        }
        if units.is_empty() {
            continue;
        }

        info!("Estimating {} {} production", pattern, season);
        for info in units.into_values() {
            let mut row = EstimateRow::new(info.clone());
            row.region = pattern.code().to_string();
            for crop in CROPS {
                let Some(product) = pattern.product_for(season, crop) else { continue };
                let Some(source) = wrsi.get(&product).and_then(|t| t.get(&info.fnid)) else {
                    continue;
                };
                let Some(method) = method_for(stats, info, season, crop) else { continue };
                for year in years.clone() {
                    row.set(crop, Period::Year(year), method.estimate(source.index(year)));
                }
            }
            table.rows.push(row);
        }
    }

    table.sort_by_fnid();
    table.compute_averages();
    fallback::apply(&mut table, ETHIOPIA_CHAIN, rains_year);
    table
}

pub fn run(
    wrsi: &BTreeMap<WrsiProduct, WrsiTable>,
    records: Vec<ProductionRecord>,
    years: RangeInclusive<i32>,
    rains_year: i32,
) -> Vec<EstimateTable> {
    let cleaned = clean_records(records);
    let stats = production_stats(&cleaned);
    info!(series = stats.len(), "ET production series with enough data");
    SEASONS
        .iter()
        .map(|&season| estimate_season(wrsi, &stats, season, years.clone(), rains_year))
        .collect()
}
