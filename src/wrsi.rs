// WRSI value model and per-product tables.
//
// WRSI rasters are summarised per admin unit into one attribute table per
// product; each table carries one `WRSI_<year>` column per season.
use crate::error::GdhiError;
use crate::types::UnitInfo;
use crate::util::percent_rank;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;

/// Raw code for "season did not start"; the season failed, so it scores 0.
pub const NO_START: f64 = 253.0;
/// Raw code for "season yet to start"; there is no value for it yet.
pub const YET_TO_START: f64 = 254.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WrsiValue {
    Index(f64),
    NoStart,
    YetToStart,
    NoData,
}

impl WrsiValue {
    pub fn from_raw(raw: f64) -> WrsiValue {
        if raw == NO_START {
            WrsiValue::NoStart
        } else if raw == YET_TO_START {
            WrsiValue::YetToStart
        } else if (0.0..=100.0).contains(&raw) {
            WrsiValue::Index(raw)
        } else {
            WrsiValue::NoData
        }
    }

    /// The usable index value, if any.
    pub fn index(self) -> Option<f64> {
        match self {
            WrsiValue::Index(v) => Some(v),
            WrsiValue::NoStart => Some(0.0),
            WrsiValue::YetToStart | WrsiValue::NoData => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WrsiProduct {
    MaizeL,
    GrainsL,
    GrainsB,
    RangeL,
    RangeS,
    MaizeS,
}

impl WrsiProduct {
    pub const ALL: [WrsiProduct; 6] = [
        WrsiProduct::MaizeL,
        WrsiProduct::GrainsL,
        WrsiProduct::GrainsB,
        WrsiProduct::RangeL,
        WrsiProduct::RangeS,
        WrsiProduct::MaizeS,
    ];

    /// Two-letter code used in USGS file names and in the feature-class names.
    pub fn code(self) -> &'static str {
        match self {
            WrsiProduct::MaizeL => "ee",
            WrsiProduct::GrainsL => "el",
            WrsiProduct::GrainsB => "ek",
            WrsiProduct::RangeL => "e2",
            WrsiProduct::RangeS => "e1",
            WrsiProduct::MaizeS => "et",
        }
    }

    pub fn from_code(code: &str) -> Result<WrsiProduct, GdhiError> {
        let code = code.trim().to_ascii_lowercase();
        WrsiProduct::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or(GdhiError::UnknownProduct(code))
    }

    pub fn description(self) -> &'static str {
        match self {
            WrsiProduct::MaizeL => "Maize - Long Rains (Mar-Nov)",
            WrsiProduct::GrainsL => "Grains - Long Rains (Apr-Nov)",
            WrsiProduct::GrainsB => "Grains - Belg (Mar-Sep)",
            WrsiProduct::RangeL => "Rangeland - Long Rains (Mar-Jul)",
            WrsiProduct::RangeS => "Rangeland - Short Rains (Sep-Jan)",
            WrsiProduct::MaizeS => "Maize - Short Rains (Sep-Feb)",
        }
    }
}

impl fmt::Display for WrsiProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone)]
pub struct WrsiUnit {
    pub info: UnitInfo,
    pub values: BTreeMap<i32, WrsiValue>,
}

impl WrsiUnit {
    pub fn index(&self, year: i32) -> Option<f64> {
        self.values.get(&year).and_then(|v| v.index())
    }
}

#[derive(Debug, Clone)]
pub struct WrsiTable {
    pub product: WrsiProduct,
    pub units: Vec<WrsiUnit>,
    by_fnid: HashMap<String, usize>,
}

impl WrsiTable {
    pub fn new(product: WrsiProduct, units: Vec<WrsiUnit>) -> Self {
        let by_fnid = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.info.fnid.clone(), i))
            .collect();
        WrsiTable { product, units, by_fnid }
    }

    pub fn get(&self, fnid: &str) -> Option<&WrsiUnit> {
        self.by_fnid.get(fnid).map(|i| &self.units[*i])
    }

    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self
            .units
            .iter()
            .flat_map(|u| u.values.keys().copied())
            .collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Percent ranks of every unit's WRSI against its own history.
///
/// Years inside `baseline` are ranked among the baseline years only; later
/// years are ranked among the baseline plus themselves. Keeping the
/// comparison window fixed means historic estimates do not move between runs.
#[derive(Debug, Clone, Default)]
pub struct PercentRanks {
    ranks: HashMap<String, BTreeMap<i32, f64>>,
}

impl PercentRanks {
    pub fn compute<'a, I>(units: I, baseline: RangeInclusive<i32>) -> Self
    where
        I: IntoIterator<Item = &'a WrsiUnit>,
    {
        let mut ranks = HashMap::new();
        for unit in units {
            let base: Vec<f64> = baseline.clone().filter_map(|y| unit.index(y)).collect();
            let mut per_year = BTreeMap::new();
            for (&year, value) in &unit.values {
                let Some(v) = value.index() else { continue };
                let rank = if baseline.contains(&year) {
                    percent_rank(v, &base)
                } else {
                    let mut population = base.clone();
                    population.push(v);
                    percent_rank(v, &population)
                };
                if let Some(r) = rank {
                    per_year.insert(year, r);
                }
            }
            ranks.insert(unit.info.fnid.clone(), per_year);
        }
        PercentRanks { ranks }
    }

    pub fn get(&self, fnid: &str, year: i32) -> Option<f64> {
        self.ranks.get(fnid)?.get(&year).copied()
    }
}
