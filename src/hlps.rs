// Single-shock outcomes joined to livelihood protection scores.
//
// Each shock table gives the worst-case population by IPC-compatible phase
// for admin 2 / livelihood zone pairs. Per zone we take the share of people
// in phase 3+ and 2+, put every shock side by side next to the zone's HLPS,
// and count how many shocks push anyone into those phases.
use crate::types::{RawHlpsRow, ShockPreviewRow, ShockRow};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Shock name from a results file stem such as
/// `HT_2019_singleshock_maizeprice_results`. Drought and baseline runs are
/// not single shocks and give `None`.
pub fn shock_name(stem: &str) -> Option<String> {
    let lower = stem.to_ascii_lowercase();
    if lower.ends_with("drought") || lower.ends_with("baseline") {
        return None;
    }
    let parts: Vec<&str> = stem.split('_').collect();
    parts.get(3).or(parts.last()).map(|s| s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZoneShares {
    pub p3plus: Option<f64>,
    pub p2plus: Option<f64>,
}

/// Phase 3+ and 2+ shares per livelihood zone code. The zone code is the
/// part after the first `_` of the admin 2 / zone key; the first row seen
/// for a zone wins.
pub fn zone_shares(rows: &[ShockRow]) -> HashMap<String, ZoneShares> {
    let mut out = HashMap::new();
    for row in rows {
        let Some(lz) = row.admin2_lhz.split('_').nth(1) else { continue };
        let pop = row.population.filter(|p| *p > 0.0);
        let share = |from: usize| {
            let people: f64 = row.phases[from..].iter().flatten().sum();
            pop.map(|p| people / p)
        };
        out.entry(lz.trim().to_string())
            .or_insert(ZoneShares { p3plus: share(2), p2plus: share(1) });
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneOutcome {
    pub lzcode: String,
    pub country: String,
    pub hlps: String,
    /// One entry per shock, in shock order.
    pub shares: Vec<ZoneShares>,
}

impl ZoneOutcome {
    pub fn count_3plus(&self) -> usize {
        self.shares.iter().filter(|s| s.p3plus.is_some_and(|v| v > 0.0)).count()
    }

    pub fn count_2plus(&self) -> usize {
        self.shares.iter().filter(|s| s.p2plus.is_some_and(|v| v > 0.0)).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShockSummary {
    pub shocks: Vec<String>,
    pub zones: Vec<ZoneOutcome>,
}

/// Left join of the country's HLPS rows onto every named shock table.
pub fn summarize(
    hlps: &[RawHlpsRow],
    country: &str,
    tables: &[(String, Vec<ShockRow>)],
) -> ShockSummary {
    let named: Vec<(String, HashMap<String, ZoneShares>)> = tables
        .iter()
        .filter_map(|(stem, rows)| Some((shock_name(stem)?, zone_shares(rows))))
        .collect();
    let zones = hlps
        .iter()
        .filter(|r| r.country.as_deref().map(str::trim) == Some(country))
        .filter_map(|r| {
            let lzcode = r.lzcode.as_deref()?.trim().to_string();
            let shares = named
                .iter()
                .map(|(_, by_zone)| by_zone.get(&lzcode).copied().unwrap_or_default())
                .collect();
            Some(ZoneOutcome {
                lzcode,
                country: country.to_string(),
                hlps: r.hlps.as_deref().unwrap_or("").trim().to_string(),
                shares,
            })
        })
        .collect();
    ShockSummary { shocks: named.into_iter().map(|(name, _)| name).collect(), zones }
}

impl ShockSummary {
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["LZCODE".to_string(), "COUNTRY".to_string(), "HLPS".to_string()];
        for shock in &self.shocks {
            header.push(format!("{}_P2plus", shock));
            header.push(format!("{}_P3plus", shock));
        }
        header.push("3plus_count".to_string());
        header.push("2plus_count".to_string());
        header
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        let cell = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        self.zones
            .iter()
            .map(|z| {
                let mut rec = vec![z.lzcode.clone(), z.country.clone(), z.hlps.clone()];
                for s in &z.shares {
                    rec.push(cell(s.p2plus));
                    rec.push(cell(s.p3plus));
                }
                rec.push(z.count_3plus().to_string());
                rec.push(z.count_2plus().to_string());
                rec
            })
            .collect()
    }

    /// Zones ordered by how many shocks reach phase 3+.
    pub fn preview(&self) -> Vec<ShockPreviewRow> {
        let mut ranked: BTreeMap<(Reverse<usize>, &str), &ZoneOutcome> = BTreeMap::new();
        for z in &self.zones {
            ranked.insert((Reverse(z.count_3plus()), z.lzcode.as_str()), z);
        }
        ranked
            .into_values()
            .map(|z| ShockPreviewRow {
                lzcode: z.lzcode.clone(),
                hlps: z.hlps.clone(),
                count_3plus: z.count_3plus(),
                count_2plus: z.count_2plus(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shock(lhz: &str, pop: f64, phases: [f64; 5]) -> ShockRow {
        ShockRow {
            admin1: "Nord".into(),
            admin2_lhz: lhz.into(),
            population: Some(pop),
            phases: phases.map(Some),
        }
    }

    fn hlps(country: &str, lz: &str, score: &str) -> RawHlpsRow {
        RawHlpsRow {
            country: Some(country.into()),
            lzcode: Some(lz.into()),
            hlps: Some(score.into()),
        }
    }

    #[test]
    fn shock_names_come_from_the_file_stem() {
        let name = shock_name("HT_2019_singleshock_maizeprice_results");
        assert_eq!(name.as_deref(), Some("maizeprice"));
        assert_eq!(shock_name("rainfall").as_deref(), Some("rainfall"));
        assert_eq!(shock_name("HT_2019_drought"), None);
        assert_eq!(shock_name("HT_2019_Baseline"), None);
    }

    #[test]
    fn shares_use_the_worst_case_population() {
        let rows = vec![
            shock("Cap-Haitien_HT01", 100.0, [50.0, 20.0, 20.0, 10.0, 0.0]),
            shock("Limbe_HT01", 100.0, [100.0, 0.0, 0.0, 0.0, 0.0]),
            shock("Jacmel_HT02", 0.0, [0.0; 5]),
        ];
        let shares = zone_shares(&rows);
        let ht01 = shares["HT01"];
        assert!((ht01.p3plus.unwrap() - 0.3).abs() < 1e-9);
        assert!((ht01.p2plus.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(shares["HT02"], ZoneShares::default());
    }

    #[test]
    fn summary_joins_zones_and_counts_shocks() {
        let tables = vec![
            (
                "HT_2019_singleshock_maizeprice".to_string(),
                vec![shock("A_HT01", 10.0, [5.0, 3.0, 2.0, 0.0, 0.0])],
            ),
            (
                "HT_2019_singleshock_rain".to_string(),
                vec![shock("A_HT01", 10.0, [7.0, 3.0, 0.0, 0.0, 0.0])],
            ),
            ("HT_2019_drought".to_string(), vec![shock("A_HT01", 10.0, [0.0; 5])]),
        ];
        let scores = vec![
            hlps("HT", "HT01", "0.4"),
            hlps("HT", "HT09", "0.7"),
            hlps("MG", "MG01", "1"),
        ];
        let summary = summarize(&scores, "HT", &tables);
        assert_eq!(summary.shocks, vec!["maizeprice", "rain"]);
        assert_eq!(summary.zones.len(), 2);
        assert_eq!(summary.zones[0].count_3plus(), 1);
        assert_eq!(summary.zones[0].count_2plus(), 2);
        assert_eq!(summary.zones[1].count_2plus(), 0);
        assert_eq!(
            summary.header(),
            vec![
                "LZCODE",
                "COUNTRY",
                "HLPS",
                "maizeprice_P2plus",
                "maizeprice_P3plus",
                "rain_P2plus",
                "rain_P3plus",
                "3plus_count",
                "2plus_count",
            ]
        );
        let records = summary.records();
        assert_eq!(records[0], vec!["HT01", "HT", "0.4", "0.5", "0.2", "0.3", "0", "1", "2"]);
        assert_eq!(records[1], vec!["HT09", "HT", "0.7", "", "", "", "", "0", "0"]);
        assert_eq!(summary.preview()[0].lzcode, "HT01");
    }
}
