// Long-term IPC statistics per mapping unit and their population-weighted
// aggregation to admin-1 / livelihood-zone level.
use crate::config::AggregationLevel;
use crate::loader::PhaseTable;
use crate::types::{IpcAggregateRow, IpcUnitRow, MappingUnit, PopulationRecord};
use crate::util::{format_number, format_percent, mean_present, round_to};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitStats {
    pub fnid: String,
    /// Mean of the classified cycles, 2 decimals. `None` if never classified.
    pub avg: Option<f64>,
    /// Fraction of all cycles (classified or not) in Phase 3 or worse.
    pub share_3plus: Option<f64>,
    pub share_2plus: Option<f64>,
}

pub fn unit_stats(table: &PhaseTable) -> Vec<UnitStats> {
    let cycles = table.cycles.len();
    let share = |phases: &[Option<f64>], at_least: f64| {
        if cycles == 0 {
            return None;
        }
        let hits = phases.iter().flatten().filter(|p| **p >= at_least).count();
        Some(hits as f64 / cycles as f64)
    };
    table
        .units
        .iter()
        .map(|(fnid, phases)| UnitStats {
            fnid: fnid.clone(),
            avg: mean_present(phases.iter().copied()).map(|v| round_to(v, 2)),
            share_3plus: share(phases, 3.0),
            share_2plus: share(phases, 2.0),
        })
        .collect()
}

/// A mapping unit with whatever statistics its FNID has.
#[derive(Debug, Clone)]
pub struct IpcUnit {
    pub unit: MappingUnit,
    pub stats: Option<UnitStats>,
}

pub fn has_livelihood_zones(units: &[MappingUnit]) -> bool {
    units.iter().any(|u| u.lzname.is_some())
}

/// Left join of the mapping units onto the statistics, sorted the way the
/// analysts read the table: by livelihood zone first when the units carry one.
pub fn join_units(units: &[MappingUnit], stats: &[UnitStats]) -> Vec<IpcUnit> {
    let by_fnid: HashMap<&str, &UnitStats> = stats.iter().map(|s| (s.fnid.as_str(), s)).collect();
    let mut joined: Vec<IpcUnit> = units
        .iter()
        .map(|u| IpcUnit {
            unit: u.clone(),
            stats: by_fnid.get(u.fnid.as_str()).map(|s| (*s).clone()),
        })
        .collect();

    let unmatched = joined.iter().filter(|j| j.stats.is_none()).count();
    if unmatched > 0 {
        warn!(unmatched, "mapping units without IPC history");
    }

    if has_livelihood_zones(units) {
        joined.sort_by(|a, b| {
            (a.unit.lzcode.as_deref().unwrap_or(""), &a.unit.admin1, &a.unit.admin2)
                .cmp(&(b.unit.lzcode.as_deref().unwrap_or(""), &b.unit.admin1, &b.unit.admin2))
        });
    } else {
        joined.sort_by(|a, b| {
            (&a.unit.admin1, &a.unit.admin2).cmp(&(&b.unit.admin1, &b.unit.admin2))
        });
    }
    joined
}

pub fn group_label(level: AggregationLevel, unit: &MappingUnit) -> String {
    let lz = unit.lzcode.as_deref().unwrap_or("");
    match level {
        AggregationLevel::Admin1 => unit.admin1.clone(),
        AggregationLevel::Lhz => lz.to_string(),
        AggregationLevel::LhzAdmin1 => format!("{} {}", lz, unit.admin1),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub group: String,
    pub population: f64,
    pub avg: f64,
    /// Percent (0-100) of cycles in Phase 3+, population weighted.
    pub pct_3plus: f64,
    pub pct_2plus: f64,
}

/// Weight every unit by its share of its group's population and sum the
/// weighted statistics per group. Units without a population estimate are
/// left out; missing statistics contribute nothing to the sums.
pub fn aggregate(
    units: &[IpcUnit],
    population: &[PopulationRecord],
    level: AggregationLevel,
) -> Vec<Aggregate> {
    let pop: HashMap<&str, f64> = population
        .iter()
        .filter_map(|p| Some((p.fnid.as_str(), p.estimated_population?)))
        .collect();

    let mut groups: BTreeMap<String, Vec<(&IpcUnit, f64)>> = BTreeMap::new();
    for u in units {
        match pop.get(u.unit.fnid.as_str()) {
            Some(&p) => groups.entry(group_label(level, &u.unit)).or_default().push((u, p)),
            None => {
                warn!(fnid = %u.unit.fnid, "no population estimate; unit left out of aggregation")
            }
        }
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let total: f64 = members.iter().map(|(_, p)| p).sum();
            let mut agg = Aggregate {
                group,
                population: total,
                avg: 0.0,
                pct_3plus: 0.0,
                pct_2plus: 0.0,
            };
            if total <= 0.0 {
                return agg;
            }
            for (u, p) in &members {
                let Some(stats) = &u.stats else { continue };
                let weight = p / total;
                agg.avg += stats.avg.unwrap_or(0.0) * weight;
                agg.pct_3plus += stats.share_3plus.unwrap_or(0.0) * weight * 100.0;
                agg.pct_2plus += stats.share_2plus.unwrap_or(0.0) * weight * 100.0;
            }
            agg
        })
        .collect()
}

pub fn unit_row(u: &IpcUnit) -> IpcUnitRow {
    let stats = u.stats.as_ref();
    IpcUnitRow {
        fnid: u.unit.fnid.clone(),
        country: u.unit.country.clone(),
        admin0: u.unit.admin0.clone(),
        admin1: u.unit.admin1.clone(),
        admin2: u.unit.admin2.clone(),
        admin3: u.unit.admin3.clone(),
        admin4: u.unit.admin4.clone(),
        lzcode: u.unit.lzcode.clone().unwrap_or_default(),
        lzname: u.unit.lzname.clone().unwrap_or_default(),
        ipc_avg: stats.and_then(|s| s.avg).map(|v| format!("{:.2}", v)).unwrap_or_default(),
        ipc_3plus: stats.and_then(|s| s.share_3plus).map(format_percent).unwrap_or_default(),
        ipc_2plus: stats.and_then(|s| s.share_2plus).map(format_percent).unwrap_or_default(),
    }
}

pub fn aggregate_row(a: &Aggregate) -> IpcAggregateRow {
    IpcAggregateRow {
        group: a.group.clone(),
        population: format_number(a.population, 0),
        ipc_avg: format!("{:.2}", a.avg),
        ipc_3plus: format!("{:.2}", a.pct_3plus),
        ipc_2plus: format!("{:.2}", a.pct_2plus),
    }
}

#[derive(Debug, Clone)]
pub struct IpcResult {
    pub units: Vec<IpcUnit>,
    pub aggregates: Vec<Aggregate>,
}

/// Whole job: statistics, join, and (when a level and population are given)
/// aggregation.
pub fn run(
    phases: &PhaseTable,
    units: &[MappingUnit],
    population: Option<&[PopulationRecord]>,
    level: Option<AggregationLevel>,
) -> IpcResult {
    let stats = unit_stats(phases);
    info!(cycles = phases.cycles.len(), units = stats.len(), "IPC statistics computed");
    let joined = join_units(units, &stats);
    let aggregates = match (population, level) {
        (Some(pop), Some(level)) => aggregate(&joined, pop, level),
        _ => Vec::new(),
    };
    IpcResult { units: joined, aggregates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_phase_table;

    const EPS: f64 = 1e-9;

    fn unit(fnid: &str, admin1: &str, admin2: &str, lz: Option<&str>) -> MappingUnit {
        MappingUnit {
            fnid: fnid.into(),
            admin1: admin1.into(),
            admin2: admin2.into(),
            lzcode: lz.map(String::from),
            lzname: lz.map(|z| format!("Zone {}", z)),
            ..MappingUnit::default()
        }
    }

    fn stats(fnid: &str, avg: f64, share_3plus: f64, share_2plus: f64) -> UnitStats {
        UnitStats {
            fnid: fnid.into(),
            avg: Some(avg),
            share_3plus: Some(share_3plus),
            share_2plus: Some(share_2plus),
        }
    }

    fn pop(fnid: &str, p: f64) -> PopulationRecord {
        PopulationRecord { fnid: fnid.into(), estimated_population: Some(p) }
    }

    #[test]
    fn stats_use_cycle_count_as_denominator() {
        let table = parse_phase_table(",c1,c2,c3,c4\nHT1,1,2,3,\nHT2,,,,\n").unwrap();
        let stats = unit_stats(&table);
        assert_eq!(stats[0].avg, Some(2.0));
        assert!((stats[0].share_3plus.unwrap() - 0.25).abs() < EPS);
        assert!((stats[0].share_2plus.unwrap() - 0.5).abs() < EPS);
        assert_eq!(stats[1].avg, None);
        assert_eq!(stats[1].share_3plus, Some(0.0));
    }

    #[test]
    fn average_is_rounded() {
        let table = parse_phase_table(",c1,c2,c3\nHT1,1,2,2\n").unwrap();
        assert_eq!(unit_stats(&table)[0].avg, Some(1.67));
    }

    #[test]
    fn join_keeps_all_units_and_sorts_by_zone() {
        let units = vec![
            unit("HT3", "Sud", "Cayes", Some("HT07")),
            unit("HT1", "Nord", "Cap", Some("HT02")),
            unit("HT2", "Centre", "Hinche", Some("HT02")),
        ];
        let stats = vec![stats("HT1", 2.0, 0.1, 0.5)];
        let joined = join_units(&units, &stats);
        let order: Vec<&str> = joined.iter().map(|j| j.unit.fnid.as_str()).collect();
        assert_eq!(order, vec!["HT2", "HT1", "HT3"]);
        assert!(joined[1].stats.is_some());
        assert!(joined[0].stats.is_none());
    }

    #[test]
    fn equal_weights_give_plain_mean() {
        let units = vec![
            unit("A", "Nord", "a", Some("Z1")),
            unit("B", "Nord", "b", Some("Z1")),
            unit("C", "Nord", "c", Some("Z1")),
        ];
        let stats = vec![
            stats("A", 1.0, 0.0, 0.2),
            stats("B", 2.0, 0.3, 0.4),
            stats("C", 3.0, 0.6, 0.9),
        ];
        let joined = join_units(&units, &stats);
        let population = vec![pop("A", 500.0), pop("B", 500.0), pop("C", 500.0)];
        let levels = [AggregationLevel::Admin1, AggregationLevel::Lhz, AggregationLevel::LhzAdmin1];
        for level in levels {
            let agg = aggregate(&joined, &population, level);
            assert_eq!(agg.len(), 1);
            assert!((agg[0].avg - 2.0).abs() < EPS);
            assert!((agg[0].pct_3plus - 30.0).abs() < EPS);
            assert!((agg[0].pct_2plus - 50.0).abs() < EPS);
            assert!((agg[0].population - 1500.0).abs() < EPS);
        }
    }

    #[test]
    fn population_shares_weight_the_groups() {
        let units = vec![
            unit("A", "Nord", "a", Some("Z1")),
            unit("B", "Nord", "b", Some("Z1")),
            unit("C", "Sud", "c", Some("Z1")),
        ];
        let stats = vec![
            stats("A", 1.0, 0.0, 0.0),
            stats("B", 3.0, 1.0, 1.0),
            stats("C", 4.0, 1.0, 1.0),
        ];
        let joined = join_units(&units, &stats);
        let population = vec![pop("A", 300.0), pop("B", 100.0), pop("C", 50.0)];

        let agg = aggregate(&joined, &population, AggregationLevel::LhzAdmin1);
        let groups: Vec<&str> = agg.iter().map(|a| a.group.as_str()).collect();
        assert_eq!(groups, vec!["Z1 Nord", "Z1 Sud"]);
        assert!((agg[0].avg - 1.5).abs() < EPS);
        assert!((agg[0].pct_3plus - 25.0).abs() < EPS);
        assert!((agg[1].avg - 4.0).abs() < EPS);

        let by_zone = aggregate(&joined, &population, AggregationLevel::Lhz);
        assert_eq!(by_zone.len(), 1);
        assert!((by_zone[0].avg - (300.0 + 300.0 + 200.0) / 450.0).abs() < EPS);
    }

    #[test]
    fn units_without_population_are_left_out() {
        let units = vec![unit("A", "Nord", "a", None), unit("B", "Nord", "b", None)];
        let stats = vec![
            stats("A", 1.0, 0.0, 0.0),
            stats("B", 5.0, 1.0, 1.0),
        ];
        let joined = join_units(&units, &stats);
        let agg = aggregate(&joined, &[pop("A", 10.0)], AggregationLevel::Admin1);
        assert_eq!(agg.len(), 1);
        assert!((agg[0].avg - 1.0).abs() < EPS);
        assert_eq!(aggregate_row(&agg[0]).population, "10");
    }

    #[test]
    fn unit_rows_format_shares_as_percent() {
        let units = vec![unit("A", "Nord", "a", Some("Z1"))];
        let stats = vec![stats("A", 2.5, 0.125, 1.0)];
        let row = unit_row(&join_units(&units, &stats)[0]);
        assert_eq!(row.ipc_avg, "2.50");
        assert_eq!(row.ipc_3plus, "12.50%");
        assert_eq!(row.ipc_2plus, "100.00%");
        assert_eq!(row.lzname, "Zone Z1");
    }
}
