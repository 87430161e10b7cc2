use crate::error::GdhiError;
use crate::types::{
    MappingUnit, PopulationRecord, RawCropFact, RawCrmRow, RawDonationRow, RawHlpsRow,
    RawPriceFact, RawProcessorRow, RawProductionRow, RawSourceCodeRow, RawSourceGroupRow,
    ShockRow, UnitInfo,
};
use crate::util::parse_f64_safe;
use crate::wrsi::{WrsiProduct, WrsiTable, WrsiUnit, WrsiValue};
use csv::{ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub total_rows: usize,
    pub parse_errors: usize,
}

/// Deserialize every row of a delimited file, skipping rows that do not fit
/// the record type and counting them.
fn read_rows<T: DeserializeOwned>(
    text: &str,
    delimiter: u8,
) -> Result<(Vec<T>, LoadReport), Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());
    let mut report = LoadReport::default();
    let mut rows = Vec::new();
    for result in rdr.deserialize::<T>() {
        report.total_rows += 1;
        match result {
            Ok(r) => rows.push(r),
            Err(_) => report.parse_errors += 1,
        }
    }
    Ok((rows, report))
}

/// Read a text file that may be UTF-8 or latin-1 (CRM exports are the latter).
pub fn read_text(path: &Path) -> Result<String, Box<dyn Error>> {
    let bytes = fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        // latin-1 maps every byte straight onto the same code point
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    };
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

pub fn load_production(path: &Path) -> Result<(Vec<RawProductionRow>, LoadReport), Box<dyn Error>> {
    read_rows(&read_text(path)?, b',')
}

pub fn load_crm(path: &Path) -> Result<(Vec<RawCrmRow>, LoadReport), Box<dyn Error>> {
    read_rows(&read_text(path)?, b'\t')
}

pub fn load_processor(path: &Path) -> Result<(Vec<RawProcessorRow>, LoadReport), Box<dyn Error>> {
    read_rows(&read_text(path)?, b',')
}

pub fn load_source_codes(path: &Path) -> Result<Vec<RawSourceCodeRow>, Box<dyn Error>> {
    Ok(read_rows(&read_text(path)?, b',')?.0)
}

pub fn load_mapping_units(path: &Path) -> Result<Vec<MappingUnit>, Box<dyn Error>> {
    let (units, report) = read_rows::<MappingUnit>(&read_text(path)?, b',')?;
    if report.parse_errors > 0 {
        warn!(file = %path.display(), skipped = report.parse_errors, "mapping units skipped");
    }
    Ok(units)
}

pub fn parse_population(json: &str) -> Result<Vec<PopulationRecord>, Box<dyn Error>> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_population(path: &Path) -> Result<Vec<PopulationRecord>, Box<dyn Error>> {
    parse_population(&read_text(path)?)
}

pub fn load_donations(path: &Path) -> Result<(Vec<RawDonationRow>, LoadReport), Box<dyn Error>> {
    read_rows(&read_text(path)?, b',')
}

pub fn parse_source_groups(text: &str) -> Result<Vec<RawSourceGroupRow>, Box<dyn Error>> {
    Ok(read_rows(text.trim_start_matches('\u{feff}'), b',')?.0)
}

pub fn load_source_groups(path: &Path) -> Result<Vec<RawSourceGroupRow>, Box<dyn Error>> {
    parse_source_groups(&read_text(path)?)
}

pub fn parse_price_facts(json: &str) -> Result<Vec<RawPriceFact>, Box<dyn Error>> {
    Ok(serde_json::from_str(json)?)
}

pub fn parse_crop_facts(json: &str) -> Result<Vec<RawCropFact>, Box<dyn Error>> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_hlps(path: &Path) -> Result<Vec<RawHlpsRow>, Box<dyn Error>> {
    let (rows, report) = read_rows::<RawHlpsRow>(&read_text(path)?, b',')?;
    if report.parse_errors > 0 {
        warn!(file = %path.display(), skipped = report.parse_errors, "HLPS rows skipped");
    }
    Ok(rows)
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn required_column(headers: &StringRecord, name: &str, file: &Path) -> Result<usize, GdhiError> {
    column(headers, name).ok_or_else(|| GdhiError::MissingColumn {
        file: file.display().to_string(),
        column: name.to_string(),
    })
}

/// Load one WRSI attribute table: identifying columns plus one `WRSI_<year>`
/// column per season.
pub fn load_wrsi_table(path: &Path, product: WrsiProduct) -> Result<WrsiTable, Box<dyn Error>> {
    let text = read_text(path)?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let fnid_col = required_column(&headers, "FNID", path)?;
    let id_cols: Vec<Option<usize>> = ["COUNTRY", "ADMIN0", "ADMIN1", "ADMIN2", "ADMIN3", "PCODE"]
        .iter()
        .map(|name| column(&headers, name))
        .collect();
    let year_cols: Vec<(usize, i32)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let year = h.trim().strip_prefix("WRSI_")?.parse::<i32>().ok()?;
            Some((i, year))
        })
        .collect();

    let mut units = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let fnid = field(Some(fnid_col));
        if fnid.is_empty() {
            continue;
        }
        let info = UnitInfo {
            fnid,
            country: field(id_cols[0]),
            admin0: field(id_cols[1]),
            admin1: field(id_cols[2]),
            admin2: field(id_cols[3]),
            admin3: field(id_cols[4]),
            pcode: field(id_cols[5]),
        };
        let values = year_cols
            .iter()
            .map(|&(i, year)| {
                let value = parse_f64_safe(record.get(i))
                    .map(WrsiValue::from_raw)
                    .unwrap_or(WrsiValue::NoData);
                (year, value)
            })
            .collect();
        units.push(WrsiUnit { info, values });
    }
    Ok(WrsiTable::new(product, units))
}

/// Load every WRSI table in `dir`. The product comes from the two-letter
/// suffix of the file stem (`GDHI_Admin_Units_ee.csv` is Maize long rains).
pub fn load_wrsi_dir(dir: &Path) -> Result<BTreeMap<WrsiProduct, WrsiTable>, Box<dyn Error>> {
    let mut tables = BTreeMap::new();
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let code = stem.rsplit('_').next().unwrap_or(stem);
        let product = match WrsiProduct::from_code(code) {
            Ok(p) => p,
            Err(e) => {
                warn!(file = %path.display(), "skipping: {}", e);
                continue;
            }
        };
        let table = load_wrsi_table(&path, product)?;
        let years = table.years();
        info!(
            product = %product,
            units = table.units.len(),
            first_year = ?years.first(),
            last_year = ?years.last(),
            "WRSI table loaded"
        );
        tables.insert(product, table);
    }
    Ok(tables)
}

/// IPC phase history: one row per mapping unit, one column per outlook cycle.
#[derive(Debug, Clone, Default)]
pub struct PhaseTable {
    pub cycles: Vec<String>,
    pub units: Vec<(String, Vec<Option<f64>>)>,
}

/// The first column holds the FNID whatever its header says (exports often
/// leave it blank).
pub fn parse_phase_table(text: &str) -> Result<PhaseTable, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();
    let cycles: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
    let mut units = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fnid = record.get(0).unwrap_or("").trim().to_string();
        if fnid.is_empty() {
            continue;
        }
        let phases = (1..=cycles.len())
            .map(|i| parse_f64_safe(record.get(i)))
            .collect();
        units.push((fnid, phases));
    }
    Ok(PhaseTable { cycles, units })
}

pub fn load_phase_table(path: &Path) -> Result<PhaseTable, Box<dyn Error>> {
    parse_phase_table(&read_text(path)?)
}

/// Single-shock outcome table. The first two columns are the region and the
/// `<admin2>_<lzcode>` pair whatever their headers say; the worst-case
/// population columns are found by name.
pub fn parse_shock_table(text: &str, file: &Path) -> Result<Vec<ShockRow>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();
    let pop_col = required_column(&headers, "Wor_pop", file)?;
    let phase_cols = ["Wor_P1", "Wor_P2", "Wor_P3", "Wor_P4", "Wor_P5"]
        .iter()
        .map(|name| required_column(&headers, name, file))
        .collect::<Result<Vec<usize>, GdhiError>>()?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let admin2_lhz = record.get(1).unwrap_or("").trim().to_string();
        if admin2_lhz.is_empty() {
            continue;
        }
        let mut phases = [None; 5];
        for (slot, &col) in phases.iter_mut().zip(&phase_cols) {
            *slot = parse_f64_safe(record.get(col));
        }
        rows.push(ShockRow {
            admin1: record.get(0).unwrap_or("").trim().to_string(),
            admin2_lhz,
            population: parse_f64_safe(record.get(pop_col)),
            phases,
        });
    }
    Ok(rows)
}

/// Every CSV in `dir`, keyed by file stem, in file-name order.
pub fn load_shock_dir(dir: &Path) -> Result<Vec<(String, Vec<ShockRow>)>, Box<dyn Error>> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.path());
    let mut tables = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let rows = parse_shock_table(&read_text(&path)?, &path)?;
        info!(file = %path.display(), rows = rows.len(), "shock table loaded");
        tables.push((stem.to_string(), rows));
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gdhi_loader_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_wrsi_table_with_sentinels() {
        let path = fixture(
            "units_ee.csv",
            b"FNID,COUNTRY,ADMIN0,ADMIN1,ADMIN2,ADMIN3,WRSI_2001,WRSI_2002\n\
              ET1,ET,Ethiopia,Amhara,North Wollo,,80,253\n\
              ET2,ET,Ethiopia,Afar,Zone 1,,254,\n",
        );
        let table = load_wrsi_table(&path, WrsiProduct::MaizeL).unwrap();
        assert_eq!(table.units.len(), 2);
        let et1 = table.get("ET1").unwrap();
        assert_eq!(et1.info.admin2, "North Wollo");
        assert_eq!(et1.index(2001), Some(80.0));
        assert_eq!(et1.index(2002), Some(0.0));
        let et2 = table.get("ET2").unwrap();
        assert_eq!(et2.index(2001), None);
        assert_eq!(et2.values[&2002], WrsiValue::NoData);
        assert_eq!(table.years(), vec![2001, 2002]);
    }

    #[test]
    fn wrsi_table_requires_fnid() {
        let path = fixture("nofnid_el.csv", b"ADMIN1,WRSI_2001\nAmhara,50\n");
        let err = load_wrsi_table(&path, WrsiProduct::GrainsL).unwrap_err();
        assert!(err.to_string().contains("FNID"));
    }

    #[test]
    fn decodes_latin1_tab_delimited_report() {
        let mut bytes =
            b"Contribution ID\tVANID\tContact Name\tAmount\tSource Code\tDate Received\n".to_vec();
        bytes.extend_from_slice(b"1\t9\tMu\xf1oz, Ana\t$25.00\tActBlue\t3/2/2020\n");
        let path = fixture("crm.txt", &bytes);
        let (rows, report) = load_crm(&path).unwrap();
        assert_eq!(report.total_rows, 1);
        assert_eq!(rows[0].contact_name.as_deref(), Some("Muñoz, Ana"));
        assert_eq!(rows[0].source_code.as_deref(), Some("ActBlue"));
    }

    #[test]
    fn phase_table_uses_first_column_as_fnid() {
        let table = parse_phase_table(",2019-02,2019-06\nHT1,3,2\nHT2,,4\n").unwrap();
        assert_eq!(table.cycles, vec!["2019-02", "2019-06"]);
        assert_eq!(table.units[0], ("HT1".to_string(), vec![Some(3.0), Some(2.0)]));
        assert_eq!(table.units[1].1, vec![None, Some(4.0)]);
    }

    #[test]
    fn parses_population_json() {
        let json = r#"[{"fnid":"HT1","estimated_population":1200.5,"name":"x"},{"fnid":"HT2"}]"#;
        let pop = parse_population(json).unwrap();
        assert_eq!(pop.len(), 2);
        assert_eq!(pop[0].estimated_population, Some(1200.5));
        assert_eq!(pop[1].estimated_population, None);
    }

    #[test]
    fn shock_table_reads_phase_columns_by_name() {
        let text = "Region,Zone,Wor_pop,Wor_P1,Wor_P2,Wor_P3,Wor_P4,Wor_P5\n\
                    Nord,Cap_HT02,100,50,20,20,10,0\n\
                    ,,,,,,,\n";
        let rows = parse_shock_table(text, Path::new("shock.csv")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].admin1, "Nord");
        assert_eq!(rows[0].admin2_lhz, "Cap_HT02");
        assert_eq!(rows[0].population, Some(100.0));
        assert_eq!(rows[0].phases[3], Some(10.0));

        let err = parse_shock_table("Region,Zone,Wor_pop\n", Path::new("bad.csv")).unwrap_err();
        assert!(err.to_string().contains("Wor_P1"));
    }

    #[test]
    fn fact_values_accept_numbers_and_strings() {
        let json = r#"[
            {"product":"Maize","start_date":"2018-04-01","value":120.5,"currency":"HTG"},
            {"product":"Rice","start_date":"2018-04-01","value":"1,250"},
            {"product":"Beans","start_date":"2018-04-01","value":null}
        ]"#;
        let facts = parse_price_facts(json).unwrap();
        assert_eq!(facts[0].value, Some(120.5));
        assert_eq!(facts[1].value, Some(1250.0));
        assert_eq!(facts[2].value, None);

        let crop_json = r#"[{"admin_2":"Androy","value":3,"season_year":"Annual 2017"}]"#;
        let crops = parse_crop_facts(crop_json).unwrap();
        assert_eq!(crops[0].value, Some(3.0));
    }

    #[test]
    fn reads_donation_export_and_groups() {
        let path = fixture(
            "ngp.csv",
            b"Contribution ID,Amount,Date Received,Source Code,Source Code Path,Payment Method\n\
              1,$50.00,2021-03-04,Web,Online/Web,Credit Card\n",
        );
        let (rows, report) = load_donations(&path).unwrap();
        assert_eq!(report.parse_errors, 0);
        assert_eq!(rows[0].payment_method.as_deref(), Some("Credit Card"));
        assert_eq!(rows[0].contribution_type, None);

        let groups = parse_source_groups(
            "Source Code,Source Code Path,Source_Code_Gen\nWeb,Online/Web,Online\n",
        )
        .unwrap();
        assert_eq!(groups[0].group.as_deref(), Some("Online"));
    }
}
