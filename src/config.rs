// Run configuration, read from a TOML file. Every section is optional and
// falls back to the file names the monthly run uses.
use crate::error::GdhiError;
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "gdhi.toml";

const CHIRPS_URL: &str =
    "https://edcftp.cr.usgs.gov/project/fews/africa/east/dekadal/wrsi-chirps-etos";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub reconcile: ReconcileConfig,
    pub crops: CropConfig,
    pub ipc: IpcConfig,
    pub fetch: FetchConfig,
    pub donations: DonationConfig,
    pub prices: PriceConfig,
    pub crop_specs: CropSpecConfig,
    pub hlps: HlpsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub year: i32,
    pub month: u32,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        let today = Local::now().date_naive();
        RunConfig {
            year: today.year(),
            month: today.month(),
            output_dir: PathBuf::from("out"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub crm_report: PathBuf,
    pub processor_export: PathBuf,
    pub source_codes: Option<PathBuf>,
    /// Contributions on or after this date are left out of both sources.
    pub cutoff: Option<NaiveDate>,
    /// CRM source codes that identify processor-originated contributions.
    pub codes: Vec<String>,
    pub output: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            crm_report: PathBuf::from("ContributionReport.txt"),
            processor_export: PathBuf::from("contributions.csv"),
            source_codes: None,
            cutoff: None,
            codes: vec!["ActBlue".to_string(), "ActBlue General".to_string()],
            output: "crm_processor_merge.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub wrsi_dir: PathBuf,
    pub first_year: i32,
    /// Defaults to the run year.
    pub last_year: Option<i32>,
    pub et_production: Option<PathBuf>,
    pub so_production: Option<PathBuf>,
    pub ke_production: Option<PathBuf>,
}

impl Default for CropConfig {
    fn default() -> Self {
        CropConfig {
            wrsi_dir: PathBuf::from("wrsi"),
            first_year: 2001,
            last_year: None,
            et_production: Some(PathBuf::from("ET_agprod_data.csv")),
            so_production: Some(PathBuf::from("SO_agprod_data.csv")),
            ke_production: Some(PathBuf::from("KE_agprod_data.csv")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AggregationLevel {
    Admin1,
    Lhz,
    LhzAdmin1,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub country: String,
    pub phases: PathBuf,
    pub units: PathBuf,
    pub population: Option<PathBuf>,
    pub population_url: Option<String>,
    pub level: Option<AggregationLevel>,
    pub output: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        IpcConfig {
            country: "HT".to_string(),
            phases: PathBuf::from("IPC_phases.csv"),
            units: PathBuf::from("mapping_units.csv"),
            population: None,
            population_url: None,
            level: Some(AggregationLevel::LhzAdmin1),
            output: "IPC_Analysis.csv".to_string(),
        }
    }
}

/// Directory layout of the USGS WRSI archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveLayout {
    /// `w<yy><dd><code>.zip` in one flat directory.
    Legacy,
    /// `east<x>/w<yyyy><dd><code>.zip` under the CHIRPS/ETos tree.
    #[default]
    Chirps,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub layout: ArchiveLayout,
    /// Root of the legacy archives.
    pub base_url: String,
    /// Root of the CHIRPS/ETos archives.
    pub chirps_url: String,
    pub api_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            layout: ArchiveLayout::default(),
            base_url: "https://edcftp.cr.usgs.gov/project/fews/dekadal/africa_east".to_string(),
            chirps_url: CHIRPS_URL.to_string(),
            api_url: "https://fdw.fews.net/api".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn archive_root(&self, layout: ArchiveLayout) -> &str {
        match layout {
            ArchiveLayout::Legacy => &self.base_url,
            ArchiveLayout::Chirps => &self.chirps_url,
        }
    }
}

/// Manual correction of one contribution's source code before it is
/// classified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceOverride {
    pub contribution_id: String,
    pub source_code: String,
    pub source_code_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DonationConfig {
    pub export: PathBuf,
    /// Source code to donation type lookup, as a file or a CSV URL.
    pub source_groups: Option<PathBuf>,
    pub source_groups_url: Option<String>,
    /// Contributions received on or after this date are left out.
    pub end_date: Option<NaiveDate>,
    /// Years compared month by month in the cash comparison table.
    pub compare_years: Vec<i32>,
    pub overrides: Vec<SourceOverride>,
}

impl Default for DonationConfig {
    fn default() -> Self {
        DonationConfig {
            export: PathBuf::from("ngp_all.csv"),
            source_groups: Some(PathBuf::from("source_code_groups.csv")),
            source_groups_url: None,
            end_date: None,
            compare_years: vec![2017, 2019, 2021],
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Data-warehouse market price dataset; fetched when `file` is unset.
    pub dataset: String,
    pub file: Option<PathBuf>,
    /// First month (1-12) of the consumption year.
    pub consumption_start: u32,
    /// Reference consumption year, e.g. `2017-2018`.
    pub baseline: String,
    pub first_year: i32,
    pub last_year: i32,
    /// Months whose prices enter the consumption-year average.
    pub months: Vec<u32>,
    pub price_type: String,
}

impl Default for PriceConfig {
    fn default() -> Self {
        PriceConfig {
            dataset: "1786".to_string(),
            file: None,
            consumption_start: 4,
            baseline: "2017-2018".to_string(),
            first_year: 2001,
            last_year: 2021,
            months: (1..=12).collect(),
            price_type: "StapleFood".to_string(),
        }
    }
}

impl PriceConfig {
    pub fn output(&self) -> String {
        format!("{}_price_PS.csv", self.price_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CropSpecConfig {
    pub country: String,
    /// CPC v2 product codes requested from the API.
    pub cpcv2: Vec<String>,
    /// Saved `cropproductionfacts` JSON; fetched when unset.
    pub file: Option<PathBuf>,
    /// Admin level (1-3) and name of the area analysed.
    pub area_level: u8,
    pub area: String,
    pub baseline_year: i32,
    pub first_year: i32,
}

impl Default for CropSpecConfig {
    fn default() -> Self {
        CropSpecConfig {
            country: "MG".to_string(),
            cpcv2: vec!["R01122".to_string(), "R01592".to_string()],
            file: None,
            area_level: 2,
            area: "Androy".to_string(),
            baseline_year: 2017,
            first_year: 2000,
        }
    }
}

impl CropSpecConfig {
    pub fn output(&self) -> String {
        format!("{}_production.csv", self.area.replace(' ', "_"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HlpsConfig {
    pub country: String,
    pub hlps_file: PathBuf,
    /// Directory of single-shock outcome tables, one CSV per shock.
    pub results_dir: PathBuf,
    pub output: String,
}

impl Default for HlpsConfig {
    fn default() -> Self {
        HlpsConfig {
            country: "HT".to_string(),
            hlps_file: PathBuf::from("HLPS.csv"),
            results_dir: PathBuf::from("single_shock"),
            output: "HLPS_single_shock.csv".to_string(),
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Config, Box<dyn Error>> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`; a missing default file means "use defaults".
    pub fn load(path: &Path) -> Result<Config, Box<dyn Error>> {
        if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
            return Ok(Config::default());
        }
        Config::parse(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), GdhiError> {
        if !(1..=12).contains(&self.run.month) {
            let msg = format!("run.month {} is not 1-12", self.run.month);
            return Err(GdhiError::InvalidConfig(msg));
        }
        if self.crops.first_year > self.last_year() {
            return Err(GdhiError::InvalidConfig(format!(
                "crops.first_year {} is after last year {}",
                self.crops.first_year,
                self.last_year()
            )));
        }
        self.validate_prices()?;
        if !(1..=3).contains(&self.crop_specs.area_level) {
            let msg = format!("crop_specs.area_level {} is not 1-3", self.crop_specs.area_level);
            return Err(GdhiError::InvalidConfig(msg));
        }
        Ok(())
    }

    fn validate_prices(&self) -> Result<(), GdhiError> {
        let pc = &self.prices;
        let month_ok = |m: &u32| (1..=12).contains(m);
        if !month_ok(&pc.consumption_start) || !pc.months.iter().all(month_ok) {
            return Err(GdhiError::InvalidConfig(
                "prices.consumption_start and prices.months must be 1-12".to_string(),
            ));
        }
        let baseline_start = pc
            .baseline
            .split_once('-')
            .and_then(|(start, _)| start.trim().parse::<i32>().ok());
        match baseline_start {
            Some(y) if (pc.first_year..pc.last_year).contains(&y) => Ok(()),
            _ => Err(GdhiError::InvalidConfig(format!(
                "prices.baseline '{}' is not a consumption year within {}-{}",
                pc.baseline, pc.first_year, pc.last_year
            ))),
        }
    }

    pub fn last_year(&self) -> i32 {
        self.crops.last_year.unwrap_or(self.run.year)
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.run.output_dir.join(name)
    }
}
