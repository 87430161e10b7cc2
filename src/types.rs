use crate::util::parse_f64_safe;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tabled::Tabled;

// ---------------------------------------------------------------------------
// Geography and crops
// ---------------------------------------------------------------------------

/// Identifying columns of a GDHI geographic unit, as carried by the admin-unit
/// attribute table every WRSI export is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitInfo {
    pub fnid: String,
    pub country: String,
    pub admin0: String,
    pub admin1: String,
    pub admin2: String,
    pub admin3: String,
    pub pcode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Crop {
    Maize,
    Sorghum,
    Wheat,
    Teff,
    Cowpeas,
}

impl Crop {
    /// Map a data-warehouse product label onto a crop we estimate.
    pub fn from_product(label: &str) -> Option<Crop> {
        match label.trim() {
            "Maize" | "Maize (Corn)" | "Maize Grain (White)" => Some(Crop::Maize),
            "Sorghum" => Some(Crop::Sorghum),
            "Wheat" | "Wheat Grain" => Some(Crop::Wheat),
            "Teff" | "Mixed Teff" => Some(Crop::Teff),
            "Cowpeas" | "Cowpeas (Mixed)" => Some(Crop::Cowpeas),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Crop::Maize => "Maize",
            Crop::Sorghum => "Sorghum",
            Crop::Wheat => "Wheat",
            Crop::Teff => "Teff",
            Crop::Cowpeas => "Cowpeas",
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Season {
    Meher,
    Belg,
    Gu,
    Deyr,
}

impl Season {
    /// Off-season harvests are folded into their main season.
    pub fn parse(label: &str) -> Option<Season> {
        match label.trim() {
            "Meher" => Some(Season::Meher),
            "Belg" => Some(Season::Belg),
            "Gu" | "Gu off-season" => Some(Season::Gu),
            "Deyr" | "Deyr off-season" => Some(Season::Deyr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Season::Meher => "Meher",
            Season::Belg => "Belg",
            Season::Gu => "Gu",
            Season::Deyr => "Deyr",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Raw input rows
// ---------------------------------------------------------------------------

/// One crop-production fact as exported from the data warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProductionRow {
    #[serde(default)]
    pub fnid: Option<String>,
    #[serde(default)]
    pub admin_1: Option<String>,
    #[serde(default)]
    pub admin_2: Option<String>,
    #[serde(default)]
    pub season_name: Option<String>,
    #[serde(default)]
    pub season_year: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// CRM contribution report (tab-delimited).
#[derive(Debug, Clone, Deserialize)]
pub struct RawCrmRow {
    #[serde(rename = "Contribution ID")]
    pub contribution_id: Option<String>,
    #[serde(rename = "VANID", default)]
    pub vanid: Option<String>,
    #[serde(rename = "Contact Name")]
    pub contact_name: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<String>,
    #[serde(rename = "Source Code", default)]
    pub source_code: Option<String>,
    #[serde(rename = "Date Received")]
    pub date_received: Option<String>,
}

/// Payment-processor contribution export.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProcessorRow {
    #[serde(rename = "Receipt ID")]
    pub receipt_id: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<String>,
    #[serde(rename = "Fundraiser Recipient ID", default)]
    pub fundraiser_recipient_id: Option<String>,
    #[serde(rename = "Reference Code", default)]
    pub reference_code: Option<String>,
    #[serde(rename = "Donor First Name", default)]
    pub donor_first_name: Option<String>,
    #[serde(rename = "Donor Last Name")]
    pub donor_last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSourceCodeRow {
    #[serde(rename = "Fundraiser Recipient ID")]
    pub fundraiser_recipient_id: Option<String>,
    #[serde(rename = "Reference Code")]
    pub reference_code: Option<String>,
    #[serde(rename = "Source Code")]
    pub source_code: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Option<String>,
}

/// Mapping-unit attribute table exported from the food-security shapefile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingUnit {
    #[serde(rename = "FNID")]
    pub fnid: String,
    #[serde(rename = "COUNTRY", default)]
    pub country: String,
    #[serde(rename = "ADMIN0", default)]
    pub admin0: String,
    #[serde(rename = "ADMIN1", default)]
    pub admin1: String,
    #[serde(rename = "ADMIN2", default)]
    pub admin2: String,
    #[serde(rename = "ADMIN3", default)]
    pub admin3: String,
    #[serde(rename = "ADMIN4", default)]
    pub admin4: String,
    #[serde(rename = "LZCODE", default)]
    pub lzcode: Option<String>,
    #[serde(rename = "LZNAME", default)]
    pub lzname: Option<String>,
}

/// Geographic-unit record from the data-warehouse API (`fields=with_population`).
#[derive(Debug, Clone, Deserialize)]
pub struct PopulationRecord {
    pub fnid: String,
    #[serde(default)]
    pub estimated_population: Option<f64>,
}

/// CRM contribution export with the columns donation classification needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDonationRow {
    #[serde(rename = "Contribution ID")]
    pub contribution_id: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<String>,
    #[serde(rename = "Date Received")]
    pub date_received: Option<String>,
    #[serde(rename = "Source Code", default)]
    pub source_code: Option<String>,
    #[serde(rename = "Source Code Path", default)]
    pub source_code_path: Option<String>,
    #[serde(rename = "Payment Method", default)]
    pub payment_method: Option<String>,
    #[serde(rename = "Contribution Type", default)]
    pub contribution_type: Option<String>,
}

/// Shared lookup of source codes to a general donation type.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSourceGroupRow {
    #[serde(rename = "Source Code")]
    pub source_code: Option<String>,
    #[serde(rename = "Source Code Path", default)]
    pub source_code_path: Option<String>,
    #[serde(rename = "Source_Code_Gen")]
    pub group: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// The data-warehouse API sends values as numbers, saved exports sometimes
/// as strings.
fn number_or_text<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => Some(n),
        Some(NumberOrText::Text(s)) => parse_f64_safe(Some(&s)),
        None => None,
    })
}

/// Market price fact (`marketpricefacts`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceFact {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub value: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Crop production fact (`cropproductionfacts`, `fields=simple`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawCropFact {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub admin_1: Option<String>,
    #[serde(default)]
    pub admin_2: Option<String>,
    #[serde(default)]
    pub admin_3: Option<String>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub value: Option<f64>,
    #[serde(default)]
    pub season_year: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

/// Household livelihood protection score per livelihood zone.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHlpsRow {
    #[serde(rename = "COUNTRY")]
    pub country: Option<String>,
    #[serde(rename = "LZCODE")]
    pub lzcode: Option<String>,
    #[serde(rename = "HLPS", default)]
    pub hlps: Option<String>,
}

/// One row of a single-shock outcome table: worst-case population by phase
/// for an admin 2 / livelihood zone pair (`<admin2>_<lzcode>`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShockRow {
    pub admin1: String,
    pub admin2_lhz: String,
    pub population: Option<f64>,
    /// Phases 1 to 5.
    pub phases: [Option<f64>; 5],
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ReconciledRow {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "Amount")]
    #[tabled(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "Donor Last Name")]
    #[tabled(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "Contribution ID_crm")]
    #[tabled(skip)]
    pub contribution_id: String,
    #[serde(rename = "VANID_crm")]
    #[tabled(skip)]
    pub vanid: String,
    #[serde(rename = "Donor First Name_crm")]
    #[tabled(skip)]
    pub crm_first_name: String,
    #[serde(rename = "Source Code_crm")]
    #[tabled(rename = "CRM Source Code")]
    pub crm_source_code: String,
    #[serde(rename = "Receipt ID_processor")]
    #[tabled(rename = "Receipt ID")]
    pub receipt_id: String,
    #[serde(rename = "Donor First Name_processor")]
    #[tabled(skip)]
    pub processor_first_name: String,
    #[serde(rename = "Reference Code_processor")]
    #[tabled(skip)]
    pub reference_code: String,
    #[serde(rename = "Source Code_processor")]
    #[tabled(skip)]
    pub processor_source_code: String,
    #[serde(rename = "Tags_processor")]
    #[tabled(skip)]
    pub tags: String,
}

#[derive(Debug, Serialize)]
pub struct ReconcileSummary {
    pub crm_rows: usize,
    pub processor_rows: usize,
    pub skipped_rows: usize,
    pub matched: usize,
    pub crm_only: usize,
    pub processor_only: usize,
    pub exported_rows: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct IpcUnitRow {
    #[serde(rename = "FNID")]
    #[tabled(rename = "FNID")]
    pub fnid: String,
    #[serde(rename = "COUNTRY")]
    #[tabled(skip)]
    pub country: String,
    #[serde(rename = "ADMIN0")]
    #[tabled(skip)]
    pub admin0: String,
    #[serde(rename = "ADMIN1")]
    #[tabled(rename = "ADMIN1")]
    pub admin1: String,
    #[serde(rename = "ADMIN2")]
    #[tabled(rename = "ADMIN2")]
    pub admin2: String,
    #[serde(rename = "ADMIN3")]
    #[tabled(skip)]
    pub admin3: String,
    #[serde(rename = "ADMIN4")]
    #[tabled(skip)]
    pub admin4: String,
    #[serde(rename = "LZCODE")]
    #[tabled(rename = "LZCODE")]
    pub lzcode: String,
    #[serde(rename = "LZNAME")]
    #[tabled(skip)]
    pub lzname: String,
    #[serde(rename = "IPC_avg")]
    #[tabled(rename = "IPC_avg")]
    pub ipc_avg: String,
    #[serde(rename = "IPC_3plus")]
    #[tabled(rename = "IPC_3plus")]
    pub ipc_3plus: String,
    #[serde(rename = "IPC_2plus")]
    #[tabled(rename = "IPC_2plus")]
    pub ipc_2plus: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct IpcAggregateRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Population")]
    #[tabled(rename = "Population")]
    pub population: String,
    #[serde(rename = "ipc_avg_weight")]
    #[tabled(rename = "Avg Phase")]
    pub ipc_avg: String,
    #[serde(rename = "ipc_3plus_weight")]
    #[tabled(rename = "% Cycles 3+")]
    pub ipc_3plus: String,
    #[serde(rename = "ipc_2plus_weight")]
    #[tabled(rename = "% Cycles 2+")]
    pub ipc_2plus: String,
}

/// Console preview of an estimate table; the full table is written with its
/// dynamic year columns by `output::write_table`.
#[derive(Debug, Tabled, Clone)]
pub struct EstimatePreviewRow {
    #[tabled(rename = "FNID")]
    pub fnid: String,
    #[tabled(rename = "ADMIN1")]
    pub admin1: String,
    #[tabled(rename = "ADMIN2")]
    pub admin2: String,
    #[tabled(rename = "Crop")]
    pub crop: String,
    #[tabled(rename = "Current")]
    pub current: String,
    #[tabled(rename = "Average")]
    pub average: String,
}

#[derive(Debug, Serialize)]
pub struct EstimateSummary {
    pub table: String,
    pub units: usize,
    pub crops: Vec<String>,
    pub first_year: i32,
    pub last_year: i32,
    pub rains_year: i32,
    pub missing_cells: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DonationRow {
    #[serde(rename = "Contribution ID")]
    #[tabled(rename = "Contribution ID")]
    pub contribution_id: String,
    #[serde(rename = "Date Received")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "Amount")]
    #[tabled(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "Source Code")]
    #[tabled(skip)]
    pub source_code: String,
    #[serde(rename = "Source Code Path")]
    #[tabled(skip)]
    pub source_code_path: String,
    #[serde(rename = "Payment Method")]
    #[tabled(rename = "Payment Method")]
    pub payment_method: String,
    #[serde(rename = "type")]
    #[tabled(rename = "Type")]
    pub kind: String,
    #[serde(rename = "year")]
    #[tabled(skip)]
    pub year: i32,
    #[serde(rename = "month")]
    #[tabled(skip)]
    pub month: u32,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DonationSummaryRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(skip)]
    pub year: i32,
    #[tabled(skip)]
    pub month: u32,
    #[serde(rename = "type")]
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Sum")]
    pub sum: String,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Mean")]
    pub mean: String,
}

/// Long-format preview of a problem-specification table.
#[derive(Debug, Tabled, Clone)]
pub struct SpecPreviewRow {
    #[tabled(rename = "Period")]
    pub period: String,
    #[tabled(rename = "Product")]
    pub product: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "% of Reference")]
    pub problem_spec: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct ShockPreviewRow {
    #[tabled(rename = "LZCODE")]
    pub lzcode: String,
    #[tabled(rename = "HLPS")]
    pub hlps: String,
    #[tabled(rename = "Shocks 3+")]
    pub count_3plus: usize,
    #[tabled(rename = "Shocks 2+")]
    pub count_2plus: usize,
}
