// HTTP downloads: WRSI archives from the USGS dekadal server and population
// figures from the data-warehouse API.
use crate::config::{ArchiveLayout, FetchConfig};
use crate::error::GdhiError;
use crate::loader::parse_population;
use crate::types::PopulationRecord;
use crate::wrsi::WrsiProduct;
use chrono::NaiveDate;
use reqwest::StatusCode;
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::info;

/// Dekad of the month (1-3) on the annual 1-36 scale used in file names.
pub fn annual_dekad(month: u32, dekad: u32) -> Result<u32, GdhiError> {
    if !(1..=12).contains(&month) || !(1..=3).contains(&dekad) {
        return Err(GdhiError::InvalidConfig(format!(
            "month {} / dekad {} out of range",
            month, dekad
        )));
    }
    Ok((month - 1) * 3 + dekad)
}

/// Archive file name for one dekad. For the last dekad of February 2021,
/// maize short rains:
///
/// - legacy: `w2106et.zip`
/// - CHIRPS: `w202106et.zip`
pub fn wrsi_archive_name(
    layout: ArchiveLayout,
    product: WrsiProduct,
    year: i32,
    month: u32,
    dekad: u32,
) -> Result<String, GdhiError> {
    let dd = annual_dekad(month, dekad)?;
    let name = match layout {
        ArchiveLayout::Legacy => {
            format!("w{:02}{:02}{}.zip", year.rem_euclid(100), dd, product.code())
        }
        ArchiveLayout::Chirps => format!("w{}{:02}{}.zip", year, dd, product.code()),
    };
    Ok(name)
}

/// Archive path relative to the layout's root. CHIRPS archives sit in one
/// folder per product, named `east` plus the code's second letter.
pub fn wrsi_archive_path(
    layout: ArchiveLayout,
    product: WrsiProduct,
    year: i32,
    month: u32,
    dekad: u32,
) -> Result<String, GdhiError> {
    let name = wrsi_archive_name(layout, product, year, month, dekad)?;
    Ok(match layout {
        ArchiveLayout::Legacy => name,
        ArchiveLayout::Chirps => format!("east{}/{}", &product.code()[1..], name),
    })
}

pub fn wrsi_archive_url(
    config: &FetchConfig,
    layout: ArchiveLayout,
    product: WrsiProduct,
    year: i32,
    month: u32,
    dekad: u32,
) -> Result<String, GdhiError> {
    let path = wrsi_archive_path(layout, product, year, month, dekad)?;
    Ok(format!("{}/{}", config.archive_root(layout).trim_end_matches('/'), path))
}

pub fn population_url(api_url: &str, country: &str, as_of: NaiveDate) -> String {
    format!(
        "{}/geographicunit/?country={}&unit_type=fsc_admin_lhz&as_of_date={}\
         &format=json&fields=with_population",
        api_url.trim_end_matches('/'),
        country,
        as_of.format("%Y-%m-%d")
    )
}

/// Market price facts for one dataset.
pub fn price_facts_url(api_url: &str, dataset: &str) -> String {
    let root = api_url.trim_end_matches('/');
    format!("{}/marketpricefacts/?format=json&dataset={}", root, dataset)
}

/// Crop production quantities for the given CPC v2 products.
pub fn crop_facts_url(api_url: &str, country: &str, cpcv2: &[String]) -> String {
    let products: String = cpcv2.iter().map(|c| format!("&cpcv2={}", c)).collect();
    format!(
        "{}/cropproductionfacts/?format=json&country_code={}{}\
         &indicator=crop:quantity&fields=simple",
        api_url.trim_end_matches('/'),
        country,
        products
    )
}

fn get(url: &str) -> Result<reqwest::blocking::Response, Box<dyn Error>> {
    let response = reqwest::blocking::get(url)?;
    info!(url, status = response.status().as_u16(), "download");
    match response.status() {
        StatusCode::NOT_FOUND => Err(GdhiError::NotFound(url.to_string()).into()),
        s if !s.is_success() => {
            Err(GdhiError::HttpStatus { url: url.to_string(), status: s.as_u16() }.into())
        }
        _ => Ok(response),
    }
}

/// Download `url` to `dest`. A 404 means the dekad has not been published.
pub fn download(url: &str, dest: &Path) -> Result<u64, Box<dyn Error>> {
    let bytes = get(url)?.bytes()?;
    fs::write(dest, &bytes)?;
    Ok(bytes.len() as u64)
}

/// Body of a GET as text: API JSON or a published CSV.
pub fn fetch_text(url: &str) -> Result<String, Box<dyn Error>> {
    Ok(get(url)?.text()?)
}

pub fn fetch_population(url: &str) -> Result<Vec<PopulationRecord>, Box<dyn Error>> {
    let body = get(url)?.text()?;
    parse_population(&body)
}
