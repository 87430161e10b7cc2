// Staple price problem specifications.
//
// Monthly market prices are averaged per consumption year (a twelve-month
// window starting at the first month of consumption) and expressed as a
// percent of the reference consumption year.
use crate::config::PriceConfig;
use crate::specs::{Reduce, SpecTable};
use crate::types::RawPriceFact;
use crate::util::parse_date_safe;
use chrono::{Datelike, NaiveDate};
use tracing::info;

/// `"2017-2018"` for any date from the start month of 2017 up to the month
/// before it in 2018.
pub fn consumption_year(date: NaiveDate, start_month: u32) -> String {
    let y = date.year();
    if date.month() < start_month {
        format!("{}-{}", y - 1, y)
    } else {
        format!("{}-{}", y, y + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub market: String,
    pub product: String,
    pub value: f64,
}

/// Keep dated, priced rows inside the analysis window whose month is one of
/// the configured months. Returns the kept points and the number of rows
/// without a usable date or value.
pub fn clean_prices(facts: &[RawPriceFact], config: &PriceConfig) -> (Vec<PricePoint>, usize) {
    let window = (
        NaiveDate::from_ymd_opt(config.first_year, config.consumption_start, 1),
        NaiveDate::from_ymd_opt(config.last_year, config.consumption_start, 1),
    );
    let mut skipped = 0;
    let mut out = Vec::new();
    for f in facts {
        let (Some(date), Some(value)) = (parse_date_safe(f.start_date.as_deref()), f.value)
        else {
            skipped += 1;
            continue;
        };
        let in_window = match window {
            (Some(from), Some(to)) => date >= from && date < to,
            _ => false,
        };
        if !in_window || !config.months.contains(&date.month()) {
            continue;
        }
        out.push(PricePoint {
            date,
            market: f.market.as_deref().unwrap_or("").trim().to_string(),
            product: f.product.as_deref().unwrap_or("Unknown").trim().to_string(),
            value,
        });
    }
    info!(kept = out.len(), skipped, "price rows cleaned");
    (out, skipped)
}

pub fn price_table(points: &[PricePoint], start_month: u32) -> SpecTable {
    let rows = points
        .iter()
        .map(|p| (consumption_year(p.date, start_month), p.product.clone(), p.value));
    SpecTable::build("consumption_year", rows, Reduce::Mean)
}
