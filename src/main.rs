// Entry point and high-level CLI flow.
//
// Every job can be run directly as a subcommand:
// - `reconcile` merges the CRM contribution report with the processor export.
// - `crop-estimates` turns WRSI tables into GDHI crop-production inputs.
// - `ipc` computes long-term IPC statistics and aggregates them.
// - `fetch-wrsi` downloads one dekadal WRSI archive.
// - `donations` classifies the contribution export and summarizes giving.
// - `prices` and `crop-specs` express staple prices and crop production as a
//   percent of a reference year.
// - `hlps` sets single-shock outcomes next to livelihood protection scores.
// Without a subcommand the same jobs are offered from an interactive menu.
mod config;
mod donations;
mod east_africa;
mod error;
mod estimate;
mod ethiopia;
mod fallback;
mod fetch;
mod gdhi;
mod hlps;
mod ipc;
mod loader;
mod output;
mod prices;
mod production;
mod reconcile;
mod region;
mod specs;
mod types;
mod util;
mod wrsi;

use chrono::Local;
use clap::{Parser, Subcommand};
use config::{ArchiveLayout, Config};
use once_cell::sync::Lazy;
use production::ProductionRecord;
use std::collections::BTreeMap;
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wrsi::{WrsiProduct, WrsiTable};

#[derive(Parser, Debug)]
#[command(name = "gdhi_tools", version, about = "Monthly food-security analysis jobs")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long, default_value = config::DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile CRM contributions against the payment processor export
    Reconcile,
    /// Estimate crop production from WRSI for Ethiopia and Kenya/Uganda/Somalia
    CropEstimates,
    /// Long-term IPC statistics and population-weighted aggregation
    Ipc,
    /// Download a dekadal WRSI archive
    FetchWrsi {
        /// Two-letter product code (ee, el, ek, e2, e1, et)
        #[arg(long)]
        product: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Dekad of the month (1-3)
        #[arg(long)]
        dekad: u32,
        /// Archive layout; defaults to `fetch.layout` from the config
        #[arg(long, value_enum)]
        layout: Option<ArchiveLayout>,
    },
    /// Classify contributions by type and summarize giving per month
    Donations,
    /// Staple price problem specifications per consumption year
    Prices,
    /// Crop production problem specifications for one area
    CropSpecs,
    /// Single-shock outcomes per livelihood zone next to HLPS
    Hlps,
}

// WRSI tables take a while to read; keep them between menu runs.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { wrsi: None }));

struct AppState {
    wrsi: Option<BTreeMap<WrsiProduct, WrsiTable>>,
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    read_value("Enter choice")
}

fn read_value(label: &str) -> String {
    print!("{}: ", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Job Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        let resp = buf.trim().to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

fn run_reconcile(config: &Config) -> Result<(), Box<dyn Error>> {
    let rc = &config.reconcile;
    output::ensure_dir(&config.run.output_dir)?;

    let (crm_raw, crm_load) = loader::load_crm(&rc.crm_report)?;
    let (proc_raw, proc_load) = loader::load_processor(&rc.processor_export)?;
    let codes = match &rc.source_codes {
        Some(path) => loader::load_source_codes(path)?,
        None => Vec::new(),
    };
    let (crm, crm_skipped) = reconcile::clean_crm(&crm_raw);
    let (processor, proc_skipped) = reconcile::clean_processor(&proc_raw, &codes);

    let options = reconcile::ReconcileOptions { cutoff: rc.cutoff, codes: rc.codes.clone() };
    let (rows, mut summary) = reconcile::reconcile(&crm, &processor, &options);
    summary.skipped_rows =
        crm_skipped + proc_skipped + crm_load.parse_errors + proc_load.parse_errors;

    println!(
        "Processing contributions... ({} CRM rows, {} processor rows)",
        util::format_int(crm_load.total_rows as u64),
        util::format_int(proc_load.total_rows as u64)
    );
    println!(
        "Note: {} rows skipped due to parse/validation errors.",
        util::format_int(summary.skipped_rows as u64)
    );
    println!(
        "Matched: {}, CRM only: {}, processor only: {}\n",
        util::format_int(summary.matched as u64),
        util::format_int(summary.crm_only as u64),
        util::format_int(summary.processor_only as u64)
    );

    let path = config.output_path(&rc.output);
    output::write_csv(&path, &rows)?;
    output::write_json(&config.output_path("reconcile_summary.json"), &summary)?;
    output::preview_table(
        "CRM / Processor Contribution Merge",
        Some(format!("Codes: {}", rc.codes.join(", ")).as_str()),
        &rows,
        5,
    );
    println!("(Full table exported to {})\n", path.display());
    Ok(())
}

fn load_records(path: Option<&Path>) -> Result<Vec<ProductionRecord>, Box<dyn Error>> {
    let Some(path) = path else { return Ok(Vec::new()) };
    if !path.exists() {
        warn!(file = %path.display(), "production file not found; estimates use WRSI only");
        return Ok(Vec::new());
    }
    let (rows, load) = loader::load_production(path)?;
    let (records, report) = production::parse_records(&rows);
    info!(
        file = %path.display(),
        rows = load.total_rows,
        kept = report.kept_rows,
        not_collected = report.not_collected,
        unknown_product = report.unknown_product,
        invalid = report.invalid_rows + load.parse_errors,
        "production data loaded"
    );
    Ok(records)
}

fn run_crop_estimates(config: &Config) -> Result<(), Box<dyn Error>> {
    let crops = &config.crops;
    output::ensure_dir(&config.run.output_dir)?;
    let years = crops.first_year..=config.last_year();
    let rains_year = fallback::rains_year(config.run.year, config.run.month);

    let et_records = load_records(crops.et_production.as_deref())?;
    let so_records = load_records(crops.so_production.as_deref())?;
    let ke_rows = match crops.ke_production.as_deref() {
        Some(path) if path.exists() => loader::load_production(path)?.0,
        _ => Vec::new(),
    };

    let mut state = APP_STATE.lock().map_err(|e| e.to_string())?;
    if state.wrsi.is_none() {
        state.wrsi = Some(loader::load_wrsi_dir(&crops.wrsi_dir)?);
    }
    let Some(wrsi) = state.wrsi.as_ref() else {
        return Ok(());
    };

    println!(
        "Estimating crop production {}-{} (rains year {})...\n",
        years.start(),
        years.end(),
        rains_year
    );
    let mut tables = ethiopia::run(wrsi, et_records, years.clone(), rains_year);
    tables.extend(east_africa::run(wrsi, so_records, &ke_rows, years, rains_year));

    let mut summaries = Vec::with_capacity(tables.len());
    for table in &tables {
        let path = config.output_path(&format!("{}_results.csv", table.name));
        output::write_table(&path, &table.header(), &table.records())?;
        output::preview_table(
            &format!("{} crop estimates", table.name),
            Some(format!("{} and long-run average", rains_year).as_str()),
            &table.preview(rains_year),
            6,
        );
        println!("(Full table exported to {})\n", path.display());
        summaries.push(table.summary(rains_year));
    }
    output::write_json(&config.output_path("crop_estimates_summary.json"), &summaries)?;
    println!("Summary Stats (crop_estimates_summary.json):");
    for s in &summaries {
        println!(
            "{{\"table\": \"{}\", \"units\": {}, \"missing_cells\": {}}}",
            s.table,
            util::format_int(s.units as u64),
            util::format_int(s.missing_cells as u64)
        );
    }
    println!();
    Ok(())
}

fn run_ipc(config: &Config) -> Result<(), Box<dyn Error>> {
    let ic = &config.ipc;
    output::ensure_dir(&config.run.output_dir)?;

    let phases = loader::load_phase_table(&ic.phases)?;
    let units = loader::load_mapping_units(&ic.units)?;
    let population = match (&ic.population, &ic.population_url, ic.level) {
        (_, _, None) => None,
        (Some(path), _, Some(_)) => Some(loader::load_population(path)?),
        (None, Some(url), Some(_)) => Some(fetch::fetch_population(url)?),
        (None, None, Some(_)) => {
            let today = Local::now().date_naive();
            let url = fetch::population_url(&config.fetch.api_url, &ic.country, today);
            Some(fetch::fetch_population(&url)?)
        }
    };

    let result = ipc::run(&phases, &units, population.as_deref(), ic.level);
    let unit_rows: Vec<_> = result.units.iter().map(ipc::unit_row).collect();
    let path = config.output_path(&ic.output);
    output::write_csv(&path, &unit_rows)?;
    output::preview_table(
        "Long-term IPC Statistics",
        Some(format!("{} outlook cycles", phases.cycles.len()).as_str()),
        &unit_rows,
        5,
    );
    println!("(Full table exported to {})\n", path.display());

    if let Some(level) = ic.level {
        let agg_rows: Vec<_> = result.aggregates.iter().map(ipc::aggregate_row).collect();
        let agg_path = config.output_path(&format!("{:?}_IPC_Aggregate.csv", level));
        output::write_csv(&agg_path, &agg_rows)?;
        output::preview_table(
            "Population-weighted IPC Aggregation",
            Some(format!("Grouped by {:?}", level).as_str()),
            &agg_rows,
            10,
        );
        println!("(Full table exported to {})\n", agg_path.display());
    }
    Ok(())
}

struct FetchRequest {
    product: String,
    year: i32,
    month: u32,
    dekad: u32,
    layout: Option<ArchiveLayout>,
}

fn run_fetch_wrsi(config: &Config, request: FetchRequest) -> Result<(), Box<dyn Error>> {
    let FetchRequest { product, year, month, dekad, layout } = request;
    let layout = layout.unwrap_or(config.fetch.layout);
    let product = WrsiProduct::from_code(&product)?;
    let name = fetch::wrsi_archive_name(layout, product, year, month, dekad)?;
    let url = fetch::wrsi_archive_url(&config.fetch, layout, product, year, month, dekad)?;
    output::ensure_dir(&config.run.output_dir)?;
    let dest = config.output_path(&name);
    println!("Downloading {} from {}", product.description(), url);
    let bytes = fetch::download(&url, &dest)?;
    println!("Saved {} bytes to {}\n", util::format_int(bytes), dest.display());
    Ok(())
}

fn load_source_groups(
    dc: &config::DonationConfig,
) -> Result<Vec<types::RawSourceGroupRow>, Box<dyn Error>> {
    match (&dc.source_groups, &dc.source_groups_url) {
        (Some(path), _) if path.exists() => loader::load_source_groups(path),
        (_, Some(url)) => loader::parse_source_groups(&fetch::fetch_text(url)?),
        _ => {
            warn!("no source code groups; unmatched contributions are typed as unknown");
            Ok(Vec::new())
        }
    }
}

fn run_donations(config: &Config) -> Result<(), Box<dyn Error>> {
    let dc = &config.donations;
    output::ensure_dir(&config.run.output_dir)?;

    let (raw, load) = loader::load_donations(&dc.export)?;
    let groups = donations::group_lookup(&load_source_groups(dc)?);
    let (gifts, skipped) = donations::clean_donations(&raw, &groups, &dc.overrides, dc.end_date);
    println!(
        "Classifying contributions... ({} rows, {} kept)",
        util::format_int(load.total_rows as u64),
        util::format_int(gifts.len() as u64)
    );
    println!(
        "Note: {} rows skipped due to parse/validation errors.\n",
        util::format_int((skipped + load.parse_errors) as u64)
    );

    let rows: Vec<_> = gifts.iter().map(donations::donation_row).collect();
    let path = config.output_path("ngp_data_class.csv");
    output::write_csv(&path, &rows)?;
    output::preview_table("Classified Contributions", None, &rows, 5);
    println!("(Full table exported to {})\n", path.display());

    let summary = donations::monthly_summary(&gifts);
    let summary_rows: Vec<_> = summary.iter().map(donations::summary_row).collect();
    let path = config.output_path("donation_summary.csv");
    output::write_csv(&path, &summary_rows)?;
    output::preview_table("Monthly Giving by Type", None, &summary_rows, 8);
    println!("(Full table exported to {})\n", path.display());

    let pivot = donations::MonthlyPivot::new(&summary);
    let path = config.output_path("donation_monthly.csv");
    output::write_table(&path, &pivot.header(), &pivot.records())?;
    println!("(Monthly type table exported to {})", path.display());
    let (header, records) = pivot.year_comparison(&dc.compare_years);
    let path = config.output_path("election_comparison.csv");
    output::write_table(&path, &header, &records)?;
    println!("(Cash on hand by month exported to {})\n", path.display());
    Ok(())
}

fn run_prices(config: &Config) -> Result<(), Box<dyn Error>> {
    let pc = &config.prices;
    output::ensure_dir(&config.run.output_dir)?;

    let json = match &pc.file {
        Some(path) => loader::read_text(path)?,
        None => fetch::fetch_text(&fetch::price_facts_url(&config.fetch.api_url, &pc.dataset))?,
    };
    let facts = loader::parse_price_facts(&json)?;
    let (points, skipped) = prices::clean_prices(&facts, pc);
    println!(
        "Averaging prices... ({} facts, {} in the window, {} unusable)\n",
        util::format_int(facts.len() as u64),
        util::format_int(points.len() as u64),
        util::format_int(skipped as u64)
    );

    let table = prices::price_table(&points, pc.consumption_start);
    let path = config.output_path(&pc.output());
    output::write_table(&path, &table.header(), &table.records(&pc.baseline))?;
    let currency = facts.iter().find_map(|f| f.currency.clone()).unwrap_or_default();
    output::preview_table(
        &format!("{} Price Problem Specs", pc.price_type),
        Some(format!("Reference {}, prices in {}", pc.baseline, currency).as_str()),
        &table.preview(&pc.baseline),
        8,
    );
    println!("(Full table exported to {})\n", path.display());
    Ok(())
}

fn run_crop_specs(config: &Config) -> Result<(), Box<dyn Error>> {
    let cc = &config.crop_specs;
    output::ensure_dir(&config.run.output_dir)?;

    let json = match &cc.file {
        Some(path) => loader::read_text(path)?,
        None => {
            let url = fetch::crop_facts_url(&config.fetch.api_url, &cc.country, &cc.cpcv2);
            fetch::fetch_text(&url)?
        }
    };
    let facts = loader::parse_crop_facts(&json)?;
    let table = specs::crop_production(&facts, cc.area_level, &cc.area, cc.first_year);
    let baseline = cc.baseline_year.to_string();
    println!(
        "Summing production for {}... ({} facts, {} products)\n",
        cc.area,
        util::format_int(facts.len() as u64),
        table.products().len()
    );

    let path = config.output_path(&cc.output());
    output::write_table(&path, &table.header(), &table.records(&baseline))?;
    output::preview_table(
        &format!("{} Production Problem Specs", cc.area),
        Some(format!("Reference year {}", baseline).as_str()),
        &table.preview(&baseline),
        8,
    );
    println!("(Full table exported to {})\n", path.display());
    Ok(())
}

fn run_hlps(config: &Config) -> Result<(), Box<dyn Error>> {
    let hc = &config.hlps;
    output::ensure_dir(&config.run.output_dir)?;

    let scores = loader::load_hlps(&hc.hlps_file)?;
    let tables = loader::load_shock_dir(&hc.results_dir)?;
    let summary = hlps::summarize(&scores, &hc.country, &tables);
    println!(
        "Joining {} shocks onto {} livelihood zones...\n",
        summary.shocks.len(),
        util::format_int(summary.zones.len() as u64)
    );

    let path = config.output_path(&hc.output);
    output::write_table(&path, &summary.header(), &summary.records())?;
    output::preview_table(
        "Single-shock Outcomes by Livelihood Zone",
        Some(format!("Shocks: {}", summary.shocks.join(", ")).as_str()),
        &summary.preview(),
        10,
    );
    println!("(Full table exported to {})\n", path.display());
    Ok(())
}

fn run_command(config: &Config, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Reconcile => run_reconcile(config),
        Command::CropEstimates => run_crop_estimates(config),
        Command::Ipc => run_ipc(config),
        Command::FetchWrsi { product, year, month, dekad, layout } => {
            run_fetch_wrsi(config, FetchRequest { product, year, month, dekad, layout })
        }
        Command::Donations => run_donations(config),
        Command::Prices => run_prices(config),
        Command::CropSpecs => run_crop_specs(config),
        Command::Hlps => run_hlps(config),
    }
}

// ---------------------------------------------------------------------------
// Interactive menu
// ---------------------------------------------------------------------------

/// Ask for the archive to download, defaulting the date to the run month.
fn prompt_fetch(config: &Config) -> Option<Command> {
    let product = read_value("Product code (ee, el, ek, e2, e1, et)");
    let year = read_value(&format!("Year [{}]", config.run.year));
    let month = read_value(&format!("Month [{}]", config.run.month));
    let dekad = read_value("Dekad (1-3)");
    let year = if year.is_empty() { Some(config.run.year) } else { year.parse().ok() };
    let month = if month.is_empty() { Some(config.run.month) } else { month.parse().ok() };
    match (year, month, dekad.parse().ok()) {
        (Some(year), Some(month), Some(dekad)) => {
            Some(Command::FetchWrsi { product, year, month, dekad, layout: None })
        }
        _ => {
            println!("Invalid year, month or dekad.\n");
            None
        }
    }
}

fn menu(config: &Config) {
    loop {
        println!("Select Job:");
        println!("[1] Reconcile contributions");
        println!("[2] Crop production estimates");
        println!("[3] IPC analysis");
        println!("[4] Download WRSI archive");
        println!("[5] Donation summaries");
        println!("[6] Staple price problem specs");
        println!("[7] Crop production problem specs");
        println!("[8] Livelihood zone shock outcomes\n");
        let command = match read_choice().as_str() {
            "1" => Command::Reconcile,
            "2" => Command::CropEstimates,
            "3" => Command::Ipc,
            "4" => match prompt_fetch(config) {
                Some(c) => c,
                None => continue,
            },
            "5" => Command::Donations,
            "6" => Command::Prices,
            "7" => Command::CropSpecs,
            "8" => Command::Hlps,
            _ => {
                println!("Invalid choice. Please enter a number from 1 to 8.\n");
                continue;
            }
        };
        println!();
        if let Err(e) = run_command(config, command) {
            eprintln!("Job failed: {}\n", e);
        }
        if !prompt_back_to_menu() {
            println!("Exiting the program.");
            break;
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(year = config.run.year, month = config.run.month, "configuration loaded");

    match cli.command {
        Some(command) => match run_command(&config, command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        None => {
            menu(&config);
            ExitCode::SUCCESS
        }
    }
}
