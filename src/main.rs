use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caseledger::api::{self, Store};
use caseledger::config::{
    config_dir, load_clients, load_config, load_document, save_document, CLIENTS_TEMPLATE,
    CONFIG_TEMPLATE,
};
use caseledger::error::{LedgerError, Result};
use caseledger::export::export;
use caseledger::ledger::aggregate::{client_revenue, month_summary, yearly_summary};
use caseledger::ledger::layout::{create_month, create_year, recreate, refresh, setup};
use caseledger::ledger::migrate::{header_matches, migrate};
use caseledger::ledger::{register, yearly_name, CaseRequest, Document, MonthKey, Totals};
use caseledger::rates::{HttpRateSource, RateSource};
use caseledger::sheet::Status;
use caseledger::{ClientRegistry, Config, RecordStoreClient};

#[derive(Parser)]
#[command(name = "caseledger")]
#[command(version, about = "Case and revenue ledger", long_about = None)]
struct Cli {
    /// Path to config directory (default: XDG config dir or ~/.caseledger)
    #[arg(short = 'C', long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory with template files
    Init,

    /// Build the yearly sheet and the first month's sheets
    Setup {
        /// Fiscal year used in the yearly sheet name (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// First month of the fiscal year (default: ledger.start_month)
        #[arg(long)]
        start_month: Option<u32>,

        /// Replace sheets that already exist
        #[arg(long)]
        force: bool,
    },

    /// Create the monthly and end-of-month sheets for a month
    NewMonth {
        /// Month number, e.g. 11 or 11月
        month: String,
    },

    /// Create a yearly summary sheet
    NewYear {
        year: i32,

        /// First month of the fiscal year (default: ledger.start_month)
        #[arg(long)]
        start_month: Option<u32>,
    },

    /// Clear and rebuild one sheet (its rows are lost)
    Recreate {
        /// Sheet name, e.g. 11月 or 2026年度
        sheet: String,
    },

    /// Re-apply headers, rules and formulas, keeping data
    Refresh,

    /// Bring legacy sheets to the current layout
    Migrate,

    /// Register a case
    Register {
        /// 月別シート or 月末請求シート
        #[arg(long, default_value = "月別シート")]
        sheet_type: String,

        #[arg(short, long)]
        month: String,

        /// Client name from clients.toml
        #[arg(short, long)]
        client: String,

        #[arg(short, long)]
        revenue: String,

        #[arg(short, long)]
        status: String,

        #[arg(short, long)]
        notes: String,

        #[arg(long)]
        industry: Option<String>,

        #[arg(long)]
        expense: Option<String>,

        #[arg(long)]
        expense_usd: Option<String>,

        /// Order date (YYYY-MM-DD, default: registration date)
        #[arg(long)]
        order_date: Option<String>,

        /// Delivery date (YYYY-MM-DD)
        #[arg(long)]
        delivery_date: Option<String>,

        /// Registration date (YYYY-MM-DD, default: today)
        #[arg(long)]
        registration_date: Option<String>,

        /// Submit through a running API server instead of the local ledger
        #[arg(long, value_name = "URL")]
        remote: Option<String>,
    },

    /// List registered clients
    Clients,

    /// List case statuses
    Statuses,

    /// List monthly sheets
    Months,

    /// Show a month's totals, or a yearly sheet with --year
    Summary {
        /// Month number, e.g. 11 or 11月
        #[arg(required_unless_present = "year", conflicts_with = "year")]
        month: Option<String>,

        /// Yearly sheet name or fiscal year, e.g. 2026年度 or 2026
        #[arg(long)]
        year: Option<String>,
    },

    /// Show the USD/JPY rate used for totals
    Rate,

    /// Show recent audit log entries
    Log {
        /// Maximum number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Write the ledger to an .xlsx workbook
    Export { path: PathBuf },

    /// Serve the Record Store API
    Serve {
        /// Address to listen on (default: server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let cfg_dir = match cli.config_dir {
        Some(p) => p,
        None => config_dir()?,
    };

    match cli.command {
        Commands::Init => cmd_init(&cfg_dir),
        Commands::Setup {
            year,
            start_month,
            force,
        } => cmd_setup(&cfg_dir, year, start_month, force),
        Commands::NewMonth { month } => cmd_new_month(&cfg_dir, &month),
        Commands::NewYear { year, start_month } => cmd_new_year(&cfg_dir, year, start_month),
        Commands::Recreate { sheet } => cmd_recreate(&cfg_dir, &sheet),
        Commands::Refresh => cmd_refresh(&cfg_dir),
        Commands::Migrate => cmd_migrate(&cfg_dir),
        Commands::Register {
            sheet_type,
            month,
            client,
            revenue,
            status,
            notes,
            industry,
            expense,
            expense_usd,
            order_date,
            delivery_date,
            registration_date,
            remote,
        } => {
            let request = CaseRequest {
                sheet_type: Some(sheet_type),
                month: Some(month),
                registration_date,
                client_name: Some(client),
                industry,
                expense,
                expense_usd,
                revenue: Some(revenue),
                order_date,
                delivery_date,
                status: Some(status),
                notes: Some(notes),
            };
            cmd_register(&cfg_dir, &request, remote.as_deref())
        }
        Commands::Clients => cmd_clients(&cfg_dir),
        Commands::Statuses => cmd_statuses(),
        Commands::Months => cmd_months(&cfg_dir),
        Commands::Summary { month, year } => cmd_summary(&cfg_dir, month, year),
        Commands::Rate => cmd_rate(&cfg_dir),
        Commands::Log { limit } => cmd_log(&cfg_dir, limit),
        Commands::Export { path } => cmd_export(&cfg_dir, &path),
        Commands::Serve { bind } => cmd_serve(&cfg_dir, bind),
    }
}

/// Everything a command needs from the config directory.
struct Ledger {
    config: Config,
    clients: ClientRegistry,
    doc: Document,
}

fn open(cfg_dir: &Path) -> Result<Ledger> {
    if !cfg_dir.exists() {
        return Err(LedgerError::ConfigNotFound(cfg_dir.to_path_buf()));
    }
    let config = load_config(cfg_dir)?;
    let clients = load_clients(cfg_dir)?;
    let doc = load_document(cfg_dir, config.audit.max_entries)?;
    Ok(Ledger {
        config,
        clients,
        doc,
    })
}

fn parse_month(raw: &str) -> Result<MonthKey> {
    MonthKey::parse(raw)
        .ok_or_else(|| LedgerError::validation("month", format!("'{raw}' is not a month (1-12)")))
}

/// Log a failed step under `operation` and save before handing it back.
fn audited<T>(cfg_dir: &Path, doc: &mut Document, operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        doc.audit.error(operation, e.to_string());
        save_document(cfg_dir, doc)?;
    }
    result
}

fn start_month(config: &Config, override_month: Option<u32>) -> Result<MonthKey> {
    let month = override_month.unwrap_or(config.ledger.start_month);
    MonthKey::new(month).ok_or_else(|| {
        LedgerError::validation("start_month", format!("{month} is not a month (1-12)"))
    })
}

/// Initialize config directory with template files
fn cmd_init(cfg_dir: &Path) -> Result<()> {
    use std::fs;

    if cfg_dir.exists() {
        return Err(LedgerError::AlreadyInitialized(cfg_dir.to_path_buf()));
    }

    fs::create_dir_all(cfg_dir)?;
    fs::write(cfg_dir.join("config.toml"), CONFIG_TEMPLATE)?;
    fs::write(cfg_dir.join("clients.toml"), CLIENTS_TEMPLATE)?;

    println!("Initialized caseledger config at: {}", cfg_dir.display());
    println!();
    println!("Next steps:");
    println!(
        "  1. Set the fiscal year start:  $EDITOR {}/config.toml",
        cfg_dir.display()
    );
    println!(
        "  2. Add your clients:           $EDITOR {}/clients.toml",
        cfg_dir.display()
    );
    println!();
    println!("Then build the first sheets:");
    println!("  caseledger setup");

    Ok(())
}

fn cmd_setup(cfg_dir: &Path, year: Option<i32>, month: Option<u32>, force: bool) -> Result<()> {
    let Ledger {
        config,
        clients,
        mut doc,
    } = open(cfg_dir)?;
    let start = start_month(&config, month)?;
    let year = year.unwrap_or_else(|| Local::now().year());

    if !force {
        let names = [yearly_name(year), start.sheet_name(), start.end_of_month_name()];
        if let Some(existing) = names.into_iter().find(|n| doc.contains(n)) {
            return Err(LedgerError::SheetExists(existing));
        }
    }

    let built = setup(&mut doc, year, start, &clients);
    save_document(cfg_dir, &doc)?;

    for name in built {
        println!("Built sheet: {name}");
    }
    Ok(())
}

fn cmd_new_month(cfg_dir: &Path, month: &str) -> Result<()> {
    let Ledger {
        clients, mut doc, ..
    } = open(cfg_dir)?;
    let month = audited(cfg_dir, &mut doc, "create_month", parse_month(month))?;

    let result = create_month(&mut doc, month, &clients);
    save_document(cfg_dir, &doc)?;
    result?;

    println!(
        "Created sheets: {}, {}",
        month.sheet_name(),
        month.end_of_month_name()
    );
    Ok(())
}

fn cmd_new_year(cfg_dir: &Path, year: i32, month: Option<u32>) -> Result<()> {
    let Ledger {
        config, mut doc, ..
    } = open(cfg_dir)?;
    let start = start_month(&config, month)?;

    let result = create_year(&mut doc, year, start);
    save_document(cfg_dir, &doc)?;
    let name = result?;

    println!("Created sheet: {name} (starting {start})");
    Ok(())
}

fn cmd_recreate(cfg_dir: &Path, sheet: &str) -> Result<()> {
    let Ledger {
        config,
        clients,
        mut doc,
    } = open(cfg_dir)?;
    let start = start_month(&config, None)?;

    let result = recreate(&mut doc, sheet, &clients, start);
    save_document(cfg_dir, &doc)?;
    result?;

    println!("Recreated sheet: {sheet}");
    Ok(())
}

fn cmd_refresh(cfg_dir: &Path) -> Result<()> {
    let Ledger {
        clients, mut doc, ..
    } = open(cfg_dir)?;

    let refreshed = refresh(&mut doc, &clients);
    save_document(cfg_dir, &doc)?;

    println!("Refreshed {refreshed} of {} sheet(s)", doc.sheets.len());
    Ok(())
}

fn cmd_migrate(cfg_dir: &Path) -> Result<()> {
    let Ledger {
        clients, mut doc, ..
    } = open(cfg_dir)?;

    let report = migrate(&mut doc, &clients);
    save_document(cfg_dir, &doc)?;

    for name in &report.migrated {
        if header_matches(&doc, name) {
            println!("Migrated: {name}");
        } else {
            println!("Migrated: {name} (header row differs, run 'caseledger refresh')");
        }
    }
    for name in &report.failed {
        println!("Failed:   {name} (see 'caseledger log')");
    }
    println!(
        "{} migrated, {} already current, {} failed",
        report.migrated.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

fn cmd_register(cfg_dir: &Path, request: &CaseRequest, remote: Option<&str>) -> Result<()> {
    if let Some(url) = remote {
        let client = RecordStoreClient::new(url, Duration::from_secs(30));
        let row = client.register(request)?;
        println!("{} (row {row})", api::SUCCESS_MESSAGE);
        return Ok(());
    }

    let Ledger {
        clients, mut doc, ..
    } = open(cfg_dir)?;

    let result = register(&mut doc, request, &clients, Local::now().date_naive());
    save_document(cfg_dir, &doc)?;
    let registration = result?;

    println!(
        "{} ({} row {}, item {})",
        api::SUCCESS_MESSAGE,
        registration.sheet,
        registration.row,
        registration.item_number
    );
    Ok(())
}

#[derive(Tabled)]
struct ClientRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "NOTE")]
    note: String,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "")]
    item: &'static str,
    #[tabled(rename = "当月")]
    own: String,
    #[tabled(rename = "月末請求分")]
    end_of_month: String,
    #[tabled(rename = "合計")]
    combined: String,
}

#[derive(Tabled)]
struct YearlyTableRow {
    #[tabled(rename = "対象月")]
    month: String,
    #[tabled(rename = "経費")]
    expense: String,
    #[tabled(rename = "売上")]
    revenue: String,
    #[tabled(rename = "利益")]
    profit: String,
}

#[derive(Tabled)]
struct ClientRevenueRow {
    #[tabled(rename = "SHEET")]
    sheet: String,
    #[tabled(rename = "CLIENT")]
    client: String,
    #[tabled(rename = "売上")]
    revenue: String,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "LEVEL")]
    severity: String,
    #[tabled(rename = "OPERATION")]
    operation: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

fn format_yen(value: f64) -> String {
    let rounded = value.round() as i64;
    let negative = rounded < 0;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let grouped: String = out.chars().rev().collect();
    if negative {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

/// List registered clients
fn cmd_clients(cfg_dir: &Path) -> Result<()> {
    if !cfg_dir.exists() {
        return Err(LedgerError::ConfigNotFound(cfg_dir.to_path_buf()));
    }

    let clients = load_clients(cfg_dir)?;
    if clients.is_empty() {
        println!("No clients configured.");
        println!("Add clients to: {}/clients.toml", cfg_dir.display());
        return Ok(());
    }

    let rows: Vec<ClientRow> = clients
        .clients
        .iter()
        .filter(|c| !c.name.trim().is_empty())
        .enumerate()
        .map(|(idx, client)| ClientRow {
            index: idx + 1,
            name: client.name.trim().to_string(),
            kind: client.kind.clone().unwrap_or_default(),
            note: client.note.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");

    Ok(())
}

fn cmd_statuses() -> Result<()> {
    for status in Status::ALL {
        println!("{}", status.label());
    }
    Ok(())
}

fn cmd_months(cfg_dir: &Path) -> Result<()> {
    let Ledger { doc, .. } = open(cfg_dir)?;
    let months = doc.monthly_names();
    if months.is_empty() {
        println!("No monthly sheets yet. Run 'caseledger setup' or 'caseledger new-month'.");
        return Ok(());
    }
    for month in months {
        println!("{month}");
    }
    Ok(())
}

fn rate_source(config: &Config) -> HttpRateSource {
    HttpRateSource::from_settings(&config.exchange_rate)
}

fn note_fallback(doc: &mut Document, reason: Option<&str>) {
    if let Some(reason) = reason {
        doc.audit
            .warning("getExchangeRate", format!("Using default rate: {reason}"));
    }
}

fn summary_rows(own: &Totals, end_of_month: &Totals, combined: &Totals) -> Vec<SummaryRow> {
    [
        ("経費", own.expense, end_of_month.expense, combined.expense),
        ("売上", own.revenue, end_of_month.revenue, combined.revenue),
        ("利益", own.profit, end_of_month.profit, combined.profit),
    ]
    .into_iter()
    .map(|(item, own, eom, total)| SummaryRow {
        item,
        own: format_yen(own),
        end_of_month: format_yen(eom),
        combined: format_yen(total),
    })
    .collect()
}

fn cmd_summary(cfg_dir: &Path, month: Option<String>, year: Option<String>) -> Result<()> {
    let Ledger {
        config, mut doc, ..
    } = open(cfg_dir)?;
    let rates = rate_source(&config);

    if let Some(year) = year {
        let name = match year.trim().parse::<i32>() {
            Ok(number) => yearly_name(number),
            Err(_) => year.trim().to_string(),
        };
        let summary = yearly_summary(&doc, &name, &rates);
        let summary = audited(cfg_dir, &mut doc, "summary", summary)?;
        let mut rows: Vec<YearlyTableRow> = summary
            .rows
            .iter()
            .map(|row| YearlyTableRow {
                month: if row.present {
                    row.month.clone()
                } else {
                    format!("{} (no sheet)", row.month)
                },
                expense: format_yen(row.totals.expense),
                revenue: format_yen(row.totals.revenue),
                profit: format_yen(row.totals.profit),
            })
            .collect();
        rows.push(YearlyTableRow {
            month: "合計".to_string(),
            expense: format_yen(summary.total.expense),
            revenue: format_yen(summary.total.revenue),
            profit: format_yen(summary.total.profit),
        });

        println!("{}", summary.sheet);
        println!("{}", Table::new(rows).with(Style::rounded()));
        if let Some(rate) = summary.rate {
            println!("USD/JPY: {rate:.2}");
        }
        note_fallback(&mut doc, summary.rate_fallback.as_deref());
        save_document(cfg_dir, &doc)?;
        return Ok(());
    }

    let month = parse_month(month.as_deref().unwrap_or_default());
    let month = audited(cfg_dir, &mut doc, "summary", month)?;
    let summary = month_summary(&doc, month, &rates);
    let summary = audited(cfg_dir, &mut doc, "summary", summary)?;
    let table = Table::new(summary_rows(
        &summary.own,
        &summary.end_of_month,
        &summary.combined,
    ))
    .with(Style::rounded())
    .to_string();

    println!("{}", summary.month);
    println!("{table}");
    if !summary.end_of_month_present {
        println!("No {} sheet; end-of-month totals count as 0.", month.end_of_month_name());
    }
    if let Some(rate) = summary.rate {
        println!(
            "USD/JPY: {rate:.2} (USD expenses: {})",
            format_yen(summary.converted_usd)
        );
    }

    let mut by_client = Vec::new();
    for sheet in [month.sheet_name(), month.end_of_month_name()] {
        if !doc.contains(&sheet) {
            continue;
        }
        for (client, revenue) in client_revenue(&doc, &sheet)? {
            by_client.push(ClientRevenueRow {
                sheet: sheet.clone(),
                client,
                revenue: format_yen(revenue),
            });
        }
    }
    if !by_client.is_empty() {
        println!("{}", Table::new(by_client).with(Style::rounded()));
    }
    note_fallback(&mut doc, summary.rate_fallback.as_deref());
    save_document(cfg_dir, &doc)?;
    Ok(())
}

fn cmd_rate(cfg_dir: &Path) -> Result<()> {
    if !cfg_dir.exists() {
        return Err(LedgerError::ConfigNotFound(cfg_dir.to_path_buf()));
    }
    let config = load_config(cfg_dir)?;
    let quote = rate_source(&config).quote();

    println!("USD/JPY: {:.2}", quote.rate);
    if let Some(reason) = quote.fallback {
        println!("(default rate; lookup failed: {reason})");
    }
    Ok(())
}

fn cmd_log(cfg_dir: &Path, limit: usize) -> Result<()> {
    let Ledger { doc, .. } = open(cfg_dir)?;
    if doc.audit.is_empty() {
        println!("No log entries yet.");
        return Ok(());
    }

    let rows: Vec<LogRow> = doc
        .audit
        .latest(limit)
        .into_iter()
        .map(|entry| LogRow {
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            severity: entry.severity.to_string(),
            operation: entry.operation.clone(),
            message: entry.message.clone(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

fn cmd_export(cfg_dir: &Path, path: &Path) -> Result<()> {
    let Ledger {
        config,
        clients,
        mut doc,
    } = open(cfg_dir)?;
    let quote = rate_source(&config).quote();
    note_fallback(&mut doc, quote.fallback.as_deref());

    export(&doc, &clients, path, quote.rate)?;
    save_document(cfg_dir, &doc)?;

    println!("Exported {} sheet(s) to {}", doc.sheets.len(), path.display());
    Ok(())
}

fn cmd_serve(cfg_dir: &Path, bind: Option<String>) -> Result<()> {
    let Ledger {
        config,
        clients,
        doc,
    } = open(cfg_dir)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let rates = Arc::new(rate_source(&config));
    let store = Store::new(doc, clients, rates)
        .persist_to(cfg_dir.to_path_buf())
        .shared();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(api::serve(store, &bind))
}
