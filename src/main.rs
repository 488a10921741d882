use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use growth_ledger_lib::format::{format_brl, format_percent, format_short_date};
use growth_ledger_lib::models::{
    AppSettings, FunnelDraft, LeadFunnelEntry, Origin, Product, RevenueEntry, RevenueTotals, RollupWindow,
};
use growth_ledger_lib::tracker::{LeadTracker, RevenueForm, RevenueTracker};
use growth_ledger_lib::{default_data_dir, init_tracing, AppState};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "growth-ledger", version, about = "Daily lead funnel and revenue ledger")]
struct Cli {
    /// Directory holding the ledger database and logs
    #[arg(long, global = true, env = "GROWTH_LEDGER_DATA_DIR", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily MQL / SQL / sales tracker
    #[command(subcommand)]
    Leads(LeadsCommand),
    /// Closed deals and their setup / MRR values
    #[command(subcommand)]
    Revenue(RevenueCommand),
    /// Stored application settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand)]
enum LeadsCommand {
    /// Full history, newest first
    List,
    /// Save (or replace) the counts for one day
    Save(LeadSaveArgs),
    /// Day / week / month rollups for a reference date
    Stats(LeadStatsArgs),
}

#[derive(Args)]
struct LeadSaveArgs {
    /// Day to record (YYYY-MM-DD, default today)
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, allow_negative_numbers = true)]
    mql: i64,
    #[arg(long, allow_negative_numbers = true)]
    sql: i64,
    #[arg(long, allow_negative_numbers = true)]
    sales: i64,
}

#[derive(Args)]
struct LeadStatsArgs {
    /// Reference date (YYYY-MM-DD, default today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Draft MQL for the reference date (defaults to the saved value)
    #[arg(long, allow_negative_numbers = true)]
    mql: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    sql: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    sales: Option<i64>,
}

#[derive(Subcommand)]
enum RevenueCommand {
    /// All deals, newest first, with totals
    List,
    /// Record a closed deal dated today
    Add(RevenueAddArgs),
    /// Setup and MRR totals
    Totals,
}

#[derive(Args)]
struct RevenueAddArgs {
    #[arg(long)]
    business: String,
    /// Setup value in BRL
    #[arg(long, allow_hyphen_values = true)]
    setup: String,
    /// Monthly recurring value in BRL
    #[arg(long, allow_hyphen_values = true)]
    mrr: String,
    #[arg(long, value_parser = parse_origin, default_value = "Google Ads")]
    origin: Origin,
    #[arg(long, value_parser = parse_product, default_value = "Autoforce Site")]
    product: Product,
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Merge a JSON object into the stored settings, e.g. '{"leadSaveLatencyMs": 500}'
    Set { patch: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    init_tracing(&data_dir).map_err(anyhow::Error::msg)?;

    let state = AppState::open(&data_dir)?;
    match cli.command {
        Commands::Leads(command) => run_leads(&state, command, cli.json).await,
        Commands::Revenue(command) => run_revenue(&state, command, cli.json).await,
        Commands::Settings(command) => run_settings(&state, command),
    }
}

async fn run_leads(state: &AppState, command: LeadsCommand, json: bool) -> Result<()> {
    let today = Utc::now().date_naive();
    match command {
        LeadsCommand::List => {
            let tracker = LeadTracker::open(state.store.clone(), today).await?;
            if json {
                return print_json(&tracker.history());
            }
            print_lead_history(tracker.history(), &state.settings);
        }
        LeadsCommand::Save(args) => {
            let mut tracker = LeadTracker::open(state.store.clone(), args.date.unwrap_or(today)).await?;
            tracker.set_draft(FunnelDraft {
                mql: args.mql,
                sql: args.sql,
                sales: args.sales,
            });
            let saved = tracker.save().await?;
            if json {
                return print_json(&saved);
            }
            println!(
                "Saved {}: MQL {} | SQL {} | sales {} | conversion {}",
                format_short_date(saved.date),
                saved.mql,
                saved.sql,
                saved.sales,
                format_percent(saved.conversion_rate)
            );
        }
        LeadsCommand::Stats(args) => {
            let mut tracker = LeadTracker::open(state.store.clone(), args.date.unwrap_or(today)).await?;
            let prefilled = tracker.draft();
            tracker.set_draft(FunnelDraft {
                mql: args.mql.unwrap_or(prefilled.mql),
                sql: args.sql.unwrap_or(prefilled.sql),
                sales: args.sales.unwrap_or(prefilled.sales),
            });
            print_lead_stats(&tracker, &state.settings, json)?;
        }
    }
    Ok(())
}

async fn run_revenue(state: &AppState, command: RevenueCommand, json: bool) -> Result<()> {
    let mut tracker = RevenueTracker::open(state.store.clone()).await?;
    match command {
        RevenueCommand::List => {
            if json {
                return print_json(&tracker.history());
            }
            print_revenue_history(tracker.history());
            print_revenue_totals(&tracker.totals());
        }
        RevenueCommand::Add(args) => {
            tracker.form = RevenueForm {
                business_name: args.business,
                setup_value: args.setup,
                mrr_value: args.mrr,
                origin: args.origin,
                product: args.product,
            };
            let Some(saved) = tracker.submit().await? else {
                bail!("business name, setup and MRR must all be filled in with numeric amounts");
            };
            if json {
                return print_json(&saved);
            }
            println!(
                "Added {} ({} / {}) on {}: setup {} | MRR {}",
                saved.business_name,
                saved.origin,
                saved.product,
                format_short_date(saved.date),
                format_brl(saved.setup_value),
                format_brl(saved.mrr_value)
            );
            print_revenue_totals(&tracker.totals());
        }
        RevenueCommand::Totals => {
            if json {
                return print_json(&tracker.totals());
            }
            print_revenue_totals(&tracker.totals());
        }
    }
    Ok(())
}

fn run_settings(state: &AppState, command: SettingsCommand) -> Result<()> {
    let settings = match command {
        SettingsCommand::Show => state.db.get_settings()?,
        SettingsCommand::Set { patch } => {
            let update: serde_json::Value = serde_json::from_str(&patch).context("settings patch must be JSON")?;
            state.db.update_settings(update)?
        }
    };
    print_json(&settings)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeadStatsView {
    reference_date: NaiveDate,
    draft: FunnelDraft,
    day: RollupWindow,
    week: RollupWindow,
    month: RollupWindow,
    sales_needed_for_target: i64,
}

fn print_lead_stats(tracker: &LeadTracker, settings: &AppSettings, json: bool) -> Result<()> {
    let rollups = tracker.rollups();
    let sales_needed = tracker.sales_needed_for_target(settings.conversion_target_pct);

    if json {
        return print_json(&LeadStatsView {
            reference_date: tracker.selected_date(),
            draft: tracker.draft(),
            day: rollups.day,
            week: rollups.week,
            month: rollups.month,
            sales_needed_for_target: sales_needed,
        });
    }

    println!("Ref: {}", format_short_date(tracker.selected_date()));
    println!("{:<8} {:>8} {:>8} {:>8} {:>12}", "", "MQL", "SQL", "Sales", "Conversion");
    for (label, window) in [("Day", rollups.day), ("Week", rollups.week), ("Month", rollups.month)] {
        let marker = if window.is_highlighted(settings.window_highlight_pct) { " *" } else { "" };
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>12}{}",
            label,
            window.mql,
            window.sql,
            window.sales,
            format_percent(window.conversion_rate),
            marker
        );
    }
    println!(
        "Monthly conversion is {}. Reaching the {} target needs {} more sales at the current lead volume.",
        format_percent(rollups.month.conversion_rate),
        format_percent(settings.conversion_target_pct),
        sales_needed
    );
    Ok(())
}

fn print_lead_history(history: &[LeadFunnelEntry], settings: &AppSettings) {
    println!("{:<10} {:>8} {:>8} {:>8} {:>12}", "Date", "MQL", "SQL", "Sales", "Conversion");
    for entry in history {
        let marker = if entry.is_highlighted(settings.history_highlight_pct) { " *" } else { "" };
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>12}{}",
            format_short_date(entry.date),
            entry.mql,
            entry.sql,
            entry.sales,
            format_percent(entry.conversion_rate),
            marker
        );
    }
}

fn print_revenue_history(history: &[RevenueEntry]) {
    println!(
        "{:<10} {:<28} {:<16} {:<16} {:>16} {:>14}",
        "Date", "Business", "Origin", "Product", "Setup", "MRR"
    );
    for entry in history {
        println!(
            "{:<10} {:<28} {:<16} {:<16} {:>16} {:>14}",
            format_short_date(entry.date),
            entry.business_name,
            entry.origin,
            entry.product,
            format_brl(entry.setup_value),
            format_brl(entry.mrr_value)
        );
    }
}

fn print_revenue_totals(totals: &RevenueTotals) {
    println!(
        "Total setup: {} | Total MRR: {}",
        format_brl(totals.total_setup),
        format_brl(totals.total_mrr)
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_origin(raw: &str) -> Result<Origin, String> {
    Origin::parse(raw).ok_or_else(|| {
        let known: Vec<_> = Origin::ALL.iter().map(|origin| origin.as_str()).collect();
        format!("unknown origin '{}' (expected one of: {})", raw, known.join(", "))
    })
}

fn parse_product(raw: &str) -> Result<Product, String> {
    Product::parse(raw).ok_or_else(|| {
        let known: Vec<_> = Product::ALL.iter().map(|product| product.as_str()).collect();
        format!("unknown product '{}' (expected one of: {})", raw, known.join(", "))
    })
}
