mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::forecast::ForecastArgs;
use commands::performance::{PerformanceArgs, TwrArgs, XirrArgs};
use commands::policy::PresetsArgs;
use commands::withholding::MonthArgs;

/// Payroll withholding forecasts and investment performance
#[derive(Parser)]
#[command(
    name = "fincalc",
    version,
    about = "Payroll withholding forecasts and investment performance",
    long_about = "A CLI for cumulative progressive withholding under time-versioned \
                  tax policy, and for reconciling portfolio valuations and cash flows \
                  into P&L, TWR and XIRR, all with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Withhold tax for a single month from year-to-date state
    Month(MonthArgs),
    /// Forecast monthly withholding across a range of months
    Forecast(ForecastArgs),
    /// Per-year totals of a forecast
    YearSummary(ForecastArgs),
    /// Time-weighted return from linked sub-periods
    Twr(TwrArgs),
    /// Money-weighted return (XIRR) of dated cash flows
    Xirr(XirrArgs),
    /// Reconcile valuations and flows into P&L, TWR and XIRR
    Performance(PerformanceArgs),
    /// Per-pair performance between adjacent valuations
    PerformanceSeries(PerformanceArgs),
    /// Print the built-in national policy preset
    Presets(PresetsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let default_filter = format!("fincalc={level},fincalc_core={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Month(args) => commands::withholding::run_month(args),
        Commands::Forecast(args) => commands::forecast::run_forecast(args),
        Commands::YearSummary(args) => commands::forecast::run_year_summary(args),
        Commands::Twr(args) => commands::performance::run_twr(args),
        Commands::Xirr(args) => commands::performance::run_xirr(args),
        Commands::Performance(args) => commands::performance::run_performance(args),
        Commands::PerformanceSeries(args) => commands::performance::run_performance_series(args),
        Commands::Presets(args) => commands::policy::run_presets(args),
        Commands::Version => {
            println!("fincalc {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
