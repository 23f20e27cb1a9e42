//! Command-line interface for the portfolio analytics core.

use coinfolio::allocation;
use coinfolio::config::AnalysisConfig;
use coinfolio::data::{load_history, DataConfig, PriceStore};
use coinfolio::error::Result;
use coinfolio::metrics;
use coinfolio::performance::{PerformanceColumn, PerformanceFormatter};
use coinfolio::session::Session;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

/// Coinfolio - backtest cryptocurrency portfolios against individual assets.
#[derive(Parser)]
#[command(name = "coinfolio")]
#[command(version = "0.1.0")]
#[command(about = "Construct crypto portfolios and evaluate their historic performance")]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis and print the performance table
    Run {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Asset list CSV (overrides the config)
        #[arg(short, long)]
        assets: Option<PathBuf>,

        /// Directory of per-asset history CSVs (overrides the config)
        #[arg(short = 'H', long)]
        histories: Option<PathBuf>,

        /// Window start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Window end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Maximum coins in the investable set
        #[arg(short, long)]
        max_coins: Option<usize>,

        /// Sort the table by this column
        #[arg(short, long, value_enum, default_value = "risk-adjusted")]
        sort: SortColumn,
    },

    /// Print risk metrics for a single price history CSV
    Metrics {
        /// Path to the history CSV
        #[arg(short = 'H', long)]
        history: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "coinfolio.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortColumn {
    Return,
    AnnualReturn,
    Volatility,
    RiskAdjusted,
    MaxDrawdown,
    MarketCap,
}

impl From<SortColumn> for PerformanceColumn {
    fn from(column: SortColumn) -> Self {
        match column {
            SortColumn::Return => PerformanceColumn::Return,
            SortColumn::AnnualReturn => PerformanceColumn::AnnualReturn,
            SortColumn::Volatility => PerformanceColumn::Volatility,
            SortColumn::RiskAdjusted => PerformanceColumn::RiskAdjusted,
            SortColumn::MaxDrawdown => PerformanceColumn::MaxDrawdown,
            SortColumn::MarketCap => PerformanceColumn::MarketCap,
        }
    }
}

/// Dispatch the parsed command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            config,
            assets,
            histories,
            start,
            end,
            max_coins,
            sort,
        } => run_analysis(
            config, assets, histories, start, end, max_coins, sort, cli.output,
        ),
        Commands::Metrics { history } => print_metrics(&history),
        Commands::InitConfig { output } => init_config(&output),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_analysis(
    config_path: Option<PathBuf>,
    assets: Option<PathBuf>,
    histories: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    max_coins: Option<usize>,
    sort: SortColumn,
    output: OutputFormat,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(path) = assets {
        config.data.assets = path.display().to_string();
    }
    if let Some(path) = histories {
        config.data.histories = path.display().to_string();
    }
    if let Some(n) = max_coins {
        config.analysis.max_coins = n;
    }
    if start.is_some() || end.is_some() {
        config.analysis.start_date = start;
        config.analysis.end_date = end;
    }

    let store = PriceStore::load(
        &config.data.assets,
        &config.data.histories,
        &DataConfig::default(),
    )?;
    let window = config.window()?;
    let mut session = Session::new(store, window, config.session_options())?;

    let mut table = session.performance()?.clone();
    table.sort_by(sort.into());

    match output {
        OutputFormat::Json => println!("{}", PerformanceFormatter::to_json(&table)?),
        OutputFormat::Text => {
            println!();
            println!("Performance over {}", session.window());
            println!("{}", PerformanceFormatter::render(&table));
            print_portfolio_summary(&mut session)?;
        }
    }
    Ok(())
}

/// Summarize the Uniform portfolio: final value and the drawdown window.
fn print_portfolio_summary(session: &mut Session) -> Result<()> {
    let window = session.window();
    let unified = session.unified()?;
    let column = match unified.column(allocation::UNIFORM) {
        Some(col) => col.clone(),
        None => return Ok(()),
    };
    let dates = unified.dates().to_vec();

    let final_value = column.series.last().copied().unwrap_or(1.0);
    let change_pct = (final_value - 1.0) * 100.0;
    println!(
        "Uniform portfolio: 1.00 -> {:.2} {}",
        final_value,
        PerformanceFormatter::format_pct_change(change_pct)
    );

    let drawdown = metrics::max_drawdown(&column.series)?;
    if drawdown.magnitude > 0.0 {
        println!(
            "Worst loss {:.1}% between {} and {} (window {})",
            drawdown.magnitude * 100.0,
            dates[drawdown.peak],
            dates[drawdown.trough],
            window
        );
    }
    Ok(())
}

fn print_metrics(path: &PathBuf) -> Result<()> {
    let history = load_history(path, &DataConfig::default())?;
    let prices: Vec<f64> = history.points().iter().map(|p| p.price).collect();

    println!("Return over period: {:>8.2}%", metrics::absolute_return(&prices)? * 100.0);
    println!("Return (annualised): {:>7.2}%", metrics::annual_return(&prices)? * 100.0);
    println!("Annual volatility: {:>9.2}%", metrics::annual_vol(&prices)? * 100.0);
    let drawdown = metrics::max_drawdown(&prices)?;
    println!("Max loss: {:>18.2}%", drawdown.magnitude * 100.0);
    Ok(())
}

fn init_config(output: &PathBuf) -> Result<()> {
    std::fs::write(output, AnalysisConfig::example())?;
    info!(path = %output.display(), "wrote default configuration");
    println!("Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "coinfolio",
            "run",
            "--assets",
            "assets.csv",
            "-H",
            "histories",
            "--start",
            "2023-01-01",
            "--end",
            "2024-01-01",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_parses_metrics_command() {
        let cli = Cli::try_parse_from(["coinfolio", "metrics", "-H", "bitcoin.csv"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_rejects_unknown_sort_column() {
        let cli = Cli::try_parse_from(["coinfolio", "run", "--sort", "vibes"]);
        assert!(cli.is_err());
    }

    #[test]
    fn date_parse_helper_is_strict() {
        assert!(NaiveDate::parse_from_str("2024-13-01", "%Y-%m-%d").is_err());
    }
}
