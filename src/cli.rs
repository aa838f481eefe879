//! CLI definition and dispatch.
//!
//! Each subcommand loads the INI configuration (or defaults), validates it,
//! and runs one pipeline stage. Stages only share files under the data
//! directory.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{
    self, BETAS_FILE, CLUSTERED_FILE, CUMRET_FILE, DataLayout, FEATURES_FILE, FeatureTable,
    INTRADAY_RETURNS_FILE, PRICES_FILE, SENTIMENT_RETURNS_FILE, SUMMARY_FILE,
};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::svg_chart;
use crate::adapters::yahoo_adapter::{DEFAULT_HISTORY_URL, DEFAULT_TICKERS_URL, YahooAdapter};
use crate::domain::backtest::{BacktestConfig, run_cluster_backtest};
use crate::domain::clustering::{ClusterConfig, cluster_by_month};
use crate::domain::config_validation::validate_config;
use crate::domain::error::QuantlabError;
use crate::domain::factors::{market_proxy, merge_betas, monthly_returns, rolling_betas};
use crate::domain::features::{FeatureConfig, compute_features};
use crate::domain::ingest::{fetch_prices, history_window, resolve_universe};
use crate::domain::intraday::{IntradayConfig, run_intraday_backtest};
use crate::domain::metrics::{Metrics, StrategyReturns, TRADING_DAYS_PER_YEAR};
use crate::domain::panel::{PriceField, ReturnPanel, TickerSeries, group_by_ticker};
use crate::domain::sentiment::run_sentiment_backtest;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ALT_SENTIMENT_FILE: &str = "/mnt/data/sentiment_data.csv";
pub const CUMRET_CHART_FILE: &str = "strategy_cumret.svg";
pub const SHARPE_CHART_FILE: &str = "strategy_sharpe.svg";

#[derive(Parser, Debug)]
#[command(name = "quantlab", about = "S&P 500 quant research pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download daily prices for the index constituents
    Fetch {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compute monthly technical features
    Features {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compute rolling market betas
    Factors {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Cluster each month's feature cross-section
    Cluster {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Backtest the max-Sharpe portfolio of one cluster
    Backtest {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cluster label to trade (overrides [backtest] cluster_id)
        #[arg(long)]
        cluster: Option<usize>,
    },
    /// Backtest the top-engagement sentiment portfolio
    Sentiment {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Backtest intraday momentum gated by GARCH volatility
    Intraday {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compare strategy returns and draw charts
    Analyze {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run every stage after fetch, in order
    RunAll {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Fetch { config } => dispatch(config.as_deref(), run_fetch),
        Command::Features { config } => dispatch(config.as_deref(), run_features),
        Command::Factors { config } => dispatch(config.as_deref(), run_factors),
        Command::Cluster { config } => dispatch(config.as_deref(), run_cluster),
        Command::Backtest { config, cluster } => {
            dispatch(config.as_deref(), |c| run_backtest(c, cluster))
        }
        Command::Sentiment { config } => dispatch(config.as_deref(), run_sentiment),
        Command::Intraday { config } => dispatch(config.as_deref(), run_intraday),
        Command::Analyze { config } => dispatch(config.as_deref(), run_analyze),
        Command::RunAll { config } => dispatch(config.as_deref(), run_all),
        Command::Validate { config } => dispatch(config.as_deref(), run_validate),
    }
}

fn dispatch<F>(config_path: Option<&Path>, stage: F) -> ExitCode
where
    F: FnOnce(&dyn ConfigPort) -> Result<(), QuantlabError>,
{
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let config: &dyn ConfigPort = &adapter;
    if let Err(e) = validate_config(config).and_then(|()| stage(config)) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    ExitCode::SUCCESS
}

/// Loads the INI file, or an empty configuration (all defaults) when no path
/// is given.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, QuantlabError> {
    match path {
        Some(path) => FileConfigAdapter::from_file(path).map_err(|e| QuantlabError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        }),
        None => FileConfigAdapter::from_string("").map_err(|reason| QuantlabError::ConfigParse {
            file: "<defaults>".into(),
            reason,
        }),
    }
}

fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, QuantlabError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| QuantlabError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: format!("expected a non-negative integer, got {value}"),
    })
}

fn get_path(config: &dyn ConfigPort, section: &str, key: &str) -> Option<PathBuf> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(s.trim()))
}

pub fn data_layout(config: &dyn ConfigPort) -> DataLayout {
    DataLayout::new(get_path(config, "paths", "data_dir").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub years: u32,
    pub tickers_url: String,
    pub history_url: String,
    pub timeout_secs: u64,
    pub tickers: Option<Vec<String>>,
}

pub fn build_fetch_config(config: &dyn ConfigPort) -> Result<FetchConfig, QuantlabError> {
    let years = config.get_int("fetch", "years", 8);
    let years = u32::try_from(years).map_err(|_| QuantlabError::ConfigInvalid {
        section: "fetch".into(),
        key: "years".into(),
        reason: format!("expected a non-negative integer, got {years}"),
    })?;
    let tickers = match config.get_string("fetch", "tickers").filter(|s| !s.trim().is_empty()) {
        Some(list) => Some(parse_tickers(&list)?),
        None => None,
    };
    Ok(FetchConfig {
        years,
        tickers_url: config
            .get_string("fetch", "tickers_url")
            .unwrap_or_else(|| DEFAULT_TICKERS_URL.to_string()),
        history_url: config
            .get_string("fetch", "history_url")
            .unwrap_or_else(|| DEFAULT_HISTORY_URL.to_string()),
        timeout_secs: get_usize(config, "fetch", "timeout_secs", 30)? as u64,
        tickers,
    })
}

pub fn build_feature_config(config: &dyn ConfigPort) -> Result<FeatureConfig, QuantlabError> {
    let d = FeatureConfig::default();
    Ok(FeatureConfig {
        top_n: get_usize(config, "features", "top_n", d.top_n)?,
        rsi_window: get_usize(config, "features", "rsi_window", d.rsi_window)?,
        bb_window: get_usize(config, "features", "bb_window", d.bb_window)?,
        bb_dev: config.get_double("features", "bb_dev", d.bb_dev),
        atr_window: get_usize(config, "features", "atr_window", d.atr_window)?,
        macd_fast: get_usize(config, "features", "macd_fast", d.macd_fast)?,
        macd_slow: get_usize(config, "features", "macd_slow", d.macd_slow)?,
        macd_signal: get_usize(config, "features", "macd_signal", d.macd_signal)?,
    })
}

pub fn build_cluster_config(config: &dyn ConfigPort) -> Result<ClusterConfig, QuantlabError> {
    let d = ClusterConfig::default();
    Ok(ClusterConfig {
        n_clusters: get_usize(config, "clustering", "n_clusters", d.n_clusters)?,
        seed: get_usize(config, "clustering", "seed", d.seed as usize)? as u64,
        n_init: get_usize(config, "clustering", "n_init", d.n_init)?,
        max_iter: get_usize(config, "clustering", "max_iter", d.max_iter)?,
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, QuantlabError> {
    let d = BacktestConfig::default();
    Ok(BacktestConfig {
        cluster_id: get_usize(config, "backtest", "cluster_id", d.cluster_id)?,
        risk_free_rate: config.get_double("backtest", "risk_free_rate", d.risk_free_rate),
        frequency: config.get_double("backtest", "frequency", d.frequency),
    })
}

pub fn build_intraday_config(config: &dyn ConfigPort) -> Result<IntradayConfig, QuantlabError> {
    let d = IntradayConfig::default();
    Ok(IntradayConfig {
        window: get_usize(config, "intraday", "window", d.window)?,
        horizon: get_usize(config, "intraday", "horizon", d.horizon)?,
    })
}

fn load_series(layout: &DataLayout) -> Result<Vec<TickerSeries>, QuantlabError> {
    let bars = csv_adapter::read_prices(&layout.raw(PRICES_FILE))?;
    if bars.is_empty() {
        return Err(QuantlabError::NoData {
            reason: format!("{} has no rows", layout.raw(PRICES_FILE).display()),
        });
    }
    Ok(group_by_ticker(bars))
}

pub fn run_fetch(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let fetch = build_fetch_config(config)?;
    let adapter = YahooAdapter::new(&fetch.tickers_url, &fetch.history_url, fetch.timeout_secs)?;
    let today = chrono::Local::now().date_naive();
    fetch_with(&adapter, config, today)
}

/// Fetch stage against any data source; `today` ends the download window.
pub fn fetch_with(port: &dyn DataPort, config: &dyn ConfigPort, today: NaiveDate) -> Result<(), QuantlabError> {
    let fetch = build_fetch_config(config)?;
    let layout = data_layout(config);
    let tickers = resolve_universe(port, fetch.tickers)?;
    let (start, end) = history_window(today, fetch.years);
    tracing::info!(tickers = tickers.len(), %start, %end, "fetching daily prices");

    let bars = fetch_prices(port, &tickers, start, end)?;
    let path = layout.raw(PRICES_FILE);
    csv_adapter::write_prices(&path, &bars)?;
    tracing::info!(rows = bars.len(), path = %path.display(), "prices written");
    Ok(())
}

pub fn run_features(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let feature_config = build_feature_config(config)?;
    let series = load_series(&layout)?;
    tracing::info!(tickers = series.len(), "computing features");

    let rows = compute_features(&series, &feature_config);
    if rows.is_empty() {
        return Err(QuantlabError::NoData {
            reason: "no monthly feature rows produced".into(),
        });
    }
    let path = layout.processed(FEATURES_FILE);
    csv_adapter::write_features(&path, &rows, FeatureTable::Monthly)?;
    tracing::info!(rows = rows.len(), path = %path.display(), "features written");
    Ok(())
}

pub fn run_factors(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let window = get_usize(config, "factors", "window", crate::domain::factors::DEFAULT_WINDOW)?;
    let series = load_series(&layout)?;
    let features = csv_adapter::read_features(&layout.processed(FEATURES_FILE), FeatureTable::Monthly)?;
    let returns = monthly_returns(&series);

    let factors_path = get_path(config, "factors", "factors_file").unwrap_or_else(|| layout.raw("ff_factors.csv"));
    let factors = if factors_path.exists() {
        csv_adapter::read_factors(&factors_path)?
    } else {
        tracing::warn!(
            path = %factors_path.display(),
            "factor file not found, using equal-weighted market proxy with zero risk-free rate"
        );
        market_proxy(&returns)
    };

    let betas = rolling_betas(&returns, &factors, window);
    tracing::info!(window, factor_months = factors.len(), betas = betas.len(), "rolling betas");
    let rows = merge_betas(features, &betas);

    let path = layout.processed(BETAS_FILE);
    csv_adapter::write_features(&path, &rows, FeatureTable::WithBetas)?;
    tracing::info!(rows = rows.len(), path = %path.display(), "betas written");
    Ok(())
}

pub fn run_cluster(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let cluster_config = build_cluster_config(config)?;
    let rows = csv_adapter::read_features(&layout.processed(BETAS_FILE), FeatureTable::WithBetas)?;
    if rows.is_empty() {
        return Err(QuantlabError::NoData {
            reason: "no feature rows to cluster".into(),
        });
    }

    let (labelled, months) = cluster_by_month(rows, &cluster_config);
    for month in &months {
        tracing::info!(date = %month.date, tickers = month.tickers, clusters = month.clusters, "clustered month");
    }

    let path = layout.processed(CLUSTERED_FILE);
    csv_adapter::write_features(&path, &labelled, FeatureTable::Clustered)?;
    tracing::info!(months = months.len(), rows = labelled.len(), path = %path.display(), "clusters written");
    Ok(())
}

pub fn run_backtest(config: &dyn ConfigPort, cluster_override: Option<usize>) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let mut backtest_config = build_backtest_config(config)?;
    if let Some(id) = cluster_override {
        let n_clusters = build_cluster_config(config)?.n_clusters;
        if id >= n_clusters {
            return Err(QuantlabError::ConfigInvalid {
                section: "backtest".into(),
                key: "--cluster".into(),
                reason: format!("cluster {id} must be less than clustering.n_clusters ({n_clusters})"),
            });
        }
        backtest_config.cluster_id = id;
    }

    let rows = csv_adapter::read_features(&layout.processed(CLUSTERED_FILE), FeatureTable::Clustered)?;
    let series = load_series(&layout)?;
    let panel = ReturnPanel::from_series(&series, PriceField::AdjustedOrClose);

    let result = run_cluster_backtest(&rows, &panel, &backtest_config);
    if result.daily.is_empty() {
        return Err(QuantlabError::NoData {
            reason: format!("cluster {} produced no daily returns", backtest_config.cluster_id),
        });
    }

    let path = layout.cluster_returns(backtest_config.cluster_id);
    csv_adapter::write_cluster_returns(&path, &result.daily, backtest_config.cluster_id)?;
    tracing::info!(
        cluster = backtest_config.cluster_id,
        rebalances = result.allocations.len(),
        days = result.daily.len(),
        path = %path.display(),
        "cluster backtest written"
    );
    Ok(())
}

pub fn run_sentiment(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let top_n = get_usize(config, "sentiment", "top_n", crate::domain::sentiment::DEFAULT_TOP_N)?;
    let primary = get_path(config, "sentiment", "file").unwrap_or_else(|| layout.raw("sentiment_data.csv"));
    let alternate =
        get_path(config, "sentiment", "alt_file").unwrap_or_else(|| PathBuf::from(DEFAULT_ALT_SENTIMENT_FILE));

    let input = csv_adapter::resolve_input(&primary, &alternate)?;
    let records = csv_adapter::read_sentiment(&input)?;
    let series = load_series(&layout)?;
    let panel = ReturnPanel::from_series(&series, PriceField::Close);

    let result = run_sentiment_backtest(&records, &panel, top_n);
    if result.daily.is_empty() {
        return Err(QuantlabError::NoData {
            reason: "sentiment strategy produced no daily returns".into(),
        });
    }

    let path = layout.processed(SENTIMENT_RETURNS_FILE);
    csv_adapter::write_sentiment_returns(&path, &result.daily)?;
    tracing::info!(months = result.months.len(), days = result.daily.len(), path = %path.display(), "sentiment backtest written");
    Ok(())
}

pub fn run_intraday(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let intraday_config = build_intraday_config(config)?;
    let daily_path =
        get_path(config, "intraday", "daily_file").unwrap_or_else(|| layout.raw("simulated_daily_data.csv"));
    let bars_path =
        get_path(config, "intraday", "intraday_file").unwrap_or_else(|| layout.raw("simulated_5min_data.csv"));

    let daily = csv_adapter::read_daily_closes(&daily_path)?;
    let bars = csv_adapter::read_intraday_bars(&bars_path)?;
    let rows = run_intraday_backtest(&daily, &bars, &intraday_config);
    if rows.is_empty() {
        return Err(QuantlabError::NoData {
            reason: format!(
                "no days with both a volatility forecast and intraday bars ({} daily closes, window {})",
                daily.len(),
                intraday_config.window
            ),
        });
    }

    let path = layout.processed(INTRADAY_RETURNS_FILE);
    csv_adapter::write_intraday(&path, &rows)?;
    let active = rows.iter().filter(|r| r.pos == 1).count();
    tracing::info!(days = rows.len(), active, path = %path.display(), "intraday backtest written");
    Ok(())
}

/// Every strategy return file present under the processed directory.
pub fn collect_strategies(config: &dyn ConfigPort) -> Result<Vec<StrategyReturns>, QuantlabError> {
    let layout = data_layout(config);
    let n_clusters = get_usize(config, "clustering", "n_clusters", ClusterConfig::default().n_clusters)?;

    let mut sources: Vec<(String, PathBuf, &str)> = (0..n_clusters)
        .map(|id| (format!("cluster{id}"), layout.cluster_returns(id), "return"))
        .collect();
    sources.push(("sentiment".into(), layout.processed(SENTIMENT_RETURNS_FILE), "sentiment_return"));
    sources.push(("intraday".into(), layout.processed(INTRADAY_RETURNS_FILE), "strategy_ret"));

    let mut strategies = Vec::new();
    for (name, path, column) in sources {
        if !path.exists() {
            tracing::debug!(strategy = %name, path = %path.display(), "no return file");
            continue;
        }
        let returns = csv_adapter::read_return_series(&path, column)?;
        strategies.push(StrategyReturns::new(name, returns));
    }
    Ok(strategies)
}

pub fn run_analyze(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let periods = config.get_double("analysis", "periods_per_year", TRADING_DAYS_PER_YEAR);
    let strategies = collect_strategies(config)?;
    if strategies.is_empty() {
        return Err(QuantlabError::NoData {
            reason: format!("no strategy return files under {}", layout.processed("").display()),
        });
    }

    let summary: Vec<(String, Metrics)> = strategies
        .iter()
        .map(|s| (s.name.clone(), Metrics::compute(&s.values(), periods)))
        .collect();

    csv_adapter::write_cumulative(&layout.processed(CUMRET_FILE), &strategies)?;
    csv_adapter::write_summary(&layout.processed(SUMMARY_FILE), &summary)?;

    let sharpes: Vec<(String, f64)> = summary.iter().map(|(n, m)| (n.clone(), m.sharpe_ratio)).collect();
    fs::write(layout.processed(CUMRET_CHART_FILE), svg_chart::cumulative_returns_svg(&strategies))?;
    fs::write(layout.processed(SHARPE_CHART_FILE), svg_chart::sharpe_bars_svg(&sharpes))?;

    eprintln!("\n=== Strategy Summary ===");
    eprintln!(
        "{:<12} {:>6} {:>10} {:>10} {:>8} {:>9}",
        "Strategy", "Days", "Total", "Annual", "Sharpe", "MaxDD"
    );
    for (name, m) in &summary {
        eprintln!(
            "{:<12} {:>6} {:>9.2}% {:>9.2}% {:>8.2} {:>8.1}%",
            name,
            m.observations,
            m.total_return * 100.0,
            m.annualized_return * 100.0,
            m.sharpe_ratio,
            -m.max_drawdown * 100.0,
        );
    }
    eprintln!("\nCharts written to: {}", layout.processed("").display());
    Ok(())
}

fn run_configured_backtest(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    run_backtest(config, None)
}

/// Every stage except fetch, stopping at the first failure.
pub fn run_all(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let stages: [(&str, fn(&dyn ConfigPort) -> Result<(), QuantlabError>); 7] = [
        ("features", run_features),
        ("factors", run_factors),
        ("cluster", run_cluster),
        ("backtest", run_configured_backtest),
        ("sentiment", run_sentiment),
        ("intraday", run_intraday),
        ("analyze", run_analyze),
    ];
    for (name, stage) in stages {
        tracing::info!(stage = name, "starting stage");
        stage(config).inspect_err(|e| tracing::error!(stage = name, error = %e, "stage failed"))?;
    }
    Ok(())
}

pub fn run_validate(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let layout = data_layout(config);
    let fetch = build_fetch_config(config)?;
    let features = build_feature_config(config)?;
    let clustering = build_cluster_config(config)?;
    let backtest = build_backtest_config(config)?;
    let intraday = build_intraday_config(config)?;

    eprintln!("Configuration is valid.\n");
    eprintln!("[paths]");
    eprintln!("  data_dir:        {}", layout.data_dir.display());
    eprintln!("[fetch]");
    eprintln!("  years:           {}", fetch.years);
    match &fetch.tickers {
        Some(t) => eprintln!("  tickers:         {}", t.join(", ")),
        None => eprintln!("  tickers_url:     {}", fetch.tickers_url),
    }
    eprintln!("  history_url:     {}", fetch.history_url);
    eprintln!("[features]");
    eprintln!("  top_n:           {}", features.top_n);
    eprintln!("  rsi/bb/atr:      {}/{}/{}", features.rsi_window, features.bb_window, features.atr_window);
    eprintln!("  bb_dev:          {}", features.bb_dev);
    eprintln!(
        "  macd:            {}/{}/{}",
        features.macd_fast, features.macd_slow, features.macd_signal
    );
    eprintln!("[factors]");
    eprintln!(
        "  window:          {}",
        get_usize(config, "factors", "window", crate::domain::factors::DEFAULT_WINDOW)?
    );
    eprintln!("[clustering]");
    eprintln!("  n_clusters:      {}", clustering.n_clusters);
    eprintln!("  seed:            {}", clustering.seed);
    eprintln!("  n_init/max_iter: {}/{}", clustering.n_init, clustering.max_iter);
    eprintln!("[backtest]");
    eprintln!("  cluster_id:      {}", backtest.cluster_id);
    eprintln!("  risk_free_rate:  {}", backtest.risk_free_rate);
    eprintln!("  frequency:       {}", backtest.frequency);
    eprintln!("[intraday]");
    eprintln!("  window/horizon:  {}/{}", intraday.window, intraday.horizon);
    Ok(())
}
