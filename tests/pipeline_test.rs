//! End-to-end stage tests over a temporary data directory.
//!
//! Tests cover:
//! - features -> factors -> cluster -> backtest -> analyze on synthetic prices
//! - factor file alignment versus the market proxy fallback
//! - sentiment input resolution (primary, alternate, neither)
//! - intraday backtest on simulated daily and 5-minute files
//! - run-all stopping at the first failing stage

mod common;

use common::*;
use quantlab::adapters::csv_adapter::{
    self, BETAS_FILE, CLUSTERED_FILE, CUMRET_FILE, FEATURES_FILE, FeatureTable, INTRADAY_RETURNS_FILE, PRICES_FILE,
    SENTIMENT_RETURNS_FILE, SUMMARY_FILE,
};
use quantlab::cli::{self, CUMRET_CHART_FILE, SHARPE_CHART_FILE};
use quantlab::domain::error::QuantlabError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TICKERS: [&str; 6] = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];

const PIPELINE_INI: &str = r#"
[features]
top_n = 6

[factors]
window = 6

[clustering]
n_clusters = 2
n_init = 3

[backtest]
cluster_id = 0
risk_free_rate = 0.0
"#;

fn seed_prices(data_dir: &Path) {
    let days = business_days(date(2022, 1, 3), 400);
    let bars: Vec<PriceBar> = TICKERS
        .iter()
        .enumerate()
        .flat_map(|(i, t)| generate_bars(t, &days, i))
        .collect();
    csv_adapter::write_prices(&data_dir.join("raw").join(PRICES_FILE), &bars).unwrap();
}

fn processed(dir: &TempDir, file: &str) -> std::path::PathBuf {
    dir.path().join("processed").join(file)
}

mod cluster_pipeline {
    use super::*;

    #[test]
    fn stages_chain_through_files() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let config = config_for(dir.path(), PIPELINE_INI);

        cli::run_features(&config).unwrap();
        let features = csv_adapter::read_features(&processed(&dir, FEATURES_FILE), FeatureTable::Monthly).unwrap();
        assert!(!features.is_empty());
        let first_month = features[0].date;
        assert_eq!(features.iter().filter(|r| r.date == first_month).count(), TICKERS.len());
        assert!(features.windows(2).all(|w| w[0].date <= w[1].date));

        cli::run_factors(&config).unwrap();
        let with_betas = csv_adapter::read_features(&processed(&dir, BETAS_FILE), FeatureTable::WithBetas).unwrap();
        assert_eq!(with_betas.len(), features.len());
        // six months of returns are needed before the first beta
        assert!(with_betas.iter().filter(|r| r.date == first_month).all(|r| r.beta.is_none()));
        assert!(with_betas.iter().any(|r| r.beta.is_some()));

        cli::run_cluster(&config).unwrap();
        let clustered =
            csv_adapter::read_features(&processed(&dir, CLUSTERED_FILE), FeatureTable::Clustered).unwrap();
        assert_eq!(clustered.len(), features.len());
        assert!(clustered.iter().all(|r| matches!(r.cluster, Some(0) | Some(1))));

        cli::run_backtest(&config, None).unwrap();
        let cluster_path = dir.path().join("processed").join("backtest_cluster0_daily.csv");
        let daily = csv_adapter::read_return_series(&cluster_path, "return").unwrap();
        assert!(!daily.is_empty());
        assert!(daily.windows(2).all(|w| w[0].0 < w[1].0));
        // first rebalance is the first month end, so returns start the month after
        assert!(daily[0].0 > first_month);

        cli::run_analyze(&config).unwrap();
        assert!(processed(&dir, CUMRET_FILE).exists());
        assert!(processed(&dir, SUMMARY_FILE).exists());
        let svg = fs::read_to_string(processed(&dir, CUMRET_CHART_FILE)).unwrap();
        assert!(svg.contains("cluster0"));
        let sharpe_svg = fs::read_to_string(processed(&dir, SHARPE_CHART_FILE)).unwrap();
        assert!(sharpe_svg.starts_with("<svg"));

        let summary = fs::read_to_string(processed(&dir, SUMMARY_FILE)).unwrap();
        let mut lines = summary.lines();
        assert!(lines.next().unwrap().starts_with("strategy,observations"));
        assert!(lines.next().unwrap().starts_with(&format!("cluster0,{}", daily.len())));
    }

    #[test]
    fn cluster_override_selects_output_file() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let config = config_for(dir.path(), PIPELINE_INI);
        cli::run_features(&config).unwrap();
        cli::run_factors(&config).unwrap();
        cli::run_cluster(&config).unwrap();

        cli::run_backtest(&config, Some(1)).unwrap();
        let path = dir.path().join("processed").join("backtest_cluster1_daily.csv");
        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Date,return,cluster"));
        assert!(content.lines().skip(1).all(|l| l.ends_with(",1")));
    }

    #[test]
    fn cluster_override_beyond_cluster_count_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path(), PIPELINE_INI);

        let err = cli::run_backtest(&config, Some(2)).unwrap_err();
        assert!(matches!(err, QuantlabError::ConfigInvalid { ref key, .. } if key == "--cluster"));
        assert!(!dir.path().join("processed").join("backtest_cluster2_daily.csv").exists());
    }

    #[test]
    fn factor_file_months_align_with_month_end_returns() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let mut factors = String::from("Date,Mkt-RF,SMB,HML,RF\n");
        for year in [2022, 2023] {
            for month in 1..=12 {
                let mkt = ((month as f64) * 0.9 + year as f64).sin() * 3.0;
                factors.push_str(&format!("{year}{month:02},{mkt:.2},0.10,-0.20,0.01\n"));
            }
        }
        write_file(&dir.path().join("raw").join("ff_factors.csv"), &factors);
        let config = config_for(dir.path(), PIPELINE_INI);

        cli::run_features(&config).unwrap();
        cli::run_factors(&config).unwrap();
        let rows = csv_adapter::read_features(&processed(&dir, BETAS_FILE), FeatureTable::WithBetas).unwrap();
        assert!(rows.iter().any(|r| r.beta.is_some()));
        assert!(rows.iter().filter_map(|r| r.beta).all(f64::is_finite));
    }

    #[test]
    fn missing_price_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path(), PIPELINE_INI);
        assert!(matches!(cli::run_features(&config), Err(QuantlabError::NotFound { .. })));
    }

    #[test]
    fn cluster_requires_beta_column() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let config = config_for(dir.path(), PIPELINE_INI);
        cli::run_features(&config).unwrap();
        fs::copy(processed(&dir, FEATURES_FILE), processed(&dir, BETAS_FILE)).unwrap();

        let err = cli::run_cluster(&config).unwrap_err();
        assert!(matches!(err, QuantlabError::MissingColumn { ref column, .. } if column == "beta"));
    }
}

mod sentiment {
    use super::*;

    fn sentiment_csv() -> String {
        let mut csv = String::from("date,symbol,twitterPosts,twitterComments,twitterLikes,twitterImpressions,extra\n");
        for day in business_days(date(2022, 3, 1), 40) {
            for (i, t) in TICKERS.iter().enumerate() {
                let likes = 100 * (i + 1);
                csv.push_str(&format!("{day},{t},{},{},{likes},,x\n", i + 1, 2 * i));
            }
        }
        csv
    }

    #[test]
    fn top_engagement_tickers_are_held_next_month() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let input = dir.path().join("raw").join("sentiment_data.csv");
        write_file(&input, &sentiment_csv());
        let config = config_for(
            dir.path(),
            "[sentiment]\ntop_n = 2\nalt_file = /nonexistent/sentiment.csv\n",
        );

        cli::run_sentiment(&config).unwrap();
        let daily = csv_adapter::read_return_series(&processed(&dir, SENTIMENT_RETURNS_FILE), "sentiment_return")
            .unwrap();
        assert!(!daily.is_empty());
        // March and April records are held through April and May
        assert!(daily.iter().all(|(d, _)| *d >= date(2022, 4, 1) && *d <= date(2022, 5, 31)));
    }

    #[test]
    fn alternate_location_is_used() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let alt = dir.path().join("elsewhere").join("sentiment.csv");
        write_file(&alt, &sentiment_csv());
        let config = config_for(
            dir.path(),
            &format!("[sentiment]\nalt_file = {}\n", alt.display()),
        );

        cli::run_sentiment(&config).unwrap();
        assert!(processed(&dir, SENTIMENT_RETURNS_FILE).exists());
    }

    #[test]
    fn neither_location_names_both_paths() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let config = config_for(dir.path(), "[sentiment]\nalt_file = /nonexistent/alt_sentiment.csv\n");

        match cli::run_sentiment(&config).unwrap_err() {
            QuantlabError::NotFound { path } => {
                assert!(path.contains("sentiment_data.csv"));
                assert!(path.contains("/nonexistent/alt_sentiment.csv"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod intraday {
    use super::*;

    fn seed_intraday(dir: &Path, days: usize) {
        let dates = business_days(date(2023, 1, 2), days);
        let mut daily = String::from("Date,Open,High,Low,Close,Volume\n");
        let mut bars = String::from("datetime,open,high,low,close,volume\n");
        let mut close = 100.0_f64;
        for (i, d) in dates.iter().enumerate() {
            let t = i as f64;
            let shock = 0.012 * (t * 1.7).sin() + 0.006 * (t * 0.37).cos() * if i % 9 < 4 { 2.0 } else { 0.5 };
            close *= 1.0 + shock;
            daily.push_str(&format!("{d},{close},{close},{close},{close},1000\n"));

            let open = close * (1.0 - 0.5 * shock);
            for k in 0..4 {
                let price = open + (close - open) * (k as f64 + 1.0) / 4.0;
                let bar_open = if k == 0 { open } else { price };
                bars.push_str(&format!(
                    "{d} {:02}:{:02}:00,{bar_open},{price},{price},{price},10\n",
                    9 + (30 + 5 * k) / 60,
                    (30 + 5 * k) % 60
                ));
            }
        }
        write_file(&dir.join("raw").join("simulated_daily_data.csv"), &daily);
        write_file(&dir.join("raw").join("simulated_5min_data.csv"), &bars);
    }

    #[test]
    fn backtest_rows_follow_forecasts() {
        let dir = TempDir::new().unwrap();
        seed_intraday(dir.path(), 90);
        let config = config_for(dir.path(), "[intraday]\nwindow = 40\n");

        cli::run_intraday(&config).unwrap();
        let path = processed(&dir, INTRADAY_RETURNS_FILE);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Date,pred_vol,intraday_mom,pos,strategy_ret"));

        let rets = csv_adapter::read_return_series(&path, "strategy_ret").unwrap();
        assert!(!rets.is_empty());
        assert!(rets.len() <= 90 - 40);
        let moms = csv_adapter::read_return_series(&path, "intraday_mom").unwrap();
        for ((_, ret), (_, mom)) in rets.iter().zip(&moms) {
            assert!(*ret == 0.0 || (*ret - *mom).abs() < 1e-12);
            assert!(*ret >= 0.0);
        }
    }

    #[test]
    fn too_short_history_is_no_data() {
        let dir = TempDir::new().unwrap();
        seed_intraday(dir.path(), 15);
        let config = config_for(dir.path(), "[intraday]\nwindow = 20\n");
        assert!(matches!(cli::run_intraday(&config), Err(QuantlabError::NoData { .. })));
    }
}

mod orchestration {
    use super::*;

    #[test]
    fn analyze_without_return_files_is_no_data() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path(), "");
        assert!(matches!(cli::run_analyze(&config), Err(QuantlabError::NoData { .. })));
    }

    #[test]
    fn run_all_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        seed_prices(dir.path());
        let config = config_for(
            dir.path(),
            &format!("{PIPELINE_INI}\n[sentiment]\nalt_file = /nonexistent/sentiment.csv\n"),
        );

        let err = cli::run_all(&config).unwrap_err();
        assert!(matches!(err, QuantlabError::NotFound { .. }));
        assert!(processed(&dir, CLUSTERED_FILE).exists());
        assert!(dir.path().join("processed").join("backtest_cluster0_daily.csv").exists());
        assert!(!processed(&dir, INTRADAY_RETURNS_FILE).exists());
        assert!(!processed(&dir, SUMMARY_FILE).exists());
    }
}
