//! Configuration validation.
//!
//! Checks every stage section before any stage runs. Absent keys take their
//! defaults and are therefore always valid.

use crate::domain::error::QuantlabError;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    validate_fetch(config)?;
    validate_features(config)?;
    validate_factors(config)?;
    validate_clustering(config)?;
    validate_backtest(config)?;
    validate_sentiment(config)?;
    validate_intraday(config)?;
    validate_analysis(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> QuantlabError {
    QuantlabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn require_positive_int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<(), QuantlabError> {
    if config.get_int(section, key, default) < 1 {
        return Err(invalid(section, key, &format!("{key} must be at least 1")));
    }
    Ok(())
}

fn require_positive_double(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<(), QuantlabError> {
    if config.get_double(section, key, default) <= 0.0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(())
}

fn validate_fetch(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    require_positive_int(config, "fetch", "years", 8)?;
    require_positive_int(config, "fetch", "timeout_secs", 30)
}

fn validate_features(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    require_positive_int(config, "features", "top_n", 50)?;
    require_positive_int(config, "features", "rsi_window", 14)?;
    require_positive_int(config, "features", "bb_window", 20)?;
    require_positive_int(config, "features", "atr_window", 14)?;
    require_positive_int(config, "features", "macd_fast", 12)?;
    require_positive_int(config, "features", "macd_slow", 26)?;
    require_positive_int(config, "features", "macd_signal", 9)?;

    if config.get_double("features", "bb_dev", 2.0) < 0.0 {
        return Err(invalid("features", "bb_dev", "bb_dev must be non-negative"));
    }

    let fast = config.get_int("features", "macd_fast", 12);
    let slow = config.get_int("features", "macd_slow", 26);
    if fast >= slow {
        return Err(invalid(
            "features",
            "macd_fast",
            "macd_fast must be less than macd_slow",
        ));
    }
    Ok(())
}

fn validate_factors(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let window = config.get_int("factors", "window", 12);
    if window < 2 {
        return Err(invalid("factors", "window", "window must be at least 2"));
    }
    Ok(())
}

fn validate_clustering(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    require_positive_int(config, "clustering", "n_clusters", 4)?;
    require_positive_int(config, "clustering", "n_init", 10)?;
    require_positive_int(config, "clustering", "max_iter", 300)?;
    if config.get_int("clustering", "seed", 42) < 0 {
        return Err(invalid("clustering", "seed", "seed must be non-negative"));
    }
    Ok(())
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    if config.get_int("backtest", "cluster_id", 0) < 0 {
        return Err(invalid("backtest", "cluster_id", "cluster_id must be non-negative"));
    }
    let n_clusters = config.get_int("clustering", "n_clusters", 4);
    if config.get_int("backtest", "cluster_id", 0) >= n_clusters {
        return Err(invalid(
            "backtest",
            "cluster_id",
            "cluster_id must be less than clustering.n_clusters",
        ));
    }

    let rf = config.get_double("backtest", "risk_free_rate", 0.02);
    if !(0.0..1.0).contains(&rf) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    require_positive_double(config, "backtest", "frequency", 252.0)
}

fn validate_sentiment(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    require_positive_int(config, "sentiment", "top_n", 20)
}

fn validate_intraday(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    let window = config.get_int("intraday", "window", 252);
    if window < crate::domain::garch::MIN_OBSERVATIONS as i64 {
        return Err(invalid(
            "intraday",
            "window",
            &format!("window must be at least {}", crate::domain::garch::MIN_OBSERVATIONS),
        ));
    }
    require_positive_int(config, "intraday", "horizon", 1)
}

fn validate_analysis(config: &dyn ConfigPort) -> Result<(), QuantlabError> {
    require_positive_double(config, "analysis", "periods_per_year", 252.0)
}
