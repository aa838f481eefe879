//! Domain error types.

use crate::domain::garch::GarchError;
use crate::domain::optimizer::OptimizeError;
use crate::domain::universe::UniverseError;

/// Top-level error type for quantlab.
#[derive(Debug, thiserror::Error)]
pub enum QuantlabError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("malformed CSV {file}: {reason}")]
    Csv { file: String, reason: String },

    #[error("missing column `{column}` in {file}")]
    MissingColumn { file: String, column: String },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("no data: {reason}")]
    NoData { reason: String },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Optimize(#[from] OptimizeError),

    #[error(transparent)]
    Garch(#[from] GarchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&QuantlabError> for std::process::ExitCode {
    fn from(err: &QuantlabError) -> Self {
        let code: u8 = match err {
            QuantlabError::Io(_) | QuantlabError::NotFound { .. } => 1,
            QuantlabError::ConfigParse { .. } | QuantlabError::ConfigInvalid { .. } => 2,
            QuantlabError::DataSource { .. } | QuantlabError::Universe(_) => 3,
            QuantlabError::Csv { .. } | QuantlabError::MissingColumn { .. } => 4,
            QuantlabError::NoData { .. }
            | QuantlabError::Optimize(_)
            | QuantlabError::Garch(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config_invalid() {
        let err = QuantlabError::ConfigInvalid {
            section: "clustering".into(),
            key: "n_clusters".into(),
            reason: "must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value [clustering] n_clusters: must be positive"
        );
    }

    #[test]
    fn display_missing_column() {
        let err = QuantlabError::MissingColumn {
            file: "prices.csv".into(),
            column: "close".into(),
        };
        assert_eq!(err.to_string(), "missing column `close` in prices.csv");
    }

    #[test]
    fn universe_error_converts() {
        let err: QuantlabError = UniverseError::EmptyToken.into();
        assert!(matches!(err, QuantlabError::Universe(_)));
    }
}
