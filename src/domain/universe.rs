//! Ticker universe handling for the ingestion stage.
//!
//! Tickers come either from the listing page or from a configured list.
//! Listing symbols use dots for share classes (`BRK.B`); the price source
//! expects hyphens (`BRK-B`).

use std::collections::HashSet;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("ticker listing contained no symbols")]
    EmptyListing,
}

/// Normalize a single listing symbol to the price-source form.
pub fn clean_symbol(symbol: &str) -> String {
    symbol.trim().replace('.', "-").to_uppercase()
}

/// Clean and deduplicate listing symbols, preserving first-seen order.
pub fn normalize_listing<I, S>(symbols: I) -> Result<Vec<String>, UniverseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let tickers: Vec<String> = symbols
        .into_iter()
        .map(|s| clean_symbol(s.as_ref()))
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect();

    if tickers.is_empty() {
        return Err(UniverseError::EmptyListing);
    }
    Ok(tickers)
}

/// Parse a comma-separated ticker list from configuration.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = clean_symbol(trimmed);
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_symbol_replaces_dots() {
        assert_eq!(clean_symbol("BRK.B"), "BRK-B");
        assert_eq!(clean_symbol(" bf.b "), "BF-B");
    }

    #[test]
    fn normalize_listing_dedupes_in_order() {
        let tickers = normalize_listing(["MMM", "BRK.B", "AOS", "BRK-B", "MMM"]).unwrap();
        assert_eq!(tickers, vec!["MMM", "BRK-B", "AOS"]);
    }

    #[test]
    fn normalize_listing_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            normalize_listing(empty),
            Err(UniverseError::EmptyListing)
        ));
        assert!(matches!(
            normalize_listing(["  "]),
            Err(UniverseError::EmptyListing)
        ));
    }

    #[test]
    fn parse_tickers_valid() {
        assert_eq!(parse_tickers("aapl, MSFT,brk.b").unwrap(), vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn parse_tickers_empty_token() {
        assert!(matches!(parse_tickers("AAPL,,MSFT"), Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn parse_tickers_duplicate() {
        match parse_tickers("AAPL,MSFT,aapl") {
            Err(UniverseError::DuplicateTicker(t)) => assert_eq!(t, "AAPL"),
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }
}
