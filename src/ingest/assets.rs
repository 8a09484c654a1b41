// src/ingest/assets.rs
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AssetUniverse;

/// Resolves tickers from headlines and source-provided codes against the tracked universe.
#[derive(Debug, Clone)]
pub struct AssetMatcher {
    tickers: BTreeSet<String>,
    aliases: BTreeMap<String, String>,
}

impl AssetMatcher {
    pub fn new(universe: AssetUniverse) -> Self {
        Self {
            tickers: universe.tickers,
            aliases: universe.aliases,
        }
    }

    /// Upper-case, then exact ticker or alias lookup.
    pub fn normalize(&self, code: &str) -> Option<String> {
        let up = code.trim().trim_start_matches('$').to_ascii_uppercase();
        if up.is_empty() {
            return None;
        }
        if self.tickers.contains(&up) {
            return Some(up);
        }
        self.aliases.get(&up).cloned()
    }

    /// Tickers mentioned in free text: whole-word or `$TICKER` hits, plus alias names.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        let upper = text.to_uppercase();
        let mut found = BTreeSet::new();

        for token in upper.split(|c: char| !(c.is_ascii_alphanumeric() || c == '$')) {
            let token = token.trim_start_matches('$');
            if !token.is_empty() && self.tickers.contains(token) {
                found.insert(token.to_string());
            }
        }
        for (name, ticker) in &self.aliases {
            if upper.contains(name.as_str()) {
                found.insert(ticker.clone());
            }
        }
        found
    }

    /// Merge normalized source codes with headline mentions. Sorted, unique.
    pub fn resolve<'a, I>(&self, title: &str, source_codes: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut all = self.extract(title);
        all.extend(source_codes.into_iter().filter_map(|c| self.normalize(c)));
        all.into_iter().collect()
    }

    pub fn add(&mut self, ticker: &str) -> bool {
        let up = ticker.trim().to_ascii_uppercase();
        !up.is_empty() && self.tickers.insert(up)
    }

    pub fn remove(&mut self, ticker: &str) -> bool {
        let up = ticker.trim().to_ascii_uppercase();
        let removed = self.tickers.remove(&up);
        if removed {
            self.aliases.retain(|_, t| t != &up);
        }
        removed
    }

    pub fn tickers(&self) -> &BTreeSet<String> {
        &self.tickers
    }
}

impl Default for AssetMatcher {
    fn default() -> Self {
        Self::new(AssetUniverse::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_word_dollar_and_alias_mentions() {
        let m = AssetMatcher::default();
        let got = m.extract("Bitcoin ETF inflows lift $SOL; eth/btc ratio flat");
        assert_eq!(
            got.into_iter().collect::<Vec<_>>(),
            vec!["BTC", "ETH", "SOL"]
        );
    }

    #[test]
    fn ignores_substrings_of_longer_words() {
        let m = AssetMatcher::default();
        // "OPEN" contains OP, "DOTS" contains DOT: neither is a whole-word hit
        assert!(m.extract("Markets OPEN with DOTS on charts").is_empty());
    }

    #[test]
    fn normalizes_source_codes_via_aliases() {
        let m = AssetMatcher::default();
        assert_eq!(m.normalize("btc").as_deref(), Some("BTC"));
        assert_eq!(m.normalize("Ethereum").as_deref(), Some("ETH"));
        assert_eq!(m.normalize("XYZ"), None);
        let merged = m.resolve("Market wrap", ["eth", "ETH", "unknown"]);
        assert_eq!(merged, vec!["ETH"]);
    }

    #[test]
    fn add_and_remove_tickers() {
        let mut m = AssetMatcher::default();
        assert!(m.add("tao"));
        assert!(!m.add("TAO"));
        assert_eq!(m.normalize("tao").as_deref(), Some("TAO"));
        assert!(m.remove("btc"));
        assert!(!m.remove("btc"));
        assert!(m.extract("Bitcoin rallies").is_empty(), "alias dropped with ticker");
    }
}
