// src/config/assets.rs
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

const ENV_PATH: &str = "SENTIMENT_ASSETS_PATH";

/// Tickers tracked by default (perp-listed majors and memes).
const DEFAULT_TICKERS: &[&str] = &[
    "BTC", "ETH", "SOL", "DOGE", "XRP", "ADA", "AVAX", "DOT", "MATIC", "LINK", "UNI", "ATOM",
    "LTC", "BCH", "NEAR", "APT", "ARB", "OP", "SUI", "SEI", "TIA", "INJ", "FTM", "RUNE", "STX",
    "IMX", "MINA", "BLUR", "GMX", "AAVE", "MKR", "CRV", "LDO", "SNX", "COMP", "SUSHI", "YFI",
    "1INCH", "BAL", "PERP", "DYDX", "JTO", "JUP", "WIF", "BONK", "PEPE", "SHIB", "FLOKI", "MEME",
    "ORDI", "HYPE", "PURR", "JEFF",
];

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("BITCOIN", "BTC"),
    ("ETHEREUM", "ETH"),
    ("SOLANA", "SOL"),
    ("DOGECOIN", "DOGE"),
    ("RIPPLE", "XRP"),
    ("CARDANO", "ADA"),
    ("AVALANCHE", "AVAX"),
    ("POLKADOT", "DOT"),
    ("POLYGON", "MATIC"),
    ("CHAINLINK", "LINK"),
    ("UNISWAP", "UNI"),
    ("COSMOS", "ATOM"),
    ("LITECOIN", "LTC"),
    ("ARBITRUM", "ARB"),
    ("OPTIMISM", "OP"),
];

/// Allow-list of tickers plus full-name aliases that resolve onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUniverse {
    pub tickers: BTreeSet<String>,
    /// Upper-cased name → ticker.
    pub aliases: BTreeMap<String, String>,
}

impl Default for AssetUniverse {
    fn default() -> Self {
        Self {
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssetFile {
    tickers: Vec<String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl AssetUniverse {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Assets(format!("reading {}: {e}", path.display())))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_assets(&content, ext.as_str())
    }

    /// Resolve the asset universe:
    /// 1) $SENTIMENT_ASSETS_PATH (must exist)
    /// 2) config/assets.toml
    /// 3) config/assets.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::Invalid {
                    var: ENV_PATH,
                    reason: format!("{} does not exist", pb.display()),
                });
            }
            return Self::load_from(&pb);
        }
        for candidate in ["config/assets.toml", "config/assets.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }
}

fn parse_assets(s: &str, hint_ext: &str) -> Result<AssetUniverse, ConfigError> {
    let parsed: AssetFile = if hint_ext == "json" {
        serde_json::from_str(s).map_err(|e| ConfigError::Assets(e.to_string()))?
    } else {
        match toml::from_str(s) {
            Ok(v) => v,
            // Unknown extension: fall back to JSON before giving up.
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| ConfigError::Assets(format!("unsupported asset file: {toml_err}")))?,
        }
    };
    Ok(clean(parsed))
}

fn clean(file: AssetFile) -> AssetUniverse {
    let tickers: BTreeSet<String> = file
        .tickers
        .iter()
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    // Aliases pointing outside the allow-list would resurrect untracked assets.
    let aliases = file
        .aliases
        .into_iter()
        .map(|(n, t)| (n.trim().to_ascii_uppercase(), t.trim().to_ascii_uppercase()))
        .filter(|(n, t)| !n.is_empty() && tickers.contains(t))
        .collect();
    AssetUniverse { tickers, aliases }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn defaults_cover_majors_and_aliases() {
        let u = AssetUniverse::default();
        assert_eq!(u.tickers.len(), 53);
        assert!(u.tickers.contains("1INCH"));
        assert_eq!(u.aliases.get("BITCOIN").map(String::as_str), Some("BTC"));
        assert_eq!(u.aliases.len(), 15);
    }

    #[test]
    fn toml_and_json_are_cleaned() {
        let toml = r#"
            tickers = [" btc ", "", "eth"]
            [aliases]
            bitcoin = "btc"
            dogecoin = "DOGE"
        "#;
        let u = parse_assets(toml, "toml").unwrap();
        assert_eq!(u.tickers.iter().cloned().collect::<Vec<_>>(), vec!["BTC", "ETH"]);
        assert_eq!(u.aliases.len(), 1, "alias to untracked DOGE is dropped");

        let json = r#"{"tickers": ["sol"], "aliases": {"Solana": "SOL"}}"#;
        let u = parse_assets(json, "json").unwrap();
        assert!(u.tickers.contains("SOL"));
        assert_eq!(u.aliases.get("SOLANA").map(String::as_str), Some("SOL"));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PATH);

        // No files in the temp CWD → built-in universe
        assert_eq!(AssetUniverse::load_default().unwrap(), AssetUniverse::default());

        let p = tmp.path().join("mine.json");
        fs::write(&p, r#"{"tickers": ["HYPE"]}"#).unwrap();
        env::set_var(ENV_PATH, p.display().to_string());
        let u = AssetUniverse::load_default().unwrap();
        assert_eq!(u.tickers.len(), 1);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(AssetUniverse::load_default().is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
