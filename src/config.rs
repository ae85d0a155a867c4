use crate::models::TokenPriceQuote;
use anyhow::{bail, Context, Result};
use std::{collections::HashSet, fmt::Display, str::FromStr, time::Duration};

/// Largest decimal count whose power of ten fits in 256 bits.
const MAX_DECIMAL: u8 = 77;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

/// One monitored chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub native_token_symbol: String,
    pub decimal: u8,
    /// Number of most recent blocks averaged per sample.
    pub window_size: u64,
    pub poll_interval: Duration,
    pub rpc_url: String,
    pub rpc_fallback: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    pub redis_url: String,

    pub chains: Vec<ChainConfig>,

    /// Seeded into the price store at start-up.
    pub static_prices: Vec<TokenPriceQuote>,

    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::parse_environment(&lookup)?;

        let chain_ids: Vec<u64> = lookup("CHAIN_IDS")
            .context("CHAIN_IDS required")?
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<u64>()
                    .with_context(|| format!("Invalid chain id {id:?} in CHAIN_IDS"))
            })
            .collect::<Result<_>>()?;

        let chains = chain_ids
            .into_iter()
            .map(|chain_id| Self::parse_chain(&lookup, chain_id))
            .collect::<Result<Vec<_>>>()?;

        let config = Self {
            environment,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,

            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),

            chains,

            static_prices: lookup("STATIC_PRICES")
                .map(|raw| Self::parse_static_prices(&raw))
                .transpose()?
                .unwrap_or_default(),

            shutdown_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment<F>(lookup: &F) -> Result<Environment>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_chain<F>(lookup: &F, chain_id: u64) -> Result<ChainConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("CHAIN_{chain_id}_{name}");

        Ok(ChainConfig {
            chain_id,
            native_token_symbol: lookup(&key("NATIVE_TOKEN")).unwrap_or_else(|| "ETH".to_string()),
            decimal: parse_or(lookup, &key("DECIMAL"), 18)?,
            window_size: parse_or(lookup, &key("WINDOW_SIZE"), 10)?,
            poll_interval: Duration::from_secs(parse_or(lookup, &key("POLL_INTERVAL_SECS"), 15)?),
            rpc_url: lookup(&key("RPC_URL"))
                .with_context(|| format!("{} required", key("RPC_URL")))?,
            rpc_fallback: lookup(&key("RPC_FALLBACK")),
        })
    }

    /// `SYMBOL:price,SYMBOL:price`
    fn parse_static_prices(raw: &str) -> Result<Vec<TokenPriceQuote>> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| -> Result<TokenPriceQuote> {
                let (symbol, price) = entry
                    .split_once(':')
                    .with_context(|| format!("Invalid STATIC_PRICES entry {entry:?}"))?;
                let (symbol, price) = (symbol.trim(), price.trim());
                if symbol.is_empty() {
                    bail!("Empty symbol in STATIC_PRICES entry {entry:?}");
                }
                price
                    .parse::<f64>()
                    .ok()
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .with_context(|| format!("Invalid price in STATIC_PRICES entry {entry:?}"))?;
                Ok(TokenPriceQuote::new(symbol, price))
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            bail!("CHAIN_IDS must name at least one chain");
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                bail!("Chain {} configured twice", chain.chain_id);
            }
            if !chain.rpc_url.starts_with("http") {
                bail!("CHAIN_{}_RPC_URL must be HTTP(S) URL", chain.chain_id);
            }
            if let Some(fallback) = &chain.rpc_fallback {
                if !fallback.starts_with("http") {
                    bail!("CHAIN_{}_RPC_FALLBACK must be HTTP(S) URL", chain.chain_id);
                }
            }
            if chain.window_size == 0 {
                bail!("CHAIN_{}_WINDOW_SIZE must be at least 1", chain.chain_id);
            }
            if chain.poll_interval.is_zero() {
                bail!("CHAIN_{}_POLL_INTERVAL_SECS must be at least 1", chain.chain_id);
            }
            if chain.decimal > MAX_DECIMAL {
                bail!("CHAIN_{}_DECIMAL must be at most {}", chain.chain_id, MAX_DECIMAL);
            }
        }

        tracing::info!(
            "Configuration validated for {:?} environment, {} chain(s)",
            self.environment,
            self.chains.len()
        );

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parses_chains_with_defaults() {
        let config = config_from(&[
            ("CHAIN_IDS", "1, 56"),
            ("CHAIN_1_RPC_URL", "https://eth.example"),
            ("CHAIN_56_RPC_URL", "https://bsc.example"),
            ("CHAIN_56_NATIVE_TOKEN", "BNB"),
            ("CHAIN_56_WINDOW_SIZE", "20"),
            ("CHAIN_56_POLL_INTERVAL_SECS", "3"),
        ])
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 8080);
        assert_eq!(config.chains.len(), 2);

        let eth = &config.chains[0];
        assert_eq!(eth.native_token_symbol, "ETH");
        assert_eq!(eth.decimal, 18);
        assert_eq!(eth.window_size, 10);
        assert_eq!(eth.poll_interval, Duration::from_secs(15));

        let bsc = &config.chains[1];
        assert_eq!(bsc.chain_id, 56);
        assert_eq!(bsc.native_token_symbol, "BNB");
        assert_eq!(bsc.window_size, 20);
        assert_eq!(bsc.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn rejects_zero_window() {
        let err = config_from(&[
            ("CHAIN_IDS", "1"),
            ("CHAIN_1_RPC_URL", "https://eth.example"),
            ("CHAIN_1_WINDOW_SIZE", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("WINDOW_SIZE"));
    }

    #[test]
    fn rejects_duplicate_chains_and_bad_urls() {
        let eth = ("CHAIN_1_RPC_URL", "https://eth.example");
        assert!(config_from(&[("CHAIN_IDS", "1,1"), eth]).is_err());
        let ws = ("CHAIN_1_RPC_URL", "ws://eth.example");
        assert!(config_from(&[("CHAIN_IDS", "1"), ws]).is_err());
        assert!(config_from(&[("CHAIN_IDS", "1")]).is_err());
        assert!(config_from(&[("CHAIN_IDS", "")]).is_err());
    }

    #[test]
    fn parses_static_prices() {
        let config = config_from(&[
            ("CHAIN_IDS", "1"),
            ("CHAIN_1_RPC_URL", "https://eth.example"),
            ("STATIC_PRICES", "ETH:2000.00, USDC:1.00"),
        ])
        .unwrap();

        assert_eq!(
            config.static_prices,
            vec![
                TokenPriceQuote::new("ETH", "2000.00"),
                TokenPriceQuote::new("USDC", "1.00"),
            ]
        );

        assert!(config_from(&[
            ("CHAIN_IDS", "1"),
            ("CHAIN_1_RPC_URL", "https://eth.example"),
            ("STATIC_PRICES", "ETH=2000"),
        ])
        .is_err());
    }
}
