use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::api::Credentials;
use crate::models::SymbolConfig;
use crate::stream::ReconnectPolicy;

pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
pub const API_SECRET_ENV: &str = "BINANCE_API_SECRET";
const ENV_PREFIX: &str = "STRIKEBOT";
const PLACEHOLDER_MARKER: &str = "YOUR_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0} is not set; export it or add it to .env")]
    MissingCredential(&'static str),
    #[error("{0} still holds a placeholder value")]
    PlaceholderCredential(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Live exchange or the public testnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Live,
    Testnet,
}

impl Network {
    pub fn rest_url(self) -> &'static str {
        match self {
            Self::Live => "https://api.binance.com",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }

    pub fn ws_url(self) -> &'static str {
        match self {
            Self::Live => "wss://stream.binance.com:9443/ws",
            Self::Testnet => "wss://testnet.binance.vision/ws",
        }
    }
}

/// REST client tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestSettings {
    pub timeout_secs: u64,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub max_retries: u32, // Idempotent reads only
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            recv_window_ms: 5000,
            requests_per_minute: 1200,
            max_retries: 3,
        }
    }
}

/// Wait applied before each resubscribe
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReconnectSettings {
    Fixed {
        #[serde(default = "default_close_delay")]
        close_delay_secs: f64,
        #[serde(default = "default_error_delay")]
        error_delay_secs: f64,
    },
    Exponential {
        base_delay_secs: f64,
        max_delay_secs: f64,
        #[serde(default)]
        jitter_ms: u64,
    },
}

fn default_close_delay() -> f64 {
    5.0
}

fn default_error_delay() -> f64 {
    10.0
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self::Fixed {
            close_delay_secs: default_close_delay(),
            error_delay_secs: default_error_delay(),
        }
    }
}

impl ReconnectSettings {
    pub fn to_policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let policy = match *self {
            Self::Fixed {
                close_delay_secs,
                error_delay_secs,
            } => ReconnectPolicy::fixed(
                secs_to_duration("reconnect.close_delay_secs", close_delay_secs)?,
                secs_to_duration("reconnect.error_delay_secs", error_delay_secs)?,
            ),
            Self::Exponential {
                base_delay_secs,
                max_delay_secs,
                jitter_ms,
            } => ReconnectPolicy::exponential(
                secs_to_duration("reconnect.base_delay_secs", base_delay_secs)?,
                secs_to_duration("reconnect.max_delay_secs", max_delay_secs)?,
                Duration::from_millis(jitter_ms),
            ),
        };
        Ok(policy)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let delays: &[f64] = match self {
            Self::Fixed {
                close_delay_secs,
                error_delay_secs,
            } => &[*close_delay_secs, *error_delay_secs],
            Self::Exponential {
                base_delay_secs,
                max_delay_secs,
                ..
            } => {
                if max_delay_secs < base_delay_secs {
                    return Err(ConfigError::Invalid(
                        "reconnect.max_delay_secs must be >= base_delay_secs".to_string(),
                    ));
                }
                &[*base_delay_secs, *max_delay_secs]
            }
        };

        if delays.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(ConfigError::Invalid(
                "reconnect delays must be positive".to_string(),
            ));
        }
        self.to_policy().map(|_| ())
    }
}

/// Seconds as a `Duration`; negative, non-finite and out-of-range values are rejected
fn secs_to_duration(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::Invalid(format!("{} is not a usable number of seconds: {}", key, secs))
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SymbolOverride {
    pub min_secs_between_actions: Option<f64>,
    pub quote_amount: Option<Decimal>,
}

/// Everything the bot reads at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub quote_amount: Decimal,
    pub min_secs_between_actions: f64,
    pub symbol_overrides: BTreeMap<String, SymbolOverride>,
    pub network: Network,
    pub kline_interval: String,
    pub log_file: String,
    pub shutdown_grace_secs: u64,
    pub reconnect: ReconnectSettings,
    pub rest: RestSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "BNBUSDT".to_string(),
            ],
            quote_amount: Decimal::new(12, 0),
            min_secs_between_actions: 1.0,
            symbol_overrides: BTreeMap::new(),
            network: Network::Live,
            kline_interval: "1m".to_string(),
            log_file: "bot_log.txt".to_string(),
            shutdown_grace_secs: 30,
            reconnect: ReconnectSettings::default(),
            rest: RestSettings::default(),
        }
    }
}

impl BotConfig {
    /// Load from an optional TOML file overlaid with `STRIKEBOT__*` variables
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: BotConfig = settings.try_deserialize()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse from an inline TOML document
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;

        let mut config: BotConfig = settings.try_deserialize()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Upper-case and de-duplicate symbols, keeping first occurrence order
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        self.symbol_overrides = std::mem::take(&mut self.symbol_overrides)
            .into_iter()
            .map(|(symbol, o)| (symbol.to_uppercase(), o))
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols configured".to_string()));
        }
        if self.quote_amount <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "quote_amount must be positive".to_string(),
            ));
        }
        secs_to_duration("min_secs_between_actions", self.min_secs_between_actions)?;
        for (symbol, o) in &self.symbol_overrides {
            if let Some(secs) = o.min_secs_between_actions {
                secs_to_duration(
                    &format!("symbol_overrides.{}.min_secs_between_actions", symbol),
                    secs,
                )?;
            }
            if matches!(o.quote_amount, Some(q) if q <= Decimal::ZERO) {
                return Err(ConfigError::Invalid(format!(
                    "symbol_overrides.{}.quote_amount must be positive",
                    symbol
                )));
            }
        }
        if self.kline_interval.trim().is_empty() {
            return Err(ConfigError::Invalid("kline_interval is empty".to_string()));
        }
        self.reconnect.validate()
    }

    /// Engine parameters for one symbol, with overrides applied
    pub fn symbol_config(&self, symbol: &str) -> Result<SymbolConfig, ConfigError> {
        let overrides = self.symbol_overrides.get(symbol);
        let min_secs = overrides
            .and_then(|o| o.min_secs_between_actions)
            .unwrap_or(self.min_secs_between_actions);
        let quote_amount = overrides
            .and_then(|o| o.quote_amount)
            .unwrap_or(self.quote_amount);

        let min_time = secs_to_duration("min_secs_between_actions", min_secs)?;
        Ok(SymbolConfig::new(symbol, quote_amount, min_time))
    }

    pub fn symbol_configs(&self) -> Result<Vec<SymbolConfig>, ConfigError> {
        self.symbols
            .iter()
            .map(|symbol| self.symbol_config(symbol))
            .collect()
    }
}

/// Read API credentials from the environment
pub fn credentials_from_env() -> Result<Credentials, ConfigError> {
    credentials_from(|name| std::env::var(name).ok())
}

fn credentials_from<F>(lookup: F) -> Result<Credentials, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let read = |name: &'static str| -> Result<String, ConfigError> {
        let value = lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential(name))?;

        if value.contains(PLACEHOLDER_MARKER) {
            return Err(ConfigError::PlaceholderCredential(name));
        }
        Ok(value)
    };

    Ok(Credentials {
        api_key: read(API_KEY_ENV)?,
        api_secret: read(API_SECRET_ENV)?,
    })
}
