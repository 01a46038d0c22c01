//! Configuration types for a Tapeline exchange and its symbols.
//!
//! Every section deserializes with defaults taken from [`crate::constants`],
//! so a config file only needs to name what it changes.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, Quantity, Result, Symbol, TapelineError};

/// Top-level configuration: the symbols to run plus shared risk and runtime
/// settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub symbols: Vec<SymbolConfig>,
    pub risk: RiskConfig,
    pub runtime: RuntimeConfig,
}

impl ExchangeConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Reject inconsistent values.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(&symbol.symbol) {
                return Err(TapelineError::Configuration(format!(
                    "symbol {} configured twice",
                    symbol.symbol
                )));
            }
            symbol.validate()?;
        }
        self.risk.validate()?;
        self.runtime.validate()
    }

    #[must_use]
    pub fn symbol(&self, symbol: &Symbol) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| &s.symbol == symbol)
    }
}

/// Per-symbol instrument and engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    pub symbol: Symbol,
    /// Human price of one tick.
    pub tick_size: Decimal,
    /// Human quantity of one lot.
    pub lot_size: Decimal,
    /// Prices must be a multiple of this many ticks.
    pub price_increment: u64,
    pub min_quantity: Quantity,
    pub max_quantity: Quantity,
    /// Terminal order ids remembered for duplicate-cancel answers.
    pub terminal_cache_size: usize,
    pub breaker: BreakerConfig,
}

impl SymbolConfig {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.as_str().is_empty() {
            return Err(TapelineError::Configuration("empty symbol".into()));
        }
        if self.tick_size <= Decimal::ZERO || self.lot_size <= Decimal::ZERO {
            return Err(TapelineError::Configuration(format!(
                "{}: tick and lot size must be positive",
                self.symbol
            )));
        }
        if self.min_quantity > self.max_quantity {
            return Err(TapelineError::Configuration(format!(
                "{}: min_quantity {} above max_quantity {}",
                self.symbol, self.min_quantity, self.max_quantity
            )));
        }
        if self.terminal_cache_size == 0 {
            return Err(TapelineError::Configuration(format!(
                "{}: terminal_cache_size must be positive",
                self.symbol
            )));
        }
        self.breaker.validate()
    }
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::new("BTC-USD"),
            tick_size: Decimal::new(1, 2),
            lot_size: Decimal::new(1, 4),
            price_increment: 1,
            min_quantity: Quantity(1),
            max_quantity: Quantity(u64::MAX),
            terminal_cache_size: constants::TERMINAL_CACHE_SIZE,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Volatility circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub enabled: bool,
    /// Maximum relative deviation from the reference, as a fraction (0.10 = 10%).
    pub threshold: Decimal,
    pub window_ms: u64,
    pub cooldown_ms: u64,
    /// Clear the window on resume so the first post-halt print becomes the reference.
    pub reset_reference_on_resume: bool,
}

impl BreakerConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.threshold <= Decimal::ZERO {
            return Err(TapelineError::Configuration(
                "breaker threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: Decimal::new(constants::DEFAULT_BREAKER_THRESHOLD_PCT, 2),
            window_ms: constants::DEFAULT_BREAKER_WINDOW_MS,
            cooldown_ms: constants::DEFAULT_BREAKER_COOLDOWN_MS,
            reset_reference_on_resume: true,
        }
    }
}

/// Pre-trade risk defaults. Ledger snapshots may override the per-account
/// limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Limit prices must lie within this fraction of the reference price.
    pub price_collar: Decimal,
    pub max_open_orders: usize,
    /// Maximum absolute position per account and symbol, in lots.
    pub max_position: u64,
    pub rate_limit_count: usize,
    pub rate_limit_window_ms: u64,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.price_collar <= Decimal::ZERO {
            return Err(TapelineError::Configuration(
                "price collar must be positive".into(),
            ));
        }
        if self.rate_limit_count == 0 || self.rate_limit_window_ms == 0 {
            return Err(TapelineError::Configuration(
                "rate limit count and window must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            price_collar: Decimal::new(constants::DEFAULT_PRICE_COLLAR_PCT, 2),
            max_open_orders: constants::DEFAULT_MAX_OPEN_ORDERS,
            max_position: constants::DEFAULT_MAX_POSITION_LOTS,
            rate_limit_count: constants::ORDER_RATE_LIMIT_COUNT,
            rate_limit_window_ms: constants::ORDER_RATE_LIMIT_WINDOW_MS,
        }
    }
}

/// Channel sizing for the per-symbol runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub command_queue_depth: usize,
    /// Audit writer backlog at which intake answers `Busy`.
    pub audit_watermark: usize,
    pub market_data_capacity: usize,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_queue_depth == 0 || self.audit_watermark == 0 || self.market_data_capacity == 0
        {
            return Err(TapelineError::Configuration(
                "runtime queue sizes must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_depth: constants::DEFAULT_COMMAND_QUEUE_DEPTH,
            audit_watermark: constants::DEFAULT_AUDIT_WATERMARK,
            market_data_capacity: constants::DEFAULT_MARKET_DATA_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut cfg = ExchangeConfig::default();
        cfg.symbols.push(SymbolConfig::new("BTC-USD"));
        cfg.validate().unwrap();
        assert_eq!(cfg.symbols[0].breaker.threshold, Decimal::new(10, 2));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = ExchangeConfig::from_json(
            r#"{"symbols":[{"symbol":"ETH-USD","price_increment":5}],"runtime":{"audit_watermark":8}}"#,
        )
        .unwrap();
        let eth = cfg.symbol(&Symbol::new("ETH-USD")).unwrap();
        assert_eq!(eth.price_increment, 5);
        assert!(eth.breaker.enabled);
        assert_eq!(cfg.runtime.audit_watermark, 8);
        assert_eq!(cfg.runtime.command_queue_depth, constants::DEFAULT_COMMAND_QUEUE_DEPTH);
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let mut cfg = ExchangeConfig::default();
        cfg.symbols.push(SymbolConfig::new("BTC-USD"));
        cfg.symbols.push(SymbolConfig::new("BTC-USD"));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TapelineError::Configuration(_)));
    }

    #[test]
    fn inverted_size_bounds_rejected() {
        let mut sym = SymbolConfig::new("BTC-USD");
        sym.min_quantity = Quantity(10);
        sym.max_quantity = Quantity(5);
        assert!(sym.validate().is_err());
    }

    #[test]
    fn zero_watermark_rejected() {
        let runtime = RuntimeConfig {
            audit_watermark: 0,
            ..RuntimeConfig::default()
        };
        assert!(runtime.validate().is_err());
    }
}
