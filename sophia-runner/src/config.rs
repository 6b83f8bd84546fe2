//! TOML configuration for backtests and optimizer runs.
//!
//! ```toml
//! initial_cash = 10000.0
//! periods_per_year = 252.0
//!
//! [risk]
//! risk_per_trade = 0.01
//!
//! [[symbols]]
//! symbol = "EURUSD"
//! spread = 0.0001
//! correlation_group = "usd"
//!
//! [strategy]
//! type = "turtle"
//! entry_period = 20
//!
//! [optimizer]
//! metric = "sharpe"
//! method = "grid"
//! [optimizer.grid]
//! entry_period = [10, 20, 30, 40]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use sophia_core::domain::SymbolSpec;
use sophia_core::engine::SimulationConfig;
use sophia_core::params::ConfigError;
use sophia_core::risk::RiskConfig;
use sophia_core::strategy::StrategyConfig;

use crate::fitness::FitnessMetric;
use crate::optimizer::{GeneticConfig, ParamGrid, SearchMethod};

/// Errors reading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn default_initial_cash() -> f64 {
    10_000.0
}

fn default_periods_per_year() -> f64 {
    252.0
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SophiaConfig {
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    /// Bars per year, used to annualize Sharpe, Sortino and CAGR.
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for SophiaConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            periods_per_year: default_periods_per_year(),
            risk: RiskConfig::default(),
            symbols: Vec::new(),
            strategy: StrategyConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SophiaConfig {
    /// Parse and validate.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigFileError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(ConfigError::InvalidRisk {
                field: "periods_per_year",
                reason: format!("must be > 0, got {}", self.periods_per_year),
            });
        }
        self.simulation().validate()?;

        let mut seen = BTreeSet::new();
        for spec in &self.symbols {
            if !seen.insert(spec.symbol.as_str()) {
                return Err(ConfigError::InvalidCombination(format!(
                    "symbol '{}' configured twice",
                    spec.symbol
                )));
            }
        }

        self.strategy.validate()?;
        self.optimizer.validate(&self.strategy)
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            initial_cash: self.initial_cash,
            risk: self.risk.clone(),
            symbols: self.symbols.clone(),
        }
    }

    /// BLAKE3 over the canonical JSON form. Equal configs hash equal.
    pub fn config_hash(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}

fn default_max_combinations() -> usize {
    100
}

/// `[optimizer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub metric: FitnessMetric,
    pub method: SearchMethod,
    /// Grid search evaluates at most this many valid candidates.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Values per parameter. Empty means the strategy's default grid.
    pub grid: ParamGrid,
    pub genetic: GeneticConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            metric: FitnessMetric::default(),
            method: SearchMethod::default(),
            max_combinations: default_max_combinations(),
            threads: None,
            grid: ParamGrid::new(),
            genetic: GeneticConfig::default(),
        }
    }
}

impl OptimizerConfig {
    /// Check limits and that every grid value lies inside its declared domain.
    pub fn validate(&self, strategy: &StrategyConfig) -> Result<(), ConfigError> {
        if self.max_combinations == 0 {
            return Err(ConfigError::InvalidRisk {
                field: "max_combinations",
                reason: "must be >= 1".into(),
            });
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidRisk {
                field: "threads",
                reason: "must be >= 1".into(),
            });
        }

        let kind = strategy.kind();
        let domains = kind.domains();
        for (name, values) in &self.grid {
            let domain = domains.iter().find(|d| &d.name == name).ok_or_else(|| {
                ConfigError::UnknownParameter {
                    strategy: kind.as_str().to_string(),
                    name: name.clone(),
                }
            })?;
            if values.is_empty() {
                return Err(ConfigError::InvalidCombination(format!(
                    "grid for '{name}' has no values"
                )));
            }
            for value in values {
                domain.validate(value)?;
            }
        }
        self.genetic.validate()
    }
}
