use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Strategy parameter file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [params]
/// ema_fast = 1
/// ema_mid = 3
/// ema_slow = 7
/// price_threshold = 0.0005
/// entry_lots = 50
/// unwind_lots = 2
///
/// [min_step]
/// BTC_USDT = 0.0001
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFile {
    pub params: StrategyParams,
    /// Exchange minimum order increments per symbol.
    #[serde(default)]
    pub min_step: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyParams {
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    /// Move against/for the entry (as a fraction) that a crossover must
    /// clear to close instead of hedge.
    pub price_threshold: f64,
    /// Initial directional entry, in lots of base_unit.
    pub entry_lots: u32,
    /// Per-crossover hedge unwind step, in lots of base_unit.
    pub unwind_lots: u32,
    #[serde(skip)]
    min_step: HashMap<String, f64>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ema_fast: 1,
            ema_mid: 3,
            ema_slow: 7,
            price_threshold: 0.0005,
            entry_lots: 50,
            unwind_lots: 2,
            min_step: HashMap::new(),
        }
    }
}

impl StrategyParams {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read strategy config at '{path}': {e}"));
        let file: StrategyFile = toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse strategy config at '{path}': {e}"));
        let mut params = file.params;
        params.min_step = file.min_step;
        params
    }

    /// Minimum order increment for a symbol, used to floor base_unit.
    pub fn min_step_for(&self, symbol: &str) -> f64 {
        self.min_step.get(symbol).copied().unwrap_or(0.0001)
    }

    #[doc(hidden)]
    pub fn with_min_step(mut self, symbol: &str, step: f64) -> Self {
        self.min_step.insert(symbol.to_string(), step);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let toml_src = r#"
            [params]
            ema_fast = 1
            ema_mid = 3
            ema_slow = 7
            price_threshold = 0.0005
            entry_lots = 50
            unwind_lots = 2

            [min_step]
            BTC_USDT = 0.0001
            ETH_USDT = 0.01
        "#;
        let file: StrategyFile = toml::from_str(toml_src).unwrap();
        let mut params = file.params;
        params.min_step = file.min_step;
        assert_eq!(params.entry_lots, 50);
        assert_eq!(params.min_step_for("ETH_USDT"), 0.01);
        // Unknown symbols fall back to the tightest step.
        assert_eq!(params.min_step_for("DOGE_USDT"), 0.0001);
    }
}
