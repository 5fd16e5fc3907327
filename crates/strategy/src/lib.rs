pub mod config;
pub mod ema;
pub mod engine;

pub use config::StrategyParams;
pub use ema::EmaTrio;
pub use engine::StrategyEngine;
