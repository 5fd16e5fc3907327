pub mod bridge;
pub mod feed;
pub mod journal;
pub mod runner;

pub use bridge::UiBridgeGateway;
pub use feed::MexcPollingFeed;
pub use journal::TradeJournal;
pub use runner::{liquidate_all, TradeRunner};
