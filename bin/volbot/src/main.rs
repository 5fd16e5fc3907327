use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{auth, Config, OrderGateway, PositionView, SessionDriver, Tick, TradingMode, VolumeLedger};
use engine::{liquidate_all, MexcPollingFeed, TradeJournal, TradeRunner, UiBridgeGateway};
use paper::PaperBroker;
use risk::{PacerConfig, PacingController, SystemClock};
use strategy::{StrategyEngine, StrategyParams};

const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const LEDGER_RESET_HOUR: u32 = 15;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config & gates ───────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, symbol = %cfg.symbol, "VolBot starting");

    let today = Local::now().date_naive();
    if let Err(e) = auth::check_expiry(today) {
        panic!("Startup gate failed: {e}");
    }
    if let Err(e) = auth::check_uid(&cfg.uid, &cfg.allowed_uids) {
        panic!("Startup gate failed: {e}");
    }

    let params = StrategyParams::load(&cfg.strategy_config_path);
    let ledger = Arc::new(RwLock::new(VolumeLedger::new()));

    // ── Backend (injected based on TRADING_MODE) ─────────────────────────────
    let (view, gateway, session): (
        Arc<dyn PositionView>,
        Arc<dyn OrderGateway>,
        Arc<dyn SessionDriver>,
    ) = match cfg.trading_mode {
        TradingMode::Live => {
            info!(driver = %cfg.driver_url, "Live mode, driving the UI bridge");
            let bridge = Arc::new(UiBridgeGateway::new(&cfg.driver_url));
            (bridge.clone(), bridge.clone(), bridge)
        }
        TradingMode::Paper => {
            info!("Paper mode, in-memory broker");
            let broker = Arc::new(PaperBroker::new());
            (broker.clone(), broker.clone(), broker)
        }
    };

    // Begin from a clean book.
    liquidate_all(&view, &gateway).await;

    // ── Core ─────────────────────────────────────────────────────────────────
    let strategy = StrategyEngine::new(
        params,
        cfg.symbol.clone(),
        cfg.seed_usdt,
        view.clone(),
        gateway.clone(),
        ledger.clone(),
    );
    let pacer = PacingController::new(
        PacerConfig::default(),
        cfg.seed_usdt,
        Arc::new(SystemClock),
        view.clone(),
        gateway.clone(),
        ledger.clone(),
    );

    let (tick_tx, tick_rx) = mpsc::channel::<Tick>(256);
    let feed = MexcPollingFeed::new(
        cfg.symbol.clone(),
        Duration::from_millis(cfg.poll_interval_ms),
        tick_tx,
    );
    let journal = TradeJournal::new(&cfg.journal_path, ledger.clone(), LEDGER_RESET_HOUR);
    let runner = TradeRunner::new(
        strategy,
        pacer,
        tick_rx,
        gateway.clone(),
        session,
        SESSION_CHECK_INTERVAL,
    );

    tokio::spawn(feed.run());
    tokio::spawn(journal.run());
    tokio::spawn(runner.run());

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .unwrap_or_else(|e| panic!("Failed to listen for shutdown signal: {e}"));

    // Forced shutdown liquidates regardless of any active pause.
    info!("Shutdown signal received, liquidating");
    liquidate_all(&view, &gateway).await;
    info!("Exiting");
}
