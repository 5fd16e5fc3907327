use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use common::{OrderGateway, PositionView, SessionDriver, Tick};
use risk::PacingController;
use strategy::StrategyEngine;

/// Serializes the whole trading core onto one task.
///
/// Owns the strategy engine and the pacing controller exclusively, so no
/// tick is ever processed concurrently with another. Ticks that arrive
/// while an order sequence is in flight pile up in the channel and the
/// stale ones are simply processed late; slow order execution throttles
/// the cadence by itself.
pub struct TradeRunner {
    strategy: StrategyEngine,
    pacer: PacingController,
    tick_rx: mpsc::Receiver<Tick>,
    gateway: Arc<dyn OrderGateway>,
    session: Arc<dyn SessionDriver>,
    session_check_interval: Duration,
    session_ok: bool,
}

impl TradeRunner {
    pub fn new(
        strategy: StrategyEngine,
        pacer: PacingController,
        tick_rx: mpsc::Receiver<Tick>,
        gateway: Arc<dyn OrderGateway>,
        session: Arc<dyn SessionDriver>,
        session_check_interval: Duration,
    ) -> Self {
        Self {
            strategy,
            pacer,
            tick_rx,
            gateway,
            session,
            session_check_interval,
            session_ok: true,
        }
    }

    /// Run the core loop until the tick channel closes.
    pub async fn run(mut self) {
        info!("TradeRunner running");
        let mut session_check = tokio::time::interval(self.session_check_interval);
        session_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                tick = self.tick_rx.recv() => {
                    match tick {
                        Some(tick) => self.handle_tick(tick).await,
                        None => {
                            warn!("Tick channel closed, TradeRunner exiting");
                            return;
                        }
                    }
                }
                _ = session_check.tick() => self.check_session().await,
            }
        }
    }

    async fn handle_tick(&mut self, tick: Tick) {
        self.gateway.clear_obstructions().await;

        // A lost session is an implicit pause on top of the pacer's own
        // windows. EMA state keeps advancing either way.
        let paused = !self.session_ok || self.pacer.is_paused();
        if let Some(record) = self.strategy.on_tick(tick, paused).await {
            self.pacer.on_trade(&record).await;
        }
        if !paused {
            self.pacer.check_schedule().await;
        }
    }

    async fn check_session(&mut self) {
        if self.session.is_authenticated().await {
            if !self.session_ok {
                info!("Session restored, trading resumes");
            }
            self.session_ok = true;
            return;
        }
        warn!("Session lost, attempting re-login");
        self.session_ok = self.session.reauthenticate().await;
        if !self.session_ok {
            warn!("Re-login failed, trading stays paused");
        }
    }
}

/// Close out every open position, best effort. Used at startup to begin
/// from a clean book and at shutdown regardless of any active pause.
pub async fn liquidate_all(view: &Arc<dyn PositionView>, gateway: &Arc<dyn OrderGateway>) -> bool {
    let positions = view.open_positions().await;
    if positions.is_empty() {
        return true;
    }
    let mut all_closed = true;
    for position in positions {
        info!(side = %position.side, size = position.size, "Liquidating position");
        if !gateway.place_close(position.side, position.size).await {
            warn!(side = %position.side, size = position.size, "Liquidation order failed");
            all_closed = false;
        }
    }
    all_closed
}
