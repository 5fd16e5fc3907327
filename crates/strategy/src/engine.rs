use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use common::{
    OrderGateway, PositionSnapshot, PositionView, Side, Tick, TradeKind, TradeRecord, VolumeLedger,
};

use crate::config::StrategyParams;
use crate::ema::EmaTrio;

/// Attempts per requested order before the action is abandoned for the tick.
const MAX_ORDER_ATTEMPTS: u32 = 3;
/// Settle time between a failed attempt and the retry.
const RETRY_DELAY: Duration = Duration::from_millis(300);

/// The tick-driven trading state machine.
///
/// Consumes one tick at a time (never concurrently), maintains EMA and
/// position bookkeeping, and issues at most one order action per tick.
/// Position sizes are tracked in integer lots of `base_unit` and are always
/// overwritten from the observed readback after an order, never assumed
/// from the requested quantity.
pub struct StrategyEngine {
    params: StrategyParams,
    symbol: String,
    seed_usdt: f64,

    ema: EmaTrio,
    // Latest and previous fast/mid values drive crossover detection; the
    // previous values are never persisted beyond one tick.
    fast: Option<f64>,
    mid: Option<f64>,
    slow: Option<f64>,

    long_lots: u32,
    short_lots: u32,
    long_entry: f64,
    short_entry: f64,

    /// Units of the base asset per lot. Zero means "cannot trade": entries
    /// are suppressed until a flat-state recompute produces a positive step.
    base_unit: f64,

    // Repeat guards. A crossover at the same price as the previous one of
    // the same polarity is suppressed exactly once; an unwind in one
    // direction stays blocked until the opposite crossover fires.
    last_golden_price: Option<f64>,
    last_dead_price: Option<f64>,
    unwind_long_blocked: bool,
    unwind_short_blocked: bool,

    view: Arc<dyn PositionView>,
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<RwLock<VolumeLedger>>,
}

impl StrategyEngine {
    pub fn new(
        params: StrategyParams,
        symbol: impl Into<String>,
        seed_usdt: f64,
        view: Arc<dyn PositionView>,
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<RwLock<VolumeLedger>>,
    ) -> Self {
        let ema = EmaTrio::new(params.ema_fast, params.ema_mid, params.ema_slow);
        Self {
            params,
            symbol: symbol.into(),
            seed_usdt,
            ema,
            fast: None,
            mid: None,
            slow: None,
            long_lots: 0,
            short_lots: 0,
            long_entry: 0.0,
            short_entry: 0.0,
            base_unit: 0.0,
            last_golden_price: None,
            last_dead_price: None,
            unwind_long_blocked: false,
            unwind_short_blocked: false,
            view,
            gateway,
            ledger,
        }
    }

    pub fn long_lots(&self) -> u32 {
        self.long_lots
    }

    pub fn short_lots(&self) -> u32 {
        self.short_lots
    }

    pub fn base_unit(&self) -> f64 {
        self.base_unit
    }

    fn is_flat(&self) -> bool {
        self.long_lots == 0 && self.short_lots == 0
    }

    /// Process one tick. Must be called in arrival order, never concurrently.
    ///
    /// EMA and crossover state advance on every tick, paused or not, so the
    /// engine resumes from a warm state after a rest window. When `paused`
    /// is set no order is issued.
    pub async fn on_tick(&mut self, tick: Tick, paused: bool) -> Option<TradeRecord> {
        let (fast, mid, slow) = match tick {
            Tick::Price(p) => {
                if !p.is_finite() || p <= 0.0 {
                    warn!(price = p, "Ignoring non-positive price sample");
                    return None;
                }
                self.ema.update(p)
            }
            Tick::Ema { fast, mid, slow } => {
                if !(fast.is_finite() && mid.is_finite() && slow.is_finite()) {
                    warn!("Ignoring non-finite EMA sample");
                    return None;
                }
                (fast, mid, slow)
            }
        };

        let prev_fast = self.fast.replace(fast);
        let prev_mid = self.mid.replace(mid);
        self.slow = Some(slow);

        trace!(fast, mid, slow, "tick");

        if paused {
            return None;
        }

        // Crossovers need one tick of history.
        let (Some(prev_fast), Some(prev_mid)) = (prev_fast, prev_mid) else {
            return None;
        };

        if self.is_flat() {
            self.update_base_unit(fast);
        }

        // Non-strict, tie-inclusive crossover semantics.
        let golden = prev_fast <= prev_mid && fast >= mid;
        let dead = prev_fast >= prev_mid && fast <= mid;
        let price = fast;

        self.evaluate(price, mid, slow, golden, dead).await
    }

    async fn evaluate(
        &mut self,
        price: f64,
        mid: f64,
        slow: f64,
        golden: bool,
        dead: bool,
    ) -> Option<TradeRecord> {
        if self.is_flat() {
            if mid > slow && golden {
                if self.golden_repeated(price) {
                    info!(price, "Golden cross repeated at same price, skipping once");
                    return None;
                }
                info!(price, "Flat + golden cross with mid > slow: opening long");
                return self.open_lot(Side::Long, price).await;
            }
            if mid < slow && dead {
                if self.dead_repeated(price) {
                    info!(price, "Dead cross repeated at same price, skipping once");
                    return None;
                }
                info!(price, "Flat + dead cross with mid < slow: opening short");
                return self.open_lot(Side::Short, price).await;
            }
            return None;
        }

        let entry_lots = self.params.entry_lots;

        if self.long_lots == entry_lots && self.short_lots == 0 {
            if !dead {
                return None;
            }
            let gain = relative_move(price, self.long_entry);
            if gain >= self.params.price_threshold {
                info!(price, gain, "Long in profit + dead cross: closing long");
                return self.close_full(Side::Long, price).await;
            }
            info!(price, gain, "Long underwater + dead cross: hedging short");
            return self.open_lot(Side::Short, price).await;
        }

        if self.short_lots == entry_lots && self.long_lots == 0 {
            if !golden {
                return None;
            }
            let fall = relative_move(price, self.short_entry);
            if fall <= -self.params.price_threshold {
                info!(price, fall, "Short in profit + golden cross: closing short");
                return self.close_full(Side::Short, price).await;
            }
            info!(price, fall, "Short underwater + golden cross: hedging long");
            return self.open_lot(Side::Long, price).await;
        }

        // Hedged regime (also covers desynced leftovers): crossovers unwind
        // the opposing side in small steps until both decay to zero.
        if golden {
            if self.golden_repeated(price) {
                info!(price, "Golden cross repeated at same price in hedge, skipping once");
                return None;
            }
            self.unwind_long_blocked = false;
            return self.unwind(Side::Short, price).await;
        }
        if dead {
            if self.dead_repeated(price) {
                info!(price, "Dead cross repeated at same price in hedge, skipping once");
                return None;
            }
            self.unwind_short_blocked = false;
            return self.unwind(Side::Long, price).await;
        }
        None
    }

    // ── Sizing ───────────────────────────────────────────────────────────

    /// Recompute the lot scalar from the seed and the current reference
    /// price, floored to the symbol's minimum step. Only called while flat.
    fn update_base_unit(&mut self, reference_price: f64) {
        if self.seed_usdt <= 0.0 || reference_price <= 0.0 {
            return;
        }
        let raw = (self.seed_usdt * 0.2) / reference_price;
        let min_step = self.params.min_step_for(&self.symbol);
        let floored = (raw / min_step).floor() * min_step;

        if floored <= 0.0 {
            warn!(
                seed = self.seed_usdt,
                price = reference_price,
                "base_unit computed as zero; entries disabled until conditions change"
            );
            self.base_unit = 0.0;
            return;
        }
        if (floored - self.base_unit).abs() > f64::EPSILON {
            trace!(base_unit = floored, min_step, "base_unit updated");
        }
        self.base_unit = floored;
    }

    fn lots(&self, side: Side) -> u32 {
        match side {
            Side::Long => self.long_lots,
            Side::Short => self.short_lots,
        }
    }

    /// Overwrite internal lot counters with the observed readback. The view
    /// is ground truth; requested quantities are never trusted.
    async fn sync_with_view(&mut self) {
        let snap = PositionSnapshot::from_positions(&self.view.open_positions().await);
        if self.base_unit > 0.0 {
            self.long_lots = to_lots(snap.long, self.base_unit);
            self.short_lots = to_lots(snap.short, self.base_unit);
        } else {
            self.long_lots = 0;
            self.short_lots = 0;
        }
        trace!(
            long = snap.long,
            short = snap.short,
            long_lots = self.long_lots,
            short_lots = self.short_lots,
            "position readback"
        );
    }

    // ── Repeat guards ────────────────────────────────────────────────────

    /// True when this golden cross fires at the exact price of the previous
    /// one. Suppressed exactly once: the stored price is cleared so a
    /// recovered feed is not wedged forever. Exact float equality is the
    /// point: a stalled feed repeats the identical value.
    fn golden_repeated(&mut self, price: f64) -> bool {
        if self.last_golden_price == Some(price) {
            self.last_golden_price = None;
            true
        } else {
            self.last_golden_price = Some(price);
            false
        }
    }

    fn dead_repeated(&mut self, price: f64) -> bool {
        if self.last_dead_price == Some(price) {
            self.last_dead_price = None;
            true
        } else {
            self.last_dead_price = Some(price);
            false
        }
    }

    // ── Order actions ────────────────────────────────────────────────────

    /// Open a full entry lot. Retries the place/readback cycle up to
    /// `MAX_ORDER_ATTEMPTS`; succeeds only once the observed size confirms
    /// the full lot, otherwise abandons until the next tick.
    async fn open_lot(&mut self, side: Side, price: f64) -> Option<TradeRecord> {
        if self.base_unit <= 0.0 {
            debug!("base_unit is zero, entry suppressed this tick");
            return None;
        }
        let lots = self.params.entry_lots;
        let qty = self.base_unit * f64::from(lots);

        for attempt in 1..=MAX_ORDER_ATTEMPTS {
            let accepted = self.gateway.place_open(side, qty).await;
            self.sync_with_view().await;

            if accepted && self.lots(side) >= lots {
                self.ledger.write().await.add_notional(price * qty);
                let hedged = self.lots(side.opposite()) > 0;
                let kind = match (side, hedged) {
                    (Side::Long, false) => TradeKind::OpenLong,
                    (Side::Long, true) => TradeKind::HedgeLong,
                    (Side::Short, false) => TradeKind::OpenShort,
                    (Side::Short, true) => TradeKind::HedgeShort,
                };
                match side {
                    Side::Long => self.long_entry = price,
                    Side::Short => self.short_entry = price,
                }
                info!(%side, qty, price, %kind, "Entry filled");
                return Some(TradeRecord {
                    kind,
                    entry_price: price,
                    close_price: price,
                });
            }
            warn!(
                %side,
                attempt,
                max = MAX_ORDER_ATTEMPTS,
                observed = self.lots(side),
                "Entry not confirmed by readback, retrying"
            );
            tokio::time::sleep(RETRY_DELAY).await;
        }
        error!(%side, "Entry abandoned after max attempts; next tick re-evaluates from true state");
        None
    }

    /// Close a full entry lot from a one-sided position.
    async fn close_full(&mut self, side: Side, price: f64) -> Option<TradeRecord> {
        let lots = self.params.entry_lots;
        if self.lots(side) < lots {
            debug!(%side, observed = self.lots(side), "Full close skipped, size below entry lot");
            return None;
        }
        let qty = self.base_unit * f64::from(lots);
        let entry = match side {
            Side::Long => self.long_entry,
            Side::Short => self.short_entry,
        };

        for attempt in 1..=MAX_ORDER_ATTEMPTS {
            let accepted = self.gateway.place_close(side, qty).await;
            self.sync_with_view().await;

            if accepted && self.lots(side) == 0 {
                let pnl = directional_pnl(side, entry, price, qty);
                {
                    let mut ledger = self.ledger.write().await;
                    ledger.add_notional(price * qty);
                    ledger.add_realized_pnl(pnl);
                }
                let kind = match side {
                    Side::Long => {
                        self.long_entry = 0.0;
                        TradeKind::LongClosed
                    }
                    Side::Short => {
                        self.short_entry = 0.0;
                        TradeKind::ShortClosed
                    }
                };
                info!(%side, qty, price, pnl, "Position fully closed");
                return Some(TradeRecord {
                    kind,
                    entry_price: entry,
                    close_price: price,
                });
            }
            warn!(
                %side,
                attempt,
                max = MAX_ORDER_ATTEMPTS,
                leftover = self.lots(side),
                "Close not confirmed by readback, retrying"
            );
            tokio::time::sleep(RETRY_DELAY).await;
        }
        error!(%side, leftover = self.lots(side), "Close abandoned after max attempts, leftover may remain");
        None
    }

    /// Partially unwind one side of a hedge by `min(unwind_lots, remaining)`.
    /// The requested quantity is placed with bounded retries, but the amount
    /// actually booked comes from the before/after readback delta.
    async fn unwind(&mut self, side: Side, price: f64) -> Option<TradeRecord> {
        let blocked = match side {
            Side::Long => self.unwind_long_blocked,
            Side::Short => self.unwind_short_blocked,
        };
        if blocked {
            info!(%side, "Unwind blocked until the opposite crossover fires");
            return None;
        }

        let before = self.lots(side);
        if before == 0 || self.base_unit <= 0.0 {
            debug!(%side, "Nothing to unwind");
            return None;
        }
        let step = self.params.unwind_lots.min(before);
        let qty = self.base_unit * f64::from(step);

        for attempt in 1..=MAX_ORDER_ATTEMPTS {
            if self.gateway.place_close(side, qty).await {
                break;
            }
            warn!(%side, attempt, max = MAX_ORDER_ATTEMPTS, "Unwind order rejected, retrying");
            tokio::time::sleep(RETRY_DELAY).await;
        }
        self.sync_with_view().await;

        let closed = before.saturating_sub(self.lots(side));
        if closed == 0 {
            warn!(%side, "Unwind produced no observed fill this tick");
            return None;
        }

        let closed_qty = self.base_unit * f64::from(closed);
        let entry = match side {
            Side::Long => self.long_entry,
            Side::Short => self.short_entry,
        };
        let pnl = directional_pnl(side, entry, price, closed_qty);
        {
            let mut ledger = self.ledger.write().await;
            ledger.add_notional(price * closed_qty);
            ledger.add_realized_pnl(pnl);
        }

        let kind = if self.lots(side) == 0 {
            match side {
                Side::Long => {
                    self.long_entry = 0.0;
                    TradeKind::LongFlat
                }
                Side::Short => {
                    self.short_entry = 0.0;
                    TradeKind::ShortFlat
                }
            }
        } else {
            match side {
                Side::Long => TradeKind::LongUnwound,
                Side::Short => TradeKind::ShortUnwound,
            }
        };
        match side {
            Side::Long => self.unwind_long_blocked = true,
            Side::Short => self.unwind_short_blocked = true,
        }
        info!(%side, closed, leftover = self.lots(side), price, pnl, "Hedge step unwound");
        Some(TradeRecord {
            kind,
            entry_price: entry,
            close_price: price,
        })
    }
}

fn relative_move(price: f64, entry: f64) -> f64 {
    if entry > 0.0 {
        (price - entry) / entry
    } else {
        0.0
    }
}

fn directional_pnl(side: Side, entry: f64, close: f64, qty: f64) -> f64 {
    match side {
        Side::Long => (close - entry) * qty,
        Side::Short => (entry - close) * qty,
    }
}

fn to_lots(size: f64, base_unit: f64) -> u32 {
    let lots = (size / base_unit).round();
    if lots.is_finite() && lots > 0.0 {
        lots as u32
    } else {
        0
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
