use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::{
    OrderGateway, PositionSnapshot, PositionView, TradeRecord, VolumeLedger,
};

use crate::clock::Clock;

/// User-configurable pacing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Shortest mandatory rest, in seconds.
    pub rest_min_secs: u64,
    /// Longest mandatory rest, in seconds.
    pub rest_max_secs: u64,
    /// Trading time without a rest after which a flat book forces one.
    pub stale_after_secs: u64,
    /// Consecutive full-lot round trips that arm the scalp-pattern rule.
    pub scalp_trigger: u32,
    /// Relative price band for the scalp-pattern hedge check.
    pub scalp_price_band: f64,
    /// Local hour after which the daily target no longer pauses.
    pub target_cutoff_hour: u32,
    /// Daily notional target is `seed * volume_per_seed * target_multiplier`.
    pub volume_per_seed: f64,
    pub target_multiplier: f64,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            rest_min_secs: 600,
            rest_max_secs: 900,
            stale_after_secs: 90 * 60,
            scalp_trigger: 3,
            scalp_price_band: 0.0005,
            target_cutoff_hour: 15,
            volume_per_seed: 1000.0,
            target_multiplier: 1.2,
        }
    }
}

/// Why the current pause window was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    HedgeFlattened,
    ScalpPattern,
    Stale,
    DailyTarget,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PauseReason::HedgeFlattened => "hedge-flattened",
            PauseReason::ScalpPattern => "scalp-pattern",
            PauseReason::Stale => "stale",
            PauseReason::DailyTarget => "daily-target",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
struct PauseWindow {
    until: DateTime<Local>,
    reason: PauseReason,
}

/// Rest-window and volume-target gatekeeper.
///
/// Consumes the trade records the strategy engine emits and decides when
/// trading must stop for a while. Only one pause window exists at a time;
/// a new decision overwrites it, never queues behind it. Every pause first
/// force-liquidates whatever is still open, and a liquidation that leaves
/// residue skips the timer with a warning so the book is never parked
/// half-open behind a rest window.
pub struct PacingController {
    cfg: PacerConfig,
    clock: Arc<dyn Clock>,
    view: Arc<dyn PositionView>,
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<RwLock<VolumeLedger>>,
    daily_target: f64,
    pause: Option<PauseWindow>,
    last_rest: DateTime<Local>,
    /// Hedge-unwind tracking: set on hedge entry, armed sides cleared on
    /// the rest that follows full unwind.
    hedge_seen: bool,
    long_flattened: bool,
    short_flattened: bool,
    /// Scalp-pattern tracking.
    scalp_count: u32,
    last_close_price: Option<f64>,
}

impl PacingController {
    pub fn new(
        cfg: PacerConfig,
        seed_usdt: f64,
        clock: Arc<dyn Clock>,
        view: Arc<dyn PositionView>,
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<RwLock<VolumeLedger>>,
    ) -> Self {
        let daily_target = seed_usdt * cfg.volume_per_seed * cfg.target_multiplier;
        let now = clock.now();
        info!(daily_target, "PacingController initialized");
        Self {
            cfg,
            clock,
            view,
            gateway,
            ledger,
            daily_target,
            pause: None,
            last_rest: now,
            hedge_seen: false,
            long_flattened: false,
            short_flattened: false,
            scalp_count: 0,
            last_close_price: None,
        }
    }

    /// Whether a pause window is currently active. Expires the window
    /// lazily on the first query past its end time.
    pub fn is_paused(&mut self) -> bool {
        if let Some(window) = self.pause {
            if self.clock.now() >= window.until {
                info!(reason = %window.reason, "Pause window expired, trading resumes");
                self.pause = None;
            }
        }
        self.pause.is_some()
    }

    /// Feed one trade record through the pacing rules.
    pub async fn on_trade(&mut self, record: &TradeRecord) {
        if self.hedge_flat_rule(record).await {
            return;
        }
        self.scalp_rule(record).await;
    }

    /// Clock-driven rules, evaluated every tick by the driver: staleness
    /// and the pre-cutoff daily volume target.
    pub async fn check_schedule(&mut self) {
        if self.pause.is_some() {
            return;
        }
        let now = self.clock.now();
        let stale = ChronoDuration::seconds(self.cfg.stale_after_secs as i64);
        if now - self.last_rest >= stale && self.snapshot().await.is_flat() {
            info!("No rest for too long while flat, forcing one");
            self.begin_rest(PauseReason::Stale).await;
            return;
        }
        self.check_daily_target().await;
    }

    /// Rule: once a hedge has fully unwound on both sides, rest.
    async fn hedge_flat_rule(&mut self, record: &TradeRecord) -> bool {
        if record.kind.is_hedge_entry() {
            self.hedge_seen = true;
            self.long_flattened = false;
            self.short_flattened = false;
            return false;
        }
        if let Some(side) = record.kind.flattened_side() {
            if self.hedge_seen {
                match side {
                    common::Side::Long => self.long_flattened = true,
                    common::Side::Short => self.short_flattened = true,
                }
            }
        }
        if self.hedge_seen && self.long_flattened && self.short_flattened {
            info!("Hedge unwound to flat on both sides, resting");
            if self.begin_rest(PauseReason::HedgeFlattened).await {
                self.hedge_seen = false;
                self.long_flattened = false;
                self.short_flattened = false;
                return true;
            }
        }
        false
    }

    /// Rule: repeated full-lot scalps followed by a hedge near the last
    /// close price look like a bot signature. Break the rhythm.
    async fn scalp_rule(&mut self, record: &TradeRecord) {
        if record.kind.is_full_lot_close() {
            self.scalp_count += 1;
            self.last_close_price = Some(record.close_price);
            return;
        }
        if record.kind.is_hedge_entry() && self.scalp_count >= self.cfg.scalp_trigger {
            if let Some(last) = self.last_close_price {
                if last > 0.0
                    && ((record.close_price - last) / last).abs() < self.cfg.scalp_price_band
                {
                    info!(
                        count = self.scalp_count,
                        last_close = last,
                        "Repeating scalp pattern detected, resting"
                    );
                    self.scalp_count = 0;
                    self.last_close_price = None;
                    self.begin_rest(PauseReason::ScalpPattern).await;
                }
            }
        }
    }

    /// Rule: before the cutoff hour, hitting the daily notional target with
    /// a flat book pauses until a random instant inside the cutoff hour.
    pub async fn check_daily_target(&mut self) {
        let now = self.clock.now();
        if now.hour() >= self.cfg.target_cutoff_hour {
            return;
        }
        let volume = self.ledger.read().await.accumulated_notional();
        if volume < self.daily_target {
            return;
        }
        if !self.snapshot().await.is_flat() {
            return;
        }
        self.force_flatten().await;
        let (minute, second) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0..60u32), rng.gen_range(0..60u32))
        };
        let until = now
            .date_naive()
            .and_hms_opt(self.cfg.target_cutoff_hour, minute, second)
            .and_then(|naive| naive.and_local_timezone(Local).single())
            .unwrap_or_else(|| now + ChronoDuration::hours(1));
        info!(volume, target = self.daily_target, %until, "Daily volume target reached, pausing into the afternoon");
        self.pause = Some(PauseWindow {
            until,
            reason: PauseReason::DailyTarget,
        });
        self.last_rest = now;
    }

    /// Liquidate, confirm flat, then start a uniformly random rest window.
    /// Returns false (and starts no timer) when residue survives the
    /// liquidation attempt.
    async fn begin_rest(&mut self, reason: PauseReason) -> bool {
        self.force_flatten().await;
        let snap = self.stable_snapshot().await;
        if !snap.is_flat() {
            warn!(
                long = snap.long,
                short = snap.short,
                %reason,
                "Leftover position survived liquidation, rest timer skipped"
            );
            return false;
        }
        let secs = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.cfg.rest_min_secs..=self.cfg.rest_max_secs)
        };
        let now = self.clock.now();
        self.pause = Some(PauseWindow {
            until: now + ChronoDuration::seconds(secs as i64),
            reason,
        });
        self.last_rest = now;
        info!(%reason, secs, "Rest window started");
        true
    }

    /// Best-effort close of everything currently open.
    async fn force_flatten(&self) {
        let snap = self.snapshot().await;
        if snap.long > 0.0 && !self.gateway.place_close(common::Side::Long, snap.long).await {
            warn!(size = snap.long, "Failed to liquidate long side");
        }
        if snap.short > 0.0 && !self.gateway.place_close(common::Side::Short, snap.short).await {
            warn!(size = snap.short, "Failed to liquidate short side");
        }
    }

    async fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot::from_positions(&self.view.open_positions().await)
    }

    /// Two spaced readbacks; the second one wins. Guards against a stale
    /// first read right after order placement.
    async fn stable_snapshot(&self) -> PositionSnapshot {
        let _ = self.snapshot().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use common::{Side, TradeKind};
    use paper::PaperBroker;

    struct ManualClock(Mutex<DateTime<Local>>);

    impl ManualClock {
        fn at(hour: u32, minute: u32) -> Arc<Self> {
            let t = Local.with_ymd_and_hms(2024, 5, 14, hour, minute, 0).unwrap();
            Arc::new(Self(Mutex::new(t)))
        }

        fn advance(&self, d: ChronoDuration) {
            let mut t = self.0.lock().unwrap();
            *t += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().unwrap()
        }
    }

    fn record(kind: TradeKind, entry: f64, close: f64) -> TradeRecord {
        TradeRecord {
            kind,
            entry_price: entry,
            close_price: close,
        }
    }

    fn make_pacer(
        seed: f64,
        clock: Arc<ManualClock>,
    ) -> (PacingController, Arc<PaperBroker>, Arc<RwLock<VolumeLedger>>) {
        let broker = Arc::new(PaperBroker::new());
        let ledger = Arc::new(RwLock::new(VolumeLedger::new()));
        let pacer = PacingController::new(
            PacerConfig::default(),
            seed,
            clock,
            broker.clone(),
            broker.clone(),
            ledger.clone(),
        );
        (pacer, broker, ledger)
    }

    #[tokio::test]
    async fn hedge_unwound_to_flat_starts_rest_in_bounds() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, _) = make_pacer(1_000.0, clock.clone());

        pacer.on_trade(&record(TradeKind::HedgeShort, 100.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::ShortFlat, 100.0, 100.1)).await;
        assert!(!pacer.is_paused(), "one flattened side is not enough");
        pacer.on_trade(&record(TradeKind::LongFlat, 100.0, 100.2)).await;
        assert!(pacer.is_paused());

        let until = pacer.pause.unwrap().until;
        let rest = until - clock.now();
        assert!(rest >= ChronoDuration::seconds(600), "rest was {rest:?}");
        assert!(rest <= ChronoDuration::seconds(900), "rest was {rest:?}");

        // Expires lazily once the clock passes the end time.
        clock.advance(ChronoDuration::seconds(901));
        assert!(!pacer.is_paused());
    }

    #[tokio::test]
    async fn rest_liquidates_leftovers_before_the_timer_starts() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, broker, _) = make_pacer(1_000.0, clock);

        broker.set_position(Side::Long, 4.0).await;
        pacer.on_trade(&record(TradeKind::HedgeShort, 100.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::ShortFlat, 100.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::LongFlat, 100.0, 100.0)).await;

        assert!(pacer.is_paused());
        assert_eq!(broker.long_size().await, 0.0);
    }

    #[tokio::test]
    async fn failed_liquidation_skips_the_rest_timer() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, broker, _) = make_pacer(1_000.0, clock);

        broker.set_position(Side::Long, 4.0).await;
        broker.set_failing(true);
        pacer.on_trade(&record(TradeKind::HedgeShort, 100.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::ShortFlat, 100.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::LongFlat, 100.0, 100.0)).await;

        assert!(!pacer.is_paused(), "no timer while residue remains open");
        assert_eq!(broker.long_size().await, 4.0);
    }

    #[tokio::test]
    async fn scalp_pattern_near_last_close_forces_rest() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, _) = make_pacer(1_000.0, clock);

        for _ in 0..3 {
            pacer.on_trade(&record(TradeKind::LongClosed, 99.9, 100.0)).await;
        }
        // Hedge within 0.05% of the last close price.
        pacer.on_trade(&record(TradeKind::HedgeShort, 100.01, 100.01)).await;
        assert!(pacer.is_paused());
    }

    #[tokio::test]
    async fn scalp_pattern_far_from_last_close_is_ignored() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, _) = make_pacer(1_000.0, clock);

        for _ in 0..3 {
            pacer.on_trade(&record(TradeKind::LongClosed, 99.9, 100.0)).await;
        }
        pacer.on_trade(&record(TradeKind::HedgeShort, 101.0, 101.0)).await;
        assert!(!pacer.is_paused());
    }

    #[tokio::test]
    async fn stale_flat_book_forces_rest_after_ninety_minutes() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, _) = make_pacer(1_000.0, clock.clone());

        pacer.check_schedule().await;
        assert!(!pacer.is_paused());

        clock.advance(ChronoDuration::minutes(91));
        pacer.check_schedule().await;
        assert!(pacer.is_paused());
    }

    #[tokio::test]
    async fn stale_rule_waits_while_a_position_is_open() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, broker, _) = make_pacer(1_000.0, clock.clone());

        broker.set_position(Side::Long, 2.0).await;
        clock.advance(ChronoDuration::minutes(91));
        pacer.check_schedule().await;
        assert!(!pacer.is_paused());
    }

    #[tokio::test]
    async fn daily_target_pauses_into_the_afternoon_window() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, ledger) = make_pacer(1_000.0, clock.clone());

        // target = 1000 * 1000 * 1.2
        ledger.write().await.add_notional(1_200_000.0);
        pacer.check_daily_target().await;
        assert!(pacer.is_paused());

        let until = pacer.pause.unwrap().until;
        assert_eq!(until.hour(), 15);
        assert_eq!(
            until.date_naive(),
            clock.now().date_naive(),
            "pause must end the same day"
        );
    }

    #[tokio::test]
    async fn daily_target_never_fires_after_cutoff() {
        let clock = ManualClock::at(16, 30);
        let (mut pacer, _broker, ledger) = make_pacer(1_000.0, clock);

        ledger.write().await.add_notional(10_000_000.0);
        pacer.check_daily_target().await;
        assert!(!pacer.is_paused());
    }

    #[tokio::test]
    async fn daily_target_waits_for_a_flat_book() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, broker, ledger) = make_pacer(1_000.0, clock);

        broker.set_position(Side::Short, 2.0).await;
        ledger.write().await.add_notional(1_200_000.0);
        pacer.check_daily_target().await;
        assert!(!pacer.is_paused());
    }

    #[tokio::test]
    async fn directional_close_without_hedge_does_not_rest() {
        let clock = ManualClock::at(10, 0);
        let (mut pacer, _broker, _) = make_pacer(1_000.0, clock);

        pacer.on_trade(&record(TradeKind::LongClosed, 99.0, 100.0)).await;
        pacer.on_trade(&record(TradeKind::ShortClosed, 101.0, 100.0)).await;
        assert!(!pacer.is_paused());
    }
}
