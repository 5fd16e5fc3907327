use serde::{Deserialize, Serialize};

/// Direction of a perpetual-futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// One sample from the price feed.
///
/// Depending on the deployment, the feed delivers either a raw last price
/// (the engine computes its own EMAs) or pre-computed fast/mid/slow EMA
/// values parsed upstream. The strategy entry point accepts both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Price(f64),
    Ema { fast: f64, mid: f64, slow: f64 },
}

/// A single open position as reported by the position view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SidePosition {
    pub side: Side,
    pub size: f64,
}

/// Aggregated per-side sizes from a position readback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionSnapshot {
    pub long: f64,
    pub short: f64,
}

impl PositionSnapshot {
    pub fn from_positions(positions: &[SidePosition]) -> Self {
        let mut snap = Self::default();
        for p in positions {
            match p.side {
                Side::Long => snap.long += p.size,
                Side::Short => snap.short += p.size,
            }
        }
        snap
    }

    pub fn is_flat(&self) -> bool {
        self.long <= 0.0 && self.short <= 0.0
    }
}

/// What kind of fill just happened. Consumed append-only by the pacing
/// controller; never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    /// Full-lot directional entry from flat.
    OpenLong,
    OpenShort,
    /// Full-lot entry taken while the opposite side was already open.
    HedgeLong,
    HedgeShort,
    /// Full-lot close of a directional position.
    LongClosed,
    ShortClosed,
    /// Partial hedge-unwind close, side still open afterwards.
    LongUnwound,
    ShortUnwound,
    /// Hedge-unwind close that took the side all the way to zero.
    LongFlat,
    ShortFlat,
}

impl TradeKind {
    /// An open-then-close round trip at the full entry lot.
    pub fn is_full_lot_close(self) -> bool {
        matches!(self, TradeKind::LongClosed | TradeKind::ShortClosed)
    }

    pub fn is_hedge_entry(self) -> bool {
        matches!(self, TradeKind::HedgeLong | TradeKind::HedgeShort)
    }

    /// The side this event fully flattened, if any.
    pub fn flattened_side(self) -> Option<Side> {
        match self {
            TradeKind::LongFlat | TradeKind::LongClosed => Some(Side::Long),
            TradeKind::ShortFlat | TradeKind::ShortClosed => Some(Side::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeKind::OpenLong => "open-long",
            TradeKind::OpenShort => "open-short",
            TradeKind::HedgeLong => "hedge-long",
            TradeKind::HedgeShort => "hedge-short",
            TradeKind::LongClosed => "long-closed",
            TradeKind::ShortClosed => "short-closed",
            TradeKind::LongUnwound => "long-unwound",
            TradeKind::ShortUnwound => "short-unwound",
            TradeKind::LongFlat => "long-flat",
            TradeKind::ShortFlat => "short-flat",
        };
        write!(f, "{s}")
    }
}

/// Record of one fill, handed from the strategy engine to the pacer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeRecord {
    pub kind: TradeKind,
    pub entry_price: f64,
    pub close_price: f64,
}

/// Running totals of traded notional and realized PnL.
///
/// Mutated by the strategy engine on every fill, read by the pacing
/// controller for target comparisons and by the journal writer. Reset at
/// the daily 15:00 boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VolumeLedger {
    accumulated_notional: f64,
    realized_pnl: f64,
}

impl VolumeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_notional(&mut self, notional: f64) {
        self.accumulated_notional += notional;
    }

    pub fn add_realized_pnl(&mut self, pnl: f64) {
        self.realized_pnl += pnl;
    }

    pub fn accumulated_notional(&self) -> f64 {
        self.accumulated_notional
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Whether the bot drives the real UI bridge or the in-memory simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_aggregates_per_side() {
        let positions = vec![
            SidePosition { side: Side::Long, size: 1.5 },
            SidePosition { side: Side::Short, size: 0.5 },
            SidePosition { side: Side::Long, size: 0.5 },
        ];
        let snap = PositionSnapshot::from_positions(&positions);
        assert_eq!(snap.long, 2.0);
        assert_eq!(snap.short, 0.5);
        assert!(!snap.is_flat());
    }

    #[test]
    fn empty_snapshot_is_flat() {
        assert!(PositionSnapshot::from_positions(&[]).is_flat());
    }

    #[test]
    fn ledger_accumulates_and_resets() {
        let mut ledger = VolumeLedger::new();
        ledger.add_notional(1_000.0);
        ledger.add_notional(500.0);
        ledger.add_realized_pnl(-3.5);
        assert_eq!(ledger.accumulated_notional(), 1_500.0);
        assert_eq!(ledger.realized_pnl(), -3.5);
        ledger.reset();
        assert_eq!(ledger.accumulated_notional(), 0.0);
        assert_eq!(ledger.realized_pnl(), 0.0);
    }

    #[test]
    fn trade_kind_classification() {
        assert!(TradeKind::LongClosed.is_full_lot_close());
        assert!(!TradeKind::LongUnwound.is_full_lot_close());
        assert!(TradeKind::HedgeShort.is_hedge_entry());
        assert_eq!(TradeKind::ShortFlat.flattened_side(), Some(Side::Short));
        assert_eq!(TradeKind::OpenLong.flattened_side(), None);
    }
}
