use std::sync::Arc;

use proptest::prelude::*;
use tokio::sync::RwLock;

use common::{TradeKind, TradeRecord, VolumeLedger};
use paper::PaperBroker;
use risk::{PacerConfig, PacingController, SystemClock};

fn any_trade_kind() -> impl Strategy<Value = TradeKind> {
    prop_oneof![
        Just(TradeKind::OpenLong),
        Just(TradeKind::OpenShort),
        Just(TradeKind::HedgeLong),
        Just(TradeKind::HedgeShort),
        Just(TradeKind::LongClosed),
        Just(TradeKind::ShortClosed),
        Just(TradeKind::LongUnwound),
        Just(TradeKind::ShortUnwound),
        Just(TradeKind::LongFlat),
        Just(TradeKind::ShortFlat),
    ]
}

proptest! {
    /// Pacing rule evaluation on randomized trade records and ledger totals
    /// must never panic, whatever the prices.
    #[test]
    fn pacing_rules_never_panic_on_extreme_inputs(
        kinds in prop::collection::vec(any_trade_kind(), 1..20),
        entry_price in 0.0001f64..1_000_000.0f64,
        close_price in 0.0001f64..1_000_000.0f64,
        notional in 0.0f64..1_000_000_000.0f64,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let broker = Arc::new(PaperBroker::new());
            let ledger = Arc::new(RwLock::new(VolumeLedger::new()));
            ledger.write().await.add_notional(notional);

            let mut pacer = PacingController::new(
                PacerConfig::default(),
                1_000.0,
                Arc::new(SystemClock),
                broker.clone(),
                broker,
                ledger,
            );

            for kind in kinds {
                let record = TradeRecord { kind, entry_price, close_price };
                pacer.on_trade(&record).await;
                pacer.check_schedule().await;
                let _ = pacer.is_paused();
            }
        });
    }
}
