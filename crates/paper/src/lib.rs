use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{OrderGateway, PositionView, SessionDriver, Side, SidePosition};

#[derive(Debug, Default)]
struct Book {
    long: f64,
    short: f64,
}

/// In-memory broker for paper trading.
///
/// Every order fills instantly and fully at the requested quantity. No real
/// venue is ever touched. The failure and session toggles exist so callers
/// can exercise their retry and pause paths against a deterministic backend.
pub struct PaperBroker {
    book: Arc<RwLock<Book>>,
    failing: AtomicBool,
    authenticated: AtomicBool,
    open_attempts: AtomicU32,
}

impl PaperBroker {
    pub fn new() -> Self {
        info!("PaperBroker initialized");
        Self {
            book: Arc::new(RwLock::new(Book::default())),
            failing: AtomicBool::new(false),
            authenticated: AtomicBool::new(true),
            open_attempts: AtomicU32::new(0),
        }
    }

    /// Make every subsequent order placement report failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Overwrite one side of the simulated book directly.
    pub async fn set_position(&self, side: Side, size: f64) {
        let mut book = self.book.write().await;
        match side {
            Side::Long => book.long = size,
            Side::Short => book.short = size,
        }
    }

    pub async fn long_size(&self) -> f64 {
        self.book.read().await.long
    }

    pub async fn short_size(&self) -> f64 {
        self.book.read().await.short
    }

    /// How many open placements were attempted, successful or not.
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionView for PaperBroker {
    async fn open_positions(&self) -> Vec<SidePosition> {
        let book = self.book.read().await;
        let mut positions = Vec::new();
        if book.long > 0.0 {
            positions.push(SidePosition { side: Side::Long, size: book.long });
        }
        if book.short > 0.0 {
            positions.push(SidePosition { side: Side::Short, size: book.short });
        }
        positions
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn place_open(&self, side: Side, qty: f64) -> bool {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            debug!(%side, qty, "paper open rejected (failing mode)");
            return false;
        }
        let mut book = self.book.write().await;
        match side {
            Side::Long => book.long += qty,
            Side::Short => book.short += qty,
        }
        debug!(%side, qty, long = book.long, short = book.short, "paper open filled");
        true
    }

    async fn place_close(&self, side: Side, qty: f64) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            debug!(%side, qty, "paper close rejected (failing mode)");
            return false;
        }
        let mut book = self.book.write().await;
        match side {
            Side::Long => book.long = (book.long - qty).max(0.0),
            Side::Short => book.short = (book.short - qty).max(0.0),
        }
        debug!(%side, qty, long = book.long, short = book.short, "paper close filled");
        true
    }

    async fn clear_obstructions(&self) -> bool {
        true
    }
}

#[async_trait]
impl SessionDriver for PaperBroker {
    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn reauthenticate(&self) -> bool {
        self.authenticated.store(true, Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_then_close_nets_out() {
        let broker = PaperBroker::new();
        assert!(broker.place_open(Side::Long, 2.5).await);
        assert!(broker.place_open(Side::Long, 1.5).await);
        assert_eq!(broker.long_size().await, 4.0);

        assert!(broker.place_close(Side::Long, 4.0).await);
        assert_eq!(broker.long_size().await, 0.0);
        assert!(broker.open_positions().await.is_empty());
    }

    #[tokio::test]
    async fn close_never_goes_negative() {
        let broker = PaperBroker::new();
        broker.place_open(Side::Short, 1.0).await;
        broker.place_close(Side::Short, 5.0).await;
        assert_eq!(broker.short_size().await, 0.0);
    }

    #[tokio::test]
    async fn failing_mode_rejects_but_counts_attempts() {
        let broker = PaperBroker::new();
        broker.set_failing(true);
        assert!(!broker.place_open(Side::Long, 1.0).await);
        assert!(!broker.place_open(Side::Long, 1.0).await);
        assert_eq!(broker.open_attempts(), 2);
        assert_eq!(broker.long_size().await, 0.0);

        broker.set_failing(false);
        assert!(broker.place_open(Side::Long, 1.0).await);
        assert_eq!(broker.open_attempts(), 3);
    }

    #[tokio::test]
    async fn both_sides_reported_when_hedged() {
        let broker = PaperBroker::new();
        broker.place_open(Side::Long, 2.0).await;
        broker.place_open(Side::Short, 2.0).await;
        let positions = broker.open_positions().await;
        assert_eq!(positions.len(), 2);
    }

    #[tokio::test]
    async fn session_toggles() {
        let broker = PaperBroker::new();
        assert!(broker.is_authenticated().await);
        broker.set_authenticated(false);
        assert!(!broker.is_authenticated().await);
        assert!(broker.reauthenticate().await);
        assert!(broker.is_authenticated().await);
    }
}
