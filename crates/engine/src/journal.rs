use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Timelike};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use common::{Result, VolumeLedger};

const JOURNAL_HEADER: &str = "timestamp,accumulated_volume,realized_pnl";
const WRITE_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic CSV sink for the volume ledger.
///
/// Writes one row per minute and resets the ledger once a day at the
/// volume-target boundary hour. The file is a logging artifact, never read
/// back; it is truncated on startup so each run journals from a clean
/// header.
pub struct TradeJournal {
    path: PathBuf,
    ledger: Arc<RwLock<VolumeLedger>>,
    reset_hour: u32,
    last_reset: Option<NaiveDate>,
}

impl TradeJournal {
    pub fn new(path: impl Into<PathBuf>, ledger: Arc<RwLock<VolumeLedger>>, reset_hour: u32) -> Self {
        let now = Local::now();
        // Starting past the boundary must not wipe the ledger immediately.
        let last_reset = (now.hour() >= reset_hour).then(|| now.date_naive());
        Self {
            path: path.into(),
            ledger,
            reset_hour,
            last_reset,
        }
    }

    /// Run the journaling loop forever. Call this inside a `tokio::spawn`.
    pub async fn run(mut self) {
        if let Err(e) = write_header(&self.path) {
            error!(path = %self.path.display(), error = %e, "Failed to start journal");
            return;
        }
        info!(path = %self.path.display(), "Trade journal started");

        let mut interval = tokio::time::interval(WRITE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let now = Local::now();
            if self.due_reset(now) {
                info!("Daily ledger boundary reached, resetting totals");
                self.ledger.write().await.reset();
                self.last_reset = Some(now.date_naive());
            }
            let (volume, pnl) = {
                let ledger = self.ledger.read().await;
                (ledger.accumulated_notional(), ledger.realized_pnl())
            };
            if let Err(e) = write_row(&self.path, now, volume, pnl) {
                error!(path = %self.path.display(), error = %e, "Failed to append journal row");
            }
        }
    }

    fn due_reset(&self, now: DateTime<Local>) -> bool {
        now.hour() >= self.reset_hour && self.last_reset != Some(now.date_naive())
    }
}

fn write_header(path: &Path) -> Result<()> {
    std::fs::write(path, format!("{JOURNAL_HEADER}\n"))?;
    Ok(())
}

fn write_row(path: &Path, now: DateTime<Local>, volume: f64, pnl: f64) -> Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    writeln!(file, "{},{volume:.4},{pnl:.4}", now.format("%Y-%m-%d %H:%M:%S"))?;
    Ok(())
}
