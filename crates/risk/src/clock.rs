use chrono::{DateTime, Local};

/// Wall-clock source for the pacing rules.
///
/// The rest timers, the staleness window and the afternoon volume cutoff
/// all key off local exchange time, so tests need to be able to pin and
/// advance "now" deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Production clock, reads the host local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
