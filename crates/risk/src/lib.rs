pub mod clock;
pub mod pacer;

pub use clock::{Clock, SystemClock};
pub use pacer::{PacerConfig, PacingController, PauseReason};
