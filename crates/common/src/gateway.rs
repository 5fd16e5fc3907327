use async_trait::async_trait;

use crate::{Side, SidePosition};

/// Read side of the position collaborator.
///
/// Implementations absorb their own transport failures: the readback is
/// best-effort and an unreachable backend reports an empty book. The core
/// treats whatever comes back as ground truth at call time.
#[async_trait]
pub trait PositionView: Send + Sync {
    async fn open_positions(&self) -> Vec<SidePosition>;
}

/// Order placement collaborator.
///
/// Every method reduces to a boolean: the backend retries its own flaky
/// interactions internally and never surfaces an error type to the core.
/// A `true` does not guarantee a full fill; callers must read the
/// position back and trust the observed quantity.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_open(&self, side: Side, qty: f64) -> bool;

    async fn place_close(&self, side: Side, qty: f64) -> bool;

    /// Dismiss transient UI obstructions (popups, notifications) that would
    /// otherwise block clicks. Idempotent; returns whether the dismissal
    /// attempt went through.
    async fn clear_obstructions(&self) -> bool;
}

/// Session-liveness collaborator. A lost session is an implicit pause:
/// trading cannot resume until `reauthenticate` succeeds.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn is_authenticated(&self) -> bool;

    async fn reauthenticate(&self) -> bool;
}
