use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use common::{OrderGateway, PositionView, SessionDriver, Side, SidePosition};

/// Attempts per bridge call before the failure is reported to the core.
const BRIDGE_ATTEMPTS: u32 = 3;
const BRIDGE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// HTTP client for the local UI-automation sidecar that drives the real
/// exchange web page.
///
/// The sidecar owns all element location, clicking and session handling.
/// This side reduces every interaction to the boolean/best-effort contracts
/// the core expects: transport and non-2xx failures are retried a few times,
/// logged, and then absorbed. Nothing here ever returns an error type.
pub struct UiBridgeGateway {
    base_url: String,
    http: Client,
}

impl UiBridgeGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn post_ok(&self, path: &str, body: Option<serde_json::Value>) -> bool {
        let url = format!("{}{path}", self.base_url);
        for attempt in 1..=BRIDGE_ATTEMPTS {
            let mut req = self.http.post(&url);
            if let Some(b) = &body {
                req = req.json(b);
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => {
                    warn!(path, status = %resp.status(), attempt, "Bridge call rejected")
                }
                Err(e) => warn!(path, error = %e, attempt, "Bridge call failed"),
            }
            tokio::time::sleep(BRIDGE_RETRY_DELAY).await;
        }
        false
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let url = format!("{}{path}", self.base_url);
        for attempt in 1..=BRIDGE_ATTEMPTS {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                    Ok(value) => return Some(value),
                    Err(e) => warn!(path, error = %e, attempt, "Bridge response unparseable"),
                },
                Ok(resp) => {
                    warn!(path, status = %resp.status(), attempt, "Bridge read rejected")
                }
                Err(e) => warn!(path, error = %e, attempt, "Bridge read failed"),
            }
            tokio::time::sleep(BRIDGE_RETRY_DELAY).await;
        }
        None
    }
}

#[async_trait]
impl OrderGateway for UiBridgeGateway {
    async fn place_open(&self, side: Side, qty: f64) -> bool {
        debug!(%side, qty, "Bridge open order");
        self.post_ok("/orders/open", Some(json!({ "side": side.to_string(), "qty": qty })))
            .await
    }

    async fn place_close(&self, side: Side, qty: f64) -> bool {
        debug!(%side, qty, "Bridge close order");
        self.post_ok("/orders/close", Some(json!({ "side": side.to_string(), "qty": qty })))
            .await
    }

    async fn clear_obstructions(&self) -> bool {
        self.post_ok("/ui/dismiss", None).await
    }
}

#[async_trait]
impl PositionView for UiBridgeGateway {
    async fn open_positions(&self) -> Vec<SidePosition> {
        // An unreachable sidecar reads as an empty book; the core already
        // treats readbacks as best-effort ground truth.
        self.get_json::<Vec<SidePosition>>("/positions")
            .await
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct SessionStatus {
    authenticated: bool,
}

#[async_trait]
impl SessionDriver for UiBridgeGateway {
    async fn is_authenticated(&self) -> bool {
        self.get_json::<SessionStatus>("/session")
            .await
            .map(|s| s.authenticated)
            .unwrap_or(false)
    }

    async fn reauthenticate(&self) -> bool {
        self.post_ok("/session/login", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_normalized() {
        let bridge = UiBridgeGateway::new("http://127.0.0.1:9222///");
        assert_eq!(bridge.base_url, "http://127.0.0.1:9222");
    }
}
