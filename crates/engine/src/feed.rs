use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{Error, Result, Tick};

const TICKER_URL: &str = "https://contract.mexc.com/api/v1/contract/ticker";

/// Polls the MEXC contract ticker for one symbol and pushes price samples
/// into the tick channel.
///
/// Each cycle sleeps the configured interval plus a small random jitter so
/// the request cadence never looks machine-regular. Fetch failures back off
/// exponentially and never reach the core; the loop exits once the receiver
/// side of the channel is dropped.
pub struct MexcPollingFeed {
    symbol: String,
    poll_interval: Duration,
    tick_tx: mpsc::Sender<Tick>,
    http: Client,
}

impl MexcPollingFeed {
    pub fn new(symbol: impl Into<String>, poll_interval: Duration, tick_tx: mpsc::Sender<Tick>) -> Self {
        Self {
            symbol: symbol.into(),
            poll_interval,
            tick_tx,
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Run the polling loop forever. Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        info!(symbol = %self.symbol, interval = ?self.poll_interval, "Price feed polling started");
        loop {
            match self.fetch_last_price().await {
                Ok(price) => {
                    backoff = Duration::from_secs(1);
                    if self.tick_tx.send(Tick::Price(price)).await.is_err() {
                        info!("Tick channel closed, feed exiting");
                        return;
                    }
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
                    tokio::time::sleep(self.poll_interval + jitter).await;
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?backoff, "Ticker fetch failed, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn fetch_last_price(&self) -> Result<f64> {
        let url = format!("{TICKER_URL}?symbol={}", self.symbol);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        parse_last_price(&body)
    }
}

#[derive(Deserialize)]
struct TickerResponse {
    data: TickerData,
}

#[derive(Deserialize)]
struct TickerData {
    #[serde(rename = "lastPrice")]
    last_price: f64,
}

fn parse_last_price(text: &str) -> Result<f64> {
    let resp: TickerResponse = serde_json::from_str(text)?;
    let price = resp.data.last_price;
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::Feed(format!("non-positive last price {price}")));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_payload() {
        let body = r#"{
            "success": true,
            "code": 0,
            "data": {
                "symbol": "BTC_USDT",
                "lastPrice": 64250.5,
                "riseFallRate": 0.0123
            }
        }"#;
        assert_eq!(parse_last_price(body).unwrap(), 64250.5);
    }

    #[test]
    fn rejects_zero_price() {
        let body = r#"{"data": {"lastPrice": 0.0}}"#;
        assert!(parse_last_price(body).is_err());
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(parse_last_price(r#"{"error": "rate limited"}"#).is_err());
    }
}
