//! Gas Price Oracle
//!
//! Purpose:
//!     Track the latest "rapid" gas price from an external WebSocket feed so
//!     the reporter can floor its bid at the market's fast lane.
//!
//! Feed format (one JSON text frame per update, prices in wei):
//!     {"type": "gasprice_s", "data": {"gasPrices": {"rapid": .., "fast": .., "standard": .., "slow": ..}}}
//!
//! Notes:
//!     - Frames without `type` or without `data.gasPrices` are ignored
//!     - The feed is a single long-lived session; a close is fatal
//!     - With no feed configured the oracle simply never has a price

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{Result, WatcherError};
use crate::types::GasPriceTiers;

#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<FeedData>,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    #[serde(rename = "gasPrices")]
    gas_prices: Option<GasPriceTiers>,
}

/// Parse one feed frame. Returns None for frames that carry no prices.
pub fn parse_feed_message(text: &str) -> Option<GasPriceTiers> {
    let msg: FeedMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Unparseable gas feed frame: {}", e);
            return None;
        }
    };
    msg.kind?;
    msg.data?.gas_prices
}

/// Read side, cloned into the reporter
#[derive(Debug, Clone)]
pub struct GasPriceOracle {
    rx: watch::Receiver<Option<GasPriceTiers>>,
}

impl GasPriceOracle {
    /// Latest rapid price in wei, if any update has arrived
    pub fn rapid(&self) -> Option<u128> {
        self.latest().map(|tiers| tiers.rapid as u128)
    }

    pub fn latest(&self) -> Option<GasPriceTiers> {
        *self.rx.borrow()
    }

    /// Oracle with no feed behind it
    pub fn disabled() -> Self {
        let (_feed, oracle) = channel();
        oracle
    }
}

/// Write side, owned by the feed task
#[derive(Debug)]
pub struct GasPriceFeed {
    tx: watch::Sender<Option<GasPriceTiers>>,
}

pub fn channel() -> (GasPriceFeed, GasPriceOracle) {
    let (tx, rx) = watch::channel(None);
    (GasPriceFeed { tx }, GasPriceOracle { rx })
}

impl GasPriceFeed {
    pub fn publish(&self, tiers: GasPriceTiers) {
        // send_replace never fails, even with no readers left
        self.tx.send_replace(Some(tiers));
    }

    /// Connect to `url` and publish every price update until the socket
    /// closes. Always returns an error: the feed ending is fatal.
    pub async fn run(self, url: &str) -> Result<()> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| WatcherError::GasFeed(format!("connect {}: {}", url, e)))?;
        info!("Gas feed connection open | url={}", url);

        let (_write, mut read) = ws.split();
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(tiers) = parse_feed_message(&text) {
                        debug!("Gas feed | rapid={} gwei", tiers.rapid / 1_000_000_000);
                        self.publish(tiers);
                    }
                }
                Ok(Message::Close(frame)) => {
                    warn!("Gas feed connection closed: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(WatcherError::GasFeed(e.to_string()));
                }
            }
        }

        Err(WatcherError::GasFeed("connection closed".to_string()))
    }
}
