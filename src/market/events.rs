//! Best-effort outbound channels: UI event broadcasts and user
//! notifications.
//!
//! Neither channel participates in trade correctness. Publish failures are
//! logged and swallowed; a trade never rolls back because nobody was
//! listening.

use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::logutil::escape_log;
use crate::market::types::Credits;

/// Market activity pushed to interested observers (a UI feed, metrics, a
/// websocket bridge).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Listed {
        listing: Uuid,
        item_name: String,
        quantity: u32,
        price: Credits,
        seller: String,
    },
    Purchased {
        listing: Uuid,
        item_name: String,
        quantity: u32,
        price: Credits,
        buyer: String,
        seller: String,
    },
    Cancelled {
        listing: Uuid,
    },
    ShopSalesSettled {
        shop: Uuid,
        owner: String,
        revenue: Credits,
    },
}

/// Delivery boundary for user-facing notifications. Implementations may
/// fail; the engine logs and moves on.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, user: &str, message: &str) -> anyhow::Result<()>;
}

/// Default sink: notifications go to the application log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, user: &str, message: &str) -> anyhow::Result<()> {
        info!("notify {}: {}", user, escape_log(message));
        Ok(())
    }
}

/// Fan-out handle around a tokio broadcast channel.
pub(crate) struct EventPublisher {
    sender: broadcast::Sender<MarketEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: MarketEvent) {
        // SendError just means there are no subscribers right now.
        if self.sender.send(event).is_err() {
            debug!("market event dropped: no subscribers");
        }
    }
}
