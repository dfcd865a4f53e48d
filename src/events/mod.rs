//! Fire-and-forget notifications for real-time subscribers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

pub mod ws;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeStatus {
    Success,
    Error,
}

/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum KitchenEvent {
    #[serde(rename = "inventory.update")]
    InventoryUpdate {
        ingredient_id: Uuid,
        new_quantity_grams: i64,
    },
    #[serde(rename = "serve.attempt")]
    ServeAttempt {
        meal_id: Uuid,
        portions: i64,
        status: ServeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "alerts.low_stock")]
    LowStock {
        ingredient_id: Uuid,
        name: String,
        quantity_grams: i64,
        threshold: i64,
    },
}

/// Delivery is best effort; callers never wait on or observe the outcome.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: KitchenEvent);
}

pub struct BroadcastPublisher {
    tx: broadcast::Sender<KitchenEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KitchenEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: KitchenEvent) {
        // Err only means nobody is listening right now
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }
}
