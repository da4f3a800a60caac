use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::engine::DependencyError;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BookingConfirmed {
        transaction_id: Ulid,
        movie_title: String,
        amount: Decimal,
    },
    Reminder {
        movie_id: Ulid,
        movie_title: String,
        starts_at: String,
    },
}

/// Delivers customer notifications. Callers treat delivery as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmation(
        &self,
        owner_id: Ulid,
        transaction_id: Ulid,
        movie_title: &str,
        amount: Decimal,
    ) -> Result<(), DependencyError>;

    async fn reminder(
        &self,
        owner_id: Ulid,
        movie_title: &str,
        starts_at: &str,
        movie_id: Ulid,
    ) -> Result<(), DependencyError>;
}

/// Broadcast hub delivering notifications per owner.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to an owner's notifications. Creates the channel if needed.
    pub fn subscribe(&self, owner_id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, owner_id: Ulid, notification: Notification) {
        if let Some(sender) = self.channels.get(&owner_id) {
            let _ = sender.send(notification);
        }
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn booking_confirmation(
        &self,
        owner_id: Ulid,
        transaction_id: Ulid,
        movie_title: &str,
        amount: Decimal,
    ) -> Result<(), DependencyError> {
        tracing::info!("booking confirmed for {owner_id}: {movie_title} ({amount})");
        self.send(
            owner_id,
            Notification::BookingConfirmed {
                transaction_id,
                movie_title: movie_title.to_string(),
                amount,
            },
        );
        Ok(())
    }

    async fn reminder(
        &self,
        owner_id: Ulid,
        movie_title: &str,
        starts_at: &str,
        movie_id: Ulid,
    ) -> Result<(), DependencyError> {
        self.send(
            owner_id,
            Notification::Reminder {
                movie_id,
                movie_title: movie_title.to_string(),
                starts_at: starts_at.to_string(),
            },
        );
        Ok(())
    }
}
