pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::queries;
use crate::models::{Booking, Client};
use crate::services::audit;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Confirmation,
    Completion,
    Refund,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::Confirmation => "confirmation",
            NotificationEvent::Completion => "completion",
            NotificationEvent::Refund => "refund",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        booking: &Booking,
        client: Option<&Client>,
        event: NotificationEvent,
    ) -> anyhow::Result<()>;
}

/// Used when no notification channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        booking: &Booking,
        _client: Option<&Client>,
        event: NotificationEvent,
    ) -> anyhow::Result<()> {
        tracing::info!(booking_id = booking.id, event = event.as_str(), "notification (log only)");
        Ok(())
    }
}

/// Best-effort notification after a committed state change. Never fails the caller.
pub async fn send(state: &Arc<AppState>, booking_id: i64, event: NotificationEvent) -> bool {
    let loaded = state.conn().and_then(|db| {
        let booking = queries::get_booking(&db, booking_id)?;
        let client = match &booking {
            Some(b) => queries::get_client(&db, b.client_id)?,
            None => None,
        };
        Ok((booking, client))
    });

    let (booking, client) = match loaded {
        Ok((Some(booking), client)) => (booking, client),
        Ok((None, _)) => {
            tracing::warn!(booking_id, "notification skipped, booking not found");
            return false;
        }
        Err(e) => {
            tracing::error!(booking_id, error = %e, "failed to load booking for notification");
            return false;
        }
    };

    match state.notifier.notify(&booking, client.as_ref(), event).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(booking_id, event = event.as_str(), error = %e, "notification failed");
            let action = format!("Failed to send {} notification", event.as_str());
            audit::record(state, &action, Some(booking_id), None);
            false
        }
    }
}
