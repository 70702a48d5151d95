use anyhow::Context;
use async_trait::async_trait;

use super::{NotificationEvent, Notifier};
use crate::models::{Booking, Client};

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn render_message(booking: &Booking, client: Option<&Client>, event: NotificationEvent) -> String {
    let title = match event {
        NotificationEvent::Confirmation => "✅ Payment confirmed",
        NotificationEvent::Completion => "🏁 Service completed",
        NotificationEvent::Refund => "↩️ Refund completed",
    };

    let mut lines = vec![
        format!("<b>{title}</b>"),
        format!("Booking #{} ({})", booking.id, booking.category.display_name()),
    ];
    if let Some(subtype) = &booking.subtype {
        lines.push(format!("Service: {}", escape_html(subtype)));
    }
    lines.push(format!("Pickup: {}", booking.pickup_at.format("%Y-%m-%d %H:%M")));
    if let Some(dropoff) = booking.dropoff_at {
        lines.push(format!("Drop-off: {}", dropoff.format("%Y-%m-%d %H:%M")));
    }
    lines.push(format!("Amount: S${:.2}", booking.total_amount));
    if let Some(c) = client {
        lines.push(format!(
            "Client: {} · {} · {}",
            escape_html(&c.name),
            escape_html(&c.email),
            escape_html(&c.phone)
        ));
    }
    lines.join("\n")
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(
        &self,
        booking: &Booking,
        client: Option<&Client>,
        event: NotificationEvent,
    ) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        self.client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": render_message(booking, client, event),
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("failed to send Telegram message")?
            .error_for_status()
            .context("Telegram API returned error")?;

        Ok(())
    }
}
