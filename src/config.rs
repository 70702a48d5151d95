use std::env;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub db_busy_timeout: Duration,
    pub admin_token: String,
    pub public_base_url: String,
    pub currency: String,
    pub utc_offset_hours: i32,
    pub hitpay_api_url: String,
    pub hitpay_api_key: String,
    pub hitpay_salt: String,
    pub gateway_connect_timeout: Duration,
    pub gateway_timeout: Duration,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub revenue_cache_ttl: Duration,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            db_busy_timeout: Duration::from_millis(parsed("DB_BUSY_TIMEOUT_MS", 5000)),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "SGD".to_string()),
            utc_offset_hours: parsed("UTC_OFFSET_HOURS", 8),
            hitpay_api_url: env::var("HITPAY_API_URL")
                .unwrap_or_else(|_| "https://api.hit-pay.com".to_string()),
            hitpay_api_key: env::var("HITPAY_API_KEY").unwrap_or_default(),
            hitpay_salt: env::var("HITPAY_SALT").unwrap_or_default(),
            gateway_connect_timeout: Duration::from_secs(parsed("GATEWAY_CONNECT_TIMEOUT_SECS", 10)),
            gateway_timeout: Duration::from_secs(parsed("GATEWAY_TIMEOUT_SECS", 30)),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),
            revenue_cache_ttl: Duration::from_secs(parsed("REVENUE_CACHE_TTL_SECS", 300)),
        }
    }

    /// Wall-clock time in the business timezone, used for "in the future" checks.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or(Utc.fix());
        Utc::now().with_timezone(&offset).naive_local()
    }

    pub fn redirect_url(&self, booking_id: i64) -> String {
        format!(
            "{}/thank-you?booking_id={booking_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/webhook/payment", self.public_base_url.trim_end_matches('/'))
    }
}
