pub mod hitpay;
pub mod sandbox;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::PaymentMethod;

/// What the gateway needs to open a hosted checkout for one booking.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub reference_number: String,
    pub redirect_url: String,
    pub webhook_url: String,
    pub payment_method: PaymentMethod,
    pub name: String,
    pub email: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPaymentRequest {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundResult {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
}

impl RefundResult {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> anyhow::Result<CreatedPaymentRequest>;

    async fn refund(&self, payment_id: &str, amount: Decimal) -> anyhow::Result<RefundResult>;
}
