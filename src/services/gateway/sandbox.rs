use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{CreatedPaymentRequest, PaymentGateway, PaymentRequest, RefundResult};

/// Local stand-in used when no gateway API key is configured.
/// Checkout URLs point back at this server; payments are settled by posting webhooks by hand.
pub struct SandboxGateway {
    base_url: String,
}

impl SandboxGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> anyhow::Result<CreatedPaymentRequest> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            payment_request_id = %id,
            reference = %request.reference_number,
            amount = %request.amount,
            "sandbox payment request created"
        );
        Ok(CreatedPaymentRequest {
            url: format!("{}/sandbox/checkout/{id}", self.base_url),
            id,
        })
    }

    async fn refund(&self, payment_id: &str, amount: Decimal) -> anyhow::Result<RefundResult> {
        tracing::info!(payment_id, amount = %amount, "sandbox refund accepted");
        Ok(RefundResult {
            id: Some(uuid::Uuid::new_v4().to_string()),
            status: "succeeded".to_string(),
        })
    }
}
