use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{CreatedPaymentRequest, PaymentGateway, PaymentRequest, RefundResult};

/// HitPay payment requests API.
pub struct HitPayGateway {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HitPayGateway {
    pub fn new(
        api_url: String,
        api_key: String,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .context("failed to build HitPay HTTP client")?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl PaymentGateway for HitPayGateway {
    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> anyhow::Result<CreatedPaymentRequest> {
        let amount = format!("{:.2}", request.amount);
        let form = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("reference_number", request.reference_number.as_str()),
            ("redirect_url", request.redirect_url.as_str()),
            ("webhook", request.webhook_url.as_str()),
            ("payment_methods[]", request.payment_method.gateway_method()),
            ("name", request.name.as_str()),
            ("email", request.email.as_str()),
            ("purpose", request.purpose.as_str()),
        ];

        let created: CreatedPaymentRequest = self
            .client
            .post(format!("{}/v1/payment-requests", self.api_url))
            .header("X-BUSINESS-API-KEY", &self.api_key)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&form)
            .send()
            .await
            .context("failed to reach HitPay")?
            .error_for_status()
            .context("HitPay rejected payment request")?
            .json()
            .await
            .context("malformed HitPay payment request response")?;

        tracing::info!(
            payment_request_id = %created.id,
            reference = %request.reference_number,
            "HitPay payment request created"
        );
        Ok(created)
    }

    async fn refund(&self, payment_id: &str, amount: Decimal) -> anyhow::Result<RefundResult> {
        let amount = format!("{amount:.2}");
        let result: RefundResult = self
            .client
            .post(format!("{}/v1/refund", self.api_url))
            .header("X-BUSINESS-API-KEY", &self.api_key)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[("payment_id", payment_id), ("amount", amount.as_str())])
            .send()
            .await
            .context("failed to reach HitPay")?
            .error_for_status()
            .context("HitPay rejected refund")?
            .json()
            .await
            .context("malformed HitPay refund response")?;

        tracing::info!(payment_id, status = %result.status, "HitPay refund requested");
        Ok(result)
    }
}
