use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::services::reconciliation::{self, WebhookOutcome};
use crate::state::AppState;

// POST /webhook/payment
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // Signed over the raw bytes, so the body is not parsed before verification
    let signature = headers
        .get("hitpay-signature")
        .and_then(|v| v.to_str().ok());

    let outcome = reconciliation::handle_webhook(&state, &body, signature).await?;

    Ok(Json(match outcome {
        WebhookOutcome::Applied { booking_id } => {
            serde_json::json!({ "status": "ok", "booking_id": booking_id })
        }
        WebhookOutcome::Ignored => serde_json::json!({ "status": "ignored" }),
    }))
}
