use std::sync::Arc;

use hmac::{Hmac, Mac};
use rusqlite::{Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, PaymentStatus};
use crate::services::audit::{self, AuditBatch};
use crate::services::gateway::PaymentRequest;
use crate::services::intake::lenient;
use crate::services::ledger::CreatedBooking;
use crate::services::notify::{self, NotificationEvent};
use crate::services::pricing;
use crate::services::release;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const NO_ROWS_UPDATED: &str = "No rows updated";

/// Constant-time check of the hex HMAC-SHA256 the gateway sends with each webhook.
pub fn verify_signature(salt: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(salt.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

pub fn sign(salt: &str, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(salt.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default)]
    pub payment_request: Option<WebhookPaymentRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPaymentRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reference_number: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Succeeded {
        booking_id: i64,
        payment_request_id: String,
        payment_id: Option<String>,
        amount: Decimal,
    },
    Failed {
        booking_id: i64,
        payment_request_id: String,
    },
    Refunded {
        booking_id: Option<i64>,
        payment_id: Option<String>,
        payment_request_id: Option<String>,
    },
    Ignored(String),
}

fn missing_fields() -> AppError {
    AppError::WebhookIntegrity("Missing required fields".to_string())
}

impl WebhookPayload {
    pub fn into_event(self) -> Result<GatewayEvent, AppError> {
        let request = self.payment_request.unwrap_or_default();
        let booking_id = request
            .reference_number
            .as_deref()
            .and_then(|r| r.trim().parse::<i64>().ok());

        match self.status.as_str() {
            "succeeded" => {
                let amount = request.amount.as_deref().and_then(|a| a.trim().parse::<Decimal>().ok());
                match (booking_id, request.id, amount) {
                    (Some(booking_id), Some(payment_request_id), Some(amount)) => {
                        Ok(GatewayEvent::Succeeded {
                            booking_id,
                            payment_request_id,
                            payment_id: self.id,
                            amount,
                        })
                    }
                    _ => Err(missing_fields()),
                }
            }
            "failed" => match (booking_id, request.id) {
                (Some(booking_id), Some(payment_request_id)) => Ok(GatewayEvent::Failed {
                    booking_id,
                    payment_request_id,
                }),
                _ => Err(missing_fields()),
            },
            "refunded" => {
                if booking_id.is_none() && self.id.is_none() && request.id.is_none() {
                    return Err(missing_fields());
                }
                Ok(GatewayEvent::Refunded {
                    booking_id,
                    payment_id: self.id,
                    payment_request_id: request.id,
                })
            }
            other => Ok(GatewayEvent::Ignored(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { booking_id: i64 },
    Ignored,
}

enum Transition {
    Applied { booking_id: i64, audit: AuditBatch },
    Missed { action: String, error: AppError },
}

impl Transition {
    fn missed(action: impl Into<String>, error: AppError) -> Self {
        Transition::Missed {
            action: action.into(),
            error,
        }
    }
}

/// Runs `f` in an IMMEDIATE transaction. Only applied transitions commit.
///
/// A guard that matches no row yields `Missed`: the transaction is dropped and
/// [`settle`] writes a no-op audit line. Gateway calls and notifications stay
/// outside.
fn transact<F>(state: &AppState, f: F) -> Result<Transition, AppError>
where
    F: FnOnce(&Transaction<'_>) -> Result<Transition, AppError>,
{
    let mut db = state.conn()?;
    let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let transition = f(&tx)?;
    if matches!(transition, Transition::Applied { .. }) {
        tx.commit()?;
    }
    Ok(transition)
}

/// Publishes a committed transition, or records the no-op and returns its error.
fn settle(
    state: &Arc<AppState>,
    transition: Transition,
    booking_id: Option<i64>,
    admin_id: Option<i64>,
) -> Result<i64, AppError> {
    match transition {
        Transition::Applied { booking_id, audit } => {
            audit.publish(state);
            Ok(booking_id)
        }
        Transition::Missed { action, error } => {
            tracing::warn!(?booking_id, reason = %error, "transition skipped");
            audit::record(state, &action, booking_id, admin_id);
            Err(error)
        }
    }
}

fn load_booking(state: &AppState, booking_id: i64) -> Result<Booking, AppError> {
    let db = state.conn()?;
    queries::get_booking(&db, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Verifies, parses and applies a raw webhook body.
pub async fn handle_webhook(
    state: &Arc<AppState>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<WebhookOutcome, AppError> {
    let Some(signature) = signature.filter(|s| !s.trim().is_empty()) else {
        tracing::warn!("webhook rejected: missing signature header");
        return Err(AppError::WebhookIntegrity(
            "Missing Hitpay-Signature header".to_string(),
        ));
    };
    if !verify_signature(&state.config.hitpay_salt, body, signature) {
        tracing::warn!("webhook rejected: invalid signature");
        return Err(AppError::WebhookIntegrity("Invalid signature".to_string()));
    }

    let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "webhook rejected: invalid payload");
        AppError::WebhookIntegrity("Invalid payload".to_string())
    })?;

    apply_gateway_event(state, payload.into_event()?).await
}

pub async fn apply_gateway_event(
    state: &Arc<AppState>,
    event: GatewayEvent,
) -> Result<WebhookOutcome, AppError> {
    match event {
        GatewayEvent::Succeeded {
            booking_id,
            payment_request_id,
            payment_id,
            amount,
        } => {
            let result = transact(state, |tx| {
                payment_succeeded(tx, booking_id, &payment_request_id, payment_id.as_deref(), amount)
            });
            let transition = match result {
                Err(e @ AppError::PricingMismatch { .. }) => {
                    tracing::warn!(booking_id, amount = %amount, "webhook amount does not match booking price");
                    audit::record(
                        state,
                        "Webhook failed to process payment: Invalid total amount",
                        Some(booking_id),
                        None,
                    );
                    return Err(e);
                }
                other => other?,
            };
            let booking_id = settle(state, transition, Some(booking_id), None)?;
            state.revenue.invalidate();
            tracing::info!(booking_id, "payment confirmed by gateway");
            notify::send(state, booking_id, NotificationEvent::Confirmation).await;
            Ok(WebhookOutcome::Applied { booking_id })
        }
        GatewayEvent::Failed {
            booking_id,
            payment_request_id,
        } => {
            let transition = transact(state, |tx| {
                if !queries::mark_payment_failed(tx, booking_id, &payment_request_id)? {
                    return Ok(Transition::missed(
                        format!("Webhook failed to record payment failure: {NO_ROWS_UPDATED}"),
                        AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
                    ));
                }
                let mut audit = AuditBatch::new();
                audit.write(tx, "Webhook recorded payment failure", Some(booking_id), None)?;
                Ok(Transition::Applied { booking_id, audit })
            })?;
            let booking_id = settle(state, transition, Some(booking_id), None)?;
            state.revenue.invalidate();
            tracing::info!(booking_id, "payment failure recorded");
            Ok(WebhookOutcome::Applied { booking_id })
        }
        GatewayEvent::Refunded {
            booking_id,
            payment_id,
            payment_request_id,
        } => {
            let transition = transact(state, |tx| {
                refund_completed(tx, booking_id, payment_id.as_deref(), payment_request_id.as_deref())
            })?;
            let booking_id = settle(state, transition, booking_id, None)?;
            state.revenue.invalidate();
            tracing::info!(booking_id, "refund confirmed by gateway");
            notify::send(state, booking_id, NotificationEvent::Refund).await;
            Ok(WebhookOutcome::Applied { booking_id })
        }
        GatewayEvent::Ignored(status) => {
            tracing::info!(status = %status, "ignoring webhook status");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

fn payment_succeeded(
    tx: &Transaction<'_>,
    booking_id: i64,
    payment_request_id: &str,
    payment_id: Option<&str>,
    amount: Decimal,
) -> Result<Transition, AppError> {
    let booking = queries::get_booking(tx, booking_id)?.filter(|b| {
        b.payment_status == PaymentStatus::Pending
            && b.payment_request_id.as_deref() == Some(payment_request_id)
    });
    let Some(booking) = booking else {
        return Ok(Transition::missed(
            "Webhook failed to process payment: No matching booking found or payment_status is not pending",
            AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
        ));
    };

    let expected = pricing::expected_amount(&pricing::quote_for_booking(tx, &booking)?)?;
    pricing::validate(expected, amount)?;
    pricing::validate(booking.total_amount, amount)?;

    if !queries::mark_payment_completed(tx, booking_id, payment_request_id, payment_id)? {
        return Ok(Transition::missed(
            format!("Webhook failed to process payment: {NO_ROWS_UPDATED}"),
            AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
        ));
    }

    let mut audit = AuditBatch::new();
    if queries::confirm_if_open(tx, booking_id)? {
        audit.write(
            tx,
            "Webhook updated service status to confirmed due to payment success",
            Some(booking_id),
            None,
        )?;
    }
    audit.write(tx, "Webhook confirmed payment", Some(booking_id), None)?;
    Ok(Transition::Applied { booking_id, audit })
}

fn refund_completed(
    tx: &Transaction<'_>,
    booking_id: Option<i64>,
    payment_id: Option<&str>,
    payment_request_id: Option<&str>,
) -> Result<Transition, AppError> {
    let Some(booking) = queries::find_refund_pending(tx, booking_id, payment_id, payment_request_id)?
    else {
        return Ok(Transition::missed(
            "Webhook failed to process refund: No matching booking with a pending refund",
            AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
        ));
    };

    if !queries::mark_refunded(tx, booking.id)? {
        return Ok(Transition::missed(
            format!("Webhook failed to process refund: {NO_ROWS_UPDATED}"),
            AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
        ));
    }

    let mut audit = AuditBatch::new();
    audit.write(tx, "Webhook processed refund and cancelled booking", Some(booking.id), None)?;
    if booking.status != BookingStatus::Cancelled {
        release::release(tx, &booking, None, &mut audit)?;
    }
    Ok(Transition::Applied {
        booking_id: booking.id,
        audit,
    })
}

// ── Admin actions ──

pub async fn update_status(
    state: &Arc<AppState>,
    booking_id: i64,
    status: BookingStatus,
    admin_id: Option<i64>,
) -> Result<Booking, AppError> {
    let current = load_booking(state, booking_id)?;
    if current.status == status {
        return Ok(current);
    }

    let transition = transact(state, |tx| {
        let Some(booking) = queries::get_booking(tx, booking_id)? else {
            return Err(AppError::NotFound(format!("booking {booking_id}")));
        };
        if booking.status.is_terminal() {
            return Ok(Transition::missed(
                "Admin status update rejected: booking is cancelled",
                AppError::conflict("Cancelled bookings cannot be changed."),
            ));
        }
        if !queries::update_booking_status(tx, booking_id, status)? {
            return Ok(Transition::missed(
                format!("Admin failed to update service status: {NO_ROWS_UPDATED}"),
                AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
            ));
        }

        let mut audit = AuditBatch::new();
        audit.write(
            tx,
            &format!("Admin updated service status to {}", status.as_str()),
            Some(booking_id),
            admin_id,
        )?;
        if status == BookingStatus::Cancelled {
            release::release(tx, &booking, admin_id, &mut audit)?;
        }
        Ok(Transition::Applied { booking_id, audit })
    })?;
    settle(state, transition, Some(booking_id), admin_id)?;

    if status == BookingStatus::Completed {
        notify::send(state, booking_id, NotificationEvent::Completion).await;
    }
    load_booking(state, booking_id)
}

pub async fn confirm_payment(
    state: &Arc<AppState>,
    booking_id: i64,
    admin_id: Option<i64>,
) -> Result<Booking, AppError> {
    let transition = transact(state, |tx| {
        if queries::get_booking(tx, booking_id)?.is_none() {
            return Err(AppError::NotFound(format!("booking {booking_id}")));
        }
        if !queries::mark_payment_completed_manually(tx, booking_id)? {
            return Ok(Transition::missed(
                "Admin failed to confirm payment: payment is not pending",
                AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
            ));
        }

        let mut audit = AuditBatch::new();
        if queries::confirm_if_open(tx, booking_id)? {
            audit.write(tx, "Admin updated service status to confirmed", Some(booking_id), admin_id)?;
        }
        audit.write(tx, "Admin manually confirmed payment", Some(booking_id), admin_id)?;
        Ok(Transition::Applied { booking_id, audit })
    })?;
    settle(state, transition, Some(booking_id), admin_id)?;
    state.revenue.invalidate();

    notify::send(state, booking_id, NotificationEvent::Confirmation).await;
    load_booking(state, booking_id)
}

/// Claims the refund lock, then asks the gateway to refund.
///
/// The booking is only cancelled once the gateway's `refunded` webhook arrives.
pub async fn refund_payment(
    state: &Arc<AppState>,
    booking_id: i64,
    admin_id: Option<i64>,
) -> Result<Booking, AppError> {
    let mut claimed: Option<Booking> = None;
    let transition = transact(state, |tx| {
        let Some(booking) = queries::get_booking(tx, booking_id)? else {
            return Err(AppError::NotFound(format!("booking {booking_id}")));
        };
        if booking.payment_id.is_none() && booking.payment_request_id.is_none() {
            return Err(AppError::validation("This booking has no payment to refund."));
        }
        if !queries::claim_refund(tx, booking_id)? {
            return Ok(if booking.refund_pending {
                Transition::missed(
                    "Admin refund rejected: refund already pending",
                    AppError::conflict("A refund is already pending for this booking."),
                )
            } else {
                Transition::missed(
                    "Admin refund rejected: booking is not eligible",
                    AppError::conflict("Only paid, active bookings can be refunded."),
                )
            });
        }
        let mut audit = AuditBatch::new();
        audit.write(tx, "Admin requested refund", Some(booking_id), admin_id)?;
        claimed = Some(booking);
        Ok(Transition::Applied { booking_id, audit })
    })?;
    settle(state, transition, Some(booking_id), admin_id)?;
    state.revenue.invalidate();

    let Some(booking) = claimed else {
        return Err(AppError::Internal("refund claim lost".to_string()));
    };
    let reference = booking
        .payment_id
        .clone()
        .or_else(|| booking.payment_request_id.clone())
        .unwrap_or_default();

    let failure = match state.gateway.refund(&reference, booking.total_amount).await {
        Ok(result) if result.succeeded() => None,
        Ok(result) => Some(format!("gateway returned status {}", result.status)),
        Err(e) => Some(e.to_string()),
    };

    if let Some(reason) = failure {
        tracing::error!(booking_id, reason = %reason, "refund request failed, releasing lock");
        {
            let db = state.conn()?;
            queries::release_refund_claim(&db, booking_id)?;
        }
        state.revenue.invalidate();
        audit::record(state, "Admin refund failed, refund lock released", Some(booking_id), admin_id);
        return Err(AppError::Gateway("Refund request failed, please try again.".to_string()));
    }

    audit::record(
        state,
        "Admin initiated refund, awaiting webhook confirmation",
        Some(booking_id),
        admin_id,
    );
    tracing::info!(booking_id, "refund requested");
    load_booking(state, booking_id)
}

/// Opens a fresh payment request for a booking whose last payment failed.
pub async fn retry_payment(
    state: &Arc<AppState>,
    booking_id: i64,
    admin_id: Option<i64>,
) -> Result<CreatedBooking, AppError> {
    let (booking, client, amount) = {
        let db = state.conn()?;
        let booking = queries::get_booking(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        let client = queries::get_client(&db, booking.client_id)?;
        let amount = if booking.payment_status == PaymentStatus::Failed
            && booking.status != BookingStatus::Cancelled
        {
            Some(pricing::expected_amount(&pricing::quote_for_booking(&db, &booking)?)?)
        } else {
            None
        };
        (booking, client, amount)
    };

    let Some(amount) = amount else {
        audit::record(
            state,
            "Admin payment retry rejected: payment has not failed",
            Some(booking_id),
            admin_id,
        );
        return Err(AppError::conflict("Only failed payments can be retried."));
    };
    let client = client.ok_or_else(|| AppError::NotFound(format!("client for booking {booking_id}")))?;

    let request = PaymentRequest {
        amount,
        currency: state.config.currency.clone(),
        reference_number: booking_id.to_string(),
        redirect_url: state.config.redirect_url(booking_id),
        webhook_url: state.config.webhook_url(),
        payment_method: booking.payment_method,
        name: client.name,
        email: client.email,
        purpose: format!("{} booking #{booking_id}", booking.category.display_name()),
    };
    let created = match state.gateway.create_payment_request(&request).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(booking_id, error = %e, "payment retry failed");
            audit::record(state, "Admin payment retry failed: gateway error", Some(booking_id), admin_id);
            return Err(AppError::Gateway("Unable to set up payment, please try again.".to_string()));
        }
    };

    let transition = transact(state, |tx| {
        if !queries::restart_payment(tx, booking_id, &created.id, amount)? {
            return Ok(Transition::missed(
                format!("Admin payment retry failed: {NO_ROWS_UPDATED}"),
                AppError::GuardMiss(NO_ROWS_UPDATED.to_string()),
            ));
        }
        let mut audit = AuditBatch::new();
        audit.write(tx, "Admin retried payment with a new payment request", Some(booking_id), admin_id)?;
        Ok(Transition::Applied { booking_id, audit })
    })?;
    settle(state, transition, Some(booking_id), admin_id)?;
    state.revenue.invalidate();

    Ok(CreatedBooking {
        booking_id,
        redirect_url: created.url,
        payment_request_id: created.id,
    })
}
