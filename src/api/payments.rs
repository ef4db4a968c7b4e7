use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::Actor;
use crate::db::models::{TransactionKind, TransactionRecord, TransactionStatus};
use crate::error::{ApiError, Result};
use crate::funding::ReconcileOutcome;
use crate::AppState;

/// Gateway callback after an STK push. Always answers 200 so the gateway
/// stops retrying; reconciliation itself is idempotent.
pub async fn mpesa_callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let callback = &body["Body"]["stkCallback"];
    let result_code = callback["ResultCode"].as_i64();
    let checkout_request_id = callback["CheckoutRequestID"].as_str();
    let result_desc = callback["ResultDesc"].as_str();

    let (Some(result_code), Some(checkout_request_id)) = (result_code, checkout_request_id) else {
        tracing::warn!("Malformed M-Pesa callback: {}", body);
        return Json(json!({ "message": "Callback received" }));
    };

    match state
        .funding
        .reconcile_callback(checkout_request_id, result_code == 0, result_desc)
        .await
    {
        Ok(ReconcileOutcome::Completed(t)) => {
            tracing::info!("Payment confirmed: transaction={} amount={}", t.id, t.amount);
        }
        Ok(ReconcileOutcome::Failed(t)) => {
            tracing::warn!("Payment failed: transaction={}", t.id);
        }
        Ok(ReconcileOutcome::AlreadyReconciled(t)) => {
            tracing::debug!("Duplicate callback for transaction {}", t.id);
        }
        Err(e) => {
            // unknown checkout_request_id or DB trouble - log and still ack
            tracing::error!("Callback reconciliation error for {}: {}", checkout_request_id, e);
        }
    }

    Json(json!({ "message": "Callback received" }))
}

#[derive(Debug, Serialize)]
pub struct PendingPaymentsResponse {
    pub count: usize,
    pub transactions: Vec<TransactionRecord>,
}

pub async fn get_pending_payments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<PendingPaymentsResponse>> {
    let transactions = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT * FROM transaction_log
        WHERE user_id = $1 AND status = 'pending'
        ORDER BY created_at DESC
        "#,
    )
    .bind(actor.user_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| ApiError::Database(e.to_string()))?;

    Ok(Json(PendingPaymentsResponse {
        count: transactions.len(),
        transactions,
    }))
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    pub total_earned: i64,
    pub pending: i64,
    pub transactions: Vec<TransactionRecord>,
}

pub async fn get_payment_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<PaymentHistoryResponse>> {
    let transactions = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT * FROM transaction_log
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(actor.user_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| ApiError::Database(e.to_string()))?;

    Ok(Json(PaymentHistoryResponse {
        total_earned: earned_total(&transactions),
        pending: pending_total(&transactions),
        transactions,
    }))
}

// earned means settled payouts only; a funder's own completed top-ups are
// money out, not income
fn earned_total(transactions: &[TransactionRecord]) -> i64 {
    transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Payout && t.status == TransactionStatus::Completed)
        .map(|t| t.amount)
        .sum()
}

fn pending_total(transactions: &[TransactionRecord]) -> i64 {
    transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Pending)
        .map(|t| t.amount)
        .sum()
}
