use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Actor;
use crate::error::Result;
use crate::funding::FundingStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FundShiftRequest {
    // cents
    pub amount: i64,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct FundShiftResponse {
    pub message: String,
    pub transaction_id: i32,
    pub checkout_request_id: String,
    pub amount: i64,
}

/// Top up a shift's funding balance. The caller gets an STK push on their
/// phone; the balance is credited when the gateway callback confirms.
pub async fn fund_shift(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(shift_id): Path<i32>,
    Json(req): Json<FundShiftRequest>,
) -> Result<Json<FundShiftResponse>> {
    let (transaction, push) = state
        .funding
        .initiate_top_up(actor, shift_id, req.amount, &req.phone)
        .await?;

    Ok(Json(FundShiftResponse {
        message: push.customer_message,
        transaction_id: transaction.id,
        checkout_request_id: push.checkout_request_id,
        amount: transaction.amount,
    }))
}

pub async fn get_funding_status(
    State(state): State<Arc<AppState>>,
    Path(shift_id): Path<i32>,
) -> Result<Json<FundingStatus>> {
    let status = state.funding.funding_status(shift_id).await?;
    Ok(Json(status))
}
