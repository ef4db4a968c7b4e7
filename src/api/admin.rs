use axum::{extract::State, Json};
use serde::Serialize;
use sqlx::Row;
use std::sync::Arc;

use crate::auth::Actor;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_paid_out: i64,
    pub total_pending_payout: i64,
    pub total_beneficiaries: i64,
    pub total_shift_funding: i64,
}

/// High-level money-movement stats for the admin dashboard.
pub async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<DashboardStats>> {
    actor.require_admin()?;

    // one query so the numbers are a consistent snapshot
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transaction_log
             WHERE kind = 'payout' AND status = 'completed') AS paid,
            (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transaction_log
             WHERE status = 'pending') AS pending,
            (SELECT COALESCE(SUM(beneficiaries_served), 0)::BIGINT FROM shift_roster) AS beneficiaries,
            (SELECT COALESCE(SUM(funded_amount), 0)::BIGINT FROM shifts) AS funding
        "#,
    )
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(DashboardStats {
        total_paid_out: row.get("paid"),
        total_pending_payout: row.get("pending"),
        total_beneficiaries: row.get("beneficiaries"),
        total_shift_funding: row.get("funding"),
    }))
}
