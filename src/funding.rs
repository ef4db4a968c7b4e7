//! Shift funding ledger: admin top-ups in, payout debits out.
//!
//! The funded balance on a shift is the one hot shared mutable resource in
//! the system. Every mutation goes through a transaction holding the shift
//! row lock (`SELECT ... FOR UPDATE`), so concurrent top-ups and checkouts
//! serialize instead of losing updates.

use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::Actor;
use crate::db::models::{ShiftRecord, ShiftStatus, TransactionKind, TransactionRecord, TransactionStatus};
use crate::error::{ApiError, Result};
use crate::mpesa::{MpesaClient, StkPushResponse};

pub struct FundingService {
    db_pool: PgPool,
    mpesa: Arc<MpesaClient>,
}

#[derive(Debug, serde::Serialize)]
pub struct FundingStatus {
    pub shift_id: i32,
    pub funded_amount: i64,
    pub is_funded: bool,
    pub total_payouts: i64,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    Completed(TransactionRecord),
    Failed(TransactionRecord),
    /// Callback delivered more than once; nothing changed.
    AlreadyReconciled(TransactionRecord),
}

impl FundingService {
    pub fn new(db_pool: PgPool, mpesa: Arc<MpesaClient>) -> Self {
        Self { db_pool, mpesa }
    }

    /// Start a funding top-up: push the payment prompt to the funder's phone
    /// and record a pending transaction. The balance is only credited once
    /// the gateway callback confirms the payment.
    pub async fn initiate_top_up(
        &self,
        actor: Actor,
        shift_id: i32,
        amount: i64,
        phone: &str,
    ) -> Result<(TransactionRecord, StkPushResponse)> {
        actor.require_staff()?;
        if amount <= 0 {
            return Err(ApiError::Validation("amount must be greater than zero".to_string()));
        }

        let row: Option<(ShiftStatus, i32)> = sqlx::query_as(
            r#"
            SELECT s.status, o.user_id
            FROM shifts s
            JOIN projects p ON p.id = s.project_id
            JOIN organizations o ON o.id = p.org_id
            WHERE s.id = $1
            "#,
        )
        .bind(shift_id)
        .fetch_optional(&self.db_pool)
        .await?;

        let (status, owner_user_id) = row.ok_or_else(|| ApiError::NotFound("Shift".to_string()))?;
        actor.owns_or_admin(owner_user_id)?;

        if matches!(status, ShiftStatus::Completed | ShiftStatus::Cancelled) {
            return Err(ApiError::StateConflict {
                current: status.as_str().to_string(),
            });
        }

        // the pending row goes in before the push so every in-flight prompt
        // has a reconcile target even if we crash right after sending it
        let pending = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transaction_log
                (user_id, shift_id, kind, amount, phone, description, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(actor.user_id)
        .bind(shift_id)
        .bind(TransactionKind::Funding)
        .bind(amount)
        .bind(phone)
        .bind(format!("Funding top-up for shift {}", shift_id))
        .bind(TransactionStatus::Pending)
        .fetch_one(&self.db_pool)
        .await?;

        let push = match self
            .mpesa
            .stk_push(
                phone,
                amount,
                &format!("SHIFT-{}", shift_id),
                "VolaPlace shift funding",
            )
            .await
        {
            Ok(push) => push,
            Err(e) => {
                // push never left the gateway, so the row is dead on arrival
                sqlx::query(
                    r#"UPDATE transaction_log SET status = 'failed', completed_at = NOW() WHERE id = $1"#,
                )
                .bind(pending.id)
                .execute(&self.db_pool)
                .await?;
                return Err(e);
            }
        };

        let transaction = sqlx::query_as::<_, TransactionRecord>(
            r#"
            UPDATE transaction_log
            SET checkout_request_id = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(&push.checkout_request_id)
        .bind(pending.id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            "Funding top-up initiated: shift={} amount={} checkout_request_id={}",
            shift_id,
            amount,
            push.checkout_request_id
        );

        Ok((transaction, push))
    }

    pub async fn funding_status(&self, shift_id: i32) -> Result<FundingStatus> {
        let shift: Option<(i64, bool)> =
            sqlx::query_as(r#"SELECT funded_amount, is_funded FROM shifts WHERE id = $1"#)
                .bind(shift_id)
                .fetch_optional(&self.db_pool)
                .await?;

        let (funded_amount, is_funded) =
            shift.ok_or_else(|| ApiError::NotFound("Shift".to_string()))?;

        // cast to BIGINT because SUM returns NUMERIC which causes type issues with sqlx
        let total_payouts: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM transaction_log
            WHERE shift_id = $1 AND kind = 'payout' AND status = 'completed'
            "#,
        )
        .bind(shift_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(FundingStatus {
            shift_id,
            funded_amount,
            is_funded,
            total_payouts,
        })
    }

    /// Reconcile a gateway callback against its pending transaction row.
    /// Idempotent: the gateway retries callbacks, so a transaction that has
    /// already left the pending state is returned unchanged.
    pub async fn reconcile_callback(
        &self,
        checkout_request_id: &str,
        success: bool,
        failure_reason: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let mut tx = self.db_pool.begin().await?;

        let transaction = sqlx::query_as::<_, TransactionRecord>(
            r#"SELECT * FROM transaction_log WHERE checkout_request_id = $1 FOR UPDATE"#,
        )
        .bind(checkout_request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

        if !matches!(
            transaction.status,
            TransactionStatus::Pending | TransactionStatus::Processing
        ) {
            tx.commit().await?;
            return Ok(ReconcileOutcome::AlreadyReconciled(transaction));
        }

        let outcome = if success {
            let updated = sqlx::query_as::<_, TransactionRecord>(
                r#"
                UPDATE transaction_log
                SET status = 'completed', completed_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(transaction.id)
            .fetch_one(&mut *tx)
            .await?;

            // a confirmed funding payment credits the shift balance exactly once
            if updated.kind == TransactionKind::Funding {
                if let Some(shift_id) = updated.shift_id {
                    let shift = sqlx::query_as::<_, ShiftRecord>(
                        r#"SELECT * FROM shifts WHERE id = $1 FOR UPDATE"#,
                    )
                    .bind(shift_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| ApiError::NotFound("Shift".to_string()))?;

                    credit_locked(&mut tx, &shift, updated.amount, updated.id).await?;
                }
            }

            tracing::info!(
                "Transaction {} reconciled as completed ({})",
                updated.id,
                checkout_request_id
            );
            ReconcileOutcome::Completed(updated)
        } else {
            let updated = sqlx::query_as::<_, TransactionRecord>(
                r#"
                UPDATE transaction_log
                SET status = 'failed', completed_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(transaction.id)
            .fetch_one(&mut *tx)
            .await?;

            tracing::warn!(
                "Transaction {} reconciled as failed ({}): {}",
                updated.id,
                checkout_request_id,
                failure_reason.unwrap_or("no reason given")
            );
            ReconcileOutcome::Failed(updated)
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

/// New (balance, is_funded) after a credit. `is_funded` always tracks
/// whether the balance is positive.
fn apply_credit(balance: i64, amount: i64) -> (i64, bool) {
    let new_balance = balance + amount;
    (new_balance, new_balance > 0)
}

/// New (balance, is_funded) after a debit, clamping at zero.
fn apply_debit(balance: i64, amount: i64) -> (i64, bool) {
    let new_balance = (balance - amount).max(0);
    (new_balance, new_balance > 0)
}

/// Credit a shift balance. Caller must hold the shift row lock.
pub(crate) async fn credit_locked(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shift: &ShiftRecord,
    amount: i64,
    funding_transaction_id: i32,
) -> Result<i64> {
    let (new_balance, is_funded) = apply_credit(shift.funded_amount, amount);
    sqlx::query(
        r#"
        UPDATE shifts
        SET funded_amount = $1,
            is_funded = $2,
            funding_transaction_id = $3,
            updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(new_balance)
    .bind(is_funded)
    .bind(funding_transaction_id)
    .bind(shift.id)
    .execute(&mut **tx)
    .await?;

    Ok(new_balance)
}

/// Debit a shift balance, clamping at zero. Caller must hold the shift row
/// lock and must have already capped `amount` to the available balance.
pub(crate) async fn debit_locked(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shift: &ShiftRecord,
    amount: i64,
) -> Result<i64> {
    let (new_balance, is_funded) = apply_debit(shift.funded_amount, amount);
    sqlx::query(
        r#"
        UPDATE shifts
        SET funded_amount = $1, is_funded = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(new_balance)
    .bind(is_funded)
    .bind(shift.id)
    .execute(&mut **tx)
    .await?;

    Ok(new_balance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_raises_balance_and_flag() {
        assert_eq!(apply_credit(0, 5_000), (5_000, true));
        assert_eq!(apply_credit(5_000, 5_000), (10_000, true));
    }

    #[test]
    fn debit_clamps_at_zero() {
        assert_eq!(apply_debit(5_000, 2_000), (3_000, true));
        assert_eq!(apply_debit(5_000, 5_000), (0, false));
        assert_eq!(apply_debit(5_000, 9_999), (0, false));
    }

    #[test]
    fn funded_flag_always_tracks_balance() {
        let amounts = [0i64, 1, 2_500, 5_000, 10_000];
        for balance in amounts {
            for amount in amounts {
                let (b, funded) = apply_credit(balance, amount);
                assert_eq!(funded, b > 0, "credit {balance}+{amount}");
                let (b, funded) = apply_debit(balance, amount);
                assert_eq!(funded, b > 0, "debit {balance}-{amount}");
            }
        }
    }
}
