pub mod transitions;

use chrono::Utc;
use sqlx::PgPool;

use crate::db::models::{
    ProjectRecord, RosterRecord, RosterStatus, ShiftRecord, TransactionKind, TransactionStatus,
};
use crate::error::{ApiError, Result};
use crate::geo;
use crate::payout::{PayoutBreakdown, PayoutRates};
use transitions::Settlement;

pub struct AttendanceService {
    db_pool: PgPool,
}

#[derive(Debug)]
pub struct CheckInResult {
    pub roster: RosterRecord,
    pub distance: f64,
    pub shift_title: String,
    pub project_name: String,
}

#[derive(Debug)]
pub enum CheckOutResult {
    Paid {
        roster: RosterRecord,
        breakdown: PayoutBreakdown,
        transaction_id: i32,
    },
    NothingToDisburse {
        roster: RosterRecord,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct AttendanceEntry {
    pub volunteer_id: i32,
    pub status: RosterStatus,
    pub check_in_time: Option<chrono::DateTime<Utc>>,
    pub check_out_time: Option<chrono::DateTime<Utc>>,
    pub hours_worked: Option<f64>,
    pub beneficiaries_served: i32,
    pub payout_amount: Option<i64>,
}

impl AttendanceService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Register a volunteer for an upcoming shift. The shift row is locked so
    /// concurrent registrations can't both pass the headcount check.
    pub async fn register(&self, volunteer_id: i32, shift_id: i32) -> Result<RosterRecord> {
        let mut tx = self.db_pool.begin().await?;

        let shift = lock_shift(&mut tx, shift_id).await?;

        let existing = sqlx::query_as::<_, RosterRecord>(
            r#"SELECT * FROM shift_roster WHERE shift_id = $1 AND volunteer_id = $2"#,
        )
        .bind(shift_id)
        .bind(volunteer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let headcount: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM shift_roster WHERE shift_id = $1"#)
                .bind(shift_id)
                .fetch_one(&mut *tx)
                .await?;

        transitions::register(&shift, existing.as_ref(), headcount)?;

        let roster = sqlx::query_as::<_, RosterRecord>(
            r#"
            INSERT INTO shift_roster (shift_id, volunteer_id, status)
            VALUES ($1, $2, 'registered')
            RETURNING *
            "#,
        )
        .bind(shift_id)
        .bind(volunteer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Volunteer {} registered for shift {} ({}/{:?})",
            volunteer_id,
            shift_id,
            headcount + 1,
            shift.max_volunteers
        );

        Ok(roster)
    }

    pub async fn check_in(
        &self,
        volunteer_id: i32,
        shift_id: i32,
        latitude: f64,
        longitude: f64,
    ) -> Result<CheckInResult> {
        validate_coordinates(latitude, longitude)?;

        let mut tx = self.db_pool.begin().await?;

        let shift = lock_shift(&mut tx, shift_id).await?;
        let project = fetch_project(&mut tx, shift.project_id).await?;
        let roster = lock_roster(&mut tx, shift_id, volunteer_id).await?;

        let distance =
            geo::distance_meters(latitude, longitude, project.latitude, project.longitude);

        let outcome = transitions::check_in(
            &roster,
            &shift,
            distance,
            project.geofence_radius,
            Utc::now(),
        )?;

        let roster = sqlx::query_as::<_, RosterRecord>(
            r#"
            UPDATE shift_roster
            SET check_in_time = $1, status = 'checked_in'
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(outcome.check_in_time)
        .bind(roster.id)
        .fetch_one(&mut *tx)
        .await?;

        if outcome.start_shift {
            sqlx::query(
                r#"UPDATE shifts SET status = 'in_progress', updated_at = NOW() WHERE id = $1"#,
            )
            .bind(shift_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Volunteer {} checked in to shift {} at {:.1}m from site",
            volunteer_id,
            shift_id,
            distance
        );

        Ok(CheckInResult {
            roster,
            distance,
            shift_title: shift.title,
            project_name: project.name,
        })
    }

    /// Check out, settle the payout against the shift balance and log the
    /// transaction. The shift row is locked for the whole read-modify-write so
    /// two concurrent checkouts can never jointly overdraw the balance.
    pub async fn check_out(
        &self,
        volunteer_id: i32,
        shift_id: i32,
        latitude: f64,
        longitude: f64,
        beneficiaries_served: i32,
        rates: PayoutRates,
    ) -> Result<CheckOutResult> {
        validate_coordinates(latitude, longitude)?;
        if beneficiaries_served < 0 {
            return Err(ApiError::Validation(
                "beneficiaries_served cannot be negative".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let shift = lock_shift(&mut tx, shift_id).await?;
        let project = fetch_project(&mut tx, shift.project_id).await?;
        let roster = lock_roster(&mut tx, shift_id, volunteer_id).await?;

        let distance =
            geo::distance_meters(latitude, longitude, project.latitude, project.longitude);

        let outcome = transitions::check_out(
            &roster,
            &shift,
            distance,
            project.geofence_radius,
            beneficiaries_served,
            rates,
            Utc::now(),
        )?;

        let result = match outcome.settlement {
            Settlement::Disbursed(breakdown) => {
                let phone = volunteer_phone(&mut tx, volunteer_id).await?;

                crate::funding::debit_locked(&mut tx, &shift, breakdown.disbursed_amount).await?;

                let transaction_id: i32 = sqlx::query_scalar(
                    r#"
                    INSERT INTO transaction_log
                        (user_id, shift_id, shift_roster_id, kind, amount, phone, description, status, completed_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                    RETURNING id
                    "#,
                )
                .bind(volunteer_id)
                .bind(shift_id)
                .bind(roster.id)
                .bind(TransactionKind::Payout)
                .bind(breakdown.disbursed_amount)
                .bind(&phone)
                .bind(format!("Payout for shift {}", shift.title))
                .bind(TransactionStatus::Completed)
                .fetch_one(&mut *tx)
                .await?;

                let roster = sqlx::query_as::<_, RosterRecord>(
                    r#"
                    UPDATE shift_roster
                    SET check_out_time = $1,
                        beneficiaries_served = $2,
                        status = 'paid',
                        payout_amount = $3,
                        is_paid = TRUE,
                        paid_at = NOW()
                    WHERE id = $4
                    RETURNING *
                    "#,
                )
                .bind(outcome.check_out_time)
                .bind(outcome.beneficiaries_served)
                .bind(breakdown.disbursed_amount)
                .bind(roster.id)
                .fetch_one(&mut *tx)
                .await?;

                if breakdown.capped {
                    tracing::warn!(
                        "Partial payout on shift {}: computed={} disbursed={} (balance exhausted)",
                        shift_id,
                        breakdown.computed_amount,
                        breakdown.disbursed_amount
                    );
                }

                CheckOutResult::Paid {
                    roster,
                    breakdown,
                    transaction_id,
                }
            }
            Settlement::NothingToDisburse => {
                let roster = sqlx::query_as::<_, RosterRecord>(
                    r#"
                    UPDATE shift_roster
                    SET check_out_time = $1,
                        beneficiaries_served = $2,
                        status = 'completed'
                    WHERE id = $3
                    RETURNING *
                    "#,
                )
                .bind(outcome.check_out_time)
                .bind(outcome.beneficiaries_served)
                .bind(roster.id)
                .fetch_one(&mut *tx)
                .await?;

                CheckOutResult::NothingToDisburse { roster }
            }
        };

        tx.commit().await?;

        tracing::info!("Volunteer {} checked out of shift {}", volunteer_id, shift_id);

        Ok(result)
    }

    /// Attendance summary for one shift, for org dashboards.
    pub async fn shift_attendance(&self, shift_id: i32) -> Result<Vec<AttendanceEntry>> {
        let entries = sqlx::query_as::<_, RosterRecord>(
            r#"SELECT * FROM shift_roster WHERE shift_id = $1 ORDER BY created_at"#,
        )
        .bind(shift_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(entries
            .into_iter()
            .map(|e| {
                let hours_worked = match (e.check_in_time, e.check_out_time) {
                    (Some(start), Some(end)) => {
                        Some((end - start).num_seconds() as f64 / 3600.0)
                    }
                    _ => None,
                };
                AttendanceEntry {
                    volunteer_id: e.volunteer_id,
                    status: e.status,
                    check_in_time: e.check_in_time,
                    check_out_time: e.check_out_time,
                    hours_worked,
                    beneficiaries_served: e.beneficiaries_served,
                    payout_amount: e.payout_amount,
                }
            })
            .collect())
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !geo::valid_latitude(latitude) || !geo::valid_longitude(longitude) {
        return Err(ApiError::Validation(format!(
            "invalid coordinates ({}, {})",
            latitude, longitude
        )));
    }
    Ok(())
}

async fn lock_shift(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shift_id: i32,
) -> Result<ShiftRecord> {
    // FOR UPDATE serializes all funding mutations and payout debits per shift
    sqlx::query_as::<_, ShiftRecord>(r#"SELECT * FROM shifts WHERE id = $1 FOR UPDATE"#)
        .bind(shift_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Shift".to_string()))
}

async fn fetch_project(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    project_id: i32,
) -> Result<ProjectRecord> {
    sqlx::query_as::<_, ProjectRecord>(r#"SELECT * FROM projects WHERE id = $1"#)
        .bind(project_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project".to_string()))
}

async fn lock_roster(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shift_id: i32,
    volunteer_id: i32,
) -> Result<RosterRecord> {
    sqlx::query_as::<_, RosterRecord>(
        r#"SELECT * FROM shift_roster WHERE shift_id = $1 AND volunteer_id = $2 FOR UPDATE"#,
    )
    .bind(shift_id)
    .bind(volunteer_id)
    .fetch_optional(&mut **tx)
    .await?
    // pre-registration is required; check-in never creates the roster entry
    .ok_or_else(|| ApiError::StateConflict {
        current: "not registered for this shift".to_string(),
    })
}

async fn volunteer_phone(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    volunteer_id: i32,
) -> Result<String> {
    let row: Option<(Option<String>, String)> =
        sqlx::query_as(r#"SELECT mpesa_phone, phone FROM users WHERE id = $1"#)
            .bind(volunteer_id)
            .fetch_optional(&mut **tx)
            .await?;

    let (mpesa_phone, phone) = row.ok_or_else(|| ApiError::NotFound("User".to_string()))?;
    Ok(mpesa_phone.unwrap_or(phone))
}
