use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i32,
    pub org_id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    // meters, 1..=1000; location is immutable after creation
    pub geofence_radius: i32,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "shift_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Upcoming,
    InProgress,
    Completed,
    Cancelled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Upcoming => "upcoming",
            ShiftStatus::InProgress => "in_progress",
            ShiftStatus::Completed => "completed",
            ShiftStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShiftRecord {
    pub id: i32,
    pub project_id: i32,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_volunteers: Option<i32>,
    pub status: ShiftStatus,
    // all monetary amounts stored as i64 cents to match Postgres BIGINT
    // this avoids floating point drift on the running balance
    pub funded_amount: i64,
    pub is_funded: bool,
    pub funding_transaction_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "roster_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RosterStatus {
    Registered,
    CheckedIn,
    Completed,
    Paid,
}

impl RosterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosterStatus::Registered => "registered",
            RosterStatus::CheckedIn => "checked_in",
            RosterStatus::Completed => "completed",
            RosterStatus::Paid => "paid",
        }
    }
}

/// One attendance/payment record per (shift, volunteer) pair.
/// Uniqueness is enforced by a DB constraint on (shift_id, volunteer_id).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RosterRecord {
    pub id: i32,
    pub shift_id: i32,
    pub volunteer_id: i32,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub beneficiaries_served: i32,
    pub status: RosterStatus,
    pub payout_amount: Option<i64>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Singleton payout rate configuration. At most one row is ever read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GlobalRulesRecord {
    pub id: i32,
    pub base_hourly_rate: i64,
    pub bonus_per_beneficiary: i64,
    pub updated_by: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Funding,
    Payout,
}

/// Append-only money movement log. Rows are never mutated except the
/// status transition and completed_at stamping during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    pub id: i32,
    pub user_id: i32,
    pub shift_id: Option<i32>,
    pub shift_roster_id: Option<i32>,
    pub kind: TransactionKind,
    pub amount: i64,
    pub phone: String,
    pub checkout_request_id: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
