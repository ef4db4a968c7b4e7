use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::attendance::{AttendanceEntry, CheckOutResult};
use crate::auth::Actor;
use crate::db::models::RosterRecord;
use crate::error::Result;
use crate::payout::PayoutBreakdown;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub shift_id: i32,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub roster: RosterRecord,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    actor.require_volunteer()?;

    let roster = state.attendance.register(actor.user_id, req.shift_id).await?;

    Ok(Json(RegisterResponse {
        message: "Registered for shift".to_string(),
        roster,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub shift_id: i32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub message: String,
    pub check_in_time: DateTime<Utc>,
    pub distance_from_site: f64,
    pub shift_title: String,
    pub project_name: String,
}

pub async fn check_in(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>> {
    actor.require_volunteer()?;

    let result = state
        .attendance
        .check_in(actor.user_id, req.shift_id, req.latitude, req.longitude)
        .await?;

    Ok(Json(CheckInResponse {
        message: "Checked in successfully".to_string(),
        // check_in is only Ok when the time was stamped, so this can't be None
        check_in_time: result.roster.check_in_time.unwrap_or_else(Utc::now),
        distance_from_site: (result.distance * 100.0).round() / 100.0,
        shift_title: result.shift_title,
        project_name: result.project_name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckOutRequest {
    pub shift_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    // optional because clients without beneficiary tracking omit it
    pub beneficiaries_served: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CheckOutResponse {
    pub message: String,
    pub outcome: &'static str,
    pub roster: RosterRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<PayoutBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
}

pub async fn check_out(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CheckOutRequest>,
) -> Result<Json<CheckOutResponse>> {
    actor.require_volunteer()?;

    // rate snapshot taken once here and passed down, never re-read mid-payout
    let rates = state.rules.current_rates().await?;

    let result = state
        .attendance
        .check_out(
            actor.user_id,
            req.shift_id,
            req.latitude,
            req.longitude,
            req.beneficiaries_served.unwrap_or(0),
            rates,
        )
        .await?;

    let response = match result {
        CheckOutResult::Paid {
            roster,
            breakdown,
            transaction_id,
        } => CheckOutResponse {
            message: if breakdown.capped {
                "Checked out; payout capped to remaining shift funds".to_string()
            } else {
                "Checked out and paid".to_string()
            },
            outcome: "paid",
            roster,
            payout: Some(breakdown),
            transaction_id: Some(transaction_id),
        },
        CheckOutResult::NothingToDisburse { roster } => CheckOutResponse {
            message: "Checked out; nothing to disburse".to_string(),
            outcome: "nothing_to_disburse",
            roster,
            payout: None,
            transaction_id: None,
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct ShiftAttendanceResponse {
    pub shift_id: i32,
    pub total_volunteers: usize,
    pub checked_in: usize,
    pub completed: usize,
    pub attendance: Vec<AttendanceEntry>,
}

pub async fn get_shift_attendance(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(shift_id): Path<i32>,
) -> Result<Json<ShiftAttendanceResponse>> {
    actor.require_staff()?;

    let attendance = state.attendance.shift_attendance(shift_id).await?;

    let checked_in = attendance
        .iter()
        .filter(|a| a.check_in_time.is_some())
        .count();
    let completed = attendance
        .iter()
        .filter(|a| a.check_out_time.is_some())
        .count();

    Ok(Json(ShiftAttendanceResponse {
        shift_id,
        total_volunteers: attendance.len(),
        checked_in,
        completed,
        attendance,
    }))
}
