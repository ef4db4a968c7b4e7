//! Pure attendance transitions: registered -> checked_in -> completed -> paid.
//!
//! Each function takes the current rows plus the already-measured geofence
//! distance and returns what should change, without touching storage. The
//! service layer applies the result inside one database transaction, so the
//! legality rules here stay auditable and unit-testable on their own.

use chrono::{DateTime, Utc};

use crate::db::models::{RosterRecord, RosterStatus, ShiftRecord, ShiftStatus};
use crate::error::{ApiError, Result};
use crate::geo;
use crate::payout::{self, PayoutBreakdown, PayoutRates};

#[derive(Debug)]
pub struct CheckIn {
    pub check_in_time: DateTime<Utc>,
    /// First check-in moves the parent shift from upcoming to in_progress.
    pub start_shift: bool,
}

#[derive(Debug)]
pub enum Settlement {
    /// Debit the shift, write a completed transaction row, mark the roster paid.
    Disbursed(PayoutBreakdown),
    /// Zero computed amount: the roster completes but no money moves and no
    /// transaction row is written.
    NothingToDisburse,
}

#[derive(Debug)]
pub struct CheckOut {
    pub check_out_time: DateTime<Utc>,
    pub beneficiaries_served: i32,
    pub settlement: Settlement,
}

/// Registration legality: shift accepting volunteers, not already registered,
/// headcount below capacity.
pub fn register(
    shift: &ShiftRecord,
    existing: Option<&RosterRecord>,
    current_headcount: i64,
) -> Result<()> {
    if existing.is_some() {
        return Err(ApiError::StateConflict {
            current: "already registered for this shift".to_string(),
        });
    }
    if shift.status != ShiftStatus::Upcoming {
        return Err(ApiError::StateConflict {
            current: shift.status.as_str().to_string(),
        });
    }
    if let Some(max) = shift.max_volunteers {
        if current_headcount >= max as i64 {
            return Err(ApiError::StateConflict {
                current: format!("shift is full ({} volunteers)", max),
            });
        }
    }
    Ok(())
}

fn check_geofence(distance: f64, radius: i32) -> Result<()> {
    if geo::within_radius(distance, radius) {
        Ok(())
    } else {
        Err(ApiError::GeofenceViolation {
            distance,
            required_radius: radius,
        })
    }
}

pub fn check_in(
    roster: &RosterRecord,
    shift: &ShiftRecord,
    distance: f64,
    geofence_radius: i32,
    now: DateTime<Utc>,
) -> Result<CheckIn> {
    check_geofence(distance, geofence_radius)?;

    if roster.check_in_time.is_some() {
        return Err(ApiError::StateConflict {
            current: roster.status.as_str().to_string(),
        });
    }
    if matches!(shift.status, ShiftStatus::Completed | ShiftStatus::Cancelled) {
        return Err(ApiError::StateConflict {
            current: shift.status.as_str().to_string(),
        });
    }

    Ok(CheckIn {
        check_in_time: now,
        start_shift: shift.status == ShiftStatus::Upcoming,
    })
}

pub fn check_out(
    roster: &RosterRecord,
    shift: &ShiftRecord,
    distance: f64,
    geofence_radius: i32,
    beneficiaries_served: i32,
    rates: PayoutRates,
    now: DateTime<Utc>,
) -> Result<CheckOut> {
    check_geofence(distance, geofence_radius)?;

    let check_in_time = roster.check_in_time.ok_or_else(|| ApiError::StateConflict {
        current: roster.status.as_str().to_string(),
    })?;
    if roster.check_out_time.is_some() {
        return Err(ApiError::StateConflict {
            current: roster.status.as_str().to_string(),
        });
    }

    // strict funding gate: an unfunded shift blocks checkout outright
    if !shift.is_funded || shift.funded_amount <= 0 {
        return Err(ApiError::FundingShortfall {
            funded_amount: shift.funded_amount,
        });
    }

    let (hours_worked, computed_amount) =
        payout::compute(check_in_time, now, beneficiaries_served, rates)?;

    let settlement = if computed_amount <= 0 {
        Settlement::NothingToDisburse
    } else {
        Settlement::Disbursed(payout::reconcile(
            hours_worked,
            computed_amount,
            beneficiaries_served,
            rates,
            shift.funded_amount,
        ))
    };

    Ok(CheckOut {
        check_out_time: now,
        beneficiaries_served,
        settlement,
    })
}
