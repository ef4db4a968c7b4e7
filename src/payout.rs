//! Payout calculation: elapsed time and beneficiary count in, cents out.
//!
//! Rates are passed in explicitly (fetched once at the start of a checkout)
//! so the calculation is deterministic and testable with injected rate tables.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ApiError, Result};

/// Snapshot of the global rate table taken at the start of a payout.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PayoutRates {
    pub base_hourly_rate: i64,
    pub bonus_per_beneficiary: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutBreakdown {
    pub hours_worked: f64,
    pub base_amount: i64,
    pub beneficiary_bonus: i64,
    pub computed_amount: i64,
    /// What actually leaves the shift balance; less than `computed_amount`
    /// when the shift is underfunded.
    pub disbursed_amount: i64,
    pub capped: bool,
}

/// Compute the payout for a completed attendance window.
///
/// The state machine guarantees check-out is after check-in, but a
/// non-positive duration is still rejected here rather than letting a
/// negative payout through.
pub fn compute(
    check_in_time: DateTime<Utc>,
    check_out_time: DateTime<Utc>,
    beneficiaries_served: i32,
    rates: PayoutRates,
) -> Result<(f64, i64)> {
    let elapsed = check_out_time - check_in_time;
    let seconds = elapsed.num_seconds();
    if seconds <= 0 {
        return Err(ApiError::Validation(
            "check-out time must be after check-in time".to_string(),
        ));
    }
    if beneficiaries_served < 0 {
        return Err(ApiError::Validation(
            "beneficiaries_served cannot be negative".to_string(),
        ));
    }

    let hours_worked = seconds as f64 / 3600.0;
    let base_amount = (hours_worked * rates.base_hourly_rate as f64).round() as i64;
    let beneficiary_bonus = beneficiaries_served as i64 * rates.bonus_per_beneficiary;

    Ok((hours_worked, base_amount + beneficiary_bonus))
}

/// Cap a computed payout to the shift's remaining balance.
pub fn reconcile(
    hours_worked: f64,
    computed_amount: i64,
    beneficiaries_served: i32,
    rates: PayoutRates,
    funded_amount: i64,
) -> PayoutBreakdown {
    let beneficiary_bonus = beneficiaries_served as i64 * rates.bonus_per_beneficiary;
    let disbursed_amount = computed_amount.min(funded_amount);

    PayoutBreakdown {
        hours_worked,
        base_amount: computed_amount - beneficiary_bonus,
        beneficiary_bonus,
        computed_amount,
        disbursed_amount,
        capped: disbursed_amount < computed_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn rates() -> PayoutRates {
        // 100.00/hr plus 10.00 per beneficiary, in cents
        PayoutRates {
            base_hourly_rate: 10_000,
            bonus_per_beneficiary: 1_000,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn two_hours_three_beneficiaries() {
        let (hours, amount) = compute(t0(), t0() + Duration::hours(2), 3, rates()).unwrap();
        assert_eq!(amount, 23_000); // 2*100 + 3*10 = 230.00
        assert!((hours - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fractional_hours_round_to_nearest_cent() {
        // 90 minutes at 100.00/hr = 150.00 exactly
        let (_, amount) = compute(t0(), t0() + Duration::minutes(90), 0, rates()).unwrap();
        assert_eq!(amount, 15_000);

        // 1 second at 100.00/hr = 2.78 cents, rounds to 3 cents
        let (_, amount) = compute(t0(), t0() + Duration::seconds(1), 0, rates()).unwrap();
        assert_eq!(amount, 3);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = compute(t0(), t0(), 0, rates()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = compute(t0(), t0() - Duration::hours(1), 0, rates()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn negative_beneficiaries_rejected() {
        let err = compute(t0(), t0() + Duration::hours(1), -1, rates()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn full_payout_when_funds_cover_it() {
        let breakdown = reconcile(2.0, 23_000, 3, rates(), 50_000);
        assert_eq!(breakdown.disbursed_amount, 23_000);
        assert!(!breakdown.capped);
        assert_eq!(breakdown.base_amount, 20_000);
        assert_eq!(breakdown.beneficiary_bonus, 3_000);
    }

    #[test]
    fn payout_capped_to_remaining_balance() {
        let breakdown = reconcile(1.5, 15_000, 0, rates(), 10_000);
        assert_eq!(breakdown.disbursed_amount, 10_000);
        assert!(breakdown.capped);
        assert_eq!(breakdown.computed_amount, 15_000);
    }

    #[test]
    fn payout_never_exceeds_pre_debit_balance() {
        for funded in [0i64, 1, 22_999, 23_000, 23_001, 1_000_000] {
            let breakdown = reconcile(2.0, 23_000, 3, rates(), funded);
            assert!(breakdown.disbursed_amount <= funded);
            assert!(breakdown.disbursed_amount <= breakdown.computed_amount);
        }
    }
}
