//! Payout rule resolver: the single active global rate configuration.

use sqlx::PgPool;

use crate::db::models::GlobalRulesRecord;
use crate::error::{ApiError, Result};
use crate::payout::PayoutRates;

pub struct RulesService {
    db_pool: PgPool,
    default_rates: PayoutRates,
}

impl RulesService {
    pub fn new(db_pool: PgPool, default_rates: PayoutRates) -> Self {
        Self {
            db_pool,
            default_rates,
        }
    }

    /// Rate snapshot for a payout calculation. Falls back to the configured
    /// defaults when no rules row exists; never writes.
    pub async fn current_rates(&self) -> Result<PayoutRates> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"SELECT base_hourly_rate, bonus_per_beneficiary FROM global_rules ORDER BY id LIMIT 1"#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(match row {
            Some((base_hourly_rate, bonus_per_beneficiary)) => PayoutRates {
                base_hourly_rate,
                bonus_per_beneficiary,
            },
            None => self.default_rates,
        })
    }

    /// Admin read path. Lazily persists the default row when none exists so
    /// subsequent updates have a row to target.
    pub async fn current_rules(&self) -> Result<GlobalRulesRecord> {
        let existing = sqlx::query_as::<_, GlobalRulesRecord>(
            r#"SELECT * FROM global_rules ORDER BY id LIMIT 1"#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some(rules) = existing {
            return Ok(rules);
        }

        tracing::info!(
            "No global rules row found, seeding defaults ({}/{})",
            self.default_rates.base_hourly_rate,
            self.default_rates.bonus_per_beneficiary
        );

        let seeded = sqlx::query_as::<_, GlobalRulesRecord>(
            r#"
            INSERT INTO global_rules (base_hourly_rate, bonus_per_beneficiary)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(self.default_rates.base_hourly_rate)
        .bind(self.default_rates.bonus_per_beneficiary)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(seeded)
    }

    /// Replace the active rates. Last writer wins; the rate table is
    /// read-mostly so no row lock is taken here.
    pub async fn update_rules(
        &self,
        updated_by: i32,
        base_hourly_rate: i64,
        bonus_per_beneficiary: i64,
    ) -> Result<GlobalRulesRecord> {
        if base_hourly_rate < 0 {
            return Err(ApiError::Validation(
                "base_hourly_rate cannot be negative".to_string(),
            ));
        }
        if bonus_per_beneficiary < 0 {
            return Err(ApiError::Validation(
                "bonus_per_beneficiary cannot be negative".to_string(),
            ));
        }

        // ensure the singleton row exists before updating it
        let current = self.current_rules().await?;

        let updated = sqlx::query_as::<_, GlobalRulesRecord>(
            r#"
            UPDATE global_rules
            SET base_hourly_rate = $1,
                bonus_per_beneficiary = $2,
                updated_by = $3,
                updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(base_hourly_rate)
        .bind(bonus_per_beneficiary)
        .bind(updated_by)
        .bind(current.id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            "Global rules updated by user {}: rate={} bonus={}",
            updated_by,
            base_hourly_rate,
            bonus_per_beneficiary
        );

        Ok(updated)
    }
}
