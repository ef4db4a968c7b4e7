use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Actor;
use crate::db::models::GlobalRulesRecord;
use crate::error::Result;
use crate::AppState;

pub async fn get_rules(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<GlobalRulesRecord>> {
    actor.require_admin()?;

    // seeds the default row on first read so updates have a target
    let rules = state.rules.current_rules().await?;
    Ok(Json(rules))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRulesRequest {
    // cents per hour / per beneficiary
    pub base_hourly_rate: i64,
    pub bonus_per_beneficiary: i64,
}

pub async fn update_rules(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<UpdateRulesRequest>,
) -> Result<Json<GlobalRulesRecord>> {
    actor.require_admin()?;

    let updated = state
        .rules
        .update_rules(actor.user_id, req.base_hourly_rate, req.bonus_per_beneficiary)
        .await?;

    Ok(Json(updated))
}
