use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::plans::PlanId;
use crate::types::ActionType;
use crate::usage::enforcement::Enforced;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub plan: Option<String>,
    pub action: ActionType,
    pub amount: Option<i64>,
}

/// POST /api/usage/:tenant/track - enforce-and-record: reserves quota and
/// bumps the counters for an action the caller is about to perform.
/// Denials come back as 403 LIMIT_REACHED with the blocking limit type.
pub async fn usage_track(
    State(state): State<AppState>,
    Path(tenant): Path<Uuid>,
    Json(body): Json<TrackRequest>,
) -> Result<Json<Value>, ApiError> {
    let amount = body.amount.unwrap_or(1);
    if amount <= 0 {
        return Err(ApiError::bad_request("amount must be positive"));
    }
    let plan_id = PlanId::parse(body.plan.as_deref().unwrap_or("free"));

    let outcome = state
        .enforcer
        .execute_with_limits(tenant, plan_id, body.action, amount, || async {
            Ok::<(), Infallible>(())
        })
        .await;

    match outcome {
        Enforced::Allowed { usage_recorded, .. } => Ok(Json(json!({
            "success": true,
            "data": {
                "action": body.action,
                "amount": amount,
                "usage_recorded": usage_recorded,
            }
        }))),
        Enforced::Denied(denial) => Err(ApiError::limit_reached(
            format!(
                "{} limit reached for the {} plan ({} used)",
                denial.limit_type, plan_id, denial.used
            ),
            denial.limit_type,
        )),
        Enforced::Failed(e) => match e {},
    }
}
