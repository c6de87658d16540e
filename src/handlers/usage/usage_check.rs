use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::plans::{plan_limits, PlanId};
use crate::types::{ActionType, UsageCounter};
use crate::usage::evaluator;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub plan: Option<String>,
    pub action: ActionType,
    /// Units the action would consume; batch sends check their full size
    pub amount: Option<i64>,
}

/// POST /api/usage/:tenant/check - would this action be allowed? No side
/// effects; the SPA calls this to disable buttons before the user tries.
pub async fn usage_check(
    State(state): State<AppState>,
    Path(tenant): Path<Uuid>,
    Json(body): Json<CheckRequest>,
) -> Result<Json<Value>, ApiError> {
    let amount = body.amount.unwrap_or(1);
    if amount < 0 {
        return Err(ApiError::bad_request("amount must be non-negative"));
    }
    let plan_id = PlanId::parse(body.plan.as_deref().unwrap_or("free"));
    let limit = body.action.limit_type();

    let usage = state.enforcer.store().get_usage(tenant).await;
    let allowed = evaluator::can_perform_action(plan_id, &usage, body.action, amount);
    let used = usage.counter(UsageCounter::for_action(body.action));

    let mut data = json!({
        "allowed": allowed,
        "action": body.action,
        "limit_type": limit,
        "used": used,
        "limit": plan_limits(plan_id).quota(limit),
        "remaining": evaluator::remaining_quota(plan_id, limit, used),
    });
    if !allowed {
        data["reason"] = json!("limit_reached");
    }

    Ok(Json(json!({ "success": true, "data": data })))
}
