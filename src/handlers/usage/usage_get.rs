use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::limit_summary;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::plans::PlanId;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub plan: Option<String>,
}

/// GET /api/usage/:tenant - counters plus remaining quota per limit type
pub async fn usage_get(
    State(state): State<AppState>,
    Path(tenant): Path<Uuid>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiError> {
    let plan_id = PlanId::parse(query.plan.as_deref().unwrap_or("free"));

    let usage = state.enforcer.store().get_usage(tenant).await;

    Ok(Json(json!({
        "success": true,
        "data": {
            "tenant_id": tenant,
            "plan": plan_id,
            "usage": usage,
            "limits": limit_summary(plan_id, &usage),
        }
    })))
}
