pub mod usage_check;
pub mod usage_get;
pub mod usage_track;

pub use usage_check::usage_check;
pub use usage_get::usage_get;
pub use usage_track::usage_track;

use serde_json::{json, Value};

use crate::plans::{plan_limits, PlanId};
use crate::types::{LimitType, UsageCounter};
use crate::usage::{evaluator, TenantUsage};

/// Per-limit breakdown rendered by the dashboard usage meters
pub(crate) fn limit_summary(plan_id: PlanId, usage: &TenantUsage) -> Value {
    let plan = plan_limits(plan_id);
    let entries = [
        (LimitType::Contacts, UsageCounter::Contacts),
        (LimitType::EmailsPerMonth, UsageCounter::Emails),
        (LimitType::Campaigns, UsageCounter::Campaigns),
    ];

    let mut limits = serde_json::Map::new();
    for (limit, counter) in entries {
        let used = usage.counter(counter);
        limits.insert(
            limit.to_string(),
            json!({
                "used": used,
                "limit": plan.quota(limit),
                "remaining": evaluator::remaining_quota(plan_id, limit, used),
                "progress": evaluator::limit_progress(plan_id, limit, used),
            }),
        );
    }
    Value::Object(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn summary_covers_every_limit_type() {
        let mut usage = TenantUsage::empty(Uuid::new_v4(), crate::usage::current_month());
        usage.contact_count = 15;
        usage.emails_sent_this_month = 150;

        let summary = limit_summary(PlanId::Free, &usage);
        assert_eq!(summary["contacts"]["used"], json!(15));
        assert_eq!(summary["contacts"]["limit"], json!(75));
        assert_eq!(summary["contacts"]["remaining"], json!(60));
        assert_eq!(summary["contacts"]["progress"], json!(20));
        assert_eq!(summary["emails_per_month"]["progress"], json!(50));
        assert_eq!(summary["campaigns"]["used"], json!(0));
    }

    #[test]
    fn summary_renders_unlimited_quotas() {
        let usage = TenantUsage::empty(Uuid::new_v4(), crate::usage::current_month());
        let summary = limit_summary(PlanId::Founder, &usage);
        assert_eq!(summary["contacts"]["limit"], json!("unlimited"));
        assert_eq!(summary["contacts"]["remaining"], json!("unlimited"));
        assert_eq!(summary["contacts"]["progress"], json!(0));
    }
}
