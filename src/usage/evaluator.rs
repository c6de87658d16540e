// Limit evaluator: pure arithmetic over the plan catalog and a usage
// snapshot. No I/O, no clock access, total over all inputs.
//
// The comparison rule throughout is `projected >= quota` blocks: the action
// that would land exactly on the quota is denied. Callers negotiating the
// boundary (e.g. contact 75 of 75 on the free plan) get a denial.

use serde::Serialize;

use crate::plans::{plan_limits, PlanId, Quota};
use crate::types::{ActionType, LimitType, UsageCounter};
use crate::usage::TenantUsage;

/// What is left of a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Amount(i64),
    Unlimited,
}

impl Serialize for Remaining {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Amount(n) => serializer.serialize_i64(*n),
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Whether a projected usage value has reached the plan's limit
pub fn is_limit_reached(plan_id: PlanId, limit: LimitType, projected: i64) -> bool {
    match plan_limits(plan_id).quota(limit) {
        Quota::Unlimited => false,
        Quota::Limited(max) => projected >= max,
    }
}

/// Whether a tenant on `plan_id` may perform `action` `amount` times given
/// the usage snapshot. `amount` must be positive; zero or negative requests
/// consume nothing and are always allowed.
pub fn can_perform_action(
    plan_id: PlanId,
    usage: &TenantUsage,
    action: ActionType,
    amount: i64,
) -> bool {
    if amount <= 0 {
        return true;
    }
    let limit = action.limit_type();
    let current = usage.counter(UsageCounter::for_action(action));
    // Saturate: an absurd amount must project to a denial, not overflow.
    !is_limit_reached(plan_id, limit, current.saturating_add(amount))
}

/// Quota headroom, clamped to zero for tenants already over the limit
pub fn remaining_quota(plan_id: PlanId, limit: LimitType, current: i64) -> Remaining {
    match plan_limits(plan_id).quota(limit) {
        Quota::Unlimited => Remaining::Unlimited,
        Quota::Limited(max) => Remaining::Amount((max - current).max(0)),
    }
}

/// Percentage of the quota consumed, in [0, 100]. Unlimited quotas report 0.
pub fn limit_progress(plan_id: PlanId, limit: LimitType, current: i64) -> u8 {
    match plan_limits(plan_id).quota(limit) {
        Quota::Unlimited => 0,
        Quota::Limited(max) if max <= 0 => 100,
        Quota::Limited(max) => {
            let pct = current.max(0).saturating_mul(100) / max;
            pct.clamp(0, 100) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn usage(contacts: i64, emails: i64, campaigns: i64) -> TenantUsage {
        let mut u = TenantUsage::empty(Uuid::new_v4(), crate::usage::current_month());
        u.contact_count = contacts;
        u.emails_sent_this_month = emails;
        u.active_campaigns = campaigns;
        u
    }

    #[test]
    fn free_plan_denies_the_75th_contact() {
        // 74 + 1 = 75 >= 75: reaching the quota exactly is a denial
        let u = usage(74, 0, 0);
        assert!(!can_perform_action(PlanId::Free, &u, ActionType::AddContact, 1));
    }

    #[test]
    fn free_plan_allows_below_the_boundary() {
        let u = usage(73, 0, 0);
        assert!(can_perform_action(PlanId::Free, &u, ActionType::AddContact, 1));
    }

    #[test]
    fn free_plan_denies_the_300th_email() {
        let u = usage(0, 299, 0);
        assert!(!can_perform_action(PlanId::Free, &u, ActionType::SendEmail, 1));
        assert!(can_perform_action(PlanId::Free, &u, ActionType::SendEmail, 0));
    }

    #[test]
    fn batch_amounts_project_forward() {
        // 290 + 9 = 299 < 300 allowed; 290 + 10 = 300 denied
        let u = usage(0, 290, 0);
        assert!(can_perform_action(PlanId::Free, &u, ActionType::SendEmail, 9));
        assert!(!can_perform_action(PlanId::Free, &u, ActionType::SendEmail, 10));
    }

    #[test]
    fn unlimited_plans_always_allow() {
        let u = usage(1_000_000, 1_000_000, 1_000_000);
        assert!(can_perform_action(PlanId::Founder, &u, ActionType::AddContact, 1));
        assert!(can_perform_action(PlanId::Founder, &u, ActionType::SendEmail, 50_000));
        assert!(can_perform_action(PlanId::Founder, &u, ActionType::CreateCampaign, 1));
        assert!(!is_limit_reached(PlanId::Founder, LimitType::Contacts, i64::MAX));
    }

    #[test]
    fn unknown_plan_is_evaluated_as_free() {
        let u = usage(74, 0, 0);
        assert!(!can_perform_action(
            PlanId::parse("enterprise_custom"),
            &u,
            ActionType::AddContact,
            1
        ));
    }

    #[test]
    fn remaining_quota_clamps_to_zero() {
        assert_eq!(
            remaining_quota(PlanId::Free, LimitType::Contacts, 40),
            Remaining::Amount(35)
        );
        // already over the limit (e.g. after a downgrade)
        assert_eq!(
            remaining_quota(PlanId::Free, LimitType::Contacts, 90),
            Remaining::Amount(0)
        );
        assert_eq!(
            remaining_quota(PlanId::Founder, LimitType::Contacts, 90),
            Remaining::Unlimited
        );
    }

    #[test]
    fn progress_is_bounded() {
        assert_eq!(limit_progress(PlanId::Free, LimitType::EmailsPerMonth, 0), 0);
        assert_eq!(limit_progress(PlanId::Free, LimitType::EmailsPerMonth, 150), 50);
        assert_eq!(limit_progress(PlanId::Free, LimitType::EmailsPerMonth, 300), 100);
        assert_eq!(limit_progress(PlanId::Free, LimitType::EmailsPerMonth, 9_000), 100);
        assert_eq!(limit_progress(PlanId::Free, LimitType::EmailsPerMonth, -5), 0);
        assert_eq!(limit_progress(PlanId::Founder, LimitType::EmailsPerMonth, 9_000), 0);
    }

    #[test]
    fn oversized_amounts_are_denied_without_overflow() {
        // a request-supplied amount near i64::MAX must saturate into a
        // denial, not wrap negative and slip under the quota
        let u = usage(1, 0, 0);
        assert!(!can_perform_action(PlanId::Free, &u, ActionType::AddContact, i64::MAX));
        assert!(!can_perform_action(PlanId::Free, &u, ActionType::SendEmail, i64::MAX - 1));
        // unlimited plans still allow any amount
        assert!(can_perform_action(PlanId::Founder, &u, ActionType::AddContact, i64::MAX));
    }

    #[test]
    fn evaluation_is_pure() {
        // same inputs, same answer, no drift between calls
        let u = usage(10, 20, 1);
        for _ in 0..3 {
            assert!(can_perform_action(PlanId::Pro, &u, ActionType::AddContact, 1));
            assert_eq!(
                remaining_quota(PlanId::Pro, LimitType::Contacts, 10),
                Remaining::Amount(4_990)
            );
        }
    }
}
