// Enforcement wrapper: check, reserve, act.
//
// The wrapper owns the ordering guarantees around a quota-bound action:
// a denial never invokes the action, a reserved counter is rolled back when
// the action fails, and a tracking failure never masks the action's own
// success (usage is best-effort, the action is not).

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::plans::{plan_limits, PlanId, Quota};
use crate::types::{ActionType, LimitType, UsageCounter};
use crate::usage::evaluator;
use crate::usage::store::{ReserveOutcome, UsageStore};

/// Structured denial returned instead of an error; hitting a plan limit is
/// an expected business outcome
#[derive(Debug, Clone, Serialize)]
pub struct Denial {
    pub reason: &'static str,
    pub limit_type: LimitType,
    pub limit: Quota,
    pub used: i64,
}

impl Denial {
    fn limit_reached(limit_type: LimitType, limit: Quota, used: i64) -> Self {
        Self {
            reason: "limit_reached",
            limit_type,
            limit,
            used,
        }
    }

    fn usage_unavailable(limit_type: LimitType, limit: Quota, used: i64) -> Self {
        Self {
            reason: "usage_unavailable",
            limit_type,
            limit,
            used,
        }
    }
}

/// Outcome of a limit-enforced action
#[derive(Debug)]
pub enum Enforced<T, E> {
    /// Action ran and succeeded. `usage_recorded` is false when the counter
    /// write was lost to a store failure.
    Allowed { value: T, usage_recorded: bool },
    /// Action was not invoked; the plan limit blocks it
    Denied(Denial),
    /// Action was invoked and failed; usage was not consumed
    Failed(E),
}

impl<T, E> Enforced<T, E> {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Enforced::Allowed { .. })
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Enforced::Denied(d) => Some(d),
            _ => None,
        }
    }
}

/// Wraps quota-bound actions with limit checks and usage accounting.
///
/// Holds the injected store; the plan catalog is static configuration and
/// read directly.
#[derive(Clone)]
pub struct LimitEnforcer {
    store: Arc<dyn UsageStore>,
    fail_open: bool,
}

impl LimitEnforcer {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_fail_open(store, crate::config::config().usage.fail_open)
    }

    /// Override the configured fail-open policy. Strict deployments deny
    /// actions while the usage store is unreachable.
    pub fn with_fail_open(store: Arc<dyn UsageStore>, fail_open: bool) -> Self {
        Self { store, fail_open }
    }

    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    /// Run `work` if the tenant's plan permits `action` `amount` times.
    ///
    /// Sequence: read usage, evaluate, atomically reserve the counter, then
    /// invoke `work`. The reservation closes the window where two
    /// concurrent actions both pass the read-time check; if the store is
    /// unreachable the reservation is skipped and the action proceeds
    /// (fail-open), with a best-effort increment afterwards.
    pub async fn execute_with_limits<T, E, F, Fut>(
        &self,
        tenant_id: Uuid,
        plan_id: PlanId,
        action: ActionType,
        amount: i64,
        work: F,
    ) -> Enforced<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let limit_type = action.limit_type();
        let counter = UsageCounter::for_action(action);
        let quota = plan_limits(plan_id).quota(limit_type);

        let usage = self.store.get_usage(tenant_id).await;
        if !evaluator::can_perform_action(plan_id, &usage, action, amount) {
            let used = usage.counter(counter);
            info!(%tenant_id, %plan_id, %action, amount, used, "action denied, limit reached");
            return Enforced::Denied(Denial::limit_reached(limit_type, quota, used));
        }

        let reserved = match self
            .store
            .increment_if_below(tenant_id, counter, amount, quota)
            .await
        {
            ReserveOutcome::Applied { .. } => true,
            ReserveOutcome::LimitReached { current } => {
                // A concurrent action consumed the headroom after our read.
                info!(%tenant_id, %plan_id, %action, amount, used = current, "action denied under concurrency");
                return Enforced::Denied(Denial::limit_reached(limit_type, quota, current));
            }
            ReserveOutcome::StoreUnavailable => {
                if !self.fail_open {
                    let used = usage.counter(counter);
                    warn!(%tenant_id, %action, "usage store unavailable, denying (fail-open disabled)");
                    return Enforced::Denied(Denial::usage_unavailable(limit_type, quota, used));
                }
                warn!(%tenant_id, %action, "usage store unavailable, proceeding without reservation");
                false
            }
        };

        match work().await {
            Ok(value) => {
                let usage_recorded = if reserved {
                    true
                } else {
                    // Fail-open path: settle the counter now that the action
                    // succeeded. A second failure is logged, not surfaced.
                    let ok = self.store.increment_usage(tenant_id, counter, amount).await;
                    if !ok {
                        warn!(%tenant_id, %counter, amount, "usage increment lost");
                    }
                    ok
                };
                Enforced::Allowed { value, usage_recorded }
            }
            Err(e) => {
                if reserved && !self.store.increment_usage(tenant_id, counter, -amount).await {
                    warn!(%tenant_id, %counter, amount, "failed to roll back reservation");
                }
                Enforced::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::store::MemoryUsageStore;
    use crate::usage::TenantUsage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store double whose writes (and reads) always fail
    struct DownStore;

    #[async_trait]
    impl UsageStore for DownStore {
        async fn get_usage(&self, tenant_id: Uuid) -> TenantUsage {
            TenantUsage::empty(tenant_id, crate::usage::current_month())
        }

        async fn increment_usage(&self, _: Uuid, _: UsageCounter, _: i64) -> bool {
            false
        }

        async fn increment_if_below(
            &self,
            _: Uuid,
            _: UsageCounter,
            _: i64,
            _: Quota,
        ) -> ReserveOutcome {
            ReserveOutcome::StoreUnavailable
        }
    }

    fn enforcer_with_memory() -> (LimitEnforcer, Arc<MemoryUsageStore>) {
        let store = Arc::new(MemoryUsageStore::new());
        (LimitEnforcer::new(store.clone()), store)
    }

    #[tokio::test]
    async fn allowed_action_runs_and_records_usage() {
        let (enforcer, store) = enforcer_with_memory();
        let tenant = Uuid::new_v4();

        let outcome: Enforced<&str, &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::AddContact, 1, || async {
                Ok("created")
            })
            .await;

        match outcome {
            Enforced::Allowed { value, usage_recorded } => {
                assert_eq!(value, "created");
                assert!(usage_recorded);
            }
            other => panic!("expected Allowed, got {:?}", other),
        }
        assert_eq!(store.get_usage(tenant).await.contact_count, 1);
    }

    #[tokio::test]
    async fn denied_action_is_never_invoked() {
        let (enforcer, store) = enforcer_with_memory();
        let tenant = Uuid::new_v4();
        store.increment_usage(tenant, UsageCounter::Contacts, 74).await;

        let invoked = AtomicBool::new(false);
        let outcome: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::AddContact, 1, || {
                invoked.store(true, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        let denial = outcome.denial().expect("expected denial");
        assert_eq!(denial.reason, "limit_reached");
        assert_eq!(denial.limit_type, LimitType::Contacts);
        assert_eq!(denial.used, 74);
        assert!(!invoked.load(Ordering::SeqCst));
        // the denial consumed nothing
        assert_eq!(store.get_usage(tenant).await.contact_count, 74);
    }

    #[tokio::test]
    async fn failed_action_rolls_the_reservation_back() {
        let (enforcer, store) = enforcer_with_memory();
        let tenant = Uuid::new_v4();
        store.increment_usage(tenant, UsageCounter::Emails, 10).await;

        let outcome: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::SendEmail, 5, || async {
                Err("smtp refused")
            })
            .await;

        assert!(matches!(outcome, Enforced::Failed("smtp refused")));
        assert_eq!(store.get_usage(tenant).await.emails_sent_this_month, 10);
    }

    #[tokio::test]
    async fn store_outage_fails_open_and_reports_action_success() {
        let enforcer = LimitEnforcer::with_fail_open(Arc::new(DownStore), true);
        let tenant = Uuid::new_v4();

        let outcome: Enforced<&str, &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::SendEmail, 1, || async {
                Ok("sent")
            })
            .await;

        match outcome {
            Enforced::Allowed { value, usage_recorded } => {
                assert_eq!(value, "sent");
                // increment failed but the action's success still stands
                assert!(!usage_recorded);
            }
            other => panic!("expected Allowed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn strict_mode_denies_while_the_store_is_down() {
        let enforcer = LimitEnforcer::with_fail_open(Arc::new(DownStore), false);
        let tenant = Uuid::new_v4();

        let invoked = AtomicBool::new(false);
        let outcome: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::SendEmail, 1, || {
                invoked.store(true, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        let denial = outcome.denial().expect("strict mode must deny on outage");
        assert_eq!(denial.reason, "usage_unavailable");
        assert_eq!(denial.limit_type, LimitType::EmailsPerMonth);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_headroom_is_granted_once() {
        let (enforcer, store) = enforcer_with_memory();
        let tenant = Uuid::new_v4();
        // free plan: max_campaigns = 3, one slot of headroom left (1 + 1 < 3)
        store.increment_usage(tenant, UsageCounter::Campaigns, 1).await;

        let first: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::CreateCampaign, 1, || async {
                Ok(())
            })
            .await;
        let second: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Free, ActionType::CreateCampaign, 1, || async {
                Ok(())
            })
            .await;

        assert!(first.is_allowed());
        assert!(second.denial().is_some());
        assert_eq!(store.get_usage(tenant).await.active_campaigns, 2);
    }

    #[tokio::test]
    async fn unlimited_plans_are_never_denied() {
        let (enforcer, store) = enforcer_with_memory();
        let tenant = Uuid::new_v4();
        store.increment_usage(tenant, UsageCounter::Contacts, 1_000_000).await;

        let outcome: Enforced<(), &str> = enforcer
            .execute_with_limits(tenant, PlanId::Founder, ActionType::AddContact, 500, || async {
                Ok(())
            })
            .await;
        assert!(outcome.is_allowed());
    }
}
