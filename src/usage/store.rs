// Usage store: persisted per-tenant counters.
//
// Usage tracking is best-effort by contract. Reads fall back to zeroed
// counters and writes report `false` when the database is unreachable;
// nothing here propagates an error to callers, because a tracking failure
// must never block the user-visible action.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::plans::Quota;
use crate::types::UsageCounter;
use crate::usage::{current_month, TenantUsage};

/// Result of a conditional counter reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Counter was incremented; carries the new value
    Applied { new_value: i64 },
    /// Increment would reach or exceed the quota; nothing written
    LimitReached { current: i64 },
    /// Persistence failed; caller decides whether to fail open
    StoreUnavailable,
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Read a tenant's counters, defaulting to zeros for tenants without a
    /// row and applying the lazy month rollover to the email counter.
    async fn get_usage(&self, tenant_id: Uuid) -> TenantUsage;

    /// Atomically add `amount` to a counter. Emails also restamp the month,
    /// resetting the counter when the stored month is stale. Negative
    /// amounts roll a previous increment back; counters clamp at zero.
    async fn increment_usage(&self, tenant_id: Uuid, counter: UsageCounter, amount: i64) -> bool;

    /// Atomically add `amount` to a counter only while the projected value
    /// stays below the quota (`current + amount < quota`). An unlimited
    /// quota always applies. This is the primitive that closes the
    /// check-then-act window between concurrent actions for one tenant.
    async fn increment_if_below(
        &self,
        tenant_id: Uuid,
        counter: UsageCounter,
        amount: i64,
        quota: Quota,
    ) -> ReserveOutcome;
}

/// Postgres-backed store over the `tenant_usage` table:
///
/// ```sql
/// CREATE TABLE tenant_usage (
///     tenant_id               UUID PRIMARY KEY,
///     contact_count           BIGINT NOT NULL DEFAULT 0,
///     emails_sent_this_month  BIGINT NOT NULL DEFAULT 0,
///     active_campaigns        BIGINT NOT NULL DEFAULT 0,
///     current_month           TEXT NOT NULL,
///     last_updated            TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_usage(&self, tenant_id: Uuid) -> Result<Option<TenantUsage>, sqlx::Error> {
        sqlx::query_as::<_, TenantUsage>(
            "SELECT tenant_id, contact_count, emails_sent_this_month, active_campaigns,
                    current_month, last_updated
             FROM tenant_usage
             WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Build the single-statement UPSERT for a counter increment.
    ///
    /// Column names come from [`UsageCounter::column`], a closed set of
    /// static identifiers, so the format! here cannot inject.
    fn increment_sql(counter: UsageCounter, guarded: bool) -> String {
        let guard = if guarded {
            match counter {
                UsageCounter::Emails => {
                    " WHERE (CASE WHEN u.current_month = $2 THEN u.emails_sent_this_month ELSE 0 END) + $3 < $4"
                }
                _ => " WHERE u.{col} + $3 < $4",
            }
        } else {
            ""
        };

        // Fresh rows start from this write's amount in the target column.
        let values = match counter {
            UsageCounter::Contacts => "($1, GREATEST(0, $3), 0, 0, $2, now())",
            UsageCounter::Emails => "($1, 0, GREATEST(0, $3), 0, $2, now())",
            UsageCounter::Campaigns => "($1, 0, 0, GREATEST(0, $3), $2, now())",
        };

        let body = match counter {
            UsageCounter::Emails => {
                // Stale month: the stored counter belongs to a previous
                // month and restarts from this write's amount.
                "INSERT INTO tenant_usage AS u
                     (tenant_id, contact_count, emails_sent_this_month, active_campaigns,
                      current_month, last_updated)
                 VALUES {values}
                 ON CONFLICT (tenant_id) DO UPDATE SET
                     emails_sent_this_month = GREATEST(0,
                         CASE WHEN u.current_month = $2
                              THEN u.emails_sent_this_month + $3
                              ELSE $3 END),
                     current_month = $2,
                     last_updated = now(){guard}
                 RETURNING emails_sent_this_month"
            }
            _ => {
                "INSERT INTO tenant_usage AS u
                     (tenant_id, contact_count, emails_sent_this_month, active_campaigns,
                      current_month, last_updated)
                 VALUES {values}
                 ON CONFLICT (tenant_id) DO UPDATE SET
                     {col} = GREATEST(0, u.{col} + $3),
                     last_updated = now(){guard}
                 RETURNING {col}"
            }
        };

        body.replace("{values}", values)
            .replace("{guard}", guard)
            .replace("{col}", counter.column())
    }

    async fn run_increment(
        &self,
        tenant_id: Uuid,
        counter: UsageCounter,
        amount: i64,
        guard_quota: Option<i64>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let sql = Self::increment_sql(counter, guard_quota.is_some());
        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(tenant_id)
            .bind(current_month())
            .bind(amount);
        if let Some(quota) = guard_quota {
            query = query.bind(quota);
        }
        query.fetch_optional(&self.pool).await
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn get_usage(&self, tenant_id: Uuid) -> TenantUsage {
        let month = current_month();
        match self.fetch_usage(tenant_id).await {
            Ok(Some(usage)) => usage.rolled_over(&month),
            Ok(None) => TenantUsage::empty(tenant_id, month),
            Err(e) => {
                warn!(%tenant_id, error = %e, "usage read failed, defaulting to zeros");
                TenantUsage::empty(tenant_id, month)
            }
        }
    }

    async fn increment_usage(&self, tenant_id: Uuid, counter: UsageCounter, amount: i64) -> bool {
        match self.run_increment(tenant_id, counter, amount, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%tenant_id, %counter, amount, error = %e, "usage increment failed");
                false
            }
        }
    }

    async fn increment_if_below(
        &self,
        tenant_id: Uuid,
        counter: UsageCounter,
        amount: i64,
        quota: Quota,
    ) -> ReserveOutcome {
        let max = match quota {
            Quota::Unlimited => {
                // Nothing to guard; plain increment.
                return match self.run_increment(tenant_id, counter, amount, None).await {
                    Ok(Some(new_value)) => ReserveOutcome::Applied { new_value },
                    Ok(None) => ReserveOutcome::Applied { new_value: amount },
                    Err(e) => {
                        warn!(%tenant_id, %counter, error = %e, "usage increment failed");
                        ReserveOutcome::StoreUnavailable
                    }
                };
            }
            Quota::Limited(max) => max,
        };

        // A fresh row starts at zero, so an amount at or over the quota can
        // never be admitted regardless of the stored value.
        if amount >= max {
            let current = self.get_usage(tenant_id).await.counter(counter);
            return ReserveOutcome::LimitReached { current };
        }

        match self.run_increment(tenant_id, counter, amount, Some(max)).await {
            Ok(Some(new_value)) => ReserveOutcome::Applied { new_value },
            Ok(None) => {
                // Guard rejected the update; re-read for the denial payload.
                let current = self.get_usage(tenant_id).await.counter(counter);
                ReserveOutcome::LimitReached { current }
            }
            Err(e) => {
                warn!(%tenant_id, %counter, error = %e, "conditional increment failed");
                ReserveOutcome::StoreUnavailable
            }
        }
    }
}

/// In-memory store used by tests and local development.
///
/// Mirrors the Postgres semantics, including lazy month rollover and the
/// conditional reserve, behind a single RwLock.
#[derive(Default)]
pub struct MemoryUsageStore {
    rows: RwLock<HashMap<Uuid, TenantUsage>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw row, bypassing rollover. Lets tests stage a stale month.
    pub async fn seed(&self, usage: TenantUsage) {
        self.rows.write().await.insert(usage.tenant_id, usage);
    }

    fn apply(row: &mut TenantUsage, counter: UsageCounter, amount: i64, month: &str) {
        match counter {
            UsageCounter::Contacts => {
                row.contact_count = row.contact_count.saturating_add(amount).max(0);
            }
            UsageCounter::Emails => {
                let base = if row.current_month == month {
                    row.emails_sent_this_month
                } else {
                    0
                };
                row.emails_sent_this_month = base.saturating_add(amount).max(0);
                row.current_month = month.to_string();
            }
            UsageCounter::Campaigns => {
                row.active_campaigns = row.active_campaigns.saturating_add(amount).max(0);
            }
        }
        row.last_updated = chrono::Utc::now();
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_usage(&self, tenant_id: Uuid) -> TenantUsage {
        let month = current_month();
        match self.rows.read().await.get(&tenant_id) {
            Some(usage) => usage.clone().rolled_over(&month),
            None => TenantUsage::empty(tenant_id, month),
        }
    }

    async fn increment_usage(&self, tenant_id: Uuid, counter: UsageCounter, amount: i64) -> bool {
        let month = current_month();
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(tenant_id)
            .or_insert_with(|| TenantUsage::empty(tenant_id, month.clone()));
        Self::apply(row, counter, amount, &month);
        true
    }

    async fn increment_if_below(
        &self,
        tenant_id: Uuid,
        counter: UsageCounter,
        amount: i64,
        quota: Quota,
    ) -> ReserveOutcome {
        let month = current_month();
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(tenant_id)
            .or_insert_with(|| TenantUsage::empty(tenant_id, month.clone()));

        let current = row.clone().rolled_over(&month).counter(counter);
        if let Quota::Limited(max) = quota {
            if current.saturating_add(amount) >= max {
                return ReserveOutcome::LimitReached { current };
            }
        }
        Self::apply(row, counter, amount, &month);
        ReserveOutcome::Applied {
            new_value: row.clone().rolled_over(&month).counter(counter),
        }
    }
}
