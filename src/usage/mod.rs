// Per-tenant usage tracking: counters, limit evaluation, and enforcement.

pub mod enforcement;
pub mod evaluator;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UsageCounter;

/// Calendar month key ("YYYY-MM") that scopes the email counter
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

pub fn current_month() -> String {
    month_key(Utc::now())
}

/// Persisted usage counters for one tenant
///
/// `emails_sent_this_month` is only meaningful for `current_month`; a row
/// stamped with an older month reads as zero until the next email write
/// restamps it (lazy rollover, see [`TenantUsage::rolled_over`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantUsage {
    pub tenant_id: Uuid,
    pub contact_count: i64,
    pub emails_sent_this_month: i64,
    pub active_campaigns: i64,
    pub current_month: String,
    pub last_updated: DateTime<Utc>,
}

impl TenantUsage {
    /// Zeroed counters for a tenant that has no usage row yet
    pub fn empty(tenant_id: Uuid, month: String) -> Self {
        Self {
            tenant_id,
            contact_count: 0,
            emails_sent_this_month: 0,
            active_campaigns: 0,
            current_month: month,
            last_updated: Utc::now(),
        }
    }

    /// Apply the lazy month rollover: when the stored month is not `month`,
    /// the email counter reads as zero. Contacts and campaigns are running
    /// totals and never reset.
    pub fn rolled_over(mut self, month: &str) -> Self {
        if self.current_month != month {
            self.emails_sent_this_month = 0;
            self.current_month = month.to_string();
        }
        self
    }

    /// Current value of a counter
    pub fn counter(&self, counter: UsageCounter) -> i64 {
        match counter {
            UsageCounter::Contacts => self.contact_count,
            UsageCounter::Emails => self.emails_sent_this_month,
            UsageCounter::Campaigns => self.active_campaigns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_key_formats_year_month() {
        let at = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(month_key(at), "2025-03");
    }

    #[test]
    fn rollover_zeroes_stale_email_counter() {
        let mut usage = TenantUsage::empty(Uuid::new_v4(), "2025-02".to_string());
        usage.contact_count = 40;
        usage.emails_sent_this_month = 250;
        usage.active_campaigns = 2;

        let rolled = usage.rolled_over("2025-03");
        assert_eq!(rolled.emails_sent_this_month, 0);
        assert_eq!(rolled.current_month, "2025-03");
        // running totals survive the month boundary
        assert_eq!(rolled.contact_count, 40);
        assert_eq!(rolled.active_campaigns, 2);
    }

    #[test]
    fn rollover_is_a_noop_within_the_month() {
        let mut usage = TenantUsage::empty(Uuid::new_v4(), "2025-03".to_string());
        usage.emails_sent_this_month = 120;

        let rolled = usage.rolled_over("2025-03");
        assert_eq!(rolled.emails_sent_this_month, 120);
    }
}
