// Plan catalog: static plan tiers and their quotas.
//
// Plans are build-time configuration and never change at runtime, so the
// catalog is an immutable Lazy table. Lookups are total: an unrecognized
// plan id resolves to the `free` definition, never to unlimited.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::LimitType;

/// A plan quota: either a bounded count or no limit at all
///
/// Serializes as a plain number, or the string "unlimited" for the
/// no-limit case, which is what the front-end renders directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(i64),
    Unlimited,
}

impl Serialize for Quota {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quota::Limited(n) => serializer.serialize_i64(*n),
            Quota::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Quota::Limited)
                .ok_or_else(|| D::Error::custom("quota out of range")),
            serde_json::Value::String(s) if s == "unlimited" => Ok(Quota::Unlimited),
            other => Err(D::Error::custom(format!("invalid quota: {}", other))),
        }
    }
}

impl Quota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Quota::Unlimited)
    }
}

/// Plan tier identifiers
///
/// `Unknown` absorbs any identifier the catalog does not recognize (stale
/// billing data, typos in stored documents) and maps to the free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Pro,
    Lifetime,
    Founder,
    #[serde(other)]
    Unknown,
}

impl PlanId {
    pub fn parse(s: &str) -> Self {
        match s {
            "free" => PlanId::Free,
            "pro" => PlanId::Pro,
            "lifetime" => PlanId::Lifetime,
            "founder" => PlanId::Founder,
            _ => PlanId::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Free => "free",
            PlanId::Pro => "pro",
            PlanId::Lifetime => "lifetime",
            PlanId::Founder => "founder",
            PlanId::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quotas and feature flags for one plan tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDefinition {
    pub id: PlanId,
    pub max_contacts: Quota,
    pub max_emails_per_month: Quota,
    pub max_campaigns: Quota,
    pub features: HashSet<&'static str>,
}

impl PlanDefinition {
    /// Quota for a given limit type
    pub fn quota(&self, limit: LimitType) -> Quota {
        match limit {
            LimitType::Contacts => self.max_contacts,
            LimitType::EmailsPerMonth => self.max_emails_per_month,
            LimitType::Campaigns => self.max_campaigns,
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

static CATALOG: Lazy<HashMap<PlanId, PlanDefinition>> = Lazy::new(|| {
    let mut plans = HashMap::new();

    plans.insert(
        PlanId::Free,
        PlanDefinition {
            id: PlanId::Free,
            max_contacts: Quota::Limited(75),
            max_emails_per_month: Quota::Limited(300),
            max_campaigns: Quota::Limited(3),
            features: ["csv_import"].into_iter().collect(),
        },
    );

    plans.insert(
        PlanId::Pro,
        PlanDefinition {
            id: PlanId::Pro,
            max_contacts: Quota::Limited(5_000),
            max_emails_per_month: Quota::Limited(10_000),
            max_campaigns: Quota::Limited(50),
            features: ["csv_import", "automation", "custom_domain", "api_access"]
                .into_iter()
                .collect(),
        },
    );

    plans.insert(
        PlanId::Lifetime,
        PlanDefinition {
            id: PlanId::Lifetime,
            max_contacts: Quota::Limited(10_000),
            max_emails_per_month: Quota::Limited(25_000),
            max_campaigns: Quota::Limited(100),
            features: ["csv_import", "automation", "custom_domain", "api_access"]
                .into_iter()
                .collect(),
        },
    );

    plans.insert(
        PlanId::Founder,
        PlanDefinition {
            id: PlanId::Founder,
            max_contacts: Quota::Unlimited,
            max_emails_per_month: Quota::Unlimited,
            max_campaigns: Quota::Unlimited,
            features: [
                "csv_import",
                "automation",
                "custom_domain",
                "api_access",
                "white_label",
                "priority_support",
            ]
            .into_iter()
            .collect(),
        },
    );

    plans
});

/// Look up the plan definition for a plan id.
///
/// Unknown plans get the free definition so a bad id can never grant more
/// than the most restrictive tier.
pub fn plan_limits(plan_id: PlanId) -> &'static PlanDefinition {
    CATALOG
        .get(&plan_id)
        .unwrap_or_else(|| &CATALOG[&PlanId::Free])
}

/// Whether a feature is enabled for a plan. Unknown features and unknown
/// plans are both disabled.
pub fn is_feature_enabled(plan_id: PlanId, feature: &str) -> bool {
    plan_limits(plan_id).has_feature(feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plan_falls_back_to_free() {
        let plan = plan_limits(PlanId::parse("enterprise_custom"));
        assert_eq!(plan.id, PlanId::Free);
        assert_eq!(plan.max_contacts, Quota::Limited(75));
        assert_eq!(plan.max_emails_per_month, Quota::Limited(300));
    }

    #[test]
    fn lookups_are_stable() {
        let a = plan_limits(PlanId::Pro);
        let b = plan_limits(PlanId::Pro);
        assert_eq!(a, b);
    }

    #[test]
    fn founder_plan_is_unlimited() {
        let plan = plan_limits(PlanId::Founder);
        assert!(plan.max_contacts.is_unlimited());
        assert!(plan.max_emails_per_month.is_unlimited());
        assert!(plan.max_campaigns.is_unlimited());
    }

    #[test]
    fn feature_checks_default_to_disabled() {
        assert!(is_feature_enabled(PlanId::Pro, "automation"));
        assert!(!is_feature_enabled(PlanId::Free, "automation"));
        assert!(!is_feature_enabled(PlanId::Free, "no_such_feature"));
        assert!(!is_feature_enabled(PlanId::parse("enterprise_custom"), "white_label"));
    }

    #[test]
    fn plan_id_round_trips_through_serde() {
        let id: PlanId = serde_json::from_value(serde_json::json!("lifetime")).unwrap();
        assert_eq!(id, PlanId::Lifetime);
        let id: PlanId = serde_json::from_value(serde_json::json!("not_a_plan")).unwrap();
        assert_eq!(id, PlanId::Unknown);
    }

    #[test]
    fn quota_serializes_as_number_or_string() {
        assert_eq!(serde_json::to_value(Quota::Limited(75)).unwrap(), serde_json::json!(75));
        assert_eq!(
            serde_json::to_value(Quota::Unlimited).unwrap(),
            serde_json::json!("unlimited")
        );
    }

    #[test]
    fn quota_round_trips_through_serde() {
        for quota in [Quota::Limited(0), Quota::Limited(300), Quota::Unlimited] {
            let v = serde_json::to_value(quota).unwrap();
            assert_eq!(serde_json::from_value::<Quota>(v).unwrap(), quota);
        }

        let q: Quota = serde_json::from_value(serde_json::json!(10_000)).unwrap();
        assert_eq!(q, Quota::Limited(10_000));

        // anything other than an integer or "unlimited" is rejected
        assert!(serde_json::from_value::<Quota>(serde_json::json!("lots")).is_err());
        assert!(serde_json::from_value::<Quota>(serde_json::json!(1.5)).is_err());
        assert!(serde_json::from_value::<Quota>(serde_json::json!(null)).is_err());
    }
}
