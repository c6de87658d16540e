/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Quota-bound actions a tenant can attempt
/// Used by both the enforcement wrapper and the HTTP check/track endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddContact,
    SendEmail,
    CreateCampaign,
}

impl ActionType {
    /// The limit each action consumes against
    pub fn limit_type(&self) -> LimitType {
        match self {
            ActionType::AddContact => LimitType::Contacts,
            ActionType::SendEmail => LimitType::EmailsPerMonth,
            ActionType::CreateCampaign => LimitType::Campaigns,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::AddContact => "add_contact",
            ActionType::SendEmail => "send_email",
            ActionType::CreateCampaign => "create_campaign",
        };
        write!(f, "{}", s)
    }
}

/// Tracked resource limits defined by the plan catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Contacts,
    EmailsPerMonth,
    Campaigns,
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LimitType::Contacts => "contacts",
            LimitType::EmailsPerMonth => "emails_per_month",
            LimitType::Campaigns => "campaigns",
        };
        write!(f, "{}", s)
    }
}

/// Persisted per-tenant counters, one per limit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCounter {
    Contacts,
    Emails,
    Campaigns,
}

impl UsageCounter {
    pub fn for_action(action: ActionType) -> Self {
        match action {
            ActionType::AddContact => UsageCounter::Contacts,
            ActionType::SendEmail => UsageCounter::Emails,
            ActionType::CreateCampaign => UsageCounter::Campaigns,
        }
    }

    /// Database column backing this counter
    pub fn column(&self) -> &'static str {
        match self {
            UsageCounter::Contacts => "contact_count",
            UsageCounter::Emails => "emails_sent_this_month",
            UsageCounter::Campaigns => "active_campaigns",
        }
    }
}

impl std::fmt::Display for UsageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UsageCounter::Contacts => "contacts",
            UsageCounter::Emails => "emails",
            UsageCounter::Campaigns => "campaigns",
        };
        write!(f, "{}", s)
    }
}
