//! Management domain types: campaigns, messages, delivery log, dashboard.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use crm_core::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Campaign ──────────────────────────────────────────────────────────────

/// A message campaign targeting a frozen snapshot of one segment's members.
///
/// Status and counters are only changed through the lifecycle methods in
/// [`crate::lifecycle`], which keep `delivered + failed <= audience_size`.
/// Deserialization checks the same invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCampaign")]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub segment_id: Uuid,
    pub segment_name: String,
    pub(crate) status: CampaignStatus,
    pub(crate) audience_size: u64,
    pub(crate) delivered_count: u64,
    pub(crate) failed_count: u64,
    pub(crate) target: Vec<Uuid>,
    pub(crate) message: Option<CampaignMessage>,
    pub created_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) history: Vec<StatusTransition>,
}

impl Campaign {
    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn audience_size(&self) -> u64 {
        self.audience_size
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count
    }

    pub fn processed_count(&self) -> u64 {
        self.delivered_count + self.failed_count
    }

    pub fn pending_count(&self) -> u64 {
        self.audience_size.saturating_sub(self.processed_count())
    }

    /// Customer ids captured when the campaign was created.
    pub fn target(&self) -> &[Uuid] {
        &self.target
    }

    pub fn message(&self) -> Option<&CampaignMessage> {
        self.message.as_ref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }
}

/// Stored form of a [`Campaign`], checked before it becomes one.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCampaign {
    id: Uuid,
    name: String,
    segment_id: Uuid,
    segment_name: String,
    status: CampaignStatus,
    audience_size: u64,
    delivered_count: u64,
    failed_count: u64,
    target: Vec<Uuid>,
    message: Option<CampaignMessage>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    history: Vec<StatusTransition>,
}

impl TryFrom<RawCampaign> for Campaign {
    type Error = CrmError;

    fn try_from(raw: RawCampaign) -> CrmResult<Self> {
        if raw.target.len() as u64 != raw.audience_size {
            return Err(CrmError::Validation(format!(
                "campaign {}: target lists {} customers but audience size is {}",
                raw.id,
                raw.target.len(),
                raw.audience_size
            )));
        }
        let processed = raw.delivered_count.checked_add(raw.failed_count);
        if processed.map_or(true, |p| p > raw.audience_size) {
            return Err(CrmError::Validation(format!(
                "campaign {}: {} delivered and {} failed exceed audience size {}",
                raw.id, raw.delivered_count, raw.failed_count, raw.audience_size
            )));
        }
        if raw.status == CampaignStatus::Draft && processed != Some(0) {
            return Err(CrmError::Validation(format!(
                "campaign {}: a draft cannot have processed recipients",
                raw.id
            )));
        }
        Ok(Campaign {
            id: raw.id,
            name: raw.name,
            segment_id: raw.segment_id,
            segment_name: raw.segment_name,
            status: raw.status,
            audience_size: raw.audience_size,
            delivered_count: raw.delivered_count,
            failed_count: raw.failed_count,
            target: raw.target,
            message: raw.message,
            created_at: raw.created_at,
            completed_at: raw.completed_at,
            history: raw.history,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = CrmError;

    fn from_str(s: &str) -> CrmResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(CampaignStatus::Draft),
            "sending" => Ok(CampaignStatus::Sending),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(CrmError::Validation(format!("unknown campaign status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMessage {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CampaignMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

// ─── Delivery Log ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Pending,
}

/// One delivery attempt to one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub customer_id: Uuid,
    pub message_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivery_timestamp: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

// ─── Listing ───────────────────────────────────────────────────────────────

/// Customer attribute a customer listing can be ordered by.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CustomerSortField {
    #[default]
    Name,
    Email,
    TotalSpend,
    VisitCount,
    LastActivity,
    CreatedAt,
}

impl FromStr for CustomerSortField {
    type Err = CrmError;

    fn from_str(s: &str) -> CrmResult<Self> {
        match s.trim() {
            "name" => Ok(CustomerSortField::Name),
            "email" => Ok(CustomerSortField::Email),
            "totalSpend" => Ok(CustomerSortField::TotalSpend),
            "visitCount" => Ok(CustomerSortField::VisitCount),
            "lastActivity" => Ok(CustomerSortField::LastActivity),
            "createdAt" => Ok(CustomerSortField::CreatedAt),
            other => Err(CrmError::Validation(format!("cannot sort customers by '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Free-text search plus ordering for the customer list. The search matches
/// name or email case-insensitively, or a substring of the phone number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerQuery {
    pub search: String,
    pub sort_by: CustomerSortField,
    pub direction: SortDirection,
}

// ─── Dashboard ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_customers: u64,
    pub active_campaigns: u64,
    /// Percentage of processed messages that were delivered.
    pub delivery_rate: f64,
    /// Mean visit count as a percentage of the most frequent visitor's count.
    pub avg_engagement: f64,
}

impl DashboardStats {
    pub fn empty() -> Self {
        Self {
            total_customers: 0,
            active_campaigns: 0,
            delivery_rate: 0.0,
            avg_engagement: 0.0,
        }
    }
}
