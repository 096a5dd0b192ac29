use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub id: Uuid,
    pub user_id: String,
    pub reason: Option<String>,
    pub status: UpgradeStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Pending,
    Approved,
    Rejected,
}

impl UpgradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUpgradeRequestInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewUpgradeInput {
    pub note: Option<String>,
}

/// Result of approving or rejecting a request, with the notification sent to the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeReview {
    pub request: UpgradeRequest,
    pub notification: super::Notification,
}
