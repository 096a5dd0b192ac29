use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    System,
    Sprint,
    Task,
    Milestone,
    Upgrade,
    Ai,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Sprint => "sprint",
            Self::Task => "task",
            Self::Milestone => "milestone",
            Self::Upgrade => "upgrade",
            Self::Ai => "ai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "sprint" => Some(Self::Sprint),
            "task" => Some(Self::Task),
            "milestone" => Some(Self::Milestone),
            "upgrade" => Some(Self::Upgrade),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationInput {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl CreateNotificationInput {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}
