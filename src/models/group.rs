use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed outing size: groups go out as parties of five.
pub const MAX_GROUP_SIZE: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Waiting,
    Confirmed,
    Completed,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Waiting => "waiting",
            GroupStatus::Confirmed => "confirmed",
            GroupStatus::Completed => "completed",
            GroupStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GroupStatus::Waiting),
            "confirmed" => Some(GroupStatus::Confirmed),
            "completed" => Some(GroupStatus::Completed),
            "cancelled" => Some(GroupStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal groups no longer count towards exclusive membership.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupStatus::Completed | GroupStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Confirmed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ParticipantStatus::Pending),
            "confirmed" => Some(ParticipantStatus::Confirmed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub group_id: String,
    pub status: GroupStatus,
    pub current_participants: i32,
    pub max_participants: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: String,
    pub search_radius: f64,
    pub is_scheduled: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub bar_name: Option<String>,
    pub bar_address: Option<String>,
    pub bar_place_id: Option<String>,
    pub bar_latitude: Option<f64>,
    pub bar_longitude: Option<f64>,
    pub meeting_time: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn has_capacity(&self) -> bool {
        self.current_participants < self.max_participants
    }

    pub fn has_bar_assigned(&self) -> bool {
        self.bar_place_id.is_some()
    }
}

/// Insert payload for a freshly created group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
    pub search_radius: f64,
    pub is_scheduled: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub group_id: String,
    pub user_id: String,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Result of an atomic join attempt.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub group: Group,
    /// True when this very join pushed the group to capacity and flipped
    /// its status to confirmed.
    pub newly_confirmed: bool,
    /// True when the user was already a member and the call was a no-op.
    pub already_member: bool,
}

/// Result of removing a participant.
#[derive(Debug, Clone, Copy)]
pub struct LeaveOutcome {
    pub removed: bool,
    /// True when the departure knocked a confirmed group back to waiting
    /// (bar fields were cleared).
    pub reverted_to_waiting: bool,
}
