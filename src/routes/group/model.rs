use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Group, GroupStatus};

#[derive(Debug, Deserialize)]
pub struct CreateOrJoinRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupIdRequest {
    pub group_id: String,
}

/// Group snapshot returned to clients. Bar fields are all null until an
/// assignment commits, then all set.
#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub status: GroupStatus,
    pub current_participants: i32,
    pub max_participants: i32,
    pub location_name: String,
    pub is_scheduled: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub bar_name: Option<String>,
    pub bar_address: Option<String>,
    pub bar_place_id: Option<String>,
    pub bar_latitude: Option<f64>,
    pub bar_longitude: Option<f64>,
    pub meeting_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            group_id: group.group_id,
            status: group.status,
            current_participants: group.current_participants,
            max_participants: group.max_participants,
            location_name: group.location_name,
            is_scheduled: group.is_scheduled,
            scheduled_for: group.scheduled_for,
            bar_name: group.bar_name,
            bar_address: group.bar_address,
            bar_place_id: group.bar_place_id,
            bar_latitude: group.bar_latitude,
            bar_longitude: group.bar_longitude,
            meeting_time: group.meeting_time,
            created_at: group.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrJoinResponse {
    pub group_id: String,
    pub created: bool,
    pub group: GroupInfo,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CurrentGroupResponse {
    pub group: Option<GroupInfo>,
}

#[derive(Debug, Serialize)]
pub struct ReapResponse {
    pub reaped_count: u64,
}
