//! In-memory GroupStore used by the workflow tests. A single mutex stands in
//! for the database's row-level atomicity: every operation takes the lock
//! once and applies the same conditional logic as the SQL statements.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::{
    BarAssignment, Group, GroupStatus, JoinOutcome, LeaveOutcome, MAX_GROUP_SIZE, NewGroup,
    Participant, ParticipantStatus,
};

use super::GroupStore;

#[derive(Default)]
struct Inner {
    groups: HashMap<String, Group>,
    participants: HashMap<(String, String), Participant>,
    fail_recipient_lookups: bool,
}

#[derive(Default)]
pub struct MemoryGroupStore {
    inner: Mutex<Inner>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a counter to a given value, bypassing the join path. Used to
    /// fabricate drift for reconciliation tests.
    pub async fn force_participant_count(&self, group_id: &str, count: i32) {
        let mut inner = self.inner.lock().await;
        if let Some(group) = inner.groups.get_mut(group_id) {
            group.current_participants = count;
        }
    }

    /// Make `confirmed_user_ids` fail, for exercising post-commit error
    /// handling in the assignment flow.
    pub async fn fail_recipient_lookups(&self) {
        self.inner.lock().await.fail_recipient_lookups = true;
    }

    /// Backdate a group and its participants' heartbeats for reaper tests.
    pub async fn backdate(&self, group_id: &str, by: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(group) = inner.groups.get_mut(group_id) {
            group.created_at -= by;
        }
        for participant in inner.participants.values_mut() {
            if participant.group_id == group_id {
                participant.last_seen -= by;
            }
        }
    }

    fn clear_bar_fields(group: &mut Group) {
        group.status = GroupStatus::Waiting;
        group.bar_name = None;
        group.bar_address = None;
        group.bar_place_id = None;
        group.bar_latitude = None;
        group.bar_longitude = None;
        group.meeting_time = None;
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn find_compatible(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Group>, AppError> {
        let inner = self.inner.lock().await;
        let mut candidates: Vec<&Group> = inner
            .groups
            .values()
            .filter(|g| g.status == GroupStatus::Waiting && g.has_capacity())
            .filter(|g| match (g.latitude, g.longitude) {
                (Some(lat), Some(lng)) => {
                    geo::distance_meters(latitude, longitude, lat, lng) <= g.search_radius
                }
                _ => false,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.current_participants
                .cmp(&a.current_participants)
                .then(b.created_at.cmp(&a.created_at))
        });

        Ok(candidates.first().map(|g| (*g).clone()))
    }

    async fn create_with_creator(
        &self,
        new_group: NewGroup,
        creator_id: &str,
    ) -> Result<Group, AppError> {
        let mut inner = self.inner.lock().await;
        let group_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let group = Group {
            group_id: group_id.clone(),
            status: GroupStatus::Waiting,
            current_participants: 1,
            max_participants: MAX_GROUP_SIZE,
            latitude: Some(new_group.latitude),
            longitude: Some(new_group.longitude),
            location_name: new_group.location_name,
            search_radius: new_group.search_radius,
            is_scheduled: new_group.is_scheduled,
            scheduled_for: new_group.scheduled_for,
            bar_name: None,
            bar_address: None,
            bar_place_id: None,
            bar_latitude: None,
            bar_longitude: None,
            meeting_time: None,
            created_by: creator_id.to_string(),
            created_at: now,
        };
        inner.groups.insert(group_id.clone(), group.clone());
        inner.participants.insert(
            (group_id.clone(), creator_id.to_string()),
            Participant {
                group_id,
                user_id: creator_id.to_string(),
                status: ParticipantStatus::Confirmed,
                joined_at: now,
                last_seen: now,
            },
        );
        Ok(group)
    }

    async fn try_join(&self, group_id: &str, user_id: &str) -> Result<JoinOutcome, AppError> {
        let mut inner = self.inner.lock().await;

        let key = (group_id.to_string(), user_id.to_string());
        if inner.participants.contains_key(&key) {
            let group = inner
                .groups
                .get(group_id)
                .cloned()
                .ok_or(AppError::GroupNotFound)?;
            return Ok(JoinOutcome {
                group,
                newly_confirmed: false,
                already_member: true,
            });
        }

        let group = inner
            .groups
            .get_mut(group_id)
            .ok_or(AppError::GroupNotFound)?;
        if group.status != GroupStatus::Waiting || !group.has_capacity() {
            return Err(AppError::GroupFull);
        }

        group.current_participants += 1;
        let newly_confirmed = group.current_participants >= group.max_participants;
        if newly_confirmed {
            group.status = GroupStatus::Confirmed;
        }
        let group = group.clone();

        let now = Utc::now();
        inner.participants.insert(
            key,
            Participant {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
                status: ParticipantStatus::Confirmed,
                joined_at: now,
                last_seen: now,
            },
        );

        Ok(JoinOutcome {
            group,
            newly_confirmed,
            already_member: false,
        })
    }

    async fn leave(&self, group_id: &str, user_id: &str) -> Result<LeaveOutcome, AppError> {
        let mut inner = self.inner.lock().await;

        let key = (group_id.to_string(), user_id.to_string());
        if inner.participants.remove(&key).is_none() {
            return Err(AppError::NotAMember);
        }

        let group = inner
            .groups
            .get_mut(group_id)
            .ok_or(AppError::GroupNotFound)?;
        group.current_participants = (group.current_participants - 1).max(0);

        let mut reverted = false;
        if group.status == GroupStatus::Confirmed
            && group.current_participants < group.max_participants
        {
            Self::clear_bar_fields(group);
            reverted = true;
        }

        Ok(LeaveOutcome {
            removed: true,
            reverted_to_waiting: reverted,
        })
    }

    async fn find_by_id(&self, group_id: &str) -> Result<Option<Group>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.groups.get(group_id).cloned())
    }

    async fn active_membership(&self, user_id: &str) -> Result<Option<Participant>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .participants
            .values()
            .find(|p| {
                p.user_id == user_id
                    && p.status == ParticipantStatus::Confirmed
                    && inner
                        .groups
                        .get(&p.group_id)
                        .is_some_and(|g| !g.status.is_terminal())
            })
            .cloned())
    }

    async fn confirmed_user_ids(&self, group_id: &str) -> Result<Vec<String>, AppError> {
        let inner = self.inner.lock().await;
        if inner.fail_recipient_lookups {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut members: Vec<&Participant> = inner
            .participants
            .values()
            .filter(|p| p.group_id == group_id && p.status == ParticipantStatus::Confirmed)
            .collect();
        members.sort_by_key(|p| p.joined_at);
        Ok(members.iter().map(|p| p.user_id.clone()).collect())
    }

    async fn heartbeat(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<DateTime<Utc>, AppError> {
        let mut inner = self.inner.lock().await;
        let key = (group_id.to_string(), user_id.to_string());
        let participant = inner.participants.get_mut(&key).ok_or(AppError::NotAMember)?;
        participant.last_seen = participant.last_seen.max(Utc::now());
        Ok(participant.last_seen)
    }

    async fn recompute_participant_count(&self, group_id: &str) -> Result<i32, AppError> {
        let mut inner = self.inner.lock().await;
        let counted = inner
            .participants
            .values()
            .filter(|p| p.group_id == group_id && p.status == ParticipantStatus::Confirmed)
            .count() as i32;

        let group = inner
            .groups
            .get_mut(group_id)
            .ok_or(AppError::GroupNotFound)?;
        if group.current_participants != counted {
            tracing::warn!(group_id, counted, "participant count drift corrected");
            group.current_participants = counted;
            if group.status == GroupStatus::Confirmed && counted < group.max_participants {
                Self::clear_bar_fields(group);
            }
        }
        Ok(counted)
    }

    async fn assign_bar(
        &self,
        group_id: &str,
        assignment: &BarAssignment,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let Some(group) = inner.groups.get_mut(group_id) else {
            return Ok(false);
        };
        let eligible = group.status == GroupStatus::Confirmed
            && group.current_participants == group.max_participants
            && group.bar_place_id.is_none();
        if !eligible {
            return Ok(false);
        }
        group.bar_name = Some(assignment.bar_name.clone());
        group.bar_address = Some(assignment.bar_address.clone());
        group.bar_place_id = Some(assignment.bar_place_id.clone());
        group.bar_latitude = Some(assignment.bar_latitude);
        group.bar_longitude = Some(assignment.bar_longitude);
        group.meeting_time = Some(assignment.meeting_time);
        Ok(true)
    }

    async fn reap_stale(
        &self,
        stale_group_age: Duration,
        participant_idle_age: Duration,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let created_before = now - stale_group_age;
        let seen_since = now - participant_idle_age;

        let stale_ids: Vec<String> = inner
            .groups
            .values()
            .filter(|g| {
                g.status == GroupStatus::Waiting
                    && g.created_at < created_before
                    && g.has_capacity()
            })
            .filter(|g| {
                !inner
                    .participants
                    .values()
                    .any(|p| p.group_id == g.group_id && p.last_seen > seen_since)
            })
            .map(|g| g.group_id.clone())
            .collect();

        for group_id in &stale_ids {
            if let Some(group) = inner.groups.get_mut(group_id) {
                group.status = GroupStatus::Cancelled;
            }
            inner.participants.retain(|_, p| &p.group_id != group_id);
        }

        Ok(stale_ids.len() as u64)
    }
}
