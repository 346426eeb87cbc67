use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::{
    BarAssignment, Group, GroupStatus, JoinOutcome, LeaveOutcome, MAX_GROUP_SIZE, NewGroup,
    Participant, ParticipantStatus,
};

use super::GroupStore;

const GROUP_COLUMNS: &str = "group_id, status, current_participants, max_participants, \
     latitude, longitude, location_name, search_radius, is_scheduled, scheduled_for, \
     bar_name, bar_address, bar_place_id, bar_latitude, bar_longitude, meeting_time, \
     created_by, created_at";

pub struct PgGroupStore {
    pool: PgPool,
    /// Upper bound for the bounding-box prefilter; individual groups carry
    /// their own (smaller) search radius.
    max_search_radius: f64,
}

impl PgGroupStore {
    pub fn new(pool: PgPool, max_search_radius: f64) -> Self {
        Self {
            pool,
            max_search_radius,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_id: String,
    status: String,
    current_participants: i32,
    max_participants: i32,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_name: String,
    search_radius: f64,
    is_scheduled: bool,
    scheduled_for: Option<DateTime<Utc>>,
    bar_name: Option<String>,
    bar_address: Option<String>,
    bar_place_id: Option<String>,
    bar_latitude: Option<f64>,
    bar_longitude: Option<f64>,
    meeting_time: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = AppError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        let status = GroupStatus::parse(&row.status).ok_or_else(|| {
            AppError::Database(sqlx::Error::Protocol(format!(
                "unknown group status '{}'",
                row.status
            )))
        })?;
        Ok(Group {
            group_id: row.group_id,
            status,
            current_participants: row.current_participants,
            max_participants: row.max_participants,
            latitude: row.latitude,
            longitude: row.longitude,
            location_name: row.location_name,
            search_radius: row.search_radius,
            is_scheduled: row.is_scheduled,
            scheduled_for: row.scheduled_for,
            bar_name: row.bar_name,
            bar_address: row.bar_address,
            bar_place_id: row.bar_place_id,
            bar_latitude: row.bar_latitude,
            bar_longitude: row.bar_longitude,
            meeting_time: row.meeting_time,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    group_id: String,
    user_id: String,
    status: String,
    joined_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        let status = ParticipantStatus::parse(&row.status).ok_or_else(|| {
            AppError::Database(sqlx::Error::Protocol(format!(
                "unknown participant status '{}'",
                row.status
            )))
        })?;
        Ok(Participant {
            group_id: row.group_id,
            user_id: row.user_id,
            status,
            joined_at: row.joined_at,
            last_seen: row.last_seen,
        })
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn find_compatible(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Group>, AppError> {
        let (lat_range, lon_range) = geo::bounding_box_degrees(latitude, self.max_search_radius);

        // Bounding-box prefilter in SQL, exact Haversine check in memory.
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS}
             FROM groups
             WHERE status = 'waiting'
               AND current_participants < max_participants
               AND latitude IS NOT NULL
               AND longitude IS NOT NULL
               AND latitude BETWEEN $1 - $3 AND $1 + $3
               AND longitude BETWEEN $2 - $4 AND $2 + $4
             ORDER BY current_participants DESC, created_at DESC"
        ))
        .bind(latitude)
        .bind(longitude)
        .bind(lat_range)
        .bind(lon_range)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let group: Group = row.try_into()?;
            let (Some(lat), Some(lng)) = (group.latitude, group.longitude) else {
                continue;
            };
            if geo::distance_meters(latitude, longitude, lat, lng) <= group.search_radius {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    async fn create_with_creator(
        &self,
        new_group: NewGroup,
        creator_id: &str,
    ) -> Result<Group, AppError> {
        let group_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "INSERT INTO groups (
                group_id, status, current_participants, max_participants,
                latitude, longitude, location_name, search_radius,
                is_scheduled, scheduled_for, created_by, created_at
             )
             VALUES ($1, 'waiting', 1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
             RETURNING {GROUP_COLUMNS}"
        ))
        .bind(&group_id)
        .bind(MAX_GROUP_SIZE)
        .bind(new_group.latitude)
        .bind(new_group.longitude)
        .bind(&new_group.location_name)
        .bind(new_group.search_radius)
        .bind(new_group.is_scheduled)
        .bind(new_group.scheduled_for)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO group_participants (group_id, user_id, status, joined_at, last_seen)
             VALUES ($1, $2, 'confirmed', NOW(), NOW())",
        )
        .bind(&group_id)
        .bind(creator_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn try_join(&self, group_id: &str, user_id: &str) -> Result<JoinOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Idempotent at the participant level: re-joining is a no-op and
        // must not bump the counter a second time.
        let inserted = sqlx::query(
            "INSERT INTO group_participants (group_id, user_id, status, joined_at, last_seen)
             VALUES ($1, $2, 'confirmed', NOW(), NOW())
             ON CONFLICT (group_id, user_id) DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            let group = self
                .find_by_id(group_id)
                .await?
                .ok_or(AppError::GroupNotFound)?;
            return Ok(JoinOutcome {
                group,
                newly_confirmed: false,
                already_member: true,
            });
        }

        // The critical section: increment and flip to confirmed in one
        // conditional statement. Zero rows means a concurrent join got the
        // last seat first.
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "UPDATE groups
             SET current_participants = current_participants + 1,
                 status = CASE WHEN current_participants + 1 >= max_participants
                               THEN 'confirmed' ELSE status END
             WHERE group_id = $1
               AND status = 'waiting'
               AND current_participants < max_participants
             RETURNING {GROUP_COLUMNS}"
        ))
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                tx.commit().await?;
                let group: Group = row.try_into()?;
                let newly_confirmed = group.status == GroupStatus::Confirmed;
                Ok(JoinOutcome {
                    group,
                    newly_confirmed,
                    already_member: false,
                })
            }
            None => {
                tx.rollback().await?;
                match self.find_by_id(group_id).await? {
                    Some(_) => Err(AppError::GroupFull),
                    None => Err(AppError::GroupNotFound),
                }
            }
        }
    }

    async fn leave(&self, group_id: &str, user_id: &str) -> Result<LeaveOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM group_participants WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Err(AppError::NotAMember);
        }

        let row = sqlx::query_as::<_, (String, i32, i32)>(
            "UPDATE groups
             SET current_participants = GREATEST(current_participants - 1, 0)
             WHERE group_id = $1
             RETURNING status, current_participants, max_participants",
        )
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, count, max)) = row else {
            tx.rollback().await?;
            return Err(AppError::GroupNotFound);
        };

        let mut reverted = false;
        if status == "confirmed" && count < max {
            // A member left a confirmed group: back to waiting, bar
            // assignment voided in full.
            sqlx::query(
                "UPDATE groups
                 SET status = 'waiting', bar_name = NULL, bar_address = NULL,
                     bar_place_id = NULL, bar_latitude = NULL, bar_longitude = NULL,
                     meeting_time = NULL
                 WHERE group_id = $1",
            )
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
            reverted = true;
        }

        tx.commit().await?;
        Ok(LeaveOutcome {
            removed: true,
            reverted_to_waiting: reverted,
        })
    }

    async fn find_by_id(&self, group_id: &str) -> Result<Option<Group>, AppError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = $1"
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Group::try_from).transpose()
    }

    async fn active_membership(&self, user_id: &str) -> Result<Option<Participant>, AppError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            "SELECT p.group_id, p.user_id, p.status, p.joined_at, p.last_seen
             FROM group_participants p
             JOIN groups g ON g.group_id = p.group_id
             WHERE p.user_id = $1
               AND p.status = 'confirmed'
               AND g.status IN ('waiting', 'confirmed')
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Participant::try_from).transpose()
    }

    async fn confirmed_user_ids(&self, group_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM group_participants
             WHERE group_id = $1 AND status = 'confirmed'
             ORDER BY joined_at",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn heartbeat(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<DateTime<Utc>, AppError> {
        // GREATEST keeps last_seen monotonic even under clock skew.
        let last_seen = sqlx::query_scalar::<_, DateTime<Utc>>(
            "UPDATE group_participants
             SET last_seen = GREATEST(last_seen, NOW())
             WHERE group_id = $1 AND user_id = $2
             RETURNING last_seen",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        last_seen.ok_or(AppError::NotAMember)
    }

    async fn recompute_participant_count(&self, group_id: &str) -> Result<i32, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock first: joins and leaves update this row inside their own
        // transactions, so holding it serializes the reconciliation against
        // them. Without it a join committing between the COUNT and the
        // corrective UPDATE would get its fresh count overwritten with the
        // stale one.
        let locked = sqlx::query_scalar::<_, String>(
            "SELECT group_id FROM groups WHERE group_id = $1 FOR UPDATE",
        )
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(AppError::GroupNotFound);
        }

        let counted = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_participants
             WHERE group_id = $1 AND status = 'confirmed'",
        )
        .bind(group_id)
        .fetch_one(&mut *tx)
        .await? as i32;

        let corrected = sqlx::query_as::<_, (i32, String, i32)>(
            "UPDATE groups
             SET current_participants = $2
             WHERE group_id = $1 AND current_participants <> $2
             RETURNING current_participants, status, max_participants",
        )
        .bind(group_id)
        .bind(counted)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((_, status, max)) = corrected {
            tracing::warn!(
                group_id,
                counted,
                "participant count drift corrected from participant rows"
            );
            if status == "confirmed" && counted < max {
                sqlx::query(
                    "UPDATE groups
                     SET status = 'waiting', bar_name = NULL, bar_address = NULL,
                         bar_place_id = NULL, bar_latitude = NULL, bar_longitude = NULL,
                         meeting_time = NULL
                     WHERE group_id = $1",
                )
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(counted)
    }

    async fn assign_bar(
        &self,
        group_id: &str,
        assignment: &BarAssignment,
    ) -> Result<bool, AppError> {
        // All-or-nothing write. The guard doubles as the idempotency check:
        // once one writer commits, every other attempt matches zero rows.
        let affected = sqlx::query(
            "UPDATE groups
             SET bar_name = $2, bar_address = $3, bar_place_id = $4,
                 bar_latitude = $5, bar_longitude = $6, meeting_time = $7
             WHERE group_id = $1
               AND status = 'confirmed'
               AND current_participants = max_participants
               AND bar_place_id IS NULL",
        )
        .bind(group_id)
        .bind(&assignment.bar_name)
        .bind(&assignment.bar_address)
        .bind(&assignment.bar_place_id)
        .bind(assignment.bar_latitude)
        .bind(assignment.bar_longitude)
        .bind(assignment.meeting_time)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn reap_stale(
        &self,
        stale_group_age: Duration,
        participant_idle_age: Duration,
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        let created_before = now - stale_group_age;
        let seen_since = now - participant_idle_age;

        let mut tx = self.pool.begin().await?;

        // The waiting-status guard means a group a concurrent join just
        // filled (now confirmed) cannot be dissolved here.
        let reaped_ids = sqlx::query_scalar::<_, String>(
            "UPDATE groups g
             SET status = 'cancelled'
             WHERE g.status = 'waiting'
               AND g.created_at < $1
               AND g.current_participants < g.max_participants
               AND NOT EXISTS (
                   SELECT 1 FROM group_participants p
                   WHERE p.group_id = g.group_id AND p.last_seen > $2
               )
             RETURNING g.group_id",
        )
        .bind(created_before)
        .bind(seen_since)
        .fetch_all(&mut *tx)
        .await?;

        if !reaped_ids.is_empty() {
            sqlx::query("DELETE FROM group_participants WHERE group_id = ANY($1)")
                .bind(&reaped_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if !reaped_ids.is_empty() {
            tracing::info!(count = reaped_ids.len(), "dissolved stale waiting groups");
        }
        Ok(reaped_ids.len() as u64)
    }
}
