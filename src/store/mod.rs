use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;
use crate::models::{BarAssignment, Group, JoinOutcome, LeaveOutcome, NewGroup, Participant};

mod postgres;
pub use postgres::PgGroupStore;

#[cfg(test)]
pub mod memory;

/// Persistence boundary for the group-formation workflow. Every write is
/// atomic with respect to concurrent callers hitting the same group row;
/// the Postgres implementation relies on conditional UPDATEs inside
/// transactions, never on read-modify-write pairs.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Read-only compatibility search: waiting groups with spare capacity
    /// whose center lies within their own search radius of the probe point,
    /// fullest first, then most recently created.
    async fn find_compatible(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Group>, AppError>;

    /// Insert a fresh group with its creator as confirmed participant,
    /// count 1, status waiting. One transaction.
    async fn create_with_creator(
        &self,
        new_group: NewGroup,
        creator_id: &str,
    ) -> Result<Group, AppError>;

    /// Atomic join: idempotent participant insert plus a conditional
    /// increment that flips the group to confirmed when it fills. A zero-row
    /// conditional update surfaces as `GroupFull`.
    async fn try_join(&self, group_id: &str, user_id: &str) -> Result<JoinOutcome, AppError>;

    /// Remove a participant and decrement the count; a confirmed group
    /// dropping below capacity reverts to waiting with all bar fields and
    /// the meeting time cleared, in the same transaction.
    async fn leave(&self, group_id: &str, user_id: &str) -> Result<LeaveOutcome, AppError>;

    async fn find_by_id(&self, group_id: &str) -> Result<Option<Group>, AppError>;

    /// The user's confirmed participation in any non-terminal group, if one
    /// exists. Exclusive-membership precondition for join/create.
    async fn active_membership(&self, user_id: &str) -> Result<Option<Participant>, AppError>;

    async fn confirmed_user_ids(&self, group_id: &str) -> Result<Vec<String>, AppError>;

    /// Liveness heartbeat; `last_seen` is monotonically non-decreasing.
    async fn heartbeat(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<DateTime<Utc>, AppError>;

    /// Reconciliation: recount confirmed participants and correct a drifted
    /// counter, applying the confirmed-to-waiting reversion when the
    /// correction drops a confirmed group below capacity. Returns the
    /// authoritative count.
    async fn recompute_participant_count(&self, group_id: &str) -> Result<i32, AppError>;

    /// Single conditional write of all bar fields plus the meeting time,
    /// guarded on `status = confirmed`, a full group and no bar yet
    /// assigned. Returns false when the guard did not match (another
    /// assignment won the race, or the group changed state).
    async fn assign_bar(
        &self,
        group_id: &str,
        assignment: &BarAssignment,
    ) -> Result<bool, AppError>;

    /// Dissolve waiting groups older than `stale_group_age` with no
    /// participant heartbeat within `participant_idle_age`, removing their
    /// participants. The waiting-status guard keeps this safe against a
    /// concurrent join filling the group. Returns the number reaped.
    async fn reap_stale(
        &self,
        stale_group_age: Duration,
        participant_idle_age: Duration,
    ) -> Result<u64, AppError>;
}
