//! Group formation flow: resolve a usable location, enforce exclusive
//! membership, then join the best compatible waiting group or open a new one.

use crate::error::AppError;
use crate::geo;
use crate::models::{Group, LeaveOutcome, NewGroup};
use crate::store::GroupStore;

/// Fallbacks applied when the client cannot provide a location, plus the
/// matching radius stamped on newly created groups.
#[derive(Debug, Clone)]
pub struct MatchingDefaults {
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    pub fallback_location_name: String,
    pub search_radius: f64,
}

#[derive(Debug, Clone)]
pub struct RequestedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JoinResult {
    pub group: Group,
    /// True when no compatible group existed and a fresh one was opened.
    pub created: bool,
    /// True when this join filled the group and confirmed it; the caller
    /// triggers bar assignment off this flag.
    pub newly_confirmed: bool,
}

/// A join losing the race for the last seat retries the compatibility
/// search this many times before opening a new group.
const JOIN_ATTEMPTS: usize = 3;

pub async fn create_or_join(
    store: &dyn GroupStore,
    user_id: &str,
    requested: Option<RequestedLocation>,
    defaults: &MatchingDefaults,
) -> Result<JoinResult, AppError> {
    let (coords, location_name) = match requested {
        Some(loc) => {
            let coords = geo::validate(loc.latitude, loc.longitude)?;
            let name = loc
                .location_name
                .unwrap_or_else(|| defaults.fallback_location_name.clone());
            (coords, name)
        }
        None => {
            let coords = geo::validate(defaults.fallback_latitude, defaults.fallback_longitude)?;
            (coords, defaults.fallback_location_name.clone())
        }
    };

    // At most one confirmed participation across all active groups.
    if store.active_membership(user_id).await?.is_some() {
        return Err(AppError::AlreadyInGroup);
    }

    for _ in 0..JOIN_ATTEMPTS {
        let Some(candidate) = store
            .find_compatible(coords.latitude, coords.longitude)
            .await?
        else {
            break;
        };

        match store.try_join(&candidate.group_id, user_id).await {
            Ok(outcome) => {
                tracing::info!(
                    group_id = %outcome.group.group_id,
                    count = outcome.group.current_participants,
                    newly_confirmed = outcome.newly_confirmed,
                    "user joined existing group"
                );
                return Ok(JoinResult {
                    group: outcome.group,
                    created: false,
                    newly_confirmed: outcome.newly_confirmed,
                });
            }
            // Lost the race for the last seat; search again.
            Err(AppError::GroupFull) | Err(AppError::GroupNotFound) => continue,
            Err(e) => return Err(e),
        }
    }

    let group = store
        .create_with_creator(
            NewGroup {
                latitude: coords.latitude,
                longitude: coords.longitude,
                location_name,
                search_radius: defaults.search_radius,
                is_scheduled: false,
                scheduled_for: None,
            },
            user_id,
        )
        .await?;

    tracing::info!(group_id = %group.group_id, "opened new group");
    Ok(JoinResult {
        group,
        created: true,
        newly_confirmed: false,
    })
}

pub async fn leave_group(
    store: &dyn GroupStore,
    group_id: &str,
    user_id: &str,
) -> Result<LeaveOutcome, AppError> {
    let outcome = store.leave(group_id, user_id).await?;
    if outcome.reverted_to_waiting {
        tracing::info!(group_id, "confirmed group reverted to waiting, bar cleared");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BarAssignment, GroupStatus};
    use crate::store::memory::MemoryGroupStore;
    use chrono::Utc;

    fn defaults() -> MatchingDefaults {
        MatchingDefaults {
            fallback_latitude: 48.8566,
            fallback_longitude: 2.3522,
            fallback_location_name: "Paris".into(),
            search_radius: 10_000.0,
        }
    }

    fn paris() -> Option<RequestedLocation> {
        Some(RequestedLocation {
            latitude: 48.8566,
            longitude: 2.3522,
            location_name: Some("Paris".into()),
        })
    }

    fn near_paris() -> Option<RequestedLocation> {
        Some(RequestedLocation {
            latitude: 48.86,
            longitude: 2.34,
            location_name: None,
        })
    }

    async fn fill_group(store: &MemoryGroupStore, group_id: &str, users: &[&str]) {
        for user in users {
            store.try_join(group_id, user).await.unwrap();
        }
    }

    #[tokio::test]
    async fn creates_group_when_no_match_exists() {
        let store = MemoryGroupStore::new();
        let result = create_or_join(&store, "alice", paris(), &defaults())
            .await
            .unwrap();
        assert!(result.created);
        assert_eq!(result.group.current_participants, 1);
        assert_eq!(result.group.status, GroupStatus::Waiting);
        assert_eq!(result.group.created_by, "alice");
    }

    #[tokio::test]
    async fn joins_nearby_waiting_group() {
        let store = MemoryGroupStore::new();
        let first = create_or_join(&store, "alice", paris(), &defaults())
            .await
            .unwrap();
        let second = create_or_join(&store, "bob", near_paris(), &defaults())
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.group.group_id, first.group.group_id);
        assert_eq!(second.group.current_participants, 2);
    }

    #[tokio::test]
    async fn distant_user_gets_a_new_group() {
        let store = MemoryGroupStore::new();
        let paris_group = create_or_join(&store, "alice", paris(), &defaults())
            .await
            .unwrap();
        // Lyon is ~390km from Paris, far outside the 10km radius.
        let lyon = Some(RequestedLocation {
            latitude: 45.764,
            longitude: 4.8357,
            location_name: Some("Lyon".into()),
        });
        let lyon_group = create_or_join(&store, "bob", lyon, &defaults())
            .await
            .unwrap();
        assert!(lyon_group.created);
        assert_ne!(lyon_group.group.group_id, paris_group.group.group_id);
    }

    #[tokio::test]
    async fn prefers_the_fuller_group() {
        let store = MemoryGroupStore::new();
        let sparse = create_or_join(&store, "a1", paris(), &defaults())
            .await
            .unwrap();
        // Second group seeded directly so both sit in the same area.
        let fuller = store
            .create_with_creator(
                NewGroup {
                    latitude: 48.8570,
                    longitude: 2.3520,
                    location_name: "Paris".into(),
                    search_radius: 10_000.0,
                    is_scheduled: false,
                    scheduled_for: None,
                },
                "b1",
            )
            .await
            .unwrap();
        fill_group(&store, &fuller.group_id, &["b2", "b3"]).await;

        let joined = create_or_join(&store, "newcomer", near_paris(), &defaults())
            .await
            .unwrap();
        assert_eq!(joined.group.group_id, fuller.group_id);
        assert_ne!(joined.group.group_id, sparse.group.group_id);
    }

    #[tokio::test]
    async fn rejects_second_confirmed_membership() {
        let store = MemoryGroupStore::new();
        create_or_join(&store, "alice", paris(), &defaults())
            .await
            .unwrap();
        let err = create_or_join(&store, "alice", paris(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyInGroup));
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected() {
        let store = MemoryGroupStore::new();
        let null_island = Some(RequestedLocation {
            latitude: 0.0,
            longitude: 0.0,
            location_name: None,
        });
        let err = create_or_join(&store, "alice", null_island, &defaults())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCoordinates(_)));
    }

    #[tokio::test]
    async fn missing_location_falls_back_to_default_center() {
        let store = MemoryGroupStore::new();
        let result = create_or_join(&store, "alice", None, &defaults())
            .await
            .unwrap();
        assert_eq!(result.group.latitude, Some(48.8566));
        assert_eq!(result.group.longitude, Some(2.3522));
        assert_eq!(result.group.location_name, "Paris");
    }

    #[tokio::test]
    async fn fifth_join_confirms_the_group() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        fill_group(&store, &group.group_id, &["u2", "u3", "u4"]).await;

        let fifth = store.try_join(&group.group_id, "u5").await.unwrap();
        assert!(fifth.newly_confirmed);
        assert_eq!(fifth.group.status, GroupStatus::Confirmed);
        assert_eq!(fifth.group.current_participants, 5);
    }

    #[tokio::test]
    async fn concurrent_fifth_joins_yield_one_winner() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        fill_group(&store, &group.group_id, &["u2", "u3", "u4"]).await;

        let (a, b) = tokio::join!(
            store.try_join(&group.group_id, "racer_a"),
            store.try_join(&group.group_id, "racer_b"),
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser.unwrap_err(), AppError::GroupFull));

        let settled = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        assert_eq!(settled.status, GroupStatus::Confirmed);
        assert_eq!(settled.current_participants, 5);
    }

    #[tokio::test]
    async fn rejoining_is_idempotent() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        store.try_join(&group.group_id, "u2").await.unwrap();
        let again = store.try_join(&group.group_id, "u2").await.unwrap();
        assert!(again.already_member);
        assert_eq!(again.group.current_participants, 2);
    }

    #[tokio::test]
    async fn count_always_matches_confirmed_rows() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        fill_group(&store, &group.group_id, &["u2", "u3"]).await;
        leave_group(&store, &group.group_id, "u2").await.unwrap();
        store.try_join(&group.group_id, "u4").await.unwrap();

        let current = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        let rows = store.confirmed_user_ids(&group.group_id).await.unwrap();
        assert_eq!(current.current_participants as usize, rows.len());
        assert!(current.current_participants >= 0);
        assert!(current.current_participants <= current.max_participants);
    }

    #[tokio::test]
    async fn leaving_a_confirmed_group_reverts_and_clears_bar() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        fill_group(&store, &group.group_id, &["u2", "u3", "u4", "u5"]).await;

        let assigned = store
            .assign_bar(
                &group.group_id,
                &BarAssignment {
                    bar_name: "Le Comptoir".into(),
                    bar_address: "12 Rue de la Soif, Paris".into(),
                    bar_place_id: "ChIJabc12345".into(),
                    bar_latitude: 48.8567,
                    bar_longitude: 2.3508,
                    meeting_time: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert!(assigned);

        let outcome = leave_group(&store, &group.group_id, "u3").await.unwrap();
        assert!(outcome.reverted_to_waiting);

        let reverted = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        assert_eq!(reverted.status, GroupStatus::Waiting);
        assert_eq!(reverted.current_participants, 4);
        assert!(reverted.bar_name.is_none());
        assert!(reverted.bar_address.is_none());
        assert!(reverted.bar_place_id.is_none());
        assert!(reverted.bar_latitude.is_none());
        assert!(reverted.bar_longitude.is_none());
        assert!(reverted.meeting_time.is_none());
    }

    #[tokio::test]
    async fn recompute_concurrent_with_confirming_join_keeps_group_confirmed() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        fill_group(&store, &group.group_id, &["u2", "u3", "u4"]).await;

        // A reconciliation racing the confirming join must never demote the
        // group back to waiting with a stale count.
        let (join, recount) = tokio::join!(
            store.try_join(&group.group_id, "u5"),
            store.recompute_participant_count(&group.group_id),
        );
        assert!(join.unwrap().newly_confirmed);
        recount.unwrap();

        let settled = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        assert_eq!(settled.status, GroupStatus::Confirmed);
        assert_eq!(settled.current_participants, 5);

        // Same holds once a bar is assigned: a later recount sees a full,
        // consistent group and leaves the assignment alone.
        let assigned = store
            .assign_bar(
                &group.group_id,
                &BarAssignment {
                    bar_name: "Le Comptoir".into(),
                    bar_address: "12 Rue de la Soif, Paris".into(),
                    bar_place_id: "ChIJabc12345".into(),
                    bar_latitude: 48.8567,
                    bar_longitude: 2.3508,
                    meeting_time: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert!(assigned);
        let counted = store
            .recompute_participant_count(&group.group_id)
            .await
            .unwrap();
        assert_eq!(counted, 5);

        let intact = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        assert_eq!(intact.status, GroupStatus::Confirmed);
        assert!(intact.has_bar_assigned());
    }

    #[tokio::test]
    async fn heartbeat_never_moves_last_seen_backwards() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;

        let first = store.heartbeat(&group.group_id, "u1").await.unwrap();
        let second = store.heartbeat(&group.group_id, "u1").await.unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn recompute_repairs_counter_drift() {
        let store = MemoryGroupStore::new();
        let group = create_or_join(&store, "u1", paris(), &defaults())
            .await
            .unwrap()
            .group;
        store.try_join(&group.group_id, "u2").await.unwrap();

        store.force_participant_count(&group.group_id, 4).await;
        let counted = store
            .recompute_participant_count(&group.group_id)
            .await
            .unwrap();
        assert_eq!(counted, 2);

        let repaired = store.find_by_id(&group.group_id).await.unwrap().unwrap();
        assert_eq!(repaired.current_participants, 2);
    }
}
