//! Bar assignment orchestration: runs when a group fills up, re-checks
//! eligibility at execution time, picks the best-ranked venue and writes the
//! whole assignment in one conditional update.

use chrono::{Duration, Utc};
use serde_json::json;

use crate::error::AppError;
use crate::geo;
use crate::models::{BarAssignment, GroupStatus, MAX_GROUP_SIZE};
use crate::notify::{NotificationPayload, Notifier};
use crate::store::GroupStore;

use super::places::PlacesProvider;
use super::ranker;

pub async fn assign_bar(
    store: &dyn GroupStore,
    places: &dyn PlacesProvider,
    notifier: &dyn Notifier,
    group_id: &str,
    fallback_latitude: f64,
    fallback_longitude: f64,
    search_radius: f64,
) -> Result<BarAssignment, AppError> {
    let group = store
        .find_by_id(group_id)
        .await?
        .ok_or(AppError::GroupNotFound)?;

    // Execution-time eligibility re-check: double triggers and state changes
    // between the confirming join and this call land here.
    let eligible = group.status == GroupStatus::Confirmed
        && group.current_participants == MAX_GROUP_SIZE
        && !group.has_bar_assigned();
    if !eligible {
        tracing::debug!(group_id, "group not eligible for bar assignment");
        return Err(AppError::NotEligible);
    }

    // Search center: the group's own coordinates when valid, else the
    // configured fallback city center.
    let (center_lat, center_lng) = match (group.latitude, group.longitude) {
        (Some(lat), Some(lng)) if geo::validate(lat, lng).is_ok() => (lat, lng),
        _ => (fallback_latitude, fallback_longitude),
    };

    let candidates = places
        .search_nearby(center_lat, center_lng, search_radius)
        .await?;
    if candidates.is_empty() {
        return Err(AppError::NoBarFound);
    }

    let best = ranker::select_best(candidates).ok_or(AppError::NoBarFound)?;

    let assignment = BarAssignment {
        bar_name: ranker::extract_robust_bar_name(&best),
        bar_address: best.formatted_address.clone(),
        bar_place_id: best.place_id.clone(),
        bar_latitude: best.latitude,
        bar_longitude: best.longitude,
        // The outing starts one hour after the bar is picked, fixed offset.
        meeting_time: Utc::now() + Duration::hours(1),
    };

    // One conditional write; zero affected rows means another assignment
    // committed first.
    if !store.assign_bar(group_id, &assignment).await? {
        tracing::debug!(group_id, "lost the assignment race, nothing written");
        return Err(AppError::NotEligible);
    }

    tracing::info!(
        group_id,
        bar_name = %assignment.bar_name,
        meeting_time = %assignment.meeting_time,
        "bar assigned to group"
    );

    // Best effort from here on: the assignment is committed, so neither the
    // recipient lookup nor the dispatch may turn it into a failure.
    match store.confirmed_user_ids(group_id).await {
        Ok(recipients) => {
            let payload = NotificationPayload {
                title: "Votre bar est choisi !".to_string(),
                body: format!("Rendez-vous au {}", assignment.bar_name),
                data: json!({
                    "group_id": group_id,
                    "bar_name": assignment.bar_name,
                    "bar_address": assignment.bar_address,
                    "meeting_time": assignment.meeting_time,
                }),
            };
            if let Err(e) = notifier.notify(&recipients, &payload).await {
                tracing::error!(group_id, error = %e, "bar notification dispatch failed");
            }
        }
        Err(e) => {
            tracing::error!(group_id, error = %e, "recipient lookup failed, notification skipped");
        }
    }

    Ok(assignment)
}
