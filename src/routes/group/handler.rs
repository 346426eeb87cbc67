use axum::{
    Extension,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::bars::assigner;
use crate::error::AppError;
use crate::matching::{self, MatchingDefaults, RequestedLocation};
use crate::reaper;
use crate::utils::{Claims, success_to_api_response};

use super::model::{
    CreateOrJoinRequest, CreateOrJoinResponse, CurrentGroupResponse, GroupIdRequest, GroupInfo,
    HeartbeatResponse, ReapResponse,
};

fn matching_defaults(state: &AppState) -> MatchingDefaults {
    MatchingDefaults {
        fallback_latitude: state.config.default_latitude,
        fallback_longitude: state.config.default_longitude,
        fallback_location_name: state.config.default_location_name.clone(),
        search_radius: state
            .config
            .default_search_radius
            .min(state.config.max_search_radius),
    }
}

/// Kicks off bar assignment in the background once a join confirms a group.
/// The orchestrator re-checks eligibility itself, so a duplicate trigger is
/// harmless.
fn spawn_bar_assignment(state: &AppState, group_id: String) {
    let store = state.store.clone();
    let places = state.places.clone();
    let notifier = state.notifier.clone();
    let config = state.config.clone();
    tokio::spawn(async move {
        let result = assigner::assign_bar(
            store.as_ref(),
            places.as_ref(),
            notifier.as_ref(),
            &group_id,
            config.default_latitude,
            config.default_longitude,
            config.bar_search_radius,
        )
        .await;
        match result {
            Ok(_) => {}
            // Retryable or already handled; the explicit endpoint can
            // re-attempt later.
            Err(AppError::NotEligible) | Err(AppError::NoBarFound) => {
                tracing::info!(group_id, "automatic bar assignment deferred");
            }
            Err(e) => tracing::error!(group_id, error = %e, "automatic bar assignment failed"),
        }
    });
}

#[axum::debug_handler]
pub async fn create_or_join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrJoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let requested = match (req.latitude, req.longitude) {
        (Some(latitude), Some(longitude)) => Some(RequestedLocation {
            latitude,
            longitude,
            location_name: req.location_name,
        }),
        _ => None,
    };

    let result = matching::create_or_join(
        state.store.as_ref(),
        &claims.sub,
        requested,
        &matching_defaults(&state),
    )
    .await?;

    if result.newly_confirmed {
        spawn_bar_assignment(&state, result.group.group_id.clone());
    }

    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        success_to_api_response(CreateOrJoinResponse {
            group_id: result.group.group_id.clone(),
            created: result.created,
            group: GroupInfo::from(result.group),
        }),
    ))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    matching::leave_group(state.store.as_ref(), &req.group_id, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}

#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let last_seen = state.store.heartbeat(&req.group_id, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(HeartbeatResponse { last_seen }),
    ))
}

#[axum::debug_handler]
pub async fn assign_bar(
    State(state): State<AppState>,
    Json(req): Json<GroupIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let assignment = assigner::assign_bar(
        state.store.as_ref(),
        state.places.as_ref(),
        state.notifier.as_ref(),
        &req.group_id,
        state.config.default_latitude,
        state.config.default_longitude,
        state.config.bar_search_radius,
    )
    .await?;

    Ok((StatusCode::OK, success_to_api_response(assignment)))
}

#[axum::debug_handler]
pub async fn current_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    // Sweep stale groups first so a dead membership doesn't pin the user.
    if let Err(e) = reaper::reap_once(state.store.as_ref(), &state.config).await {
        tracing::warn!(error = %e, "pre-read reap sweep failed");
    }

    let membership = state.store.active_membership(&claims.sub).await?;
    let group = match membership {
        Some(participant) => {
            // Defensive repair: correct any counter drift before handing the
            // snapshot to the client.
            state
                .store
                .recompute_participant_count(&participant.group_id)
                .await?;
            state
                .store
                .find_by_id(&participant.group_id)
                .await?
                .map(GroupInfo::from)
        }
        None => None,
    };

    Ok((
        StatusCode::OK,
        success_to_api_response(CurrentGroupResponse { group }),
    ))
}

#[axum::debug_handler]
pub async fn reap_stale(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let reaped_count = reaper::reap_once(state.store.as_ref(), &state.config).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ReapResponse { reaped_count }),
    ))
}
