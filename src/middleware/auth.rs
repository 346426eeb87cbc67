use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::utils::{error_codes, error_to_api_response, verify_token};

/// Verifies the bearer token and injects the caller's `Claims` for the
/// protected routes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(
                error_codes::AUTH_FAILED,
                "missing bearer token".to_string(),
            ),
        )
            .into_response();
    };

    match verify_token(token, &state.config) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "token verification failed");
            (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(
                    error_codes::AUTH_FAILED,
                    "invalid or expired token".to_string(),
                ),
            )
                .into_response()
        }
    }
}
