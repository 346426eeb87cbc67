use axum::http::StatusCode;
use axum::response::IntoResponse;

pub mod group;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
