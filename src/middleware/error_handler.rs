use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};

/// How much of a failed response body gets captured in the log.
const BODY_CAPTURE_LIMIT: usize = 1024;

/// Logs 5xx responses with the request line and body, so provider and store
/// failures leave a trace without a client-side report.
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    match to_bytes(body, BODY_CAPTURE_LIMIT).await {
        Ok(bytes) => {
            tracing::error!(
                %method,
                path,
                status = %parts.status,
                body = %String::from_utf8_lossy(&bytes),
                "server error response"
            );
            // The body was consumed to log it; rebuild the response from
            // the captured bytes.
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            tracing::error!(
                %method,
                path,
                status = %parts.status,
                error = %e,
                "server error response, body not captured"
            );
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::empty())
        }
    }
}
