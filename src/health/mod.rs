use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{error, instrument};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    // Only GET is routed; axum answers 405 for every other verb here.
    Router::new().route("/healthz", get(health_check))
}

/// Liveness responses must never be cached by intermediaries.
fn no_cache_response(status: StatusCode) -> Response {
    let mut res = status.into_response();
    let headers = res.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    res
}

fn carries_payload(query: Option<&str>, headers: &HeaderMap, body: &Bytes) -> bool {
    let has_query = query.map(|q| !q.is_empty()).unwrap_or(false);
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    has_query || content_length > 0 || !body.is_empty()
}

#[instrument(skip_all)]
pub async fn health_check(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if carries_payload(query.as_deref(), &headers, &body) {
        return no_cache_response(StatusCode::BAD_REQUEST);
    }

    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => no_cache_response(StatusCode::OK),
        Err(e) => {
            error!(error = %e, "database unreachable");
            no_cache_response(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_headers_are_always_present() {
        let res = no_cache_response(StatusCode::OK);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(res.headers().get(header::PRAGMA).unwrap(), "no-cache");
        assert_eq!(res.headers().get(header::EXPIRES).unwrap(), "0");
    }

    #[test]
    fn clean_get_carries_no_payload() {
        assert!(!carries_payload(None, &HeaderMap::new(), &Bytes::new()));
        assert!(!carries_payload(Some(""), &HeaderMap::new(), &Bytes::new()));
    }

    #[test]
    fn query_body_or_content_length_is_a_payload() {
        assert!(carries_payload(Some("probe=1"), &HeaderMap::new(), &Bytes::new()));
        assert!(carries_payload(
            None,
            &HeaderMap::new(),
            &Bytes::from_static(b"x")
        ));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, "4".parse().unwrap());
        assert!(carries_payload(None, &headers, &Bytes::new()));
    }
}
