use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::db::{Db, Document};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared handler state. `store` is `None` when the startup connection
/// failed; it is never retried for the life of the process.
#[derive(Clone)]
pub struct AppState {
    store: Option<Db>,
}

impl AppState {
    pub fn new(store: Option<Db>) -> Self {
        Self { store }
    }

    fn store(&self) -> Result<&Db, ApiError> {
        self.store.as_ref().ok_or(ApiError::StoreUnavailable)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    StoreUnavailable,
    BadRequest(String),
    Store(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::StoreUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "document store unavailable".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(e) => {
                tracing::error!("store request failed: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Validate a request body as a document. Empty bodies, malformed JSON,
/// non-objects and `{}` are all rejected. The accepted document keeps the
/// posted text exactly, minus surrounding whitespace.
fn parse_document(body: &[u8]) -> Result<Document, ApiError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid json: {e}")))?
        .trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("data must not be empty".to_string()));
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if map.is_empty() => {
            Err(ApiError::BadRequest("data must not be empty".to_string()))
        }
        Ok(Value::Object(_)) => RawValue::from_string(text.to_string())
            .map_err(|e| ApiError::BadRequest(format!("invalid json: {e}"))),
        Ok(Value::Null) => Err(ApiError::BadRequest("data must not be empty".to_string())),
        Ok(_) => Err(ApiError::BadRequest(
            "data must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("invalid json: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/save", post(save))
        .route("/data", get(data))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn save(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;
    let doc = parse_document(&body)?;

    let id = store.save(&doc).await.map_err(ApiError::Store)?;
    let document = doc.get();
    tracing::info!(id, %document, "data received");

    Ok(Json(json!({ "message": "data saved" })))
}

async fn data(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    let store = state.store()?;
    let docs = store.list().await.map_err(ApiError::Store)?;
    Ok(Json(docs))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let addr = config.addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("ingest listening on http://{addr}");

    axum::serve(listener, router(state, config.max_body_bytes))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    const LIMIT: usize = 64 * 1024;

    async fn healthy() -> Router {
        let db = Db::open("sqlite::memory:", Duration::from_secs(5))
            .await
            .unwrap();
        router(AppState::new(Some(db)), LIMIT)
    }

    fn unavailable() -> Router {
        router(AppState::new(None), LIMIT)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post_save(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/save")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_data() -> Request<Body> {
        Request::builder()
            .uri("/data")
            .body(Body::empty())
            .unwrap()
    }

    // -- parse_document ---------------------------------------------------

    #[test]
    fn parse_document_accepts_object() {
        let doc = parse_document(br#"{"temp":21}"#).unwrap();
        assert_eq!(doc.get(), r#"{"temp":21}"#);
    }

    #[test]
    fn parse_document_keeps_text_but_trims_outer_whitespace() {
        let doc = parse_document(b"\n  {\"temp\": 21.50 }\r\n").unwrap();
        assert_eq!(doc.get(), r#"{"temp": 21.50 }"#);
    }

    #[test]
    fn parse_document_rejects_invalid_utf8() {
        assert!(matches!(
            parse_document(b"{\"temp\":\"\xff\"}"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn parse_document_rejects_empty_inputs() {
        for body in [&b""[..], &b"   "[..], &b"{}"[..], &b"null"[..]] {
            assert!(
                matches!(parse_document(body), Err(ApiError::BadRequest(_))),
                "should reject {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn parse_document_rejects_non_objects() {
        assert!(matches!(
            parse_document(b"[1,2]"),
            Err(ApiError::BadRequest(msg)) if msg.contains("JSON object")
        ));
        assert!(matches!(
            parse_document(b"{\"temp\":"),
            Err(ApiError::BadRequest(msg)) if msg.contains("invalid json")
        ));
    }

    // -- POST /save -------------------------------------------------------

    #[tokio::test]
    async fn save_empty_object_is_bad_request() {
        let app = healthy().await;
        let (status, body) = send(&app, post_save("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v["error"].is_string());
    }

    #[tokio::test]
    async fn save_missing_body_is_bad_request() {
        let app = healthy().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/save")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn save_then_list_shows_document() {
        let app = healthy().await;

        let (status, body) = send(&app, post_save(r#"{"temp":21}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v["message"].is_string());

        let (status, body) = send(&app, get_data()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"[{"temp":21}]"#);
    }

    #[tokio::test]
    async fn round_trip_is_byte_equivalent() {
        let app = healthy().await;
        let posted = r#"{"temp":23.5,"hum":61.0,"light":1873,"motion":1}"#;

        let (status, _) = send(&app, post_save(posted)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, get_data()).await;
        assert_eq!(body, format!("[{posted}]"));
    }

    #[tokio::test]
    async fn round_trip_keeps_formatting_and_number_text() {
        let app = healthy().await;
        let bodies = [
            r#"{"temp": 21, "hum": 40}"#,
            r#"{"temp":21.50}"#,
            r#"{"id":12345678901234567890123}"#,
        ];
        for posted in bodies {
            let (status, _) = send(&app, post_save(posted)).await;
            assert_eq!(status, StatusCode::OK, "rejected {posted}");
        }

        let (_, body) = send(&app, get_data()).await;
        assert_eq!(body, format!("[{}]", bodies.join(",")));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = router(
            AppState::new(Some(
                Db::open("sqlite::memory:", Duration::from_secs(5))
                    .await
                    .unwrap(),
            )),
            16,
        );
        let (status, _) = send(&app, post_save(r#"{"label":"far too long for the limit"}"#)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    // -- GET /data --------------------------------------------------------

    #[tokio::test]
    async fn data_on_empty_store_is_empty_array() {
        let app = healthy().await;
        let (status, body) = send(&app, get_data()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn data_lists_every_saved_document() {
        let app = healthy().await;
        for i in 0..3 {
            let (status, _) = send(&app, post_save(&format!(r#"{{"seq":{i}}}"#))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, body) = send(&app, get_data()).await;
        let docs: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.get("id").is_none()));
    }

    // -- Store unavailable ------------------------------------------------

    #[tokio::test]
    async fn unavailable_store_fails_both_endpoints() {
        let app = unavailable();

        let (status, body) = send(&app, post_save(r#"{"temp":21}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v["error"].is_string());

        let (status, _) = send(&app, get_data()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn failing_store_returns_500_with_error() {
        let db = Db::open("sqlite::memory:", Duration::from_secs(5))
            .await
            .unwrap();
        let app = router(AppState::new(Some(db.clone())), LIMIT);
        db.close().await;

        let (status, body) = send(&app, post_save(r#"{"temp":21}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v["error"].is_string());

        let (status, body) = send(&app, get_data()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v["error"].is_string());
    }

    #[tokio::test]
    async fn unavailable_store_wins_over_bad_body() {
        let app = unavailable();
        let (status, _) = send(&app, post_save("{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    // -- CORS -------------------------------------------------------------

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = healthy().await;
        let req = Request::builder()
            .uri("/data")
            .header(header::ORIGIN, "http://dashboard.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
