//! In-process stand-in for the platform API.
//!
//! Serves the reply shapes the transport has to classify: JSON envelopes with
//! and without `errcode`, binary attachments, `video_url` indirections (as
//! `text/plain` and as JSON), opaque text and server errors. Every request is
//! counted per path so tests can assert how many round-trips a call made.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const ACCESS_TOKEN: &str = "MOCK_ACCESS_TOKEN";
pub const REPORT_BYTES: &[u8] = b"%PDF-1.4 mock report";
pub const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42 mock video";

/// Request count per path.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    hits: Arc<RwLock<HashMap<String, u64>>>,
}

impl AppState {
    pub async fn hits(&self, path: &str) -> u64 {
        self.hits.read().await.get(path).copied().unwrap_or(0)
    }
}

#[derive(Deserialize)]
pub struct MediaQuery {
    #[serde(default)]
    pub media_id: String,
}

#[derive(Deserialize)]
pub struct MaterialRequest {
    pub media_id: String,
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/cgi-bin/token", get(token))
        .route("/echo", get(echo).post(echo))
        .route("/cgi-bin/media/upload", post(upload))
        .route("/cgi-bin/media/get", get(media_get))
        .route("/cgi-bin/material/get_material", post(get_material))
        .route("/media/video.mp4", get(video))
        .route("/hits", get(hits))
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    debug!(method = %request.method(), %path, "request");
    *state.hits.write().await.entry(path).or_insert(0) += 1;
    next.run(request).await
}

async fn hits(State(state): State<AppState>) -> Json<HashMap<String, u64>> {
    Json(state.hits.read().await.clone())
}

async fn token(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("secret").map(String::as_str) {
        Some("wrong") | None => Json(json!({"errcode": 40001, "errmsg": "invalid credential"})),
        Some(_) => Json(json!({"access_token": ACCESS_TOKEN, "expires_in": 7200})),
    }
}

/// Reports what the client sent.
async fn echo(headers: HeaderMap, body: String) -> Json<Value> {
    let value_of = |name: header::HeaderName| {
        headers
            .get(&name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "errcode": 0,
        "errmsg": "ok",
        "content_length": value_of(header::CONTENT_LENGTH),
        "content_type": value_of(header::CONTENT_TYPE),
        "user_agent": value_of(header::USER_AGENT),
        "accept_charset": value_of(header::ACCEPT_CHARSET),
        "body": body,
    }))
}

async fn upload(headers: HeaderMap, mut multipart: Multipart) -> Result<Json<Value>, (StatusCode, String)> {
    let bad_request = |e: axum::extract::multipart::MultipartError| (StatusCode::BAD_REQUEST, e.to_string());

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("media") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(bad_request)?;
        info!(%file_name, size = bytes.len(), "media uploaded");
        return Ok(Json(json!({
            "type": "image",
            "media_id": Uuid::new_v4().to_string(),
            "created_at": 1_700_000_000,
            "filename": file_name,
            "size": bytes.len(),
            "connection": headers.get(header::CONNECTION).and_then(|v| v.to_str().ok()),
            "cache_control": headers.get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
        })));
    }
    Ok(Json(json!({"errcode": 41005, "errmsg": "media data missing"})))
}

async fn media_get(headers: HeaderMap, Query(query): Query<MediaQuery>) -> Response {
    media_reply(&headers, &query.media_id)
}

/// The platform reads the JSON body whatever `Content-Type` says.
async fn get_material(headers: HeaderMap, body: String) -> Response {
    match serde_json::from_str::<MaterialRequest>(&body) {
        Ok(request) => media_reply(&headers, &request.media_id),
        Err(_) => Json(json!({"errcode": 47001, "errmsg": "data format error"})).into_response(),
    }
}

async fn video() -> Response {
    (
        [
            (header::CONTENT_TYPE, "video/mp4"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"video.mp4\""),
        ],
        VIDEO_BYTES,
    )
        .into_response()
}

fn media_reply(headers: &HeaderMap, media_id: &str) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("127.0.0.1");

    match media_id {
        "report" => (
            [
                (header::CONTENT_TYPE, "application/pdf"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"report.pdf\""),
            ],
            REPORT_BYTES,
        )
            .into_response(),
        "video" => (
            [(header::CONTENT_TYPE, "text/plain")],
            json!({"video_url": format!("http://{host}/media/video.mp4")}).to_string(),
        )
            .into_response(),
        "video-json" => Json(json!({"video_url": format!("http://{host}/media/video.mp4")})).into_response(),
        "loop" => Json(json!({"video_url": format!("http://{host}/cgi-bin/media/get?media_id=loop")})).into_response(),
        "bad-video" => Json(json!({"video_url": "not a url"})).into_response(),
        "news" => Json(json!({"news_item": [{"title": "hello", "url": "http://mp.weixin.qq.com/s/x"}]})).into_response(),
        "busy" => ([(header::CONTENT_TYPE, "text/plain")], "system busy").into_response(),
        "crash" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/html")],
            "<h1>500 Internal Server Error</h1>",
        )
            .into_response(),
        _ => Json(json!({"errcode": 40007, "errmsg": "invalid media_id"})).into_response(),
    }
}
