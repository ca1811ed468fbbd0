use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::credential::{CredentialError, CredentialStore};
use crate::presentation::{render_dashboard, DashboardView};
use crate::stream::{StreamError, StreamHandle, StreamSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub stream: StreamHandle,
    pub credentials: CredentialStore,
}

/// Public routes (`/health`, `/api/credential`) plus the credential-gated stream routes.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/api/stream", get(get_stream))
        .route("/api/stream/hashtag", put(put_hashtag))
        .route("/api/stream/start", post(start_stream))
        .route("/api/stream/stop", post(stop_stream))
        .route("/api/dashboard", get(get_dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_credential,
        ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/api/credential",
            get(get_credential)
                .post(post_credential)
                .delete(delete_credential),
        )
        .merge(gated)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- errors ----

pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        let status = match e {
            StreamError::EmptyHashtag => StatusCode::BAD_REQUEST,
            StreamError::AlreadyStreaming | StreamError::HashtagLocked => StatusCode::CONFLICT,
            StreamError::MissingCredential => StatusCode::UNAUTHORIZED,
            StreamError::ControllerGone => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        let status = match e {
            CredentialError::Empty => StatusCode::BAD_REQUEST,
            CredentialError::AlreadySet => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

// ---- credential gate ----

async fn require_credential(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.credentials.is_present() {
        return ApiError::from(StreamError::MissingCredential).into_response();
    }
    next.run(req).await
}

#[derive(Serialize)]
struct CredentialStatus {
    present: bool,
    fingerprint: Option<String>,
}

#[derive(Deserialize)]
struct CredentialReq {
    api_key: String,
}

async fn get_credential(State(state): State<AppState>) -> Json<CredentialStatus> {
    let cred = state.credentials.get();
    Json(CredentialStatus {
        present: cred.is_some(),
        fingerprint: cred.map(|c| c.fingerprint()),
    })
}

async fn post_credential(
    State(state): State<AppState>,
    Json(body): Json<CredentialReq>,
) -> Result<StatusCode, ApiError> {
    state.credentials.set(&body.api_key)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Session end: forget the key, then stop. The final flush runs keyless and
/// degrades to NEUTRAL without a remote call.
async fn delete_credential(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.credentials.clear();
    state.stream.stop().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- stream controls ----

#[derive(Deserialize)]
struct HashtagReq {
    hashtag: String,
}

#[derive(Serialize)]
struct HashtagResp {
    hashtag: String,
}

#[derive(Deserialize, Default)]
struct StartReq {
    #[serde(default)]
    hashtag: Option<String>,
}

async fn get_stream(State(state): State<AppState>) -> Result<Json<StreamSnapshot>, ApiError> {
    Ok(Json(state.stream.snapshot().await?))
}

async fn put_hashtag(
    State(state): State<AppState>,
    Json(body): Json<HashtagReq>,
) -> Result<Json<HashtagResp>, ApiError> {
    let hashtag = state.stream.set_hashtag(body.hashtag).await?;
    Ok(Json(HashtagResp { hashtag }))
}

/// Body is optional: `{}` / empty starts with the current hashtag.
async fn start_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StreamSnapshot>, ApiError> {
    let req: StartReq = if body.iter().all(u8::is_ascii_whitespace) {
        StartReq::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?
    };
    Ok(Json(state.stream.start(req.hashtag).await?))
}

async fn stop_stream(State(state): State<AppState>) -> Result<Json<StreamSnapshot>, ApiError> {
    Ok(Json(state.stream.stop().await?))
}

async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardView>, ApiError> {
    let snap = state.stream.snapshot().await?;
    Ok(Json(render_dashboard(&snap, Utc::now())))
}
