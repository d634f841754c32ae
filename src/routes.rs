use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::GenerationError,
    gemini::AvatarSynthesizer,
    intake::{ImageIntake, IntakeSource, SelectedFile},
    location::{RegionResolver, ReportedPosition},
    models::{GenerationRequest, GeolocationReport, SessionSnapshot, ShareInfo},
    orchestrator::Orchestrator,
    share::{data_uri_to_file, download_name, share_info, SHARE_FILE_NAME},
};

/// Uploads are base64-encoded into the prompt, so phone photos must fit.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// One page's worth of state.
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub position: Arc<ReportedPosition>,
    pub orchestrator: Arc<Orchestrator>,
    pub intake: ImageIntake,
    last_seen: RwLock<DateTime<Utc>>,
}

impl Session {
    fn touch(&self) {
        *self.last_seen.write() = Utc::now();
    }

    /// Last request or the last state change of a running flow.
    fn last_active(&self) -> DateTime<Utc> {
        (*self.last_seen.read()).max(self.orchestrator.updated_at())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            view: self.orchestrator.view(),
            can_retry: self.orchestrator.can_retry(),
            intake: self.intake.snapshot(),
            created_at: self.created_at,
            updated_at: self.orchestrator.updated_at(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    pub resolver: Arc<dyn RegionResolver>,
    pub synthesizer: Arc<dyn AvatarSynthesizer>,
    pub app_url: String,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(
        resolver: Arc<dyn RegionResolver>,
        synthesizer: Arc<dyn AvatarSynthesizer>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::default(),
            resolver,
            synthesizer,
            app_url: app_url.into(),
            session_ttl: crate::config::DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    fn open_session(&self) -> Arc<Session> {
        let position = Arc::new(ReportedPosition::new());
        let orchestrator =
            Orchestrator::new(position.clone(), self.resolver.clone(), self.synthesizer.clone());
        let now = Utc::now();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: now,
            position,
            orchestrator: Arc::new(orchestrator),
            intake: ImageIntake::new(),
            last_seen: RwLock::new(now),
        });
        self.store.write().insert(session.id, session.clone());
        session
    }

    fn session(&self, id: Uuid) -> Result<Arc<Session>, ApiError> {
        let session = self.store.read().get(&id).cloned().ok_or(ApiError::NotFound)?;
        session.touch();
        Ok(session)
    }

    /// Drops sessions idle for at least `session_ttl` as of `now`. Sessions
    /// with a generation in flight are kept. Returns how many were dropped.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut store = self.store.write();
        let before = store.len();
        store.retain(|_, session| {
            let idle = (now - session.last_active()).to_std().unwrap_or_default();
            session.orchestrator.is_busy() || idle < self.session_ttl
        });
        before - store.len()
    }
}

/// Runs `evict_idle` every `period` until the runtime shuts down.
pub fn spawn_session_sweeper(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let dropped = state.evict_idle(Utc::now());
            if dropped > 0 {
                tracing::info!("🧹 Dropped {} idle session(s)", dropped);
            }
        }
    })
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Session not found.".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                tracing::error!("❌ Internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/generate/location", post(generate_from_location))
        .route("/api/sessions/:id/generate/image", post(generate_from_image))
        .route(
            "/api/sessions/:id/upload",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/sessions/:id/retry", post(retry_last))
        .route("/api/sessions/:id/start-over", post(start_over))
        .route("/api/sessions/:id/share", get(share_links))
        .route("/api/sessions/:id/avatar", get(download_avatar))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Runs the flow on its own task so a dropped request does not cut it
/// short. `None` replays the last request.
async fn drive(session: &Session, request: Option<GenerationRequest>) -> Result<(), ApiError> {
    let orchestrator = session.orchestrator.clone();
    let outcome = tokio::spawn(async move {
        match request {
            Some(request) => Some(orchestrator.run(request).await),
            None => orchestrator.retry_last().await,
        }
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    match outcome {
        Some(Err(GenerationError::Busy)) => Err(busy()),
        _ => Ok(()),
    }
}

fn busy() -> ApiError {
    ApiError::Conflict(GenerationError::Busy.to_string())
}

/// Stores `report` for the next attempt unless a flow is running, so a
/// rejected request never leaves a report behind.
fn report_position(session: &Session, report: GeolocationReport) -> Result<(), ApiError> {
    if session.orchestrator.is_busy() {
        return Err(busy());
    }
    session.position.report(report);
    Ok(())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionSnapshot>) {
    let session = state.open_session();
    tracing::info!("🆕 Opened session {}", session.id);
    (StatusCode::CREATED, Json(session.snapshot()))
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.session(id)?.snapshot()))
}

pub async fn delete_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.write().remove(&id).ok_or(ApiError::NotFound)?;
    tracing::info!("👋 Closed session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn generate_from_location(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(report): Json<GeolocationReport>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id)?;
    report_position(&session, report)?;
    drive(&session, Some(GenerationRequest::FromLocation)).await?;
    Ok(Json(session.snapshot()))
}

pub async fn generate_from_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id)?;
    let payload = session.intake.payload().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    drive(&session, Some(GenerationRequest::FromImage(payload))).await?;
    Ok(Json(session.snapshot()))
}

/// Multipart with a `file` part and an optional `source` part
/// (`picker` or `drag_drop`). A non-image file is reported in the
/// snapshot, not as an HTTP error.
pub async fn upload_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id)?;

    let mut source = IntakeSource::default();
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("source") => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if text.trim() == "drag_drop" {
                    source = IntakeSource::DragDrop;
                }
            }
            Some("file") if file.is_none() => {
                let file_name = field.file_name().map(str::to_string);
                let media_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file = Some(SelectedFile { name: file_name, media_type, bytes });
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::BadRequest("Missing 'file' part.".to_string()))?;
    if let Err(e) = session.intake.accept(file, source).await {
        tracing::info!("Upload for session {} not accepted: {}", id, e);
    }
    Ok(Json(session.snapshot()))
}

/// A location retry needs a fresh geolocation report in the body; without
/// one it ends in the "no position" error.
pub async fn retry_last(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    report: Option<Json<GeolocationReport>>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id)?;
    let last = session.orchestrator.last_request();
    if let (Some(GenerationRequest::FromLocation), Some(Json(report))) = (last, report) {
        report_position(&session, report)?;
    }
    drive(&session, None).await?;
    Ok(Json(session.snapshot()))
}

pub async fn start_over(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id)?;
    session.orchestrator.start_over();
    session.intake.clear();
    Ok(Json(session.snapshot()))
}

fn result_uri(session: &Session) -> Result<String, ApiError> {
    session.orchestrator.view()
        .image_uri()
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("No avatar has been generated yet.".to_string()))
}

pub async fn share_links(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ShareInfo>, ApiError> {
    let session = state.session(id)?;
    result_uri(&session)?;
    Ok(Json(share_info(&state.app_url)))
}

pub async fn download_avatar(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let session = state.session(id)?;
    let uri = result_uri(&session)?;
    let file = data_uri_to_file(&uri, SHARE_FILE_NAME)
        .ok_or_else(|| ApiError::Internal("result image is not a base64 data URI".to_string()))?;

    let headers = [
        (header::CONTENT_TYPE, file.media_type.clone()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", download_name(&file))),
    ];
    Ok((StatusCode::OK, headers, file.bytes).into_response())
}
