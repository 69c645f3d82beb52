//! Session endpoints: lifecycle, file submission, cancel/reload, outbox and
//! notification backlog.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use squeeze_core::{
    ControllerError, ControllerSnapshot, NotificationEnvelope, OutboundFile, SourceFile,
};

use crate::session::Session;
use crate::state::{AppState, SessionError};

/// Media type assumed when the upload doesn't declare one.
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Correlation identifier used to tag every notification.
    pub component_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: ControllerSnapshot,
}

impl SessionResponse {
    fn from_session(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            created_at: session.created_at(),
            snapshot: session.snapshot(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub filename: String,
    pub media_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct OutboxResponse {
    pub files: Vec<OutboundFile>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationEnvelope>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn controller_error(e: ControllerError) -> ApiError {
    let status = match &e {
        ControllerError::Busy { .. } => StatusCode::CONFLICT,
        ControllerError::EngineNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ControllerError::Engine(_) => StatusCode::BAD_GATEWAY,
    };
    error(status, e.to_string())
}

async fn find_session(state: &AppState, id: &str) -> Result<Arc<Session>, ApiError> {
    state
        .session(id)
        .await
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Session not found: {}", id)))
}

/// POST /sessions - open a session for a component
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    match state.create_session(&request.component_id).await {
        Ok(session) => Ok((
            StatusCode::CREATED,
            Json(SessionResponse::from_session(&session)),
        )),
        Err(e @ SessionError::AlreadyExists(_)) => Err(error(StatusCode::CONFLICT, e.to_string())),
        Err(e @ SessionError::InvalidId(_)) => Err(error(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

/// GET /sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.session_ids().await,
    })
}

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(SessionResponse::from_session(&session)))
}

/// DELETE /sessions/{id} - terminate the session's engine and drop its state
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.close_session(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(
            StatusCode::NOT_FOUND,
            format!("Session not found: {}", id),
        ))
    }
}

/// POST /sessions/{id}/files - submit one file (multipart field `file`)
///
/// Returns 202 once the file is admitted. The result arrives as a
/// notification.
pub async fn submit_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let session = find_session(&state, &id).await?;

    let mut file: Option<SourceFile> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| error(StatusCode::BAD_REQUEST, "File field has no filename"))?;
        let media_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());
        let bytes = field.bytes().await.map_err(|e| {
            error(
                StatusCode::BAD_REQUEST,
                format!("Failed to read upload: {}", e),
            )
        })?;

        file = Some(SourceFile::new(name, media_type, bytes.to_vec()));
        break;
    }

    let file = file.ok_or_else(|| error(StatusCode::BAD_REQUEST, "No file field in upload"))?;
    let response = SubmitResponse {
        filename: file.name.clone(),
        media_type: file.media_type.clone(),
        size_bytes: file.size_bytes(),
    };

    session.submit(file).map_err(|e| {
        warn!("Session {} refused {}: {}", id, response.filename, e);
        controller_error(e)
    })?;

    info!(
        "Session {} accepted {} ({}, {} bytes)",
        id, response.filename, response.media_type, response.size_bytes
    );
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /sessions/{id}/cancel
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    let cancelled = session.controller().cancel().await;
    Ok(Json(CancelResponse { cancelled }))
}

/// POST /sessions/{id}/reload - recreate the engine instance
pub async fn reload_engine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ControllerSnapshot>, ApiError> {
    let session = find_session(&state, &id).await?;
    session
        .controller()
        .reload()
        .await
        .map_err(controller_error)?;
    Ok(Json(session.snapshot()))
}

/// GET /sessions/{id}/logs - engine diagnostic lines
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LogsResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(LogsResponse {
        lines: session.controller().logs(),
    }))
}

/// GET /sessions/{id}/notifications - recent notifications, oldest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(NotificationsResponse {
        notifications: session.notifications().await,
    }))
}

/// GET /sessions/{id}/outbox - files waiting for download
pub async fn list_outbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OutboxResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(OutboxResponse {
        files: session.outbox().await,
    }))
}

/// GET /sessions/{id}/outbox/{name} - download and remove an outbound file
pub async fn download_outbound(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, &id).await?;
    let file = session
        .take_outbound(&name)
        .await
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("File not found: {}", name)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.media_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.name),
            ),
        ],
        file.bytes.to_vec(),
    )
        .into_response())
}
