//! API Routes

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::auth::{clear_session_cookie, session_cookie, session_token};
use crate::error::{Error, Result};
use crate::models::{
    ApiResponse, LoginRequest, ScheduleRequest, SettingsResponse, StatusResponse,
};
use crate::scheduler::ScheduledWindow;
use crate::session::settings::SettingsUpdate;
use crate::session::{timelapse, FEED_IDLE_POLL};
use crate::state::AppState;
use crate::storage::{DiskUsage, GalleryListing};

/// Back-off between preview grabs after a device error
const FEED_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        // Capture control
        .route("/api/status", get(capture_status))
        .route("/api/photo", post(take_photo))
        .route("/api/recording/start", post(start_recording))
        .route("/api/recording/stop", post(stop_recording))
        .route("/api/timelapse/start", post(start_timelapse))
        .route("/api/timelapse/stop", post(stop_timelapse))
        .route("/api/timelapse/:folder/assemble", post(assemble_timelapse))
        // Settings
        .route("/api/settings", get(get_settings).put(update_settings))
        // Live preview
        .route("/api/feed", get(video_feed))
        .route("/api/feed/toggle", post(toggle_feed))
        // Schedule
        .route(
            "/api/schedule",
            post(schedule_timelapse).get(get_schedule).delete(cancel_schedule),
        )
        // Gallery & media
        .route("/api/gallery/photos", get(gallery_photos))
        .route("/api/gallery/videos", get(gallery_videos))
        .route("/media/photos/*path", get(download_photo).delete(delete_photo))
        .route("/media/videos/*path", get(download_video).delete(delete_video))
        // System
        .route("/api/system/disk", get(disk_usage))
        // Auth (leaving)
        .route("/api/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_session,
        ));

    Router::new()
        .route("/healthz", get(super::health_check))
        .route("/api/login", post(login))
        .merge(protected)
        .with_state(state)
}

// ========================================
// Auth Handlers
// ========================================

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let token = state
        .auth
        .login(&request.username, &request.password)
        .await
        .ok_or_else(|| Error::Unauthorized("invalid credentials".to_string()))?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(ApiResponse::success("logged in".to_string())),
    ))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token)
    {
        state.auth.logout(&token).await;
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(ApiResponse::success("logged out".to_string())),
    )
}

// ========================================
// Capture Handlers
// ========================================

async fn capture_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        recording: state.session.is_recording().await,
        timelapse: state.session.is_timelapse_running(),
        duration_secs: state.session.recording_duration_secs().await,
        timelapse_frames: state.session.timelapse_frames().await,
        feed_enabled: state.session.feed_enabled(),
    })
}

async fn take_photo(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    match state.session.take_photo(None).await? {
        Some(path) => Ok(Json(ApiResponse::success(path.display().to_string()))),
        None => Err(Error::Busy("camera is recording".to_string())),
    }
}

async fn start_recording(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    if state.session.start_recording().await? {
        Ok(Json(ApiResponse::success("recording started".to_string())))
    } else {
        Err(Error::Busy("camera is not idle".to_string()))
    }
}

async fn stop_recording(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    state.session.stop_recording().await?;
    Ok(Json(ApiResponse::success("recording stopped".to_string())))
}

async fn start_timelapse(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    if state.session.start_timelapse().await? {
        Ok(Json(ApiResponse::success("timelapse started".to_string())))
    } else {
        Err(Error::Busy("camera is not idle".to_string()))
    }
}

/// Stops the running timelapse and drops any scheduled window with it, so
/// a pending stop timer cannot fire into the operator's next session.
async fn stop_timelapse(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    state.scheduler.cancel_all().await;
    state.session.stop_timelapse().await?;
    Ok(Json(ApiResponse::success("timelapse stopped".to_string())))
}

async fn assemble_timelapse(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<String>>)> {
    if !folder.starts_with("timelapse_") {
        return Err(Error::Validation(format!(
            "'{folder}' is not a timelapse folder"
        )));
    }
    let path = state.store.resolve_photo(&folder)?;

    // Assembly can take minutes on a small board; run it detached and let
    // the gallery pick up the output when it lands.
    tokio::spawn(async move {
        if let Err(e) = timelapse::assemble_video(&path).await {
            tracing::error!(folder = %path.display(), error = %e, "Timelapse assembly failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success("assembly started".to_string())),
    ))
}

// ========================================
// Settings Handlers
// ========================================

async fn get_settings(State(state): State<AppState>) -> Json<ApiResponse<SettingsResponse>> {
    Json(ApiResponse::success(SettingsResponse {
        settings: state.session.settings().await,
        resolutions: state.session.available_resolutions(),
        feed_enabled: state.session.feed_enabled(),
    }))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<ApiResponse<SettingsResponse>>> {
    state.session.update_settings(update).await?;
    Ok(Json(ApiResponse::success(SettingsResponse {
        settings: state.session.settings().await,
        resolutions: state.session.available_resolutions(),
        feed_enabled: state.session.feed_enabled(),
    })))
}

// ========================================
// Live Preview Handlers
// ========================================

/// MJPEG stream: one JPEG part per preview grab. While the feed is
/// disabled the generator idles on a fixed poll without touching the
/// device.
async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.clone();
    let stream = futures::stream::unfold(session, |session| async move {
        loop {
            if !session.feed_enabled() {
                tokio::time::sleep(FEED_IDLE_POLL).await;
                continue;
            }
            match session.capture_frame().await {
                Ok(jpeg) => {
                    let mut part =
                        Vec::with_capacity(jpeg.len() + 64);
                    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
                    part.extend_from_slice(&jpeg);
                    part.extend_from_slice(b"\r\n");
                    return Some((Ok::<_, Infallible>(Bytes::from(part)), session));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Preview frame grab failed");
                    tokio::time::sleep(FEED_ERROR_BACKOFF).await;
                }
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(stream),
    )
}

async fn toggle_feed(State(state): State<AppState>) -> Json<ApiResponse<bool>> {
    if state.session.feed_enabled() {
        state.session.disable_feed();
    } else {
        state.session.enable_feed();
    }
    Json(ApiResponse::success(state.session.feed_enabled()))
}

// ========================================
// Schedule Handlers
// ========================================

async fn schedule_timelapse(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ApiResponse<ScheduledWindow>>> {
    let window = state
        .scheduler
        .schedule_window(&request.start_time, &request.end_time)
        .await?;
    Ok(Json(ApiResponse::success(window)))
}

async fn get_schedule(State(state): State<AppState>) -> Json<ApiResponse<Option<ScheduledWindow>>> {
    Json(ApiResponse::success(state.scheduler.pending().await))
}

async fn cancel_schedule(State(state): State<AppState>) -> Json<ApiResponse<String>> {
    state.scheduler.cancel_all().await;
    Json(ApiResponse::success("schedule cleared".to_string()))
}

// ========================================
// Gallery & Media Handlers
// ========================================

async fn gallery_photos(State(state): State<AppState>) -> Result<Json<ApiResponse<GalleryListing>>> {
    Ok(Json(ApiResponse::success(state.store.list_photos().await?)))
}

async fn gallery_videos(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<String>>>> {
    Ok(Json(ApiResponse::success(state.store.list_videos().await?)))
}

async fn download_photo(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let resolved = state.store.resolve_photo(&path)?;
    serve_file(resolved).await
}

async fn download_video(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let resolved = state.store.resolve_video(&path)?;
    serve_file(resolved).await
}

async fn delete_photo(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<String>>> {
    let resolved = state.store.resolve_photo(&path)?;
    state.store.delete(&resolved).await?;
    Ok(Json(ApiResponse::success("deleted".to_string())))
}

async fn delete_video(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<String>>> {
    let resolved = state.store.resolve_video(&path)?;
    state.store.delete(&resolved).await?;
    Ok(Json(ApiResponse::success("deleted".to_string())))
}

async fn serve_file(path: std::path::PathBuf) -> Result<impl IntoResponse> {
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("artifact {}", path.display())));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("mp4") => "video/mp4",
        Some("h264") => "video/h264",
        _ => "application/octet-stream",
    };
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        data,
    ))
}

// ========================================
// System Handlers
// ========================================

async fn disk_usage(State(state): State<AppState>) -> Json<ApiResponse<DiskUsage>> {
    Json(ApiResponse::success(state.store.disk_usage()))
}
