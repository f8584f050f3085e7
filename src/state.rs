//! Application state
//!
//! Holds the configuration and the shared components injected into the
//! web layer. Everything lives for the process lifetime; nothing is
//! persisted across restarts by design.

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::scheduler::TimelapseScheduler;
use crate::session::CameraSession;
use crate::storage::MediaStore;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// V4L2 camera node
    pub device: String,
    /// Root for photos and timelapse folders
    pub photos_dir: PathBuf,
    /// Root for video recordings
    pub videos_dir: PathBuf,
    /// Login credentials file
    pub credentials_path: PathBuf,
    /// Static frontend directory
    pub static_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            device: std::env::var("CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            photos_dir: std::env::var("PHOTOS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("photos")),
            videos_dir: std::env::var("VIDEOS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("videos")),
            credentials_path: std::env::var("CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("credentials.json")),
            static_dir: std::env::var("STATIC_DIR")
                .unwrap_or_else(|_| "frontend/dist".to_string()),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Session state machine (owns the camera)
    pub session: Arc<CameraSession>,
    /// Timelapse window scheduler
    pub scheduler: Arc<TimelapseScheduler>,
    /// Login sessions
    pub auth: Arc<AuthService>,
    /// Gallery and disk reporting
    pub store: Arc<MediaStore>,
}
