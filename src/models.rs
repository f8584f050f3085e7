//! Shared API models
//!
//! Request/response payloads used by the web layer.

use serde::{Deserialize, Serialize};

use crate::device::Resolution;
use crate::session::settings::CameraSettings;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Live capture status (polled by the UI)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub recording: bool,
    pub timelapse: bool,
    /// Elapsed recording time in whole seconds (0 when not recording)
    pub duration_secs: u64,
    /// Frames captured by the running timelapse, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timelapse_frames: Option<u32>,
    pub feed_enabled: bool,
}

/// Settings view: current settings plus device capabilities
#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub settings: CameraSettings,
    pub resolutions: Vec<Resolution>,
    pub feed_enabled: bool,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Timelapse window request, wall-clock times as `HH:MM`
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub start_time: String,
    pub end_time: String,
}
