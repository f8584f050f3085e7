//! spacecam - browser-controlled camera appliance
//!
//! Single-binary server for a board-mounted V4L2 camera: live MJPEG
//! preview, photo capture, video recording and scheduled timelapse
//! sessions, fronted by a small authenticated web UI.
//!
//! ## Architecture
//!
//! - `device` - capture device abstraction (ffmpeg/V4L2 implementation)
//! - `session` - exclusive-mode state machine owning the camera
//! - `scheduler` - deferred start/stop timelapse windows
//! - `storage` - gallery listing, media serving, disk usage
//! - `auth` - credential check and cookie sessions
//! - `web_api` - REST endpoints and the MJPEG feed

pub mod auth;
pub mod device;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod storage;
pub mod web_api;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
