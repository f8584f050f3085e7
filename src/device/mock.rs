//! Recording mock device for tests
//!
//! Writes stub JPEG bytes wherever the real backend would write frames and
//! keeps an operation log so tests can assert call sequences.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CaptureDevice, DeviceConfig, Resolution};
use crate::error::{Error, Result};

/// Stub payload standing in for an encoded JPEG
pub const STUB_JPEG: &[u8] = b"\xff\xd8\xff\xe0mockjpeg\xff\xd9";

#[derive(Default)]
pub struct MockDevice {
    resolutions: Vec<Resolution>,
    pub ops: Mutex<Vec<String>>,
    recording_to: Mutex<Option<PathBuf>>,
    /// When set, every capture call fails with a device error
    pub fail_captures: AtomicBool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            resolutions: vec![
                Resolution::new(640, 480),
                Resolution::new(1280, 720),
                Resolution::new(1920, 1080),
            ],
            ops: Mutex::new(Vec::new()),
            recording_to: Mutex::new(None),
            fail_captures: AtomicBool::new(false),
        }
    }

    pub async fn ops(&self) -> Vec<String> {
        self.ops.lock().await.clone()
    }

    async fn log(&self, op: String) {
        self.ops.lock().await.push(op);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_captures.load(Ordering::SeqCst) {
            Err(Error::Device("mock capture failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CaptureDevice for MockDevice {
    async fn configure(&self, config: DeviceConfig) -> Result<()> {
        self.log(format!("configure {}", config.resolution)).await;
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>> {
        self.check_failure()?;
        self.log("capture_frame".to_string()).await;
        Ok(STUB_JPEG.to_vec())
    }

    async fn capture_still_to(&self, path: &Path) -> Result<()> {
        self.check_failure()?;
        self.log(format!("still {}", path.display())).await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, STUB_JPEG).await?;
        Ok(())
    }

    async fn start_video_recording(&self, path: &Path) -> Result<()> {
        let mut recording = self.recording_to.lock().await;
        if recording.is_some() {
            return Err(Error::Busy("video sink already open".to_string()));
        }
        self.log(format!("start_recording {}", path.display())).await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, STUB_JPEG).await?;
        *recording = Some(path.to_path_buf());
        Ok(())
    }

    async fn stop_video_recording(&self) -> Result<()> {
        self.log("stop_recording".to_string()).await;
        self.recording_to.lock().await.take();
        Ok(())
    }

    fn supported_resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    fn video_extension(&self) -> &'static str {
        "mp4"
    }
}
