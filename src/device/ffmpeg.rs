//! V4L2 capture backend
//!
//! Shells out to the `ffmpeg` binary for one-shot frame grabs and video
//! recording. Child processes are spawned with `kill_on_drop` so a timeout
//! can never leave a stray ffmpeg holding the camera.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{CaptureDevice, DeviceConfig, Resolution, Rotation, WhiteBalance};
use crate::error::{Error, Result};

/// Timeout for a single frame grab
const CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Grace period for the recorder to finalize its output after `q`
const RECORDER_QUIT_TIMEOUT_SECS: u64 = 5;

/// Common V4L2 sensor modes, smallest first. The kernel rejects sizes the
/// sensor cannot do, so an over-broad list only costs a failed grab.
const DEFAULT_RESOLUTIONS: &[Resolution] = &[
    Resolution::new(640, 480),
    Resolution::new(1280, 720),
    Resolution::new(1920, 1080),
    Resolution::new(2592, 1944),
];

/// ffmpeg-backed capture device for a single V4L2 camera node
pub struct FfmpegDevice {
    device_path: String,
    config: Mutex<DeviceConfig>,
    recorder: Mutex<Option<Child>>,
    resolutions: Vec<Resolution>,
}

impl FfmpegDevice {
    /// Probe the backend: verifies the ffmpeg binary is runnable.
    ///
    /// This is the only unrecoverable device failure — everything after
    /// startup surfaces as a recoverable error to the caller.
    pub async fn probe(device_path: impl Into<String>) -> Result<Self> {
        let version = Self::check_ffmpeg().await?;
        let device_path = device_path.into();
        tracing::info!(
            device = %device_path,
            ffmpeg = %version,
            "Capture device initialized"
        );

        let resolutions = DEFAULT_RESOLUTIONS.to_vec();
        let config = DeviceConfig {
            resolution: resolutions[0],
            rotation: Rotation::Deg0,
            white_balance: WhiteBalance::Auto,
        };

        Ok(Self {
            device_path,
            config: Mutex::new(config),
            recorder: Mutex::new(None),
            resolutions,
        })
    }

    /// Check if ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Device(format!("ffmpeg not found: {e}")))?;

        if !output.status.success() {
            return Err(Error::Device("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }

    /// Rotation as an ffmpeg video filter, `None` for no-op
    fn rotation_filter(rotation: Rotation) -> Option<&'static str> {
        match rotation {
            Rotation::Deg0 => None,
            Rotation::Deg90 => Some("transpose=1"),
            Rotation::Deg180 => Some("hflip,vflip"),
            Rotation::Deg270 => Some("transpose=2"),
        }
    }

    /// Common input arguments for a grab at the current configuration
    fn grab_args(&self, config: &DeviceConfig) -> Vec<String> {
        // ffmpeg -f video4linux2 -video_size WxH -i /dev/video0 -frames:v 1 ...
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "video4linux2".to_string(),
            "-video_size".to_string(),
            config.resolution.to_string(),
            "-i".to_string(),
            self.device_path.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
        ];
        if let Some(filter) = Self::rotation_filter(config.rotation) {
            args.push("-vf".to_string());
            args.push(filter.to_string());
        }
        args
    }

    /// Run a one-shot grab command with timeout and kill-on-drop cleanup
    async fn run_grab(&self, args: Vec<String>) -> Result<Vec<u8>> {
        let child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Device(format!("ffmpeg spawn failed: {e}")))?;

        let timeout = Duration::from_secs(CAPTURE_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Device(format!("ffmpeg failed: {}", stderr.trim())));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Device(format!("ffmpeg execution failed: {e}"))),
            Err(_) => {
                // Timeout cancelled the future; kill_on_drop reaped the child
                tracing::warn!(
                    device = %self.device_path,
                    timeout_sec = CAPTURE_TIMEOUT_SECS,
                    "ffmpeg grab timeout, process killed via kill_on_drop"
                );
                Err(Error::Device(format!(
                    "capture timeout ({CAPTURE_TIMEOUT_SECS}s)"
                )))
            }
        }
    }
}

#[async_trait]
impl CaptureDevice for FfmpegDevice {
    async fn configure(&self, config: DeviceConfig) -> Result<()> {
        // One-shot grabs open the device per capture, so configuration is
        // just the stored parameter set for subsequent grabs.
        // White balance is applied by the sensor driver defaults; the V4L2
        // path has no portable control for it, so only the preset is kept.
        let mut current = self.config.lock().await;
        *current = config;
        tracing::debug!(
            resolution = %config.resolution,
            rotation = config.rotation.degrees(),
            "Device configured"
        );
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>> {
        let config = *self.config.lock().await;
        let mut args = self.grab_args(&config);
        args.extend([
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "-".to_string(),
        ]);

        let data = self.run_grab(args).await?;
        if data.is_empty() {
            return Err(Error::Device("ffmpeg returned empty frame".to_string()));
        }
        Ok(data)
    }

    async fn capture_still_to(&self, path: &Path) -> Result<()> {
        let config = *self.config.lock().await;
        let mut args = self.grab_args(&config);
        args.extend(["-y".to_string(), path.display().to_string()]);

        self.run_grab(args).await?;
        Ok(())
    }

    async fn start_video_recording(&self, path: &Path) -> Result<()> {
        let mut recorder = self.recorder.lock().await;
        if recorder.is_some() {
            return Err(Error::Busy("video sink already open".to_string()));
        }

        let config = *self.config.lock().await;
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "video4linux2".to_string(),
            "-video_size".to_string(),
            config.resolution.to_string(),
            "-i".to_string(),
            self.device_path.clone(),
        ];
        if let Some(filter) = Self::rotation_filter(config.rotation) {
            args.push("-vf".to_string());
            args.push(filter.to_string());
        }
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-y".to_string(),
            path.display().to_string(),
        ]);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Device(format!("ffmpeg recorder spawn failed: {e}")))?;

        tracing::info!(path = %path.display(), "Video recording started");
        *recorder = Some(child);
        Ok(())
    }

    async fn stop_video_recording(&self) -> Result<()> {
        let mut recorder = self.recorder.lock().await;
        let Some(mut child) = recorder.take() else {
            return Ok(());
        };

        // Ask ffmpeg to finalize the container; fall back to SIGKILL if it
        // does not exit within the grace period.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q\n").await;
        }

        let grace = Duration::from_secs(RECORDER_QUIT_TIMEOUT_SECS);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(status = %status, "Video recording stopped");
            }
            Ok(Err(e)) => {
                return Err(Error::Device(format!("recorder wait failed: {e}")));
            }
            Err(_) => {
                tracing::warn!("Recorder did not quit in time, killing");
                child
                    .start_kill()
                    .map_err(|e| Error::Device(format!("recorder kill failed: {e}")))?;
                let _ = child.wait().await;
            }
        }
        Ok(())
    }

    fn supported_resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    fn video_extension(&self) -> &'static str {
        "mp4"
    }
}
