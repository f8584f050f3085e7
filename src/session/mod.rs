//! Session state machine
//!
//! Owns the camera's operating mode and settings. The physical camera is a
//! single mutually-exclusive resource, so every mode transition and device
//! reconfiguration is serialized behind one lock; the preview frame
//! generator takes the same lock per frame so a grab never races a
//! reconfiguration.

pub mod settings;
pub mod timelapse;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::device::{CaptureDevice, DeviceConfig};
use crate::error::Result;
use settings::{CameraSettings, SettingsUpdate};

/// Poll interval for the frame generator while the feed is disabled
pub const FEED_IDLE_POLL: Duration = Duration::from_millis(500);

/// Recordings shorter than this are treated as accidental toggles and
/// deleted on stop.
const MIN_RECORDING_DURATION: Duration = Duration::from_secs(1);

/// Exclusive camera operating mode
#[derive(Debug)]
pub enum SessionMode {
    Idle,
    Recording {
        started_at: Instant,
        path: PathBuf,
    },
    Timelapse {
        folder: PathBuf,
        frames: Arc<AtomicU32>,
        started_at: Instant,
    },
}

struct TimelapseTask {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

struct SessionInner {
    settings: CameraSettings,
    mode: SessionMode,
    task: Option<TimelapseTask>,
}

/// The camera session: one per process, injected into the web layer
pub struct CameraSession {
    device: Arc<dyn CaptureDevice>,
    photos_dir: PathBuf,
    videos_dir: PathBuf,
    inner: Mutex<SessionInner>,
    /// Held by the timelapse loop; cleared to request termination
    timelapse_running: Arc<AtomicBool>,
    feed_enabled: AtomicBool,
}

impl CameraSession {
    /// Construct the session, create the media roots and put the device in
    /// preview configuration.
    pub async fn new(
        device: Arc<dyn CaptureDevice>,
        photos_dir: PathBuf,
        videos_dir: PathBuf,
    ) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&photos_dir).await?;
        tokio::fs::create_dir_all(&videos_dir).await?;

        let settings = CameraSettings::defaults(device.supported_resolutions());
        let session = Arc::new(Self {
            device,
            photos_dir,
            videos_dir,
            inner: Mutex::new(SessionInner {
                settings,
                mode: SessionMode::Idle,
                task: None,
            }),
            timelapse_running: Arc::new(AtomicBool::new(false)),
            feed_enabled: AtomicBool::new(true),
        });

        {
            let inner = session.inner.lock().await;
            session.apply_config(&inner.settings, false).await?;
        }
        Ok(session)
    }

    /// Push the preview or still configuration to the device
    async fn apply_config(&self, settings: &CameraSettings, still: bool) -> Result<()> {
        let resolution = if still {
            settings.photo_resolution
        } else {
            settings.preview_resolution
        };
        self.device
            .configure(DeviceConfig {
                resolution,
                rotation: settings.rotation,
                white_balance: settings.white_balance,
            })
            .await
    }

    /// Capture one photo.
    ///
    /// Returns `Ok(None)` when the camera is recording (silent refusal).
    /// The device is switched to the still configuration first; the write
    /// goes to `custom_path` or a timestamp-named file under the photos
    /// root. The still configuration stays active afterwards; the next
    /// settings update or recording stop restores preview.
    pub async fn take_photo(&self, custom_path: Option<PathBuf>) -> Result<Option<PathBuf>> {
        let inner = self.inner.lock().await;
        if matches!(inner.mode, SessionMode::Recording { .. }) {
            tracing::debug!("Photo refused: recording in progress");
            return Ok(None);
        }

        self.apply_config(&inner.settings, true).await?;

        let path = custom_path.unwrap_or_else(|| {
            let stamp = Local::now().format("%Y%m%d_%H%M%S");
            self.photos_dir.join(format!("photo_{stamp}.jpg"))
        });
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.device.capture_still_to(&path).await?;

        tracing::info!(path = %path.display(), "Photo captured");
        Ok(Some(path))
    }

    /// Start video recording. Returns `Ok(false)` when the camera is
    /// already recording or running a timelapse.
    pub async fn start_recording(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.mode, SessionMode::Idle) {
            tracing::debug!("Recording refused: camera not idle");
            return Ok(false);
        }

        self.apply_config(&inner.settings, true).await?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .videos_dir
            .join(format!("video_{stamp}.{}", self.device.video_extension()));

        if let Err(e) = self.device.start_video_recording(&path).await {
            // Stay idle, put the preview back
            if let Err(restore) = self.apply_config(&inner.settings, false).await {
                tracing::warn!(error = %restore, "Preview restore failed after recording error");
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), "Recording started");
        inner.mode = SessionMode::Recording {
            started_at: Instant::now(),
            path,
        };
        Ok(true)
    }

    /// Stop video recording. No-op when not recording. Sub-second
    /// recordings are deleted (stray files from rapid toggling).
    pub async fn stop_recording(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let (started_at, path) = match &inner.mode {
            SessionMode::Recording { started_at, path } => (*started_at, path.clone()),
            _ => return Ok(()),
        };

        let stop_result = self.device.stop_video_recording().await;
        // Whatever the sink said, the mode must come back to a consistent
        // idle + preview state.
        inner.mode = SessionMode::Idle;
        let restore_result = self.apply_config(&inner.settings, false).await;
        stop_result?;

        let duration = started_at.elapsed();
        if duration < MIN_RECORDING_DURATION {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Deleted sub-second recording");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete stray recording");
                }
            }
        } else {
            tracing::info!(
                path = %path.display(),
                duration_secs = duration.as_secs(),
                "Recording stopped"
            );
        }

        restore_result
    }

    /// Start a timelapse session. Returns `Ok(false)` when recording or a
    /// timelapse is already running.
    pub async fn start_timelapse(self: &Arc<Self>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.mode, SessionMode::Idle) {
            tracing::debug!("Timelapse refused: camera not idle");
            return Ok(false);
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let folder = self.photos_dir.join(format!("timelapse_{stamp}"));
        tokio::fs::create_dir_all(&folder).await?;

        let frames = Arc::new(AtomicU32::new(0));
        let stop = Arc::new(Notify::new());
        self.timelapse_running.store(true, Ordering::SeqCst);
        inner.mode = SessionMode::Timelapse {
            folder: folder.clone(),
            frames: frames.clone(),
            started_at: Instant::now(),
        };

        let session = self.clone();
        let loop_stop = stop.clone();
        let handle = tokio::spawn(async move {
            session.run_timelapse_loop(folder, frames, loop_stop).await;
        });
        inner.task = Some(TimelapseTask { handle, stop });

        tracing::info!("Timelapse started");
        Ok(true)
    }

    /// Stop the timelapse. Idempotent; blocks until the capture loop has
    /// actually exited, so no background capture survives this call.
    pub async fn stop_timelapse(&self) -> Result<()> {
        let task = {
            let mut inner = self.inner.lock().await;
            self.timelapse_running.store(false, Ordering::SeqCst);
            inner.task.take()
        };

        if let Some(task) = task {
            task.stop.notify_one();
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Timelapse task join failed");
            }
        }
        Ok(())
    }

    /// Background capture loop. Exits when the running flag is cleared or
    /// the frame bound is reached, then transitions the session back to
    /// idle itself.
    async fn run_timelapse_loop(
        self: Arc<Self>,
        folder: PathBuf,
        frames: Arc<AtomicU32>,
        stop: Arc<Notify>,
    ) {
        // The frame bound is fixed at loop start; the interval is re-read
        // each iteration so a settings update affects the next frame.
        let (interval, duration_minutes) = {
            let inner = self.inner.lock().await;
            (
                inner.settings.interval_secs,
                inner.settings.duration_minutes,
            )
        };
        let max_frames: u64 = if duration_minutes > 0 {
            u64::from(duration_minutes) * 60 / u64::from(interval.max(1))
        } else {
            u64::MAX
        };

        let mut count: u32 = 0;
        while self.timelapse_running.load(Ordering::SeqCst) {
            let frame_path = folder.join(format!("img_{count:04}.jpg"));
            match self.take_photo(Some(frame_path)).await {
                Ok(Some(_)) => {
                    count += 1;
                    frames.store(count, Ordering::SeqCst);
                }
                Ok(None) => {
                    // Cannot happen while this loop holds the timelapse
                    // mode, but a refusal is not worth counting.
                }
                Err(e) => {
                    tracing::warn!(error = %e, frame = count, "Timelapse frame capture failed");
                }
            }

            if u64::from(count) >= max_frames {
                tracing::info!(frames = count, "Timelapse frame bound reached");
                break;
            }

            let interval = {
                let inner = self.inner.lock().await;
                inner.settings.interval_secs
            };
            if !self.timelapse_running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(u64::from(interval))) => {}
                _ = stop.notified() => {}
            }
        }

        self.finish_timelapse(count).await;
    }

    /// Clear the running flag and restore the idle/preview state after the
    /// loop exits for any reason.
    async fn finish_timelapse(&self, frames: u32) {
        self.timelapse_running.store(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        if matches!(inner.mode, SessionMode::Timelapse { .. }) {
            inner.mode = SessionMode::Idle;
        }
        if let Err(e) = self.apply_config(&inner.settings, false).await {
            tracing::warn!(error = %e, "Preview restore failed after timelapse");
        }
        tracing::info!(frames, "Timelapse finished");
    }

    /// Apply a partial settings update and reconfigure the preview.
    ///
    /// Rejected while recording; safe while a timelapse runs (affects the
    /// next captured frame only).
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if matches!(inner.mode, SessionMode::Recording { .. }) {
            return Err(crate::error::Error::Busy(
                "settings are locked while recording".to_string(),
            ));
        }
        inner.settings.apply(&update)?;
        self.apply_config(&inner.settings, false).await?;
        tracing::info!("Settings updated");
        Ok(())
    }

    /// Grab one preview JPEG. Takes the session lock so the grab is
    /// excluded from concurrent reconfiguration; does not change the mode.
    pub async fn capture_frame(&self) -> Result<Vec<u8>> {
        let _inner = self.inner.lock().await;
        self.device.capture_frame().await
    }

    pub fn enable_feed(&self) {
        self.feed_enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_feed(&self) {
        self.feed_enabled.store(false, Ordering::SeqCst);
    }

    pub fn feed_enabled(&self) -> bool {
        self.feed_enabled.load(Ordering::SeqCst)
    }

    pub async fn settings(&self) -> CameraSettings {
        self.inner.lock().await.settings.clone()
    }

    pub fn available_resolutions(&self) -> Vec<crate::device::Resolution> {
        self.device.supported_resolutions().to_vec()
    }

    pub async fn is_recording(&self) -> bool {
        matches!(
            self.inner.lock().await.mode,
            SessionMode::Recording { .. }
        )
    }

    pub fn is_timelapse_running(&self) -> bool {
        self.timelapse_running.load(Ordering::SeqCst)
    }

    /// Elapsed recording time in whole seconds, 0 when not recording
    pub async fn recording_duration_secs(&self) -> u64 {
        match &self.inner.lock().await.mode {
            SessionMode::Recording { started_at, .. } => started_at.elapsed().as_secs(),
            _ => 0,
        }
    }

    /// Frames captured by the running timelapse, if one is running
    pub async fn timelapse_frames(&self) -> Option<u32> {
        match &self.inner.lock().await.mode {
            SessionMode::Timelapse { frames, .. } => Some(frames.load(Ordering::SeqCst)),
            _ => None,
        }
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;
    use tempfile::TempDir;

    async fn session_with_mock() -> (Arc<CameraSession>, Arc<MockDevice>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let device = Arc::new(MockDevice::new());
        let session = CameraSession::new(
            device.clone(),
            tmp.path().join("photos"),
            tmp.path().join("videos"),
        )
        .await
        .unwrap();
        (session, device, tmp)
    }

    fn video_files(tmp: &TempDir) -> Vec<PathBuf> {
        match std::fs::read_dir(tmp.path().join("videos")) {
            Ok(dir) => dir.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn photo_roundtrip() {
        let (session, _device, _tmp) = session_with_mock().await;
        let path = session.take_photo(None).await.unwrap().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("photo_"));
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
    }

    #[tokio::test]
    async fn photo_refused_while_recording() {
        let (session, _device, _tmp) = session_with_mock().await;
        assert!(session.start_recording().await.unwrap());
        assert_eq!(session.take_photo(None).await.unwrap(), None);
        session.stop_recording().await.unwrap();
    }

    #[tokio::test]
    async fn recording_and_timelapse_mutually_exclusive() {
        let (session, _device, _tmp) = session_with_mock().await;

        assert!(session.start_recording().await.unwrap());
        assert!(!session.start_recording().await.unwrap());
        assert!(!session.start_timelapse().await.unwrap());
        session.stop_recording().await.unwrap();

        assert!(session.start_timelapse().await.unwrap());
        assert!(!session.start_recording().await.unwrap());
        assert!(!session.start_timelapse().await.unwrap());
        session.stop_timelapse().await.unwrap();

        assert!(!session.is_recording().await);
        assert!(!session.is_timelapse_running());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_toggle_deletes_recording() {
        let (session, _device, tmp) = session_with_mock().await;
        assert!(session.start_recording().await.unwrap());
        assert_eq!(video_files(&tmp).len(), 1);

        session.stop_recording().await.unwrap();
        assert!(video_files(&tmp).is_empty());
        assert!(!session.is_recording().await);
    }

    #[tokio::test(start_paused = true)]
    async fn long_enough_recording_is_kept() {
        let (session, _device, tmp) = session_with_mock().await;
        assert!(session.start_recording().await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(session.recording_duration_secs().await, 2);

        session.stop_recording().await.unwrap();
        assert_eq!(video_files(&tmp).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_timelapse_produces_exact_frame_count() {
        let (session, _device, _tmp) = session_with_mock().await;
        session
            .update_settings(SettingsUpdate {
                interval: Some(10),
                duration_minutes: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(session.start_timelapse().await.unwrap());
        let folder = {
            match &session.inner.lock().await.mode {
                SessionMode::Timelapse { folder, .. } => folder.clone(),
                other => panic!("expected timelapse mode, got {other:?}"),
            }
        };

        // Paused clock auto-advances through the sleeps; wait for the
        // natural completion at floor(60/10) = 6 frames.
        while session.is_timelapse_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for i in 0..6 {
            assert!(
                folder.join(format!("img_{i:04}.jpg")).exists(),
                "missing frame {i}"
            );
        }
        assert!(!folder.join("img_0006.jpg").exists());
        assert!(matches!(session.inner.lock().await.mode, SessionMode::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_timelapse_joins_loop() {
        let (session, _device, _tmp) = session_with_mock().await;
        assert!(session.start_timelapse().await.unwrap());
        session.stop_timelapse().await.unwrap();
        assert!(!session.is_timelapse_running());
        assert!(matches!(session.inner.lock().await.mode, SessionMode::Idle));
        // loop task is gone; a new session can start immediately
        assert!(session.start_timelapse().await.unwrap());
        session.stop_timelapse().await.unwrap();
    }

    #[tokio::test]
    async fn stop_timelapse_when_not_running_is_noop() {
        let (session, _device, _tmp) = session_with_mock().await;
        session.stop_timelapse().await.unwrap();
        session.stop_timelapse().await.unwrap();
    }

    #[tokio::test]
    async fn settings_rejected_while_recording() {
        let (session, _device, _tmp) = session_with_mock().await;
        assert!(session.start_recording().await.unwrap());
        let result = session
            .update_settings(SettingsUpdate {
                interval: Some(5),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(crate::error::Error::Busy(_))));
        session.stop_recording().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn settings_update_allowed_during_timelapse() {
        let (session, _device, _tmp) = session_with_mock().await;
        assert!(session.start_timelapse().await.unwrap());
        session
            .update_settings(SettingsUpdate {
                interval: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(session.settings().await.interval_secs, 3);
        session.stop_timelapse().await.unwrap();
    }

    #[tokio::test]
    async fn device_error_leaves_session_idle() {
        let (session, device, _tmp) = session_with_mock().await;
        device
            .fail_captures
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(session.take_photo(None).await.is_err());
        assert!(!session.is_recording().await);
        assert!(!session.is_timelapse_running());

        // Recoverable: clears and works again
        device
            .fail_captures
            .store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(session.take_photo(None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn feed_toggle() {
        let (session, _device, _tmp) = session_with_mock().await;
        assert!(session.feed_enabled());
        session.disable_feed();
        assert!(!session.feed_enabled());
        session.enable_feed();
        assert!(session.feed_enabled());
    }
}
