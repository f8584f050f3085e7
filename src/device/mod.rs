//! Capture device adapter
//!
//! Boundary around the physical camera. The session state machine only
//! talks to the [`CaptureDevice`] trait; the production backend shells out
//! to ffmpeg's V4L2 input, tests use the recording mock.

mod ffmpeg;

#[cfg(test)]
pub mod mock;

pub use ffmpeg::FfmpegDevice;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `WIDTHxHEIGHT` token (e.g. `1920x1080`)
    pub fn parse(token: &str) -> Result<Self> {
        let (w, h) = token
            .split_once('x')
            .ok_or_else(|| Error::Validation(format!("invalid resolution '{token}'")))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid resolution width '{w}'")))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid resolution height '{h}'")))?;
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "resolution dimensions must be positive: '{token}'"
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sensor rotation, quarter turns only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(Error::Validation(format!(
                "rotation must be one of 0/90/180/270, got {other}"
            ))),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// White balance preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalance {
    Auto,
    Daylight,
    Cloudy,
    Tungsten,
    Fluorescent,
    Indoor,
}

impl WhiteBalance {
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "auto" => Ok(WhiteBalance::Auto),
            "daylight" => Ok(WhiteBalance::Daylight),
            "cloudy" => Ok(WhiteBalance::Cloudy),
            "tungsten" => Ok(WhiteBalance::Tungsten),
            "fluorescent" => Ok(WhiteBalance::Fluorescent),
            "indoor" => Ok(WhiteBalance::Indoor),
            other => Err(Error::Validation(format!(
                "unknown white balance '{other}'"
            ))),
        }
    }
}

/// One active device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub resolution: Resolution,
    pub rotation: Rotation,
    pub white_balance: WhiteBalance,
}

/// Contract toward the physical camera.
///
/// Implementations are internally synchronized; the session state machine
/// additionally serializes configure/capture sequences behind its own lock
/// so a reconfiguration never races a frame grab.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Apply a configuration. Takes effect for subsequent captures.
    async fn configure(&self, config: DeviceConfig) -> Result<()>;

    /// Grab one JPEG frame at the current configuration.
    async fn capture_frame(&self) -> Result<Vec<u8>>;

    /// Capture one still frame to `path`.
    async fn capture_still_to(&self, path: &Path) -> Result<()>;

    /// Open a video sink at `path` and start recording.
    async fn start_video_recording(&self, path: &Path) -> Result<()>;

    /// Close the video sink.
    async fn stop_video_recording(&self) -> Result<()>;

    /// Device capability list, smallest first.
    fn supported_resolutions(&self) -> &[Resolution];

    /// File extension the video sink produces.
    fn video_extension(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolution() {
        let r = Resolution::parse("1920x1080").unwrap();
        assert_eq!(r, Resolution::new(1920, 1080));
        assert_eq!(r.to_string(), "1920x1080");
    }

    #[test]
    fn parse_resolution_rejects_garbage() {
        assert!(Resolution::parse("1920").is_err());
        assert!(Resolution::parse("x1080").is_err());
        assert!(Resolution::parse("1920xtall").is_err());
        assert!(Resolution::parse("0x1080").is_err());
    }

    #[test]
    fn rotation_quarter_turns_only() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Deg90);
        assert!(Rotation::try_from(45).is_err());
    }
}
