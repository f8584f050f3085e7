//! Camera settings and partial updates

use serde::{Deserialize, Serialize};

use crate::device::{Resolution, Rotation, WhiteBalance};
use crate::error::{Error, Result};

/// Default capture interval for timelapse, seconds
const DEFAULT_INTERVAL_SECS: u32 = 10;

/// Fully-valid camera settings, owned by the session state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub preview_resolution: Resolution,
    pub photo_resolution: Resolution,
    pub white_balance: WhiteBalance,
    pub rotation: Rotation,
    /// Seconds between timelapse frames, always positive
    pub interval_secs: u32,
    /// Timelapse duration bound, 0 = unbounded
    pub duration_minutes: u32,
}

impl CameraSettings {
    /// Defaults: smallest supported resolution for preview, largest for
    /// stills, matching what the sensor mode list orders.
    pub fn defaults(resolutions: &[Resolution]) -> Self {
        let fallback = Resolution::new(640, 480);
        let preview = resolutions.first().copied().unwrap_or(fallback);
        let photo = resolutions.last().copied().unwrap_or(fallback);
        Self {
            preview_resolution: preview,
            photo_resolution: photo,
            white_balance: WhiteBalance::Auto,
            rotation: Rotation::Deg0,
            interval_secs: DEFAULT_INTERVAL_SECS,
            duration_minutes: 0,
        }
    }

    /// Apply a partial update. Fields that are absent or empty are left
    /// unchanged. The whole update fails without mutating anything when any
    /// provided field is malformed.
    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<()> {
        let preview = parse_optional_resolution(update.preview_res.as_deref())?;
        let photo = parse_optional_resolution(update.photo_res.as_deref())?;
        let white_balance = match non_empty(update.white_balance.as_deref()) {
            Some(token) => Some(WhiteBalance::parse(token)?),
            None => None,
        };
        let rotation = match update.rotation {
            Some(deg) => Some(Rotation::try_from(deg)?),
            None => None,
        };
        if let Some(0) = update.interval {
            return Err(Error::Validation(
                "interval must be a positive number of seconds".to_string(),
            ));
        }

        if let Some(r) = preview {
            self.preview_resolution = r;
        }
        if let Some(r) = photo {
            self.photo_resolution = r;
        }
        if let Some(wb) = white_balance {
            self.white_balance = wb;
        }
        if let Some(r) = rotation {
            self.rotation = r;
        }
        if let Some(interval) = update.interval {
            self.interval_secs = interval;
        }
        if let Some(minutes) = update.duration_minutes {
            self.duration_minutes = minutes;
        }
        Ok(())
    }
}

/// Partial settings update; resolution fields are `WIDTHxHEIGHT` tokens
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SettingsUpdate {
    pub preview_res: Option<String>,
    pub photo_res: Option<String>,
    pub white_balance: Option<String>,
    pub rotation: Option<u16>,
    pub interval: Option<u32>,
    pub duration_minutes: Option<u32>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_optional_resolution(token: Option<&str>) -> Result<Option<Resolution>> {
    match non_empty(token) {
        Some(token) => Resolution::parse(token).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CameraSettings {
        CameraSettings::defaults(&[
            Resolution::new(640, 480),
            Resolution::new(1920, 1080),
        ])
    }

    #[test]
    fn defaults_bracket_resolution_list() {
        let s = settings();
        assert_eq!(s.preview_resolution, Resolution::new(640, 480));
        assert_eq!(s.photo_resolution, Resolution::new(1920, 1080));
        assert_eq!(s.interval_secs, 10);
        assert_eq!(s.duration_minutes, 0);
    }

    #[test]
    fn partial_update_touches_only_provided_fields() {
        let mut s = settings();
        let update = SettingsUpdate {
            photo_res: Some("2592x1944".to_string()),
            ..Default::default()
        };
        s.apply(&update).unwrap();
        assert_eq!(s.photo_resolution, Resolution::new(2592, 1944));
        assert_eq!(s.preview_resolution, Resolution::new(640, 480));
        assert_eq!(s.white_balance, WhiteBalance::Auto);
    }

    #[test]
    fn empty_strings_are_treated_as_absent() {
        let mut s = settings();
        let update = SettingsUpdate {
            preview_res: Some(String::new()),
            white_balance: Some("  ".to_string()),
            ..Default::default()
        };
        s.apply(&update).unwrap();
        assert_eq!(s.preview_resolution, Resolution::new(640, 480));
    }

    #[test]
    fn malformed_token_fails_whole_update() {
        let mut s = settings();
        let update = SettingsUpdate {
            interval: Some(30),
            photo_res: Some("not-a-size".to_string()),
            ..Default::default()
        };
        assert!(s.apply(&update).is_err());
        // interval was valid but must not have been applied
        assert_eq!(s.interval_secs, 10);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut s = settings();
        let update = SettingsUpdate {
            interval: Some(0),
            ..Default::default()
        };
        assert!(matches!(s.apply(&update), Err(Error::Validation(_))));
    }

    #[test]
    fn rotation_validated() {
        let mut s = settings();
        let update = SettingsUpdate {
            rotation: Some(180),
            ..Default::default()
        };
        s.apply(&update).unwrap();
        assert_eq!(s.rotation, Rotation::Deg180);

        let bad = SettingsUpdate {
            rotation: Some(33),
            ..Default::default()
        };
        assert!(s.apply(&bad).is_err());
    }
}
