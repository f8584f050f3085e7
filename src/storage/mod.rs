//! Gallery listing and disk-usage reporting
//!
//! Reads what the capture side wrote: photos and timelapse folders under
//! the photos root, videos (and assembled timelapse videos) under both
//! roots. Artifacts are immutable once written; this module only lists,
//! serves and deletes them.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sysinfo::Disks;

use crate::error::{Error, Result};

/// Gallery listing: file paths relative to a media root, plus the
/// timelapse folder names found
#[derive(Debug, Clone, Serialize)]
pub struct GalleryListing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

/// Disk usage of the filesystem holding the media roots
#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub total_mb: u64,
    pub free_mb: u64,
    pub used_percent: u8,
}

/// Media artifact store rooted at the photos and videos directories
pub struct MediaStore {
    photos_dir: PathBuf,
    videos_dir: PathBuf,
}

impl MediaStore {
    pub fn new(photos_dir: PathBuf, videos_dir: PathBuf) -> Self {
        Self {
            photos_dir,
            videos_dir,
        }
    }

    /// List `.jpg` artifacts under the photos root: loose photos plus the
    /// contents of timelapse folders (one level deep, matching how the
    /// capture side lays files out).
    pub async fn list_photos(&self) -> Result<GalleryListing> {
        let mut files = Vec::new();
        let mut folders = Vec::new();

        let mut root = match tokio::fs::read_dir(&self.photos_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GalleryListing { files, folders });
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = root.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                folders.push(name.clone());
                let mut sub = tokio::fs::read_dir(entry.path()).await?;
                while let Some(frame) = sub.next_entry().await? {
                    let frame_name = frame.file_name().to_string_lossy().into_owned();
                    if frame_name.ends_with(".jpg") {
                        files.push(format!("{name}/{frame_name}"));
                    }
                }
            } else if name.ends_with(".jpg") {
                files.push(name);
            }
        }

        files.sort();
        folders.sort();
        Ok(GalleryListing { files, folders })
    }

    /// List video artifacts: recordings under the videos root plus
    /// assembled timelapse videos under the photos root (served through
    /// the photos media route, hence the prefix).
    pub async fn list_videos(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        if let Ok(mut dir) = tokio::fs::read_dir(&self.videos_dir).await {
            while let Some(entry) = dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".mp4") || name.ends_with(".h264") {
                    files.push(name);
                }
            }
        }

        if let Ok(mut dir) = tokio::fs::read_dir(&self.photos_dir).await {
            while let Some(entry) = dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".mp4") {
                    files.push(format!("../photos/{name}"));
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Resolve a request-supplied relative path against the photos root,
    /// rejecting traversal.
    pub fn resolve_photo(&self, relative: &str) -> Result<PathBuf> {
        resolve_under(&self.photos_dir, relative)
    }

    /// As [`resolve_photo`](Self::resolve_photo), against the videos root.
    pub fn resolve_video(&self, relative: &str) -> Result<PathBuf> {
        resolve_under(&self.videos_dir, relative)
    }

    /// Delete one artifact (resolved path from the resolve_* guards)
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "artifact {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Disk usage of the filesystem holding the photos root
    pub fn disk_usage(&self) -> DiskUsage {
        let target = self
            .photos_dir
            .canonicalize()
            .unwrap_or_else(|_| self.photos_dir.clone());

        let disks = Disks::new_with_refreshed_list();
        let mut best: Option<(&Path, u64, u64)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if target.starts_with(mount) {
                let better = match best {
                    Some((prev, _, _)) => mount.as_os_str().len() > prev.as_os_str().len(),
                    None => true,
                };
                if better {
                    best = Some((mount, disk.total_space(), disk.available_space()));
                }
            }
        }

        let (total, available) = match best {
            Some((_, total, available)) => (total, available),
            None => (0, 0),
        };
        let used_percent = if total > 0 {
            (((total - available) as f64 / total as f64) * 100.0).round() as u8
        } else {
            0
        };
        DiskUsage {
            total_mb: total / (1024 * 1024),
            free_mb: available / (1024 * 1024),
            used_percent,
        }
    }
}

/// Join `relative` under `root`, allowing only plain path components
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(Error::Validation(format!("invalid media path '{relative}'")));
    }
    Ok(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> MediaStore {
        MediaStore::new(tmp.path().join("photos"), tmp.path().join("videos"))
    }

    #[tokio::test]
    async fn lists_photos_and_timelapse_frames() {
        let tmp = TempDir::new().unwrap();
        let photos = tmp.path().join("photos");
        std::fs::create_dir_all(photos.join("timelapse_20260829_080000")).unwrap();
        std::fs::write(photos.join("photo_20260829_090000.jpg"), b"x").unwrap();
        std::fs::write(
            photos.join("timelapse_20260829_080000/img_0000.jpg"),
            b"x",
        )
        .unwrap();
        std::fs::write(photos.join("notes.txt"), b"x").unwrap();

        let listing = store(&tmp).list_photos().await.unwrap();
        assert_eq!(
            listing.files,
            vec![
                "photo_20260829_090000.jpg".to_string(),
                "timelapse_20260829_080000/img_0000.jpg".to_string(),
            ]
        );
        assert_eq!(listing.folders, vec!["timelapse_20260829_080000".to_string()]);
    }

    #[tokio::test]
    async fn lists_videos_including_assembled_timelapses() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("videos")).unwrap();
        std::fs::create_dir_all(tmp.path().join("photos")).unwrap();
        std::fs::write(tmp.path().join("videos/video_20260829_100000.mp4"), b"x").unwrap();
        std::fs::write(tmp.path().join("photos/timelapse_20260829_080000.mp4"), b"x").unwrap();

        let videos = store(&tmp).list_videos().await.unwrap();
        assert_eq!(
            videos,
            vec![
                "../photos/timelapse_20260829_080000.mp4".to_string(),
                "video_20260829_100000.mp4".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_roots_list_empty() {
        let tmp = TempDir::new().unwrap();
        let listing = store(&tmp).list_photos().await.unwrap();
        assert!(listing.files.is_empty());
        assert!(store(&tmp).list_videos().await.unwrap().is_empty());
    }

    #[test]
    fn traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        assert!(s.resolve_photo("../secrets.txt").is_err());
        assert!(s.resolve_photo("/etc/passwd").is_err());
        assert!(s.resolve_photo("timelapse_x/img_0000.jpg").is_ok());
    }

    #[tokio::test]
    async fn delete_missing_artifact_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let path = s.resolve_photo("nope.jpg").unwrap();
        assert!(matches!(s.delete(&path).await, Err(Error::NotFound(_))));
    }
}
