//! Timelapse video assembly
//!
//! Turning a frame folder into a playable video is a separate, explicitly
//! invoked step that shells out to ffmpeg. Capture-loop integrity never
//! depends on it: a missing or failing encoder leaves the frames intact.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Frame rate of the assembled video
const ASSEMBLY_FRAMERATE: u32 = 10;

/// Assemble the frames in `folder` into `<folder>.mp4`.
///
/// Idempotent: returns `Ok(None)` when fewer than 2 frames exist or the
/// output is already there. Returns the output path on success.
pub async fn assemble_video(folder: &Path) -> Result<Option<PathBuf>> {
    let meta = tokio::fs::metadata(folder).await.map_err(|_| {
        Error::NotFound(format!("timelapse folder {}", folder.display()))
    })?;
    if !meta.is_dir() {
        return Err(Error::NotFound(format!(
            "timelapse folder {}",
            folder.display()
        )));
    }

    let frame_count = count_frames(folder).await?;
    if frame_count < 2 {
        tracing::info!(
            folder = %folder.display(),
            frames = frame_count,
            "Skipping assembly: not enough frames"
        );
        return Ok(None);
    }

    let output = folder.with_extension("mp4");
    if tokio::fs::try_exists(&output).await? {
        tracing::info!(output = %output.display(), "Skipping assembly: output exists");
        return Ok(None);
    }

    let pattern = folder.join("img_*.jpg");
    let output_arg = output.display().to_string();
    let out = Command::new("ffmpeg")
        .args([
            "-y",
            "-framerate",
            &ASSEMBLY_FRAMERATE.to_string(),
            "-pattern_type",
            "glob",
            "-i",
            &pattern.display().to_string(),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            &output_arg,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Encoder(format!("ffmpeg not runnable: {e}")))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::Encoder(format!(
            "timelapse assembly failed: {}",
            stderr.trim()
        )));
    }

    tracing::info!(
        output = %output.display(),
        frames = frame_count,
        "Timelapse video assembled"
    );
    Ok(Some(output))
}

async fn count_frames(folder: &Path) -> Result<usize> {
    let mut count = 0;
    let mut dir = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("img_") && name.ends_with(".jpg") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_folder_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = assemble_video(&tmp.path().join("timelapse_nope")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn too_few_frames_skips_assembly() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("timelapse_20260829_120000");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("img_0000.jpg"), b"x").unwrap();

        assert_eq!(assemble_video(&folder).await.unwrap(), None);
        // frames untouched
        assert!(folder.join("img_0000.jpg").exists());
    }

    #[tokio::test]
    async fn existing_output_skips_assembly() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("timelapse_20260829_120000");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("img_0000.jpg"), b"x").unwrap();
        std::fs::write(folder.join("img_0001.jpg"), b"x").unwrap();
        std::fs::write(tmp.path().join("timelapse_20260829_120000.mp4"), b"video").unwrap();

        assert_eq!(assemble_video(&folder).await.unwrap(), None);
    }
}
