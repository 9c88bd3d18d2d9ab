//! FFprobe stream inspection.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Streams present in a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub width: u32,
    pub height: u32,
    /// Video codec
    pub codec: String,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse `ffprobe -show_streams -print_format json` output.
fn summarize(stdout: &[u8]) -> MediaResult<StreamSummary> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    Ok(StreamSummary {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        codec: video.codec_name.clone().unwrap_or_default(),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// Probe a media file's streams.
pub async fn probe_streams(path: impl AsRef<Path>) -> MediaResult<StreamSummary> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    summarize(&output.stdout)
}
