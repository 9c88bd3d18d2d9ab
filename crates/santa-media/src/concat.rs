//! Segment concatenation via the FFmpeg concat demuxer.
//!
//! Segments can come from different producers, so each one is first re-encoded
//! to a shared [`NormalizeProfile`]. The normalized files then join with a
//! plain stream copy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_streams;

/// Joins already-encoded segment files into one output, in the given order.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;
}

/// Render the concat demuxer list for `inputs`.
///
/// Single quotes inside paths are closed, escaped and reopened as the demuxer
/// expects.
pub fn concat_list_contents(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Common encoding every segment is converted to before concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
}

impl Default for NormalizeProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
            crf: 20,
            preset: "veryfast".to_string(),
            audio_bitrate: "128k".to_string(),
            sample_rate: 48_000,
        }
    }
}

impl NormalizeProfile {
    /// Scale into the frame keeping aspect, pad the rest, fix SAR and frame rate.
    fn video_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
            w = self.width,
            h = self.height,
            fps = self.fps
        )
    }
}

/// Build the command that re-encodes one segment to `profile`.
///
/// A segment without an audio track gets a silent stereo track so every
/// normalized file has the same stream layout.
pub fn normalize_command(
    input: &Path,
    output: &Path,
    profile: &NormalizeProfile,
    has_audio: bool,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);

    if has_audio {
        cmd = cmd.output_args(["-map", "0:v:0", "-map", "0:a:0"]);
    } else {
        // Silence is input 0, the segment input 1.
        cmd = cmd
            .input_args(["-f", "lavfi", "-i"])
            .input_arg(format!(
                "anullsrc=channel_layout=stereo:sample_rate={}",
                profile.sample_rate
            ))
            .output_args(["-map", "1:v:0", "-map", "0:a:0", "-shortest"]);
    }

    cmd.output_arg("-vf")
        .output_arg(profile.video_filter())
        .output_args(["-c:v", "libx264", "-preset"])
        .output_arg(profile.preset.clone())
        .output_arg("-crf")
        .output_arg(profile.crf.to_string())
        .output_args(["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a"])
        .output_arg(profile.audio_bitrate.clone())
        .output_arg("-ar")
        .output_arg(profile.sample_rate.to_string())
        .output_args(["-ac", "2"])
}

/// [`Muxer`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    runner: FfmpegRunner,
    profile: NormalizeProfile,
}

impl FfmpegMuxer {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(timeout_secs),
            profile: NormalizeProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: NormalizeProfile) -> Self {
        self.profile = profile;
        self
    }

    async fn normalize(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<Vec<PathBuf>> {
        let mut normalized = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            let streams = match probe_streams(input).await {
                Ok(streams) => streams,
                Err(e) => {
                    remove_all(&normalized).await;
                    return Err(e);
                }
            };
            debug!(
                input = %input.display(),
                codec = %streams.codec,
                width = streams.width,
                height = streams.height,
                has_audio = streams.has_audio,
                "Normalizing segment"
            );

            let dest = output.with_file_name(format!("norm-{:03}.mp4", i + 1));
            let cmd = normalize_command(input, &dest, &self.profile, streams.has_audio);
            // Record before running so a failed encode is still cleaned up.
            normalized.push(dest);
            if let Err(e) = self.runner.run(&cmd).await {
                remove_all(&normalized).await;
                return Err(e);
            }
        }
        Ok(normalized)
    }
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new(600)
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::NoInputs);
        }
        for input in inputs {
            if !tokio::fs::try_exists(input).await? {
                return Err(MediaError::FileNotFound(input.clone()));
            }
        }

        let normalized = self.normalize(inputs, output).await?;

        // List file sits next to the output so it is removed with the work dir.
        let list_path = output.with_extension("concat.txt");
        if let Err(e) = tokio::fs::write(&list_path, concat_list_contents(&normalized)).await {
            remove_all(&normalized).await;
            return Err(e.into());
        }

        let cmd = FfmpegCommand::new(&list_path, output)
            .concat_demuxer()
            .stream_copy()
            .faststart();
        let result = self.runner.run(&cmd).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        remove_all(&normalized).await;
        result?;

        info!(segments = inputs.len(), output = %output.display(), "Concatenated segments");
        Ok(())
    }
}
