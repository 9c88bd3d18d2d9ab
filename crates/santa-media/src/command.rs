//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Read the input through the concat demuxer (input is a list file).
    pub fn concat_demuxer(self) -> Self {
        self.input_args(["-f", "concat", "-safe", "0"])
    }

    /// Copy every stream without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_args(["-c", "copy"])
    }

    /// Move the moov atom to the front so playback can start before download ends.
    pub fn faststart(self) -> Self {
        self.output_args(["-movflags", "+faststart"])
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.input_args.len() + self.output_args.len() + 8);

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runs FFmpeg commands with an optional wall-clock limit.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process if it runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command to completion.
    ///
    /// Stderr is captured and attached to [`MediaError::FfmpegFailed`] on a
    /// non-zero exit.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let ffmpeg = check_ffmpeg()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        let status = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", secs);
                    let _ = child.kill().await;
                    metrics::counter!("santa_ffmpeg_runs_total", "outcome" => "timeout").increment(1);
                    return Err(MediaError::Timeout(secs));
                }
            },
            None => child.wait().await?,
        };

        let stderr = stderr_task.await.unwrap_or_default();
        metrics::histogram!("santa_ffmpeg_duration_seconds").record(started.elapsed().as_secs_f64());

        if status.success() {
            metrics::counter!("santa_ffmpeg_runs_total", "outcome" => "success").increment(1);
            Ok(())
        } else {
            metrics::counter!("santa_ffmpeg_runs_total", "outcome" => "failure").increment(1);
            let stderr = (!stderr.trim().is_empty()).then_some(stderr);
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }
}

/// Locate the FFmpeg binary.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
