//! Typed driver around the ffmpeg/ffprobe binaries.
//!
//! The driver owns argument-vector construction from a validated
//! `TranscodeOptions`, spawns the encoder with its stderr piped through the
//! progress parser, and guarantees the child is reaped on every exit path.
//! Cancellation of the ambient scope signals the process gracefully and
//! surfaces as `OptimarrError::Cancelled`.
//!
//! `media_info` is the probe subroutine: failures there are recoverable and
//! callers proceed with a zero duration (which disables percentage/ETA).

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::core::progress::{ProgressEvent, ProgressParser};
use crate::error::OptimarrError;
use crate::services::process;

/// Hardware acceleration vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    /// NVENC via CUDA.
    Nvidia,
    /// VAAPI render node.
    Intel,
    /// VAAPI render node.
    Amd,
    /// Software encoding with libx265.
    Cpu,
}

/// Encoder speed/quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    Fast,
    Medium,
    Slow,
}

impl EncoderPreset {
    /// NVENC preset name.
    fn nvenc(self) -> &'static str {
        match self {
            EncoderPreset::Fast => "p4",
            EncoderPreset::Medium => "p5",
            EncoderPreset::Slow => "p7",
        }
    }

    /// libx265 preset name.
    fn x265(self) -> &'static str {
        match self {
            EncoderPreset::Fast => "fast",
            EncoderPreset::Medium => "medium",
            EncoderPreset::Slow => "slow",
        }
    }
}

/// Audio track handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// Pass audio streams through unchanged.
    Copy,
    /// Re-encode to AAC at 256 kbit/s.
    Aac256k,
    /// Re-encode to AC3 at 640 kbit/s.
    Ac3640k,
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mkv,
    Mp4,
}

impl Container {
    fn muxer(self) -> &'static str {
        match self {
            Container::Mkv => "matroska",
            Container::Mp4 => "mp4",
        }
    }
}

/// Upscale target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    UltraHd,
}

impl Resolution {
    /// Target width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::FullHd => (1920, 1080),
            Resolution::UltraHd => (3840, 2160),
        }
    }
}

/// Validated option set for one transcode invocation.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Input media file.
    pub input_path: PathBuf,
    /// Output media file.
    pub output_path: PathBuf,
    /// Hardware acceleration vendor.
    pub gpu_vendor: GpuVendor,
    /// Encoder preset.
    pub preset: EncoderPreset,
    /// Constant-quality level, domain [10, 51].
    pub quality_level: u8,
    /// Audio handling.
    pub audio_codec: AudioCodec,
    /// Output container.
    pub container: Container,
    /// Media duration for percentage derivation; 0 disables it.
    pub total_duration_seconds: f64,
    /// Whether to scale video up to `target_resolution`.
    pub upscale: bool,
    /// Target resolution when upscaling.
    pub target_resolution: Option<Resolution>,
}

/// Result of probing a media file.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Stream duration in seconds; 0 when unknown.
    pub duration_seconds: f64,
    /// Container size in bytes.
    pub size_bytes: u64,
    /// The raw probe document, for downstream consumers (AI quality
    /// recommendation, the `info` subcommand).
    pub raw: serde_json::Value,
}

/// Build the full ffmpeg argument vector for the given options.
///
/// The vector is assembled as an ordered sequence of flag/value pairs; user
/// strings are never interpolated into a shell.
pub fn build_args(options: &TranscodeOptions) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let arg = |args: &mut Vec<String>, items: &[&str]| {
        args.extend(items.iter().map(|s| s.to_string()));
    };

    // Banner suppression, log level, progress statistics on stderr.
    arg(&mut args, &["-hide_banner", "-loglevel", "info", "-stats"]);

    // Hardware-acceleration input directives.
    match options.gpu_vendor {
        GpuVendor::Nvidia => {
            arg(&mut args, &["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
        }
        GpuVendor::Intel | GpuVendor::Amd => {
            arg(
                &mut args,
                &[
                    "-hwaccel",
                    "vaapi",
                    "-vaapi_device",
                    "/dev/dri/renderD128",
                    "-hwaccel_output_format",
                    "vaapi",
                ],
            );
        }
        GpuVendor::Cpu => {}
    }

    arg(&mut args, &["-i"]);
    args.push(options.input_path.to_string_lossy().into_owned());

    // Filter chain: optional upscale, plus hardware upload for VAAPI.
    let mut filters: Vec<String> = Vec::new();
    if options.upscale {
        let (w, h) = options
            .target_resolution
            .unwrap_or(Resolution::FullHd)
            .dimensions();
        match options.gpu_vendor {
            GpuVendor::Nvidia => filters.push(format!("scale_cuda={}:{}", w, h)),
            _ => filters.push(format!("scale={}:{}:flags=lanczos", w, h)),
        }
    }
    if matches!(options.gpu_vendor, GpuVendor::Intel | GpuVendor::Amd) {
        filters.push("format=nv12|vaapi".to_string());
        filters.push("hwupload".to_string());
    }
    if !filters.is_empty() {
        arg(&mut args, &["-vf"]);
        args.push(filters.join(","));
    }

    // Video encoder selection.
    let quality = options.quality_level.to_string();
    match options.gpu_vendor {
        GpuVendor::Nvidia => {
            arg(&mut args, &["-c:v", "hevc_nvenc", "-preset", options.preset.nvenc()]);
            arg(&mut args, &["-rc", "vbr", "-cq", &quality, "-b:v", "0"]);
            arg(&mut args, &["-profile:v", "main10", "-tier", "high"]);
        }
        GpuVendor::Intel | GpuVendor::Amd => {
            arg(&mut args, &["-c:v", "hevc_vaapi", "-qp", &quality]);
        }
        GpuVendor::Cpu => {
            arg(&mut args, &["-c:v", "libx265", "-preset", options.preset.x265()]);
            arg(&mut args, &["-crf", &quality, "-pix_fmt", "yuv420p10le"]);
            arg(&mut args, &["-profile:v", "main10"]);
        }
    }

    // Audio encoder selection.
    match options.audio_codec {
        AudioCodec::Copy => arg(&mut args, &["-c:a", "copy"]),
        AudioCodec::Aac256k => arg(&mut args, &["-c:a", "aac", "-b:a", "256k"]),
        AudioCodec::Ac3640k => arg(&mut args, &["-c:a", "ac3", "-b:a", "640k"]),
    }

    // Subtitle streams pass through unchanged.
    arg(&mut args, &["-c:s", "copy"]);

    // Map all streams, force overwrite, output.
    arg(&mut args, &["-map", "0", "-f", options.container.muxer(), "-y"]);
    args.push(options.output_path.to_string_lossy().into_owned());

    args
}

/// Driver for the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Transcoder {
    /// Create a driver for the given binary locations, logging (not
    /// failing) when either is absent.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ffmpeg: P, ffprobe: Q) -> Self {
        let transcoder = Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        };
        process::note_tool_presence("ffmpeg", &transcoder.ffmpeg);
        process::note_tool_presence("ffprobe", &transcoder.ffprobe);
        transcoder
    }

    /// Run a transcode, invoking `on_progress` for every parsed progress
    /// frame. The callback runs on the stderr-reader task and must not
    /// block.
    ///
    /// On cancellation the child is signalled gracefully, awaited, and the
    /// call returns `OptimarrError::Cancelled`. The child is reaped on every
    /// exit path.
    pub async fn transcode_with_progress<F>(
        &self,
        options: &TranscodeOptions,
        cancel: CancellationToken,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(ProgressEvent) + Send + 'static,
    {
        let args = build_args(options);
        let mut child = process::spawn_tool(&self.ffmpeg, &args)?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OptimarrError::tool("ffmpeg", "stderr pipe unavailable"))?;

        let total = options.total_duration_seconds;
        let reader = tokio::spawn(async move {
            let mut parser = ProgressParser::new(total);
            let mut tail = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                process::push_tail(&mut tail, &line);
                if let Some(event) = parser.push_line(&line) {
                    on_progress(event);
                }
            }
            tail
        });

        let mut cancel_requested = false;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = cancel.cancelled(), if !cancel_requested => {}
            }
            // Only the cancellation arm falls through to here.
            cancel_requested = true;
            process::terminate_gracefully(&mut child);
        };
        // The parser reads until EOF; wait for it even after exit so the
        // last progress frames are delivered before we return.
        let tail = reader.await.unwrap_or_default();

        if cancel_requested {
            return Err(OptimarrError::Cancelled);
        }
        if status.success() {
            Ok(())
        } else {
            Err(OptimarrError::tool(
                "ffmpeg",
                format!(
                    "exit status {}: {}",
                    status.code().unwrap_or(-1),
                    tail.join("\n")
                ),
            ))
        }
    }

    /// Probe a media file for duration, size, and the raw metadata document.
    pub async fn media_info(&self, path: &Path) -> Result<MediaInfo> {
        let args = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ];
        let output = Command::new(&self.ffprobe)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OptimarrError::ToolMissing(self.ffprobe.display().to_string())
                } else {
                    OptimarrError::Io(e)
                }
            })?;
        if !output.status.success() {
            return Err(OptimarrError::tool(
                "ffprobe",
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        let raw: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let duration_seconds = raw["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0);
        let size_bytes = raw["format"]["size"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| std::fs::metadata(path).ok().map(|m| m.len()))
            .unwrap_or(0);
        debug!(
            "probed {}: {:.1}s, {} bytes",
            path.display(),
            duration_seconds,
            size_bytes
        );
        Ok(MediaInfo {
            duration_seconds,
            size_bytes,
            raw,
        })
    }

    /// Extract the first audio track to 16 kHz mono WAV, for transcription.
    pub async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-map".into(),
            "0:a:0".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            "16000".into(),
            "-ac".into(),
            "1".into(),
            "-y".into(),
        ];
        args.push(output.to_string_lossy().into_owned());

        let mut child = process::spawn_tool(&self.ffmpeg, &args)?;
        let mut cancel_requested = false;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = cancel.cancelled(), if !cancel_requested => {}
            }
            cancel_requested = true;
            process::terminate_gracefully(&mut child);
        };
        if cancel_requested {
            return Err(OptimarrError::Cancelled);
        }
        if status.success() {
            Ok(())
        } else {
            Err(OptimarrError::tool(
                "ffmpeg",
                format!("audio extraction exit status {}", status.code().unwrap_or(-1)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options() -> TranscodeOptions {
        TranscodeOptions {
            input_path: PathBuf::from("/m/a.mkv"),
            output_path: PathBuf::from("/out/a_optimized.mkv"),
            gpu_vendor: GpuVendor::Cpu,
            preset: EncoderPreset::Medium,
            quality_level: 24,
            audio_codec: AudioCodec::Copy,
            container: Container::Mkv,
            total_duration_seconds: 3600.0,
            upscale: false,
            target_resolution: None,
        }
    }

    fn window(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_cpu_args() {
        let args = build_args(&base_options());
        assert_eq!(args[0], "-hide_banner");
        assert!(!args.contains(&"-hwaccel".to_string()));
        assert_eq!(window(&args, "-c:v").unwrap(), "libx265");
        assert_eq!(window(&args, "-preset").unwrap(), "medium");
        assert_eq!(window(&args, "-crf").unwrap(), "24");
        assert_eq!(window(&args, "-pix_fmt").unwrap(), "yuv420p10le");
        assert_eq!(window(&args, "-profile:v").unwrap(), "main10");
        assert_eq!(window(&args, "-c:a").unwrap(), "copy");
        assert_eq!(window(&args, "-c:s").unwrap(), "copy");
        assert_eq!(window(&args, "-map").unwrap(), "0");
        assert!(args.contains(&"-y".to_string()));
        assert_eq!(args.last().unwrap(), "/out/a_optimized.mkv");
    }

    #[test]
    fn test_nvidia_args() {
        let mut options = base_options();
        options.gpu_vendor = GpuVendor::Nvidia;
        options.preset = EncoderPreset::Slow;
        let args = build_args(&options);
        assert_eq!(window(&args, "-hwaccel").unwrap(), "cuda");
        assert_eq!(window(&args, "-hwaccel_output_format").unwrap(), "cuda");
        assert_eq!(window(&args, "-c:v").unwrap(), "hevc_nvenc");
        assert_eq!(window(&args, "-preset").unwrap(), "p7");
        assert_eq!(window(&args, "-rc").unwrap(), "vbr");
        assert_eq!(window(&args, "-cq").unwrap(), "24");
        assert_eq!(window(&args, "-b:v").unwrap(), "0");
        assert_eq!(window(&args, "-tier").unwrap(), "high");
    }

    #[test]
    fn test_vaapi_args_include_upload_filter() {
        let mut options = base_options();
        options.gpu_vendor = GpuVendor::Intel;
        let args = build_args(&options);
        assert_eq!(window(&args, "-hwaccel").unwrap(), "vaapi");
        assert_eq!(window(&args, "-vaapi_device").unwrap(), "/dev/dri/renderD128");
        assert_eq!(window(&args, "-c:v").unwrap(), "hevc_vaapi");
        assert_eq!(window(&args, "-qp").unwrap(), "24");
        let vf = window(&args, "-vf").unwrap();
        assert!(vf.contains("format=nv12|vaapi"));
        assert!(vf.contains("hwupload"));
    }

    #[test]
    fn test_upscale_filters() {
        let mut options = base_options();
        options.upscale = true;
        options.target_resolution = Some(Resolution::UltraHd);
        let args = build_args(&options);
        assert_eq!(window(&args, "-vf").unwrap(), "scale=3840:2160:flags=lanczos");

        options.gpu_vendor = GpuVendor::Nvidia;
        let args = build_args(&options);
        assert_eq!(window(&args, "-vf").unwrap(), "scale_cuda=3840:2160");
    }

    #[test]
    fn test_quality_token_is_forwarded() {
        let mut options = base_options();
        options.quality_level = 22;
        let args = build_args(&options);
        assert_eq!(window(&args, "-crf").unwrap(), "22");
    }

    #[test]
    fn test_audio_codec_variants() {
        let mut options = base_options();
        options.audio_codec = AudioCodec::Aac256k;
        let args = build_args(&options);
        assert_eq!(window(&args, "-c:a").unwrap(), "aac");
        assert_eq!(window(&args, "-b:a").unwrap(), "256k");

        options.audio_codec = AudioCodec::Ac3640k;
        let args = build_args(&options);
        assert_eq!(window(&args, "-c:a").unwrap(), "ac3");
        assert_eq!(window(&args, "-b:a").unwrap(), "640k");
    }

    #[test]
    fn test_container_selects_muxer() {
        let mut options = base_options();
        options.container = Container::Mp4;
        let args = build_args(&options);
        assert_eq!(window(&args, "-f").unwrap(), "mp4");
    }

    #[test]
    fn test_input_precedes_filters_and_encoder() {
        let mut options = base_options();
        options.upscale = true;
        let args = build_args(&options);
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        let codec_pos = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(input_pos < vf_pos);
        assert!(vf_pos < codec_pos);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_progress() {
        // Spawn against a binary that blocks forever, cancel immediately.
        let transcoder = Transcoder::new("sleep", "ffprobe");
        let mut options = base_options();
        options.input_path = PathBuf::from("1000");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transcoder
            .transcode_with_progress(&options, cancel, |_| {})
            .await;
        // Either cancelled (sleep spawned then terminated) or a tool error
        // from sleep rejecting the argv; never a hang.
        assert!(result.is_err());
    }
}
