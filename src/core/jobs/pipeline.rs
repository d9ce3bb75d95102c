//! Pipeline composition for the job kinds.
//!
//! Three pipelines: plain extraction, optimize-from-file, and the composed
//! optimize-from-disc-image pipeline that chains an extraction phase into a
//! transcode phase through a per-job scratch directory. Cancellation at any
//! step terminates the active subprocess and short-circuits the rest.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::error::OptimarrError;
use crate::services::ai::{parse_quality_response, prompts};
use crate::services::extractor::ExtractOptions;
use crate::services::transcoder::{MediaInfo, TranscodeOptions};

use super::manager::JobManager;
use super::Job;

/// Scratch directory for one disc-image job, unique by job id.
pub(crate) fn scratch_dir(destination: &Path, job_id: &str) -> PathBuf {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("extract_{}", job_id))
}

impl JobManager {
    /// Extraction pipeline: scan, choose the main title, extract it into
    /// the destination directory with live progress.
    pub(crate) async fn run_extraction(&self, job: &Job, token: &CancellationToken) -> Result<()> {
        let disc = self
            .extractor
            .scan(&job.source_path, token.child_token())
            .await?;
        let Some(title_index) = disc.main_title() else {
            return Err(OptimarrError::tool("makemkvcon", "no titles found"));
        };
        info!(
            "job {}: extracting title {} of disc {:?}",
            job.id, title_index, disc.disc_name
        );
        tokio::fs::create_dir_all(&job.destination_path).await?;
        let options = ExtractOptions {
            source: job.source_path.clone(),
            output_dir: job.destination_path.clone(),
            title_index,
            min_length_seconds: self.config.tools.min_title_length_seconds,
        };
        self.extractor
            .extract(&options, token.child_token(), self.progress_percent_updater(&job.id))
            .await
    }

    /// Composed disc-image pipeline: extract the main title into a scratch
    /// directory (progress phase 1), then run the ordinary optimize
    /// pipeline against the extracted file (progress phase 2).
    ///
    /// On success the scratch directory is removed and the job's source
    /// path is restored to the original disc image so later audits identify
    /// the logical input. On failure the scratch directory is left in place
    /// for post-mortem and the first error surfaces intact.
    pub(crate) async fn run_disc_image_pipeline(
        &self,
        job: &Job,
        token: &CancellationToken,
    ) -> Result<()> {
        let scratch = scratch_dir(&job.destination_path, &job.id);
        tokio::fs::create_dir_all(&scratch).await?;

        let disc = self
            .extractor
            .scan(&job.source_path, token.child_token())
            .await?;
        let Some(title_index) = disc.main_title() else {
            return Err(OptimarrError::tool("makemkvcon", "no titles found"));
        };
        info!(
            "job {}: disc {:?}, main title {} ({} titles total)",
            job.id,
            disc.disc_name,
            title_index,
            disc.titles.len()
        );

        // Phase 1: the progress bar runs 0 to 100 for the extraction.
        let options = ExtractOptions {
            source: job.source_path.clone(),
            output_dir: scratch.clone(),
            title_index,
            min_length_seconds: self.config.tools.min_title_length_seconds,
        };
        self.extractor
            .extract(&options, token.child_token(), self.progress_percent_updater(&job.id))
            .await?;

        let extracted = first_file_with_extension(&scratch, "mkv")?;
        debug!("job {}: extracted {}", job.id, extracted.display());

        let original_source = job.source_path.clone();
        self.update_job(&job.id, |j| {
            j.source_path = extracted.clone();
            j.progress = 0;
        });

        // Phase 2: the bar restarts 0 to 100 for the transcode.
        let updated = self
            .get_job(&job.id)
            .ok_or_else(|| OptimarrError::JobNotFound(job.id.clone()))?;
        self.run_optimization(&updated, token).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(
                "job {}: could not remove scratch directory {}: {}",
                job.id,
                scratch.display(),
                e
            );
        }
        self.update_job(&job.id, |j| j.source_path = original_source.clone());
        Ok(())
    }

    /// Optimize pipeline: probe (failure tolerated), resolve the quality
    /// level (AI-adaptive when premium), transcode with live progress, then
    /// optionally drive the subtitle sub-pipeline.
    pub(crate) async fn run_optimization(&self, job: &Job, token: &CancellationToken) -> Result<()> {
        let media_info = match self.transcoder.media_info(&job.source_path).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(
                    "job {}: probe of {} failed ({}); proceeding without duration",
                    job.id,
                    job.source_path.display(),
                    e
                );
                None
            }
        };
        let total_duration_seconds = media_info
            .as_ref()
            .map(|m| m.duration_seconds)
            .unwrap_or(0.0);

        let quality_level = self.resolve_quality_level(media_info.as_ref()).await;

        if let Some(parent) = job.destination_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = TranscodeOptions {
            input_path: job.source_path.clone(),
            output_path: job.destination_path.clone(),
            gpu_vendor: self.config.transcode.gpu_vendor,
            preset: self.config.transcode.preset,
            quality_level,
            audio_codec: self.config.transcode.audio_codec,
            container: self.config.transcode.container,
            total_duration_seconds,
            upscale: job.upscale,
            target_resolution: job.resolution,
        };
        self.transcoder
            .transcode_with_progress(&options, token.child_token(), self.progress_event_updater(&job.id))
            .await?;

        if job.create_subtitles && self.ai.is_some() {
            if let Err(e) = self.generate_subtitles(job, token).await {
                warn!("job {}: subtitle generation failed: {}", job.id, e);
            }
        }
        Ok(())
    }

    /// Determine the constant-quality level for an optimize job: start from
    /// the configured default and, when premium and an AI provider are both
    /// present, accept a recommendation iff it parses to an integer within
    /// the encoder's domain. AI failure is non-fatal.
    pub(crate) async fn resolve_quality_level(&self, media_info: Option<&MediaInfo>) -> u8 {
        let default = self.config.transcode.quality_level;
        if !self.config.ai.premium {
            return default;
        }
        let (Some(ai), Some(info)) = (self.ai.as_ref(), media_info) else {
            return default;
        };
        let prompt = prompts::recommend_quality_prompt(&info.raw.to_string());
        match ai.analyze(&prompt).await {
            Ok(response) => match parse_quality_response(&response) {
                Some(level) => {
                    info!("adaptive quality level {} (default {})", level, default);
                    level
                }
                None => {
                    debug!(
                        "unusable quality recommendation {:?}; keeping {}",
                        response, default
                    );
                    default
                }
            },
            Err(e) => {
                debug!("quality recommendation failed ({}); keeping {}", e, default);
                default
            }
        }
    }

    /// Subtitle sub-pipeline: extract a mono audio track, ask the AI
    /// provider for an SRT transcription, write the sidecar next to the
    /// destination. Any failure here is the caller's to log; it never
    /// demotes the job.
    async fn generate_subtitles(&self, job: &Job, token: &CancellationToken) -> Result<()> {
        let Some(ai) = self.ai.as_ref() else {
            return Ok(());
        };
        let audio_path = job.destination_path.with_extension("wav");
        self.transcoder
            .extract_audio(&job.destination_path, &audio_path, token.child_token())
            .await?;

        let description = format!(
            "mono 16 kHz WAV track extracted from {}",
            job.destination_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let srt = ai.analyze(&prompts::transcribe_prompt(&description)).await?;
        let srt_path = job.destination_path.with_extension("srt");
        tokio::fs::write(&srt_path, srt).await?;
        let _ = tokio::fs::remove_file(&audio_path).await;
        info!("job {}: wrote subtitle sidecar {}", job.id, srt_path.display());
        Ok(())
    }
}

/// First file (lexicographic) in `dir` with the given extension.
fn first_file_with_extension(dir: &Path, extension: &str) -> Result<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    matches.sort();
    matches.into_iter().next().ok_or_else(|| {
        OptimarrError::tool(
            "makemkvcon",
            format!("no extracted .{} files in {}", extension, dir.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::ai::AiProvider;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl AiProvider for FixedProvider {
        async fn analyze(&self, _prompt: &str) -> crate::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl AiProvider for BrokenProvider {
        async fn analyze(&self, _prompt: &str) -> crate::Result<String> {
            Err(OptimarrError::ai_service("unavailable"))
        }
    }

    fn premium_manager(temp: &TempDir, ai: Arc<dyn AiProvider>) -> JobManager {
        let mut config = AppConfig::default();
        config.ai.premium = true;
        config.transcode.quality_level = 24;
        JobManager::new(config, Some(ai), temp.path().join("jobs.json")).unwrap()
    }

    fn probe_result() -> MediaInfo {
        MediaInfo {
            duration_seconds: 3600.0,
            size_bytes: 1024,
            raw: serde_json::json!({"format": {"duration": "3600.0"}}),
        }
    }

    #[tokio::test]
    async fn test_premium_quality_override_accepted() {
        let temp = TempDir::new().unwrap();
        let manager = premium_manager(&temp, Arc::new(FixedProvider("22")));
        let info = probe_result();
        assert_eq!(manager.resolve_quality_level(Some(&info)).await, 22);
    }

    #[tokio::test]
    async fn test_out_of_domain_recommendation_keeps_default() {
        let temp = TempDir::new().unwrap();
        let manager = premium_manager(&temp, Arc::new(FixedProvider("75")));
        let info = probe_result();
        assert_eq!(manager.resolve_quality_level(Some(&info)).await, 24);
    }

    #[tokio::test]
    async fn test_ai_failure_keeps_default() {
        let temp = TempDir::new().unwrap();
        let manager = premium_manager(&temp, Arc::new(BrokenProvider));
        let info = probe_result();
        assert_eq!(manager.resolve_quality_level(Some(&info)).await, 24);
    }

    #[tokio::test]
    async fn test_no_probe_document_keeps_default() {
        let temp = TempDir::new().unwrap();
        let manager = premium_manager(&temp, Arc::new(FixedProvider("22")));
        assert_eq!(manager.resolve_quality_level(None).await, 24);
    }

    #[tokio::test]
    async fn test_quality_untouched_without_premium() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.transcode.quality_level = 20;
        let manager =
            JobManager::new(config, None, temp.path().join("jobs.json")).unwrap();
        assert_eq!(manager.resolve_quality_level(Some(&probe_result())).await, 20);
    }

    #[test]
    fn test_scratch_dir_incorporates_job_id() {
        let dir = scratch_dir(Path::new("/out/movie_optimized.mkv"), "job-7");
        assert_eq!(dir, Path::new("/out/extract_job-7"));
    }

    #[test]
    fn test_first_file_with_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.mkv"), b"x").unwrap();
        fs::write(temp.path().join("a.MKV"), b"x").unwrap();
        fs::write(temp.path().join("ignore.txt"), b"x").unwrap();
        let found = first_file_with_extension(temp.path(), "mkv").unwrap();
        assert!(found.ends_with("a.MKV"), "lexicographically first match");
    }

    #[test]
    fn test_first_file_with_extension_empty() {
        let temp = TempDir::new().unwrap();
        let err = first_file_with_extension(temp.path(), "mkv").unwrap_err();
        assert!(err.to_string().contains("no extracted"));
    }
}
