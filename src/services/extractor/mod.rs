//! Typed driver around the makemkvcon binary.
//!
//! Two operations: `scan` runs information mode and parses the enumerated
//! titles into a `DiscInfo`; `extract` runs robot mode against one title and
//! forwards `PRGV` records to the caller as a percentage. Cancellation
//! semantics match the transcoder driver: graceful signal, guaranteed reap,
//! `OptimarrError::Cancelled` on the way out.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::error::OptimarrError;
use crate::services::process;

pub mod parser;

pub use parser::{DiscInfo, RobotRecord, Title};

/// Extraction failure message code in the extractor's message stream.
const MSG_COPY_FAILED: u32 = 5003;

/// Options for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Disc device or disc-image file.
    pub source: PathBuf,
    /// Directory receiving the extracted MKV.
    pub output_dir: PathBuf,
    /// Title index to extract, as enumerated by `scan`.
    pub title_index: u32,
    /// Minimum title length filter, in seconds.
    pub min_length_seconds: u32,
}

/// Driver for the makemkvcon binary.
#[derive(Debug, Clone)]
pub struct Extractor {
    makemkvcon: PathBuf,
}

impl Extractor {
    /// Create a driver for the given binary location, logging (not failing)
    /// when it is absent.
    pub fn new<P: Into<PathBuf>>(makemkvcon: P) -> Self {
        let extractor = Self {
            makemkvcon: makemkvcon.into(),
        };
        process::note_tool_presence("makemkvcon", &extractor.makemkvcon);
        extractor
    }

    /// Scan a disc or disc image, returning the enumerated titles.
    ///
    /// Parsing is best-effort: unknown lines are tolerated and a disc with
    /// no recognizable titles comes back with an empty title list.
    pub async fn scan(&self, source: &Path, cancel: CancellationToken) -> Result<DiscInfo> {
        let args = scan_args(source);
        let lines = self.run_collecting(&args, cancel, None::<fn(u8)>).await?;
        let info = parser::parse_disc_info(lines.iter().map(String::as_str));
        debug!(
            "scanned {}: disc {:?}, {} titles",
            source.display(),
            info.disc_name,
            info.titles.len()
        );
        Ok(info)
    }

    /// Extract one title to MKV, forwarding progress as a percentage.
    ///
    /// The callback runs on the stdout-reader task and must not block.
    pub async fn extract<F>(
        &self,
        options: &ExtractOptions,
        cancel: CancellationToken,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(u8) + Send + 'static,
    {
        let args = extract_args(options);
        self.run_collecting(&args, cancel, Some(on_progress)).await?;
        Ok(())
    }

    /// Spawn the tool, stream stdout through the robot parser, wait for
    /// exit. Returns all output lines for callers that parse records.
    async fn run_collecting<F>(
        &self,
        args: &[String],
        cancel: CancellationToken,
        on_progress: Option<F>,
    ) -> Result<Vec<String>>
    where
        F: Fn(u8) + Send + 'static,
    {
        let mut child = process::spawn_tool(&self.makemkvcon, args)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OptimarrError::tool("makemkvcon", "stdout pipe unavailable"))?;

        let reader = tokio::spawn(async move {
            let mut collected = Vec::new();
            let mut failure: Option<String> = None;
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parser::parse_line(&line) {
                    Some(RobotRecord::Progress { total, max, .. }) => {
                        if let Some(cb) = on_progress.as_ref() {
                            if max > 0 {
                                let pct = ((total as f64 / max as f64) * 100.0).round();
                                cb(pct.clamp(0.0, 100.0) as u8);
                            }
                        }
                    }
                    Some(RobotRecord::Message { code, ref text }) if code == MSG_COPY_FAILED => {
                        failure = Some(text.clone());
                    }
                    _ => {}
                }
                collected.push(line);
            }
            (collected, failure)
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
        let (collected, failure) = reader.await.unwrap_or_default();

        if cancel_requested {
            return Err(OptimarrError::Cancelled);
        }
        if let Some(message) = failure {
            return Err(OptimarrError::tool("makemkvcon", message));
        }
        if !status.success() {
            let tail: Vec<_> = collected
                .iter()
                .rev()
                .take(process::OUTPUT_TAIL_LINES)
                .rev()
                .cloned()
                .collect();
            return Err(OptimarrError::tool(
                "makemkvcon",
                format!(
                    "exit status {}: {}",
                    status.code().unwrap_or(-1),
                    tail.join("\n")
                ),
            ));
        }
        Ok(collected)
    }
}

/// Argument vector for information mode.
fn scan_args(source: &Path) -> Vec<String> {
    vec![
        "-r".to_string(),
        "info".to_string(),
        format!("file:{}", source.display()),
    ]
}

/// Argument vector for robot-mode extraction of one title.
fn extract_args(options: &ExtractOptions) -> Vec<String> {
    vec![
        "-r".to_string(),
        "--progress=-same".to_string(),
        "mkv".to_string(),
        format!("file:{}", options.source.display()),
        options.title_index.to_string(),
        options.output_dir.to_string_lossy().into_owned(),
        "--minlength".to_string(),
        options.min_length_seconds.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_argv_contract() {
        let args = scan_args(Path::new("/in/movie.iso"));
        assert_eq!(args, ["-r", "info", "file:/in/movie.iso"]);
    }

    #[test]
    fn test_extract_argv_contract() {
        let options = ExtractOptions {
            source: PathBuf::from("/in/movie.iso"),
            output_dir: PathBuf::from("/out/extract_x"),
            title_index: 1,
            min_length_seconds: 600,
        };
        let args = extract_args(&options);
        assert_eq!(args[0], "-r");
        assert_eq!(args[2], "mkv");
        assert_eq!(args[3], "file:/in/movie.iso");
        assert_eq!(args[4], "1");
        assert_eq!(args[5], "/out/extract_x");
        assert_eq!(&args[6..], ["--minlength", "600"]);
    }

    #[tokio::test]
    async fn test_missing_binary_surfaces_as_tool_missing() {
        let extractor = Extractor::new("/nonexistent/makemkvcon");
        let err = extractor
            .scan(Path::new("/in/movie.iso"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OptimarrError::ToolMissing(_)));
    }
}
