//! Configuration validation.
//!
//! Checks value domains and cross-field consistency after deserialization.
//! Validation failures surface as `OptimarrError::Config`.

use crate::Result;
use crate::error::OptimarrError;

use super::{AppConfig, ScanMode};

/// Valid domain of the constant-quality level.
pub const QUALITY_MIN: u8 = 10;
/// Upper bound of the constant-quality level.
pub const QUALITY_MAX: u8 = 51;

/// Validate a fully-deserialized configuration.
pub fn validate_config(cfg: &AppConfig) -> Result<()> {
    if cfg.general.worker_count == 0 {
        return Err(OptimarrError::config("worker_count must be at least 1"));
    }
    if cfg.general.worker_count > num_cpus::get().max(2) * 4 {
        return Err(OptimarrError::config(format!(
            "worker_count {} is unreasonably high for {} CPUs",
            cfg.general.worker_count,
            num_cpus::get()
        )));
    }
    validate_quality_level(cfg.transcode.quality_level)?;
    if !(0.0..=2.0).contains(&cfg.ai.temperature) {
        return Err(OptimarrError::config(
            "ai.temperature must be within [0.0, 2.0]",
        ));
    }
    if cfg.ai.timeout_seconds == 0 {
        return Err(OptimarrError::config("ai.timeout_seconds must be non-zero"));
    }
    validate_scanner(cfg)?;
    Ok(())
}

/// Check the constant-quality level against its domain.
pub fn validate_quality_level(level: u8) -> Result<()> {
    if !(QUALITY_MIN..=QUALITY_MAX).contains(&level) {
        return Err(OptimarrError::config(format!(
            "quality_level {} outside valid domain [{}, {}]",
            level, QUALITY_MIN, QUALITY_MAX
        )));
    }
    Ok(())
}

fn validate_scanner(cfg: &AppConfig) -> Result<()> {
    let scanner = &cfg.scanner;
    if matches!(scanner.mode, ScanMode::Periodic | ScanMode::Hybrid) && scanner.interval_seconds == 0
    {
        return Err(OptimarrError::config(
            "scanner.interval_seconds must be non-zero in periodic or hybrid mode",
        ));
    }
    for dir in &scanner.watch_dirs {
        if dir.path.as_os_str().is_empty() {
            return Err(OptimarrError::config("watch directory path must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchDirectory;
    use std::path::PathBuf;

    #[test]
    fn test_quality_domain() {
        assert!(validate_quality_level(10).is_ok());
        assert!(validate_quality_level(51).is_ok());
        assert!(validate_quality_level(9).is_err());
        assert!(validate_quality_level(52).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut cfg = AppConfig::default();
        cfg.general.worker_count = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_periodic_requires_interval() {
        let mut cfg = AppConfig::default();
        cfg.scanner.mode = ScanMode::Periodic;
        cfg.scanner.interval_seconds = 0;
        assert!(validate_config(&cfg).is_err());
        cfg.scanner.interval_seconds = 60;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_empty_watch_dir_rejected() {
        let mut cfg = AppConfig::default();
        cfg.scanner.watch_dirs.push(WatchDirectory {
            path: PathBuf::new(),
            ..Default::default()
        });
        assert!(validate_config(&cfg).is_err());
    }
}
