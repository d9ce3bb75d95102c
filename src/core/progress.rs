//! Structured progress extraction from encoder stderr streams.
//!
//! The transcoder emits key-value statistics lines on stderr
//! (`frame= 1234 fps= 48 ... time=00:30:00.00 ... speed=2.0x`). A
//! `ProgressParser` consumes those lines one at a time, accumulates the
//! fields it recognizes, and derives the percentage and remaining-time
//! metrics the job manager publishes. Fields missing from a given line carry
//! over from the previous one.

use once_cell::sync::Lazy;
use regex::Regex;

static FRAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static FPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"fps=\s*([\d.]+)").unwrap());
static BITRATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"bitrate=\s*(\S+)").unwrap());
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"size=\s*(\S+)").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"time=(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());
static SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"speed=\s*([\d.]+)x").unwrap());

/// One parsed progress frame.
///
/// Carries the raw encoder fields plus the derived `percentage` and `eta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEvent {
    /// Frames encoded so far.
    pub frame: u64,
    /// Current encoding rate in frames per second.
    pub fps: f32,
    /// Encoder-reported bitrate text (e.g. "1987.2kbits/s").
    pub bitrate: String,
    /// Encoder-reported output size text (e.g. "34816KiB").
    pub size: String,
    /// Position in the stream, `H:MM:SS.ms`.
    pub time: String,
    /// Encoding speed relative to realtime.
    pub speed: f32,
    /// Completion percentage in [0, 100]; 0 when the total duration is
    /// unknown.
    pub percentage: u8,
    /// Remaining wall-clock time, `HH:MM:SS`.
    pub eta: String,
}

/// Line-oriented parser over an encoder's stderr stream.
#[derive(Debug)]
pub struct ProgressParser {
    total_duration_seconds: f64,
    current: ProgressEvent,
    seen_frame: bool,
}

impl ProgressParser {
    /// Create a parser for a stream whose media runs `total_duration_seconds`.
    ///
    /// A zero total disables percentage and ETA derivation.
    pub fn new(total_duration_seconds: f64) -> Self {
        Self {
            total_duration_seconds,
            current: ProgressEvent {
                eta: "00:00:00".to_string(),
                ..Default::default()
            },
            seen_frame: false,
        }
    }

    /// Feed one stderr line.
    ///
    /// Returns the updated event once the `frame` field has appeared at
    /// least once; earlier lines (banner and stream metadata) yield `None`.
    pub fn push_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if let Some(caps) = FRAME_RE.captures(line) {
            if let Ok(frame) = caps[1].parse() {
                self.current.frame = frame;
                self.seen_frame = true;
            }
        }
        if let Some(caps) = FPS_RE.captures(line) {
            if let Ok(fps) = caps[1].parse() {
                self.current.fps = fps;
            }
        }
        if let Some(caps) = BITRATE_RE.captures(line) {
            self.current.bitrate = caps[1].to_string();
        }
        if let Some(caps) = SIZE_RE.captures(line) {
            self.current.size = caps[1].to_string();
        }
        if let Some(caps) = TIME_RE.captures(line) {
            self.current.time = caps[1].to_string();
            self.derive_metrics();
        }
        if let Some(caps) = SPEED_RE.captures(line) {
            if let Ok(speed) = caps[1].parse() {
                self.current.speed = speed;
            }
            self.derive_metrics();
        }

        if self.seen_frame {
            Some(self.current.clone())
        } else {
            None
        }
    }

    fn derive_metrics(&mut self) {
        let current_seconds = parse_hms(&self.current.time);
        if self.total_duration_seconds > 0.0 {
            let pct = (100.0 * current_seconds / self.total_duration_seconds).round();
            self.current.percentage = pct.clamp(0.0, 100.0) as u8;
            let speed = if self.current.speed > 0.0 {
                self.current.speed as f64
            } else {
                1.0
            };
            let remaining = (self.total_duration_seconds - current_seconds) / speed;
            self.current.eta = format_hms(remaining);
        } else {
            self.current.percentage = 0;
            self.current.eta = "00:00:00".to_string();
        }
    }
}

/// Parse `H:MM:SS[.ms]` into seconds; malformed input yields 0.
pub fn parse_hms(text: &str) -> f64 {
    let mut parts = text.split(':');
    let (h, m, s) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(s)) => (h, m, s),
        _ => return 0.0,
    };
    let h: f64 = h.parse().unwrap_or(0.0);
    let m: f64 = m.parse().unwrap_or(0.0);
    let s: f64 = s.parse().unwrap_or(0.0);
    h * 3600.0 + m * 60.0 + s
}

/// Format seconds as `HH:MM:SS`; non-positive input yields `00:00:00`.
pub fn format_hms(seconds: f64) -> String {
    if seconds <= 0.0 || !seconds.is_finite() {
        return "00:00:00".to_string();
    }
    let total = seconds.round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS_LINE: &str = "frame= 1440 fps= 48.0 q=28.0 size=   34816KiB time=00:30:00.00 bitrate=1987.2kbits/s speed=2.0x";

    #[test]
    fn test_halfway_at_double_speed() {
        let mut parser = ProgressParser::new(3600.0);
        let event = parser.push_line(STATS_LINE).unwrap();
        assert_eq!(event.percentage, 50);
        assert_eq!(event.eta, "00:15:00");
        assert_eq!(event.frame, 1440);
        assert_eq!(event.fps, 48.0);
        assert_eq!(event.speed, 2.0);
    }

    #[test]
    fn test_unknown_duration_disables_derivation() {
        let mut parser = ProgressParser::new(0.0);
        let event = parser.push_line(STATS_LINE).unwrap();
        assert_eq!(event.percentage, 0);
        assert_eq!(event.eta, "00:00:00");
    }

    #[test]
    fn test_no_event_before_first_frame() {
        let mut parser = ProgressParser::new(3600.0);
        assert!(parser.push_line("Stream #0:0: Video: h264").is_none());
        assert!(parser.push_line("  Duration: 01:00:00.00").is_none());
        assert!(parser.push_line(STATS_LINE).is_some());
    }

    #[test]
    fn test_fields_carry_over() {
        let mut parser = ProgressParser::new(3600.0);
        parser.push_line(STATS_LINE).unwrap();
        // A line carrying only a new time keeps frame/fps from before.
        let event = parser.push_line("time=00:45:00.00").unwrap();
        assert_eq!(event.frame, 1440);
        assert_eq!(event.fps, 48.0);
        assert_eq!(event.percentage, 75);
    }

    #[test]
    fn test_speed_defaults_to_realtime() {
        let mut parser = ProgressParser::new(100.0);
        let event = parser
            .push_line("frame= 10 fps= 25.0 time=0:00:50.00")
            .unwrap();
        // No speed field seen yet: remaining 50s at 1x.
        assert_eq!(event.eta, "00:00:50");
        assert_eq!(event.percentage, 50);
    }

    #[test]
    fn test_percentage_clamped() {
        let mut parser = ProgressParser::new(10.0);
        let event = parser
            .push_line("frame= 900 time=0:00:30.00 speed=1.0x")
            .unwrap();
        assert_eq!(event.percentage, 100);
        assert_eq!(event.eta, "00:00:00");
    }

    #[test]
    fn test_parse_hms() {
        assert_eq!(parse_hms("1:00:00"), 3600.0);
        assert_eq!(parse_hms("0:01:30.50"), 90.5);
        assert_eq!(parse_hms("garbage"), 0.0);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(900.0), "00:15:00");
        assert_eq!(format_hms(0.0), "00:00:00");
        assert_eq!(format_hms(-5.0), "00:00:00");
        assert_eq!(format_hms(3661.0), "01:01:01");
    }
}
