//! Engine progress parsing (`-progress pipe:2`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Keys FFmpeg emits in `-progress` blocks. Anything else on stderr is a
/// diagnostic.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Progress snapshot reported at the end of each `-progress` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineProgress {
    /// Output position reached so far
    pub elapsed: Duration,
    /// 0..=100 against the expected output duration; 0 when unknown
    pub percent: f64,
    pub frame: u64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(EngineProgress) + Send + 'static>;

/// Accumulates one `-progress` block at a time.
#[derive(Debug, Default)]
pub(crate) struct ProgressParser {
    expected_ms: Option<u64>,
    out_time_ms: u64,
    frame: u64,
    speed: f64,
}

impl ProgressParser {
    pub(crate) fn new(expected: Option<Duration>) -> Self {
        Self {
            expected_ms: expected.map(|d| d.as_millis() as u64),
            ..Self::default()
        }
    }

    /// Fold one line in; returns a snapshot at the end of each block.
    pub(crate) fn feed(&mut self, line: &str) -> Option<EngineProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // FFmpeg reports microseconds under both names
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = (us.max(0) / 1000) as u64;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => return Some(self.snapshot(value == "end")),
            _ => {}
        }
        None
    }

    fn snapshot(&self, is_complete: bool) -> EngineProgress {
        let percent = if is_complete {
            100.0
        } else {
            match self.expected_ms {
                Some(total) if total > 0 => (self.out_time_ms as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
                _ => 0.0,
            }
        };
        EngineProgress {
            elapsed: Duration::from_millis(self.out_time_ms),
            percent,
            frame: self.frame,
            speed: self.speed,
            is_complete,
        }
    }
}

/// Whether a stderr line belongs to a progress block.
pub(crate) fn is_progress_line(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => PROGRESS_KEYS.contains(&key) || key.starts_with("stream_"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_parsing() {
        let mut parser = ProgressParser::new(Some(Duration::from_secs(10)));
        assert!(parser.feed("frame=120").is_none());
        assert!(parser.feed("out_time_us=4000000").is_none());
        assert!(parser.feed("speed=2.5x").is_none());
        assert!(parser.feed("speed=N/A").is_none());

        let snapshot = parser.feed("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.elapsed, Duration::from_secs(4));
        assert!((snapshot.percent - 40.0).abs() < 1e-9);
        assert!((snapshot.speed - 2.5).abs() < f64::EPSILON);
        assert!(!snapshot.is_complete);

        let last = parser.feed("progress=end").unwrap();
        assert!(last.is_complete);
        assert_eq!(last.percent, 100.0);
    }

    #[test]
    fn test_percent_without_expected_duration() {
        let mut parser = ProgressParser::new(None);
        parser.feed("out_time_ms=2000000");
        let snapshot = parser.feed("progress=continue").unwrap();
        assert_eq!(snapshot.percent, 0.0);
        assert_eq!(snapshot.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut parser = ProgressParser::new(Some(Duration::from_secs(1)));
        parser.feed("out_time_us=3000000");
        assert_eq!(parser.feed("progress=continue").unwrap().percent, 100.0);
    }

    #[test]
    fn test_diagnostics_are_not_progress() {
        assert!(is_progress_line("out_time=00:00:01.000000"));
        assert!(is_progress_line("stream_0_0_q=28.0"));
        assert!(!is_progress_line("[Parsed_eq_0 @ 0x55] Invalid value 'x' for option 'contrast'"));
        assert!(!is_progress_line("Error initializing filter 'drawtext' with args 'text=a=b'"));
    }
}
