//! FFmpeg `-progress` output parsing.

/// Snapshot of an FFmpeg run, updated from `-progress pipe:2` key/value lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one line of progress output into the snapshot.
    ///
    /// Returns a copy of the snapshot when the line closes a progress block.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            // Despite the name, ffmpeg reports microseconds here too.
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }

    /// Fraction of `total_secs` rendered so far, in [0, 1].
    pub fn fraction_of(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / 1000.0 / total_secs).clamp(0.0, 1.0)
    }
}

/// Whether a stderr line belongs to the progress protocol rather than a log message.
pub fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => !key.is_empty() && key.bytes().all(|b| b.is_ascii_lowercase() || b == b'_' || b.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(progress.apply_line("frame=120").is_none());
        assert!(progress.apply_line("out_time_us=5000000").is_none());
        assert!(progress.apply_line("speed=1.5x").is_none());
        let snapshot = progress.apply_line("progress=continue").unwrap();

        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.is_complete);

        assert!(progress.apply_line("progress=end").unwrap().is_complete);
    }

    #[test]
    fn test_speed_not_available_is_ignored() {
        let mut progress = FfmpegProgress::default();
        progress.apply_line("speed=N/A");
        assert_eq!(progress.speed, 0.0);
    }

    #[test]
    fn test_fraction_of_total() {
        let progress = FfmpegProgress {
            out_time_ms: 22_500,
            ..Default::default()
        };
        assert!((progress.fraction_of(45.0) - 0.5).abs() < 1e-9);
        assert_eq!(progress.fraction_of(10.0), 1.0);
        assert_eq!(progress.fraction_of(0.0), 0.0);
    }

    #[test]
    fn test_log_lines_are_not_progress() {
        assert!(is_progress_line("out_time_us=100"));
        assert!(!is_progress_line("[libx264 @ 0x55] error: something"));
        assert!(!is_progress_line("Error opening input file clip.mp4."));
    }
}
