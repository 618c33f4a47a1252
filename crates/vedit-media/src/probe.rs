//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds (0 when the container reports none, e.g. stills)
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    if video.is_none() && !has_audio {
        return Err(MediaError::invalid_media("No audio or video stream found"));
    }

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    let fps = video
        .and_then(|v| {
            v.avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| v.r_frame_rate.as_deref().and_then(parse_frame_rate))
        })
        .unwrap_or(30.0);

    Ok(MediaInfo {
        duration,
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        has_video: video.is_some(),
        has_audio,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). Zero rates are rejected.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_video_with_audio() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "25/1"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video && info.has_audio);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.duration - 12.48).abs() < 1e-9);
        assert!((info.fps - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_still_image() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 800, "height": 600, "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 0.0);
        assert!(!info.has_audio);
        assert!((info.fps - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_audio_only() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "180.0"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.duration, 180.0);
    }

    #[test]
    fn test_parse_no_streams_is_invalid() {
        let json = br#"{"streams": [], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidMedia(_))
        ));
    }
}
