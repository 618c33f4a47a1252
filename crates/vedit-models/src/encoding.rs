//! Output encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Output canvas: every clip is scaled and padded to this size.
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 24;

/// Encoding configuration for the final render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_width() -> u32 {
    DEFAULT_WIDTH
}
fn default_height() -> u32 {
    DEFAULT_HEIGHT
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl EncodingConfig {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            codec: std::env::var("VIDEO_CODEC").unwrap_or(defaults.codec),
            preset: std::env::var("VIDEO_PRESET").unwrap_or(defaults.preset),
            crf: env_parse("VIDEO_CRF").unwrap_or(defaults.crf),
            audio_codec: std::env::var("AUDIO_CODEC").unwrap_or(defaults.audio_codec),
            audio_bitrate: std::env::var("AUDIO_BITRATE").unwrap_or(defaults.audio_bitrate),
            width: env_parse("RENDER_WIDTH").unwrap_or(defaults.width),
            height: env_parse("RENDER_HEIGHT").unwrap_or(defaults.height),
            fps: env_parse("RENDER_FPS").unwrap_or(defaults.fps),
        }
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 23);
        assert_eq!((config.width, config.height, config.fps), (1280, 720, 24));
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().with_crf(20).to_ffmpeg_args();
        let pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[pos + 1], "20");
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "24"));
    }
}
