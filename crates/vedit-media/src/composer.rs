//! Final video composition.
//!
//! Rendering runs in two FFmpeg passes:
//!
//! 1. Every clip is cut from its source and normalized to the output canvas,
//!    frame rate and audio layout, with the speed change and colour filter
//!    baked in. A clip that fails here is dropped with a warning.
//! 2. The normalized clips are joined (straight concat or crossfade), the
//!    final clip is repeated when the timeline is short of the target, text
//!    overlays and music are layered on, and the result is trimmed and
//!    encoded in one pass.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use vedit_models::{
    AssetKind, ClipSpec, Directive, EncodingConfig, OverlayPosition, TextOverlay, Transition,
};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::FramePipeline;
use crate::probe::probe_media;

/// Gain applied to the clips' own audio when music is mixed in.
pub const ORIGINAL_AUDIO_GAIN: f64 = 0.3;
/// Gain applied to the music track when mixed with clip audio.
pub const MUSIC_GAIN: f64 = 0.7;

const OVERLAY_FONT_SIZE: u32 = 40;
const MAX_CROSSFADE_SECS: f64 = 0.5;
const SILENCE_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";
const AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:sample_rates=44100:channel_layouts=stereo";

/// Composer settings.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub encoding: EncodingConfig,
    /// Directory holding `{mood}.mp3` tracks
    pub music_dir: PathBuf,
    /// Font for text overlays; fontconfig default when unset
    pub font_file: Option<PathBuf>,
    pub ffmpeg_timeout_secs: u64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            music_dir: PathBuf::from("assets/music"),
            font_file: None,
            ffmpeg_timeout_secs: 900,
        }
    }
}

impl ComposerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            encoding: EncodingConfig::from_env(),
            music_dir: std::env::var("MUSIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.music_dir),
            font_file: std::env::var("OVERLAY_FONT_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            ffmpeg_timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ffmpeg_timeout_secs),
        }
    }
}

/// What a successful render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    /// Clips that survived extraction
    pub clips_rendered: usize,
    /// Times the final clip was repeated to reach the target
    pub repeats: usize,
    /// Output duration in seconds
    pub duration: f64,
    pub music_applied: bool,
}

/// Renders selected clips into one encoded file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        clips: &[ClipSpec],
        directive: &Directive,
        output: &Path,
    ) -> MediaResult<RenderOutcome>;
}

/// How the normalized clips are laid out on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePlan {
    /// Extra copies of the last clip appended to the sequence
    pub repeat_last: usize,
    /// Exact output duration
    pub output_duration: f64,
}

/// Decide looping and trimming for clip `durations` joined with `overlap` seconds of crossfade.
///
/// Short timelines repeat the final clip the fewest whole times needed to
/// reach `target`; any timeline with a target is trimmed to exactly it.
pub fn plan_timeline(durations: &[f64], target: Option<f64>, overlap: f64) -> TimelinePlan {
    let joins = durations.len().saturating_sub(1) as f64;
    let total = durations.iter().sum::<f64>() - overlap * joins;

    let Some(target) = target.filter(|t| *t > 0.0) else {
        return TimelinePlan {
            repeat_last: 0,
            output_duration: total.max(0.0),
        };
    };

    let repeat_last = match durations.last() {
        Some(&last) if total < target => {
            let step = last - overlap;
            if step > 0.0 {
                ((target - total) / step).ceil() as usize
            } else {
                0
            }
        }
        _ => 0,
    };

    TimelinePlan {
        repeat_last,
        output_duration: target,
    }
}

/// Crossfade length for a sequence, zero when the transition is a hard cut.
pub fn crossfade_overlap(transition: Transition, durations: &[f64]) -> f64 {
    if !transition.crossfades() {
        return 0.0;
    }
    durations
        .iter()
        .copied()
        .reduce(f64::min)
        .map(|shortest| (shortest / 2.0).min(MAX_CROSSFADE_SECS))
        .unwrap_or(0.0)
}

/// Join graph over inputs `0..durations.len()`, producing `[vcat]` and `[acat]`.
pub fn join_graph(durations: &[f64], transition: Transition, overlap: f64) -> String {
    let n = durations.len();
    if n < 2 || overlap <= 0.0 {
        let pads: String = (0..n).map(|i| format!("[{i}:v][{i}:a]")).collect();
        return format!("{pads}concat=n={n}:v=1:a=1[vcat][acat]");
    }

    let kind = match transition {
        Transition::Dissolve => "dissolve",
        _ => "fade",
    };

    let mut parts: Vec<String> = (0..n).map(|i| format!("[{i}:v]settb=AVTB[v{i}]")).collect();
    let mut offset = 0.0;
    let mut video_prev = "v0".to_string();
    let mut audio_prev = "0:a".to_string();
    for i in 1..n {
        offset += durations[i - 1] - overlap;
        let last = i == n - 1;
        let video_out = if last { "vcat".to_string() } else { format!("x{i}") };
        let audio_out = if last { "acat".to_string() } else { format!("ax{i}") };
        parts.push(format!(
            "[{video_prev}][v{i}]xfade=transition={kind}:duration={overlap:.3}:offset={offset:.3}[{video_out}]"
        ));
        parts.push(format!(
            "[{audio_prev}][{i}:a]acrossfade=d={overlap:.3}[{audio_out}]"
        ));
        video_prev = video_out;
        audio_prev = audio_out;
    }
    parts.join(";")
}

/// Quote a filter option value.
fn quote_filter_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// One drawtext filter reading its text from `text_file`.
pub fn drawtext_filter(overlay: &TextOverlay, text_file: &Path, font_file: Option<&Path>) -> String {
    let y = match overlay.position {
        OverlayPosition::Top => "h*0.1",
        OverlayPosition::Center => "(h-text_h)/2",
        OverlayPosition::Bottom => "h*0.9",
    };
    let enable = match overlay.duration {
        Some(duration) => format!(
            "between(t,{:.3},{:.3})",
            overlay.start,
            overlay.start + duration
        ),
        None => format!("gte(t,{:.3})", overlay.start),
    };

    let mut filter = format!(
        "drawtext=textfile={}:expansion=none:fontsize={}:fontcolor=white:x=(w-text_w)/2:y={}:enable='{}'",
        quote_filter_value(&text_file.to_string_lossy()),
        OVERLAY_FONT_SIZE,
        y,
        enable
    );
    if let Some(font) = font_file {
        filter.push_str(&format!(":fontfile={}", quote_filter_value(&font.to_string_lossy())));
    }
    filter
}

/// Audio tail of the final graph, producing `[aout]` from `[acat]` and the music input.
///
/// When the clips are silent the music plays alone and `[acat]` is sunk, since
/// ffmpeg rejects graphs with unconnected outputs.
pub fn music_graph(music_input: usize, clips_have_audio: bool) -> String {
    if clips_have_audio {
        format!(
            "[acat]volume={ORIGINAL_AUDIO_GAIN}[orig];[{music_input}:a]{AUDIO_FORMAT},volume={MUSIC_GAIN}[mus];\
             [orig][mus]amix=inputs=2:duration=first:normalize=0[aout]"
        )
    } else {
        format!("[acat]anullsink;[{music_input}:a]{AUDIO_FORMAT}[aout]")
    }
}

/// Video and audio chains that normalize one clip.
fn normalize_chains(encoding: &EncodingConfig, speed: f64, colour: Option<&str>) -> (String, String) {
    let (w, h) = (encoding.width, encoding.height);
    let mut video = Vec::new();
    if (speed - 1.0).abs() > f64::EPSILON {
        video.push(format!("setpts=PTS/{speed}"));
    }
    video.push(format!("scale={w}:{h}:force_original_aspect_ratio=decrease"));
    video.push(format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"));
    video.push("setsar=1".to_string());
    video.push(format!("fps={}", encoding.fps));
    if let Some(colour) = colour {
        video.push(colour.to_string());
    }
    video.push("format=yuv420p".to_string());

    let mut audio = Vec::new();
    if (speed - 1.0).abs() > f64::EPSILON {
        audio.push(format!("atempo={speed}"));
    }
    audio.push(AUDIO_FORMAT.to_string());

    (video.join(","), audio.join(","))
}

/// A clip after the normalization pass.
#[derive(Debug, Clone)]
struct PreparedClip {
    path: PathBuf,
    duration: f64,
    has_audio: bool,
}

/// FFmpeg-backed [`Renderer`].
#[derive(Debug, Clone)]
pub struct Composer {
    config: ComposerConfig,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout_secs)
    }

    /// Compose `clips` in order into `output`.
    pub async fn compose(
        &self,
        clips: &[ClipSpec],
        directive: &Directive,
        output: &Path,
    ) -> MediaResult<RenderOutcome> {
        let scratch_parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix("render_")
            .tempdir_in(scratch_parent)?;

        let speed = directive.speed.factor();
        let colour = FramePipeline::for_filter(directive.filter).to_ffmpeg_filter();

        let mut prepared = Vec::with_capacity(clips.len());
        for (index, clip) in clips.iter().enumerate() {
            let target = scratch.path().join(format!("clip_{index:03}.mp4"));
            match self.prepare_clip(clip, speed, colour.as_deref(), &target).await {
                Ok(p) => prepared.push(p),
                Err(e) => warn!(
                    source = %clip.source.display(),
                    start = clip.start,
                    end = clip.end,
                    error = %e,
                    "Dropping clip that failed to extract"
                ),
            }
        }

        if prepared.is_empty() {
            return Err(MediaError::NoClips);
        }

        let durations: Vec<f64> = prepared.iter().map(|c| c.duration).collect();
        let overlap = crossfade_overlap(directive.transition, &durations);
        let plan = plan_timeline(&durations, directive.target_seconds(), overlap);

        let mut sequence = prepared.clone();
        if let Some(last) = prepared.last() {
            sequence.extend(std::iter::repeat(last.clone()).take(plan.repeat_last));
        }
        let sequence_durations: Vec<f64> = sequence.iter().map(|c| c.duration).collect();

        let mut graph = vec![join_graph(&sequence_durations, directive.transition, overlap)];

        let overlays = self.overlay_chain(&directive.text_overlays, scratch.path()).await?;
        graph.push(match overlays {
            Some(chain) => format!("[vcat]{chain}[vout]"),
            None => "[vcat]null[vout]".to_string(),
        });

        let mut cmd = sequence
            .iter()
            .fold(FfmpegCommand::new(output), |cmd, clip| cmd.input(&clip.path));

        let music = self.resolve_music(directive).await;
        let audio_label = match &music {
            Some(track) => {
                let music_input = cmd.input_count();
                cmd = cmd.input_with_args(["-stream_loop", "-1"], track);
                let has_audio = prepared.iter().any(|c| c.has_audio);
                graph.push(music_graph(music_input, has_audio));
                "[aout]"
            }
            None => "[acat]",
        };

        let cmd = cmd
            .filter_complex(graph.join(";"))
            .map("[vout]")
            .map(audio_label)
            .duration(plan.output_duration)
            .encoding(&self.config.encoding);

        info!(
            clips = prepared.len(),
            repeats = plan.repeat_last,
            overlap,
            duration = plan.output_duration,
            music = music.is_some(),
            "Encoding final video"
        );
        self.runner().run(&cmd).await?;

        Ok(RenderOutcome {
            clips_rendered: prepared.len(),
            repeats: plan.repeat_last,
            duration: plan.output_duration,
            music_applied: music.is_some(),
        })
    }

    /// Cut and normalize one clip into `target`.
    async fn prepare_clip(
        &self,
        clip: &ClipSpec,
        speed: f64,
        colour: Option<&str>,
        target: &Path,
    ) -> MediaResult<PreparedClip> {
        let span = clip.duration();
        if !span.is_finite() || span <= 0.0 {
            return Err(MediaError::invalid_media(format!(
                "empty interval {:.3}..{:.3}",
                clip.start, clip.end
            )));
        }
        if !clip.source.exists() {
            return Err(MediaError::FileNotFound(clip.source.clone()));
        }

        let (cmd, has_audio) = match clip.kind {
            AssetKind::Image => (
                FfmpegCommand::new(target).input_with_args(
                    ["-loop".to_string(), "1".to_string(), "-t".to_string(), format!("{span:.3}")],
                    &clip.source,
                ),
                false,
            ),
            AssetKind::Video => {
                let info = probe_media(&clip.source).await?;
                if !info.has_video {
                    return Err(MediaError::invalid_media("no video stream"));
                }
                (
                    FfmpegCommand::new(target).input_with_args(
                        [
                            "-ss".to_string(),
                            format!("{:.3}", clip.start),
                            "-t".to_string(),
                            format!("{span:.3}"),
                        ],
                        &clip.source,
                    ),
                    info.has_audio,
                )
            }
        };

        let (video_chain, audio_chain) = normalize_chains(&self.config.encoding, speed, colour);
        let (cmd, audio_source) = if has_audio {
            (cmd, "0:a")
        } else {
            (cmd.lavfi_input(SILENCE_SOURCE), "1:a")
        };

        let expected = span / speed;
        let cmd = cmd
            .filter_complex(format!(
                "[0:v]{video_chain}[v];[{audio_source}]{audio_chain}[a]"
            ))
            .map("[v]")
            .map("[a]")
            .duration(expected)
            .encoding(&self.config.encoding);

        self.runner().run(&cmd).await?;

        // Sources can end before the requested interval does.
        let duration = match probe_media(target).await {
            Ok(info) if info.duration > 0.0 => info.duration.min(expected),
            _ => expected,
        };
        debug!(source = %clip.source.display(), duration, "Clip prepared");

        Ok(PreparedClip {
            path: target.to_path_buf(),
            duration,
            has_audio,
        })
    }

    /// Drawtext chain for every overlay; text is written to files in `scratch`.
    async fn overlay_chain(&self, overlays: &[TextOverlay], scratch: &Path) -> MediaResult<Option<String>> {
        if overlays.is_empty() {
            return Ok(None);
        }
        let mut filters = Vec::with_capacity(overlays.len());
        for (index, overlay) in overlays.iter().enumerate() {
            let text_file = scratch.join(format!("overlay_{index:02}.txt"));
            tokio::fs::write(&text_file, overlay.text.as_bytes()).await?;
            filters.push(drawtext_filter(
                overlay,
                &text_file,
                self.config.font_file.as_deref(),
            ));
        }
        Ok(Some(filters.join(",")))
    }

    /// Music track for the directive's mood, if present and readable.
    async fn resolve_music(&self, directive: &Directive) -> Option<PathBuf> {
        let file_name = directive.music_mood.asset_file_name()?;
        let path = self.config.music_dir.join(file_name);

        if !path.exists() {
            warn!(mood = %directive.music_mood, path = %path.display(), "Music track missing, continuing without music");
            return None;
        }
        match probe_media(&path).await {
            Ok(info) if info.has_audio => Some(path),
            Ok(_) => {
                warn!(path = %path.display(), "Music track has no audio stream, continuing without music");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Music track unreadable, continuing without music");
                None
            }
        }
    }
}

#[async_trait]
impl Renderer for Composer {
    async fn render(
        &self,
        clips: &[ClipSpec],
        directive: &Directive,
        output: &Path,
    ) -> MediaResult<RenderOutcome> {
        self.compose(clips, directive, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::{MusicMood, Speed};

    #[test]
    fn test_short_timeline_loops_last_clip_to_target() {
        // 20s of clips against a 45s target
        let plan = plan_timeline(&[8.0, 12.0], Some(45.0), 0.0);
        assert_eq!(plan.repeat_last, 3);
        assert_eq!(plan.output_duration, 45.0);
        assert!(8.0 + 12.0 * (1 + plan.repeat_last) as f64 >= 45.0);
    }

    #[test]
    fn test_long_timeline_trims_to_target() {
        let plan = plan_timeline(&[30.0, 40.0], Some(45.0), 0.0);
        assert_eq!(plan.repeat_last, 0);
        assert_eq!(plan.output_duration, 45.0);
    }

    #[test]
    fn test_no_target_keeps_natural_length() {
        let plan = plan_timeline(&[5.0, 7.5], None, 0.0);
        assert_eq!(plan.repeat_last, 0);
        assert_eq!(plan.output_duration, 12.5);
    }

    #[test]
    fn test_crossfade_overlap_counts_against_timeline() {
        // 3 x 10s with 0.5s fades = 29s, one extra clip adds 9.5s
        let plan = plan_timeline(&[10.0, 10.0, 10.0], Some(30.0), 0.5);
        assert_eq!(plan.repeat_last, 1);

        let exact = plan_timeline(&[10.0, 10.0, 10.0], Some(29.0), 0.5);
        assert_eq!(exact.repeat_last, 0);
    }

    #[test]
    fn test_crossfade_overlap_bounds() {
        assert_eq!(crossfade_overlap(Transition::None, &[4.0, 4.0]), 0.0);
        assert_eq!(crossfade_overlap(Transition::Glitch, &[4.0, 4.0]), 0.0);
        assert_eq!(crossfade_overlap(Transition::Fade, &[4.0, 4.0]), 0.5);
        assert_eq!(crossfade_overlap(Transition::Dissolve, &[4.0, 0.6]), 0.3);
    }

    #[test]
    fn test_straight_concat_graph() {
        let graph = join_graph(&[3.0, 4.0, 5.0], Transition::None, 0.0);
        assert_eq!(graph, "[0:v][0:a][1:v][1:a][2:v][2:a]concat=n=3:v=1:a=1[vcat][acat]");
    }

    #[test]
    fn test_single_clip_with_fade_is_plain_concat() {
        let graph = join_graph(&[3.0], Transition::Fade, 0.5);
        assert_eq!(graph, "[0:v][0:a]concat=n=1:v=1:a=1[vcat][acat]");
    }

    #[test]
    fn test_crossfade_graph_offsets() {
        let graph = join_graph(&[4.0, 5.0, 6.0], Transition::Dissolve, 0.5);
        assert!(graph.contains("[v0][v1]xfade=transition=dissolve:duration=0.500:offset=3.500[x1]"));
        assert!(graph.contains("[x1][v2]xfade=transition=dissolve:duration=0.500:offset=8.000[vcat]"));
        assert!(graph.contains("[0:a][1:a]acrossfade=d=0.500[ax1]"));
        assert!(graph.contains("[ax1][2:a]acrossfade=d=0.500[acat]"));
    }

    #[test]
    fn test_drawtext_positions_and_window() {
        let mut overlay = TextOverlay::new("Summer '24", OverlayPosition::Top);
        overlay.start = 2.0;
        overlay.duration = Some(3.0);
        let filter = drawtext_filter(&overlay, Path::new("/tmp/job/overlay_00.txt"), None);
        assert!(filter.starts_with("drawtext=textfile='/tmp/job/overlay_00.txt'"));
        assert!(filter.contains("y=h*0.1"));
        assert!(filter.contains("x=(w-text_w)/2"));
        assert!(filter.contains("enable='between(t,2.000,5.000)'"));
        assert!(!filter.contains("fontfile"));

        let bottom = TextOverlay::new("The end", OverlayPosition::Bottom);
        let filter = drawtext_filter(&bottom, Path::new("t.txt"), Some(Path::new("/fonts/a.ttf")));
        assert!(filter.contains("y=h*0.9"));
        assert!(filter.contains("enable='gte(t,0.000)'"));
        assert!(filter.ends_with(":fontfile='/fonts/a.ttf'"));
    }

    #[test]
    fn test_quote_filter_value_escapes_quotes() {
        assert_eq!(quote_filter_value("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_music_mix_gains() {
        let mixed = music_graph(4, true);
        assert!(mixed.contains("[acat]volume=0.3[orig]"));
        assert!(mixed.contains("[4:a]"));
        assert!(mixed.contains("volume=0.7[mus]"));
        assert!(mixed.contains("amix=inputs=2:duration=first:normalize=0[aout]"));

        let alone = music_graph(2, false);
        assert!(alone.contains("[2:a]"));
        assert!(!alone.contains("volume"));
        assert!(alone.ends_with("[aout]"));
    }

    #[test]
    fn test_silent_clips_with_music_consume_every_output() {
        let graph = [
            join_graph(&[3.0, 3.0], Transition::None, 0.0),
            "[vcat]null[vout]".to_string(),
            music_graph(2, false),
        ]
        .join(";");

        // [acat] is produced once and consumed once; only mapped labels stay open
        assert_eq!(graph.matches("[acat]").count(), 2);
        assert!(graph.contains("[acat]anullsink"));
        assert_eq!(graph.matches("[vcat]").count(), 2);
    }

    #[test]
    fn test_normalize_chains_apply_speed_and_colour() {
        let encoding = EncodingConfig::default();
        let (video, audio) = normalize_chains(&encoding, Speed::Slow.factor(), Some("colorchannelmixer=rr=0.8"));
        assert!(video.starts_with("setpts=PTS/0.5,"));
        assert!(video.contains("scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(video.contains("fps=24"));
        assert!(video.contains("colorchannelmixer=rr=0.8,format=yuv420p"));
        assert!(audio.starts_with("atempo=0.5,"));

        let (video, audio) = normalize_chains(&encoding, Speed::Normal.factor(), None);
        assert!(!video.contains("setpts"));
        assert!(!audio.contains("atempo"));
    }

    #[tokio::test]
    async fn test_missing_music_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let composer = Composer::new(ComposerConfig {
            music_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let directive = Directive {
            music_mood: MusicMood::Calm,
            ..Default::default()
        };
        assert!(composer.resolve_music(&directive).await.is_none());
        assert!(composer.resolve_music(&Directive::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_no_surviving_clips_fails_render() {
        let dir = tempfile::tempdir().unwrap();
        let composer = Composer::new(ComposerConfig::default());
        let clips = vec![
            ClipSpec::new(dir.path().join("missing.mp4"), AssetKind::Video, 0.0, 5.0),
            ClipSpec::new(dir.path().join("empty.mp4"), AssetKind::Video, 3.0, 3.0),
        ];
        let result = composer
            .compose(&clips, &Directive::default(), &dir.path().join("out.mp4"))
            .await;
        assert!(matches!(result, Err(MediaError::NoClips)));
        // Scratch directory is gone with the failed render.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
