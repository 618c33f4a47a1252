//! Scene segmentation.
//!
//! Every decoded frame is scored by how much its HSV content changed from the
//! previous frame. A pluggable [`BoundaryDetector`] turns that score series
//! into cut frames, which become contiguous `(start, end)` intervals.
//!
//! Segmentation never fails: any error yields a single interval covering the
//! whole asset with an open (`f64::INFINITY`) end that callers clamp.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameReader, SampleSpec};
use crate::probe::probe_media;

/// Interval returned when segmentation fails.
pub const FALLBACK_INTERVAL: (f64, f64) = (0.0, f64::INFINITY);

/// Decoding size used for content scoring.
const ANALYSIS_WIDTH: u32 = 256;
const ANALYSIS_HEIGHT: u32 = 144;

/// Turns per-frame content scores into cut frame indices.
pub trait BoundaryDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Indices of frames that start a new scene, strictly ascending.
    ///
    /// `content[i]` is the change between frame `i - 1` and frame `i`
    /// (`content[0]` is always 0).
    fn detect_cuts(&self, content: &[f64]) -> Vec<usize>;
}

/// Cut detector that compares each frame's content change to the average
/// change of its neighbours, so slow camera motion does not trigger cuts.
#[derive(Debug, Clone)]
pub struct AdaptiveContentDetector {
    /// Minimum ratio of a frame's score to its neighbourhood average
    pub adaptive_threshold: f64,
    /// Minimum absolute content score for a cut
    pub min_content_val: f64,
    /// Minimum scene length in frames
    pub min_scene_len: usize,
    /// Frames on each side of the candidate used for the average
    pub window_width: usize,
}

impl Default for AdaptiveContentDetector {
    fn default() -> Self {
        Self {
            adaptive_threshold: 3.0,
            min_content_val: 15.0,
            min_scene_len: 15,
            window_width: 2,
        }
    }
}

impl BoundaryDetector for AdaptiveContentDetector {
    fn name(&self) -> &'static str {
        "adaptive_content"
    }

    fn detect_cuts(&self, content: &[f64]) -> Vec<usize> {
        let w = self.window_width.max(1);
        let mut cuts = Vec::new();
        if content.len() < 2 * w + 1 {
            return cuts;
        }

        let mut last_cut = 0usize;
        for i in w..content.len() - w {
            let score = content[i];
            let neighbours = content[i - w..i].iter().chain(&content[i + 1..=i + w]);
            let average = neighbours.sum::<f64>() / (2 * w) as f64;

            let ratio = if average < 1e-5 {
                if score >= self.min_content_val {
                    255.0
                } else {
                    0.0
                }
            } else {
                (score / average).min(255.0)
            };

            if ratio >= self.adaptive_threshold
                && score >= self.min_content_val
                && i - last_cut >= self.min_scene_len
            {
                cuts.push(i);
                last_cut = i;
            }
        }
        cuts
    }
}

/// Frame converted to HSV on the OpenCV scale (H in [0, 180), S and V in [0, 255]).
struct HsvFrame(Vec<[f32; 3]>);

impl HsvFrame {
    fn from_rgb(frame: &RgbImage) -> Self {
        Self(
            frame
                .as_raw()
                .par_chunks_exact(3)
                .map(|px| rgb_to_hsv(px[0], px[1], px[2]))
                .collect(),
        )
    }
}

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [f32; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [h / 2.0, s, max]
}

/// Mean absolute per-channel HSV difference between two frames.
fn content_delta(prev: &HsvFrame, cur: &HsvFrame) -> f64 {
    if prev.0.is_empty() || prev.0.len() != cur.0.len() {
        return 0.0;
    }
    let sums = prev
        .0
        .par_iter()
        .zip(cur.0.par_iter())
        .map(|(a, b)| {
            [
                (a[0] - b[0]).abs() as f64,
                (a[1] - b[1]).abs() as f64,
                (a[2] - b[2]).abs() as f64,
            ]
        })
        .reduce(|| [0.0; 3], |x, y| [x[0] + y[0], x[1] + y[1], x[2] + y[2]]);
    let n = prev.0.len() as f64;
    (sums[0] + sums[1] + sums[2]) / (3.0 * n)
}

/// Contiguous intervals delimited by `0`, each cut time, and `duration`.
///
/// Cuts outside `(0, duration)` are ignored and empty intervals dropped.
pub fn intervals_from_cuts(cut_times: &[f64], duration: f64) -> Vec<(f64, f64)> {
    let mut bounds = vec![0.0];
    bounds.extend(
        cut_times
            .iter()
            .copied()
            .filter(|t| *t > 0.0 && *t < duration),
    );
    bounds.push(duration);

    bounds
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| (w[0], w[1]))
        .collect()
}

/// Splits a video into scene intervals.
#[derive(Clone)]
pub struct SceneSegmenter {
    detector: Arc<dyn BoundaryDetector>,
}

impl Default for SceneSegmenter {
    fn default() -> Self {
        Self::new(Arc::new(AdaptiveContentDetector::default()))
    }
}

impl SceneSegmenter {
    pub fn new(detector: Arc<dyn BoundaryDetector>) -> Self {
        Self { detector }
    }

    /// Segment a video, falling back to one open-ended interval on any error.
    pub async fn segment(&self, path: &Path) -> Vec<(f64, f64)> {
        match self.try_segment(path).await {
            Ok(intervals) if !intervals.is_empty() => {
                info!(
                    path = %path.display(),
                    scenes = intervals.len(),
                    detector = self.detector.name(),
                    "Detected scenes"
                );
                intervals
            }
            Ok(_) => {
                warn!(path = %path.display(), "No scenes detected, using whole video");
                vec![FALLBACK_INTERVAL]
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Scene detection failed, using whole video");
                vec![FALLBACK_INTERVAL]
            }
        }
    }

    /// Segment a video, surfacing errors.
    pub async fn try_segment(&self, path: &Path) -> MediaResult<Vec<(f64, f64)>> {
        let info = probe_media(path).await?;
        if !info.has_video {
            return Err(MediaError::invalid_media("no video stream"));
        }

        let detector = Arc::clone(&self.detector);
        let owned_path = path.to_path_buf();
        let (content, cuts) = tokio::task::spawn_blocking(move || -> MediaResult<_> {
            let reader = FrameReader::open(
                &owned_path,
                SampleSpec::new(1, ANALYSIS_WIDTH, ANALYSIS_HEIGHT),
            )?;
            let content = score_frames(reader)?;
            let cuts = detector.detect_cuts(&content);
            Ok((content, cuts))
        })
        .await
        .map_err(|e| MediaError::internal(format!("segmentation task failed: {}", e)))??;

        if content.is_empty() {
            return Err(MediaError::invalid_media("no decodable frames"));
        }

        let duration = if info.duration > 0.0 {
            info.duration
        } else {
            content.len() as f64 / info.fps
        };
        let cut_times: Vec<f64> = cuts.iter().map(|&i| i as f64 / info.fps).collect();
        debug!(frames = content.len(), cuts = cuts.len(), duration, "Content scoring finished");

        Ok(intervals_from_cuts(&cut_times, duration))
    }
}

/// Content change score for every frame of the stream.
fn score_frames<I>(frames: I) -> MediaResult<Vec<f64>>
where
    I: IntoIterator<Item = MediaResult<RgbImage>>,
{
    let mut scores = Vec::new();
    let mut previous: Option<HsvFrame> = None;
    for frame in frames {
        let hsv = HsvFrame::from_rgb(&frame?);
        scores.push(match &previous {
            Some(prev) => content_delta(prev, &hsv),
            None => 0.0,
        });
        previous = Some(hsv);
    }
    Ok(scores)
}
