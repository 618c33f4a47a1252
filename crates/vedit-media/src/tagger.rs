//! Asset-level content tagging.
//!
//! A video is sampled every `stride` frames and the union of detected labels
//! across all samples becomes the asset's tag set. Images are detected once.
//! Failures are logged and produce an empty set.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use vedit_models::AssetKind;

use crate::detector::LabelDetector;
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameReader, SampleSpec};

/// Default frame sampling stride.
pub const DEFAULT_FRAME_STRIDE: u32 = 30;

/// Size frames are decoded at before detection.
const DETECTION_INPUT_SIZE: u32 = 640;

/// Tags media with the labels a detector finds in it.
#[derive(Clone)]
pub struct ContentTagger {
    detector: Option<Arc<dyn LabelDetector>>,
    stride: u32,
}

impl ContentTagger {
    pub fn new(detector: Arc<dyn LabelDetector>, stride: u32) -> Self {
        Self {
            detector: Some(detector),
            stride: stride.max(1),
        }
    }

    /// A tagger without a detector; every asset gets an empty tag set.
    pub fn disabled() -> Self {
        Self {
            detector: None,
            stride: DEFAULT_FRAME_STRIDE,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.detector.is_some()
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Tag an asset. Never fails; errors yield an empty set.
    pub async fn tag(&self, path: &Path, kind: AssetKind) -> BTreeSet<String> {
        let Some(detector) = self.detector.clone() else {
            return BTreeSet::new();
        };

        let owned_path = path.to_path_buf();
        let stride = self.stride;
        let result = tokio::task::spawn_blocking(move || match kind {
            AssetKind::Video => tag_video(detector.as_ref(), &owned_path, stride),
            AssetKind::Image => tag_image(detector.as_ref(), &owned_path),
        })
        .await
        .map_err(|e| MediaError::internal(format!("tagging task failed: {}", e)))
        .and_then(|r| r);

        match result {
            Ok(tags) => {
                info!(path = %path.display(), kind = %kind, tags = ?tags, "Tagged asset");
                tags
            }
            Err(e) => {
                warn!(path = %path.display(), kind = %kind, error = %e, "Tagging failed, continuing without tags");
                BTreeSet::new()
            }
        }
    }
}

/// Union of labels over every frame the iterator yields.
fn collect_labels<I>(detector: &dyn LabelDetector, frames: I) -> MediaResult<BTreeSet<String>>
where
    I: IntoIterator<Item = MediaResult<RgbImage>>,
{
    let mut tags = BTreeSet::new();
    for frame in frames {
        tags.extend(detector.labels(&frame?)?);
    }
    Ok(tags)
}

fn tag_video(detector: &dyn LabelDetector, path: &Path, stride: u32) -> MediaResult<BTreeSet<String>> {
    let reader = FrameReader::open(
        path,
        SampleSpec::new(stride, DETECTION_INPUT_SIZE, DETECTION_INPUT_SIZE),
    )?;
    collect_labels(detector, reader)
}

fn tag_image(detector: &dyn LabelDetector, path: &Path) -> MediaResult<BTreeSet<String>> {
    let frame = image::open(path)?.to_rgb8();
    collect_labels(detector, std::iter::once(Ok(frame)))
}
