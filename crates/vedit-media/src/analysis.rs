//! Analysis capabilities built once per process.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use vedit_models::AssetKind;

use crate::detector::{DetectorConfig, YoloDetector};
use crate::probe::probe_media;
use crate::segmenter::SceneSegmenter;
use crate::tagger::{ContentTagger, DEFAULT_FRAME_STRIDE};

/// Per-asset analysis used by the edit pipeline.
///
/// Every method degrades instead of failing: segmentation falls back to one
/// open-ended interval, tagging to an empty set, probing to `None`.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    /// Scene intervals of a video, ordered by start.
    async fn segment(&self, path: &Path) -> Vec<(f64, f64)>;

    /// Labels observed anywhere in the asset.
    async fn tag(&self, path: &Path, kind: AssetKind) -> BTreeSet<String>;

    /// Container duration in seconds.
    async fn duration(&self, path: &Path) -> Option<f64>;
}

/// Settings for [`AnalysisServices::from_config`].
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub detector: DetectorConfig,
    pub frame_stride: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            frame_stride: DEFAULT_FRAME_STRIDE,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        Self {
            detector: DetectorConfig::from_env(),
            frame_stride: std::env::var("FRAME_SAMPLE_STRIDE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FRAME_STRIDE),
        }
    }
}

/// The segmenter and tagger with their loaded models.
#[derive(Clone)]
pub struct AnalysisServices {
    segmenter: SceneSegmenter,
    tagger: ContentTagger,
}

impl AnalysisServices {
    pub fn new(segmenter: SceneSegmenter, tagger: ContentTagger) -> Self {
        Self { segmenter, tagger }
    }

    /// Load models. A detector that cannot be loaded disables tagging.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let tagger = match YoloDetector::new(config.detector.clone()) {
            Ok(detector) => ContentTagger::new(Arc::new(detector), config.frame_stride),
            Err(e) => {
                warn!(error = %e, "Object detector unavailable, assets will not be tagged");
                ContentTagger::disabled()
            }
        };
        info!(
            tagging = tagger.is_enabled(),
            stride = tagger.stride(),
            "Analysis services ready"
        );
        Self::new(SceneSegmenter::default(), tagger)
    }
}

#[async_trait]
impl MediaAnalyzer for AnalysisServices {
    async fn segment(&self, path: &Path) -> Vec<(f64, f64)> {
        self.segmenter.segment(path).await
    }

    async fn tag(&self, path: &Path, kind: AssetKind) -> BTreeSet<String> {
        self.tagger.tag(path, kind).await
    }

    async fn duration(&self, path: &Path) -> Option<f64> {
        match probe_media(path).await {
            Ok(info) if info.duration > 0.0 => Some(info.duration),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Probe failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_model_disables_tagging() {
        let config = AnalysisConfig {
            detector: DetectorConfig {
                model_path: "/nonexistent/model.onnx".to_string(),
                ..Default::default()
            },
            frame_stride: 10,
        };
        let services = AnalysisServices::from_config(&config);
        assert!(services
            .tag(Path::new("/nonexistent/a.jpg"), AssetKind::Image)
            .await
            .is_empty());
        assert!(services.duration(Path::new("/nonexistent/a.mp4")).await.is_none());
    }
}
