//! Media analysis and rendering for the edit pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution with progress parsing
//! - FFprobe metadata and rawvideo frame sampling
//! - Scene segmentation with a pluggable boundary detector
//! - Content tagging with YOLOv8 over ONNX Runtime
//! - Colour filters as pure frame transforms
//! - Final composition: speed, filters, transitions, overlays, looping, music

pub mod analysis;
pub mod command;
pub mod composer;
pub mod detector;
pub mod error;
pub mod filters;
pub mod frames;
pub mod probe;
pub mod progress;
pub mod segmenter;
pub mod tagger;

pub use analysis::{AnalysisConfig, AnalysisServices, MediaAnalyzer};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use composer::{plan_timeline, Composer, ComposerConfig, RenderOutcome, Renderer, TimelinePlan};
pub use detector::{DetectorConfig, LabelDetector, YoloDetector, COCO_CLASSES};
pub use error::{MediaError, MediaResult};
pub use filters::{ColorMatrix, Frame, FramePipeline};
pub use frames::{FrameReader, SampleSpec};
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use segmenter::{AdaptiveContentDetector, BoundaryDetector, SceneSegmenter, FALLBACK_INTERVAL};
pub use tagger::{ContentTagger, DEFAULT_FRAME_STRIDE};
