//! Shared data models for the vedit edit pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Candidate scenes and selected clip intervals
//! - Editing directives interpreted from free-text prompts
//! - Jobs, projects and their assets
//! - Encoding configuration

pub mod directive;
pub mod encoding;
pub mod job;
pub mod project;
pub mod scene;

// Re-export common types
pub use directive::{
    Directive, MusicMood, OverlayPosition, Pacing, Speed, TextOverlay, Transition, VisualFilter,
};
pub use encoding::EncodingConfig;
pub use job::{InvalidTransition, Job, JobId, JobResult, JobState};
pub use project::{Asset, AssetId, AssetKind, Project, ProjectId, ProjectStatus};
pub use scene::{ClipSpec, Interval, Scene, DEFAULT_SCENE_SCORE, IMAGE_CLIP_SECONDS};
