//! Candidate scenes and the intervals cut from them.

use std::collections::BTreeSet;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::project::AssetKind;

/// Score given to every scene until a real aesthetic scorer exists.
pub const DEFAULT_SCENE_SCORE: f64 = 5.0;

/// Length of the clip a still image contributes to the timeline.
pub const IMAGE_CLIP_SECONDS: f64 = 3.0;

/// A time interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Both endpoints lie within `tolerance` seconds of `other`'s.
    pub fn matches(&self, other: &Interval, tolerance: f64) -> bool {
        (self.start - other.start).abs() < tolerance && (self.end - other.end).abs() < tolerance
    }
}

/// A candidate scene: a contiguous interval of one asset with its tags and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_score")]
    pub score: f64,
}

fn default_score() -> f64 {
    DEFAULT_SCENE_SCORE
}

impl Scene {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            tags: BTreeSet::new(),
            score: DEFAULT_SCENE_SCORE,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }

    /// Whether the scene carries any of the given tags.
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

/// A concrete clip to render: an interval of a local source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    /// Local path of the downloaded source
    pub source: PathBuf,
    /// Whether the source is a video or a still image
    pub kind: AssetKind,
    pub start: f64,
    pub end: f64,
}

impl ClipSpec {
    pub fn new(source: impl Into<PathBuf>, kind: AssetKind, start: f64, end: f64) -> Self {
        Self {
            source: source.into(),
            kind,
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_matching_tolerance() {
        let a = Interval::new(10.0, 25.0);
        assert!(a.matches(&Interval::new(10.05, 24.95), 0.1));
        assert!(!a.matches(&Interval::new(10.2, 25.0), 0.1));
    }

    #[test]
    fn test_scene_tag_intersection() {
        let scene = Scene::new(0.0, 5.0).with_tags(["person", "car"]);
        let wanted: BTreeSet<String> = ["car".to_string()].into_iter().collect();
        let other: BTreeSet<String> = ["dog".to_string()].into_iter().collect();

        assert!(scene.has_any_tag(&wanted));
        assert!(!scene.has_any_tag(&other));
        assert!(!scene.has_any_tag(&BTreeSet::new()));
    }

    #[test]
    fn test_scene_defaults_score() {
        let scene: Scene = serde_json::from_str(r#"{"start": 1.0, "end": 4.5}"#).unwrap();
        assert_eq!(scene.score, DEFAULT_SCENE_SCORE);
        assert!(scene.tags.is_empty());
        assert!((scene.duration() - 3.5).abs() < f64::EPSILON);
    }
}
