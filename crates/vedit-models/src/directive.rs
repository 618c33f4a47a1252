//! Editing directives interpreted from a free-text request.
//!
//! A [`Directive`] is produced once per job and never mutated afterwards.
//! Every enum field is lower-case on the wire and falls back to a safe
//! default when a value is missing or unrecognised.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Visual filter applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum VisualFilter {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "vintage")]
    Vintage,
    #[serde(rename = "b&w")]
    BlackAndWhite,
    #[serde(rename = "sepia")]
    Sepia,
}

impl VisualFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualFilter::None => "none",
            VisualFilter::Vintage => "vintage",
            VisualFilter::BlackAndWhite => "b&w",
            VisualFilter::Sepia => "sepia",
        }
    }
}

impl FromStr for VisualFilter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VisualFilter::None),
            "vintage" => Ok(VisualFilter::Vintage),
            "b&w" => Ok(VisualFilter::BlackAndWhite),
            "sepia" => Ok(VisualFilter::Sepia),
            _ => Err(()),
        }
    }
}

/// Playback speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl Speed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speed::Slow => "slow",
            Speed::Normal => "normal",
            Speed::Fast => "fast",
        }
    }

    /// Playback rate multiplier; 2.0 halves a clip's length.
    pub fn factor(&self) -> f64 {
        match self {
            Speed::Slow => 0.5,
            Speed::Normal => 1.0,
            Speed::Fast => 2.0,
        }
    }
}

impl FromStr for Speed {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slow" => Ok(Speed::Slow),
            "normal" => Ok(Speed::Normal),
            "fast" => Ok(Speed::Fast),
            _ => Err(()),
        }
    }
}

/// Background music mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MusicMood {
    #[default]
    None,
    Upbeat,
    Calm,
    Cinematic,
}

impl MusicMood {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicMood::None => "none",
            MusicMood::Upbeat => "upbeat",
            MusicMood::Calm => "calm",
            MusicMood::Cinematic => "cinematic",
        }
    }

    /// File name of the bundled track for this mood.
    pub fn asset_file_name(&self) -> Option<&'static str> {
        match self {
            MusicMood::None => None,
            MusicMood::Upbeat => Some("upbeat.mp3"),
            MusicMood::Calm => Some("calm.mp3"),
            MusicMood::Cinematic => Some("cinematic.mp3"),
        }
    }
}

impl FromStr for MusicMood {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(MusicMood::None),
            "upbeat" => Ok(MusicMood::Upbeat),
            "calm" => Ok(MusicMood::Calm),
            "cinematic" => Ok(MusicMood::Cinematic),
            _ => Err(()),
        }
    }
}

/// Transition between consecutive clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    None,
    Fade,
    Dissolve,
    Glitch,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::None => "none",
            Transition::Fade => "fade",
            Transition::Dissolve => "dissolve",
            Transition::Glitch => "glitch",
        }
    }

    /// Whether neighbouring clips overlap in a crossfade.
    pub fn crossfades(&self) -> bool {
        matches!(self, Transition::Fade | Transition::Dissolve)
    }
}

impl FromStr for Transition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Transition::None),
            "fade" => Ok(Transition::Fade),
            "dissolve" => Ok(Transition::Dissolve),
            "glitch" => Ok(Transition::Glitch),
            _ => Err(()),
        }
    }
}

/// Editing pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Fast,
    #[default]
    Medium,
    Slow,
}

impl Pacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pacing::Fast => "fast",
            Pacing::Medium => "medium",
            Pacing::Slow => "slow",
        }
    }
}

impl FromStr for Pacing {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Pacing::Fast),
            "medium" => Ok(Pacing::Medium),
            "slow" => Ok(Pacing::Slow),
            _ => Err(()),
        }
    }
}

/// Vertical anchor of a text overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

impl OverlayPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayPosition::Top => "top",
            OverlayPosition::Center => "center",
            OverlayPosition::Bottom => "bottom",
        }
    }
}

impl FromStr for OverlayPosition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(OverlayPosition::Top),
            "center" | "centre" | "middle" => Ok(OverlayPosition::Center),
            "bottom" => Ok(OverlayPosition::Bottom),
            _ => Err(()),
        }
    }
}

macro_rules! impl_display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_as_str!(VisualFilter, Speed, MusicMood, Transition, Pacing, OverlayPosition);

/// A caption drawn over the composed timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    pub text: String,
    #[serde(default)]
    pub position: OverlayPosition,
    /// Offset from the start of the timeline, in seconds
    #[serde(default)]
    pub start: f64,
    /// Display time in seconds; `None` keeps the text until the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, position: OverlayPosition) -> Self {
        Self {
            text: text.into(),
            position,
            start: 0.0,
            duration: None,
        }
    }

    /// Build from loosely-typed model output. Bare strings become centered captions.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.trim().is_empty() => {
                Some(Self::new(text.trim(), OverlayPosition::Center))
            }
            Value::Object(map) => {
                let text = map.get("text")?.as_str()?.trim();
                if text.is_empty() {
                    return None;
                }
                let position = map
                    .get("position")
                    .and_then(normalized_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                let start = map
                    .get("start")
                    .and_then(Value::as_f64)
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .unwrap_or(0.0);
                let duration = map
                    .get("duration")
                    .and_then(Value::as_f64)
                    .filter(|d| d.is_finite() && *d > 0.0);
                Some(Self {
                    text: text.to_string(),
                    position,
                    start,
                    duration,
                })
            }
            _ => None,
        }
    }
}

/// Structured editing instructions for one job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Directive {
    /// Target output length in whole seconds
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub filter: VisualFilter,
    #[serde(default)]
    pub speed: Speed,
    #[serde(default)]
    pub music_mood: MusicMood,
    #[serde(default)]
    pub include_tags: BTreeSet<String>,
    #[serde(default)]
    pub exclude_tags: BTreeSet<String>,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
}

impl Directive {
    /// Validate and normalize an arbitrary JSON value against the directive schema.
    ///
    /// Unknown or malformed fields are replaced by their defaults rather than rejected.
    pub fn from_json(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        fn field<T: FromStr + Default>(map: &serde_json::Map<String, Value>, key: &str) -> T {
            map.get(key)
                .and_then(normalized_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default()
        }

        Self {
            duration: map.get("duration").and_then(parse_duration),
            filter: field(map, "filter"),
            speed: field(map, "speed"),
            music_mood: field(map, "music_mood"),
            include_tags: map.get("include_tags").map(parse_tags).unwrap_or_default(),
            exclude_tags: map.get("exclude_tags").map(parse_tags).unwrap_or_default(),
            transition: field(map, "transition"),
            pacing: field(map, "pacing"),
            text_overlays: map
                .get("text_overlays")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(TextOverlay::from_value).collect())
                .unwrap_or_default(),
        }
    }

    /// Target duration in seconds, if one was requested.
    pub fn target_seconds(&self) -> Option<f64> {
        self.duration.map(f64::from)
    }
}

fn normalized_str(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_lowercase())
}

/// Positive whole seconds, or nothing.
fn parse_duration(value: &Value) -> Option<u32> {
    let seconds = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v,
            None => {
                let f = n.as_f64()?;
                if !f.is_finite() || f < 1.0 {
                    return None;
                }
                f.trunc() as u64
            }
        },
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };

    u32::try_from(seconds).ok().filter(|s| *s > 0)
}

fn parse_tags(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(normalized_str)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => BTreeSet::new(),
    }
}
