//! Directive interpretation: free-text prompt to structured [`Directive`].
//!
//! Two tiers. The language model is asked for a JSON object first; any
//! failure there is a [`ModelUnavailable`] value and the keyword rules take
//! over. Interpretation itself never fails.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use vedit_llm_client::{CompletionService, LlmError};
use vedit_models::{Directive, MusicMood, Pacing, Speed, Transition, VisualFilter};

use crate::metrics;

const INSTRUCTIONS: &str = r#"You are a video editing assistant. Read the user's request and reply with one JSON object using these fields:
- duration: target length in seconds, or null to decide automatically
- filter: one of "vintage", "b&w", "sepia", "none"
- speed: one of "slow", "normal", "fast"
- music_mood: one of "upbeat", "calm", "cinematic", "none"
- include_tags: list of object labels the clips should show (e.g. ["person", "car"])
- exclude_tags: list of object labels the clips must not show
- transition: one of "fade", "dissolve", "glitch", "none"
- pacing: one of "fast", "medium", "slow"
- text_overlays: list of {"text": "...", "position": "top|center|bottom", "start": seconds, "duration": seconds}

Reply with the JSON object only."#;

/// Why the model tier produced no directive.
#[derive(Debug, Error)]
pub enum ModelUnavailable {
    #[error("language model call failed: {0}")]
    Service(#[from] LlmError),

    #[error("no JSON object in model output")]
    NoJson,

    #[error("model output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ModelUnavailable {
    fn label(&self) -> &'static str {
        match self {
            ModelUnavailable::Service(LlmError::Disabled) => "disabled",
            ModelUnavailable::Service(LlmError::Timeout(_)) => "timeout",
            ModelUnavailable::Service(_) => "service",
            ModelUnavailable::NoJson => "no_json",
            ModelUnavailable::InvalidJson(_) => "invalid_json",
        }
    }
}

/// Prompt interpreter with a model tier and a rule-based fallback.
#[derive(Clone)]
pub struct DirectiveInterpreter {
    model: Arc<dyn CompletionService>,
}

impl DirectiveInterpreter {
    pub fn new(model: Arc<dyn CompletionService>) -> Self {
        Self { model }
    }

    /// Interpret a prompt. Falls back to [`interpret_rules`] on any model failure.
    pub async fn interpret(&self, prompt: &str) -> Directive {
        match self.interpret_with_model(prompt).await {
            Ok(directive) => {
                info!(?directive, "Prompt interpreted by language model");
                directive
            }
            Err(ModelUnavailable::Service(LlmError::Disabled)) => {
                debug!("Language model disabled, using rules");
                metrics::record_interpreter_fallback("disabled");
                interpret_rules(prompt)
            }
            Err(e) => {
                warn!("Language model interpretation failed, using rules: {}", e);
                metrics::record_interpreter_fallback(e.label());
                interpret_rules(prompt)
            }
        }
    }

    /// Model tier only.
    pub async fn interpret_with_model(&self, prompt: &str) -> Result<Directive, ModelUnavailable> {
        let request = format!("{}\n\nUser request: {}", INSTRUCTIONS, prompt);
        let raw = self.model.complete(&request).await?;
        let object = extract_json_object(&raw).ok_or(ModelUnavailable::NoJson)?;
        let value: serde_json::Value = serde_json::from_str(object)?;
        Ok(Directive::from_json(&value))
    }
}

/// First balanced `{...}` in `text`, ignoring braces inside JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn seconds_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\s*(?:second|sec|s)").ok())
        .as_ref()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Keyword interpretation over the lower-cased prompt. First matching group wins.
pub fn interpret_rules(prompt: &str) -> Directive {
    let text = prompt.to_lowercase();

    let duration = if text.contains("30 second") {
        Some(30)
    } else if text.contains("1 minute") {
        Some(60)
    } else if text.contains("2 minute") {
        Some(120)
    } else {
        seconds_pattern()
            .and_then(|re| re.captures(&text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .filter(|d: &u32| *d > 0)
    };

    let filter = if contains_any(&text, &["vintage", "retro"]) {
        VisualFilter::Vintage
    } else if contains_any(&text, &["black and white", "b&w", "monochrome"]) {
        VisualFilter::BlackAndWhite
    } else if contains_any(&text, &["sepia", "brown"]) {
        VisualFilter::Sepia
    } else {
        VisualFilter::None
    };

    let speed = if text.contains("slow") {
        Speed::Slow
    } else if contains_any(&text, &["fast", "speed up", "2x"]) {
        Speed::Fast
    } else {
        Speed::Normal
    };

    let music_mood = if contains_any(&text, &["upbeat", "energetic", "fun"]) {
        MusicMood::Upbeat
    } else if contains_any(&text, &["calm", "relaxing", "peaceful"]) {
        MusicMood::Calm
    } else if contains_any(&text, &["cinematic", "epic", "dramatic"]) {
        MusicMood::Cinematic
    } else {
        MusicMood::None
    };

    let transition = if text.contains("fade") {
        Transition::Fade
    } else if text.contains("dissolve") {
        Transition::Dissolve
    } else if text.contains("glitch") {
        Transition::Glitch
    } else {
        Transition::None
    };

    let pacing = if text.contains("fast") && text.contains("pacing") {
        Pacing::Fast
    } else if text.contains("slow") && text.contains("pacing") {
        Pacing::Slow
    } else {
        Pacing::Medium
    };

    let directive = Directive {
        duration,
        filter,
        speed,
        music_mood,
        transition,
        pacing,
        ..Directive::default()
    };
    info!(?directive, "Prompt interpreted by rules");
    directive
}
