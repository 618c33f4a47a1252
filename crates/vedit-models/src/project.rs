//! Projects and their uploaded assets.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

uuid_id!(ProjectId, "Unique identifier for a project.");
uuid_id!(AssetId, "Unique identifier for an uploaded asset.");

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Processing,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Image,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Image => "image",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(AssetKind::Video),
            "image" => Ok(AssetKind::Image),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

/// An uploaded source file belonging to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Asset {
    pub id: AssetId,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Object storage key of the uploaded file
    pub storage_key: String,
    pub original_filename: String,
}

impl Asset {
    pub fn new(
        kind: AssetKind,
        storage_key: impl Into<String>,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            id: AssetId::new(),
            kind,
            storage_key: storage_key.into(),
            original_filename: original_filename.into(),
        }
    }

    /// Local file name used when the asset is downloaded into a job directory.
    ///
    /// Path separators in the original name are replaced so the file always
    /// lands inside the directory.
    pub fn local_file_name(&self) -> String {
        let name: String = self
            .original_filename
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("asset_{}_{}", self.id, name)
    }
}

/// A user project: assets plus the prompt describing the desired edit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default)]
    pub status: ProjectStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub assets: Vec<Asset>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, prompt: Option<String>, assets: Vec<Asset>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            title: title.into(),
            prompt,
            status: ProjectStatus::Draft,
            output_video_key: None,
            error_message: None,
            assets,
            created_at: now,
            updated_at: now,
        }
    }

    /// Prompt text, empty when none was given.
    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or("")
    }

    pub fn mark_processing(&mut self) {
        self.status = ProjectStatus::Processing;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, output_key: impl Into<String>) {
        self.status = ProjectStatus::Completed;
        self.output_video_key = Some(output_key.into());
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ProjectStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Storage key for a rendered output of this project.
    pub fn output_key(&self, render_id: &str) -> String {
        format!(
            "projects/{}/output/project_{}_{}.mp4",
            self.id, self.id, render_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_wire_format() {
        let asset = Asset::new(AssetKind::Image, "uploads/a.jpg", "a.jpg");
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!("VIDEO".parse::<AssetKind>().unwrap(), AssetKind::Video);
        assert!("audio".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_local_file_name_stays_in_directory() {
        let asset = Asset::new(AssetKind::Video, "k", "../clips/beach.mp4");
        let name = asset.local_file_name();
        assert!(name.starts_with(&format!("asset_{}_", asset.id)));
        assert!(!name.contains('/'));
        assert!(name.ends_with("beach.mp4"));
    }

    #[test]
    fn test_project_status_flow() {
        let mut project = Project::new("Trip", Some("make it short".into()), vec![]);
        assert_eq!(project.status, ProjectStatus::Draft);

        project.mark_processing();
        assert_eq!(project.status, ProjectStatus::Processing);

        project.mark_failed("no assets");
        assert_eq!(project.error_message.as_deref(), Some("no assets"));

        project.mark_processing();
        assert!(project.error_message.is_none());

        let key = project.output_key("abc");
        project.mark_completed(key.clone());
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(
            key,
            format!("projects/{0}/output/project_{0}_abc.mp4", project.id)
        );
    }

    #[test]
    fn test_prompt_text_defaults_empty() {
        let project = Project::new("Untitled", None, vec![]);
        assert_eq!(project.prompt_text(), "");
    }
}
