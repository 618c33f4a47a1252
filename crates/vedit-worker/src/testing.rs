//! In-memory fakes of the pipeline seams, shared by the worker's unit tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vedit_llm_client::{LlmError, MockCompletionService};
use vedit_media::{MediaAnalyzer, MediaError, MediaResult, RenderOutcome, Renderer};
use vedit_models::{Asset, AssetKind, ClipSpec, Directive, Job, JobId, Project, ProjectId};
use vedit_queue::{JobStore, MemoryJobStore, QueueError, QueueResult};
use vedit_storage::{ObjectStore, StorageError, StorageResult};

use crate::config::WorkerConfig;
use crate::processor::EditContext;

#[derive(Default)]
pub(crate) struct FakeStorage {
    pub fail_download: bool,
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn download(&self, key: &str, dest: &Path) -> StorageResult<PathBuf> {
        if self.fail_download {
            return Err(StorageError::not_found(key));
        }
        tokio::fs::write(dest, key.as_bytes()).await?;
        Ok(dest.to_path_buf())
    }

    async fn upload(&self, src: &Path, key: &str) -> StorageResult<String> {
        assert!(src.exists(), "rendered output missing before upload");
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(key.to_string())
    }
}

pub(crate) struct FakeAnalyzer {
    pub intervals: Vec<(f64, f64)>,
    pub tags: BTreeSet<String>,
    /// Tags for files whose name ends with the given suffix, checked before `tags`
    pub tags_by_file: Vec<(String, BTreeSet<String>)>,
    pub duration: Option<f64>,
    /// Simulated analysis time per asset
    pub delay: Option<Duration>,
}

impl Default for FakeAnalyzer {
    fn default() -> Self {
        Self {
            intervals: vec![(0.0, 10.0), (10.0, 25.0), (25.0, 45.0)],
            tags: ["person".to_string()].into_iter().collect(),
            tags_by_file: Vec::new(),
            duration: Some(45.0),
            delay: None,
        }
    }
}

#[async_trait]
impl MediaAnalyzer for FakeAnalyzer {
    async fn segment(&self, _path: &Path) -> Vec<(f64, f64)> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.intervals.clone()
    }

    async fn tag(&self, path: &Path, _kind: AssetKind) -> BTreeSet<String> {
        let name = path.to_string_lossy();
        self.tags_by_file
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_str()))
            .map(|(_, tags)| tags.clone())
            .unwrap_or_else(|| self.tags.clone())
    }

    async fn duration(&self, _path: &Path) -> Option<f64> {
        self.duration
    }
}

#[derive(Default)]
pub(crate) struct FakeRenderer {
    pub fail: bool,
    pub rendered: Mutex<Vec<ClipSpec>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        clips: &[ClipSpec],
        directive: &Directive,
        output: &Path,
    ) -> MediaResult<RenderOutcome> {
        for clip in clips {
            assert!(clip.source.exists(), "clip source missing");
        }
        if self.fail {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        tokio::fs::write(output, b"mp4").await?;
        self.rendered.lock().unwrap().extend_from_slice(clips);
        Ok(RenderOutcome {
            clips_rendered: clips.len(),
            repeats: 0,
            duration: directive.target_seconds().unwrap_or(0.0),
            music_applied: false,
        })
    }
}

pub(crate) struct Harness {
    pub ctx: EditContext,
    pub store: Arc<MemoryJobStore>,
    pub storage: Arc<FakeStorage>,
    pub renderer: Arc<FakeRenderer>,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    /// True when no job scratch directory is left behind.
    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir.path()).unwrap().next().is_none()
    }
}

/// Job store whose project writes can be made to fail.
pub(crate) struct FlakyStore {
    pub inner: Arc<MemoryJobStore>,
    pub fail_project_saves: bool,
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn get_job(&self, id: &JobId) -> QueueResult<Option<Job>> {
        self.inner.get_job(id).await
    }

    async fn save_job(&self, job: &Job) -> QueueResult<()> {
        self.inner.save_job(job).await
    }

    async fn get_project(&self, id: &ProjectId) -> QueueResult<Option<Project>> {
        self.inner.get_project(id).await
    }

    async fn save_project(&self, project: &Project) -> QueueResult<()> {
        if self.fail_project_saves {
            return Err(QueueError::connection_failed("redis unavailable"));
        }
        self.inner.save_project(project).await
    }

    async fn latest_job_for_project(&self, id: &ProjectId) -> QueueResult<Option<Job>> {
        self.inner.latest_job_for_project(id).await
    }
}

/// Wire the fakes together; the language model is always unavailable.
pub(crate) fn harness(storage: FakeStorage, analyzer: FakeAnalyzer, renderer: FakeRenderer) -> Harness {
    harness_with_model(storage, analyzer, renderer, None)
}

/// Like [`harness`], with the language model answering `reply` to every prompt.
pub(crate) fn harness_with_model(
    storage: FakeStorage,
    analyzer: FakeAnalyzer,
    renderer: FakeRenderer,
    reply: Option<&'static str>,
) -> Harness {
    let work_dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig {
        work_dir: work_dir.path().to_path_buf(),
        ..WorkerConfig::default()
    };
    let mut model = MockCompletionService::new();
    model.expect_complete().returning(move |_| match reply {
        Some(text) => Ok(text.to_string()),
        None => Err(LlmError::Disabled),
    });

    let store = Arc::new(MemoryJobStore::new());
    let storage = Arc::new(storage);
    let renderer = Arc::new(renderer);
    let ctx = EditContext::new(
        config,
        storage.clone(),
        store.clone(),
        Arc::new(analyzer),
        renderer.clone(),
        Arc::new(model),
    );
    Harness {
        ctx,
        store,
        storage,
        renderer,
        work_dir,
    }
}

pub(crate) async fn seed(store: &MemoryJobStore, prompt: &str, assets: Vec<Asset>) -> (Project, Job) {
    let project = Project::new("Holiday", Some(prompt.to_string()), assets);
    let job = Job::new(project.id.clone());
    store.save_project(&project).await.unwrap();
    store.save_job(&job).await.unwrap();
    (project, job)
}

pub(crate) fn video(name: &str) -> Asset {
    Asset::new(AssetKind::Video, format!("uploads/{}", name), name)
}

pub(crate) fn image(name: &str) -> Asset {
    Asset::new(AssetKind::Image, format!("uploads/{}", name), name)
}

pub(crate) fn tag_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
