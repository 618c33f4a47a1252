//! Edit pipeline orchestration for one job.
//!
//! `pending -> processing -> {completed, failed}`: download and analyse every
//! asset, interpret the prompt, select shots, reconcile them to local sources,
//! render, upload. Scratch files live in a per-job temporary directory that is
//! removed whenever the pipeline future finishes or is dropped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use vedit_llm_client::{CompletionService, OllamaClient};
use vedit_media::{AnalysisConfig, AnalysisServices, Composer, ComposerConfig, MediaAnalyzer, Renderer};
use vedit_models::{
    Asset, AssetKind, ClipSpec, Interval, Job, JobId, JobResult, Project, Scene, DEFAULT_SCENE_SCORE,
    IMAGE_CLIP_SECONDS,
};
use vedit_queue::{JobStore, RedisJobStore};
use vedit_storage::{ObjectStore, S3Client};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::interpreter::DirectiveInterpreter;
use crate::logging::JobLogger;
use crate::retry::{retry_async, RetryConfig};
use crate::selector::select_shot_indices;

/// Tolerance when matching selected intervals back to candidates.
const RECONCILE_TOLERANCE_SECS: f64 = 0.1;

pub const NO_ASSETS: &str = "Project has no assets";
pub const NO_CLIPS_SELECTED: &str = "No clips selected after filtering";

/// Everything a job needs, built once per process.
#[derive(Clone)]
pub struct EditContext {
    pub config: WorkerConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub store: Arc<dyn JobStore>,
    pub analyzer: Arc<dyn MediaAnalyzer>,
    pub renderer: Arc<dyn Renderer>,
    pub interpreter: DirectiveInterpreter,
}

impl EditContext {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn ObjectStore>,
        store: Arc<dyn JobStore>,
        analyzer: Arc<dyn MediaAnalyzer>,
        renderer: Arc<dyn Renderer>,
        model: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            config,
            storage,
            store,
            analyzer,
            renderer,
            interpreter: DirectiveInterpreter::new(model),
        }
    }

    /// Production wiring from environment variables.
    ///
    /// Fails on missing storage credentials or an unusable Redis URL.
    pub fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let storage = S3Client::from_env()?;
        let store = RedisJobStore::from_env()?;
        let analyzer = AnalysisServices::from_config(&AnalysisConfig::from_env());
        let renderer = Composer::new(ComposerConfig::from_env());
        let model = OllamaClient::from_env()
            .map_err(|e| WorkerError::config_error(format!("language model client: {}", e)))?;
        if !model.config().is_enabled() {
            info!("OLLAMA_BASE_URL not set, prompts will be interpreted by rules only");
        }

        Ok(Self::new(
            config,
            Arc::new(storage),
            Arc::new(store),
            Arc::new(analyzer),
            Arc::new(renderer),
            Arc::new(model),
        ))
    }
}

/// A candidate scene and the local file it was cut from.
#[derive(Debug, Clone)]
struct Candidate {
    scene: Scene,
    source: PathBuf,
    kind: AssetKind,
}

/// Run one edit job to a terminal state.
///
/// Pipeline failures are recorded on the job and project and also returned.
pub async fn run_edit_job(ctx: &EditContext, job_id: &JobId) -> WorkerResult<JobResult> {
    let mut job = ctx
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;
    let mut project = ctx
        .store
        .get_project(&job.project_id)
        .await?
        .ok_or_else(|| WorkerError::ProjectNotFound(job.project_id.to_string()))?;

    let logger = JobLogger::new(&job.id, &project.id, "edit");

    job.start()?;
    job.set_progress(5.0);
    project.mark_processing();
    save_job(ctx, &job).await?;
    save_project(ctx, &project).await?;
    logger.log_start(&format!("{} asset(s)", project.assets.len()));

    match execute_pipeline(ctx, &mut job, &project, &logger).await {
        Ok(result) => {
            project.mark_completed(result.output_key.clone());
            job.complete(result.clone())?;
            save_project(ctx, &project).await?;
            save_job(ctx, &job).await?;
            logger.log_completion(&format!(
                "{} clip(s) rendered to {}",
                result.clips_count, result.output_key
            ));
            Ok(result)
        }
        Err(e) => {
            let message = e.to_string();
            logger.log_error(&message);
            record_failure(ctx, &mut job, Some(&mut project), &message).await;
            Err(e)
        }
    }
}

/// Mark a job and its project failed, unless the job already finished.
///
/// Used for jobs whose pipeline never reached its own error handling
/// (timeouts, abandoned messages, failed status writes). A job whose project
/// record is gone is still failed.
pub async fn fail_job(ctx: &EditContext, job_id: &JobId, message: &str) -> WorkerResult<()> {
    let Some(mut job) = ctx.store.get_job(job_id).await? else {
        return Err(WorkerError::JobNotFound(job_id.to_string()));
    };
    if job.is_terminal() {
        info!(job_id = %job_id, status = %job.status, "Job already finished, not failing it");
        return Ok(());
    }
    let mut project = ctx.store.get_project(&job.project_id).await?;
    if project.is_none() {
        warn!(job_id = %job_id, project_id = %job.project_id, "Project missing, failing job only");
    }

    record_failure(ctx, &mut job, project.as_mut(), message).await;
    Ok(())
}

async fn record_failure(ctx: &EditContext, job: &mut Job, project: Option<&mut Project>, message: &str) {
    if let Err(e) = job.fail(message) {
        warn!(job_id = %job.id, "Cannot fail job: {}", e);
        return;
    }

    // Best effort: the original error is what the caller reports.
    if let Err(e) = save_job(ctx, job).await {
        warn!(job_id = %job.id, "Failed to persist job failure: {}", e);
    }
    if let Some(project) = project {
        project.mark_failed(message);
        if let Err(e) = save_project(ctx, project).await {
            warn!(project_id = %project.id, "Failed to persist project failure: {}", e);
        }
    }
}

async fn save_job(ctx: &EditContext, job: &Job) -> WorkerResult<()> {
    let config = RetryConfig::new("save_job");
    retry_async(&config, || ctx.store.save_job(job)).await?;
    Ok(())
}

async fn save_project(ctx: &EditContext, project: &Project) -> WorkerResult<()> {
    let config = RetryConfig::new("save_project");
    retry_async(&config, || ctx.store.save_project(project)).await?;
    Ok(())
}

/// Progress writes are advisory; a failed one is logged and skipped.
async fn report_progress(ctx: &EditContext, job: &mut Job, progress: f32, message: &str, logger: &JobLogger) {
    job.set_progress(progress);
    logger.log_progress(progress, message);
    if let Err(e) = ctx.store.save_job(job).await {
        logger.log_warning(&format!("Failed to save progress: {}", e));
    }
}

async fn execute_pipeline(
    ctx: &EditContext,
    job: &mut Job,
    project: &Project,
    logger: &JobLogger,
) -> WorkerResult<JobResult> {
    if project.assets.is_empty() {
        return Err(WorkerError::job_failed(NO_ASSETS));
    }

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let scratch = tempfile::Builder::new()
        .prefix(&format!("job_{}_", job.id))
        .tempdir_in(&ctx.config.work_dir)?;

    let total = project.assets.len();
    let mut candidates = Vec::new();
    let mut all_tags = BTreeSet::new();

    for (index, asset) in project.assets.iter().enumerate() {
        let (asset_candidates, tags) = analyze_asset(ctx, asset, scratch.path()).await?;
        info!(
            asset = %asset.id,
            scenes = asset_candidates.len(),
            tags = ?tags,
            "Asset analysed"
        );
        candidates.extend(asset_candidates);
        all_tags.extend(tags);

        let progress = 10.0 + 30.0 * (index + 1) as f32 / total as f32;
        report_progress(ctx, job, progress, &format!("analysed asset {}/{}", index + 1, total), logger).await;
    }
    info!(candidates = candidates.len(), tags = ?all_tags, "Analysis complete");

    let directive = ctx.interpreter.interpret(project.prompt_text()).await;
    report_progress(ctx, job, 50.0, "prompt interpreted", logger).await;

    let scenes: Vec<Scene> = candidates.iter().map(|c| c.scene.clone()).collect();
    let chosen: Vec<&Candidate> = select_shot_indices(
        &scenes,
        directive.target_seconds(),
        &directive.include_tags,
        &directive.exclude_tags,
    )
    .into_iter()
    .filter_map(|i| candidates.get(i))
    .collect();
    let selected: Vec<Interval> = chosen.iter().map(|c| c.scene.interval()).collect();
    let clips = reconcile(&selected, &chosen);
    if clips.is_empty() {
        return Err(WorkerError::job_failed(NO_CLIPS_SELECTED));
    }
    report_progress(ctx, job, 60.0, &format!("{} shot(s) selected", clips.len()), logger).await;

    let output = scratch.path().join("output.mp4");
    let outcome = ctx.renderer.render(&clips, &directive, &output).await?;
    report_progress(ctx, job, 90.0, "rendered", logger).await;

    let key = project.output_key(&Uuid::new_v4().to_string());
    let stored_key = ctx.storage.upload(&output, &key).await?;
    report_progress(ctx, job, 95.0, "uploaded", logger).await;

    if let Err(e) = scratch.close() {
        logger.log_warning(&format!("Failed to remove scratch directory: {}", e));
    }

    Ok(JobResult {
        output_key: stored_key,
        parsed_prompt: directive,
        clips_count: outcome.clips_rendered,
    })
}

/// Download one asset and turn it into tagged candidate scenes.
async fn analyze_asset(
    ctx: &EditContext,
    asset: &Asset,
    scratch: &Path,
) -> WorkerResult<(Vec<Candidate>, BTreeSet<String>)> {
    let local = scratch.join(asset.local_file_name());
    let local = ctx.storage.download(&asset.storage_key, &local).await?;

    let tags = ctx.analyzer.tag(&local, asset.kind).await;

    let intervals = match asset.kind {
        AssetKind::Image => vec![(0.0, IMAGE_CLIP_SECONDS)],
        AssetKind::Video => {
            let raw = ctx.analyzer.segment(&local).await;
            let limit = if raw.iter().any(|(_, end)| !end.is_finite()) {
                ctx.analyzer
                    .duration(&local)
                    .await
                    .unwrap_or(ctx.config.fallback_video_duration)
            } else {
                f64::INFINITY
            };
            clamp_intervals(&raw, limit)
        }
    };

    let candidates = intervals
        .into_iter()
        .map(|(start, end)| Candidate {
            scene: Scene::new(start, end)
                .with_tags(tags.iter().cloned())
                .with_score(DEFAULT_SCENE_SCORE),
            source: local.clone(),
            kind: asset.kind,
        })
        .collect();

    Ok((candidates, tags))
}

/// Replace open ends with `limit` and drop intervals left empty.
fn clamp_intervals(raw: &[(f64, f64)], limit: f64) -> Vec<(f64, f64)> {
    raw.iter()
        .map(|&(start, end)| (start, if end.is_finite() { end } else { limit }))
        .filter(|&(start, end)| start.is_finite() && start >= 0.0 && start < end)
        .collect()
}

/// Map selected intervals back to their source files.
///
/// `candidates` holds only the scenes the selector kept, so a tag-excluded
/// asset sharing an interval with a kept one is never matched. Each
/// candidate is used at most once.
fn reconcile(selected: &[Interval], candidates: &[&Candidate]) -> Vec<ClipSpec> {
    let mut used = vec![false; candidates.len()];
    let mut clips = Vec::with_capacity(selected.len());

    for interval in selected {
        let found = candidates.iter().enumerate().find(|(i, c)| {
            !used[*i] && c.scene.interval().matches(interval, RECONCILE_TOLERANCE_SECS)
        });
        match found {
            Some((i, candidate)) => {
                used[i] = true;
                clips.push(ClipSpec::new(
                    candidate.source.clone(),
                    candidate.kind,
                    candidate.scene.start,
                    candidate.scene.end,
                ));
            }
            None => warn!(
                start = interval.start,
                end = interval.end,
                "Selected interval has no matching source"
            ),
        }
    }

    clips
}
