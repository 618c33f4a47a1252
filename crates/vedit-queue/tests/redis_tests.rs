//! Redis integration tests.

use vedit_models::{Job, JobId, Project, ProjectId};
use vedit_queue::{EditJob, JobQueue, JobStore, QueueError, RedisJobStore};

async fn queue() -> JobQueue {
    dotenvy::dotenv().ok();
    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let queue = queue().await;
    queue.ping().await.expect("Ping failed");
    queue.len().await.expect("Failed to get queue length");
}

/// Test job enqueue and dequeue cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_dequeue() {
    let queue = queue().await;

    let job = EditJob::new(JobId::new(), ProjectId::new());
    let message_id = queue.enqueue_edit(&job).await.expect("Failed to enqueue");
    assert!(!message_id.is_empty());

    let jobs = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");

    let (msg_id, consumed) = jobs
        .iter()
        .find(|(_, j)| j.job_id == job.job_id)
        .expect("enqueued job not consumed");
    assert_eq!(consumed, &job);

    queue.ack(msg_id).await.expect("Failed to ack");
}

/// A job ID can only be enqueued once within the dedup window.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_rejected() {
    let queue = queue().await;

    let job = EditJob::new(JobId::new(), ProjectId::new());
    let message_id = queue.enqueue_edit(&job).await.expect("Failed to enqueue");

    let second = queue.enqueue_edit(&job).await;
    assert!(matches!(second, Err(QueueError::Duplicate(_))));

    queue.ack(&message_id).await.expect("Failed to ack");
}

/// Test DLQ functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq() {
    let queue = queue().await;

    let job = EditJob::new(JobId::new(), ProjectId::new());
    let message_id = queue.enqueue_edit(&job).await.expect("Failed to enqueue");

    let before = queue.dlq_len().await.expect("Failed to get DLQ length");
    queue
        .dlq(&message_id, &job, "Test error")
        .await
        .expect("Failed to move to DLQ");
    let after = queue.dlq_len().await.expect("Failed to get DLQ length");

    assert!(after > before);
}

/// Records survive a round trip and the latest-job index follows creation time.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_store() {
    dotenvy::dotenv().ok();
    let store = RedisJobStore::from_env().expect("Failed to create store");

    let project = Project::new("integration", Some("30 seconds".to_string()), vec![]);
    store.save_project(&project).await.expect("save project");

    let first = Job::new(project.id.clone());
    let mut second = Job::new(project.id.clone());
    second.created_at = first.created_at + chrono::Duration::seconds(1);
    store.save_job(&second).await.expect("save job");
    store.save_job(&first).await.expect("save job");

    let loaded = store
        .get_project(&project.id)
        .await
        .expect("get project")
        .expect("project missing");
    assert_eq!(loaded.title, "integration");

    let latest = store
        .latest_job_for_project(&project.id)
        .await
        .expect("latest job")
        .expect("no latest job");
    assert_eq!(latest.id, second.id);
}
