//! Application state.

use std::sync::Arc;

use vedit_queue::{JobDispatch, JobQueue, JobStore, QueueResult, RedisJobStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobDispatch>,
}

impl AppState {
    /// Build state backed by Redis from environment variables.
    pub fn from_env(config: ApiConfig) -> QueueResult<Self> {
        let store = RedisJobStore::from_env()?;
        let queue = JobQueue::from_env()?;
        Ok(Self::with_services(config, Arc::new(store), Arc::new(queue)))
    }

    pub fn with_services(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobDispatch>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
        }
    }
}
