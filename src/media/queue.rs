//! Media task queue (C10): durable, in-process FIFO driving the analyzer.
//!
//! Grounded in `Smebbs-lytt::vector_store::sqlite`'s auxiliary-table pattern
//! (a second table sharing the same connection and transactional
//! guarantees as the primary store).

use std::sync::Arc;

use crate::domain::{MediaTask, TaskStatus};
use crate::error::QueueError;
use crate::logging::{keys, Logger};
use crate::media::analyzer::MediaAnalyzer;
use crate::store::SqliteStore;

/// Durable FIFO of pending media-analysis work, backed by the `media_tasks`
/// table in the same SQLite file as the vector store.
pub struct MediaTaskQueue {
    store: Arc<SqliteStore>,
    analyzer: Arc<dyn MediaAnalyzer>,
    logger: Logger,
}

impl MediaTaskQueue {
    pub fn new(store: Arc<SqliteStore>, analyzer: Arc<dyn MediaAnalyzer>) -> Self {
        Self { store, analyzer, logger: Logger::root() }
    }

    pub async fn enqueue(&self, task: MediaTask) -> Result<MediaTask, QueueError> {
        self.store.insert_media_task(&task).await.map_err(|e| QueueError::InvalidState { task_id: task.id.clone(), state: e.to_string() })?;
        Ok(task)
    }

    pub async fn get_pending_count(&self) -> Result<u64, QueueError> {
        self.store
            .count_media_tasks_by_status(TaskStatus::Pending)
            .await
            .map_err(|e| QueueError::InvalidState { task_id: "*".into(), state: e.to_string() })
    }

    /// Claims the oldest pending task, runs the analyzer under the rate
    /// limiter the analyzer itself owns, and writes `completed`/`failed`.
    /// Returns whether work was done.
    pub async fn process_one(&self) -> Result<bool, QueueError> {
        let task = self
            .store
            .next_pending_media_task()
            .await
            .map_err(|e| QueueError::InvalidState { task_id: "*".into(), state: e.to_string() })?;

        let Some(mut task) = task else {
            return Ok(false);
        };

        task.status = TaskStatus::Processing;
        self.store.update_media_task(&task).await.map_err(|e| QueueError::InvalidState { task_id: task.id.clone(), state: e.to_string() })?;

        let logger = self.logger.bind(keys::TASK_ID, &task.id);
        logger.info("claimed media task");

        match self
            .analyzer
            .analyze(&task.media_path, task.media_type, task.user_prompt.as_deref(), task.context_text.as_deref())
            .await
        {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                task.error_message = None;
                task.processed_at = Some(chrono::Utc::now());
                logger.info("media task completed");
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(err.to_string());
                task.processed_at = Some(chrono::Utc::now());
                logger.warn(&format!("media task failed: {err}"));
            }
        }

        self.store.update_media_task(&task).await.map_err(|e| QueueError::InvalidState { task_id: task.id.clone(), state: e.to_string() })?;
        Ok(true)
    }

    /// Processes up to `max` tasks, stopping at the first failure. Returns
    /// the count of tasks completed successfully.
    pub async fn process_batch(&self, max: usize) -> Result<usize, QueueError> {
        let mut completed = 0;
        for _ in 0..max {
            let task_before = self.store.next_pending_media_task().await.map_err(|e| QueueError::InvalidState { task_id: "*".into(), state: e.to_string() })?;
            let Some(task_before) = task_before else { break };

            let did_work = self.process_one().await?;
            if !did_work {
                break;
            }

            let task_after = self
                .store
                .get_media_task_by_id(&task_before.id)
                .await
                .map_err(|e| QueueError::InvalidState { task_id: task_before.id.clone(), state: e.to_string() })?;
            match task_after.map(|t| t.status) {
                Some(TaskStatus::Completed) => completed += 1,
                Some(TaskStatus::Failed) => break,
                _ => break,
            }
        }
        Ok(completed)
    }

    /// Resets a failed task back to `pending`, clearing `error_message`.
    pub async fn retry(&self, task_id: &str) -> Result<(), QueueError> {
        let mut task = self
            .store
            .get_media_task_by_id(task_id)
            .await
            .map_err(|e| QueueError::InvalidState { task_id: task_id.to_string(), state: e.to_string() })?
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Failed {
            return Err(QueueError::InvalidState { task_id: task_id.to_string(), state: task.status.to_string() });
        }
        task.status = TaskStatus::Pending;
        task.error_message = None;
        self.store.update_media_task(&task).await.map_err(|e| QueueError::InvalidState { task_id: task_id.to_string(), state: e.to_string() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{AnalysisResult, MediaType};
    use crate::media::analyzer::MockAnalyzer;

    async fn open_test_queue(analyzer: Arc<dyn MediaAnalyzer>) -> MediaTaskQueue {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("queue.db"));
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        MediaTaskQueue::new(store, analyzer)
    }

    #[tokio::test]
    async fn processes_three_tasks_in_fifo_order() {
        let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult { description: "ok".into(), ..Default::default() }));
        let queue = open_test_queue(analyzer).await;

        let mut t0 = MediaTask::new("/a.png", MediaType::Image);
        let mut t1 = MediaTask::new("/b.png", MediaType::Image);
        let mut t2 = MediaTask::new("/c.png", MediaType::Image);
        t0.created_at -= chrono::Duration::seconds(2);
        t1.created_at -= chrono::Duration::seconds(1);
        let _ = &mut t2;

        queue.enqueue(t0.clone()).await.unwrap();
        queue.enqueue(t1.clone()).await.unwrap();
        queue.enqueue(t2.clone()).await.unwrap();

        assert!(queue.process_one().await.unwrap());
        let first = queue.store.get_media_task_by_id(&t0.id).await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Completed);

        assert_eq!(queue.process_batch(2).await.unwrap(), 2);
        assert_eq!(queue.get_pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_task_leaves_later_tasks_pending() {
        struct FailingAnalyzer;
        #[async_trait::async_trait]
        impl MediaAnalyzer for FailingAnalyzer {
            async fn analyze(&self, _: &str, _: MediaType, _: Option<&str>, _: Option<&str>) -> Result<AnalysisResult, crate::error::AnalyzeError> {
                Err(crate::error::AnalyzeError::Upstream("boom".into()))
            }
        }

        let queue = open_test_queue(Arc::new(FailingAnalyzer)).await;
        let t0 = MediaTask::new("/a.png", MediaType::Image);
        let t1 = MediaTask::new("/b.png", MediaType::Image);
        queue.enqueue(t0).await.unwrap();
        queue.enqueue(t1.clone()).await.unwrap();

        let completed = queue.process_batch(2).await.unwrap();
        assert_eq!(completed, 0);
        let second = queue.store.get_media_task_by_id(&t1.id).await.unwrap().unwrap();
        assert_eq!(second.status, TaskStatus::Pending);
    }
}
