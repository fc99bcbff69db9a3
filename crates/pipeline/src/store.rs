//! Task registry with TTL expiry.
//!
//! Records are held in process memory only; a restart forgets every task
//! (the engine itself still answers for completed ones).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use fluxgen_core::types::{TaskId, Timestamp};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    /// Seed requested at submission; unknown for tasks first seen on poll.
    pub seed: Option<u32>,
    pub status: TaskStatus,
    pub images: Vec<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl TaskRecord {
    pub fn pending(task_id: impl Into<TaskId>, seed: Option<u32>, now: Timestamp, ttl: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            seed,
            status: TaskStatus::Pending,
            images: Vec::new(),
            error: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn completed(mut self, images: Vec<String>, error: Option<String>) -> Self {
        self.status = TaskStatus::Completed;
        self.images = images;
        self.error = error;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Storage seam for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Live record for `task_id`; expired records are treated as absent.
    async fn get(&self, task_id: &str) -> Option<TaskRecord>;

    /// Insert or replace, unless the stored record is already completed.
    async fn put(&self, record: TaskRecord);

    async fn evict(&self, task_id: &str) -> Option<TaskRecord>;

    /// Drop every record expired at `now`. Returns how many were dropped.
    async fn evict_expired(&self, now: Timestamp) -> usize;

    /// Record a completion. The first completion wins: if a live completed
    /// record exists it is returned unchanged and `record` is discarded.
    async fn complete(&self, record: TaskRecord) -> TaskRecord;

    async fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        let records = self.records.read().await;
        records
            .get(task_id)
            .filter(|r| !r.is_expired(chrono::Utc::now()))
            .cloned()
    }

    async fn put(&self, record: TaskRecord) {
        let mut records = self.records.write().await;
        let now = chrono::Utc::now();
        if let Some(existing) = records.get(&record.task_id) {
            if existing.is_completed() && !existing.is_expired(now) {
                return;
            }
        }
        records.insert(record.task_id.clone(), record);
    }

    async fn evict(&self, task_id: &str) -> Option<TaskRecord> {
        self.records.write().await.remove(task_id)
    }

    async fn evict_expired(&self, now: Timestamp) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        before - records.len()
    }

    async fn complete(&self, record: TaskRecord) -> TaskRecord {
        let mut records = self.records.write().await;
        let now = chrono::Utc::now();
        if let Some(existing) = records.get(&record.task_id) {
            if existing.is_completed() && !existing.is_expired(now) {
                return existing.clone();
            }
        }
        records.insert(record.task_id.clone(), record.clone());
        record
    }

    async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}
