//! Task record store.
//!
//! The service talks to persistence through [`TaskStore`] and
//! [`ProfileDirectory`]. [`DocumentStore`] implements both over a single
//! JSON document, either kept in memory or backed by a file.

use crate::models::{timestamp, Priority, Task, TaskStatus, TaskUpdate, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode store file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode store document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("record not found: {0}")]
    Missing(String),

    #[error("record already exists: {0}")]
    Duplicate(String),
}

impl StoreError {
    /// Whether repeating the call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Selection criteria for [`TaskStore::list`].
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub owner: Option<String>,
    pub subject: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    /// Case-insensitive text in title or description.
    pub search: Option<String>,
    /// Due on this UTC calendar day.
    pub due_on: Option<NaiveDate>,
    /// Created within this window, both ends inclusive.
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TaskFilter {
    /// All tasks of one owner.
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Default::default()
        }
    }

    /// Tasks of one owner created inside `[start, end]`.
    pub fn created_in_range(
        owner: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            created_between: Some((start, end)),
            ..Self::owned_by(owner)
        }
    }

    /// Check whether a task passes every set criterion.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(ref owner) = self.owner {
            if &task.owner != owner {
                return false;
            }
        }
        if let Some(ref subject) = self.subject {
            if &task.subject != subject {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            if !search.is_empty() && !task.matches_search(search) {
                return false;
            }
        }
        if let Some(day) = self.due_on {
            if task.due_date.date_naive() != day {
                return false;
            }
        }
        if let Some((start, end)) = self.created_between {
            if task.created_at < start || task.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Persistence contract for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch a task by id.
    async fn get(&self, id: &str) -> StoreResult<Option<Task>>;

    /// Fetch every task matching the filter, in insertion order.
    async fn list(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;

    /// Store a new task.
    async fn insert(&self, task: &Task) -> StoreResult<()>;

    /// Apply a partial update and return the stored result.
    ///
    /// Returns [`StoreError::Missing`] when the id is unknown.
    async fn update(&self, id: &str, update: &TaskUpdate) -> StoreResult<Task>;

    /// Remove a task. Removing an unknown id is not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// Lookup of user profiles for notification addresses.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, owner: &str) -> StoreResult<Option<UserProfile>>;
}

/// On-disk layout of the document store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub profiles: Vec<UserProfile>,
}

/// JSON document store.
///
/// File-backed instances rewrite the whole file after each mutation.
/// A mutation only becomes visible once that write has succeeded.
pub struct DocumentStore {
    path: Option<PathBuf>,
    state: RwLock<StoreDocument>,
}

impl DocumentStore {
    /// Create a store that lives only in memory.
    #[cfg(test)]
    pub fn in_memory(document: StoreDocument) -> Self {
        Self {
            path: None,
            state: RwLock::new(document),
        }
    }

    /// Open a file-backed store. A missing file starts empty.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let document = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => StoreDocument::default(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Decode {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {} not found, starting empty", path.display());
                StoreDocument::default()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        info!(
            "Opened store {} ({} tasks, {} profiles)",
            path.display(),
            document.tasks.len(),
            document.profiles.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(document),
        })
    }

    /// Add or replace a user profile.
    pub async fn upsert_profile(&self, profile: UserProfile) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        match next.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => next.profiles.push(profile),
        }
        self.commit(&mut state, next).await
    }

    /// Write `next` out, then make it the live document. A failed write
    /// leaves `current` untouched, so a retried call sees the same state
    /// as the first attempt.
    async fn commit(&self, current: &mut StoreDocument, next: StoreDocument) -> StoreResult<()> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    async fn persist(&self, document: &StoreDocument) -> StoreResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(document).map_err(StoreError::Encode)?;

        // Write beside the target, then rename over it.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        debug!("Persisted store to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl TaskStore for DocumentStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Task>> {
        let state = self.state.read().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn insert(&self, task: &Task) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.tasks.iter().any(|t| t.id == task.id) {
            return Err(StoreError::Duplicate(task.id.clone()));
        }

        let mut next = state.clone();
        next.tasks.push(task.clone());
        self.commit(&mut state, next).await
    }

    async fn update(&self, id: &str, update: &TaskUpdate) -> StoreResult<Task> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let task = next
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::Missing(id.to_string()))?;

        update.apply(task);
        let updated = task.clone();

        self.commit(&mut state, next).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.tasks.iter().any(|t| t.id == id) {
            return Ok(());
        }

        let mut next = state.clone();
        next.tasks.retain(|t| t.id != id);
        self.commit(&mut state, next).await
    }
}

#[async_trait]
impl ProfileDirectory for DocumentStore {
    async fn profile(&self, owner: &str) -> StoreResult<Option<UserProfile>> {
        let state = self.state.read().await;
        Ok(state.profiles.iter().find(|p| p.id == owner).cloned())
    }
}

/// Parse a `YYYY-MM-DD` day for [`TaskFilter::due_on`].
pub fn parse_day(value: &str) -> Result<NaiveDate, String> {
    timestamp::parse(value).map(|instant| instant.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_task(id: &str, owner: &str, created: &str) -> Task {
        Task {
            id: id.to_string(),
            owner: owner.to_string(),
            title: format!("Read chapter {}", id),
            description: Some("Take notes".to_string()),
            subject: "Physics".to_string(),
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            due_date: timestamp::parse("2024-02-10T12:00:00Z").unwrap(),
            created_at: timestamp::parse(created).unwrap(),
            completed_at: None,
            attachments: Vec::new(),
        }
    }

    fn seeded() -> DocumentStore {
        DocumentStore::in_memory(StoreDocument {
            tasks: vec![
                create_test_task("1", "alice", "2024-01-01"),
                create_test_task("2", "alice", "2024-01-15"),
                create_test_task("3", "bob", "2024-01-10"),
            ],
            profiles: vec![UserProfile {
                id: "alice".to_string(),
                email: "alice@example.edu".to_string(),
                name: None,
            }],
        })
    }

    #[test]
    fn test_filter_matches() {
        let task = create_test_task("1", "alice", "2024-01-01");

        assert!(TaskFilter::default().matches(&task));
        assert!(TaskFilter::owned_by("alice").matches(&task));
        assert!(!TaskFilter::owned_by("bob").matches(&task));

        let search = TaskFilter {
            search: Some("NOTES".to_string()),
            ..Default::default()
        };
        assert!(search.matches(&task));

        let due = TaskFilter {
            due_on: Some(parse_day("2024-02-10").unwrap()),
            ..Default::default()
        };
        assert!(due.matches(&task));

        let wrong_status = TaskFilter {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(!wrong_status.matches(&task));
    }

    #[tokio::test]
    async fn test_list_in_range_is_inclusive() {
        let store = seeded();
        let filter = TaskFilter::created_in_range(
            "alice",
            timestamp::parse("2024-01-01").unwrap(),
            timestamp::parse("2024-01-14").unwrap(),
        );

        let tasks = store.list(&filter).await.unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();

        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate() {
        let store = seeded();
        let result = store.insert(&create_test_task("1", "alice", "2024-01-01")).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = seeded();
        let update = TaskUpdate {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };

        let updated = store.update("2", &update).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(store.get("2").await.unwrap().unwrap().title, "Renamed");

        assert!(matches!(
            store.update("nope", &update).await,
            Err(StoreError::Missing(_))
        ));

        store.delete("2").await.unwrap();
        assert!(store.get("2").await.unwrap().is_none());
        store.delete("2").await.unwrap();
    }

    #[tokio::test]
    async fn test_profile_lookup() {
        let store = seeded();
        let profile = store.profile("alice").await.unwrap().unwrap();
        assert_eq!(profile.email, "alice@example.edu");
        assert!(store.profile("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        let store = DocumentStore::open(&path).await.unwrap();
        store
            .insert(&create_test_task("9", "carol", "2024-01-01"))
            .await
            .unwrap();
        store
            .upsert_profile(UserProfile {
                id: "carol".to_string(),
                email: "carol@example.edu".to_string(),
                name: Some("Carol".to_string()),
            })
            .await
            .unwrap();

        let reopened = DocumentStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("9").await.unwrap().unwrap().owner, "carol");
        assert!(reopened.profile("carol").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        let store = DocumentStore::open(&path).await.unwrap();
        store
            .insert(&create_test_task("1", "alice", "2024-01-01"))
            .await
            .unwrap();

        // A directory in the way of the temporary file makes every write fail
        let blocker = temp_dir.path().join("tasks.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let insert = store.insert(&create_test_task("2", "alice", "2024-01-02")).await;
        assert!(matches!(insert, Err(StoreError::Io { .. })));
        assert!(store.get("2").await.unwrap().is_none());

        let update = TaskUpdate {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(store.update("1", &update).await.is_err());
        assert_eq!(store.get("1").await.unwrap().unwrap().title, "Read chapter 1");

        let delete = store.delete("1").await;
        assert!(matches!(delete, Err(StoreError::Io { .. })));
        assert!(store.get("1").await.unwrap().is_some());

        // Once the write succeeds, the same calls go through
        std::fs::remove_dir(&blocker).unwrap();
        store.delete("1").await.unwrap();
        store
            .insert(&create_test_task("2", "alice", "2024-01-02"))
            .await
            .unwrap();

        let reopened = DocumentStore::open(&path).await.unwrap();
        assert!(reopened.get("1").await.unwrap().is_none());
        assert!(reopened.get("2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = DocumentStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }
}
