//! Task use-case service.
//!
//! Every per-task entry point goes through [`authorize`]: a task can be
//! read or changed only by its owner, and a foreign task looks exactly like
//! a missing one. Collaborators are injected at construction time and every
//! call to them runs under the service's [`RetryPolicy`].

use crate::analysis;
use crate::error::{TaskError, TaskResult};
use crate::models::{
    AggregateReport, DashboardSummary, NewTask, ReportPeriod, Task, TaskStatus, TaskUpdate,
    UserAnalytics, UserProfile,
};
use crate::notify::{DispatchError, Notification, NotificationDispatcher};
use crate::report;
use crate::retry::RetryPolicy;
use crate::store::{ProfileDirectory, StoreError, TaskFilter, TaskStore};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Only the owner may act on a task.
///
/// A missing task and a foreign task produce the same error.
pub fn authorize(task: Option<Task>, id: &str, identity: &str) -> TaskResult<Task> {
    match task {
        Some(task) if task.owner == identity => Ok(task),
        Some(_) => {
            debug!("Rejected access to task {} by {}", id, identity);
            Err(TaskError::NotFound { id: id.to_string() })
        }
        None => Err(TaskError::NotFound { id: id.to_string() }),
    }
}

/// Turn a caller's update into the update actually stored.
///
/// Entering COMPLETED stamps `completed_at` with `now` unless the caller
/// supplied one; leaving COMPLETED clears it.
pub fn resolve_update(
    current: &Task,
    request: &TaskUpdate,
    now: DateTime<Utc>,
) -> TaskResult<TaskUpdate> {
    if let Some(ref title) = request.title {
        if title.trim().is_empty() {
            return Err(TaskError::validation("title cannot be empty"));
        }
    }

    if let Some(Some(done)) = request.completed_at {
        if done > now {
            return Err(TaskError::validation("completion time cannot be in the future"));
        }
    }

    let mut resolved = request.clone();
    let target = request.status.unwrap_or(current.status);

    if target == TaskStatus::Completed {
        match request.completed_at {
            Some(Some(_)) => {}
            Some(None) => {
                return Err(TaskError::validation(
                    "a completed task must keep its completion time",
                ))
            }
            None => {
                if !(current.is_completed() && current.completed_at.is_some()) {
                    resolved.completed_at = Some(Some(now));
                }
            }
        }
    } else {
        if let Some(Some(_)) = request.completed_at {
            return Err(TaskError::validation(
                "completion time requires status COMPLETED",
            ));
        }
        if current.completed_at.is_some() {
            resolved.completed_at = Some(None);
        }
    }

    Ok(resolved)
}

/// Task operations for authenticated callers.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    profiles: Arc<dyn ProfileDirectory>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    retry: RetryPolicy,
    clock: Clock,
}

impl TaskService {
    /// Create a service with the default retry policy and the system clock.
    pub fn new(
        store: Arc<dyn TaskStore>,
        profiles: Arc<dyn ProfileDirectory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            profiles,
            dispatcher,
            retry: RetryPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // Store access

    async fn fetch(&self, id: &str) -> TaskResult<Option<Task>> {
        self.retry
            .run("store.get", || self.store.get(id), StoreError::is_transient)
            .await
    }

    async fn fetch_owned(&self, identity: &str, id: &str) -> TaskResult<Task> {
        authorize(self.fetch(id).await?, id, identity)
    }

    async fn query(&self, filter: &TaskFilter) -> TaskResult<Vec<Task>> {
        self.retry
            .run("store.list", || self.store.list(filter), StoreError::is_transient)
            .await
    }

    async fn store_update(&self, id: &str, update: &TaskUpdate) -> TaskResult<Task> {
        self.retry
            .run(
                "store.update",
                || self.store.update(id, update),
                StoreError::is_transient,
            )
            .await
            .map_err(|e| missing_as_not_found(e, id))
    }

    async fn profile_of(&self, owner: &str) -> TaskResult<UserProfile> {
        self.retry
            .run(
                "profiles.get",
                || self.profiles.profile(owner),
                StoreError::is_transient,
            )
            .await?
            .ok_or_else(|| TaskError::ProfileNotFound {
                owner: owner.to_string(),
            })
    }

    async fn dispatch(&self, notification: &Notification) -> TaskResult<()> {
        self.retry
            .run(
                "notify.send",
                || self.dispatcher.send(notification),
                DispatchError::is_retryable,
            )
            .await
    }

    // Task CRUD

    /// Create a task owned by `identity`.
    pub async fn create_task(&self, identity: &str, request: NewTask) -> TaskResult<Task> {
        let now = self.now();
        let due_date = request.validate(now)?;
        let task = request.into_task(Uuid::new_v4().to_string(), identity.to_string(), due_date, now);

        self.retry
            .run("store.insert", || self.store.insert(&task), StoreError::is_transient)
            .await?;

        info!("Created task {} for {}", task.id, identity);
        Ok(task)
    }

    /// Fetch one of the caller's tasks.
    pub async fn get_task(&self, identity: &str, id: &str) -> TaskResult<Task> {
        self.fetch_owned(identity, id).await
    }

    /// List the caller's tasks matching `filter`.
    ///
    /// The owner criterion is always forced to the caller.
    pub async fn list_tasks(&self, identity: &str, filter: TaskFilter) -> TaskResult<Vec<Task>> {
        let filter = TaskFilter {
            owner: Some(identity.to_string()),
            ..filter
        };
        self.query(&filter).await
    }

    /// Apply a partial update to one of the caller's tasks.
    pub async fn update_task(
        &self,
        identity: &str,
        id: &str,
        update: &TaskUpdate,
    ) -> TaskResult<Task> {
        let current = self.fetch_owned(identity, id).await?;
        let resolved = resolve_update(&current, update, self.now())?;
        let task = self.store_update(id, &resolved).await?;

        info!("Updated task {} ({})", id, task.status);
        Ok(task)
    }

    /// Delete one of the caller's tasks.
    pub async fn delete_task(&self, identity: &str, id: &str) -> TaskResult<()> {
        self.fetch_owned(identity, id).await?;

        self.retry
            .run("store.delete", || self.store.delete(id), StoreError::is_transient)
            .await?;

        info!("Deleted task {}", id);
        Ok(())
    }

    /// Apply the same update to several tasks, one at a time.
    ///
    /// Ids that are missing or not owned by the caller are skipped. There is
    /// no rollback: a failure part way leaves earlier tasks updated.
    /// `progress` is called after each id.
    pub async fn bulk_update<P>(
        &self,
        identity: &str,
        ids: &[String],
        update: &TaskUpdate,
        progress: P,
    ) -> TaskResult<Vec<Task>>
    where
        P: Fn(&str),
    {
        let mut updated = Vec::new();

        for id in ids {
            if let Some(task) = self.bulk_update_one(identity, id, update).await? {
                updated.push(task);
            }
            progress(id);
        }

        info!(
            "Bulk update changed {} of {} task(s)",
            updated.len(),
            ids.len()
        );
        Ok(updated)
    }

    async fn bulk_update_one(
        &self,
        identity: &str,
        id: &str,
        update: &TaskUpdate,
    ) -> TaskResult<Option<Task>> {
        let current = match self.fetch_owned(identity, id).await {
            Ok(task) => task,
            Err(TaskError::NotFound { .. }) => {
                debug!("Skipping task {} in bulk update", id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let resolved = resolve_update(&current, update, self.now())?;
        match self.store_update(id, &resolved).await {
            Ok(task) => Ok(Some(task)),
            Err(TaskError::NotFound { .. }) => {
                debug!("Task {} vanished during bulk update", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // Notifications

    /// Email the owner a reminder about one of their tasks.
    pub async fn send_reminder(&self, identity: &str, id: &str) -> TaskResult<Notification> {
        let task = self.fetch_owned(identity, id).await?;
        let profile = self.profile_of(&task.owner).await?;

        let notification = Notification {
            to: profile.email,
            subject: report::reminder_subject(&task),
            body_html: report::render_reminder_html(&task),
        };
        self.dispatch(&notification).await?;

        info!("Sent reminder for task {} to {}", id, notification.to);
        Ok(notification)
    }

    /// Aggregate the caller's tasks created within `[start, end]`.
    pub async fn build_report(
        &self,
        identity: &str,
        start: &str,
        end: &str,
    ) -> TaskResult<AggregateReport> {
        let period = ReportPeriod::parse(start, end)?;
        let filter = TaskFilter::created_in_range(identity, period.start, period.end);
        let tasks = self.query(&filter).await?;

        debug!("Building report over {} task(s) for {}", tasks.len(), identity);
        Ok(analysis::full_report(&tasks, &period, self.now()))
    }

    /// Build the period report and email it to the caller.
    pub async fn generate_report(
        &self,
        identity: &str,
        start: &str,
        end: &str,
    ) -> TaskResult<AggregateReport> {
        let report = self.build_report(identity, start, end).await?;
        let profile = self.profile_of(identity).await?;

        let notification = Notification {
            to: profile.email,
            subject: report::report_subject(&report),
            body_html: report::render_report_html(&report),
        };
        self.dispatch(&notification).await?;

        info!("Sent report for {} to {}", report.period, notification.to);
        Ok(report)
    }

    // Queries

    /// The caller's tasks that are past due and not completed.
    pub async fn overdue_tasks(&self, identity: &str) -> TaskResult<Vec<Task>> {
        let now = self.now();
        let tasks = self.query(&TaskFilter::owned_by(identity)).await?;
        Ok(tasks.into_iter().filter(|t| t.is_overdue(now)).collect())
    }

    /// The caller's tasks with exactly this subject.
    pub async fn tasks_by_subject(&self, identity: &str, subject: &str) -> TaskResult<Vec<Task>> {
        let filter = TaskFilter {
            subject: Some(subject.to_string()),
            ..TaskFilter::owned_by(identity)
        };
        self.query(&filter).await
    }

    /// The caller's tasks due on this UTC day.
    pub async fn tasks_due_on(&self, identity: &str, day: NaiveDate) -> TaskResult<Vec<Task>> {
        let filter = TaskFilter {
            due_on: Some(day),
            ..TaskFilter::owned_by(identity)
        };
        self.query(&filter).await
    }

    /// Headline analytics over all of the caller's tasks.
    pub async fn user_analytics(&self, identity: &str) -> TaskResult<UserAnalytics> {
        let tasks = self.query(&TaskFilter::owned_by(identity)).await?;
        Ok(analysis::user_analytics(&tasks, self.now()))
    }

    /// Dashboard snapshot with the next `upcoming` open tasks.
    pub async fn dashboard(&self, identity: &str, upcoming: usize) -> TaskResult<DashboardSummary> {
        let tasks = self.query(&TaskFilter::owned_by(identity)).await?;
        Ok(analysis::dashboard_summary(&tasks, self.now(), upcoming))
    }
}

fn missing_as_not_found(err: TaskError, id: &str) -> TaskError {
    match err {
        TaskError::Dependency { ref source, .. }
            if matches!(
                source.downcast_ref::<StoreError>(),
                Some(StoreError::Missing(_))
            ) =>
        {
            TaskError::NotFound { id: id.to_string() }
        }
        other => other,
    }
}
