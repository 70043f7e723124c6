//! Data models for student tasks.
//!
//! This module contains the task entity, the requests that create and
//! modify it, and the derived statistics objects built by the aggregator.

use crate::error::{TaskError, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Priority of a task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::High => write!(f, "HIGH"),
            Priority::Urgent => write!(f, "URGENT"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl Priority {
    /// Returns an emoji representation of the priority.
    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::Low => "🟢",
            Priority::Medium => "🟡",
            Priority::High => "🟠",
            Priority::Urgent => "🔴",
        }
    }
}

/// Lifecycle state of a task.
///
/// Any state may move to any other through an explicit update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Reference to a file kept in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Object storage key.
    pub key: String,
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A student task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque identifier, unique in the store.
    pub id: String,
    /// Identity that created the task. Never changes.
    pub owner: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-text subject label; may be empty.
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(with = "timestamp")]
    pub due_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Set while the task is completed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Due strictly before `now` and not completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date < now && !self.is_completed()
    }

    /// Completed with a completion time on or before the due date.
    pub fn completed_on_time(&self) -> bool {
        self.is_completed()
            && self
                .completed_at
                .map(|done| done <= self.due_date)
                .unwrap_or(false)
    }

    /// Case-insensitive match on title or description.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

/// Request to create a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub subject: String,
    /// Defaults to [`Priority::Medium`].
    pub priority: Option<Priority>,
    /// Defaults to [`TaskStatus::Pending`].
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

impl NewTask {
    /// Check the request against creation rules.
    pub fn validate(&self, now: DateTime<Utc>) -> TaskResult<DateTime<Utc>> {
        if self.title.trim().is_empty() {
            return Err(TaskError::validation("title is required"));
        }

        let due_date = self
            .due_date
            .ok_or_else(|| TaskError::validation("due date is required"))?;

        if due_date < now {
            return Err(TaskError::validation("due date cannot be in the past"));
        }

        Ok(due_date)
    }

    /// Build the stored task. Call [`NewTask::validate`] first.
    pub fn into_task(
        self,
        id: String,
        owner: String,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Task {
        let status = self.status.unwrap_or_default();
        Task {
            id,
            owner,
            title: self.title.trim().to_string(),
            description: self.description,
            subject: self.subject,
            priority: self.priority.unwrap_or_default(),
            status,
            due_date,
            created_at: now,
            completed_at: (status == TaskStatus::Completed).then_some(now),
            attachments: self.attachments,
        }
    }
}

/// Partial update of a task.
///
/// Owner and id cannot be changed. `description` and `completed_at` use
/// `Some(None)` to clear the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub subject: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub attachments: Option<Vec<Attachment>>,
}

impl TaskUpdate {
    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }

    /// Copy every provided field onto `task`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = description.clone();
        }
        if let Some(ref subject) = self.subject {
            task.subject = subject.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(ref attachments) = self.attachments {
            task.attachments = attachments.clone();
        }
    }
}

/// Profile used to address notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Creation-time window of a report.
///
/// Keeps the caller's literal date strings for the period label.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPeriod {
    start_label: String,
    end_label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    /// Parse both bounds; the start must not be after the end.
    pub fn parse(start: &str, end: &str) -> TaskResult<Self> {
        let start_at = timestamp::parse(start).map_err(TaskError::Validation)?;
        let end_at = timestamp::parse(end).map_err(TaskError::Validation)?;

        if start_at > end_at {
            return Err(TaskError::validation(format!(
                "report period starts after it ends: {} to {}",
                start, end
            )));
        }

        Ok(Self {
            start_label: start.trim().to_string(),
            end_label: end.trim().to_string(),
            start: start_at,
            end: end_at,
        })
    }

    /// `"{start} to {end}"`.
    pub fn label(&self) -> String {
        format!("{} to {}", self.start_label, self.end_label)
    }
}

/// Summary statistics for one owner over one period.
///
/// Built once per aggregation call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub period: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub tasks_by_subject: BTreeMap<String, usize>,
    pub tasks_by_priority: BTreeMap<Priority, usize>,
    /// Mean days from creation to completion.
    pub average_completion_time: f64,
    /// Percent of all tasks completed on or before their due date.
    pub productivity_score: f64,
}

impl AggregateReport {
    /// Completed share in percent, `0.0` when there are no tasks.
    pub fn completion_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.completed_tasks as f64 / self.total_tasks as f64 * 100.0
    }
}

/// Headline analytics over every task of an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnalytics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub average_completion_time: f64,
    pub productivity_score: f64,
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

/// Snapshot shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: StatusBreakdown,
    pub overdue: usize,
    /// Whole percent, 0 when there are no tasks.
    pub completion_rate: u32,
    /// Open (not completed) tasks per priority.
    pub open_by_priority: BTreeMap<Priority, usize>,
    pub tasks_by_subject: BTreeMap<String, usize>,
    /// Next open tasks by due date.
    pub upcoming: Vec<Task>,
}

/// ISO-8601 timestamps on the wire.
///
/// Accepts RFC 3339 instants or bare `YYYY-MM-DD` dates (midnight UTC) and
/// writes RFC 3339 with millisecond precision.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Parse a wire timestamp.
    pub fn parse(value: &str) -> Result<DateTime<Utc>, String> {
        let value = value.trim();

        if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
            return Ok(instant.with_timezone(&Utc));
        }

        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("invalid timestamp: {:?}", value))
    }

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(instant) => super::serialize(instant, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
