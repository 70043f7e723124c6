//! Task aggregation and statistics.
//!
//! Pure functions over an already-fetched task list. Nothing here performs
//! I/O or mutates its input; "now" is always passed in by the caller.

use crate::models::{
    AggregateReport, DashboardSummary, Priority, ReportPeriod, StatusBreakdown, Task, TaskStatus,
    UserAnalytics,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Count tasks with status COMPLETED.
pub fn completed_count(tasks: &[Task]) -> usize {
    tasks.iter().filter(|t| t.is_completed()).count()
}

/// Count tasks due strictly before `now` that are not completed.
pub fn compute_overdue(tasks: &[Task], now: DateTime<Utc>) -> usize {
    tasks.iter().filter(|t| t.is_overdue(now)).count()
}

/// Count tasks per key.
///
/// Every task is counted; an empty key is its own group.
pub fn group_by<K, F>(tasks: &[Task], key_fn: F) -> BTreeMap<K, usize>
where
    K: Ord,
    F: Fn(&Task) -> K,
{
    let mut groups: BTreeMap<K, usize> = BTreeMap::new();

    for task in tasks {
        *groups.entry(key_fn(task)).or_default() += 1;
    }

    groups
}

/// Count tasks per subject label.
pub fn group_by_subject(tasks: &[Task]) -> BTreeMap<String, usize> {
    group_by(tasks, |t| t.subject.clone())
}

/// Count tasks per priority.
pub fn group_by_priority(tasks: &[Task]) -> BTreeMap<Priority, usize> {
    group_by(tasks, |t| t.priority)
}

/// Mean days from creation to completion over completed tasks.
///
/// Returns 0 when no completed task has a completion time.
pub fn average_completion_duration(tasks: &[Task]) -> f64 {
    let durations: Vec<i128> = tasks
        .iter()
        .filter(|t| t.is_completed())
        .filter_map(|t| {
            t.completed_at
                .map(|done| i128::from((done - t.created_at).num_milliseconds()))
        })
        .collect();

    if durations.is_empty() {
        return 0.0;
    }

    // Sums of extreme spans overflow i64
    let total: i128 = durations.iter().sum();
    total as f64 / durations.len() as f64 / MILLIS_PER_DAY
}

/// Percent of all tasks completed on or before their due date.
pub fn productivity_score(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }

    let on_time = tasks.iter().filter(|t| t.completed_on_time()).count();
    on_time as f64 / tasks.len() as f64 * 100.0
}

/// Build the period report for a task list.
pub fn full_report(tasks: &[Task], period: &ReportPeriod, now: DateTime<Utc>) -> AggregateReport {
    AggregateReport {
        period: period.label(),
        total_tasks: tasks.len(),
        completed_tasks: completed_count(tasks),
        overdue_tasks: compute_overdue(tasks, now),
        tasks_by_subject: group_by_subject(tasks),
        tasks_by_priority: group_by_priority(tasks),
        average_completion_time: average_completion_duration(tasks),
        productivity_score: productivity_score(tasks),
    }
}

/// Headline analytics over all tasks of an owner.
pub fn user_analytics(tasks: &[Task], now: DateTime<Utc>) -> UserAnalytics {
    UserAnalytics {
        total_tasks: tasks.len(),
        completed_tasks: completed_count(tasks),
        overdue_tasks: compute_overdue(tasks, now),
        average_completion_time: average_completion_duration(tasks),
        productivity_score: productivity_score(tasks),
    }
}

/// Count tasks per status.
pub fn status_breakdown(tasks: &[Task]) -> StatusBreakdown {
    let mut breakdown = StatusBreakdown::default();

    for task in tasks {
        match task.status {
            TaskStatus::Pending => breakdown.pending += 1,
            TaskStatus::InProgress => breakdown.in_progress += 1,
            TaskStatus::Completed => breakdown.completed += 1,
        }
    }

    breakdown
}

/// Count open tasks per priority.
pub fn open_by_priority(tasks: &[Task]) -> BTreeMap<Priority, usize> {
    let open: Vec<Task> = tasks.iter().filter(|t| !t.is_completed()).cloned().collect();
    group_by_priority(&open)
}

/// The `n` open tasks with the earliest due dates.
///
/// Ties keep their input order.
pub fn upcoming_tasks(tasks: &[Task], n: usize) -> Vec<Task> {
    let mut open: Vec<&Task> = tasks.iter().filter(|t| !t.is_completed()).collect();
    open.sort_by_key(|t| t.due_date);
    open.into_iter().take(n).cloned().collect()
}

/// Dashboard snapshot of an owner's tasks.
pub fn dashboard_summary(tasks: &[Task], now: DateTime<Utc>, upcoming: usize) -> DashboardSummary {
    let by_status = status_breakdown(tasks);
    let completion_rate = if tasks.is_empty() {
        0
    } else {
        (by_status.completed as f64 / tasks.len() as f64 * 100.0).round() as u32
    };

    DashboardSummary {
        total: tasks.len(),
        by_status,
        overdue: compute_overdue(tasks, now),
        completion_rate,
        open_by_priority: open_by_priority(tasks),
        tasks_by_subject: group_by_subject(tasks),
        upcoming: upcoming_tasks(tasks, upcoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timestamp;

    fn at(raw: &str) -> DateTime<Utc> {
        timestamp::parse(raw).unwrap()
    }

    fn create_test_task(id: &str, status: TaskStatus, due: &str) -> Task {
        Task {
            id: id.to_string(),
            owner: "alice".to_string(),
            title: format!("Task {}", id),
            description: None,
            subject: "Math".to_string(),
            priority: Priority::Medium,
            status,
            due_date: at(due),
            created_at: at("2024-01-01"),
            completed_at: None,
            attachments: Vec::new(),
        }
    }

    fn completed(id: &str, due: &str, done: &str) -> Task {
        Task {
            completed_at: Some(at(done)),
            ..create_test_task(id, TaskStatus::Completed, due)
        }
    }

    fn mixed_tasks() -> Vec<Task> {
        vec![
            completed("1", "2024-01-10", "2024-01-05"),
            completed("2", "2024-01-10", "2024-01-20"),
            create_test_task("3", TaskStatus::Pending, "2023-12-01"),
            Task {
                subject: String::new(),
                priority: Priority::Urgent,
                ..create_test_task("4", TaskStatus::InProgress, "2025-01-01")
            },
            Task {
                priority: Priority::High,
                ..create_test_task("5", TaskStatus::Pending, "2024-05-01")
            },
        ]
    }

    #[test]
    fn test_overdue_is_strict() {
        let now = at("2024-06-01");
        let tasks = vec![
            create_test_task("due-now", TaskStatus::Pending, "2024-06-01"),
            create_test_task("late", TaskStatus::Pending, "2024-05-31T23:59:59Z"),
            create_test_task("done", TaskStatus::Completed, "2024-01-01"),
        ];

        assert_eq!(compute_overdue(&tasks, now), 1);
    }

    #[test]
    fn test_group_by_keeps_empty_subject() {
        let grouped = group_by_subject(&mixed_tasks());

        assert_eq!(grouped.get("Math"), Some(&4));
        assert_eq!(grouped.get(""), Some(&1));
    }

    #[test]
    fn test_priority_groups_sum_to_total() {
        let tasks = mixed_tasks();
        let grouped = group_by_priority(&tasks);

        assert_eq!(grouped.values().sum::<usize>(), tasks.len());
        assert_eq!(grouped.get(&Priority::Urgent), Some(&1));
        assert_eq!(grouped.get(&Priority::Low), None);
    }

    #[test]
    fn test_average_completion_duration() {
        // 4 days and 19 days
        let tasks = mixed_tasks();
        assert!((average_completion_duration(&tasks) - 11.5).abs() < 1e-9);

        assert_eq!(average_completion_duration(&[]), 0.0);

        let open = vec![create_test_task("x", TaskStatus::Pending, "2024-02-01")];
        assert_eq!(average_completion_duration(&open), 0.0);

        // COMPLETED without a completion time is ignored
        let no_stamp = vec![create_test_task("y", TaskStatus::Completed, "2024-02-01")];
        assert_eq!(average_completion_duration(&no_stamp), 0.0);
    }

    #[test]
    fn test_average_completion_duration_extreme_spans() {
        let span = Task {
            created_at: DateTime::<Utc>::MIN_UTC,
            completed_at: Some(DateTime::<Utc>::MAX_UTC),
            ..create_test_task("x", TaskStatus::Completed, "2024-02-01")
        };
        let expected = (DateTime::<Utc>::MAX_UTC - DateTime::<Utc>::MIN_UTC).num_milliseconds()
            as f64
            / MILLIS_PER_DAY;

        let tasks = vec![span; 1000];
        let average = average_completion_duration(&tasks);

        assert!((average - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_productivity_score() {
        assert_eq!(productivity_score(&[]), 0.0);
        // Only task 1 finished on time out of 5
        assert!((productivity_score(&mixed_tasks()) - 20.0).abs() < 1e-9);

        let exactly_on_due = vec![completed("e", "2024-01-10", "2024-01-10")];
        assert_eq!(productivity_score(&exactly_on_due), 100.0);
    }

    #[test]
    fn test_count_identities() {
        let now = at("2024-06-01");
        let tasks = mixed_tasks();
        let report = full_report(
            &tasks,
            &ReportPeriod::parse("2024-01-01", "2024-12-31").unwrap(),
            now,
        );

        let not_completed = tasks.iter().filter(|t| !t.is_completed()).count();
        assert_eq!(report.total_tasks, report.completed_tasks + not_completed);
        assert!(report.overdue_tasks <= report.total_tasks - report.completed_tasks);
        assert_eq!(report.overdue_tasks, 2);
    }

    #[test]
    fn test_full_report_scenario() {
        let tasks = vec![
            completed("a", "2024-01-10", "2024-01-05"),
            create_test_task("b", TaskStatus::Pending, "2023-01-01"),
        ];
        let period = ReportPeriod::parse("2024-01-01", "2024-01-31").unwrap();

        let report = full_report(&tasks, &period, at("2024-06-01"));

        assert_eq!(report.period, "2024-01-01 to 2024-01-31");
        assert_eq!(report.total_tasks, 2);
        assert_eq!(report.overdue_tasks, 1);
        assert_eq!(report.completed_tasks, 1);
        assert_eq!(report.productivity_score, 50.0);
    }

    #[test]
    fn test_full_report_empty() {
        let period = ReportPeriod::parse("2024-01-01", "2024-01-31").unwrap();
        let report = full_report(&[], &period, at("2024-06-01"));

        assert_eq!(report.total_tasks, 0);
        assert_eq!(report.completed_tasks, 0);
        assert_eq!(report.overdue_tasks, 0);
        assert_eq!(report.average_completion_time, 0.0);
        assert_eq!(report.productivity_score, 0.0);
        assert!(report.tasks_by_subject.is_empty());
        assert!(report.tasks_by_priority.is_empty());
    }

    #[test]
    fn test_full_report_is_idempotent() {
        let tasks = mixed_tasks();
        let period = ReportPeriod::parse("2024-01-01", "2024-12-31").unwrap();
        let now = at("2024-06-01");

        let first = serde_json::to_string(&full_report(&tasks, &period, now)).unwrap();
        let second = serde_json::to_string(&full_report(&tasks, &period, now)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_user_analytics_matches_report() {
        let tasks = mixed_tasks();
        let now = at("2024-06-01");
        let analytics = user_analytics(&tasks, now);

        assert_eq!(analytics.total_tasks, 5);
        assert_eq!(analytics.completed_tasks, 2);
        assert_eq!(analytics.overdue_tasks, 2);
    }

    #[test]
    fn test_dashboard_summary() {
        let tasks = mixed_tasks();
        let summary = dashboard_summary(&tasks, at("2024-06-01"), 2);

        assert_eq!(summary.by_status.completed, 2);
        assert_eq!(summary.by_status.pending, 2);
        assert_eq!(summary.by_status.in_progress, 1);
        assert_eq!(summary.completion_rate, 40);
        assert_eq!(summary.open_by_priority.values().sum::<usize>(), 3);

        let upcoming: Vec<_> = summary.upcoming.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(upcoming, vec!["3", "5"]);
    }

    #[test]
    fn test_dashboard_summary_empty() {
        let summary = dashboard_summary(&[], at("2024-06-01"), 5);
        assert_eq!(summary.completion_rate, 0);
        assert!(summary.upcoming.is_empty());
    }
}
