//! Report and notification rendering.
//!
//! Turns aggregate statistics and task snapshots into email markup,
//! subject lines, and the Markdown/JSON outputs of the command line.

use crate::models::{
    timestamp, AggregateReport, DashboardSummary, Task, UserAnalytics,
};
use anyhow::Result;
use serde::Serialize;

/// Subject line of a period report email.
pub fn report_subject(report: &AggregateReport) -> String {
    format!("Your Task Report: {}", report.period)
}

/// Render a period report as an HTML email body.
pub fn render_report_html(report: &AggregateReport) -> String {
    let mut html = String::new();

    html.push_str("<html>\n<body>\n");
    html.push_str("<h1>Task Report</h1>\n");
    html.push_str(&format!("<h2>Period: {}</h2>\n", escape_html(&report.period)));

    html.push_str("<div>\n<h3>Summary</h3>\n");
    html.push_str(&format!("<p>Total Tasks: {}</p>\n", report.total_tasks));
    html.push_str(&format!("<p>Completed Tasks: {}</p>\n", report.completed_tasks));
    html.push_str(&format!("<p>Overdue Tasks: {}</p>\n", report.overdue_tasks));
    html.push_str(&format!(
        "<p>Completion Rate: {:.1}%</p>\n",
        report.completion_rate()
    ));
    html.push_str(&format!(
        "<p>Average Completion Time: {:.1} days</p>\n",
        report.average_completion_time
    ));
    html.push_str(&format!(
        "<p>Productivity Score: {:.1}%</p>\n",
        report.productivity_score
    ));
    html.push_str("</div>\n");

    html.push_str("<div>\n<h3>Tasks by Subject</h3>\n<ul>\n");
    for (subject, count) in &report.tasks_by_subject {
        html.push_str(&format!(
            "<li>{}: {}</li>\n",
            escape_html(subject_label(subject)),
            count
        ));
    }
    html.push_str("</ul>\n</div>\n");

    html.push_str("<div>\n<h3>Tasks by Priority</h3>\n<ul>\n");
    for (priority, count) in &report.tasks_by_priority {
        html.push_str(&format!("<li>{}: {}</li>\n", priority, count));
    }
    html.push_str("</ul>\n</div>\n");

    html.push_str("</body>\n</html>\n");

    html
}

/// Subject line of a reminder email.
pub fn reminder_subject(task: &Task) -> String {
    format!("Reminder: {} is due soon", task.title)
}

/// Render a task reminder as an HTML email body.
pub fn render_reminder_html(task: &Task) -> String {
    let mut html = String::new();

    html.push_str(&format!(
        "<h2>Task Reminder: {}</h2>\n",
        escape_html(&task.title)
    ));
    html.push_str(&format!(
        "<p><strong>Subject:</strong> {}</p>\n",
        escape_html(&task.subject)
    ));
    html.push_str(&format!(
        "<p><strong>Due Date:</strong> {}</p>\n",
        task.due_date.format("%Y-%m-%d")
    ));
    html.push_str(&format!(
        "<p><strong>Priority:</strong> {}</p>\n",
        task.priority
    ));
    if let Some(ref description) = task.description {
        html.push_str(&format!(
            "<p><strong>Description:</strong> {}</p>\n",
            escape_html(description)
        ));
    }
    html.push_str("<p>Don't forget to complete this task!</p>\n");

    html
}

/// Render a period report as Markdown.
pub fn render_markdown_report(report: &AggregateReport) -> String {
    let mut output = String::new();

    output.push_str("# Task Report\n\n");
    output.push_str(&format!("- **Period:** {}\n\n", report.period));

    output.push_str("## Summary\n\n");
    output.push_str("| Total | Completed | Overdue | Completion Rate | Avg. Days | Productivity |\n");
    output.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    output.push_str(&format!(
        "| {} | {} | {} | {:.1}% | {:.1} | {:.1}% |\n\n",
        report.total_tasks,
        report.completed_tasks,
        report.overdue_tasks,
        report.completion_rate(),
        report.average_completion_time,
        report.productivity_score
    ));

    if !report.tasks_by_subject.is_empty() {
        output.push_str("## Tasks by Subject\n\n");
        output.push_str("| Subject | Count |\n");
        output.push_str("|:---|:---:|\n");
        for (subject, count) in &report.tasks_by_subject {
            output.push_str(&format!("| {} | {} |\n", subject_label(subject), count));
        }
        output.push('\n');
    }

    if !report.tasks_by_priority.is_empty() {
        output.push_str("## Tasks by Priority\n\n");
        output.push_str("| Priority | Count |\n");
        output.push_str("|:---|:---:|\n");
        for (priority, count) in &report.tasks_by_priority {
            output.push_str(&format!(
                "| {} {} | {} |\n",
                priority.emoji(),
                priority,
                count
            ));
        }
        output.push('\n');
    }

    output
}

/// Render owner analytics as Markdown.
pub fn render_markdown_analytics(analytics: &UserAnalytics) -> String {
    let mut output = String::new();

    output.push_str("# Analytics\n\n");
    output.push_str(&format!("- **Total Tasks:** {}\n", analytics.total_tasks));
    output.push_str(&format!(
        "- **Completed Tasks:** {}\n",
        analytics.completed_tasks
    ));
    output.push_str(&format!("- **Overdue Tasks:** {}\n", analytics.overdue_tasks));
    output.push_str(&format!(
        "- **Average Completion Time:** {:.1} days\n",
        analytics.average_completion_time
    ));
    output.push_str(&format!(
        "- **Productivity Score:** {:.1}%\n",
        analytics.productivity_score
    ));

    output
}

/// Render the dashboard snapshot as Markdown.
pub fn render_markdown_dashboard(summary: &DashboardSummary) -> String {
    let mut output = String::new();

    output.push_str("# Dashboard\n\n");
    output.push_str("| Total | Pending | In Progress | Completed | Overdue | Completion |\n");
    output.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    output.push_str(&format!(
        "| {} | {} | {} | {} | {} | {}% |\n\n",
        summary.total,
        summary.by_status.pending,
        summary.by_status.in_progress,
        summary.by_status.completed,
        summary.overdue,
        summary.completion_rate
    ));

    if !summary.open_by_priority.is_empty() {
        output.push_str("## Open by Priority\n\n");
        for (priority, count) in summary.open_by_priority.iter().rev() {
            output.push_str(&format!("- {} {}: {}\n", priority.emoji(), priority, count));
        }
        output.push('\n');
    }

    output.push_str("## Upcoming\n\n");
    if summary.upcoming.is_empty() {
        output.push_str("Nothing due. 🎉\n");
    } else {
        output.push_str(&render_markdown_task_table(&summary.upcoming));
    }

    output
}

/// Render tasks as a Markdown table.
pub fn render_markdown_task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.\n".to_string();
    }

    let mut table = String::new();

    table.push_str("| ID | Title | Subject | Priority | Status | Due |\n");
    table.push_str("|:---|:---|:---|:---:|:---:|:---:|\n");

    for task in tasks {
        table.push_str(&format!(
            "| `{}` | {} | {} | {} {} | {} | {} |\n",
            task.id,
            task.title,
            subject_label(&task.subject),
            task.priority.emoji(),
            task.priority,
            task.status,
            task.due_date.format("%Y-%m-%d")
        ));
    }

    table
}

/// Render a single task as Markdown.
pub fn render_markdown_task(task: &Task) -> String {
    let mut block = String::new();

    block.push_str(&format!("## {} {}\n\n", task.priority.emoji(), task.title));
    block.push_str(&format!("- **ID:** `{}`\n", task.id));
    block.push_str(&format!("- **Subject:** {}\n", subject_label(&task.subject)));
    block.push_str(&format!("- **Priority:** {}\n", task.priority));
    block.push_str(&format!("- **Status:** {}\n", task.status));
    block.push_str(&format!("- **Due:** {}\n", timestamp::format(&task.due_date)));
    block.push_str(&format!(
        "- **Created:** {}\n",
        timestamp::format(&task.created_at)
    ));
    if let Some(ref done) = task.completed_at {
        block.push_str(&format!("- **Completed:** {}\n", timestamp::format(done)));
    }
    if !task.attachments.is_empty() {
        block.push_str(&format!("- **Attachments:** {}\n", task.attachments.len()));
    }
    if let Some(ref description) = task.description {
        block.push_str(&format!("\n{}\n", description));
    }

    block
}

/// Serialize any output as pretty JSON.
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

fn subject_label(subject: &str) -> &str {
    if subject.is_empty() {
        "(none)"
    } else {
        subject
    }
}

/// Escape text for inclusion in HTML.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
