//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{timestamp, Priority, TaskStatus, TaskUpdate};
use crate::store::parse_day;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// StudyTask - coursework task manager
///
/// Track assignments per subject, send due-date reminders, and build
/// period reports for a single student.
///
/// Examples:
///   studytask --user alice create "Essay draft" --subject History --due 2024-06-10
///   studytask --user alice list --status pending
///   studytask --user alice bulk-update --ids t1,t2 --status completed
///   studytask --user alice report --from 2024-05-01 --to 2024-05-31
///   studytask --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path of the JSON task store
    ///
    /// Default: from config or studytask.json in the current directory.
    #[arg(long, value_name = "FILE", env = "STUDYTASK_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Identity to act as; only this user's tasks are visible
    #[arg(short, long, value_name = "USER", env = "STUDYTASK_USER", global = true)]
    pub user: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .studytask.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Write output to this file instead of stdout
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Mail relay endpoint for reminders and reports
    #[arg(long, value_name = "URL", env = "STUDYTASK_WEBHOOK_URL", global = true)]
    pub webhook_url: Option<String>,

    /// HTTP timeout in seconds for the mail relay
    ///
    /// Calls to the store and the relay are abandoned a little after this.
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Attempts per store or relay call, including the first
    #[arg(long, value_name = "COUNT", global = true)]
    pub retries: Option<usize>,

    /// Dry run: log notifications instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .studytask.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Output format for command results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task
    Create {
        /// Short title of the task
        title: String,

        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long)]
        description: Option<String>,

        /// low, medium, high or urgent (default medium)
        #[arg(long)]
        priority: Option<Priority>,

        /// pending, in-progress or completed (default pending)
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Due date, RFC 3339 or YYYY-MM-DD
        #[arg(long, value_name = "DATE", value_parser = timestamp::parse)]
        due: DateTime<Utc>,
    },

    /// Show one task
    Get { id: String },

    /// List tasks, optionally filtered
    List {
        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        priority: Option<Priority>,

        #[arg(long)]
        status: Option<TaskStatus>,

        /// Case-insensitive text in title or description
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,

        /// Only tasks due on this day (YYYY-MM-DD, UTC)
        #[arg(long, value_name = "DATE", value_parser = parse_day)]
        due_on: Option<NaiveDate>,
    },

    /// Change fields of one task
    Update {
        id: String,

        #[command(flatten)]
        fields: UpdateFields,
    },

    /// Delete a task
    Delete { id: String },

    /// Apply the same change to several tasks
    BulkUpdate {
        /// Task ids (comma-separated)
        #[arg(long, value_name = "IDS", value_delimiter = ',', required = true)]
        ids: Vec<String>,

        #[command(flatten)]
        fields: UpdateFields,
    },

    /// Email a due-date reminder for a task
    Remind { id: String },

    /// Aggregate tasks created within a period and email the report
    Report {
        /// First day of the period (inclusive)
        #[arg(long, value_name = "DATE")]
        from: String,

        /// Last instant of the period (inclusive)
        #[arg(long, value_name = "DATE")]
        to: String,

        /// Only print the report, do not email it
        #[arg(long)]
        no_email: bool,
    },

    /// Headline analytics over all tasks
    Analytics,

    /// List tasks past their due date
    Overdue,

    /// List tasks of one subject
    BySubject { subject: String },

    /// List tasks due on one day
    DueOn {
        /// Day in YYYY-MM-DD (UTC)
        #[arg(value_name = "DATE", value_parser = parse_day)]
        date: NaiveDate,
    },

    /// Status, priority and subject overview with upcoming tasks
    Dashboard {
        /// Number of upcoming tasks to show
        #[arg(long, value_name = "COUNT")]
        limit: Option<usize>,
    },

    /// Register the email address notifications are sent to
    Profile {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: Option<String>,
    },
}

/// Field changes shared by `update` and `bulk-update`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct UpdateFields {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    /// Remove the description
    #[arg(long)]
    pub clear_description: bool,

    #[arg(long)]
    pub subject: Option<String>,

    #[arg(long)]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub status: Option<TaskStatus>,

    #[arg(long, value_name = "DATE", value_parser = timestamp::parse)]
    pub due: Option<DateTime<Utc>>,

    /// Completion time, only with a completed status
    #[arg(long, value_name = "DATE", value_parser = timestamp::parse, conflicts_with = "clear_completed")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Remove the completion time
    #[arg(long)]
    pub clear_completed: bool,
}

impl UpdateFields {
    /// Convert the flags into a task update.
    pub fn into_update(self) -> TaskUpdate {
        let description = if self.clear_description {
            Some(None)
        } else {
            self.description.map(Some)
        };
        let completed_at = if self.clear_completed {
            Some(None)
        } else {
            self.completed_at.map(Some)
        };

        TaskUpdate {
            title: self.title,
            description,
            subject: self.subject,
            priority: self.priority,
            status: self.status,
            due_date: self.due,
            completed_at,
            attachments: None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("No command given. Run with --help to see the commands".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref user) = self.user {
            if user.trim().is_empty() {
                return Err("User cannot be empty".to_string());
            }
        }

        if let Some(ref url) = self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Webhook URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(retries) = self.retries {
            if retries == 0 {
                return Err("Retries must be at least 1".to_string());
            }
        }

        if let Some(Command::Update { ref fields, .. } | Command::BulkUpdate { ref fields, .. }) =
            self.command
        {
            if fields.clone().into_update().is_empty() {
                return Err("Nothing to update: pass at least one field flag".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over a `verbose = true` config file.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            store: None,
            user: Some("alice".to_string()),
            config: None,
            format: None,
            output: None,
            webhook_url: None,
            timeout: None,
            retries: None,
            dry_run: false,
            verbose: false,
            quiet: false,
            init_config: false,
            command: Some(Command::Overdue),
        }
    }

    #[test]
    fn test_parse_create() {
        let args = Args::try_parse_from([
            "studytask",
            "--user",
            "alice",
            "create",
            "Essay draft",
            "--subject",
            "History",
            "--priority",
            "high",
            "--due",
            "2024-06-10",
        ])
        .unwrap();

        match args.command {
            Some(Command::Create {
                title,
                subject,
                priority,
                due,
                ..
            }) => {
                assert_eq!(title, "Essay draft");
                assert_eq!(subject, "History");
                assert_eq!(priority, Some(Priority::High));
                assert_eq!(timestamp::format(&due), "2024-06-10T00:00:00.000Z");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bulk_update_ids() {
        let args = Args::try_parse_from([
            "studytask",
            "bulk-update",
            "--ids",
            "t1,t2,t3",
            "--status",
            "completed",
        ])
        .unwrap();

        match args.command {
            Some(Command::BulkUpdate { ids, fields }) => {
                assert_eq!(ids, vec!["t1", "t2", "t3"]);
                assert_eq!(fields.status, Some(TaskStatus::Completed));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flag_after_subcommand() {
        let args =
            Args::try_parse_from(["studytask", "dashboard", "--format", "json", "--limit", "3"])
                .unwrap();
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(matches!(args.command, Some(Command::Dashboard { limit: Some(3) })));
    }

    #[test]
    fn test_invalid_due_date_rejected() {
        let result =
            Args::try_parse_from(["studytask", "create", "Essay", "--due", "next tuesday"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_update_clears() {
        let fields = UpdateFields {
            clear_description: true,
            clear_completed: true,
            ..Default::default()
        };
        let update = fields.into_update();
        assert_eq!(update.description, Some(None));
        assert_eq!(update.completed_at, Some(None));
        assert!(update.title.is_none());
    }

    #[test]
    fn test_validation_requires_command() {
        let mut args = make_args();
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_update() {
        let mut args = make_args();
        args.command = Some(Command::Update {
            id: "t1".to_string(),
            fields: UpdateFields::default(),
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_webhook_url() {
        let mut args = make_args();
        args.webhook_url = Some("relay.example.edu".to_string());
        assert!(args.validate().is_err());

        args.webhook_url = Some("https://relay.example.edu/send".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_parse_due_on() {
        let args = Args::try_parse_from(["studytask", "due-on", "2024-06-10"]).unwrap();
        match args.command {
            Some(Command::DueOn { date }) => assert_eq!(date.to_string(), "2024-06-10"),
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Args::try_parse_from(["studytask", "due-on", "tomorrow"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
