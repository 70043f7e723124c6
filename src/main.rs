//! StudyTask - coursework task manager
//!
//! A CLI tool that keeps a student's tasks in a JSON store, enforces
//! owner-only access, and emails reminders and period reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (store, relay, config, etc.)
//!   2 - Task not found or invalid request

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod notify;
mod report;
mod retry;
mod service;
mod store;

use anyhow::{Context, Result};
use cli::{Args, Command, OutputFormat};
use config::{Config, NotifyKind, DEFAULT_CONFIG_FILE};
use error::TaskError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{NewTask, Task, UserProfile};
use notify::{LogDispatcher, NotificationDispatcher, WebhookConfig, WebhookDispatcher};
use service::TaskService;
use std::path::Path;
use std::sync::Arc;
use store::{DocumentStore, TaskFilter};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config(args.config.as_deref());
    }

    // Config comes first: it can turn on verbose logging
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose))?;

    info!("StudyTask v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Effective config: {:?}", config);

    if let Err(e) = run(args, config).await {
        let (code, message) = describe_failure(&e);
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {}", message);
        std::process::exit(code);
    }

    Ok(())
}

/// Handle --init-config: write the default configuration file.
fn handle_init_config(target: Option<&Path>) -> Result<()> {
    let path = target.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Edit it to set your user, store path and mail relay.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Exit code and user-facing message for a failed command.
fn describe_failure(err: &anyhow::Error) -> (i32, String) {
    match err.downcast_ref::<TaskError>() {
        Some(task_err) if task_err.is_client_error() => (2, task_err.public_message()),
        Some(task_err) => (1, task_err.public_message()),
        None => (1, format!("{:#}", err)),
    }
}

/// Run one subcommand against the configured store.
async fn run(args: Args, config: Config) -> Result<()> {
    let identity = config
        .identity()
        .map(str::to_string)
        .ok_or_else(|| TaskError::validation("no user given: pass --user or set default_user"))?;
    let command = args.command.clone().context("No command given")?;
    let format = config.general.format;

    let store = Arc::new(
        DocumentStore::open(&config.general.store)
            .await
            .with_context(|| format!("Failed to open store {}", config.general.store.display()))?,
    );
    let dispatcher = build_dispatcher(&config)?;

    let service = TaskService::new(store.clone(), store.clone(), dispatcher)
        .with_retry(config.retry.policy());

    let output = match command {
        Command::Create {
            title,
            subject,
            description,
            priority,
            status,
            due,
        } => {
            let request = NewTask {
                title,
                description,
                subject,
                priority,
                status,
                due_date: Some(due),
                attachments: Vec::new(),
            };
            let task = service.create_task(&identity, request).await?;
            render_task(&task, format)?
        }

        Command::Get { id } => {
            let task = service.get_task(&identity, &id).await?;
            render_task(&task, format)?
        }

        Command::List {
            subject,
            priority,
            status,
            search,
            due_on,
        } => {
            let filter = TaskFilter {
                subject,
                priority,
                status,
                search,
                due_on,
                ..TaskFilter::owned_by(identity.as_str())
            };
            let tasks = service.list_tasks(&identity, filter).await?;
            render_tasks(&tasks, format)?
        }

        Command::Update { id, fields } => {
            let task = service
                .update_task(&identity, &id, &fields.into_update())
                .await?;
            render_task(&task, format)?
        }

        Command::Delete { id } => {
            service.delete_task(&identity, &id).await?;
            match format {
                OutputFormat::Json => report::render_json(&serde_json::json!({ "deleted": id }))?,
                OutputFormat::Markdown => format!("Deleted task `{}`\n", id),
            }
        }

        Command::BulkUpdate { ids, fields } => {
            let update = fields.into_update();
            let pb = bulk_progress_bar(ids.len(), args.quiet)?;

            let updated = service
                .bulk_update(&identity, &ids, &update, |id| {
                    pb.set_message(id.to_string());
                    pb.inc(1);
                })
                .await;
            pb.finish_and_clear();

            let updated = updated?;
            if updated.len() < ids.len() {
                warn!(
                    "{} task(s) were skipped (not found or not yours)",
                    ids.len() - updated.len()
                );
            }
            render_tasks(&updated, format)?
        }

        Command::Remind { id } => {
            let notification = service.send_reminder(&identity, &id).await?;
            match format {
                OutputFormat::Json => report::render_json(&serde_json::json!({
                    "to": notification.to,
                    "subject": notification.subject,
                }))?,
                OutputFormat::Markdown => format!(
                    "📧 Sent \"{}\" to {}\n",
                    notification.subject, notification.to
                ),
            }
        }

        Command::Report { from, to, no_email } => {
            let aggregate = if no_email {
                service.build_report(&identity, &from, &to).await?
            } else {
                service.generate_report(&identity, &from, &to).await?
            };
            match format {
                OutputFormat::Json => report::render_json(&aggregate)?,
                OutputFormat::Markdown => report::render_markdown_report(&aggregate),
            }
        }

        Command::Analytics => {
            let analytics = service.user_analytics(&identity).await?;
            match format {
                OutputFormat::Json => report::render_json(&analytics)?,
                OutputFormat::Markdown => report::render_markdown_analytics(&analytics),
            }
        }

        Command::Overdue => {
            let tasks = service.overdue_tasks(&identity).await?;
            render_tasks(&tasks, format)?
        }

        Command::BySubject { subject } => {
            let tasks = service.tasks_by_subject(&identity, &subject).await?;
            render_tasks(&tasks, format)?
        }

        Command::DueOn { date } => {
            let tasks = service.tasks_due_on(&identity, date).await?;
            render_tasks(&tasks, format)?
        }

        Command::Dashboard { limit } => {
            let upcoming = limit.unwrap_or(config.report.upcoming_limit);
            let summary = service.dashboard(&identity, upcoming).await?;
            match format {
                OutputFormat::Json => report::render_json(&summary)?,
                OutputFormat::Markdown => report::render_markdown_dashboard(&summary),
            }
        }

        Command::Profile { email, name } => {
            let profile = UserProfile {
                id: identity.clone(),
                email,
                name,
            };
            store
                .upsert_profile(profile.clone())
                .await
                .context("Failed to save profile")?;
            match format {
                OutputFormat::Json => report::render_json(&profile)?,
                OutputFormat::Markdown => {
                    format!("Saved profile for {} <{}>\n", profile.id, profile.email)
                }
            }
        }
    };

    emit(&output, args.output.as_deref())
}

/// Build the notification dispatcher selected by the configuration.
fn build_dispatcher(config: &Config) -> Result<Arc<dyn NotificationDispatcher>> {
    match config.notify.kind {
        NotifyKind::Webhook => {
            let url = config
                .notify
                .webhook_url
                .clone()
                .context("notify.kind is 'webhook' but no webhook_url is configured")?;

            let dispatcher = WebhookDispatcher::new(WebhookConfig {
                url,
                from_address: config.notify.from_address.clone(),
                timeout_seconds: config.notify.timeout_seconds,
            })
            .context("Failed to create notification client")?;
            Ok(Arc::new(dispatcher))
        }
        NotifyKind::Log => {
            debug!("Notifications are logged, not sent");
            Ok(Arc::new(LogDispatcher))
        }
    }
}

fn bulk_progress_bar(len: usize, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn render_task(task: &Task, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => report::render_json(task),
        OutputFormat::Markdown => Ok(report::render_markdown_task(task)),
    }
}

fn render_tasks(tasks: &[Task], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => report::render_json(&tasks),
        OutputFormat::Markdown => Ok(report::render_markdown_task_table(tasks)),
    }
}

/// Print the output or save it to `target`.
fn emit(output: &str, target: Option<&Path>) -> Result<()> {
    match target {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Output saved to {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems are reported on stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
