//! ClientDesk - local client portal data layer
//!
//! Command-line front end for submitting consultation requests, tracking
//! the client project and watching the polled project feed.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clientdesk::{
    config::ClientDeskConfig,
    notifier::{subscriber, ChangeEvent},
    presentation::{format_date, relative_time, Toast, ToastPresenter, TracingToasts},
    records::{
        NewConsultationRequest, NewProjectUpdate, NewTimelineItem, ProjectPatch, ProjectState,
        RecordId,
    },
    PortalContext,
};
use serde_json::Map;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clientdesk")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Client portal data layer: consultation intake and project tracking")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CLIENTDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "CLIENTDESK_LOG_FORMAT")]
    log_format: LogFormat,

    /// Storage directory (overrides storage.dir)
    #[arg(long, env = "CLIENTDESK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Consultation requests
    Consult {
        #[command(subcommand)]
        action: ConsultAction,
    },

    /// Client project
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Print project updates as the poller delivers them
    Watch {
        /// Stop after this many updates (default: run until Ctrl+C)
        #[arg(long)]
        ticks: Option<usize>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand)]
enum ConsultAction {
    /// Submit a new consultation request
    Submit {
        /// Form field as key=value (repeatable)
        #[arg(short, long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
    },

    /// List all consultation requests
    List,

    /// Change the status of a request
    Status {
        /// Request ID
        id: RecordId,

        /// New status (free text)
        status: String,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Show the project
    Show,

    /// Post an update to the project feed
    AddUpdate {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        #[arg(long, default_value = "fas fa-info-circle")]
        icon: String,
    },

    /// Add a timeline milestone
    AddTimeline {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        /// Milestone date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// completed, active, upcoming, or any other label
        #[arg(long, default_value = "upcoming")]
        status: String,
    },

    /// Update progress counters
    Progress {
        #[arg(long)]
        progress: Option<u32>,

        #[arg(long)]
        days_remaining: Option<i64>,

        #[arg(long)]
        tasks_completed: Option<u32>,

        #[arg(long)]
        total_tasks: Option<u32>,

        #[arg(long)]
        team_members: Option<u32>,
    },

    /// Replace the project with the contents of a JSON file
    Import { file: PathBuf },

    /// Restore the built-in default project
    Reset,
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("clientdesk={}", log_level).into()),
        )
        .with((cli.log_format == LogFormat::Text).then(tracing_subscriber::fmt::layer))
        .with((cli.log_format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => ClientDeskConfig::from_file(path)?,
        None => ClientDeskConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.dir = dir;
    }

    if let Commands::Config { default } = cli.command {
        return show_config(if default { None } else { Some(&config) });
    }

    let ctx = PortalContext::from_config(&config)
        .await
        .context("Failed to open portal storage")?;
    let toasts = TracingToasts;

    match cli.command {
        Commands::Consult { action } => run_consult(&ctx, &toasts, action).await?,
        Commands::Project { action } => run_project(&ctx, &toasts, action).await?,
        Commands::Watch { ticks } => run_watch(&ctx, ticks).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_consult(
    ctx: &PortalContext,
    toasts: &dyn ToastPresenter,
    action: ConsultAction,
) -> Result<()> {
    let store = ctx.store();
    match action {
        ConsultAction::Submit { fields } => {
            let request = store
                .save_consultation_request(NewConsultationRequest::from_pairs(fields))
                .await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            toasts.show_toast(&Toast::new(format!(
                "Consultation request #{} received",
                request.id
            )));
        }
        ConsultAction::List => {
            let requests = store.list_consultation_requests().await?;
            if requests.is_empty() {
                println!("No consultation requests yet.");
            }
            for request in requests {
                println!(
                    "#{} [{}] {} ({})",
                    request.id,
                    request.status,
                    format_date(&request.date.to_rfc3339()),
                    relative_time(request.date)
                );
                for (key, value) in &request.details {
                    match value.as_str() {
                        Some(text) => println!("    {}: {}", key, text),
                        None => println!("    {}: {}", key, value),
                    }
                }
            }
        }
        ConsultAction::Status { id, status } => {
            if store.update_consultation_status(id, status.as_str()).await? {
                toasts.show_toast(&Toast::new(format!("Request #{} marked {}", id, status)));
            } else {
                toasts.show_toast(&Toast::warning(format!("No request with id {}", id)));
            }
        }
    }
    Ok(())
}

async fn run_project(
    ctx: &PortalContext,
    toasts: &dyn ToastPresenter,
    action: ProjectAction,
) -> Result<()> {
    let store = ctx.store();
    match action {
        ProjectAction::Show => {
            print_project(&store.get_project_state().await?);
        }
        ProjectAction::AddUpdate {
            title,
            description,
            icon,
        } => {
            let update = store
                .add_project_update(NewProjectUpdate {
                    title,
                    description,
                    icon,
                    extra: Map::new(),
                })
                .await?;
            toasts.show_toast(&Toast::new(format!("Posted update \"{}\"", update.title)));
        }
        ProjectAction::AddTimeline {
            title,
            description,
            date,
            status,
        } => {
            let item = store
                .add_timeline_item(NewTimelineItem {
                    title,
                    description,
                    date,
                    status: status.as_str().into(),
                    extra: Map::new(),
                })
                .await?;
            toasts.show_toast(&Toast::new(format!(
                "Added milestone \"{}\" for {}",
                item.title,
                format_date(&item.date)
            )));
        }
        ProjectAction::Progress {
            progress,
            days_remaining,
            tasks_completed,
            total_tasks,
            team_members,
        } => {
            let patch = ProjectPatch {
                progress,
                days_remaining,
                tasks_completed,
                total_tasks,
                team_members,
                ..Default::default()
            };
            if patch.is_empty() {
                toasts.show_toast(&Toast::warning("Nothing to update"));
                return Ok(());
            }
            let project = store.merge_project_fields(patch).await?;
            toasts.show_toast(&Toast::new(format!(
                "Project is {}% complete",
                project.progress
            )));
        }
        ProjectAction::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let project: ProjectState = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a valid project", file.display()))?;
            store.save_project_state(&project).await?;
            toasts.show_toast(&Toast::new(format!("Imported project \"{}\"", project.name)));
        }
        ProjectAction::Reset => {
            let project = store.reset_project_state().await?;
            toasts.show_toast(&Toast::new(format!("Restored \"{}\"", project.name)));
        }
    }
    Ok(())
}

async fn run_watch(ctx: &PortalContext, ticks: Option<usize>) -> Result<()> {
    if ticks == Some(0) {
        bail!("--ticks must be at least 1");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = subscriber(move |event: &ChangeEvent| {
        let ChangeEvent::ProjectUpdate(project) = event;
        println!(
            "{}: {}% complete, {} days remaining, {}/{} tasks",
            project.name,
            project.progress,
            project.days_remaining,
            project.tasks_completed,
            project.total_tasks
        );
        tx.send(())
            .map_err(|e| clientdesk::Error::Notifier(e.to_string()))
    });
    ctx.notifier().subscribe(printer.clone());
    ctx.start_polling()?;

    tracing::info!(
        interval_ms = ctx.notifier().poll_interval().as_millis() as u64,
        "Watching project. Press Ctrl+C to stop."
    );

    let mut seen = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = rx.recv() => {
                if received.is_none() {
                    break;
                }
                seen += 1;
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    ctx.stop_polling();
    ctx.notifier().unsubscribe(&printer);
    Ok(())
}

fn print_project(project: &ProjectState) {
    println!("{}", project.name);
    println!("{}", project.description);
    println!();
    println!(
        "Progress: {}%  |  Days remaining: {}  |  Tasks: {}/{}  |  Team: {}",
        project.progress,
        project.days_remaining,
        project.tasks_completed,
        project.total_tasks,
        project.team_members
    );

    println!();
    println!("Timeline:");
    for item in &project.timeline {
        println!(
            "  [{}] {} ({})",
            item.status,
            item.title,
            format_date(&item.date)
        );
        println!("      {}", item.description);
    }

    println!();
    println!("Recent updates:");
    for update in &project.updates {
        println!("  {} ({})", update.title, update.time);
        println!("      {}", update.description);
    }
}

fn show_config(config: Option<&ClientDeskConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
