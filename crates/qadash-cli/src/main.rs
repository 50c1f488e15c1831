//! QA Dashboard CLI
//!
//! Command-line front end for the QA task dashboard. Works against the local
//! cache when the task server is down and uploads queued tasks once it is back.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qadash_core::{Config, Priority, Store, TaskFilter, TaskStatus};

mod commands;
mod editor;
mod output;

use commands::task::TaskFields;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "qadash")]
#[command(about = "QA Dashboard - offline-first task tracking")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show task details
    Show {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
    },
    /// Create a task (saved offline if the server is unreachable)
    #[command(alias = "add")]
    Create {
        /// Task title
        title: String,
        #[command(flatten)]
        fields: FieldArgs,
        /// Write the description in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },
    /// Update task fields
    Update {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        #[command(flatten)]
        fields: FieldArgs,
        /// Write the description in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Set the status of a task
    Status {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
        /// New status, e.g. "In Progress" or in-progress
        status: TaskStatus,
    },
    /// Mark a task deployed, or undo if it already is
    Done {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
    },
    /// Advance a task to the next status
    Cycle {
        /// Task id (number, QA-... or OFFLINE-...)
        id: String,
    },
    /// Upload queued tasks and refresh the cache
    Sync,
    /// List tasks waiting for upload
    Pending,
    /// Check the server and show sync state (read-only, uploads nothing)
    Health,
    /// Show dashboard counts for the cached tasks
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Keep syncing in the foreground, printing events
    Watch,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Only tasks with this status
    #[arg(short, long)]
    status: Option<TaskStatus>,
    /// Only tasks with this priority
    #[arg(short, long)]
    priority: Option<Priority>,
    /// Only tasks assigned to this person
    #[arg(short, long)]
    assignee: Option<String>,
    /// Text search over title, description, module and tags
    #[arg(long)]
    search: Option<String>,
    /// Only tasks carrying this tag
    #[arg(short, long)]
    tag: Option<String>,
}

impl From<FilterArgs> for TaskFilter {
    fn from(args: FilterArgs) -> Self {
        TaskFilter {
            status: args.status,
            priority: args.priority,
            assignee: args.assignee,
            search: args.search,
            tag: args.tag,
        }
    }
}

#[derive(clap::Args)]
struct FieldArgs {
    /// Description
    #[arg(short, long)]
    description: Option<String>,
    /// Status
    #[arg(short, long)]
    status: Option<TaskStatus>,
    /// Priority (Critical, High, Medium, Low)
    #[arg(short, long)]
    priority: Option<Priority>,
    /// Assignee (repeat or comma-separate for several)
    #[arg(short, long)]
    assignee: Vec<String>,
    /// Module under test
    #[arg(short, long)]
    module: Option<String>,
    /// Environment (defaults to QA)
    #[arg(long)]
    environment: Option<String>,
    /// Tag (repeat or comma-separate for several)
    #[arg(short, long)]
    tag: Vec<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    due: Option<String>,
}

impl FieldArgs {
    fn into_fields(self, title: Option<String>) -> TaskFields {
        TaskFields {
            title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assignees: self.assignee,
            module: self.module,
            environment: self.environment,
            tags: self.tag,
            start_date: self.start,
            due_date: self.due,
        }
    }
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, *_secs, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work without a store or a reachable server
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let mut store = Store::open_with_config(config)?;
    for warning in store.sync().load_warnings() {
        output.warning(warning);
    }

    let is_read = matches!(
        cli.command,
        Commands::List { .. }
            | Commands::Show { .. }
            | Commands::Pending
            | Commands::Stats { .. }
    );
    // Reads see the freshest data available; writes go through the router
    if is_read {
        commands::sync::auto_sync(&store, &output).await;
    }

    match cli.command {
        Commands::List { filter } => commands::task::list(&store, filter.into(), &output).await,
        Commands::Show { id } => commands::task::show(&store, id, &output).await,
        Commands::Create {
            title,
            fields,
            edit,
        } => commands::task::create(&store, title, fields.into_fields(None), edit, &output).await,
        Commands::Update {
            id,
            title,
            fields,
            edit,
        } => commands::task::update(&store, id, fields.into_fields(title), edit, &output).await,
        Commands::Delete { id, yes } => commands::task::delete(&store, id, yes, &output).await,
        Commands::Status { id, status } => {
            commands::task::set_status(&store, id, status, &output).await
        }
        Commands::Done { id } => commands::task::done(&store, id, &output).await,
        Commands::Cycle { id } => commands::task::cycle(&store, id, &output).await,
        Commands::Sync => commands::sync::sync(&store, &output).await,
        Commands::Pending => commands::sync::pending(&store, &output).await,
        Commands::Health => commands::sync::health(&store, &output).await,
        Commands::Stats { filter } => commands::task::stats(&store, filter.into(), &output).await,
        Commands::Watch => commands::sync::watch(&mut store, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `-v`. Logs go to the configured log file when set,
/// otherwise to stderr.
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qadash_core={},qadash_cli={}", level, level)));

    let Some(ref log_path) = config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_with_fields() {
        let cli = Cli::try_parse_from([
            "qadash",
            "create",
            "Login fails",
            "-a",
            "Rahul",
            "--status",
            "unassigned",
            "-p",
            "high",
        ])
        .unwrap();

        let Commands::Create { title, fields, edit } = cli.command else {
            panic!("expected create");
        };
        assert_eq!(title, "Login fails");
        assert!(!edit);
        let fields = fields.into_fields(None);
        assert_eq!(fields.assignees, ["Rahul"]);
        assert_eq!(fields.status, Some(TaskStatus::Unassigned));
        assert_eq!(fields.priority, Some(Priority::High));
    }

    #[test]
    fn test_parse_status_with_spaces() {
        let cli = Cli::try_parse_from(["qadash", "status", "QA-AB12", "uat-completed"]).unwrap();
        let Commands::Status { id, status } = cli.command else {
            panic!("expected status");
        };
        assert_eq!(id, "QA-AB12");
        assert_eq!(status, TaskStatus::UatCompleted);
    }

    #[test]
    fn test_parse_stats_with_tag() {
        let cli =
            Cli::try_parse_from(["qadash", "stats", "--tag", "Regression", "-a", "Rahul"]).unwrap();
        let Commands::Stats { filter } = cli.command else {
            panic!("expected stats");
        };
        let filter: TaskFilter = filter.into();
        assert_eq!(filter.tag.as_deref(), Some("Regression"));
        assert_eq!(filter.assignee.as_deref(), Some("Rahul"));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(Cli::try_parse_from(["qadash", "status", "42", "Finished"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["qadash", "list", "--json", "-vv", "-s", "Blocked"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        let Commands::List { filter } = cli.command else {
            panic!("expected list");
        };
        let filter: TaskFilter = filter.into();
        assert_eq!(filter.status, Some(TaskStatus::Blocked));
    }
}
