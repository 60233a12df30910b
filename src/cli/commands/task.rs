//! Task management commands.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use uuid::Uuid;

use super::unwrap_response;
use crate::cli::output::{format_task_detail, format_task_table};
use crate::cli::CliContext;
use crate::domain::models::{TaskDraft, TaskPatch, TaskPriority, TaskStatus};
use crate::domain::ports::TaskFilters;

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a new task
    Create {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Priority: low, medium, high, urgent
        #[arg(short, long)]
        priority: Option<String>,

        /// Assigned user
        #[arg(short, long)]
        assignee: Option<String>,

        /// Due date (RFC 3339, e.g. 2026-08-12T17:00:00Z)
        #[arg(long)]
        due: Option<String>,

        /// Tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Dependency task ids (comma-separated)
        #[arg(short = 'D', long, value_delimiter = ',')]
        dependencies: Vec<Uuid>,
    },

    /// List tasks
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by assignee
        #[arg(short, long)]
        assignee: Option<String>,

        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,

        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show one task in full
    Show {
        /// Task id
        id: Uuid,
    },

    /// Update fields on a task
    Update {
        /// Task id
        id: Uuid,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New status
        #[arg(short, long)]
        status: Option<String>,

        /// New priority
        #[arg(short, long)]
        priority: Option<String>,

        /// New assignee
        #[arg(short, long)]
        assignee: Option<String>,

        /// Actual effort in hours
        #[arg(long)]
        actual_hours: Option<f64>,
    },

    /// Delete a task
    Delete {
        /// Task id
        id: Uuid,
    },

    /// Mark a completion criterion done or not done
    Criteria {
        /// Task id
        id: Uuid,

        /// Criterion id
        criterion: Uuid,

        /// Mark the criterion as not yet met
        #[arg(long)]
        unmet: bool,
    },

    /// Change status on many tasks at once
    BulkStatus {
        /// Target status
        status: String,

        /// Task ids (comma-separated)
        #[arg(value_delimiter = ',')]
        ids: Vec<Uuid>,
    },
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    TaskStatus::from_str(s).ok_or_else(|| anyhow!("unknown status: {s}"))
}

fn parse_priority(s: &str) -> Result<TaskPriority> {
    TaskPriority::from_str(s).ok_or_else(|| anyhow!("unknown priority: {s}"))
}

fn parse_due(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow!("invalid due date {s:?}: {e}"))?
        .with_timezone(&Utc))
}

pub async fn execute(args: TaskArgs, ctx: &CliContext, json: bool) -> Result<()> {
    match args.command {
        TaskCommands::Create {
            title,
            description,
            priority,
            assignee,
            due,
            tags,
            dependencies,
        } => {
            let draft = TaskDraft {
                title,
                description,
                priority: priority.as_deref().map(parse_priority).transpose()?.unwrap_or_default(),
                assignee,
                due_date: due.as_deref().map(parse_due).transpose()?,
                tags,
                dependencies,
                ..TaskDraft::default()
            };
            let task = unwrap_response(ctx.api.create_task(draft).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Task created:");
                println!("{}", format_task_detail(&task));
            }
        }

        TaskCommands::List {
            status,
            assignee,
            priority,
            tag,
            limit,
        } => {
            let filters = TaskFilters {
                status: status.as_deref().map(parse_status).transpose()?,
                assignee,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                tag,
                limit: Some(limit),
            };
            let tasks = unwrap_response(ctx.api.list_tasks(filters).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                println!("{}", format_task_table(&tasks));
                println!("Showing {} task(s)", tasks.len());
            }
        }

        TaskCommands::Show { id } => {
            let task = unwrap_response(ctx.api.get_task(id).await)?
                .ok_or_else(|| anyhow!("task {id} not found"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("{}", format_task_detail(&task));
            }
        }

        TaskCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            assignee,
            actual_hours,
        } => {
            let patch = TaskPatch {
                title,
                description,
                status: status.as_deref().map(parse_status).transpose()?,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                assignee,
                actual_hours,
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err(anyhow!(
                    "nothing to update; pass at least one of --title, --description, --status, --priority, --assignee, --actual-hours"
                ));
            }
            let task = unwrap_response(ctx.api.update_task(id, patch).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Task updated:");
                println!("{}", format_task_detail(&task));
            }
        }

        TaskCommands::Delete { id } => {
            let existed = unwrap_response(ctx.api.delete_task(id).await)?;
            if json {
                println!("{}", serde_json::json!({ "deleted": existed }));
            } else if existed {
                println!("Task {id} deleted.");
            } else {
                println!("Task {id} was not found.");
            }
        }

        TaskCommands::Criteria {
            id,
            criterion,
            unmet,
        } => {
            let task = unwrap_response(
                ctx.api
                    .update_completion_criteria(id, criterion, !unmet)
                    .await,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                let met = task.completion_criteria.iter().filter(|c| c.completed).count();
                println!(
                    "Criterion updated; {met}/{} met on {:?}.",
                    task.completion_criteria.len(),
                    task.title
                );
            }
        }

        TaskCommands::BulkStatus { status, ids } => {
            let status = parse_status(&status)?;
            let result = ctx.api.bulk_status_change(&ids, status).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Updated {} task(s), {} failed.", result.updated, result.failed);
                for error in &result.errors {
                    println!("  - {error}");
                }
            }
        }
    }

    Ok(())
}
