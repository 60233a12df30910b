//! Tabular output for CLI commands, via comfy-table.

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};

use crate::domain::models::{AutomationRule, Task};
use crate::services::metrics::{Bottleneck, TaskMetrics};

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|c| Cell::new(c).add_attribute(Attribute::Bold))
        .collect()
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub fn format_task_table(tasks: &[Task]) -> String {
    let mut table = base_table();
    table.set_header(header(&[
        "ID", "Title", "Status", "Priority", "Assignee", "Tags", "Updated",
    ]));

    for task in tasks {
        table.add_row(vec![
            Cell::new(short_id(&task.id)),
            Cell::new(truncate(&task.title, 40)),
            Cell::new(task.status.as_str()),
            Cell::new(task.priority.as_str()),
            Cell::new(task.assignee.as_deref().unwrap_or("-")),
            Cell::new(if task.tags.is_empty() {
                "-".to_string()
            } else {
                task.tags.join(",")
            }),
            Cell::new(task.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    table.to_string()
}

pub fn format_task_detail(task: &Task) -> String {
    let mut lines = vec![
        format!("  ID: {}", task.id),
        format!("  Title: {}", task.title),
        format!("  Status: {}", task.status.as_str()),
        format!("  Priority: {}", task.priority.as_str()),
    ];
    if let Some(ref description) = task.description {
        lines.push(format!("  Description: {description}"));
    }
    if let Some(ref assignee) = task.assignee {
        lines.push(format!("  Assignee: {assignee}"));
    }
    if let Some(due) = task.due_date {
        lines.push(format!("  Due: {}", due.format("%Y-%m-%d %H:%M UTC")));
    }
    if !task.tags.is_empty() {
        lines.push(format!("  Tags: {}", task.tags.join(", ")));
    }
    if !task.dependencies.is_empty() {
        lines.push(format!("  Dependencies: {} task(s)", task.dependencies.len()));
        for dep in &task.dependencies {
            lines.push(format!("    - {dep}"));
        }
    }
    if !task.completion_criteria.is_empty() {
        lines.push("  Completion criteria:".to_string());
        for criterion in &task.completion_criteria {
            lines.push(format!(
                "    [{}] {} ({})",
                if criterion.completed { "x" } else { " " },
                criterion.description,
                criterion.id
            ));
        }
    }
    if !task.metadata.is_empty() {
        lines.push("  Metadata:".to_string());
        let mut keys: Vec<_> = task.metadata.keys().collect();
        keys.sort();
        for key in keys {
            lines.push(format!("    {key} = {}", task.metadata[key]));
        }
    }
    lines.push(format!(
        "  Created: {}",
        task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(format!(
        "  Updated: {}",
        task.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.join("\n")
}

pub fn format_rule_table(rules: &[AutomationRule]) -> String {
    let mut table = base_table();
    table.set_header(header(&["ID", "Name", "Trigger", "Enabled", "Description"]));

    for rule in rules {
        table.add_row(vec![
            Cell::new(short_id(&rule.id)),
            Cell::new(truncate(&rule.name, 32)),
            Cell::new(rule.trigger.kind()),
            Cell::new(if rule.enabled { "yes" } else { "no" }),
            Cell::new(truncate(&rule.description, 40)),
        ]);
    }

    table.to_string()
}

pub fn format_metrics(metrics: &TaskMetrics) -> String {
    let mut lines = vec![
        format!("  Total tasks: {}", metrics.total_tasks),
        format!(
            "  Automation efficiency: {:.1}%",
            metrics.automation_efficiency
        ),
        format!("  Manual interventions: {}", metrics.manual_interventions),
        format!(
            "  Average completion time: {:.1}h",
            metrics.average_completion_hours
        ),
        format!(
            "  Velocity: {} ({} completed, {} in previous window)",
            metrics.velocity.as_str(),
            metrics.completed_in_window,
            metrics.completed_previous_window
        ),
    ];

    if !metrics.tasks_by_status.is_empty() {
        lines.push("  Tasks by status:".to_string());
        let mut by_status: Vec<_> = metrics.tasks_by_status.iter().collect();
        by_status.sort_by_key(|(status, _)| status.as_str());
        for (status, count) in by_status {
            lines.push(format!("    {}: {count}", status.as_str()));
        }
    }

    if metrics.bottlenecks.is_empty() {
        lines.push("  Bottlenecks: none".to_string());
    } else {
        lines.push("  Bottlenecks:".to_string());
        lines.push(format_bottlenecks(&metrics.bottlenecks));
    }

    lines.join("\n")
}

pub fn format_bottlenecks(bottlenecks: &[Bottleneck]) -> String {
    let mut lines = Vec::new();
    for bottleneck in bottlenecks {
        lines.push(format!(
            "    {}: {} task(s) stuck, avg {:.1}h",
            bottleneck.status.as_str(),
            bottleneck.tasks_stuck,
            bottleneck.average_hours_in_status
        ));
        for suggestion in &bottleneck.suggested_actions {
            lines.push(format!("      - {suggestion}"));
        }
    }
    lines.join("\n")
}
