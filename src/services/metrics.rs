//! Log-derived metrics.
//!
//! Every figure here is computed by scanning the event log (plus the
//! current task set for bottlenecks), never from separately maintained
//! counters, so a metrics bug can never diverge from the audit trail.
//! The derivations are pure functions over event slices; the service
//! wrapper fetches the retained log and applies time windows. Reads
//! take no task locks and may observe a slightly stale log.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AutomationEvent, EventKind, EventQuery, MetricsConfig, Task, TaskStatus,
};
use crate::domain::ports::{EventStore, RuleRepository, TaskFilters, TaskRepository};

/// A status bucket holding more tasks than expected for longer than
/// expected.
#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub status: TaskStatus,
    pub average_hours_in_status: f64,
    pub tasks_stuck: usize,
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    Increasing,
    Stable,
    Decreasing,
}

impl VelocityTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Stable => "stable",
            Self::Decreasing => "decreasing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    Healthy,
    Warning,
    Critical,
}

impl SystemHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Aggregate figures for one query window.
#[derive(Debug, Clone, Serialize)]
pub struct TaskMetrics {
    pub total_tasks: usize,
    pub tasks_by_status: HashMap<TaskStatus, u64>,
    pub average_completion_hours: f64,
    /// Automated status changes over all status changes, percent.
    pub automation_efficiency: f64,
    pub manual_interventions: u64,
    pub bottlenecks: Vec<Bottleneck>,
    pub completed_in_window: u64,
    pub completed_previous_window: u64,
    pub velocity: VelocityTrend,
}

/// Per-rule execution figures for the efficiency report.
#[derive(Debug, Clone, Serialize)]
pub struct RulePerformance {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub executions: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub tasks_affected: usize,
    pub last_executed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_tasks_created: u64,
    pub automated_transitions: u64,
    pub manual_transitions: u64,
    pub automation_efficiency: f64,
    /// Rough estimate: two minutes of hands-on time per automated
    /// transition, in hours.
    pub time_saved_hours: f64,
    pub rule_performance: Vec<RulePerformance>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeHealth {
    pub active_automations: u64,
    pub recent_failures: Vec<AutomationEvent>,
    pub current_bottlenecks: Vec<Bottleneck>,
    pub system_health: SystemHealth,
}

// ---------------------------------------------------------------------
// Pure derivations
// ---------------------------------------------------------------------

fn in_window(events: &[AutomationEvent], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&AutomationEvent> {
    events
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .collect()
}

/// Automated status-change events over all status-change events, as a
/// percentage. 0 when the window holds no status changes.
pub fn automation_efficiency(events: &[AutomationEvent]) -> f64 {
    let status_changes: Vec<&AutomationEvent> = events
        .iter()
        .filter(|e| e.kind == EventKind::StatusChanged)
        .collect();
    if status_changes.is_empty() {
        return 0.0;
    }
    let automated = status_changes.iter().filter(|e| e.automated).count();
    (automated as f64 / status_changes.len() as f64) * 100.0
}

/// Manual status changes in the slice.
pub fn manual_interventions(events: &[AutomationEvent]) -> u64 {
    events
        .iter()
        .filter(|e| e.kind == EventKind::StatusChanged && !e.automated)
        .count() as u64
}

/// Transitions into `done` in the slice.
pub fn completed_count(events: &[AutomationEvent]) -> u64 {
    events
        .iter()
        .filter(|e| {
            e.kind == EventKind::StatusChanged && e.to_status == Some(TaskStatus::Done)
        })
        .count() as u64
}

/// Compare completed counts between two equal windows.
pub fn velocity_trend(current: u64, previous: u64, threshold: f64) -> VelocityTrend {
    let current = current as f64;
    let previous = previous as f64;
    if current > previous * (1.0 + threshold) {
        VelocityTrend::Increasing
    } else if current < previous * (1.0 - threshold) {
        VelocityTrend::Decreasing
    } else {
        VelocityTrend::Stable
    }
}

/// Mean hours from a task's creation event to its transition into
/// `done`, over tasks completed within the slice.
pub fn average_completion_hours(events: &[AutomationEvent]) -> f64 {
    let created_at: HashMap<Uuid, DateTime<Utc>> = events
        .iter()
        .filter(|e| e.kind == EventKind::TaskCreated)
        .map(|e| (e.task_id, e.timestamp))
        .collect();

    let mut durations = Vec::new();
    for event in events {
        if event.kind == EventKind::StatusChanged && event.to_status == Some(TaskStatus::Done) {
            if let Some(created) = created_at.get(&event.task_id) {
                let hours = (event.timestamp - *created).num_seconds() as f64 / 3600.0;
                if hours >= 0.0 {
                    durations.push(hours);
                }
            }
        }
    }

    if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    }
}

/// When each task most recently entered its current status, according
/// to the log. Falls back to `updated_at` for tasks whose entering
/// event was already pruned.
fn entered_current_status_at(task: &Task, events: &[AutomationEvent]) -> DateTime<Utc> {
    events
        .iter()
        .filter(|e| {
            e.task_id == task.id
                && e.to_status == Some(task.status)
                && matches!(e.kind, EventKind::StatusChanged | EventKind::TaskCreated)
        })
        .map(|e| e.timestamp)
        .max()
        .unwrap_or(task.updated_at)
}

/// Canned remediation suggestions per bottlenecked status.
fn bottleneck_suggestions(status: TaskStatus, average_hours: f64) -> Vec<String> {
    let mut suggestions: Vec<String> = match status {
        TaskStatus::Todo => vec![
            "Consider auto-assigning tasks based on team capacity".to_string(),
            "Review task prioritization and dependencies".to_string(),
        ],
        TaskStatus::InProgress => vec![
            "Check if tasks need to be broken down into smaller pieces".to_string(),
            "Review if assignees have blockers or need help".to_string(),
        ],
        TaskStatus::InReview => vec![
            "Set up automated review reminders".to_string(),
            "Consider introducing review time limits".to_string(),
        ],
        TaskStatus::Blocked => vec![
            "Set up automated escalation for blocked tasks".to_string(),
            "Review and resolve common blocking issues".to_string(),
        ],
        TaskStatus::Done | TaskStatus::Cancelled => Vec::new(),
    };

    if average_hours > 72.0 {
        suggestions.push("Consider time-based escalation rules".to_string());
    }
    suggestions
}

/// Detect statuses holding more than `min_tasks` tasks whose members
/// have dwelled longer than `min_hours` on average. Terminal statuses
/// are not bottlenecks.
pub fn detect_bottlenecks(
    tasks: &[Task],
    events: &[AutomationEvent],
    now: DateTime<Utc>,
    config: &MetricsConfig,
) -> Vec<Bottleneck> {
    let mut by_status: HashMap<TaskStatus, Vec<&Task>> = HashMap::new();
    for task in tasks {
        if !task.status.is_terminal() {
            by_status.entry(task.status).or_default().push(task);
        }
    }

    let mut bottlenecks = Vec::new();
    for status in TaskStatus::all() {
        let Some(members) = by_status.get(&status) else {
            continue;
        };
        if members.len() <= config.bottleneck_min_tasks {
            continue;
        }

        let total_hours: f64 = members
            .iter()
            .map(|t| {
                let entered = entered_current_status_at(t, events);
                ((now - entered).num_seconds().max(0)) as f64 / 3600.0
            })
            .sum();
        let average = total_hours / members.len() as f64;

        if average > config.bottleneck_min_hours {
            bottlenecks.push(Bottleneck {
                status,
                average_hours_in_status: average,
                tasks_stuck: members.len(),
                suggested_actions: bottleneck_suggestions(status, average),
            });
        }
    }

    bottlenecks
}

/// Threshold health function over recent failures and bottlenecks.
pub fn assess_health(
    failure_count: usize,
    bottleneck_count: usize,
    config: &MetricsConfig,
) -> SystemHealth {
    if failure_count >= config.failure_critical_threshold
        || bottleneck_count >= config.bottleneck_critical_threshold
    {
        SystemHealth::Critical
    } else if failure_count >= config.failure_warning_threshold
        || bottleneck_count >= config.bottleneck_warning_threshold
    {
        SystemHealth::Warning
    } else {
        SystemHealth::Healthy
    }
}

/// Group rule outcomes in the slice by rule id.
pub fn rule_performance(events: &[AutomationEvent]) -> Vec<RulePerformance> {
    struct Acc {
        executions: u64,
        failures: u64,
        duration_total: u64,
        duration_samples: u64,
        tasks: HashSet<Uuid>,
        last_executed: Option<DateTime<Utc>>,
    }

    let mut by_rule: HashMap<Uuid, Acc> = HashMap::new();
    for event in events {
        let Some(rule_id) = event.rule_id else {
            continue;
        };
        let acc = by_rule.entry(rule_id).or_insert_with(|| Acc {
            executions: 0,
            failures: 0,
            duration_total: 0,
            duration_samples: 0,
            tasks: HashSet::new(),
            last_executed: None,
        });
        match event.kind {
            EventKind::RuleExecuted => {
                acc.executions += 1;
                acc.tasks.insert(event.task_id);
                if let Some(ms) = event.duration_ms {
                    acc.duration_total += ms;
                    acc.duration_samples += 1;
                }
                acc.last_executed = Some(
                    acc.last_executed
                        .map_or(event.timestamp, |t| t.max(event.timestamp)),
                );
            }
            EventKind::AutomationFailed => {
                acc.failures += 1;
                acc.tasks.insert(event.task_id);
            }
            _ => {}
        }
    }

    let mut performance: Vec<RulePerformance> = by_rule
        .into_iter()
        .map(|(rule_id, acc)| {
            let attempts = acc.executions + acc.failures;
            RulePerformance {
                rule_id,
                rule_name: String::new(),
                executions: acc.executions,
                failures: acc.failures,
                success_rate: if attempts == 0 {
                    0.0
                } else {
                    (acc.executions as f64 / attempts as f64) * 100.0
                },
                average_duration_ms: if acc.duration_samples == 0 {
                    0.0
                } else {
                    acc.duration_total as f64 / acc.duration_samples as f64
                },
                tasks_affected: acc.tasks.len(),
                last_executed: acc.last_executed,
            }
        })
        .collect();

    performance.sort_by(|a, b| b.executions.cmp(&a.executions).then(a.rule_id.cmp(&b.rule_id)));
    performance
}

fn recommendations(performance: &[RulePerformance], efficiency: f64) -> Vec<String> {
    let mut out = Vec::new();
    if efficiency < 50.0 {
        out.push("Consider adding more automation rules to improve efficiency".to_string());
    }
    let underperforming = performance.iter().filter(|p| p.success_rate < 80.0).count();
    if underperforming > 0 {
        out.push(format!(
            "Review and optimize {underperforming} underperforming automation rules"
        ));
    }
    let idle = performance.iter().filter(|p| p.executions == 0).count();
    if idle > 0 {
        out.push(format!(
            "Consider removing or adjusting {idle} automation rules that never execute"
        ));
    }
    out
}

// ---------------------------------------------------------------------
// Service wrapper
// ---------------------------------------------------------------------

pub struct MetricsService {
    tasks: Arc<dyn TaskRepository>,
    rules: Arc<dyn RuleRepository>,
    events: Arc<dyn EventStore>,
    config: MetricsConfig,
}

impl MetricsService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        rules: Arc<dyn RuleRepository>,
        events: Arc<dyn EventStore>,
        config: MetricsConfig,
    ) -> Self {
        Self {
            tasks,
            rules,
            events,
            config,
        }
    }

    /// Aggregate metrics for the trailing window.
    pub async fn query_metrics(&self, window: Duration) -> DomainResult<TaskMetrics> {
        self.query_metrics_at(window, Utc::now()).await
    }

    /// Window-pinned variant, used by tests and backfills.
    pub async fn query_metrics_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<TaskMetrics> {
        let tasks = self.tasks.list(TaskFilters::default()).await?;
        let events = self.events.query(EventQuery::new()).await?;

        let window_start = now - window;
        let previous_start = window_start - window;

        let current: Vec<AutomationEvent> = in_window(&events, window_start, now)
            .into_iter()
            .cloned()
            .collect();
        let previous: Vec<AutomationEvent> = in_window(&events, previous_start, window_start)
            .into_iter()
            .cloned()
            .collect();

        let completed_in_window = completed_count(&current);
        let completed_previous_window = completed_count(&previous);

        Ok(TaskMetrics {
            total_tasks: tasks.len(),
            tasks_by_status: self.tasks.count_by_status().await?,
            average_completion_hours: average_completion_hours(&events),
            automation_efficiency: automation_efficiency(&current),
            manual_interventions: manual_interventions(&current),
            bottlenecks: detect_bottlenecks(&tasks, &events, now, &self.config),
            completed_in_window,
            completed_previous_window,
            velocity: velocity_trend(
                completed_in_window,
                completed_previous_window,
                self.config.velocity_threshold,
            ),
        })
    }

    /// Efficiency report for an explicit time range, with per-rule
    /// figures and textual recommendations.
    pub async fn generate_efficiency_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<EfficiencyReport> {
        let events = self.events.query(EventQuery::new()).await?;
        let slice: Vec<AutomationEvent> = in_window(&events, start, end)
            .into_iter()
            .cloned()
            .collect();

        let automated = slice
            .iter()
            .filter(|e| e.kind == EventKind::StatusChanged && e.automated)
            .count() as u64;
        let manual = manual_interventions(&slice);
        let efficiency = automation_efficiency(&slice);

        let mut performance = rule_performance(&slice);
        let known_rules = self.rules.list().await?;
        for perf in &mut performance {
            perf.rule_name = known_rules
                .iter()
                .find(|r| r.id == perf.rule_id)
                .map_or_else(|| "unknown rule".to_string(), |r| r.name.clone());
        }

        let total_tasks_created = slice
            .iter()
            .filter(|e| e.kind == EventKind::TaskCreated)
            .count() as u64;

        Ok(EfficiencyReport {
            start,
            end,
            total_tasks_created,
            automated_transitions: automated,
            manual_transitions: manual,
            automation_efficiency: efficiency,
            time_saved_hours: (automated as f64 * 2.0) / 60.0,
            recommendations: recommendations(&performance, efficiency),
            rule_performance: performance,
        })
    }

    /// Point-in-time health assessment; recomputed per poll, never
    /// persisted.
    pub async fn realtime_health(&self) -> DomainResult<RealtimeHealth> {
        self.realtime_health_at(Utc::now()).await
    }

    pub async fn realtime_health_at(&self, now: DateTime<Utc>) -> DomainResult<RealtimeHealth> {
        let window_start = now - Duration::hours(self.config.health_window_hours);
        let tasks = self.tasks.list(TaskFilters::default()).await?;
        let events = self.events.query(EventQuery::new()).await?;
        let recent = in_window(&events, window_start, now);

        let active_automations = recent
            .iter()
            .filter(|e| e.kind == EventKind::RuleExecuted)
            .count() as u64;
        let recent_failures: Vec<AutomationEvent> = recent
            .iter()
            .filter(|e| e.kind == EventKind::AutomationFailed)
            .map(|e| (*e).clone())
            .collect();
        let bottlenecks = detect_bottlenecks(&tasks, &events, now, &self.config);
        let health = assess_health(recent_failures.len(), bottlenecks.len(), &self.config);

        Ok(RealtimeHealth {
            active_automations,
            recent_failures,
            current_bottlenecks: bottlenecks,
            system_health: health,
        })
    }
}
