//! The automation engine: task registry plus rule dispatch.
//!
//! The engine is the single owner of task state. Every mutation is
//! serialized on a per-task mutex, appends exactly one event to the
//! log, and then (with the lock already released) runs rule dispatch.
//! Rule actions that mutate tasks re-enter the same mutation path with
//! a hop-counted chain, which bounds the recursion and prevents a rule
//! from firing twice for one originating event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    parse_schedule, AutomationConfig, AutomationEvent, AutomationRule, RuleAction, Task,
    TaskDraft, TaskPatch, TaskStatus, Trigger,
};
use crate::domain::ports::{
    AutomationFailure, AutomationObserver, EventStore, LogNotifier, Notifier, RuleRepository,
    TaskFilters, TaskRepository,
};
use crate::services::rules::{conditions_hold, trigger_matches, TriggerEvent};
use crate::services::sync::SyncService;

/// Provenance of a dispatch chain. Each automated mutation bumps the
/// hop counter and records the rule that caused it, so a chain can
/// neither loop through the same rule nor exceed the configured depth.
#[derive(Debug, Clone, Default)]
pub struct DispatchChain {
    hops: u32,
    fired: Vec<Uuid>,
}

impl DispatchChain {
    /// Chain for a caller-originated (manual or webhook) mutation.
    pub fn manual() -> Self {
        Self::default()
    }

    /// True once any automated mutation happened in this chain.
    pub fn automated(&self) -> bool {
        self.hops > 0
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    fn contains(&self, rule_id: Uuid) -> bool {
        self.fired.contains(&rule_id)
    }

    fn bump(&self, rule_id: Uuid) -> Self {
        let mut fired = self.fired.clone();
        fired.push(rule_id);
        Self {
            hops: self.hops + 1,
            fired,
        }
    }
}

/// Task registry and rule engine in one service object. Constructed
/// once at process start and passed by handle; tests build isolated
/// instances freely.
pub struct AutomationEngine {
    tasks: Arc<dyn TaskRepository>,
    rules: Arc<dyn RuleRepository>,
    events: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    observers: std::sync::RwLock<Vec<Arc<dyn AutomationObserver>>>,
    sync: Option<Arc<SyncService>>,
    /// Per-task mutation mutexes. Never held across dispatch or I/O to
    /// external systems.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Last firing per time-based rule.
    time_marks: Mutex<HashMap<Uuid, DateTime<Utc>>>,
    config: AutomationConfig,
}

impl AutomationEngine {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        rules: Arc<dyn RuleRepository>,
        events: Arc<dyn EventStore>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            tasks,
            rules,
            events,
            notifier: Arc::new(LogNotifier),
            observers: std::sync::RwLock::new(Vec::new()),
            sync: None,
            locks: Mutex::new(HashMap::new()),
            time_marks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_sync(mut self, sync: Arc<SyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Register an observer for automation failures.
    pub fn add_observer(&self, observer: Arc<dyn AutomationObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::clone(&self.tasks)
    }

    pub fn event_store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.events)
    }

    // -----------------------------------------------------------------
    // Task registry
    // -----------------------------------------------------------------

    /// Create a task from a draft. Dispatches a `status_change` trigger
    /// with no previous status.
    pub async fn create_task(&self, draft: TaskDraft) -> DomainResult<Task> {
        self.create_internal(draft, DispatchChain::manual()).await
    }

    /// Update a task. Dispatches a `status_change` trigger whether or
    /// not the status moved (`from == to` for plain field updates), so
    /// rules conditioned on the current column re-evaluate.
    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> DomainResult<Task> {
        self.apply_patch(id, patch, DispatchChain::manual()).await
    }

    /// Delete a task. Returns false when the id is unknown.
    pub async fn delete_task(&self, id: Uuid) -> DomainResult<bool> {
        let _guard = self.lock_task(id).await;
        let existed = self.tasks.delete(id).await?;
        if existed {
            self.append_event(AutomationEvent::task_deleted(id)).await;
        }
        Ok(existed)
    }

    pub async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>> {
        self.tasks.get(id).await
    }

    pub async fn list_tasks(&self, filters: TaskFilters) -> DomainResult<Vec<Task>> {
        self.tasks.list(filters).await
    }

    /// Correlation lookup used by webhook ingestion.
    pub async fn find_task_by_metadata(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> DomainResult<Option<Task>> {
        self.tasks.find_by_metadata(key, value).await
    }

    /// Mark one completion criterion done or not done. Fires the
    /// `criteria_met` trigger exactly once, on the mutation that
    /// completes the last open criterion.
    pub async fn update_completion_criteria(
        &self,
        task_id: Uuid,
        criterion_id: Uuid,
        completed: bool,
    ) -> DomainResult<Task> {
        let (task, fire) = {
            let _guard = self.lock_task(task_id).await;
            let mut task = self
                .tasks
                .get(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;

            let was_all_met = task.all_criteria_met();
            let criterion = task
                .completion_criteria
                .iter_mut()
                .find(|c| c.id == criterion_id)
                .ok_or(DomainError::CriterionNotFound {
                    task: task_id,
                    criterion: criterion_id,
                })?;

            criterion.completed = completed;
            criterion.completed_at = completed.then(Utc::now);
            task.touch();
            self.tasks.update(&task).await?;
            self.append_event(AutomationEvent::task_updated(task_id, false))
                .await;

            let fire = completed && !was_all_met && task.all_criteria_met();
            (task, fire)
        };

        // Lock released; only the mutation that completed the last open
        // criterion fires the trigger.
        if fire {
            self.dispatch(
                TriggerEvent::CriteriaMet,
                task.clone(),
                None,
                DispatchChain::manual(),
            )
            .await;
            return Ok(self.tasks.get(task_id).await?.unwrap_or(task));
        }
        Ok(task)
    }

    // -----------------------------------------------------------------
    // Rule management
    // -----------------------------------------------------------------

    /// Register a rule. Malformed definitions are rejected here.
    pub async fn add_rule(&self, rule: AutomationRule) -> DomainResult<AutomationRule> {
        rule.validate().map_err(DomainError::Validation)?;
        self.rules.insert(&rule).await?;
        tracing::info!(rule = %rule.name, trigger = rule.trigger.kind(), "Automation rule registered");
        Ok(rule)
    }

    pub async fn remove_rule(&self, id: Uuid) -> DomainResult<bool> {
        self.rules.delete(id).await
    }

    pub async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool> {
        self.rules.set_enabled(id, enabled).await
    }

    pub async fn list_rules(&self) -> DomainResult<Vec<AutomationRule>> {
        self.rules.list().await
    }

    /// Install the builtin rule set, skipping names already present.
    pub async fn install_builtin_rules(&self) -> DomainResult<usize> {
        let existing = self.rules.list().await?;
        let mut installed = 0;
        for rule in crate::services::rules::builtin_rules() {
            if existing.iter().any(|r| r.name == rule.name) {
                continue;
            }
            self.add_rule(rule).await?;
            installed += 1;
        }
        Ok(installed)
    }

    // -----------------------------------------------------------------
    // Webhook entry points
    // -----------------------------------------------------------------

    /// Dispatch a named canonical webhook event against a task, for
    /// rules with `webhook` triggers.
    pub async fn dispatch_webhook_event(&self, event: &str, task: &Task) {
        self.dispatch(
            TriggerEvent::Webhook {
                event: event.to_string(),
            },
            task.clone(),
            None,
            DispatchChain::manual(),
        )
        .await;
    }

    // -----------------------------------------------------------------
    // Scheduler sweep
    // -----------------------------------------------------------------

    /// Evaluate time-based rules whose interval has elapsed. Returns
    /// the number of rule executions performed.
    pub async fn run_time_rules(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let rules = self.rules.list().await?;
        let mut executed = 0;

        for rule in rules.iter().filter(|r| r.enabled) {
            let Trigger::TimeBased { ref schedule } = rule.trigger else {
                continue;
            };
            let interval = match parse_schedule(schedule) {
                Ok(d) => d,
                Err(err) => {
                    // Validation should have caught this; skip defensively.
                    tracing::warn!(rule = %rule.name, %err, "Unparseable time schedule");
                    continue;
                }
            };

            let due = {
                let mut marks = self.time_marks.lock().await;
                let due = marks.get(&rule.id).is_none_or(|last| {
                    (now - *last).to_std().unwrap_or_default() >= interval
                });
                if due {
                    marks.insert(rule.id, now);
                }
                due
            };
            if !due {
                continue;
            }

            let tasks = self.tasks.list(TaskFilters::default()).await?;
            for task in tasks.iter().filter(|t| !t.is_terminal()) {
                if !conditions_hold(&rule.conditions, task) {
                    continue;
                }
                executed += 1;
                self.run_rule(rule, task, DispatchChain::manual()).await;
            }
        }

        Ok(executed)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn lock_task(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        mutex.lock_owned().await
    }

    async fn append_event(&self, event: AutomationEvent) {
        if let Err(err) = self.events.append(&event).await {
            tracing::warn!(%err, kind = event.kind.as_str(), "Failed to append automation event");
        }
    }

    fn create_internal<'a>(
        &'a self,
        draft: TaskDraft,
        chain: DispatchChain,
    ) -> BoxFuture<'a, DomainResult<Task>> {
        async move {
            let task = draft.into_task();
            task.validate().map_err(DomainError::Validation)?;

            self.tasks.insert(&task).await?;
            self.append_event(AutomationEvent::task_created(
                task.id,
                task.status,
                chain.automated(),
            ))
            .await;

            self.dispatch(
                TriggerEvent::StatusChange {
                    from: None,
                    to: task.status,
                },
                task.clone(),
                None,
                chain.clone(),
            )
            .await;

            if task.status.is_terminal_success() {
                self.process_dependency_completion(task.id, chain).await;
            }

            // Dispatch may have mutated the task; return the live row.
            Ok(self.tasks.get(task.id).await?.unwrap_or(task))
        }
        .boxed()
    }

    fn apply_patch<'a>(
        &'a self,
        id: Uuid,
        patch: TaskPatch,
        chain: DispatchChain,
    ) -> BoxFuture<'a, DomainResult<Task>> {
        async move {
            let (task, previous) = {
                let _guard = self.lock_task(id).await;
                let previous = self
                    .tasks
                    .get(id)
                    .await?
                    .ok_or(DomainError::TaskNotFound(id))?;

                let mut task = previous.clone();
                patch.apply_to(&mut task);
                task.touch();
                task.validate().map_err(DomainError::Validation)?;

                let leaving_todo =
                    previous.status == TaskStatus::Todo && task.status != TaskStatus::Todo;
                if chain.automated() && leaving_todo && !self.dependencies_met(&task).await? {
                    return Err(DomainError::Validation(format!(
                        "task {id} has incomplete dependencies and cannot be auto-started"
                    )));
                }

                self.tasks.update(&task).await?;

                if previous.status == task.status {
                    self.append_event(AutomationEvent::task_updated(id, chain.automated()))
                        .await;
                } else {
                    self.append_event(AutomationEvent::status_changed(
                        id,
                        previous.status,
                        task.status,
                        chain.automated(),
                    ))
                    .await;
                }

                (task, previous)
            };

            self.dispatch(
                TriggerEvent::StatusChange {
                    from: Some(previous.status),
                    to: task.status,
                },
                task.clone(),
                Some(previous.clone()),
                chain.clone(),
            )
            .await;

            if task.status.is_terminal_success() && !previous.status.is_terminal_success() {
                self.process_dependency_completion(task.id, chain).await;
            }

            Ok(self.tasks.get(id).await?.unwrap_or(task))
        }
        .boxed()
    }

    async fn dependencies_met(&self, task: &Task) -> DomainResult<bool> {
        for dep_id in &task.dependencies {
            match self.tasks.get(*dep_id).await? {
                Some(dep) if dep.status.is_terminal_success() => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// After a task reaches terminal success, fire `dependency_completed`
    /// for every dependent whose dependency set is now fully satisfied.
    fn process_dependency_completion<'a>(
        &'a self,
        completed_id: Uuid,
        chain: DispatchChain,
    ) -> BoxFuture<'a, ()> {
        async move {
            let dependents = match self.tasks.list_dependents(completed_id).await {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(%err, "Failed to scan dependents");
                    return;
                }
            };

            for dependent in dependents {
                if dependent.is_terminal() {
                    continue;
                }
                match self.dependencies_met(&dependent).await {
                    Ok(true) => {
                        self.dispatch(
                            TriggerEvent::DependencyCompleted,
                            dependent.clone(),
                            None,
                            chain.clone(),
                        )
                        .await;
                    }
                    Ok(false) => {}
                    Err(err) => tracing::warn!(%err, "Failed to check dependencies"),
                }
            }
        }
        .boxed()
    }

    /// Evaluate all enabled rules against an event. One rule's failure
    /// never aborts its siblings; each failure becomes an
    /// `automation_failed` event and an observer callback.
    fn dispatch<'a>(
        &'a self,
        event: TriggerEvent,
        task: Task,
        _previous: Option<Task>,
        chain: DispatchChain,
    ) -> BoxFuture<'a, ()> {
        async move {
            if chain.hops >= self.config.max_automation_hops {
                tracing::debug!(
                    task_id = %task.id,
                    hops = chain.hops,
                    "Automation hop limit reached; not evaluating rules"
                );
                return;
            }

            let rules = match self.rules.list().await {
                Ok(rules) => rules,
                Err(err) => {
                    tracing::warn!(%err, "Failed to load rules for dispatch");
                    return;
                }
            };

            for rule in rules {
                if !rule.enabled || chain.contains(rule.id) {
                    continue;
                }
                if !trigger_matches(&rule.trigger, &event) {
                    continue;
                }
                if !conditions_hold(&rule.conditions, &task) {
                    continue;
                }
                self.run_rule(&rule, &task, chain.clone()).await;
            }
        }
        .boxed()
    }

    /// Execute one matched rule and record the outcome.
    async fn run_rule(&self, rule: &AutomationRule, task: &Task, chain: DispatchChain) {
        let started = Instant::now();
        match self.execute_action(rule, task, chain).await {
            Ok(()) => {
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(rule = %rule.name, task_id = %task.id, "Automation rule executed");
                self.append_event(AutomationEvent::rule_executed(task.id, rule.id, elapsed_ms))
                    .await;
            }
            Err(err) => {
                tracing::warn!(rule = %rule.name, task_id = %task.id, %err, "Automation rule failed");
                self.append_event(AutomationEvent::automation_failed(
                    task.id,
                    Some(rule.id),
                    err.to_string(),
                ))
                .await;
                let failure = AutomationFailure {
                    rule_id: rule.id,
                    rule_name: rule.name.clone(),
                    task_id: task.id,
                    error: err.to_string(),
                };
                if let Ok(observers) = self.observers.read() {
                    for observer in observers.iter() {
                        observer.on_failure(&failure);
                    }
                }
            }
        }
    }

    async fn execute_action(
        &self,
        rule: &AutomationRule,
        task: &Task,
        chain: DispatchChain,
    ) -> DomainResult<()> {
        match &rule.action {
            RuleAction::ChangeStatus { target } => {
                let current = self
                    .tasks
                    .get(task.id)
                    .await?
                    .ok_or(DomainError::TaskNotFound(task.id))?;
                if current.status == *target {
                    return Ok(());
                }
                self.apply_patch(task.id, TaskPatch::status(*target), chain.bump(rule.id))
                    .await?;
                Ok(())
            }
            RuleAction::AssignUser { assignee } => {
                self.apply_patch(
                    task.id,
                    TaskPatch::assignee(assignee.clone()),
                    chain.bump(rule.id),
                )
                .await?;
                Ok(())
            }
            RuleAction::SendNotification { template } => {
                let message = template.clone().unwrap_or_else(|| {
                    format!(
                        "Task \"{}\" status changed to {}",
                        task.title,
                        task.status.as_str()
                    )
                });
                self.notifier.notify(task, &message).await
            }
            RuleAction::CreateTask { template } => {
                let draft = template.to_draft(&task.title);
                self.create_internal(draft, chain.bump(rule.id)).await?;
                Ok(())
            }
            RuleAction::UpdateExternalSystem { binding } => {
                let sync = self.sync.as_ref().ok_or_else(|| DomainError::ExternalSystem {
                    binding: binding.clone(),
                    reason: "no sync service configured".to_string(),
                })?;
                // Fire-and-forget: the push runs out-of-band with its
                // own timeout and backoff, never under a task lock.
                sync.spawn_push(binding, task.id)
            }
        }
    }
}
