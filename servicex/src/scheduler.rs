//! Task scheduler for periodic and one-shot bot work.
//!
//! Each started task runs as its own spawned tokio task. The scheduler
//! tracks state transitions and run counts so plugins can inspect and
//! control their tasks over IRC; unloading a plugin removes everything
//! it scheduled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use tokio::task::JoinHandle;

/// Work executed by a task. Each invocation builds a fresh future.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not started.
    Pending,
    /// Actively scheduled.
    Running,
    /// Periodic task suspended; can be resumed.
    Paused,
    /// Explicitly stopped.
    Stopped,
    /// Finished (one-shot ran, or periodic hit max runs).
    Completed,
    /// Callback returned an error.
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Stopped => "stopped",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

/// Parameters for a new task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    /// Tick period for periodic tasks; for one-shot tasks, the delay when
    /// `delay` is zero.
    pub interval: Option<Duration>,
    pub periodic: bool,
    /// Wait before the first run.
    pub delay: Duration,
    /// Periodic tasks complete after this many runs.
    pub max_runs: Option<u32>,
    /// Owning plugin, for bulk removal on unload.
    pub plugin: Option<String>,
    pub description: String,
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            interval: None,
            periodic: true,
            delay: Duration::ZERO,
            max_runs: None,
            plugin: None,
            description: String::new(),
        }
    }
}

/// Read-only view of a task for listings.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub periodic: bool,
    pub interval: Option<Duration>,
    pub delay: Duration,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub plugin: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
}

struct TaskEntry {
    spec: TaskSpec,
    callback: TaskFn,
    state: TaskState,
    run_count: u32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn snapshot(&self, id: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: id.to_string(),
            name: self.spec.name.clone(),
            state: self.state,
            periodic: self.spec.periodic,
            interval: self.spec.interval,
            delay: self.spec.delay,
            run_count: self.run_count,
            max_runs: self.spec.max_runs,
            plugin: self.spec.plugin.clone(),
            description: self.spec.description.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            last_run: self.last_run,
        }
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Shared scheduler handle. Clones refer to the same task table.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
}

const ID_ALPHABET: &[u8; 16] = b"0123456789abcdef";

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Periodic tasks require an interval. Returns the
    /// task id; the task stays `Pending` until started.
    pub fn add(&self, spec: TaskSpec, callback: TaskFn) -> Result<String> {
        if spec.periodic && spec.interval.is_none() {
            bail!("Periodic task '{}' requires an interval", spec.name);
        }

        let id = generate_id();
        let entry = TaskEntry {
            spec,
            callback,
            state: TaskState::Pending,
            run_count: 0,
            created_at: Utc::now(),
            started_at: None,
            last_run: None,
            handle: None,
        };
        tracing::info!(task_id = %id, name = %entry.spec.name, periodic = entry.spec.periodic, "Task added");
        self.tasks.lock().unwrap().insert(id.clone(), entry);
        Ok(id)
    }

    /// Register and immediately start a task.
    pub fn add_started(&self, spec: TaskSpec, callback: TaskFn) -> Result<String> {
        let id = self.add(spec, callback)?;
        self.start(&id);
        Ok(id)
    }

    /// Start a pending/stopped task. Returns false when the task is
    /// missing, already running, or already completed.
    pub fn start(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };
        match entry.state {
            TaskState::Running => {
                tracing::warn!(task_id = %id, "Task is already running");
                return false;
            }
            TaskState::Completed => {
                tracing::warn!(task_id = %id, "Task has already completed");
                return false;
            }
            _ => {}
        }

        let handle = if entry.spec.periodic {
            let interval = entry.spec.interval.unwrap_or(Duration::from_secs(60));
            self.spawn_periodic(id.to_string(), entry.spec.delay, interval, entry.callback.clone())
        } else {
            let wait = if entry.spec.delay > Duration::ZERO {
                entry.spec.delay
            } else {
                entry.spec.interval.unwrap_or(Duration::ZERO)
            };
            self.spawn_oneshot(id.to_string(), wait, entry.callback.clone())
        };

        entry.handle = Some(handle);
        entry.state = TaskState::Running;
        entry.started_at = Some(Utc::now());
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task started");
        true
    }

    /// Stop a running or paused task.
    pub fn stop(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };
        if !matches!(entry.state, TaskState::Running | TaskState::Paused) {
            tracing::warn!(task_id = %id, "Task is not running");
            return false;
        }
        entry.abort();
        entry.state = TaskState::Stopped;
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task stopped");
        true
    }

    /// Pause a running periodic task.
    pub fn pause(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };
        if !entry.spec.periodic {
            tracing::warn!(task_id = %id, "Cannot pause a one-shot task");
            return false;
        }
        if entry.state != TaskState::Running {
            tracing::warn!(task_id = %id, "Task is not running");
            return false;
        }
        entry.abort();
        entry.state = TaskState::Paused;
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task paused");
        true
    }

    /// Resume a paused task. The first tick lands one interval later.
    pub fn resume(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };
        if entry.state != TaskState::Paused {
            tracing::warn!(task_id = %id, "Task is not paused");
            return false;
        }
        let interval = entry.spec.interval.unwrap_or(Duration::from_secs(60));
        let handle =
            self.spawn_periodic(id.to_string(), interval, interval, entry.callback.clone());
        entry.handle = Some(handle);
        entry.state = TaskState::Running;
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task resumed");
        true
    }

    /// Remove a task, stopping it first if needed.
    pub fn remove(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(mut entry) = tasks.remove(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };
        entry.abort();
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task removed");
        true
    }

    /// Change interval, max runs, and/or description. A running task
    /// whose interval changes is rescheduled on the new period.
    pub fn modify(
        &self,
        id: &str,
        interval: Option<Duration>,
        max_runs: Option<u32>,
        description: Option<String>,
    ) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(id) else {
            tracing::warn!(task_id = %id, "Task not found");
            return false;
        };

        let reschedule = entry.state == TaskState::Running && interval.is_some();
        if let Some(i) = interval {
            entry.spec.interval = Some(i);
        }
        if let Some(m) = max_runs {
            entry.spec.max_runs = Some(m);
        }
        if let Some(d) = description {
            entry.spec.description = d;
        }

        if reschedule {
            entry.abort();
            let interval = entry.spec.interval.unwrap_or(Duration::from_secs(60));
            let handle =
                self.spawn_periodic(id.to_string(), interval, interval, entry.callback.clone());
            entry.handle = Some(handle);
        }
        tracing::info!(task_id = %id, name = %entry.spec.name, "Task modified");
        true
    }

    pub fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.tasks
            .lock()
            .unwrap()
            .get(id)
            .map(|entry| entry.snapshot(id))
    }

    pub fn get_by_name(&self, name: &str) -> Option<TaskSnapshot> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|(_, entry)| entry.spec.name == name)
            .map(|(id, entry)| entry.snapshot(id))
    }

    /// List tasks, optionally filtered by owning plugin and/or state.
    /// Sorted by creation time.
    pub fn list(&self, plugin: Option<&str>, state: Option<TaskState>) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.lock().unwrap();
        let mut out: Vec<TaskSnapshot> = tasks
            .iter()
            .filter(|(_, entry)| {
                plugin.is_none_or(|p| entry.spec.plugin.as_deref() == Some(p))
                    && state.is_none_or(|s| entry.state == s)
            })
            .map(|(id, entry)| entry.snapshot(id))
            .collect();
        out.sort_by_key(|t| t.created_at);
        out
    }

    /// Stop every running or paused task.
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for entry in tasks.values_mut() {
            if matches!(entry.state, TaskState::Running | TaskState::Paused) {
                entry.abort();
                entry.state = TaskState::Stopped;
            }
        }
        tracing::info!("Stopped all tasks");
    }

    /// Remove every task owned by a plugin. Returns how many went away.
    pub fn remove_plugin_tasks(&self, plugin: &str) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        let ids: Vec<String> = tasks
            .iter()
            .filter(|(_, entry)| entry.spec.plugin.as_deref() == Some(plugin))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(mut entry) = tasks.remove(id) {
                entry.abort();
            }
        }
        tracing::info!(plugin, count = ids.len(), "Removed plugin tasks");
        ids.len()
    }

    fn spawn_periodic(
        &self,
        id: String,
        initial_wait: Duration,
        period: Duration,
        callback: TaskFn,
    ) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            if initial_wait > Duration::ZERO {
                tokio::time::sleep(initial_wait).await;
            }
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = (callback)().await;
                let mut map = tasks.lock().unwrap();
                let Some(entry) = map.get_mut(&id) else { break };
                entry.last_run = Some(Utc::now());
                entry.run_count += 1;
                match result {
                    Err(e) => {
                        tracing::error!(task = %entry.spec.name, error = %e, "Task execution failed");
                        entry.state = TaskState::Failed;
                        break;
                    }
                    Ok(()) => {
                        if let Some(max) = entry.spec.max_runs
                            && entry.run_count >= max
                        {
                            tracing::info!(task = %entry.spec.name, max, "Task reached max runs");
                            entry.state = TaskState::Completed;
                            break;
                        }
                    }
                }
            }
        })
    }

    fn spawn_oneshot(&self, id: String, wait: Duration, callback: TaskFn) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            if wait > Duration::ZERO {
                tokio::time::sleep(wait).await;
            }
            let result = (callback)().await;
            let mut map = tasks.lock().unwrap();
            if let Some(entry) = map.get_mut(&id) {
                entry.last_run = Some(Utc::now());
                entry.run_count += 1;
                entry.state = match result {
                    Ok(()) => TaskState::Completed,
                    Err(e) => {
                        tracing::error!(task = %entry.spec.name, error = %e, "Task execution failed");
                        TaskState::Failed
                    }
                };
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_callback(counter: Arc<AtomicU32>) -> TaskFn {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_callback() -> TaskFn {
        Arc::new(|| Box::pin(async { anyhow::bail!("boom") }))
    }

    #[test]
    fn generated_ids_are_short_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn periodic_task_requires_interval() {
        let scheduler = Scheduler::new();
        let spec = TaskSpec {
            name: "tick".to_string(),
            periodic: true,
            ..TaskSpec::default()
        };
        assert!(scheduler.add(spec, counting_callback(Default::default())).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_runs_once_and_completes() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let id = scheduler
            .add_started(
                TaskSpec {
                    name: "once".to_string(),
                    periodic: false,
                    delay: Duration::from_millis(10),
                    ..TaskSpec::default()
                },
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let snap = scheduler.get(&id).unwrap();
        assert_eq!(snap.state, TaskState::Completed);
        assert_eq!(snap.run_count, 1);
        assert!(snap.last_run.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_honors_max_runs() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let id = scheduler
            .add_started(
                TaskSpec {
                    name: "thrice".to_string(),
                    interval: Some(Duration::from_millis(10)),
                    max_runs: Some(3),
                    ..TaskSpec::default()
                },
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let snap = scheduler.get(&id).unwrap();
        assert_eq!(snap.state, TaskState::Completed);
        assert_eq!(snap.run_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_is_marked_failed() {
        let scheduler = Scheduler::new();
        let id = scheduler
            .add_started(
                TaskSpec {
                    name: "boom".to_string(),
                    interval: Some(Duration::from_millis(10)),
                    ..TaskSpec::default()
                },
                failing_callback(),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snap = scheduler.get(&id).unwrap();
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.run_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_stop_and_restart_ticks() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let id = scheduler
            .add_started(
                TaskSpec {
                    name: "tick".to_string(),
                    interval: Some(Duration::from_millis(10)),
                    ..TaskSpec::default()
                },
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(scheduler.pause(&id));
        let frozen = counter.load(Ordering::SeqCst);
        assert!(frozen >= 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), frozen, "paused task must not tick");
        assert_eq!(scheduler.get(&id).unwrap().state, TaskState::Paused);

        assert!(scheduler.resume(&id));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(counter.load(Ordering::SeqCst) > frozen, "resumed task must tick again");
    }

    #[tokio::test]
    async fn invalid_transitions_are_refused() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));

        // Unknown ids
        assert!(!scheduler.start("nope"));
        assert!(!scheduler.stop("nope"));
        assert!(!scheduler.remove("nope"));

        // One-shot tasks cannot pause
        let oneshot = scheduler
            .add(
                TaskSpec {
                    name: "once".to_string(),
                    periodic: false,
                    delay: Duration::from_secs(60),
                    ..TaskSpec::default()
                },
                counting_callback(counter.clone()),
            )
            .unwrap();
        scheduler.start(&oneshot);
        assert!(!scheduler.pause(&oneshot));

        // Pending tasks cannot stop or resume
        let pending = scheduler
            .add(
                TaskSpec {
                    name: "later".to_string(),
                    interval: Some(Duration::from_secs(60)),
                    ..TaskSpec::default()
                },
                counting_callback(counter),
            )
            .unwrap();
        assert!(!scheduler.stop(&pending));
        assert!(!scheduler.resume(&pending));

        // Double start is refused
        assert!(scheduler.start(&pending));
        assert!(!scheduler.start(&pending));
    }

    #[tokio::test]
    async fn plugin_scoped_removal() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        for name in ["a", "b"] {
            scheduler
                .add(
                    TaskSpec {
                        name: name.to_string(),
                        interval: Some(Duration::from_secs(60)),
                        plugin: Some("fun".to_string()),
                        ..TaskSpec::default()
                    },
                    counting_callback(counter.clone()),
                )
                .unwrap();
        }
        scheduler
            .add(
                TaskSpec {
                    name: "c".to_string(),
                    interval: Some(Duration::from_secs(60)),
                    plugin: Some("channel".to_string()),
                    ..TaskSpec::default()
                },
                counting_callback(counter),
            )
            .unwrap();

        assert_eq!(scheduler.list(Some("fun"), None).len(), 2);
        assert_eq!(scheduler.remove_plugin_tasks("fun"), 2);
        assert!(scheduler.list(Some("fun"), None).is_empty());
        assert_eq!(scheduler.list(None, None).len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let started = scheduler
            .add_started(
                TaskSpec {
                    name: "running".to_string(),
                    interval: Some(Duration::from_secs(60)),
                    delay: Duration::from_secs(60),
                    ..TaskSpec::default()
                },
                counting_callback(counter.clone()),
            )
            .unwrap();
        scheduler
            .add(
                TaskSpec {
                    name: "pending".to_string(),
                    interval: Some(Duration::from_secs(60)),
                    ..TaskSpec::default()
                },
                counting_callback(counter),
            )
            .unwrap();

        let running = scheduler.list(None, Some(TaskState::Running));
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, started);
        assert_eq!(scheduler.list(None, Some(TaskState::Pending)).len(), 1);
        assert_eq!(scheduler.list(None, None).len(), 2);

        assert!(scheduler.get_by_name("pending").is_some());
        assert!(scheduler.get_by_name("ghost").is_none());
    }
}
