//! `ProactiveScheduler`: owns the process clock and turns periodic telemetry
//! scans into incident triggers. Tick-loop shape is lifted directly from
//! `event_scheduler.rs`'s `AtomicBool` running flag plus a `tokio::spawn`'d
//! wake-every-N loop; the task table itself is this module's own.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::models::{DetectResult, DetectSource, TriggerType};
use crate::infrastructure::config::settings::SchedulerConfig;
use crate::services::detect_agent::DetectAgent;
use crate::services::incident_orchestrator::{HandleIncidentParams, IncidentOrchestrator};

/// How a scheduled task decides it is due.
#[derive(Debug, Clone)]
pub enum TaskSchedule {
    Interval { every: Duration },
    Cron { expression: String },
}

/// What a task does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    QuickScan,
    FullReport,
    SecurityCheck,
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: String,
    pub schedule: TaskSchedule,
    pub action: TaskAction,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.schedule {
            TaskSchedule::Interval { every } => match self.last_run {
                None => true,
                Some(last) => {
                    now.signed_duration_since(last)
                        >= chrono::Duration::from_std(*every).unwrap_or(chrono::TimeDelta::MAX)
                }
            },
            TaskSchedule::Cron { expression } => match cron::Schedule::from_str(expression) {
                Ok(schedule) => {
                    let reference = self.last_run.unwrap_or(now - chrono::Duration::days(1));
                    schedule.after(&reference).next().is_some_and(|next| now >= next)
                }
                Err(_) => false,
            },
        }
    }
}

fn builtin_tasks(config: &SchedulerConfig) -> Vec<ScheduledTask> {
    vec![
        ScheduledTask {
            name: "heartbeat".to_string(),
            schedule: TaskSchedule::Interval {
                every: Duration::from_secs(config.heartbeat_interval_seconds),
            },
            action: TaskAction::QuickScan,
            enabled: true,
            last_run: None,
        },
        ScheduledTask {
            name: "daily_report".to_string(),
            schedule: TaskSchedule::Cron { expression: config.daily_report_cron.clone() },
            action: TaskAction::FullReport,
            enabled: true,
            last_run: None,
        },
        ScheduledTask {
            name: "security_scan".to_string(),
            schedule: TaskSchedule::Interval {
                every: Duration::from_secs(config.security_scan_interval_seconds),
            },
            action: TaskAction::SecurityCheck,
            enabled: true,
            last_run: None,
        },
    ]
}

/// Outcome of one task firing, passed to registered alert callbacks and
/// returned directly by `trigger_event`.
#[derive(Debug, Clone)]
pub struct ProactiveResult {
    pub task_name: String,
    pub action: TaskAction,
    pub findings: usize,
    pub detect_id: Option<uuid::Uuid>,
    pub triggered_incident: bool,
}

/// Health snapshot exposing the scheduler's own tick loop state, including
/// the last tick's error so a stalled heartbeat is observable rather than
/// silently swallowed.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub tick_count: u64,
    pub last_tick_error: Option<String>,
    pub consecutive_tick_failures: u32,
}

type AlertCallback = Arc<dyn Fn(&ProactiveResult) + Send + Sync>;

/// Cooperative single-loop scheduler: wakes every 30s, runs each due task
/// in-line (never overlapping within one instance), and hands successful
/// findings off to the orchestrator without blocking the next tick.
pub struct ProactiveScheduler {
    detect_agent: Arc<DetectAgent>,
    orchestrator: Arc<IncidentOrchestrator>,
    tasks: RwLock<Vec<ScheduledTask>>,
    alert_callbacks: RwLock<Vec<AlertCallback>>,
    last_detect_result: RwLock<Option<Arc<DetectResult>>>,
    running: Arc<AtomicBool>,
    tick_count: Arc<AtomicU32>,
    last_tick_error: RwLock<Option<String>>,
    consecutive_tick_failures: Arc<AtomicU32>,
    join_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
    tick_interval: Duration,
}

/// Default cooperative tick interval, per §4.3's scheduling model; overridden
/// by `scheduler.tick_interval_seconds` when non-zero.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);
/// Max time `stop` waits for the tick loop to notice the cancellation flag.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl ProactiveScheduler {
    pub fn new(
        detect_agent: Arc<DetectAgent>,
        orchestrator: Arc<IncidentOrchestrator>,
        config: &SchedulerConfig,
    ) -> Self {
        let tick_interval = if config.tick_interval_seconds == 0 {
            DEFAULT_TICK_INTERVAL
        } else {
            Duration::from_secs(config.tick_interval_seconds)
        };
        Self {
            detect_agent,
            orchestrator,
            tasks: RwLock::new(builtin_tasks(config)),
            alert_callbacks: RwLock::new(Vec::new()),
            last_detect_result: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
            tick_count: Arc::new(AtomicU32::new(0)),
            last_tick_error: RwLock::new(None),
            consecutive_tick_failures: Arc::new(AtomicU32::new(0)),
            join_handle: RwLock::new(None),
            tick_interval,
        }
    }

    pub async fn enable_task(&self, name: &str, enabled: bool) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.iter_mut().find(|t| t.name == name) {
            Some(task) => {
                task.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn set_interval(&self, name: &str, seconds: u64) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.iter_mut().find(|t| t.name == name) {
            Some(task) => {
                task.schedule = TaskSchedule::Interval { every: Duration::from_secs(seconds) };
                true
            }
            None => false,
        }
    }

    pub async fn register_alert_callback(&self, callback: AlertCallback) {
        self.alert_callbacks.write().await.push(callback);
    }

    pub async fn last_detect_result(&self) -> Option<Arc<DetectResult>> {
        self.last_detect_result.read().await.clone()
    }

    /// Idempotent: calling `start` while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            while scheduler.running.load(Ordering::SeqCst) {
                tokio::time::sleep(scheduler.tick_interval).await;
                if !scheduler.running.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.tick().await;
            }
        });

        *self.join_handle.write().await = Some(handle);
    }

    /// Stops the loop and waits up to 2s for it to exit gracefully.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.join_handle.write().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("proactive scheduler tick loop did not exit within timeout");
            }
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            tick_count: self.tick_count.load(Ordering::SeqCst) as u64,
            last_tick_error: self.last_tick_error.read().await.clone(),
            consecutive_tick_failures: self.consecutive_tick_failures.load(Ordering::SeqCst),
        }
    }

    async fn tick(&self) {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();

        let due: Vec<ScheduledTask> = {
            let tasks = self.tasks.read().await;
            tasks.iter().filter(|t| t.is_due(now)).cloned().collect()
        };

        for task in due {
            let result = self.run_task(&task).await;

            {
                let mut tasks = self.tasks.write().await;
                if let Some(entry) = tasks.iter_mut().find(|t| t.name == task.name) {
                    entry.last_run = Some(now);
                }
            }

            match result {
                Ok(result) => {
                    self.consecutive_tick_failures.store(0, Ordering::SeqCst);
                    let callbacks = self.alert_callbacks.read().await;
                    for callback in callbacks.iter() {
                        callback(&result);
                    }
                }
                Err(err) => {
                    error!(task = %task.name, "proactive task failed: {err}");
                    self.consecutive_tick_failures.fetch_add(1, Ordering::SeqCst);
                    *self.last_tick_error.write().await = Some(err);
                }
            }
        }
    }

    /// Runs one task to completion. Errors here never propagate as a panic;
    /// the caller records them as a health signal instead (see the module
    /// doc's note on not swallowing heartbeat failures silently).
    async fn run_task(&self, task: &ScheduledTask) -> Result<ProactiveResult, String> {
        match task.action {
            TaskAction::QuickScan => self.run_quick_scan(&task.name).await,
            TaskAction::FullReport | TaskAction::SecurityCheck => Ok(ProactiveResult {
                task_name: task.name.clone(),
                action: task.action,
                findings: 0,
                detect_id: None,
                triggered_incident: false,
            }),
        }
    }

    async fn run_quick_scan(&self, task_name: &str) -> Result<ProactiveResult, String> {
        let detect_result = self
            .detect_agent
            .run_detection(None, 15, DetectSource::ProactiveScan, 300)
            .await;

        let findings = detect_result.anomalies_detected.len();

        if findings == 0 {
            info!(task = task_name, "quick scan found nothing, no trigger");
            return Ok(ProactiveResult {
                task_name: task_name.to_string(),
                action: TaskAction::QuickScan,
                findings: 0,
                detect_id: Some(detect_result.detect_id),
                triggered_incident: false,
            });
        }

        *self.last_detect_result.write().await = Some(detect_result.clone());

        let orchestrator = self.orchestrator.clone();
        let detect_result_for_task = detect_result.clone();
        tokio::spawn(async move {
            orchestrator
                .handle_incident(HandleIncidentParams {
                    trigger_type: TriggerType::Proactive,
                    trigger_data: serde_json::json!({ "source": "heartbeat" }),
                    detect_result: Some(detect_result_for_task),
                    ..Default::default()
                })
                .await;
        });

        Ok(ProactiveResult {
            task_name: task_name.to_string(),
            action: TaskAction::QuickScan,
            findings,
            detect_id: Some(detect_result.detect_id),
            triggered_incident: true,
        })
    }

    /// Runs a one-off task synchronously, outside the tick loop.
    pub async fn trigger_event(&self, event_type: &str, _data: serde_json::Value) -> ProactiveResult {
        match event_type {
            "quick_scan" => self.run_quick_scan("event").await.unwrap_or(ProactiveResult {
                task_name: "event".to_string(),
                action: TaskAction::QuickScan,
                findings: 0,
                detect_id: None,
                triggered_incident: false,
            }),
            _ => ProactiveResult {
                task_name: "event".to_string(),
                action: TaskAction::FullReport,
                findings: 0,
                detect_id: None,
                triggered_incident: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CloudDataSource;
    use crate::infrastructure::detect_cache::DetectCache;
    use crate::infrastructure::mock::{MockKnowledgeBase, MockRcaAnalyzer, MockSopBridge, MockSopExecutor};
    use crate::services::event_correlator::{EventCorrelator, SoftTimeouts};
    use std::collections::HashMap;

    async fn test_scheduler() -> Arc<ProactiveScheduler> {
        let correlator = Arc::new(EventCorrelator::new(
            HashMap::<crate::domain::models::SourceName, Arc<dyn CloudDataSource>>::new(),
            SoftTimeouts::default(),
        ));
        let tmp_dir = std::env::temp_dir().join(format!("detect-cache-{}", uuid::Uuid::new_v4()));
        let cache = Arc::new(DetectCache::new(tmp_dir));
        let detect_agent = Arc::new(DetectAgent::new(correlator.clone(), cache, "us-east-1".to_string()));

        let safety = Arc::new(crate::services::safety_layer::SafetyLayer::new(
            crate::infrastructure::config::settings::SafetyConfig::default(),
        ));
        let orchestrator = Arc::new(IncidentOrchestrator::new(
            correlator,
            Arc::new(MockRcaAnalyzer::new()),
            Arc::new(MockSopBridge::new()),
            safety,
            Arc::new(MockSopExecutor::new()),
            Arc::new(MockKnowledgeBase::new()),
            "us-east-1".to_string(),
        ));

        Arc::new(ProactiveScheduler::new(detect_agent, orchestrator, &SchedulerConfig::default()))
    }

    #[tokio::test]
    async fn enable_task_toggles_known_task() {
        let scheduler = test_scheduler().await;
        assert!(scheduler.enable_task("heartbeat", false).await);
        assert!(!scheduler.enable_task("nonexistent", false).await);
    }

    #[tokio::test]
    async fn set_interval_updates_known_task() {
        let scheduler = test_scheduler().await;
        assert!(scheduler.set_interval("heartbeat", 60).await);
        let tasks = scheduler.tasks.read().await;
        let heartbeat = tasks.iter().find(|t| t.name == "heartbeat").unwrap();
        assert!(matches!(heartbeat.schedule, TaskSchedule::Interval { every } if every == Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn quick_scan_with_no_findings_does_not_trigger_incident() {
        let scheduler = test_scheduler().await;
        let result = scheduler.trigger_event("quick_scan", serde_json::json!({})).await;
        assert_eq!(result.findings, 0);
        assert!(!result.triggered_incident);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_joins_cleanly() {
        let scheduler = test_scheduler().await;
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.status().await.running);
        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }
}
