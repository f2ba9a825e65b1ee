//! Task executors and the wrapper that times, bounds and reports them.
//!
//! An `Agent` supplies the work for one task type. A `SubAgent` owns an
//! agent and turns every `execute` call into an `AgentResult`:
//!
//! 1. emit `agent.task_started`
//! 2. race `execute` against the task timeout and `stop()`
//! 3. emit `agent.task_completed` or `agent.task_failed`
//!
//! Losing the race cancels the token handed to `execute` and drops the
//! in-flight future.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_contracts::{
    error::{CadenceError, CadenceResult},
    event::EventKind,
    task::{AgentResult, AgentTask, TaskId},
};
use cadence_core::EventBus;

/// The work behind one task type.
///
/// Implementations should check `cancel` at their await points. A cancelled
/// token means the result is no longer wanted.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The `AgentTask::task_type` this agent accepts.
    fn task_type(&self) -> &str;

    async fn execute(
        &self,
        task: &AgentTask,
        cancel: CancellationToken,
    ) -> CadenceResult<serde_json::Value>;
}

/// A poolable executor running at most one task at a time.
pub struct SubAgent {
    id: String,
    agent: Arc<dyn Agent>,
    running: AtomicBool,
    stopped: AtomicBool,
    current: Mutex<Option<(TaskId, CancellationToken)>>,
    events: EventBus,
}

impl SubAgent {
    pub fn new(id: impl Into<String>, agent: Arc<dyn Agent>, events: EventBus) -> Self {
        Self {
            id: id.into(),
            agent,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            current: Mutex::new(None),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_type(&self) -> &str {
        self.agent.task_type()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The task currently executing, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.lock_current().as_ref().map(|(id, _)| id.clone())
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<(TaskId, CancellationToken)>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark the agent busy if it is idle and not stopped.
    pub(crate) fn try_claim(&self) -> bool {
        !self.is_stopped()
            && self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Run one attempt of `task` and package the outcome.
    ///
    /// Never fails: errors, panics, timeouts and cancellation all become a
    /// `success: false` result. An agent that is already running a task, or
    /// is stopped, rejects `task` without executing it.
    pub async fn process(&self, task: AgentTask) -> AgentResult {
        if !self.try_claim() {
            let error = if self.is_stopped() {
                CadenceError::Cancelled {
                    task_id: task.id.to_string(),
                }
            } else {
                CadenceError::validation(format!("agent '{}' is busy", self.id))
            };
            warn!(agent_id = %self.id, task_id = %task.id, error = %error, "task rejected");
            return package(&task, Err(error), 0.0);
        }
        self.process_claimed(task).await
    }

    /// `process` for a caller that already won `try_claim`.
    pub(crate) async fn process_claimed(&self, task: AgentTask) -> AgentResult {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        *self.lock_current() = Some((task.id.clone(), cancel.clone()));

        debug!(agent_id = %self.id, task_id = %task.id, retry_count = task.retry_count, "task started");
        self.events
            .emit(
                EventKind::AGENT_TASK_STARTED,
                json!({
                    "agentId": self.id,
                    "taskId": task.id,
                    "type": task.task_type,
                    "retryCount": task.retry_count,
                }),
                self.id.as_str(),
            )
            .await;

        let outcome = self.run(&task, cancel).await;
        let execution_time = started.elapsed().as_secs_f64() * 1000.0;

        *self.lock_current() = None;
        self.running.store(false, Ordering::SeqCst);

        let result = package(&task, outcome, execution_time);

        let kind = if result.success {
            EventKind::AGENT_TASK_COMPLETED
        } else {
            warn!(
                agent_id = %self.id,
                task_id = %task.id,
                retry_count = task.retry_count,
                error = ?result.error,
                "task attempt failed"
            );
            EventKind::AGENT_TASK_FAILED
        };

        self.events
            .emit(
                kind,
                json!({
                    "agentId": self.id,
                    "taskId": task.id,
                    "type": task.task_type,
                    "success": result.success,
                    "output": result.output,
                    "error": result.error,
                    "executionTime": execution_time,
                    "retryCount": task.retry_count,
                }),
                self.id.as_str(),
            )
            .await;

        result
    }

    async fn run(&self, task: &AgentTask, cancel: CancellationToken) -> CadenceResult<serde_json::Value> {
        if self.is_stopped() {
            return Err(CadenceError::Cancelled {
                task_id: task.id.to_string(),
            });
        }

        let work = AssertUnwindSafe(self.agent.execute(task, cancel.clone()))
            .catch_unwind()
            .map(|caught| caught.unwrap_or_else(|_| Err(CadenceError::handler("agent panicked"))));

        let limit = task.timeout_duration();
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            outcome = work => outcome,
            _ = cancel.cancelled() => Err(CadenceError::Cancelled {
                task_id: task.id.to_string(),
            }),
            _ = deadline => {
                cancel.cancel();
                Err(CadenceError::Timeout {
                    task_id: task.id.to_string(),
                    timeout_ms: task.timeout.unwrap_or_default(),
                })
            }
        }
    }

    /// Stop accepting work and cancel the in-flight task, if any.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let interrupted = self.lock_current().as_ref().map(|(id, token)| {
            token.cancel();
            id.clone()
        });

        info!(agent_id = %self.id, interrupted = ?interrupted, "agent stopped");
        self.events
            .emit(
                EventKind::AGENT_STOPPED,
                json!({ "agentId": self.id, "interruptedTask": interrupted }),
                self.id.as_str(),
            )
            .await;
    }

    /// Accept work again after `stop()`.
    pub fn resume(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        debug!(agent_id = %self.id, "agent resumed");
    }
}

fn package(task: &AgentTask, outcome: CadenceResult<serde_json::Value>, execution_time: f64) -> AgentResult {
    let (success, output, error) = match outcome {
        Ok(output) => (true, Some(output), None),
        Err(e) => (false, None, Some(e.to_string())),
    };
    AgentResult {
        task_id: task.id.clone(),
        success,
        output,
        error,
        execution_time,
        timestamp: Utc::now(),
        retry_count: task.retry_count,
    }
}

impl std::fmt::Debug for SubAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgent")
            .field("id", &self.id)
            .field("task_type", &self.task_type())
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
