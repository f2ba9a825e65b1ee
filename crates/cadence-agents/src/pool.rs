//! The agent pool: a priority queue of tasks matched to idle agents.
//!
//! Scheduling, one scan at a time:
//!
//! 1. `add_task` appends, re-sorts by (priority desc, insertion seq asc) and
//!    starts the dispatch loop if it is not running.
//! 2. The loop walks the queue from the front. Tasks with a dependency that
//!    has no successful result yet are moved to the back.
//! 3. The first ready task with an idle, non-stopped agent of its type is
//!    removed from the queue and handed to that agent on its own tokio task.
//! 4. When nothing can be dispatched the loop parks on a `Notify` until a
//!    task is added, an agent is freed, or an agent is registered. An empty
//!    queue ends the loop.
//!
//! Each attempt's result is stored by task ID, replacing the previous one.
//! A failed attempt with retries left goes back on the front of the queue.
//! Attempts that settle after `cleanup` or after the pool is dropped are
//! discarded and never retried.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cadence_contracts::{
    error::{CadenceError, CadenceResult},
    task::{AgentResult, AgentTask, TaskId},
};

use crate::agent::SubAgent;

struct QueuedTask {
    task: AgentTask,
    seq: u64,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<QueuedTask>,
    results: HashMap<TaskId, AgentResult>,
    in_flight: HashSet<TaskId>,
    processing: bool,
    next_seq: u64,
    /// Bumped by `cleanup`; attempts dispatched under an older value are stale.
    generation: u64,
}

impl PoolState {
    fn enqueue(&mut self, task: AgentTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(QueuedTask { task, seq });
        self.queue
            .make_contiguous()
            .sort_by(|a, b| b.task.priority.cmp(&a.task.priority).then(a.seq.cmp(&b.seq)));
    }

    fn requeue_front(&mut self, task: AgentTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_front(QueuedTask { task, seq });
    }

    fn dependencies_met(&self, task: &AgentTask) -> bool {
        task.dependencies
            .iter()
            .all(|dep| self.results.get(dep).is_some_and(|r| r.success))
    }

    fn is_pending(&self, id: &TaskId) -> bool {
        self.in_flight.contains(id) || self.queue.iter().any(|q| &q.task.id == id)
    }
}

/// Outcome of one pass over the queue.
enum Scan {
    Dispatched,
    Blocked,
    Drained,
}

struct PoolInner {
    agents: RwLock<Vec<Arc<SubAgent>>>,
    state: Mutex<PoolState>,
    /// Wakes the dispatch loop.
    wake: Notify,
    /// Signalled after every stored result.
    settled: Notify,
    shutdown: CancellationToken,
    max_queue_len: Option<usize>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn agents(&self) -> Vec<Arc<SubAgent>> {
        self.agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Start the dispatch loop unless one is already running.
    fn ensure_processing(self: &Arc<Self>) {
        let start = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.processing, true)
        };
        if start {
            tokio::spawn(dispatch_loop(Arc::clone(self)));
        }
        self.wake.notify_one();
    }

    fn scan(self: &Arc<Self>) -> Scan {
        let agents = self.agents();
        let mut state = self.lock();

        if state.queue.is_empty() {
            state.processing = false;
            return Scan::Drained;
        }

        let mut deferred = Vec::new();
        let mut picked = None;
        let mut index = 0;

        while index < state.queue.len() {
            let ready = state.dependencies_met(&state.queue[index].task);
            if !ready {
                if let Some(waiting) = state.queue.remove(index) {
                    deferred.push(waiting);
                }
                continue;
            }

            let task_type = state.queue[index].task.task_type.as_str();
            if let Some(agent) = agents
                .iter()
                .find(|a| a.task_type() == task_type && a.try_claim())
            {
                let agent = Arc::clone(agent);
                if let Some(queued) = state.queue.remove(index) {
                    picked = Some((agent, queued.task));
                }
                break;
            }
            index += 1;
        }

        state.queue.extend(deferred);

        let Some((agent, task)) = picked else {
            return Scan::Blocked;
        };
        state.in_flight.insert(task.id.clone());
        let generation = state.generation;
        drop(state);

        debug!(task_id = %task.id, agent_id = %agent.id(), priority = task.priority, "task dispatched");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = agent.process_claimed(task.clone()).await;
            inner.settle(task, result, generation);
        });
        Scan::Dispatched
    }

    fn settle(self: &Arc<Self>, task: AgentTask, result: AgentResult, generation: u64) {
        let success = result.success;
        let retry = !success && task.can_retry();
        {
            let mut state = self.lock();
            if state.generation != generation || self.shutdown.is_cancelled() {
                drop(state);
                debug!(task_id = %task.id, success, "stale attempt discarded");
                self.settled.notify_waiters();
                return;
            }
            state.in_flight.remove(&task.id);
            state.results.insert(task.id.clone(), result);
            if retry {
                state.requeue_front(task.next_attempt());
            }
        }

        if retry {
            warn!(
                task_id = %task.id,
                attempt = task.retry_count + 1,
                max_retries = task.max_retries,
                "task failed, retrying"
            );
            self.ensure_processing();
        } else {
            if !success {
                error!(
                    task_id = %task.id,
                    retry_count = task.retry_count,
                    "task failed permanently"
                );
            }
            self.wake.notify_one();
        }
        self.settled.notify_waiters();
    }
}

async fn dispatch_loop(inner: Arc<PoolInner>) {
    debug!("dispatch loop started");
    loop {
        match inner.scan() {
            Scan::Dispatched => continue,
            Scan::Drained => break,
            Scan::Blocked => {
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = inner.shutdown.cancelled() => {
                        inner.lock().processing = false;
                        break;
                    }
                }
            }
        }
    }
    debug!("dispatch loop stopped");
}

/// Snapshot returned by [`AgentPool::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub total_agents: usize,
    pub running_agents: usize,
    pub idle_agents: usize,
    pub stopped_agents: usize,
    pub queue_size: usize,
    pub in_flight: usize,
    pub completed_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub is_processing: bool,
    pub agents_by_type: BTreeMap<String, usize>,
}

/// Schedules `AgentTask`s onto registered `SubAgent`s.
///
/// Must be used from within a tokio runtime. Dropping the pool stops its
/// dispatch loop; tasks already handed to an agent run to completion.
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    /// A pool with an unbounded queue.
    pub fn new() -> Self {
        Self::with_max_queue_len(None)
    }

    pub fn with_max_queue_len(max_queue_len: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                agents: RwLock::new(Vec::new()),
                state: Mutex::new(PoolState::default()),
                wake: Notify::new(),
                settled: Notify::new(),
                shutdown: CancellationToken::new(),
                max_queue_len,
            }),
        }
    }

    /// Add an agent. Returns `Validation` if its ID is already registered.
    pub fn register_agent(&self, agent: Arc<SubAgent>) -> CadenceResult<()> {
        {
            let mut agents = self
                .inner
                .agents
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if agents.iter().any(|a| a.id() == agent.id()) {
                return Err(CadenceError::validation(format!(
                    "agent '{}' is already registered",
                    agent.id()
                )));
            }
            info!(agent_id = %agent.id(), task_type = %agent.task_type(), "agent registered");
            agents.push(agent);
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Remove the agent with `agent_id`. A task it is running finishes normally.
    pub fn unregister_agent(&self, agent_id: &str) -> Option<Arc<SubAgent>> {
        let mut agents = self
            .inner
            .agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let position = agents.iter().position(|a| a.id() == agent_id)?;
        info!(agent_id, "agent unregistered");
        Some(agents.remove(position))
    }

    pub fn agent(&self, agent_id: &str) -> Option<Arc<SubAgent>> {
        self.inner.agents().into_iter().find(|a| a.id() == agent_id)
    }

    /// Queue `task` and make sure the dispatch loop is running.
    ///
    /// Returns `QueueFull` when a configured queue limit is reached.
    pub fn add_task(&self, task: AgentTask) -> CadenceResult<()> {
        {
            let mut state = self.inner.lock();
            if let Some(capacity) = self.inner.max_queue_len {
                if state.queue.len() >= capacity {
                    warn!(task_id = %task.id, capacity, "task rejected, queue full");
                    return Err(CadenceError::QueueFull { capacity });
                }
            }
            debug!(task_id = %task.id, task_type = %task.task_type, priority = task.priority, "task queued");
            state.enqueue(task);
        }
        self.inner.ensure_processing();
        Ok(())
    }

    /// The latest recorded attempt for `task_id`.
    pub fn result(&self, task_id: &TaskId) -> Option<AgentResult> {
        self.inner.lock().results.get(task_id).cloned()
    }

    pub fn results(&self) -> Vec<AgentResult> {
        let mut results: Vec<AgentResult> = self.inner.lock().results.values().cloned().collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        results
    }

    /// Wait until `task_id` has a result and no further attempt is pending.
    ///
    /// Returns `None` for a task the pool has never seen. A task whose
    /// dependencies never succeed stays queued, so callers that cannot rule
    /// that out should wrap this in `tokio::time::timeout`.
    pub async fn wait_for_result(&self, task_id: &TaskId) -> Option<AgentResult> {
        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            {
                let state = self.inner.lock();
                let pending = state.is_pending(task_id);
                match state.results.get(task_id) {
                    Some(result) if !pending => return Some(result.clone()),
                    None if !pending => return None,
                    _ => {}
                }
            }

            settled.await;
        }
    }

    pub fn status(&self) -> PoolStatus {
        let agents = self.inner.agents();
        let state = self.inner.lock();

        let running_agents = agents.iter().filter(|a| a.is_running()).count();
        let stopped_agents = agents.iter().filter(|a| a.is_stopped()).count();
        let mut agents_by_type = BTreeMap::new();
        for agent in &agents {
            *agents_by_type.entry(agent.task_type().to_string()).or_insert(0) += 1;
        }
        let successful_tasks = state.results.values().filter(|r| r.success).count();

        PoolStatus {
            total_agents: agents.len(),
            running_agents,
            idle_agents: agents.len() - running_agents,
            stopped_agents,
            queue_size: state.queue.len(),
            in_flight: state.in_flight.len(),
            completed_tasks: state.results.len(),
            successful_tasks,
            failed_tasks: state.results.len() - successful_tasks,
            is_processing: state.processing,
            agents_by_type,
        }
    }

    /// Stop every agent and discard queued tasks and recorded results.
    ///
    /// Attempts still in flight are cancelled and their results dropped.
    pub async fn cleanup(&self) {
        let agents = self.inner.agents();
        for agent in &agents {
            agent.stop().await;
        }
        let discarded = {
            let mut state = self.inner.lock();
            let discarded = state.queue.len();
            state.generation += 1;
            state.queue.clear();
            state.results.clear();
            state.in_flight.clear();
            discarded
        };
        self.inner.wake.notify_one();
        self.inner.settled.notify_waiters();
        info!(agents = agents.len(), discarded, "agent pool cleaned up");
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AgentPool {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("status", &self.status())
            .finish()
    }
}
