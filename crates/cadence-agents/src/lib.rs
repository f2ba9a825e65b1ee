//! # cadence-agents
//!
//! Poolable task execution for the Cadence orchestration core.
//!
//! - `Agent`: the trait a collaborator implements for one task type
//! - `SubAgent`: wraps an agent with timeout, cancellation and event reporting
//! - `AgentPool`: priority- and dependency-aware scheduling with bounded retries
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pool = AgentPool::with_max_queue_len(config.scheduler.max_queue_len);
//! pool.register_agent(Arc::new(SubAgent::new("indexer-1", Arc::new(IndexAgent), events.clone())))?;
//! pool.add_task(AgentTask::new("t1", "index", json!({ "artistId": "a1" })).with_max_retries(2))?;
//! let result = pool.wait_for_result(&TaskId::from("t1")).await;
//! ```

pub mod agent;
pub mod pool;

pub use agent::{Agent, SubAgent};
pub use pool::{AgentPool, PoolStatus};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use cadence_contracts::{
        error::{CadenceError, CadenceResult},
        event::EventKind,
        task::{AgentTask, TaskId},
    };
    use cadence_core::EventBus;

    use super::*;

    // ── Test agents ──────────────────────────────────────────────────────────

    /// Sleeps, then records the task ID in completion order.
    struct Recording {
        kind: &'static str,
        delay: Duration,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Agent for Recording {
        fn task_type(&self) -> &str {
            self.kind
        }

        async fn execute(&self, task: &AgentTask, _cancel: CancellationToken) -> CadenceResult<Value> {
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(task.id.to_string());
            Ok(json!({ "done": task.id }))
        }
    }

    /// Fails every attempt.
    struct AlwaysFails {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Agent for AlwaysFails {
        fn task_type(&self) -> &str {
            "flaky"
        }

        async fn execute(&self, _task: &AgentTask, _cancel: CancellationToken) -> CadenceResult<Value> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CadenceError::handler("upstream unavailable"))
        }
    }

    /// Never finishes on its own; keeps the token it was handed.
    struct Hangs {
        token: Arc<Mutex<Option<CancellationToken>>>,
    }

    #[async_trait]
    impl Agent for Hangs {
        fn task_type(&self) -> &str {
            "hang"
        }

        async fn execute(&self, _task: &AgentTask, cancel: CancellationToken) -> CadenceResult<Value> {
            *self.token.lock().unwrap() = Some(cancel);
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }
    }

    /// Tracks how many `execute` calls overlap.
    struct Gauge {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Agent for Gauge {
        fn task_type(&self) -> &str {
            "gauge"
        }

        async fn execute(&self, _task: &AgentTask, _cancel: CancellationToken) -> CadenceResult<Value> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    fn recording(kind: &'static str, delay_ms: u64, log: &Arc<Mutex<Vec<String>>>) -> Recording {
        Recording {
            kind,
            delay: Duration::from_millis(delay_ms),
            log: Arc::clone(log),
        }
    }

    fn sub(id: &str, agent: impl Agent + 'static, events: &EventBus) -> Arc<SubAgent> {
        Arc::new(SubAgent::new(id, Arc::new(agent), events.clone()))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // ── Scheduling ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn dependent_task_waits_for_successful_dependency() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 50, &log), &events)).unwrap();
        pool.register_agent(sub("x-2", recording("x", 50, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("B", "x", Value::Null).depends_on("A")).unwrap();
        pool.add_task(AgentTask::new("A", "x", Value::Null)).unwrap();

        let b = pool.wait_for_result(&TaskId::from("B")).await.unwrap();
        let a = pool.result(&TaskId::from("A")).unwrap();

        assert!(a.success && b.success);
        assert!(a.timestamp <= b.timestamp);
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_runs_first_once_agent_frees_up() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 100, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("T0", "x", Value::Null)).unwrap();
        wait_until(|| pool.status().running_agents == 1).await;

        pool.add_task(AgentTask::new("T1", "x", Value::Null).with_priority(1)).unwrap();
        pool.add_task(AgentTask::new("T2", "x", Value::Null).with_priority(5)).unwrap();

        pool.wait_for_result(&TaskId::from("T1")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["T0", "T2", "T1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_agent_takes_higher_priority_first() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 10, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("T1", "x", Value::Null).with_priority(1)).unwrap();
        pool.add_task(AgentTask::new("T2", "x", Value::Null).with_priority(5)).unwrap();

        pool.wait_for_result(&TaskId::from("T1")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["T2", "T1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_priorities_run_in_submission_order() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 10, &log), &events)).unwrap();

        for id in ["first", "second", "third"] {
            pool.add_task(AgentTask::new(id, "x", Value::Null).with_priority(3)).unwrap();
        }

        pool.wait_for_result(&TaskId::from("third")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_dependency_stays_queued() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 1, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("T3", "x", Value::Null).depends_on("T-missing"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = pool.status();
        assert!(status.queue_size >= 1);
        assert!(status.is_processing);
        assert!(pool.result(&TaskId::from("T3")).is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn task_without_matching_agent_runs_after_registration() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();

        pool.add_task(AgentTask::new("late", "y", Value::Null)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.status().queue_size, 1);

        pool.register_agent(sub("y-1", recording("y", 5, &log), &events)).unwrap();
        let result = pool.wait_for_result(&TaskId::from("late")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, Some(json!({ "done": "late" })));
    }

    // ── Retries and failure ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_final_failure() {
        let events = EventBus::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let pool = AgentPool::new();
        pool.register_agent(sub("f-1", AlwaysFails { attempts: Arc::clone(&attempts) }, &events))
            .unwrap();

        pool.add_task(AgentTask::new("R", "flaky", Value::Null).with_max_retries(2))
            .unwrap();
        let result = pool.wait_for_result(&TaskId::from("R")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.retry_count, 2);
        assert!(result.error.unwrap().contains("upstream unavailable"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(events.history(Some(EventKind::AGENT_TASK_FAILED)).len(), 3);

        let status = pool.status();
        assert_eq!(status.failed_tasks, 1);
        assert_eq!(status.queue_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dependency_blocks_dependent() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("f-1", AlwaysFails { attempts: Arc::default() }, &events))
            .unwrap();
        pool.register_agent(sub("x-1", recording("x", 1, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("parent", "flaky", Value::Null)).unwrap();
        pool.add_task(AgentTask::new("child", "x", Value::Null).depends_on("parent"))
            .unwrap();

        let parent = pool.wait_for_result(&TaskId::from("parent")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!parent.success);
        assert!(pool.result(&TaskId::from("child")).is_none());
        assert_eq!(pool.status().queue_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_token_and_fails_attempt() {
        let events = EventBus::new();
        let token = Arc::new(Mutex::new(None));
        let pool = AgentPool::new();
        pool.register_agent(sub("h-1", Hangs { token: Arc::clone(&token) }, &events))
            .unwrap();

        pool.add_task(AgentTask::new("slow", "hang", Value::Null).with_timeout(Duration::from_millis(100)))
            .unwrap();
        let result = pool.wait_for_result(&TaskId::from("slow")).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out after 100ms"));
        let handed_out = token.lock().unwrap().clone().unwrap();
        assert!(handed_out.is_cancelled());
        assert_eq!(pool.status().running_agents, 0);
    }

    #[tokio::test]
    async fn queue_limit_rejects_overflow() {
        let pool = AgentPool::with_max_queue_len(Some(1));

        pool.add_task(AgentTask::new("one", "none", Value::Null)).unwrap();
        let err = pool.add_task(AgentTask::new("two", "none", Value::Null)).unwrap_err();

        assert!(matches!(err, CadenceError::QueueFull { capacity: 1 }));
        assert_eq!(pool.status().queue_size, 1);
    }

    // ── Agent lifecycle ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_task() {
        let events = EventBus::new();
        let token = Arc::new(Mutex::new(None));
        let pool = AgentPool::new();
        let agent = sub("h-1", Hangs { token: Arc::clone(&token) }, &events);
        pool.register_agent(Arc::clone(&agent)).unwrap();

        pool.add_task(AgentTask::new("forever", "hang", Value::Null)).unwrap();
        wait_until(|| agent.current_task().is_some()).await;

        agent.stop().await;
        let result = pool.wait_for_result(&TaskId::from("forever")).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("cancelled"));
        assert!(agent.is_stopped());
        assert_eq!(pool.status().stopped_agents, 1);

        let stopped = events.history(Some(EventKind::AGENT_STOPPED));
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].payload["interruptedTask"], json!("forever"));

        agent.resume();
        assert!(!agent.is_stopped());
    }

    #[tokio::test]
    async fn process_reports_lifecycle_events() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent = SubAgent::new("x-1", Arc::new(recording("x", 0, &log)), events.clone());

        let result = agent.process(AgentTask::new("solo", "x", json!({ "n": 1 }))).await;

        assert!(result.success);
        assert_eq!(result.retry_count, 0);
        assert!(!agent.is_running());
        let kinds: Vec<String> = events.history(None).into_iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventKind::AGENT_TASK_STARTED, EventKind::AGENT_TASK_COMPLETED]);
    }

    #[tokio::test]
    async fn one_agent_never_runs_two_tasks_at_once() {
        let events = EventBus::new();
        let peak = Arc::new(AtomicUsize::new(0));
        let agent = SubAgent::new(
            "g-1",
            Arc::new(Gauge {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            }),
            events.clone(),
        );

        let (first, second) = tokio::join!(
            agent.process(AgentTask::new("t1", "gauge", Value::Null)),
            agent.process(AgentTask::new("t2", "gauge", Value::Null)),
        );

        assert!(first.success);
        assert!(!second.success);
        assert!(second.error.unwrap().contains("busy"));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!agent.is_running());
        assert_eq!(events.history(Some(EventKind::AGENT_TASK_STARTED)).len(), 1);

        agent.stop().await;
        let refused = agent.process(AgentTask::new("t3", "gauge", Value::Null)).await;
        assert!(refused.error.unwrap().contains("cancelled"));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_and_status() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 0, &log), &events)).unwrap();
        pool.register_agent(sub("x-2", recording("x", 0, &log), &events)).unwrap();
        pool.register_agent(sub("y-1", recording("y", 0, &log), &events)).unwrap();

        let duplicate = pool.register_agent(sub("x-1", recording("x", 0, &log), &events));
        assert!(matches!(duplicate, Err(CadenceError::Validation { .. })));

        let status = pool.status();
        assert_eq!(status.total_agents, 3);
        assert_eq!(status.idle_agents, 3);
        assert_eq!(status.agents_by_type.get("x"), Some(&2));
        assert!(!status.is_processing);

        assert!(pool.unregister_agent("x-2").is_some());
        assert!(pool.unregister_agent("x-2").is_none());
        assert_eq!(pool.status().total_agents, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_discards_queue_and_results() {
        let events = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AgentPool::new();
        pool.register_agent(sub("x-1", recording("x", 5, &log), &events)).unwrap();

        pool.add_task(AgentTask::new("done", "x", Value::Null)).unwrap();
        pool.wait_for_result(&TaskId::from("done")).await.unwrap();
        pool.add_task(AgentTask::new("orphan", "z", Value::Null)).unwrap();

        pool.cleanup().await;

        let status = pool.status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.completed_tasks, 0);
        assert_eq!(status.stopped_agents, 1);
        assert!(pool.wait_for_result(&TaskId::from("done")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_in_flight_attempts_and_their_retries() {
        let events = EventBus::new();
        let token = Arc::new(Mutex::new(None));
        let pool = AgentPool::new();
        let agent = sub("h-1", Hangs { token: Arc::clone(&token) }, &events);
        pool.register_agent(Arc::clone(&agent)).unwrap();

        pool.add_task(AgentTask::new("forever", "hang", Value::Null).with_max_retries(2))
            .unwrap();
        wait_until(|| agent.current_task().is_some()).await;

        pool.cleanup().await;
        wait_until(|| !events.history(Some(EventKind::AGENT_TASK_FAILED)).is_empty()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = pool.status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.completed_tasks, 0);
        assert!(!status.is_processing);
        assert!(pool.result(&TaskId::from("forever")).is_none());
        assert_eq!(events.history(Some(EventKind::AGENT_TASK_STARTED)).len(), 1);
    }
}
