//! End-to-end timing tests for the scheduling queue.
//!
//! Delays are scaled down to a 100ms unit so the suite stays fast; the
//! tolerances are generous enough for a loaded CI box.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use delayq_core::QueueConfig;
use delayq_queue::{Executable, Lifecycle, SchedulingQueue};

const UNIT: Duration = Duration::from_millis(100);
const TOLERANCE: Duration = Duration::from_millis(250);

/// Records the label (first argument) of every execution with its arrival time.
#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Recorder {
    fn executable(&self) -> Arc<dyn Executable> {
        let hits = self.hits.clone();
        Arc::new(move |args: Vec<Value>| {
            let label = args
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            hits.lock().unwrap().push((label, Instant::now()));
        })
    }

    fn labels(&self) -> Vec<String> {
        self.hits.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
    }

    fn arrival(&self, label: &str) -> Option<Instant> {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, at)| *at)
    }

    fn count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    /// Poll until at least `n` executions were recorded or `timeout` passes.
    async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count() >= n
    }

    /// How many times each label ran.
    fn tally(&self) -> HashMap<String, usize> {
        let mut tally = HashMap::new();
        for label in self.labels() {
            *tally.entry(label).or_insert(0) += 1;
        }
        tally
    }
}

fn label(s: impl Into<String>) -> Vec<Value> {
    vec![Value::from(s.into())]
}

#[tokio::test]
async fn dispatches_in_execution_time_order() {
    let queue = SchedulingQueue::with_defaults();
    let recorder = Recorder::default();
    let exec = recorder.executable();
    queue.start().unwrap();

    let start = Instant::now();
    assert!(queue.enqueue_after(UNIT, exec.clone(), label("A")).await);
    assert!(queue.enqueue_after(UNIT * 5, exec.clone(), label("B")).await);
    assert!(queue.enqueue_after(Duration::ZERO, exec.clone(), label("C")).await);

    assert!(recorder.wait_for(3, Duration::from_secs(3)).await);
    assert_eq!(recorder.labels(), vec!["C", "A", "B"]);

    for (name, nominal) in [("C", Duration::ZERO), ("A", UNIT), ("B", UNIT * 5)] {
        let elapsed = recorder.arrival(name).unwrap() - start;
        assert!(
            elapsed + Duration::from_millis(5) >= nominal,
            "{name} ran early: {elapsed:?} < {nominal:?}"
        );
        assert!(
            elapsed <= nominal + TOLERANCE,
            "{name} ran late: {elapsed:?} > {nominal:?}"
        );
    }

    queue.drain().await.unwrap();
}

#[tokio::test]
async fn earlier_item_pulls_timer_forward() {
    let queue = SchedulingQueue::with_defaults();
    let recorder = Recorder::default();
    let exec = recorder.executable();
    queue.start().unwrap();

    let start = Instant::now();
    assert!(queue.enqueue_after(UNIT * 100, exec.clone(), label("late")).await);
    assert!(queue.enqueue_after(UNIT * 2, exec.clone(), label("early")).await);

    assert!(recorder.wait_for(1, Duration::from_secs(2)).await);
    let elapsed = recorder.arrival("early").unwrap() - start;
    assert!(elapsed <= UNIT * 2 + TOLERANCE, "timer was not rearmed: {elapsed:?}");
    assert_eq!(recorder.labels(), vec!["early"]);

    let report = queue.drain().await.unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(recorder.labels(), vec!["early", "late"]);
}

#[tokio::test]
async fn due_item_is_not_held_back_by_a_burst_of_later_work() {
    let queue = SchedulingQueue::with_defaults();
    let recorder = Recorder::default();
    let exec = recorder.executable();
    queue.start().unwrap();

    let start = Instant::now();
    assert!(queue.enqueue(Utc::now(), exec.clone(), label("now")).await);
    for i in 0..1_000 {
        let exec = exec.clone();
        assert!(queue.enqueue_after(UNIT * 50, exec, label(format!("later-{i}"))).await);
    }

    assert!(recorder.wait_for(1, Duration::from_secs(2)).await);
    let elapsed = recorder.arrival("now").unwrap() - start;
    assert!(elapsed <= TOLERANCE, "due item waited {elapsed:?}");

    let report = queue.drain().await.unwrap();
    assert_eq!(report.executed, 1_000);
}

#[tokio::test]
async fn immediate_shutdown_and_drain_runs_every_item_once() {
    let queue = SchedulingQueue::with_defaults();
    let recorder = Recorder::default();
    let exec = recorder.executable();
    queue.start().unwrap();

    let mut rng = rand::thread_rng();
    for i in 0..10 {
        let delay = UNIT * rng.gen_range(0..=40);
        assert!(queue.enqueue_after(delay, exec.clone(), label(format!("event-{i}"))).await);
    }

    queue.shutdown();
    let report = queue.drain().await.unwrap();
    assert_eq!(queue.lifecycle(), Lifecycle::Drained);

    // Anything the worker dispatched before stopping runs on its own task.
    assert!(recorder.wait_for(10, Duration::from_secs(1)).await);
    let stats = queue.stats();
    assert_eq!(stats.dispatched + stats.drained, 10);
    assert_eq!(stats.drained, report.executed as u64);

    // Past every nominal due time: still exactly once each.
    tokio::time::sleep(UNIT * 45).await;
    let tally = recorder.tally();
    assert_eq!(tally.len(), 10);
    assert!(tally.values().all(|&n| n == 1), "duplicate execution: {tally:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_deliver_exactly_once() {
    const PRODUCERS: usize = 16;
    const PER_PRODUCER: usize = 250;

    // A small inbox keeps producers under backpressure.
    let config = QueueConfig {
        inbox_capacity: 32,
        ..QueueConfig::default()
    };
    let queue = Arc::new(SchedulingQueue::new(config).unwrap());
    let recorder = Recorder::default();
    queue.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            let exec = recorder.executable();
            tokio::spawn(async move {
                let mut accepted = 0usize;
                for i in 0..PER_PRODUCER {
                    let delay = Duration::from_millis((i % 50) as u64);
                    if queue.enqueue_after(delay, exec.clone(), label(format!("{p}-{i}"))).await {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let accepted: usize = futures::future::join_all(producers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();
    assert_eq!(accepted, PRODUCERS * PER_PRODUCER);

    assert!(
        recorder.wait_for(accepted, Duration::from_secs(5)).await,
        "only {} of {accepted} executed",
        recorder.count()
    );

    let report = queue.drain().await.unwrap();
    assert_eq!(report.executed, 0);

    let tally = recorder.tally();
    assert_eq!(tally.len(), accepted);
    assert!(tally.values().all(|&n| n == 1));
    assert_eq!(queue.stats().dispatched, accepted as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_mid_stream_loses_nothing_that_was_accepted() {
    let queue = Arc::new(SchedulingQueue::with_defaults());
    let recorder = Recorder::default();
    queue.start().unwrap();

    let producer = {
        let queue = queue.clone();
        let exec = recorder.executable();
        tokio::spawn(async move {
            let mut accepted = 0usize;
            let mut i = 0usize;
            while i < 20_000 {
                let delay = Duration::from_millis((i % 200) as u64);
                if !queue.enqueue_after(delay, exec.clone(), label(format!("item-{i}"))).await {
                    break;
                }
                accepted += 1;
                i += 1;
                if i % 16 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
            accepted
        })
    };

    tokio::time::sleep(UNIT).await;
    queue.drain().await.unwrap();
    let accepted = producer.await.unwrap();
    assert!(accepted > 0);

    assert!(recorder.wait_for(accepted, Duration::from_secs(2)).await);
    tokio::time::sleep(UNIT * 3).await;
    let tally = recorder.tally();
    assert_eq!(tally.len(), accepted);
    assert!(tally.values().all(|&n| n == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_producers_on_plain_threads() {
    let queue = Arc::new(SchedulingQueue::with_defaults());
    let recorder = Recorder::default();
    queue.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = queue.clone();
            let exec = recorder.executable();
            tokio::task::spawn_blocking(move || {
                (0..25)
                    .filter(|i| queue.blocking_enqueue(Utc::now(), exec.clone(), label(format!("{t}-{i}"))))
                    .count()
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        accepted += handle.await.unwrap();
    }
    assert_eq!(accepted, 100);
    assert!(recorder.wait_for(100, Duration::from_secs(2)).await);

    queue.drain().await.unwrap();
    assert!(!queue.blocking_enqueue(Utc::now(), recorder.executable(), label("too-late")));
}
