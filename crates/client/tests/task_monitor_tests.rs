//! Poll cadence, timeout and cancellation of task waits (virtual time)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use stratus_client::testing::ScriptedTask;
use stratus_client::{ClientError, TaskHandle, TaskMonitor, TaskProgress, TaskStatus};
use stratus_resilience::{BackoffPolicy, CancellationToken};
use tokio::time::Instant;

#[derive(Default)]
struct PollClock {
    polls: Mutex<Vec<Instant>>,
}

impl PollClock {
    fn gaps(&self) -> Vec<Duration> {
        let polls = self.polls.lock();
        polls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

impl TaskProgress for PollClock {
    fn on_poll(&self, _handle: &TaskHandle, _status: &TaskStatus, _attempt: u32) {
        self.polls.lock().push(Instant::now());
    }
}

fn handle() -> TaskHandle {
    TaskHandle::from_upid("UPID:pve1:00001234:00005678:65F0A0B0:vzstart:101:root@pam:").unwrap()
}

fn running(n: usize) -> Vec<TaskStatus> {
    vec![TaskStatus::running(); n]
}

#[tokio::test(start_paused = true)]
async fn three_running_polls_take_three_and_a_half_seconds() {
    let mut script = running(3);
    script.push(TaskStatus::stopped("OK"));
    let task = ScriptedTask::new(script);
    let clock = Arc::new(PollClock::default());
    let monitor = TaskMonitor::default().with_progress(clock.clone());

    let start = Instant::now();
    monitor
        .wait(&task, &handle(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::from_millis(3500));
    assert_eq!(task.polls(), 4);
    assert_eq!(
        clock.gaps(),
        vec![
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn long_running_task_polls_at_most_five_seconds_apart() {
    let mut script = running(8);
    script.push(TaskStatus::stopped("OK"));
    let task = ScriptedTask::new(script);
    let clock = Arc::new(PollClock::default());
    let monitor = TaskMonitor::new(BackoffPolicy::default()).with_progress(clock.clone());

    monitor
        .wait(&task, &handle(), &CancellationToken::new())
        .await
        .unwrap();

    let gaps = clock.gaps();
    assert_eq!(gaps.len(), 8);
    assert!(gaps.iter().all(|gap| *gap <= Duration::from_secs(5)));
    assert_eq!(gaps[4..], [Duration::from_secs(5); 4]);
}

#[tokio::test(start_paused = true)]
async fn stopped_without_exit_status_is_a_failure() {
    let task = ScriptedTask::new(vec![TaskStatus {
        exit_status: None,
        ..TaskStatus::stopped("")
    }]);

    let err = TaskMonitor::default()
        .wait(&task, &handle(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::TaskFailed { ref exit_status, .. } if exit_status == "unknown"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_returns_promptly() {
    let task = ScriptedTask::forever_running();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = TaskMonitor::default()
        .wait(&task, &handle(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(start.elapsed(), Duration::from_millis(1200));
    // Polled at 0s and 0.5s; the 1.5s poll never happened
    assert_eq!(task.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_in_flight_poll_returns_promptly() {
    let task = ScriptedTask::forever_running().with_delay(Duration::from_secs(3600));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = TaskMonitor::default()
        .wait(&task, &handle(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(task.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn overall_timeout_ends_a_stuck_task() {
    let task = ScriptedTask::forever_running();
    let monitor = TaskMonitor::default().with_timeout(Duration::from_secs(3));

    let start = Instant::now();
    let err = monitor
        .wait(&task, &handle(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ClientError::TaskTimeout { after, .. } => assert_eq!(after, Duration::from_secs(3)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}
