// tests/job_contention.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cronguard::invoke::{FailureKind, Registry};
use cronguard::lock::{LockManager, MemoryLockManager};
use cronguard::{Job, JobSettings, RunMode};
use cronguard_test_utils::fixtures::{SLEEP_TASK, TestEnv};
use cronguard_test_utils::init_tracing;

#[test]
fn same_task_does_not_pile_up() {
    init_tracing();
    let env = TestEnv::new();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let mut job = env.job(JobSettings::default());
            thread::spawn(move || {
                let ok = job.run(SLEEP_TASK, RunMode::Task).unwrap();
                (ok, job.failure().map(|f| f.kind))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|(ok, _)| *ok).count();
    assert_eq!(winners, 1, "results: {results:?}");
    assert!(
        results
            .iter()
            .any(|(_, kind)| *kind == Some(FailureKind::LockContention))
    );

    let contents = env.log_contents();
    assert!(
        contents.contains("Exception message: surpassed retries"),
        "{contents}"
    );
    assert!(contents.contains("in lock manager"), "{contents}");
    assert!(contents.contains(".lock"), "{contents}");
    assert!(!env.locks.lock_path(SLEEP_TASK).exists());
}

#[test]
fn loser_does_not_invoke_the_task() {
    init_tracing();
    let env = TestEnv::new();

    let mut winner = env.job(JobSettings::default());
    let first = thread::spawn(move || {
        let ok = winner.run(SLEEP_TASK, RunMode::Task).unwrap();
        (ok, winner.invoked())
    });

    // Let the first run take the lock.
    thread::sleep(Duration::from_millis(200));
    let mut loser = env.job(JobSettings::default());
    assert!(!loser.run(SLEEP_TASK, RunMode::Task).unwrap());
    assert!(!loser.invoked());
    assert!(
        loser
            .backtrace()
            .unwrap()
            .iter()
            .any(|frame| frame.contains("surpassed retries"))
    );

    assert_eq!(first.join().unwrap(), (true, true));
}

#[test]
fn different_tasks_run_in_parallel() {
    init_tracing();
    let locks = MemoryLockManager::new();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut registry = Registry::new();
    for name in ["a", "b"] {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        registry.register_fn(name, move |_io| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }
    let registry = Arc::new(registry);

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let mut job = Job::builder()
                .shared_registry(registry.clone())
                .locks(locks.clone())
                .build();
            thread::spawn(move || job.run(name, RunMode::Task).unwrap())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2, "tasks ran one after the other");
    assert_eq!(locks.held_count(), 0);
    assert!(!locks.is_held("a"));
}
