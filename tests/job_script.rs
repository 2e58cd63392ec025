// tests/job_script.rs

use std::io::Write;

use cronguard::{Job, JobSettings, RunMode};
use cronguard::invoke::TaskIo;
use cronguard_test_utils::fixtures::TestEnv;
use cronguard_test_utils::init_tracing;

#[cfg(unix)]
#[test]
fn runs_shell_snippets_in_script_mode() {
    init_tracing();
    let env = TestEnv::new();
    let mut job = env.job(JobSettings::default());

    assert!(job.run("a=$((3 * 2)); echo $a", RunMode::Script).unwrap());
    assert_eq!(job.stdout().trim(), "6");
    assert!(job.invoked());
}

#[cfg(unix)]
#[test]
fn failing_snippet_is_a_task_failure() {
    init_tracing();
    let env = TestEnv::new();
    let mut job = env.job(JobSettings::default().with_mailto("ops@example.com"));

    assert!(!job.run("echo before; exit 4", RunMode::Script).unwrap());
    assert_eq!(job.stdout(), "before\n");
    assert!(job.failure().unwrap().message.contains("exited with status 4"));
    assert_eq!(env.mailbox.len(), 1);
}

#[test]
fn custom_evaluator_receives_source_and_writers() {
    init_tracing();
    let env = TestEnv::new();
    let evaluator = |source: &str, io: &mut TaskIo<'_>| -> anyhow::Result<()> {
        let product: i64 = source
            .split('*')
            .map(|n| n.trim().parse::<i64>())
            .product::<Result<i64, _>>()?;
        writeln!(io.stdout, "{product}")?;
        Ok(())
    };
    let mut job: Job = env.builder(JobSettings::default()).evaluator(evaluator).build();

    assert!(job.run("3 * 2", RunMode::Script).unwrap());
    assert_eq!(job.stdout().trim(), "6");

    assert!(!job.run("3 * x", RunMode::Script).unwrap());
    assert!(job.backtrace().is_some());
}
