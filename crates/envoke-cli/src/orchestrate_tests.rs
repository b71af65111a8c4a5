use super::*;
use crate::fake_exec::{FakeExecutor, Script};
use envoke_core::CommandSpec;
use std::time::Duration;
use tempfile::tempdir;

fn env(dir: &std::path::Path, name: &str, depends_on: &[&str], program: &str) -> EnvDescriptor {
    let mut env = EnvDescriptor::new(name, dir.join(name));
    env.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
    env.commands = vec![CommandSpec::new(vec![program.to_string()])];
    env
}

struct Harness {
    runtimes: Vec<Arc<EnvRuntime>>,
    executor: Arc<FakeExecutor>,
    interrupt: Interrupt,
}

impl Harness {
    fn context(&self, to_run: &[&str], max_workers: usize) -> RunContext {
        RunContext {
            envs: self.runtimes.clone(),
            to_run: to_run.iter().map(|s| s.to_string()).collect(),
            max_workers,
            options: RunOptions::default(),
            colored: false,
            executor: self.executor.clone(),
            interrupt: self.interrupt.clone(),
            spinner: Arc::new(Spinner::new(false)),
        }
    }

    fn runtime(&self, name: &str) -> &Arc<EnvRuntime> {
        self.runtimes
            .iter()
            .find(|runtime| runtime.desc.name == name)
            .expect("unknown env in harness")
    }
}

fn harness(envs: Vec<EnvDescriptor>, executor: FakeExecutor) -> Harness {
    Harness {
        runtimes: envs
            .into_iter()
            .map(|desc| Arc::new(EnvRuntime::new(desc)))
            .collect(),
        executor: Arc::new(executor),
        interrupt: Interrupt::new(),
    }
}

#[tokio::test]
async fn results_cover_every_env_in_input_order() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "top", &[], "top-cmd"),
        env(tmp.path(), "left", &["top"], "left-cmd"),
        env(tmp.path(), "right", &["top"], "right-cmd"),
        env(tmp.path(), "bottom", &["left", "right"], "bottom-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new());

    let results = execute(h.context(&["top", "left", "right", "bottom"], 4))
        .await
        .unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["top", "left", "right", "bottom"]);
    assert!(results.iter().all(RunResult::is_ok));
}

#[tokio::test]
async fn dependency_chain_orders_starts() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "x", &[], "x-cmd"),
        env(tmp.path(), "y", &["x"], "y-cmd"),
        env(tmp.path(), "z", &["y"], "z-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new());

    let results = execute(h.context(&["x", "y", "z"], 4)).await.unwrap();
    assert_eq!(h.executor.call_log(), vec!["x-cmd", "y-cmd", "z-cmd"]);
    assert!(results.iter().all(RunResult::is_ok));
}

#[tokio::test]
async fn failed_dependency_still_unblocks_dependents() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "a", &[], "a-cmd"),
        env(tmp.path(), "b", &["a"], "b-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new().script("a-cmd", Script::exit(1)));

    let results = execute(h.context(&["a", "b"], 2)).await.unwrap();
    assert_eq!(results[0].code, 1);
    assert_eq!(results[1].code, 0);
    assert_eq!(h.executor.call_log(), vec!["a-cmd", "b-cmd"]);
}

#[tokio::test]
async fn sequential_fail_then_pass_reports_both() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "a", &[], "a-cmd"),
        env(tmp.path(), "b", &[], "b-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new().script("a-cmd", Script::exit(1)));

    let results = execute(h.context(&["a", "b"], 1)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].code, 1);
    assert!(!results[0].skipped);
    assert!(results[1].is_ok());
}

#[tokio::test]
async fn interrupt_synthesizes_results_for_undispatched_envs() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "x", &[], "x-cmd"),
        env(tmp.path(), "y", &["x"], "y-cmd"),
        env(tmp.path(), "z", &["y"], "z-cmd"),
    ];
    let h = harness(
        envs,
        FakeExecutor::new().script("x-cmd", Script::sleeping(Duration::from_secs(30))),
    );
    let interrupt = h.interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        interrupt.trigger();
    });

    let results = execute(h.context(&["x", "y", "z"], 4)).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].code < 0, "cascaded env must report a negative code");
    assert_eq!(results[1].code, CODE_INTERRUPTED);
    assert_eq!(results[2].code, CODE_INTERRUPTED);
    assert!(results[1].outcomes.is_empty());
    assert!(results[2].outcomes.is_empty());
    for name in ["x", "y", "z"] {
        assert!(h.runtime(name).torn_down(), "{name} must be torn down");
    }
    // only the first env ever started a command
    assert_eq!(h.executor.call_log(), vec!["x-cmd"]);
}

#[tokio::test]
async fn worker_waiting_for_a_slot_is_cancelled_with_minus_three() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "a", &[], "slow-a"),
        env(tmp.path(), "b", &[], "slow-b"),
    ];
    let h = harness(
        envs,
        FakeExecutor::new()
            .script("slow-a", Script::sleeping(Duration::from_secs(30)))
            .script("slow-b", Script::sleeping(Duration::from_secs(30))),
    );
    let interrupt = h.interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        interrupt.trigger();
    });

    let results = execute(h.context(&["a", "b"], 1)).await.unwrap();
    let mut codes: Vec<i32> = results.iter().map(|r| r.code).collect();
    codes.sort_unstable();
    assert_eq!(codes, vec![CODE_CANCELLED, CODE_INTERRUPTED]);
    // exactly one env reached the executor
    assert_eq!(h.executor.call_log().len(), 1);
}

#[tokio::test]
async fn cycle_is_fatal_before_any_worker_starts() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "a", &["b"], "a-cmd"),
        env(tmp.path(), "b", &["a"], "b-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new());

    let err = execute(h.context(&["a", "b"], 2)).await.unwrap_err();
    assert!(err.to_string().contains("cycle"));
    assert!(h.executor.call_log().is_empty());
    assert!(h.runtime("a").torn_down());
    assert!(h.runtime("b").torn_down());
}

#[tokio::test]
async fn unselected_envs_are_torn_down_but_not_run() {
    let tmp = tempdir().unwrap();
    let envs = vec![
        env(tmp.path(), "a", &[], "a-cmd"),
        env(tmp.path(), "config-only", &[], "never-cmd"),
    ];
    let h = harness(envs, FakeExecutor::new());

    let results = execute(h.context(&["a"], 1)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "a");
    assert_eq!(h.executor.call_log(), vec!["a-cmd"]);
    assert!(h.runtime("config-only").torn_down());
}
