mod common;

use std::path::Path;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use codejudge::config::JudgeConfig;
use codejudge::sandbox::{ProcessRunner, Runner, create_runner};

use common::sh_config;

const LIMIT: Duration = Duration::from_secs(5);

fn sh_runner(root: &Path) -> ProcessRunner {
    create_runner(&sh_config(root)).unwrap()
}

fn scratch_is_empty(root: &Path) -> bool {
    std::fs::read_dir(root).unwrap().next().is_none()
}

#[tokio::test]
async fn test_reads_stdin_and_exits_cleanly() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner
        .run("read a b\necho $((a + b))\n", "1 2", LIMIT)
        .await
        .unwrap();

    assert_eq!(raw.stdout, "3\n");
    assert_eq!(raw.stderr, "");
    assert_eq!(raw.exit_code, Some(0));
    assert!(!raw.timed_out);
    assert!(!raw.launch_failed);
}

#[tokio::test]
async fn test_escaped_newlines_become_separate_lines() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner
        .run("read a\nread b\necho \"$a-$b\"\n", "first\\nsecond", LIMIT)
        .await
        .unwrap();

    assert_eq!(raw.stdout, "first-second\n");
}

#[tokio::test]
async fn test_blank_input_gives_immediate_eof() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner
        .run("if read line; then echo got; else echo eof; fi\n", "", LIMIT)
        .await
        .unwrap();

    assert_eq!(raw.stdout, "eof\n");
    assert_eq!(raw.exit_code, Some(0));
}

#[tokio::test]
async fn test_streams_and_exit_code_are_reported_separately() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner
        .run("echo out\necho err >&2\nexit 3\n", "", LIMIT)
        .await
        .unwrap();

    assert_eq!(raw.stdout, "out\n");
    assert_eq!(raw.stderr, "err\n");
    assert_eq!(raw.exit_code, Some(3));
    assert!(!raw.timed_out);
}

#[tokio::test]
async fn test_killed_by_signal_has_no_exit_code() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner.run("kill -9 $$\n", "", LIMIT).await.unwrap();

    assert_eq!(raw.exit_code, None);
    assert!(!raw.timed_out);
    assert!(!raw.launch_failed);
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let started = Instant::now();
    let raw = runner
        .run("echo partial\nsleep 30\n", "", Duration::from_millis(300))
        .await
        .unwrap();

    assert!(raw.timed_out);
    assert_eq!(raw.exit_code, None);
    assert_eq!(raw.stdout, "partial\n");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_takes_down_descendants() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let started = Instant::now();
    let raw = runner
        .run("sleep 30 &\nsleep 30\n", "", Duration::from_millis(300))
        .await
        .unwrap();

    assert!(raw.timed_out);
    // A surviving `sleep 30` would hold stdout open until it exits
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_background_child_does_not_stall_a_finished_run() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let started = Instant::now();
    let raw = runner
        .run("sleep 30 &\necho done\n", "", LIMIT)
        .await
        .unwrap();

    assert_eq!(raw.exit_code, Some(0));
    assert!(!raw.timed_out);
    assert_eq!(raw.stdout, "done\n");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_long_output_is_truncated_with_marker() {
    let root = TempDir::new().unwrap();
    let config = JudgeConfig {
        max_output_chars: 100,
        ..sh_config(root.path())
    };
    let runner = create_runner(&config).unwrap();

    let code = "i=0\nwhile [ $i -lt 5000 ]; do echo line$i; i=$((i + 1)); done\n";
    let raw = runner.run(code, "", LIMIT).await.unwrap();

    assert_eq!(raw.exit_code, Some(0));
    assert!(raw.stdout.ends_with("\n[Output truncated]"));
    assert_eq!(
        raw.stdout.chars().count(),
        100 + "\n[Output truncated]".chars().count()
    );
    assert!(raw.stdout.starts_with("line0\nline1\n"));
}

#[tokio::test]
async fn test_missing_interpreter_is_a_launch_failure() {
    let root = TempDir::new().unwrap();
    let config = JudgeConfig {
        interpreter: "codejudge-no-such-interpreter".to_string(),
        ..sh_config(root.path())
    };
    let runner = create_runner(&config).unwrap();

    let raw = runner.run("echo hi\n", "", LIMIT).await.unwrap();

    assert!(raw.launch_failed);
    assert_eq!(raw.exit_code, None);
    assert!(!raw.timed_out);
    assert!(raw.stderr.contains("could not be started"));
    assert!(scratch_is_empty(root.path()));
}

#[tokio::test]
async fn test_runs_inside_its_own_scratch_directory() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    let raw = runner.run("pwd\nls\n", "", LIMIT).await.unwrap();

    let mut lines = raw.stdout.lines();
    let cwd = Path::new(lines.next().unwrap());
    let dir_name = cwd.file_name().unwrap().to_string_lossy();
    assert!(dir_name.starts_with("attempt-"));
    assert_eq!(cwd.parent().unwrap().file_name(), root.path().file_name());
    assert_eq!(lines.collect::<Vec<_>>(), vec!["solution.sh"]);
}

#[tokio::test]
async fn test_scratch_directories_are_removed_after_every_run() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());

    runner.run("echo ok\n", "", LIMIT).await.unwrap();
    runner.run("exit 1\n", "", LIMIT).await.unwrap();
    runner
        .run("touch leftover\nsleep 30\n", "", Duration::from_millis(200))
        .await
        .unwrap();

    assert!(scratch_is_empty(root.path()));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_interfere() {
    let root = TempDir::new().unwrap();
    let runner = sh_runner(root.path());
    let code = "read x\necho $x > out.txt\nsleep 0.2\ncat out.txt\n";

    let (a, b, c) = tokio::join!(
        runner.run(code, "alpha", LIMIT),
        runner.run(code, "beta", LIMIT),
        runner.run(code, "gamma", LIMIT),
    );

    assert_eq!(a.unwrap().stdout, "alpha\n");
    assert_eq!(b.unwrap().stdout, "beta\n");
    assert_eq!(c.unwrap().stdout, "gamma\n");
    assert!(scratch_is_empty(root.path()));
}
