use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use runem::options::{ExecutionMode, Options, RunnerCommand};
use runem::{AggregateResult, RunError, RunEvent};

/// Stands in for `npm run-script`: runs `<package>/<script>.sh` with the forwarded arguments.
fn sh_runner() -> RunnerCommand {
    RunnerCommand::new("sh", &["-c", r#"exec sh "./$0.sh" "$@""#])
}

fn sh_options(mode: ExecutionMode) -> Options {
    Options {
        runner: sh_runner(),
        mode,
        ..Default::default()
    }
}

/// Write `<dir>/package.json` and one `<script>.sh` per script body.
fn write_package(root: &Path, dir: &str, scripts: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    let entries: Vec<String> = scripts
        .iter()
        .map(|(name, _)| format!(r#""{name}": "sh ./{name}.sh""#))
        .collect();
    let manifest = dir.join("package.json");
    std::fs::write(
        &manifest,
        format!(r#"{{"name": "pkg", "scripts": {{{}}}}}"#, entries.join(", ")),
    )
    .unwrap();
    for (name, body) in scripts {
        std::fs::write(dir.join(format!("{name}.sh")), body).unwrap();
    }
    manifest
}

fn write_raw(root: &Path, dir: &str, contents: &str) -> PathBuf {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    let manifest = dir.join("package.json");
    std::fs::write(&manifest, contents).unwrap();
    manifest
}

/// a and b declare `test`, c only declares `build`, plus noise that must be ignored.
fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_raw(dir.path(), "", r#"{"name": "root", "private": true}"#);
    write_package(dir.path(), "a", &[("test", "echo a")]);
    write_package(dir.path(), "b", &[("test", "echo b")]);
    write_package(dir.path(), "c", &[("build", "echo built")]);
    write_package(dir.path(), "node_modules/c", &[("test", "echo c")]);
    write_raw(dir.path(), "broken", "{ not json");
    dir
}

async fn collect(
    root: &Path,
    script: &str,
    options: &Options,
    args: &[&str],
) -> (String, Result<AggregateResult, RunError>) {
    let args = args.iter().map(ToString::to_string).collect();
    let mut output = Vec::new();
    let result = runem::run(root, script, options, args)
        .outcome(|chunk| output.extend_from_slice(chunk))
        .await;
    (String::from_utf8(output).unwrap(), result)
}

fn sorted_lines(output: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort_unstable();
    lines
}

// ─── list ───

#[tokio::test]
async fn test_list_scripts_excludes_node_modules() {
    let dir = fixture();
    let listing = runem::list(dir.path(), &Options::default()).await.unwrap();

    assert_eq!(listing.len(), 3);
    assert_eq!(
        listing.get(&dir.path().join("a/package.json")),
        Some(["test".to_string()].as_slice())
    );
    assert_eq!(
        listing.get(&dir.path().join("c/package.json")),
        Some(["build".to_string()].as_slice())
    );
    assert!(
        listing
            .paths()
            .all(|p| !p.to_string_lossy().contains("node_modules")),
        "no manifest in node_modules listed"
    );
    assert!(listing.get(&dir.path().join("package.json")).is_none());
    assert_eq!(listing.skipped.len(), 1);
    assert_eq!(listing.skipped[0].path, dir.path().join("broken/package.json"));
}

#[tokio::test]
async fn test_list_includes_node_modules_when_root_inside() {
    let dir = fixture();
    let root = dir.path().join("node_modules");
    let listing = runem::list(&root, &Options::default()).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(
        listing.paths().next(),
        Some(root.join("c/package.json").as_path())
    );

    let listing = runem::list(&root.join("c"), &Options::default())
        .await
        .unwrap();
    assert_eq!(listing.len(), 1);
}

#[tokio::test]
async fn test_list_ignores_unrelated_manifest_fields() {
    let dir = tempfile::tempdir().unwrap();
    write_raw(
        dir.path(),
        "a",
        r#"{"name": 42, "version": ["1"], "scripts": {"test": "tape"}}"#,
    );
    let listing = runem::list(dir.path(), &Options::default()).await.unwrap();
    assert!(listing.skipped.is_empty());
    assert_eq!(
        listing.get(&dir.path().join("a/package.json")),
        Some(["test".to_string()].as_slice())
    );
}

#[tokio::test]
async fn test_list_is_idempotent() {
    let dir = fixture();
    let first = runem::list(dir.path(), &Options::default()).await.unwrap();
    let second = runem::list(dir.path(), &Options::default()).await.unwrap();
    assert_eq!(first, second);
    let first: Vec<_> = first.paths().map(Path::to_path_buf).collect();
    let second: Vec<_> = second.paths().map(Path::to_path_buf).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_list_rendering() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "a", &[("test", "true"), ("lint", "true")]);
    write_package(dir.path(), "b", &[("build", "true")]);
    let listing = runem::list(dir.path(), &Options::default()).await.unwrap();
    let rendered =
        runem::report::render_listing(&listing, dir.path(), runem::report::Style::plain());
    insta::assert_snapshot!(rendered, @r"
    a/package.json: test, lint
    b/package.json: build
    ");
}

// ─── run ───

#[tokio::test]
async fn test_run_streams_every_package() {
    let dir = fixture();
    let (output, result) = collect(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        &[],
    )
    .await;
    let aggregate = result.unwrap();

    assert_eq!(sorted_lines(&output), vec!["a", "b"]);
    assert_eq!(aggregate.codes(), vec![Some(0), Some(0)]);
    assert!(!aggregate.failed());
    let manifests: Vec<_> = aggregate
        .outcomes
        .iter()
        .map(|o| o.reference.manifest.clone())
        .collect();
    assert_eq!(
        manifests,
        vec![
            dir.path().join("a/package.json"),
            dir.path().join("b/package.json")
        ]
    );
}

#[tokio::test]
async fn test_run_sequential_keeps_discovery_order() {
    let dir = fixture();
    let (output, result) = collect(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Sequential),
        &[],
    )
    .await;
    assert_eq!(output, "a\nb\n");
    assert_eq!(result.unwrap().outcomes.len(), 2);
}

#[tokio::test]
async fn test_run_events_as_stream() {
    let dir = fixture();
    let events: Vec<RunEvent> = runem::run(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        Vec::new(),
    )
    .collect()
    .await;

    let (last, data) = events.split_last().unwrap();
    assert!(matches!(last, RunEvent::Done(_)), "got: {last:?}");
    assert!(data.iter().all(|e| matches!(e, RunEvent::Data(_))));
}

#[tokio::test]
async fn test_run_skips_packages_without_script() {
    let dir = fixture();
    let (output, result) = collect(
        dir.path(),
        "build",
        &sh_options(ExecutionMode::Parallel),
        &[],
    )
    .await;
    assert_eq!(output, "built\n");
    let aggregate = result.unwrap();
    assert_eq!(aggregate.outcomes.len(), 1);
    assert_eq!(
        aggregate.outcomes[0].reference.manifest,
        dir.path().join("c/package.json")
    );
}

#[tokio::test]
async fn test_run_without_matching_packages() {
    let dir = fixture();
    let (output, result) = collect(
        dir.path(),
        "deploy",
        &sh_options(ExecutionMode::Parallel),
        &[],
    )
    .await;
    assert!(output.is_empty());
    let aggregate = result.unwrap();
    assert!(aggregate.is_empty());
    assert!(!aggregate.failed());
}

#[tokio::test]
async fn test_run_sentinel_exit_code_fails() {
    let dir = fixture();
    write_package(dir.path(), "d", &[("test", "echo d; exit 1")]);
    let (output, result) = collect(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        &[],
    )
    .await;
    let aggregate = result.unwrap();

    assert_eq!(sorted_lines(&output), vec!["a", "b", "d"]);
    assert!(aggregate.failed());
    let failures: Vec<_> = aggregate.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].reference.manifest,
        dir.path().join("d/package.json")
    );
}

#[tokio::test]
async fn test_run_other_exit_code_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "a", &[("test", "exit 3")]);
    let (_, result) = collect(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        &[],
    )
    .await;
    let aggregate = result.unwrap();
    assert_eq!(aggregate.codes(), vec![Some(3)]);
    assert!(!aggregate.failed());

    let options = Options {
        failure_code: 3,
        ..sh_options(ExecutionMode::Parallel)
    };
    let (_, result) = collect(dir.path(), "test", &options, &[]).await;
    assert!(result.unwrap().failed());
}

#[tokio::test]
async fn test_run_forwards_args_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    write_package(
        dir.path(),
        "a",
        &[("test", r#"echo "$1-$2"; echo oops >&2"#)],
    );
    let (output, result) = collect(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        &["x", "y"],
    )
    .await;
    result.unwrap();
    assert_eq!(sorted_lines(&output), vec!["oops", "x-y"]);
}

#[tokio::test]
async fn test_run_spawn_error_is_fatal() {
    let dir = fixture();
    let options = Options {
        runner: RunnerCommand::new("runem-no-such-runner", &[]),
        ..Default::default()
    };
    for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
        let options = Options {
            mode,
            ..options.clone()
        };
        let (output, result) = collect(dir.path(), "test", &options, &[]).await;
        assert!(output.is_empty());
        match result {
            Err(RunError::Spawn {
                manifest, program, ..
            }) => {
                assert_eq!(manifest, dir.path().join("a/package.json"));
                assert_eq!(program, "runem-no-such-runner");
            }
            other => panic!("Expected RunError::Spawn, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_dropping_handle_kills_children() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("a/finished");
    write_package(
        dir.path(),
        "a",
        &[("test", "echo started; sleep 1; touch finished")],
    );

    let mut handle = runem::run(
        dir.path(),
        "test",
        &sh_options(ExecutionMode::Parallel),
        Vec::new(),
    );
    match handle.next().await {
        Some(RunEvent::Data(chunk)) => assert_eq!(chunk, b"started\n"),
        other => panic!("Expected output, got: {other:?}"),
    }
    drop(handle);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "script should have been killed");
}

// ─── command line ───

fn runem_cmd(root: &Path) -> std::process::Command {
    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_runem"));
    cmd.env_remove("RUST_LOG").current_dir(root);
    cmd
}

fn with_sh_runner(cmd: &mut std::process::Command) -> &mut std::process::Command {
    cmd.args([
        "--runner",
        "sh",
        "--runner-arg",
        "-c",
        "--runner-arg",
        r#"exec sh "./$0.sh" "$@""#,
    ])
}

#[test]
fn test_cli_run_success() {
    let dir = fixture();
    let mut cmd = runem_cmd(dir.path());
    cmd.args(["run", "test"]);
    let output = with_sh_runner(&mut cmd).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(sorted_lines(&stdout), vec!["a", "b"]);
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("2 tasks: 2 passed"), "got: {stderr}");
}

#[test]
fn test_cli_run_failure_exit_code() {
    let dir = fixture();
    write_package(dir.path(), "d", &[("test", "exit 1")]);
    let mut cmd = runem_cmd(dir.path());
    cmd.args(["run", "test", "--quiet"]);
    let output = with_sh_runner(&mut cmd).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_list_json() {
    let dir = fixture();
    let output = runem_cmd(dir.path())
        .args(["list", "--json", "-C"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let object = json.as_object().unwrap();
    assert_eq!(object.len(), 3);
    let key = dir.path().join("b/package.json").display().to_string();
    assert_eq!(json[key.as_str()], serde_json::json!(["test"]));
}

#[test]
fn test_cli_config_ignore() {
    let dir = fixture();
    std::fs::write(dir.path().join(".runem.yaml"), "ignore: [c]\n").unwrap();
    let output = runem_cmd(dir.path())
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_cli_sigterm_kills_running_scripts() {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("a/finished");
    write_package(
        dir.path(),
        "a",
        &[("test", "echo started; sleep 1; touch finished")],
    );

    let mut cmd = runem_cmd(dir.path());
    cmd.args(["run", "test", "--quiet"]);
    let mut child = with_sh_runner(&mut cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut line = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line, "started\n");

    let kill = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());
    assert_eq!(child.wait().unwrap().code(), Some(143));

    std::thread::sleep(Duration::from_millis(1500));
    assert!(!marker.exists(), "script should have been killed");
}
