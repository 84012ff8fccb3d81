//! Integration tests for the tailview binary.

use std::{convert::Infallible, fs, time::Duration};

use assert_cmd::cargo::cargo_bin_cmd;
use axum::{
    Json, Router,
    response::sse::{Event, Sse},
    routing::get,
};
use futures_util::{StreamExt, stream};
use predicates::prelude::PredicateBooleanExt;
use tempfile::TempDir;

/// Three events, then the stream stays open.
async fn live_events() -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let events = vec![
        Event::default().id("1").data("alpha"),
        Event::default().event("heartbeat").data("tick"),
        Event::default()
            .id("2")
            .event("custom")
            .data("line one\nline two"),
    ];
    Sse::new(stream::iter(events.into_iter().map(Ok)).chain(stream::pending()))
}

/// One event, then the stream ends.
async fn finite_events() -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    Sse::new(stream::iter(vec![Ok(Event::default().id("9").data("last"))]))
}

async fn dates() -> Json<Vec<&'static str>> {
    Json(vec!["2024-05-01", "2024-05-02"])
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/events", get(live_events))
        .route("/finite", get(finite_events))
        .route("/dates", get(dates));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Command isolated from the user's configuration and `.env`.
fn tailview(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tailview");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("TAILVIEW_SERVER_URL")
        .env_remove("TAILVIEW_ENDPOINT")
        .env_remove("TAILVIEW_MAX_MESSAGES")
        .env_remove("TAILVIEW_LOG_LEVEL")
        .env_remove("TAILVIEW_AUTH_TOKEN")
        .env_remove("TAILVIEW_EXPORT_DIR")
        .timeout(Duration::from_secs(20));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    tailview(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("tail"))
        .stdout(predicates::str::contains("dates"))
        .stdout(predicates::str::contains("completion"));
}

#[test]
fn test_tail_help_lists_filters() {
    let home = TempDir::new().unwrap();
    tailview(&home)
        .args(["tail", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--connection"))
        .stdout(predicates::str::contains("--tag"))
        .stdout(predicates::str::contains("--last-event-id"))
        .stdout(predicates::str::contains("--interactive"));
}

#[test]
fn test_tail_rejects_unknown_connection_kind() {
    let home = TempDir::new().unwrap();
    tailview(&home)
        .args(["tail", "--connection", "pigeon"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value"))
        .stderr(predicates::str::contains("websocket"));
}

#[test]
fn test_tail_rejects_zero_max_messages() {
    let home = TempDir::new().unwrap();
    tailview(&home)
        .args(["tail", "--max-messages", "0"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("max_messages must be greater than 0"));
}

#[test]
fn test_completion_generates_script() {
    let home = TempDir::new().unwrap();
    tailview(&home)
        .args(["completion", "--shell", "bash"])
        .assert()
        .success()
        .stdout(predicates::str::contains("tailview"));
}

#[test]
fn test_config_writes_requested_format() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("generated");

    tailview(&home)
        .args(["config", "--format", "json", "--output-dir"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicates::str::contains("generated successfully"));

    let contents = fs::read_to_string(out.join("config.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["endpoint"], "/api/events");
    assert_eq!(value["max_messages"], 1000);
}

#[test]
fn test_tail_reports_unreachable_server() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.yaml");
    fs::write(&config, "retry:\n  max_attempts: 0\n").unwrap();

    tailview(&home)
        .args(["tail", "--server", "http://127.0.0.1:9", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(
            predicates::str::contains("stream closed")
                .and(predicates::str::contains("connection closed by server")),
        );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tail_prints_events_until_count() {
    let server = spawn_server().await;
    let home = TempDir::new().unwrap();
    let mut cmd = tailview(&home);
    cmd.args(["tail", "--no-timestamps", "--count", "3", "--server", &server]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "alpha\n(heartbeat) tick\n(custom) line one\nline two\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tail_exits_when_stream_closes_and_exports() {
    let server = spawn_server().await;
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.yaml");
    fs::write(&config, "retry:\n  max_attempts: 0\n").unwrap();
    let exports = home.path().join("exports");

    let mut cmd = tailview(&home);
    cmd.args(["tail", "--no-timestamps", "--endpoint", "/finite", "--export-on-exit"])
        .args(["--server", &server])
        .arg("--export-dir")
        .arg(&exports)
        .arg("--config")
        .arg(&config);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "last\n");
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("connection closed by server"), "{stderr}");

    let exported: Vec<_> = fs::read_dir(&exports).unwrap().collect();
    assert_eq!(exported.len(), 1);
    let path = exported[0].as_ref().unwrap().path();
    assert!(
        path.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sse-messages-")
    );
    assert_eq!(fs::read_to_string(path).unwrap(), "last");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interactive_status_and_quit() {
    let server = spawn_server().await;
    let home = TempDir::new().unwrap();

    let mut cmd = tailview(&home);
    cmd.args(["tail", "--interactive", "--server", &server])
        .write_stdin("tag add 5\nsearch disk full\nstatus\nquit\n");

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("filter tags=5 search=disk full"), "{stderr}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interactive_endpoint_switch_requires_disconnect() {
    let server = spawn_server().await;
    let home = TempDir::new().unwrap();

    let mut cmd = tailview(&home);
    cmd.args(["tail", "--interactive", "--server", &server])
        .write_stdin("endpoint /finite\ndisconnect\nendpoint /finite\nquit\n");

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(
        stderr.contains("error: Disconnect before changing the endpoint"),
        "{stderr}"
    );
    assert!(
        stderr.contains(&format!("endpoint set to {server}/finite")),
        "{stderr}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dates_lists_server_dates() {
    let server = spawn_server().await;
    let home = TempDir::new().unwrap();
    let mut cmd = tailview(&home);
    cmd.args(["dates", "--server", &server]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "2024-05-01\n2024-05-02\n"
    );
}
