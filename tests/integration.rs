//! End-to-end integration tests for the flow runner
//!
//! These tests start the in-process mock JSON-RPC server and verify:
//! 1. Pooled WebSocket sessions exchange frames with the server
//! 2. The pool applies backpressure and shuts down cleanly
//! 3. Whole flow trees run through the scheduler with per-flow isolation
//! 4. The `rpcflow` binary exits with the documented status codes

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rpcflow::crawler::Crawler;
use rpcflow::flow::{FlowFactory, Services};
use rpcflow::mock::MockServer;
use rpcflow::render::TemplateRenderer;
use rpcflow::reporting::{Event, EventLog, ReportSink};
use rpcflow::transport::{
    ConnectionPool, ConnectionSource, Fetcher, HttpFetcher, SessionState, WebSocketSession,
};
use rpcflow::validation::IssueKind;
use rpcflow::{Error, RunSummary, Scheduler};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Test context: a running mock server plus a scratch flow root
struct TestContext {
    server: MockServer,
    root: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let server = MockServer::start().expect("Failed to start mock server");
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(root.path().join("flows")).expect("Failed to create flows dir");
        Self { server, root }
    }

    fn pool(&self, size: usize) -> ConnectionPool {
        ConnectionPool::connect(self.server.endpoint(), size, TIMEOUT).expect("Failed to start pool")
    }

    /// Write `flows/<name>/script.yaml` and its templates
    fn flow(&self, name: &str, script: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.root.path().join("flows").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("script.yaml"), script).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
        dir
    }

    /// Run every flow under `root` through a fresh pool
    fn run(&self, root: &Path, pool_size: usize) -> (Result<RunSummary, Error>, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let reporter: Arc<dyn ReportSink> = log.clone();
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(TIMEOUT).unwrap());
        let pool = Arc::new(self.pool(pool_size));

        let services = Services {
            renderer: Arc::new(TemplateRenderer::new(Arc::clone(&reporter), fetcher)),
            connections: pool.clone(),
            reporter,
            factory: Arc::new(FlowFactory::new()),
        };

        let result = Scheduler::new(services, Crawler::new(root, "")).run();
        pool.stop();
        (result, log)
    }
}

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

const EXCHANGE: &str = "steps:
  - type: request
    file: request.json
  - type: response
    file: response.json
";

// ============== Transport Tests ==============

#[test]
fn test_session_connects_and_exchanges() {
    let ctx = TestContext::new();
    let (session, worker) = WebSocketSession::open(0, ctx.server.endpoint(), TIMEOUT);
    let handle = thread::spawn(move || worker.run());

    session.ensure_connected().expect("session should connect");
    assert_eq!(session.state(), SessionState::Connected);

    session
        .write(json!({"id": 1, "method": "ping"}).to_string())
        .unwrap();
    let reply: Value = serde_json::from_str(&session.read_one().unwrap()).unwrap();
    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

    session.close();
    handle.join().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_pool_link_round_trip() {
    let ctx = TestContext::new();
    let pool = ctx.pool(2);

    {
        let mut link = pool.borrow().unwrap();
        link.write(json!({"id": 9, "method": "echo", "params": [1, 2]}).to_string())
            .unwrap();
        let reply: Value = serde_json::from_str(&link.read_one().unwrap()).unwrap();
        assert_eq!(reply["id"], json!(9));
        assert_eq!(reply["result"], json!([1, 2]));
    }

    assert_eq!(pool.available(), 2);
    pool.stop();
}

#[test]
fn test_pool_backpressure_capacity_four() {
    let ctx = TestContext::new();
    let pool = Arc::new(ctx.pool(4));

    let mut held: Vec<_> = (0..4).map(|_| pool.borrow_link().unwrap()).collect();
    assert_eq!(pool.available(), 0);

    let (tx, rx) = mpsc::channel();
    let fifth = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let link = pool.borrow_link().unwrap();
            tx.send(link.session_id()).unwrap();
        })
    };

    // the fifth borrower waits while all four sessions are out
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    let released = held.pop().unwrap();
    let released_id = released.session_id();
    drop(released);

    let got = rx.recv_timeout(TIMEOUT).expect("fifth borrow should complete");
    assert_eq!(got, released_id);
    fifth.join().unwrap();

    drop(held);
    pool.stop();
}

#[test]
fn test_stop_releases_blocked_borrowers() {
    let ctx = TestContext::new();
    let pool = Arc::new(ctx.pool(1));
    let held = pool.borrow_link().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            tx.send(pool.borrow_link().map(|_| ())).unwrap();
        })
    };
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // stop() waits for lent sessions, so release ours from another thread
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        drop(held);
    });
    pool.stop();

    assert!(matches!(rx.recv_timeout(TIMEOUT).unwrap(), Err(Error::PoolStopped)));
    waiter.join().unwrap();
    releaser.join().unwrap();
    assert!(matches!(pool.borrow_link(), Err(Error::PoolStopped)));
}

// ============== Flow Tests ==============

#[test]
fn test_demo_flows_pass() {
    let ctx = TestContext::new();
    let (result, log) = ctx.run(&demos_dir(), 4);

    let summary = result.unwrap();
    let failures: Vec<_> = log
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Failure { .. }))
        .collect();
    assert!(failures.is_empty(), "unexpected failures: {failures:#?}");
    assert_eq!(summary, RunSummary { passed: 5, failed: 0 });
}

#[test]
fn test_flow_isolation_against_server() {
    let ctx = TestContext::new();
    ctx.flow(
        "a_unknown_method",
        EXCHANGE,
        &[
            ("request.json", r#"{"id": 1, "method": "does_not_exist"}"#),
            ("response.json", r#"{"id": 1, "result": "$object"}"#),
        ],
    );
    ctx.flow(
        "b_ping",
        EXCHANGE,
        &[
            ("request.json", r#"{"id": 2, "method": "ping"}"#),
            ("response.json", r#"{"id": 2, "result": {}}"#),
        ],
    );

    let (result, log) = ctx.run(ctx.root.path(), 2);
    assert_eq!(result.unwrap(), RunSummary { passed: 1, failed: 1 });

    let events = log.events();
    let failure = events
        .iter()
        .find_map(|e| match e {
            Event::Failure {
                flow,
                issues,
                response,
                ..
            } => Some((flow, issues, response)),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.0, "a_unknown_method");
    assert_eq!(failure.1.len(), 1);
    assert_eq!(failure.1[0].kind, IssueKind::NoMatch);
    assert_eq!(failure.1[0].path, "result");
    assert!(failure.2.contains("-32601"));

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Success { flow } if flow == "b_ping")));
}

#[test]
fn test_repeat_block_with_small_pool() {
    let ctx = TestContext::new();
    ctx.flow(
        "repeat",
        "steps:
  - type: block
    repeat: 5
    steps:
      - type: request
        file: request.json
      - type: response
        file: response.json
",
        &[
            (
                "request.json",
                r#"{"id": {{ storeAndReturn((load("i") or 0) + 1, "i") }}, "method": "counter"}"#,
            ),
            ("response.json", r#"{"id": {{ load("i") }}, "result": {"count": {{ load("i") }}}}"#),
        ],
    );

    // a single session is enough because each iteration releases its link
    let (result, log) = ctx.run(ctx.root.path(), 1);
    assert_eq!(result.unwrap(), RunSummary { passed: 1, failed: 0 });
    assert_eq!(ctx.server.state().requests(), 5);

    let repeats = log
        .events()
        .into_iter()
        .filter(|e| e.label() == "REPEAT")
        .count();
    assert_eq!(repeats, 5);
}

#[test]
fn test_unreachable_server_fails_flows_softly() {
    let ctx = TestContext::new();
    ctx.flow(
        "ping",
        EXCHANGE,
        &[
            ("request.json", r#"{"id": 1, "method": "ping"}"#),
            ("response.json", r#"{"id": 1}"#),
        ],
    );

    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let log = Arc::new(EventLog::new());
    let reporter: Arc<dyn ReportSink> = log.clone();
    let pool = Arc::new(
        ConnectionPool::connect(rpcflow::Endpoint::new("127.0.0.1", port), 1, TIMEOUT).unwrap(),
    );
    let services = Services {
        renderer: Arc::new(TemplateRenderer::new(
            Arc::clone(&reporter),
            Arc::new(HttpFetcher::new(TIMEOUT).unwrap()),
        )),
        connections: pool.clone(),
        reporter,
        factory: Arc::new(FlowFactory::new()),
    };

    let summary = Scheduler::new(services, Crawler::new(ctx.root.path(), ""))
        .run()
        .unwrap();
    pool.stop();

    assert_eq!(summary, RunSummary { passed: 0, failed: 1 });
    let issue = log
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::Failure { issues, .. } => issues.into_iter().next(),
            _ => None,
        })
        .unwrap();
    assert_eq!(issue.kind, IssueKind::LogicError);
    assert_eq!(issue.message, "Connection closed");
}

// ============== CLI Tests ==============

fn rpcflow(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rpcflow"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_run_demos_exits_zero() {
    let ctx = TestContext::new();
    let home = tempfile::tempdir().unwrap();

    let output = rpcflow(home.path())
        .arg("run")
        .arg(demos_dir())
        .args(["-P", &ctx.server.addr().port().to_string(), "-v", "1"])
        .output()
        .expect("Failed to run rpcflow");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("SUCCESS"));
    assert!(stdout.contains("5 passed"));
}

#[test]
fn test_cli_failed_flows_still_exit_zero() {
    let ctx = TestContext::new();
    let home = tempfile::tempdir().unwrap();
    ctx.flow(
        "mismatch",
        EXCHANGE,
        &[
            ("request.json", r#"{"id": 1, "method": "ping"}"#),
            ("response.json", r#"{"id": 2}"#),
        ],
    );

    let output = rpcflow(home.path())
        .arg("run")
        .arg(ctx.root.path())
        .args(["-P", &ctx.server.addr().port().to_string()])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("FAIL"));
}

#[test]
fn test_cli_missing_flows_dir_exits_one() {
    let home = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();

    let output = rpcflow(home.path())
        .arg("run")
        .arg(empty.path())
        .args(["-P", "1"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing 'flows' sub directory"));
}

#[test]
fn test_cli_list_reports_broken_flows() {
    let ctx = TestContext::new();
    let home = tempfile::tempdir().unwrap();
    ctx.flow("good", "meta:\n  subject: Works\nsteps: []\n", &[]);
    ctx.flow("broken", "steps:\n  - type: request\n    file: missing.json\n", &[]);

    let output = rpcflow(home.path())
        .arg("list")
        .arg(ctx.root.path())
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("good"));
    assert!(stdout.contains("Works"));
    assert!(stdout.contains("missing.json"));
}
