//! Purpose: End-to-end tests for the HTTP server and remote client.
//! Exports: None (integration test module).
//! Role: Validate decode, history, health, and error envelopes across TCP.
//! Invariants: Uses a loopback-only server with a temp history database.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use alchemist::api::{ErrorKind, HistoryStore, RemoteClient};
use serde_json::Value;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(db_path: &Path) -> TestResult<Self> {
        Self::start_with_args(db_path, &[])
    }

    fn start_with_args(db_path: &Path, extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_alchemist"))
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .arg("--db")
                .arg(db_path)
                .args(extra)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> TestResult<RemoteClient> {
        Ok(RemoteClient::new(self.base_url.clone())?)
    }

    fn get_raw(&self, path_and_query: &str) -> TestResult<(u16, Value)> {
        let url = format!("{}{path_and_query}", self.base_url);
        let (status, response) = match ureq::get(&url).call() {
            Ok(resp) => (resp.status(), resp),
            Err(ureq::Error::Status(code, resp)) => (code, resp),
            Err(err) => return Err(err.into()),
        };
        let body = response.into_string()?;
        Ok((status, serde_json::from_str(&body)?))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn db_path(temp: &tempfile::TempDir) -> PathBuf {
    temp.path().join("history.sqlite3")
}

#[test]
fn remote_decode_matches_local() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;
    let client = server.client()?;

    for input in ["abbcc", "dz_a_aazzaaa", "a_", "_", "za", "ABCDABCDAB", "  aa  "] {
        assert_eq!(client.decode(input)?, alchemist::api::decode(input)?);
    }
    assert_eq!(client.decode("dz_a_aazzaaa")?, vec![28, 53, 1]);
    Ok(())
}

#[test]
fn convert_returns_bare_json_array() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;

    let (status, body) = server.get_raw("/convert-measurements?input=abbcc")?;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!([2, 6]));

    let (status, body) = server.get_raw("/convert-measurements?input=%20%20%20")?;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!([]));
    Ok(())
}

#[test]
fn missing_or_empty_input_is_bad_request() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;

    for path in ["/convert-measurements", "/convert-measurements?input="] {
        let (status, body) = server.get_raw(path)?;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["kind"], "Usage");
        assert_eq!(body["error"]["message"], "input parameter is required");
    }
    Ok(())
}

#[test]
fn invalid_characters_report_offset_and_are_not_recorded() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;
    let client = server.client()?;

    let err = client.decode("ab1c").expect_err("digit rejected");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(err.offset(), Some(2));

    let history = client.history(None)?;
    assert_eq!(history.total_records, 0);
    Ok(())
}

#[test]
fn oversized_input_is_rejected() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start_with_args(&db_path(&temp_dir), &["--max-input-len", "8"])?;
    let client = server.client()?;

    assert_eq!(client.decode("aaaaaaaa")?, vec![1, 1, 1, 1]);
    let err = client.decode("aaaaaaaaa").expect_err("over limit");
    assert_eq!(err.kind(), ErrorKind::Usage);
    Ok(())
}

#[test]
fn history_lists_newest_first_with_limit() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;
    let client = server.client()?;

    client.decode("aa")?;
    client.decode("ABBCC")?;
    client.decode("_")?;

    let history = client.history(Some(2))?;
    assert_eq!(history.total_records, 2);
    assert_eq!(history.history[0].input, "_");
    assert_eq!(history.history[0].output, vec![0]);
    assert_eq!(history.history[1].input, "ABBCC");
    assert_eq!(history.history[1].output, vec![2, 6]);
    assert!(history.history[0].id > history.history[1].id);
    OffsetDateTime::parse(&history.history[0].timestamp, &Rfc3339)?;

    let all = client.history(None)?;
    assert_eq!(all.total_records, 3);
    Ok(())
}

#[test]
fn history_survives_server_restart() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = db_path(&temp_dir);
    {
        let server = TestServer::start(&path)?;
        server.client()?.decode("zdaaaaaaaabaaaaaaaabaaaaaaaabbaa")?;
    }

    let store = HistoryStore::open(&path)?;
    let recent = store.recent(10)?;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].output, vec![34]);

    let server = TestServer::start(&path)?;
    let history = server.client()?.history(None)?;
    assert_eq!(history.total_records, 1);
    Ok(())
}

#[test]
fn history_limit_must_be_numeric() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;

    let (status, body) = server.get_raw("/history?limit=lots")?;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "Usage");
    Ok(())
}

#[test]
fn health_and_unknown_routes() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let server = TestServer::start(&db_path(&temp_dir))?;

    let health = server.client()?.health()?;
    assert_eq!(health.status, "healthy");
    OffsetDateTime::parse(&health.timestamp, &Rfc3339)?;

    let (status, body) = server.get_raw("/no/such/route")?;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "NotFound");
    assert_eq!(body["error"]["message"], "endpoint not found");
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/health");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
