//! Relay client against a real backend on a loopback port.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cmdrelay_backend::BackendServer;
use cmdrelay_client::{RelayClient, RelayError};
use cmdrelay_core::{BackendConfig, RelayConfig, Request};
use tokio_util::sync::CancellationToken;

struct Backend {
    port: u16,
    cancel: CancellationToken,
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_backend(root: &Path) -> Backend {
    let config = BackendConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        file_root: root.to_path_buf(),
        ..BackendConfig::default()
    };
    let server = BackendServer::bind(&config).await.unwrap();
    let port = server.local_addr().port();
    let cancel = CancellationToken::new();
    tokio::spawn(server.serve(cancel.clone()));
    Backend { port, cancel }
}

fn client(port: u16) -> RelayClient {
    RelayClient::new(RelayConfig {
        host: "127.0.0.1".to_string(),
        port,
        dial_timeout: Duration::from_secs(1),
        io_timeout: Duration::from_secs(5),
    })
}

#[cfg(unix)]
#[tokio::test]
async fn pwd_reports_the_backend_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_backend(dir.path()).await;

    let req = Request::command("r-1", "alice", "pwd");
    let res = client(backend.port)
        .call(&CancellationToken::new(), &req)
        .await;

    assert!(res.ok, "error: {}", res.error);
    assert_eq!(res.request_id, "r-1");
    assert_eq!(res.user_id, "alice");

    // `pwd` may print a logical path; compare canonical forms.
    let reported = PathBuf::from(res.output.trim()).canonicalize().unwrap();
    let expected = std::env::current_dir().unwrap().canonicalize().unwrap();
    assert_eq!(reported, expected);
    assert_eq!(res.tcp_local, format!("127.0.0.1:{}", backend.port));
}

#[tokio::test]
async fn three_byte_file_in_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
    let backend = start_backend(dir.path()).await;

    let req = Request::file("r-2", "bob", "a.txt", 0, 10);
    let res = client(backend.port)
        .call(&CancellationToken::new(), &req)
        .await;

    assert!(res.ok, "error: {}", res.error);
    assert_eq!(res.file_b64, "YWJj");
    assert_eq!(res.next_offset, 3);
    assert!(res.eof);
}

#[tokio::test]
async fn disallowed_command_is_reported_in_band() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_backend(dir.path()).await;

    let req = Request::command("r-3", "mallory", "rm -rf /");
    let res = client(backend.port)
        .call(&CancellationToken::new(), &req)
        .await;

    assert!(!res.ok);
    assert_eq!(res.error, "command not allowed");
    assert_eq!(res.request_id, "r-3");
}

#[tokio::test]
async fn refused_dial_becomes_failure_response() {
    // Bind and immediately drop to get a port nobody listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let req = Request::command("r-4", "carol", "ls");
    let err = client(port)
        .try_call(&CancellationToken::new(), &req)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Dial { .. }), "{err:?}");

    let res = client(port).call(&CancellationToken::new(), &req).await;
    assert!(!res.ok);
    assert!(!res.error.is_empty());
    assert_eq!(res.request_id, "r-4");
    assert_eq!(res.user_id, "carol");
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_wins_over_a_slow_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = BackendConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        file_root: dir.path().to_path_buf(),
        allowed_commands: ["sleep".to_string()].into_iter().collect(),
        ..BackendConfig::default()
    };
    let server = BackendServer::bind(&config).await.unwrap();
    let port = server.local_addr().port();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let res = client(port)
        .call(&cancel, &Request::command("r-5", "dave", "sleep 5"))
        .await;

    assert!(!res.ok);
    assert_eq!(res.error, "request canceled");
    assert!(started.elapsed() < Duration::from_secs(2));
    shutdown.cancel();
}

#[cfg(unix)]
#[tokio::test]
async fn output_larger_than_a_request_frame_is_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let config = BackendConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        file_root: dir.path().to_path_buf(),
        allowed_commands: ["seq".to_string()].into_iter().collect(),
        ..BackendConfig::default()
    };
    let server = BackendServer::bind(&config).await.unwrap();
    let port = server.local_addr().port();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let res = client(port)
        .call(&CancellationToken::new(), &Request::command("r-6", "erin", "seq 1 400000"))
        .await;

    assert!(res.ok, "error: {}", res.error);
    assert!(res.output.len() > cmdrelay_core::MAX_FRAME_LEN);
    assert_eq!(res.output.lines().count(), 400_000);
    assert_eq!(res.output.lines().last(), Some("400000"));
    shutdown.cancel();
}
