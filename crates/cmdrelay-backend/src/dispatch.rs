//! Per-connection dispatcher.
//!
//! One connection carries exactly one request frame and one response frame:
//!
//! ```text
//! AwaitFrame -> Parsed -> { ExecutingCmd | ExecutingFile | Rejected } -> Responded -> Closed
//! ```
//!
//! Malformed JSON goes straight from `AwaitFrame` to `Rejected`. A framing
//! failure (peer closed, timeout, oversized line) closes the connection
//! without a response.

use std::time::Duration;

use cmdrelay_core::{
    BackendConfig, MAX_FRAME_LEN, ProtocolError, Request, RequestKind, Response, decode,
    read_frame, write_frame,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::exec::CommandExecutor;
use crate::file::{FileChunkReader, Sandbox};

/// Dispatcher states, traced for every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitFrame,
    Parsed,
    ExecutingCmd,
    ExecutingFile,
    Rejected,
    Responded,
    Closed,
}

impl DispatchState {
    /// State entered from `Parsed` for a defaulted request.
    pub fn route(request: &Request) -> Self {
        match request.request_kind() {
            Ok(RequestKind::Cmd) => Self::ExecutingCmd,
            Ok(RequestKind::File) => Self::ExecutingFile,
            Err(_) => Self::Rejected,
        }
    }
}

/// Routes one framed request to the command executor or the file reader.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: CommandExecutor,
    files: FileChunkReader,
    frame_timeout: Duration,
}

impl Dispatcher {
    pub const fn new(
        executor: CommandExecutor,
        files: FileChunkReader,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            files,
            frame_timeout,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            CommandExecutor::from_config(config),
            FileChunkReader::new(Sandbox::new(&config.file_root)),
            config.frame_timeout,
        )
    }

    /// Serve one accepted TCP connection, then close it.
    pub async fn handle_connection(&self, stream: TcpStream) {
        let local = stream
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let remote = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.dispatch(stream, &local, &remote).await;
    }

    /// Serve one exchange over any byte stream.
    ///
    /// Always ends in [`DispatchState::Closed`]. When no complete frame arrived
    /// nothing is written. Both the frame read and the response write are
    /// bounded by the frame timeout.
    pub async fn dispatch<S>(&self, io: S, local: &str, remote: &str) -> DispatchState
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(io);
        debug!(local, remote, state = ?DispatchState::AwaitFrame, "Connection accepted");

        let frame = match tokio::time::timeout(
            self.frame_timeout,
            read_frame(&mut stream, MAX_FRAME_LEN),
        )
        .await
        {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => return abort(&mut stream, remote, &e).await,
            Err(_) => return abort(&mut stream, remote, &ProtocolError::Timeout).await,
        };

        let response = self.process(&frame, local, remote).await;

        let write = write_frame(&mut stream, &response);
        let written = match tokio::time::timeout(self.frame_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        };
        match written {
            Ok(()) => debug!(
                remote,
                request_id = %response.request_id,
                ok = response.ok,
                state = ?DispatchState::Responded,
                "Response written"
            ),
            Err(e) => warn!(
                remote,
                request_id = %response.request_id,
                error = %e,
                "Failed to write response"
            ),
        }

        // Closed unconditionally, whether or not the write succeeded.
        let _ = stream.shutdown().await;
        DispatchState::Closed
    }

    /// Turn one request frame into its response.
    pub async fn process(&self, frame: &[u8], local: &str, remote: &str) -> Response {
        let request = match decode::<Request>(frame) {
            Ok(request) => request.with_defaults(),
            Err(e) => {
                debug!(remote, error = %e, state = ?DispatchState::Rejected, "Malformed request");
                return Response::default()
                    .with_endpoints(local, remote)
                    .fail("bad json");
            }
        };

        debug!(
            remote,
            request_id = %request.request_id,
            user_id = %request.user_id,
            kind = %request.kind,
            state = ?DispatchState::Parsed,
            "Request parsed"
        );

        let base = Response::for_request(&request).with_endpoints(local, remote);
        let state = DispatchState::route(&request);
        debug!(request_id = %request.request_id, state = ?state, "Dispatching");

        match state {
            DispatchState::ExecutingCmd => self.executor.run(&request, base).await,
            DispatchState::ExecutingFile => self.files.read_chunk(&request, base).await,
            _ => base.fail("unsupported type"),
        }
    }
}

async fn abort<S>(stream: &mut BufReader<S>, remote: &str, error: &ProtocolError) -> DispatchState
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(remote, error = %error, "Dropping connection without a request frame");
    let _ = stream.shutdown().await;
    DispatchState::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdrelay_core::ShellPolicy;
    use std::collections::HashSet;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, duplex};

    fn dispatcher(root: &std::path::Path) -> Dispatcher {
        let allowed: HashSet<String> = ["pwd", "uname"].iter().map(ToString::to_string).collect();
        Dispatcher::new(
            CommandExecutor::new(allowed, ShellPolicy::FirstToken, Some(Duration::from_secs(10))),
            FileChunkReader::new(Sandbox::new(root)),
            Duration::from_millis(500),
        )
    }

    async fn exchange(dispatcher: &Dispatcher, frame: &[u8]) -> Response {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(frame).await.unwrap();

        let state = dispatcher.dispatch(server, "127.0.0.1:9000", "127.0.0.1:40000").await;
        assert_eq!(state, DispatchState::Closed);

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        decode(line.as_bytes()).unwrap()
    }

    #[test]
    fn test_route() {
        let mut req = Request::default().with_defaults();
        assert_eq!(DispatchState::route(&req), DispatchState::ExecutingCmd);

        req.kind = "file".to_string();
        assert_eq!(DispatchState::route(&req), DispatchState::ExecutingFile);

        req.kind = "exec".to_string();
        assert_eq!(DispatchState::route(&req), DispatchState::Rejected);
    }

    #[tokio::test]
    async fn test_bad_json_is_rejected_in_band() {
        let dir = tempfile::tempdir().unwrap();
        let res = exchange(&dispatcher(dir.path()), b"{not json\n").await;

        assert!(!res.ok);
        assert_eq!(res.error, "bad json");
        assert_eq!(res.tcp_local, "127.0.0.1:9000");
        assert_eq!(res.tcp_remote, "127.0.0.1:40000");
    }

    #[tokio::test]
    async fn test_unsupported_type_echoes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let frame = b"{\"request_id\":\"r-7\",\"user_id\":\"carol\",\"type\":\"upload\"}\n";
        let res = exchange(&dispatcher(dir.path()), frame).await;

        assert!(!res.ok);
        assert_eq!(res.error, "unsupported type");
        assert_eq!(res.request_id, "r-7");
        assert_eq!(res.user_id, "carol");
    }

    #[tokio::test]
    async fn test_missing_fields_are_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let res = exchange(&dispatcher(dir.path()), b"{\"cmd\":\"rm -rf /\"}\n").await;

        assert!(!res.ok);
        assert_eq!(res.error, "command not allowed");
        assert_eq!(res.user_id, "anonymous");
        assert_eq!(res.request_id, "no-request-id");
    }

    #[tokio::test]
    async fn test_file_request_is_routed_to_reader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let frame = b"{\"type\":\"file\",\"path\":\"a.txt\",\"offset\":0,\"limit\":10}\n";
        let res = exchange(&dispatcher(dir.path()), frame).await;

        assert!(res.ok, "error: {}", res.error);
        assert!(res.eof);
        assert_eq!(res.next_offset, 3);
        assert_eq!(res.file_b64, "YWJj");
    }

    #[tokio::test]
    async fn test_closed_before_newline_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, server) = duplex(1024);
        client.write_all(b"{\"cmd\":\"pwd\"}").await.unwrap();
        client.shutdown().await.unwrap();

        let state = dispatcher(dir.path()).dispatch(server, "l", "r").await;
        assert_eq!(state, DispatchState::Closed);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_frame_timeout_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, server) = duplex(1024);

        // Never send a newline; the dispatcher gives up after its frame timeout.
        client.write_all(b"{\"cmd\":").await.unwrap();
        let state = dispatcher(dir.path()).dispatch(server, "l", "r").await;
        assert_eq!(state, DispatchState::Closed);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_padded_type_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let frame = b"{\"type\":\" file\",\"path\":\"a.txt\"}\n";
        let res = exchange(&dispatcher(dir.path()), frame).await;

        assert!(!res.ok);
        assert_eq!(res.error, "unsupported type");
        assert!(res.file_b64.is_empty());
    }

    #[tokio::test]
    async fn test_response_write_is_bounded_by_frame_timeout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big"), vec![b'x'; 8192]).unwrap();

        // The pipe holds far less than the response and the peer never reads.
        let (mut client, server) = duplex(256);
        client
            .write_all(b"{\"type\":\"file\",\"path\":\"big\",\"limit\":8192}\n")
            .await
            .unwrap();

        let dispatcher = dispatcher(dir.path());
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(server, "l", "r"),
        )
        .await
        .expect("dispatch should give up on a stalled reader");
        assert_eq!(state, DispatchState::Closed);
    }
}
