use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{Instant, sleep};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor socket {0} did not come up within the connect deadline")]
    NotReady(String),
    #[error("monitor io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("monitor command failed: {0}")]
    CommandFailed(String),
    #[error("malformed monitor response: {0}")]
    Malformed(String),
}

/// Stateless client for a single emulator's QMP-style monitor socket. Every
/// command opens its own connection, does the qmp_capabilities handshake,
/// sends one line-delimited JSON command, and reads one reply line.
pub struct MonitorClient;

impl MonitorClient {
    /// Polls `socket_path` until a connection succeeds or the deadline elapses.
    pub async fn wait_ready(socket_path: &Path) -> Result<(), MonitorError> {
        let deadline = Instant::now() + CONNECT_DEADLINE;
        loop {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MonitorError::NotReady(socket_path.display().to_string()));
            }
            sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }

    async fn connect_and_handshake(socket_path: &Path) -> Result<BufReader<UnixStream>, MonitorError> {
        let stream = UnixStream::connect(socket_path).await?;
        let mut reader = BufReader::new(stream);

        // Greeting line, then negotiate capabilities.
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        let cmd = json!({"execute": "qmp_capabilities"});
        Self::write_line(&mut reader, &cmd).await?;
        let mut reply = String::new();
        reader.read_line(&mut reply).await?;
        Ok(reader)
    }

    async fn write_line(reader: &mut BufReader<UnixStream>, value: &Value) -> Result<(), MonitorError> {
        let mut payload = serde_json::to_vec(value).map_err(|e| MonitorError::Malformed(e.to_string()))?;
        payload.push(b'\n');
        reader.get_mut().write_all(&payload).await?;
        Ok(())
    }

    async fn exec_command(socket_path: &Path, command: Value) -> Result<Value, MonitorError> {
        let mut reader = Self::connect_and_handshake(socket_path).await?;
        Self::write_line(&mut reader, &command).await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let reply: Value =
            serde_json::from_str(&line).map_err(|e| MonitorError::Malformed(e.to_string()))?;

        if let Some(err) = reply.get("error") {
            return Err(MonitorError::CommandFailed(err.to_string()));
        }
        Ok(reply)
    }

    pub async fn stop(socket_path: &Path) -> Result<(), MonitorError> {
        Self::exec_command(socket_path, json!({"execute": "stop"})).await?;
        Ok(())
    }

    pub async fn cont(socket_path: &Path) -> Result<(), MonitorError> {
        Self::exec_command(socket_path, json!({"execute": "cont"})).await?;
        Ok(())
    }

    pub async fn quit(socket_path: &Path) -> Result<(), MonitorError> {
        Self::exec_command(socket_path, json!({"execute": "quit"})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// A minimal stand-in for the emulator's QMP server: accepts one
    /// connection at a time (matching the client's one-command-per-connection
    /// discipline), sends the greeting, echoes `{"return":{}}` to
    /// `qmp_capabilities`, then replies `reply` to the single command that
    /// follows before the connection closes.
    async fn fake_emulator(socket_path: std::path::PathBuf, reply: Value) {
        let listener = UnixListener::bind(&socket_path).unwrap();
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            if write_half.write_all(b"{\"QMP\":{}}\n").await.is_err() {
                continue;
            }

            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                continue;
            }
            if write_half.write_all(b"{\"return\":{}}\n").await.is_err() {
                continue;
            }

            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                continue;
            }
            let mut payload = serde_json::to_vec(&reply).unwrap();
            payload.push(b'\n');
            let _ = write_half.write_all(&payload).await;
        }
    }

    #[tokio::test]
    async fn wait_ready_times_out_when_socket_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("never.sock");
        let result =
            tokio::time::timeout(Duration::from_secs(6), MonitorClient::wait_ready(&socket_path)).await;
        assert!(matches!(result, Ok(Err(MonitorError::NotReady(_)))));
    }

    #[tokio::test]
    async fn stop_round_trips_through_handshake_and_reply() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("qmp.sock");
        tokio::spawn(fake_emulator(socket_path.clone(), json!({"return": {}})));

        MonitorClient::wait_ready(&socket_path).await.unwrap();
        MonitorClient::stop(&socket_path).await.unwrap();
    }

    #[tokio::test]
    async fn command_failure_surfaces_as_command_failed() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("qmp.sock");
        tokio::spawn(fake_emulator(
            socket_path.clone(),
            json!({"error": {"class": "GenericError", "desc": "no"}}),
        ));

        MonitorClient::wait_ready(&socket_path).await.unwrap();
        let result = MonitorClient::quit(&socket_path).await;
        assert!(matches!(result, Err(MonitorError::CommandFailed(_))));
    }
}
