//! Broker wire format and the blocking client used by the CLI.
//!
//! One command per connection: the client writes a single JSON line, closes
//! its write half, and reads a single JSON reply line.
//!
//! ```text
//! {"cmd":"status"}                      → {"reply":"status","running":true,"boards":[…]}
//! {"cmd":"start"}                       → {"reply":"started","boards":[…every board…]}
//! {"cmd":"start","boards":["uno","x"]}  → {"reply":"started","boards":[…listed…]}
//! {"cmd":"stop"}                        → {"reply":"stopping"}
//! anything else                         → {"reply":"error","message":"…"}
//! ```

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use boardhub_core::BoardId;

use crate::board::{BoardState, BoardStatus};
use crate::error::{io_err, HubError};

/// A command sent to a running orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BrokerCommand {
    Status,
    /// Start the listed boards, or every registered board when empty.
    Start {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        boards: Vec<BoardId>,
    },
    Stop,
}

/// What a running orchestrator answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum BrokerReply {
    Status(HubStatus),
    Started { boards: Vec<StartedBoard> },
    Stopping,
    Error { message: String },
}

impl BrokerReply {
    pub fn error(message: impl Into<String>) -> Self {
        BrokerReply::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatus {
    pub running: bool,
    pub boards: Vec<BoardStatus>,
}

/// Outcome of one board in a `start` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedBoard {
    pub id: BoardId,
    pub state: BoardState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartedBoard {
    pub fn is_started(&self) -> bool {
        self.error.is_none()
    }
}

/// Blocking client for the broker socket.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    socket: PathBuf,
    patience: Duration,
}

impl BrokerClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            patience: Duration::ZERO,
        }
    }

    /// How long to keep waiting for the socket to accept connections, for
    /// callers racing a freshly launched orchestrator.
    pub fn with_patience(mut self, patience: Duration) -> Self {
        self.patience = patience;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn status(&self) -> Result<HubStatus, HubError> {
        match self.call(&BrokerCommand::Status)? {
            BrokerReply::Status(status) => Ok(status),
            other => Err(unexpected("status", other)),
        }
    }

    /// Starts `boards`, or every registered board when the list is empty.
    pub fn start(&self, boards: Vec<BoardId>) -> Result<Vec<StartedBoard>, HubError> {
        match self.call(&BrokerCommand::Start { boards })? {
            BrokerReply::Started { boards } => Ok(boards),
            other => Err(unexpected("start", other)),
        }
    }

    pub fn stop(&self) -> Result<(), HubError> {
        match self.call(&BrokerCommand::Stop)? {
            BrokerReply::Stopping => Ok(()),
            other => Err(unexpected("stop", other)),
        }
    }

    /// Sends one command and reads its reply. Error replies become
    /// [`HubError::BrokerRejected`].
    pub fn call(&self, command: &BrokerCommand) -> Result<BrokerReply, HubError> {
        let mut stream = self.connect()?;

        let mut line = serde_json::to_vec(command)?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .and_then(|()| stream.shutdown(Shutdown::Write))
            .map_err(|e| io_err(&self.socket, e))?;

        let mut reply = String::new();
        BufReader::new(stream)
            .read_line(&mut reply)
            .map_err(|e| io_err(&self.socket, e))?;
        if reply.trim().is_empty() {
            return Err(HubError::Protocol(
                "broker closed the connection without replying".to_string(),
            ));
        }

        match serde_json::from_str(reply.trim_end())? {
            BrokerReply::Error { message } => Err(HubError::BrokerRejected(message)),
            reply => Ok(reply),
        }
    }

    fn connect(&self) -> Result<UnixStream, HubError> {
        let deadline = Instant::now() + self.patience;
        loop {
            match UnixStream::connect(&self.socket) {
                Ok(stream) => return Ok(stream),
                Err(err) if is_absent(&err) => {
                    if Instant::now() >= deadline {
                        return Err(HubError::BrokerNotRunning {
                            socket: self.socket.clone(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(err) => return Err(io_err(&self.socket, err)),
            }
        }
    }
}

fn is_absent(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}

fn unexpected(command: &str, reply: BrokerReply) -> HubError {
    HubError::Protocol(format!("unexpected reply to {command}: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn commands_use_cmd_tag() {
        let encoded = |command: BrokerCommand| serde_json::to_value(command).expect("encode");
        assert_eq!(encoded(BrokerCommand::Status), json!({ "cmd": "status" }));
        assert_eq!(
            encoded(BrokerCommand::Start { boards: Vec::new() }),
            json!({ "cmd": "start" })
        );
        assert_eq!(
            encoded(BrokerCommand::Start {
                boards: vec![BoardId::from("uno")]
            }),
            json!({ "cmd": "start", "boards": ["uno"] })
        );
    }

    #[test]
    fn start_without_boards_decodes_as_start_all() {
        let command: BrokerCommand = serde_json::from_str(r#"{"cmd":"start"}"#).expect("decode");
        assert_eq!(command, BrokerCommand::Start { boards: Vec::new() });
    }

    #[test]
    fn unknown_command_does_not_decode() {
        assert!(serde_json::from_str::<BrokerCommand>(r#"{"cmd":"reboot"}"#).is_err());
    }

    #[test]
    fn status_reply_is_flat() {
        let reply = BrokerReply::Status(HubStatus {
            running: true,
            boards: vec![BoardStatus {
                id: BoardId::from("uno"),
                state: BoardState::Ready,
                port: Some(4000),
            }],
        });
        assert_eq!(
            serde_json::to_value(&reply).expect("encode"),
            json!({
                "reply": "status",
                "running": true,
                "boards": [{ "id": "uno", "state": "ready", "port": 4000 }]
            })
        );
    }

    #[test]
    fn missing_socket_is_not_running() {
        let dir = TempDir::new().expect("tempdir");
        let client = BrokerClient::new(dir.path().join("broker.sock"));
        let err = client.status().unwrap_err();
        assert!(matches!(err, HubError::BrokerNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn patience_waits_before_giving_up() {
        let dir = TempDir::new().expect("tempdir");
        let client = BrokerClient::new(dir.path().join("broker.sock"))
            .with_patience(Duration::from_millis(200));
        let started = Instant::now();
        assert!(client.stop().is_err());
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
