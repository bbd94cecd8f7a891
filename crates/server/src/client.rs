//! Parent-side client for a `taor serve` child process.
//!
//! Requests are correlated with responses by id. Each request waits at
//! most the client's timeout, independent of how many iterations the agent
//! runs; when the child exits every pending request fails at once.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use taor_protocol::{
    ClientRequest, CommandSendParams, Envelope, InitializeParams, InitializeResult,
    MessageSendParams, PromptAnswerParams, ProtocolError, Request, Response, RpcError,
    ServerNotification, SessionLoadParams, SessionLoadResult, to_line,
};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::lines::spawn_line_writer;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to start server process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Server process exited")]
    Closed,

    #[error("Request '{method}' timed out after {}s", timeout.as_secs_f64())]
    Timeout { method: String, timeout: Duration },

    #[error("Server error: {0}")]
    Rpc(RpcError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

type Pending = Arc<DashMap<u64, oneshot::Sender<Response>>>;

pub struct StdioClient {
    out: mpsc::UnboundedSender<String>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    timeout: Duration,
    notifications: mpsc::UnboundedReceiver<ServerNotification>,
    child: Option<Child>,
}

impl StdioClient {
    /// Start `command` and talk to it over its stdin/stdout. The child's
    /// stderr is inherited so its logs stay visible.
    pub fn spawn(mut command: Command) -> Result<Self, ClientError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(ClientError::Spawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ClientError::Spawn(std::io::Error::other(
                "child process has no stdio pipes",
            )));
        };
        info!(pid = ?child.id(), "Started server process");

        let mut client = Self::connect(BufReader::new(stdout), stdin);
        client.child = Some(child);
        Ok(client)
    }

    /// Talk to a server over an already-open pair of streams.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out, _writer_task) = spawn_line_writer(writer);
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (notify_tx, notifications) = mpsc::unbounded_channel();

        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => dispatch_line(&line, &reader_pending, &notify_tx),
                    Ok(None) => {
                        debug!("Server closed its output");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read from server");
                        break;
                    }
                }
            }
            // Mark closed before failing waiters so no new request slips in.
            reader_closed.store(true, Ordering::SeqCst);
            reader_pending.clear();
        });

        Self {
            out,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            notifications,
            child: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, request: &ClientRequest) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = to_line(&Request::new(id, request.method(), request.params()?))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.is_closed() || self.out.send(line).is_err() {
            self.pending.remove(&id);
            return Err(ClientError::Closed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(ClientError::Rpc),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                warn!(id, method = request.method(), "Request timed out");
                Err(ClientError::Timeout {
                    method: request.method().to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    pub async fn initialize(
        &self,
        params: InitializeParams,
    ) -> Result<InitializeResult, ClientError> {
        let value = self.request(&ClientRequest::Initialize(params)).await?;
        decode(value)
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<Value, ClientError> {
        self.request(&ClientRequest::MessageSend(MessageSendParams { text: text.into() }))
            .await
    }

    pub async fn command(&self, command: impl Into<String>) -> Result<Value, ClientError> {
        self.request(&ClientRequest::CommandSend(CommandSendParams {
            command: command.into(),
        }))
        .await
    }

    pub async fn answer(
        &self,
        prompt_id: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Value, ClientError> {
        self.request(&ClientRequest::PromptAnswer(PromptAnswerParams {
            prompt_id: prompt_id.into(),
            answer: answer.into(),
        }))
        .await
    }

    pub async fn load_session(
        &self,
        session_id: impl Into<String>,
    ) -> Result<SessionLoadResult, ClientError> {
        let value = self
            .request(&ClientRequest::SessionLoad(SessionLoadParams {
                session_id: session_id.into(),
            }))
            .await?;
        decode(value)
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(&ClientRequest::Shutdown).await.map(|_| ())
    }

    /// Next notification, or `None` once the server is gone.
    pub async fn next_notification(&mut self) -> Option<ServerNotification> {
        self.notifications.recv().await
    }

    /// Wait for the child process, if this client started one.
    pub async fn wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.wait().await.map(Some),
            None => Ok(None),
        }
    }
}

fn dispatch_line(
    line: &str,
    pending: &Pending,
    notify: &mpsc::UnboundedSender<ServerNotification>,
) {
    if line.trim().is_empty() {
        return;
    }
    match Envelope::parse(line) {
        Ok(Envelope::Response(response)) => {
            let waiter = response
                .id
                .as_u64()
                .and_then(|id| pending.remove(&id))
                .map(|(_, tx)| tx);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => warn!(id = %response.id, "Response for unknown request"),
            }
        }
        Ok(Envelope::Notification(raw)) => match ServerNotification::try_from(raw) {
            Ok(notification) => {
                let _ = notify.send(notification);
            }
            Err(e) => warn!(error = %e, "Unrecognized notification"),
        },
        Ok(Envelope::Request(request)) => {
            debug!(method = %request.method, "Ignoring request from server");
        }
        Err(e) => warn!(error = %e, "Unreadable line from server"),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.into()))
}
