//! Stdio server: one JSON-RPC message per line on stdin/stdout.
//!
//! A single controller task owns the session: it reads request lines,
//! forwards agent events through the session's emitter, and notices when a
//! turn finishes. The agent core moves into a spawned task for the length
//! of a turn and comes back when the turn ends. Every outgoing line goes
//! through one writer task that flushes after each write.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use taor_agent::AgentCore;
use taor_core::agent::{AgentSettings, CancelFlag, TurnOutcome};
use taor_core::approval::{ApprovalBroker, ApprovalDecision};
use taor_core::error::{ProviderError, SessionError};
use taor_core::event::{AgentEvent, EventSink};
use taor_core::provider::Provider;
use taor_core::session::SessionStore;
use taor_core::tool::ToolRegistry;
use taor_emitter::UiEmitter;
use taor_protocol::{
    ClientRequest, Command, Envelope, InitializeParams, InitializeResult, PROTOCOL_VERSION,
    PromptAnswerParams, PromptKind, ProtocolError, Response, ServerNotification,
    SessionLoadResult, to_line,
};
use taor_telemetry::PricingTable;
use taor_tools::ResultStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::lines::spawn_line_writer;

/// Builds the backend for a session from the names in `initialize`.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        provider: &str,
        model: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&str, Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync,
{
    fn create(
        &self,
        provider: &str,
        model: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        self(provider, model)
    }
}

type TurnTask = JoinHandle<(AgentCore, taor_core::Result<TurnOutcome>)>;

/// Everything a session is built from. Shared by all sessions of a process.
pub struct StdioServer {
    factory: Arc<dyn ProviderFactory>,
    tools: Arc<ToolRegistry>,
    store: Arc<ResultStore>,
    sessions: Arc<dyn SessionStore>,
    pricing: Arc<PricingTable>,
    settings: AgentSettings,
    default_provider: String,
}

impl StdioServer {
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        tools: Arc<ToolRegistry>,
        store: Arc<ResultStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            factory,
            tools,
            store,
            sessions,
            pricing: Arc::new(PricingTable::with_defaults()),
            settings: AgentSettings::default(),
            default_provider: "anthropic".into(),
        }
    }

    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Agent settings for new sessions; `initialize` still picks the
    /// approval policy.
    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Serve on the process's stdin and stdout until EOF or `shutdown`.
    pub async fn run_stdio(self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run(stdin, tokio::io::stdout()).await
    }

    /// Serve on any line reader and writer.
    pub async fn run<R, W>(self, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out, writer_task) = spawn_line_writer(writer);
        let mut controller = Controller {
            server: self,
            out,
            session: None,
            events: None,
            turn: None,
            shutdown: false,
        };

        info!("Protocol server started");
        let mut lines = reader.lines();
        let mut read_error = None;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        controller.handle_line(&line).await;
                        if controller.shutdown {
                            info!("Shutdown requested");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        read_error = Some(e);
                        break;
                    }
                },
                Some(event) = next_event(&mut controller.events) => controller.forward(event),
                joined = join_turn(&mut controller.turn) => controller.turn_finished(joined),
            }
        }

        controller.close().await;
        drop(controller);
        // The writer exits once every sender is gone.
        if let Err(e) = writer_task.await {
            error!(error = %e, "Writer task failed");
        }

        match read_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<AgentEvent>>,
) -> Option<AgentEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn join_turn(
    turn: &mut Option<TurnTask>,
) -> Result<(AgentCore, taor_core::Result<TurnOutcome>), JoinError> {
    match turn {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// One initialized session.
struct Session {
    /// `None` while a turn task owns it
    core: Option<AgentCore>,
    emitter: UiEmitter,
    broker: Arc<ApprovalBroker>,
    cancel: CancelFlag,
    sink: EventSink,
    /// Prompts shown to the renderer and not yet answered
    prompts: HashMap<String, PromptKind>,
}

struct Controller {
    server: StdioServer,
    out: mpsc::UnboundedSender<String>,
    session: Option<Session>,
    events: Option<mpsc::UnboundedReceiver<AgentEvent>>,
    turn: Option<TurnTask>,
    shutdown: bool,
}

impl Controller {
    async fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let request = match Envelope::parse(line) {
            Ok(Envelope::Request(request)) => request,
            Ok(Envelope::Notification(n)) => {
                debug!(method = %n.method, "Ignoring notification from client");
                return;
            }
            Ok(Envelope::Response(_)) => {
                debug!("Ignoring response from client");
                return;
            }
            Err(e) => {
                let id = match e {
                    ProtocolError::Parse(_) => Value::Null,
                    _ => Envelope::salvage_id(line),
                };
                warn!(error = %e, "Rejected malformed message");
                self.respond(Response::failure(id, e.to_rpc()));
                return;
            }
        };

        debug!(id = %request.id, method = %request.method, "Request received");
        let result = match ClientRequest::parse(&request.method, request.params) {
            Ok(parsed) => self.dispatch(parsed).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => self.respond(Response::success(request.id, value)),
            Err(e) => {
                warn!(method = %request.method, error = %e, "Request failed");
                self.respond(Response::failure(request.id, e.to_rpc()));
            }
        }
    }

    async fn dispatch(&mut self, request: ClientRequest) -> Result<Value, ProtocolError> {
        match request {
            ClientRequest::Initialize(params) => self.initialize(params).await,
            ClientRequest::MessageSend(params) => {
                self.start_turn(params.text)?;
                Ok(json!({ "accepted": true }))
            }
            ClientRequest::CommandSend(params) => self.command(&params.command).await,
            ClientRequest::PromptAnswer(params) => self.answer(params),
            ClientRequest::SessionLoad(params) => self.load_session(&params.session_id).await,
            ClientRequest::Shutdown => {
                self.shutdown = true;
                Ok(json!({}))
            }
        }
    }

    async fn initialize(&mut self, params: InitializeParams) -> Result<Value, ProtocolError> {
        if self.session.is_some() {
            return Err(ProtocolError::InvalidRequest(
                "session already initialized".into(),
            ));
        }

        let server = &self.server;
        let provider_name = params
            .provider
            .clone()
            .unwrap_or_else(|| server.default_provider.clone());
        let provider = server
            .factory
            .create(&provider_name, params.model.as_deref())
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

        let broker = Arc::new(ApprovalBroker::new());
        let settings = AgentSettings {
            approval: params.approval_policy,
            ..server.settings.clone()
        };
        let mut core = AgentCore::new(provider, server.tools.clone(), server.store.clone())
            .with_settings(settings)
            .with_approval_gate(broker.clone())
            .with_pricing(server.pricing.clone());

        if let Some(id) = &params.resume_session {
            let conversation = server.sessions.load(id).await.map_err(session_error)?;
            core.restore(conversation);
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION,
            session_id: core.conversation().id.to_string(),
            provider: provider_name,
            model: core.provider().model().to_string(),
            approval_policy: params.approval_policy,
            tools: server.tools.names().into_iter().map(String::from).collect(),
            message_count: core.history().len(),
        };
        info!(
            session_id = %result.session_id,
            provider = %result.provider,
            model = %result.model,
            resumed = params.resume_session.is_some(),
            "Session initialized"
        );

        let (sink, rx) = EventSink::channel();
        self.events = Some(rx);
        self.session = Some(Session {
            core: Some(core),
            emitter: UiEmitter::new(),
            broker,
            cancel: CancelFlag::new(),
            sink,
            prompts: HashMap::new(),
        });

        Ok(serde_json::to_value(result)?)
    }

    fn start_turn(&mut self, text: String) -> Result<(), ProtocolError> {
        if self.turn.is_some() {
            return Err(ProtocolError::Busy("a turn is already running".into()));
        }
        let session = self.session_mut()?;
        let mut core = session
            .core
            .take()
            .ok_or_else(|| ProtocolError::Internal("agent core unavailable".into()))?;
        session.cancel.reset();
        session.prompts.clear();

        let sink = session.sink.clone();
        let cancel = session.cancel.clone();
        self.turn = Some(tokio::spawn(async move {
            let result = core.run_turn(&text, &sink, &cancel).await;
            (core, result)
        }));
        Ok(())
    }

    fn turn_finished(
        &mut self,
        joined: Result<(AgentCore, taor_core::Result<TurnOutcome>), JoinError>,
    ) {
        self.turn = None;

        // Everything the turn emitted is already queued; render it first.
        let mut remaining = Vec::new();
        if let Some(rx) = self.events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                remaining.push(event);
            }
        }
        for event in remaining {
            self.forward(event);
        }

        match joined {
            Ok((core, result)) => {
                match &result {
                    Ok(outcome) => debug!(?outcome, "Turn finished"),
                    Err(e) => debug!(error = %e, "Turn failed"),
                }
                if let Some(session) = self.session.as_mut() {
                    session.core = Some(core);
                    session
                        .prompts
                        .retain(|_, kind| *kind != PromptKind::Approval);
                }
            }
            Err(e) => {
                error!(error = %e, "Turn task aborted, dropping session");
                self.notify(ServerNotification::TurnFailed {
                    message: format!("internal error: {e}"),
                });
                self.session = None;
                self.events = None;
            }
        }
    }

    async fn command(&mut self, input: &str) -> Result<Value, ProtocolError> {
        let command = Command::parse(input).ok_or_else(|| {
            let known: Vec<&str> = Command::ALL.iter().map(|c| c.as_str()).collect();
            ProtocolError::InvalidParams(format!(
                "unknown command '{input}', expected one of {}",
                known.join(", ")
            ))
        })?;
        let running = self.turn.is_some();
        let tools = self.server.tools.clone();
        let sessions = self.server.sessions.clone();
        let session = self.session_mut()?;

        match command {
            Command::Cancel => {
                if running {
                    info!("Cancelling running turn");
                    session.cancel.cancel();
                    session.broker.deny_all();
                }
                Ok(json!({ "cancelled": running }))
            }
            Command::Cost => {
                let usage = session.emitter.session_usage();
                Ok(json!({
                    "session_cost": session.emitter.session_cost(),
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "cache_read_tokens": usage.cache_read_tokens,
                    "cache_creation_tokens": usage.cache_creation_tokens,
                }))
            }
            Command::Tools => {
                let listed: Vec<Value> = tools
                    .definitions()
                    .into_iter()
                    .map(|d| json!({ "name": d.name, "description": d.description }))
                    .collect();
                Ok(json!({ "tools": listed }))
            }
            Command::Clear => {
                let core = idle_core(session, running)?;
                core.clear();
                let session_id = core.conversation().id.to_string();
                session.prompts.clear();
                Ok(json!({ "session_id": session_id }))
            }
            Command::Save => {
                let core = idle_core(session, running)?;
                sessions
                    .save(core.conversation())
                    .await
                    .map_err(session_error)?;
                Ok(json!({
                    "session_id": core.conversation().id.to_string(),
                    "message_count": core.history().len(),
                }))
            }
        }
    }

    fn answer(&mut self, params: PromptAnswerParams) -> Result<Value, ProtocolError> {
        let running = self.turn.is_some();
        let session = self.session_mut()?;
        let kind = *session.prompts.get(&params.prompt_id).ok_or_else(|| {
            ProtocolError::InvalidParams(format!("no pending prompt '{}'", params.prompt_id))
        })?;

        match kind {
            PromptKind::Approval => {
                let decision = ApprovalDecision::parse(&params.answer).ok_or_else(|| {
                    ProtocolError::InvalidParams(format!(
                        "answer '{}' is not one of yes, no, always",
                        params.answer
                    ))
                })?;
                session.prompts.remove(&params.prompt_id);
                let resolved = session.broker.resolve(&params.prompt_id, decision);
                info!(prompt_id = %params.prompt_id, ?decision, resolved, "Approval answered");
                Ok(json!({ "resolved": resolved }))
            }
            PromptKind::PlanConfirmation => {
                if running {
                    return Err(ProtocolError::Busy(
                        "answer the plan once the current turn has finished".into(),
                    ));
                }
                session.prompts.remove(&params.prompt_id);
                info!(prompt_id = %params.prompt_id, "Plan answered, starting turn");
                self.start_turn(params.answer)?;
                Ok(json!({ "accepted": true }))
            }
        }
    }

    async fn load_session(&mut self, session_id: &str) -> Result<Value, ProtocolError> {
        let running = self.turn.is_some();
        let sessions = self.server.sessions.clone();
        let session = self.session_mut()?;
        let core = idle_core(session, running)?;

        let conversation = sessions.load(session_id).await.map_err(session_error)?;
        core.restore(conversation);
        let result = SessionLoadResult {
            session_id: core.conversation().id.to_string(),
            message_count: core.history().len(),
        };
        session.prompts.clear();
        Ok(serde_json::to_value(result)?)
    }

    /// Route one agent event through the emitter to the output.
    fn forward(&mut self, event: AgentEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for notification in session.emitter.handle(event) {
            if let ServerNotification::PromptShow(prompt) = &notification {
                session.prompts.insert(prompt.prompt_id.clone(), prompt.kind);
            }
            match notification.to_line() {
                Ok(line) => {
                    let _ = self.out.send(line);
                }
                Err(e) => error!(error = %e, "Failed to encode notification"),
            }
        }
    }

    fn notify(&self, notification: ServerNotification) {
        match notification.to_line() {
            Ok(line) => {
                let _ = self.out.send(line);
            }
            Err(e) => error!(error = %e, "Failed to encode notification"),
        }
    }

    fn respond(&self, response: Response) {
        match to_line(&response) {
            Ok(line) => {
                let _ = self.out.send(line);
            }
            Err(e) => error!(error = %e, "Failed to encode response"),
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session, ProtocolError> {
        self.session.as_mut().ok_or(ProtocolError::NotInitialized)
    }

    /// Stop a running turn and wait for it so its last events get out.
    async fn close(&mut self) {
        if let Some(session) = self.session.as_ref() {
            session.cancel.cancel();
            session.broker.deny_all();
        }
        if let Some(handle) = self.turn.take() {
            let joined = handle.await;
            self.turn_finished(joined);
        }
    }
}

fn idle_core(session: &mut Session, running: bool) -> Result<&mut AgentCore, ProtocolError> {
    if running {
        return Err(ProtocolError::Busy("a turn is running".into()));
    }
    session
        .core
        .as_mut()
        .ok_or_else(|| ProtocolError::Internal("agent core unavailable".into()))
}

fn session_error(e: SessionError) -> ProtocolError {
    match e {
        SessionError::NotFound(id) => {
            ProtocolError::InvalidParams(format!("session not found: {id}"))
        }
        SessionError::Storage(msg) => ProtocolError::Internal(msg),
    }
}
