//! `taor chat`: interactive chat in the terminal.
//!
//! Runs the agent in-process and draws the same notifications the stdio
//! server would send, reading approval and plan answers from stdin.

use std::io::Write;
use std::sync::Arc;

use taor_agent::AgentCore;
use taor_config::AppConfig;
use taor_core::agent::{AgentSettings, ApprovalPolicy, CancelFlag, TurnOutcome};
use taor_core::approval::{ApprovalBroker, ApprovalDecision};
use taor_core::event::EventSink;
use taor_core::session::SessionStore;
use taor_emitter::UiEmitter;
use taor_protocol::{Card, Command, Prompt, PromptKind, ServerNotification};
use taor_server::{FileSessionStore, ProviderFactory};
use taor_tools::ResultStore;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use super::setup::{ConfiguredFactory, pricing_table, tool_registry};
use crate::BackendArgs;

type Input = Lines<BufReader<Stdin>>;

pub async fn run(
    config: AppConfig,
    backend: BackendArgs,
    auto_approve: bool,
    resume: Option<String>,
) -> anyhow::Result<()> {
    let factory = ConfiguredFactory::from_env(config.clone());
    let provider_name = factory.select(backend.provider.as_deref())?;
    let provider = factory.create(&provider_name, backend.model.as_deref())?;

    let store = Arc::new(ResultStore::new());
    let tools = Arc::new(tool_registry(store.clone())?);
    let sessions = FileSessionStore::new(config.sessions_dir());
    let broker = Arc::new(ApprovalBroker::new());
    let policy = if auto_approve {
        ApprovalPolicy::Auto
    } else {
        config.agent.approval
    };

    let mut core = AgentCore::new(provider, tools, store)
        .with_settings(AgentSettings {
            approval: policy,
            ..config.agent.clone()
        })
        .with_approval_gate(broker.clone())
        .with_pricing(Arc::new(pricing_table(&config)));

    if let Some(id) = &resume {
        let conversation = sessions.load(id).await?;
        core.restore(conversation);
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         TAOR Agent — Interactive Mode        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {provider_name}");
    println!("  Model:     {}", core.provider().model());
    println!("  Tools:     {}", core.tools().names().join(", "));
    println!("  Approval:  {policy:?}");
    println!("  Session:   {} ({} messages)", core.conversation().id, core.history().len());
    println!();
    println!("  Commands: /cost /tools /clear /save. Ctrl+C cancels a running turn.");
    println!("  Type 'exit' to quit.");
    println!();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut emitter = UiEmitter::new();
    let (sink, mut events) = EventSink::channel();
    let cancel = CancelFlag::new();
    // A confirmed plan is sent as the next message.
    let mut queued: Option<String> = None;

    loop {
        let line = match queued.take() {
            Some(line) => line,
            None => {
                print!("  You > ");
                std::io::stdout().flush()?;
                match input.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }
        if text.starts_with('/') {
            command(text, &mut core, &sessions).await;
            continue;
        }

        cancel.reset();
        let mut view = TurnView::default();
        {
            let turn = core.run_turn(text, &sink, &cancel);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => {
                        if let Err(e) = result {
                            debug!(error = %e, "Turn ended with an error");
                        }
                        break;
                    }
                    Some(event) = events.recv() => {
                        for notification in emitter.handle(event) {
                            view.show(notification, &mut input, &broker).await?;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("\n  Cancelling...");
                        cancel.cancel();
                        broker.deny_all();
                    }
                }
            }
        }
        while let Ok(event) = events.try_recv() {
            for notification in emitter.handle(event) {
                view.show(notification, &mut input, &broker).await?;
            }
        }

        if view.plan_pending {
            queued = ask_plan(&mut input).await?;
        }
    }

    println!();
    println!("  {}", core.session_cost().summary());
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

async fn command(text: &str, core: &mut AgentCore, sessions: &FileSessionStore) {
    match Command::parse(text) {
        Some(Command::Cancel) => println!("  Nothing is running."),
        Some(Command::Clear) => {
            core.clear();
            println!("  Started a new conversation ({}).", core.conversation().id);
        }
        Some(Command::Cost) => println!("  {}", core.session_cost().summary()),
        Some(Command::Tools) => {
            for def in core.tools().definitions() {
                println!("  {:<20} {}", def.name, def.description);
            }
        }
        Some(Command::Save) => match sessions.save(core.conversation()).await {
            Ok(()) => {
                let id = &core.conversation().id;
                println!("  Saved session {id}. Resume with: taor chat --resume {id}");
            }
            Err(e) => eprintln!("  [Error] {e}"),
        },
        None => {
            let known: Vec<&str> = Command::ALL.iter().map(|c| c.as_str()).collect();
            println!("  Unknown command. Try one of: {}", known.join(" "));
        }
    }
}

/// Terminal state for one turn.
#[derive(Default)]
struct TurnView {
    /// Mid-line after streamed text
    in_text: bool,
    plan_pending: bool,
}

impl TurnView {
    async fn show(
        &mut self,
        notification: ServerNotification,
        input: &mut Input,
        broker: &ApprovalBroker,
    ) -> std::io::Result<()> {
        if let ServerNotification::TextDelta { text } = &notification {
            if !self.in_text {
                print!("\n  Assistant > ");
                self.in_text = true;
            }
            print!("{text}");
            return std::io::stdout().flush();
        }
        if self.in_text {
            println!();
            self.in_text = false;
        }

        match notification {
            ServerNotification::PromptShow(prompt) if prompt.kind == PromptKind::Approval => {
                let decision = ask_approval(&prompt, input).await?;
                broker.resolve(&prompt.prompt_id, decision);
            }
            ServerNotification::PromptShow(_) => self.plan_pending = true,
            other => {
                if let Some(line) = render(&other) {
                    println!("{line}");
                }
            }
        }
        Ok(())
    }
}

async fn ask_approval(prompt: &Prompt, input: &mut Input) -> std::io::Result<ApprovalDecision> {
    if let Some(args) = &prompt.arguments {
        println!("  🔐 {} {args}", prompt.message);
    } else {
        println!("  🔐 {}", prompt.message);
    }
    loop {
        print!("  [{}] > ", prompt.options.join("/"));
        std::io::stdout().flush()?;
        let Some(answer) = input.next_line().await? else {
            return Ok(ApprovalDecision::Deny);
        };
        match ApprovalDecision::parse(&answer) {
            Some(decision) => return Ok(decision),
            None => println!("  Please answer {}.", prompt.options.join(", ")),
        }
    }
}

/// Ask about the plan shown this turn; the answer becomes the next message.
async fn ask_plan(input: &mut Input) -> std::io::Result<Option<String>> {
    print!("  Proceed with this plan? [yes/no/or type changes] > ");
    std::io::stdout().flush()?;
    Ok(input
        .next_line()
        .await?
        .map(|answer| answer.trim().to_string())
        .filter(|answer| !answer.is_empty()))
}

/// One terminal line for a notification, if it draws anything.
fn render(notification: &ServerNotification) -> Option<String> {
    match notification {
        ServerNotification::TurnStarted {} => None,
        ServerNotification::TextDelta { text } => Some(text.clone()),
        ServerNotification::PlanCard { plan } => {
            let mut out = String::from("  📋 Plan\n");
            for line in plan.lines() {
                out.push_str(&format!("  │ {line}\n"));
            }
            out.pop();
            Some(out)
        }
        ServerNotification::PromptShow(prompt) => Some(format!("  ? {}", prompt.message)),
        ServerNotification::ToolStarted { verb, .. } => Some(format!("  ⚙ {verb}...")),
        ServerNotification::ToolResult {
            card, duration_ms, ..
        } => Some(format!("    {} ({duration_ms} ms)", describe(card))),
        ServerNotification::Notice { message } => Some(format!("  ⚠ {message}")),
        ServerNotification::CostUpdate(update) => Some(match update.turn_cost {
            Some(cost) => format!(
                "  💰 ${cost:.4} this turn, ${:.4} this session",
                update.session_cost
            ),
            None => format!(
                "  💰 {} in / {} out tokens (no pricing for this model)",
                update.input_tokens, update.output_tokens
            ),
        }),
        ServerNotification::TurnCompleted { outcome, .. } => match outcome {
            TurnOutcome::Done => None,
            TurnOutcome::MaxIterations => Some("  ⏹ Stopped at the iteration limit.".into()),
            TurnOutcome::Cancelled => Some("  ⏹ Cancelled.".into()),
        },
        ServerNotification::TurnFailed { message } => Some(format!("  [Error] {message}")),
    }
}

fn describe(card: &Card) -> String {
    match card {
        Card::Error { message } => format!("✗ {message}"),
        Card::Metrics { algorithm, metrics } => format!("✓ {algorithm}: {metrics}"),
        Card::Material {
            material_id,
            formula,
            ..
        } => format!("✓ {formula} ({material_id})"),
        Card::Figure { path, caption } => match caption {
            Some(caption) => format!("✓ {caption}: {path}"),
            None => format!("✓ figure saved to {path}"),
        },
        Card::StoredResult {
            result_id,
            total_size,
            ..
        } => format!("✓ {total_size} bytes stored as {result_id}"),
        Card::Table {
            columns,
            total_rows,
            ..
        } => format!("✓ {total_rows} rows [{}]", columns.join(", ")),
        Card::Success { summary } => format!("✓ {summary}"),
    }
}
