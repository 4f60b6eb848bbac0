use std::borrow::Cow::{self, Borrowed, Owned};
use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use super::models::print_models;
use super::utils::{GlobalOptions, TerminalNotifier, open_session, print_diagnostic};
use kako_application::{SessionSync, SyncUpdate};
use kako_core::channel::{ChannelEvent, ChannelKind, ServerFrame};
use kako_core::chat::{MessageRole, StreamMessage};
use kako_infrastructure::init_logging;

const COMMANDS: [&str; 10] = [
    "/help",
    "/models",
    "/model",
    "/tools",
    "/tool",
    "/clear",
    "/history",
    "/session",
    "/status",
    "/reconnect",
];

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    Models,
    /// Select a model; `None` returns to the server default.
    SelectModel(Option<String>),
    Tools,
    ToggleTool(String),
    Clear,
    History(String),
    Session,
    Status,
    Reconnect,
    Unknown(String),
    Usage(&'static str),
    Send(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line == "quit" || line == "exit" {
            return Some(ReplCommand::Quit);
        }
        if !line.starts_with('/') {
            return Some(ReplCommand::Send(line.to_string()));
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        let parsed = match (command, argument) {
            ("/help", _) => ReplCommand::Help,
            ("/models", _) => ReplCommand::Models,
            ("/model", "") => ReplCommand::Usage("/model <id> | /model default"),
            ("/model", "default") => ReplCommand::SelectModel(None),
            ("/model", id) => ReplCommand::SelectModel(Some(id.to_string())),
            ("/tools", _) => ReplCommand::Tools,
            ("/tool", "") => ReplCommand::Usage("/tool <name>"),
            ("/tool", name) => ReplCommand::ToggleTool(name.to_string()),
            ("/clear", _) => ReplCommand::Clear,
            ("/history", "") => ReplCommand::Usage("/history <session id>"),
            ("/history", id) => ReplCommand::History(id.to_string()),
            ("/session", _) => ReplCommand::Session,
            ("/status", _) => ReplCommand::Status,
            ("/reconnect", _) => ReplCommand::Reconnect,
            (other, _) => ReplCommand::Unknown(other.to_string()),
        };
        Some(parsed)
    }
}

/// rustyline helper completing and highlighting slash commands.
struct ChatHelper;

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }

        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for ChatHelper {}

/// Runs the interactive chat.
///
/// Streamed replies and task notifications are printed by a background
/// task as they are applied, so they can appear while the prompt waits.
pub async fn run(options: &GlobalOptions, session: Option<String>) -> Result<()> {
    let config = options.load_config()?;
    let (diagnostics_tx, mut diagnostics) = mpsc::unbounded_channel();
    init_logging(&config.log_level, Some(diagnostics_tx))?;

    let sync = Arc::new(open_session(options, &config, Some(Arc::new(TerminalNotifier)))?);
    let mut updates = sync.subscribe();

    println!("{}", "=== Kako Chat ===".bright_magenta().bold());
    println!("{}", format!("Connecting to {}", config.server_url).bright_black());
    sync.start().await?;

    if let Some(id) = &session {
        load_history(&sync, id).await;
    }

    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => render_update(&update),
                    Err(RecvError::Lagged(missed)) => {
                        eprintln!("{}", format!("({} updates not shown)", missed).bright_black());
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(diagnostic) = diagnostics.recv() => print_diagnostic(&diagnostic),
            }
        }
    });

    println!(
        "{}",
        "Type a message to chat, '/help' for commands, or 'quit' to exit.".bright_black()
    );
    println!();

    let mut rl = Editor::<ChatHelper, DefaultHistory>::new()?;
    rl.set_helper(Some(ChatHelper));

    loop {
        let readline = tokio::task::block_in_place(|| rl.readline(">> "));

        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        };

        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };
        let _ = rl.add_history_entry(line.trim());

        if command == ReplCommand::Quit {
            println!("{}", "Goodbye!".bright_green());
            break;
        }
        execute(&sync, command).await;
    }

    sync.shutdown();
    printer.abort();
    Ok(())
}

async fn execute(sync: &SessionSync, command: ReplCommand) {
    match command {
        ReplCommand::Send(content) => {
            if !sync.send_chat(&content, None).await {
                println!(
                    "{}",
                    "Not connected; message not sent. Try /reconnect.".yellow()
                );
            }
        }
        ReplCommand::Help => {
            for command in COMMANDS {
                println!("  {}", command.bright_cyan());
            }
        }
        ReplCommand::Models => {
            if let Err(e) = sync.refresh_models().await {
                println!("{}", format!("Could not refresh models: {}", e).yellow());
            }
            let engine = sync.read().await;
            print_models(&engine.store().model_options(), engine.store().selected_model());
        }
        ReplCommand::SelectModel(model) => {
            let id = model.as_deref().unwrap_or("");
            if sync.select_model(id).await {
                let shown = model.as_deref().unwrap_or("server default");
                println!("{}", format!("Model: {}", shown).green());
            } else {
                println!("{}", format!("Unknown model '{}'. See /models.", id).yellow());
            }
        }
        ReplCommand::Tools => {
            let engine = sync.read().await;
            let store = engine.store();
            if store.available_tools().is_empty() {
                println!("{}", "No tools reported by the backend".bright_black());
            }
            for tool in store.available_tools() {
                let enabled = store.enabled_tools().contains(tool);
                let marker = if enabled { "on ".green() } else { "off".red() };
                println!("  {} {}", marker, tool);
            }
        }
        ReplCommand::ToggleTool(name) => match sync.toggle_tool(&name).await {
            Ok(true) => println!("{}", format!("{} enabled", name).green()),
            Ok(false) => println!("{}", format!("{} disabled", name).yellow()),
            Err(e) => println!("{}", e.to_string().yellow()),
        },
        ReplCommand::Clear => {
            sync.clear_messages().await;
            println!("{}", "Conversation cleared".bright_black());
        }
        ReplCommand::History(id) => load_history(sync, &id).await,
        ReplCommand::Session => {
            let engine = sync.read().await;
            match engine.store().active_session_id() {
                Some(id) => println!("{}", id),
                None => println!("{}", "No active session".bright_black()),
            }
        }
        ReplCommand::Status => {
            for channel in ChannelKind::ALL {
                let state = sync.status(channel);
                println!(
                    "  {:<6} {} (attempt {})",
                    channel.to_string(),
                    state.status,
                    state.attempt
                );
            }
        }
        ReplCommand::Reconnect => {
            for channel in ChannelKind::ALL {
                if let Err(e) = sync.reconnect(channel).await {
                    println!("{}", format!("{} channel: {}", channel, e).yellow());
                }
            }
        }
        ReplCommand::Unknown(command) => {
            println!("{}", format!("Unknown command {}", command).bright_black());
        }
        ReplCommand::Usage(usage) => println!("{}", format!("Usage: {}", usage).bright_black()),
        ReplCommand::Quit => {}
    }
}

async fn load_history(sync: &SessionSync, session_id: &str) {
    match sync.fetch_history(session_id).await {
        Ok(true) => {
            let engine = sync.read().await;
            for message in engine.store().messages() {
                print_message(message);
            }
        }
        Ok(false) => println!("{}", "A reply is streaming; try again when it ends.".yellow()),
        Err(e) => println!("{}", format!("Could not load history: {}", e).yellow()),
    }
}

fn print_message(message: &StreamMessage) {
    match message.role {
        MessageRole::User => println!("{}", format!("> {}", message.content).green()),
        MessageRole::Assistant => {
            for line in message.content.lines() {
                println!("{}", line.bright_blue());
            }
        }
        MessageRole::System => println!("{}", message.content.bright_black()),
    }
}

fn render_update(update: &SyncUpdate) {
    match (&update.event, update.channel) {
        (ChannelEvent::Message(frame), ChannelKind::Chat) => render_chat_frame(frame),
        (ChannelEvent::Message(ServerFrame::TaskCreated { task }), ChannelKind::Tasks) => {
            let title = task.patch.title.as_deref().unwrap_or("");
            println!("{}", format!("New task #{} {}", task.id, title).bright_black());
        }
        (ChannelEvent::Disconnected { reason }, channel) => {
            println!(
                "{}",
                format!("{} channel lost ({}), reconnecting", channel, reason).yellow()
            );
        }
        (ChannelEvent::PermanentlyDisconnected { attempts }, channel) => {
            println!(
                "{}",
                format!(
                    "{} channel disconnected after {} attempts. Use /reconnect.",
                    channel, attempts
                )
                .red()
            );
        }
        _ => {}
    }
}

fn render_chat_frame(frame: &ServerFrame) {
    match frame {
        ServerFrame::StreamStart => println!(),
        ServerFrame::StreamToken { content } => {
            print!("{}", content.bright_blue());
            let _ = std::io::stdout().flush();
        }
        ServerFrame::ToolCall(call) => {
            println!();
            println!(
                "{}",
                format!("  [{}] {:?}", call.name, call.status).bright_magenta()
            );
        }
        ServerFrame::StreamEnd { error, .. } => {
            println!();
            if let Some(error) = error.as_deref().filter(|e| !e.is_empty()) {
                println!("{}", format!("error: {}", error).red());
            }
        }
        ServerFrame::Message { role, content } => {
            print_message(&StreamMessage::complete(*role, content.clone()));
        }
        ServerFrame::Error { content } => println!("{}", format!("error: {}", content).red()),
        _ => {}
    }
}
