//! parley - local-first terminal chat client
//!
//! Chats and messages live in a local SQLite database; replies come from an
//! OpenAI-compatible completion endpoint (OpenRouter by default).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/parley/chats.db (~/.local/share/parley/chats.db)
//! - Logs: $XDG_STATE_HOME/parley/parley.log (~/.local/state/parley/parley.log)
//! - Config: $XDG_CONFIG_HOME/parley/config.toml (~/.config/parley/config.toml)

mod message_format;
mod terminal;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parley_core::{
    parse_location, ChatSession, CompletionGateway, Config, Database, OpenRouterClient,
    ScriptedDialogs, SendOutcome, SkipReason, SqliteStore, StaticIdentity, RECENT_CHATS_LIMIT,
};

use crate::terminal::{TerminalDialogs, UnconfiguredGateway};

const PREVIEW_CHARS: usize = 72;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Local-first chat client for completion models")]
#[command(version)]
struct Args {
    /// Identity to act as (overrides config and PARLEY_EMAIL)
    #[arg(long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List chats, most recently active first
    List,
    /// Create a chat (prompts for a name when none is given)
    New { name: Option<String> },
    /// Delete a chat and its messages
    Delete {
        #[arg(value_parser = parse_chat_ref)]
        chat: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print a chat's messages (accepts an id or /chats/{id})
    Show {
        #[arg(value_parser = parse_chat_ref)]
        chat: i64,
    },
    /// The most recently active chats with their messages
    Recent {
        #[arg(long, default_value_t = RECENT_CHATS_LIMIT)]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send one message to a chat and print the reply
    Send {
        #[arg(value_parser = parse_chat_ref)]
        chat: i64,
        text: String,
    },
    /// Interactive chat (default)
    Chat {
        #[arg(value_parser = parse_chat_ref)]
        chat: Option<i64>,
    },
}

/// Accept `42` or `/chats/42`.
fn parse_chat_ref(value: &str) -> std::result::Result<i64, String> {
    value
        .trim()
        .parse()
        .ok()
        .or_else(|| parse_location(value))
        .ok_or_else(|| format!("expected a chat id or /chats/<id>, got {:?}", value))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(email) = args.email {
        config.identity.email = Some(email);
    }

    // Initialize logging (to file, stdout belongs to the conversation)
    let _log_guard =
        parley_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("parley starting");

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let gateway: Arc<dyn CompletionGateway> = match OpenRouterClient::new(&config.completion) {
        Ok(client) => {
            tracing::info!(model = %client.model(), "Completion endpoint configured");
            Arc::new(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Completion endpoint not configured");
            Arc::new(UnconfiguredGateway::new(e.to_string()))
        }
    };

    let session = ChatSession::new(
        &StaticIdentity::from(&config.identity),
        Arc::new(SqliteStore::new(db)),
        gateway,
        &config.auth,
    )
    .context("no usable identity; pass --email or set PARLEY_EMAIL")?;
    session.start().await;

    let result = match args.command.unwrap_or(Command::Chat { chat: None }) {
        Command::List => list(&session),
        Command::New { name } => new_chat(&session, name).await,
        Command::Delete { chat, yes } => delete(&session, chat, yes).await,
        Command::Show { chat } => open(&session, chat).await,
        Command::Recent { limit, json } => recent(&session, limit, json).await,
        Command::Send { chat, text } => send(&session, chat, &text).await,
        Command::Chat { chat } => run_repl(&session, chat).await,
    };

    tracing::info!("parley shutting down");
    result
}

fn list(session: &ChatSession) -> Result<()> {
    let chats = session.chats();
    if chats.is_empty() {
        println!("No chats yet. Create one with `parley new`.");
        return Ok(());
    }
    let current = session.list().current_chat_id();
    for chat in &chats {
        println!("{}", message_format::chat_row(chat, current == Some(chat.id)));
    }
    Ok(())
}

async fn new_chat(session: &ChatSession, name: Option<String>) -> Result<()> {
    let created = match name {
        Some(name) => session.create(Some(&name)).await,
        None => session.create_with_prompt(&TerminalDialogs).await,
    };
    let Some(chat_id) = created else {
        bail!("chat was not created");
    };
    let chat = session
        .list()
        .find(chat_id)
        .with_context(|| format!("chat {} missing after create", chat_id))?;
    println!("Created chat {}: {}", chat.id, chat.name);
    Ok(())
}

async fn delete(session: &ChatSession, chat_id: i64, yes: bool) -> Result<()> {
    ensure_listed(session, chat_id)?;

    let deleted = if yes {
        session.delete(chat_id, &ScriptedDialogs::accepting()).await
    } else {
        session.delete(chat_id, &TerminalDialogs).await
    };

    if deleted {
        println!("Deleted chat {}", chat_id);
    } else {
        println!("Chat {} kept", chat_id);
    }
    Ok(())
}

async fn recent(session: &ChatSession, limit: usize, json: bool) -> Result<()> {
    let recent = session
        .recent_chats(limit)
        .await
        .context("failed to load recent chats")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recent)?);
        return Ok(());
    }

    if recent.is_empty() {
        println!("No chats yet.");
    }
    for entry in &recent {
        println!("{}", message_format::recent_chat(entry, PREVIEW_CHARS));
    }
    Ok(())
}

async fn send(session: &ChatSession, chat_id: i64, text: &str) -> Result<()> {
    ensure_listed(session, chat_id)?;
    session.select(Some(chat_id)).await;

    match session.send(text).await {
        SendOutcome::Replied => {
            print_last_message(session);
            Ok(())
        }
        SendOutcome::NoReply => {
            println!("(no response)");
            Ok(())
        }
        SendOutcome::Failed(reason) => {
            print_last_message(session);
            bail!("could not get response: {}", reason)
        }
        SendOutcome::Skipped(SkipReason::EmptyInput) => bail!("message is empty"),
        SendOutcome::Skipped(reason) => bail!("message not sent: {:?}", reason),
    }
}

/// Select a listed chat and print its history.
async fn open(session: &ChatSession, chat_id: i64) -> Result<()> {
    let chat = ensure_listed(session, chat_id)?;
    session.select(Some(chat_id)).await;

    println!("{}", message_format::chat_heading(&chat));
    let messages = session.pipeline().messages();
    if messages.is_empty() {
        println!("(no messages)");
    }
    for msg in &messages {
        println!("{}", message_format::display_message(msg));
    }
    Ok(())
}

fn ensure_listed(session: &ChatSession, chat_id: i64) -> Result<parley_core::Chat> {
    session
        .list()
        .find(chat_id)
        .with_context(|| format!("chat {} not found", chat_id))
}

fn print_last_message(session: &ChatSession) {
    if let Some(msg) = session.pipeline().messages().last() {
        println!("{}", message_format::display_message(msg));
    }
}

// ============================================
// Interactive mode
// ============================================

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Quit,
    Help,
    List,
    New(Option<String>),
    Open(String),
    Delete(Option<String>),
    Unknown(String),
    Message(String),
}

fn parse_repl(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ReplCommand::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (command, None),
    };

    match (name, arg) {
        ("quit" | "q" | "exit", _) => ReplCommand::Quit,
        ("help" | "?", _) => ReplCommand::Help,
        ("list" | "ls", _) => ReplCommand::List,
        ("new", name) => ReplCommand::New(name),
        ("open", Some(target)) => ReplCommand::Open(target),
        ("open", None) => ReplCommand::Help,
        ("delete" | "rm", target) => ReplCommand::Delete(target),
        (location, None) if location.starts_with("chats/") => {
            ReplCommand::Open(trimmed.to_string())
        }
        (other, _) => ReplCommand::Unknown(other.to_string()),
    }
}

const REPL_HELP: &str = "\
Commands:
  /list            list chats
  /new [NAME]      create a chat and open it
  /open ID         open a chat (ID or /chats/ID)
  /delete [ID]     delete a chat (the open one by default)
  /quit            leave
Anything else is sent to the open chat.";

async fn run_repl(session: &ChatSession, start: Option<i64>) -> Result<()> {
    if let Some(chat_id) = start {
        open(session, chat_id).await?;
    }
    println!("Signed in as {}. Type /help for commands.", session.user_email());

    let stdin = io::stdin();
    loop {
        print!("{}> ", session.location());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match parse_repl(line.trim_end_matches(['\r', '\n'])) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", REPL_HELP),
            ReplCommand::List => list(session)?,
            ReplCommand::New(name) => {
                let created = match name {
                    Some(name) => session.create(Some(&name)).await,
                    None => session.create_with_prompt(&TerminalDialogs).await,
                };
                match created {
                    Some(chat_id) => println!("Opened new chat {}", chat_id),
                    None => println!("No chat created."),
                }
            }
            ReplCommand::Open(target) => match parse_chat_ref(&target) {
                Ok(chat_id) => {
                    if let Err(e) = open(session, chat_id).await {
                        println!("{}", e);
                    }
                }
                Err(e) => println!("{}", e),
            },
            ReplCommand::Delete(target) => {
                let chat_id = match target {
                    Some(target) => parse_chat_ref(&target).ok(),
                    None => session.list().current_chat_id(),
                };
                match chat_id {
                    Some(chat_id) if session.delete(chat_id, &TerminalDialogs).await => {
                        println!("Deleted chat {}", chat_id)
                    }
                    Some(_) => println!("Nothing deleted."),
                    None => println!("No chat to delete."),
                }
            }
            ReplCommand::Unknown(name) => println!("Unknown command /{}. Try /help.", name),
            ReplCommand::Message(text) => {
                session.pipeline().set_input(text);
                match session.submit().await {
                    SendOutcome::Replied | SendOutcome::Failed(_) => print_last_message(session),
                    SendOutcome::NoReply => println!("(no response)"),
                    SendOutcome::Skipped(SkipReason::NoChat) => {
                        println!("No chat open. Use /new or /open ID.")
                    }
                    SendOutcome::Skipped(_) => {}
                }
            }
        }
    }

    Ok(())
}
