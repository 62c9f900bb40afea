//! Telegram Bot Interface
//!
//! TigerStyle: Thin chat front end over the [`Backend`].
//!
//! Features:
//! - Session and member lookups (/session, /member)
//! - Drinks logged against a session (/drinks)
//! - Random quotes (/quote)
//! - Forced reload of every table (/reload)

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use teloxide::prelude::*;
use teloxide::types::User;
use tokio::sync::RwLock;

use crate::backend::{Backend, UserRef, SESSION_INDEX_DEFAULT};
use crate::entity::Entity;
use crate::error::{BackendError, ErrorKind};
use crate::reference::Reference;
use crate::table::Table;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Rate limit messages per minute
pub const RATE_LIMIT_MESSAGES_PER_MINUTE: u32 = 20;

/// Session column holding the session date
pub const SESSION_DATE_FIELD: &str = "Date";

/// Drink column linking to its session
pub const DRINK_SESSION_FIELD: &str = "Sessions";

/// Drink column linking to the member who had it
pub const DRINK_MEMBER_FIELD: &str = "Members";

/// Quote column holding the quote text
pub const QUOTE_TEXT_FIELD: &str = "Quote";

/// Get allowed chat IDs from environment
fn get_allowed_chats() -> Vec<i64> {
    std::env::var("ALLOWED_TELEGRAM_CHATS")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|id| id.trim().parse::<i64>().ok())
                .collect()
        })
        .unwrap_or_default() // Empty = no chats allowed (secure default)
}

/// Check if a chat is allowed to use the bot
fn is_chat_allowed(chat_id: i64) -> bool {
    get_allowed_chats().contains(&chat_id)
}

// =============================================================================
// State
// =============================================================================

/// Per-user state
#[derive(Debug, Default)]
struct UserState {
    /// Last message timestamps for rate limiting
    message_times: Vec<std::time::Instant>,
}

/// Bot state
struct BotState {
    /// Data access
    backend: Backend,
    /// Per-user state
    user_states: RwLock<HashMap<i64, UserState>>,
}

// =============================================================================
// Bot Entry Point
// =============================================================================

/// Run the Telegram bot
pub async fn run_telegram_bot(backend: Backend) -> anyhow::Result<()> {
    let token = std::env::var("TELEGRAM_BOT_TOKEN")
        .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN not set"))?;

    // Warm the cache so the first command answers quickly.
    if let Err(e) = backend.tables(true, &[]).await {
        tracing::warn!(error = %e, "initial table load failed");
    }

    let state = Arc::new(BotState {
        backend,
        user_states: RwLock::new(HashMap::new()),
    });

    let bot = Bot::new(token);

    let allowed_chats = get_allowed_chats();
    if allowed_chats.is_empty() {
        tracing::error!(
            "ALLOWED_TELEGRAM_CHATS is empty - the bot will not answer anywhere! \
            Set it to the club chat id."
        );
    } else {
        tracing::info!(
            "Starting Club Ledger bot for {} chat(s): {:?}",
            allowed_chats.len(),
            allowed_chats
        );
    }

    let bot_state = state.clone();
    let handler = Update::filter_message()
        .filter_map(|msg: Message| {
            let text = msg.text()?.to_string();
            Some((msg, text))
        })
        .endpoint(move |bot: Bot, (msg, text): (Message, String)| {
            let state = bot_state.clone();
            async move {
                handle_message(state, bot, msg, text).await;
                Ok::<(), std::convert::Infallible>(())
            }
        });

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// =============================================================================
// Message Handling
// =============================================================================

/// Handle incoming message
async fn handle_message(state: Arc<BotState>, bot: Bot, msg: Message, text: String) {
    if !text.starts_with('/') {
        return;
    }

    let chat_id = msg.chat.id;
    let Some(user) = msg.from() else {
        tracing::warn!("Ignoring command without a sender");
        return;
    };
    let user = user_ref(user);

    if !is_chat_allowed(chat_id.0) {
        tracing::warn!(chat_id = chat_id.0, "Ignoring command from unauthorized chat");
        return;
    }

    // Rate limiting
    {
        let mut states = state.user_states.write().await;
        let user_state = states.entry(user.id).or_default();

        let now = std::time::Instant::now();
        user_state
            .message_times
            .retain(|t| now.duration_since(*t).as_secs() < 60);

        if user_state.message_times.len() >= RATE_LIMIT_MESSAGES_PER_MINUTE as usize {
            let _ = bot
                .send_message(chat_id, "Rate limit exceeded. Please wait a moment.")
                .await;
            return;
        }
        user_state.message_times.push(now);
    }

    let reply = handle_command(&state.backend, user, &text).await;
    if let Err(e) = bot.send_message(chat_id, reply).await {
        tracing::error!(error = %e, "Failed to send Telegram message");
    }
}

/// Convert a Telegram user into the lookup form the backend understands.
fn user_ref(user: &User) -> UserRef {
    UserRef {
        id: i64::try_from(user.id.0).unwrap_or(i64::MAX),
        username: user.username.clone(),
        display_name: user.full_name(),
    }
}

/// Run a command and produce the reply text.
async fn handle_command(backend: &Backend, user: UserRef, text: &str) -> String {
    assert!(text.starts_with('/'), "command must start with /");

    let (command, args) = match text.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (text, ""),
    };
    // Group chats address commands as /cmd@botname.
    let command = command.split('@').next().unwrap_or(command);

    let result = match command {
        "/start" | "/help" => Ok(help_text()),
        "/session" => session_reply(backend, args).await,
        "/member" => member_reply(backend, user, args).await,
        "/drinks" => drinks_reply(backend, args).await,
        "/quote" => quote_reply(backend).await,
        "/reload" => reload_reply(backend).await,
        _ => Ok("Unknown command. Use /help to see available commands.".to_string()),
    };

    result.unwrap_or_else(|e| describe_error(&e))
}

fn help_text() -> String {
    "Commands:\n\n\
    /session [index] - Show a session (default: latest, -2 for the one before)\n\
    /member [name] - Look up a member (default: you)\n\
    /drinks [index] - Drinks logged in a session\n\
    /quote - A random quote\n\
    /reload - Reload everything from the data source\n\
    /help - Show this help"
        .to_string()
}

async fn session_reply(backend: &Backend, args: &str) -> Result<String, BackendError> {
    let index = if args.is_empty() { SESSION_INDEX_DEFAULT } else { args };
    let session = backend.session(index).await?;
    Ok(describe_session(&session))
}

async fn member_reply(backend: &Backend, user: UserRef, args: &str) -> Result<String, BackendError> {
    let member = if args.is_empty() {
        backend.member(user).await?
    } else {
        backend.member(args).await?
    };

    let mut reply = member.label();
    for field in crate::backend::MEMBER_IDENTITY_FIELDS {
        if *field == crate::entity::DISPLAY_FIELD {
            continue;
        }
        if let Some(value) = member.text(field) {
            reply.push_str(&format!("\n{field}: {value}"));
        }
    }
    Ok(reply)
}

async fn drinks_reply(backend: &Backend, args: &str) -> Result<String, BackendError> {
    let index = if args.is_empty() { SESSION_INDEX_DEFAULT } else { args };
    let session = backend.session(index).await?;

    let listings = backend.tables(true, &["Drinks", "Members"]).await?;
    let [drinks, members] = <[Vec<Entity>; 2]>::try_from(listings)
        .map_err(|_| BackendError::decode("expected two listings"))?;

    let names: HashMap<&str, String> = members.iter().map(|m| (m.id.as_str(), m.label())).collect();
    let in_session: Vec<&Entity> = drinks
        .iter()
        .filter(|d| links_to(d, DRINK_SESSION_FIELD, &session))
        .collect();

    if in_session.is_empty() {
        return Ok(format!("No drinks logged for {}.", describe_session(&session)));
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for drink in in_session.iter() {
        let drinker = drink
            .references(DRINK_MEMBER_FIELD)
            .first()
            .map_or_else(|| "unknown".to_string(), |r| display_reference(r, &names));
        match counts.iter_mut().find(|(name, _)| *name == drinker) {
            Some((_, n)) => *n += 1,
            None => counts.push((drinker, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut reply = format!(
        "{} drinks for {}:\n",
        in_session.len(),
        describe_session(&session)
    );
    for (name, n) in counts {
        reply.push_str(&format!("- {name}: {n}\n"));
    }
    Ok(reply)
}

async fn quote_reply(backend: &Backend) -> Result<String, BackendError> {
    let quotes = backend.table(Table::Quotes.as_str(), None, true).await?;
    let quote = quotes
        .choose(&mut rand::thread_rng())
        .and_then(|q| q.text(QUOTE_TEXT_FIELD));
    Ok(quote.unwrap_or_else(|| "No quotes yet.".to_string()))
}

async fn reload_reply(backend: &Backend) -> Result<String, BackendError> {
    let listings = backend.tables(false, &[]).await?;
    let rows: usize = listings.iter().map(Vec::len).sum();
    Ok(format!("Reloaded {} tables ({rows} rows).", listings.len()))
}

// =============================================================================
// Rendering
// =============================================================================

fn describe_session(session: &Entity) -> String {
    match session.text(SESSION_DATE_FIELD) {
        Some(date) => format!("{} ({date})", session.label()),
        None => session.label(),
    }
}

/// Whether `entity`'s link column `field` points at `target`.
fn links_to(entity: &Entity, field: &str, target: &Entity) -> bool {
    entity
        .references(field)
        .iter()
        .any(|r| r.resolve(true) == target.id)
}

/// Display text for a reference, looking bare ids up in `names`.
fn display_reference(reference: &Reference, names: &HashMap<&str, String>) -> String {
    match reference {
        Reference::Direct(id) => names.get(id.as_str()).cloned().unwrap_or_else(|| id.clone()),
        Reference::Linked { .. } => reference.resolve(false).to_string(),
    }
}

/// User-facing text for a failed command.
fn describe_error(error: &BackendError) -> String {
    match error.kind() {
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Ambiguity => error.to_string(),
        ErrorKind::Transport | ErrorKind::Mutation => {
            tracing::error!(error = %error, "command failed");
            "Sorry, the ledger is unavailable right now. Please try again.".to_string()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
