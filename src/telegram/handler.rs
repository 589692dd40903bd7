use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction};
use teloxide::update_listeners::webhooks;
use tracing::{error, info};

use crate::agent::AgentLoop;
use crate::config::Config;
use crate::history::{History, HistoryError, TurnRecord};
use crate::provider::OpenAiProvider;
use crate::tools::ToolServerClient;

use super::formatter;

const DENIED: &str = "Access denied.";

struct AppState {
    provider: OpenAiProvider,
    history: History,
    config: Config,
}

pub async fn run_bot(config: Config, history: History) {
    let bot = Bot::new(&config.telegram_bot_token);

    let provider = OpenAiProvider::new(
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        config.llm_api_key.clone(),
    );

    let state = Arc::new(AppState {
        provider,
        history,
        config: config.clone(),
    });

    info!(
        "Bot started. Model: {}, tool servers: {}, allowed users: {:?}",
        config.llm_model,
        config.tool_servers.len(),
        config.allowed_users
    );

    // Register bot commands menu in Telegram
    let commands = vec![
        BotCommand::new("start", "Greeting & bot status"),
        BotCommand::new("clear", "Delete your conversation history"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        error!("Failed to set bot commands: {e}");
    }

    let handler = Update::filter_message().endpoint(handle_message);

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .build();

    match &config.webhook_host {
        Some(host) => {
            let addr = ([0, 0, 0, 0], config.port).into();
            let url: url::Url = format!("https://{host}/webhook")
                .parse()
                .expect("invalid WEBHOOK_HOST");
            info!("Listening for webhook updates on port {}", config.port);
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url))
                .await
                .expect("failed to register webhook");
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("Webhook listener error"),
                )
                .await;
        }
        None => {
            info!("Polling for updates");
            dispatcher.dispatch().await;
        }
    }
}

/// Run a history operation off the dispatcher thread; file and git I/O block.
async fn run_blocking<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, HistoryError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(format!("history task failed: {err}")),
    }
}

async fn handle_message(msg: Message, bot: Bot, state: Arc<AppState>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Ok(()),
    };

    // Allow-list gate: the sender's public handle is the transcript identity.
    // Unauthorized senders (including those without a username) get a fixed
    // denial and cause no transcript or agent interaction.
    let username = msg.from.as_ref().and_then(|u| u.username.clone());
    let user = match username {
        Some(name) if state.config.is_allowed(&name) => name,
        _ => {
            bot.send_message(msg.chat.id, DENIED).await?;
            return Ok(());
        }
    };

    match text.split_whitespace().next().unwrap_or("") {
        "/start" => handle_start(&msg, &bot, &state).await,
        "/clear" => handle_clear(&msg, &bot, &state, &user).await,
        _ => handle_turn(&msg, &bot, &state, &user, text).await,
    }
}

async fn handle_start(msg: &Message, bot: &Bot, state: &Arc<AppState>) -> ResponseResult<()> {
    bot.send_message(
        msg.chat.id,
        format!(
            "Hi! I'm listening.\n\n\
            Model: {}\n\
            Every conversation is journaled to Git.\n\
            /clear wipes your history.",
            state.config.llm_model
        ),
    )
    .await?;
    Ok(())
}

async fn handle_clear(
    msg: &Message,
    bot: &Bot,
    state: &Arc<AppState>,
    user: &str,
) -> ResponseResult<()> {
    let st = state.clone();
    let identity = user.to_string();
    match run_blocking(move || st.history.clear(&identity)).await {
        Ok(()) => {
            info!("Cleared history for {user}");
            bot.send_message(msg.chat.id, "History cleared and pushed.")
                .await?;
        }
        Err(err) => {
            error!("Failed to clear history for {user}: {err}");
            bot.send_message(msg.chat.id, format!("❌ Error: {err}"))
                .await?;
        }
    }
    Ok(())
}

async fn handle_turn(
    msg: &Message,
    bot: &Bot,
    state: &Arc<AppState>,
    user: &str,
    text: String,
) -> ResponseResult<()> {
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;
    let progress = bot.send_message(msg.chat.id, "⏳ Working...").await?;
    let progress_id = progress.id;

    // Typing indicator loop while the agent runs
    let bot_typing = bot.clone();
    let chat_id = msg.chat.id;
    let typing_active = Arc::new(AtomicBool::new(true));
    let typing_flag = typing_active.clone();
    let typing_handle = tokio::spawn(async move {
        while typing_flag.load(Ordering::Relaxed) {
            let _ = bot_typing.send_chat_action(chat_id, ChatAction::Typing).await;
            tokio::time::sleep(std::time::Duration::from_secs(4)).await;
        }
    });

    let result = run_turn(state, user, &text).await;

    typing_active.store(false, Ordering::Relaxed);
    typing_handle.abort();

    match result {
        Ok(reply) => {
            let chunks = formatter::split_message(&reply, 4096);
            if let Some(first) = chunks.first() {
                formatter::safe_edit(bot, msg.chat.id, progress_id, first).await;
            }
            for chunk in chunks.iter().skip(1) {
                formatter::safe_send(bot, msg.chat.id, chunk).await;
            }

            // Persist the exchange only after the reply went out; a publish
            // failure surfaces as a follow-up error message.
            let st = state.clone();
            let identity = user.to_string();
            let records = vec![TurnRecord::user(text), TurnRecord::assistant(reply)];
            if let Err(err) = run_blocking(move || st.history.save(&identity, &records)).await {
                error!("Failed to save history for {user}: {err}");
                let _ = bot
                    .send_message(msg.chat.id, format!("❌ Failed to save history: {err}"))
                    .await;
            }
        }
        Err(err) => {
            error!("Agent error for {user}: {err}");
            formatter::safe_edit(bot, msg.chat.id, progress_id, &format!("❌ Error: {err}")).await;
        }
    }

    Ok(())
}

/// Load the transcript, discover tools, run the agent. Returns the reply text.
async fn run_turn(state: &Arc<AppState>, user: &str, text: &str) -> Result<String, String> {
    let st = state.clone();
    let identity = user.to_string();
    let turns = run_blocking(move || st.history.load(&identity)).await?;

    let tool_client = ToolServerClient::discover(&state.config.tool_servers).await;

    let start = std::time::Instant::now();
    let result = AgentLoop::run(
        &state.provider,
        &state.config.system_prompt,
        &turns,
        text,
        &tool_client,
        state.config.max_agent_turns,
    )
    .await?;

    info!(
        "Replied to {user} in {:.1}s (tools: {:?})",
        start.elapsed().as_secs_f64(),
        result.tools_used
    );
    Ok(result.response)
}
