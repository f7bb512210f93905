//! Per-event behaviour: direct messages, mentions, assistant threads, App Home.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::api::{ReplyMessage, SlackApi};
use super::events::{HomeOpenedEvent, MessageEvent, SlackEvent, ThreadStartedEvent};
use super::home::home_view;
use crate::agent::{window, Agent, ThreadMessage, THREAD_HISTORY_LIMIT};
use crate::analytics::{
    AnalyticsSink, EVENT_APP_MENTION, EVENT_DIRECT_MESSAGE, EVENT_HOME_OPENED,
    EVENT_THREAD_STARTED,
};
use crate::{Error, Result};

pub const DM_APOLOGY: &str = "Sorry, I encountered an error while processing your message.";
pub const MENTION_APOLOGY: &str = "Sorry, I encountered an error while processing your mention.";
pub const THINKING_STATUS: &str = "is thinking...";

/// The bot's own user id, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    user_id: String,
    mention: Regex,
}

impl BotIdentity {
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let mention = Regex::new(&format!(r"<@{}(\|[^>]*)?>", regex::escape(&user_id)))
            .map_err(|e| Error::Other(format!("Invalid mention pattern: {}", e)))?;
        Ok(Self { user_id, mention })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Remove this bot's `<@ID>` (or `<@ID|name>`) token from `text`.
    pub fn strip_mention(&self, text: &str) -> String {
        self.mention.replace_all(text, "").trim().to_string()
    }
}

/// Turn thread replies into agent history.
///
/// Keeps at most [`THREAD_HISTORY_LIMIT`] of the most recent replies. A reply
/// carrying `bot_id` is the assistant's. `strip` removes that bot's mention
/// token from every message. With no replies the history is the triggering
/// text alone.
pub fn build_history(
    replies: &[ReplyMessage],
    strip: Option<&BotIdentity>,
    trigger_text: &str,
) -> Vec<ThreadMessage> {
    let history: Vec<ThreadMessage> = replies
        .iter()
        .map(|reply| {
            let text = match strip {
                Some(identity) => identity.strip_mention(&reply.text),
                None => reply.text.clone(),
            };
            if reply.from_bot() {
                ThreadMessage::assistant(text)
            } else {
                ThreadMessage::human(text)
            }
        })
        .collect();

    if history.is_empty() {
        vec![ThreadMessage::human(trigger_text)]
    } else {
        window(&history).to_vec()
    }
}

/// Shared, read-only state every event task works with.
#[derive(Clone)]
pub struct EventHandler {
    api: Arc<dyn SlackApi>,
    agent: Arc<Agent>,
    analytics: Arc<dyn AnalyticsSink>,
    identity: Arc<OnceLock<BotIdentity>>,
}

impl EventHandler {
    pub fn new(
        api: Arc<dyn SlackApi>,
        agent: Arc<Agent>,
        analytics: Arc<dyn AnalyticsSink>,
        identity: Arc<OnceLock<BotIdentity>>,
    ) -> Self {
        Self {
            api,
            agent,
            analytics,
            identity,
        }
    }

    pub fn api(&self) -> &Arc<dyn SlackApi> {
        &self.api
    }

    /// Handle one event. Never fails: errors are logged here.
    pub async fn dispatch(&self, event: SlackEvent) {
        let result = match event {
            SlackEvent::Message(msg) if msg.is_direct_message() => {
                self.handle_direct_message(msg).await
            }
            SlackEvent::AppMention(msg) => self.handle_mention(msg).await,
            SlackEvent::AssistantThreadStarted(started) => {
                self.handle_thread_started(started).await;
                Ok(())
            }
            SlackEvent::AppHomeOpened(home) => self.handle_home_opened(home).await,
            SlackEvent::Message(msg) => {
                debug!(
                    "Ignoring message in {} (type {:?}, subtype {:?})",
                    msg.channel, msg.channel_type, msg.subtype
                );
                Ok(())
            }
            SlackEvent::Other => {
                debug!("Ignoring unhandled event");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Failed to deliver reply: {}", e);
        }
    }

    async fn handle_direct_message(&self, msg: MessageEvent) -> Result<()> {
        info!("Direct message from {} in {}", msg.user_id(), msg.channel);
        self.analytics
            .track(msg.user_id(), EVENT_DIRECT_MESSAGE, json!({ "channel": msg.channel }))
            .await;

        let reply = match self.reply_to(&msg, None).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error handling direct message: {}", e);
                DM_APOLOGY.to_string()
            }
        };

        self.api
            .post_message(&msg.channel, &reply, msg.thread_ts.as_deref())
            .await
    }

    async fn handle_mention(&self, msg: MessageEvent) -> Result<()> {
        info!("Mention from {} in {}", msg.user_id(), msg.channel);
        self.analytics
            .track(msg.user_id(), EVENT_APP_MENTION, json!({ "channel": msg.channel }))
            .await;

        let reply = match self.reply_to(&msg, self.identity.get()).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error handling mention: {}", e);
                MENTION_APOLOGY.to_string()
            }
        };

        self.api
            .post_message(&msg.channel, &reply, Some(msg.thread_root()))
            .await
    }

    /// Shared DM/mention pipeline up to the agent's reply text.
    async fn reply_to(&self, msg: &MessageEvent, strip: Option<&BotIdentity>) -> Result<String> {
        let thread = msg.thread_root();

        if let Err(e) = self.api.set_thread_status(&msg.channel, thread, THINKING_STATUS).await {
            warn!("Could not set thread status: {}", e);
        }

        let user_name = self.first_name(msg.user_id()).await;
        let text = match strip {
            Some(identity) => identity.strip_mention(&msg.text),
            None => msg.text.clone(),
        };

        let replies = self
            .api
            .thread_replies(&msg.channel, thread, THREAD_HISTORY_LIMIT)
            .await?;
        let history = build_history(&replies, strip, &text);
        debug!("Thread {} history: {} messages", thread, history.len());

        self.agent.respond(&user_name, &history).await
    }

    async fn first_name(&self, user_id: &str) -> String {
        match self.api.user_first_name(user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                warn!("Could not look up user {}: {}", user_id, e);
                user_id.to_string()
            }
        }
    }

    async fn handle_thread_started(&self, started: ThreadStartedEvent) {
        let thread = started.assistant_thread;
        info!(
            "Assistant thread started by {} in {} ({})",
            thread.user_id, thread.channel_id, thread.thread_ts
        );
        self.analytics
            .track(
                &thread.user_id,
                EVENT_THREAD_STARTED,
                json!({ "channel": thread.channel_id, "thread_ts": thread.thread_ts }),
            )
            .await;
    }

    async fn handle_home_opened(&self, home: HomeOpenedEvent) -> Result<()> {
        if !home.is_home_tab() {
            debug!("Ignoring app_home_opened for tab {:?}", home.tab);
            return Ok(());
        }

        info!("Publishing home view for {}", home.user);
        self.analytics
            .track(&home.user, EVENT_HOME_OPENED, json!({ "channel": home.channel }))
            .await;

        let view = home_view(&self.agent.tool_definitions());
        self.api.publish_home(&home.user, view).await
    }
}
