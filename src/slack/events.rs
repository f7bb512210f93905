//! Events API payloads the relay handles.
//!
//! Socket Mode delivers `slack-morphism` callback bodies; they are mapped
//! into [`SlackEvent`] through their wire form, so anything the relay does
//! not model ends up as [`SlackEvent::Other`].

use serde::Deserialize;
use serde_json::Value;
use slack_morphism::prelude::*;
use tracing::debug;

/// Inner event of an Events API callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SlackEvent {
    #[serde(rename = "message")]
    Message(MessageEvent),
    #[serde(rename = "app_mention")]
    AppMention(MessageEvent),
    #[serde(rename = "assistant_thread_started")]
    AssistantThreadStarted(ThreadStartedEvent),
    #[serde(rename = "app_home_opened")]
    AppHomeOpened(HomeOpenedEvent),
    #[serde(other)]
    Other,
}

impl SlackEvent {
    /// Map a push event body delivered by the SDK.
    pub fn from_callback(body: &SlackEventCallbackBody) -> Self {
        let parsed = serde_json::to_value(body).and_then(serde_json::from_value);
        match parsed {
            Ok(event) => event,
            Err(e) => {
                debug!("Unmodelled event payload: {}", e);
                SlackEvent::Other
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SlackEvent::Message(_) => "message",
            SlackEvent::AppMention(_) => "app_mention",
            SlackEvent::AssistantThreadStarted(_) => "assistant_thread_started",
            SlackEvent::AppHomeOpened(_) => "app_home_opened",
            SlackEvent::Other => "other",
        }
    }
}

/// `message` and `app_mention` payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub channel: String,
    #[serde(default)]
    pub channel_type: Option<String>,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// A plain message a person sent to the bot in a DM.
    pub fn is_direct_message(&self) -> bool {
        let im = match self.channel_type.as_deref() {
            Some(kind) => kind == "im",
            // DM channel ids start with "D"
            None => self.channel.starts_with('D'),
        };
        im && self.subtype.is_none() && self.bot_id.is_none()
    }

    /// Timestamp of the thread this message belongs to.
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn user_id(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadStartedEvent {
    pub assistant_thread: AssistantThread,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantThread {
    pub user_id: String,
    pub channel_id: String,
    pub thread_ts: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeOpenedEvent {
    pub user: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub tab: Option<String>,
}

impl HomeOpenedEvent {
    pub fn is_home_tab(&self) -> bool {
        matches!(self.tab.as_deref(), None | Some("home"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn callback(value: Value) -> SlackEvent {
        let body: SlackEventCallbackBody = serde_json::from_value(value).unwrap();
        SlackEvent::from_callback(&body)
    }

    #[test]
    fn test_direct_message_from_callback() {
        let event = callback(json!({
            "type": "message",
            "channel": "D123",
            "channel_type": "im",
            "user": "U1",
            "text": "What's on my plate?",
            "ts": "1700000000.000100"
        }));

        match event {
            SlackEvent::Message(msg) => {
                assert!(msg.is_direct_message());
                assert_eq!(msg.thread_root(), "1700000000.000100");
                assert_eq!(msg.user_id(), "U1");
                assert_eq!(msg.text, "What's on my plate?");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_mention_from_callback() {
        let event = callback(json!({
            "type": "app_mention",
            "channel": "C9",
            "user": "U2",
            "text": "<@UBOT> summarise this",
            "ts": "2.5",
            "thread_ts": "2.0"
        }));
        match event {
            SlackEvent::AppMention(msg) => {
                assert_eq!(msg.channel, "C9");
                assert_eq!(msg.thread_root(), "2.0");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_message_with_subtype_or_bot_is_not_direct() {
        let edited: MessageEvent = serde_json::from_value(json!({
            "channel": "D1", "channel_type": "im", "ts": "1.0", "subtype": "message_changed"
        }))
        .unwrap();
        assert!(!edited.is_direct_message());

        let bot: MessageEvent = serde_json::from_value(json!({
            "channel": "D1", "channel_type": "im", "ts": "1.0", "bot_id": "B1", "text": "reply"
        }))
        .unwrap();
        assert!(!bot.is_direct_message());

        let channel: MessageEvent = serde_json::from_value(json!({
            "channel": "C1", "channel_type": "channel", "ts": "1.0", "user": "U1"
        }))
        .unwrap();
        assert!(!channel.is_direct_message());
    }

    #[test]
    fn test_dm_detected_from_channel_id_without_type() {
        let msg: MessageEvent =
            serde_json::from_value(json!({"channel": "D1", "ts": "1.0", "user": "U1"})).unwrap();
        assert!(msg.is_direct_message());
    }

    #[test]
    fn test_parse_thread_started_and_home() {
        let started: SlackEvent = serde_json::from_value(json!({
            "type": "assistant_thread_started",
            "assistant_thread": {
                "user_id": "U1",
                "channel_id": "D1",
                "thread_ts": "3.0",
                "context": {}
            }
        }))
        .unwrap();
        assert_eq!(started.kind(), "assistant_thread_started");

        let home: HomeOpenedEvent =
            serde_json::from_value(json!({"user": "U1", "channel": "D1", "tab": "messages"}))
                .unwrap();
        assert!(!home.is_home_tab());
        let home: HomeOpenedEvent = serde_json::from_value(json!({"user": "U1"})).unwrap();
        assert!(home.is_home_tab());
    }

    #[test]
    fn test_unknown_event_is_other() {
        let event: SlackEvent =
            serde_json::from_value(json!({"type": "reaction_added", "user": "U1"})).unwrap();
        assert!(matches!(event, SlackEvent::Other));

        let event: SlackEvent =
            serde_json::from_value(json!({"type": "message", "subtype": "channel_join"}))
                .unwrap_or(SlackEvent::Other);
        assert!(matches!(event, SlackEvent::Other));
    }
}
