//! Slack integration - Socket Mode listener, Web API client and event handlers.
//!
//! [`SlackAgent`] owns the lifecycle:
//!
//! ```ignore
//! let slack = SlackAgent::new(&settings, agent, analytics)?;
//! slack.start().await;
//! // ... until Ctrl-C
//! slack.cleanup().await;
//! ```
//!
//! Each incoming event runs on its own task; a failure while handling one
//! event is answered with an apology and never stops the listener.

pub mod api;
pub mod events;
pub mod handlers;
pub mod home;
pub mod retry;
pub mod socket;

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub use api::{ReplyMessage, SlackApi, SlackWebClient};
pub use events::SlackEvent;
pub use handlers::{BotIdentity, EventHandler, DM_APOLOGY, MENTION_APOLOGY};
pub use socket::SocketModeListener;

use crate::agent::Agent;
use crate::analytics::AnalyticsSink;
use crate::config::Settings;
use crate::Result;

/// How long `cleanup` waits for in-flight handlers.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

pub struct SlackAgent {
    handler: EventHandler,
    identity: Arc<OnceLock<BotIdentity>>,
    socket: Mutex<Option<SocketModeListener>>,
    grace_period: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SlackAgent {
    /// Build from settings. Fails when either Slack token is missing.
    pub fn new(
        settings: &Settings,
        agent: Arc<Agent>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Result<Self> {
        let (bot_token, app_token) = settings.require_slack_tokens()?;
        let client = api::hyper_client()?;
        let web = Arc::new(SlackWebClient::new(client.clone(), &bot_token));

        let mut slack = Self::with_api(web, agent, analytics);
        slack.socket = Mutex::new(Some(SocketModeListener::new(client, &app_token)));
        Ok(slack)
    }

    /// Build around an existing Web API implementation, without a Socket
    /// Mode connection. Events are fed in through [`SlackAgent::spawn_event`].
    pub fn with_api(
        api: Arc<dyn SlackApi>,
        agent: Arc<Agent>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let identity = Arc::new(OnceLock::new());
        let handler = EventHandler::new(api, agent, analytics, identity.clone());

        Self {
            handler,
            identity,
            socket: Mutex::new(None),
            grace_period: DEFAULT_GRACE_PERIOD,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// The bot's user id, once `start` has resolved it.
    pub fn bot_user_id(&self) -> Option<&str> {
        self.identity.get().map(BotIdentity::user_id)
    }

    /// Handle one event on its own tracked task.
    pub fn spawn_event(&self, event: SlackEvent) {
        let handler = self.handler.clone();
        self.tracker.spawn(async move { handler.dispatch(event).await });
    }

    /// Resolve the bot identity and start listening in the background.
    pub async fn start(&self) {
        match self.handler.api().auth_test().await.and_then(BotIdentity::new) {
            Ok(identity) => {
                info!("Bot initialized with ID: {}", identity.user_id());
                let _ = self.identity.set(identity);
            }
            Err(e) => error!("Failed to get bot info: {}", e),
        }

        let socket = match self.socket.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                error!("Socket listener lock poisoned: {}", e);
                None
            }
        };
        let Some(socket) = socket else {
            warn!("No Socket Mode listener configured");
            return;
        };

        info!("Starting Slack bot...");
        let handler = self.handler.clone();
        let tracker = self.tracker.clone();
        let task = tokio::spawn(socket.run(self.cancel.clone(), move |event| {
            let handler = handler.clone();
            tracker.spawn(async move { handler.dispatch(event).await });
        }));

        match self.listener.lock() {
            Ok(mut slot) => *slot = Some(task),
            Err(e) => error!("Listener handle lock poisoned: {}", e),
        }
        info!("Slack bot started and waiting for messages");
    }

    /// Stop listening and wait for in-flight handlers, up to the grace period.
    pub async fn cleanup(&self) {
        self.cancel.cancel();

        let task = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                warn!("Listener handle lock poisoned: {}", e);
                None
            }
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Error closing socket mode handler: {}", e);
            }
            info!("Slack socket mode handler closed");
        }

        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting for {} in-flight handlers", pending);
        }
        if tokio::time::timeout(self.grace_period, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Abandoning {} handlers after {:?}",
                self.tracker.len(),
                self.grace_period
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::PromptTemplate;
    use crate::analytics::NoopSink;
    use crate::slack::api::fake::FakeSlackApi;
    use crate::slack::events::MessageEvent;
    use crate::tools::ToolRunner;

    fn agent(replies: Vec<&str>) -> Arc<Agent> {
        Arc::new(Agent::new(
            Arc::new(FakeLlmClient::new(replies)),
            ToolRunner::new(),
            PromptTemplate::default(),
            5,
        ))
    }

    fn slack_agent(api: Arc<FakeSlackApi>, replies: Vec<&str>) -> SlackAgent {
        SlackAgent::with_api(api, agent(replies), Arc::new(NoopSink))
            .with_grace_period(Duration::from_millis(200))
    }

    #[test]
    fn test_new_requires_tokens() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let err = SlackAgent::new(&settings, agent(vec![]), Arc::new(NoopSink))
            .err()
            .unwrap();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }

    #[tokio::test]
    async fn test_start_resolves_bot_id_and_cleanup_stops() {
        let api = Arc::new(FakeSlackApi {
            bot_user_id: Some("UBOT".to_string()),
            ..Default::default()
        });
        let slack = slack_agent(api, vec![]);
        slack.start().await;
        assert_eq!(slack.bot_user_id(), Some("UBOT"));

        tokio::time::timeout(Duration::from_secs(2), slack.cleanup())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_bot_id_unset() {
        let slack = slack_agent(Arc::new(FakeSlackApi::default()), vec![]);
        slack.start().await;
        assert_eq!(slack.bot_user_id(), None);
        slack.cleanup().await;
    }

    #[tokio::test]
    async fn test_spawned_event_finishes_before_cleanup_returns() {
        let api = Arc::new(FakeSlackApi::default());
        let slack = slack_agent(api.clone(), vec!["done"]);

        slack.spawn_event(SlackEvent::Message(MessageEvent {
            user: Some("U1".to_string()),
            text: "hello".to_string(),
            channel: "D1".to_string(),
            channel_type: Some("im".to_string()),
            ts: "1.0".to_string(),
            ..Default::default()
        }));
        slack.cleanup().await;

        assert_eq!(api.posted().len(), 1);
        assert_eq!(api.posted()[0].text, "done");
    }

    #[tokio::test]
    async fn test_cleanup_abandons_slow_handlers_after_grace_period() {
        let slack = slack_agent(Arc::new(FakeSlackApi::default()), vec![]);

        slack.tracker.spawn(tokio::time::sleep(Duration::from_secs(30)));

        let started = std::time::Instant::now();
        slack.cleanup().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
