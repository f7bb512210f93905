//! Socket Mode listener.
//!
//! Wraps the `slack-morphism` Socket Mode client: the SDK opens the
//! connection with the app token, acknowledges envelopes and reconnects;
//! this module maps every push event to a [`SlackEvent`] and hands it to a
//! callback until cancelled.

use std::sync::Arc;

use slack_morphism::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::events::SlackEvent;

type EventCallback = Arc<dyn Fn(SlackEvent) + Send + Sync>;

/// Registered as SDK user state; listener callbacks are plain fns.
#[derive(Clone)]
struct ListenerState {
    on_event: EventCallback,
}

async fn on_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = {
        let guard = states.read().await;
        guard
            .get_user_state::<ListenerState>()
            .cloned()
            .ok_or("listener state not registered")?
    };

    // Must return quickly: the envelope is acked once this callback finishes.
    (state.on_event)(SlackEvent::from_callback(&event.event));
    Ok(())
}

fn on_listener_error(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> HttpStatusCode {
    warn!("Socket Mode error: {}", err);
    HttpStatusCode::OK
}

pub struct SocketModeListener {
    client: Arc<SlackHyperClient>,
    app_token: SlackApiToken,
}

impl SocketModeListener {
    pub fn new(client: Arc<SlackHyperClient>, app_token: &str) -> Self {
        Self {
            client,
            app_token: SlackApiToken::new(SlackApiTokenValue(app_token.to_string())),
        }
    }

    /// Run until `cancel` fires. Every event is passed to `on_event`.
    pub async fn run<F>(self, cancel: CancellationToken, on_event: F)
    where
        F: Fn(SlackEvent) + Send + Sync + 'static,
    {
        let callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(on_push_event);
        let environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(self.client.clone())
                .with_error_handler(on_listener_error)
                .with_user_state(ListenerState {
                    on_event: Arc::new(on_event),
                }),
        );
        let listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            environment,
            callbacks,
        );

        if let Err(e) = listener.listen_for(&self.app_token).await {
            error!("Failed to open Socket Mode connection: {}", e);
            return;
        }

        listener.start().await;
        info!("Socket Mode connected");

        cancel.cancelled().await;
        info!("Closing Socket Mode connection");
        listener.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listener_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SocketModeListener>();
    }

    #[test]
    fn test_listener_state_forwards_events() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let state = ListenerState {
            on_event: Arc::new(move |_: SlackEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        };

        let cloned = state.clone();
        (cloned.on_event)(SlackEvent::Other);
        (state.on_event)(SlackEvent::Other);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
