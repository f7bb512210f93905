//! Slack Web API client.
//!
//! [`SlackApi`] is the surface the event handlers use. [`SlackWebClient`]
//! implements it on a shared `slack-morphism` client; every call goes through
//! [`RetryPolicy`] and Slack's `ok: false` responses become [`Error::Slack`]
//! carrying the error code.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use slack_morphism::prelude::*;
use tracing::{debug, warn};

use super::retry::{Failure, RetryPolicy};
use crate::{Error, Result};

/// Messages requested per `conversations.replies` page.
const REPLY_PAGE_SIZE: u16 = 200;

/// Upper bound on pages walked for a single thread.
const MAX_REPLY_PAGES: usize = 50;

/// A message from `conversations.replies`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

impl ReplyMessage {
    pub fn from_bot(&self) -> bool {
        self.bot_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// One page of a thread, oldest message first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyPage {
    #[serde(default)]
    pub messages: Vec<ReplyMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

impl ReplyPage {
    pub fn new(messages: Vec<ReplyMessage>, next_cursor: Option<&str>) -> Self {
        Self {
            messages,
            response_metadata: Some(ResponseMetadata {
                next_cursor: next_cursor.map(str::to_string),
            }),
        }
    }

    /// Cursor for the following page; Slack sends an empty one on the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .and_then(|meta| meta.next_cursor.as_deref())
            .filter(|cursor| !cursor.is_empty())
    }
}

/// Walk a thread page by page and keep its newest `limit` messages.
///
/// `fetch` receives the cursor of the page to load (`None` for the first).
pub async fn newest_replies<F, Fut>(limit: usize, mut fetch: F) -> Result<Vec<ReplyMessage>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ReplyPage>>,
{
    let mut newest = VecDeque::with_capacity(limit + 1);
    let mut cursor = None;

    for _ in 0..MAX_REPLY_PAGES {
        let page = fetch(cursor.take()).await?;
        cursor = page.next_cursor().map(str::to_string);

        for message in page.messages {
            newest.push_back(message);
            if newest.len() > limit {
                newest.pop_front();
            }
        }

        if cursor.is_none() {
            return Ok(newest.into());
        }
    }

    warn!(
        "Thread has more than {} pages of replies, using the latest page read",
        MAX_REPLY_PAGES
    );
    Ok(newest.into())
}

/// Slack calls made by the event handlers.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Resolve the bot's own user id.
    async fn auth_test(&self) -> Result<String>;

    /// Set the assistant thread status line (e.g. "is thinking...").
    async fn set_thread_status(&self, channel: &str, thread_ts: &str, status: &str) -> Result<()>;

    /// First name from the user's profile, if one is set.
    async fn user_first_name(&self, user_id: &str) -> Result<Option<String>>;

    /// The newest `limit` messages of the thread rooted at `ts`, oldest first.
    async fn thread_replies(
        &self,
        channel: &str,
        ts: &str,
        limit: usize,
    ) -> Result<Vec<ReplyMessage>>;

    /// Post `text` to `channel`, inside a thread when `thread_ts` is given.
    async fn post_message(&self, channel: &str, text: &str, thread_ts: Option<&str>)
        -> Result<()>;

    /// Publish the App Home view for a user.
    async fn publish_home(&self, user_id: &str, view: Value) -> Result<()>;
}

/// `slack-morphism` backed Web API client, authenticated with the bot token.
pub struct SlackWebClient {
    client: Arc<SlackHyperClient>,
    bot_token: SlackApiToken,
    retry: RetryPolicy,
}

impl SlackWebClient {
    pub fn new(client: Arc<SlackHyperClient>, bot_token: &str) -> Self {
        Self {
            client,
            bot_token: SlackApiToken::new(SlackApiTokenValue(bot_token.to_string())),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn reply_page(
        &self,
        channel: &str,
        ts: &str,
        cursor: Option<String>,
    ) -> Result<ReplyPage> {
        let mut request = SlackApiConversationsRepliesRequest::new(channel.into(), ts.into())
            .with_limit(REPLY_PAGE_SIZE);
        if let Some(cursor) = cursor {
            request = request.with_cursor(SlackCursorId(cursor));
        }
        let request = &request;

        let response = self
            .retry
            .run("conversations.replies", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .conversations_replies(request)
                    .await
                    .map_err(Failure::from)
            })
            .await?;

        // The SDK models serialize back to Slack's wire field names.
        Ok(serde_json::from_value(serde_json::to_value(&response)?)?)
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn auth_test(&self) -> Result<String> {
        let response = self
            .retry
            .run("auth.test", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .auth_test()
                    .await
                    .map_err(Failure::from)
            })
            .await?;
        Ok(response.user_id.to_string())
    }

    async fn set_thread_status(&self, channel: &str, thread_ts: &str, status: &str) -> Result<()> {
        let request = SlackApiAssistantThreadsSetStatusRequest::new(
            channel.into(),
            status.to_string(),
            thread_ts.into(),
        );
        let request = &request;

        self.retry
            .run("assistant.threads.setStatus", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .assistant_threads_set_status(request)
                    .await
                    .map_err(Failure::from)
            })
            .await?;
        Ok(())
    }

    async fn user_first_name(&self, user_id: &str) -> Result<Option<String>> {
        let request = SlackApiUsersInfoRequest::new(user_id.into());
        let request = &request;

        let response = self
            .retry
            .run("users.info", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .users_info(request)
                    .await
                    .map_err(Failure::from)
            })
            .await?;

        let user = serde_json::to_value(&response.user)?;
        Ok(user
            .pointer("/profile/first_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string))
    }

    async fn thread_replies(
        &self,
        channel: &str,
        ts: &str,
        limit: usize,
    ) -> Result<Vec<ReplyMessage>> {
        let replies =
            newest_replies(limit, move |cursor| self.reply_page(channel, ts, cursor)).await?;
        debug!("Fetched {} replies for thread {}", replies.len(), ts);
        Ok(replies)
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let mut request = SlackApiChatPostMessageRequest::new(
            channel.into(),
            SlackMessageContent::new().with_text(text.to_string()),
        );
        if let Some(ts) = thread_ts {
            request = request.with_thread_ts(ts.into());
        }
        let request = &request;

        // A post that may have landed is not repeated.
        self.retry
            .run("chat.postMessage", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .chat_post_message(request)
                    .await
                    .map_err(|e| Failure::from(e).non_idempotent())
            })
            .await?;
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: Value) -> Result<()> {
        let view: SlackView = serde_json::from_value(view)?;
        let request = SlackApiViewsPublishRequest::new(user_id.into(), view);
        let request = &request;

        self.retry
            .run("views.publish", move || async move {
                self.client
                    .open_session(&self.bot_token)
                    .views_publish(request)
                    .await
                    .map_err(Failure::from)
            })
            .await?;
        Ok(())
    }
}

/// Build the shared HTTPS client used for Web API calls and Socket Mode.
pub fn hyper_client() -> Result<Arc<SlackHyperClient>> {
    let connector = SlackClientHyperConnector::new()
        .map_err(|e| Error::Slack(format!("Failed to create Slack HTTP connector: {}", e)))?;
    Ok(Arc::new(SlackClient::new(connector)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn message(text: &str) -> ReplyMessage {
        ReplyMessage {
            text: text.to_string(),
            user: Some("U1".to_string()),
            ..Default::default()
        }
    }

    /// Serve `thread` the way `conversations.replies` does: oldest first,
    /// `page_size` at a time, with a cursor while more remain.
    fn paged(thread: &[ReplyMessage], page_size: usize, cursor: Option<String>) -> ReplyPage {
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + page_size).min(thread.len());
        let next = (end < thread.len()).then(|| end.to_string());
        ReplyPage::new(thread[start..end].to_vec(), next.as_deref())
    }

    #[tokio::test]
    async fn test_long_thread_keeps_newest_messages() {
        let thread: Vec<_> = (0..10).map(|i| message(&format!("m{}", i))).collect();
        let cursors = Mutex::new(Vec::new());

        let replies = newest_replies(7, |cursor| {
            cursors.lock().unwrap().push(cursor.clone());
            let page = paged(&thread, 7, cursor);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        let texts: Vec<_> = replies.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4", "m5", "m6", "m7", "m8", "m9"]);
        assert_eq!(
            cursors.into_inner().unwrap(),
            vec![None, Some("7".to_string())]
        );
    }

    #[tokio::test]
    async fn test_short_thread_single_page() {
        let thread = vec![message("hello"), message("again")];
        let replies = newest_replies(7, |cursor| {
            let page = paged(&thread, 200, cursor);
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(replies, thread);
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let err = newest_replies(7, |_| async { Err(Error::Slack("thread_not_found".into())) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("thread_not_found"));
    }

    #[test]
    fn test_reply_page_from_wire_json() {
        let page: ReplyPage = serde_json::from_value(json!({
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "text": "hello", "ts": "100.1"},
                {"type": "message", "bot_id": "B1", "text": "hi there", "ts": "100.2"}
            ],
            "has_more": true,
            "response_metadata": {"next_cursor": "bmV4dA=="}
        }))
        .unwrap();

        assert_eq!(page.messages.len(), 2);
        assert!(!page.messages[0].from_bot());
        assert!(page.messages[1].from_bot());
        assert_eq!(page.next_cursor(), Some("bmV4dA=="));
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let page: ReplyPage = serde_json::from_value(json!({
            "messages": [],
            "response_metadata": {"next_cursor": ""}
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: ReplyPage = serde_json::from_value(json!({"messages": []})).unwrap();
        assert_eq!(page.next_cursor(), None);
    }
}
